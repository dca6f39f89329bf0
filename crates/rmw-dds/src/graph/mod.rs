// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ROS graph cache and the gossip message that keeps it in sync.

mod cache;
pub mod message;


pub use cache::{
    EndpointType, EntityInfo, GraphCache, NamesAndTypes, NodeName, ParticipantInfo,
    TopicEndpointInfo, NODE_NAMESPACE_UNKNOWN, NODE_NAME_UNKNOWN,
};
pub(crate) use cache::node_fqn;
pub use message::{NodeEntitiesInfo, ParticipantEntitiesInfo};
