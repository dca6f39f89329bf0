// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rmw-dds - ROS 2 graph layer over a DDS transport
//!
//! Maps nodes, publishers, subscriptions, services and clients onto DDS
//! participants, topics, writers and readers, and keeps an eventually
//! consistent view of the whole ROS graph in every process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rmw_dds::{Context, ContextOptions, LoopbackTransport, QosProfile, TypeSupport};
//! use std::sync::Arc;
//!
//! fn main() -> rmw_dds::Result<()> {
//!     let context = Context::new(Arc::new(LoopbackTransport::new()), ContextOptions::new(0));
//!     let node = context.create_node("talker", "/")?;
//!
//!     let ts = TypeSupport::new("std_msgs::msg::dds_::String_");
//!     let publisher = node.create_publisher("/chatter", &ts, &QosProfile::default())?;
//!     publisher.publish(b"\x00\x01\x00\x00\x06\x00\x00\x00hello\x00")?;
//!
//!     assert_eq!(node.count_publishers("/chatter"), 1);
//!     publisher.destroy()?;
//!     node.destroy()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Context -> Node -> Publisher / Subscription / Service / Client     |
//! |  Node introspection (counts, names and types, endpoint info)        |
//! +---------------------------------------------------------------------+
//! |  GraphCache <- DiscoveryListener (transport discovery events)       |
//! |            <- ListenerThread    (ros_discovery_info gossip)         |
//! |            -> graph guard condition                                 |
//! +---------------------------------------------------------------------+
//! |  TopicRegistry (one refcounted topic object per name)               |
//! +---------------------------------------------------------------------+
//! |  Transport trait (LoopbackTransport in-process implementation)      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`context`] / [`node`] / [`endpoint`] - entity lifecycle (start here)
//! - [`graph`] - graph cache and the `ParticipantEntitiesInfo` message
//! - [`discovery`] - transport discovery -> graph cache
//! - [`gossip`] / [`listener_thread`] - `ros_discovery_info` exchange
//! - [`transport`] - transport capability and the loopback transport
//! - [`names`] / [`user_data`] - ROS name mangling and DDS user data

pub mod condition;
pub mod config;
pub mod context;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod gid;
pub mod gossip;
pub mod graph;
mod introspection;
pub mod listener_thread;
pub mod names;
pub mod node;
pub mod qos;
pub mod ser;
pub mod topic_registry;
pub mod transport;
pub mod user_data;
pub mod waitset;

pub use condition::{Condition, GuardCondition};
pub use config::{ContextOptions, EnvConfig};
pub use context::Context;
pub use endpoint::{Client, Publisher, Service, Subscription, TypeSupport};
pub use error::{Error, Result};
pub use gid::{Gid, Guid};
pub use graph::{GraphCache, NamesAndTypes, NodeName, TopicEndpointInfo};
pub use node::Node;
pub use qos::QosProfile;
pub use transport::{LoopbackTransport, Transport};
pub use user_data::TypeHash;
pub use waitset::WaitSet;
