// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery listener feeding transport discovery events into the graph cache.
//!
//! Runs on the transport's discovery thread(s). Nothing here returns an
//! error: malformed metadata degrades to a default and is logged.

use crate::gid::Gid;
use crate::graph::{EntityInfo, GraphCache};
use crate::transport::{
    EndpointDiscoveryInfo, EndpointDiscoveryStatus, ParticipantDiscoveryInfo,
    ParticipantDiscoveryStatus, ParticipantListener,
};
use crate::user_data::{parse_enclave, parse_type_hash, TypeHash};
use std::sync::Arc;

pub struct DiscoveryListener {
    graph_cache: Arc<GraphCache>,
}

impl DiscoveryListener {
    pub fn new(graph_cache: Arc<GraphCache>) -> Self {
        Self { graph_cache }
    }

    fn process_endpoint(
        &self,
        status: EndpointDiscoveryStatus,
        info: &EndpointDiscoveryInfo,
        is_reader: bool,
    ) {
        let gid = Gid::from(info.guid);
        match status {
            // Existence and association only; live QoS changes are not tracked.
            EndpointDiscoveryStatus::ChangedQos => {}
            EndpointDiscoveryStatus::Discovered => {
                let type_hash = parse_type_hash(&info.user_data).unwrap_or_else(|err| {
                    log::warn!(
                        "[discovery] {} on '{}': {}, using zero type hash",
                        info.guid,
                        info.topic_name,
                        err
                    );
                    TypeHash::zero()
                });
                // Ownership comes from the proxy's participant guid, as announced.
                let entity = EntityInfo::new(
                    &info.topic_name,
                    &info.type_name,
                    type_hash,
                    Gid::from(info.participant_guid),
                    info.qos.clone(),
                );
                self.graph_cache.add_entity(gid, entity, is_reader);
            }
            EndpointDiscoveryStatus::Removed | EndpointDiscoveryStatus::Ignored => {
                self.graph_cache.remove_entity(&gid, is_reader);
            }
        }
    }
}

impl ParticipantListener for DiscoveryListener {
    fn on_participant_discovery(
        &self,
        status: ParticipantDiscoveryStatus,
        info: &ParticipantDiscoveryInfo,
    ) {
        let gid = Gid::from(info.guid);
        match status {
            ParticipantDiscoveryStatus::Discovered => match parse_enclave(&info.user_data) {
                Ok(enclave) => self.graph_cache.add_participant(gid, &enclave),
                // Not a ROS participant.
                Err(err) => log::debug!("[discovery] skip participant {}: {}", info.guid, err),
            },
            ParticipantDiscoveryStatus::Removed
            | ParticipantDiscoveryStatus::Dropped
            | ParticipantDiscoveryStatus::Ignored => {
                self.graph_cache.remove_participant(&gid);
            }
            ParticipantDiscoveryStatus::ChangedQos => {}
        }
    }

    fn on_subscriber_discovery(
        &self,
        status: EndpointDiscoveryStatus,
        info: &EndpointDiscoveryInfo,
    ) {
        self.process_endpoint(status, info, true);
    }

    fn on_publisher_discovery(
        &self,
        status: EndpointDiscoveryStatus,
        info: &EndpointDiscoveryInfo,
    ) {
        self.process_endpoint(status, info, false);
    }
}
