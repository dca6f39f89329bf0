// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers for rmw-dds integration tests.

#![allow(dead_code)]

use rmw_dds::graph::message::{TOPIC_NAME, TYPE_NAME};
use rmw_dds::topic_registry::FanOutTopicListener;
use rmw_dds::transport::{
    DataReader, DataWriter, DomainParticipant, EndpointDiscoveryInfo, EndpointDiscoveryStatus,
    ParticipantDiscoveryInfo, ParticipantDiscoveryStatus, ParticipantListener,
};
use rmw_dds::{Context, ContextOptions, LoopbackTransport, QosProfile, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const STRING_TYPE: &str = "std_msgs::msg::dds_::String_";

pub struct Silent;

impl ParticipantListener for Silent {
    fn on_participant_discovery(
        &self,
        _: ParticipantDiscoveryStatus,
        _: &ParticipantDiscoveryInfo,
    ) {
    }
    fn on_subscriber_discovery(&self, _: EndpointDiscoveryStatus, _: &EndpointDiscoveryInfo) {}
    fn on_publisher_discovery(&self, _: EndpointDiscoveryStatus, _: &EndpointDiscoveryInfo) {}
}

pub fn context(transport: &LoopbackTransport) -> Context {
    Context::new(Arc::new(transport.clone()), ContextOptions::new(0))
}

pub fn context_with_enclave(transport: &LoopbackTransport, enclave: &str) -> Context {
    Context::new(
        Arc::new(transport.clone()),
        ContextOptions::new(0).with_enclave(enclave),
    )
}

/// Poll `predicate` for up to five seconds.
pub fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// A bare participant on domain 0 with its own gossip topic object.
pub struct RawPeer {
    pub participant: Arc<dyn DomainParticipant>,
    pub topic: rmw_dds::transport::TopicRef,
}

impl RawPeer {
    pub fn new(transport: &LoopbackTransport) -> anyhow::Result<Self> {
        let participant = transport.create_participant(0, Vec::new(), Arc::new(Silent))?;
        let topic = participant.create_topic(
            TOPIC_NAME,
            TYPE_NAME,
            &QosProfile::participant_entities_info_writer(),
            Arc::new(FanOutTopicListener::default()),
        )?;
        Ok(Self { participant, topic })
    }

    pub fn gossip_writer(&self) -> anyhow::Result<Arc<dyn DataWriter>> {
        Ok(self.participant.create_writer(
            &self.topic,
            &QosProfile::participant_entities_info_writer(),
            Vec::new(),
        )?)
    }

    /// Keep-all observer of every snapshot published on the domain.
    pub fn gossip_observer(&self) -> anyhow::Result<Arc<dyn DataReader>> {
        Ok(self.participant.create_reader(
            &self.topic,
            &QosProfile::participant_entities_info_reader(),
            Vec::new(),
            true,
        )?)
    }
}
