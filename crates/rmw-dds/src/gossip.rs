// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `ros_discovery_info` publisher/subscriber pair.
//!
//! - Writer: reliable, transient-local, keep last 1.
//! - Reader: reliable, transient-local, keep all, ignores local publications.
//!
//! Both use the topic name verbatim (no `rt/` prefix).

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::graph::message::{ParticipantEntitiesInfo, TOPIC_NAME, TYPE_NAME};
use crate::qos::QosProfile;
use crate::topic_registry::TopicRegistry;
use crate::transport::{DataReader, DataWriter, DomainParticipant, TopicRef};
use std::sync::Arc;

pub struct GossipChannel {
    topic: TopicRef,
    writer: Arc<dyn DataWriter>,
    reader: Arc<dyn DataReader>,
}

impl GossipChannel {
    /// Create the topic, writer and reader, unwinding on failure.
    pub fn create(participant: &dyn DomainParticipant, topics: &TopicRegistry) -> Result<Self> {
        let topic = topics.find_or_create_topic(
            participant,
            TOPIC_NAME,
            TYPE_NAME,
            &QosProfile::participant_entities_info_writer(),
            None,
        )?;

        let writer = match participant.create_writer(
            &topic,
            &QosProfile::participant_entities_info_writer(),
            Vec::new(),
        ) {
            Ok(writer) => writer,
            Err(err) => {
                log::error!("[gossip] failed to create {} writer: {}", TOPIC_NAME, err);
                if let Err(cleanup) = topics.delete_topic(participant, &topic, None) {
                    log::warn!("[gossip] cleanup of {} topic failed: {}", TOPIC_NAME, cleanup);
                }
                return Err(err.into());
            }
        };

        let reader = match participant.create_reader(
            &topic,
            &QosProfile::participant_entities_info_reader(),
            Vec::new(),
            true,
        ) {
            Ok(reader) => reader,
            Err(err) => {
                log::error!("[gossip] failed to create {} reader: {}", TOPIC_NAME, err);
                if let Err(cleanup) = participant.delete_writer(&writer) {
                    log::warn!("[gossip] cleanup of {} writer failed: {}", TOPIC_NAME, cleanup);
                }
                if let Err(cleanup) = topics.delete_topic(participant, &topic, None) {
                    log::warn!("[gossip] cleanup of {} topic failed: {}", TOPIC_NAME, cleanup);
                }
                return Err(err.into());
            }
        };

        log::debug!(
            "[gossip] channel ready (writer {}, reader {})",
            writer.guid(),
            reader.guid()
        );
        Ok(Self {
            topic,
            writer,
            reader,
        })
    }

    /// Broadcast a participant snapshot.
    pub fn publish(&self, msg: &ParticipantEntitiesInfo) -> Result<()> {
        let payload = msg
            .encode()
            .map_err(|err| Error::GossipPublishFailure(err.to_string()))?;
        self.writer.write(&payload).map_err(|err| {
            log::error!(
                "[gossip] publish of {} node(s) failed: {}",
                msg.node_entities_info_seq.len(),
                err
            );
            Error::GossipPublishFailure(err.to_string())
        })
    }

    pub fn writer(&self) -> &Arc<dyn DataWriter> {
        &self.writer
    }

    pub fn reader(&self) -> &Arc<dyn DataReader> {
        &self.reader
    }

    pub fn data_condition(&self) -> Arc<dyn Condition> {
        self.reader.data_condition()
    }

    /// Delete reader, writer and topic. Every step runs; the first error is
    /// returned.
    pub fn destroy(
        &self,
        participant: &dyn DomainParticipant,
        topics: &TopicRegistry,
    ) -> Result<()> {
        let mut first_error: Option<Error> = None;
        if let Err(err) = participant.delete_reader(&self.reader) {
            log::warn!("[gossip] failed to delete reader: {}", err);
            first_error.get_or_insert(err.into());
        }
        if let Err(err) = participant.delete_writer(&self.writer) {
            log::warn!("[gossip] failed to delete writer: {}", err);
            first_error.get_or_insert(err.into());
        }
        if let Err(err) = topics.delete_topic(participant, &self.topic, None) {
            first_error.get_or_insert(err);
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gid::{Gid, Guid};
    use crate::graph::NodeEntitiesInfo;
    use crate::transport::{
        EndpointDiscoveryInfo, EndpointDiscoveryStatus, LoopbackTransport,
        ParticipantDiscoveryInfo, ParticipantDiscoveryStatus, ParticipantListener, Transport,
    };

    struct Silent;

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

    fn snapshot(participant: Guid, node: &str) -> ParticipantEntitiesInfo {
        ParticipantEntitiesInfo {
            gid: Gid::from(participant),
            node_entities_info_seq: vec![NodeEntitiesInfo::new(node, "/")],
        }
    }

    #[test]
    fn snapshots_reach_peers_but_not_self() {
        let transport = LoopbackTransport::new();
        let a = transport.create_participant(0, Vec::new(), Arc::new(Silent)).expect("a");
        let b = transport.create_participant(0, Vec::new(), Arc::new(Silent)).expect("b");
        let (topics_a, topics_b) = (TopicRegistry::new(), TopicRegistry::new());
        let channel_a = GossipChannel::create(a.as_ref(), &topics_a).expect("channel a");
        let channel_b = GossipChannel::create(b.as_ref(), &topics_b).expect("channel b");

        let msg = snapshot(a.guid(), "talker");
        channel_a.publish(&msg).expect("publish");

        assert_eq!(channel_a.reader().take().expect("take"), None);
        let bytes = channel_b.reader().take().expect("take").expect("sample");
        assert_eq!(ParticipantEntitiesInfo::decode(&bytes).expect("decode"), msg);

        channel_a.destroy(a.as_ref(), &topics_a).expect("destroy");
        assert!(topics_a.is_empty());
        assert_eq!(transport.topic_count(a.guid()), 0);
    }

    #[test]
    fn late_joiner_receives_last_announcement() {
        let transport = LoopbackTransport::new();
        let a = transport.create_participant(0, Vec::new(), Arc::new(Silent)).expect("a");
        let topics_a = TopicRegistry::new();
        let channel_a = GossipChannel::create(a.as_ref(), &topics_a).expect("channel a");
        channel_a.publish(&snapshot(a.guid(), "old")).expect("publish");
        channel_a.publish(&snapshot(a.guid(), "new")).expect("publish");

        let b = transport.create_participant(0, Vec::new(), Arc::new(Silent)).expect("b");
        let topics_b = TopicRegistry::new();
        let channel_b = GossipChannel::create(b.as_ref(), &topics_b).expect("channel b");
        let bytes = channel_b.reader().take().expect("take").expect("replayed");
        let msg = ParticipantEntitiesInfo::decode(&bytes).expect("decode");
        assert_eq!(msg.node_entities_info_seq[0].node_name, "new");
        assert_eq!(channel_b.reader().take().expect("take"), None);
    }

    #[test]
    fn write_failure_is_a_publish_failure() {
        let transport = LoopbackTransport::new();
        let a = transport.create_participant(0, Vec::new(), Arc::new(Silent)).expect("a");
        let topics = TopicRegistry::new();
        let channel = GossipChannel::create(a.as_ref(), &topics).expect("channel");

        transport.set_write_failure(TOPIC_NAME, true);
        let err = channel.publish(&snapshot(a.guid(), "n")).expect_err("must fail");
        assert!(matches!(err, Error::GossipPublishFailure(_)));
    }
}
