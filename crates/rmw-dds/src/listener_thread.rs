// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background thread applying remote gossip to the graph cache.
//!
//! The thread waits on the gossip reader and on a private guard condition.
//! Shutdown clears the running flag, triggers the guard, then joins.

use crate::condition::{Condition, GuardCondition};
use crate::error::{Error, Result};
use crate::gid::Gid;
use crate::gossip::GossipChannel;
use crate::graph::{GraphCache, ParticipantEntitiesInfo};
use crate::waitset::WaitSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const THREAD_NAME: &str = "rmw-dds-listener";

/// Last-resort diagnostic that does not allocate.
fn write_fatal(message: &'static str) {
    let _ = std::io::stderr().write_all(message.as_bytes());
}

struct Worker {
    running: Arc<AtomicBool>,
    waitset: WaitSet,
    data_condition_id: u64,
    channel: Arc<GossipChannel>,
    graph_cache: Arc<GraphCache>,
    local_gid: Gid,
}

enum Fatal {
    Wait,
    Take,
}

impl Worker {
    fn run(self) {
        while self.running.load(Ordering::Acquire) {
            let triggered = match self.waitset.wait(None) {
                Ok(triggered) => triggered,
                Err(err) => {
                    self.fatal(Fatal::Wait, &err);
                    break;
                }
            };
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            if triggered
                .iter()
                .any(|c| c.condition_id() == self.data_condition_id)
            {
                if let Err((kind, err)) = self.drain() {
                    self.fatal(kind, &err);
                    break;
                }
            }
        }
        log::debug!("[listener] thread exiting");
    }

    /// Apply every available sample.
    fn drain(&self) -> std::result::Result<(), (Fatal, Error)> {
        loop {
            let bytes = match self.channel.reader().take() {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return Ok(()),
                Err(err) => return Err((Fatal::Take, err.into())),
            };
            let msg = match ParticipantEntitiesInfo::decode(&bytes) {
                Ok(msg) => msg,
                Err(err) => {
                    log::warn!(
                        "[listener] dropping undecodable sample ({} bytes): {}",
                        bytes.len(),
                        err
                    );
                    continue;
                }
            };
            if msg.gid == self.local_gid {
                continue;
            }
            self.graph_cache.update_participant_entities(&msg);
        }
    }

    fn fatal(&self, kind: Fatal, err: &Error) {
        match kind {
            Fatal::Wait => write_fatal("rmw-dds: listener thread wait failed, stopping\n"),
            Fatal::Take => write_fatal("rmw-dds: listener thread take failed, stopping\n"),
        }
        log::error!("[listener] fatal error, thread stops: {}", err);
    }
}

/// Handle of the running listener thread.
pub struct ListenerThread {
    running: Arc<AtomicBool>,
    guard: Arc<GuardCondition>,
    handle: Option<JoinHandle<()>>,
}

impl ListenerThread {
    pub fn start(
        channel: Arc<GossipChannel>,
        graph_cache: Arc<GraphCache>,
        local_gid: Gid,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let guard = Arc::new(GuardCondition::new());

        let waitset = WaitSet::new();
        let data_condition = channel.data_condition();
        let data_condition_id = data_condition.condition_id();
        waitset.attach_condition(data_condition)?;
        waitset.attach_condition(Arc::clone(&guard) as Arc<dyn Condition>)?;

        let worker = Worker {
            running: Arc::clone(&running),
            waitset,
            data_condition_id,
            channel,
            graph_cache,
            local_gid,
        };
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|err| Error::BadAllocation(format!("listener thread: {}", err)))?;

        log::debug!("[listener] started for {}", local_gid.guid());
        Ok(Self {
            running,
            guard,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and join the thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        self.guard.trigger();
        handle
            .join()
            .map_err(|_| Error::InvalidState("listener thread panicked".into()))
    }
}

impl Drop for ListenerThread {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("[listener] {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeEntitiesInfo;
    use crate::topic_registry::TopicRegistry;
    use crate::transport::{
        DomainParticipant, EndpointDiscoveryInfo, EndpointDiscoveryStatus, LoopbackTransport,
        ParticipantDiscoveryInfo, ParticipantDiscoveryStatus, ParticipantListener, Transport,
    };
    use std::time::{Duration, Instant};

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

    struct Side {
        participant: Arc<dyn DomainParticipant>,
        channel: Arc<GossipChannel>,
        _topics: TopicRegistry,
    }

    fn side(transport: &LoopbackTransport) -> Side {
        let participant = transport
            .create_participant(0, Vec::new(), Arc::new(Silent))
            .expect("participant");
        let topics = TopicRegistry::new();
        let channel =
            Arc::new(GossipChannel::create(participant.as_ref(), &topics).expect("channel"));
        Side {
            participant,
            channel,
            _topics: topics,
        }
    }

    fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn snapshot(gid: Gid, nodes: &[&str]) -> ParticipantEntitiesInfo {
        ParticipantEntitiesInfo {
            gid,
            node_entities_info_seq: nodes.iter().map(|n| NodeEntitiesInfo::new(n, "/")).collect(),
        }
    }

    #[test]
    fn remote_snapshots_are_applied() {
        let transport = LoopbackTransport::new();
        let local = side(&transport);
        let remote = side(&transport);
        let cache = Arc::new(GraphCache::new());
        let local_gid = Gid::from(local.participant.guid());
        let thread =
            ListenerThread::start(Arc::clone(&local.channel), Arc::clone(&cache), local_gid)
            .expect("start");

        let remote_gid = Gid::from(remote.participant.guid());
        remote.channel.publish(&snapshot(remote_gid, &["a", "b"])).expect("publish");
        assert!(wait_for(|| cache.get_number_of_nodes() == 2));

        remote.channel.publish(&snapshot(remote_gid, &["a"])).expect("publish");
        assert!(wait_for(|| cache.get_number_of_nodes() == 1));

        thread.stop().expect("stop");
    }

    #[test]
    fn self_sent_snapshots_are_ignored() {
        let transport = LoopbackTransport::new();
        let local = side(&transport);
        let remote = side(&transport);
        let cache = Arc::new(GraphCache::new());
        let local_gid = Gid::from(local.participant.guid());
        let thread =
            ListenerThread::start(Arc::clone(&local.channel), Arc::clone(&cache), local_gid)
            .expect("start");

        // Forged by a remote writer, but carrying our own gid.
        remote.channel.publish(&snapshot(local_gid, &["forged"])).expect("publish");
        let marker = Gid::from(remote.participant.guid());
        remote.channel.publish(&snapshot(marker, &["marker"])).expect("publish");

        assert!(wait_for(|| cache.participant(&marker).is_some()));
        assert!(cache.participant(&local_gid).is_none());
        thread.stop().expect("stop");
    }

    #[test]
    fn garbage_samples_do_not_stop_the_thread() {
        let transport = LoopbackTransport::new();
        let local = side(&transport);
        let remote = side(&transport);
        let cache = Arc::new(GraphCache::new());
        let thread = ListenerThread::start(
            Arc::clone(&local.channel),
            Arc::clone(&cache),
            Gid::from(local.participant.guid()),
        )
        .expect("start");

        // A foreign participant writing undecodable bytes on the gossip topic.
        let foreign = transport
            .create_participant(0, Vec::new(), Arc::new(Silent))
            .expect("foreign");
        let foreign_topic = foreign
            .create_topic(
                crate::graph::message::TOPIC_NAME,
                crate::graph::message::TYPE_NAME,
                &crate::qos::QosProfile::default(),
                Arc::new(crate::topic_registry::FanOutTopicListener::default()),
            )
            .expect("topic");
        let garbage = foreign
            .create_writer(&foreign_topic, &crate::qos::QosProfile::default(), Vec::new())
            .expect("writer");
        garbage.write(&[0x00, 0x01, 0x00, 0x00, 0xde, 0xad]).expect("write");

        let gid = Gid::from(remote.participant.guid());
        remote.channel.publish(&snapshot(gid, &["ok"])).expect("publish");
        assert!(wait_for(|| cache.get_number_of_nodes() == 1));
        assert!(thread.is_running());
        thread.stop().expect("stop");
    }

    #[test]
    fn stop_joins_promptly_with_pending_samples() {
        let transport = LoopbackTransport::new();
        let local = side(&transport);
        let remote = side(&transport);
        let cache = Arc::new(GraphCache::new());
        let thread = ListenerThread::start(
            Arc::clone(&local.channel),
            Arc::clone(&cache),
            Gid::from(local.participant.guid()),
        )
        .expect("start");

        let gid = Gid::from(remote.participant.guid());
        for i in 0..50 {
            let name = format!("n{}", i);
            remote.channel.publish(&snapshot(gid, &[name.as_str()])).expect("publish");
        }

        let started = Instant::now();
        thread.stop().expect("stop");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
