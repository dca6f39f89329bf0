// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted topic objects, one per name per participant.
//!
//! The transport refuses a second topic object with an existing name, while
//! several publishers, subscriptions, services and clients of one process
//! legitimately share a topic. Every user takes a reference through
//! [`TopicRegistry::find_or_create_topic`] and gives it back through
//! [`TopicRegistry::delete_topic`]; the transport object lives exactly as
//! long as the count is positive.
//!
//! Callers hold the participant's entity-creation mutex around both calls.

use crate::error::{Error, Result};
use crate::qos::QosProfile;
use crate::transport::{DomainParticipant, TopicListener, TopicRef};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

fn same_listener(a: &Arc<dyn TopicListener>, b: &Arc<dyn TopicListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Topic listener fanning events out to every registered listener.
#[derive(Default)]
pub struct FanOutTopicListener {
    listeners: Mutex<Vec<Arc<dyn TopicListener>>>,
}

impl FanOutTopicListener {
    pub fn add(&self, listener: Arc<dyn TopicListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn TopicListener>) {
        self.listeners.lock().retain(|l| !same_listener(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TopicListener for FanOutTopicListener {
    fn on_inconsistent_topic(&self, topic_name: &str) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_inconsistent_topic(topic_name);
        }
    }
}

/// Shared topic handle with its use count.
pub struct UseCountTopic {
    pub topic: TopicRef,
    pub listener: Arc<FanOutTopicListener>,
    pub use_count: usize,
}

/// Per-participant name -> [`UseCountTopic`] map behind one coarse mutex.
#[derive(Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, UseCountTopic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when a live topic named `topic_name` carries another type.
    pub fn check_topic_type(&self, topic_name: &str, type_name: &str) -> Result<()> {
        match self.topics.lock().get(topic_name) {
            Some(entry) if entry.topic.type_name() != type_name => Err(Error::TopicTypeMismatch {
                topic: topic_name.to_string(),
                existing: entry.topic.type_name().to_string(),
                requested: type_name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Take a reference on `topic_name`, creating the transport topic with
    /// `qos` on first use. An existing entry is returned as is, keeping the
    /// QoS it was created with and without comparing types; see
    /// [`Self::check_topic_type`].
    pub fn find_or_create_topic(
        &self,
        participant: &dyn DomainParticipant,
        topic_name: &str,
        type_name: &str,
        qos: &QosProfile,
        listener: Option<Arc<dyn TopicListener>>,
    ) -> Result<TopicRef> {
        let mut topics = self.topics.lock();
        if let Some(entry) = topics.get_mut(topic_name) {
            entry.use_count += 1;
            if let Some(listener) = listener {
                entry.listener.add(listener);
            }
            log::debug!(
                "[topic-registry] reuse '{}' (use_count={})",
                topic_name,
                entry.use_count
            );
            return Ok(Arc::clone(&entry.topic));
        }

        let fan_out = Arc::new(FanOutTopicListener::default());
        if let Some(listener) = listener {
            fan_out.add(listener);
        }
        let topic = participant.create_topic(
            topic_name,
            type_name,
            qos,
            Arc::clone(&fan_out) as Arc<dyn TopicListener>,
        )?;
        topics.insert(
            topic_name.to_string(),
            UseCountTopic {
                topic: Arc::clone(&topic),
                listener: fan_out,
                use_count: 1,
            },
        );
        log::debug!("[topic-registry] created '{}' ({})", topic_name, type_name);
        Ok(topic)
    }

    /// Give back a reference. The transport topic is deleted when the last
    /// reference goes away. Unknown topics are a logged no-op.
    pub fn delete_topic(
        &self,
        participant: &dyn DomainParticipant,
        topic: &TopicRef,
        listener: Option<&Arc<dyn TopicListener>>,
    ) -> Result<()> {
        let mut topics = self.topics.lock();
        let Some(entry) = topics.get_mut(topic.name()) else {
            log::warn!(
                "[topic-registry] delete_topic: '{}' is not registered",
                topic.name()
            );
            return Ok(());
        };

        if let Some(listener) = listener {
            entry.listener.remove(listener);
        }
        entry.use_count = entry.use_count.saturating_sub(1);
        if entry.use_count > 0 {
            log::debug!(
                "[topic-registry] release '{}' (use_count={})",
                topic.name(),
                entry.use_count
            );
            return Ok(());
        }

        if let Some(entry) = topics.remove(topic.name()) {
            participant.delete_topic(&entry.topic)?;
            log::debug!("[topic-registry] deleted '{}'", topic.name());
        }
        Ok(())
    }

    pub fn use_count(&self, topic_name: &str) -> usize {
        self.topics
            .lock()
            .get(topic_name)
            .map(|entry| entry.use_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        EndpointDiscoveryInfo, EndpointDiscoveryStatus, LoopbackTransport,
        ParticipantDiscoveryInfo, ParticipantDiscoveryStatus, ParticipantListener, Topic,
        Transport,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl TopicListener for Counter {
        fn on_inconsistent_topic(&self, _topic_name: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn qos() -> QosProfile {
        QosProfile::default()
    }

    fn setup() -> (LoopbackTransport, Arc<dyn DomainParticipant>) {
        let transport = LoopbackTransport::new();
        let participant = transport
            .create_participant(0, Vec::new(), Arc::new(Silent))
            .expect("participant");
        (transport, participant)
    }

    #[test]
    fn shared_handle_until_last_release() {
        let (transport, participant) = setup();
        let registry = TopicRegistry::new();

        let a = registry
            .find_or_create_topic(participant.as_ref(), "rt/chatter", "T", &qos(), None)
            .expect("first");
        let b = registry
            .find_or_create_topic(participant.as_ref(), "rt/chatter", "T", &qos(), None)
            .expect("second");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.use_count("rt/chatter"), 2);
        assert_eq!(transport.topic_count(participant.guid()), 1);

        registry.delete_topic(participant.as_ref(), &a, None).expect("delete");
        assert!(transport.has_topic(participant.guid(), "rt/chatter"));
        registry.delete_topic(participant.as_ref(), &b, None).expect("delete");
        assert!(!transport.has_topic(participant.guid(), "rt/chatter"));
        assert!(registry.is_empty());
    }

    #[test]
    fn topic_keeps_qos_of_first_user() {
        let (_transport, participant) = setup();
        let registry = TopicRegistry::new();
        let reliable = QosProfile::default().keep_last(5);

        let first = registry
            .find_or_create_topic(participant.as_ref(), "rt/chatter", "T", &reliable, None)
            .expect("create");
        assert_eq!(first.qos(), &reliable);

        let second = registry
            .find_or_create_topic(
                participant.as_ref(),
                "rt/chatter",
                "T",
                &QosProfile::best_effort(),
                None,
            )
            .expect("reuse");
        assert_eq!(second.qos(), &reliable);
    }

    #[test]
    fn deleting_unknown_topic_is_a_noop() {
        let (transport, participant) = setup();
        let registry = TopicRegistry::new();
        let topic = registry
            .find_or_create_topic(participant.as_ref(), "rt/x", "T", &qos(), None)
            .expect("create");
        registry.delete_topic(participant.as_ref(), &topic, None).expect("delete");
        registry.delete_topic(participant.as_ref(), &topic, None).expect("double delete");
        assert_eq!(transport.topic_count(participant.guid()), 0);
    }

    #[test]
    fn type_check_is_separate_from_lookup() {
        let (_transport, participant) = setup();
        let registry = TopicRegistry::new();
        registry
            .find_or_create_topic(
                participant.as_ref(),
                "rt/chatter",
                "std_msgs::msg::dds_::String_",
                &qos(),
                None,
            )
            .expect("create");

        assert!(registry
            .check_topic_type("rt/chatter", "std_msgs::msg::dds_::String_")
            .is_ok());
        assert!(matches!(
            registry.check_topic_type("rt/chatter", "std_msgs::msg::dds_::Int32_"),
            Err(Error::TopicTypeMismatch { .. })
        ));
        assert!(registry.check_topic_type("rt/other", "anything").is_ok());

        // the lookup itself does not compare types
        registry
            .find_or_create_topic(
                participant.as_ref(),
                "rt/chatter",
                "std_msgs::msg::dds_::Int32_",
                &qos(),
                None,
            )
            .expect("reuse");
        assert_eq!(registry.use_count("rt/chatter"), 2);
    }

    #[test]
    fn fan_out_reaches_every_registered_listener() {
        let (transport, participant) = setup();
        let registry = TopicRegistry::new();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        let first_dyn: Arc<dyn TopicListener> = first.clone();
        let second_dyn: Arc<dyn TopicListener> = second.clone();

        let topic = registry
            .find_or_create_topic(
                participant.as_ref(),
                "rt/chatter",
                "A",
                &qos(),
                Some(first_dyn.clone()),
            )
            .expect("create");
        registry
            .find_or_create_topic(
                participant.as_ref(),
                "rt/chatter",
                "A",
                &qos(),
                Some(second_dyn.clone()),
            )
            .expect("reuse");

        let remote = transport
            .create_participant(0, Vec::new(), Arc::new(Silent))
            .expect("remote");
        remote
            .create_topic("rt/chatter", "B", &qos(), Arc::new(Counter::default()))
            .expect("remote topic");
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);

        registry
            .delete_topic(participant.as_ref(), &topic, Some(&second_dyn))
            .expect("release");
        let third = transport
            .create_participant(0, Vec::new(), Arc::new(Silent))
            .expect("third");
        third
            .create_topic("rt/chatter", "C", &qos(), Arc::new(Counter::default()))
            .expect("third topic");
        assert_eq!(first.0.load(Ordering::SeqCst), 2);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn randomized_refcount_matches_transport_state() {
        let (transport, participant) = setup();
        let registry = TopicRegistry::new();
        let names = ["rt/a", "rt/b", "rt/c"];
        let mut handles: HashMap<&str, Vec<TopicRef>> = HashMap::new();
        let mut rng = fastrand::Rng::with_seed(0x5eed);

        for _ in 0..500 {
            let name = names[rng.usize(..names.len())];
            let live = handles.entry(name).or_default();
            if rng.bool() {
                let topic = registry
                    .find_or_create_topic(participant.as_ref(), name, "T", &qos(), None)
                    .expect("create");
                live.push(topic);
            } else if let Some(topic) = live.pop() {
                registry.delete_topic(participant.as_ref(), &topic, None).expect("delete");
            }

            for name in names {
                let expected = handles.get(name).map_or(0, Vec::len);
                assert_eq!(registry.use_count(name), expected);
                assert_eq!(transport.has_topic(participant.guid(), name), expected > 0);
            }
        }
    }
}
