// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback transport.
//!
//! Every participant created through the same [`LoopbackTransport`] on the
//! same domain shares a bus. Writers deliver straight into the queues of
//! matching readers, and participants observe each other through the same
//! discovery callbacks a networked transport would produce.
//!
//! # Architecture
//!
//! ```text
//! LoopbackTransport
//! +-- domains: DashMap<DomainId, Arc<DomainBus>>
//! +-- write_faults: DashSet<topic name>
//!
//! DomainBus
//! +-- participants: DashMap<Guid, Arc<LoopbackParticipant>>
//!
//! LoopbackParticipant
//! +-- topics:  Mutex<HashMap<name, Arc<LoopbackTopic>>>
//! +-- writers: DashMap<Guid, Arc<LoopbackWriter>>   (history for transient-local)
//! +-- readers: DashMap<Guid, Arc<LoopbackReader>>   (ArrayQueue / SegQueue)
//! ```
//!
//! # Discovery
//!
//! - A participant never receives discovery callbacks about itself or its
//!   own endpoints.
//! - A joining participant is announced to every peer, and every peer (with
//!   its endpoints) is announced to the joining participant.
//! - Participant deletion reports `Removed` for each owned endpoint, then
//!   `Removed` for the participant.
//! - Callbacks run on the calling thread, after every internal lock has
//!   been released.

use super::{
    DataReader, DataWriter, DomainId, DomainParticipant, EndpointDiscoveryInfo,
    EndpointDiscoveryStatus, ParticipantDiscoveryInfo, ParticipantDiscoveryStatus,
    ParticipantListener, Topic, TopicListener, TopicRef, Transport, TransportError,
    TransportResult,
};
use crate::condition::{Condition, GuardCondition};
use crate::gid::Guid;
use crate::qos::{Durability, QosProfile};
use crossbeam::queue::{ArrayQueue, SegQueue};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

const ENTITY_KIND_WRITER: u8 = 0x03;
const ENTITY_KIND_READER: u8 = 0x04;

static NEXT_TRANSPORT_ID: AtomicU32 = AtomicU32::new(1);

/// In-process transport. Cloning shares the underlying buses.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

struct LoopbackInner {
    id: u32,
    domains: DashMap<DomainId, Arc<DomainBus>>,
    next_participant: AtomicU32,
    write_faults: Arc<DashSet<String>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
                domains: DashMap::new(),
                next_participant: AtomicU32::new(1),
                write_faults: Arc::new(DashSet::new()),
            }),
        }
    }

    /// Make every write on `topic_name` fail (or succeed again).
    pub fn set_write_failure(&self, topic_name: &str, fail: bool) {
        if fail {
            self.inner.write_faults.insert(topic_name.to_string());
        } else {
            self.inner.write_faults.remove(topic_name);
        }
    }

    /// Number of live topic objects owned by a participant.
    pub fn topic_count(&self, participant: Guid) -> usize {
        self.find_participant(participant)
            .map(|p| p.topics.lock().len())
            .unwrap_or(0)
    }

    pub fn has_topic(&self, participant: Guid, topic_name: &str) -> bool {
        self.find_participant(participant)
            .is_some_and(|p| p.topics.lock().contains_key(topic_name))
    }

    pub fn participant_count(&self, domain_id: DomainId) -> usize {
        self.inner
            .domains
            .get(&domain_id)
            .map(|bus| bus.participants.len())
            .unwrap_or(0)
    }

    fn find_participant(&self, guid: Guid) -> Option<Arc<LoopbackParticipant>> {
        self.inner
            .domains
            .iter()
            .find_map(|bus| bus.participants.get(&guid).map(|p| Arc::clone(p.value())))
    }

    fn bus(&self, domain_id: DomainId) -> Arc<DomainBus> {
        let entry = self
            .inner
            .domains
            .entry(domain_id)
            .or_insert_with(|| Arc::new(DomainBus::new(domain_id)));
        Arc::clone(entry.value())
    }

    fn next_prefix(&self) -> [u8; 12] {
        let mut prefix = [0u8; 12];
        prefix[0..4].copy_from_slice(&std::process::id().to_be_bytes());
        prefix[4..8].copy_from_slice(&self.inner.id.to_be_bytes());
        let counter = self.inner.next_participant.fetch_add(1, Ordering::Relaxed);
        prefix[8..12].copy_from_slice(&counter.to_be_bytes());
        prefix
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn create_participant(
        &self,
        domain_id: DomainId,
        user_data: Vec<u8>,
        listener: Arc<dyn ParticipantListener>,
    ) -> TransportResult<Arc<dyn DomainParticipant>> {
        let bus = self.bus(domain_id);
        let participant = Arc::new(LoopbackParticipant {
            guid: Guid::new(self.next_prefix(), crate::gid::ENTITYID_PARTICIPANT),
            domain_id,
            user_data,
            listener,
            topics: Mutex::new(HashMap::new()),
            writers: DashMap::new(),
            readers: DashMap::new(),
            next_entity: AtomicU32::new(1),
            alive: AtomicBool::new(true),
            bus: Arc::downgrade(&bus),
            write_faults: Arc::clone(&self.inner.write_faults),
        });

        let peers = bus.peers(participant.guid);
        bus.participants
            .insert(participant.guid, Arc::clone(&participant));
        log::debug!(
            "[loopback] participant {} joined domain {} ({} peers)",
            participant.guid,
            domain_id,
            peers.len()
        );

        let joined = participant.discovery_info();
        for peer in &peers {
            peer.listener
                .on_participant_discovery(ParticipantDiscoveryStatus::Discovered, &joined);

            participant
                .listener
                .on_participant_discovery(
                    ParticipantDiscoveryStatus::Discovered,
                    &peer.discovery_info(),
                );
            for writer in peer.writer_list() {
                participant
                    .listener
                    .on_publisher_discovery(
                        EndpointDiscoveryStatus::Discovered,
                        &writer.discovery_info(),
                    );
            }
            for reader in peer.reader_list() {
                participant
                    .listener
                    .on_subscriber_discovery(
                        EndpointDiscoveryStatus::Discovered,
                        &reader.discovery_info(),
                    );
            }
        }

        Ok(participant)
    }

    fn delete_participant(&self, participant: &Arc<dyn DomainParticipant>) -> TransportResult<()> {
        let guid = participant.guid();
        let bus = self.bus(participant.domain_id());
        let Some((_, removed)) = bus.participants.remove(&guid) else {
            return Err(TransportError::NotFound(format!("participant {}", guid)));
        };
        removed.alive.store(false, Ordering::Release);

        let writers = removed.writer_list();
        let readers = removed.reader_list();
        removed.writers.clear();
        removed.readers.clear();
        removed.topics.lock().clear();
        for writer in &writers {
            writer.closed.store(true, Ordering::Release);
        }
        for reader in &readers {
            reader.closed.store(true, Ordering::Release);
        }

        let info = removed.discovery_info();
        for peer in bus.peers(guid) {
            for writer in &writers {
                peer.listener
                    .on_publisher_discovery(
                        EndpointDiscoveryStatus::Removed,
                        &writer.discovery_info(),
                    );
            }
            for reader in &readers {
                peer.listener
                    .on_subscriber_discovery(
                        EndpointDiscoveryStatus::Removed,
                        &reader.discovery_info(),
                    );
            }
            peer.listener
                .on_participant_discovery(ParticipantDiscoveryStatus::Removed, &info);
        }
        log::debug!("[loopback] participant {} left domain {}", guid, removed.domain_id);
        Ok(())
    }
}

struct DomainBus {
    domain_id: DomainId,
    participants: DashMap<Guid, Arc<LoopbackParticipant>>,
}

impl DomainBus {
    fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            participants: DashMap::new(),
        }
    }

    /// Snapshot of every participant except `except`.
    fn peers(&self, except: Guid) -> Vec<Arc<LoopbackParticipant>> {
        self.participants
            .iter()
            .filter(|entry| *entry.key() != except)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Snapshot of every reader on `topic_name` across the domain.
    fn readers_on(&self, topic_name: &str) -> Vec<Arc<LoopbackReader>> {
        self.participants
            .iter()
            .flat_map(|entry| {
                entry
                    .readers
                    .iter()
                    .filter(|reader| reader.topic_name == topic_name)
                    .map(|reader| Arc::clone(reader.value()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn writers_on(&self, topic_name: &str) -> Vec<Arc<LoopbackWriter>> {
        self.participants
            .iter()
            .flat_map(|entry| {
                entry
                    .writers
                    .iter()
                    .filter(|writer| writer.topic_name == topic_name)
                    .map(|writer| Arc::clone(writer.value()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Listeners of every other participant's topic named `name` with a
    /// type different from `type_name`.
    fn inconsistent_topics(
        &self,
        except: Guid,
        name: &str,
        type_name: &str,
    ) -> Vec<Arc<LoopbackTopic>> {
        self.participants
            .iter()
            .filter(|entry| *entry.key() != except)
            .filter_map(|entry| {
                entry
                    .topics
                    .lock()
                    .get(name)
                    .filter(|topic| topic.type_name != type_name)
                    .cloned()
            })
            .collect()
    }
}

struct LoopbackParticipant {
    guid: Guid,
    domain_id: DomainId,
    user_data: Vec<u8>,
    listener: Arc<dyn ParticipantListener>,
    topics: Mutex<HashMap<String, Arc<LoopbackTopic>>>,
    writers: DashMap<Guid, Arc<LoopbackWriter>>,
    readers: DashMap<Guid, Arc<LoopbackReader>>,
    next_entity: AtomicU32,
    alive: AtomicBool,
    bus: Weak<DomainBus>,
    write_faults: Arc<DashSet<String>>,
}

impl LoopbackParticipant {
    fn discovery_info(&self) -> ParticipantDiscoveryInfo {
        ParticipantDiscoveryInfo {
            guid: self.guid,
            user_data: self.user_data.clone(),
        }
    }

    fn writer_list(&self) -> Vec<Arc<LoopbackWriter>> {
        self.writers.iter().map(|w| Arc::clone(w.value())).collect()
    }

    fn reader_list(&self) -> Vec<Arc<LoopbackReader>> {
        self.readers.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn live_bus(&self) -> TransportResult<Arc<DomainBus>> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.bus.upgrade().ok_or(TransportError::Closed)
    }

    fn next_entity_guid(&self, kind: u8) -> Guid {
        let counter = self.next_entity.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        Guid::new(self.guid.prefix, [counter[1], counter[2], counter[3], kind])
    }

    fn check_topic(&self, topic: &TopicRef) -> TransportResult<()> {
        if self.topics.lock().contains_key(topic.name()) {
            Ok(())
        } else {
            Err(TransportError::NotFound(format!("topic '{}'", topic.name())))
        }
    }
}

impl DomainParticipant for LoopbackParticipant {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    fn create_topic(
        &self,
        name: &str,
        type_name: &str,
        qos: &QosProfile,
        listener: Arc<dyn TopicListener>,
    ) -> TransportResult<TopicRef> {
        let bus = self.live_bus()?;
        let topic = Arc::new(LoopbackTopic {
            name: name.to_string(),
            type_name: type_name.to_string(),
            qos: qos.clone(),
            listener,
        });
        {
            let mut topics = self.topics.lock();
            if topics.contains_key(name) {
                return Err(TransportError::Rejected(format!(
                    "topic '{}' already exists on participant {}",
                    name, self.guid
                )));
            }
            topics.insert(name.to_string(), Arc::clone(&topic));
        }

        let conflicting = bus.inconsistent_topics(self.guid, name, type_name);
        if !conflicting.is_empty() {
            log::debug!(
                "[loopback] topic '{}' type '{}' conflicts with {} remote topic(s)",
                name,
                type_name,
                conflicting.len()
            );
            topic.listener.on_inconsistent_topic(name);
            for other in conflicting {
                other.listener.on_inconsistent_topic(name);
            }
        }
        Ok(topic)
    }

    fn delete_topic(&self, topic: &TopicRef) -> TransportResult<()> {
        match self.topics.lock().remove(topic.name()) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(format!("topic '{}'", topic.name()))),
        }
    }

    fn create_writer(
        &self,
        topic: &TopicRef,
        qos: &QosProfile,
        user_data: Vec<u8>,
    ) -> TransportResult<Arc<dyn DataWriter>> {
        let bus = self.live_bus()?;
        self.check_topic(topic)?;

        let writer = Arc::new(LoopbackWriter {
            guid: self.next_entity_guid(ENTITY_KIND_WRITER),
            participant_guid: self.guid,
            topic_name: topic.name().to_string(),
            type_name: topic.type_name().to_string(),
            qos: qos.clone(),
            user_data,
            history: Mutex::new(VecDeque::new()),
            bus: Arc::downgrade(&bus),
            write_faults: Arc::clone(&self.write_faults),
            closed: AtomicBool::new(false),
        });
        self.writers.insert(writer.guid, Arc::clone(&writer));

        let info = writer.discovery_info();
        for peer in bus.peers(self.guid) {
            peer.listener
                .on_publisher_discovery(EndpointDiscoveryStatus::Discovered, &info);
        }
        Ok(writer)
    }

    fn create_reader(
        &self,
        topic: &TopicRef,
        qos: &QosProfile,
        user_data: Vec<u8>,
        ignore_local_publications: bool,
    ) -> TransportResult<Arc<dyn DataReader>> {
        let bus = self.live_bus()?;
        self.check_topic(topic)?;

        let queue = SampleQueue::new(qos.depth());
        let reader = Arc::new(LoopbackReader {
            guid: self.next_entity_guid(ENTITY_KIND_READER),
            participant_guid: self.guid,
            topic_name: topic.name().to_string(),
            type_name: topic.type_name().to_string(),
            qos: qos.clone(),
            user_data,
            ignore_local_publications,
            queue,
            condition: Arc::new(GuardCondition::new()),
            closed: AtomicBool::new(false),
        });
        self.readers.insert(reader.guid, Arc::clone(&reader));

        if reader.qos.durability == Durability::TransientLocal {
            for writer in bus.writers_on(&reader.topic_name) {
                if writer.qos.durability == Durability::TransientLocal && reader.accepts(&writer) {
                    for sample in writer.history.lock().iter() {
                        reader.push(sample.clone());
                    }
                }
            }
        }

        let info = reader.discovery_info();
        for peer in bus.peers(self.guid) {
            peer.listener
                .on_subscriber_discovery(EndpointDiscoveryStatus::Discovered, &info);
        }
        Ok(reader)
    }

    fn delete_writer(&self, writer: &Arc<dyn DataWriter>) -> TransportResult<()> {
        let bus = self.live_bus()?;
        let Some((_, removed)) = self.writers.remove(&writer.guid()) else {
            return Err(TransportError::NotFound(format!("writer {}", writer.guid())));
        };
        removed.closed.store(true, Ordering::Release);

        let info = removed.discovery_info();
        for peer in bus.peers(self.guid) {
            peer.listener
                .on_publisher_discovery(EndpointDiscoveryStatus::Removed, &info);
        }
        Ok(())
    }

    fn delete_reader(&self, reader: &Arc<dyn DataReader>) -> TransportResult<()> {
        let bus = self.live_bus()?;
        let Some((_, removed)) = self.readers.remove(&reader.guid()) else {
            return Err(TransportError::NotFound(format!("reader {}", reader.guid())));
        };
        removed.closed.store(true, Ordering::Release);

        let info = removed.discovery_info();
        for peer in bus.peers(self.guid) {
            peer.listener
                .on_subscriber_discovery(EndpointDiscoveryStatus::Removed, &info);
        }
        Ok(())
    }
}

struct LoopbackTopic {
    name: String,
    type_name: String,
    qos: QosProfile,
    listener: Arc<dyn TopicListener>,
}

impl Topic for LoopbackTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn qos(&self) -> &QosProfile {
        &self.qos
    }
}

struct LoopbackWriter {
    guid: Guid,
    participant_guid: Guid,
    topic_name: String,
    type_name: String,
    qos: QosProfile,
    user_data: Vec<u8>,
    /// Samples kept for late-joining transient-local readers.
    history: Mutex<VecDeque<Vec<u8>>>,
    bus: Weak<DomainBus>,
    write_faults: Arc<DashSet<String>>,
    closed: AtomicBool,
}

impl LoopbackWriter {
    fn discovery_info(&self) -> EndpointDiscoveryInfo {
        EndpointDiscoveryInfo {
            guid: self.guid,
            participant_guid: self.participant_guid,
            topic_name: self.topic_name.clone(),
            type_name: self.type_name.clone(),
            qos: self.qos.clone(),
            user_data: self.user_data.clone(),
        }
    }
}

impl DataWriter for LoopbackWriter {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn topic_name(&self) -> &str {
        &self.topic_name
    }

    fn write(&self, data: &[u8]) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.write_faults.contains(&self.topic_name) {
            return Err(TransportError::Rejected(format!(
                "write on '{}' refused",
                self.topic_name
            )));
        }
        let bus = self.bus.upgrade().ok_or(TransportError::Closed)?;

        // History lock is held across delivery so a concurrent late joiner
        // cannot observe samples out of order.
        let mut history = self.history.lock();
        if self.qos.durability == Durability::TransientLocal {
            history.push_back(data.to_vec());
            let depth = self.qos.depth().unwrap_or(usize::MAX);
            while history.len() > depth {
                history.pop_front();
            }
        }
        for reader in bus.readers_on(&self.topic_name) {
            if reader.accepts(self) {
                reader.push(data.to_vec());
            }
        }
        log::trace!(
            "[loopback] {} wrote {} bytes on '{}' (domain {})",
            self.guid,
            data.len(),
            self.topic_name,
            bus.domain_id
        );
        Ok(())
    }
}

/// Deepest keep-last history backed by a preallocated ring.
const MAX_PREALLOCATED_DEPTH: usize = 4096;

enum SampleQueue {
    KeepLast(ArrayQueue<Vec<u8>>),
    /// Keep-last too deep to preallocate; oldest samples are evicted on push.
    KeepLastUnbounded { queue: SegQueue<Vec<u8>>, depth: usize },
    KeepAll(SegQueue<Vec<u8>>),
}

impl SampleQueue {
    fn new(depth: Option<usize>) -> Self {
        match depth {
            Some(depth) if depth <= MAX_PREALLOCATED_DEPTH => {
                Self::KeepLast(ArrayQueue::new(depth))
            }
            Some(depth) => Self::KeepLastUnbounded {
                queue: SegQueue::new(),
                depth,
            },
            None => Self::KeepAll(SegQueue::new()),
        }
    }

    fn push(&self, sample: Vec<u8>) {
        match self {
            Self::KeepLast(queue) => {
                queue.force_push(sample);
            }
            Self::KeepLastUnbounded { queue, depth } => {
                queue.push(sample);
                while queue.len() > *depth {
                    queue.pop();
                }
            }
            Self::KeepAll(queue) => queue.push(sample),
        }
    }

    fn pop(&self) -> Option<Vec<u8>> {
        match self {
            Self::KeepLast(queue) => queue.pop(),
            Self::KeepLastUnbounded { queue, .. } | Self::KeepAll(queue) => queue.pop(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::KeepLast(queue) => queue.is_empty(),
            Self::KeepLastUnbounded { queue, .. } | Self::KeepAll(queue) => queue.is_empty(),
        }
    }
}

struct LoopbackReader {
    guid: Guid,
    participant_guid: Guid,
    topic_name: String,
    type_name: String,
    qos: QosProfile,
    user_data: Vec<u8>,
    ignore_local_publications: bool,
    queue: SampleQueue,
    condition: Arc<GuardCondition>,
    closed: AtomicBool,
}

impl LoopbackReader {
    fn accepts(&self, writer: &LoopbackWriter) -> bool {
        !(self.ignore_local_publications && writer.participant_guid == self.participant_guid)
    }

    fn push(&self, sample: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.queue.push(sample);
        self.condition.trigger();
    }

    fn discovery_info(&self) -> EndpointDiscoveryInfo {
        EndpointDiscoveryInfo {
            guid: self.guid,
            participant_guid: self.participant_guid,
            topic_name: self.topic_name.clone(),
            type_name: self.type_name.clone(),
            qos: self.qos.clone(),
            user_data: self.user_data.clone(),
        }
    }
}

impl DataReader for LoopbackReader {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn topic_name(&self) -> &str {
        &self.topic_name
    }

    fn take(&self) -> TransportResult<Option<Vec<u8>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let sample = self.queue.pop();
        if self.queue.is_empty() {
            self.condition.set_trigger_value(false);
            // A push may have raced with the clear.
            if !self.queue.is_empty() {
                self.condition.trigger();
            }
        }
        Ok(sample)
    }

    fn data_condition(&self) -> Arc<dyn Condition> {
        Arc::clone(&self.condition) as Arc<dyn Condition>
    }
}
