// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport capability consumed by the rmw layer.
//!
//! The graph layer never speaks RTPS itself. It needs a transport able to
//! create participants, topics, writers and readers, and to report remote
//! participant/endpoint discovery through a [`ParticipantListener`].
//!
//! # Architecture
//!
//! ```text
//! Transport
//! +-- create_participant(domain, user_data, listener) -> DomainParticipant
//!     +-- create_topic(name, type, qos, listener)     -> TopicRef
//!     +-- create_writer(topic, qos, user_data)        -> DataWriter
//!     +-- create_reader(topic, qos, user_data, ...)   -> DataReader
//!
//! transport thread(s) --> ParticipantListener::on_*_discovery
//! ```
//!
//! [`loopback::LoopbackTransport`] is the in-process implementation.

pub mod loopback;

use crate::condition::Condition;
use crate::gid::Guid;
use crate::qos::QosProfile;
use std::sync::Arc;
use thiserror::Error;

pub use loopback::LoopbackTransport;

/// Domain ID type (0-232 per DDS spec)
pub type DomainId = u32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refused the request (duplicate topic, bad handle, ...).
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("out of resources: {0}")]
    OutOfResources(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The owning participant has been deleted.
    #[error("entity closed")]
    Closed,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Participant discovery status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantDiscoveryStatus {
    Discovered,
    ChangedQos,
    Removed,
    Dropped,
    Ignored,
}

/// Reader/writer discovery status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDiscoveryStatus {
    Discovered,
    ChangedQos,
    Removed,
    Ignored,
}

/// Proxy data of a discovered participant.
#[derive(Debug, Clone)]
pub struct ParticipantDiscoveryInfo {
    pub guid: Guid,
    pub user_data: Vec<u8>,
}

/// Proxy data of a discovered reader or writer.
#[derive(Debug, Clone)]
pub struct EndpointDiscoveryInfo {
    pub guid: Guid,
    pub participant_guid: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QosProfile,
    pub user_data: Vec<u8>,
}

/// Discovery callbacks, invoked on the transport's own threads.
///
/// Implementations must not block and must not panic.
pub trait ParticipantListener: Send + Sync {
    fn on_participant_discovery(
        &self,
        status: ParticipantDiscoveryStatus,
        info: &ParticipantDiscoveryInfo,
    );

    fn on_subscriber_discovery(
        &self,
        status: EndpointDiscoveryStatus,
        info: &EndpointDiscoveryInfo,
    );

    fn on_publisher_discovery(
        &self,
        status: EndpointDiscoveryStatus,
        info: &EndpointDiscoveryInfo,
    );
}

/// Topic-level events.
pub trait TopicListener: Send + Sync {
    /// A remote topic with the same name but a different type was found.
    fn on_inconsistent_topic(&self, topic_name: &str);
}

/// Transport topic object. One live object per name per participant.
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;
    fn type_name(&self) -> &str;
    fn qos(&self) -> &QosProfile;
}

pub type TopicRef = Arc<dyn Topic>;

pub trait DataWriter: Send + Sync {
    fn guid(&self) -> Guid;
    fn topic_name(&self) -> &str;
    fn write(&self, data: &[u8]) -> TransportResult<()>;
}

pub trait DataReader: Send + Sync {
    fn guid(&self) -> Guid;
    fn topic_name(&self) -> &str;

    /// Take the next sample, `Ok(None)` when the reader is empty.
    fn take(&self) -> TransportResult<Option<Vec<u8>>>;

    /// Condition triggered while samples are available.
    fn data_condition(&self) -> Arc<dyn Condition>;
}

pub trait DomainParticipant: Send + Sync {
    fn guid(&self) -> Guid;
    fn domain_id(&self) -> DomainId;

    fn create_topic(
        &self,
        name: &str,
        type_name: &str,
        qos: &QosProfile,
        listener: Arc<dyn TopicListener>,
    ) -> TransportResult<TopicRef>;

    fn delete_topic(&self, topic: &TopicRef) -> TransportResult<()>;

    fn create_writer(
        &self,
        topic: &TopicRef,
        qos: &QosProfile,
        user_data: Vec<u8>,
    ) -> TransportResult<Arc<dyn DataWriter>>;

    /// With `ignore_local_publications` the reader never receives samples
    /// written by this participant.
    fn create_reader(
        &self,
        topic: &TopicRef,
        qos: &QosProfile,
        user_data: Vec<u8>,
        ignore_local_publications: bool,
    ) -> TransportResult<Arc<dyn DataReader>>;

    fn delete_writer(&self, writer: &Arc<dyn DataWriter>) -> TransportResult<()>;
    fn delete_reader(&self, reader: &Arc<dyn DataReader>) -> TransportResult<()>;
}

pub trait Transport: Send + Sync {
    fn create_participant(
        &self,
        domain_id: DomainId,
        user_data: Vec<u8>,
        listener: Arc<dyn ParticipantListener>,
    ) -> TransportResult<Arc<dyn DomainParticipant>>;

    /// Deletes the participant along with any entity it still owns.
    fn delete_participant(&self, participant: &Arc<dyn DomainParticipant>) -> TransportResult<()>;
}
