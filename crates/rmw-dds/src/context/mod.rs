// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Context lifecycle.
//!
//! A [`Context`] lazily creates its participant-level state when the first
//! node is created and tears it down when the last node is destroyed.
//!
//! # Construction order
//!
//! ```text
//! GraphCache
//! DiscoveryListener(GraphCache)
//! DomainParticipant(enclave user data, DiscoveryListener)
//! TopicRegistry + GossipChannel (ros_discovery_info)
//! graph guard condition <- GraphCache change callback
//! local participant record
//! ListenerThread
//! ```
//!
//! Teardown runs the same list backwards.
//!
//! # Locking
//!
//! - `entity_creation`: participant-wide; serializes topic, reader and
//!   writer creation/deletion.
//! - `node_update`: serializes "mutate graph cache, then publish snapshot".
//!
//! `node_update` is only taken once entity-creation work has completed,
//! never the other way around.

#[cfg(test)]
mod tests;

use crate::condition::GuardCondition;
use crate::config::ContextOptions;
use crate::discovery::DiscoveryListener;
use crate::error::{Error, Result};
use crate::gid::Gid;
use crate::gossip::GossipChannel;
use crate::graph::message::{TOPIC_NAME, TYPE_NAME};
use crate::graph::{EntityInfo, GraphCache};
use crate::listener_thread::ListenerThread;
use crate::node::Node;
use crate::qos::QosProfile;
use crate::topic_registry::TopicRegistry;
use crate::transport::{DomainParticipant, Transport};
use crate::user_data::{participant_user_data, TypeHash};
use parking_lot::Mutex;
use std::sync::Arc;

/// Participant-level state shared by every node of a context.
pub(crate) struct ParticipantContext {
    pub(crate) participant: Arc<dyn DomainParticipant>,
    pub(crate) gid: Gid,
    pub(crate) enclave: String,
    pub(crate) graph_cache: Arc<GraphCache>,
    pub(crate) topics: TopicRegistry,
    pub(crate) gossip: Arc<GossipChannel>,
    pub(crate) graph_guard: Arc<GuardCondition>,
    pub(crate) entity_creation: Mutex<()>,
    pub(crate) node_update: Mutex<()>,
    listener_thread: Mutex<Option<ListenerThread>>,
}

impl ParticipantContext {
    fn init(transport: &dyn Transport, options: &ContextOptions) -> Result<Self> {
        let graph_cache = Arc::new(GraphCache::new());
        let listener = Arc::new(DiscoveryListener::new(Arc::clone(&graph_cache)));

        let participant = transport
            .create_participant(
                options.domain_id,
                participant_user_data(&options.enclave),
                listener,
            )
            .map_err(|err| {
                log::error!("[context] failed to create participant: {}", err);
                Error::from(err)
            })?;
        let gid = Gid::from(participant.guid());

        let topics = TopicRegistry::new();
        let gossip = match GossipChannel::create(participant.as_ref(), &topics) {
            Ok(gossip) => Arc::new(gossip),
            Err(err) => {
                if let Err(cleanup) = transport.delete_participant(&participant) {
                    log::warn!("[context] participant cleanup failed: {}", cleanup);
                }
                return Err(err);
            }
        };

        let graph_guard = Arc::new(GuardCondition::new());
        let guard = Arc::clone(&graph_guard);
        graph_cache.set_on_change_callback(move || guard.trigger());
        graph_cache.add_participant(gid, &options.enclave);
        record_gossip_endpoints(&graph_cache, &gossip, gid);

        let listener_thread =
            match ListenerThread::start(Arc::clone(&gossip), Arc::clone(&graph_cache), gid) {
                Ok(thread) => thread,
                Err(err) => {
                    graph_cache.clear_on_change_callback();
                    if let Err(cleanup) = gossip.destroy(participant.as_ref(), &topics) {
                        log::warn!("[context] gossip cleanup failed: {}", cleanup);
                    }
                    if let Err(cleanup) = transport.delete_participant(&participant) {
                        log::warn!("[context] participant cleanup failed: {}", cleanup);
                    }
                    return Err(err);
                }
            };

        log::info!(
            "[context] participant {} up (domain {}, enclave '{}')",
            participant.guid(),
            options.domain_id,
            options.enclave
        );
        Ok(Self {
            participant,
            gid,
            enclave: options.enclave.clone(),
            graph_cache,
            topics,
            gossip,
            graph_guard,
            entity_creation: Mutex::new(()),
            node_update: Mutex::new(()),
            listener_thread: Mutex::new(Some(listener_thread)),
        })
    }

    /// Reverse of [`Self::init`]. Every step runs; the first error wins.
    fn teardown(&self, transport: &dyn Transport) -> Result<()> {
        let mut first_error: Option<Error> = None;

        if let Some(thread) = self.listener_thread.lock().take() {
            if let Err(err) = thread.stop() {
                log::error!("[context] listener thread: {}", err);
                first_error.get_or_insert(err);
            }
        }
        self.graph_cache.clear_on_change_callback();
        self.graph_cache.remove_participant(&self.gid);

        if let Err(err) = self.gossip.destroy(self.participant.as_ref(), &self.topics) {
            first_error.get_or_insert(err);
        }
        if !self.topics.is_empty() {
            log::warn!(
                "[context] {} topic(s) still registered at teardown",
                self.topics.len()
            );
        }
        if let Err(err) = transport.delete_participant(&self.participant) {
            log::error!("[context] failed to delete participant: {}", err);
            first_error.get_or_insert(err.into());
        }

        log::info!("[context] participant {} down", self.participant.guid());
        first_error.map_or(Ok(()), Err)
    }

    /// Publish a snapshot while the caller holds `node_update`.
    pub(crate) fn publish(&self, msg: &crate::graph::ParticipantEntitiesInfo) -> Result<()> {
        self.gossip.publish(msg)
    }
}

/// The transport does not report local endpoints, the gossip pair included.
fn record_gossip_endpoints(graph_cache: &GraphCache, gossip: &GossipChannel, gid: Gid) {
    let entity = |qos| EntityInfo::new(TOPIC_NAME, TYPE_NAME, TypeHash::zero(), gid, qos);
    graph_cache.add_writer(
        Gid::from(gossip.writer().guid()),
        entity(QosProfile::participant_entities_info_writer()),
    );
    graph_cache.add_reader(
        Gid::from(gossip.reader().guid()),
        entity(QosProfile::participant_entities_info_reader()),
    );
}

#[derive(Default)]
struct ContextState {
    ref_count: usize,
    shared: Option<Arc<ParticipantContext>>,
}

struct ContextInner {
    transport: Arc<dyn Transport>,
    options: ContextOptions,
    state: Mutex<ContextState>,
}

/// Entry point: nodes are created from a context.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(transport: Arc<dyn Transport>, options: ContextOptions) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                transport,
                options,
                state: Mutex::new(ContextState::default()),
            }),
        }
    }

    /// Context configured from `ROS_DOMAIN_ID` / `ROS_SECURITY_ENCLAVE`.
    pub fn from_env(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, ContextOptions::from_env())
    }

    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// Number of live nodes holding the participant state.
    pub fn ref_count(&self) -> usize {
        self.inner.state.lock().ref_count
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().shared.is_some()
    }

    /// Gid of the participant, while initialized.
    pub fn participant_gid(&self) -> Option<Gid> {
        self.inner.state.lock().shared.as_ref().map(|s| s.gid)
    }

    /// Graph cache of the participant, while initialized.
    pub fn graph_cache(&self) -> Option<Arc<GraphCache>> {
        self.inner
            .state
            .lock()
            .shared
            .as_ref()
            .map(|s| Arc::clone(&s.graph_cache))
    }

    pub fn create_node(&self, name: &str, namespace: &str) -> Result<Node> {
        Node::create(self.clone(), name, namespace)
    }

    pub(crate) fn acquire(&self) -> Result<Arc<ParticipantContext>> {
        let mut state = self.inner.state.lock();
        if let Some(shared) = &state.shared {
            let shared = Arc::clone(shared);
            state.ref_count += 1;
            return Ok(shared);
        }

        let shared = Arc::new(ParticipantContext::init(
            self.inner.transport.as_ref(),
            &self.inner.options,
        )?);
        state.shared = Some(Arc::clone(&shared));
        state.ref_count = 1;
        Ok(shared)
    }

    pub(crate) fn release(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.ref_count == 0 {
            return Err(Error::InvalidState("context released more often than acquired".into()));
        }
        state.ref_count -= 1;
        if state.ref_count > 0 {
            return Ok(());
        }
        match state.shared.take() {
            Some(shared) => shared.teardown(self.inner.transport.as_ref()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.inner.options)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
