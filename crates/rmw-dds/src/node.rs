// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Nodes and the "mutate cache, then publish" protocol.
//!
//! Every node-scoped change of the graph (node creation/destruction, endpoint
//! association/dissociation) is one cache mutation followed by one gossip
//! publish of the resulting participant snapshot, both under the context's
//! node-update mutex. When the publish fails the mutation is undone before
//! the error is returned.

use crate::context::{Context, ParticipantContext};
use crate::error::{Error, Result};
use crate::gid::Gid;
use crate::graph::{EntityInfo, ParticipantEntitiesInfo};
use crate::qos::QosProfile;
use crate::transport::{DataReader, DataWriter, TopicRef};
use crate::user_data::{endpoint_user_data, TypeHash};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Transport entity backing one side of an endpoint.
pub(crate) enum Entity {
    Writer(Arc<dyn DataWriter>),
    Reader(Arc<dyn DataReader>),
}

impl Entity {
    pub(crate) fn gid(&self) -> Gid {
        match self {
            Self::Writer(writer) => Gid::from(writer.guid()),
            Self::Reader(reader) => Gid::from(reader.guid()),
        }
    }

    fn is_reader(&self) -> bool {
        matches!(self, Self::Reader(_))
    }
}

/// An entity together with the topic reference it holds.
pub(crate) struct Attached {
    pub(crate) topic: TopicRef,
    pub(crate) entity: Entity,
}

pub(crate) struct NodeInner {
    context: Context,
    pub(crate) shared: Arc<ParticipantContext>,
    name: String,
    namespace: String,
    endpoints: AtomicUsize,
    destroyed: AtomicBool,
}

impl NodeInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create the transport entity on `topic_name` and record it in the local
    /// cache. Runs under the entity-creation mutex only.
    pub(crate) fn create_entity(
        &self,
        topic_name: &str,
        type_name: &str,
        qos: &QosProfile,
        type_hash: &TypeHash,
        is_reader: bool,
    ) -> Result<Attached> {
        let shared = &self.shared;
        let participant = shared.participant.as_ref();
        let _creation = shared.entity_creation.lock();

        shared.topics.check_topic_type(topic_name, type_name)?;
        let topic = shared
            .topics
            .find_or_create_topic(participant, topic_name, type_name, qos, None)?;

        let user_data = endpoint_user_data(type_hash);
        let created = if is_reader {
            participant
                .create_reader(&topic, qos, user_data, false)
                .map(Entity::Reader)
        } else {
            participant.create_writer(&topic, qos, user_data).map(Entity::Writer)
        };
        let entity = match created {
            Ok(entity) => entity,
            Err(err) => {
                log::error!(
                    "[context] failed to create {} on '{}': {}",
                    if is_reader { "reader" } else { "writer" },
                    topic_name,
                    err
                );
                if let Err(cleanup) = shared.topics.delete_topic(participant, &topic, None) {
                    log::warn!("[context] cleanup of topic '{}' failed: {}", topic_name, cleanup);
                }
                return Err(err.into());
            }
        };

        // The transport does not report our own endpoints back to us.
        let info = EntityInfo::new(topic_name, type_name, *type_hash, shared.gid, qos.clone());
        shared.graph_cache.add_entity(entity.gid(), info, is_reader);
        Ok(Attached { topic, entity })
    }

    /// Remove the entity from the cache, delete it and release its topic.
    pub(crate) fn delete_entity(&self, attached: &Attached) -> Result<()> {
        let shared = &self.shared;
        let participant = shared.participant.as_ref();
        let _creation = shared.entity_creation.lock();

        let mut first_error: Option<Error> = None;
        shared
            .graph_cache
            .remove_entity(&attached.entity.gid(), attached.entity.is_reader());
        let deleted = match &attached.entity {
            Entity::Writer(writer) => participant.delete_writer(writer),
            Entity::Reader(reader) => participant.delete_reader(reader),
        };
        if let Err(err) = deleted {
            log::warn!("[context] failed to delete {}: {}", attached.entity.gid().guid(), err);
            first_error.get_or_insert(err.into());
        }
        if let Err(err) = shared.topics.delete_topic(participant, &attached.topic, None) {
            first_error.get_or_insert(err);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn associate(&self, entity: &Entity, associate: bool) -> ParticipantEntitiesInfo {
        let cache = &self.shared.graph_cache;
        let gid = entity.gid();
        let participant_gid = &self.shared.gid;
        match (entity.is_reader(), associate) {
            (true, true) => {
                cache.associate_reader(&gid, participant_gid, &self.name, &self.namespace)
            }
            (true, false) => {
                cache.dissociate_reader(&gid, participant_gid, &self.name, &self.namespace)
            }
            (false, true) => {
                cache.associate_writer(&gid, participant_gid, &self.name, &self.namespace)
            }
            (false, false) => {
                cache.dissociate_writer(&gid, participant_gid, &self.name, &self.namespace)
            }
        }
    }

    /// Associate `entities` with this node and publish one snapshot.
    /// On publish failure the associations are undone.
    pub(crate) fn announce(&self, entities: &[&Attached]) -> Result<()> {
        let _update = self.shared.node_update.lock();
        let mut msg = None;
        for attached in entities {
            msg = Some(self.associate(&attached.entity, true));
        }
        let Some(msg) = msg else {
            return Ok(());
        };
        if let Err(err) = self.shared.publish(&msg) {
            log::error!(
                "[context] rolling back association with {}: {}",
                self.fqn(),
                err
            );
            for attached in entities {
                self.associate(&attached.entity, false);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Dissociate `entities` from this node and publish one snapshot.
    pub(crate) fn withdraw(&self, entities: &[&Attached]) -> Result<()> {
        let _update = self.shared.node_update.lock();
        let mut msg = None;
        for attached in entities {
            msg = Some(self.associate(&attached.entity, false));
        }
        match msg {
            Some(msg) => self.shared.publish(&msg),
            None => Ok(()),
        }
    }

    pub(crate) fn endpoint_created(&self) {
        self.endpoints.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn endpoint_destroyed(&self) {
        self.endpoints.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn fqn(&self) -> String {
        crate::graph::node_fqn(&self.namespace, &self.name)
    }

    fn shutdown(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let live = self.endpoints.load(Ordering::Acquire);
        if live > 0 {
            log::warn!("[context] destroying node {} with {} live endpoint(s)", self.fqn(), live);
        }

        let mut first_error: Option<Error> = None;
        {
            let _update = self.shared.node_update.lock();
            let msg = self
                .shared
                .graph_cache
                .remove_node(&self.shared.gid, &self.name, &self.namespace);
            if let Err(err) = self.shared.publish(&msg) {
                log::error!("[context] failed to announce removal of {}: {}", self.fqn(), err);
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.context.release() {
            first_error.get_or_insert(err);
        }
        log::debug!("[context] node {} destroyed", self.fqn());
        first_error.map_or(Ok(()), Err)
    }
}

fn validate_node_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("node name is empty".into()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        || name.starts_with(|c: char| c.is_ascii_digit())
    {
        return Err(Error::InvalidArgument(format!("invalid node name '{}'", name)));
    }
    Ok(())
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if !namespace.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "namespace '{}' is not absolute",
            namespace
        )));
    }
    if namespace.len() > 1 && namespace.ends_with('/') {
        return Err(Error::InvalidArgument(format!(
            "namespace '{}' has a trailing '/'",
            namespace
        )));
    }
    Ok(())
}

/// A named, namespaced node announced to the whole domain.
///
/// Dropping a node destroys it; use [`Node::destroy`] to observe errors.
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

impl Node {
    pub(crate) fn create(context: Context, name: &str, namespace: &str) -> Result<Self> {
        validate_node_name(name)?;
        validate_namespace(namespace)?;

        let shared = context.acquire()?;
        {
            let update = shared.node_update.lock();
            let msg = shared.graph_cache.add_node(&shared.gid, name, namespace);
            if let Err(err) = shared.publish(&msg) {
                log::error!(
                    "[context] rolling back node {}: {}",
                    crate::graph::node_fqn(namespace, name),
                    err
                );
                shared.graph_cache.remove_node(&shared.gid, name, namespace);
                drop(update);
                if let Err(release) = context.release() {
                    log::warn!("[context] release after failed node creation: {}", release);
                }
                return Err(err);
            }
        }

        log::debug!("[context] node {} created", crate::graph::node_fqn(namespace, name));
        Ok(Self {
            inner: Arc::new(NodeInner {
                context,
                shared,
                name: name.to_string(),
                namespace: namespace.to_string(),
                endpoints: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Gid of the participant hosting this node.
    pub fn participant_gid(&self) -> Gid {
        self.inner.shared.gid
    }

    pub fn enclave(&self) -> &str {
        &self.inner.shared.enclave
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Number of publishers, subscriptions, services and clients alive.
    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.load(Ordering::Acquire)
    }

    /// Remove the node from the graph and release the context.
    ///
    /// Every step runs even when an earlier one failed; the first error is
    /// returned.
    pub fn destroy(self) -> Result<()> {
        self.inner.shutdown()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(err) = self.inner.shutdown() {
            log::error!("[context] node drop: {}", err);
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.name)
            .field("namespace", &self.inner.namespace)
            .field("participant", &self.inner.shared.gid)
            .finish()
    }
}
