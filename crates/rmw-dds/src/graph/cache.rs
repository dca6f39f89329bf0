// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::message::{NodeEntitiesInfo, ParticipantEntitiesInfo};
use crate::error::{Error, Result};
use crate::gid::Gid;
use crate::names::DemangleFn;
use crate::qos::QosProfile;
use crate::user_data::TypeHash;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Reported for endpoints no node has claimed (yet).
pub const NODE_NAME_UNKNOWN: &str = "_NODE_NAME_UNKNOWN_";
pub const NODE_NAMESPACE_UNKNOWN: &str = "_NODE_NAMESPACE_UNKNOWN_";

/// Topic (or service) name -> set of type names.
pub type NamesAndTypes = BTreeMap<String, BTreeSet<String>>;

type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// Discovery-sourced record of a reader or writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    pub topic_name: String,
    pub topic_type: String,
    pub topic_type_hash: TypeHash,
    pub participant_gid: Gid,
    pub qos: QosProfile,
}

impl EntityInfo {
    pub fn new(
        topic_name: &str,
        topic_type: &str,
        topic_type_hash: TypeHash,
        participant_gid: Gid,
        qos: QosProfile,
    ) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            topic_type: topic_type.to_string(),
            topic_type_hash,
            participant_gid,
            qos,
        }
    }
}

/// Participant record: enclave plus the node snapshot last applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub enclave: String,
    pub nodes: Vec<NodeEntitiesInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointType {
    Publisher,
    Subscription,
}

/// Endpoint as reported by `get_*_info_by_topic`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicEndpointInfo {
    pub node_name: String,
    pub node_namespace: String,
    pub topic_type: String,
    pub topic_type_hash: TypeHash,
    pub endpoint_type: EndpointType,
    pub endpoint_gid: Gid,
    pub qos: QosProfile,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeName {
    pub name: String,
    pub namespace: String,
    pub enclave: String,
}

#[derive(Default)]
struct GraphState {
    participants: BTreeMap<Gid, ParticipantInfo>,
    readers: BTreeMap<Gid, EntityInfo>,
    writers: BTreeMap<Gid, EntityInfo>,
}

impl GraphState {
    fn endpoints(&self, is_reader: bool) -> &BTreeMap<Gid, EntityInfo> {
        if is_reader {
            &self.readers
        } else {
            &self.writers
        }
    }

    fn endpoints_mut(&mut self, is_reader: bool) -> &mut BTreeMap<Gid, EntityInfo> {
        if is_reader {
            &mut self.readers
        } else {
            &mut self.writers
        }
    }

    fn snapshot(&self, participant_gid: &Gid) -> ParticipantEntitiesInfo {
        ParticipantEntitiesInfo {
            gid: *participant_gid,
            node_entities_info_seq: self
                .participants
                .get(participant_gid)
                .map(|p| p.nodes.clone())
                .unwrap_or_default(),
        }
    }

    /// First node, across every participant, with this name and namespace.
    fn find_node(&self, node_name: &str, node_namespace: &str) -> Option<&NodeEntitiesInfo> {
        self.participants
            .values()
            .flat_map(|p| p.nodes.iter())
            .find(|node| node.matches(node_name, node_namespace))
    }

    /// Node of `participant_gid` claiming `gid`.
    fn owner_of(
        &self,
        participant_gid: &Gid,
        gid: &Gid,
        is_reader: bool,
    ) -> Option<&NodeEntitiesInfo> {
        self.participants.get(participant_gid)?.nodes.iter().find(|node| {
            let gids = if is_reader {
                &node.reader_gids
            } else {
                &node.writer_gids
            };
            gids.contains(gid)
        })
    }
}

/// Concurrent index of the ROS graph.
///
/// Endpoint records come from discovery; node associations come from local
/// node operations and remote gossip. Both are merged at query time.
///
/// Mutators that change the local participant's snapshot return the
/// [`ParticipantEntitiesInfo`] the caller must publish. The registered
/// change callback runs after the internal lock is released.
pub struct GraphCache {
    state: RwLock<GraphState>,
    on_change: ArcSwapOption<ChangeCallback>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            on_change: ArcSwapOption::empty(),
        }
    }

    /// Register the single change callback, replacing any previous one.
    pub fn set_on_change_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: ChangeCallback = Box::new(callback);
        self.on_change.store(Some(Arc::new(callback)));
    }

    pub fn clear_on_change_callback(&self) {
        self.on_change.store(None);
    }

    fn notify(&self) {
        if let Some(callback) = self.on_change.load_full() {
            callback();
        }
    }

    // ---------------------------------------------------------------------
    // Endpoints (discovery)
    // ---------------------------------------------------------------------

    /// Returns whether the record was inserted.
    pub fn add_entity(&self, gid: Gid, info: EntityInfo, is_reader: bool) -> bool {
        let inserted = {
            let mut state = self.state.write();
            let endpoints = state.endpoints_mut(is_reader);
            if endpoints.contains_key(&gid) {
                false
            } else {
                log::debug!(
                    "[graph] add {} {} on '{}' ({})",
                    endpoint_kind(is_reader),
                    gid.guid(),
                    info.topic_name,
                    info.topic_type
                );
                endpoints.insert(gid, info);
                true
            }
        };
        if inserted {
            self.notify();
        }
        inserted
    }

    pub fn add_writer(&self, gid: Gid, info: EntityInfo) -> bool {
        self.add_entity(gid, info, false)
    }

    pub fn add_reader(&self, gid: Gid, info: EntityInfo) -> bool {
        self.add_entity(gid, info, true)
    }

    /// Returns whether a record was removed.
    pub fn remove_entity(&self, gid: &Gid, is_reader: bool) -> bool {
        let removed = self.state.write().endpoints_mut(is_reader).remove(gid).is_some();
        if removed {
            log::debug!("[graph] remove {} {}", endpoint_kind(is_reader), gid.guid());
            self.notify();
        }
        removed
    }

    pub fn remove_writer(&self, gid: &Gid) -> bool {
        self.remove_entity(gid, false)
    }

    pub fn remove_reader(&self, gid: &Gid) -> bool {
        self.remove_entity(gid, true)
    }

    // ---------------------------------------------------------------------
    // Participants and nodes
    // ---------------------------------------------------------------------

    /// Add a participant, or fill in the enclave of one created implicitly
    /// by an earlier gossip message. Known nodes are kept.
    pub fn add_participant(&self, participant_gid: Gid, enclave: &str) {
        let changed = {
            let mut state = self.state.write();
            let is_new = !state.participants.contains_key(&participant_gid);
            let entry = state.participants.entry(participant_gid).or_default();
            let changed = is_new || entry.enclave != enclave;
            entry.enclave = enclave.to_string();
            changed
        };
        log::debug!("[graph] add participant {} enclave '{}'", participant_gid.guid(), enclave);
        if changed {
            self.notify();
        }
    }

    pub fn remove_participant(&self, participant_gid: &Gid) -> bool {
        let removed = self.state.write().participants.remove(participant_gid).is_some();
        if removed {
            log::debug!("[graph] remove participant {}", participant_gid.guid());
            self.notify();
        }
        removed
    }

    pub fn add_node(
        &self,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        let msg = {
            let mut state = self.state.write();
            state
                .participants
                .entry(*participant_gid)
                .or_default()
                .nodes
                .push(NodeEntitiesInfo::new(node_name, node_namespace));
            state.snapshot(participant_gid)
        };
        log::debug!(
            "[graph] add node {} on {}",
            node_fqn(node_namespace, node_name),
            participant_gid.guid()
        );
        self.notify();
        msg
    }

    pub fn remove_node(
        &self,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        let (msg, removed) = {
            let mut state = self.state.write();
            let removed = match state.participants.get_mut(participant_gid) {
                Some(participant) => {
                    let before = participant.nodes.len();
                    if let Some(pos) = participant
                        .nodes
                        .iter()
                        .position(|node| node.matches(node_name, node_namespace))
                    {
                        participant.nodes.remove(pos);
                    }
                    participant.nodes.len() != before
                }
                None => false,
            };
            (state.snapshot(participant_gid), removed)
        };
        if removed {
            log::debug!("[graph] remove node {}", node_fqn(node_namespace, node_name));
            self.notify();
        } else {
            log::warn!(
                "[graph] remove_node: {} not found on {}",
                node_fqn(node_namespace, node_name),
                participant_gid.guid()
            );
        }
        msg
    }

    fn modify_association(
        &self,
        gid: &Gid,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
        is_reader: bool,
        associate: bool,
    ) -> ParticipantEntitiesInfo {
        let (msg, changed) = {
            let mut state = self.state.write();
            let node = state
                .participants
                .get_mut(participant_gid)
                .and_then(|p| p.nodes.iter_mut().find(|n| n.matches(node_name, node_namespace)));
            let changed = match node {
                Some(node) => {
                    let gids = if is_reader {
                        &mut node.reader_gids
                    } else {
                        &mut node.writer_gids
                    };
                    if associate {
                        if gids.contains(gid) {
                            false
                        } else {
                            gids.push(*gid);
                            true
                        }
                    } else {
                        let before = gids.len();
                        gids.retain(|g| g != gid);
                        gids.len() != before
                    }
                }
                None => {
                    log::warn!(
                        "[graph] {} {}: node {} unknown on {}",
                        if associate { "associate" } else { "dissociate" },
                        endpoint_kind(is_reader),
                        node_fqn(node_namespace, node_name),
                        participant_gid.guid()
                    );
                    false
                }
            };
            (state.snapshot(participant_gid), changed)
        };
        if changed {
            log::debug!(
                "[graph] {} {} {} with {}",
                if associate { "associate" } else { "dissociate" },
                endpoint_kind(is_reader),
                gid.guid(),
                node_fqn(node_namespace, node_name)
            );
            self.notify();
        }
        msg
    }

    pub fn associate_writer(
        &self,
        writer_gid: &Gid,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        self.modify_association(writer_gid, participant_gid, node_name, node_namespace, false, true)
    }

    pub fn dissociate_writer(
        &self,
        writer_gid: &Gid,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        self.modify_association(
            writer_gid,
            participant_gid,
            node_name,
            node_namespace,
            false,
            false,
        )
    }

    pub fn associate_reader(
        &self,
        reader_gid: &Gid,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        self.modify_association(reader_gid, participant_gid, node_name, node_namespace, true, true)
    }

    pub fn dissociate_reader(
        &self,
        reader_gid: &Gid,
        participant_gid: &Gid,
        node_name: &str,
        node_namespace: &str,
    ) -> ParticipantEntitiesInfo {
        self.modify_association(reader_gid, participant_gid, node_name, node_namespace, true, false)
    }

    /// Replace the node set of `msg.gid` with the snapshot it carries.
    pub fn update_participant_entities(&self, msg: &ParticipantEntitiesInfo) {
        {
            let mut state = self.state.write();
            let participant = state.participants.entry(msg.gid).or_default();
            participant.nodes = msg.node_entities_info_seq.clone();
        }
        log::debug!(
            "[graph] participant {} now has {} node(s)",
            msg.gid.guid(),
            msg.node_entities_info_seq.len()
        );
        self.notify();
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get_writer_count(&self, topic_name: &str) -> usize {
        count_on_topic(&self.state.read().writers, topic_name)
    }

    pub fn get_reader_count(&self, topic_name: &str) -> usize {
        count_on_topic(&self.state.read().readers, topic_name)
    }

    /// Every topic known to the cache with its types, filtered and renamed
    /// by the demangle functions.
    pub fn get_names_and_types(
        &self,
        demangle_topic: DemangleFn,
        demangle_type: DemangleFn,
    ) -> NamesAndTypes {
        let state = self.state.read();
        let mut out = NamesAndTypes::new();
        for info in state.readers.values().chain(state.writers.values()) {
            insert_demangled(&mut out, info, demangle_topic, demangle_type);
        }
        out
    }

    fn names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
        demangle_topic: DemangleFn,
        demangle_type: DemangleFn,
        is_reader: bool,
    ) -> Result<NamesAndTypes> {
        let state = self.state.read();
        let node = state
            .find_node(node_name, node_namespace)
            .ok_or_else(|| Error::NodeNameNonExistent {
                name: node_name.to_string(),
                namespace: node_namespace.to_string(),
            })?;
        let gids = if is_reader {
            &node.reader_gids
        } else {
            &node.writer_gids
        };

        let endpoints = state.endpoints(is_reader);
        let mut out = NamesAndTypes::new();
        for info in gids.iter().filter_map(|gid| endpoints.get(gid)) {
            insert_demangled(&mut out, info, demangle_topic, demangle_type);
        }
        Ok(out)
    }

    pub fn get_writer_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
        demangle_topic: DemangleFn,
        demangle_type: DemangleFn,
    ) -> Result<NamesAndTypes> {
        self.names_and_types_by_node(
            node_name,
            node_namespace,
            demangle_topic,
            demangle_type,
            false,
        )
    }

    pub fn get_reader_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
        demangle_topic: DemangleFn,
        demangle_type: DemangleFn,
    ) -> Result<NamesAndTypes> {
        self.names_and_types_by_node(node_name, node_namespace, demangle_topic, demangle_type, true)
    }

    fn info_by_topic(
        &self,
        topic_name: &str,
        demangle_type: DemangleFn,
        is_reader: bool,
    ) -> Vec<TopicEndpointInfo> {
        let state = self.state.read();
        let endpoint_type = if is_reader {
            EndpointType::Subscription
        } else {
            EndpointType::Publisher
        };

        state
            .endpoints(is_reader)
            .iter()
            .filter(|(_, info)| info.topic_name == topic_name)
            .filter_map(|(gid, info)| {
                let topic_type = demangle_type(&info.topic_type)?;
                let owner = state.owner_of(&info.participant_gid, gid, is_reader);
                let (node_name, node_namespace) = match owner {
                    Some(node) => (node.node_name.clone(), node.node_namespace.clone()),
                    None => (NODE_NAME_UNKNOWN.to_string(), NODE_NAMESPACE_UNKNOWN.to_string()),
                };
                Some(TopicEndpointInfo {
                    node_name,
                    node_namespace,
                    topic_type,
                    topic_type_hash: info.topic_type_hash,
                    endpoint_type,
                    endpoint_gid: *gid,
                    qos: info.qos.clone(),
                })
            })
            .collect()
    }

    pub fn get_writers_info_by_topic(
        &self,
        topic_name: &str,
        demangle_type: DemangleFn,
    ) -> Vec<TopicEndpointInfo> {
        self.info_by_topic(topic_name, demangle_type, false)
    }

    pub fn get_readers_info_by_topic(
        &self,
        topic_name: &str,
        demangle_type: DemangleFn,
    ) -> Vec<TopicEndpointInfo> {
        self.info_by_topic(topic_name, demangle_type, true)
    }

    pub fn get_number_of_nodes(&self) -> usize {
        self.state
            .read()
            .participants
            .values()
            .map(|p| p.nodes.len())
            .sum()
    }

    pub fn get_node_names(&self) -> Vec<NodeName> {
        let state = self.state.read();
        state
            .participants
            .values()
            .flat_map(|p| {
                p.nodes.iter().map(|node| NodeName {
                    name: node.node_name.clone(),
                    namespace: node.node_namespace.clone(),
                    enclave: p.enclave.clone(),
                })
            })
            .collect()
    }

    /// Copy of the participant table (gid -> record).
    pub fn participants(&self) -> BTreeMap<Gid, ParticipantInfo> {
        self.state.read().participants.clone()
    }

    pub fn participant(&self, participant_gid: &Gid) -> Option<ParticipantInfo> {
        self.state.read().participants.get(participant_gid).cloned()
    }

    pub fn writer(&self, gid: &Gid) -> Option<EntityInfo> {
        self.state.read().writers.get(gid).cloned()
    }

    pub fn reader(&self, gid: &Gid) -> Option<EntityInfo> {
        self.state.read().readers.get(gid).cloned()
    }

    /// Whether `gid` is claimed by a node of `participant_gid`.
    pub fn is_associated(&self, gid: &Gid, participant_gid: &Gid, is_reader: bool) -> bool {
        self.state.read().owner_of(participant_gid, gid, is_reader).is_some()
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        writeln!(f, "---------------------------------")?;
        writeln!(f, "Graph cache:")?;
        writeln!(f, "  Discovered data writers:")?;
        for (gid, info) in &state.writers {
            writeln!(
                f,
                "    gid: '{}', topic name: '{}', topic_type: '{}'",
                gid, info.topic_name, info.topic_type
            )?;
        }
        writeln!(f, "  Discovered data readers:")?;
        for (gid, info) in &state.readers {
            writeln!(
                f,
                "    gid: '{}', topic name: '{}', topic_type: '{}'",
                gid, info.topic_name, info.topic_type
            )?;
        }
        writeln!(f, "  Discovered participants:")?;
        for (gid, participant) in &state.participants {
            writeln!(f, "    gid: '{}', enclave: '{}'", gid, participant.enclave)?;
            for node in &participant.nodes {
                writeln!(
                    f,
                    "      node name: '{}', node namespace: '{}'",
                    node.node_name, node.node_namespace
                )?;
                for reader in &node.reader_gids {
                    writeln!(f, "        reader gid: '{}'", reader)?;
                }
                for writer in &node.writer_gids {
                    writeln!(f, "        writer gid: '{}'", writer)?;
                }
            }
        }
        write!(f, "---------------------------------")
    }
}

fn count_on_topic(endpoints: &BTreeMap<Gid, EntityInfo>, topic_name: &str) -> usize {
    endpoints
        .values()
        .filter(|info| info.topic_name == topic_name)
        .count()
}

fn insert_demangled(
    out: &mut NamesAndTypes,
    info: &EntityInfo,
    demangle_topic: DemangleFn,
    demangle_type: DemangleFn,
) {
    let Some(topic) = demangle_topic(&info.topic_name) else {
        return;
    };
    let Some(type_name) = demangle_type(&info.topic_type) else {
        return;
    };
    out.entry(topic).or_default().insert(type_name);
}

fn endpoint_kind(is_reader: bool) -> &'static str {
    if is_reader {
        "reader"
    } else {
        "writer"
    }
}

pub(crate) fn node_fqn(namespace: &str, name: &str) -> String {
    if namespace.ends_with('/') {
        format!("{}{}", namespace, name)
    } else {
        format!("{}/{}", namespace, name)
    }
}
