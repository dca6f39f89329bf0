// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `ParticipantEntitiesInfo` gossip message and its CDR encoding.
//!
//! Each message is a full snapshot of one participant's nodes and the
//! reader/writer gids associated with them.

use crate::gid::{Gid, GID_STORAGE_SIZE};
use crate::ser::{CdrReader, CdrWriter, SerResult};

/// Well-known topic carrying the gossip messages.
pub const TOPIC_NAME: &str = "ros_discovery_info";

/// DDS type name of [`ParticipantEntitiesInfo`].
pub const TYPE_NAME: &str = "rmw_dds_common::msg::dds_::ParticipantEntitiesInfo_";

/// Smallest encoded node entry: two empty strings and two empty sequences.
const MIN_NODE_ENTRY_SIZE: usize = 4 * 4;

/// Node record: name, namespace and associated endpoint gids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeEntitiesInfo {
    pub node_namespace: String,
    pub node_name: String,
    pub reader_gids: Vec<Gid>,
    pub writer_gids: Vec<Gid>,
}

impl NodeEntitiesInfo {
    pub fn new(node_name: &str, node_namespace: &str) -> Self {
        Self {
            node_namespace: node_namespace.to_string(),
            node_name: node_name.to_string(),
            reader_gids: Vec::new(),
            writer_gids: Vec::new(),
        }
    }

    pub fn matches(&self, node_name: &str, node_namespace: &str) -> bool {
        self.node_name == node_name && self.node_namespace == node_namespace
    }
}

/// Snapshot of every node of one participant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantEntitiesInfo {
    pub gid: Gid,
    pub node_entities_info_seq: Vec<NodeEntitiesInfo>,
}

impl ParticipantEntitiesInfo {
    pub fn encode(&self) -> SerResult<Vec<u8>> {
        let mut writer = CdrWriter::new();
        writer.write_bytes(self.gid.as_bytes());
        writer.write_len(self.node_entities_info_seq.len())?;
        for node in &self.node_entities_info_seq {
            writer.write_string(&node.node_namespace)?;
            writer.write_string(&node.node_name)?;
            write_gid_seq(&mut writer, &node.reader_gids)?;
            write_gid_seq(&mut writer, &node.writer_gids)?;
        }
        Ok(writer.finish())
    }

    pub fn decode(buffer: &[u8]) -> SerResult<Self> {
        let mut reader = CdrReader::new(buffer)?;
        let gid = read_gid(&mut reader)?;
        let count = reader.read_len(MIN_NODE_ENTRY_SIZE)?;
        let mut node_entities_info_seq = Vec::with_capacity(count);
        for _ in 0..count {
            let node_namespace = reader.read_string()?;
            let node_name = reader.read_string()?;
            let reader_gids = read_gid_seq(&mut reader)?;
            let writer_gids = read_gid_seq(&mut reader)?;
            node_entities_info_seq.push(NodeEntitiesInfo {
                node_namespace,
                node_name,
                reader_gids,
                writer_gids,
            });
        }
        Ok(Self {
            gid,
            node_entities_info_seq,
        })
    }
}

fn write_gid_seq(writer: &mut CdrWriter, gids: &[Gid]) -> SerResult<()> {
    writer.write_len(gids.len())?;
    for gid in gids {
        writer.write_bytes(gid.as_bytes());
    }
    Ok(())
}

fn read_gid(reader: &mut CdrReader<'_>) -> SerResult<Gid> {
    let mut data = [0u8; GID_STORAGE_SIZE];
    data.copy_from_slice(reader.read_bytes(GID_STORAGE_SIZE)?);
    Ok(Gid::from_raw(data))
}

fn read_gid_seq(reader: &mut CdrReader<'_>) -> SerResult<Vec<Gid>> {
    let count = reader.read_len(GID_STORAGE_SIZE)?;
    (0..count).map(|_| read_gid(reader)).collect()
}
