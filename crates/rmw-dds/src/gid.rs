// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport GUIDs and the fixed-size graph identifiers derived from them.

use std::fmt;

/// Number of bytes stored in a [`Gid`].
pub const GID_STORAGE_SIZE: usize = 24;

/// Entity id of the participant itself (RTPS `ENTITYID_PARTICIPANT`).
pub const ENTITYID_PARTICIPANT: [u8; 4] = [0x00, 0x00, 0x01, 0xC1];

/// Transport-native 16-byte GUID.
///
/// # Structure
/// - Prefix: 12 bytes (participant unique)
/// - Entity ID: 4 bytes (entity within participant)
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

impl Guid {
    pub fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; 12];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self { prefix, entity_id }
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id);
        bytes
    }

    /// GUID of the participant owning this entity.
    pub fn participant(&self) -> Self {
        Self::new(self.prefix, ENTITYID_PARTICIPANT)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        for (i, byte) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        for byte in &self.entity_id {
            write!(f, ".{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// Graph identifier: the GUID copied into fixed storage, zero padded.
///
/// Equality, ordering and hashing depend on the bytes only, so two gids
/// built from the same GUID in different processes compare equal.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct Gid([u8; GID_STORAGE_SIZE]);

impl Gid {
    pub const fn from_raw(data: [u8; GID_STORAGE_SIZE]) -> Self {
        Self(data)
    }

    pub fn from_guid(guid: &Guid) -> Self {
        let mut data = [0u8; GID_STORAGE_SIZE];
        data[..16].copy_from_slice(&guid.as_bytes());
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; GID_STORAGE_SIZE] {
        &self.0
    }

    /// Recover the GUID held in the first 16 bytes.
    pub fn guid(&self) -> Guid {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.0[..16]);
        Guid::from_bytes(bytes)
    }
}

impl From<Guid> for Gid {
    fn from(guid: Guid) -> Self {
        Self::from_guid(&guid)
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gid({})", self.guid())
    }
}
