// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Out-of-band metadata carried in DDS user data.
//!
//! Participants announce `enclave=<name>;`, endpoints announce
//! `typehash=RIHS01_<64 hex digits>;`. Decoding is fallible; callers on the
//! discovery path degrade to defaults instead of propagating the error.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const ENCLAVE_KEY: &str = "enclave";
pub const TYPE_HASH_KEY: &str = "typehash";

/// Size of the hash value stored in [`TypeHash`].
pub const TYPE_HASH_SIZE: usize = 32;

const TYPE_HASH_PREFIX: &str = "RIHS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("user data is not valid UTF-8")]
    InvalidUtf8,
    #[error("user data has no '{0}' key")]
    MissingKey(&'static str),
    #[error("invalid type hash '{0}'")]
    InvalidTypeHash(String),
}

/// Parse a `key=value;key=value;` blob.
///
/// Segments without `=` are skipped. Later duplicates win.
pub fn parse_key_value(user_data: &[u8]) -> Result<BTreeMap<String, String>, MetadataError> {
    let text = std::str::from_utf8(user_data).map_err(|_| MetadataError::InvalidUtf8)?;
    let mut map = BTreeMap::new();
    for segment in text.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Encode pairs as a `key=value;` blob.
pub fn encode_key_value<'a, I>(pairs: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push(';');
    }
    out.into_bytes()
}

/// User data announced by a participant.
pub fn participant_user_data(enclave: &str) -> Vec<u8> {
    encode_key_value([(ENCLAVE_KEY, enclave)])
}

/// Extract the enclave a participant announced.
pub fn parse_enclave(user_data: &[u8]) -> Result<String, MetadataError> {
    parse_key_value(user_data)?
        .remove(ENCLAVE_KEY)
        .ok_or(MetadataError::MissingKey(ENCLAVE_KEY))
}

/// Versioned type hash (`RIHS<version>_<hex>`). Version 0 means unset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeHash {
    pub version: u8,
    pub value: [u8; TYPE_HASH_SIZE],
}

impl TypeHash {
    pub const fn zero() -> Self {
        Self {
            version: 0,
            value: [0; TYPE_HASH_SIZE],
        }
    }

    pub fn new(version: u8, value: [u8; TYPE_HASH_SIZE]) -> Self {
        Self { version, value }
    }

    pub fn is_unset(&self) -> bool {
        self.version == 0
    }

    /// Parse the `RIHS01_<hex>` string form.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let invalid = || MetadataError::InvalidTypeHash(text.to_string());

        let rest = text.strip_prefix(TYPE_HASH_PREFIX).ok_or_else(invalid)?;
        let (version, hex) = rest.split_once('_').ok_or_else(invalid)?;
        if version.len() != 2 || hex.len() != TYPE_HASH_SIZE * 2 {
            return Err(invalid());
        }
        // from_str_radix tolerates a leading sign
        if !version.bytes().all(|b| b.is_ascii_digit())
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid());
        }
        let version = u8::from_str_radix(version, 10).map_err(|_| invalid())?;
        if version == 0 {
            return Err(invalid());
        }

        let mut value = [0u8; TYPE_HASH_SIZE];
        for (idx, byte) in value.iter_mut().enumerate() {
            let pair = hex.get(idx * 2..idx * 2 + 2).ok_or_else(invalid)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self { version, value })
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}_", TYPE_HASH_PREFIX, self.version)?;
        for byte in &self.value {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            write!(f, "TypeHash(unset)")
        } else {
            write!(f, "TypeHash({})", self)
        }
    }
}

/// User data announced by a reader or writer. Unset hashes are omitted.
pub fn endpoint_user_data(type_hash: &TypeHash) -> Vec<u8> {
    if type_hash.is_unset() {
        return Vec::new();
    }
    let encoded = type_hash.to_string();
    encode_key_value([(TYPE_HASH_KEY, encoded.as_str())])
}

/// Extract the type hash an endpoint announced.
///
/// Missing key yields the zero hash; a present but malformed value is an error.
pub fn parse_type_hash(user_data: &[u8]) -> Result<TypeHash, MetadataError> {
    match parse_key_value(user_data)?.get(TYPE_HASH_KEY) {
        Some(text) => TypeHash::parse(text),
        None => Ok(TypeHash::zero()),
    }
}
