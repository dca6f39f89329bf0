// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Little-endian CDR cursors used for graph messages.
//!
//! Alignment is relative to the start of the body, i.e. after the 4-byte
//! encapsulation header.

use thiserror::Error;

/// Encapsulation header for plain little-endian CDR.
pub const CDR_LE_HEADER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerError {
    #[error("read failed at offset {offset}: {reason}")]
    ReadFailed { offset: usize, reason: String },
    #[error("invalid data: {reason}")]
    InvalidData { reason: String },
}

pub type SerResult<T> = core::result::Result<T, SerError>;

/// Generate read methods for primitive types.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> SerResult<$type> {
            self.align($size)?;
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Growable writer producing an encapsulated CDR buffer.
pub struct CdrWriter {
    buffer: Vec<u8>,
}

impl CdrWriter {
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(128);
        buffer.extend_from_slice(&CDR_LE_HEADER);
        Self { buffer }
    }

    fn body_len(&self) -> usize {
        self.buffer.len() - CDR_LE_HEADER.len()
    }

    pub fn align(&mut self, alignment: usize) {
        if alignment <= 1 {
            return;
        }
        let padding = (alignment - self.body_len() % alignment) % alignment;
        self.buffer.resize(self.buffer.len() + padding, 0);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.align(4);
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Sequence/string lengths are `u32` on the wire.
    pub fn write_len(&mut self, len: usize) -> SerResult<()> {
        let len = u32::try_from(len).map_err(|_| SerError::InvalidData {
            reason: format!("length {} exceeds u32", len),
        })?;
        self.write_u32_le(len);
        Ok(())
    }

    /// CDR string: length including the NUL terminator, bytes, NUL.
    pub fn write_string(&mut self, value: &str) -> SerResult<()> {
        self.write_len(value.len() + 1)?;
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for CdrWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked reader over an encapsulated CDR buffer.
pub struct CdrReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> CdrReader<'a> {
    /// Validate the encapsulation header and position on the body.
    pub fn new(buffer: &'a [u8]) -> SerResult<Self> {
        let header = buffer.get(..CDR_LE_HEADER.len()).ok_or(SerError::ReadFailed {
            offset: 0,
            reason: "missing encapsulation header".into(),
        })?;
        if header[..2] != CDR_LE_HEADER[..2] {
            return Err(SerError::InvalidData {
                reason: format!("unsupported encapsulation {:02x}{:02x}", header[0], header[1]),
            });
        }
        Ok(Self {
            buffer: &buffer[CDR_LE_HEADER.len()..],
            offset: 0,
        })
    }

    pub fn align(&mut self, alignment: usize) -> SerResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let aligned = self.offset.div_ceil(alignment) * alignment;
        if aligned > self.buffer.len() {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        }
        self.offset = aligned;
        Ok(())
    }

    impl_read_le!(read_u32_le, u32, 4);

    pub fn read_u8(&mut self) -> SerResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> SerResult<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|end| *end <= self.buffer.len());
        let Some(end) = end else {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        };
        let slice = &self.buffer[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// Read a sequence length, rejecting counts that cannot fit in the
    /// remaining buffer given a minimum element size.
    pub fn read_len(&mut self, min_element_size: usize) -> SerResult<usize> {
        let len = self.read_u32_le()? as usize;
        if len.saturating_mul(min_element_size.max(1)) > self.remaining() {
            return Err(SerError::InvalidData {
                reason: format!("sequence length {} exceeds remaining buffer", len),
            });
        }
        Ok(len)
    }

    pub fn read_string(&mut self) -> SerResult<String> {
        let len = self.read_len(1)?;
        if len == 0 {
            return Err(SerError::InvalidData {
                reason: "string without terminator".into(),
            });
        }
        let bytes = self.read_bytes(len)?;
        let (text, nul) = bytes.split_at(len - 1);
        if nul != [0] {
            return Err(SerError::InvalidData {
                reason: "string not NUL terminated".into(),
            });
        }
        String::from_utf8(text.to_vec()).map_err(|_| SerError::InvalidData {
            reason: "string is not UTF-8".into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}
