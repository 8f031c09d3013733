//! Journal record types and framing.
//!
//! ## Record Format
//!
//! ```text
//! | magic "PCJR" (4) | version u16 LE | type u8 | payload len u32 LE | payload | crc32 LE |
//! ```
//!
//! The payload is CBOR. The CRC covers every byte before it.

use crate::entity::Document;
use crate::error::{CoreError, CoreResult};
use crate::key::NormalizedKey;
use crate::types::{CollectionKind, Version};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"PCJR";

/// Current record format version.
pub const JOURNAL_VERSION: u16 = 1;

pub(crate) const HEADER_SIZE: usize = 11;
pub(crate) const CRC_SIZE: usize = 4;

/// Type tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Insert or overwrite a document.
    Put = 1,
    /// Remove a document.
    Delete = 2,
    /// Move a document to a new key.
    Rekey = 3,
}

impl RecordType {
    /// Parses a type byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Rekey),
            _ => None,
        }
    }

    /// Returns the type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single-document write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// The document now has this content and version.
    Put {
        /// Version after the write.
        version: Version,
        /// Full document.
        document: Document,
    },
    /// The document is gone.
    Delete {
        /// Collection.
        kind: CollectionKind,
        /// Key of the removed document.
        key: NormalizedKey,
    },
    /// The document moved from `old_key` to its current key.
    Rekey {
        /// Previous key.
        old_key: NormalizedKey,
        /// Version after the write.
        version: Version,
        /// Full document under the new key.
        document: Document,
    },
}

impl JournalRecord {
    /// Type tag for this record.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::Put { .. } => RecordType::Put,
            Self::Delete { .. } => RecordType::Delete,
            Self::Rekey { .. } => RecordType::Rekey,
        }
    }

    /// Collection the record applies to.
    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        match self {
            Self::Put { document, .. } | Self::Rekey { document, .. } => document.kind(),
            Self::Delete { kind, .. } => *kind,
        }
    }

    /// Encodes the record with its envelope.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload cannot be serialized or is
    /// larger than `u32::MAX` bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| CoreError::codec(format!("journal payload: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::codec("journal payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// Outcome of reading one frame from a byte buffer.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, verified record and its total length.
    Record(JournalRecord, usize),
    /// The buffer ends inside this frame.
    Torn,
}

/// Reads the frame starting at `buf[0]`; `offset` is only used in errors.
///
/// A checksum mismatch on a frame that runs exactly to the end of `buf` is
/// reported as [`Frame::Torn`]: that is what a crash between extending the
/// file and finishing the write looks like.
pub(crate) fn read_frame(buf: &[u8], offset: u64) -> CoreResult<Frame> {
    if buf.len() < HEADER_SIZE {
        return Ok(Frame::Torn);
    }
    if buf[0..4] != JOURNAL_MAGIC {
        return Err(CoreError::journal_corruption(offset, "invalid magic"));
    }

    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version > JOURNAL_VERSION {
        return Err(CoreError::journal_corruption(
            offset,
            format!("unsupported version {version}"),
        ));
    }

    let type_byte = buf[6];
    let record_type = RecordType::from_byte(type_byte).ok_or_else(|| {
        CoreError::journal_corruption(offset, format!("unknown record type {type_byte}"))
    })?;

    let payload_len = u32::from_le_bytes([buf[7], buf[8], buf[9], buf[10]]) as usize;
    let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
    if buf.len() < total_len {
        return Ok(Frame::Torn);
    }

    let payload_end = HEADER_SIZE + payload_len;
    let stored_crc = u32::from_le_bytes([
        buf[payload_end],
        buf[payload_end + 1],
        buf[payload_end + 2],
        buf[payload_end + 3],
    ]);
    let computed_crc = compute_crc32(&buf[..payload_end]);
    if stored_crc != computed_crc {
        if buf.len() == total_len {
            return Ok(Frame::Torn);
        }
        return Err(CoreError::journal_corruption(
            offset,
            format!("checksum mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"),
        ));
    }

    let record: JournalRecord = ciborium::from_reader(&buf[HEADER_SIZE..payload_end])
        .map_err(|e| CoreError::journal_corruption(offset, format!("payload: {e}")))?;
    if record.record_type() != record_type {
        return Err(CoreError::journal_corruption(
            offset,
            "record type does not match payload",
        ));
    }

    Ok(Frame::Record(record, total_len))
}

/// Computes the IEEE CRC32 of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
