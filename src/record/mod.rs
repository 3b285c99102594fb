//! Record Module
//!
//! Byte layout of a key as stored in the primary table.
//!
//! ## Responsibilities
//! - Serialize key metadata into a fixed-width header
//! - Append comment and value bytes
//! - Reject records whose length disagrees with their header
//!
//! ## Record Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (45 bytes, little-endian)                             │
//! │ ┌──────┬─────┬─────┬──────┬───────┬───────┬───────┬────┬────┐ │
//! │ │Type 1│UID 4│GID 4│Mode 4│Atime 8│Mtime 8│Ctime 8│CS 4│DS 4│ │
//! │ └──────┴─────┴─────┴──────┴───────┴───────┴───────┴────┴────┘ │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Comment (CS bytes, UTF-8)                                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Value (DS bytes)                                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The key name is not part of the record: it is the primary table's key.

mod codec;

use serde::{Deserialize, Serialize};

pub use codec::{decode_into, encode};

/// Size of the fixed metadata block
pub const HEADER_SIZE: usize = 45;

/// Fixed metadata block of a stored record
///
/// Field order is the on-disk order. bincode's default fixed-int encoding
/// writes each field at its natural width with no padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub key_type: u8,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub comment_size: u32,
    pub data_size: u32,
}

impl RecordHeader {
    /// Total length of the record this header describes
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.comment_size as usize + self.data_size as usize
    }
}
