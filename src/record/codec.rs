//! Record codec
//!
//! Conversion between [`Key`] and its stored record.

use bytes::{Buf, BufMut};

use crate::error::{KdbError, Result};
use crate::key::{Key, KeyType};

use super::{RecordHeader, HEADER_SIZE};

/// Encode a key into a stored record
///
/// Format: header (45) + comment + value
pub fn encode(key: &Key) -> Result<Vec<u8>> {
    let comment_size = section_len("comment", key.comment_size())?;
    let data_size = section_len("value", key.data_size())?;

    let header = RecordHeader {
        key_type: key.key_type().0,
        uid: key.uid(),
        gid: key.gid(),
        mode: key.mode(),
        atime: key.atime(),
        mtime: key.mtime(),
        ctime: key.ctime(),
        comment_size,
        data_size,
    };

    let mut record = Vec::new();
    record
        .try_reserve_exact(header.record_len())
        .map_err(|_| KdbError::OutOfMemory)?;

    bincode::serialize_into((&mut record).writer(), &header)
        .map_err(|e| KdbError::Corrupt(format!("header encoding failed: {}", e)))?;
    record.put_slice(key.comment().as_bytes());
    record.put_slice(key.value());

    debug_assert_eq!(record.len(), header.record_len());
    Ok(record)
}

/// Decode a stored record into `key`
///
/// Everything except name and owner is replaced and the key is marked
/// clean. On error `key` is left untouched.
pub fn decode_into(bytes: &[u8], key: &mut Key) -> Result<()> {
    if bytes.len() < HEADER_SIZE {
        return Err(KdbError::Corrupt(format!(
            "record for {} is {} bytes, shorter than the {} byte header",
            key.name(),
            bytes.len(),
            HEADER_SIZE
        )));
    }

    let header: RecordHeader = bincode::deserialize(&bytes[..HEADER_SIZE])
        .map_err(|e| KdbError::Corrupt(format!("header decoding failed: {}", e)))?;

    if bytes.len() != header.record_len() {
        return Err(KdbError::Corrupt(format!(
            "record for {} is {} bytes, header describes {}",
            key.name(),
            bytes.len(),
            header.record_len()
        )));
    }

    let mut body = &bytes[HEADER_SIZE..];
    let comment = body.copy_to_bytes(header.comment_size as usize);
    let comment = String::from_utf8(comment.to_vec())
        .map_err(|_| KdbError::Corrupt(format!("comment of {} is not UTF-8", key.name())))?;
    let value = body.to_vec();

    key.load(
        KeyType(header.key_type),
        header.uid,
        header.gid,
        header.mode,
        [header.atime, header.mtime, header.ctime],
        comment,
        value,
    );

    Ok(())
}

/// Length of a variable section as stored in the header
fn section_len(section: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        KdbError::Corrupt(format!("{} of {} bytes does not fit a record", section, len))
    })
}
