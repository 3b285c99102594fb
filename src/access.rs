//! Access control
//!
//! POSIX owner/group/other evaluation of a key's mode bits. The first class
//! that matches decides: an owner is never granted access through the
//! group or other bits.
//!
//! Reads are checked against the key itself. Writes are checked against the
//! existing key when overwriting, and against the parent key when creating.

use crate::identity::Credentials;
use crate::key::Key;

const S_IRUSR: u32 = 0o400;
const S_IWUSR: u32 = 0o200;
const S_IRGRP: u32 = 0o040;
const S_IWGRP: u32 = 0o020;
const S_IROTH: u32 = 0o004;
const S_IWOTH: u32 = 0o002;

/// Kind of access requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    /// (user, group, other) bits for this access
    fn bits(self) -> (u32, u32, u32) {
        match self {
            Access::Read => (S_IRUSR, S_IRGRP, S_IROTH),
            Access::Write => (S_IWUSR, S_IWGRP, S_IWOTH),
        }
    }
}

/// Does `mode`, owned by `uid:gid`, grant `access` to `credentials`?
pub fn permits(uid: u32, gid: u32, mode: u32, credentials: Credentials, access: Access) -> bool {
    let (user_bit, group_bit, other_bit) = access.bits();

    let bit = if uid == credentials.uid {
        user_bit
    } else if gid == credentials.gid {
        group_bit
    } else {
        other_bit
    };

    mode & bit != 0
}

pub fn can_read(candidate: &Key, credentials: Credentials) -> bool {
    permits(candidate.uid(), candidate.gid(), candidate.mode(), credentials, Access::Read)
}

pub fn can_write(candidate: &Key, credentials: Credentials) -> bool {
    permits(candidate.uid(), candidate.gid(), candidate.mode(), credentials, Access::Write)
}
