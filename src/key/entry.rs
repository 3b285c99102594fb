//! Key definition
//!
//! A named configuration entry plus its metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

use super::name::{self, SYSTEM_ROOT};
use super::KeyType;

/// Default mode of value keys created with [`Key::new`]
const DEFAULT_KEY_MODE: u32 = 0o644;

/// Default mode of directory keys created with [`Key::dir`]
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Current time in seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A configuration key
///
/// The comment and data sizes stored on disk are always the lengths of
/// `comment` and `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Canonical name, e.g. `user/app/color`
    name: String,

    /// User domain this key belongs to, when known
    owner: Option<String>,

    key_type: KeyType,
    uid: u32,
    gid: u32,

    /// Permission bits (`rwxrwxrwx`)
    mode: u32,

    atime: i64,
    mtime: i64,
    ctime: i64,

    comment: String,
    value: Vec<u8>,

    /// Set while the in-memory state differs from what was last persisted
    needs_sync: bool,
}

impl Key {
    /// Create a value key
    ///
    /// The name is canonicalized; a `user:<name>` qualifier becomes the owner.
    pub fn new(raw_name: &str) -> Result<Self> {
        let (name, owner) = name::canonicalize(raw_name)?;
        Ok(Self::from_canonical(name, owner))
    }

    /// Create a directory key
    pub fn dir(raw_name: &str) -> Result<Self> {
        let mut key = Self::new(raw_name)?;
        key.key_type = KeyType::DIR;
        key.mode = DEFAULT_DIR_MODE;
        Ok(key)
    }

    /// Build a key from an already canonical name
    pub(crate) fn from_canonical(name: String, owner: Option<String>) -> Self {
        let now = unix_now();
        Self {
            name,
            owner,
            key_type: KeyType::UNDEFINED,
            uid: 0,
            gid: 0,
            mode: DEFAULT_KEY_MODE,
            atime: now,
            mtime: now,
            ctime: now,
            comment: String::new(),
            value: Vec::new(),
            needs_sync: true,
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.set_value(value);
        self
    }

    /// Set a UTF-8 value and tag the key as a string key
    pub fn with_string(mut self, value: &str) -> Self {
        self.set_value(value.as_bytes());
        self.key_type = KeyType::STRING;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.set_comment(comment);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn with_owner_ids(mut self, uid: u32, gid: u32) -> Self {
        self.set_owner_ids(uid, gid);
        self
    }

    pub fn with_type(mut self, key_type: KeyType) -> Self {
        self.set_type(key_type);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_name(&self) -> &str {
        name::base_name(&self.name)
    }

    pub fn parent_name(&self) -> Option<&str> {
        name::parent_of(&self.name)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_ROOT || self.name.starts_with("system/")
    }

    pub fn is_user(&self) -> bool {
        !self.is_system()
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn is_dir(&self) -> bool {
        self.key_type == KeyType::DIR
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn atime(&self) -> i64 {
        self.atime
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn ctime(&self) -> i64 {
        self.ctime
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn comment_size(&self) -> usize {
        self.comment.len()
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn data_size(&self) -> usize {
        self.value.len()
    }

    /// Value as UTF-8, if it is valid
    pub fn string(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    pub fn needs_sync(&self) -> bool {
        self.needs_sync
    }

    // =========================================================================
    // Mutators (all mark the key as needing sync)
    // =========================================================================

    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.value = value.into();
        self.needs_sync = true;
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
        self.needs_sync = true;
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
        self.needs_sync = true;
    }

    pub fn set_owner_ids(&mut self, uid: u32, gid: u32) {
        self.uid = uid;
        self.gid = gid;
        self.needs_sync = true;
    }

    pub fn set_type(&mut self, key_type: KeyType) {
        self.key_type = key_type;
        self.needs_sync = true;
    }

    /// Set all three timestamps
    pub fn set_times(&mut self, atime: i64, mtime: i64, ctime: i64) {
        self.atime = atime;
        self.mtime = mtime;
        self.ctime = ctime;
        self.needs_sync = true;
    }

    /// Attach the key to a user domain
    pub fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    // =========================================================================
    // Crate-internal state transitions
    // =========================================================================

    /// Access and modify time become `now`
    pub(crate) fn stamp(&mut self, now: i64) {
        self.atime = now;
        self.mtime = now;
    }

    pub(crate) fn mark_synced(&mut self) {
        self.needs_sync = false;
    }

    /// Drop value and comment, keeping metadata
    pub(crate) fn clear_payload(&mut self) {
        self.comment.clear();
        self.value.clear();
    }

    /// Replace everything but name and owner with decoded record state
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn load(
        &mut self,
        key_type: KeyType,
        uid: u32,
        gid: u32,
        mode: u32,
        times: [i64; 3],
        comment: String,
        value: Vec<u8>,
    ) {
        self.key_type = key_type;
        self.uid = uid;
        self.gid = gid;
        self.mode = mode;
        let [atime, mtime, ctime] = times;
        self.atime = atime;
        self.mtime = mtime;
        self.ctime = ctime;
        self.comment = comment;
        self.value = value;
        self.needs_sync = false;
    }
}
