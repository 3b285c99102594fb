//! Backend Module
//!
//! The operations callers invoke on the key database.
//!
//! ## Responsibilities
//! - Route each key to its domain's storage handle
//! - Enforce owner/group/other permissions on reads and writes
//! - Materialize missing parent keys on write
//! - Enumerate children through the parent index
//!
//! ## Concurrency Model
//! [`Backend`] takes `&mut self` everywhere and has no internal locking.
//! [`SharedBackend`] puts one mutex around the whole surface.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::access;
use crate::config::Config;
use crate::error::{KdbError, Result};
use crate::identity::{Credentials, Identity, SystemIdentity};
use crate::key::{is_inactive, parent_of, Domain, Key, KeySet, KeyType};
use crate::storage::{HandleCache, StorageHandle};

/// Option bits for [`Backend::enumerate_children`]
pub mod options {
    /// All descendants instead of direct children only
    pub const RECURSIVE: u64 = 1;

    /// Include keys whose base name starts with `.`
    pub const INACTIVE: u64 = 1 << 1;

    /// Metadata only: value and comment are left empty
    pub const STATONLY: u64 = 1 << 2;

    /// Leave directory keys out of the result (they are still descended)
    pub const NODIR: u64 = 1 << 3;

    /// Only directory keys
    pub const DIRONLY: u64 = 1 << 4;
}

/// Session context: configuration, identity and open domains
pub struct Backend {
    config: Config,
    identity: Arc<dyn Identity>,
    cache: HandleCache,
}

impl Backend {
    /// Open a backend acting as the real user of this process
    ///
    /// Domains are opened lazily on first access.
    pub fn open(config: Config) -> Result<Self> {
        Self::with_identity(config, Arc::new(SystemIdentity))
    }

    /// Open a backend with an explicit identity
    pub fn with_identity(config: Config, identity: Arc<dyn Identity>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            identity,
            cache: HandleCache::new(),
        })
    }

    /// Release every open domain
    ///
    /// The backend stays usable; domains reopen on next access.
    pub fn close(&mut self) -> Result<()> {
        self.cache.close_all();
        Ok(())
    }

    /// Read `key` by name
    ///
    /// On success the key's full state is replaced by the stored one. On
    /// failure it is left untouched.
    pub fn get(&mut self, key: &mut Key) -> Result<()> {
        let credentials = self.identity.credentials();
        let handle = self.handle_for(key)?;

        let stored = handle
            .read(key.name())?
            .ok_or_else(|| KdbError::NotFound(key.name().to_string()))?;

        if !access::can_read(&stored, credentials) {
            return Err(KdbError::PermissionDenied(key.name().to_string()));
        }

        *key = stored;
        Ok(())
    }

    /// Read `key`'s metadata without its value or comment
    ///
    /// Needs no read permission on the key.
    pub fn stat(&mut self, key: &mut Key) -> Result<()> {
        let handle = self.handle_for(key)?;

        let mut stored = handle
            .read(key.name())?
            .ok_or_else(|| KdbError::NotFound(key.name().to_string()))?;
        stored.clear_payload();

        *key = stored;
        Ok(())
    }

    /// Persist `key`
    ///
    /// Overwriting needs write permission on the existing key; creating
    /// needs write permission on the parent. Missing parents are created as
    /// directory keys owned by the caller. On success the key's access and
    /// modify times are stamped and it is marked clean; the write is synced
    /// before returning.
    pub fn set(&mut self, key: &mut Key) -> Result<()> {
        let credentials = self.identity.credentials();
        let dir_mode = self.config.default_dir_mode;
        let handle = self.handle_for(key)?;

        let allowed = match handle.read(key.name())? {
            Some(existing) => access::can_write(&existing, credentials),
            None => {
                let parent = writable_parent(handle, key.name(), credentials, dir_mode)?;
                access::can_write(&parent, credentials)
            }
        };

        if !allowed {
            return Err(KdbError::PermissionDenied(key.name().to_string()));
        }

        handle.write(key)
    }

    /// Write every key in `keys` that needs sync, stopping at the first error
    pub fn set_keys(&mut self, keys: &mut KeySet) -> Result<()> {
        for key in keys.iter_mut().filter(|key| key.needs_sync()) {
            self.set(key)?;
        }
        Ok(())
    }

    /// Delete `key`
    ///
    /// Needs write permission on the parent. Domain roots and keys that
    /// still have children cannot be removed.
    pub fn remove(&mut self, key: &Key) -> Result<()> {
        let credentials = self.identity.credentials();
        let handle = self.handle_for(key)?;
        let name = key.name();

        if handle.read(name)?.is_none() {
            return Err(KdbError::NotFound(name.to_string()));
        }

        let Some(parent_name) = parent_of(name) else {
            return Err(KdbError::PermissionDenied(format!("{} is a domain root", name)));
        };

        if !handle.children(name)?.is_empty() {
            return Err(KdbError::DirectoryNotEmpty(name.to_string()));
        }

        let parent = handle
            .read(parent_name)?
            .ok_or_else(|| KdbError::NotFound(parent_name.to_string()))?;
        if !access::can_write(&parent, credentials) {
            return Err(KdbError::PermissionDenied(name.to_string()));
        }

        handle.remove(name)?;
        Ok(())
    }

    /// Append the children of `parent` to `out`
    ///
    /// Children the caller cannot read are skipped together with their
    /// subtrees. See [`options`] for the option bits.
    pub fn enumerate_children(&mut self, parent: &Key, out: &mut KeySet, flags: u64) -> Result<()> {
        let credentials = self.identity.credentials();
        let handle = self.handle_for(parent)?;

        if handle.read(parent.name())?.is_none() {
            return Err(KdbError::NotFound(parent.name().to_string()));
        }

        let recursive = flags & options::RECURSIVE != 0;
        let include_inactive = flags & options::INACTIVE != 0;
        let stat_only = flags & options::STATONLY != 0;
        let no_dir = flags & options::NODIR != 0;
        let dir_only = flags & options::DIRONLY != 0;

        // Depth-first, pre-order: children are pushed in reverse.
        let mut pending = handle.children(parent.name())?;
        pending.reverse();

        while let Some(name) = pending.pop() {
            if !include_inactive && is_inactive(&name) {
                continue;
            }

            let Some(mut child) = handle.read(&name)? else {
                tracing::warn!("parent index lists {} but it has no record", name);
                continue;
            };

            if !access::can_read(&child, credentials) {
                tracing::debug!("skipping unreadable key {}", name);
                continue;
            }

            if recursive {
                let mut grandchildren = handle.children(&name)?;
                grandchildren.reverse();
                pending.extend(grandchildren);
            }

            let is_dir = child.is_dir();
            if (no_dir && is_dir) || (dir_only && !is_dir) {
                continue;
            }

            if stat_only {
                child.clear_payload();
            }
            out.push(child);
        }

        Ok(())
    }

    /// Number of domains currently open
    pub fn open_domains(&self) -> usize {
        self.cache.len()
    }

    /// Is `domain` currently open?
    pub fn is_open(&self, domain: &Domain) -> bool {
        self.cache.contains(domain)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Domain `key` belongs to
    ///
    /// Unqualified `user/*` keys belong to the current user.
    pub fn domain_of(&self, key: &Key) -> Result<Domain> {
        if key.is_system() {
            return Ok(Domain::System);
        }

        match key.owner() {
            Some(owner) => Ok(Domain::User(owner.to_string())),
            None => Ok(Domain::User(self.identity.current_user()?.name)),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn handle_for(&mut self, key: &Key) -> Result<&StorageHandle> {
        let domain = self.domain_of(key)?;
        self.cache
            .handle_for(&domain, &self.config, self.identity.as_ref())
    }
}

/// Parent key that gates creating `name`, materializing missing ancestors
///
/// Walks up until an existing ancestor is found, then creates the missing
/// ones outermost first. Each creation is itself checked against the
/// ancestor above it.
fn writable_parent(
    handle: &StorageHandle,
    name: &str,
    credentials: Credentials,
    dir_mode: u32,
) -> Result<Key> {
    let mut missing = Vec::new();
    let mut cursor = parent_of(name);

    let mut parent = loop {
        let Some(candidate) = cursor else {
            // Only a missing domain root can get here; open writes it.
            return Err(KdbError::BackendUnavailable(format!(
                "domain root of {} is missing",
                name
            )));
        };

        match handle.read(candidate)? {
            Some(existing) => break existing,
            None => {
                missing.push(candidate);
                cursor = parent_of(candidate);
            }
        }
    };

    for dir_name in missing.into_iter().rev() {
        if !access::can_write(&parent, credentials) {
            return Err(KdbError::PermissionDenied(dir_name.to_string()));
        }

        let mut dir = Key::from_canonical(
            dir_name.to_string(),
            handle.domain().owner().map(str::to_string),
        )
        .with_type(KeyType::DIR)
        .with_mode(dir_mode)
        .with_owner_ids(credentials.uid, credentials.gid);

        handle.write(&mut dir)?;
        tracing::debug!("created missing parent {}", dir_name);
        parent = dir;
    }

    Ok(parent)
}

/// [`Backend`] behind a single mutex
pub struct SharedBackend {
    inner: Mutex<Backend>,
}

impl SharedBackend {
    pub fn new(backend: Backend) -> Self {
        Self {
            inner: Mutex::new(backend),
        }
    }

    pub fn get(&self, key: &mut Key) -> Result<()> {
        self.inner.lock().get(key)
    }

    pub fn stat(&self, key: &mut Key) -> Result<()> {
        self.inner.lock().stat(key)
    }

    pub fn set(&self, key: &mut Key) -> Result<()> {
        self.inner.lock().set(key)
    }

    pub fn set_keys(&self, keys: &mut KeySet) -> Result<()> {
        self.inner.lock().set_keys(keys)
    }

    pub fn remove(&self, key: &Key) -> Result<()> {
        self.inner.lock().remove(key)
    }

    pub fn enumerate_children(&self, parent: &Key, out: &mut KeySet, flags: u64) -> Result<()> {
        self.inner.lock().enumerate_children(parent, out, flags)
    }

    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }

    pub fn into_inner(self) -> Backend {
        self.inner.into_inner()
    }
}
