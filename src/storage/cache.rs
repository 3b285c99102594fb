//! Handle Cache
//!
//! At most one open [`StorageHandle`] per domain, opened on first use.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::config::Config;
use crate::error::Result;
use crate::identity::Identity;
use crate::key::Domain;

use super::StorageHandle;

/// Open handles keyed by domain
#[derive(Default)]
pub struct HandleCache {
    handles: HashMap<Domain, StorageHandle>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `domain`, opening or creating the domain on a miss
    ///
    /// A failed open adds nothing to the cache.
    pub fn handle_for(
        &mut self,
        domain: &Domain,
        config: &Config,
        identity: &dyn Identity,
    ) -> Result<&StorageHandle> {
        match self.handles.entry(domain.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                tracing::debug!("handle cache miss for {}", domain);
                let handle = StorageHandle::open_or_create(domain, config, identity)?;
                Ok(entry.insert(handle))
            }
        }
    }

    /// Already-open handle for `domain`
    pub fn get(&self, domain: &Domain) -> Option<&StorageHandle> {
        self.handles.get(domain)
    }

    pub fn contains(&self, domain: &Domain) -> bool {
        self.handles.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every handle; the cache stays usable
    pub fn close_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.close();
        }
    }
}
