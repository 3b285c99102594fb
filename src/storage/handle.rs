//! Storage Handle
//!
//! Open state of one domain: its directory, primary table and parent index.

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{KdbError, Result};
use crate::identity::{Account, Identity};
use crate::key::{parent_of, unix_now, Domain, Key, KeyType};
use crate::record;

use super::{ParentIndex, PrimaryTable, KEYVALUE_FILE, PARENTS_FILE};

/// Mode of a freshly created domain directory
const DOMAIN_DIR_MODE: u32 = 0o700;

/// One open configuration domain
pub struct StorageHandle {
    domain: Domain,
    dir: PathBuf,
    table: PrimaryTable,
}

impl StorageHandle {
    /// Open the domain's tables, creating directory, tables and root key
    /// as needed
    ///
    /// Steps:
    /// 1. Resolve the domain directory (system dir or `~user/{user_dir_name}`)
    /// 2. Create it with owner-only permissions if absent
    /// 3. Create the primary table exclusively, else open it
    /// 4. Open the parent index and associate it with the primary table
    /// 5. For a new domain: chown to the user and write the root key
    ///
    /// Handles acquired before a failure are released on return.
    pub fn open_or_create(domain: &Domain, config: &Config, identity: &dyn Identity) -> Result<Self> {
        let (dir, account) = resolve_dir(domain, config, identity)?;
        ensure_dir(&dir)?;

        let keyvalue_path = dir.join(KEYVALUE_FILE);
        let parents_path = dir.join(PARENTS_FILE);

        let (mut table, newly_created) = PrimaryTable::create_or_open(&keyvalue_path)?;
        let index = ParentIndex::open(&parents_path)?;
        table.associate(index, parent_of)?;

        let handle = Self {
            domain: domain.clone(),
            dir,
            table,
        };

        if newly_created {
            if let (Some(account), true) = (&account, config.chown_new_domains) {
                handle.chown_files(account);
            }
        }

        if newly_created || handle.read(domain.root_name())?.is_none() {
            handle.init_root(config, account.as_ref())?;
            tracing::info!("created domain {} at {}", domain, handle.dir.display());
        } else {
            tracing::info!("opened domain {} at {}", domain, handle.dir.display());
        }

        Ok(handle)
    }

    /// Decode the record stored under `name`
    pub fn read(&self, name: &str) -> Result<Option<Key>> {
        let Some(bytes) = self.table.get(name)? else {
            return Ok(None);
        };

        let mut key = Key::from_canonical(name.to_string(), self.domain.owner().map(str::to_string));
        record::decode_into(&bytes, &mut key)?;
        Ok(Some(key))
    }

    /// Persist `key` and sync
    ///
    /// Access and modify times are stamped with the current time and the
    /// key is marked clean. On error `key` is left untouched.
    pub fn write(&self, key: &mut Key) -> Result<()> {
        let mut staged = key.clone();
        staged.stamp(unix_now());

        let bytes = record::encode(&staged)?;
        self.table.put(staged.name(), &bytes)?;
        self.table.sync()?;

        staged.mark_synced();
        *key = staged;
        Ok(())
    }

    /// Delete the record under `name` and sync
    pub fn remove(&self, name: &str) -> Result<bool> {
        let existed = self.table.remove(name)?;
        if existed {
            self.table.sync()?;
        }
        Ok(existed)
    }

    /// Names of the direct children of `name`
    pub fn children(&self, name: &str) -> Result<Vec<String>> {
        self.table.children(name)
    }

    pub fn sync(&self) -> Result<()> {
        self.table.sync()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Release the parent index, then the primary table
    pub fn close(self) {
        tracing::debug!("closing domain {}", self.domain);
        self.table.close();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write the domain root as a directory key
    fn init_root(&self, config: &Config, account: Option<&Account>) -> Result<()> {
        let (uid, gid) = account.map(|a| (a.uid, a.gid)).unwrap_or((0, 0));

        let mut root = Key::from_canonical(
            self.domain.root_name().to_string(),
            self.domain.owner().map(str::to_string),
        )
        .with_type(KeyType::DIR)
        .with_mode(config.default_dir_mode)
        .with_owner_ids(uid, gid);

        self.write(&mut root)
    }

    /// Best effort: a failed chown leaves the domain usable by its creator
    fn chown_files(&self, account: &Account) {
        let paths = [
            self.dir.clone(),
            self.dir.join(KEYVALUE_FILE),
            self.dir.join(PARENTS_FILE),
        ];

        for path in &paths {
            if let Err(e) = std::os::unix::fs::chown(path, Some(account.uid), Some(account.gid)) {
                tracing::warn!(
                    "could not chown {} to {}: {}",
                    path.display(),
                    account.name,
                    e
                );
            }
        }
    }
}

/// Directory of a domain, and the account that owns it for user domains
fn resolve_dir(domain: &Domain, config: &Config, identity: &dyn Identity) -> Result<(PathBuf, Option<Account>)> {
    match domain {
        Domain::System => Ok((config.system_dir.clone(), None)),
        Domain::User(name) => {
            let account = identity
                .lookup_user(name)?
                .ok_or_else(|| KdbError::Unreachable(format!("unknown user {}", name)))?;

            let home = match &config.home_root {
                Some(root) => root.join(&account.name),
                None => account.home.clone(),
            };

            Ok((home.join(&config.user_dir_name), Some(account)))
        }
    }
}

/// Make sure `dir` is a directory, creating it (mode 0700) if absent
fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(KdbError::PermissionDenied(format!(
            "{} exists and is not a directory",
            dir.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("creating domain directory {}", dir.display());
            DirBuilder::new()
                .mode(DOMAIN_DIR_MODE)
                .create(dir)
                .map_err(|e| {
                    tracing::error!("cannot create {}: {}", dir.display(), e);
                    match e.kind() {
                        io::ErrorKind::PermissionDenied => {
                            KdbError::PermissionDenied(dir.display().to_string())
                        }
                        _ => KdbError::Io(e),
                    }
                })
        }
        Err(e) => Err(e.into()),
    }
}
