//! Primary table
//!
//! Maps a canonical key name to its stored record. An associated
//! [`ParentIndex`] is updated on every mutation through a derivation
//! function, so callers only ever write here.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use redb::{Builder, Database, Durability, ReadableTable, TableDefinition};

use crate::error::{engine_error, Result};

use super::ParentIndex;

const KEYVALUE: TableDefinition<&str, &[u8]> = TableDefinition::new("keyvalue");

/// Derives the index key of a primary key; `None` means "do not index"
pub type DeriveFn = fn(&str) -> Option<&str>;

struct Association {
    index: ParentIndex,
    derive: DeriveFn,
}

/// One domain's key → record table
pub struct PrimaryTable {
    path: PathBuf,

    // Declared before `db`: the index is released first.
    association: Option<Association>,

    db: Database,
}

impl PrimaryTable {
    /// Create the table file exclusively, or open it if it already exists
    ///
    /// Returns the table and whether it was newly created.
    pub fn create_or_open(path: &Path) -> Result<(Self, bool)> {
        let exclusive = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path);

        let (db, newly_created) = match exclusive {
            Ok(file) => match Builder::new().create_file(file) {
                Ok(db) => (db, true),
                Err(e) => {
                    // Leave no empty file behind for the next open to trip over.
                    let _ = fs::remove_file(path);
                    return Err(engine_error("create keyvalue table")(e));
                }
            },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if fs::metadata(path)?.len() == 0 {
                    // An interrupted create left the file but never initialized it.
                    tracing::warn!("initializing empty table file {}", path.display());
                    let file = OpenOptions::new().read(true).write(true).open(path)?;
                    let db = Builder::new()
                        .create_file(file)
                        .map_err(engine_error("create keyvalue table"))?;
                    (db, true)
                } else {
                    let db = Database::open(path).map_err(engine_error("open keyvalue table"))?;
                    (db, false)
                }
            }
            Err(e) => return Err(e.into()),
        };

        let write_txn = db
            .begin_write()
            .map_err(engine_error("begin keyvalue transaction"))?;
        {
            let _table = write_txn
                .open_table(KEYVALUE)
                .map_err(engine_error("create keyvalue table"))?;
        }
        write_txn
            .commit()
            .map_err(engine_error("commit keyvalue table"))?;

        let table = Self {
            path: path.to_path_buf(),
            association: None,
            db,
        };
        Ok((table, newly_created))
    }

    /// Bind `index` to this table
    ///
    /// The index is first reconciled with the table: pairs derived from
    /// stored names that the index lacks are added, and pairs the table no
    /// longer backs are dropped.
    pub fn associate(&mut self, index: ParentIndex, derive: DeriveFn) -> Result<()> {
        let names = self.names()?;
        let expected: BTreeSet<(&str, &str)> = names
            .iter()
            .filter_map(|name| derive(name).map(|parent| (parent, name.as_str())))
            .collect();

        let indexed = index.entries()?;
        let present: BTreeSet<(&str, &str)> = indexed
            .iter()
            .map(|(parent, child)| (parent.as_str(), child.as_str()))
            .collect();

        let missing: Vec<(&str, &str)> = expected.difference(&present).copied().collect();
        let stale: Vec<(&str, &str)> = present.difference(&expected).copied().collect();

        if !missing.is_empty() || !stale.is_empty() {
            tracing::warn!(
                "repairing parent index {}: {} missing, {} stale",
                index.path().display(),
                missing.len(),
                stale.len()
            );
            index.insert_all(&missing)?;
            index.remove_all(&stale)?;
            index.sync()?;
        }

        self.association = Some(Association { index, derive });
        Ok(())
    }

    /// Raw record stored under `name`
    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(engine_error("begin keyvalue read"))?;
        let table = read_txn
            .open_table(KEYVALUE)
            .map_err(engine_error("open keyvalue table"))?;

        let record = table.get(name).map_err(engine_error("read keyvalue"))?;
        Ok(record.map(|guard| guard.value().to_vec()))
    }

    /// Store `record` under `name`, replacing any previous record
    pub fn put(&self, name: &str, record: &[u8]) -> Result<()> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin keyvalue transaction"))?;
        write_txn.set_durability(Durability::Eventual);
        {
            let mut table = write_txn
                .open_table(KEYVALUE)
                .map_err(engine_error("open keyvalue table"))?;
            table
                .insert(name, record)
                .map_err(engine_error("put keyvalue"))?;
        }
        write_txn
            .commit()
            .map_err(engine_error("commit keyvalue"))?;

        if let Some(association) = &self.association {
            if let Some(parent) = (association.derive)(name) {
                association.index.insert(parent, name)?;
            }
        }

        Ok(())
    }

    /// Delete the record under `name`; returns whether one existed
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin keyvalue transaction"))?;
        write_txn.set_durability(Durability::Eventual);
        let existed = {
            let mut table = write_txn
                .open_table(KEYVALUE)
                .map_err(engine_error("open keyvalue table"))?;
            let removed = table
                .remove(name)
                .map_err(engine_error("remove keyvalue"))?;
            removed.is_some()
        };
        write_txn
            .commit()
            .map_err(engine_error("commit keyvalue removal"))?;

        if existed {
            if let Some(association) = &self.association {
                if let Some(parent) = (association.derive)(name) {
                    association.index.remove(parent, name)?;
                }
            }
        }

        Ok(existed)
    }

    /// Names indexed under `parent`; empty when no index is associated
    pub fn children(&self, parent: &str) -> Result<Vec<String>> {
        match &self.association {
            Some(association) => association.index.children(parent),
            None => Ok(Vec::new()),
        }
    }

    /// Every name in the table, in order
    pub fn names(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(engine_error("begin keyvalue read"))?;
        let table = read_txn
            .open_table(KEYVALUE)
            .map_err(engine_error("open keyvalue table"))?;

        let mut names = Vec::new();
        for entry in table.iter().map_err(engine_error("scan keyvalue"))? {
            let (name, _) = entry.map_err(engine_error("scan keyvalue"))?;
            names.push(name.value().to_string());
        }
        Ok(names)
    }

    /// Force the table and its index to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin keyvalue sync"))?;
        write_txn.set_durability(Durability::Immediate);
        write_txn
            .commit()
            .map_err(engine_error("sync keyvalue"))?;

        if let Some(association) = &self.association {
            association.index.sync()?;
        }
        Ok(())
    }

    pub fn is_associated(&self) -> bool {
        self.association.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the index, then the table
    pub fn close(self) {
        let Self {
            association, db, ..
        } = self;
        drop(association);
        drop(db);
    }
}
