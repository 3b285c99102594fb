//! Parent index
//!
//! Multimap from a parent name to the names of its direct children.
//! Never written by the backend directly: the primary table keeps it in
//! step through its association.

use std::path::{Path, PathBuf};

use redb::{Database, Durability, MultimapTableDefinition, ReadableMultimapTable};

use crate::error::{engine_error, Result};

/// Values per parent are kept sorted and unique by the engine
const PARENTS: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("parents");

/// Secondary index over one domain's primary table
pub struct ParentIndex {
    path: PathBuf,
    db: Database,
}

impl ParentIndex {
    /// Open or create the index file
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(engine_error("open parent index"))?;

        // Ensure the table exists so read transactions can open it.
        let write_txn = db
            .begin_write()
            .map_err(engine_error("begin parent index transaction"))?;
        {
            let _table = write_txn
                .open_multimap_table(PARENTS)
                .map_err(engine_error("create parents table"))?;
        }
        write_txn
            .commit()
            .map_err(engine_error("commit parents table"))?;

        Ok(Self {
            path: path.to_path_buf(),
            db,
        })
    }

    /// Record `child` under `parent`
    pub(crate) fn insert(&self, parent: &str, child: &str) -> Result<()> {
        self.insert_all(&[(parent, child)])
    }

    /// Record many (parent, child) pairs in one transaction
    pub(crate) fn insert_all(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin parent index transaction"))?;
        write_txn.set_durability(Durability::Eventual);
        {
            let mut table = write_txn
                .open_multimap_table(PARENTS)
                .map_err(engine_error("open parents table"))?;
            for (parent, child) in pairs {
                table
                    .insert(*parent, *child)
                    .map_err(engine_error("insert parent index entry"))?;
            }
        }
        write_txn
            .commit()
            .map_err(engine_error("commit parent index entry"))?;
        Ok(())
    }

    /// Forget `child` under `parent`
    pub(crate) fn remove(&self, parent: &str, child: &str) -> Result<()> {
        self.remove_all(&[(parent, child)])
    }

    /// Forget many (parent, child) pairs in one transaction
    pub(crate) fn remove_all(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin parent index transaction"))?;
        write_txn.set_durability(Durability::Eventual);
        {
            let mut table = write_txn
                .open_multimap_table(PARENTS)
                .map_err(engine_error("open parents table"))?;
            for (parent, child) in pairs {
                table
                    .remove(*parent, *child)
                    .map_err(engine_error("remove parent index entry"))?;
            }
        }
        write_txn
            .commit()
            .map_err(engine_error("commit parent index removal"))?;
        Ok(())
    }

    /// Direct children of `parent`, in name order
    pub fn children(&self, parent: &str) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(engine_error("begin parent index read"))?;
        let table = read_txn
            .open_multimap_table(PARENTS)
            .map_err(engine_error("open parents table"))?;

        let mut children = Vec::new();
        let values = table
            .get(parent)
            .map_err(engine_error("read parent index"))?;
        for value in values {
            let value = value.map_err(engine_error("read parent index"))?;
            children.push(value.value().to_string());
        }

        Ok(children)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(engine_error("begin parent index read"))?;
        let table = read_txn
            .open_multimap_table(PARENTS)
            .map_err(engine_error("open parents table"))?;
        let mut entries = table.iter().map_err(engine_error("scan parent index"))?;
        let empty = entries.next().is_none();
        Ok(empty)
    }

    /// Every (parent, child) pair, in order
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(engine_error("begin parent index read"))?;
        let table = read_txn
            .open_multimap_table(PARENTS)
            .map_err(engine_error("open parents table"))?;

        let mut pairs = Vec::new();
        for entry in table.iter().map_err(engine_error("scan parent index"))? {
            let (parent, children) = entry.map_err(engine_error("scan parent index"))?;
            let parent = parent.value().to_string();
            for child in children {
                let child = child.map_err(engine_error("scan parent index"))?;
                pairs.push((parent.clone(), child.value().to_string()));
            }
        }
        Ok(pairs)
    }

    /// Make every earlier commit durable
    pub fn sync(&self) -> Result<()> {
        let mut write_txn = self
            .db
            .begin_write()
            .map_err(engine_error("begin parent index sync"))?;
        write_txn.set_durability(Durability::Immediate);
        write_txn
            .commit()
            .map_err(engine_error("sync parent index"))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
