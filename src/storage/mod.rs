//! Storage Module
//!
//! Per-domain persistent storage on top of redb.
//!
//! ## Responsibilities
//! - Resolve and create domain directories
//! - Keep the primary table and its parent index in step
//! - Sync after every mutation
//! - Cache one open handle per domain
//!
//! ## On-Disk Layout (per domain)
//! ```text
//! {domain_dir}/                     (mode 0700)
//! ├── keyvalue.db                   name → record
//! └── parents.idx                   parent name → {child names}
//! ```

mod cache;
mod handle;
mod index;
mod table;

pub use cache::HandleCache;
pub use handle::StorageHandle;
pub use index::ParentIndex;
pub use table::{DeriveFn, PrimaryTable};

/// Primary table file inside a domain directory
pub const KEYVALUE_FILE: &str = "keyvalue.db";

/// Parent index file inside a domain directory
pub const PARENTS_FILE: &str = "parents.idx";
