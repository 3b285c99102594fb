//! Key Module
//!
//! In-memory representation of configuration keys.
//!
//! ## Responsibilities
//! - Parse and canonicalize hierarchical key names
//! - Carry key metadata (owner ids, mode, timestamps, comment, value)
//! - Derive the parent of a name for the parent index
//! - Group keys into ordered key sets
//!
//! ## Name Grammar
//! ```text
//! system/app/color          system domain
//! user/app/color            current user's domain
//! user:alice/app/color      alice's domain (stored as "user/app/color")
//! ```

mod entry;
mod name;
mod set;

pub use entry::{unix_now, Key};
pub use name::{base_name, canonicalize, is_inactive, is_root, parent_of, Domain, SYSTEM_ROOT, USER_ROOT};
pub use set::KeySet;

/// Type tag stored in the first byte of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyType(pub u8);

impl KeyType {
    pub const UNDEFINED: KeyType = KeyType(0);
    pub const DIR: KeyType = KeyType(1);
    pub const LINK: KeyType = KeyType(2);
    pub const BINARY: KeyType = KeyType(20);
    pub const STRING: KeyType = KeyType(40);
}
