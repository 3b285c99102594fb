//! Key name grammar
//!
//! Names are `/`-separated segments. The first segment selects the
//! namespace, optionally qualified with a user: `user:alice`.

use std::fmt;

use crate::error::{KdbError, Result};

/// Root name of the system domain
pub const SYSTEM_ROOT: &str = "system";

/// Root name of every user domain
pub const USER_ROOT: &str = "user";

/// The owning scope of a key hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Domain {
    /// The single `system/*` tree
    System,

    /// One user's `user/*` tree, identified by user name
    User(String),
}

impl Domain {
    /// Name of the key at the top of this domain
    pub fn root_name(&self) -> &'static str {
        match self {
            Domain::System => SYSTEM_ROOT,
            Domain::User(_) => USER_ROOT,
        }
    }

    /// User name for user domains
    pub fn owner(&self) -> Option<&str> {
        match self {
            Domain::System => None,
            Domain::User(name) => Some(name),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::System => f.write_str(SYSTEM_ROOT),
            Domain::User(name) => write!(f, "{}:{}", USER_ROOT, name),
        }
    }
}

/// Canonicalize a raw key name.
///
/// Returns the stored name (namespace without qualifier, no empty segments)
/// and the user qualifier if one was given.
///
/// ```
/// use kdbtree::key::canonicalize;
///
/// let (name, owner) = canonicalize("user:alice//app/color/").unwrap();
/// assert_eq!(name, "user/app/color");
/// assert_eq!(owner.as_deref(), Some("alice"));
/// ```
pub fn canonicalize(raw: &str) -> Result<(String, Option<String>)> {
    if raw.contains('\0') {
        return Err(KdbError::InvalidName(raw.to_string()));
    }

    let mut segments = raw.split('/').filter(|segment| !segment.is_empty());
    let root = segments
        .next()
        .ok_or_else(|| KdbError::InvalidName(raw.to_string()))?;

    let (namespace, owner) = match root.split_once(':') {
        Some((USER_ROOT, owner)) if !owner.is_empty() => (USER_ROOT, Some(owner.to_string())),
        None if root == SYSTEM_ROOT => (SYSTEM_ROOT, None),
        None if root == USER_ROOT => (USER_ROOT, None),
        _ => return Err(KdbError::InvalidName(raw.to_string())),
    };

    let mut name = String::with_capacity(raw.len());
    name.push_str(namespace);
    for segment in segments {
        name.push('/');
        name.push_str(segment);
    }

    Ok((name, owner))
}

/// Parent of a canonical name, or `None` for a domain root.
///
/// This is the derivation function of the parent index.
pub fn parent_of(name: &str) -> Option<&str> {
    name.rfind('/').map(|idx| &name[..idx])
}

/// Last segment of a canonical name
pub fn base_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// True for `system` and `user`
pub fn is_root(name: &str) -> bool {
    parent_of(name).is_none()
}

/// Keys whose base name starts with a dot are hidden from listings by default
pub fn is_inactive(name: &str) -> bool {
    !is_root(name) && base_name(name).starts_with('.')
}
