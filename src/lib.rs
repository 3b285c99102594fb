//! # kdbtree
//!
//! A storage backend for a hierarchical configuration key database:
//! - One embedded database per domain (`system/*`, and `user/*` per user)
//! - Fixed-layout binary records carrying owner, mode, timestamps, comment
//!   and value
//! - A parent index kept in step with every write, for child listings
//! - POSIX owner/group/other permission checks on every read and write
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Backend                              │
//! │         get / set / stat / remove / enumerate_children       │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │     Access Control     │      │      Handle Cache      │
//!   │  (owner/group/other)   │      │  (one handle / domain) │
//!   └────────────────────────┘      └───────────┬────────────┘
//!                                               │
//!                                               ▼
//!                                   ┌────────────────────────┐
//!                                   │     Storage Handle     │
//!                                   │ keyvalue.db ──derive──▶│
//!                                   │          parents.idx   │
//!                                   └───────────┬────────────┘
//!                                               │
//!                                               ▼
//!                                   ┌────────────────────────┐
//!                                   │      Record Codec      │
//!                                   └────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod record;
pub mod identity;
pub mod access;
pub mod storage;
pub mod backend;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KdbError, Result};
pub use config::Config;
pub use backend::{options, Backend, SharedBackend};
pub use identity::{Account, Credentials, Identity, StaticIdentity, SystemIdentity};
pub use key::{Domain, Key, KeySet, KeyType};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kdbtree
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
