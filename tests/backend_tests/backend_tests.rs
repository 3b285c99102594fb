//! Tests for Backend
//!
//! These tests verify:
//! - get/set round trips and error kinds
//! - Permission checks for owner, group and other
//! - Materialization of missing parents on write
//! - stat, remove and set_keys
//! - Child enumeration and its option bits
//! - Backend lifecycle (open/close)

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use kdbtree::{
    options, Account, Backend, Config, Domain, KdbError, Key, KeySet, KeyType, SharedBackend,
    StaticIdentity,
};
use redb::{Database, MultimapTableDefinition};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const ALICE: u32 = 1000;
const BOB: u32 = 1001;
const STAFF: u32 = 100;

fn account(root: &Path, name: &str, uid: u32, gid: u32) -> Account {
    Account {
        name: name.to_string(),
        uid,
        gid,
        home: root.join("homes").join(name),
    }
}

/// Backend acting as alice (1000:100); bob (1001:100) is resolvable too
fn setup_temp_backend() -> (TempDir, Arc<StaticIdentity>, Backend) {
    let temp_dir = TempDir::new().unwrap();
    for name in ["alice", "bob"] {
        fs::create_dir_all(temp_dir.path().join("homes").join(name)).unwrap();
    }

    let config = Config::builder()
        .system_dir(temp_dir.path().join("system"))
        .home_root(temp_dir.path().join("homes"))
        .chown_new_domains(false)
        .build();

    let identity = Arc::new(
        StaticIdentity::new(account(temp_dir.path(), "alice", ALICE, STAFF))
            .with_account(account(temp_dir.path(), "bob", BOB, STAFF)),
    );
    let backend = Backend::with_identity(config, identity.clone()).unwrap();

    (temp_dir, identity, backend)
}

fn owned(name: &str, value: &str, uid: u32, gid: u32, mode: u32) -> Key {
    Key::new(name)
        .unwrap()
        .with_string(value)
        .with_owner_ids(uid, gid)
        .with_mode(mode)
}

fn fetch(backend: &mut Backend, name: &str) -> kdbtree::Result<Key> {
    let mut key = Key::new(name)?;
    backend.get(&mut key)?;
    Ok(key)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_set_then_get() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = owned("user/app/color", "blue", ALICE, STAFF, 0o600);
    backend.set(&mut key).unwrap();

    let fetched = fetch(&mut backend, "user/app/color").unwrap();
    assert_eq!(fetched.string(), Some("blue"));
    assert_eq!(fetched.mode(), 0o600);
    assert_eq!(fetched.uid(), ALICE);
    assert_eq!(fetched.key_type(), KeyType::STRING);
    assert!(!fetched.needs_sync());
}

#[test]
fn test_get_never_written() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let result = fetch(&mut backend, "user/never/written");

    assert!(matches!(result, Err(KdbError::NotFound(_))));
}

#[test]
fn test_set_clears_needs_sync_and_stamps() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = owned("user/stamped", "v", ALICE, STAFF, 0o600);
    key.set_times(5, 5, 5);
    assert!(key.needs_sync());

    backend.set(&mut key).unwrap();

    assert!(!key.needs_sync());
    assert!(key.atime() > 5);
    assert!(key.mtime() > 5);
    assert_eq!(key.ctime(), 5);
}

#[test]
fn test_empty_comment_and_value_roundtrip() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = Key::new("user/empty").unwrap().with_owner_ids(ALICE, STAFF);
    backend.set(&mut key).unwrap();

    let fetched = fetch(&mut backend, "user/empty").unwrap();
    assert_eq!(fetched.comment(), "");
    assert!(fetched.value().is_empty());
}

#[test]
fn test_comment_roundtrip() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = owned("user/commented", "1", ALICE, STAFF, 0o644).with_comment("why this is 1");
    backend.set(&mut key).unwrap();

    let fetched = fetch(&mut backend, "user/commented").unwrap();
    assert_eq!(fetched.comment(), "why this is 1");
}

#[test]
fn test_idempotent_rewrite() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut first = owned("user/same", "value", ALICE, STAFF, 0o640).with_comment("c");
    let mut second = first.clone();

    backend.set(&mut first).unwrap();
    let after_first = fetch(&mut backend, "user/same").unwrap();

    backend.set(&mut second).unwrap();
    let after_second = fetch(&mut backend, "user/same").unwrap();

    assert_eq!(after_first.value(), after_second.value());
    assert_eq!(after_first.comment(), after_second.comment());
    assert_eq!(after_first.mode(), after_second.mode());
    assert_eq!(after_first.uid(), after_second.uid());
}

#[test]
fn test_failed_get_leaves_key_untouched() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = owned("user/missing", "local", ALICE, STAFF, 0o600);
    let before = key.clone();

    assert!(backend.get(&mut key).is_err());
    assert_eq!(key, before);
}

// =============================================================================
// Domain Routing Tests
// =============================================================================

#[test]
fn test_unqualified_user_key_goes_to_current_user() {
    let (temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/app", "x", ALICE, STAFF, 0o644)).unwrap();

    assert!(backend.is_open(&Domain::User("alice".to_string())));
    assert!(temp.path().join("homes/alice/.kdbtree/keyvalue.db").exists());

    let qualified = fetch(&mut backend, "user:alice/app").unwrap();
    assert_eq!(qualified.string(), Some("x"));
    assert_eq!(backend.open_domains(), 1);
}

#[test]
fn test_user_domains_are_separate() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/app", "alice's", ALICE, STAFF, 0o644)).unwrap();

    identity.set_credentials(BOB, STAFF);
    backend.set(&mut owned("user:bob/app", "bob's", BOB, STAFF, 0o644)).unwrap();

    assert_eq!(fetch(&mut backend, "user:alice/app").unwrap().string(), Some("alice's"));
    assert_eq!(fetch(&mut backend, "user:bob/app").unwrap().string(), Some("bob's"));
    assert_eq!(backend.open_domains(), 2);
}

#[test]
fn test_unknown_user_domain_is_unreachable() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let result = fetch(&mut backend, "user:nobody/app");

    assert!(matches!(result, Err(KdbError::Unreachable(_))));
    assert_eq!(backend.open_domains(), 0);
}

// =============================================================================
// Permission Tests
// =============================================================================

#[test]
fn test_owner_with_user_rw_bits() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/private", "1", ALICE, STAFF, 0o600)).unwrap();
    backend.set(&mut owned("user/private", "2", ALICE, STAFF, 0o600)).unwrap();

    assert_eq!(fetch(&mut backend, "user/private").unwrap().string(), Some("2"));
}

#[test]
fn test_group_member_can_write_but_not_read() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/drop", "from alice", ALICE, STAFF, 0o220)).unwrap();

    identity.set_credentials(BOB, STAFF);
    backend.set(&mut owned("user:alice/drop", "from bob", ALICE, STAFF, 0o220)).unwrap();

    let result = fetch(&mut backend, "user:alice/drop");
    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
}

#[test]
fn test_stranger_can_neither_read_nor_write() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/shared", "v", ALICE, STAFF, 0o660)).unwrap();

    identity.set_credentials(2000, 2000);
    let read = fetch(&mut backend, "user:alice/shared");
    let write = backend.set(&mut owned("user:alice/shared", "w", 2000, 2000, 0o666));

    assert!(matches!(read, Err(KdbError::PermissionDenied(_))));
    assert!(matches!(write, Err(KdbError::PermissionDenied(_))));
}

#[test]
fn test_denied_overwrite_leaves_record_unchanged() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/mine", "original", ALICE, STAFF, 0o600)).unwrap();

    identity.set_credentials(BOB, 200);
    let mut intruder = owned("user:alice/mine", "replaced", BOB, 200, 0o666);
    intruder.set_times(7, 7, 7);
    let result = backend.set(&mut intruder);

    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
    assert!(intruder.needs_sync());
    assert_eq!(intruder.atime(), 7);
    assert_eq!(intruder.mtime(), 7);

    identity.set_credentials(ALICE, STAFF);
    assert_eq!(fetch(&mut backend, "user/mine").unwrap().string(), Some("original"));
}

#[test]
fn test_create_checks_parent_not_target() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut Key::dir("user/ro").unwrap().with_owner_ids(ALICE, STAFF)).unwrap();
    backend.set(&mut owned("user/ro/existing", "1", ALICE, STAFF, 0o644)).unwrap();

    // Parent becomes read-only.
    backend
        .set(&mut Key::dir("user/ro").unwrap().with_owner_ids(ALICE, STAFF).with_mode(0o555))
        .unwrap();

    // Overwriting checks the existing key's own bits...
    backend.set(&mut owned("user/ro/existing", "2", ALICE, STAFF, 0o644)).unwrap();

    // ...creating checks the parent's.
    let result = backend.set(&mut owned("user/ro/new", "3", ALICE, STAFF, 0o644));
    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
}

#[test]
fn test_system_domain_needs_root_write() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    let result = backend.set(&mut owned("system/app/x", "v", ALICE, STAFF, 0o644));
    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));

    // No parent was materialized by the failed write.
    identity.set_credentials(0, 0);
    let result = fetch(&mut backend, "system/app");
    assert!(matches!(result, Err(KdbError::NotFound(_))));

    backend.set(&mut owned("system/app/x", "v", 0, 0, 0o644)).unwrap();
    assert_eq!(fetch(&mut backend, "system/app/x").unwrap().string(), Some("v"));
}

// =============================================================================
// Parent Materialization Tests
// =============================================================================

#[test]
fn test_set_creates_missing_parents() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut leaf = Key::dir("user/a/b/c").unwrap().with_owner_ids(ALICE, STAFF);
    backend.set(&mut leaf).unwrap();

    for name in ["user/a", "user/a/b", "user/a/b/c"] {
        let key = fetch(&mut backend, name).unwrap();
        assert_eq!(key.key_type(), KeyType::DIR, "{} should be a directory", name);
        assert_eq!(key.mode(), 0o755, "{} should have the default mode", name);
        assert_eq!(key.uid(), ALICE);
        assert_eq!(key.gid(), STAFF);
    }
}

#[test]
fn test_materialized_parents_are_indexed() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/a/b/leaf", "v", ALICE, STAFF, 0o644)).unwrap();

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user").unwrap(), &mut children, options::RECURSIVE)
        .unwrap();

    assert_eq!(children.names(), vec!["user/a", "user/a/b", "user/a/b/leaf"]);
}

// =============================================================================
// Stat Tests
// =============================================================================

#[test]
fn test_stat_without_read_permission() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend
        .set(&mut owned("user/secret", "hidden", ALICE, STAFF, 0o600).with_comment("c"))
        .unwrap();

    identity.set_credentials(BOB, 200);
    let mut key = Key::new("user:alice/secret").unwrap();
    backend.stat(&mut key).unwrap();

    assert_eq!(key.mode(), 0o600);
    assert_eq!(key.uid(), ALICE);
    assert!(key.value().is_empty());
    assert_eq!(key.comment(), "");
}

#[test]
fn test_stat_missing() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut key = Key::new("user/nothing").unwrap();
    assert!(matches!(backend.stat(&mut key), Err(KdbError::NotFound(_))));
}

// =============================================================================
// Remove Tests
// =============================================================================

#[test]
fn test_remove_key() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/gone", "v", ALICE, STAFF, 0o644)).unwrap();
    backend.remove(&Key::new("user/gone").unwrap()).unwrap();

    assert!(matches!(fetch(&mut backend, "user/gone"), Err(KdbError::NotFound(_))));
    assert!(matches!(
        backend.remove(&Key::new("user/gone").unwrap()),
        Err(KdbError::NotFound(_))
    ));
}

#[test]
fn test_remove_root_denied() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let result = backend.remove(&Key::new("user").unwrap());

    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
    assert!(fetch(&mut backend, "user").is_ok());
}

#[test]
fn test_remove_non_empty_dir() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/dir/child", "v", ALICE, STAFF, 0o644)).unwrap();

    let result = backend.remove(&Key::new("user/dir").unwrap());
    assert!(matches!(result, Err(KdbError::DirectoryNotEmpty(_))));

    backend.remove(&Key::new("user/dir/child").unwrap()).unwrap();
    backend.remove(&Key::new("user/dir").unwrap()).unwrap();
}

#[test]
fn test_remove_needs_parent_write() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/open", "v", ALICE, STAFF, 0o666)).unwrap();

    identity.set_credentials(BOB, 200);
    let result = backend.remove(&Key::new("user:alice/open").unwrap());

    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
}

#[test]
fn test_remove_sees_child_lost_from_index() {
    let (temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/app/x", "v", ALICE, STAFF, 0o644)).unwrap();
    backend.close().unwrap();

    // Drop one entry from the on-disk index while the domain is closed.
    let parents: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("parents");
    {
        let db = Database::open(temp.path().join("homes/alice/.kdbtree/parents.idx")).unwrap();
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_multimap_table(parents).unwrap();
            assert!(table.remove("user/app", "user/app/x").unwrap());
        }
        write_txn.commit().unwrap();
    }

    let result = backend.remove(&Key::new("user/app").unwrap());
    assert!(matches!(result, Err(KdbError::DirectoryNotEmpty(_))));

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user/app").unwrap(), &mut children, 0)
        .unwrap();
    assert_eq!(children.names(), vec!["user/app/x"]);
}

// =============================================================================
// set_keys Tests
// =============================================================================

#[test]
fn test_set_keys_writes_dirty_keys_only() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    // Read-only for everyone: writing it again would be denied.
    backend.set(&mut owned("user/k/frozen", "stored", ALICE, STAFF, 0o444)).unwrap();
    let frozen = fetch(&mut backend, "user/k/frozen").unwrap();
    assert!(!frozen.needs_sync());

    let mut keys = KeySet::new();
    keys.push(frozen);
    keys.push(owned("user/k/new", "fresh", ALICE, STAFF, 0o644));
    backend.set_keys(&mut keys).unwrap();

    assert!(keys.iter().all(|key| !key.needs_sync()));
    assert_eq!(fetch(&mut backend, "user/k/new").unwrap().string(), Some("fresh"));
    assert_eq!(fetch(&mut backend, "user/k/frozen").unwrap().string(), Some("stored"));
}

#[test]
fn test_set_keys_stops_at_first_error() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut keys = KeySet::new();
    keys.push(owned("user/batch/one", "1", ALICE, STAFF, 0o644));
    keys.push(owned("system/batch/two", "2", ALICE, STAFF, 0o644));
    keys.push(owned("user/batch/three", "3", ALICE, STAFF, 0o644));

    let result = backend.set_keys(&mut keys);

    assert!(matches!(result, Err(KdbError::PermissionDenied(_))));
    assert!(fetch(&mut backend, "user/batch/one").is_ok());
    assert!(matches!(fetch(&mut backend, "user/batch/three"), Err(KdbError::NotFound(_))));
}

// =============================================================================
// Enumerate Children Tests
// =============================================================================

fn populate_tree(backend: &mut Backend) {
    for (name, mode) in [
        ("user/app/b", 0o644),
        ("user/app/a", 0o644),
        ("user/app/a/deep", 0o644),
        ("user/app/.hidden", 0o644),
        ("user/app/locked", 0o200),
    ] {
        backend.set(&mut owned(name, name, ALICE, STAFF, mode)).unwrap();
    }
}

#[test]
fn test_direct_children() {
    let (_temp, _identity, mut backend) = setup_temp_backend();
    populate_tree(&mut backend);

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user/app").unwrap(), &mut children, 0)
        .unwrap();

    assert_eq!(children.names(), vec!["user/app/a", "user/app/b"]);
    assert_eq!(children.lookup("user/app/b").unwrap().string(), Some("user/app/b"));
}

#[test]
fn test_recursive_children_in_preorder() {
    let (_temp, _identity, mut backend) = setup_temp_backend();
    populate_tree(&mut backend);

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user/app").unwrap(), &mut children, options::RECURSIVE)
        .unwrap();

    assert_eq!(children.names(), vec!["user/app/a", "user/app/a/deep", "user/app/b"]);
}

#[test]
fn test_inactive_children_on_request() {
    let (_temp, _identity, mut backend) = setup_temp_backend();
    populate_tree(&mut backend);

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user/app").unwrap(), &mut children, options::INACTIVE)
        .unwrap();

    assert_eq!(children.names(), vec!["user/app/.hidden", "user/app/a", "user/app/b"]);
}

#[test]
fn test_stat_only_children() {
    let (_temp, _identity, mut backend) = setup_temp_backend();
    populate_tree(&mut backend);

    let mut children = KeySet::new();
    backend
        .enumerate_children(&Key::new("user/app").unwrap(), &mut children, options::STATONLY)
        .unwrap();

    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|key| key.value().is_empty()));
}

#[test]
fn test_dir_filters() {
    let (_temp, _identity, mut backend) = setup_temp_backend();
    backend.set(&mut owned("user/t/dir/leaf", "v", ALICE, STAFF, 0o644)).unwrap();
    backend.set(&mut owned("user/t/value", "v", ALICE, STAFF, 0o644)).unwrap();
    let parent = Key::new("user/t").unwrap();

    let mut dirs = KeySet::new();
    backend
        .enumerate_children(&parent, &mut dirs, options::RECURSIVE | options::DIRONLY)
        .unwrap();
    assert_eq!(dirs.names(), vec!["user/t/dir"]);

    let mut values = KeySet::new();
    backend
        .enumerate_children(&parent, &mut values, options::RECURSIVE | options::NODIR)
        .unwrap();
    assert_eq!(values.names(), vec!["user/t/dir/leaf", "user/t/value"]);
}

#[test]
fn test_children_of_missing_parent() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    let mut children = KeySet::new();
    let result = backend.enumerate_children(&Key::new("user/none").unwrap(), &mut children, 0);

    assert!(matches!(result, Err(KdbError::NotFound(_))));
    assert!(children.is_empty());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_without_open_domains() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.close().unwrap();
    backend.close().unwrap();
    assert_eq!(backend.open_domains(), 0);
}

#[test]
fn test_close_and_reuse() {
    let (_temp, _identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/persist", "yes", ALICE, STAFF, 0o644)).unwrap();
    backend.close().unwrap();
    assert_eq!(backend.open_domains(), 0);

    assert_eq!(fetch(&mut backend, "user/persist").unwrap().string(), Some("yes"));
    assert_eq!(backend.open_domains(), 1);
}

#[test]
fn test_persists_across_backends() {
    let (_temp, identity, mut backend) = setup_temp_backend();

    backend.set(&mut owned("user/durable", "on disk", ALICE, STAFF, 0o644)).unwrap();
    let config = backend.config().clone();
    drop(backend);

    let mut reopened = Backend::with_identity(config, identity).unwrap();
    assert_eq!(fetch(&mut reopened, "user/durable").unwrap().string(), Some("on disk"));
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().user_dir_name("a/b").build();

    let result = Backend::open(config);

    assert!(matches!(result, Err(KdbError::Config(_))));
}

#[test]
fn test_shared_backend_across_threads() {
    let (_temp, _identity, backend) = setup_temp_backend();
    let shared = Arc::new(SharedBackend::new(backend));

    let mut handles = vec![];
    for i in 0..4 {
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            for j in 0..5 {
                let name = format!("user/thread{}/key{}", i, j);
                let mut key = owned(&name, &name, ALICE, STAFF, 0o644);
                shared.set(&mut key).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut children = KeySet::new();
    shared
        .enumerate_children(&Key::new("user").unwrap(), &mut children, options::RECURSIVE | options::NODIR)
        .unwrap();
    assert_eq!(children.len(), 20);
}
