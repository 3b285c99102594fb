//! Process identity
//!
//! Who is asking (uid/gid used for permission checks) and where user
//! domains live (passwd lookups).

use std::collections::HashMap;
use std::path::PathBuf;

use nix::unistd::{getgid, getuid, User};
use parking_lot::RwLock;

use crate::error::{KdbError, Result};

/// uid/gid pair permission checks run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

/// A resolved user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl From<User> for Account {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

/// Source of credentials and accounts
pub trait Identity: Send + Sync {
    /// Credentials of the caller
    fn credentials(&self) -> Credentials;

    /// The account `user/*` keys without a qualifier belong to
    fn current_user(&self) -> Result<Account>;

    /// Look up an account by name. `Ok(None)` if no such user exists.
    fn lookup_user(&self, name: &str) -> Result<Option<Account>>;
}

/// Real uid/gid of this process and the system passwd database
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

impl Identity for SystemIdentity {
    fn credentials(&self) -> Credentials {
        Credentials {
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
        }
    }

    fn current_user(&self) -> Result<Account> {
        let uid = getuid();
        User::from_uid(uid)
            .map_err(|e| KdbError::Unreachable(format!("passwd lookup of uid {}: {}", uid, e)))?
            .map(Account::from)
            .ok_or_else(|| KdbError::Unreachable(format!("uid {} has no passwd entry", uid)))
    }

    fn lookup_user(&self, name: &str) -> Result<Option<Account>> {
        User::from_name(name)
            .map(|user| user.map(Account::from))
            .map_err(|e| KdbError::Unreachable(format!("passwd lookup of {}: {}", name, e)))
    }
}

/// Fixed account table with switchable credentials
///
/// Lets embedders and tests act as different users without changing the
/// process identity.
pub struct StaticIdentity {
    current: String,
    credentials: RwLock<Credentials>,
    accounts: HashMap<String, Account>,
}

impl StaticIdentity {
    /// Act as `current`, with its uid/gid as credentials
    pub fn new(current: Account) -> Self {
        let credentials = Credentials {
            uid: current.uid,
            gid: current.gid,
        };
        let mut accounts = HashMap::new();
        let name = current.name.clone();
        accounts.insert(name.clone(), current);

        Self {
            current: name,
            credentials: RwLock::new(credentials),
            accounts,
        }
    }

    /// Add another resolvable account
    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.name.clone(), account);
        self
    }

    /// Change the credentials used by later permission checks
    pub fn set_credentials(&self, uid: u32, gid: u32) {
        *self.credentials.write() = Credentials { uid, gid };
    }
}

impl Identity for StaticIdentity {
    fn credentials(&self) -> Credentials {
        *self.credentials.read()
    }

    fn current_user(&self) -> Result<Account> {
        self.accounts
            .get(&self.current)
            .cloned()
            .ok_or_else(|| KdbError::Unreachable(self.current.clone()))
    }

    fn lookup_user(&self, name: &str) -> Result<Option<Account>> {
        Ok(self.accounts.get(name).cloned())
    }
}
