//! Configuration for kdbtree
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KdbError, Result};

/// Main configuration for a kdbtree backend
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Domain Locations
    // -------------------------------------------------------------------------
    /// Directory holding the `system/*` tree
    /// Internal structure:
    ///   {system_dir}/
    ///     ├── keyvalue.db      (primary table)
    ///     └── parents.idx      (parent index)
    pub system_dir: PathBuf,

    /// Name of the per-user directory created inside each user's home
    pub user_dir_name: String,

    /// Replaces passwd home directories: user homes become `{home_root}/{name}`
    pub home_root: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // New Key Defaults
    // -------------------------------------------------------------------------
    /// Permission bits for domain roots and synthesized parent keys
    pub default_dir_mode: u32,

    /// Hand freshly created user-domain files over to that user
    pub chown_new_domains: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_dir: PathBuf::from("/etc/kdbtree"),
            user_dir_name: ".kdbtree".to_string(),
            home_root: None,
            default_dir_mode: 0o755,
            chown_new_domains: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings that can never open a domain
    pub fn validate(&self) -> Result<()> {
        if self.system_dir.as_os_str().is_empty() {
            return Err(KdbError::Config("system_dir must not be empty".to_string()));
        }

        if self.user_dir_name.is_empty() || self.user_dir_name.contains('/') {
            return Err(KdbError::Config(format!(
                "user_dir_name must be a single path component, got {:?}",
                self.user_dir_name
            )));
        }

        if self.default_dir_mode & !0o7777 != 0 {
            return Err(KdbError::Config(format!(
                "default_dir_mode {:o} has bits outside 0o7777",
                self.default_dir_mode
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory of the system domain
    pub fn system_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.system_dir = path.into();
        self
    }

    /// Set the per-user directory name
    pub fn user_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_dir_name = name.into();
        self
    }

    /// Resolve user homes below this directory instead of the passwd entry
    pub fn home_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.home_root = Some(path.into());
        self
    }

    /// Set the mode of synthesized directory keys
    pub fn default_dir_mode(mut self, mode: u32) -> Self {
        self.config.default_dir_mode = mode;
        self
    }

    /// Enable or disable chown of new user domains
    pub fn chown_new_domains(mut self, enabled: bool) -> Self {
        self.config.chown_new_domains = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
