//! Environment-driven configuration.
//!
//! Everything is read once per context from `DYAD_*` variables; there is no
//! config file. Flag variables follow the convention that being set at all
//! enables the feature, while the `DYAD_KIND_*` pair carries an integer and
//! acts as an explicit kill-switch for a side whose managed path is set.

use std::path::{Path, PathBuf};

pub const ENV_PATH_CONS: &str = "DYAD_PATH_CONS";
pub const ENV_PATH_PROD: &str = "DYAD_PATH_PROD";
pub const ENV_KIND_PROD: &str = "DYAD_KIND_PROD";
pub const ENV_KIND_CONS: &str = "DYAD_KIND_CONS";
pub const ENV_KVS_NAMESPACE: &str = "DYAD_KVS_NAMESPACE";
pub const ENV_KEY_DEPTH: &str = "DYAD_KEY_DEPTH";
pub const ENV_KEY_BINS: &str = "DYAD_KEY_BINS";
pub const ENV_SHARED_STORAGE: &str = "DYAD_SHARED_STORAGE";
pub const ENV_SYNC_DEBUG: &str = "DYAD_SYNC_DEBUG";
pub const ENV_SYNC_CHECK: &str = "DYAD_SYNC_CHECK";
pub const ENV_SYNC_START: &str = "DYAD_SYNC_START";
pub const ENV_SYNC_DIR: &str = "DYAD_SYNC_DIR";

/// Variable set to `ok` after a clean hook body when check mode is on.
pub const ENV_CHECK_RESULT: &str = "DYAD_CHECK_ENV";

pub const DEFAULT_KEY_DEPTH: u32 = 3;
pub const DEFAULT_KEY_BINS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct DyadConfig {
    pub debug: bool,
    pub check: bool,
    /// Skip the file transfer even when the owner is a different rank.
    pub shared_storage: bool,
    /// Also fsync the parent directory entry on the close side.
    pub sync_dir: bool,
    pub key_depth: u32,
    pub key_bins: u32,
    pub kvs_namespace: Option<String>,
    pub cons_managed_path: Option<PathBuf>,
    pub prod_managed_path: Option<PathBuf>,
    pub kind_cons: Option<bool>,
    pub kind_prod: Option<bool>,
    /// N-party startup barrier, when positive.
    pub sync_start: Option<u32>,
    pub socket_path: PathBuf,
}

impl Default for DyadConfig {
    fn default() -> Self {
        Self {
            debug: false,
            check: false,
            shared_storage: false,
            sync_dir: false,
            key_depth: DEFAULT_KEY_DEPTH,
            key_bins: DEFAULT_KEY_BINS,
            kvs_namespace: None,
            cons_managed_path: None,
            prod_managed_path: None,
            kind_cons: None,
            kind_prod: None,
            sync_start: None,
            socket_path: PathBuf::from(dyad_ipc::DEFAULT_SOCKET_PATH),
        }
    }
}

impl DyadConfig {
    pub fn from_env() -> Self {
        Self {
            debug: env_flag(ENV_SYNC_DEBUG),
            check: env_flag(ENV_SYNC_CHECK),
            shared_storage: env_flag(ENV_SHARED_STORAGE),
            sync_dir: env_flag(ENV_SYNC_DIR),
            key_depth: env_u32(ENV_KEY_DEPTH, DEFAULT_KEY_DEPTH).max(1),
            key_bins: env_u32(ENV_KEY_BINS, DEFAULT_KEY_BINS).max(1),
            kvs_namespace: std::env::var(ENV_KVS_NAMESPACE).ok().filter(|s| !s.is_empty()),
            cons_managed_path: env_path(ENV_PATH_CONS),
            prod_managed_path: env_path(ENV_PATH_PROD),
            kind_cons: env_kind(ENV_KIND_CONS),
            kind_prod: env_kind(ENV_KIND_PROD),
            sync_start: match env_u32(ENV_SYNC_START, 0) {
                0 => None,
                n => Some(n),
            },
            socket_path: dyad_ipc::socket_path_from_env(),
        }
    }

    /// Consumer-managed prefix, if the open side is active.
    pub fn consumer_prefix(&self) -> Option<&Path> {
        if self.kind_cons == Some(false) {
            return None;
        }
        self.cons_managed_path.as_deref()
    }

    /// Producer-managed prefix, if the close side is active.
    pub fn producer_prefix(&self) -> Option<&Path> {
        if self.kind_prod == Some(false) {
            return None;
        }
        self.prod_managed_path.as_deref()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some()
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_kind(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().parse::<i64>().map(|n| n > 0).unwrap_or(false))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that touch the process environment are serialized.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn test_defaults() {
        let cfg = DyadConfig::default();
        assert_eq!(cfg.key_depth, 3);
        assert_eq!(cfg.key_bins, 1024);
        assert!(!cfg.shared_storage);
        assert!(cfg.kvs_namespace.is_none());
        assert!(cfg.consumer_prefix().is_none());
        assert!(cfg.producer_prefix().is_none());
    }

    #[test]
    fn test_from_env_reads_key_parameters() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_KEY_DEPTH, "5");
        std::env::set_var(ENV_KEY_BINS, "64");
        let cfg = DyadConfig::from_env();
        std::env::remove_var(ENV_KEY_DEPTH);
        std::env::remove_var(ENV_KEY_BINS);
        assert_eq!(cfg.key_depth, 5);
        assert_eq!(cfg.key_bins, 64);
    }

    #[test]
    fn test_invalid_key_parameters_fall_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_KEY_DEPTH, "not_a_number");
        std::env::set_var(ENV_KEY_BINS, "0");
        let cfg = DyadConfig::from_env();
        std::env::remove_var(ENV_KEY_DEPTH);
        std::env::remove_var(ENV_KEY_BINS);
        assert_eq!(cfg.key_depth, DEFAULT_KEY_DEPTH);
        assert_eq!(cfg.key_bins, 1);
    }

    #[test]
    fn test_kind_zero_disables_side() {
        let mut cfg = DyadConfig {
            cons_managed_path: Some(PathBuf::from("/cons")),
            prod_managed_path: Some(PathBuf::from("/prod")),
            ..DyadConfig::default()
        };
        assert!(cfg.consumer_prefix().is_some());
        assert!(cfg.producer_prefix().is_some());

        cfg.kind_cons = Some(false);
        cfg.kind_prod = Some(false);
        assert!(cfg.consumer_prefix().is_none());
        assert!(cfg.producer_prefix().is_none());

        cfg.kind_cons = Some(true);
        assert!(cfg.consumer_prefix().is_some());
    }

    #[test]
    fn test_flag_semantics_any_value_enables() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_SHARED_STORAGE, "0");
        let cfg = DyadConfig::from_env();
        std::env::remove_var(ENV_SHARED_STORAGE);
        // Presence enables, the value is not interpreted.
        assert!(cfg.shared_storage);
    }

    #[test]
    fn test_sync_start_positive_only() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_SYNC_START, "0");
        let off = DyadConfig::from_env();
        std::env::set_var(ENV_SYNC_START, "4");
        let on = DyadConfig::from_env();
        std::env::remove_var(ENV_SYNC_START);
        assert_eq!(off.sync_start, None);
        assert_eq!(on.sync_start, Some(4));
    }
}
