//! Durable account registry
//!
//! The registry is a single JSON file holding the full account collection.
//! Every operation takes the store's mutex and works read-modify-write
//! against the file, so concurrent workers never see a torn read or lose
//! an update. Writes go through a temp file and an atomic rename.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::types::{Account, AccountState};

/// Serialize a value to `<path>.tmp` and rename it into place.
///
/// A crash mid-write leaves at worst a stale temp file; the durable file
/// is always either the old or the new complete contents.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let json = serde_json::to_string_pretty(value).map_err(StoreError::Serialize)?;
    std::fs::write(&tmp, json).map_err(StoreError::Io)?;
    std::fs::rename(&tmp, path).map_err(StoreError::Io)?;
    Ok(())
}

/// Mutex-guarded account registry
pub struct AccountStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load the full account collection.
    ///
    /// A missing or unparsable file yields an empty collection; the anomaly
    /// is logged rather than surfaced, so a corrupt registry degrades to
    /// "no accounts" instead of halting the run.
    pub fn load(&self) -> Vec<Account> {
        let _guard = self.lock.lock().unwrap();
        self.load_unlocked()
    }

    /// Persist the full account collection.
    pub fn save(&self, accounts: &[Account]) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        write_json_atomic(&self.path, &accounts)
    }

    /// Transition one account to a new state, persisting the change.
    ///
    /// Returns `Ok(true)` if the account was found, `Ok(false)` otherwise.
    /// The read, modification, and write all happen under the store lock.
    pub fn transition(&self, name: &str, state: AccountState, reason: &str) -> Result<bool> {
        let _guard = self.lock.lock().unwrap();
        let mut accounts = self.load_unlocked();

        let Some(account) = accounts.iter_mut().find(|a| a.name == name) else {
            return Ok(false);
        };
        account.set_state(state, reason);

        write_json_atomic(&self.path, &accounts)?;
        Ok(true)
    }

    fn load_unlocked(&self) -> Vec<Account> {
        if !self.path.exists() {
            return Vec::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read account registry {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(
                    "Account registry {:?} is unparsable, treating as empty: {}",
                    self.path, e
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn account(name: &str) -> Account {
        Account {
            name: name.to_string(),
            credentials: HashMap::from([("session".to_string(), "s3cret".to_string())]),
            proxy: Some("user:pass@10.0.0.1:8080".to_string()),
            group: "default".to_string(),
            enabled: true,
            state: AccountState::Alive,
            reason: None,
        }
    }

    fn store_in(dir: &TempDir) -> AccountStore {
        AccountStore::new(dir.path().join("accounts.json"))
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&[account("a"), account("b")]).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "a");
        assert_eq!(loaded[1].proxy.as_deref(), Some("user:pass@10.0.0.1:8080"));
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = AccountStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_transition_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[account("a"), account("b")]).unwrap();

        let found = store
            .transition("b", AccountState::Quarantine, "proxy dead")
            .unwrap();
        assert!(found);

        let loaded = store.load();
        assert_eq!(loaded[0].state, AccountState::Alive);
        assert_eq!(loaded[1].state, AccountState::Quarantine);
        assert_eq!(loaded[1].reason.as_deref(), Some("proxy dead"));
    }

    #[test]
    fn test_transition_missing_account() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[account("a")]).unwrap();

        let found = store
            .transition("ghost", AccountState::Quarantine, "x")
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_transition_back_to_alive_clears_reason() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[account("a")]).unwrap();

        store
            .transition("a", AccountState::RequireLogin, "302 to login")
            .unwrap();
        store.transition("a", AccountState::Alive, "").unwrap();

        let loaded = store.load();
        assert_eq!(loaded[0].state, AccountState::Alive);
        assert_eq!(loaded[0].reason, None);

        // On disk too: alive accounts carry no reason field
        let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
        assert!(!raw.contains("reason"));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&[account("a")]).unwrap();

        assert!(!dir.path().join("accounts.json.tmp").exists());
    }

    #[test]
    fn test_concurrent_transitions_neither_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        store.save(&[account("a"), account("b")]).unwrap();

        let s1 = Arc::clone(&store);
        let s2 = Arc::clone(&store);
        let t1 = std::thread::spawn(move || {
            s1.transition("a", AccountState::Quarantine, "proxy").unwrap()
        });
        let t2 = std::thread::spawn(move || {
            s2.transition("b", AccountState::RequireLogin, "login").unwrap()
        });
        assert!(t1.join().unwrap());
        assert!(t2.join().unwrap());

        let loaded = store.load();
        let a = loaded.iter().find(|x| x.name == "a").unwrap();
        let b = loaded.iter().find(|x| x.name == "b").unwrap();
        assert_eq!(a.state, AccountState::Quarantine);
        assert_eq!(b.state, AccountState::RequireLogin);
    }
}
