use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use serde::{Deserialize, Serialize};
use crate::auth::Account;
use crate::{Error, Result};

/// Persistence for accounts, per-instance bindings and the default account.
///
/// Instance paths are expected to be normalized by the caller
/// (see [`crate::utils::normalize_path`]).
pub trait AccountStore {
    fn get_account(&self, id: &str) -> Option<Account>;

    fn add_or_update_account(&mut self, account: Account) -> Result<()>;

    fn get_account_for_instance(&self, instance: &Path) -> Option<String>;

    fn set_instance_binding(&mut self, instance: &Path, id: &str) -> Result<()>;

    fn default_account(&self) -> Option<String>;

    fn set_default_account(&mut self, id: &str) -> Result<()>;
}

fn instance_key(instance: &Path) -> String {
    instance.to_string_lossy().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    instance_bindings: BTreeMap<String, String>,
    #[serde(default)]
    default_account: Option<String>,
}

/// JSON-file backed store, rewritten on every mutation.
pub struct FileAccountStore {
    data: AccountsFile,
    accounts_file: PathBuf,
}

impl FileAccountStore {
    pub fn new_with_file(accounts_file: PathBuf) -> Self {
        let mut store = Self {
            data: AccountsFile::default(),
            accounts_file,
        };

        if let Err(e) = store.load_accounts() {
            log::warn!("Failed to load accounts: {}", e);
        }

        store
    }

    fn load_accounts(&mut self) -> Result<()> {
        if !self.accounts_file.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.accounts_file)?;
        match serde_json::from_str(&content) {
            Ok(data) => self.data = data,
            Err(e) => {
                // The next save replaces the file, so keep the unreadable copy.
                let backup = self.accounts_file.with_extension("json.bak");
                std::fs::copy(&self.accounts_file, &backup)?;
                log::warn!("Backed up unreadable accounts to {:?}", backup);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn save_accounts(&self) -> Result<()> {
        if let Some(parent) = self.accounts_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.accounts_file.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.accounts_file)?;
        Ok(())
    }
}

impl AccountStore for FileAccountStore {
    fn get_account(&self, id: &str) -> Option<Account> {
        self.data.accounts.iter().find(|a| a.id == id).cloned()
    }

    fn add_or_update_account(&mut self, account: Account) -> Result<()> {
        match self.data.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => self.data.accounts.push(account),
        }
        self.save_accounts()
    }

    fn get_account_for_instance(&self, instance: &Path) -> Option<String> {
        self.data.instance_bindings.get(&instance_key(instance)).cloned()
    }

    fn set_instance_binding(&mut self, instance: &Path, id: &str) -> Result<()> {
        self.data
            .instance_bindings
            .insert(instance_key(instance), id.to_string());
        self.save_accounts()
    }

    fn default_account(&self) -> Option<String> {
        self.data.default_account.clone()
    }

    fn set_default_account(&mut self, id: &str) -> Result<()> {
        if self.get_account(id).is_none() {
            return Err(Error::Store(format!("Account {} not found", id)));
        }
        self.data.default_account = Some(id.to_string());
        self.save_accounts()
    }
}

/// In-memory store for tests and embedding. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    bindings: Arc<RwLock<HashMap<String, String>>>,
    default_account: Arc<RwLock<Option<String>>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Store("Lock poisoned".to_string())
}

impl AccountStore for MemoryAccountStore {
    fn get_account(&self, id: &str) -> Option<Account> {
        self.accounts.read().ok()?.get(id).cloned()
    }

    fn add_or_update_account(&mut self, account: Account) -> Result<()> {
        self.accounts
            .write()
            .map_err(poisoned)?
            .insert(account.id.clone(), account);
        Ok(())
    }

    fn get_account_for_instance(&self, instance: &Path) -> Option<String> {
        self.bindings.read().ok()?.get(&instance_key(instance)).cloned()
    }

    fn set_instance_binding(&mut self, instance: &Path, id: &str) -> Result<()> {
        self.bindings
            .write()
            .map_err(poisoned)?
            .insert(instance_key(instance), id.to_string());
        Ok(())
    }

    fn default_account(&self) -> Option<String> {
        self.default_account.read().ok()?.clone()
    }

    fn set_default_account(&mut self, id: &str) -> Result<()> {
        if self.get_account(id).is_none() {
            return Err(Error::Store(format!("Account {} not found", id)));
        }
        *self.default_account.write().map_err(poisoned)? = Some(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, token: &str) -> Account {
        Account {
            id: id.to_string(),
            display_name: format!("player-{}", id),
            access_token: token.to_string(),
            client_token: None,
            origin: "Test".to_string(),
            login: None,
            profile_bound: true,
            invalid: false,
            last_used: None,
        }
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("accounts.json");
        let instance = dir.path().join("instances").join("A");

        {
            let mut store = FileAccountStore::new_with_file(file.clone());
            store.add_or_update_account(account("1", "t1")).unwrap();
            store.set_default_account("1").unwrap();
            store.set_instance_binding(&instance, "1").unwrap();
        }

        let store = FileAccountStore::new_with_file(file);
        assert_eq!(store.get_account("1").unwrap().access_token, "t1");
        assert_eq!(store.default_account().as_deref(), Some("1"));
        assert_eq!(store.get_account_for_instance(&instance).as_deref(), Some("1"));
    }

    #[test]
    fn test_update_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileAccountStore::new_with_file(dir.path().join("accounts.json"));
        store.add_or_update_account(account("1", "old")).unwrap();
        store.add_or_update_account(account("1", "new")).unwrap();

        assert_eq!(store.get_account("1").unwrap().access_token, "new");

        let saved: AccountsFile =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("accounts.json")).unwrap()).unwrap();
        assert_eq!(saved.accounts.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_backed_up_before_save() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("accounts.json");
        std::fs::write(&file, "{ not json").unwrap();

        let mut store = FileAccountStore::new_with_file(file.clone());
        assert!(store.get_account("1").is_none());
        assert!(store.default_account().is_none());

        store.add_or_update_account(account("1", "t")).unwrap();
        let backup = dir.path().join("accounts.json.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ not json");
        assert!(std::fs::read_to_string(file).unwrap().contains("\"t\""));
    }

    #[test]
    fn test_default_must_exist() {
        let mut store = MemoryAccountStore::new();
        assert!(matches!(store.set_default_account("ghost"), Err(Error::Store(_))));

        store.add_or_update_account(account("1", "t")).unwrap();
        store.set_default_account("1").unwrap();
        assert_eq!(store.default_account().as_deref(), Some("1"));
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryAccountStore::new();
        let mut writer = store.clone();
        writer.add_or_update_account(account("1", "t")).unwrap();
        writer.set_instance_binding(Path::new("/instances/A"), "1").unwrap();

        assert!(store.get_account("1").is_some());
        assert_eq!(store.get_account_for_instance(Path::new("/instances/A")).as_deref(), Some("1"));
    }
}
