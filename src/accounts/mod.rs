//! Account discovery and state.
//!
//! Accounts are defined by files in the accounts directory: an
//! `<id>.credentials` file (email/password) and/or an `<id>.cookies` file
//! (last-known session cookies). The pipeline mutates cookie files when
//! sessions are refreshed but never deletes an account.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::session::cookies::parse_credentials_file;

/// One account on the origin site.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub cookie_file: PathBuf,
    pub credentials_file: Option<PathBuf>,
    pub is_active: bool,
    pub credits: Option<f64>,
}

/// All accounts discovered at startup, keyed by id.
pub struct AccountStore {
    accounts: Mutex<BTreeMap<String, Account>>,
}

impl AccountStore {
    /// Scan a directory for account files.
    pub async fn scan(directory: &Path) -> Result<Self> {
        let mut accounts: BTreeMap<String, Account> = BTreeMap::new();

        let mut entries = match tokio::fs::read_dir(directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Accounts directory does not exist: {}",
                    directory.display()
                );
                return Ok(Self {
                    accounts: Mutex::new(accounts),
                });
            }
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if extension != "cookies" && extension != "credentials" {
                continue;
            }

            let account = accounts.entry(stem.to_string()).or_insert_with(|| Account {
                id: stem.to_string(),
                email: None,
                cookie_file: directory.join(format!("{}.cookies", stem)),
                credentials_file: None,
                is_active: true,
                credits: None,
            });

            if extension == "credentials" {
                account.credentials_file = Some(path.clone());
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => {
                        if let Ok((email, _)) = parse_credentials_file(&content) {
                            account.email = Some(email);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Unreadable credentials file {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("Discovered {} account(s)", accounts.len());

        Ok(Self {
            accounts: Mutex::new(accounts),
        })
    }

    /// Look up an account by id.
    pub fn get(&self, id: &str) -> Result<Account> {
        self.accounts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// All known account ids.
    pub fn ids(&self) -> Vec<String> {
        self.accounts.lock().unwrap().keys().cloned().collect()
    }

    /// First active account, if any.
    pub fn first_active(&self) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.is_active)
            .cloned()
    }

    /// Toggle an account's active flag.
    pub fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        account.is_active = active;
        Ok(())
    }

    /// Cache a credit balance fetched from the origin.
    pub fn set_credits(&self, id: &str, credits: f64) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        account.credits = Some(credits);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_missing_directory_yields_empty_store() {
        let store = AccountStore::scan(Path::new("/nonexistent/accounts"))
            .await
            .unwrap();
        assert!(store.ids().is_empty());
        assert!(store.first_active().is_none());
    }

    #[tokio::test]
    async fn test_scan_pairs_cookie_and_credentials_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alice.credentials"),
            "email=alice@example.com\npassword=secret\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("alice.cookies"), "session=abc\n").unwrap();
        std::fs::write(dir.path().join("bob.cookies"), "session=def\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = AccountStore::scan(dir.path()).await.unwrap();
        assert_eq!(store.ids(), vec!["alice".to_string(), "bob".to_string()]);

        let alice = store.get("alice").unwrap();
        assert_eq!(alice.email.as_deref(), Some("alice@example.com"));
        assert!(alice.credentials_file.is_some());

        let bob = store.get("bob").unwrap();
        assert!(bob.email.is_none());
        assert!(bob.credentials_file.is_none());
    }

    #[tokio::test]
    async fn test_set_active_and_credits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alice.cookies"), "session=abc\n").unwrap();

        let store = AccountStore::scan(dir.path()).await.unwrap();
        store.set_active("alice", false).unwrap();
        assert!(store.first_active().is_none());

        store.set_credits("alice", 12.5).unwrap();
        assert_eq!(store.get("alice").unwrap().credits, Some(12.5));

        assert!(store.set_active("missing", true).is_err());
    }
}
