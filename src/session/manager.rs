//! Per-account session management.
//!
//! Cookie resolution order: in-memory cache (unexpired and revalidated
//! live against the origin), then automated browser login from the
//! account's credentials file, then the last-known on-disk cookie file.
//! Every successful login persists fresh cookies to disk.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tokio::sync::RwLock;

use crate::accounts::{Account, AccountStore};
use crate::config::OriginConfig;
use crate::error::{Error, Result};
use crate::session::browser::BrowserLogin;
use crate::session::cookies::{parse_cookie_file, parse_credentials_file};

/// Cached sessions live this long before a fresh login is forced.
const SESSION_TTL_DAYS: i64 = 30;

/// Cached authenticated state for one account.
#[derive(Debug, Clone)]
pub struct Session {
    pub cookies: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn fresh(cookies: String) -> Self {
        Self {
            cookies,
            expires_at: Utc::now() + Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Owns authenticated state for every account.
pub struct SessionManager {
    client: Client,
    origin: OriginConfig,
    accounts: Arc<AccountStore>,
    sessions: RwLock<HashMap<String, Session>>,
    browser: BrowserLogin,
}

impl SessionManager {
    pub fn new(client: Client, origin: OriginConfig, accounts: Arc<AccountStore>) -> Self {
        let browser = BrowserLogin::new(origin.user_agent.clone(), None);
        Self {
            client,
            origin,
            accounts,
            sessions: RwLock::new(HashMap::new()),
            browser,
        }
    }

    /// Resolve a usable cookie header for an account.
    pub async fn get_cookies(&self, account_id: &str) -> Result<String> {
        let account = self.accounts.get(account_id)?;

        // 1. Unexpired cached session, revalidated live.
        if let Some(session) = self.cached_session(account_id).await {
            if !session.is_expired() && self.validate_header(&session.cookies).await {
                tracing::debug!("Using cached session for {}", account_id);
                return Ok(session.cookies);
            }
            self.sessions.write().await.remove(account_id);
            tracing::debug!("Cached session for {} no longer valid", account_id);
        }

        // 2. Credential-based automated login.
        match self.login_from_credentials(&account).await {
            Ok(Some(cookies)) => return Ok(cookies),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Automated login failed for {}: {}", account_id, e);
            }
        }

        // 3. Last-known on-disk cookie file.
        let content = tokio::fs::read_to_string(&account.cookie_file)
            .await
            .map_err(|_| {
                Error::Authentication(format!(
                    "No usable session for {}: login failed and no cookie file at {}",
                    account_id,
                    account.cookie_file.display()
                ))
            })?;
        let header = parse_cookie_file(&content)?;
        tracing::debug!("Falling back to on-disk cookies for {}", account_id);
        Ok(header)
    }

    /// Check whether the account currently has a valid session.
    ///
    /// Transport errors are treated as invalid; this never fails.
    pub async fn validate(&self, account_id: &str) -> bool {
        let cookies = {
            if let Some(session) = self.cached_session(account_id).await {
                Some(session.cookies)
            } else {
                match self.accounts.get(account_id) {
                    Ok(account) => tokio::fs::read_to_string(&account.cookie_file)
                        .await
                        .ok()
                        .and_then(|content| parse_cookie_file(&content).ok()),
                    Err(_) => None,
                }
            }
        };

        match cookies {
            Some(cookies) => self.validate_header(&cookies).await,
            None => false,
        }
    }

    /// Log in with explicit credentials and return the cookie header.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        self.browser.login(&self.origin, email, password).await
    }

    /// Drop any cached session and force a fresh resolution.
    pub async fn refresh(&self, account_id: &str) -> Result<String> {
        self.sessions.write().await.remove(account_id);
        self.get_cookies(account_id).await
    }

    /// Issue a lightweight authenticated request and look for the
    /// logged-in marker in the body.
    pub async fn validate_header(&self, cookies: &str) -> bool {
        let response = self
            .client
            .get(&self.origin.base_url)
            .header(reqwest::header::COOKIE, cookies)
            .send()
            .await;

        match response {
            Ok(response) => match response.text().await {
                Ok(body) => body.contains(&self.origin.authenticated_marker),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    async fn cached_session(&self, account_id: &str) -> Option<Session> {
        self.sessions.read().await.get(account_id).cloned()
    }

    /// Attempt browser login from the account's credentials file.
    ///
    /// Returns Ok(None) when the account has no credentials file.
    async fn login_from_credentials(&self, account: &Account) -> Result<Option<String>> {
        let Some(ref credentials_file) = account.credentials_file else {
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(credentials_file).await?;
        let (email, password) = parse_credentials_file(&content)?;

        let cookies = self.browser.login(&self.origin, &email, &password).await?;

        // Persist for the next run before caching in memory.
        if let Err(e) = tokio::fs::write(&account.cookie_file, format!("{}\n", cookies)).await {
            tracing::warn!(
                "Failed to persist cookies to {}: {}",
                account.cookie_file.display(),
                e
            );
        }

        self.sessions
            .write()
            .await
            .insert(account.id.clone(), Session::fresh(cookies.clone()));

        tracing::info!("Logged in as {}", email);

        Ok(Some(cookies))
    }

    #[cfg(test)]
    pub(crate) async fn inject_session(&self, account_id: &str, session: Session) {
        self.sessions
            .write()
            .await
            .insert(account_id.to_string(), session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn test_origin() -> OriginConfig {
        // Unroutable origin: every live validation fails as a transport
        // error, which must read as "invalid", never as a panic or Err.
        toml::from_str(
            r#"
            base_url = "http://127.0.0.1:1"
            "#,
        )
        .unwrap()
    }

    async fn store_with_cookie_file(dir: &Path) -> Arc<AccountStore> {
        std::fs::write(dir.join("alice.cookies"), "PHPSESSID=abc; theme=dark\n").unwrap();
        Arc::new(AccountStore::scan(dir).await.unwrap())
    }

    #[tokio::test]
    async fn test_disk_fallback_when_no_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = store_with_cookie_file(dir.path()).await;
        let manager = SessionManager::new(Client::new(), test_origin(), accounts);

        let cookies = manager.get_cookies("alice").await.unwrap();
        assert_eq!(cookies, "PHPSESSID=abc; theme=dark");
    }

    #[tokio::test]
    async fn test_unknown_account_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = store_with_cookie_file(dir.path()).await;
        let manager = SessionManager::new(Client::new(), test_origin(), accounts);

        assert!(matches!(
            manager.get_cookies("nobody").await,
            Err(Error::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_swallows_transport_errors() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = store_with_cookie_file(dir.path()).await;
        let manager = SessionManager::new(Client::new(), test_origin(), accounts);

        // Origin is unroutable: must be false, not an error.
        assert!(!manager.validate("alice").await);
        assert!(!manager.validate_header("PHPSESSID=abc").await);
    }

    #[tokio::test]
    async fn test_expired_cached_session_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = store_with_cookie_file(dir.path()).await;
        let manager = SessionManager::new(Client::new(), test_origin(), accounts);

        manager
            .inject_session(
                "alice",
                Session {
                    cookies: "PHPSESSID=stale".into(),
                    expires_at: Utc::now() - Duration::days(1),
                },
            )
            .await;

        // Expired cache is skipped; resolution lands on the disk file.
        let cookies = manager.get_cookies("alice").await.unwrap();
        assert_eq!(cookies, "PHPSESSID=abc; theme=dark");
    }

    #[test]
    fn test_session_expiry() {
        let session = Session::fresh("a=1".into());
        assert!(!session.is_expired());

        let expired = Session {
            cookies: "a=1".into(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        assert!(expired.is_expired());
    }
}
