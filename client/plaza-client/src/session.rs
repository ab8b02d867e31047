//! Authenticated identity
//!
//! The session is restored from durable storage at startup. Login and
//! register persist the returned account; logout clears both persisted keys.

use crate::api::AuthApi;
use crate::models::{Account, LoginRequest, RegisterRequest};
use crate::storage::{KeyValueStore, StorageKey};
use error_types::{ClientError, ClientResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

pub struct SessionStore {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn KeyValueStore>,
    account: RwLock<Option<Account>>,
    changes: watch::Sender<Option<Account>>,
}

impl SessionStore {
    /// Build the store, restoring any persisted account
    pub fn restore(api: Arc<dyn AuthApi>, storage: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        let account: Option<Account> = storage.load(StorageKey::Account)?;
        if let Some(account) = &account {
            info!(account_id = %account.id, "Restored session");
        }

        let (changes, _) = watch::channel(account.clone());
        Ok(Self {
            api,
            storage,
            account: RwLock::new(account),
            changes,
        })
    }

    pub fn current(&self) -> Option<Account> {
        self.account.read().clone()
    }

    pub fn account_id(&self) -> Option<Uuid> {
        self.account.read().as_ref().map(|a| a.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.read().is_some()
    }

    /// Current account, or a validation error naming the attempted action
    pub fn require(&self, action: &str) -> ClientResult<Account> {
        self.current()
            .ok_or_else(|| ClientError::not_authenticated(action))
    }

    /// Observe sign-in and sign-out
    pub fn subscribe(&self) -> watch::Receiver<Option<Account>> {
        self.changes.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Account> {
        let request = LoginRequest {
            email: required("email", email)?,
            password: required("password", password)?,
        };

        let account = self.api.login(&request).await?;
        self.establish(account.clone())?;
        info!(account_id = %account.id, "Signed in");
        Ok(account)
    }

    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> ClientResult<Account> {
        let request = RegisterRequest {
            email: required("email", email)?,
            password: required("password", password)?,
            full_name: required("fullName", full_name)?,
        };

        let account = self.api.register(&request).await?;
        self.establish(account.clone())?;
        info!(account_id = %account.id, "Registered account");
        Ok(account)
    }

    /// Sign out. Local state is cleared even when the backend call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Backend logout failed, clearing local session anyway");
        }

        self.storage.remove(StorageKey::Account)?;
        self.storage.remove(StorageKey::Profile)?;
        *self.account.write() = None;
        self.changes.send_replace(None);

        info!("Signed out");
        Ok(())
    }

    fn establish(&self, account: Account) -> ClientResult<()> {
        self.storage.save(StorageKey::Account, &account)?;
        *self.account.write() = Some(account.clone());
        self.changes.send_replace(Some(account));
        Ok(())
    }
}

fn required(field: &str, value: &str) -> ClientResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(error_types::ValidationError::new(format!("{field} must not be blank"))
            .add_field_error(field, "blank", format!("{field} is required"))
            .into());
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use crate::storage::MemoryStore;

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "ada@plaza.dev".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_login_persists_account() {
        let expected = account();
        let returned = expected.clone();

        let mut api = MockAuthApi::new();
        api.expect_login()
            .withf(|req| req.email == "ada@plaza.dev" && req.password == "Secret1!")
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let session = SessionStore::restore(Arc::new(api), storage.clone()).unwrap();

        session.login(" ada@plaza.dev ", "Secret1!").await.unwrap();

        assert_eq!(session.account_id(), Some(expected.id));
        let stored: Option<Account> = storage.load(StorageKey::Account).unwrap();
        assert_eq!(stored, Some(expected));
    }

    #[tokio::test]
    async fn test_blank_password_never_reaches_backend() {
        let mut api = MockAuthApi::new();
        api.expect_login().never();

        let session = SessionStore::restore(Arc::new(api), Arc::new(MemoryStore::new())).unwrap();
        let result = session.login("ada@plaza.dev", "  ").await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_backend_fails() {
        let mut api = MockAuthApi::new();
        api.expect_logout()
            .times(1)
            .returning(|| Err(ClientError::http_status("logout", 500, None)));

        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage.save(StorageKey::Account, &account()).unwrap();

        let session = SessionStore::restore(Arc::new(api), storage.clone()).unwrap();
        let mut changes = session.subscribe();
        assert!(session.is_authenticated());

        session.logout().await.unwrap();

        assert!(!session.is_authenticated());
        assert!(storage.get_raw(StorageKey::Account).unwrap().is_none());
        assert!(changes.has_changed().unwrap());
        assert!(changes.borrow_and_update().is_none());
    }

    #[test]
    fn test_require_names_the_action() {
        let session =
            SessionStore::restore(Arc::new(MockAuthApi::new()), Arc::new(MemoryStore::new())).unwrap();
        let error = session.require("like posts").unwrap_err();
        assert!(error.to_string().contains("like posts"));
    }
}
