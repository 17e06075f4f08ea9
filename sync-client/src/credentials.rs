//! Credential provider abstraction.
//!
//! Token acquisition is outside the engine. It asks for a token before
//! each dispatch and reports rejections so the provider can re-authenticate.

use async_trait::async_trait;
use notesync_types::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Credential errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials for the account.
    #[error("no credentials for {0}")]
    Missing(AccountId),

    /// The service host could not be determined.
    #[error("host resolution failed for {account}: {reason}")]
    HostResolution {
        /// The account.
        account: AccountId,
        /// What went wrong.
        reason: String,
    },
}

/// Supplies per-account access tokens and service hosts.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token.
    async fn access_token(&self, account: &AccountId) -> Result<String, CredentialError>;

    /// The service rejected the token. Start re-authentication.
    async fn on_unauthorized(&self, account: &AccountId);

    /// Resolve the service host the account lives on.
    async fn resolve_host(&self, account: &AccountId) -> Result<String, CredentialError>;
}

/// Fixed tokens per account. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    inner: Arc<Mutex<StaticInner>>,
}

#[derive(Debug, Default)]
struct StaticInner {
    tokens: HashMap<AccountId, String>,
    hosts: HashMap<AccountId, String>,
    unauthorized: Vec<AccountId>,
}

impl StaticCredentials {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StaticInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the token (and a default host) for an account.
    pub fn with_token(self, account: &AccountId, token: &str) -> Self {
        self.set_token(account, token);
        self
    }

    /// Replace the token for an account, as a re-authentication would.
    pub fn set_token(&self, account: &AccountId, token: &str) {
        let mut inner = self.lock();
        inner.tokens.insert(account.clone(), token.to_string());
        inner
            .hosts
            .entry(account.clone())
            .or_insert_with(|| "https://notes.example.com".to_string());
    }

    /// Accounts reported as unauthorized, in order.
    pub fn unauthorized(&self) -> Vec<AccountId> {
        self.lock().unauthorized.clone()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self, account: &AccountId) -> Result<String, CredentialError> {
        self.lock()
            .tokens
            .get(account)
            .cloned()
            .ok_or_else(|| CredentialError::Missing(account.clone()))
    }

    async fn on_unauthorized(&self, account: &AccountId) {
        tracing::info!("Credentials rejected for {}", account);
        self.lock().unauthorized.push(account.clone());
    }

    async fn resolve_host(&self, account: &AccountId) -> Result<String, CredentialError> {
        self.lock()
            .hosts
            .get(account)
            .cloned()
            .ok_or_else(|| CredentialError::HostResolution {
                account: account.clone(),
                reason: "no host configured".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_account_has_token_and_host() {
        let account = AccountId::new("a");
        let credentials = StaticCredentials::new().with_token(&account, "secret");

        assert_eq!(credentials.access_token(&account).await.unwrap(), "secret");
        assert!(credentials.resolve_host(&account).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_account_is_missing() {
        let credentials = StaticCredentials::new();
        let result = credentials.access_token(&AccountId::new("nobody")).await;
        assert!(matches!(result, Err(CredentialError::Missing(_))));
    }

    #[tokio::test]
    async fn unauthorized_reports_are_recorded() {
        let account = AccountId::new("a");
        let credentials = StaticCredentials::new().with_token(&account, "t");

        credentials.on_unauthorized(&account).await;

        assert_eq!(credentials.unauthorized(), vec![account]);
    }
}
