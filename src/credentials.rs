//! Credential providers
//!
//! The session asks its provider for the current credential before every
//! connect attempt. A provider returning `None` holds the session in
//! `Degraded` until a credential appears. Sessions built without a provider
//! connect anonymously.

use crate::error::SessionError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of the bearer credential sent on CONNECT
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn current(&self) -> Option<String>;
}

/// CONNECT headers go out unescaped, so a credential holding CR, LF or NUL
/// would end its header line early. Such a credential is never sent.
pub fn validate_credential(credential: &str) -> Result<(), SessionError> {
    match credential.chars().find(|c| matches!(c, '\r' | '\n' | '\0')) {
        Some(ch) => Err(SessionError::InvalidCredential(format!(
            "contains control character {ch:?}"
        ))),
        None => Ok(()),
    }
}

/// A fixed credential
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn current(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads the credential from an environment variable on every call, so a
/// refreshed token is picked up on the next reconnect
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn current(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }
}

/// A credential the application pushes in after login and clears on logout
#[derive(Clone, Default)]
pub struct SharedCredential {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(credential: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(credential.into()))),
        }
    }

    pub async fn set(&self, credential: impl Into<String>) {
        *self.inner.write().await = Some(credential.into());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl CredentialProvider for SharedCredential {
    async fn current(&self) -> Option<String> {
        self.inner.read().await.clone()
    }
}
