//! Per-call context: cancellation plus caller identity
//!
//! Every storage operation receives a `CallContext`. Wrappers and drivers
//! pass it inward unchanged; the mount races each dispatched call against
//! the context's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub account_id: String,
    pub groups: Vec<String>,
}

impl User {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

/// Cancellable caller context
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    user: Option<Arc<User>>,
    token: Option<Arc<str>>,
}

impl CallContext {
    /// Create a background context with no caller and a fresh token
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context bound to an existing cancellation token
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            user: None,
            token: None,
        }
    }

    /// Context that cancels itself after `timeout`
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_deadline(timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => guard.cancel(),
                _ = guard.cancelled() => {}
            }
        });
        Self::with_cancellation(cancel)
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(Arc::new(user));
        self
    }

    pub fn with_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Caller identity, failing when the context is anonymous
    pub fn require_user(&self) -> Result<&User> {
        self.user().ok_or(StorageError::ContextUserRequired)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Context whose cancellation follows this one but can be cancelled alone
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            user: self.user.clone(),
            token: self.token.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the context is already cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` until it completes or the context is cancelled
    ///
    /// On cancellation the future is dropped, releasing whatever it holds.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled),
            res = fut => res,
        }
    }
}
