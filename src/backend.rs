//! Authentication and record-store facade.
//!
//! The application talks to its backend only through [`AuthProvider`] and
//! [`KeyStore`]. The shipped implementation is
//! [`LocalBackend`](crate::storage::LocalBackend); tests inject doubles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::AuthState;
use crate::wire::{StoredKey, StoredPatch, WireError};

pub type AuthListener = Box<dyn Fn(&AuthState) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record {0} belongs to another user")]
    Forbidden(String),
    #[error("record {0} already exists")]
    Conflict(String),
    #[error("invalid passphrase")]
    InvalidCredentials,
    #[error("sign-in locked, try again in {remaining_secs} seconds")]
    LockedOut { remaining_secs: u64 },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub trait AuthProvider: Send + Sync {
    /// Registers `listener`; it is called right away with the current state
    /// and again on every sign-in or sign-out.
    fn subscribe(&self, listener: AuthListener) -> Subscription;
    fn login(&self, passphrase: &str) -> Result<(), BackendError>;
    fn logout(&self) -> Result<(), BackendError>;
}

pub trait KeyStore: Send + Sync {
    fn list(&self, query: &ListQuery) -> Result<Vec<StoredKey>, BackendError>;
    fn create(&self, row: &StoredKey) -> Result<(), BackendError>;
    fn update(&self, id: &str, patch: &StoredPatch) -> Result<(), BackendError>;
    fn delete(&self, id: &str) -> Result<(), BackendError>;
}

/// Rows owned by `owner`, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub owner: String,
}

impl ListQuery {
    pub fn newest_first(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }
}

/// Stable sort of stored rows, newest creation time first. Rows whose
/// timestamp does not parse sort last.
pub fn sort_rows(rows: &mut [StoredKey]) {
    let created = |row: &StoredKey| -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&row.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };
    rows.sort_by(|a, b| created(b).cmp(&created(a)));
}

/// Handle returned by [`AuthProvider::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Listener registry shared by auth providers.
#[derive(Default)]
pub struct AuthListeners {
    inner: Arc<ListenerTable>,
}

#[derive(Default)]
struct ListenerTable {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Arc<AuthListener>)>>,
}

impl AuthListeners {
    pub fn add(&self, listener: AuthListener) -> (Arc<AuthListener>, Subscription) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(listener);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&listener)));
        let table: Weak<ListenerTable> = Arc::downgrade(&self.inner);
        let subscription = Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                table
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        });
        (listener, subscription)
    }

    pub fn emit(&self, state: &AuthState) {
        let listeners: Vec<Arc<AuthListener>> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The auth/db pair handed to the controller.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub db: Arc<dyn KeyStore>,
}

impl Backend {
    pub fn from_shared<T>(inner: Arc<T>) -> Self
    where
        T: AuthProvider + KeyStore + 'static,
    {
        Self {
            auth: inner.clone(),
            db: inner,
        }
    }
}
