//! Root controller: owns the signed-in user and the record collection, and
//! routes every mutation through the backend followed by a full reload.

use std::sync::mpsc::{self, Receiver};

use chrono::Utc;
use tracing::{error, info};

use crate::backend::{Backend, BackendError, ListQuery, Subscription};
use crate::filter::filter_keys;
use crate::models::{ApiKey, AuthState, CategoryFilter, KeyDraft, KeyUpdate, User};
use crate::notify::Toaster;
use crate::wire::{encode_update, StoredKey, WireError};

pub struct Controller {
    backend: Backend,
    user: Option<User>,
    loading: bool,
    keys: Vec<ApiKey>,
    add_dialog_open: bool,
    toaster: Toaster,
    auth_events: Receiver<AuthState>,
    subscription: Option<Subscription>,
}

impl Controller {
    /// Subscribes to auth transitions. The initial state is queued right
    /// away and applied on the first [`Controller::pump_auth_events`].
    pub fn new(backend: Backend) -> Self {
        let (tx, rx) = mpsc::channel();
        let subscription = backend.auth.subscribe(Box::new(move |state: &AuthState| {
            let _ = tx.send(state.clone());
        }));
        Self {
            backend,
            user: None,
            loading: true,
            keys: Vec::new(),
            add_dialog_open: false,
            toaster: Toaster::default(),
            auth_events: rx,
            subscription: Some(subscription),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn keys(&self) -> &[ApiKey] {
        &self.keys
    }

    pub fn key(&self, id: &str) -> Option<&ApiKey> {
        self.keys.iter().find(|k| k.id == id)
    }

    pub fn toaster(&self) -> &Toaster {
        &self.toaster
    }

    pub fn toaster_mut(&mut self) -> &mut Toaster {
        &mut self.toaster
    }

    pub fn is_add_dialog_open(&self) -> bool {
        self.add_dialog_open
    }

    pub fn open_add_dialog(&mut self) {
        self.add_dialog_open = true;
    }

    pub fn close_add_dialog(&mut self) {
        self.add_dialog_open = false;
    }

    /// Applies queued auth transitions. Returns whether any arrived.
    pub fn pump_auth_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(state) = self.auth_events.try_recv() {
            self.on_auth_change(state);
            changed = true;
        }
        changed
    }

    pub fn on_auth_change(&mut self, state: AuthState) {
        let previous = self.user.as_ref().map(|u| u.id.clone());
        self.user = state.user;
        self.loading = state.is_loading;
        match &self.user {
            Some(user) if previous.as_deref() != Some(user.id.as_str()) => {
                info!(user = %user.id, "auth state: signed in");
                self.load_keys();
            }
            Some(_) => {}
            None => {
                if previous.is_some() {
                    info!("auth state: signed out");
                }
                self.clear_keys();
                self.add_dialog_open = false;
            }
        }
    }

    pub fn sign_in(&mut self, passphrase: &str) -> bool {
        let result = self.backend.auth.login(passphrase);
        self.pump_auth_events();
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "sign-in failed");
                self.toaster.error(format!("Failed to sign in: {e}"));
                false
            }
        }
    }

    pub fn sign_out(&mut self) {
        if let Err(e) = self.backend.auth.logout() {
            error!(error = %e, "sign-out failed");
            self.toaster.error("Failed to sign out");
        }
        self.pump_auth_events();
    }

    /// Replaces the collection with the signed-in user's records, newest
    /// first. On failure the previous collection stays as it was.
    pub fn load_keys(&mut self) -> bool {
        let Some(user) = self.user.as_ref() else {
            return false;
        };
        match self.fetch(&user.id) {
            Ok(keys) => {
                self.clear_keys();
                self.keys = keys;
                true
            }
            Err(e) => {
                error!(error = %e, "failed to load API keys");
                self.toaster.error("Failed to load API keys");
                false
            }
        }
    }

    fn fetch(&self, owner: &str) -> Result<Vec<ApiKey>, BackendError> {
        let rows = self.backend.db.list(&ListQuery::newest_first(owner))?;
        let keys = rows
            .into_iter()
            .map(StoredKey::decode)
            .collect::<Result<Vec<_>, WireError>>()?;
        Ok(keys)
    }

    /// Persists a new record built from `draft`. On success the add dialog
    /// closes; on failure it stays open.
    pub fn add_key(&mut self, draft: KeyDraft) -> bool {
        if draft.name.trim().is_empty() || draft.api_key.trim().is_empty() {
            self.toaster.error("Name and API key are required");
            return false;
        }
        let result = self.create(draft);
        match result {
            Ok(id) => {
                info!(id = %id, "API key added");
                self.load_keys();
                self.add_dialog_open = false;
                self.toaster.success("API key added successfully");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to add API key");
                self.toaster.error("Failed to add API key");
                false
            }
        }
    }

    fn create(&self, draft: KeyDraft) -> Result<String, BackendError> {
        let user = self.user.as_ref().ok_or(BackendError::Unauthenticated)?;
        let key = ApiKey::from_draft(draft, &user.id, Utc::now());
        let row = StoredKey::encode(&key)?;
        self.backend.db.create(&row)?;
        Ok(key.id)
    }

    /// Deletes without confirmation.
    pub fn delete_key(&mut self, id: &str) -> bool {
        match self.backend.db.delete(id) {
            Ok(()) => {
                info!(id, "API key deleted");
                self.load_keys();
                self.toaster.success("API key deleted successfully");
                true
            }
            Err(e) => {
                error!(id, error = %e, "failed to delete API key");
                self.toaster.error("Failed to delete API key");
                false
            }
        }
    }

    /// Sends only the fields present in `update`; `updated_at` is always
    /// refreshed.
    pub fn update_key(&mut self, id: &str, update: KeyUpdate) -> bool {
        let result = encode_update(&update, Utc::now())
            .map_err(BackendError::from)
            .and_then(|patch| self.backend.db.update(id, &patch));
        match result {
            Ok(()) => {
                info!(id, "API key updated");
                self.load_keys();
                self.toaster.success("API key updated successfully");
                true
            }
            Err(e) => {
                error!(id, error = %e, "failed to update API key");
                self.toaster.error("Failed to update API key");
                false
            }
        }
    }

    pub fn toggle_active(&mut self, id: &str) -> bool {
        let Some(current) = self.key(id).map(|k| k.is_active) else {
            self.toaster.error("Failed to update API key");
            return false;
        };
        self.update_key(id, KeyUpdate::active(!current))
    }

    pub fn filtered(&self, query: &str, category: CategoryFilter) -> Vec<&ApiKey> {
        filter_keys(&self.keys, query, category)
    }

    fn clear_keys(&mut self) {
        for key in &mut self.keys {
            key.wipe();
        }
        self.keys.clear();
    }

    /// Drops the auth subscription; no further transitions are delivered.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.clear_keys();
    }
}
