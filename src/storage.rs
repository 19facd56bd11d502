use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::backend::{
    sort_rows, AuthListener, AuthListeners, AuthProvider, BackendError, KeyStore, ListQuery,
    Subscription,
};
use crate::crypto::{derive_key, random_key, random_salt, seal, unseal, KdfParams, Sealed, KEY_LEN};
use crate::models::{AuthState, User};
use crate::wire::{StoredKey, StoredPatch};

pub const DATA_DIR: &str = ".keyledger";
pub const VAULT_FILE: &str = "vault.json";
pub const LOCK_FILE: &str = "lock.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "keyledger.log";
const KEYRING_SERVICE: &str = "keyledger";
const KEYRING_REV_PREFIX: &str = "vault-revision";
const VAULT_FORMAT_VERSION: u8 = 1;
const KDF_SALT_LEN: usize = 16;
pub const MAX_ATTEMPTS: u8 = 3;
pub const LOCK_SECONDS: u64 = 120;

#[derive(Serialize, Deserialize)]
struct LockState {
    unlock_at: u64,
}

#[derive(Serialize, Deserialize)]
pub struct Config {
    pub data_dir: String,
}

/// Sealed payload of the vault file.
#[derive(Serialize, Deserialize, Clone)]
pub struct VaultData {
    /// Random id fixed at initialization; keys the trusted revision.
    #[serde(default)]
    pub vault_id: String,
    #[serde(default)]
    pub revision: u64,
    pub profile: User,
    #[serde(default)]
    pub keys: Vec<StoredKey>,
}

impl VaultData {
    fn wipe(&mut self) {
        for row in &mut self.keys {
            row.api_key.zeroize();
            row.name.zeroize();
        }
        self.keys.clear();
        self.keys.shrink_to_fit();
    }
}

#[derive(Serialize, Deserialize)]
struct VaultFile {
    version: u8,
    kdf: KdfParams,
    kdf_salt: String,
    wrapped_key: Sealed,
    vault: Sealed,
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))
}

pub fn default_base_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(DATA_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(default_base_dir()?.join(CONFIG_FILE))
}

pub fn load_config() -> Result<Option<Config>> {
    read_config(&config_path()?)
}

fn read_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let cfg: Config = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(Some(cfg))
}

/// Remembers `data_dir` as the default store and returns the absolute path
/// written. The directory must exist and live under the home directory.
pub fn save_config(data_dir: &Path) -> Result<PathBuf> {
    let home = home_dir()?;
    write_config(&home.join(DATA_DIR).join(CONFIG_FILE), &home, data_dir)
}

fn write_config(path: &Path, home: &Path, data_dir: &Path) -> Result<PathBuf> {
    let real = fs::canonicalize(data_dir)
        .with_context(|| format!("Failed to resolve {}", data_dir.display()))?;
    let checked = validate_data_dir_under(home, &real)?;
    let cfg = Config {
        data_dir: checked
            .to_str()
            .ok_or_else(|| anyhow!("Invalid data dir path"))?
            .to_string(),
    };
    let data = serde_json::to_string_pretty(&cfg)?;
    atomic_write(path, data.as_bytes())?;
    restrict_file(path)?;
    Ok(checked)
}

/// Picks the data directory: an explicit path wins, then the config file,
/// then `~/.keyledger`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    let home = home_dir()?;
    resolve_configured(&home.join(DATA_DIR).join(CONFIG_FILE), &home)
}

fn resolve_configured(config: &Path, home: &Path) -> Result<PathBuf> {
    match read_config(config)? {
        Some(cfg) => validate_data_dir_under(home, Path::new(&cfg.data_dir)),
        None => Ok(home.join(DATA_DIR)),
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    restrict_dir(dir)
}

fn validate_data_dir_under(home: &Path, raw: &Path) -> Result<PathBuf> {
    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        home.join(raw)
    };

    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(anyhow!(
            "Configured data path is invalid: parent traversal is not allowed"
        ));
    }
    let home_real = fs::canonicalize(home).unwrap_or_else(|_| home.to_path_buf());
    if !candidate.starts_with(home) && !candidate.starts_with(&home_real) {
        return Err(anyhow!(
            "Configured data path must be inside home directory ({})",
            home.display()
        ));
    }

    if candidate.exists() {
        let real = fs::canonicalize(&candidate)?;
        if !real.starts_with(&home_real) {
            return Err(anyhow!(
                "Configured data path resolves outside home directory ({})",
                home.display()
            ));
        }
    }

    Ok(candidate)
}

fn unix_now() -> Result<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("Clock error: {e}"))?;
    Ok(now.as_secs())
}

fn load_lock(path: &Path) -> Result<Option<u64>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let lock: LockState = serde_json::from_str(&raw)?;
    Ok(Some(lock.unlock_at))
}

fn save_lock(path: &Path, unlock_at: u64) -> Result<()> {
    let data = serde_json::to_string_pretty(&LockState { unlock_at })?;
    atomic_write(path, data.as_bytes())?;
    restrict_file(path)?;
    Ok(())
}

fn clear_lock(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Seconds until sign-in is allowed again; expired locks are removed.
pub fn lock_remaining(path: &Path) -> Result<Option<u64>> {
    match load_lock(path)? {
        Some(until) => {
            let now = unix_now()?;
            if now < until {
                Ok(Some(until - now))
            } else {
                clear_lock(path)?;
                Ok(None)
            }
        }
        None => Ok(None),
    }
}

fn read_vault_file(path: &Path) -> Result<VaultFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: VaultFile = serde_json::from_str(&raw)?;
    if file.version != VAULT_FORMAT_VERSION {
        return Err(anyhow!("Unsupported vault format version: {}", file.version));
    }
    Ok(file)
}

fn unlock_vault(file: &VaultFile, passphrase: &str) -> Result<VaultData> {
    let salt = base64::engine::general_purpose::STANDARD
        .decode(&file.kdf_salt)
        .map_err(|e| anyhow!("Invalid vault salt encoding: {e}"))?;
    let kek = derive_key(passphrase, &salt, file.kdf)?;
    let dek = unseal(&kek, &file.wrapped_key)?;
    let dek: [u8; KEY_LEN] = dek
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Invalid wrapped key length in vault"))?;
    let plaintext = unseal(&dek, &file.vault);
    let mut dek = dek;
    dek.zeroize();
    let vault: VaultData = serde_json::from_slice(&plaintext?)?;
    Ok(vault)
}

fn save_vault(path: &Path, vault: &VaultData, passphrase: &str, params: KdfParams) -> Result<()> {
    let salt: [u8; KDF_SALT_LEN] = random_salt();
    let kek = derive_key(passphrase, &salt, params)?;
    let dek = random_key();

    let wrapped_key = seal(&kek, dek.as_slice())?;
    let mut plaintext = serde_json::to_vec(vault)?;
    let sealed = seal(&dek, &plaintext);
    plaintext.zeroize();
    let file = VaultFile {
        version: VAULT_FORMAT_VERSION,
        kdf: params,
        kdf_salt: base64::engine::general_purpose::STANDARD.encode(salt),
        wrapped_key,
        vault: sealed?,
    };
    let serialized = serde_json::to_string_pretty(&file)?;
    atomic_write(path, serialized.as_bytes())?;
    restrict_file(path)?;
    Ok(())
}

fn new_vault_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Last revision written for each vault, kept outside the data directory so
/// an older copy of `vault.json` can be recognised.
pub trait RevisionStore: Send + Sync {
    fn load(&self, vault_id: &str) -> Result<Option<u64>>;
    fn store(&self, vault_id: &str, revision: u64) -> Result<()>;
}

/// OS keyring entry per vault: `keyledger` / `vault-revision:<id>`.
pub struct KeyringRevisions;

impl KeyringRevisions {
    fn entry(vault_id: &str) -> Result<keyring::Entry> {
        let user = format!("{KEYRING_REV_PREFIX}:{vault_id}");
        Ok(keyring::Entry::new(KEYRING_SERVICE, &user)?)
    }
}

impl RevisionStore for KeyringRevisions {
    fn load(&self, vault_id: &str) -> Result<Option<u64>> {
        match Self::entry(vault_id)?.get_password() {
            Ok(stored) => {
                let parsed = stored
                    .parse::<u64>()
                    .map_err(|e| anyhow!("Invalid trusted revision in keyring: {e}"))?;
                Ok(Some(parsed))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!("Keyring read error: {e}")),
        }
    }

    fn store(&self, vault_id: &str, revision: u64) -> Result<()> {
        Self::entry(vault_id)?
            .set_password(&revision.to_string())
            .map_err(|e| anyhow!("Keyring write error: {e}"))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| anyhow!("Invalid target path"))?;
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| anyhow!("Atomic write failed: {}", e.error))?;
    Ok(())
}

pub(crate) fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

fn restrict_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct LocalOptions {
    pub kdf: KdfParams,
    /// Record the last written revision in the OS keyring and refuse older
    /// vault files on sign-in.
    pub track_revisions: bool,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            track_revisions: true,
        }
    }
}

struct Session {
    passphrase: String,
    vault: VaultData,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.passphrase.zeroize();
        self.vault.wipe();
    }
}

/// File-backed auth provider and record store. Signing in unseals the vault
/// file; every mutation re-seals it under a fresh salt and data key.
pub struct LocalBackend {
    dir: PathBuf,
    options: LocalOptions,
    revisions: Option<Arc<dyn RevisionStore>>,
    session: Mutex<Option<Session>>,
    failed_attempts: AtomicU8,
    listeners: AuthListeners,
}

impl LocalBackend {
    pub fn open(dir: impl Into<PathBuf>, options: LocalOptions) -> Self {
        let revisions: Option<Arc<dyn RevisionStore>> = if options.track_revisions {
            Some(Arc::new(KeyringRevisions))
        } else {
            None
        };
        Self {
            dir: dir.into(),
            options,
            revisions,
            session: Mutex::new(None),
            failed_attempts: AtomicU8::new(0),
            listeners: AuthListeners::default(),
        }
    }

    /// Replaces the keyring with another revision store.
    pub fn with_revision_store(mut self, store: Arc<dyn RevisionStore>) -> Self {
        self.revisions = Some(store);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vault_path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.vault_path().exists()
    }

    /// Creates an empty vault owned by `profile`.
    pub fn initialize(&self, profile: User, passphrase: &str) -> Result<()> {
        if self.is_initialized() {
            return Err(anyhow!(
                "A vault already exists at {}",
                self.vault_path().display()
            ));
        }
        ensure_dir(&self.dir)?;
        let vault = VaultData {
            vault_id: new_vault_id(),
            revision: 0,
            profile,
            keys: Vec::new(),
        };
        self.persist(vault, passphrase)?;
        info!(path = %self.vault_path().display(), "vault initialized");
        Ok(())
    }

    fn current_state(&self) -> AuthState {
        match self.lock_session().as_ref() {
            Some(session) => AuthState::signed_in(session.vault.profile.clone()),
            None => AuthState::signed_out(),
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, mut vault: VaultData, passphrase: &str) -> Result<VaultData> {
        vault.revision = vault.revision.saturating_add(1);
        save_vault(&self.vault_path(), &vault, passphrase, self.options.kdf)?;
        if let Some(revisions) = &self.revisions {
            if let Err(e) = revisions.store(&self.revision_key(&vault), vault.revision) {
                warn!(error = %e, "could not record trusted revision");
            }
        }
        Ok(vault)
    }

    fn revision_key(&self, vault: &VaultData) -> String {
        if vault.vault_id.is_empty() {
            self.dir.display().to_string()
        } else {
            vault.vault_id.clone()
        }
    }

    fn verify_revision(&self, vault: &VaultData) -> Result<(), BackendError> {
        let Some(revisions) = &self.revisions else {
            return Ok(());
        };
        let key = self.revision_key(vault);
        let trusted = match revisions.load(&key) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "trusted revision unavailable, skipping rollback check");
                return Ok(());
            }
        };
        match trusted {
            Some(trusted) if vault.revision < trusted => Err(BackendError::Storage(anyhow!(
                "Vault rollback detected (loaded revision {} is older than trusted revision {})",
                vault.revision,
                trusted
            ))),
            Some(trusted) if vault.revision == trusted => Ok(()),
            _ => {
                if let Err(e) = revisions.store(&key, vault.revision) {
                    warn!(error = %e, "could not record trusted revision");
                }
                Ok(())
            }
        }
    }

    fn register_failure(&self) -> Result<(), BackendError> {
        let attempts = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= MAX_ATTEMPTS {
            self.failed_attempts.store(0, Ordering::SeqCst);
            let unlock_at = unix_now()? + LOCK_SECONDS;
            save_lock(&self.lock_path(), unlock_at)?;
            warn!(attempts, "too many failed sign-ins, locking");
            return Err(BackendError::LockedOut {
                remaining_secs: LOCK_SECONDS,
            });
        }
        Err(BackendError::InvalidCredentials)
    }

    /// Runs `change` against a copy of the vault and commits the copy only
    /// once it has been written to disk.
    fn mutate<F>(&self, change: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut VaultData) -> Result<(), BackendError>,
    {
        let mut guard = self.lock_session();
        let session = guard.as_mut().ok_or(BackendError::Unauthenticated)?;
        let mut draft = session.vault.clone();
        change(&mut draft)?;
        let committed = self.persist(draft, &session.passphrase)?;
        let mut previous = std::mem::replace(&mut session.vault, committed);
        previous.wipe();
        Ok(())
    }
}

impl AuthProvider for LocalBackend {
    fn subscribe(&self, listener: AuthListener) -> Subscription {
        let (listener, subscription) = self.listeners.add(listener);
        listener(&self.current_state());
        subscription
    }

    fn login(&self, passphrase: &str) -> Result<(), BackendError> {
        if let Some(remaining_secs) = lock_remaining(&self.lock_path())? {
            return Err(BackendError::LockedOut { remaining_secs });
        }
        let file = read_vault_file(&self.vault_path())?;
        self.listeners.emit(&AuthState::loading());

        let vault = match unlock_vault(&file, passphrase) {
            Ok(vault) => vault,
            Err(e) => {
                debug!(error = %e, "unlock failed");
                self.listeners.emit(&AuthState::signed_out());
                return self.register_failure();
            }
        };
        if let Err(e) = self.verify_revision(&vault) {
            self.listeners.emit(&AuthState::signed_out());
            return Err(e);
        }

        self.failed_attempts.store(0, Ordering::SeqCst);
        let profile = vault.profile.clone();
        *self.lock_session() = Some(Session {
            passphrase: passphrase.to_string(),
            vault,
        });
        info!(user = %profile.id, "signed in");
        self.listeners.emit(&AuthState::signed_in(profile));
        Ok(())
    }

    fn logout(&self) -> Result<(), BackendError> {
        let previous = self.lock_session().take();
        if previous.is_some() {
            info!("signed out");
        }
        drop(previous);
        self.listeners.emit(&AuthState::signed_out());
        Ok(())
    }
}

impl KeyStore for LocalBackend {
    fn list(&self, query: &ListQuery) -> Result<Vec<StoredKey>, BackendError> {
        let guard = self.lock_session();
        let session = guard.as_ref().ok_or(BackendError::Unauthenticated)?;
        if session.vault.profile.id != query.owner {
            return Ok(Vec::new());
        }
        let mut rows: Vec<StoredKey> = session
            .vault
            .keys
            .iter()
            .filter(|row| row.user_id == query.owner)
            .cloned()
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }

    fn create(&self, row: &StoredKey) -> Result<(), BackendError> {
        self.mutate(|vault| {
            if row.user_id != vault.profile.id {
                return Err(BackendError::Forbidden(row.id.clone()));
            }
            if vault.keys.iter().any(|existing| existing.id == row.id) {
                return Err(BackendError::Conflict(row.id.clone()));
            }
            vault.keys.push(row.clone());
            Ok(())
        })
    }

    fn update(&self, id: &str, patch: &StoredPatch) -> Result<(), BackendError> {
        self.mutate(|vault| {
            let owner = vault.profile.id.clone();
            let row = vault
                .keys
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            if row.user_id != owner {
                return Err(BackendError::Forbidden(id.to_string()));
            }
            patch.apply_to(row);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.mutate(|vault| {
            let pos = vault
                .keys
                .iter()
                .position(|row| row.id == id)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            if vault.keys[pos].user_id != vault.profile.id {
                return Err(BackendError::Forbidden(id.to_string()));
            }
            let mut removed = vault.keys.remove(pos);
            removed.api_key.zeroize();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PASS: &str = "Sup3r-secret!";

    fn options() -> LocalOptions {
        LocalOptions {
            kdf: KdfParams {
                m_cost: 1024,
                t_cost: 1,
                p_cost: 1,
            },
            track_revisions: false,
        }
    }

    fn profile() -> User {
        User {
            id: "user_local".into(),
            email: "ada@example.com".into(),
            display_name: Some("Ada Lovelace".into()),
        }
    }

    fn row(id: &str, owner: &str, created_at: &str) -> StoredKey {
        StoredKey {
            id: id.into(),
            user_id: owner.into(),
            name: format!("name {id}"),
            description: None,
            api_key: "sk-1234567890".into(),
            category: "ai".into(),
            service_url: None,
            expires_at: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
            last_used_at: None,
            is_active: 1,
            tags: Some("[]".into()),
        }
    }

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::open(dir.path().join("data"), options());
        backend.initialize(profile(), PASS).unwrap();
        (dir, backend)
    }

    #[test]
    fn store_requires_sign_in() {
        let (_dir, backend) = backend();
        let query = ListQuery::newest_first("user_local");
        assert!(matches!(
            backend.list(&query),
            Err(BackendError::Unauthenticated)
        ));
    }

    #[test]
    fn records_survive_a_fresh_sign_in() {
        let (dir, backend) = backend();
        backend.login(PASS).unwrap();
        backend
            .create(&row("key_a", "user_local", "2026-10-01T00:00:00.000Z"))
            .unwrap();
        backend
            .create(&row("key_b", "user_local", "2026-10-02T00:00:00.000Z"))
            .unwrap();
        backend.logout().unwrap();

        let reopened = LocalBackend::open(dir.path().join("data"), options());
        reopened.login(PASS).unwrap();
        let rows = reopened
            .list(&ListQuery::newest_first("user_local"))
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["key_b", "key_a"]);
    }

    #[test]
    fn vault_file_does_not_contain_plaintext_secrets() {
        let (_dir, backend) = backend();
        backend.login(PASS).unwrap();
        backend
            .create(&row("key_a", "user_local", "2026-10-01T00:00:00.000Z"))
            .unwrap();
        let raw = fs::read_to_string(backend.vault_path()).unwrap();
        assert!(!raw.contains("sk-1234567890"));
        assert!(!raw.contains("ada@example.com"));
    }

    #[test]
    fn foreign_rows_are_refused() {
        let (_dir, backend) = backend();
        backend.login(PASS).unwrap();
        let err = backend
            .create(&row("key_x", "someone_else", "2026-10-01T00:00:00.000Z"))
            .unwrap_err();
        assert!(matches!(err, BackendError::Forbidden(_)));
        assert!(backend
            .list(&ListQuery::newest_first("someone_else"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let (_dir, backend) = backend();
        backend.login(PASS).unwrap();
        let patch = StoredPatch {
            updated_at: "2026-10-16T00:00:00.000Z".into(),
            is_active: Some(0),
            ..StoredPatch::default()
        };
        assert!(matches!(
            backend.update("nope", &patch),
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete("nope"),
            Err(BackendError::NotFound(_))
        ));

        backend
            .create(&row("key_a", "user_local", "2026-10-01T00:00:00.000Z"))
            .unwrap();
        backend.update("key_a", &patch).unwrap();
        let rows = backend.list(&ListQuery::newest_first("user_local")).unwrap();
        assert_eq!(rows[0].is_active, 0);
        assert_eq!(rows[0].updated_at, "2026-10-16T00:00:00.000Z");

        backend.delete("key_a").unwrap();
        assert!(backend
            .list(&ListQuery::newest_first("user_local"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn repeated_bad_passphrases_lock_sign_in() {
        let (_dir, backend) = backend();
        for _ in 0..MAX_ATTEMPTS - 1 {
            assert!(matches!(
                backend.login("wrong"),
                Err(BackendError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            backend.login("wrong"),
            Err(BackendError::LockedOut { .. })
        ));
        assert!(matches!(
            backend.login(PASS),
            Err(BackendError::LockedOut { .. })
        ));
        assert!(lock_remaining(&backend.lock_path()).unwrap().is_some());
    }

    #[test]
    fn listeners_see_sign_in_and_sign_out() {
        let (_dir, backend) = backend();
        let seen: Arc<Mutex<Vec<AuthState>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _subscription = backend.subscribe(Box::new(move |state| {
            sink.lock().unwrap().push(state.clone());
        }));
        backend.login(PASS).unwrap();
        backend.logout().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&AuthState::signed_out()));
        assert!(seen.contains(&AuthState::loading()));
        assert!(seen.contains(&AuthState::signed_in(profile())));
        assert_eq!(seen.last(), Some(&AuthState::signed_out()));
    }

    #[test]
    fn initialize_refuses_to_overwrite() {
        let (_dir, backend) = backend();
        assert!(backend.initialize(profile(), PASS).is_err());
    }

    #[derive(Default)]
    struct MemoryRevisions(Mutex<std::collections::HashMap<String, u64>>);

    impl RevisionStore for MemoryRevisions {
        fn load(&self, vault_id: &str) -> Result<Option<u64>> {
            Ok(self.0.lock().unwrap().get(vault_id).copied())
        }

        fn store(&self, vault_id: &str, revision: u64) -> Result<()> {
            self.0.lock().unwrap().insert(vault_id.to_string(), revision);
            Ok(())
        }
    }

    fn tracked(dir: &Path, revisions: &Arc<MemoryRevisions>) -> LocalBackend {
        let shared: Arc<dyn RevisionStore> = revisions.clone();
        let backend = LocalBackend::open(dir, options()).with_revision_store(shared);
        backend.initialize(profile(), PASS).unwrap();
        backend
    }

    #[test]
    fn each_store_keeps_its_own_trusted_revision() {
        let dir = tempfile::tempdir().unwrap();
        let revisions = Arc::new(MemoryRevisions::default());

        let first = tracked(&dir.path().join("first"), &revisions);
        first.login(PASS).unwrap();
        for (i, id) in ["key_a", "key_b", "key_c"].iter().enumerate() {
            let created = format!("2026-10-0{}T00:00:00.000Z", i + 1);
            first.create(&row(id, "user_local", &created)).unwrap();
        }

        let second = tracked(&dir.path().join("second"), &revisions);
        second.login(PASS).unwrap();

        let mut trusted: Vec<u64> = revisions.0.lock().unwrap().values().copied().collect();
        trusted.sort_unstable();
        assert_eq!(trusted, [1, 4]);
    }

    #[test]
    fn older_vault_copy_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let revisions = Arc::new(MemoryRevisions::default());
        let backend = tracked(&dir.path().join("data"), &revisions);
        let snapshot = fs::read(backend.vault_path()).unwrap();

        backend.login(PASS).unwrap();
        backend
            .create(&row("key_a", "user_local", "2026-10-01T00:00:00.000Z"))
            .unwrap();
        backend.logout().unwrap();

        fs::write(backend.vault_path(), snapshot).unwrap();
        let err = backend.login(PASS).unwrap_err();
        assert!(err.to_string().contains("rollback"), "{err}");
    }

    #[test]
    fn config_records_absolute_path_inside_home() {
        let home = tempfile::tempdir().unwrap();
        let config = home.path().join(DATA_DIR).join(CONFIG_FILE);
        let store = home.path().join("vaults").join("work");
        ensure_dir(&store).unwrap();

        let saved = write_config(&config, home.path(), &store).unwrap();
        assert!(saved.is_absolute());
        assert_eq!(resolve_configured(&config, home.path()).unwrap(), saved);
        assert_eq!(fs::canonicalize(&saved).unwrap(), fs::canonicalize(&store).unwrap());
    }

    #[test]
    fn config_outside_home_is_not_written() {
        let home = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let config = home.path().join(DATA_DIR).join(CONFIG_FILE);

        assert!(write_config(&config, home.path(), elsewhere.path()).is_err());
        assert!(!config.exists());
        assert_eq!(
            resolve_configured(&config, home.path()).unwrap(),
            home.path().join(DATA_DIR)
        );
    }
}
