//! Persistence for the session pair and the pending OAuth flow.
//!
//! Both stores sit on a [`KeyValueStore`] so the same code runs against a durable
//! JSON file (token + profile, OAuth state in the CLI) or an in-memory map (tab
//! scoped state, tests). Multi-key writes are applied as one unit: either every
//! key lands or none does.

use super::{
    errors::AuthError,
    types::{OAuthPurpose, OAuthState, UserProfile},
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, instrument, warn};

pub const TOKEN_KEY: &str = "token";
pub const PROFILE_KEY: &str = "profile";
pub const OAUTH_STATE_KEY: &str = "oauth_state";
pub const OAUTH_PROVIDER_KEY: &str = "oauth_provider";
pub const OAUTH_SIGNUP_KEY: &str = "oauth_signup";

/// String key-value storage with atomic multi-key updates.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Writes all entries in one step.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the backing medium rejects the write; the
    /// previous contents are kept in that case.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), AuthError>;

    /// Removes all keys in one step.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the backing medium rejects the write.
    fn remove_many(&self, keys: &[&str]) -> Result<(), AuthError>;
}

/// Volatile store scoped to the lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), AuthError> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), AuthError> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// Durable store backed by a JSON object on disk.
///
/// The file is read once on open; every mutation rewrites it through a temporary
/// file and a rename so a crash never leaves half a session behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the file exists but cannot be read.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|err| {
                AuthError::Storage(format!("Failed to read {}: {err}", path.display()))
            })?;
            serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("Ignoring unreadable store {}: {}", path.display(), err);
                BTreeMap::new()
            })
        } else {
            debug!("No store file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    AuthError::Storage(format!("Failed to create {}: {err}", parent.display()))
                })?;
            }
        }

        let json = serde_json::to_string(entries)
            .map_err(|err| AuthError::Storage(format!("Failed to encode store: {err}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .map_err(|err| AuthError::Storage(format!("Failed to write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            AuthError::Storage(format!("Failed to replace {}: {err}", self.path.display()))
        })
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), AuthError> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = map.clone();
        apply(&mut next);
        self.persist(&next)?;
        *map = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), AuthError> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), AuthError> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}

/// Owner of the persisted bearer token and the profile cached with it.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// In-memory store, used by tests and short-lived tools.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Persists the token and profile together.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the pair cannot be written.
    pub fn set(&self, token: &SecretString, profile: &UserProfile) -> Result<(), AuthError> {
        let profile = serde_json::to_string(profile)
            .map_err(|err| AuthError::Storage(format!("Failed to encode profile: {err}")))?;
        self.backend.set_many(&[
            (TOKEN_KEY, token.expose_secret().to_string()),
            (PROFILE_KEY, profile),
        ])
    }

    /// Returns the stored token and profile. A profile that no longer decodes
    /// reads as absent.
    #[must_use]
    pub fn get(&self) -> (Option<SecretString>, Option<UserProfile>) {
        let token = self.token();
        let profile = self.backend.get(PROFILE_KEY).and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|err| warn!("Discarding unreadable cached profile: {}", err))
                .ok()
        });
        (token, profile)
    }

    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.backend
            .get(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backend.get(TOKEN_KEY).is_none() && self.backend.get(PROFILE_KEY).is_none()
    }

    /// Removes the token and profile together.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be rewritten.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.backend.remove_many(&[TOKEN_KEY, PROFILE_KEY])
    }
}

/// Tab-scoped record of the OAuth flow awaiting its callback.
#[derive(Clone)]
pub struct OAuthStateStore {
    backend: Arc<dyn KeyValueStore>,
}

impl OAuthStateStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Records a new pending flow, replacing any previous one.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the record cannot be written.
    pub fn save(&self, state: &OAuthState) -> Result<(), AuthError> {
        let signup = match state.purpose {
            OAuthPurpose::Signup => "true",
            OAuthPurpose::Login => "false",
        };
        self.backend.set_many(&[
            (OAUTH_STATE_KEY, state.nonce.clone()),
            (OAUTH_PROVIDER_KEY, state.provider.clone()),
            (OAUTH_SIGNUP_KEY, signup.to_string()),
        ])
    }

    #[must_use]
    pub fn peek(&self) -> Option<OAuthState> {
        let nonce = self.backend.get(OAUTH_STATE_KEY)?;
        let provider = self.backend.get(OAUTH_PROVIDER_KEY)?;
        let purpose = match self.backend.get(OAUTH_SIGNUP_KEY).as_deref() {
            Some("true") => OAuthPurpose::Signup,
            _ => OAuthPurpose::Login,
        };
        Some(OAuthState {
            nonce,
            provider,
            purpose,
        })
    }

    /// Returns the pending flow and deletes it. The record is gone afterwards
    /// whatever the caller does with it.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the record cannot be deleted.
    pub fn take(&self) -> Result<Option<OAuthState>, AuthError> {
        let state = self.peek();
        self.backend
            .remove_many(&[OAUTH_STATE_KEY, OAUTH_PROVIDER_KEY, OAUTH_SIGNUP_KEY])?;
        Ok(state)
    }
}
