use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::store::{SessionStore, TOKEN_KEY, USER_KEY};

/// Profile of the signed-in user, persisted next to the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    /// Fields the backend sent that this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Handle on the persisted credential/profile pair.
/// Clone is cheap - the store is shared behind an `Arc`.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Raw credential as stored, without any validation
    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY)
    }

    /// Stored profile; an unparseable value reads as absent
    pub fn profile(&self) -> Option<UserProfile> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Stored user profile is not valid JSON");
                None
            }
        }
    }

    /// Persist a freshly issued credential together with its profile
    pub fn establish(&self, token: &str, profile: &UserProfile) -> Result<()> {
        let serialized = serde_json::to_string(profile).context("Failed to serialize profile")?;
        self.store
            .set(TOKEN_KEY, token)
            .context("Failed to store credential")?;
        if let Err(e) = self.store.set(USER_KEY, &serialized) {
            // Never leave a credential behind without its profile
            if let Err(rollback) = self.store.remove(TOKEN_KEY) {
                warn!(error = %rollback, "Failed to roll back credential");
            }
            return Err(e.context("Failed to store user profile"));
        }
        info!(user = %profile.name, "Session established");
        Ok(())
    }

    /// Remove both the credential and the profile.
    ///
    /// Never fails: a key that cannot be removed is logged and the remaining
    /// key is still attempted.
    pub fn purge(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove session key");
            }
        }
        debug!("Session purged");
    }
}
