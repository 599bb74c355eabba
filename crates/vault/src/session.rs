//! In-memory session token registry.
//!
//! Tokens authenticate automated callers between interactive unlocks and
//! suspend the auto-lock timer while at least one is live. They exist only
//! in process memory: a lock, an explicit revoke, or a restart destroys
//! them. Nothing here ever touches the persistence layer.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use rand::RngCore;

use crate::{error::VaultError, types::SessionInfo};

/// Upper bound on concurrently live tokens.
const MAX_SESSIONS: usize = 64;

/// Token entropy in bytes (hex-encoded to 64 characters).
const TOKEN_LEN: usize = 32;

struct SessionEntry {
    name: Option<String>,
    created_at: String,
}

/// Bounded registry of live bearer tokens.
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, SessionEntry>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a new token. The raw token is returned exactly once; the
    /// registry keeps only name and creation time alongside it.
    pub fn generate(&self, name: Option<String>) -> Result<String, VaultError> {
        let mut sessions = self.lock();
        if sessions.len() >= MAX_SESSIONS {
            return Err(VaultError::TooManySessions);
        }

        let mut bytes = [0u8; TOKEN_LEN];
        rand::rng().fill_bytes(&mut bytes);
        let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        sessions.insert(token.clone(), SessionEntry {
            name,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        Ok(token)
    }

    /// O(1) membership check. Validation alone extends nothing.
    pub fn validate(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }

    /// Remove a token. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// Live sessions, names only — raw tokens are never listed back.
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.lock();
        let mut infos: Vec<SessionInfo> = sessions
            .values()
            .map(|e| SessionInfo {
                name: e.name.clone(),
                created_at: e.created_at.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every token. Called whenever the vault locks.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
