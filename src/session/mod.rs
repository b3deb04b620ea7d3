//! Authentication state, token lifecycle and the route gate

pub mod guard;
pub mod notifier;
pub mod token;

pub use guard::{authorize, home_route, resolve, Access};
pub use notifier::{ExpiryWatcher, SessionEvent, SessionNotifier};
pub use token::{StoredCredentials, TokenStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::api::{ApiError, LabApi};
use crate::persist::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Patient,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "patient" => Ok(Role::Patient),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Patient => f.write_str("patient"),
        }
    }
}

/// Who is signed in. `role` and `fhir_id` mean nothing unless
/// `is_authenticated` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub role: Option<Role>,
    pub fhir_id: Option<String>,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    fn from_credentials(creds: &StoredCredentials) -> Self {
        Self {
            is_authenticated: true,
            role: creds.role,
            fhir_id: creds.fhir_id.clone(),
        }
    }
}

/// Owns the token store and the current [`AuthState`].
///
/// The stored token is the only source of truth at startup; the in-memory
/// state is re-derived from it whenever it is read.
pub struct SessionManager {
    tokens: Arc<TokenStore>,
    state: RwLock<AuthState>,
    notifier: SessionNotifier,
    ttl: chrono::Duration,
}

impl SessionManager {
    pub fn new(tokens: Arc<TokenStore>, notifier: SessionNotifier, ttl: chrono::Duration) -> Self {
        let manager = Self {
            tokens,
            state: RwLock::new(AuthState::anonymous()),
            notifier,
            ttl,
        };
        manager.hydrate();
        manager
    }

    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn notifier(&self) -> &SessionNotifier {
        &self.notifier
    }

    pub fn expiry_watcher(&self) -> ExpiryWatcher {
        ExpiryWatcher::new(&self.notifier)
    }

    /// Rebuild the auth state from the stored token
    pub fn hydrate(&self) -> AuthState {
        let state = self
            .tokens
            .get()
            .map(|creds| AuthState::from_credentials(&creds))
            .unwrap_or_default();
        *self.write() = state.clone();
        state
    }

    /// Current auth state; a token that expired since the last read signs
    /// the user out.
    pub fn state(&self) -> AuthState {
        let current = self.read().clone();
        if current.is_authenticated && self.tokens.get().is_none() {
            info!("Session token expired");
            *self.write() = AuthState::anonymous();
            return AuthState::anonymous();
        }
        current
    }

    /// Authenticate and store the token for the configured lifetime.
    ///
    /// The server's error message is passed through untouched.
    pub async fn login(
        &self,
        api: &dyn LabApi,
        email: &str,
        password: &str,
    ) -> Result<AuthState, ApiError> {
        let response = api.login(email, password).await?;
        let role = match response.role.as_deref().map(Role::from_str) {
            Some(Ok(role)) => Some(role),
            Some(Err(e)) => {
                warn!(error = %e, "Login returned an unrecognised role");
                None
            }
            None => None,
        };
        let creds = StoredCredentials {
            token: response.token,
            role,
            fhir_id: response.fhir_id,
            expires_at: Utc::now() + self.ttl,
        };
        let state = AuthState::from_credentials(&creds);
        if let Err(e) = self.tokens.store(creds) {
            warn!(error = %e, "Could not persist session; it will last until exit");
        }
        *self.write() = state.clone();
        info!(role = ?state.role, "Logged in");
        Ok(state)
    }

    /// Forget the token. Safe to call when already signed out.
    pub fn logout(&self) -> Result<(), StoreError> {
        *self.write() = AuthState::anonymous();
        self.tokens.clear()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
