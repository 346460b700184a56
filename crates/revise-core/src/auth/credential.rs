use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{AuthError, AuthResult};
use crate::util::normalize_text_option;

/// Bearer token plus the identity it belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(alias = "id")]
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Credential {
    /// Build a credential, rejecting blank tokens or ids.
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        email: Option<String>,
    ) -> AuthResult<Self> {
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| AuthError::InvalidPayload("token must not be empty".to_string()))?;
        let user_id = normalize_text_option(Some(user_id.into()))
            .ok_or_else(|| AuthError::InvalidPayload("user id must not be empty".to_string()))?;
        Ok(Self {
            token,
            user_id,
            email: normalize_text_option(email),
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish()
    }
}

pub trait CredentialPersistence: Clone + Send + Sync + 'static {
    fn load_credential(&self) -> AuthResult<Option<Credential>>;
    fn save_credential(&self, credential: &Credential) -> AuthResult<()>;
    fn clear_credential(&self) -> AuthResult<()>;
}

/// Process-local persistence for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryCredentialPersistence {
    slot: Arc<Mutex<Option<Credential>>>,
}

impl MemoryCredentialPersistence {
    fn lock(&self) -> AuthResult<std::sync::MutexGuard<'_, Option<Credential>>> {
        self.slot
            .lock()
            .map_err(|_| AuthError::SecureStorage("credential slot lock poisoned".to_string()))
    }
}

impl CredentialPersistence for MemoryCredentialPersistence {
    fn load_credential(&self) -> AuthResult<Option<Credential>> {
        Ok(self.lock()?.clone())
    }

    fn save_credential(&self, credential: &Credential) -> AuthResult<()> {
        *self.lock()? = Some(credential.clone());
        Ok(())
    }

    fn clear_credential(&self) -> AuthResult<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// The current credential, persisted and observable.
///
/// Subscribers see every sign-in and sign-out; the sync layer reads the
/// latest value at the start of each round.
#[derive(Clone)]
pub struct CredentialStore<P: CredentialPersistence> {
    persistence: P,
    current: Arc<watch::Sender<Option<Credential>>>,
}

impl<P: CredentialPersistence> CredentialStore<P> {
    /// Load any persisted credential.
    pub fn restore(persistence: P) -> AuthResult<Self> {
        let initial = persistence.load_credential()?;
        if let Some(credential) = &initial {
            tracing::debug!(user_id = %credential.user_id, "Restored persisted credential");
        }
        let (current, _) = watch::channel(initial);
        Ok(Self {
            persistence,
            current: Arc::new(current),
        })
    }

    pub fn current(&self) -> Option<Credential> {
        self.current.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.current.subscribe()
    }

    /// Persist and publish a freshly acquired credential.
    pub fn sign_in(&self, credential: Credential) -> AuthResult<()> {
        self.persistence.save_credential(&credential)?;
        tracing::info!(user_id = %credential.user_id, "Signed in");
        self.current.send_replace(Some(credential));
        Ok(())
    }

    /// Forget the credential. Queued changes stay until the next sign-in.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.persistence.clear_credential()?;
        if self.current.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
        Ok(())
    }
}
