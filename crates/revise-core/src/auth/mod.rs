//! Bearer credential storage and acquisition.
//!
//! The credential is opaque to the rest of the system: it is acquired through
//! a message-passing handshake with an isolated auth surface, persisted via a
//! pluggable backend, and broadcast to the sync layer on change.

mod credential;
mod handshake;

pub use credential::{
    Credential, CredentialPersistence, CredentialStore, MemoryCredentialPersistence,
};
pub use handshake::{AuthHandshake, AuthSignal, AuthSurface, DEFAULT_HANDSHAKE_TIMEOUT};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Timed out waiting for the auth surface")]
    Timeout,
    #[error("Authentication was cancelled before it completed")]
    Cancelled,
    #[error("Auth surface reported an error: {message} ({code})")]
    Surface { message: String, code: String },
    #[error("Invalid auth payload: {0}")]
    InvalidPayload(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
