//! Credential handoff from an isolated auth surface.
//!
//! The surface (a sign-in window, browser flow, or stdin reader) holds an
//! [`AuthSurface`] and can only post [`AuthSignal`]s; the privileged side
//! awaits [`AuthHandshake::acquire`], which resolves exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{AuthError, AuthResult, Credential};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(300);
const SIGNAL_BUFFER: usize = 8;

/// Message posted by the auth surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSignal {
    Ready,
    Success(Credential),
    Error {
        message: String,
        #[serde(default = "unknown_error_code")]
        code: String,
    },
    Closed,
}

fn unknown_error_code() -> String {
    "UNKNOWN_ERROR".to_string()
}

impl AuthSignal {
    /// Parse one JSON message, e.g. `{"type":"success","token":"..","user_id":".."}`.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        Ok(serde_json::from_str(raw.trim())?)
    }
}

/// Sending half handed to the auth surface.
#[derive(Clone)]
pub struct AuthSurface {
    tx: mpsc::Sender<AuthSignal>,
    sent_success: Arc<AtomicBool>,
}

impl AuthSurface {
    pub async fn mark_ready(&self) -> bool {
        self.send(AuthSignal::Ready).await
    }

    /// Post the credential. Only the first call is forwarded.
    pub async fn send_success(&self, credential: Credential) -> bool {
        if self.sent_success.swap(true, Ordering::SeqCst) {
            tracing::warn!("Preventing duplicate credential send");
            return false;
        }
        self.send(AuthSignal::Success(credential)).await
    }

    pub async fn report_error(&self, message: impl Into<String>, code: impl Into<String>) -> bool {
        self.send(AuthSignal::Error {
            message: message.into(),
            code: code.into(),
        })
        .await
    }

    /// Tell the handshake the surface went away. Ignored after a success.
    pub async fn close(&self) -> bool {
        if self.sent_success.load(Ordering::SeqCst) {
            return false;
        }
        tracing::warn!("Auth surface closing without completing authentication");
        self.send(AuthSignal::Closed).await
    }

    /// Route a parsed signal through the matching guarded method.
    pub async fn forward(&self, signal: AuthSignal) -> bool {
        match signal {
            AuthSignal::Ready => self.mark_ready().await,
            AuthSignal::Success(credential) => self.send_success(credential).await,
            AuthSignal::Error { message, code } => self.report_error(message, code).await,
            AuthSignal::Closed => self.close().await,
        }
    }

    async fn send(&self, signal: AuthSignal) -> bool {
        if self.tx.send(signal).await.is_err() {
            tracing::debug!("Auth handshake already resolved; dropping signal");
            return false;
        }
        true
    }
}

/// Receiving half, owned by whoever needs the credential.
pub struct AuthHandshake {
    rx: mpsc::Receiver<AuthSignal>,
}

impl AuthHandshake {
    pub fn new() -> (Self, AuthSurface) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let surface = AuthSurface {
            tx,
            sent_success: Arc::new(AtomicBool::new(false)),
        };
        (Self { rx }, surface)
    }

    /// Wait for the surface to post a credential.
    ///
    /// Resolves on the first success, error, or close. Consumes the
    /// handshake, so later signals are dropped on the surface side.
    pub async fn acquire(mut self, timeout: Duration) -> AuthResult<Credential> {
        let wait = async {
            while let Some(signal) = self.rx.recv().await {
                match signal {
                    AuthSignal::Ready => tracing::debug!("Auth surface ready"),
                    AuthSignal::Success(credential) => {
                        return Credential::new(credential.token, credential.user_id, credential.email);
                    }
                    AuthSignal::Error { message, code } => {
                        return Err(AuthError::Surface { message, code });
                    }
                    AuthSignal::Closed => return Err(AuthError::Cancelled),
                }
            }
            Err(AuthError::Cancelled)
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(AuthError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn credential() -> Credential {
        Credential::new("tok", "user-1", None).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolves_with_first_success() {
        let (handshake, surface) = AuthHandshake::new();
        let waiter = tokio::spawn(handshake.acquire(Duration::from_secs(5)));

        assert!(surface.mark_ready().await);
        assert!(surface.send_success(credential()).await);
        assert!(!surface.send_success(credential()).await);

        assert_eq!(waiter.await.unwrap().unwrap(), credential());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn signals_after_resolution_are_dropped() {
        let (handshake, surface) = AuthHandshake::new();
        surface.send_success(credential()).await;
        handshake.acquire(Duration::from_secs(5)).await.unwrap();

        assert!(!surface.report_error("late", "LATE").await);
        assert!(!surface.close().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn times_out_without_signal() {
        let (handshake, _surface) = AuthHandshake::new();
        let result = handshake.acquire(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(AuthError::Timeout)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_before_success_cancels() {
        let (handshake, surface) = AuthHandshake::new();
        surface.mark_ready().await;
        surface.close().await;
        let result = handshake.acquire(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropped_surface_cancels() {
        let (handshake, surface) = AuthHandshake::new();
        drop(surface);
        let result = handshake.acquire(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn surface_error_is_reported() {
        let (handshake, surface) = AuthHandshake::new();
        surface.report_error("popup blocked", "POPUP").await;
        match handshake.acquire(Duration::from_secs(5)).await {
            Err(AuthError::Surface { message, code }) => {
                assert_eq!(message, "popup blocked");
                assert_eq!(code, "POPUP");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blank_token_is_invalid_payload() {
        let (handshake, surface) = AuthHandshake::new();
        let signal = AuthSignal::parse(r#"{"type":"success","token":" ","user_id":"u1"}"#).unwrap();
        surface.forward(signal).await;
        let result = handshake.acquire(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AuthError::InvalidPayload(_))));
    }

    #[test]
    fn parses_tagged_messages() {
        assert_eq!(AuthSignal::parse(r#"{"type":"ready"}"#).unwrap(), AuthSignal::Ready);
        assert_eq!(
            AuthSignal::parse(r#"{"type":"error","message":"nope"}"#).unwrap(),
            AuthSignal::Error {
                message: "nope".to_string(),
                code: "UNKNOWN_ERROR".to_string(),
            }
        );
        let signal =
            AuthSignal::parse(r#"{"type":"success","token":"t","id":"u1","email":"a@b.c"}"#)
                .unwrap();
        assert_eq!(
            signal,
            AuthSignal::Success(Credential::new("t", "u1", Some("a@b.c".to_string())).unwrap())
        );
        assert!(AuthSignal::parse("not json").is_err());
    }
}
