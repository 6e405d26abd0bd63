//! Session validation for authenticated uploads.
//!
//! The image server never holds credentials itself. Every `STORE` exchange
//! carries a session token that is handed to a [`SessionAuthority`]; only a
//! positive answer lets the write reach the store.
//!
//! # Signed session tokens
//!
//! The bundled [`SignedSessionAuthority`] accepts self-contained tokens:
//!
//! ```text
//! <user>:<expiry>:<hex HMAC-SHA256(secret, "<user>:<expiry>")>
//! ```
//!
//! `expiry` is a Unix timestamp in seconds. Signatures are compared in
//! constant time.
//!
//! ```rust
//! use page_image_store::auth::SignedSessionAuthority;
//! use std::time::Duration;
//!
//! let authority = SignedSessionAuthority::new("my-secret-key");
//! let token = authority.sign("alice", Duration::from_secs(3600));
//! assert!(authority.verify(&token).is_ok());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Authority trait
// =============================================================================

/// External authority deciding whether a session token may write to the store.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    async fn is_valid_session(&self, token: &str) -> bool;
}

// =============================================================================
// Errors
// =============================================================================

/// Reasons a session token is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token is not `<user>:<expiry>:<signature>`
    MalformedToken,

    /// Expiry field is not an integer
    InvalidExpiryFormat,

    /// Signature field is not valid hex
    InvalidSignatureFormat,

    /// Token has expired
    Expired {
        expired_at: u64,
        current_time: u64,
    },

    /// Signature does not match
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MalformedToken => write!(f, "Malformed session token"),
            AuthError::InvalidExpiryFormat => write!(f, "Invalid expiry format"),
            AuthError::InvalidSignatureFormat => write!(f, "Invalid signature format"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Session expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid signature"),
        }
    }
}

impl std::error::Error for AuthError {}

// =============================================================================
// Signed sessions
// =============================================================================

/// HMAC-SHA256 signed session tokens.
#[derive(Clone)]
pub struct SignedSessionAuthority {
    secret_key: Vec<u8>,
}

impl SignedSessionAuthority {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Mint a token for `user` valid for `ttl`.
    pub fn sign(&self, user: &str, ttl: Duration) -> String {
        self.sign_with_expiry(user, unix_now().saturating_add(ttl.as_secs()))
    }

    /// Mint a token with an explicit expiry timestamp.
    pub fn sign_with_expiry(&self, user: &str, expiry: u64) -> String {
        let payload = format!("{}:{}", user, expiry);
        let signature = self.compute_signature(&payload).unwrap_or_default();
        format!("{}:{}", payload, hex::encode(signature))
    }

    /// Check a token's expiry and signature.
    ///
    /// The user name may itself contain `:`; the token is split from the right.
    pub fn verify(&self, token: &str) -> Result<(), AuthError> {
        let mut fields = token.rsplitn(3, ':');
        let (Some(signature), Some(expiry), Some(user)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(AuthError::MalformedToken);
        };
        if user.is_empty() {
            return Err(AuthError::MalformedToken);
        }

        let expiry: u64 = expiry.parse().map_err(|_| AuthError::InvalidExpiryFormat)?;
        let current_time = unix_now();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided = hex::decode(signature).map_err(|_| AuthError::InvalidSignatureFormat)?;
        let expected = self
            .compute_signature(&format!("{}:{}", user, expiry))
            .ok_or(AuthError::InvalidSignature)?;

        if provided.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn compute_signature(&self, payload: &str) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret_key).ok()?;
        mac.update(payload.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for SignedSessionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedSessionAuthority")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl SessionAuthority for SignedSessionAuthority {
    async fn is_valid_session(&self, token: &str) -> bool {
        match self.verify(token) {
            Ok(()) => true,
            // Bad signatures may be tampering; expiry is routine
            Err(err @ AuthError::InvalidSignature) => {
                warn!(error = %err, "Rejected session token");
                false
            }
            Err(err) => {
                debug!(error = %err, "Rejected session token");
                false
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
