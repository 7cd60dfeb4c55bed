//! Payment callback authentication.
//!
//! The gateway signs every callback with HMAC-SHA256 over
//! `intent_id|payment_id` using the shared webhook secret and sends the tag
//! as lowercase hex.

use common::Secret;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The webhook secret cannot be used as an HMAC key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payment webhook secret must not be empty")]
pub struct InvalidSecret;

/// Checks payment callback signatures against the webhook secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &Secret<String>) -> Result<Self, InvalidSecret> {
        if secret.reveal().is_empty() {
            return Err(InvalidSecret);
        }
        let mac =
            HmacSha256::new_from_slice(secret.reveal().as_bytes()).map_err(|_| InvalidSecret)?;
        Ok(Self { mac })
    }

    /// Produces the hex signature the gateway would send for this pair.
    pub fn sign(&self, intent_id: &str, payment_id: &str) -> String {
        let mac = self.keyed(intent_id, payment_id);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Returns true if `signature` authenticates `intent_id|payment_id`.
    ///
    /// The tag comparison is constant time. A signature that is not valid hex
    /// is rejected without touching the MAC.
    pub fn verify(&self, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(tag) = hex::decode(signature.trim()) else {
            return false;
        };
        self.keyed(intent_id, payment_id).verify_slice(&tag).is_ok()
    }

    fn keyed(&self, intent_id: &str, payment_id: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(intent_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        mac
    }
}
