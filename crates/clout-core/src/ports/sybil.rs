//! Sybil issuer port (§6): opaque blinded-token issuance and verification.
//! Actual blind-signature issuance happens outside this process (browser +
//! server proxy, per §6); the port only verifies.

use parking_lot::Mutex;
use std::collections::HashMap;

pub trait SybilIssuerPort: Send + Sync {
    fn verify_token(&self, token: &[u8]) -> bool;

    /// Optional federated import: accept a token minted by another
    /// community's issuer, carrying its source issuer id and expiry
    /// (§6 "Optional federated token import").
    fn import_federated(&self, token: &[u8], source_issuer: &str, expiry_ms: u64) -> Result<(), crate::CoreError>;
}

/// Reference issuer for tests and local development: tokens are accepted
/// iff they were previously registered via `issue` or `import_federated`.
#[derive(Default)]
pub struct MockSybilIssuer {
    valid_tokens: Mutex<HashMap<Vec<u8>, Option<(String, u64)>>>,
}

impl MockSybilIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a locally-issued token as valid.
    pub fn issue(&self, token: Vec<u8>) {
        self.valid_tokens.lock().insert(token, None);
    }
}

impl SybilIssuerPort for MockSybilIssuer {
    fn verify_token(&self, token: &[u8]) -> bool {
        self.valid_tokens.lock().contains_key(token)
    }

    fn import_federated(&self, token: &[u8], source_issuer: &str, expiry_ms: u64) -> Result<(), crate::CoreError> {
        if source_issuer.is_empty() {
            return Err(crate::CoreError::InvalidInput("federated source issuer id is empty".into()));
        }
        self.valid_tokens.lock().insert(token.to_vec(), Some((source_issuer.to_string(), expiry_ms)));
        Ok(())
    }
}
