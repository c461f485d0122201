//! PKCE (Proof Key for Code Exchange) support.
//!
//! At initiation time a verifier/challenge pair is generated and the
//! verifier parked under a challenge id; the id rides through the relay
//! state as `pkce_code_challenge_id` and the verifier is taken back out —
//! once — before the token exchange.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A PKCE verifier/challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceChallenge {
    /// Generate a new S256 challenge.
    pub fn new() -> Self {
        let mut verifier_bytes = [0u8; 32];
        use rand::RngCore;
        rand::thread_rng().fill_bytes(&mut verifier_bytes);
        let code_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            code_verifier,
            code_challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory verifier store keyed by challenge id.
#[derive(Debug, Default)]
pub struct PkceStore {
    verifiers: DashMap<String, String>,
}

impl PkceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a verifier and return the id that rides through the state URL.
    pub fn put(&self, challenge: &PkceChallenge) -> String {
        let id = Uuid::new_v4().to_string();
        self.verifiers
            .insert(id.clone(), challenge.code_verifier.clone());
        id
    }

    /// Take a verifier back out. Single-use: a second take returns `None`.
    pub fn take_verifier(&self, challenge_id: &str) -> Option<String> {
        self.verifiers.remove(challenge_id).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_is_s256_of_verifier() {
        let challenge = PkceChallenge::new();
        let mut hasher = Sha256::new();
        hasher.update(challenge.code_verifier.as_bytes());
        assert_eq!(challenge.code_challenge, URL_SAFE_NO_PAD.encode(hasher.finalize()));
    }

    #[test]
    fn test_verifier_is_single_use() {
        let store = PkceStore::new();
        let challenge = PkceChallenge::new();
        let id = store.put(&challenge);

        assert_eq!(store.take_verifier(&id), Some(challenge.code_verifier));
        assert_eq!(store.take_verifier(&id), None);
    }

    #[test]
    fn test_unknown_id_yields_nothing() {
        let store = PkceStore::new();
        assert_eq!(store.take_verifier("nope"), None);
    }
}
