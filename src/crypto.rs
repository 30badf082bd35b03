// Crypto - Vérification des signatures des requêtes
//
// The engine only needs "does this signature cover this message for this
// public key". The algorithm is injected: nodes pick a verifier when they
// build the engine.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Domain separator for transaction request signatures
pub const DOMAIN_TRANSACTION: &[u8] = b"KRATOS_ENGINE_REQUEST_V1:";

#[inline]
pub fn domain_separate(domain: &[u8], message: &[u8]) -> Vec<u8> {
    let mut separated = Vec::with_capacity(domain.len() + message.len());
    separated.extend_from_slice(domain);
    separated.extend_from_slice(message);
    separated
}

/// Signature capability consumed by the engine
pub trait SignatureVerifier: Send + Sync {
    /// `public_key` is the value stored in the caller's public key field
    fn verify(&self, public_key: &str, message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 with hex-encoded 32-byte public keys
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &str, message: &[u8], signature: &[u8]) -> bool {
        let key_bytes: [u8; 32] = match hex::decode(public_key) {
            Ok(bytes) => match bytes.try_into() {
                Ok(array) => array,
                Err(_) => return false,
            },
            Err(_) => return false,
        };
        let public_key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let signature: [u8; 64] = match signature.try_into() {
            Ok(array) => array,
            Err(_) => return false,
        };

        public_key
            .verify(message, &Signature::from_bytes(&signature))
            .is_ok()
    }
}

/// Accepts every signature. For trusted local setups and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl SignatureVerifier for AcceptAllVerifier {
    fn verify(&self, _public_key: &str, _message: &[u8], _signature: &[u8]) -> bool {
        true
    }
}

/// Ed25519 key pair of an account
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Hex-encoded public key, as stored in accounts
    pub fn public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}
