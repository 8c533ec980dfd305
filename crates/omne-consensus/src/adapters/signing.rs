//! Ed25519 implementations of the key and verifier ports.

use crate::domain::Signature;
use crate::ports::{PortError, SignatureVerifier, ValidatorKey};
use shared_crypto::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{Hash, PublicKey, ValidatorId};

/// Validator key backed by an Ed25519 keypair.
///
/// The validator identity is the public key.
pub struct Ed25519ValidatorKey {
    keypair: Ed25519KeyPair,
    identity: ValidatorId,
}

impl Ed25519ValidatorKey {
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        let identity = ValidatorId::new(*keypair.public_key().as_bytes());
        Self { keypair, identity }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(Ed25519KeyPair::from_seed(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        *self.keypair.public_key().as_bytes()
    }
}

impl ValidatorKey for Ed25519ValidatorKey {
    fn identity(&self) -> ValidatorId {
        self.identity
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, PortError> {
        Ok(Signature(self.keypair.sign(digest).as_bytes().to_vec()))
    }
}

/// Ed25519 signature verifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &PublicKey, digest: &Hash, signature: &Signature) -> bool {
        let Ok(key) = Ed25519PublicKey::from_bytes(*public_key) else {
            return false;
        };
        let Ok(sig) = Ed25519Signature::from_slice(signature.as_bytes()) else {
            return false;
        };
        key.verify(digest, &sig).is_ok()
    }
}
