//! # Ed25519 Signatures
//!
//! Validator signing keys. Consensus signs 32-byte digests, never raw
//! payloads, so signer and verifier agree on exactly what was hashed.
//!
//! ## Security Properties
//!
//! - No RNG dependency (deterministic nonce from message)
//! - Secret seed zeroized on drop

use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Create from bytes, rejecting points that are not valid keys.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;

        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice; anything other than 64 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Create from a 64-character hex seed.
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(seed_hex.trim())
            .map_err(|e| CryptoError::InvalidSeed(e.to_string()))?;
        if bytes.len() != 32 {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual,
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        bytes.zeroize();
        let pair = Self::from_seed(seed);
        seed.zeroize();
        Ok(pair)
    }

    /// Get public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        let verifying_key = self.signing_key.verifying_key();
        Ed25519PublicKey(verifying_key.to_bytes())
    }

    /// Sign a message (deterministic - no RNG needed).
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }
}

impl Drop for Ed25519KeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_digest() {
        let keypair = Ed25519KeyPair::generate();
        let digest = [0x42u8; 32];

        let signature = keypair.sign(&digest);
        assert!(keypair.public_key().verify(&digest, &signature).is_ok());
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = Ed25519KeyPair::from_seed([1u8; 32]);
        let keypair2 = Ed25519KeyPair::from_seed([2u8; 32]);

        let signature = keypair1.sign(b"test");
        assert!(keypair2.public_key().verify(b"test", &signature).is_err());
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = Ed25519KeyPair::from_seed([0xAB; 32]);
        assert_eq!(keypair.sign(b"x").as_bytes(), keypair.sign(b"x").as_bytes());
    }

    #[test]
    fn test_hex_seed() {
        let pair = Ed25519KeyPair::from_hex_seed(&"11".repeat(32)).unwrap();
        assert_eq!(pair.public_key(), Ed25519KeyPair::from_seed([0x11; 32]).public_key());

        assert!(matches!(
            Ed25519KeyPair::from_hex_seed("abcd"),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 2 })
        ));
        assert!(Ed25519KeyPair::from_hex_seed("zz").is_err());
    }

    #[test]
    fn test_signature_from_slice_length() {
        assert!(Ed25519Signature::from_slice(&[0u8; 63]).is_err());
        assert!(Ed25519Signature::from_slice(&[0u8; 64]).is_ok());
    }
}
