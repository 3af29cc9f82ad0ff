//! Schnorr signatures proving coinstake input ownership
//!
//! The kernel only needs one signature check: the key spending the staked
//! output must sign the coinstake and hash to the output's owner.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{hash_bytes, Hash};

/// Signature errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Malformed signature")]
    MalformedSignature,
    #[error("Signature does not match key and message")]
    Mismatch,
}

/// Staking key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

/// 32-byte x-only public key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "fixed_bytes")] pub [u8; 32]);

/// 64-byte BIP-340 signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature(#[serde(with = "fixed_bytes")] pub [u8; 64]);

macro_rules! hex_debug {
    ($name:ident) => {
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }
    };
}

hex_debug!(PublicKey);
hex_debug!(SchnorrSignature);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

mod fixed_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} bytes", N)))
    }
}

impl PrivateKey {
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_bytes(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes().into())
    }

    /// Sign a transaction hash
    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        let signature: Signature = self.0.sign(message.as_bytes());
        SchnorrSignature(signature.to_bytes())
    }
}

impl PublicKey {
    /// Parse, rejecting x coordinates with no point on the curve
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        let key = PublicKey(*bytes);
        key.verifying_key()?;
        Ok(key)
    }

    fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| SignatureError::InvalidPublicKey)
    }

    /// Check a signature over `message`, reporting why it failed
    pub fn check(&self, message: &Hash, signature: &SchnorrSignature) -> Result<(), SignatureError> {
        let signature = Signature::try_from(signature.0.as_slice())
            .map_err(|_| SignatureError::MalformedSignature)?;
        self.verifying_key()?
            .verify(message.as_bytes(), &signature)
            .map_err(|_| SignatureError::Mismatch)
    }

    pub fn verify(&self, message: &Hash, signature: &SchnorrSignature) -> bool {
        self.check(message, signature).is_ok()
    }

    /// Hash outputs use to name their owner
    pub fn owner_hash(&self) -> Hash {
        hash_bytes(&self.0)
    }

    pub fn owns(&self, owner: &Hash) -> bool {
        self.owner_hash() == *owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let message = hash_bytes(b"coinstake");
        let signature = private.sign(&message);

        assert!(public.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signer = PrivateKey::generate();
        let other = PrivateKey::generate().public_key();

        let message = hash_bytes(b"coinstake");
        let signature = signer.sign(&message);

        assert!(!other.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_message_fails() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let signature = private.sign(&hash_bytes(b"message 1"));
        assert!(!public.verify(&hash_bytes(b"message 2"), &signature));
    }

    #[test]
    fn test_garbage_key_rejected() {
        assert_eq!(PublicKey::from_bytes(&[0xFF; 32]), Err(SignatureError::InvalidPublicKey));
        let bogus = PublicKey([0xFF; 32]);
        let signature = PrivateKey::generate().sign(&Hash::zero());
        assert_eq!(bogus.check(&Hash::zero(), &signature), Err(SignatureError::InvalidPublicKey));
    }

    #[test]
    fn test_check_reports_mismatch() {
        let private = PrivateKey::from_bytes(&[7u8; 32]).unwrap();
        let signature = private.sign(&hash_bytes(b"a"));
        assert_eq!(
            private.public_key().check(&hash_bytes(b"b"), &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_ownership() {
        let private = PrivateKey::from_bytes(&[7u8; 32]).unwrap();
        let public = private.public_key();
        assert!(public.owns(&public.owner_hash()));
        assert!(!public.owns(&PrivateKey::generate().public_key().owner_hash()));
    }
}
