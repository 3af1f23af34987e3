use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Version byte prepended to the public key hash in an address
pub const ADDRESS_VERSION: u8 = 0x00;

/// Number of checksum bytes appended to an address
pub const CHECKSUM_LENGTH: usize = 4;

/// Length of a public key hash (RIPEMD-160)
pub const PUB_KEY_HASH_LENGTH: usize = 20;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to sign message: {0}")]
    SigningError(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A signing capability: anything that owns a private key and can expose the
/// matching raw public key.
pub trait KeyPair {
    /// Raw public key bytes, as stored in transaction inputs
    fn public_key(&self) -> Vec<u8>;

    /// Signs `message` with the private key
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// A verification capability for signatures produced by a [`KeyPair`].
///
/// Malformed keys or signatures verify as `false`; they are never errors.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// Verifies Ed25519 signatures over raw 32-byte public keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };

        key.verify(message, &signature).is_ok()
    }
}

/// Hashes a raw public key into the 20-byte lock used by transaction outputs:
/// RIPEMD-160(SHA-256(public_key))
pub fn hash_pub_key(public_key: &[u8]) -> Vec<u8> {
    let sha = Sha256::digest(public_key);
    Ripemd160::digest(sha).to_vec()
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    second[..CHECKSUM_LENGTH].to_vec()
}

/// A base58check wallet address: `version || pub_key_hash || checksum`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from a raw public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_pub_key_hash(&hash_pub_key(public_key))
    }

    /// Creates an address from an already hashed public key
    pub fn from_pub_key_hash(pub_key_hash: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + CHECKSUM_LENGTH);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(pub_key_hash);

        let check = checksum(&payload);
        payload.extend_from_slice(&check);

        Address(bs58::encode(payload).into_string())
    }

    /// Decodes the address back into the public key hash it locks to.
    ///
    /// Fails if the string is not base58, has the wrong length or version,
    /// or if the checksum does not match.
    pub fn pub_key_hash(&self) -> Result<Vec<u8>, CryptoError> {
        let decoded = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if decoded.len() != 1 + PUB_KEY_HASH_LENGTH + CHECKSUM_LENGTH {
            return Err(CryptoError::InvalidAddress(format!(
                "unexpected length {}",
                decoded.len()
            )));
        }

        let (payload, check) = decoded.split_at(decoded.len() - CHECKSUM_LENGTH);
        if payload[0] != ADDRESS_VERSION {
            return Err(CryptoError::InvalidAddress(format!(
                "unknown version {:#04x}",
                payload[0]
            )));
        }
        if checksum(payload) != check {
            return Err(CryptoError::InvalidAddress("checksum mismatch".to_string()));
        }

        Ok(payload[1..].to_vec())
    }

    /// Checks that the address decodes and its checksum matches
    pub fn is_valid(&self) -> bool {
        self.pub_key_hash().is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address(s.to_string());
        address.pub_key_hash()?;
        Ok(address)
    }
}

/// Represents a wallet with an Ed25519 keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    /// Creates a wallet from an existing 32-byte secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let address = Address::from_public_key(verifying_key.as_bytes());

        Wallet {
            signing_key,
            verifying_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Hash of the wallet's public key, i.e. the lock its outputs carry
    pub fn pub_key_hash(&self) -> Vec<u8> {
        hash_pub_key(self.verifying_key.as_bytes())
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPair for Wallet {
    fn public_key(&self) -> Vec<u8> {
        self.verifying_key.as_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| CryptoError::SigningError(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}
