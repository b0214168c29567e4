//! The sealing primitive: authenticated encryption under the platform
//! master key.
//!
//! Every persisted file is a [`SealedEnvelope`] — a CBOR structure carrying
//! the algorithm tag, the per-write nonce, and the ciphertext (which
//! includes the authentication tag). The envelope never overwrites in
//! place; callers unlink before writing.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// The 256-bit platform master key.
///
/// The platform key-storage service hands the broker this key after the
/// user's first unlock; before that the store is unreadable.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Seal a plaintext into envelope bytes ready to hit the disk.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| StoreError::Seal(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| StoreError::Seal(e.to_string()))?;

        SealedEnvelope {
            format: SealFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        }
        .to_bytes()
    }

    /// Open envelope bytes back into the plaintext.
    ///
    /// Fails if the bytes are not a valid envelope, were sealed under a
    /// different key, or were tampered with.
    pub fn open(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let envelope = SealedEnvelope::from_bytes(bytes)?;
        match envelope.format {
            SealFormat::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
                    .map_err(|e| StoreError::Open(e.to_string()))?;
                cipher
                    .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
                    .map_err(|e| StoreError::Open(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs.
        write!(f, "MasterKey(..)")
    }
}

/// Algorithm tag for sealed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SealFormat {
    /// ChaCha20-Poly1305 with a 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// On-disk envelope around an encrypted file body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Algorithm used to seal the body.
    pub format: SealFormat,

    /// Nonce used for this seal (unique per write).
    pub nonce: [u8; 12],

    /// The encrypted body, authentication tag included.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
