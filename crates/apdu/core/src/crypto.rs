//! Session encryption primitives
//!
//! Encrypted APDUs use AES-256 in CBC mode with PKCS#7 padding and an all-zero IV. The key is
//! negotiated per session by the card SDK and is zeroized when dropped.

use std::fmt;

use aes::cipher::{
    BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7, generic_array::GenericArray,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
/// Session key size in bytes
pub const KEY_SIZE: usize = 32;

const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Encryption level negotiated for a session
///
/// The discriminant is written into P1 of an encrypted command APDU.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum EncryptionMode {
    /// Plaintext exchange
    #[default]
    #[display("none")]
    None = 0x00,
    /// Symmetric key agreement from random halves
    #[display("fast")]
    Fast = 0x01,
    /// ECDH key agreement on secp256k1
    #[display("strong")]
    Strong = 0x02,
}

impl EncryptionMode {
    /// Byte written into P1
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Next stronger mode, if any
    pub const fn escalate(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Fast),
            Self::Fast => Some(Self::Strong),
            Self::Strong => None,
        }
    }
}

/// AES-256 session key
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(*****)")
    }
}

impl SessionKey {
    /// Create a key from raw bytes
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Encrypt data with the session key.
///
/// # Arguments
/// * `key` - The session key.
/// * `data` - The plaintext to encrypt.
///
/// # Returns
/// The ciphertext, padded to a whole number of blocks.
pub fn encrypt(key: &SessionKey, data: &[u8]) -> Vec<u8> {
    Encryptor::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&ZERO_IV),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(data)
}

/// Decrypt data with the session key.
///
/// # Arguments
/// * `key` - The session key.
/// * `data` - The ciphertext, a whole number of blocks.
///
/// # Returns
/// The plaintext with padding removed, or [`Error::InvalidResponse`] if the length or padding
/// is wrong.
pub fn decrypt(key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    Decryptor::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&ZERO_IV),
    )
    .decrypt_padded_vec_mut::<Pkcs7>(data)
    .map_err(|_| Error::InvalidResponse("Bad padding"))
}
