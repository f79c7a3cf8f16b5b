//! Hashing, key agreement and signature helpers used by card commands

use k256::{
    PublicKey, SecretKey,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    elliptic_curve::{ecdh::diffie_hellman, sec1::ToEncodedPoint},
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tapcard_apdu_core::{EncryptionMode, SessionKey};
use zeroize::Zeroize;

use crate::{Error, Result};

/// PBKDF2 rounds used to stretch the access code into the protocol key
pub const PROTOCOL_KEY_ITERATIONS: u32 = 50;

const FAST_KEY_SIZE: usize = 16;

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// PBKDF2-HMAC-SHA256 with a 32 byte output
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

/// Cryptographically random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Verify a 64 byte `r || s` secp256k1 signature over `sha256(message)`
///
/// High-S signatures are accepted.
pub fn verify_secp256k1(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::CryptoUtilsError(e.to_string()))?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| Error::CryptoUtilsError(e.to_string()))?;
    let signature = signature.normalize_s().unwrap_or(signature);
    Ok(key.verify(message, &signature).is_ok())
}

/// Normalize a 64 byte `r || s` secp256k1 signature to low-S form
pub fn normalize_secp256k1_signature(signature: &[u8]) -> Result<Vec<u8>> {
    let parsed = Signature::from_slice(signature)
        .map_err(|e| Error::CryptoUtilsError(e.to_string()))?;
    Ok(parsed.normalize_s().unwrap_or(parsed).to_bytes().to_vec())
}

/// Session key from the agreed secret: `sha256(secret || pbkdf2(access_code, uid, 50))`
pub fn session_key(secret: &[u8], access_code: &[u8], uid: &[u8]) -> SessionKey {
    let mut protocol_key = pbkdf2_sha256(access_code, uid, PROTOCOL_KEY_ITERATIONS);
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(protocol_key);
    protocol_key.zeroize();
    SessionKey::new(hasher.finalize().into())
}

/// Terminal half of an `OpenSession` key agreement
pub enum KeyAgreement {
    /// Random 16 byte half, secret is `key_a || key_b`
    Fast {
        /// Terminal half
        key_a: Vec<u8>,
    },
    /// Ephemeral secp256k1 key, secret is the ECDH x-coordinate
    Strong {
        /// Ephemeral private key
        secret: SecretKey,
        /// Uncompressed ephemeral public key
        key_a: Vec<u8>,
    },
}

impl std::fmt::Debug for KeyAgreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast { .. } => f.write_str("KeyAgreement::Fast"),
            Self::Strong { .. } => f.write_str("KeyAgreement::Strong"),
        }
    }
}

impl KeyAgreement {
    /// Fresh agreement for `mode`, `None` for plaintext sessions
    pub fn new(mode: EncryptionMode) -> Option<Self> {
        match mode {
            EncryptionMode::None => None,
            EncryptionMode::Fast => Some(Self::Fast {
                key_a: random_bytes(FAST_KEY_SIZE),
            }),
            EncryptionMode::Strong => {
                let secret = SecretKey::random(&mut rand_v8::thread_rng());
                let key_a = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Some(Self::Strong { secret, key_a })
            }
        }
    }

    /// Half sent to the card
    pub fn key_a(&self) -> &[u8] {
        match self {
            Self::Fast { key_a } | Self::Strong { key_a, .. } => key_a,
        }
    }

    /// Shared secret given the card half
    pub fn shared_secret(&self, key_b: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Fast { key_a } => Ok([key_a.as_slice(), key_b].concat()),
            Self::Strong { secret, .. } => {
                let card_key = PublicKey::from_sec1_bytes(key_b)?;
                let shared = diffie_hellman(secret.to_nonzero_scalar(), card_key.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    }
}

impl Zeroize for KeyAgreement {
    fn zeroize(&mut self) {
        match self {
            Self::Fast { key_a } | Self::Strong { key_a, .. } => key_a.zeroize(),
        }
    }
}

impl Drop for KeyAgreement {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Key pair a linked terminal signs its requests with
#[derive(Clone)]
pub struct TerminalKeys {
    secret: SecretKey,
}

impl std::fmt::Debug for TerminalKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalKeys")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

impl TerminalKeys {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut rand_v8::thread_rng()),
        }
    }

    /// Restore a key pair from its 32 byte private key
    pub fn from_bytes(private_key: &[u8]) -> Result<Self> {
        Ok(Self {
            secret: SecretKey::from_slice(private_key)?,
        })
    }

    /// Private key bytes, for secure storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }

    /// Uncompressed public key sent to the card
    pub fn public_key(&self) -> Vec<u8> {
        self.secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// 64 byte `r || s` signature over `sha256(message)`
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = SigningKey::from(&self.secret).sign(message);
        signature.to_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes() {
        assert_eq!(
            hex::encode(sha256(b"000000")),
            "91b4d142823f7d20c5f08df69122de43f35f057a988d9619f6d3138485c9a203"
        );
        assert_eq!(
            hex::encode(pbkdf2_sha256(
                &sha256(b"000000"),
                &hex::decode("0102030405060708").unwrap(),
                PROTOCOL_KEY_ITERATIONS
            )),
            "1d40db7829ae4aa63e6ccc702a009f43e8903262292ea0c01e0123bc97d6f14d"
        );
    }

    #[test]
    fn test_session_key() {
        let secret: Vec<u8> = (0u8..32).collect();
        let key = session_key(
            &secret,
            &sha256(b"000000"),
            &hex::decode("0102030405060708").unwrap(),
        );
        assert_eq!(
            hex::encode(key.as_bytes()),
            "9f9d46a349beef2536398b28d54d755587369f1660dc922fdfd3dcfead771d17"
        );
    }

    #[test]
    fn test_fast_agreement() {
        assert!(KeyAgreement::new(EncryptionMode::None).is_none());

        let agreement = KeyAgreement::new(EncryptionMode::Fast).unwrap();
        assert_eq!(agreement.key_a().len(), 16);
        let secret = agreement.shared_secret(&[0xBB; 16]).unwrap();
        assert_eq!(&secret[..16], agreement.key_a());
        assert_eq!(&secret[16..], &[0xBB; 16]);
    }

    #[test]
    fn test_strong_agreement_matches_card_side() {
        let agreement = KeyAgreement::new(EncryptionMode::Strong).unwrap();
        assert_eq!(agreement.key_a().len(), 65);

        let card_secret = SecretKey::random(&mut rand_v8::thread_rng());
        let card_public = card_secret.public_key().to_encoded_point(false);
        let terminal_public = PublicKey::from_sec1_bytes(agreement.key_a()).unwrap();
        let card_side = diffie_hellman(card_secret.to_nonzero_scalar(), terminal_public.as_affine());

        assert_eq!(
            agreement.shared_secret(card_public.as_bytes()).unwrap(),
            card_side.raw_secret_bytes().to_vec()
        );
    }

    #[test]
    fn test_signature_helpers() {
        let signing_key = SigningKey::random(&mut rand_v8::thread_rng());
        let public_key = signing_key.verifying_key().to_encoded_point(true);
        let message = b"challenge and salt";
        let signature: Signature = signing_key.sign(message);

        assert!(verify_secp256k1(public_key.as_bytes(), message, &signature.to_bytes()).unwrap());
        assert!(!verify_secp256k1(public_key.as_bytes(), b"other", &signature.to_bytes()).unwrap());

        let (r, s) = signature.split_scalars();
        let high = Signature::from_scalars(r, -s).unwrap();
        assert!(verify_secp256k1(public_key.as_bytes(), message, &high.to_bytes()).unwrap());
        assert_eq!(
            normalize_secp256k1_signature(&high.to_bytes()).unwrap(),
            signature.to_bytes().to_vec()
        );
        assert!(normalize_secp256k1_signature(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_terminal_keys_round_trip_and_sign() {
        let keys = TerminalKeys::generate();
        assert_eq!(keys.public_key().len(), 65);

        let restored = TerminalKeys::from_bytes(&keys.to_bytes()).unwrap();
        assert_eq!(restored.public_key(), keys.public_key());

        let signature = keys.sign(b"hashes");
        assert!(verify_secp256k1(&keys.public_key(), b"hashes", &signature).unwrap());
        assert!(TerminalKeys::from_bytes(&[0u8; 32]).is_err());
    }
}
