use generic_array::GenericArray;
use hmac::{Hmac, Mac};
use k256::{
    ProjectivePoint, PublicKey, Scalar,
    elliptic_curve::{PrimeField, group::Curve, sec1::ToEncodedPoint},
};
use serde::Serialize;
use sha2::Sha512;

use super::{DerivationNode, DerivationPath};
use crate::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

const CHAIN_CODE_SIZE: usize = 32;

/// secp256k1 public key with its BIP32 chain code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedPublicKey {
    /// Compressed SEC1 public key
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
    /// Chain code
    #[serde(with = "hex")]
    pub chain_code: Vec<u8>,
    /// Number of derivation steps from the master key
    pub depth: u8,
    /// Index of the last derivation step, zero for the master key
    pub child_number: u32,
}

impl ExtendedPublicKey {
    /// Master key from a SEC1 public key (compressed or not) and a 32 byte chain code
    pub fn new(public_key: &[u8], chain_code: &[u8]) -> Result<Self> {
        if chain_code.len() != CHAIN_CODE_SIZE {
            return Err(Error::CryptoUtilsError(format!(
                "chain code of {} bytes",
                chain_code.len()
            )));
        }
        let key = PublicKey::from_sec1_bytes(public_key)?;
        Ok(Self {
            public_key: key.to_encoded_point(true).as_bytes().to_vec(),
            chain_code: chain_code.to_vec(),
            depth: 0,
            child_number: 0,
        })
    }

    /// Child key the card derived at `path`
    ///
    /// secp256k1 keys are validated and compressed; ed25519 keys are kept as sent.
    pub(crate) fn from_card(
        public_key: &[u8],
        chain_code: &[u8],
        path: &DerivationPath,
    ) -> Result<Self> {
        let mut key = if public_key.len() == 32 {
            if chain_code.len() != CHAIN_CODE_SIZE {
                return Err(Error::CryptoUtilsError(format!(
                    "chain code of {} bytes",
                    chain_code.len()
                )));
            }
            Self {
                public_key: public_key.to_vec(),
                chain_code: chain_code.to_vec(),
                depth: 0,
                child_number: 0,
            }
        } else {
            Self::new(public_key, chain_code)?
        };
        let nodes = path.nodes().len();
        key.depth = u8::try_from(nodes).map_err(|_| {
            Error::WrongDerivationPath(format!("{nodes} nodes exceed the maximum depth"))
        })?;
        key.child_number = path.nodes().last().map_or(0, DerivationNode::index);
        Ok(key)
    }

    /// CKDpub: derive the non-hardened child at `node`
    pub fn derive_public_key(&self, node: DerivationNode) -> Result<Self> {
        if node.is_hardened() {
            return Err(Error::HardenedDerivationNotSupported);
        }
        let depth = self.depth.checked_add(1).ok_or_else(|| {
            Error::WrongDerivationPath("child below the maximum depth".to_string())
        })?;
        let index = node.index();

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| Error::CryptoUtilsError(e.to_string()))?;
        mac.update(&self.public_key);
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let (left, right) = digest.split_at(CHAIN_CODE_SIZE);

        let tweak: Option<Scalar> =
            Scalar::from_repr(GenericArray::clone_from_slice(left)).into();
        let tweak = tweak.ok_or_else(|| {
            Error::CryptoUtilsError(format!("child {index} tweak exceeds the curve order"))
        })?;

        let parent = PublicKey::from_sec1_bytes(&self.public_key)?;
        let point = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
        let child = PublicKey::from_affine(point.to_affine())?;

        Ok(Self {
            public_key: child.to_encoded_point(true).as_bytes().to_vec(),
            chain_code: right.to_vec(),
            depth,
            child_number: index,
        })
    }

    /// Derive every node of `path` in turn
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
        path.nodes()
            .iter()
            .try_fold(self.clone(), |key, node| key.derive_public_key(*node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(public_key: &str, chain_code: &str) -> ExtendedPublicKey {
        ExtendedPublicKey::new(
            &hex::decode(public_key).unwrap(),
            &hex::decode(chain_code).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_derive_first_child() {
        let key = master(
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2",
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508",
        );
        let child = key.derive_public_key(DerivationNode::NonHardened(1)).unwrap();
        assert_eq!(
            hex::encode(&child.public_key),
            "037c2098fd2235660734667ff8821dbbe0e6592d43cfd86b5dde9ea7c839b93a50"
        );
        assert_eq!(
            hex::encode(&child.chain_code),
            "8dd96414ff4d5b4750be3af7fecce207173f86d6b5f58f9366297180de8e109b"
        );
        assert_eq!(child.depth, 1);
        assert_eq!(child.child_number, 1);
    }

    #[test]
    fn test_derive_path() {
        let key = master(
            "03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7",
            "60499f801b896d83179a4374aeb7822aaeaceaa0db1f85ee3e904c4defbd9689",
        );

        let first = key.derive_path(&"m/0".parse().unwrap()).unwrap();
        assert_eq!(
            hex::encode(&first.public_key),
            "02fc9e5af0ac8d9b3cecfe2a888e2117ba3d089d8585886c9c826b6b22a98d12ea"
        );
        assert_eq!(
            hex::encode(&first.chain_code),
            "f0909affaa7ee7abe5dd4e100598d4dc53cd709d5a5c2cac40e7412f232f7c9c"
        );

        let path: DerivationPath = "m/0/1".parse().unwrap();
        let second = key.derive_path(&path).unwrap();
        assert_eq!(
            hex::encode(&second.public_key),
            "02d27a781fd1b3ec5ba5017ca55b9b900fde598459a0204597b37e6c66a0e35c98"
        );
        assert_eq!(
            hex::encode(&second.chain_code),
            "8d5e25bfe038e4ef37e2c5ec963b7a7c7a745b4319bff873fc40f1a52c7d6fd1"
        );
        assert_eq!(key.derive_path(&path).unwrap(), second);
    }

    #[test]
    fn test_hardened_is_rejected() {
        let key = master(
            "03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7",
            "60499f801b896d83179a4374aeb7822aaeaceaa0db1f85ee3e904c4defbd9689",
        );
        let path = super::super::Bip44::new(0).path();
        assert_eq!(
            key.derive_path(&path),
            Err(Error::HardenedDerivationNotSupported)
        );
    }

    #[test]
    fn test_key_from_card() {
        let path: DerivationPath = "m/44'/0'/0'/0/7".parse().unwrap();
        let ed25519 = ExtendedPublicKey::from_card(&[0x11; 32], &[0x22; 32], &path).unwrap();
        assert_eq!(ed25519.public_key, vec![0x11; 32]);
        assert_eq!(ed25519.depth, 5);
        assert_eq!(ed25519.child_number, 7);

        let secp = hex::decode(
            "03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7",
        )
        .unwrap();
        let key = ExtendedPublicKey::from_card(&secp, &[0x22; 32], &path).unwrap();
        assert_eq!(key.public_key, secp);
        assert!(ExtendedPublicKey::from_card(&[0x11; 32], &[0x22; 4], &path).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deepest: DerivationPath = vec![DerivationNode::NonHardened(0); 255].into();
        let key = ExtendedPublicKey::from_card(&[0x11; 32], &[0x22; 32], &deepest).unwrap();
        assert_eq!(key.depth, 255);

        let too_deep: DerivationPath = vec![DerivationNode::NonHardened(0); 256].into();
        assert!(matches!(
            ExtendedPublicKey::from_card(&[0x11; 32], &[0x22; 32], &too_deep),
            Err(Error::WrongDerivationPath(_))
        ));

        let mut parent = master(
            "03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7",
            "60499f801b896d83179a4374aeb7822aaeaceaa0db1f85ee3e904c4defbd9689",
        );
        parent.depth = u8::MAX;
        assert!(matches!(
            parent.derive_public_key(DerivationNode::NonHardened(1)),
            Err(Error::WrongDerivationPath(_))
        ));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(ExtendedPublicKey::new(&[0x05; 33], &[0u8; 32]).is_err());
        assert!(matches!(
            ExtendedPublicKey::new(
                &hex::decode("03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7")
                    .unwrap(),
                &[0u8; 16]
            ),
            Err(Error::CryptoUtilsError(_))
        ));
    }
}
