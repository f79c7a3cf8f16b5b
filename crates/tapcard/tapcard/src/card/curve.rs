use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    tlv::{TlvDecode, TlvEncode, TlvTag, TlvValueType, ensure_decodable, ensure_encodable},
};

/// Elliptic curve of a wallet key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EllipticCurve {
    /// secp256k1, the only curve supporting non-hardened derivation here
    Secp256k1,
    /// Ed25519
    Ed25519,
    /// NIST P-256
    Secp256r1,
}

impl EllipticCurve {
    /// Every curve, in card order
    pub const ALL: [Self; 3] = [Self::Secp256k1, Self::Ed25519, Self::Secp256r1];

    /// Wire name of the curve
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
            Self::Secp256r1 => "secp256r1",
        }
    }

    /// Size of a raw signature produced with this curve: `r || s` or Ed25519 `R || S`
    pub const fn signature_len(&self) -> usize {
        match self {
            Self::Secp256k1 | Self::Ed25519 | Self::Secp256r1 => 64,
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EllipticCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|curve| curve.name() == s)
            .ok_or_else(|| Error::DecodingFailed(format!("unknown curve {s}")))
    }
}

impl TlvEncode for EllipticCurve {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::EllipticCurve])?;
        Ok(self.name().as_bytes().to_vec())
    }
}

impl TlvDecode for EllipticCurve {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::EllipticCurve])?;
        let end = value
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        std::str::from_utf8(&value[..end])
            .map_err(|e| Error::DecodingFailed(format!("{tag}: {e}")))?
            .parse()
    }
}
