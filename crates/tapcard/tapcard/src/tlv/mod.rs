//! Tag typed TLV codec
//!
//! Wire form is `tag (1 byte) | length | value`, with a one byte length up to 0xFE and
//! `FF len_hi len_lo` above. Every [`TlvTag`] has a fixed [`TlvValueType`]; encoding or decoding
//! a Rust type that does not match it fails instead of silently converting.

mod builder;
mod decoder;
mod tag;
mod value;

use std::fmt;

use bytes::Bytes;
use iso7816_tlv::simple::{Tag, Tlv as SimpleTlv};
use tapcard_apdu_core::ResponseApdu;
use tracing::trace;

pub use builder::TlvBuilder;
pub use decoder::TlvDecoder;
pub use tag::{TlvTag, TlvValueType};
pub use value::{TlvDecode, TlvEncode};
pub(crate) use value::{decode_uint, encode_uint, ensure_decodable, ensure_encodable};

use crate::{Error, Result};

/// A single TLV item
#[derive(Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: TlvTag,
    value: Bytes,
}

impl Tlv {
    /// Create a TLV from a tag and its raw value
    pub fn new(tag: TlvTag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Tag of this item
    pub const fn tag(&self) -> TlvTag {
        self.tag
    }

    /// Raw value
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let tag = Tag::try_from(self.tag.code())
            .map_err(|e| Error::EncodingFailed(format!("tag {}: {e}", self.tag)))?;
        let tlv = SimpleTlv::new(tag, self.value.to_vec())
            .map_err(|e| Error::EncodingFailed(format!("tag {}: {e}", self.tag)))?;
        Ok(tlv.to_vec())
    }

    /// Serialize a list of items back to back
    pub fn serialize_all(tlvs: &[Self]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for tlv in tlvs {
            out.extend(tlv.to_bytes()?);
        }
        Ok(out)
    }

    /// Parse a list of items, failing on truncated or malformed input
    pub fn deserialize(data: &[u8]) -> Result<Vec<Self>> {
        let mut tlvs = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let (parsed, remaining) = SimpleTlv::parse(rest);
            tlvs.push(Self::from(&parsed?));
            rest = remaining;
        }
        Ok(tlvs)
    }

    /// Parse a list of items, stopping at the first malformed item
    ///
    /// Legacy tags pad their payload with bytes that are not valid TLV.
    pub fn deserialize_lenient(data: &[u8]) -> Vec<Self> {
        let mut tlvs = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            match SimpleTlv::parse(rest) {
                (Ok(tlv), remaining) => {
                    tlvs.push(Self::from(&tlv));
                    rest = remaining;
                }
                (Err(e), _) => {
                    trace!(error = %e, remaining = rest.len(), "Stopped parsing TLV payload");
                    break;
                }
            }
        }
        tlvs
    }
}

impl From<&SimpleTlv> for Tlv {
    fn from(tlv: &SimpleTlv) -> Self {
        let code: u8 = tlv.tag().into();
        Self::new(TlvTag::from(code), Bytes::copy_from_slice(tlv.value()))
    }
}

impl fmt::Display for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.should_mask() {
            write!(f, "TAG_{} *****", self.tag)
        } else {
            write!(
                f,
                "TAG_{} [{:#04x}:{:02}]: {}",
                self.tag,
                self.tag.code(),
                self.value.len(),
                hex::encode(&self.value)
            )
        }
    }
}

impl fmt::Debug for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// TLV extraction from a (decrypted) response APDU
pub trait ResponseApduExt {
    /// Parse the response body as a TLV list
    fn tlv_data(&self) -> Result<Vec<Tlv>>;
}

impl ResponseApduExt for ResponseApdu {
    fn tlv_data(&self) -> Result<Vec<Tlv>> {
        if self.data().is_empty() {
            return Err(Error::DeserializeApduFailed);
        }
        let tlvs = Tlv::deserialize(self.data())?;
        for tlv in &tlvs {
            trace!(%tlv, "Received");
        }
        Ok(tlvs)
    }
}
