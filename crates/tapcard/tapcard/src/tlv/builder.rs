//! Builder for command payloads

use bytes::Bytes;
use tracing::trace;

use super::{Tlv, TlvEncode, TlvTag};
use crate::Result;

/// Accumulates typed values into a TLV payload
#[derive(Debug, Default, Clone)]
pub struct TlvBuilder {
    tlvs: Vec<Tlv>,
}

impl TlvBuilder {
    /// Create an empty builder
    pub const fn new() -> Self {
        Self { tlvs: Vec::new() }
    }

    /// Append a value under `tag`
    pub fn append<T: TlvEncode + ?Sized>(&mut self, tag: TlvTag, value: &T) -> Result<&mut Self> {
        let encoded = value.encode(tag)?;
        self.tlvs.push(Tlv::new(tag, encoded));
        Ok(self)
    }

    /// Append a value under `tag` if present, otherwise leave the tag out
    pub fn append_optional<T: TlvEncode + ?Sized>(
        &mut self,
        tag: TlvTag,
        value: Option<&T>,
    ) -> Result<&mut Self> {
        match value {
            Some(value) => self.append(tag, value),
            None => Ok(self),
        }
    }

    /// Items appended so far
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    /// Consume the builder, returning its items
    pub fn into_tlvs(self) -> Vec<Tlv> {
        self.tlvs
    }

    /// Serialize the payload
    pub fn serialize(&self) -> Result<Bytes> {
        for tlv in &self.tlvs {
            trace!(%tlv, "Sending");
        }
        Tlv::serialize_all(&self.tlvs).map(Bytes::from)
    }
}
