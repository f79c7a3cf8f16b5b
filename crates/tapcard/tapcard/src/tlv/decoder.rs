//! Typed access to a parsed TLV list

use super::{Tlv, TlvDecode, TlvTag};
use crate::Result;

/// Decodes typed values out of a TLV list
#[derive(Debug, Clone, Default)]
pub struct TlvDecoder {
    tlvs: Vec<Tlv>,
}

impl TlvDecoder {
    /// Wrap a parsed TLV list
    pub const fn new(tlvs: Vec<Tlv>) -> Self {
        Self { tlvs }
    }

    /// Underlying items
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    /// Whether `tag` is present
    pub fn contains(&self, tag: TlvTag) -> bool {
        self.find(tag).is_some()
    }

    /// Decode a mandatory tag
    ///
    /// Boolean tags decode as `false` when absent; every other type fails with
    /// [`crate::Error::DecodingFailedMissingTag`].
    pub fn decode<T: TlvDecode>(&self, tag: TlvTag) -> Result<T> {
        match self.find(tag) {
            Some(tlv) => T::decode(tag, tlv.value()),
            None => T::absent(tag),
        }
    }

    /// Decode an optional tag
    pub fn decode_optional<T: TlvDecode>(&self, tag: TlvTag) -> Result<Option<T>> {
        self.find(tag)
            .map(|tlv| T::decode(tag, tlv.value()))
            .transpose()
    }

    /// Decode every occurrence of a repeated tag, in order
    pub fn decode_all<T: TlvDecode>(&self, tag: TlvTag) -> Result<Vec<T>> {
        self.tlvs
            .iter()
            .filter(|tlv| tlv.tag() == tag)
            .map(|tlv| T::decode(tag, tlv.value()))
            .collect()
    }

    /// Decoder over the nested list carried by `tag`, if present
    pub fn nested(&self, tag: TlvTag) -> Result<Option<Self>> {
        Ok(self.decode_optional::<Vec<Tlv>>(tag)?.map(Self::new))
    }

    fn find(&self, tag: TlvTag) -> Option<&Tlv> {
        self.tlvs.iter().find(|tlv| tlv.tag() == tag)
    }
}

impl From<Vec<Tlv>> for TlvDecoder {
    fn from(tlvs: Vec<Tlv>) -> Self {
        Self::new(tlvs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::tlv::TlvBuilder;

    fn decoder() -> TlvDecoder {
        let mut nested = TlvBuilder::new();
        nested.append(TlvTag::BatchId, "0017").unwrap();

        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, "CB22000000027374")
            .unwrap()
            .append(TlvTag::Firmware, "4.52r")
            .unwrap()
            .append(TlvTag::TerminalIsLinked, &true)
            .unwrap()
            .append(TlvTag::CardData, nested.tlvs())
            .unwrap()
            .append(TlvTag::WalletIndex, &0u8)
            .unwrap()
            .append(TlvTag::WalletIndex, &3u8)
            .unwrap();

        let bytes = builder.serialize().unwrap();
        TlvDecoder::new(Tlv::deserialize(&bytes).unwrap())
    }

    #[test]
    fn test_decode_mandatory_and_optional() {
        let decoder = decoder();
        let card_id: String = decoder.decode(TlvTag::CardId).unwrap();
        assert_eq!(card_id, "CB22000000027374");

        let health: Option<u16> = decoder.decode_optional(TlvTag::Health).unwrap();
        assert_eq!(health, None);

        assert_eq!(
            decoder.decode::<u16>(TlvTag::Health),
            Err(Error::DecodingFailedMissingTag(TlvTag::Health))
        );
    }

    #[test]
    fn test_absent_bool_is_false() {
        let decoder = decoder();
        assert!(decoder.decode::<bool>(TlvTag::TerminalIsLinked).unwrap());
        assert!(!decoder.decode::<bool>(TlvTag::IsActivated).unwrap());
    }

    #[test]
    fn test_nested_and_repeated() {
        let decoder = decoder();
        let card_data = decoder.nested(TlvTag::CardData).unwrap().unwrap();
        assert_eq!(card_data.decode::<String>(TlvTag::BatchId).unwrap(), "0017");
        assert!(decoder.nested(TlvTag::CardWallet).unwrap().is_none());

        let indices: Vec<u8> = decoder.decode_all(TlvTag::WalletIndex).unwrap();
        assert_eq!(indices, vec![0, 3]);
    }
}
