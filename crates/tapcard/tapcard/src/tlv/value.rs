//! Conversions between Rust values and tag values

use bytes::Bytes;

use super::{Tlv, TlvTag, TlvValueType};
use crate::{Error, Result};

/// A value that can be written under a tag
pub trait TlvEncode {
    /// Encode `self` as the value of `tag`, checking the tag semantic type
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>>;
}

/// A value that can be read from a tag
pub trait TlvDecode: Sized {
    /// Decode the value of `tag`, checking the tag semantic type
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self>;

    /// Value used when `tag` is absent from the response
    fn absent(tag: TlvTag) -> Result<Self> {
        Err(Error::DecodingFailedMissingTag(tag))
    }
}

impl<T: TlvEncode + ?Sized> TlvEncode for &T {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        (**self).encode(tag)
    }
}

/// Fail with [`Error::EncodingFailedTypeMismatch`] unless the tag has one of `allowed` types
pub(crate) fn ensure_encodable(tag: TlvTag, allowed: &[TlvValueType]) -> Result<()> {
    if allowed.contains(&tag.value_type()) {
        Ok(())
    } else {
        Err(Error::EncodingFailedTypeMismatch(tag))
    }
}

/// Fail with [`Error::DecodingFailedTypeMismatch`] unless the tag has one of `allowed` types
pub(crate) fn ensure_decodable(tag: TlvTag, allowed: &[TlvValueType]) -> Result<()> {
    if allowed.contains(&tag.value_type()) {
        Ok(())
    } else {
        Err(Error::DecodingFailedTypeMismatch(tag))
    }
}

/// Read a big-endian integer of 1, 2 or 4 bytes
pub(crate) fn decode_uint(tag: TlvTag, value: &[u8]) -> Result<u32> {
    match *value {
        [b] => Ok(b.into()),
        [hi, lo] => Ok(u16::from_be_bytes([hi, lo]).into()),
        [a, b, c, d] => Ok(u32::from_be_bytes([a, b, c, d])),
        _ => Err(Error::DecodingFailed(format!(
            "{tag}: integer of {} bytes",
            value.len()
        ))),
    }
}

/// Write `value` big-endian in exactly `width` bytes
pub(crate) fn encode_uint(tag: TlvTag, value: u32, width: usize) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    let (high, low) = bytes.split_at(bytes.len() - width);
    if high.iter().any(|&b| b != 0) {
        return Err(Error::EncodingFailed(format!(
            "{tag}: {value} does not fit in {width} bytes"
        )));
    }
    Ok(low.to_vec())
}

const INTEGER_TYPES: &[TlvValueType] = &[
    TlvValueType::Uint8,
    TlvValueType::Uint16,
    TlvValueType::Uint32,
];

macro_rules! impl_tlv_uint {
    ($($ty:ty),*) => {
        $(
            impl TlvEncode for $ty {
                fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
                    ensure_encodable(tag, INTEGER_TYPES)?;
                    let width = match tag.value_type() {
                        TlvValueType::Uint8 => 1,
                        TlvValueType::Uint16 => 2,
                        _ => 4,
                    };
                    let value = u32::try_from(*self).map_err(|_| {
                        Error::EncodingFailed(format!("{tag}: {} out of range", self))
                    })?;
                    encode_uint(tag, value, width)
                }
            }

            impl TlvDecode for $ty {
                fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
                    ensure_decodable(tag, INTEGER_TYPES)?;
                    let raw = decode_uint(tag, value)?;
                    <$ty>::try_from(raw).map_err(|_| {
                        Error::DecodingFailed(format!("{tag}: {raw} out of range"))
                    })
                }
            }
        )*
    };
}

impl_tlv_uint!(u8, u16, u32, usize);

impl TlvEncode for [u8] {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::ByteArray])?;
        Ok(self.to_vec())
    }
}

impl TlvEncode for Vec<u8> {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        self.as_slice().encode(tag)
    }
}

impl TlvEncode for Bytes {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        self.as_ref().encode(tag)
    }
}

impl TlvDecode for Vec<u8> {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::ByteArray])?;
        Ok(value.to_vec())
    }
}

impl TlvDecode for Bytes {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::ByteArray])?;
        Ok(Self::copy_from_slice(value))
    }
}

impl TlvEncode for str {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::HexString, TlvValueType::Utf8String])?;
        if tag.value_type() == TlvValueType::HexString {
            hex::decode(self).map_err(|e| Error::EncodingFailed(format!("{tag}: {e}")))
        } else {
            Ok(self.as_bytes().to_vec())
        }
    }
}

impl TlvEncode for String {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        self.as_str().encode(tag)
    }
}

impl TlvDecode for String {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::HexString, TlvValueType::Utf8String])?;
        if tag.value_type() == TlvValueType::HexString {
            return Ok(hex::encode_upper(value));
        }

        let end = value
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        Self::from_utf8(value[..end].to_vec())
            .map_err(|e| Error::DecodingFailed(format!("{tag}: {e}")))
    }
}

impl TlvEncode for bool {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::Bool])?;
        Ok(vec![u8::from(*self)])
    }
}

impl TlvDecode for bool {
    fn decode(tag: TlvTag, _value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::Bool])?;
        Ok(true)
    }

    fn absent(tag: TlvTag) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::Bool])?;
        Ok(false)
    }
}

impl TlvEncode for [Tlv] {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::Nested])?;
        Tlv::serialize_all(self)
    }
}

impl TlvEncode for Vec<Tlv> {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        self.as_slice().encode(tag)
    }
}

impl TlvDecode for Vec<Tlv> {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::Nested])?;
        Tlv::deserialize(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_use_canonical_width() {
        assert_eq!(5u8.encode(TlvTag::WalletIndex).unwrap(), vec![0x05]);
        assert_eq!(5u32.encode(TlvTag::Offset).unwrap(), vec![0x00, 0x05]);
        assert_eq!(
            1000u16.encode(TlvTag::MaxSignatures).unwrap(),
            vec![0x00, 0x00, 0x03, 0xE8]
        );
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(matches!(
            300u16.encode(TlvTag::WalletIndex),
            Err(Error::EncodingFailed(_))
        ));
        assert!(matches!(
            u8::decode(TlvTag::MaxSignatures, &[0x00, 0x00, 0x01, 0x00]),
            Err(Error::DecodingFailed(_))
        ));
    }

    #[test]
    fn test_integers_decode_any_supported_width() {
        assert_eq!(u32::decode(TlvTag::Health, &[0x07]).unwrap(), 7);
        assert_eq!(u32::decode(TlvTag::Health, &[0x01, 0x00]).unwrap(), 256);
        assert_eq!(
            u32::decode(TlvTag::Health, &[0x00, 0x01, 0x00, 0x00]).unwrap(),
            65536
        );
        assert!(u32::decode(TlvTag::Health, &[0x00, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            true.encode(TlvTag::CardId),
            Err(Error::EncodingFailedTypeMismatch(TlvTag::CardId))
        );
        assert_eq!(
            Vec::<u8>::decode(TlvTag::Firmware, b"4.52"),
            Err(Error::DecodingFailedTypeMismatch(TlvTag::Firmware))
        );
        assert_eq!(
            u8::decode(TlvTag::CardId, &[0x01]),
            Err(Error::DecodingFailedTypeMismatch(TlvTag::CardId))
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            "CB22000000027374".encode(TlvTag::CardId).unwrap(),
            hex::decode("cb22000000027374").unwrap()
        );
        assert_eq!(
            String::decode(TlvTag::CardId, &hex::decode("cb22000000027374").unwrap()).unwrap(),
            "CB22000000027374"
        );
        assert_eq!(
            String::decode(TlvTag::ManufacturerName, b"TANGEM\0\0").unwrap(),
            "TANGEM"
        );
        assert!("not hex".encode(TlvTag::CardId).is_err());
    }

    #[test]
    fn test_bool_presence() {
        assert_eq!(true.encode(TlvTag::IsActivated).unwrap(), vec![0x01]);
        assert_eq!(false.encode(TlvTag::IsActivated).unwrap(), vec![0x00]);
        assert!(bool::decode(TlvTag::IsActivated, &[]).unwrap());
        assert!(!bool::absent(TlvTag::IsActivated).unwrap());
        assert_eq!(
            String::absent(TlvTag::Firmware),
            Err(Error::DecodingFailedMissingTag(TlvTag::Firmware))
        );
    }
}
