//! Bitmask types carried by the card
//!
//! Each mask is a raw integer wrapper with an enum of the bits it knows about. Unknown bits are
//! preserved so that a mask read from the card serializes back unchanged.

use serde::{Serialize, Serializer};

use crate::{
    Error, Result,
    tlv::{
        TlvDecode, TlvEncode, TlvTag, TlvValueType, decode_uint, encode_uint, ensure_decodable,
        ensure_encodable,
    },
};

macro_rules! mask_codes {
    (
        $(#[$code_meta:meta])* $code:ident,
        $(#[$mask_meta:meta])* $mask:ident($raw:ty) {
            $( $(#[$meta:meta])* $name:ident = $value:literal, )*
        }
    ) => {
        $(#[$code_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $code {
            $( $(#[$meta])* $name, )*
        }

        impl $code {
            const ALL: &'static [Self] = &[$( Self::$name, )*];

            /// Bit value of the code
            pub const fn value(self) -> $raw {
                match self {
                    $( Self::$name => $value, )*
                }
            }
        }

        $(#[$mask_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $mask($raw);

        impl $mask {
            /// Build a mask from a set of codes
            pub fn new(codes: &[$code]) -> Self {
                Self(codes.iter().fold(0, |raw, code| raw | code.value()))
            }

            /// Raw mask value
            pub const fn raw(&self) -> $raw {
                self.0
            }

            /// Whether `code` is set
            pub const fn contains(&self, code: $code) -> bool {
                self.0 & code.value() != 0
            }

            /// Known codes set in the mask
            pub fn codes(&self) -> Vec<$code> {
                $code::ALL.iter().copied().filter(|code| self.contains(*code)).collect()
            }
        }

        impl From<$raw> for $mask {
            fn from(raw: $raw) -> Self {
                Self(raw)
            }
        }

        impl Serialize for $mask {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_seq(self.codes())
            }
        }
    };
}

mask_codes! {
    /// Card personalization flags
    CardSettingsCode,
    /// Card settings mask, 2 or 4 bytes on the wire
    CardSettingsMask(u32) {
        IsReusable = 0x0001,
        UseActivation = 0x0002,
        PermanentWallet = 0x0004,
        UseBlock = 0x0008,
        AllowSetPin1 = 0x0010,
        AllowSetPin2 = 0x0020,
        UseCvc = 0x0040,
        ProhibitDefaultPin1 = 0x0080,
        UseOneCommandAtTime = 0x0100,
        UseNdef = 0x0200,
        UseDynamicNdef = 0x0400,
        SmartSecurityDelay = 0x0800,
        AllowUnencrypted = 0x1000,
        AllowFastEncryption = 0x2000,
        ProtectIssuerDataAgainstReplay = 0x4000,
        AllowSelectBlockchain = 0x8000,
        DisablePrecomputedNdef = 0x0001_0000,
        SkipSecurityDelayIfValidatedByIssuer = 0x0002_0000,
        SkipCheckPin2CvcIfValidatedByIssuer = 0x0004_0000,
        SkipSecurityDelayIfValidatedByLinkedTerminal = 0x0008_0000,
        RestrictOverwriteIssuerExtraData = 0x0010_0000,
        DisableIssuerData = 0x0100_0000,
        DisableUserData = 0x0200_0000,
        DisableFiles = 0x0400_0000,
    }
}

mask_codes! {
    /// Wallet flags
    WalletSettingsCode,
    /// Wallet settings mask, 4 bytes on the wire
    WalletSettingsMask(u32) {
        IsReusable = 0x0001,
        IsPermanent = 0x0004,
    }
}

mask_codes! {
    /// Flags the card holder can change
    UserSettingsCode,
    /// User settings mask, 4 bytes on the wire
    UserSettingsMask(u32) {
        IsUserCodeRecoveryForbidden = 0x0001,
        IsPinRequired = 0x0002,
        IsNdefDisabled = 0x0004,
    }
}

mask_codes! {
    /// Product lines a card belongs to
    ProductCode,
    /// Product mask, 1 byte on the wire
    ProductMask(u8) {
        Note = 0x01,
        Tag = 0x02,
        IdCard = 0x04,
        IdIssuer = 0x08,
        TwinCard = 0x20,
    }
}

impl CardSettingsMask {
    /// Wallet flags share their bit positions with the card flags on firmware before 4.0
    pub const fn to_wallet_settings_mask(self) -> WalletSettingsMask {
        WalletSettingsMask(self.0)
    }
}

impl TlvEncode for CardSettingsMask {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::SettingsMask])?;
        let width = if self.0 & 0xFFFF_0000 != 0 { 4 } else { 2 };
        encode_uint(tag, self.0, width)
    }
}

impl TlvDecode for CardSettingsMask {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::SettingsMask])?;
        decode_uint(tag, value).map(Self)
    }
}

impl TlvEncode for WalletSettingsMask {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::SettingsMask])?;
        encode_uint(tag, self.0, 4)
    }
}

impl TlvDecode for WalletSettingsMask {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::SettingsMask])?;
        decode_uint(tag, value).map(Self)
    }
}

impl TlvEncode for UserSettingsMask {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::SettingsMask])?;
        encode_uint(tag, self.0, 4)
    }
}

impl TlvDecode for UserSettingsMask {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::SettingsMask])?;
        decode_uint(tag, value).map(Self)
    }
}

impl TlvEncode for ProductMask {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::ProductMask])?;
        Ok(vec![self.0])
    }
}

impl TlvDecode for ProductMask {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::ProductMask])?;
        let raw = decode_uint(tag, value)?;
        u8::try_from(raw)
            .map(Self)
            .map_err(|_| Error::DecodingFailed(format!("{tag}: {raw} out of range")))
    }
}

/// Kind of data a wallet accepts for signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SigningMethodCode {
    /// Pre-hashed data
    SignHash = 0,
    /// Raw transaction
    SignRaw = 1,
    /// Hash validated by the issuer
    SignHashSignedByIssuer = 2,
    /// Raw transaction validated by the issuer
    SignRawSignedByIssuer = 3,
    /// Hash validated by the issuer, issuer data written
    SignHashSignedByIssuerAndUpdateIssuerData = 4,
    /// Raw transaction validated by the issuer, issuer data written
    SignRawSignedByIssuerAndUpdateIssuerData = 5,
    /// Point of sale
    SignPos = 6,
}

impl SigningMethodCode {
    const ALL: [Self; 7] = [
        Self::SignHash,
        Self::SignRaw,
        Self::SignHashSignedByIssuer,
        Self::SignRawSignedByIssuer,
        Self::SignHashSignedByIssuerAndUpdateIssuerData,
        Self::SignRawSignedByIssuerAndUpdateIssuerData,
        Self::SignPos,
    ];
}

/// Signing methods allowed by the card
///
/// A raw value without the `0x80` bit names exactly one method by its number; with the bit set
/// the low bits are a bitmap of methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SigningMethod(u8);

impl SigningMethod {
    const MULTIPLE: u8 = 0x80;

    /// Build the mask from a set of methods
    pub fn new(methods: &[SigningMethodCode]) -> Self {
        match methods {
            [] => Self(0),
            [single] => Self(*single as u8),
            many => Self(
                many.iter()
                    .fold(Self::MULTIPLE, |raw, method| raw | (1 << *method as u8)),
            ),
        }
    }

    /// Raw mask value
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// Whether `method` is allowed
    pub const fn contains(&self, method: SigningMethodCode) -> bool {
        if self.0 & Self::MULTIPLE == 0 {
            self.0 == method as u8
        } else {
            self.0 & (1 << method as u8) != 0
        }
    }

    /// Allowed methods
    pub fn codes(&self) -> Vec<SigningMethodCode> {
        SigningMethodCode::ALL
            .into_iter()
            .filter(|method| self.contains(*method))
            .collect()
    }
}

impl From<u8> for SigningMethod {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl Serialize for SigningMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.codes())
    }
}

impl TlvEncode for SigningMethod {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::SigningMethod])?;
        Ok(vec![self.0])
    }
}

impl TlvDecode for SigningMethod {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::SigningMethod])?;
        let raw = decode_uint(tag, value)?;
        u8::try_from(raw)
            .map(Self)
            .map_err(|_| Error::DecodingFailed(format!("{tag}: {raw} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_settings_width() {
        let mask = CardSettingsMask::new(&[
            CardSettingsCode::IsReusable,
            CardSettingsCode::AllowSelectBlockchain,
        ]);
        assert_eq!(mask.encode(TlvTag::SettingsMask).unwrap(), vec![0x80, 0x01]);

        let wide = CardSettingsMask::new(&[CardSettingsCode::DisableFiles]);
        assert_eq!(
            wide.encode(TlvTag::SettingsMask).unwrap(),
            vec![0x04, 0x00, 0x00, 0x00]
        );

        let decoded = CardSettingsMask::decode(TlvTag::SettingsMask, &[0x7E, 0x31]).unwrap();
        assert!(decoded.contains(CardSettingsCode::ProtectIssuerDataAgainstReplay));
        assert!(decoded.contains(CardSettingsCode::IsReusable));
        assert!(!decoded.contains(CardSettingsCode::PermanentWallet));
    }

    #[test]
    fn test_wallet_settings_from_card_mask() {
        let card = CardSettingsMask::new(&[CardSettingsCode::PermanentWallet]);
        let wallet = card.to_wallet_settings_mask();
        assert!(wallet.contains(WalletSettingsCode::IsPermanent));
        assert_eq!(
            wallet.encode(TlvTag::SettingsMask).unwrap(),
            vec![0x00, 0x00, 0x00, 0x04]
        );
    }

    #[test]
    fn test_signing_method_single_and_multiple() {
        let single = SigningMethod::new(&[SigningMethodCode::SignHash]);
        assert_eq!(single.raw(), 0x00);
        assert!(single.contains(SigningMethodCode::SignHash));
        assert!(!single.contains(SigningMethodCode::SignRaw));

        let multiple = SigningMethod::new(&[SigningMethodCode::SignHash, SigningMethodCode::SignRaw]);
        assert_eq!(multiple.raw(), 0x83);
        assert_eq!(
            multiple.codes(),
            vec![SigningMethodCode::SignHash, SigningMethodCode::SignRaw]
        );

        let raw_only = SigningMethod::from(0x01);
        assert!(!raw_only.contains(SigningMethodCode::SignHash));
    }

    #[test]
    fn test_product_mask() {
        let mask = ProductMask::decode(TlvTag::ProductMask, &[0x02]).unwrap();
        assert_eq!(mask.codes(), vec![ProductCode::Tag]);
        assert_eq!(serde_json::to_string(&mask).unwrap(), r#"["Tag"]"#);
    }
}
