//! Tag table of the card protocol

use std::fmt;

/// Semantic type of a tag value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvValueType {
    /// Raw bytes rendered as an uppercase hex string
    HexString,
    /// UTF-8 text, trailing NUL bytes stripped
    Utf8String,
    /// Big-endian integer, one byte on the wire
    Uint8,
    /// Big-endian integer, two bytes on the wire
    Uint16,
    /// Big-endian integer, four bytes on the wire
    Uint32,
    /// Flag; presence means true
    Bool,
    /// Opaque bytes
    ByteArray,
    /// Curve name as UTF-8
    EllipticCurve,
    /// `year_hi year_lo month day`
    DateTime,
    /// Product bitmask
    ProductMask,
    /// Card or wallet settings bitmask
    SettingsMask,
    /// Card or wallet status byte
    Status,
    /// Signing methods bitmask
    SigningMethod,
    /// Read or file data mode byte
    InteractionMode,
    /// Derivation path, four bytes per node
    DerivationPath,
    /// Nested TLV list
    Nested,
}

macro_rules! tlv_tags {
    (@mask masked) => { true };
    (@mask) => { false };
    ($( $(#[$meta:meta])* $name:ident = $code:literal => $value_type:ident $(, $mask:ident)?; )*) => {
        /// Tag of a TLV item
        ///
        /// Codes not known to the SDK are kept as [`TlvTag::Unknown`] so that a response can
        /// still be parsed around them.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TlvTag {
            $( $(#[$meta])* $name, )*
            /// Tag code not known to the SDK
            Unknown(u8),
        }

        impl TlvTag {
            /// Tag byte on the wire
            pub const fn code(&self) -> u8 {
                match self {
                    $( Self::$name => $code, )*
                    Self::Unknown(code) => *code,
                }
            }

            /// Look up a tag by its wire byte
            pub const fn from_code(code: u8) -> Self {
                match code {
                    $( $code => Self::$name, )*
                    other => Self::Unknown(other),
                }
            }

            /// Semantic type of the tag value
            pub const fn value_type(&self) -> TlvValueType {
                match self {
                    $( Self::$name => TlvValueType::$value_type, )*
                    Self::Unknown(_) => TlvValueType::ByteArray,
                }
            }

            /// Whether the value must be hidden in logs
            pub const fn should_mask(&self) -> bool {
                match self {
                    $( Self::$name => tlv_tags!(@mask $($mask)?), )*
                    Self::Unknown(_) => false,
                }
            }
        }
    };
}

tlv_tags! {
    /// Unique card identifier
    CardId = 0x01 => HexString, masked;
    /// Card status
    Status = 0x02 => Status;
    /// Card public key
    CardPublicKey = 0x03 => ByteArray, masked;
    /// Card signature
    CardSignature = 0x04 => ByteArray, masked;
    /// Elliptic curve name
    CurveId = 0x05 => EllipticCurve;
    /// Allowed signing methods
    SigningMethod = 0x07 => SigningMethod;
    /// Maximum number of signatures per wallet
    MaxSignatures = 0x08 => Uint32;
    /// Security delay in tens of milliseconds
    PauseBeforePin2 = 0x09 => Uint16;
    /// Card or wallet settings
    SettingsMask = 0x0A => SettingsMask;
    /// Session unique identifier
    Uid = 0x0B => ByteArray;
    /// Nested card data
    CardData = 0x0C => Nested, masked;
    /// Card health
    Health = 0x0F => Uint16;

    /// Access code hash
    Pin = 0x10 => ByteArray, masked;
    /// Passcode hash
    Pin2 = 0x11 => ByteArray, masked;
    /// New access code hash
    NewPin = 0x12 => ByteArray, masked;
    /// New passcode hash
    NewPin2 = 0x13 => ByteArray, masked;
    /// Challenge sent to the card
    Challenge = 0x16 => ByteArray, masked;
    /// Card salt
    Salt = 0x17 => ByteArray, masked;
    /// Card verification code
    Cvc = 0x19 => ByteArray, masked;
    /// Terminal half of the session key agreement
    SessionKeyA = 0x1A => ByteArray, masked;
    /// Card half of the session key agreement
    SessionKeyB = 0x1B => ByteArray, masked;
    /// Remaining security delay
    Pause = 0x1C => ByteArray;

    /// Manufacturer name
    ManufacturerName = 0x20 => Utf8String;
    /// Read or file data mode
    InteractionMode = 0x23 => InteractionMode;
    /// Data offset
    Offset = 0x24 => Uint16;
    /// Data size
    Size = 0x25 => Uint16;
    /// File index
    FileIndex = 0x26 => Uint8;
    /// File settings
    FileSettings = 0x27 => ByteArray;
    /// User settings
    UserSettingsMask = 0x2F => SettingsMask;

    /// Issuer public key
    IssuerPublicKey = 0x30 => ByteArray, masked;
    /// Issuer or file data
    IssuerData = 0x32 => ByteArray, masked;
    /// Issuer data signature
    IssuerDataSignature = 0x33 => ByteArray, masked;
    /// Issuer data counter
    IssuerDataCounter = 0x35 => Uint32;

    /// Card requires activation
    IsActivated = 0x3A => Bool;
    /// Hash of the written data
    CodeHash = 0x42 => ByteArray;

    /// Hashes to sign
    TransactionOutHash = 0x50 => ByteArray, masked;
    /// Size of each hash to sign
    TransactionOutHashSize = 0x51 => ByteArray;
    /// Terminal signature of the hashes
    TerminalTransactionSignature = 0x57 => ByteArray, masked;
    /// Terminal is linked to the card
    TerminalIsLinked = 0x58 => Bool;
    /// Passcode is the default one
    Pin2IsDefault = 0x59 => Bool;
    /// Access code is the default one
    PinIsDefault = 0x5A => Bool;
    /// Terminal public key
    TerminalPublicKey = 0x5C => ByteArray, masked;

    /// Wallet public key
    WalletPublicKey = 0x60 => ByteArray, masked;
    /// Wallet signature
    WalletSignature = 0x61 => ByteArray, masked;
    /// Remaining signatures of the wallet
    WalletRemainingSignatures = 0x62 => Uint16;
    /// Number of hashes signed by the wallet
    WalletSignedHashes = 0x63 => Uint16;
    /// Wallet check counter
    CheckWalletCounter = 0x64 => Uint8;
    /// Wallet index
    WalletIndex = 0x65 => Uint8;
    /// Number of wallet slots
    WalletsCount = 0x66 => Uint8;
    /// Nested wallet record
    CardWallet = 0x68 => Nested, masked;
    /// Derivation path
    WalletHDPath = 0x6A => DerivationPath;
    /// Chain code
    WalletHDChain = 0x6B => ByteArray, masked;

    /// File name
    FileTypeName = 0x70 => Utf8String;
    /// File content
    FileData = 0x71 => ByteArray, masked;
    /// File signature
    FileSignature = 0x73 => ByteArray, masked;
    /// File counter
    FileCounter = 0x74 => Uint8;
    /// File owner index
    FileOwnerIndex = 0x75 => Uint8;

    /// Firmware version string
    Firmware = 0x80 => Utf8String;
    /// Batch identifier
    BatchId = 0x81 => HexString;
    /// Manufacture date
    ManufactureDateTime = 0x82 => DateTime;
    /// Issuer name
    IssuerName = 0x83 => Utf8String;
    /// Manufacturer public key
    ManufacturerPublicKey = 0x85 => ByteArray;
    /// Manufacturer signature of the card id
    CardIdManufacturerSignature = 0x86 => ByteArray, masked;
    /// Product mask
    ProductMask = 0x8A => ProductMask;
}

impl From<u8> for TlvTag {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl From<TlvTag> for u8 {
    fn from(tag: TlvTag) -> Self {
        tag.code()
    }
}

impl fmt::Display for TlvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code:#04x})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        assert_eq!(TlvTag::from(0x01), TlvTag::CardId);
        assert_eq!(TlvTag::from(0x6A), TlvTag::WalletHDPath);
        assert_eq!(TlvTag::from(0xEE), TlvTag::Unknown(0xEE));
        assert_eq!(u8::from(TlvTag::ProductMask), 0x8A);
        assert_eq!(TlvTag::Unknown(0xEE).code(), 0xEE);
    }

    #[test]
    fn test_value_types() {
        assert_eq!(TlvTag::CardId.value_type(), TlvValueType::HexString);
        assert_eq!(TlvTag::IsActivated.value_type(), TlvValueType::Bool);
        assert_eq!(TlvTag::CardData.value_type(), TlvValueType::Nested);
        assert_eq!(TlvTag::Unknown(0xEE).value_type(), TlvValueType::ByteArray);
    }

    #[test]
    fn test_masking() {
        assert!(TlvTag::Pin.should_mask());
        assert!(TlvTag::WalletSignature.should_mask());
        assert!(!TlvTag::Firmware.should_mask());
        assert_eq!(TlvTag::Unknown(0xEE).to_string(), "Unknown(0xee)");
        assert_eq!(TlvTag::Firmware.to_string(), "Firmware");
    }
}
