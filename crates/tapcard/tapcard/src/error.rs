//! Domain error taxonomy
//!
//! Every error carries a stable numeric [`Error::code`]: 10xxx transport, 20xxx serialization
//! and decoding, 30xxx card status, 40xxx command preconditions, 42xxx files and HD wallets,
//! 50xxx SDK level failures.

use iso7816_tlv::TlvError;
use tapcard_apdu_core::TransportError;

use crate::tlv::TlvTag;

/// Result type for card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for card operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // Transport
    /// The tag left the field or the link timed out
    #[error("Tag lost")]
    TagLost,

    /// The reader cannot carry extended length APDUs
    #[error("Extended length APDUs are not supported by the reader")]
    ExtendedLengthNotSupported,

    /// The connected tag type does not support the requested operation
    #[error("Unsupported tag type")]
    UnsupportedTag,

    // Serialization
    /// Command could not be serialized
    #[error("Failed to serialize command: {0}")]
    SerializeCommandFailed(String),

    /// Response payload is missing or unreadable
    #[error("Failed to deserialize response APDU")]
    DeserializeApduFailed,

    /// Value could not be encoded for its tag
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Value type does not match the tag semantic type
    #[error("Encoding failed, type mismatch for tag {0}")]
    EncodingFailedTypeMismatch(TlvTag),

    /// Bytes could not be decoded
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    /// Mandatory tag is absent
    #[error("Decoding failed, missing tag {0}")]
    DecodingFailedMissingTag(TlvTag),

    /// Requested type does not match the tag semantic type
    #[error("Decoding failed, type mismatch for tag {0}")]
    DecodingFailedTypeMismatch(TlvTag),

    /// Encrypted response failed length or CRC validation
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // Card status
    /// Card failure together with the status word that reported it
    #[error("{source} (status {sw:04X})")]
    Status {
        /// Raw status word
        sw: u16,
        /// Domain error the status word maps to
        source: Box<Error>,
    },

    /// Status word not known to the SDK
    #[error("Unknown status word {0:04X}")]
    UnknownStatus(u16),

    /// Card failed to process the command
    #[error("Error processing command")]
    ErrorProcessingCommand,

    /// Card state does not allow the command
    #[error("Invalid state")]
    InvalidState,

    /// Instruction not supported by the card
    #[error("Instruction not supported")]
    InsNotSupported,

    /// Invalid parameters
    #[error("Invalid parameters")]
    InvalidParams,

    /// Card requires an encrypted exchange and every mode has been tried
    #[error("Encryption required")]
    NeedEncryption,

    /// File not found
    #[error("File not found")]
    FileNotFound,

    /// Wallet not found
    #[error("Wallet not found")]
    WalletNotFound,

    // Command preconditions
    /// Card has not been personalized
    #[error("Card is not personalized")]
    NotPersonalized,

    /// Card has not been activated
    #[error("Card is not activated")]
    NotActivated,

    /// Wallet has been purged
    #[error("Wallet is purged")]
    WalletIsPurged,

    /// Passcode required by the card
    #[error("Passcode required")]
    PasscodeRequired,

    /// Wallet key check did not produce a valid signature
    #[error("Wallet verification failed")]
    WalletVerificationFailed,

    /// Card key signature did not verify against the card public key
    #[error("Card verification failed")]
    CardVerificationFailed,

    /// Data does not fit the card limits
    #[error("Data size too large")]
    DataSizeTooLarge,

    /// Data cannot be written with the current card settings
    #[error("Data cannot be written")]
    DataCannotBeWritten,

    /// Wrong access code
    #[error("Wrong access code")]
    WrongAccessCode,

    /// Wrong passcode
    #[error("Wrong passcode")]
    WrongPasscode,

    /// Access code required by the card
    #[error("Access code required")]
    AccessCodeRequired,

    /// Public key derivation cannot cross a hardened node
    #[error("Hardened derivation is not supported for public keys")]
    HardenedDerivationNotSupported,

    /// Derivation path text or bytes are malformed
    #[error("Wrong derivation path: {0}")]
    WrongDerivationPath(String),

    /// Card does not allow wallet creation
    #[error("Wallet cannot be created")]
    WalletCannotBeCreated,

    /// Card reports no wallet slots
    #[error("Card has no wallet slots")]
    CardWithMaxZeroWallets,

    /// Wallet already created
    #[error("Wallet already created")]
    AlreadyCreated,

    /// Curve not supported by the card or the operation
    #[error("Unsupported elliptic curve")]
    UnsupportedCurve,

    /// Every wallet slot is occupied
    #[error("Maximum number of wallets created")]
    MaxNumberOfWalletsCreated,

    /// Wallet configuration does not match the card personalization
    #[error("Unsupported wallet configuration")]
    UnsupportedWalletConfig,

    /// Permanent wallets cannot be purged
    #[error("Purging this wallet is prohibited")]
    PurgeWalletProhibited,

    /// A new access code may not be the factory one
    #[error("Access code cannot be changed to the default")]
    AccessCodeCannotBeChanged,

    /// A new passcode may not be the factory one
    #[error("Passcode cannot be changed to the default")]
    PasscodeCannotBeChanged,

    /// Wallet has no remaining signatures
    #[error("No remaining signatures")]
    NoRemainingSignatures,

    /// Nothing to sign
    #[error("Hashes are empty")]
    EmptyHashes,

    /// Wallet is not created
    #[error("Wallet is not created")]
    WalletIsNotCreated,

    /// Card signing methods do not include hash signing
    #[error("Signing hashes is not available")]
    SignHashesNotAvailable,

    // Files and HD
    /// File settings not supported by the firmware
    #[error("File settings are not supported")]
    FileSettingsUnsupported,

    /// No files to process
    #[error("Files are empty")]
    FilesIsEmpty,

    /// Files are disabled by the card settings
    #[error("Files are disabled")]
    FilesDisabled,

    /// HD wallets are disabled by the card settings
    #[error("HD wallet is disabled")]
    HDWalletDisabled,

    // SDK
    /// Unexpected failure
    #[error("Unknown error")]
    UnknownError,

    /// Session cancelled by the user
    #[error("User cancelled")]
    UserCancelled,

    /// Another session is active
    #[error("Session is busy")]
    Busy,

    /// Command requires a card snapshot that was not read
    #[error("Missing preflight read")]
    MissingPreflightRead,

    /// Presented card is not the expected one
    #[error("Wrong card number, expected {0}")]
    WrongCardNumber(String),

    /// Card data is inconsistent
    #[error("Card error")]
    CardError,

    /// Firmware version does not support the command
    #[error("Firmware version is not supported")]
    NotSupportedFirmwareVersion,

    /// Cryptographic failure
    #[error("Crypto error: {0}")]
    CryptoUtilsError(String),
}

impl Error {
    /// Wrap `kind` with the status word the card answered with
    pub fn from_status(sw: u16, kind: Self) -> Self {
        match kind {
            Self::UnknownStatus(_) | Self::Status { .. } => kind,
            kind => Self::Status {
                sw,
                source: Box::new(kind),
            },
        }
    }

    /// The error without its status word
    pub fn kind(&self) -> &Self {
        match self {
            Self::Status { source, .. } => source.kind(),
            error => error,
        }
    }

    /// Raw status word of a failure reported by the card
    pub fn status_word(&self) -> Option<u16> {
        match self {
            Self::Status { sw, .. } | Self::UnknownStatus(sw) => Some(*sw),
            _ => None,
        }
    }

    /// Replace the error kind, keeping the status word if there is one
    pub fn with_kind(self, kind: Self) -> Self {
        match self.status_word() {
            Some(sw) => Self::from_status(sw, kind),
            None => kind,
        }
    }

    /// Stable numeric code of this error
    pub fn code(&self) -> u32 {
        match self {
            Self::Status { source, .. } => source.code(),

            Self::TagLost => 10001,
            Self::ExtendedLengthNotSupported => 10002,
            Self::UnsupportedTag => 10003,

            Self::SerializeCommandFailed(_) => 20001,
            Self::DeserializeApduFailed => 20002,
            Self::EncodingFailed(_) => 20003,
            Self::EncodingFailedTypeMismatch(_) => 20004,
            Self::DecodingFailed(_) => 20005,
            Self::DecodingFailedMissingTag(_) => 20006,
            Self::DecodingFailedTypeMismatch(_) => 20007,
            Self::InvalidResponse(_) => 20008,

            Self::UnknownStatus(_) => 30001,
            Self::ErrorProcessingCommand => 30002,
            Self::InvalidState => 30003,
            Self::InsNotSupported => 30004,
            Self::InvalidParams => 30005,
            Self::NeedEncryption => 30006,
            Self::FileNotFound => 30007,
            Self::WalletNotFound => 30008,

            Self::NotPersonalized => 40001,
            Self::NotActivated => 40002,
            Self::WalletIsPurged => 40003,
            Self::PasscodeRequired => 40004,
            Self::WalletVerificationFailed => 40005,
            Self::DataSizeTooLarge => 40006,
            Self::CardVerificationFailed => 40011,
            Self::DataCannotBeWritten => 40007,
            Self::WrongAccessCode => 40012,
            Self::WrongPasscode => 40013,
            Self::AccessCodeRequired => 40401,
            Self::HardenedDerivationNotSupported => 40402,
            Self::WalletCannotBeCreated => 40403,
            Self::CardWithMaxZeroWallets => 40404,
            Self::WrongDerivationPath(_) => 40405,
            Self::AlreadyCreated => 40501,
            Self::UnsupportedCurve => 40502,
            Self::MaxNumberOfWalletsCreated => 40503,
            Self::UnsupportedWalletConfig => 40504,
            Self::PurgeWalletProhibited => 40601,
            Self::AccessCodeCannotBeChanged => 40801,
            Self::PasscodeCannotBeChanged => 40802,
            Self::NoRemainingSignatures => 40901,
            Self::EmptyHashes => 40902,
            Self::WalletIsNotCreated => 40903,
            Self::SignHashesNotAvailable => 40904,

            Self::FileSettingsUnsupported => 42001,
            Self::FilesIsEmpty => 42002,
            Self::FilesDisabled => 42003,
            Self::HDWalletDisabled => 42004,

            Self::UnknownError => 50001,
            Self::UserCancelled => 50002,
            Self::Busy => 50003,
            Self::MissingPreflightRead => 50004,
            Self::WrongCardNumber(_) => 50005,
            Self::CardError => 50006,
            Self::NotSupportedFirmwareVersion => 50007,
            Self::CryptoUtilsError(_) => 50008,
        }
    }

    /// Whether the session ended because the user cancelled it
    pub const fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::TagLost | TransportError::NotConnected => Self::TagLost,
            TransportError::ExtendedLengthNotSupported => Self::ExtendedLengthNotSupported,
            TransportError::UnsupportedTag => Self::UnsupportedTag,
        }
    }
}

impl From<tapcard_apdu_core::Error> for Error {
    fn from(error: tapcard_apdu_core::Error) -> Self {
        use tapcard_apdu_core::Error as ApduError;

        match error {
            ApduError::Transport(e) => e.into(),
            ApduError::ResponseTooShort(len) => {
                Self::InvalidResponse(format!("response too short: {len} bytes"))
            }
            ApduError::PayloadTooLong(len) => {
                Self::SerializeCommandFailed(format!("payload too long: {len} bytes"))
            }
            ApduError::InvalidResponse(reason) => Self::InvalidResponse(reason.to_string()),
            ApduError::InvalidKeyLength(len) => {
                Self::CryptoUtilsError(format!("invalid key length: {len}"))
            }
        }
    }
}

impl From<TlvError> for Error {
    fn from(error: TlvError) -> Self {
        Self::DecodingFailed(error.to_string())
    }
}

impl From<k256::elliptic_curve::Error> for Error {
    fn from(_: k256::elliptic_curve::Error) -> Self {
        Self::CryptoUtilsError("elliptic curve operation failed".to_string())
    }
}
