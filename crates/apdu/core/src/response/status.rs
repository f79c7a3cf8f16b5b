//! Status word definitions for card responses

use std::fmt;

use tracing::Level;

/// Status word (SW1-SW2) reported at the end of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusWord {
    /// Command processed (90 00)
    ProcessCompleted,
    /// Access code changed (90 01)
    Pin1Changed,
    /// Passcode changed (90 02)
    Pin2Changed,
    /// Access code and passcode changed (90 03)
    Pins12Changed,
    /// Third code changed (90 04)
    Pin3Changed,
    /// Access code and third code changed (90 05)
    Pins13Changed,
    /// Passcode and third code changed (90 06)
    Pins23Changed,
    /// All codes changed (90 07)
    Pins123Changed,
    /// Invalid parameters or codes (6A 86)
    InvalidParams,
    /// Card failed to process the command (62 86)
    ErrorProcessingCommand,
    /// Card is in a state that does not allow the command (69 85)
    InvalidState,
    /// Instruction is not supported (6D 00)
    InsNotSupported,
    /// Command must be sent encrypted (69 82)
    NeedEncryption,
    /// Security delay in progress, the same request must be resent (97 89)
    NeedPause,
    /// File not found (6A 82)
    FileNotFound,
    /// Wallet not found (6A 88)
    WalletNotFound,
    /// Wrong access code (6A F1)
    InvalidAccessCode,
    /// Wrong passcode (6A F2)
    InvalidPasscode,
    /// Any other status word
    Unknown(u16),
}

impl StatusWord {
    /// Create from the two status bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self::from_u16(((sw1 as u16) << 8) | sw2 as u16)
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(code: u16) -> Self {
        match code {
            0x9000 => Self::ProcessCompleted,
            0x9001 => Self::Pin1Changed,
            0x9002 => Self::Pin2Changed,
            0x9003 => Self::Pins12Changed,
            0x9004 => Self::Pin3Changed,
            0x9005 => Self::Pins13Changed,
            0x9006 => Self::Pins23Changed,
            0x9007 => Self::Pins123Changed,
            0x6A86 => Self::InvalidParams,
            0x6286 => Self::ErrorProcessingCommand,
            0x6985 => Self::InvalidState,
            0x6D00 => Self::InsNotSupported,
            0x6982 => Self::NeedEncryption,
            0x9789 => Self::NeedPause,
            0x6A82 => Self::FileNotFound,
            0x6A88 => Self::WalletNotFound,
            0x6AF1 => Self::InvalidAccessCode,
            0x6AF2 => Self::InvalidPasscode,
            other => Self::Unknown(other),
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn code(&self) -> u16 {
        match self {
            Self::ProcessCompleted => 0x9000,
            Self::Pin1Changed => 0x9001,
            Self::Pin2Changed => 0x9002,
            Self::Pins12Changed => 0x9003,
            Self::Pin3Changed => 0x9004,
            Self::Pins13Changed => 0x9005,
            Self::Pins23Changed => 0x9006,
            Self::Pins123Changed => 0x9007,
            Self::InvalidParams => 0x6A86,
            Self::ErrorProcessingCommand => 0x6286,
            Self::InvalidState => 0x6985,
            Self::InsNotSupported => 0x6D00,
            Self::NeedEncryption => 0x6982,
            Self::NeedPause => 0x9789,
            Self::FileNotFound => 0x6A82,
            Self::WalletNotFound => 0x6A88,
            Self::InvalidAccessCode => 0x6AF1,
            Self::InvalidPasscode => 0x6AF2,
            Self::Unknown(code) => *code,
        }
    }

    /// Check if this status word reports completion, including the code-changed variants
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::ProcessCompleted
                | Self::Pin1Changed
                | Self::Pin2Changed
                | Self::Pins12Changed
                | Self::Pin3Changed
                | Self::Pins13Changed
                | Self::Pins23Changed
                | Self::Pins123Changed
        )
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        match self {
            _ if self.is_success() => Level::DEBUG,
            Self::NeedPause | Self::NeedEncryption => Level::DEBUG,
            Self::FileNotFound => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ProcessCompleted => "Success",
            Self::Pin1Changed => "Access code changed",
            Self::Pin2Changed => "Passcode changed",
            Self::Pins12Changed => "Access code and passcode changed",
            Self::Pin3Changed => "Third code changed",
            Self::Pins13Changed => "Access code and third code changed",
            Self::Pins23Changed => "Passcode and third code changed",
            Self::Pins123Changed => "All codes changed",
            Self::InvalidParams => "Invalid parameters",
            Self::ErrorProcessingCommand => "Error processing command",
            Self::InvalidState => "Invalid state",
            Self::InsNotSupported => "Instruction not supported",
            Self::NeedEncryption => "Encryption required",
            Self::NeedPause => "Security delay in progress",
            Self::FileNotFound => "File not found",
            Self::WalletNotFound => "Wallet not found",
            Self::InvalidAccessCode => "Wrong access code",
            Self::InvalidPasscode => "Wrong passcode",
            Self::Unknown(_) => "Unknown status word",
        }
    }
}

impl From<u16> for StatusWord {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.code()
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X} ({})", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_round_trip() {
        for code in [
            0x9000, 0x9001, 0x9002, 0x9003, 0x9004, 0x9005, 0x9006, 0x9007, 0x6A86, 0x6286,
            0x6985, 0x6D00, 0x6982, 0x9789, 0x6A82, 0x6A88, 0x6AF1, 0x6AF2, 0x6F00,
        ] {
            assert_eq!(StatusWord::from(code).code(), code);
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(StatusWord::new(0x97, 0x89), StatusWord::NeedPause);
        assert_eq!(StatusWord::from((0x6A, 0x82)), StatusWord::FileNotFound);
        assert_eq!(StatusWord::from(0x1234), StatusWord::Unknown(0x1234));
    }

    #[test]
    fn test_success_variants() {
        assert!(StatusWord::ProcessCompleted.is_success());
        assert!(StatusWord::Pins123Changed.is_success());
        assert!(!StatusWord::NeedPause.is_success());
        assert!(!StatusWord::Unknown(0x9008).is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StatusWord::InvalidState.to_string(),
            "6985 (Invalid state)"
        );
    }
}
