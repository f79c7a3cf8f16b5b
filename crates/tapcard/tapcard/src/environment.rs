//! Mutable state of one card session

use tapcard_apdu_core::{EncryptionMode, SessionKey};

use crate::crypto::TerminalKeys;
use crate::{Card, Config, UserCode, UserCodeType};

/// State shared by the commands of one session
///
/// Owned by [`crate::CardSession`] and handed to commands by `&mut`. Commands only write to it
/// after the card reply has been fully deserialized.
#[derive(Debug, Clone)]
pub struct SessionEnvironment {
    /// Session configuration
    pub config: Config,
    /// Last known card snapshot
    pub card: Option<Card>,
    /// Access code sent with every command
    pub access_code: UserCode,
    /// Passcode sent with protected commands
    pub passcode: UserCode,
    /// Encryption mode of the current session key
    pub encryption_mode: EncryptionMode,
    /// Negotiated session key
    pub encryption_key: Option<SessionKey>,
    /// Linked terminal key pair
    pub terminal_keys: Option<TerminalKeys>,
}

impl SessionEnvironment {
    /// Fresh environment with factory codes
    pub fn new(config: Config) -> Self {
        Self {
            encryption_mode: config.default_encryption_mode,
            config,
            card: None,
            access_code: UserCode::default_for(UserCodeType::AccessCode),
            passcode: UserCode::default_for(UserCodeType::Passcode),
            encryption_key: None,
            terminal_keys: None,
        }
    }

    /// Current code of `kind`
    pub const fn user_code(&self, kind: UserCodeType) -> &UserCode {
        match kind {
            UserCodeType::AccessCode => &self.access_code,
            UserCodeType::Passcode => &self.passcode,
        }
    }

    /// Replace the code of the same kind
    pub fn set_user_code(&mut self, code: UserCode) {
        match code.kind() {
            UserCodeType::AccessCode => self.access_code = code,
            UserCodeType::Passcode => self.passcode = code,
        }
    }

    /// Whether the session holds a code of `kind` other than the factory one
    pub fn is_user_code_set(&self, kind: UserCodeType) -> bool {
        let code = self.user_code(kind);
        code.is_set() && !code.is_default()
    }

    /// Drop the session key so the next exchange opens a new one
    pub fn reset_encryption(&mut self) {
        self.encryption_key = None;
    }
}
