//! Session configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tapcard_apdu_core::EncryptionMode;

use crate::card::EllipticCurve;
use crate::hdwallet::DerivationPath;

/// Configuration shared by every command of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Encryption mode tried first; the card may demand a stronger one
    pub default_encryption_mode: EncryptionMode,

    /// Run pre-checks and command specific error mapping
    pub handle_errors: bool,

    /// Paths derived automatically on scan and wallet creation for HD capable cards
    pub default_derivation_paths: BTreeMap<EllipticCurve, Vec<DerivationPath>>,

    /// Send a terminal key with sign commands so the card can skip the security delay
    pub linked_terminal: bool,

    /// Persist entered access codes per card in secure storage
    pub save_user_codes: bool,

    /// Wait between resends while the card reports a security delay
    pub need_pause_interval: Duration,

    /// Convert secp256k1 signatures to their low-S form
    pub canonize_secp256k1_signatures: bool,

    /// Whether the read-all files task also reads private files
    pub files_read_private: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_encryption_mode: EncryptionMode::None,
            handle_errors: true,
            default_derivation_paths: BTreeMap::new(),
            linked_terminal: false,
            save_user_codes: false,
            need_pause_interval: Duration::ZERO,
            canonize_secp256k1_signatures: true,
            files_read_private: false,
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial encryption mode
    pub const fn with_default_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.default_encryption_mode = mode;
        self
    }

    /// Set whether pre-checks and error mapping run
    pub const fn with_handle_errors(mut self, handle_errors: bool) -> Self {
        self.handle_errors = handle_errors;
        self
    }

    /// Add default derivation paths for a curve, ignoring repeated paths
    pub fn with_derivation_paths(
        mut self,
        curve: EllipticCurve,
        paths: impl IntoIterator<Item = DerivationPath>,
    ) -> Self {
        let entry = self.default_derivation_paths.entry(curve).or_default();
        for path in paths {
            if !entry.contains(&path) {
                entry.push(path);
            }
        }
        self
    }

    /// Set whether the linked terminal feature is used
    pub const fn with_linked_terminal(mut self, linked_terminal: bool) -> Self {
        self.linked_terminal = linked_terminal;
        self
    }

    /// Set whether access codes are saved
    pub const fn with_save_user_codes(mut self, save_user_codes: bool) -> Self {
        self.save_user_codes = save_user_codes;
        self
    }

    /// Set the wait between security delay resends
    pub const fn with_need_pause_interval(mut self, interval: Duration) -> Self {
        self.need_pause_interval = interval;
        self
    }

    /// Set whether secp256k1 signatures are canonized
    pub const fn with_canonize_secp256k1_signatures(mut self, canonize: bool) -> Self {
        self.canonize_secp256k1_signatures = canonize;
        self
    }

    /// Set whether the read-all files task reads private files
    pub const fn with_files_read_private(mut self, read_private: bool) -> Self {
        self.files_read_private = read_private;
        self
    }
}
