use std::collections::BTreeMap;

use serde::Serialize;

use super::{EllipticCurve, WalletSettingsCode, WalletSettingsMask, WalletStatus, hex_option};
use crate::{
    Error, Result,
    hdwallet::{DerivationPath, ExtendedPublicKey},
};

/// Wallet settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSettings {
    /// Purging the wallet is prohibited
    pub is_permanent: bool,
}

impl From<WalletSettingsMask> for WalletSettings {
    fn from(mask: WalletSettingsMask) -> Self {
        Self {
            is_permanent: mask.contains(WalletSettingsCode::IsPermanent),
        }
    }
}

/// A key slot on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardWallet {
    /// Slot index
    pub index: u8,
    /// Wallet public key
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
    /// BIP32 chain code, HD capable wallets only
    #[serde(with = "hex_option")]
    pub chain_code: Option<Vec<u8>>,
    /// Curve of the key
    pub curve: EllipticCurve,
    /// Wallet settings
    pub settings: WalletSettings,
    status: WalletStatus,
    /// Hashes signed since creation
    pub total_signed_hashes: Option<u32>,
    /// Signatures left, firmware before 4.0 only
    pub remaining_signatures: Option<u32>,
    /// Keys derived in this session
    pub derived_keys: BTreeMap<DerivationPath, ExtendedPublicKey>,
}

impl CardWallet {
    /// Create a loaded wallet
    pub fn new(index: u8, public_key: Vec<u8>, curve: EllipticCurve) -> Self {
        Self {
            index,
            public_key,
            chain_code: None,
            curve,
            settings: WalletSettings::default(),
            status: WalletStatus::Loaded,
            total_signed_hashes: None,
            remaining_signatures: None,
            derived_keys: BTreeMap::new(),
        }
    }

    /// Set the chain code
    pub fn with_chain_code(mut self, chain_code: Option<Vec<u8>>) -> Self {
        self.chain_code = chain_code;
        self
    }

    /// Set the settings
    pub const fn with_settings(mut self, settings: WalletSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current status
    pub const fn status(&self) -> WalletStatus {
        self.status
    }

    /// Move the wallet forward in its lifecycle
    ///
    /// A purged wallet never becomes loaded again, and a loaded one never becomes empty.
    pub fn set_status(&mut self, status: WalletStatus) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(Error::CardError);
        }
        self.status = status;
        Ok(())
    }

    /// Master extended key, when the wallet carries a chain code
    pub fn extended_public_key(&self) -> Option<ExtendedPublicKey> {
        let chain_code = self.chain_code.as_deref()?;
        ExtendedPublicKey::new(&self.public_key, chain_code).ok()
    }
}
