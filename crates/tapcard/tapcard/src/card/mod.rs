//! Card snapshot and the types it is built from

mod curve;
mod deserializer;
mod masks;
mod status;
mod version;
mod wallet;

use serde::Serialize;
use tapcard_apdu_core::EncryptionMode;

pub use curve::EllipticCurve;
pub(crate) use deserializer::{CardDeserializer, WalletDeserializer};
#[cfg(test)]
pub(crate) use deserializer::tests::read_response;
pub use masks::{
    CardSettingsCode, CardSettingsMask, ProductCode, ProductMask, SigningMethod,
    SigningMethodCode, UserSettingsCode, UserSettingsMask, WalletSettingsCode, WalletSettingsMask,
};
pub use status::{CardStatus, WalletStatus};
pub use version::{FirmwareType, FirmwareVersion};
pub use wallet::{CardWallet, WalletSettings};

use crate::{
    Error, Result,
    tlv::{TlvDecode, TlvEncode, TlvTag, TlvValueType, ensure_decodable, ensure_encodable},
};

/// Hex (de)serialization of optional byte fields
pub(crate) mod hex_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Card state as of the last read in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique card id
    pub card_id: String,
    /// Manufacturing batch
    pub batch_id: String,
    /// Card attestation key
    #[serde(with = "hex")]
    pub card_public_key: Vec<u8>,
    /// Firmware version
    pub firmware_version: FirmwareVersion,
    /// Manufacturer details
    pub manufacturer: Manufacturer,
    /// Issuer details
    pub issuer: Issuer,
    /// Personalization settings
    pub settings: CardSettings,
    /// Settings the card holder can change
    pub user_settings: UserSettings,
    /// Whether this terminal is linked to the card
    pub linked_terminal_status: LinkedTerminalStatus,
    /// Passcode set, firmware 4.1 and above
    pub is_passcode_set: Option<bool>,
    /// Access code set, firmware 4.33 and above
    pub is_access_code_set: Option<bool>,
    /// Curves the card can create wallets on
    pub supported_curves: Vec<EllipticCurve>,
    /// Wallets, sorted by index
    pub wallets: Vec<CardWallet>,
    /// Product lines
    pub product_mask: Option<ProductMask>,
    /// Non-zero when the card reports hardware problems
    #[serde(skip)]
    pub(crate) health: Option<u16>,
    /// Signatures left on firmware before 4.0
    #[serde(skip)]
    pub(crate) remaining_signatures: Option<u32>,
    /// Wallets purged in this session
    #[serde(skip)]
    pub(crate) purged_wallets: Vec<CardWallet>,
}

impl Card {
    /// Wallet with the given public key
    pub fn wallet(&self, public_key: &[u8]) -> Option<&CardWallet> {
        self.wallets.iter().find(|w| w.public_key == public_key)
    }

    /// Wallet in the given slot
    pub fn wallet_by_index(&self, index: u8) -> Option<&CardWallet> {
        self.wallets.iter().find(|w| w.index == index)
    }

    /// Mutable wallet with the given public key
    pub fn wallet_mut(&mut self, public_key: &[u8]) -> Option<&mut CardWallet> {
        self.wallets.iter_mut().find(|w| w.public_key == public_key)
    }

    /// Replace the wallet list, sorting it by index
    ///
    /// Fails with [`Error::CardError`] when a known key would move back in its lifecycle.
    pub fn set_wallets(&mut self, mut wallets: Vec<CardWallet>) -> Result<()> {
        for wallet in &wallets {
            self.check_transition(wallet)?;
        }
        wallets.sort_by_key(|w| w.index);
        self.wallets = wallets;
        Ok(())
    }

    /// Insert a wallet, replacing one in the same slot
    ///
    /// Fails with [`Error::CardError`] when a known key would move back in its lifecycle.
    pub fn add_wallet(&mut self, wallet: CardWallet) -> Result<()> {
        self.check_transition(&wallet)?;
        self.wallets.retain(|w| w.index != wallet.index);
        self.wallets.push(wallet);
        self.wallets.sort_by_key(|w| w.index);
        Ok(())
    }

    /// Mark the wallet with the given public key purged and remove it from the slots
    pub fn remove_wallet(&mut self, public_key: &[u8]) -> Result<Option<CardWallet>> {
        let Some(position) = self.wallets.iter().position(|w| w.public_key == public_key) else {
            return Ok(None);
        };
        let mut wallet = self.wallets.remove(position);
        wallet.set_status(WalletStatus::Purged)?;
        self.purged_wallets.push(wallet.clone());
        Ok(Some(wallet))
    }

    /// Replace the wallet in the same slot; no-op when the slot is unknown
    pub fn update_wallet(&mut self, wallet: CardWallet) -> Result<()> {
        if self.wallet_by_index(wallet.index).is_none() {
            return Ok(());
        }
        self.add_wallet(wallet)
    }

    /// Run the status of the known wallet with the same key through its lifecycle
    fn check_transition(&self, wallet: &CardWallet) -> Result<()> {
        let known = self
            .wallets
            .iter()
            .chain(&self.purged_wallets)
            .find(|w| w.public_key == wallet.public_key);
        match known {
            Some(known) => known.clone().set_status(wallet.status()),
            None => Ok(()),
        }
    }

    /// Hardware health indicator
    pub const fn health(&self) -> Option<u16> {
        self.health
    }
}

/// Manufacturer details
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manufacturer {
    /// Manufacturer name
    pub name: String,
    /// Date of manufacture
    pub manufacture_date: Option<ManufactureDate>,
    /// Manufacturer signature of the card id
    #[serde(with = "hex_option")]
    pub signature: Option<Vec<u8>>,
}

/// Issuer details
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    /// Issuer name
    pub name: String,
    /// Key the issuer signs issuer data with
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
}

/// Calendar date written by the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, derive_more::Display)]
#[display("{year:04}-{month:02}-{day:02}")]
pub struct ManufactureDate {
    /// Year
    pub year: u16,
    /// Month, 1 based
    pub month: u8,
    /// Day of month
    pub day: u8,
}

impl TlvEncode for ManufactureDate {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::DateTime])?;
        let [hi, lo] = self.year.to_be_bytes();
        Ok(vec![hi, lo, self.month, self.day])
    }
}

impl TlvDecode for ManufactureDate {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::DateTime])?;
        match *value {
            [hi, lo, ref rest @ ..] if rest.len() <= 2 => Ok(Self {
                year: u16::from_be_bytes([hi, lo]),
                month: rest.first().copied().unwrap_or(1),
                day: rest.get(1).copied().unwrap_or(1),
            }),
            _ => Err(Error::DecodingFailed(format!(
                "{tag}: date of {} bytes",
                value.len()
            ))),
        }
    }
}

/// Link between this terminal and the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LinkedTerminalStatus {
    /// This terminal is linked
    Current,
    /// Another terminal is linked
    Other,
    /// No linked terminal
    #[default]
    None,
}

/// Personalization settings of the card
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSettings {
    /// Delay in milliseconds before commands touching keys or codes
    pub security_delay: u32,
    /// Number of wallet slots
    pub max_wallets_count: u8,
    /// Raw settings mask
    pub mask: CardSettingsMask,
    /// Signing methods set at personalization
    pub default_signing_methods: Option<SigningMethod>,
    /// Curve set at personalization
    pub default_curve: Option<EllipticCurve>,
}

impl CardSettings {
    /// Access code can be changed
    pub const fn is_setting_access_code_allowed(&self) -> bool {
        self.mask.contains(CardSettingsCode::AllowSetPin1)
    }

    /// Passcode can be changed
    pub const fn is_setting_passcode_allowed(&self) -> bool {
        self.mask.contains(CardSettingsCode::AllowSetPin2)
    }

    /// Access code can be reset to the default
    pub const fn is_removing_access_code_allowed(&self) -> bool {
        !self.mask.contains(CardSettingsCode::ProhibitDefaultPin1)
    }

    /// Linked terminal skips the security delay
    pub const fn is_linked_terminal_enabled(&self) -> bool {
        self.mask
            .contains(CardSettingsCode::SkipSecurityDelayIfValidatedByLinkedTerminal)
    }

    /// Wallets cannot be purged, firmware before 4.0
    pub const fn is_permanent_wallet(&self) -> bool {
        self.mask.contains(CardSettingsCode::PermanentWallet)
    }

    /// Issuer data writes carry a counter
    pub const fn is_issuer_data_protected_against_replay(&self) -> bool {
        self.mask
            .contains(CardSettingsCode::ProtectIssuerDataAgainstReplay)
    }

    /// Curve can be chosen when creating a wallet
    pub const fn is_select_blockchain_allowed(&self) -> bool {
        self.mask.contains(CardSettingsCode::AllowSelectBlockchain)
    }

    /// File commands are enabled
    pub const fn is_files_allowed(&self) -> bool {
        !self.mask.contains(CardSettingsCode::DisableFiles)
    }

    /// HD wallets are enabled
    ///
    /// Cards that allow choosing the curve also allow derivation.
    pub const fn is_hd_wallet_allowed(&self) -> bool {
        self.is_select_blockchain_allowed()
    }

    /// Encryption modes accepted by the card, strongest first
    pub fn supported_encryption_modes(&self) -> Vec<EncryptionMode> {
        let mut modes = vec![EncryptionMode::Strong];
        if self.mask.contains(CardSettingsCode::AllowFastEncryption) {
            modes.push(EncryptionMode::Fast);
        }
        if self.mask.contains(CardSettingsCode::AllowUnencrypted) {
            modes.push(EncryptionMode::None);
        }
        modes
    }
}

/// Settings the card holder can change, firmware 6.16 and above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Forgotten user codes can be reset with a backup card
    pub is_user_code_recovery_allowed: bool,
    /// Every command needs the access code, firmware 7 and above
    pub is_pin_required: bool,
    /// NDEF records are not served, firmware 7 and above
    pub is_ndef_disabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            is_user_code_recovery_allowed: true,
            is_pin_required: false,
            is_ndef_disabled: false,
        }
    }
}

impl UserSettings {
    /// Mask written to the card
    pub fn mask(&self) -> UserSettingsMask {
        let codes = [
            (!self.is_user_code_recovery_allowed, UserSettingsCode::IsUserCodeRecoveryForbidden),
            (self.is_pin_required, UserSettingsCode::IsPinRequired),
            (self.is_ndef_disabled, UserSettingsCode::IsNdefDisabled),
        ];
        let set: Vec<_> = codes.into_iter().filter(|(on, _)| *on).map(|(_, code)| code).collect();
        UserSettingsMask::new(&set)
    }
}

impl From<UserSettingsMask> for UserSettings {
    fn from(mask: UserSettingsMask) -> Self {
        Self {
            is_user_code_recovery_allowed: !mask
                .contains(UserSettingsCode::IsUserCodeRecoveryForbidden),
            is_pin_required: mask.contains(UserSettingsCode::IsPinRequired),
            is_ndef_disabled: mask.contains(UserSettingsCode::IsNdefDisabled),
        }
    }
}
