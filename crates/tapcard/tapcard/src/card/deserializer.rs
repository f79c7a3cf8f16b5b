//! Building [`Card`] and [`CardWallet`] values from card responses

use super::{
    Card, CardSettings, CardSettingsMask, CardStatus, CardWallet, EllipticCurve, FirmwareVersion,
    Issuer, LinkedTerminalStatus, Manufacturer, UserSettings, UserSettingsMask, WalletSettings,
    WalletSettingsMask, WalletStatus,
};
use crate::{
    Error, Result,
    tlv::{Tlv, TlvDecoder, TlvTag},
};

/// Card snapshot from a `Read` response
pub(crate) struct CardDeserializer;

impl CardDeserializer {
    /// Build the card from the top level response and its nested `CardData`
    pub(crate) fn deserialize(decoder: &TlvDecoder) -> Result<Card> {
        let status: CardStatus = decoder.decode(TlvTag::Status)?;
        match status {
            CardStatus::NotPersonalized => return Err(Error::NotPersonalized),
            CardStatus::Purged => return Err(Error::WalletIsPurged),
            CardStatus::Empty | CardStatus::Loaded => {}
        }
        if decoder.decode::<bool>(TlvTag::IsActivated)? {
            return Err(Error::NotActivated);
        }

        let card_data = decoder
            .nested(TlvTag::CardData)?
            .ok_or(Error::DeserializeApduFailed)?;

        let firmware_version: FirmwareVersion =
            decoder.decode::<String>(TlvTag::Firmware)?.parse()?;
        let mask: CardSettingsMask = decoder.decode(TlvTag::SettingsMask)?;

        let is_passcode_set = (firmware_version >= FirmwareVersion::IS_PASSCODE_STATUS_AVAILABLE)
            .then(|| decoder.decode::<bool>(TlvTag::Pin2IsDefault).map(|default| !default))
            .transpose()?;
        let is_access_code_set = (firmware_version
            >= FirmwareVersion::IS_ACCESS_CODE_STATUS_AVAILABLE)
            .then(|| decoder.decode::<bool>(TlvTag::PinIsDefault).map(|default| !default))
            .transpose()?;

        let default_curve: Option<EllipticCurve> = decoder.decode_optional(TlvTag::CurveId)?;
        let supported_curves = if firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            default_curve.into_iter().collect()
        } else {
            EllipticCurve::ALL.to_vec()
        };

        let mut wallets = Vec::new();
        let mut remaining_signatures = None;
        if firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE && status == CardStatus::Loaded
        {
            remaining_signatures = decoder.decode_optional(TlvTag::WalletRemainingSignatures)?;
            let curve = default_curve.ok_or(Error::DecodingFailedMissingTag(TlvTag::CurveId))?;
            let mut wallet = CardWallet::new(0, decoder.decode(TlvTag::WalletPublicKey)?, curve)
                .with_settings(mask.to_wallet_settings_mask().into());
            wallet.total_signed_hashes = decoder.decode_optional(TlvTag::WalletSignedHashes)?;
            wallet.remaining_signatures = remaining_signatures;
            wallets.push(wallet);
        }

        let linked_terminal_status = if decoder.decode::<bool>(TlvTag::TerminalIsLinked)? {
            LinkedTerminalStatus::Current
        } else {
            LinkedTerminalStatus::None
        };

        let settings = CardSettings {
            security_delay: decoder
                .decode_optional::<u32>(TlvTag::PauseBeforePin2)?
                .map_or(0, |pause| pause * 10),
            max_wallets_count: decoder.decode_optional(TlvTag::WalletsCount)?.unwrap_or(1),
            mask,
            default_signing_methods: decoder.decode_optional(TlvTag::SigningMethod)?,
            default_curve,
        };

        Ok(Card {
            card_id: decoder.decode(TlvTag::CardId)?,
            batch_id: card_data.decode(TlvTag::BatchId)?,
            card_public_key: decoder.decode(TlvTag::CardPublicKey)?,
            firmware_version,
            manufacturer: Manufacturer {
                name: decoder.decode(TlvTag::ManufacturerName)?,
                manufacture_date: card_data.decode_optional(TlvTag::ManufactureDateTime)?,
                signature: card_data.decode_optional(TlvTag::CardIdManufacturerSignature)?,
            },
            issuer: Issuer {
                name: card_data.decode(TlvTag::IssuerName)?,
                public_key: decoder.decode(TlvTag::IssuerPublicKey)?,
            },
            settings,
            user_settings: decoder
                .decode_optional::<UserSettingsMask>(TlvTag::UserSettingsMask)?
                .map(UserSettings::from)
                .unwrap_or_default(),
            linked_terminal_status,
            is_passcode_set,
            is_access_code_set,
            supported_curves,
            wallets,
            product_mask: card_data.decode_optional(TlvTag::ProductMask)?,
            health: decoder.decode_optional(TlvTag::Health)?,
            remaining_signatures,
            purged_wallets: Vec::new(),
        })
    }

    /// Build a card from the payload of a legacy Slix tag
    ///
    /// These tags only carry `CardData` and the wallet key, so everything else keeps its
    /// default. The wallet curve falls back to the key length when `CurveId` is absent.
    pub(crate) fn deserialize_slix(tlvs: Vec<Tlv>) -> Result<Card> {
        let decoder = TlvDecoder::new(tlvs);
        let card_data = decoder.nested(TlvTag::CardData)?.unwrap_or_default();

        let default_curve: Option<EllipticCurve> = decoder.decode_optional(TlvTag::CurveId)?;
        let wallets = decoder
            .decode_optional::<Vec<u8>>(TlvTag::WalletPublicKey)?
            .map(|public_key| {
                let curve = default_curve.unwrap_or(if public_key.len() == 32 {
                    EllipticCurve::Ed25519
                } else {
                    EllipticCurve::Secp256k1
                });
                CardWallet::new(0, public_key, curve)
            })
            .into_iter()
            .collect();

        Ok(Card {
            card_id: decoder.decode_optional(TlvTag::CardId)?.unwrap_or_default(),
            batch_id: card_data.decode_optional(TlvTag::BatchId)?.unwrap_or_default(),
            card_public_key: decoder
                .decode_optional(TlvTag::CardPublicKey)?
                .unwrap_or_default(),
            firmware_version: FirmwareVersion::MIN,
            manufacturer: Manufacturer {
                name: decoder
                    .decode_optional(TlvTag::ManufacturerName)?
                    .unwrap_or_default(),
                manufacture_date: card_data.decode_optional(TlvTag::ManufactureDateTime)?,
                signature: card_data.decode_optional(TlvTag::CardIdManufacturerSignature)?,
            },
            issuer: Issuer {
                name: card_data.decode_optional(TlvTag::IssuerName)?.unwrap_or_default(),
                public_key: decoder
                    .decode_optional(TlvTag::IssuerPublicKey)?
                    .unwrap_or_default(),
            },
            settings: CardSettings {
                max_wallets_count: 1,
                default_curve,
                ..CardSettings::default()
            },
            user_settings: UserSettings::default(),
            linked_terminal_status: LinkedTerminalStatus::None,
            is_passcode_set: None,
            is_access_code_set: None,
            supported_curves: default_curve.into_iter().collect(),
            wallets,
            product_mask: card_data.decode_optional(TlvTag::ProductMask)?,
            health: None,
            remaining_signatures: None,
            purged_wallets: Vec::new(),
        })
    }
}

/// Wallet records (`CardWallet` nested tag) from `ReadWalletsList` and `ReadWallet`
pub(crate) struct WalletDeserializer;

impl WalletDeserializer {
    /// Decode one wallet record; empty and purged slots yield `None`
    pub(crate) fn deserialize_wallet(decoder: &TlvDecoder) -> Result<Option<CardWallet>> {
        let status: WalletStatus = decoder.decode(TlvTag::Status)?;
        if !status.is_available() {
            return Ok(None);
        }

        let settings: WalletSettingsMask = decoder.decode(TlvTag::SettingsMask)?;
        let mut wallet = CardWallet::new(
            decoder.decode(TlvTag::WalletIndex)?,
            decoder.decode(TlvTag::WalletPublicKey)?,
            decoder.decode(TlvTag::CurveId)?,
        )
        .with_settings(WalletSettings::from(settings))
        .with_chain_code(decoder.decode_optional(TlvTag::WalletHDChain)?);
        wallet.total_signed_hashes = decoder.decode_optional(TlvTag::WalletSignedHashes)?;
        wallet.remaining_signatures = decoder.decode_optional(TlvTag::WalletRemainingSignatures)?;

        Ok(Some(wallet))
    }

    /// Decode every wallet record in a response
    ///
    /// Returns the available wallets and the number of records received, empty slots
    /// included.
    pub(crate) fn deserialize_wallets(decoder: &TlvDecoder) -> Result<(Vec<CardWallet>, usize)> {
        let records: Vec<Vec<Tlv>> = decoder.decode_all(TlvTag::CardWallet)?;
        let received = records.len();

        let mut wallets = Vec::new();
        for record in records {
            if let Some(wallet) = Self::deserialize_wallet(&TlvDecoder::new(record))? {
                wallets.push(wallet);
            }
        }
        Ok((wallets, received))
    }
}
