use async_trait::async_trait;
use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::{Instruction, ReadMode};
use crate::card::{CardDeserializer, WalletDeserializer};
use crate::hdwallet::DerivationPath;
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    Card, CardSession, CardSessionRunnable, CardWallet, Command, Error, FirmwareVersion,
    PreflightReadMode, Result, SessionEnvironment, UserCodeType,
};

/// Common head of every read request
fn read_request(env: &SessionEnvironment, mode: ReadMode) -> Result<TlvBuilder> {
    let mut tlv = TlvBuilder::new();
    tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
        .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
        .append(TlvTag::InteractionMode, &mode)?
        .append_optional(
            TlvTag::TerminalPublicKey,
            env.terminal_keys.as_ref().map(|keys| keys.public_key()).as_deref(),
        )?;
    Ok(tlv)
}

/// Read the card record
///
/// The first command of almost every session. A card protected by an access code answers
/// `InvalidParams` until the right code is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Read;

impl Read {
    /// Create the command
    pub const fn new() -> Self {
        Self
    }
}

impl Command for Read {
    type Response = Card;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        match error.kind() {
            Error::InvalidParams => error.with_kind(Error::AccessCodeRequired),
            _ => error,
        }
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let tlv = read_request(env, ReadMode::Card)?;
        Ok(CommandApdu::new(Instruction::Read, tlv.serialize()?))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu) -> Result<Card> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let mut card = CardDeserializer::deserialize(&decoder)?;
        if card.is_access_code_set.is_none() {
            card.is_access_code_set = Some(env.is_user_code_set(UserCodeType::AccessCode));
        }
        Ok(card)
    }

    fn update_environment(&self, env: &mut SessionEnvironment, card: &Card) -> Result<()> {
        env.card = Some(card.clone());
        Ok(())
    }
}

/// Wallets read from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWalletsListResponse {
    /// Card the wallets belong to
    pub card_id: String,
    /// Created wallets, sorted by index
    pub wallets: Vec<CardWallet>,
}

/// Read every wallet slot, in as many requests as the card needs
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWalletsList;

impl ReadWalletsList {
    /// Create the command
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CardSessionRunnable for ReadWalletsList {
    type Response = ReadWalletsListResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let mut wallets = Vec::new();
        let mut received = 0usize;
        let mut card_id = String::new();

        loop {
            let batch = WalletsBatch { offset: received }.transceive(session).await?;
            if received == 0 && batch.received == 0 {
                return Err(Error::CardWithMaxZeroWallets);
            }
            received += batch.received;
            wallets.extend(batch.wallets);
            card_id = batch.card_id;

            let max = session
                .environment()
                .card
                .as_ref()
                .map_or(0, |card| usize::from(card.settings.max_wallets_count));
            if received >= max || batch.received == 0 {
                break;
            }
            debug!(received, max, "Reading next wallets batch");
        }

        wallets.sort_by_key(|wallet| wallet.index);
        if let Some(card) = session.environment_mut().card.as_mut() {
            card.set_wallets(wallets.clone())?;
        }
        Ok(ReadWalletsListResponse { card_id, wallets })
    }
}

#[derive(Debug)]
struct WalletsBatch {
    offset: usize,
}

#[derive(Debug)]
struct WalletsBatchResponse {
    card_id: String,
    wallets: Vec<CardWallet>,
    received: usize,
}

impl Command for WalletsBatch {
    type Response = WalletsBatchResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = read_request(env, ReadMode::WalletsList)?;
        if self.offset > 0 {
            tlv.append(TlvTag::WalletIndex, &self.offset)?;
        }
        Ok(CommandApdu::new(Instruction::Read, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let (wallets, received) = WalletDeserializer::deserialize_wallets(&decoder)?;
        Ok(WalletsBatchResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            wallets,
            received,
        })
    }
}

/// A single wallet read from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWalletResponse {
    /// Card the wallet belongs to
    pub card_id: String,
    /// The wallet, or the derived child when a path was requested
    pub wallet: CardWallet,
}

/// Read one wallet slot, optionally the child key at a derivation path
#[derive(Debug, Clone)]
pub struct ReadWallet {
    index: u8,
    derivation_path: Option<DerivationPath>,
}

impl ReadWallet {
    /// Read the wallet in slot `index`
    pub const fn new(index: u8) -> Self {
        Self {
            index,
            derivation_path: None,
        }
    }

    /// Ask the card for the child key at `path` instead of the master key
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

impl Command for ReadWallet {
    type Response = ReadWalletResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if self.derivation_path.is_some()
            && (card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE
                || !card.settings.is_hd_wallet_allowed())
        {
            return Err(Error::HDWalletDisabled);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = read_request(env, ReadMode::Wallet)?;
        tlv.append(TlvTag::WalletIndex, &self.index)?
            .append_optional(TlvTag::WalletHDPath, self.derivation_path.as_ref())?;
        Ok(CommandApdu::new(Instruction::Read, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let card_id = decoder.decode(TlvTag::CardId)?;
        let record = decoder.nested(TlvTag::CardWallet)?.unwrap_or_else(|| decoder.clone());
        let wallet = WalletDeserializer::deserialize_wallet(&record)
            .ok()
            .flatten()
            .ok_or(Error::WalletNotFound)?;
        Ok(ReadWalletResponse { card_id, wallet })
    }

    fn update_environment(
        &self,
        env: &mut SessionEnvironment,
        response: &Self::Response,
    ) -> Result<()> {
        if self.derivation_path.is_none() {
            if let Some(card) = env.card.as_mut() {
                card.add_wallet(response.wallet.clone())?;
            }
        }
        Ok(())
    }
}
