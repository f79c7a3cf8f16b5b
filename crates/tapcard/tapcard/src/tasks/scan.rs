use async_trait::async_trait;
use tapcard_apdu_core::TagType;
use tracing::{debug, info};

use super::DeriveWalletPublicKeysTask;
use crate::card::CardDeserializer;
use crate::hdwallet::DerivationPath;
use crate::tlv::Tlv;
use crate::{Card, CardSession, CardSessionRunnable, Error, FirmwareVersion, Result};

/// Read the card and every wallet, deriving the configured default paths on HD cards
///
/// Legacy Slix tags skip the command pipeline: their static payload is read through the
/// transport and decoded directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanTask;

impl ScanTask {
    /// Create the task
    pub const fn new() -> Self {
        Self
    }

    async fn read_slix(session: &mut CardSession) -> Result<Card> {
        let response = session.read_slix_tag().await?;
        let tlvs = Tlv::deserialize_lenient(response.data());
        let card = CardDeserializer::deserialize_slix(tlvs)?;
        info!(card_id = %card.card_id, "Read legacy tag");
        session.environment_mut().card = Some(card.clone());
        Ok(card)
    }

    /// Wallets and paths to derive, empty when the card or the configuration has none
    fn default_derivations(session: &CardSession) -> Result<Vec<(Vec<u8>, Vec<DerivationPath>)>> {
        let env = session.environment();
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let paths = &env.config.default_derivation_paths;
        if card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE
            || !card.settings.is_hd_wallet_allowed()
            || paths.is_empty()
        {
            return Ok(Vec::new());
        }

        Ok(card
            .wallets
            .iter()
            .filter_map(|wallet| {
                let paths = paths.get(&wallet.curve).filter(|paths| !paths.is_empty())?;
                Some((wallet.public_key.clone(), paths.clone()))
            })
            .collect())
    }

    async fn derive_default_paths(session: &mut CardSession) -> Result<()> {
        let derivations = Self::default_derivations(session)?;
        for (public_key, paths) in derivations {
            debug!(count = paths.len(), "Deriving default paths");
            DeriveWalletPublicKeysTask::new(public_key, paths)
                .run(session)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CardSessionRunnable for ScanTask {
    type Response = Card;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        if session.tag_type() == TagType::Slix {
            return Self::read_slix(session).await;
        }

        Self::derive_default_paths(session).await?;
        session
            .environment()
            .card
            .clone()
            .ok_or(Error::MissingPreflightRead)
    }
}
