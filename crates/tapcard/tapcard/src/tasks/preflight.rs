use async_trait::async_trait;
use tracing::{debug, warn};

use crate::operations::{Read, ReadWallet, ReadWalletsList};
use crate::{
    Card, CardSession, CardSessionRunnable, Command, Error, FirmwareVersion, PreflightReadMode,
    Result,
};

/// Card snapshot taken before a runnable starts
///
/// Reads the card record, checks it is the card the session targets, then reads the wallets the
/// runnable asked for. Cards before 4.0 carry their single wallet in the card record.
#[derive(Debug, Clone)]
pub struct PreflightReadTask {
    mode: PreflightReadMode,
    card_id: Option<String>,
}

impl PreflightReadTask {
    /// Read according to `mode`, rejecting any card other than `card_id` when one is given
    pub const fn new(mode: PreflightReadMode, card_id: Option<String>) -> Self {
        Self { mode, card_id }
    }
}

#[async_trait]
impl CardSessionRunnable for PreflightReadTask {
    type Response = Card;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        debug!(mode = ?self.mode, "Preflight read");
        let card = Read::new().transceive(session).await?;

        if let Some(expected) = self.card_id.as_deref() {
            if !expected.eq_ignore_ascii_case(&card.card_id) {
                warn!(expected, actual = %card.card_id, "Wrong card presented");
                session.delegate().on_wrong_card().await;
                return Err(Error::WrongCardNumber(expected.to_string()));
            }
        }

        if card.firmware_version >= FirmwareVersion::MULTI_WALLET_AVAILABLE {
            match self.mode {
                PreflightReadMode::FullCardRead => {
                    ReadWalletsList::new().run(session).await?;
                }
                PreflightReadMode::ReadWallet(index) => {
                    ReadWallet::new(index).transceive(session).await?;
                }
                PreflightReadMode::ReadCardOnly | PreflightReadMode::None => {}
            }
        }

        session
            .environment()
            .card
            .clone()
            .ok_or(Error::MissingPreflightRead)
    }
}
