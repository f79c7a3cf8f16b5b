use async_trait::async_trait;
use tracing::{debug, info};

use super::{DeriveWalletPublicKeysTask, SuccessResponse};
use crate::operations::{CheckWallet, CreateWallet, CreateWalletResponse, PurgeWallet};
use crate::{
    CardSession, CardSessionRunnable, Command, EllipticCurve, Error, FirmwareVersion, Result,
};

/// Create a wallet, prove the card holds its private key, then derive the default paths
///
/// A failed check fails the task even though the card already committed the new wallet.
#[derive(Debug, Clone)]
pub struct CreateWalletTask {
    curve: EllipticCurve,
    is_permanent: bool,
}

impl CreateWalletTask {
    /// Create a wallet on `curve`
    pub const fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            is_permanent: false,
        }
    }

    /// Forbid purging the wallet
    pub const fn permanent(mut self, is_permanent: bool) -> Self {
        self.is_permanent = is_permanent;
        self
    }
}

#[async_trait]
impl CardSessionRunnable for CreateWalletTask {
    type Response = CreateWalletResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let mut response = CreateWallet::new(self.curve)
            .permanent(self.is_permanent)
            .transceive(session)
            .await?;
        let public_key = response.wallet.public_key.clone();
        CheckWallet::new(public_key.clone())
            .transceive(session)
            .await?;
        info!(index = response.wallet.index, curve = %self.curve, "Wallet created");

        let paths = {
            let env = session.environment();
            let hd_capable = env.card.as_ref().is_some_and(|card| {
                card.firmware_version >= FirmwareVersion::HD_WALLET_AVAILABLE
                    && card.settings.is_hd_wallet_allowed()
            });
            env.config
                .default_derivation_paths
                .get(&self.curve)
                .filter(|paths| hd_capable && !paths.is_empty())
                .cloned()
        };
        if let Some(paths) = paths {
            debug!(count = paths.len(), "Deriving default paths of the new wallet");
            response.wallet.derived_keys = DeriveWalletPublicKeysTask::new(public_key, paths)
                .run(session)
                .await?;
        }
        Ok(response)
    }
}

/// Purge every wallet on the card, last slot first
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeAllWalletsTask;

impl PurgeAllWalletsTask {
    /// Create the task
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CardSessionRunnable for PurgeAllWalletsTask {
    type Response = SuccessResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let snapshot: Vec<Vec<u8>> = {
            let card = session
                .environment()
                .card
                .as_ref()
                .ok_or(Error::MissingPreflightRead)?;
            card.wallets
                .iter()
                .map(|wallet| wallet.public_key.clone())
                .collect()
        };
        if snapshot.is_empty() {
            return Err(Error::WalletNotFound);
        }

        for public_key in snapshot.into_iter().rev() {
            PurgeWallet::new(public_key).transceive(session).await?;
        }
        Ok(SuccessResponse::for_session(session))
    }
}
