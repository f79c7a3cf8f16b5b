use async_trait::async_trait;
use serde::Serialize;

use crate::hdwallet::DerivationPath;
use crate::operations::Sign;
use crate::{CardSession, CardSessionRunnable, Error, Result};

/// Signature over a single hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHashResponse {
    /// Card that signed
    pub card_id: String,
    /// Signature
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
    /// Hashes signed by the wallet since its creation
    pub total_signed_hashes: Option<u32>,
}

/// Sign one hash
#[derive(Debug, Clone)]
pub struct SignHashTask {
    sign: Sign,
}

impl SignHashTask {
    /// Sign `hash` with the wallet identified by `wallet_public_key`
    pub fn new(hash: Vec<u8>, wallet_public_key: Vec<u8>) -> Self {
        Self {
            sign: Sign::new(vec![hash], wallet_public_key),
        }
    }

    /// Sign with the child key at `path`
    pub fn with_derivation_path(mut self, path: Option<DerivationPath>) -> Self {
        self.sign = self.sign.with_derivation_path(path);
        self
    }
}

#[async_trait]
impl CardSessionRunnable for SignHashTask {
    type Response = SignHashResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let response = self.sign.run(session).await?;
        let signature = response
            .signatures
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("no signature returned".to_string()))?;
        Ok(SignHashResponse {
            card_id: response.card_id,
            signature,
            total_signed_hashes: response.total_signed_hashes,
        })
    }
}
