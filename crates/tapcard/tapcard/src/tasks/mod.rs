//! Tasks: runnables built from several commands
//!
//! A task runs its commands one after another on the same session and stops at the first
//! failure. The only failures a task swallows are the `FileNotFound` replies that end the
//! read-all and delete-all file loops.

mod derive;
mod files;
mod preflight;
mod scan;
mod sign;
mod user;
mod wallet;

pub use derive::{DeriveWalletPublicKeyTask, DeriveWalletPublicKeysTask};
pub use files::{
    ChangeFilesSettingsTask, DeleteFilesTask, ReadFilesTask, WriteFilesResponse, WriteFilesTask,
};
pub use preflight::PreflightReadTask;
pub use scan::ScanTask;
pub use sign::{SignHashResponse, SignHashTask};
pub use user::{CheckUserCodesResponse, CheckUserCodesTask, SetUserSettingsTask};
pub use wallet::{CreateWalletTask, PurgeAllWalletsTask};

use serde::Serialize;

/// Reply of tasks that only report which card they ran on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    /// Card the task ran on
    pub card_id: String,
}

impl SuccessResponse {
    pub(crate) fn for_session(session: &crate::CardSession) -> Self {
        Self {
            card_id: session
                .environment()
                .card
                .as_ref()
                .map(|card| card.card_id.clone())
                .unwrap_or_default(),
        }
    }
}
