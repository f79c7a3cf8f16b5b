//! Mapping from card status words to domain outcomes

use tapcard_apdu_core::StatusWord;

use crate::Error;

/// Outcome of a single exchange as reported by the status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Command completed, the response can be deserialized
    Completed,
    /// Security delay in progress, the same request must be resent
    NeedPause,
    /// Terminal failure
    Failed(Error),
}

/// Map a status word to its outcome
///
/// Failures keep the raw status word, see [`Error::status_word`].
pub fn status_outcome(status: StatusWord) -> StatusOutcome {
    match failure(status) {
        Some(error) => StatusOutcome::Failed(Error::from_status(u16::from(status), error)),
        None if status == StatusWord::NeedPause => StatusOutcome::NeedPause,
        None => StatusOutcome::Completed,
    }
}

const fn failure(status: StatusWord) -> Option<Error> {
    let error = match status {
        StatusWord::ProcessCompleted
        | StatusWord::Pin1Changed
        | StatusWord::Pin2Changed
        | StatusWord::Pins12Changed
        | StatusWord::Pin3Changed
        | StatusWord::Pins13Changed
        | StatusWord::Pins23Changed
        | StatusWord::Pins123Changed
        | StatusWord::NeedPause => return None,
        StatusWord::InvalidParams => Error::InvalidParams,
        StatusWord::ErrorProcessingCommand => Error::ErrorProcessingCommand,
        StatusWord::InvalidState => Error::InvalidState,
        StatusWord::InsNotSupported => Error::InsNotSupported,
        StatusWord::NeedEncryption => Error::NeedEncryption,
        StatusWord::FileNotFound => Error::FileNotFound,
        StatusWord::WalletNotFound => Error::WalletNotFound,
        StatusWord::InvalidAccessCode => Error::WrongAccessCode,
        StatusWord::InvalidPasscode => Error::WrongPasscode,
        StatusWord::Unknown(sw) => Error::UnknownStatus(sw),
    };
    Some(error)
}
