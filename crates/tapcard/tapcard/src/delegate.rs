//! UI delegate receiving session progress

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, UserCodeType};

/// Receives session progress and answers user code prompts
///
/// Every notification has an empty default so hosts only implement what they display.
#[async_trait]
pub trait SessionViewDelegate: Send + Sync + fmt::Debug {
    /// Session started, waiting for a tag
    async fn on_session_started(&self, _card_id: Option<&str>) {}

    /// Session finished, successfully or not
    async fn on_session_stopped(&self) {}

    /// A tag entered the field
    async fn on_tag_connected(&self) {}

    /// The tag left the field
    async fn on_tag_lost(&self) {}

    /// The presented card is not the one the session targets
    async fn on_wrong_card(&self) {}

    /// Security delay in progress
    async fn on_security_delay(&self, _remaining: Duration, _total: Duration) {}

    /// Progress of a long multi-exchange operation
    async fn on_delay(&self, _total: usize, _current: usize, _step: usize) {}

    /// The session failed
    async fn on_error(&self, _error: &Error) {}

    /// Ask the user for a code
    ///
    /// `is_first_attempt` is false after the card rejected a previous entry. Returning `None`
    /// cancels the session.
    async fn request_user_code(
        &self,
        kind: UserCodeType,
        is_first_attempt: bool,
        card_id: Option<&str>,
    ) -> Option<String>;

    /// Ask the user for a new code of `kind`
    ///
    /// Returning `None` cancels the session.
    async fn request_user_code_change(
        &self,
        _kind: UserCodeType,
        _card_id: Option<&str>,
    ) -> Option<String> {
        None
    }
}

/// Delegate for headless hosts: ignores progress and never supplies a code
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDelegate;

#[async_trait]
impl SessionViewDelegate for SilentDelegate {
    async fn request_user_code(
        &self,
        _kind: UserCodeType,
        _is_first_attempt: bool,
        _card_id: Option<&str>,
    ) -> Option<String> {
        None
    }
}
