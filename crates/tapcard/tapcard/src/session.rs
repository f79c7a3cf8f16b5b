//! Card session: owns the transport, the delegate and the session environment

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tapcard_apdu_core::{CardTransport, CommandApdu, EncryptionMode, ResponseApdu, TagType};
use tokio::sync::watch;
use tracing::{Level, debug, error, info, instrument, trace, warn};

use crate::crypto::{KeyAgreement, TerminalKeys, session_key};
use crate::operations::OpenSession;
use crate::status::{StatusOutcome, status_outcome};
use crate::tasks::PreflightReadTask;
use crate::{
    Command, Config, Error, InMemoryStorage, PreflightReadMode, Result, SecureStorage,
    SessionEnvironment, SessionViewDelegate, StorageKey, UserCode, UserCodeType,
};

/// Work that runs inside a card session: a single command or a multi-command task
#[async_trait]
pub trait CardSessionRunnable: Send {
    /// Value produced on success
    type Response: Send;

    /// Snapshot the session reads before calling [`CardSessionRunnable::run`]
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Run against an open session
    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response>;
}

/// Aborts the exchange a session is currently waiting on
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    /// Cancel the session; the pending exchange fails with [`Error::UserCancelled`]
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the session has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// One logical session with a card
///
/// Commands run strictly in sequence. A session only waits on transport exchanges and user
/// code prompts, and those are the points where it can be cancelled.
#[derive(Debug)]
pub struct CardSession {
    transport: Box<dyn CardTransport>,
    delegate: Arc<dyn SessionViewDelegate>,
    storage: Arc<dyn SecureStorage>,
    initial: SessionEnvironment,
    environment: SessionEnvironment,
    card_id: Option<String>,
    cancel: Arc<watch::Sender<bool>>,
    active: bool,
}

impl CardSession {
    /// Create a session over `transport`, reporting progress to `delegate`
    pub fn new(
        transport: Box<dyn CardTransport>,
        delegate: Arc<dyn SessionViewDelegate>,
        config: Config,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        let initial = SessionEnvironment::new(config);
        Self {
            transport,
            delegate,
            storage: Arc::new(InMemoryStorage::new()),
            environment: initial.clone(),
            initial,
            card_id: None,
            cancel: Arc::new(cancel),
            active: false,
        }
    }

    /// Use `storage` for saved access codes and terminal keys
    pub fn with_storage(mut self, storage: Arc<dyn SecureStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Only accept the card with this id
    pub fn with_card_id(mut self, card_id: impl Into<String>) -> Self {
        self.card_id = Some(card_id.into());
        self
    }

    /// Start with a known access code instead of the factory one
    pub fn with_access_code(mut self, access_code: &str) -> Self {
        self.initial
            .set_user_code(UserCode::new(UserCodeType::AccessCode, access_code));
        self.environment = self.initial.clone();
        self
    }

    /// Start with a known passcode instead of the factory one
    pub fn with_passcode(mut self, passcode: &str) -> Self {
        self.initial
            .set_user_code(UserCode::new(UserCodeType::Passcode, passcode));
        self.environment = self.initial.clone();
        self
    }

    /// Handle that cancels this session from another task
    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            sender: Arc::clone(&self.cancel),
        }
    }

    /// Session state
    ///
    /// Holds the state of the last run until the next one starts.
    pub const fn environment(&self) -> &SessionEnvironment {
        &self.environment
    }

    /// Mutable session state; replaced by the initial state when a run starts
    pub const fn environment_mut(&mut self) -> &mut SessionEnvironment {
        &mut self.environment
    }

    /// Card the session is restricted to, if any
    pub fn card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }

    /// Progress delegate
    pub fn delegate(&self) -> &dyn SessionViewDelegate {
        self.delegate.as_ref()
    }

    /// Family of the connected tag
    pub fn tag_type(&self) -> TagType {
        self.transport.tag_type()
    }

    /// Open the transport and restore saved secrets
    #[instrument(level = "trace", skip_all)]
    pub async fn start(&mut self) -> Result<()> {
        if self.active {
            return Err(Error::Busy);
        }
        debug!(card_id = ?self.card_id, "Starting card session");

        self.cancel.send_replace(false);
        self.environment = self.initial.clone();
        self.delegate.on_session_started(self.card_id.as_deref()).await;
        until_cancelled(self.cancel.subscribe(), self.transport.open()).await??;
        self.active = true;
        self.delegate.on_tag_connected().await;

        self.restore_terminal_keys()?;
        self.restore_user_code()?;
        Ok(())
    }

    /// Run `runnable` in a fresh session: start, preflight read, run, stop
    #[instrument(level = "trace", skip_all)]
    pub async fn run<R: CardSessionRunnable + ?Sized>(
        &mut self,
        runnable: &mut R,
    ) -> Result<R::Response> {
        let result = self.run_started(runnable).await;
        self.stop(result.as_ref().err()).await;
        result
    }

    async fn run_started<R: CardSessionRunnable + ?Sized>(
        &mut self,
        runnable: &mut R,
    ) -> Result<R::Response> {
        self.start().await?;

        let mode = runnable.preflight_read_mode();
        if mode != PreflightReadMode::None && self.tag_type() == TagType::Nfc {
            PreflightReadTask::new(mode, self.card_id.clone())
                .run(self)
                .await?;
        }
        runnable.run(self).await
    }

    /// Finish the session, saving the access code after a successful run
    async fn stop(&mut self, error: Option<&Error>) {
        match error {
            None => {
                if let Err(e) = self.save_user_code() {
                    warn!(error = %e, "Failed to save access code");
                }
            }
            Some(error) if error.is_user_cancelled() => info!("Session cancelled by the user"),
            Some(error) => {
                error!(code = error.code(), %error, "Session failed");
                self.delegate.on_error(error).await;
            }
        }

        let cancelled = error.is_some_and(Error::is_user_cancelled);
        self.transport.stop(cancelled).await;
        self.environment.reset_encryption();
        self.environment.terminal_keys = None;
        self.active = false;
        self.delegate.on_session_stopped().await;
        debug!("Card session stopped");
    }

    /// Encrypt, send and decrypt one request, opening the session key first if needed
    pub(crate) async fn send_apdu(&mut self, apdu: &CommandApdu) -> Result<ResponseApdu> {
        self.establish_encryption().await?;

        let key = self.environment.encryption_key.as_ref();
        let encrypted = apdu.encrypt(self.environment.encryption_mode, key)?;
        let response = self.transceive(&encrypted).await?;
        Ok(response.decrypt(self.environment.encryption_key.as_ref())?)
    }

    /// Raw exchange with the transport, abandoned when the session is cancelled
    #[instrument(level = "trace", skip_all, fields(ins = apdu.instruction()))]
    async fn transceive(&mut self, apdu: &CommandApdu) -> Result<ResponseApdu> {
        let result = until_cancelled(self.cancel.subscribe(), self.transport.transceive(apdu)).await?;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = Error::from(e);
                if error == Error::TagLost {
                    self.environment.reset_encryption();
                    self.delegate.on_tag_lost().await;
                }
                return Err(error);
            }
        };

        let status = response.status_word();
        let level = status.tracing_level();
        if level == Level::WARN {
            warn!(%status, "Card replied");
        } else if level == Level::INFO {
            info!(%status, "Card replied");
        } else {
            debug!(%status, "Card replied");
        }
        Ok(response)
    }

    /// Static payload of a legacy tag, abandoned when the session is cancelled
    pub(crate) async fn read_slix_tag(&mut self) -> Result<ResponseApdu> {
        let response =
            until_cancelled(self.cancel.subscribe(), self.transport.read_slix_tag()).await??;
        trace!(len = response.data().len(), "Legacy tag payload read");
        Ok(response)
    }

    /// Agree on a session key with the card when the mode asks for one and none is set
    async fn establish_encryption(&mut self) -> Result<()> {
        let mode = self.environment.encryption_mode;
        if mode == EncryptionMode::None || self.environment.encryption_key.is_some() {
            return Ok(());
        }
        debug!(%mode, "Opening encrypted session");

        let agreement = KeyAgreement::new(mode)
            .ok_or_else(|| Error::CryptoUtilsError("Failed to establish encryption".into()))?;
        let command = OpenSession::new(mode, agreement.key_a().to_vec());
        let apdu = command.serialize(&self.environment)?;
        let response = self.transceive(&apdu).await?;
        if let StatusOutcome::Failed(error) = status_outcome(response.status_word()) {
            return Err(error);
        }

        let reply = command.deserialize(&self.environment, &response)?;
        let access_code = self
            .environment
            .access_code
            .value()
            .ok_or_else(|| Error::CryptoUtilsError("Failed to establish encryption".into()))?;
        let secret = agreement.shared_secret(&reply.session_key_b)?;
        self.environment.encryption_key = Some(session_key(&secret, access_code, &reply.uid));
        trace!("Session key established");
        Ok(())
    }

    /// Ask the delegate for a code of `kind` and store its hash in the environment
    pub(crate) async fn request_user_code(&mut self, kind: UserCodeType) -> Result<()> {
        let is_first_attempt = !self.environment.is_user_code_set(kind);
        let delegate = Arc::clone(&self.delegate);
        let card_id = self.prompt_card_id();
        let entry = delegate.request_user_code(kind, is_first_attempt, card_id.as_deref());

        // The current code stays in place until a new one is entered
        let code = self.prompt(entry).await?;
        self.environment.set_user_code(UserCode::new(kind, &code));
        if kind == UserCodeType::AccessCode {
            // The session key is bound to the access code
            self.environment.reset_encryption();
        }
        Ok(())
    }

    /// Ask the delegate for a new code of `kind`, leaving the environment untouched
    pub(crate) async fn request_new_user_code(&mut self, kind: UserCodeType) -> Result<UserCode> {
        let delegate = Arc::clone(&self.delegate);
        let card_id = self.prompt_card_id();
        let entry = delegate.request_user_code_change(kind, card_id.as_deref());
        let code = self.prompt(entry).await?;
        Ok(UserCode::new(kind, &code))
    }

    fn prompt_card_id(&self) -> Option<String> {
        self.environment
            .card
            .as_ref()
            .map(|card| card.card_id.clone())
            .or_else(|| self.card_id.clone())
    }

    /// Wait for a user entry with the transport paused; an empty entry cancels
    async fn prompt(&mut self, entry: impl Future<Output = Option<String>> + Send) -> Result<String> {
        self.transport.pause().await;
        let entered = until_cancelled(self.cancel.subscribe(), entry).await;
        self.transport.resume().await;
        entered?
            .filter(|code| !code.is_empty())
            .ok_or(Error::UserCancelled)
    }

    fn restore_terminal_keys(&mut self) -> Result<()> {
        if !self.environment.config.linked_terminal {
            return Ok(());
        }
        let keys = match self.storage.get(&StorageKey::TerminalPrivateKey)? {
            Some(bytes) => TerminalKeys::from_bytes(&bytes)?,
            None => {
                let keys = TerminalKeys::generate();
                self.storage
                    .store(&keys.to_bytes(), &StorageKey::TerminalPrivateKey)?;
                keys
            }
        };
        self.environment.terminal_keys = Some(keys);
        Ok(())
    }

    fn restore_user_code(&mut self) -> Result<()> {
        if !self.environment.config.save_user_codes {
            return Ok(());
        }
        let Some(card_id) = self.card_id.clone() else {
            return Ok(());
        };
        if let Some(saved) = self.storage.get(&StorageKey::UserCode(card_id))? {
            if let Ok(hash) = <[u8; 32]>::try_from(saved.as_slice()) {
                debug!("Restored saved access code");
                self.environment
                    .set_user_code(UserCode::from_hash(UserCodeType::AccessCode, hash));
            }
        }
        Ok(())
    }

    /// Persist the access code of the current card
    ///
    /// A factory code removes any saved code; an unchanged code is not written again.
    fn save_user_code(&self) -> Result<()> {
        if !self.environment.config.save_user_codes {
            return Ok(());
        }
        let (Some(card), Some(value)) = (
            self.environment.card.as_ref(),
            self.environment.access_code.value(),
        ) else {
            return Ok(());
        };

        let key = StorageKey::UserCode(card.card_id.clone());
        let saved = self.storage.get(&key)?;
        if saved.as_deref() == Some(value.as_slice()) {
            return Ok(());
        }

        let mut cards = self.cards_with_saved_code()?;
        if self.environment.access_code.is_default() {
            if saved.is_none() {
                return Ok(());
            }
            self.storage.delete(&key)?;
            cards.retain(|id| id != &card.card_id);
        } else {
            self.storage.store(value, &key)?;
            if !cards.contains(&card.card_id) {
                cards.push(card.card_id.clone());
            }
        }

        let encoded = serde_json::to_vec(&cards)
            .map_err(|e| Error::EncodingFailed(e.to_string()))?;
        self.storage
            .store(&encoded, &StorageKey::CardsWithSavedUserCode)
    }

    fn cards_with_saved_code(&self) -> Result<Vec<String>> {
        match self.storage.get(&StorageKey::CardsWithSavedUserCode)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::DecodingFailed(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Resolve `future` unless the session is cancelled first
async fn until_cancelled<F: Future>(
    mut cancelled: watch::Receiver<bool>,
    future: F,
) -> Result<F::Output> {
    if *cancelled.borrow_and_update() {
        return Err(Error::UserCancelled);
    }
    tokio::select! {
        biased;
        _ = cancelled.wait_for(|cancelled| *cancelled) => Err(Error::UserCancelled),
        output = future => Ok(output),
    }
}
