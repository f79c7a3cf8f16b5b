//! Common test utilities: a scripted transport, a recording delegate and card reply builders

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tapcard::apdu::{Bytes, CardTransport, CommandApdu, ResponseApdu, TagType, TransportError};
use tapcard::card::{
    CardSettingsCode, CardSettingsMask, CardStatus, SigningMethod, SigningMethodCode,
    UserSettingsMask, WalletSettingsCode, WalletSettingsMask, WalletStatus,
};
use tapcard::tlv::{Tlv, TlvBuilder, TlvTag};
use tapcard::{CardSession, Config, EllipticCurve, Error, SessionViewDelegate, UserCodeType};
use tracing_subscriber::EnvFilter;

/// Card id used by every reply builder
pub const CARD_ID: &str = "AB01000000045060";

/// Install a subscriber honouring `RUST_LOG`; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Responder = Box<dyn FnOnce(&CommandApdu) -> ResponseApdu + Send>;

enum Reply {
    Fixed(ResponseApdu),
    Failure(TransportError),
    Dynamic(Responder),
    Hang,
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<Reply>,
    sent: Vec<CommandApdu>,
    tag_type: TagType,
    slix_payload: Option<Bytes>,
    stopped: Option<bool>,
    paused: bool,
    pauses: usize,
}

/// Transport answering from a queue of scripted replies
///
/// Clones share the same script, so a test keeps one clone to inspect the requests after the
/// session took ownership of the other. An exhausted script reports a lost tag.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("pending", &state.replies.len())
            .field("sent", &state.sent.len())
            .finish()
    }
}

impl MockTransport {
    /// Empty script on an NFC tag
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy Slix tag returning `payload` from its static read
    pub fn slix(payload: impl Into<Bytes>) -> Self {
        let transport = Self::default();
        {
            let mut state = transport.state.lock();
            state.tag_type = TagType::Slix;
            state.slix_payload = Some(payload.into());
        }
        transport
    }

    /// Queue a completed reply carrying `data`
    pub fn ok(&self, data: impl Into<Bytes>) -> &Self {
        self.push(Reply::Fixed(ResponseApdu::new(data, 0x9000)))
    }

    /// Queue a reply with no data and status `sw`
    pub fn status(&self, sw: u16) -> &Self {
        self.push(Reply::Fixed(ResponseApdu::new(Bytes::new(), sw)))
    }

    /// Queue a raw reply
    pub fn reply(&self, response: ResponseApdu) -> &Self {
        self.push(Reply::Fixed(response))
    }

    /// Queue a reply computed from the request it answers
    pub fn respond_with(
        &self,
        responder: impl FnOnce(&CommandApdu) -> ResponseApdu + Send + 'static,
    ) -> &Self {
        self.push(Reply::Dynamic(Box::new(responder)))
    }

    /// Queue a transport failure
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(Reply::Failure(error))
    }

    /// Queue an exchange that never completes
    pub fn hang(&self) -> &Self {
        self.push(Reply::Hang)
    }

    fn push(&self, reply: Reply) -> &Self {
        self.state.lock().replies.push_back(reply);
        self
    }

    /// Requests received so far
    pub fn sent(&self) -> Vec<CommandApdu> {
        self.state.lock().sent.clone()
    }

    /// Instruction bytes of the requests received so far
    pub fn instructions(&self) -> Vec<u8> {
        self.sent().iter().map(CommandApdu::instruction).collect()
    }

    /// Replies not consumed yet
    pub fn pending(&self) -> usize {
        self.state.lock().replies.len()
    }

    /// `Some(cancelled)` once the session stopped the transport
    pub fn stopped(&self) -> Option<bool> {
        self.state.lock().stopped
    }

    /// Whether the session paused the transport and has not resumed it
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Number of times the session paused the transport
    pub fn pauses(&self) -> usize {
        self.state.lock().pauses
    }

    /// Boxed clone to hand to a session
    pub fn boxed(&self) -> Box<dyn CardTransport> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl CardTransport for MockTransport {
    async fn do_transmit_raw(&mut self, _command: &[u8]) -> Result<Bytes, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn transceive(&mut self, command: &CommandApdu) -> tapcard::apdu::Result<ResponseApdu> {
        let reply = {
            let mut state = self.state.lock();
            state.sent.push(command.clone());
            state.replies.pop_front()
        };
        match reply {
            Some(Reply::Fixed(response)) => Ok(response),
            Some(Reply::Dynamic(responder)) => Ok(responder(command)),
            Some(Reply::Failure(error)) => Err(error.into()),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(TransportError::TagLost.into()),
        }
    }

    async fn pause(&mut self) {
        let mut state = self.state.lock();
        state.paused = true;
        state.pauses += 1;
    }

    async fn resume(&mut self) {
        self.state.lock().paused = false;
    }

    async fn stop(&mut self, cancel: bool) {
        self.state.lock().stopped = Some(cancel);
    }

    fn tag_type(&self) -> TagType {
        self.state.lock().tag_type
    }

    async fn read_slix_tag(&mut self) -> tapcard::apdu::Result<ResponseApdu> {
        let payload = self.state.lock().slix_payload.clone();
        payload
            .map(|payload| ResponseApdu::new(payload, 0x9000))
            .ok_or_else(|| TransportError::UnsupportedTag.into())
    }
}

/// Delegate recording every callback and answering code prompts from a script
#[derive(Debug, Default)]
pub struct MockDelegate {
    events: Mutex<Vec<String>>,
    codes: Mutex<VecDeque<Option<String>>>,
}

impl MockDelegate {
    /// Delegate that cancels every prompt
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delegate answering prompts with `codes` in order, then cancelling
    pub fn with_codes(codes: &[Option<&str>]) -> Arc<Self> {
        let delegate = Self::default();
        delegate
            .codes
            .lock()
            .extend(codes.iter().map(|code| code.map(str::to_string)));
        Arc::new(delegate)
    }

    /// Callbacks received so far
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Number of callbacks starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

#[async_trait]
impl SessionViewDelegate for MockDelegate {
    async fn on_session_started(&self, _card_id: Option<&str>) {
        self.record("session_started");
    }

    async fn on_session_stopped(&self) {
        self.record("session_stopped");
    }

    async fn on_tag_connected(&self) {
        self.record("tag_connected");
    }

    async fn on_tag_lost(&self) {
        self.record("tag_lost");
    }

    async fn on_wrong_card(&self) {
        self.record("wrong_card");
    }

    async fn on_security_delay(&self, remaining: Duration, _total: Duration) {
        self.record(format!("security_delay {}", remaining.as_millis()));
    }

    async fn on_delay(&self, total: usize, current: usize, _step: usize) {
        self.record(format!("delay {current}/{total}"));
    }

    async fn on_error(&self, error: &Error) {
        self.record(format!("error {}", error.code()));
    }

    async fn request_user_code(
        &self,
        kind: UserCodeType,
        is_first_attempt: bool,
        _card_id: Option<&str>,
    ) -> Option<String> {
        self.record(format!("request_user_code {kind:?} {is_first_attempt}"));
        self.codes.lock().pop_front().flatten()
    }

    async fn request_user_code_change(
        &self,
        kind: UserCodeType,
        _card_id: Option<&str>,
    ) -> Option<String> {
        self.record(format!("request_user_code_change {kind:?}"));
        self.codes.lock().pop_front().flatten()
    }
}

/// Session over `transport` reporting to `delegate`
pub fn session(transport: &MockTransport, delegate: &Arc<MockDelegate>, config: Config) -> CardSession {
    init_tracing();
    CardSession::new(transport.boxed(), delegate.clone(), config)
}

/// `Read` reply builder
#[derive(Debug, Clone)]
pub struct CardReply {
    card_id: String,
    firmware: String,
    settings: Vec<CardSettingsCode>,
    wallets_count: u8,
    passcode_default: bool,
    legacy_wallet: Option<Vec<u8>>,
    user_settings: Option<UserSettingsMask>,
}

impl Default for CardReply {
    fn default() -> Self {
        Self {
            card_id: CARD_ID.to_string(),
            firmware: "4.52r".to_string(),
            settings: vec![
                CardSettingsCode::IsReusable,
                CardSettingsCode::AllowSelectBlockchain,
                CardSettingsCode::AllowSetPin1,
                CardSettingsCode::AllowSetPin2,
            ],
            wallets_count: 3,
            passcode_default: false,
            legacy_wallet: None,
            user_settings: None,
        }
    }
}

impl CardReply {
    /// Multi-wallet card with firmware 4.52
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply for another card
    pub fn card_id(mut self, card_id: &str) -> Self {
        self.card_id = card_id.to_string();
        self
    }

    /// Firmware string, e.g. `"3.34r"`
    pub fn firmware(mut self, firmware: &str) -> Self {
        self.firmware = firmware.to_string();
        self
    }

    /// Add a settings flag
    pub fn setting(mut self, code: CardSettingsCode) -> Self {
        self.settings.push(code);
        self
    }

    /// Number of wallet slots
    pub const fn wallets_count(mut self, count: u8) -> Self {
        self.wallets_count = count;
        self
    }

    /// Card still on its factory passcode
    pub const fn passcode_default(mut self) -> Self {
        self.passcode_default = true;
        self
    }

    /// User settings mask, firmware 6.16 and above
    pub const fn user_settings(mut self, mask: UserSettingsMask) -> Self {
        self.user_settings = Some(mask);
        self
    }

    /// Single wallet carried in the card record, firmware before 4.0
    pub fn legacy_wallet(mut self, public_key: Vec<u8>) -> Self {
        self.legacy_wallet = Some(public_key);
        self
    }

    /// Serialized reply
    pub fn build(&self) -> Bytes {
        let mut card_data = TlvBuilder::new();
        card_data
            .append(TlvTag::BatchId, "AB01")
            .unwrap()
            .append(TlvTag::IssuerName, "TAPCARD TEST")
            .unwrap();

        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, self.card_id.as_str())
            .unwrap()
            .append(TlvTag::ManufacturerName, "TAPCARD")
            .unwrap()
            .append(TlvTag::Status, &CardStatus::Loaded)
            .unwrap()
            .append(TlvTag::Firmware, self.firmware.as_str())
            .unwrap()
            .append(TlvTag::CardPublicKey, &vec![0x04; 65])
            .unwrap()
            .append(TlvTag::SettingsMask, &CardSettingsMask::new(&self.settings))
            .unwrap()
            .append(TlvTag::IssuerPublicKey, &vec![0x05; 65])
            .unwrap()
            .append(TlvTag::CurveId, &EllipticCurve::Secp256k1)
            .unwrap()
            .append(TlvTag::SigningMethod, &SigningMethod::new(&[SigningMethodCode::SignHash]))
            .unwrap()
            .append(TlvTag::WalletsCount, &self.wallets_count)
            .unwrap()
            .append(TlvTag::CardData, card_data.tlvs())
            .unwrap();
        if self.passcode_default {
            tlv.append(TlvTag::Pin2IsDefault, &true).unwrap();
        }
        if let Some(mask) = &self.user_settings {
            tlv.append(TlvTag::UserSettingsMask, mask).unwrap();
        }
        if let Some(public_key) = &self.legacy_wallet {
            tlv.append(TlvTag::WalletPublicKey, public_key)
                .unwrap()
                .append(TlvTag::WalletRemainingSignatures, &100u32)
                .unwrap()
                .append(TlvTag::WalletSignedHashes, &5u32)
                .unwrap();
        }
        tlv.serialize().unwrap()
    }
}

/// One wallet record of a wallets list reply
#[derive(Debug, Clone)]
pub struct WalletRecord {
    /// Slot
    pub index: u8,
    /// Public key, `None` for an empty slot
    pub public_key: Option<Vec<u8>>,
    /// Curve
    pub curve: EllipticCurve,
    /// Permanent wallet
    pub permanent: bool,
    /// Chain code of HD wallets
    pub chain_code: Option<Vec<u8>>,
}

impl WalletRecord {
    /// Loaded secp256k1 wallet
    pub const fn loaded(index: u8, public_key: Vec<u8>) -> Self {
        Self {
            index,
            public_key: Some(public_key),
            curve: EllipticCurve::Secp256k1,
            permanent: false,
            chain_code: None,
        }
    }

    /// Empty slot
    pub const fn empty(index: u8) -> Self {
        Self {
            index,
            public_key: None,
            curve: EllipticCurve::Secp256k1,
            permanent: false,
            chain_code: None,
        }
    }

    /// Use another curve
    pub const fn curve(mut self, curve: EllipticCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Attach a chain code
    pub fn chain_code(mut self, chain_code: Vec<u8>) -> Self {
        self.chain_code = Some(chain_code);
        self
    }

    fn tlvs(&self) -> Vec<Tlv> {
        let mut tlv = TlvBuilder::new();
        let Some(public_key) = &self.public_key else {
            tlv.append(TlvTag::Status, &WalletStatus::Empty)
                .unwrap()
                .append(TlvTag::WalletIndex, &self.index)
                .unwrap();
            return tlv.into_tlvs();
        };

        let mut codes = vec![WalletSettingsCode::IsReusable];
        if self.permanent {
            codes.push(WalletSettingsCode::IsPermanent);
        }
        tlv.append(TlvTag::Status, &WalletStatus::Loaded)
            .unwrap()
            .append(TlvTag::SettingsMask, &WalletSettingsMask::new(&codes))
            .unwrap()
            .append(TlvTag::WalletIndex, &self.index)
            .unwrap()
            .append(TlvTag::WalletPublicKey, public_key)
            .unwrap()
            .append(TlvTag::CurveId, &self.curve)
            .unwrap()
            .append(TlvTag::WalletSignedHashes, &0u32)
            .unwrap()
            .append_optional(TlvTag::WalletHDChain, self.chain_code.as_ref())
            .unwrap();
        tlv.into_tlvs()
    }
}

/// Wallets list reply
pub fn wallets_reply(records: &[WalletRecord]) -> Bytes {
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, CARD_ID).unwrap();
    for record in records {
        tlv.append(TlvTag::CardWallet, &record.tlvs()).unwrap();
    }
    tlv.serialize().unwrap()
}

/// Three empty wallet slots
pub fn empty_wallets_reply() -> Bytes {
    wallets_reply(&[WalletRecord::empty(0), WalletRecord::empty(1), WalletRecord::empty(2)])
}

/// Single wallet reply, as returned by `ReadWallet`
pub fn wallet_reply(record: &WalletRecord) -> Bytes {
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, CARD_ID)
        .unwrap()
        .append(TlvTag::CardWallet, &record.tlvs())
        .unwrap();
    tlv.serialize().unwrap()
}

/// Reply carrying only the card id
pub fn card_id_reply() -> Bytes {
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, CARD_ID).unwrap();
    tlv.serialize().unwrap()
}

/// Queue the preflight read of a multi-wallet card holding `records`
pub fn preflight(transport: &MockTransport, records: &[WalletRecord]) {
    transport.ok(CardReply::new().build()).ok(wallets_reply(records));
}

/// Value of `tag` in a request, if present
pub fn request_value(command: &CommandApdu, tag: TlvTag) -> Option<Vec<u8>> {
    Tlv::deserialize(command.data())
        .unwrap()
        .into_iter()
        .find(|tlv| tlv.tag() == tag)
        .map(|tlv| tlv.value().to_vec())
}
