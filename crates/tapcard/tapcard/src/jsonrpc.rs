//! JSON-RPC 2.0 front end
//!
//! Hosts hand in a request string, the method is looked up in [`METHODS`], its params are parsed
//! into a runnable, and the runnable's reply comes back serialized in a response envelope. Byte
//! fields travel as hex strings.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::hdwallet::DerivationPath;
use crate::operations::{FileToWrite, PurgeWallet, SetUserCode, Sign};
use crate::tasks::{
    CreateWalletTask, DeleteFilesTask, DeriveWalletPublicKeyTask, DeriveWalletPublicKeysTask,
    ReadFilesTask, ScanTask, SignHashTask, WriteFilesTask,
};
use crate::{CardSession, CardSessionRunnable, EllipticCurve, Error, PreflightReadMode};

const VERSION: &str = "2.0";

/// Runnable producing a JSON value
pub type BoxedRunnable = Box<dyn CardSessionRunnable<Response = Value>>;

/// Builds the runnable of one method from its params
pub type Constructor = fn(Value) -> Result<BoxedRunnable, JsonRpcError>;

/// Method names and their constructors
pub static METHODS: &[(&str, Constructor)] = &[
    ("scan", scan),
    ("sign_hashes", sign_hashes),
    ("sign_hash", sign_hash),
    ("create_wallet", create_wallet),
    ("purge_wallet", purge_wallet),
    ("read_files", read_files),
    ("write_files", write_files),
    ("delete_files", delete_files),
    ("derive_wallet_public_key", derive_wallet_public_key),
    ("derive_wallet_public_keys", derive_wallet_public_keys),
    ("set_access_code", set_access_code),
    ("set_passcode", set_passcode),
    ("reset_user_codes", reset_user_codes),
];

/// Standard JSON-RPC error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorKind {
    /// Request is not valid JSON
    ParseError,
    /// Request is not a valid JSON-RPC request
    InvalidRequest,
    /// No such method
    MethodNotFound,
    /// Params do not match the method
    InvalidParams,
    /// The card operation failed
    ServerError,
}

impl JsonRpcErrorKind {
    /// Reserved JSON-RPC code
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::ServerError => -32000,
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid parameters",
            Self::ServerError => "Server error",
        }
    }
}

/// Detail attached to an error: the SDK code for card failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Error code
    pub code: i64,
    /// Human readable message
    pub message: String,
}

/// Error member of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct JsonRpcError {
    /// JSON-RPC code
    pub code: i64,
    /// JSON-RPC message
    pub message: String,
    /// Detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

impl JsonRpcError {
    /// Error of `kind`, with `detail` as its data message
    pub fn new(kind: JsonRpcErrorKind, detail: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: kind.message().to_string(),
            data: Some(ErrorData {
                code: kind.code(),
                message: detail.into(),
            }),
        }
    }
}

impl From<&Error> for JsonRpcError {
    fn from(error: &Error) -> Self {
        let kind = JsonRpcErrorKind::ServerError;
        Self {
            code: kind.code(),
            message: kind.message().to_string(),
            data: Some(ErrorData {
                code: error.code().into(),
                message: error.to_string(),
            }),
        }
    }
}

/// Request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always `2.0`
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Method params
    #[serde(default)]
    pub params: Value,
    /// Request id
    #[serde(default)]
    pub id: Option<i64>,
}

impl JsonRpcRequest {
    /// Parse a request string
    pub fn parse(json: &str) -> Result<Self, JsonRpcError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| JsonRpcError::new(JsonRpcErrorKind::ParseError, e.to_string()))?;
        let request: Self = serde_json::from_value(value)
            .map_err(|e| JsonRpcError::new(JsonRpcErrorKind::InvalidRequest, e.to_string()))?;
        if request.jsonrpc != VERSION {
            return Err(JsonRpcError::new(
                JsonRpcErrorKind::InvalidRequest,
                format!("unsupported version {}", request.jsonrpc),
            ));
        }
        Ok(request)
    }

    /// Build the runnable of this request
    pub fn runnable(&self) -> Result<BoxedRunnable, JsonRpcError> {
        let method = self.method.to_lowercase();
        let (_, constructor) = METHODS
            .iter()
            .find(|(name, _)| *name == method)
            .ok_or_else(|| JsonRpcError::new(JsonRpcErrorKind::MethodNotFound, &self.method))?;
        constructor(self.params.clone())
    }
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always `2.0`
    pub jsonrpc: String,
    /// Method reply on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Id of the request
    pub id: Option<i64>,
}

impl JsonRpcResponse {
    /// Successful reply
    pub fn success(id: Option<i64>, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Failed reply
    pub fn failure(id: Option<i64>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Run a request string on `session` and return the response envelope
pub async fn handle(session: &mut CardSession, json: &str) -> JsonRpcResponse {
    let request = match JsonRpcRequest::parse(json) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "Rejected JSON-RPC request");
            return JsonRpcResponse::failure(None, error);
        }
    };
    debug!(method = %request.method, id = ?request.id, "JSON-RPC request");

    let mut runnable = match request.runnable() {
        Ok(runnable) => runnable,
        Err(error) => return JsonRpcResponse::failure(request.id, error),
    };
    match session.run(runnable.as_mut()).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(error) => JsonRpcResponse::failure(request.id, JsonRpcError::from(&error)),
    }
}

/// Serializes the reply of the wrapped runnable
#[derive(Debug)]
struct JsonReply<R>(R);

#[async_trait]
impl<R> CardSessionRunnable for JsonReply<R>
where
    R: CardSessionRunnable,
    R::Response: Serialize,
{
    type Response = Value;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        self.0.preflight_read_mode()
    }

    async fn run(&mut self, session: &mut CardSession) -> crate::Result<Self::Response> {
        let response = self.0.run(session).await?;
        serde_json::to_value(response).map_err(|e| Error::EncodingFailed(e.to_string()))
    }
}

fn boxed<R>(runnable: R) -> Result<BoxedRunnable, JsonRpcError>
where
    R: CardSessionRunnable + 'static,
    R::Response: Serialize,
{
    Ok(Box::new(JsonReply(runnable)))
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(JsonRpcErrorKind::InvalidParams, e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct HexBytes(#[serde(with = "hex")] Vec<u8>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignHashesParams {
    hashes: Vec<HexBytes>,
    #[serde(with = "hex")]
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignHashParams {
    #[serde(with = "hex")]
    hash: Vec<u8>,
    #[serde(with = "hex")]
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWalletParams {
    curve: EllipticCurve,
    #[serde(default)]
    is_permanent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletParams {
    #[serde(with = "hex")]
    wallet_public_key: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFilesParams {
    read_private_files: Option<bool>,
    indices: Option<Vec<u8>>,
    #[serde(default, with = "crate::card::hex_option")]
    wallet_public_key: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteFilesParams {
    files: Vec<FileToWrite>,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFilesParams {
    indices: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeriveParams {
    #[serde(with = "hex")]
    wallet_public_key: Vec<u8>,
    derivation_path: DerivationPath,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeriveManyParams {
    #[serde(with = "hex")]
    wallet_public_key: Vec<u8>,
    derivation_paths: Vec<DerivationPath>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessCodeParams {
    access_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasscodeParams {
    passcode: Option<String>,
}

fn scan(_: Value) -> Result<BoxedRunnable, JsonRpcError> {
    boxed(ScanTask::new())
}

fn sign_hashes(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: SignHashesParams = params(value)?;
    let hashes = p.hashes.into_iter().map(|hash| hash.0).collect();
    boxed(Sign::new(hashes, p.wallet_public_key).with_derivation_path(p.derivation_path))
}

fn sign_hash(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: SignHashParams = params(value)?;
    boxed(SignHashTask::new(p.hash, p.wallet_public_key).with_derivation_path(p.derivation_path))
}

fn create_wallet(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: CreateWalletParams = params(value)?;
    boxed(CreateWalletTask::new(p.curve).permanent(p.is_permanent))
}

fn purge_wallet(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: WalletParams = params(value)?;
    boxed(PurgeWallet::new(p.wallet_public_key))
}

fn read_files(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: ReadFilesParams = params(value)?;
    let mut task = match p.indices {
        Some(indices) => ReadFilesTask::with_indices(indices),
        None => ReadFilesTask::all(),
    };
    if let Some(read_private) = p.read_private_files {
        task = task.read_private(read_private);
    }
    if let Some(public_key) = p.wallet_public_key {
        task = task.with_wallet(public_key);
    }
    boxed(task)
}

fn write_files(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: WriteFilesParams = params(value)?;
    boxed(WriteFilesTask::new(p.files).overwrite(p.overwrite))
}

fn delete_files(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: DeleteFilesParams = params(value)?;
    boxed(match p.indices {
        Some(indices) => DeleteFilesTask::with_indices(indices),
        None => DeleteFilesTask::all(),
    })
}

fn derive_wallet_public_key(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: DeriveParams = params(value)?;
    boxed(DeriveWalletPublicKeyTask::new(p.wallet_public_key, p.derivation_path))
}

fn derive_wallet_public_keys(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: DeriveManyParams = params(value)?;
    boxed(DeriveWalletPublicKeysTask::new(p.wallet_public_key, p.derivation_paths))
}

fn set_access_code(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: AccessCodeParams = params(value)?;
    boxed(SetUserCode::change_access_code(p.access_code.as_deref()))
}

fn set_passcode(value: Value) -> Result<BoxedRunnable, JsonRpcError> {
    let p: PasscodeParams = params(value)?;
    boxed(SetUserCode::change_passcode(p.passcode.as_deref()))
}

fn reset_user_codes(_: Value) -> Result<BoxedRunnable, JsonRpcError> {
    boxed(SetUserCode::reset_user_codes())
}
