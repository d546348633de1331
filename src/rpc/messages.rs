// src/rpc/messages.rs
//! JSON-RPC 2.0 envelopes exchanged over the control socket

use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of server-pushed subscription notifications
pub const SUBSCRIPTION_METHOD: &str = "mining_subscription";

/// Invalid JSON
pub const PARSE_ERROR: i64 = -32700;
/// JSON that is not a valid request object
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Wrong or missing parameters
pub const INVALID_PARAMS: i64 = -32602;
/// Operation failed on the server
pub const SERVER_ERROR: i64 = -32000;

/// Client request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, must be "2.0"
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id; requests without one get no response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Creates a request with positional parameters
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Request {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            method: method.to_string(),
            params,
        }
    }
}

/// Error member of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC error code
    pub code: i64,
    /// Human readable message
    pub message: String,
}

impl ErrorObject {
    /// Creates an error object
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ErrorObject {
            code,
            message: message.into(),
        }
    }
}

impl From<MinerError> for ErrorObject {
    fn from(err: MinerError) -> Self {
        match err {
            MinerError::RpcError { code, message } => ErrorObject { code, message },
            MinerError::JsonError(e) => ErrorObject::new(INVALID_PARAMS, e.to_string()),
            other => ErrorObject::new(SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ErrorObject> for MinerError {
    fn from(err: ErrorObject) -> Self {
        MinerError::RpcError {
            code: err.code,
            message: err.message,
        }
    }
}

/// Server response to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub jsonrpc: String,
    /// Id of the request being answered; null if it could not be read
    pub id: Value,
    /// Outcome on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Outcome on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Successful response; `result` is serialized even when null
    pub fn success(id: Value, result: Value) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response
    pub fn failure(id: Value, error: ErrorObject) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Splits the response into its outcome
    pub fn into_result(self) -> Result<Value, MinerError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Payload of a subscription notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Subscription id returned by the subscribe call
    pub subscription: String,
    /// The event
    pub result: Value,
}

/// Server-pushed notification for one subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Protocol version
    pub jsonrpc: String,
    /// Always [`SUBSCRIPTION_METHOD`]
    pub method: String,
    /// Subscription id and event
    pub params: SubscriptionParams,
}

impl Notification {
    /// Wraps an event for a subscription
    pub fn new(subscription: String, result: Value) -> Self {
        Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: SUBSCRIPTION_METHOD.to_string(),
            params: SubscriptionParams {
                subscription,
                result,
            },
        }
    }
}

/// Anything the server may write to a client
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Subscription event
    Notification(Notification),
    /// Answer to a request
    Response(Response),
}
