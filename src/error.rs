use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub const GENERIC_DETAIL: &str = "An error occurred";
pub const NO_RESPONSE_DETAIL: &str = "No response from server";
pub const UNEXPECTED_DETAIL: &str = "An unexpected error occurred";

/// Normalized shape of every failed HTTP call.
///
/// `status` is the HTTP status for server responses, `0` when no response
/// arrived at all, and absent when the request could not even be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{detail}")]
pub struct ApiError {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiError {
    /// Server answered with a non-success status.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| detail_text(v.get("detail")?))
            .unwrap_or_else(|| GENERIC_DETAIL.to_string());
        Self {
            detail,
            status: Some(status),
        }
    }

    pub fn no_response() -> Self {
        Self {
            detail: NO_RESPONSE_DETAIL.to_string(),
            status: Some(0),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            detail: if message.is_empty() {
                UNEXPECTED_DETAIL.to_string()
            } else {
                message
            },
            status: None,
        }
    }

    /// Transport-level failures. Builder errors never reached the wire; all
    /// other send/receive failures mean no usable response came back.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::unexpected(err.to_string());
        }
        match err.status() {
            Some(status) => Self {
                detail: GENERIC_DETAIL.to_string(),
                status: Some(status.as_u16()),
            },
            None => Self::no_response(),
        }
    }
}

// FastAPI sends either a string or a list of validation entries with `msg`.
fn detail_text(detail: &serde_json::Value) -> Option<String> {
    match detail {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    }
}

/// A response body that does not match the expected schema.
#[derive(Debug, Error)]
#[error("invalid {what} payload: {source}")]
pub struct ParseError {
    pub what: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Invalid(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(e) => e.status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Api(ApiError::from_reqwest(&err))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
