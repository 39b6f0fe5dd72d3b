use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::core::plan::WafAction;

/// Custom error type for WAF API operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WafApiError {
    /// Error when the API cannot be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when the API answers with a non-success HTTP status
    #[error("WAF API returned error status: {status}, action: {action}")]
    HttpStatus {
        /// The action that was requested
        action: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// The API understood the request but refused it
    #[error("WAF API rejected {action}: {}", messages.join("; "))]
    Rejected {
        action: String,
        messages: Vec<String>,
    },

    /// The response body was not the expected JSON document
    #[error("Invalid response for {action}: {message}")]
    InvalidResponse { action: String, message: String },
}

/// Result type alias for WAF API operations
pub type WafApiResult<T> = Result<T, WafApiError>;

/// Decoded answer of the WAF API
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    /// 1 on success, 0 on failure
    #[serde(deserialize_with = "deserialize_status")]
    pub status: i64,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}

/// The API has been seen to send the status both as a number and as a string
fn deserialize_status<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Status {
        Number(i64),
        Text(String),
    }

    match Status::deserialize(deserializer)? {
        Status::Number(n) => Ok(n),
        Status::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// WafApi defines the port (interface) for talking to the WAF management API
#[async_trait]
pub trait WafApi: Send + Sync + 'static {
    /// Submit a single action
    ///
    /// # Arguments
    /// * `action` - The change (or query) to send
    ///
    /// # Returns
    /// A future that resolves to the API's answer, or an error if the request failed
    /// or the API rejected it
    async fn submit(&self, action: &WafAction) -> WafApiResult<ApiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_number_or_string() {
        let numeric: ApiResponse =
            serde_json::from_str(r#"{"status": 1, "messages": ["ok"]}"#).unwrap();
        assert!(numeric.is_success());

        let textual: ApiResponse =
            serde_json::from_str(r#"{"status": "0", "action": "whitelist_ip"}"#).unwrap();
        assert!(!textual.is_success());
        assert_eq!(textual.action.as_deref(), Some("whitelist_ip"));
    }

    #[test]
    fn rejected_error_joins_messages() {
        let err = WafApiError::Rejected {
            action: "whitelist_ip".to_string(),
            messages: vec!["Invalid IP".to_string(), "Try again".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "WAF API rejected whitelist_ip: Invalid IP; Try again"
        );
    }

    #[test]
    fn timeout_error_keeps_sub_second_precision() {
        assert_eq!(
            WafApiError::Timeout(Duration::from_millis(500)).to_string(),
            "Timeout error after 500ms"
        );
        assert_eq!(
            WafApiError::Timeout(Duration::from_secs(30)).to_string(),
            "Timeout error after 30s"
        );
    }
}
