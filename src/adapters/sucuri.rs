use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use url::Url;

use crate::{
    config::models::Credentials,
    core::plan::WafAction,
    ports::waf_api::{ApiResponse, WafApi, WafApiError, WafApiResult},
};

/// Endpoint of the Sucuri WAF API, version 2
pub const DEFAULT_API_URL: &str = "https://waf.sucuri.net/api?v2";

const USER_AGENT: &str = concat!("wafctl/", env!("CARGO_PKG_VERSION"));

/// Sucuri WAF API adapter using reqwest with rustls.
///
/// Every action is a form-encoded POST carrying the API key (`k`), the site secret
/// (`s`), the action name (`a`) and the action's own fields. The answer is a JSON
/// document whose `status` is 1 on success.
pub struct SucuriClient {
    client: reqwest::Client,
    api_url: Url,
    credentials: Credentials,
    timeout: Duration,
}

fn field(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

impl SucuriClient {
    /// Create a new client for one site.
    pub fn new(api_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let api_url =
            Url::parse(api_url).wrap_err_with(|| format!("Invalid API URL: {api_url}"))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            eyre::bail!("API URL must use http or https: {api_url}");
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;

        tracing::debug!("Created WAF API client for {}", api_url);
        Ok(Self {
            client,
            api_url,
            credentials,
            timeout,
        })
    }

    /// Form fields describing `action`, without credentials
    pub fn action_fields(action: &WafAction) -> Vec<(String, String)> {
        match action {
            WafAction::WhitelistIp { ip, delete } => vec![
                field(
                    "a",
                    if *delete { "delete_whitelist_ip" } else { "whitelist_ip" },
                ),
                field("ip", ip.to_string()),
            ],
            WafAction::BlacklistIp { ip, delete } => vec![
                field(
                    "a",
                    if *delete { "delete_blacklist_ip" } else { "blacklist_ip" },
                ),
                field("ip", ip.to_string()),
            ],
            WafAction::WhitelistPath { rule, delete } => {
                let prefix = if *delete { "remove_whitelist_dir" } else { "whitelist_dir" };
                vec![
                    field("a", "update_setting"),
                    field(prefix, rule.path.as_str()),
                    field(&format!("{prefix}_pattern"), rule.pattern.as_str()),
                ]
            }
            WafAction::BlacklistPath { rule, delete } => {
                let prefix = if *delete { "remove_blocked_dir" } else { "blocked_dir" };
                vec![
                    field("a", "update_setting"),
                    field(prefix, rule.path.as_str()),
                    field(&format!("{prefix}_pattern"), rule.pattern.as_str()),
                ]
            }
            WafAction::UpdateSetting { name, value } => vec![
                field("a", "update_setting"),
                field(name, value.as_str()),
            ],
            WafAction::ShowSettings => vec![field("a", "show_settings")],
        }
    }

    fn form(&self, action: &WafAction) -> Vec<(String, String)> {
        let mut fields = vec![
            field("k", self.credentials.api_key.as_str()),
            field("s", self.credentials.api_secret.as_str()),
        ];
        fields.extend(Self::action_fields(action));
        fields
    }

    /// Map an API answer onto success or rejection
    fn interpret(action: &WafAction, response: ApiResponse) -> WafApiResult<ApiResponse> {
        if response.is_success() {
            return Ok(response);
        }
        let messages = if response.messages.is_empty() {
            vec![format!("status {}", response.status)]
        } else {
            response.messages
        };
        Err(WafApiError::Rejected {
            action: action.name().to_string(),
            messages,
        })
    }
}

#[async_trait]
impl WafApi for SucuriClient {
    async fn submit(&self, action: &WafAction) -> WafApiResult<ApiResponse> {
        tracing::debug!("Sending {} to {}", action, self.api_url);

        let response = self
            .client
            .post(self.api_url.clone())
            .form(&self.form(action))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WafApiError::Timeout(self.timeout)
                } else if e.is_builder() {
                    WafApiError::InvalidRequest(e.to_string())
                } else {
                    WafApiError::ConnectionError(format!("Request for {action} failed: {e}"))
                }
            })?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if !status.is_success() {
            return Err(WafApiError::HttpStatus {
                action: action.name().to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                WafApiError::Timeout(self.timeout)
            } else {
                WafApiError::ConnectionError(format!("Reading response for {action} failed: {e}"))
            }
        })?;
        let decoded: ApiResponse =
            serde_json::from_str(&body).map_err(|e| WafApiError::InvalidResponse {
                action: action.name().to_string(),
                message: e.to_string(),
            })?;

        Self::interpret(action, decoded)
    }
}
