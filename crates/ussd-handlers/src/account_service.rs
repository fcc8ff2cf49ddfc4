//! Custodial account service client
//!
//! [`AccountService`] is what the handlers see; [`HttpAccountService`] talks
//! to the custodial HTTP API. Every endpoint answers with the same envelope:
//!
//! ```json
//! { "ok": true, "description": "...", "result": { ... } }
//! ```

use crate::error::{AccountServiceError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A freshly created custodial account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreated {
    /// Tracking id of the creation job
    pub tracking_id: String,
    /// Account public key
    pub public_key: String,
    /// Custodial id, numeric on the wire
    #[serde(default, deserialize_with = "string_or_number")]
    pub custodial_id: String,
}

/// Balance of the account's default token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance with unit, e.g. `0.003 CELO`
    pub balance: String,
    /// Account nonce
    #[serde(default, deserialize_with = "string_or_number")]
    pub nonce: String,
}

/// One voucher the account holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherHolding {
    /// Token contract address
    pub contract_address: String,
    /// Token symbol
    pub token_symbol: String,
    /// Token decimals, kept textual
    #[serde(deserialize_with = "string_or_number")]
    pub token_decimals: String,
    /// Balance in display units
    #[serde(deserialize_with = "string_or_number")]
    pub balance: String,
}

/// Operations the handlers need from the custodial backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Create a custodial account
    async fn create_account(&self) -> Result<AccountCreated>;

    /// Current balance for `public_key`
    async fn check_balance(&self, public_key: &str) -> Result<Balance>;

    /// Whether the account behind `public_key` is active on chain
    async fn track_account_status(&self, public_key: &str) -> Result<bool>;

    /// Vouchers held by `public_key`
    async fn fetch_vouchers(&self, public_key: &str) -> Result<Vec<VoucherHolding>>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    description: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AccountStatus {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct Holdings {
    #[serde(default)]
    holdings: Vec<VoucherHolding>,
}

/// Account service client over HTTP
#[derive(Clone)]
pub struct HttpAccountService {
    client: Client,
    base_url: String,
    data_url: String,
}

impl HttpAccountService {
    /// Create a client against `base_url` (custodial API) and `data_url`
    /// (voucher holdings API)
    pub fn new(base_url: impl Into<String>, data_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccountServiceError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            data_url: data_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Custodial API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(url = %url, "Account service GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccountServiceError::Network(e.to_string()))?;
        Self::unwrap_envelope(response).await
    }

    async fn post<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(url = %url, "Account service POST");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AccountServiceError::Network(e.to_string()))?;
        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Account service request failed");
            return Err(AccountServiceError::Api(format!("status {}: {}", status, body)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| AccountServiceError::InvalidResponse(e.to_string()))?;
        decode_envelope(envelope)
    }
}

fn decode_envelope<T>(envelope: Envelope<T>) -> Result<T> {
    if !envelope.ok {
        return Err(AccountServiceError::Api(envelope.description));
    }
    envelope
        .result
        .ok_or_else(|| AccountServiceError::InvalidResponse("missing result".to_string()))
}

#[async_trait]
impl AccountService for HttpAccountService {
    async fn create_account(&self) -> Result<AccountCreated> {
        self.post(format!("{}/api/v2/account/create", self.base_url)).await
    }

    async fn check_balance(&self, public_key: &str) -> Result<Balance> {
        self.get(format!("{}/api/v2/account/balance/{}", self.base_url, public_key))
            .await
    }

    async fn track_account_status(&self, public_key: &str) -> Result<bool> {
        let status: AccountStatus = self
            .get(format!("{}/api/v2/account/status/{}", self.base_url, public_key))
            .await?;
        Ok(status.active)
    }

    async fn fetch_vouchers(&self, public_key: &str) -> Result<Vec<VoucherHolding>> {
        let holdings: Holdings = self
            .get(format!("{}/api/v1/token-holdings?address={}", self.data_url, public_key))
            .await?;
        Ok(holdings.holdings)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}
