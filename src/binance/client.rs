//! Blocking Binance REST client for account history
//!
//! Signed endpoints carry `timestamp` and `recvWindow` in the query string,
//! an HMAC-SHA256 `signature` over that query, and the API key in the
//! `X-MBX-APIKEY` header.
//!
//! # Example
//! ```no_run
//! use binance_monitor::binance::{AccountApi, BinanceClient, ClientConfig, Credentials};
//!
//! fn main() -> anyhow::Result<()> {
//!     let creds = Credentials::new("api_key", "api_secret");
//!     let client = BinanceClient::new(ClientConfig::default(), Some(creds))?;
//!     let trades = client.my_trades("BTCUSDT", None, 100)?;
//!     println!("Fetched {} trades", trades.len());
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::AccountApi;
use super::auth::Credentials;
use super::types::{
    AccountInfo, ApiErrorBody, DepositRecord, ExchangeInfo, MyTrade, ServerTime, WithdrawRecord,
    MAX_TRADES_PER_REQUEST, MAX_TRANSFERS_PER_REQUEST,
};
use crate::error::{ExchangeError, ExchangeResult};

/// Base URL for the Binance REST API
pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Binance codes meaning the key, secret or signature was rejected
const AUTH_ERROR_CODES: &[i64] = &[-2014, -2015, -1022];

/// Timestamp for this request is outside of the recvWindow
const TIMESTAMP_ERROR_CODE: i64 = -1021;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub recv_window_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            recv_window_ms: 5_000,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }
}

/// Binance API client
pub struct BinanceClient {
    http: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    /// server time minus local time, in milliseconds
    time_offset_ms: Cell<i64>,
}

impl BinanceClient {
    /// Create a client. Without credentials only public endpoints work.
    pub fn new(config: ClientConfig, credentials: Option<Credentials>) -> ExchangeResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ExchangeError::InvalidRequest(format!("invalid base URL {}: {}", config.base_url, e))
        })?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("binance-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if let Some(creds) = &credentials {
            debug!("Binance client using API key {}", creds.api_key());
        }

        Ok(BinanceClient {
            http,
            base_url,
            credentials,
            recv_window_ms: config.recv_window_ms,
            time_offset_ms: Cell::new(0),
        })
    }

    /// Measure the local clock against the server and use it for signed requests
    pub fn sync_time(&self) -> ExchangeResult<i64> {
        let local = Utc::now().timestamp_millis();
        let server = self.server_time()?;
        let offset = server - local;
        self.time_offset_ms.set(offset);
        if offset.abs() > 1_000 {
            info!("Local clock differs from Binance by {} ms", offset);
        }
        Ok(offset)
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.get()
    }

    fn endpoint(&self, path: &str) -> ExchangeResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ExchangeError::InvalidRequest(format!("invalid path {}: {}", path, e)))
    }

    fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let mut url = self.endpoint(path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }

        debug!("GET {}", url.path());
        let response = self.http.get(url).send()?;
        read_response(response)
    }

    fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            ExchangeError::Auth(format!("{} requires API credentials", path))
        })?;

        let timestamp = Utc::now().timestamp_millis() + self.time_offset_ms.get();
        let url = self.signed_url(path, params, timestamp, creds)?;

        debug!("GET {} (signed)", url.path());
        let response = self
            .http
            .get(url)
            .header("X-MBX-APIKEY", creds.api_key().expose_secret())
            .send()?;

        match read_response(response) {
            Err(ExchangeError::Api { code, message }) if code == TIMESTAMP_ERROR_CODE => {
                warn!("Request timestamp rejected ({}), resyncing clock", message);
                self.sync_time()?;
                Err(ExchangeError::Network(message))
            }
            other => other,
        }
    }

    /// Build the full signed URL. The signature covers the query exactly as sent.
    fn signed_url(
        &self,
        path: &str,
        params: &[(&str, String)],
        timestamp: i64,
        creds: &Credentials,
    ) -> ExchangeResult<Url> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair("recvWindow", &self.recv_window_ms.to_string())
            .append_pair("timestamp", &timestamp.to_string());

        let signature = creds.sign(url.query().unwrap_or_default());
        url.query_pairs_mut().append_pair("signature", &signature);
        Ok(url)
    }
}

impl AccountApi for BinanceClient {
    fn server_time(&self) -> ExchangeResult<i64> {
        let time: ServerTime = self.public_get("/api/v3/time", &[])?;
        Ok(time.server_time)
    }

    fn exchange_info(&self) -> ExchangeResult<ExchangeInfo> {
        self.public_get("/api/v3/exchangeInfo", &[])
    }

    fn account(&self) -> ExchangeResult<AccountInfo> {
        self.signed_get("/api/v3/account", &[])
    }

    fn my_trades(
        &self,
        symbol: &str,
        from_id: Option<u64>,
        limit: u32,
    ) -> ExchangeResult<Vec<MyTrade>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("limit", limit.min(MAX_TRADES_PER_REQUEST).to_string()),
        ];
        if let Some(id) = from_id {
            params.push(("fromId", id.to_string()));
        }
        self.signed_get("/api/v3/myTrades", &params)
    }

    fn deposit_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
    ) -> ExchangeResult<Vec<DepositRecord>> {
        let params = [
            ("startTime", start.timestamp_millis().to_string()),
            ("endTime", end.timestamp_millis().to_string()),
            ("offset", offset.to_string()),
            ("limit", MAX_TRANSFERS_PER_REQUEST.to_string()),
        ];
        self.signed_get("/sapi/v1/capital/deposit/hisrec", &params)
    }

    fn withdraw_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
    ) -> ExchangeResult<Vec<WithdrawRecord>> {
        let params = [
            ("startTime", start.timestamp_millis().to_string()),
            ("endTime", end.timestamp_millis().to_string()),
            ("offset", offset.to_string()),
            ("limit", MAX_TRANSFERS_PER_REQUEST.to_string()),
        ];
        self.signed_get("/sapi/v1/capital/withdraw/history", &params)
    }
}

fn read_response<T: DeserializeOwned>(response: Response) -> ExchangeResult<T> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text()?;

    if !status.is_success() {
        return Err(classify_error(status.as_u16(), retry_after, &body));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Map a failed HTTP response onto the error taxonomy
pub fn classify_error(status: u16, retry_after: Option<Duration>, body: &str) -> ExchangeError {
    let api_error = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = api_error
        .as_ref()
        .map(|e| e.msg.clone())
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()));

    match (status, api_error.as_ref().map(|e| e.code)) {
        (429, _) | (418, _) => ExchangeError::RateLimit {
            message,
            retry_after,
        },
        (401, _) => ExchangeError::Auth(message),
        (_, Some(code)) if AUTH_ERROR_CODES.contains(&code) => ExchangeError::Auth(message),
        (500..=599, _) => ExchangeError::Network(message),
        (_, Some(code)) => ExchangeError::Api { code, message },
        _ => ExchangeError::Api {
            code: -i64::from(status),
            message,
        },
    }
}
