//! Authentication utilities for the Binance API
//!
//! Signed endpoints take an HMAC-SHA256 signature of the full query string,
//! keyed with the API secret and hex encoded.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Generate the HMAC-SHA256 signature for a query string
///
/// # Example
///
/// ```
/// use binance_monitor::binance::auth::sign_query;
///
/// let signature = sign_query("symbol=BTCUSDT&timestamp=1499827319559", "secret");
/// assert_eq!(signature.len(), 64);
/// ```
pub fn sign_query(query: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// String wrapper that keeps API keys out of logs
///
/// `Debug` prints `SecretString(***)`, `Display` prints `abcd...wxyz`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        SecretString(value.into())
    }

    /// Only for building requests. Never log the returned value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        SecretString::new(s)
    }
}

/// API credentials container
#[derive(Debug, Clone)]
pub struct Credentials {
    api_key: SecretString,
    api_secret: SecretString,
}

impl Credentials {
    /// Create new credentials, trimming surrounding whitespace
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        let api_key: String = api_key.into();
        let api_secret: String = api_secret.into();
        Self {
            api_key: SecretString::new(api_key.trim()),
            api_secret: SecretString::new(api_secret.trim()),
        }
    }

    /// Create credentials from `BINANCE_API_KEY` and `BINANCE_API_SECRET`
    ///
    /// Returns `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("BINANCE_API_KEY").ok()?;
        let api_secret = std::env::var("BINANCE_API_SECRET").ok()?;
        let creds = Self::new(api_key, api_secret);
        creds.is_complete().then_some(creds)
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn api_secret(&self) -> &SecretString {
        &self.api_secret
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Sign a query string with the API secret
    pub fn sign(&self, query: &str) -> String {
        sign_query(query, self.api_secret.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_query_matches_binance_example() {
        // Example from the Binance API documentation for SIGNED endpoints
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            sign_query(query, secret),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_different_secrets_produce_different_signatures() {
        let query = "timestamp=1234567890";
        assert_ne!(sign_query(query, "secret1"), sign_query(query, "secret2"));
    }

    #[test]
    fn test_secret_string_masking() {
        let secret = SecretString::new("abcdefghijklmnop");
        assert_eq!(secret.masked(), "abcd...mnop");
        assert_eq!(format!("{}", secret), "abcd...mnop");
        assert_eq!(format!("{:?}", secret), "SecretString(***)");

        assert_eq!(SecretString::new("short").masked(), "***");
    }

    #[test]
    fn test_credentials_trim_and_sign() {
        let creds = Credentials::new("  my_key \n", "my_secret ");
        assert_eq!(creds.api_key().expose_secret(), "my_key");
        assert!(creds.is_complete());
        assert_eq!(
            creds.sign("timestamp=1"),
            sign_query("timestamp=1", "my_secret")
        );
    }

    #[test]
    fn test_incomplete_credentials() {
        let creds = Credentials::new("key", "   ");
        assert!(!creds.is_complete());
    }
}
