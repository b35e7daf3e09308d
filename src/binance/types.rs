//! Binance REST payloads used by the monitor

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum rows returned by `/api/v3/myTrades`
pub const MAX_TRADES_PER_REQUEST: u32 = 1000;

/// Maximum rows returned by the capital history endpoints
pub const MAX_TRANSFERS_PER_REQUEST: u32 = 1000;

/// Longest startTime..endTime span accepted by the capital history endpoints
pub const MAX_TRANSFER_WINDOW_DAYS: i64 = 90;

/// Error body returned by Binance on failed requests
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

/// Subset of `/api/v3/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    pub server_time: i64,
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    /// Symbols currently open for trading
    pub fn active_symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.iter().filter(|s| s.is_trading())
    }
}

/// One entry of the exchange's `rateLimits` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// REQUEST_WEIGHT, RAW_REQUESTS or ORDERS
    pub rate_limit_type: String,
    /// SECOND, MINUTE, HOUR or DAY
    pub interval: String,
    pub interval_num: u32,
    pub limit: u32,
}

impl RateLimit {
    /// Length of the limit's window, `None` for an unknown interval unit
    pub fn window(&self) -> Option<Duration> {
        let unit_secs = match self.interval.as_str() {
            "SECOND" => 1,
            "MINUTE" => 60,
            "HOUR" => 3_600,
            "DAY" => 86_400,
            _ => return None,
        };
        Some(Duration::from_secs(unit_secs * u64::from(self.interval_num)))
    }

    /// Whether the limit counts requests (as opposed to orders)
    pub fn is_request_limit(&self) -> bool {
        self.rate_limit_type.contains("REQUEST")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// Subset of `/api/v3/account`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub update_time: i64,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub can_trade: bool,
    pub balances: Vec<Balance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Row of `/api/v3/myTrades`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTrade {
    pub symbol: String,
    pub id: u64,
    pub order_id: i64,
    pub price: Decimal,
    pub qty: Decimal,
    #[serde(default)]
    pub quote_qty: Option<Decimal>,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
    #[serde(default)]
    pub is_maker: bool,
}

/// Row of `/sapi/v1/capital/deposit/hisrec`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub amount: Decimal,
    pub coin: String,
    #[serde(default)]
    pub network: Option<String>,
    pub status: i32,
    #[serde(default)]
    pub tx_id: Option<String>,
    pub insert_time: i64,
}

impl DepositRecord {
    /// 1 = success, 6 = credited but cannot withdraw
    pub fn is_credited(&self) -> bool {
        matches!(self.status, 1 | 6)
    }

    /// 0 = pending, 8 = waiting for user confirmation
    pub fn is_pending(&self) -> bool {
        matches!(self.status, 0 | 8)
    }
}

/// Row of `/sapi/v1/capital/withdraw/history`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRecord {
    pub id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub transaction_fee: Decimal,
    pub coin: String,
    pub status: i32,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub tx_id: Option<String>,
    /// UTC, formatted `YYYY-MM-DD HH:MM:SS`
    pub apply_time: String,
}

impl WithdrawRecord {
    /// 6 = completed
    pub fn is_completed(&self) -> bool {
        self.status == 6
    }

    /// Email sent, awaiting approval or processing; cancelled, rejected and
    /// failed withdrawals are final
    pub fn is_pending(&self) -> bool {
        matches!(self.status, 0 | 2 | 4)
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.apply_time, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_limit_window() {
        let limit = RateLimit {
            rate_limit_type: "REQUEST_WEIGHT".into(),
            interval: "MINUTE".into(),
            interval_num: 5,
            limit: 6000,
        };
        assert_eq!(limit.window(), Some(Duration::from_secs(300)));
        assert!(limit.is_request_limit());

        let orders = RateLimit {
            rate_limit_type: "ORDERS".into(),
            interval: "FORTNIGHT".into(),
            interval_num: 1,
            limit: 10,
        };
        assert_eq!(orders.window(), None);
        assert!(!orders.is_request_limit());
    }

    #[test]
    fn test_parse_my_trade() {
        let json = r#"{
            "symbol": "BNBBTC", "id": 28457, "orderId": 100234, "orderListId": -1,
            "price": "4.00000100", "qty": "12.00000000", "quoteQty": "48.000012",
            "commission": "10.10000000", "commissionAsset": "BNB",
            "time": 1499865549590, "isBuyer": true, "isMaker": false, "isBestMatch": true
        }"#;
        let trade: MyTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.id, 28457);
        assert_eq!(trade.qty, dec!(12));
        assert_eq!(trade.quote_qty, Some(dec!(48.000012)));
        assert!(trade.is_buyer);
    }

    #[test]
    fn test_parse_withdraw_apply_time() {
        let json = r#"{
            "id": "b6ae22b3aa844210a7041aee7589627c", "amount": "8.91000000",
            "transactionFee": "0.004", "coin": "USDT", "status": 6,
            "address": "0x94df8b352de7f46f64b01d3666bf6e936e44ce60",
            "txId": "0xb5ef8c13b968a406cc62a93a8bd80f9e9a906ef1b3fcf20a2e48573c17659268",
            "applyTime": "2019-10-12 11:12:02", "network": "ETH", "transferType": 0
        }"#;
        let mut withdrawal: WithdrawRecord = serde_json::from_str(json).unwrap();
        assert!(withdrawal.is_completed());
        assert!(!withdrawal.is_pending());
        withdrawal.status = 4;
        assert!(withdrawal.is_pending());
        withdrawal.status = 1;
        assert!(!withdrawal.is_pending() && !withdrawal.is_completed());
        assert_eq!(
            withdrawal.applied_at().unwrap().timestamp(),
            1_570_878_722
        );
    }

    #[test]
    fn test_deposit_status() {
        let json = r#"{
            "id": "769800519366885376", "amount": "0.001", "coin": "BNB",
            "network": "BNB", "status": 0, "address": "bnb136ns6lfw4zs5hg4n85vdthaad7hq5m4gtkgf23",
            "txId": "98A3EA560C6B3336D348B6C83F0F95ECE4F1F5919E94BD006E5BF3BF264FACFC",
            "insertTime": 1661493146000
        }"#;
        let deposit: DepositRecord = serde_json::from_str(json).unwrap();
        assert!(!deposit.is_credited());
        assert!(deposit.is_pending());
        assert_eq!(deposit.id.as_deref(), Some("769800519366885376"));
    }
}
