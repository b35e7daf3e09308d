//! Core data types used across the monitor

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::binance::{AccountInfo, DepositRecord, MyTrade, SymbolInfo, WithdrawRecord};

/// Value of the `exchange` column for every record
pub const EXCHANGE_NAME: &str = "Binance";

/// Quote assets tried, longest first, when symbol metadata is unavailable
const KNOWN_QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USDP", "BIDR", "IDRT", "DAI", "EUR", "GBP", "TRY",
    "BRL", "AUD", "RUB", "UAH", "ZAR", "BTC", "ETH", "BNB", "XRP", "TRX", "DOGE",
];

/// Kind of account event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Trade,
    Deposit,
    Withdrawal,
    Balance,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Trade,
        RecordKind::Deposit,
        RecordKind::Withdrawal,
        RecordKind::Balance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Trade => "trade",
            RecordKind::Deposit => "deposit",
            RecordKind::Withdrawal => "withdrawal",
            RecordKind::Balance => "balance",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trade" | "trades" => Ok(RecordKind::Trade),
            "deposit" | "deposits" => Ok(RecordKind::Deposit),
            "withdrawal" | "withdrawals" => Ok(RecordKind::Withdrawal),
            "balance" | "balances" => Ok(RecordKind::Balance),
            _ => Err(format!(
                "Unknown record kind: {}. Use trade, deposit, withdrawal or balance",
                s
            )),
        }
    }
}

/// Trade side from the account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Base/quote split of a trading pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl SymbolPair {
    pub fn new(
        symbol: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
    ) -> Self {
        SymbolPair {
            symbol: symbol.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Split a symbol by its quote suffix, for when exchange metadata is missing
    pub fn guess(symbol: &str) -> Self {
        let symbol = symbol.trim().to_uppercase();
        let quote = KNOWN_QUOTE_ASSETS
            .iter()
            .filter(|q| symbol.len() > q.len() && symbol.ends_with(*q))
            .max_by_key(|q| q.len());

        match quote {
            Some(q) => {
                let base = symbol[..symbol.len() - q.len()].to_string();
                SymbolPair::new(symbol.clone(), base, *q)
            }
            None => SymbolPair::new(symbol.clone(), symbol, ""),
        }
    }
}

impl From<&SymbolInfo> for SymbolPair {
    fn from(info: &SymbolInfo) -> Self {
        SymbolPair::new(&info.symbol, &info.base_asset, &info.quote_asset)
    }
}

/// One exchange event: a trade, deposit, withdrawal or balance snapshot
///
/// Field order is the column order of the CSV store. The buy/sell/fee columns
/// follow the ccGains tax-tool layout and are only set for trades (and the fee
/// for withdrawals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub kind: RecordKind,
    pub time: DateTime<Utc>,
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub buy_currency: Option<String>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub buy_amount: Option<Decimal>,
    pub sell_currency: Option<String>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub sell_amount: Option<Decimal>,
    pub fee_currency: Option<String>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub fee_amount: Option<Decimal>,
    pub exchange: String,
    pub comment: String,
}

impl AccountRecord {
    /// A record with only the common columns filled in
    pub fn new(
        id: impl Into<String>,
        kind: RecordKind,
        time: DateTime<Utc>,
        asset: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        AccountRecord {
            id: id.into(),
            kind,
            time,
            asset: asset.into(),
            amount,
            symbol: None,
            side: None,
            buy_currency: None,
            buy_amount: None,
            sell_currency: None,
            sell_amount: None,
            fee_currency: None,
            fee_amount: None,
            exchange: EXCHANGE_NAME.to_string(),
            comment: String::new(),
        }
    }

    pub fn trade_id_for(symbol: &str, trade_id: u64) -> String {
        format!("trade:{}:{}", symbol, trade_id)
    }

    /// Convert a `myTrades` row. Returns `None` if the timestamp is out of range.
    pub fn from_trade(trade: &MyTrade, pair: &SymbolPair) -> Option<Self> {
        let time = DateTime::from_timestamp_millis(trade.time)?;
        let base_qty = trade.qty;
        let quote_qty = trade.quote_qty.unwrap_or(trade.qty * trade.price);
        let side = if trade.is_buyer { Side::Buy } else { Side::Sell };

        let (buy_currency, buy_amount, sell_currency, sell_amount) = match side {
            Side::Buy => (&pair.base, base_qty, &pair.quote, quote_qty),
            Side::Sell => (&pair.quote, quote_qty, &pair.base, base_qty),
        };

        let mut record = AccountRecord::new(
            Self::trade_id_for(&trade.symbol, trade.id),
            RecordKind::Trade,
            time,
            pair.base.clone(),
            base_qty,
        );
        record.symbol = Some(trade.symbol.clone());
        record.side = Some(side);
        record.buy_currency = non_empty(buy_currency);
        record.buy_amount = Some(buy_amount);
        record.sell_currency = non_empty(sell_currency);
        record.sell_amount = Some(sell_amount);
        record.fee_currency = non_empty(&trade.commission_asset);
        record.fee_amount = Some(trade.commission.abs());
        record.comment = format!(
            "order {} {}",
            trade.order_id,
            if trade.is_maker { "maker" } else { "taker" }
        );
        Some(record)
    }

    /// Convert a deposit row. Returns `None` without a usable identifier or time.
    pub fn from_deposit(deposit: &DepositRecord) -> Option<Self> {
        let key = deposit
            .id
            .as_deref()
            .or(deposit.tx_id.as_deref())
            .filter(|k| !k.is_empty())?;
        let time = DateTime::from_timestamp_millis(deposit.insert_time)?;

        let mut record = AccountRecord::new(
            format!("deposit:{}", key),
            RecordKind::Deposit,
            time,
            deposit.coin.clone(),
            deposit.amount,
        );
        record.comment = transfer_comment(deposit.network.as_deref(), deposit.tx_id.as_deref());
        Some(record)
    }

    /// Convert a withdrawal row. Returns `None` if `applyTime` cannot be parsed.
    pub fn from_withdrawal(withdrawal: &WithdrawRecord) -> Option<Self> {
        let time = withdrawal.applied_at()?;

        let mut record = AccountRecord::new(
            format!("withdrawal:{}", withdrawal.id),
            RecordKind::Withdrawal,
            time,
            withdrawal.coin.clone(),
            withdrawal.amount,
        );
        record.fee_currency = Some(withdrawal.coin.clone());
        record.fee_amount = Some(withdrawal.transaction_fee.abs());
        record.comment = transfer_comment(
            withdrawal.network.as_deref(),
            withdrawal.tx_id.as_deref(),
        );
        Some(record)
    }

    /// One record per asset with a non-zero total, stamped with the account update time
    pub fn balance_snapshot(account: &AccountInfo) -> Vec<Self> {
        let Some(time) = DateTime::from_timestamp_millis(account.update_time) else {
            return Vec::new();
        };

        account
            .balances
            .iter()
            .filter(|b| !b.total().is_zero())
            .map(|b| {
                let mut record = AccountRecord::new(
                    format!("balance:{}:{}", b.asset, account.update_time),
                    RecordKind::Balance,
                    time,
                    b.asset.clone(),
                    b.total(),
                );
                record.comment = format!("free {} locked {}", b.free, b.locked);
                record
            })
            .collect()
    }

    /// Exchange trade ID, for trade records
    pub fn trade_id(&self) -> Option<u64> {
        if self.kind != RecordKind::Trade {
            return None;
        }
        self.id.rsplit(':').next()?.parse().ok()
    }
}

/// An empty CSV field reads back as `None`, so never store `Some("")`
fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn transfer_comment(network: Option<&str>, tx_id: Option<&str>) -> String {
    match (network, tx_id) {
        (Some(n), Some(tx)) if !tx.is_empty() => format!("{} tx {}", n, tx),
        (Some(n), _) => n.to_string(),
        (None, Some(tx)) => format!("tx {}", tx),
        (None, None) => String::new(),
    }
}

impl fmt::Display for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<10} {} {}",
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.amount,
            self.asset
        )?;
        if let (Some(symbol), Some(side)) = (&self.symbol, &self.side) {
            write!(f, " ({:?} {})", side, symbol)?;
        }
        Ok(())
    }
}

/// Resume point for each history endpoint, derived from stored records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryCursor {
    pub last_trade_ids: HashMap<String, u64>,
    pub last_deposit: Option<DateTime<Utc>>,
    pub last_withdrawal: Option<DateTime<Utc>>,
}

impl HistoryCursor {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AccountRecord>) -> Self {
        let mut cursor = HistoryCursor::default();
        for record in records {
            cursor.observe(record);
        }
        cursor
    }

    /// Advance the cursor past `record`
    pub fn observe(&mut self, record: &AccountRecord) {
        match record.kind {
            RecordKind::Trade => {
                if let (Some(symbol), Some(id)) = (&record.symbol, record.trade_id()) {
                    let last = self.last_trade_ids.entry(symbol.clone()).or_insert(id);
                    *last = (*last).max(id);
                }
            }
            RecordKind::Deposit => {
                self.last_deposit = self.last_deposit.max(Some(record.time));
            }
            RecordKind::Withdrawal => {
                self.last_withdrawal = self.last_withdrawal.max(Some(record.time));
            }
            RecordKind::Balance => {}
        }
    }

    /// `fromId` for the next `myTrades` request on `symbol`
    pub fn next_trade_id(&self, symbol: &str) -> Option<u64> {
        self.last_trade_ids.get(symbol).map(|id| id + 1)
    }
}
