//! The account endpoints the monitor needs, as a trait
//!
//! `BinanceClient` is the production implementation; tests drive the fetcher
//! through scripted implementations instead of the network.

use chrono::{DateTime, Utc};

use super::types::{AccountInfo, DepositRecord, ExchangeInfo, MyTrade, WithdrawRecord};
use crate::error::ExchangeResult;

/// Request weight of `/api/v3/myTrades` without `orderId`
pub const WEIGHT_MY_TRADES: u32 = 20;
/// Request weight of `/api/v3/account`
pub const WEIGHT_ACCOUNT: u32 = 20;
/// Request weight of `/api/v3/exchangeInfo`
pub const WEIGHT_EXCHANGE_INFO: u32 = 20;
/// Weight of the capital history endpoints against the IP limit
pub const WEIGHT_CAPITAL_HISTORY: u32 = 1;

pub trait AccountApi {
    /// Exchange server time in milliseconds since the epoch
    fn server_time(&self) -> ExchangeResult<i64>;

    fn exchange_info(&self) -> ExchangeResult<ExchangeInfo>;

    fn account(&self) -> ExchangeResult<AccountInfo>;

    /// Trades for `symbol` with `id >= from_id`, ascending, at most `limit` rows
    fn my_trades(&self, symbol: &str, from_id: Option<u64>, limit: u32)
        -> ExchangeResult<Vec<MyTrade>>;

    /// Deposits inserted in `[start, end)`, skipping the first `offset` rows,
    /// at most `MAX_TRANSFERS_PER_REQUEST` rows
    fn deposit_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
    ) -> ExchangeResult<Vec<DepositRecord>>;

    /// Withdrawals applied in `[start, end)`, paged like `deposit_history`
    fn withdraw_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
    ) -> ExchangeResult<Vec<WithdrawRecord>>;
}
