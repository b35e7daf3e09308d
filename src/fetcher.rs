//! History fetcher
//!
//! Pulls everything newer than a [`HistoryCursor`] from an [`AccountApi`]:
//! trades symbol by symbol, paged forward by trade ID; deposits and
//! withdrawals in 90-day windows; and a balance snapshot. Every request goes
//! through the pacer and the retry policy. Nothing is returned until every
//! request has succeeded, so a failed run never produces a partial batch.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::binance::{
    AccountApi, ExchangeInfo, MAX_TRADES_PER_REQUEST, MAX_TRANSFERS_PER_REQUEST,
    MAX_TRANSFER_WINDOW_DAYS, WEIGHT_ACCOUNT, WEIGHT_CAPITAL_HISTORY, WEIGHT_EXCHANGE_INFO,
    WEIGHT_MY_TRADES,
};
use crate::common::{CircuitBreaker, CircuitBreakerConfig, RequestPacer, RetryPolicy};
use crate::config::RunConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{AccountRecord, HistoryCursor, RecordKind, SymbolPair};

/// Transfers are rescanned this far behind the cursor on every pass
pub const TRANSFER_LOOKBACK_DAYS: i64 = 7;

/// Everything fetched in one pass
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<AccountRecord>,
    pub symbols_scanned: usize,
    /// Symbols the exchange rejected (e.g. delisted); their cursor is unchanged
    pub skipped_symbols: Vec<String>,
    /// Blacklisted symbols that turned out to have trades
    pub blacklisted_with_trades: Vec<String>,
}

impl FetchReport {
    pub fn count(&self, kind: RecordKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

/// What the last scan of one transfer kind left unfinished
#[derive(Debug, Clone, Copy, Default)]
struct PendingTransfers {
    scanned: bool,
    /// Oldest transfer that was neither final nor recorded
    since: Option<DateTime<Utc>>,
}

impl PendingTransfers {
    fn after_scan(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        PendingTransfers {
            scanned: true,
            since: times.into_iter().min(),
        }
    }
}

pub struct HistoryFetcher<A: AccountApi> {
    api: A,
    retry: RetryPolicy,
    pacer: Option<RequestPacer>,
    breaker: CircuitBreaker,
    kinds: Vec<RecordKind>,
    symbols: Vec<String>,
    blacklist: HashSet<String>,
    force_all: bool,
    history_start: Option<DateTime<Utc>>,
    show_progress: bool,
    pending_deposits: PendingTransfers,
    pending_withdrawals: PendingTransfers,
}

impl<A: AccountApi> HistoryFetcher<A> {
    /// Fetcher for every record kind and every trading symbol
    pub fn new(api: A) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
            pacer: None,
            breaker: CircuitBreaker::default(),
            kinds: RecordKind::ALL.to_vec(),
            symbols: Vec::new(),
            blacklist: HashSet::new(),
            force_all: false,
            history_start: None,
            show_progress: false,
            pending_deposits: PendingTransfers::default(),
            pending_withdrawals: PendingTransfers::default(),
        }
    }

    pub fn from_config(api: A, config: &RunConfig) -> Self {
        Self::new(api)
            .with_retry_policy(config.retry_policy())
            .with_kinds(config.record_kinds.clone())
            .with_symbols(config.symbols.clone())
            .with_blacklist(config.blacklist.clone())
            .with_history_start(config.history_start_time(Utc::now()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use a fixed pacer instead of one derived from `exchangeInfo`
    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<RecordKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Restrict trades to these pairs; empty means every trading pair
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unique()
            .collect();
        self
    }

    pub fn with_blacklist(mut self, blacklist: Vec<String>) -> Self {
        self.blacklist = blacklist.iter().map(|s| s.trim().to_uppercase()).collect();
        self
    }

    /// Ignore the blacklist when scanning every trading pair
    pub fn force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    pub fn with_history_start(mut self, start: DateTime<Utc>) -> Self {
        self.history_start = Some(start);
        self
    }

    /// Draw a progress bar over the symbols
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn wants(&self, kind: RecordKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Fetch everything newer than `cursor`
    pub fn fetch(&mut self, cursor: &HistoryCursor) -> ExchangeResult<FetchReport> {
        self.fetch_until(cursor, Utc::now())
    }

    /// Fetch everything newer than `cursor`, treating `now` as the current time
    pub fn fetch_until(
        &mut self,
        cursor: &HistoryCursor,
        now: DateTime<Utc>,
    ) -> ExchangeResult<FetchReport> {
        if !self.breaker.can_attempt() {
            return Err(ExchangeError::Network(format!(
                "circuit breaker open after {} consecutive failures",
                self.breaker.consecutive_failures()
            )));
        }

        let result = self.fetch_all(cursor, now);
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_retryable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }

    fn fetch_all(
        &mut self,
        cursor: &HistoryCursor,
        now: DateTime<Utc>,
    ) -> ExchangeResult<FetchReport> {
        let exchange_info = self.call("exchangeInfo", WEIGHT_EXCHANGE_INFO, |api| {
            api.exchange_info()
        })?;
        if self.pacer.is_none() {
            self.pacer = Some(RequestPacer::from_rate_limits(&exchange_info.rate_limits));
        }
        let interval = self.pacer.as_ref().map(|p| p.min_interval(WEIGHT_MY_TRADES));
        debug!("Minimum interval between trade requests: {:?}", interval);

        let mut report = FetchReport::default();

        if self.wants(RecordKind::Balance) {
            let account = self.call("account", WEIGHT_ACCOUNT, |api| api.account())?;
            let snapshot = AccountRecord::balance_snapshot(&account);
            info!("Balance snapshot: {} non-zero assets", snapshot.len());
            report.records.extend(snapshot);
        }

        if self.wants(RecordKind::Deposit) {
            let deposits = self.fetch_deposits(cursor, now)?;
            report.records.extend(deposits);
        }

        if self.wants(RecordKind::Withdrawal) {
            let withdrawals = self.fetch_withdrawals(cursor, now)?;
            report.records.extend(withdrawals);
        }

        if self.wants(RecordKind::Trade) {
            let pairs = self.select_symbols(&exchange_info);
            self.fetch_trades(&pairs, cursor, &mut report)?;
        }

        info!(
            "Fetched {} records ({} trades, {} deposits, {} withdrawals, {} balances)",
            report.records.len(),
            report.count(RecordKind::Trade),
            report.count(RecordKind::Deposit),
            report.count(RecordKind::Withdrawal),
            report.count(RecordKind::Balance)
        );
        Ok(report)
    }

    /// Paced, retried request
    fn call<T>(
        &mut self,
        what: &str,
        weight: u32,
        mut op: impl FnMut(&A) -> ExchangeResult<T>,
    ) -> ExchangeResult<T> {
        let api = &self.api;
        let pacer = &mut self.pacer;
        self.retry.run(what, || {
            if let Some(p) = pacer.as_mut() {
                p.wait(weight);
            }
            op(api)
        })
    }

    /// Configured symbols, or every trading symbol not blacklisted
    fn select_symbols(&self, exchange_info: &ExchangeInfo) -> Vec<SymbolPair> {
        let known: HashMap<&str, SymbolPair> = exchange_info
            .symbols
            .iter()
            .map(|s| (s.symbol.as_str(), SymbolPair::from(s)))
            .collect();

        if !self.symbols.is_empty() {
            return self
                .symbols
                .iter()
                .map(|s| match known.get(s.as_str()) {
                    Some(pair) => pair.clone(),
                    None => {
                        warn!("{} is not listed on the exchange, guessing its assets", s);
                        SymbolPair::guess(s)
                    }
                })
                .collect();
        }

        let skip_blacklist = self.force_all || self.blacklist.is_empty();
        if !skip_blacklist {
            info!("Skipping {} blacklisted symbols", self.blacklist.len());
        }

        exchange_info
            .active_symbols()
            .filter(|s| skip_blacklist || !self.blacklist.contains(&s.symbol))
            .map(SymbolPair::from)
            .collect()
    }

    fn fetch_trades(
        &mut self,
        pairs: &[SymbolPair],
        cursor: &HistoryCursor,
        report: &mut FetchReport,
    ) -> ExchangeResult<()> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(pairs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] ✓ {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█░ "),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut total = 0;
        for pair in pairs {
            pb.set_message(pair.symbol.clone());

            if !self.breaker.can_attempt() {
                pb.abandon();
                return Err(ExchangeError::Network(format!(
                    "circuit breaker open after {} consecutive failed symbols",
                    self.breaker.consecutive_failures()
                )));
            }

            match self.fetch_symbol_trades(pair, cursor) {
                Ok(trades) => {
                    self.breaker.record_success();
                    if !trades.is_empty() {
                        pb.println(format!("{} : {}", pair.symbol, trades.len()));
                        if self.blacklist.contains(&pair.symbol) {
                            warn!(
                                "{} is blacklisted but has {} new trades",
                                pair.symbol,
                                trades.len()
                            );
                            report.blacklisted_with_trades.push(pair.symbol.clone());
                        }
                    }
                    total += trades.len();
                    report.records.extend(trades);
                }
                Err(ExchangeError::Api { code, message }) => {
                    warn!("Skipping {}: Binance API error {}: {}", pair.symbol, code, message);
                    self.breaker.record_failure();
                    report.skipped_symbols.push(pair.symbol.clone());
                }
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                }
            }

            report.symbols_scanned += 1;
            pb.inc(1);
        }

        pb.finish_with_message(format!("{} trades", total));
        info!("{} trades across {} symbols", total, pairs.len());
        Ok(())
    }

    /// Page forward from the cursor while pages come back full
    fn fetch_symbol_trades(
        &mut self,
        pair: &SymbolPair,
        cursor: &HistoryCursor,
    ) -> ExchangeResult<Vec<AccountRecord>> {
        let mut from_id = cursor.next_trade_id(&pair.symbol).unwrap_or(0);
        let mut records = Vec::new();

        loop {
            let page = self.call(&format!("myTrades {}", pair.symbol), WEIGHT_MY_TRADES, |api| {
                api.my_trades(&pair.symbol, Some(from_id), MAX_TRADES_PER_REQUEST)
            })?;
            let full = page.len() >= MAX_TRADES_PER_REQUEST as usize;

            let Some(last_id) = page.iter().map(|t| t.id).max() else {
                break;
            };

            for trade in &page {
                match AccountRecord::from_trade(trade, pair) {
                    Some(record) => records.push(record),
                    None => warn!("Dropping trade {} on {}: bad timestamp", trade.id, pair.symbol),
                }
            }

            if !full {
                break;
            }
            from_id = last_id + 1;
        }

        Ok(records)
    }

    /// Windows of at most 90 days from `start` up to `now`
    fn transfer_windows(
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let step = ChronoDuration::days(MAX_TRANSFER_WINDOW_DAYS);
        let mut windows = Vec::new();
        let mut from = start;
        while from < now {
            let to = (from + step).min(now);
            windows.push((from, to));
            from = to;
        }
        windows
    }

    /// Where a transfer scan begins
    ///
    /// Transfers that were pending on an earlier run were never stored, so
    /// the first scan in a process goes back to the history start. Later
    /// scans resume a lookback behind the cursor, or at the oldest transfer
    /// the previous scan saw pending if that is earlier.
    fn transfer_start(
        &self,
        pending: PendingTransfers,
        last_seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let floor = self
            .history_start
            .unwrap_or_else(|| now - ChronoDuration::days(MAX_TRANSFER_WINDOW_DAYS));
        let Some(last) = last_seen else {
            return floor;
        };

        let resume = last - ChronoDuration::days(TRANSFER_LOOKBACK_DAYS);
        if !pending.scanned {
            return resume.min(floor);
        }
        pending.since.map_or(resume, |since| resume.min(since))
    }

    /// Every row in `[from, to)`, following `offset` while pages come back full
    fn transfer_pages<T>(
        &mut self,
        what: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        mut page: impl FnMut(&A, DateTime<Utc>, DateTime<Utc>, u32) -> ExchangeResult<Vec<T>>,
    ) -> ExchangeResult<Vec<T>> {
        let mut rows = Vec::new();
        loop {
            let offset = rows.len() as u32;
            let batch = self.call(what, WEIGHT_CAPITAL_HISTORY, |api| {
                page(api, from, to, offset)
            })?;
            let full = batch.len() >= MAX_TRANSFERS_PER_REQUEST as usize;
            rows.extend(batch);
            if !full {
                break;
            }
            debug!(
                "{} from {} to {} filled a page, continuing at offset {}",
                what,
                from.date_naive(),
                to.date_naive(),
                rows.len()
            );
        }
        Ok(rows)
    }

    fn fetch_deposits(
        &mut self,
        cursor: &HistoryCursor,
        now: DateTime<Utc>,
    ) -> ExchangeResult<Vec<AccountRecord>> {
        let start = self.transfer_start(self.pending_deposits, cursor.last_deposit, now);
        let mut records = Vec::new();
        let mut pending = Vec::new();

        for (from, to) in Self::transfer_windows(start, now) {
            let rows = self.transfer_pages("deposit history", from, to, |api, from, to, offset| {
                api.deposit_history(from, to, offset)
            })?;

            for deposit in &rows {
                if deposit.is_pending() {
                    pending.extend(DateTime::from_timestamp_millis(deposit.insert_time));
                    continue;
                }
                if !deposit.is_credited() {
                    continue;
                }
                match AccountRecord::from_deposit(deposit) {
                    Some(record) => records.push(record),
                    None => warn!("Dropping {} deposit without id or valid time", deposit.coin),
                }
            }
        }

        self.pending_deposits = PendingTransfers::after_scan(pending);
        if let Some(since) = self.pending_deposits.since {
            info!("Deposits not yet credited since {}, will rescan", since);
        }
        debug!("{} credited deposits since {}", records.len(), start);
        Ok(records)
    }

    fn fetch_withdrawals(
        &mut self,
        cursor: &HistoryCursor,
        now: DateTime<Utc>,
    ) -> ExchangeResult<Vec<AccountRecord>> {
        let start = self.transfer_start(self.pending_withdrawals, cursor.last_withdrawal, now);
        let mut records = Vec::new();
        let mut pending = Vec::new();

        for (from, to) in Self::transfer_windows(start, now) {
            let rows = self.transfer_pages("withdraw history", from, to, |api, from, to, offset| {
                api.withdraw_history(from, to, offset)
            })?;

            for withdrawal in &rows {
                if withdrawal.is_pending() {
                    pending.extend(withdrawal.applied_at());
                    continue;
                }
                if !withdrawal.is_completed() {
                    continue;
                }
                match AccountRecord::from_withdrawal(withdrawal) {
                    Some(record) => records.push(record),
                    None => warn!(
                        "Dropping withdrawal {}: unparseable applyTime {}",
                        withdrawal.id, withdrawal.apply_time
                    ),
                }
            }
        }

        self.pending_withdrawals = PendingTransfers::after_scan(pending);
        if let Some(since) = self.pending_withdrawals.since {
            info!("Withdrawals in progress since {}, will rescan", since);
        }
        debug!("{} completed withdrawals since {}", records.len(), start);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::{AccountInfo, DepositRecord, MyTrade, SymbolInfo, WithdrawRecord};
    use rust_decimal_macros::dec;
    use std::cell::RefCell;

    /// In-memory exchange with a fixed trade list per symbol
    #[derive(Default)]
    struct FakeExchange {
        symbols: Vec<SymbolInfo>,
        trades: HashMap<String, Vec<MyTrade>>,
        page_size: usize,
        trade_calls: RefCell<Vec<(String, Option<u64>)>>,
        deposits: Vec<DepositRecord>,
        deposit_calls: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>, u32)>>,
        withdrawals: Vec<WithdrawRecord>,
        withdraw_calls: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>, u32)>>,
        rejected: HashSet<String>,
    }

    impl FakeExchange {
        fn with_symbols(names: &[&str]) -> Self {
            let symbols = names
                .iter()
                .map(|n| {
                    let pair = SymbolPair::guess(n);
                    SymbolInfo {
                        symbol: pair.symbol,
                        status: "TRADING".to_string(),
                        base_asset: pair.base,
                        quote_asset: pair.quote,
                    }
                })
                .collect();
            FakeExchange {
                symbols,
                page_size: MAX_TRADES_PER_REQUEST as usize,
                ..Default::default()
            }
        }

        fn add_trades(&mut self, symbol: &str, ids: impl IntoIterator<Item = u64>) {
            let trades = ids
                .into_iter()
                .map(|id| MyTrade {
                    symbol: symbol.to_string(),
                    id,
                    order_id: id as i64,
                    price: dec!(100),
                    qty: dec!(1),
                    quote_qty: None,
                    commission: dec!(0.1),
                    commission_asset: "BNB".to_string(),
                    time: 1_600_000_000_000 + id as i64,
                    is_buyer: id % 2 == 0,
                    is_maker: false,
                })
                .collect();
            self.trades.insert(symbol.to_string(), trades);
        }
    }

    impl AccountApi for FakeExchange {
        fn server_time(&self) -> ExchangeResult<i64> {
            Ok(1_600_000_000_000)
        }

        fn exchange_info(&self) -> ExchangeResult<ExchangeInfo> {
            Ok(ExchangeInfo {
                server_time: 1_600_000_000_000,
                rate_limits: Vec::new(),
                symbols: self.symbols.clone(),
            })
        }

        fn account(&self) -> ExchangeResult<AccountInfo> {
            Ok(AccountInfo {
                update_time: 1_600_000_000_000,
                account_type: None,
                can_trade: true,
                balances: Vec::new(),
            })
        }

        fn my_trades(
            &self,
            symbol: &str,
            from_id: Option<u64>,
            limit: u32,
        ) -> ExchangeResult<Vec<MyTrade>> {
            self.trade_calls
                .borrow_mut()
                .push((symbol.to_string(), from_id));
            if self.rejected.contains(symbol) {
                return Err(ExchangeError::Api {
                    code: -1121,
                    message: "Invalid symbol.".to_string(),
                });
            }
            let from = from_id.unwrap_or(0);
            let page = (limit as usize).min(self.page_size);
            Ok(self
                .trades
                .get(symbol)
                .map(|all| {
                    all.iter()
                        .filter(|t| t.id >= from)
                        .take(page)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn deposit_history(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            offset: u32,
        ) -> ExchangeResult<Vec<DepositRecord>> {
            self.deposit_calls.borrow_mut().push((start, end, offset));
            let (start, end) = (start.timestamp_millis(), end.timestamp_millis());
            Ok(self
                .deposits
                .iter()
                .filter(|d| d.insert_time >= start && d.insert_time < end)
                .skip(offset as usize)
                .take(MAX_TRANSFERS_PER_REQUEST as usize)
                .cloned()
                .collect())
        }

        fn withdraw_history(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            offset: u32,
        ) -> ExchangeResult<Vec<WithdrawRecord>> {
            self.withdraw_calls.borrow_mut().push((start, end, offset));
            Ok(self
                .withdrawals
                .iter()
                .filter(|w| w.applied_at().is_some_and(|t| t >= start && t < end))
                .skip(offset as usize)
                .take(MAX_TRANSFERS_PER_REQUEST as usize)
                .cloned()
                .collect())
        }
    }

    fn only(kind: RecordKind, api: FakeExchange) -> HistoryFetcher<FakeExchange> {
        HistoryFetcher::new(api)
            .with_kinds(vec![kind])
            .with_retry_policy(RetryPolicy::immediate(0))
            .with_pacer(RequestPacer::unlimited())
    }

    fn trades_only(api: FakeExchange) -> HistoryFetcher<FakeExchange> {
        only(RecordKind::Trade, api)
    }

    fn deposit(id: u64, status: i32, insert_time: DateTime<Utc>) -> DepositRecord {
        DepositRecord {
            id: Some(id.to_string()),
            amount: dec!(1),
            coin: "BTC".to_string(),
            network: None,
            status,
            tx_id: None,
            insert_time: insert_time.timestamp_millis(),
        }
    }

    fn withdrawal(id: &str, status: i32, applied: DateTime<Utc>) -> WithdrawRecord {
        WithdrawRecord {
            id: id.to_string(),
            amount: dec!(5),
            transaction_fee: dec!(0.1),
            coin: "USDT".to_string(),
            status,
            network: None,
            tx_id: None,
            apply_time: applied.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    #[test]
    fn test_trades_page_forward_from_cursor() {
        let mut api = FakeExchange::with_symbols(&["BTCUSDT"]);
        api.add_trades("BTCUSDT", 1..=2500);
        let mut fetcher = trades_only(api);

        let mut cursor = HistoryCursor::default();
        cursor.last_trade_ids.insert("BTCUSDT".to_string(), 10);

        let report = fetcher.fetch(&cursor).unwrap();
        assert_eq!(report.records.len(), 2490);
        assert_eq!(report.records[0].id, "trade:BTCUSDT:11");

        let calls = fetcher.api().trade_calls.borrow();
        let from_ids: Vec<Option<u64>> = calls.iter().map(|(_, f)| *f).collect();
        assert_eq!(from_ids, vec![Some(11), Some(1011), Some(2011)]);
    }

    #[test]
    fn test_blacklist_and_force_all() {
        let api = FakeExchange::with_symbols(&["BTCUSDT", "ETHBTC", "LTCBTC"]);
        let mut fetcher = trades_only(api).with_blacklist(vec!["ethbtc".to_string()]);
        fetcher.fetch(&HistoryCursor::default()).unwrap();
        let scanned: Vec<String> = fetcher
            .api()
            .trade_calls
            .borrow()
            .iter()
            .map(|(s, _)| s.clone())
            .collect();
        assert_eq!(scanned, ["BTCUSDT", "LTCBTC"]);

        let api = FakeExchange::with_symbols(&["BTCUSDT", "ETHBTC"]);
        let mut fetcher = trades_only(api)
            .with_blacklist(vec!["ETHBTC".to_string()])
            .force_all(true);
        let report = fetcher.fetch(&HistoryCursor::default()).unwrap();
        assert_eq!(report.symbols_scanned, 2);
    }

    #[test]
    fn test_configured_symbols_override_listing() {
        let mut api = FakeExchange::with_symbols(&["BTCUSDT", "ETHBTC"]);
        api.add_trades("XYZUSDT", [5]);
        let mut fetcher = trades_only(api).with_symbols(vec![" xyzusdt".to_string()]);

        let report = fetcher.fetch(&HistoryCursor::default()).unwrap();
        assert_eq!(report.symbols_scanned, 1);
        assert_eq!(report.records[0].buy_currency.as_deref(), Some("USDT"));
        assert_eq!(report.records[0].sell_currency.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_rejected_symbol_is_skipped_until_breaker_opens() {
        let mut api = FakeExchange::with_symbols(&["AAAUSDT", "BBBUSDT", "CCCUSDT", "DDDUSDT"]);
        api.rejected = ["AAAUSDT", "BBBUSDT", "CCCUSDT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        api.add_trades("DDDUSDT", [1]);

        let mut fetcher = trades_only(api);
        let report = fetcher.fetch(&HistoryCursor::default()).unwrap();
        assert_eq!(report.skipped_symbols.len(), 3);
        assert_eq!(report.records.len(), 1);

        let mut api = FakeExchange::with_symbols(&["AAAUSDT", "BBBUSDT", "CCCUSDT"]);
        api.rejected = ["AAAUSDT", "BBBUSDT"].iter().map(|s| s.to_string()).collect();
        let mut fetcher = trades_only(api).with_circuit_breaker(
            CircuitBreakerConfig::default().with_failure_threshold(2),
        );
        assert!(matches!(
            fetcher.fetch(&HistoryCursor::default()),
            Err(ExchangeError::Network(_))
        ));
        assert!(fetcher.breaker().is_open());
    }

    #[test]
    fn test_transfer_windows_span_history() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let start = now - ChronoDuration::days(200);
        let windows = HistoryFetcher::<FakeExchange>::transfer_windows(start, now);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, start);
        assert_eq!(windows[2].1, now);
        assert!(windows.windows(2).all(|w| w[0].1 == w[1].0));
    }

    #[test]
    fn test_first_scan_covers_history_then_resumes_near_cursor() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let history_start = now - ChronoDuration::days(30);
        let last = now - ChronoDuration::days(2);
        let cursor = HistoryCursor {
            last_deposit: Some(last),
            ..Default::default()
        };

        let mut fetcher = only(RecordKind::Deposit, FakeExchange::with_symbols(&[]))
            .with_history_start(history_start);
        fetcher.fetch_until(&cursor, now).unwrap();
        fetcher.fetch_until(&cursor, now).unwrap();

        let calls = fetcher.api().deposit_calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (history_start, now, 0));
        assert_eq!(
            calls[1],
            (last - ChronoDuration::days(TRANSFER_LOOKBACK_DAYS), now, 0)
        );
    }

    #[test]
    fn test_pending_withdrawal_older_than_lookback_is_rescanned() {
        let day = |d: i64| DateTime::from_timestamp(1_700_000_000 + d * 86_400, 0).unwrap();
        let mut api = FakeExchange::with_symbols(&[]);
        api.withdrawals = vec![withdrawal("wd-2", 4, day(2)), withdrawal("wd-3", 6, day(20))];

        let mut fetcher = only(RecordKind::Withdrawal, api).with_history_start(day(0));
        let first = fetcher.fetch_until(&HistoryCursor::default(), day(21)).unwrap();
        assert_eq!(first.records.len(), 1);

        let cursor = HistoryCursor::from_records(&first.records);
        fetcher.api.withdrawals[0].status = 6;
        let second = fetcher.fetch_until(&cursor, day(40)).unwrap();

        let ids: Vec<&str> = second.records.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"withdrawal:wd-2"));
        let calls = fetcher.api().withdraw_calls.borrow();
        assert_eq!(calls[1].0, day(2));

        drop(calls);
        let third = fetcher.fetch_until(&cursor, day(41)).unwrap();
        assert_eq!(third.records.len(), 1);
        let calls = fetcher.api().withdraw_calls.borrow();
        assert_eq!(
            calls[2].0,
            day(20) - ChronoDuration::days(TRANSFER_LOOKBACK_DAYS)
        );
    }

    #[test]
    fn test_full_transfer_page_is_followed_by_offset() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut api = FakeExchange::with_symbols(&[]);
        api.deposits = (0..2_100)
            .map(|i| deposit(i, 1, now - ChronoDuration::seconds(10_000 - i as i64)))
            .collect();
        api.deposits.push(deposit(9_999, 0, now - ChronoDuration::days(1)));

        let mut fetcher = only(RecordKind::Deposit, api)
            .with_history_start(now - ChronoDuration::days(5));
        let report = fetcher.fetch_until(&HistoryCursor::default(), now).unwrap();

        assert_eq!(report.records.len(), 2_100);
        let offsets: Vec<u32> = fetcher
            .api()
            .deposit_calls
            .borrow()
            .iter()
            .map(|(_, _, offset)| *offset)
            .collect();
        assert_eq!(offsets, vec![0, 1_000, 2_000]);
    }

    #[test]
    fn test_blacklisted_pair_with_trades_is_reported() {
        let mut api = FakeExchange::with_symbols(&["BTCUSDT", "ETHBTC"]);
        api.add_trades("ETHBTC", [1, 2]);
        let mut fetcher = trades_only(api)
            .with_blacklist(vec!["ETHBTC".to_string(), "BTCUSDT".to_string()])
            .force_all(true);

        let report = fetcher.fetch(&HistoryCursor::default()).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.blacklisted_with_trades, vec!["ETHBTC".to_string()]);
    }
}
