//! Account monitor: fetch-then-record cycles
//!
//! The cursor is taken from the recorder, the fetcher pulls everything newer,
//! and the recorder appends what it has not seen. A fetch error returns
//! before the recorder is touched.

use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::binance::AccountApi;
use crate::error::MonitorError;
use crate::fetcher::HistoryFetcher;
use crate::recorder::{RecordSummary, Recorder};

/// Result of one [`AccountMonitor::sync`]
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub fetched: usize,
    pub summary: RecordSummary,
    pub symbols_scanned: usize,
    pub skipped_symbols: Vec<String>,
    pub blacklisted_with_trades: Vec<String>,
    pub stored_total: usize,
}

pub struct AccountMonitor<A: AccountApi> {
    fetcher: HistoryFetcher<A>,
    recorder: Recorder,
}

impl<A: AccountApi> AccountMonitor<A> {
    pub fn new(fetcher: HistoryFetcher<A>, recorder: Recorder) -> Self {
        Self { fetcher, recorder }
    }

    pub fn sync(&mut self) -> Result<SyncOutcome, MonitorError> {
        let started = Instant::now();
        let cursor = self.recorder.cursor();

        let report = self.fetcher.fetch(&cursor)?;
        let fetched = report.records.len();
        let summary = self.recorder.record(report.records)?;

        if !report.skipped_symbols.is_empty() {
            warn!(
                "{} symbols skipped: {}",
                report.skipped_symbols.len(),
                report.skipped_symbols.join(", ")
            );
        }
        if !report.blacklisted_with_trades.is_empty() {
            warn!(
                "Blacklisted symbols with trades, consider removing them from the blacklist: {}",
                report.blacklisted_with_trades.join(", ")
            );
        }
        info!(
            "Sync finished in {:.1}s: {} fetched, {} new, {} stored",
            started.elapsed().as_secs_f64(),
            fetched,
            summary.inserted,
            self.recorder.len()
        );

        Ok(SyncOutcome {
            fetched,
            summary,
            symbols_scanned: report.symbols_scanned,
            skipped_symbols: report.skipped_symbols,
            blacklisted_with_trades: report.blacklisted_with_trades,
            stored_total: self.recorder.len(),
        })
    }

    /// Sync every `interval` until `max_cycles` have run, or forever
    ///
    /// Throttling and network failures are logged and retried on the next
    /// cycle. Any other error stops the loop and is returned. Returns the
    /// number of cycles run.
    pub fn run_cycles(
        &mut self,
        max_cycles: Option<u64>,
        interval: Duration,
    ) -> Result<u64, MonitorError> {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            info!("Cycle {} starting", cycle);

            match self.sync() {
                Ok(outcome) => info!(
                    "Cycle {}: {} new records, {} stored",
                    cycle, outcome.summary.inserted, outcome.stored_total
                ),
                Err(e) if e.is_retryable() => {
                    warn!("Cycle {} failed, retrying next cycle: {}", cycle, e);
                }
                Err(e) => {
                    error!("Cycle {} failed: {}", cycle, e);
                    return Err(e);
                }
            }

            if max_cycles.is_some_and(|max| cycle >= max) {
                info!("Stopping after {} cycles", cycle);
                return Ok(cycle);
            }

            std::thread::sleep(interval);
        }
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn fetcher(&self) -> &HistoryFetcher<A> {
        &self.fetcher
    }
}
