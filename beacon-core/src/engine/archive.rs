use crate::prelude::Trade;
use std::collections::VecDeque;

/// Time-ordered record of executed trades, bounded by the Janitor's
/// `ARCHIVE_TTL` sweep (§4.G) rather than a fixed capacity: old entries are
/// dropped by age, not by a ring-buffer overwrite, so `executed_orders()`
/// never silently loses a recent fill under burst load.
#[derive(Debug, Default)]
pub struct ArchiveRing {
    trades: VecDeque<Trade>,
}

impl ArchiveRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a newly-executed trade. Archive order is fill order, which is
    /// always non-decreasing in `timestamp_ns` under the single-threaded
    /// scheduling model (§5).
    pub fn push(&mut self, trade: Trade) {
        self.trades.push_back(trade);
    }

    /// Drops every trade older than `cutoff_ns`, returning how many were
    /// dropped (for the Janitor's tick budget accounting).
    pub fn evict_older_than(&mut self, cutoff_ns: u64) -> usize {
        let before = self.trades.len();
        self.trades.retain(|t| t.timestamp_ns >= cutoff_ns);
        before - self.trades.len()
    }

    /// All trades for `token`, reverse-chronological, per `executed_orders()`.
    pub fn for_token(&self, token: crate::prelude::TokenId) -> Vec<Trade> {
        self.trades.iter().filter(|t| t.token == token).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// One structured diagnostic event retained for the out-of-scope telemetry
/// layer to drain, in addition to being emitted through `tracing`.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp_ns: u64,
    pub level: tracing::Level,
    pub message: String,
}

/// Fixed-capacity ring of the most recent `LOG_RING` structured log entries
/// (§6). The teacher has no equivalent: its telemetry was out of scope
/// entirely, but `LOG_RING` is an explicit configuration constant here, so
/// this keeps a bounded in-memory tail alongside the `tracing` emission.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity.min(1024)) }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
