//! Run statistics.

use crate::error::Result;
use serde::Serialize;
use std::fmt;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Data rows loaded.
    pub total: usize,
    /// Rows skipped for missing required fields.
    pub skipped: usize,
    /// Rows that failed to render or send.
    pub errors: usize,
    /// Recipients skipped because they were already sent to.
    pub already_sent: usize,
    /// Rows whose message was delivered.
    pub sent_rows: usize,
    /// Recipient addresses delivered to.
    pub sent_addresses: usize,
}

impl Statistics {
    /// Fresh counters for `total` rows.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total rows: {}, sent rows: {}, sent addresses: {}, already sent: {}, skipped: {}, errors: {}",
            self.total,
            self.sent_rows,
            self.sent_addresses,
            self.already_sent,
            self.skipped,
            self.errors
        )
    }
}

/// Outcome of a run: the counters, always, and the error that ended it early.
#[derive(Debug)]
pub struct RunReport {
    /// Counters up to the point the run stopped.
    pub stats: Statistics,
    /// `Err` with the terminating error if the run did not finish.
    pub result: Result<()>,
}

impl RunReport {
    /// Returns true if every row was processed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.result.is_ok()
    }
}
