//! Migration counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one migration run
///
/// `migrated_ok + failed + skipped` never exceeds `total`; once the run
/// completes they are equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub total: usize,
    pub migrated_ok: usize,
    pub failed: usize,
    pub skipped: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl MigrationStats {
    pub fn start(total: usize) -> Self {
        Self {
            total,
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.migrated_ok + self.failed + self.skipped
    }

    pub fn record_ok(&mut self) {
        self.migrated_ok += 1;
        self.grow_total();
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
        self.grow_total();
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
        self.grow_total();
    }

    // The source may gain records after it was counted.
    fn grow_total(&mut self) {
        self.total = self.total.max(self.processed());
    }

    /// Stamp the end time. A completed run also settles `total` to what was
    /// actually processed.
    pub fn finalize(&mut self, completed: bool) {
        self.end_time = Some(Utc::now());
        if completed {
            self.total = self.processed();
        }
    }

    /// Wall time of the run, up to now if it is still going
    pub fn duration(&self) -> std::time::Duration {
        let Some(start) = self.start_time else {
            return std::time::Duration::ZERO;
        };
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - start).to_std().unwrap_or_default()
    }

    /// Share of processed records that migrated, in [0, 1]
    pub fn success_rate(&self) -> f64 {
        match self.processed() {
            0 => 0.0,
            n => self.migrated_ok as f64 / n as f64,
        }
    }

    /// Processed records per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed() as f64 / secs
    }
}
