//! Durable failure log
//!
//! Failures accumulate in an in-memory buffer and are merged into the
//! durable JSON log in batches: immediately for critical records or when
//! the buffer fills, every [`FLUSH_INTERVAL`] from the background task,
//! and once more at orchestrated shutdown. Records between two flush
//! points are lost only on abnormal termination.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::stop::StopFlag;
use crate::store::write_json_atomic;
use crate::types::FailureRecord;

/// Buffer size that forces a flush
const FLUSH_THRESHOLD: usize = 5;

/// Cadence of the background flush task
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(180);

/// Buffered, mutex-guarded failure log
pub struct FailureLedger {
    path: PathBuf,
    buffer: Mutex<Vec<FailureRecord>>,
}

impl FailureLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Append a failure to the buffer.
    ///
    /// Critical records (and a full buffer) trigger an immediate flush so
    /// consequential failures hit disk without waiting for the timer. A
    /// failed flush is logged, never propagated: the records stay buffered
    /// and the next flush retries.
    pub fn record(&self, account: &str, unit_index: i64, message: &str, critical: bool) {
        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(FailureRecord::new(account, unit_index, message));
            critical || buffer.len() >= FLUSH_THRESHOLD
        };

        if should_flush {
            if let Err(e) = self.flush() {
                error!("Failed to flush failure ledger: {}", e);
            }
        }
    }

    /// Merge the buffer into the durable log and clear it.
    ///
    /// The merge reloads the existing log so flushes from earlier process
    /// runs are preserved; the combined list is written atomically.
    pub fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.is_empty() {
            return Ok(());
        }

        let mut existing = self.load_existing();
        existing.append(&mut *buffer);
        write_json_atomic(&self.path, &existing)?;

        debug!("Flushed failure ledger ({} records on disk)", existing.len());
        Ok(())
    }

    /// Number of records currently buffered (not yet durable)
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Read the durable log, tolerating a missing or corrupt file.
    pub fn load(&self) -> Vec<FailureRecord> {
        let _guard = self.buffer.lock().unwrap();
        self.load_existing()
    }

    fn load_existing(&self) -> Vec<FailureRecord> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Failure log {:?} is unparsable, starting fresh: {}", self.path, e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to read failure log {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }

    /// Background task flushing the buffer on a fixed cadence.
    ///
    /// Runs until the stop flag clears; the final shutdown flush is the
    /// orchestrator's responsibility.
    pub async fn run_periodic_flush(self: Arc<Self>, stop: StopFlag) {
        while stop.sleep(FLUSH_INTERVAL).await {
            if let Err(e) = self.flush() {
                error!("Periodic failure-ledger flush failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(dir: &TempDir) -> FailureLedger {
        FailureLedger::new(dir.path().join("failures.json"))
    }

    #[test]
    fn test_records_buffer_below_threshold() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        for i in 0..4 {
            ledger.record("acct1", i, "transient", false);
        }

        // Nothing durable yet
        assert_eq!(ledger.buffered(), 4);
        assert!(!dir.path().join("failures.json").exists());
    }

    #[test]
    fn test_fifth_record_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        for i in 0..5 {
            ledger.record("acct1", i, "transient", false);
        }

        assert_eq!(ledger.buffered(), 0);
        assert_eq!(ledger.load().len(), 5);
    }

    #[test]
    fn test_critical_record_flushes_immediately() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        ledger.record("acct1", 0, "transient", false);
        ledger.record("acct1", 1, "proxy dead", true);

        assert_eq!(ledger.buffered(), 0);
        let records = ledger.load();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "proxy dead");
    }

    #[test]
    fn test_flush_merges_with_existing_log() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        ledger.record("acct1", 0, "first", true);

        // A second ledger over the same file must not clobber history
        let ledger2 = ledger_in(&dir);
        ledger2.record("acct2", 1, "second", true);

        let records = ledger2.load();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].account, "acct1");
        assert_eq!(records[1].account, "acct2");
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        ledger.flush().unwrap();
        assert!(!dir.path().join("failures.json").exists());
    }

    #[test]
    fn test_corrupt_log_tolerated() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("failures.json"), "[[[").unwrap();

        let ledger = ledger_in(&dir);
        ledger.record("acct1", -1, "boom", true);

        assert_eq!(ledger.load().len(), 1);
    }

    #[tokio::test]
    async fn test_periodic_task_exits_on_stop() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(ledger_in(&dir));
        let stop = StopFlag::new();

        let handle = tokio::spawn(ledger.run_periodic_flush(stop.clone()));
        stop.stop();

        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("flush task should observe stop promptly")
            .unwrap();
    }
}
