use log::{debug, info, warn};

use super::reader::LineReader;
use super::{Checkpoint, HistoryPoint, LogStore, Sample, TimeWindow, aggregate};

extern crate alloc;
use alloc::vec::Vec;

/// Line count and byte size of the telemetry log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogStats {
    pub line_count: u32,
    pub byte_size: u32,
}

impl LogStats {
    /// Size rounded down to whole KiB, as shown on the status page
    pub const fn size_kib(&self) -> u32 {
        self.byte_size / 1024
    }
}

/// Owner of the telemetry log
///
/// Appends one record per logging tick and serves history and statistics
/// scans over the same store. Every operation recovers storage failures
/// locally; callers only ever see "no data".
pub struct TelemetryRecorder<S: LogStore> {
    store: S,
}

impl<S: LogStore> TelemetryRecorder<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Append one sample to the log.
    ///
    /// Performs exactly one append and never retries. If the store cannot be
    /// opened the sample is dropped.
    pub fn record(&mut self, timestamp: u32, temperature: f32) {
        let line = Sample::new(timestamp, temperature).to_line();
        match self.store.append(line.as_bytes()) {
            Ok(()) => debug!("Logged {}", line.trim_end()),
            Err(e) => warn!("Dropped sample at {}: {:?}", timestamp, e),
        }
    }

    /// Truncate the log to empty. Calling it twice is harmless.
    pub fn clear(&mut self) {
        match self.store.clear() {
            Ok(()) => info!("Telemetry log cleared"),
            Err(e) => warn!("Failed to clear telemetry log: {:?}", e),
        }
    }

    /// Count lines and measure size with a full scan.
    ///
    /// An absent log reports zero for both.
    pub async fn stats<C: Checkpoint>(&mut self, checkpoint: &mut C) -> LogStats {
        let Ok(byte_size) = self.store.size() else {
            return LogStats::default();
        };

        let mut line_count = 0;
        let mut reader = LineReader::new(&mut self.store);
        loop {
            match reader.next_line() {
                Ok(Some(_)) => line_count += 1,
                Ok(None) => break,
                Err(e) => {
                    warn!("Log line count stopped at {}: {:?}", line_count, e);
                    break;
                }
            }
            checkpoint.checkpoint().await;
        }

        LogStats {
            line_count,
            byte_size,
        }
    }

    /// Aggregate the trailing `window` ending at `now`.
    pub async fn history<C: Checkpoint>(
        &mut self,
        window: TimeWindow,
        now: u32,
        checkpoint: &mut C,
    ) -> Vec<HistoryPoint> {
        aggregate(&mut self.store, window, now, checkpoint).await
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
