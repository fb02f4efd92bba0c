//! Windowed history aggregation over the telemetry log
//!
//! The whole log is streamed once per request. Records inside the requested
//! trailing window are averaged into fixed-width bins and each closed bin
//! becomes one [`HistoryPoint`]. Only the open bin and the output list are
//! held in memory, so cost scales with log size in time but not in RAM.
//!
//! The scan can run for a long time on a full flash, so it awaits a
//! [`Checkpoint`] after every record to let the host scheduler service the
//! network stack and watchdog.

use core::fmt::Write;
use core::future::Future;

use log::{debug, warn};
use serde::Serialize;

use super::reader::{Line, LineReader};
use super::{LogStore, TimeWindow, parse_record};
use crate::time::CalendarTime;

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

/// Capacity of the short axis label (`"23:55"`, `"31/12"`)
pub const SHORT_LABEL_LEN: usize = 8;
/// Capacity of the full label (`"2106/12/31 23:59"`)
pub const FULL_LABEL_LEN: usize = 20;

/// Suspension point inserted between records of a long scan
pub trait Checkpoint {
    fn checkpoint(&mut self) -> impl Future<Output = ()>;
}

/// Yield to the executor once per record
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldNow;

impl Checkpoint for YieldNow {
    async fn checkpoint(&mut self) {
        embassy_futures::yield_now().await;
    }
}

/// Never suspend; for hosts where the scan may run to completion
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl Checkpoint for NoYield {
    async fn checkpoint(&mut self) {}
}

/// One averaged bin of history, ready for the chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Axis label, format depends on the window
    #[serde(rename = "l")]
    pub label: heapless::String<SHORT_LABEL_LEN>,
    /// Full `Y/M/D H:M` label of the first sample in the bin
    #[serde(rename = "f")]
    pub full_label: heapless::String<FULL_LABEL_LEN>,
    /// Mean temperature of the bin in °C
    #[serde(rename = "t")]
    pub mean_temperature: f32,
}

impl HistoryPoint {
    fn new(window: TimeWindow, first_timestamp: u32, mean_temperature: f32) -> Self {
        let dt = CalendarTime::from_unix(first_timestamp);

        let mut label = heapless::String::new();
        // Calendar fields are bounded, both labels always fit.
        let _ = match window {
            TimeWindow::LastHour => write!(label, "{}:{:02}", dt.hour, dt.minute),
            TimeWindow::LastDay => write!(label, "{}:00", dt.hour),
            TimeWindow::LastMonth => write!(label, "{}/{}", dt.day, dt.month),
        };

        let mut full_label = heapless::String::new();
        let _ = write!(
            full_label,
            "{}/{}/{} {}:{}",
            dt.year, dt.month, dt.day, dt.hour, dt.minute
        );

        Self {
            label,
            full_label,
            mean_temperature,
        }
    }
}

/// Transient accumulator for the bin currently being filled
#[derive(Debug, Clone, Copy)]
struct Bucket {
    index: u32,
    first_timestamp: u32,
    sum: f32,
    count: u32,
}

impl Bucket {
    const fn open(index: u32, first_timestamp: u32) -> Self {
        Self {
            index,
            first_timestamp,
            sum: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, temperature: f32) {
        self.sum += temperature;
        self.count += 1;
    }

    fn close(self, window: TimeWindow) -> Option<HistoryPoint> {
        (self.count > 0).then(|| {
            HistoryPoint::new(window, self.first_timestamp, self.sum / self.count as f32)
        })
    }
}

/// Stream the log once and average in-window records into bins.
///
/// Records at or before `now - period` are ignored. Points come out in the
/// order bins were closed, which is chronological for a well-ordered log. An
/// absent, empty or unreadable log yields no points.
pub async fn aggregate<S, C>(
    store: &mut S,
    window: TimeWindow,
    now: u32,
    checkpoint: &mut C,
) -> Vec<HistoryPoint>
where
    S: LogStore,
    C: Checkpoint,
{
    let cutoff = i64::from(now) - i64::from(window.period_secs());
    let bin = window.bin_secs();

    let mut points = Vec::with_capacity(window.max_points());
    let mut bucket: Option<Bucket> = None;
    let mut reader = LineReader::new(store);
    let mut records = 0usize;

    loop {
        let sample = match reader.next_line() {
            Ok(Some(Line::Complete(line))) => parse_record(line),
            Ok(Some(Line::Oversized)) => None,
            Ok(None) => break,
            Err(e) => {
                if records > 0 {
                    warn!("History scan stopped after {} records: {:?}", records, e);
                } else {
                    debug!("Telemetry log unavailable: {:?}", e);
                }
                break;
            }
        };
        records += 1;

        if let Some(sample) = sample
            && i64::from(sample.timestamp) > cutoff
        {
            let index = sample.timestamp / bin;
            let open = bucket.get_or_insert(Bucket::open(index, sample.timestamp));

            if open.index != index {
                if let Some(point) = open.close(window) {
                    points.push(point);
                }
                *open = Bucket::open(index, sample.timestamp);
            }
            open.add(sample.temperature);
        }

        checkpoint.checkpoint().await;
    }

    if let Some(point) = bucket.and_then(|b| b.close(window)) {
        points.push(point);
    }

    debug!(
        "History mode {}: {} records scanned, {} points",
        window.mode(),
        records,
        points.len()
    );
    points
}

/// Serialize history points as the JSON array served to the chart.
pub fn history_json(points: &[HistoryPoint]) -> String {
    // Labels are plain strings and means are finite, serialization cannot fail.
    serde_json::to_string(points).unwrap_or_else(|_| String::from("[]"))
}
