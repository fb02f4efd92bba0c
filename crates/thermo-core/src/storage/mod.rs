pub mod history;
pub mod record;
pub mod recorder;
pub mod sd_card;

mod reader;

pub use history::*;
pub use record::*;
pub use recorder::*;

extern crate alloc;
use alloc::vec::Vec;

/// Trailing time window for history aggregation
///
/// Each window looks back a fixed period from "now" and averages samples
/// into fixed-width bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// 1 hour window (12 x 5m bins)
    LastHour,
    /// 1 day window (24 x 1h bins)
    LastDay,
    /// 30 day window (30 x 1d bins)
    LastMonth,
}

impl TimeWindow {
    /// Resolve the numeric mode used by the history request.
    ///
    /// Anything other than 1 or 2 resolves to the widest window.
    pub const fn from_mode(mode: i32) -> Self {
        match mode {
            1 => Self::LastHour,
            2 => Self::LastDay,
            _ => Self::LastMonth,
        }
    }

    pub const fn mode(self) -> i32 {
        match self {
            Self::LastHour => 1,
            Self::LastDay => 2,
            Self::LastMonth => 3,
        }
    }

    /// How far back from "now" the window reaches, in seconds
    pub const fn period_secs(self) -> u32 {
        match self {
            Self::LastHour => 3600,
            Self::LastDay => 86400,
            Self::LastMonth => 2_592_000,
        }
    }

    /// Width of one aggregation bin, in seconds
    pub const fn bin_secs(self) -> u32 {
        match self {
            Self::LastHour => 300,
            Self::LastDay => 3600,
            Self::LastMonth => 86400,
        }
    }

    /// Upper bound on the number of points for well-ordered input
    pub const fn max_points(self) -> usize {
        self.period_secs().div_ceil(self.bin_secs()) as usize
    }
}

/// Append-capable byte store holding the telemetry log
///
/// The log is only ever extended, read sequentially, or cleared as a whole.
/// Implementations open, act and close per call so no handle outlives a
/// single bounded I/O operation.
pub trait LogStore {
    type Error: core::fmt::Debug;

    /// Append `bytes` to the end of the log, creating it if absent.
    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns `Ok(0)` at end of log and an error if the log cannot be opened.
    /// Scans call this with each offset following the previous read, so a
    /// backend may keep the log open until end of log or the next write.
    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Total size of the log in bytes. Errors if the log cannot be opened.
    fn size(&mut self) -> Result<u32, Self::Error>;

    /// Remove every record. Clearing an absent log succeeds.
    fn clear(&mut self) -> Result<(), Self::Error>;
}

/// Error reported by [`MemoryLogStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLogError {
    /// No log has been written since creation or the last clear
    Missing,
}

/// RAM-backed log store
///
/// Mirrors a flash file: absent until the first append, removed by `clear`.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogStore {
    bytes: Option<Vec<u8>>,
}

impl MemoryLogStore {
    pub const fn new() -> Self {
        Self { bytes: None }
    }

    /// Create a store pre-filled with raw log text
    pub fn with_contents(contents: &[u8]) -> Self {
        Self {
            bytes: Some(contents.to_vec()),
        }
    }

    /// Raw log contents, `None` if the log does not exist
    pub fn contents(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }
}

impl LogStore for MemoryLogStore {
    type Error = MemoryLogError;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.bytes.get_or_insert_with(Vec::new).extend_from_slice(bytes);
        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let bytes = self.bytes.as_ref().ok_or(MemoryLogError::Missing)?;
        let start = (offset as usize).min(bytes.len());
        let count = buf.len().min(bytes.len() - start);
        buf[..count].copy_from_slice(&bytes[start..start + count]);
        Ok(count)
    }

    fn size(&mut self) -> Result<u32, Self::Error> {
        self.bytes
            .as_ref()
            .map(|bytes| bytes.len() as u32)
            .ok_or(MemoryLogError::Missing)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.bytes = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_parameters() {
        assert_eq!(TimeWindow::from_mode(1).period_secs(), 3600);
        assert_eq!(TimeWindow::from_mode(1).bin_secs(), 300);
        assert_eq!(TimeWindow::from_mode(2).period_secs(), 86400);
        assert_eq!(TimeWindow::from_mode(2).bin_secs(), 3600);
        assert_eq!(TimeWindow::from_mode(3).period_secs(), 2_592_000);
        assert_eq!(TimeWindow::from_mode(3).bin_secs(), 86400);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_widest_window() {
        assert_eq!(TimeWindow::from_mode(0), TimeWindow::LastMonth);
        assert_eq!(TimeWindow::from_mode(-7), TimeWindow::LastMonth);
        assert_eq!(TimeWindow::from_mode(42), TimeWindow::LastMonth);
    }

    #[test]
    fn test_max_points() {
        assert_eq!(TimeWindow::LastHour.max_points(), 12);
        assert_eq!(TimeWindow::LastDay.max_points(), 24);
        assert_eq!(TimeWindow::LastMonth.max_points(), 30);
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let mut store = MemoryLogStore::new();
        let mut buf = [0u8; 8];
        assert_eq!(store.size(), Err(MemoryLogError::Missing));
        assert_eq!(store.read_at(0, &mut buf), Err(MemoryLogError::Missing));

        store.append(b"abc").unwrap();
        store.append(b"def").unwrap();
        assert_eq!(store.size(), Ok(6));
        assert_eq!(store.read_at(2, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"cdef");
        assert_eq!(store.read_at(6, &mut buf), Ok(0));

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.contents(), None);
    }
}
