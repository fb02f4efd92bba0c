//! Wall-clock access and calendar decomposition
//!
//! The node keeps wall-clock time in a battery-backed RTC as Unix seconds.
//! Everything in the core reads it through [`Clock`]; only the set-time
//! request handler needs [`AdjustableClock`].

use chrono::{DateTime, Datelike, NaiveDate, Timelike};

/// Read-only wall-clock source, in seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> u32;
}

/// A clock that can be set, e.g. an RTC adjusted from the web UI.
pub trait AdjustableClock: Clock {
    fn adjust(&mut self, unix_secs: u32);
}

/// Clock whose value only changes when told to. Used by tests and the simulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: u32,
}

impl ManualClock {
    pub const fn new(now: u32) -> Self {
        Self { now }
    }

    pub fn advance(&mut self, secs: u32) {
        self.now = self.now.saturating_add(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now
    }
}

impl AdjustableClock for ManualClock {
    fn adjust(&mut self, unix_secs: u32) {
        self.now = unix_secs;
    }
}

/// Calendar fields of a Unix timestamp (UTC, no timezone handling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CalendarTime {
    /// Decompose seconds since the epoch into calendar fields.
    pub fn from_unix(secs: u32) -> Self {
        // Every u32 is a valid chrono timestamp, the fallback is unreachable.
        let Some(dt) = DateTime::from_timestamp(i64::from(secs), 0) else {
            return Self::default();
        };

        Self {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }
}

/// Parse the `dt` field submitted by the set-time form (`YYYY-MM-DDTHH:MM`).
///
/// Seconds are always set to zero. Returns `None` for anything that does not
/// name a real calendar minute representable as a `u32` timestamp.
pub fn parse_set_time(value: &str) -> Option<u32> {
    let field = |from: usize, to: usize| -> Option<u32> { value.get(from..to)?.parse().ok() };

    let year = field(0, 4)?;
    let month = field(5, 7)?;
    let day = field(8, 10)?;
    let hour = field(11, 13)?;
    let minute = field(14, 16)?;

    let timestamp = NaiveDate::from_ymd_opt(year as i32, month, day)?
        .and_hms_opt(hour, minute, 0)?
        .and_utc()
        .timestamp();

    u32::try_from(timestamp).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_epoch_offsets() {
        let t = CalendarTime::from_unix(1000);
        assert_eq!((t.year, t.month, t.day), (1970, 1, 1));
        assert_eq!((t.hour, t.minute, t.second), (0, 16, 40));
    }

    #[test]
    fn test_calendar_leap_day() {
        // 2024-02-29 13:45:30 UTC
        let t = CalendarTime::from_unix(1_709_214_330);
        assert_eq!((t.year, t.month, t.day), (2024, 2, 29));
        assert_eq!((t.hour, t.minute, t.second), (13, 45, 30));
    }

    #[test]
    fn test_parse_set_time() {
        assert_eq!(parse_set_time("2024-02-29T13:45"), Some(1_709_214_300));
        assert_eq!(parse_set_time("1970-01-01T00:00"), Some(0));
    }

    #[test]
    fn test_parse_set_time_rejects_garbage() {
        assert_eq!(parse_set_time(""), None);
        assert_eq!(parse_set_time("2024-02-30T10:00"), None);
        assert_eq!(parse_set_time("2024-13-01T10:00"), None);
        assert_eq!(parse_set_time("2024-01-01T25:00"), None);
        assert_eq!(parse_set_time("1969-12-31T23:59"), None);
        assert_eq!(parse_set_time("abcd-ef-ghTij:kl"), None);
    }

    #[test]
    fn test_manual_clock() {
        let mut clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now(), 15);
        clock.adjust(3);
        assert_eq!(clock.now(), 3);
    }
}
