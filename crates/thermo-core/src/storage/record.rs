//! Text record format of the telemetry log.
//!
//! One sample per line: `<unix seconds>,<celsius with 2 decimals>\n`.
//! Other tools read this file, so the encoding must not change.
//!
//! Reading is tolerant: a line without a delimiter is skipped,
//! and a field that does not parse degrades to zero instead of aborting the
//! scan.

use core::fmt::Write;

/// Separator between timestamp and temperature
pub const FIELD_DELIMITER: u8 = b',';

/// Capacity of one encoded record, including the newline
pub const MAX_RECORD_LEN: usize = 32;

/// One temperature sample as persisted in the log
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Seconds since the Unix epoch
    pub timestamp: u32,
    /// Degrees Celsius
    pub temperature: f32,
}

impl Sample {
    pub const fn new(timestamp: u32, temperature: f32) -> Self {
        Self {
            timestamp,
            temperature,
        }
    }

    /// Encode the sample as a log line, newline included.
    ///
    /// A temperature too wide for the line buffer is written as `0.00`, the
    /// value a reader would decode from an unusable field anyway.
    pub fn to_line(&self) -> heapless::String<MAX_RECORD_LEN> {
        let mut line = heapless::String::new();
        if write!(line, "{},{:.2}\n", self.timestamp, self.temperature).is_err() {
            line.clear();
            // Ten digits plus ",0.00\n" always fits.
            let _ = write!(line, "{},0.00\n", self.timestamp);
        }
        line
    }
}

/// Parse an integer field, zero if it is not a valid unsigned integer.
pub fn tolerant_int(field: &[u8]) -> u32 {
    core::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Parse a float field, zero if it is not a finite number.
pub fn tolerant_float(field: &[u8]) -> f32 {
    core::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Decode one log line (without its newline).
///
/// Returns `None` when the line has no delimiter and must be skipped.
/// Malformed fields default to zero.
pub fn parse_record(line: &[u8]) -> Option<Sample> {
    let split = line.iter().position(|&b| b == FIELD_DELIMITER)?;
    let (timestamp, rest) = line.split_at(split);

    Some(Sample {
        timestamp: tolerant_int(timestamp),
        temperature: tolerant_float(&rest[1..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        assert_eq!(Sample::new(5000, 23.5).to_line().as_str(), "5000,23.50\n");
        assert_eq!(Sample::new(0, -4.256).to_line().as_str(), "0,-4.26\n");
        assert_eq!(
            Sample::new(u32::MAX, 99.999).to_line().as_str(),
            "4294967295,100.00\n"
        );
    }

    #[test]
    fn test_unfit_temperature_still_ends_the_line() {
        assert_eq!(
            Sample::new(4_000_000_000, 1e25).to_line().as_str(),
            "4000000000,0.00\n"
        );
        assert_eq!(
            Sample::new(u32::MAX, f32::MIN).to_line().as_str(),
            "4294967295,0.00\n"
        );
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record(b"1000,20.00"), Some(Sample::new(1000, 20.0)));
        assert_eq!(parse_record(b"1000,-3.5\r"), Some(Sample::new(1000, -3.5)));
    }

    #[test]
    fn test_missing_delimiter_is_skipped() {
        assert_eq!(parse_record(b""), None);
        assert_eq!(parse_record(b"1000 20.0"), None);
    }

    #[test]
    fn test_malformed_fields_default_to_zero() {
        assert_eq!(parse_record(b"abc,20.5"), Some(Sample::new(0, 20.5)));
        assert_eq!(parse_record(b"1000,warm"), Some(Sample::new(1000, 0.0)));
        assert_eq!(parse_record(b","), Some(Sample::new(0, 0.0)));
        assert_eq!(parse_record(b"-5,1.0"), Some(Sample::new(0, 1.0)));
        assert_eq!(parse_record(b"7,NaN"), Some(Sample::new(7, 0.0)));
        assert_eq!(parse_record(b"7,inf"), Some(Sample::new(7, 0.0)));
        assert_eq!(parse_record(&[0xff, b',', b'1']), Some(Sample::new(0, 1.0)));
    }

    #[test]
    fn test_extra_delimiters_stay_in_temperature_field() {
        // Only the first comma splits; "1.5,2" is not a float.
        assert_eq!(parse_record(b"9,1.5,2"), Some(Sample::new(9, 0.0)));
    }
}
