//! Temperature acquisition
//!
//! The DS18B20 driver lives in the firmware; the core only needs something that
//! can be asked for a reading and a filter that keeps sensor faults out of
//! the alert logic and the log.

use core::future::Future;

use log::warn;
use thiserror_no_std::Error;

/// Lowest reading accepted as physically plausible (exclusive)
pub const MIN_PLAUSIBLE_CELSIUS: f32 = -50.0;
/// Highest reading accepted as physically plausible (exclusive)
pub const MAX_PLAUSIBLE_CELSIUS: f32 = 100.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: no device responded on the bus")]
    NotPresent { sensor: &'static str },
    #[error("{sensor}: failed to {operation}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// A digital temperature sensor
pub trait TemperatureSensor {
    /// Trigger a conversion and return the result in °C.
    fn read_celsius(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// Keeps the last known-good temperature
///
/// Readings outside the plausible band, NaN, or failed reads leave the
/// current value untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingFilter {
    current: f32,
}

impl ReadingFilter {
    pub const fn new() -> Self {
        Self { current: 0.0 }
    }

    /// The last accepted temperature, 0.0 °C before the first good read
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Offer a raw result; returns the temperature now in effect.
    pub fn accept(&mut self, reading: Result<f32, SensorError>) -> f32 {
        match reading {
            Ok(t) if t > MIN_PLAUSIBLE_CELSIUS && t < MAX_PLAUSIBLE_CELSIUS => self.current = t,
            Ok(t) => warn!("Rejected implausible reading {}", t),
            Err(e) => warn!("Temperature read failed: {}", e),
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_readings_accepted() {
        let mut filter = ReadingFilter::new();
        assert_eq!(filter.accept(Ok(21.5)), 21.5);
        assert_eq!(filter.accept(Ok(-49.9)), -49.9);
        assert_eq!(filter.accept(Ok(99.9)), 99.9);
    }

    #[test]
    fn test_out_of_band_keeps_last_good() {
        let mut filter = ReadingFilter::new();
        filter.accept(Ok(22.0));

        // DS18B20 reports -127 when disconnected.
        assert_eq!(filter.accept(Ok(-127.0)), 22.0);
        assert_eq!(filter.accept(Ok(-50.0)), 22.0);
        assert_eq!(filter.accept(Ok(100.0)), 22.0);
        assert_eq!(filter.accept(Ok(f32::NAN)), 22.0);
        assert_eq!(
            filter.accept(Err(SensorError::NotPresent { sensor: "DS18B20" })),
            22.0
        );
        assert_eq!(filter.current(), 22.0);
    }

    #[test]
    fn test_read_fault_keeps_last_good() {
        let mut filter = ReadingFilter::new();
        filter.accept(Ok(18.25));

        let fault = SensorError::ReadFailed {
            sensor: "DS18B20",
            operation: "verify scratchpad CRC",
        };
        assert_eq!(filter.accept(Err(fault)), 18.25);
        assert_eq!(
            std::format!("{}", fault),
            "DS18B20: failed to verify scratchpad CRC"
        );
    }

    #[test]
    fn test_initial_value() {
        assert_eq!(ReadingFilter::new().current(), 0.0);
    }
}
