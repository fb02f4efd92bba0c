//! Four-digit 7-segment status display
//!
//! The display either shows the current temperature with two decimals or the
//! wall-clock time. The centre colon doubles as the decimal point, so both
//! modes use the same dot mask.

use crate::time::CalendarTime;

/// Segment mask lighting the centre colon
pub const COLON_MASK: u8 = 0b0100_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// `temp × 100`, e.g. `23:45` for 23.45 °C
    #[default]
    Temperature,
    /// `HH:MM`
    Clock,
}

impl DisplayMode {
    pub const fn toggled(self) -> Self {
        match self {
            Self::Temperature => Self::Clock,
            Self::Clock => Self::Temperature,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Clock => "clock",
        }
    }
}

/// One refresh worth of display content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFrame {
    pub value: i32,
    pub dots: u8,
    pub leading_zeros: bool,
}

impl SegmentFrame {
    pub fn render(mode: DisplayMode, temperature: f32, time: &CalendarTime) -> Self {
        let value = match mode {
            // Float to int casts truncate toward zero and saturate.
            DisplayMode::Temperature => (temperature * 100.0) as i32,
            DisplayMode::Clock => i32::from(time.hour) * 100 + i32::from(time.minute),
        };

        Self {
            value,
            dots: COLON_MASK,
            leading_zeros: true,
        }
    }
}

/// A numeric segment display driver (TM1637 on the board)
pub trait SegmentDisplay {
    fn show(&mut self, frame: &SegmentFrame);
}
