//! Threshold alerting
//!
//! Maps the current temperature onto three mutually exclusive zones, each
//! driving one status LED, and runs a two-tone alarm while the danger zone is
//! active, the touch pad is held and sound is enabled.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{OutputPin, PinState};
use log::{debug, warn};

use crate::config::SystemConfig;

/// Time between alarm tone changes
pub const ALARM_PHASE_PERIOD: Duration = Duration::from_millis(200);
/// Tone of the first alarm phase
pub const ALARM_TONE_A_HZ: u32 = 1000;
/// Tone of the second alarm phase
pub const ALARM_TONE_B_HZ: u32 = 1500;
/// How long each tone burst lasts
pub const ALARM_TONE_MS: u32 = 100;

/// Temperature classification against the configured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertZone {
    /// At or below the green limit
    Normal,
    /// Above green, at or below yellow
    Warning,
    /// Above the yellow limit
    Danger,
}

impl AlertZone {
    /// Classify a temperature. The first matching zone wins.
    ///
    /// Assumes `green_limit < yellow_limit`; the configuration boundary
    /// rejects anything else.
    pub fn classify(temperature: f32, green_limit: f32, yellow_limit: f32) -> Self {
        if temperature <= green_limit {
            Self::Normal
        } else if temperature <= yellow_limit {
            Self::Warning
        } else {
            Self::Danger
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
            Self::Danger => "Danger",
        }
    }
}

/// What the buzzer should do after an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzerCommand {
    /// Stop any tone and clear the duty cycle
    Silence,
    /// Keep doing whatever it is doing
    Hold,
    /// Start a tone burst
    Tone { frequency_hz: u32, duration_ms: u32 },
}

/// Two-phase alarm tone generator
///
/// The phase only advances when an evaluation observes that a full period
/// has passed since the last edge; it is not a free-running timer. While
/// inactive the phase and edge time are kept, so re-activation resumes the
/// cycle rather than restarting it.
#[derive(Debug, Clone, Copy)]
pub struct AlarmOscillator {
    phase_a: bool,
    last_edge: Instant,
}

impl Default for AlarmOscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmOscillator {
    pub const fn new() -> Self {
        Self {
            phase_a: false,
            last_edge: Instant::from_millis(0),
        }
    }

    pub fn update(&mut self, active: bool, now: Instant) -> BuzzerCommand {
        if !active {
            return BuzzerCommand::Silence;
        }

        if now.saturating_duration_since(self.last_edge) < ALARM_PHASE_PERIOD {
            return BuzzerCommand::Hold;
        }

        self.last_edge = now;
        self.phase_a = !self.phase_a;

        let frequency_hz = if self.phase_a {
            ALARM_TONE_A_HZ
        } else {
            ALARM_TONE_B_HZ
        };

        BuzzerCommand::Tone {
            frequency_hz,
            duration_ms: ALARM_TONE_MS,
        }
    }
}

/// Everything one alert evaluation asks of the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertOutputs {
    pub zone: AlertZone,
    pub buzzer: BuzzerCommand,
}

impl AlertOutputs {
    pub fn green_led(&self) -> bool {
        self.zone == AlertZone::Normal
    }

    pub fn yellow_led(&self) -> bool {
        self.zone == AlertZone::Warning
    }

    pub fn red_led(&self) -> bool {
        self.zone == AlertZone::Danger
    }
}

/// Zone classification plus the alarm oscillator
#[derive(Debug, Default, Clone, Copy)]
pub struct AlertStateMachine {
    oscillator: AlarmOscillator,
}

impl AlertStateMachine {
    pub const fn new() -> Self {
        Self {
            oscillator: AlarmOscillator::new(),
        }
    }

    pub fn evaluate(
        &mut self,
        temperature: f32,
        config: &SystemConfig,
        touch_active: bool,
        now: Instant,
    ) -> AlertOutputs {
        let zone = AlertZone::classify(temperature, config.green_limit, config.yellow_limit);
        let alarm = zone == AlertZone::Danger && touch_active && config.sound_enabled;

        AlertOutputs {
            zone,
            buzzer: self.oscillator.update(alarm, now),
        }
    }
}

/// Piezo buzzer driven with timed tones
pub trait Buzzer {
    fn play_tone(&mut self, frequency_hz: u32, duration_ms: u32);
    fn silence(&mut self);
}

/// The three zone LEDs and the buzzer
pub struct StatusIndicators<G, Y, R, B> {
    green: G,
    yellow: Y,
    red: R,
    buzzer: B,
}

impl<G, Y, R, B> StatusIndicators<G, Y, R, B>
where
    G: OutputPin,
    Y: OutputPin,
    R: OutputPin,
    B: Buzzer,
{
    pub const fn new(green: G, yellow: Y, red: R, buzzer: B) -> Self {
        Self {
            green,
            yellow,
            red,
            buzzer,
        }
    }

    /// Assert exactly one LED and update the buzzer.
    pub fn apply(&mut self, outputs: &AlertOutputs) {
        drive(&mut self.green, outputs.green_led(), "green");
        drive(&mut self.yellow, outputs.yellow_led(), "yellow");
        drive(&mut self.red, outputs.red_led(), "red");

        match outputs.buzzer {
            BuzzerCommand::Silence => self.buzzer.silence(),
            BuzzerCommand::Hold => {}
            BuzzerCommand::Tone {
                frequency_hz,
                duration_ms,
            } => {
                debug!("Alarm tone {} Hz", frequency_hz);
                self.buzzer.play_tone(frequency_hz, duration_ms);
            }
        }
    }

    pub fn release(self) -> (G, Y, R, B) {
        (self.green, self.yellow, self.red, self.buzzer)
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool, name: &str) {
    if let Err(e) = pin.set_state(PinState::from(on)) {
        warn!("Failed to drive {} LED: {:?}", name, e);
    }
}
