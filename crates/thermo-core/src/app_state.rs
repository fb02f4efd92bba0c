//! Run-loop state for the monitoring node
//!
//! [`Monitor`] owns the mutable state of the node: configuration, the
//! telemetry log, the last good temperature, the alert machine and the
//! display mode. The run loop calls [`Monitor::poll`] as
//! often as it likes; the sampling and logging cycles fire on elapsed time.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Instant};
use log::{error, info};

use crate::alert::{AlertOutputs, AlertStateMachine};
use crate::config::{ConfigError, ConfigStore, SystemConfig};
use crate::display::{DisplayMode, SegmentFrame};
use crate::sensors::{ReadingFilter, TemperatureSensor};
use crate::storage::{LogStore, TelemetryRecorder};
use crate::time::{CalendarTime, Clock};

/// Sensor read, alert evaluation and display refresh cadence
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);
/// Log append cadence
pub const LOG_PERIOD: Duration = Duration::from_secs(60);

/// Outputs of one sampling cycle, to be applied to the hardware
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutputs {
    pub temperature: f32,
    pub alert: AlertOutputs,
    pub frame: SegmentFrame,
}

/// What a single [`Monitor::poll`] did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PollOutcome {
    /// Present when the sampling cycle ran
    pub cycle: Option<CycleOutputs>,
    /// Whether a sample was appended to the log
    pub logged: bool,
}

pub struct Monitor<S: LogStore, C: ConfigStore> {
    config: SystemConfig,
    config_store: C,
    recorder: TelemetryRecorder<S>,
    filter: ReadingFilter,
    alerts: AlertStateMachine,
    display_mode: DisplayMode,
    last_sample: Instant,
    last_log: Instant,
}

impl<S: LogStore, C: ConfigStore> Monitor<S, C> {
    /// Load the persisted configuration and take ownership of both stores.
    pub fn new(log_store: S, mut config_store: C) -> Self {
        let config = SystemConfig::load(&mut config_store);

        Self {
            config,
            config_store,
            recorder: TelemetryRecorder::new(log_store),
            filter: ReadingFilter::new(),
            alerts: AlertStateMachine::new(),
            display_mode: DisplayMode::default(),
            last_sample: Instant::from_millis(0),
            last_log: Instant::from_millis(0),
        }
    }

    /// Run whichever periodic cycles are due at `now`.
    ///
    /// The sampling cycle reads the sensor, evaluates alerts and renders the
    /// display frame. The logging cycle appends the last good temperature
    /// stamped with the wall clock at the moment of logging.
    pub async fn poll<T, K>(
        &mut self,
        now: Instant,
        sensor: &mut T,
        clock: &K,
        touch_active: bool,
    ) -> PollOutcome
    where
        T: TemperatureSensor,
        K: Clock,
    {
        let mut outcome = PollOutcome::default();

        if now.saturating_duration_since(self.last_sample) >= SAMPLE_PERIOD {
            self.last_sample = now;

            let temperature = self.filter.accept(sensor.read_celsius().await);
            let frame = SegmentFrame::render(
                self.display_mode,
                temperature,
                &CalendarTime::from_unix(clock.now()),
            );
            let alert = self
                .alerts
                .evaluate(temperature, &self.config, touch_active, now);

            outcome.cycle = Some(CycleOutputs {
                temperature,
                alert,
                frame,
            });
        }

        if now.saturating_duration_since(self.last_log) >= LOG_PERIOD {
            self.last_log = now;
            self.recorder.record(clock.now(), self.filter.current());
            outcome.logged = true;
        }

        outcome
    }

    /// Replace both alert limits and persist them.
    ///
    /// Rejected pairs leave the configuration untouched.
    pub fn set_limits(&mut self, green: f32, yellow: f32) -> Result<(), ConfigError> {
        SystemConfig::validate_limits(green, yellow)?;

        self.config.green_limit = green;
        self.config.yellow_limit = yellow;
        info!("Limits set: green {} yellow {}", green, yellow);
        self.persist();
        Ok(())
    }

    /// Flip the alarm enable flag and persist it. Returns the new value.
    pub fn toggle_sound(&mut self) -> bool {
        self.config.sound_enabled = !self.config.sound_enabled;
        info!("Alarm sound enabled: {}", self.config.sound_enabled);
        self.persist();
        self.config.sound_enabled
    }

    /// Switch between temperature and clock on the display. Not persisted.
    pub fn toggle_display(&mut self) -> DisplayMode {
        self.display_mode = self.display_mode.toggled();
        info!("Display showing {}", self.display_mode.label());
        self.display_mode
    }

    fn persist(&mut self) {
        if let Err(e) = self.config.save(&mut self.config_store) {
            error!("Config change not persisted: {}", e);
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn config_store(&self) -> &C {
        &self.config_store
    }

    /// Last accepted temperature
    pub fn temperature(&self) -> f32 {
        self.filter.current()
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn recorder(&self) -> &TelemetryRecorder<S> {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut TelemetryRecorder<S> {
        &mut self.recorder
    }
}

/// Monitor shared between the run loop and a request-handling task
pub type SharedMonitor<S, C> = AsyncMutex<CriticalSectionRawMutex, Monitor<S, C>>;
