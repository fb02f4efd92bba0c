//! Desktop simulator for the thermo-rs temperature monitoring node.
//!
//! Runs the thermo-core monitor against a synthetic sensor, a file-backed
//! telemetry log and config blob, and an accelerated virtual clock. A
//! scripted client shares the monitor through the async mutex and issues the
//! same requests the web UI would, printing each response.
//!
//! # Usage
//!
//! ```text
//! thermo-simulator [DATA_DIR] [MINUTES]
//! ```
//!
//! | Argument   | Default                  |
//! |------------|--------------------------|
//! | `DATA_DIR` | `$TMPDIR/thermo-sim`     |
//! | `MINUTES`  | `180` (virtual minutes)  |
//!
//! Run with `RUST_LOG=info` for the request transcript, or `RUST_LOG=debug`
//! to also see every tone, frame and log append.

use std::cell::Cell;
use std::convert::Infallible;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use embassy_futures::{block_on, join::join, yield_now};
use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, OutputPin};
use log::{debug, error, info, warn};

use thermo_core::alert::{Buzzer, StatusIndicators};
use thermo_core::api::{Request, Response, handle};
use thermo_core::app_state::{Monitor, SharedMonitor};
use thermo_core::config::ConfigStore;
use thermo_core::display::{SegmentDisplay, SegmentFrame};
use thermo_core::sensors::{SensorError, TemperatureSensor};
use thermo_core::storage::{LogStore, NoYield, TimeWindow, YieldNow};
use thermo_core::time::{AdjustableClock, Clock};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Virtual time advanced per run-loop iteration.
const TICK: Duration = Duration::from_millis(250);

/// Wall-clock time at simulated boot (2024-02-29 13:45 UTC).
const BOOT_UNIX: u32 = 1_709_214_300;

/// Default simulated run length in minutes.
const DEFAULT_MINUTES: u64 = 180;

/// Sensor temperature swing: mean, amplitude and period in seconds.
const SENSOR_MEAN: f64 = 24.0;
const SENSOR_AMPLITUDE: f64 = 8.0;
const SENSOR_PERIOD_SECS: f64 = 7200.0;

/// Every Nth sensor read simulates a disconnected DS18B20.
const SENSOR_DROPOUT_EVERY: u32 = 600;

/// Every Nth sensor read fails its scratchpad CRC check.
const SENSOR_CRC_FAULT_EVERY: u32 = 1300;

/// Minutes during which someone holds the touch pad.
const TOUCH_WINDOW: (u64, u64) = (25, 40);

/// Requests issued by the scripted client, keyed by virtual minute.
const CLIENT_SCRIPT: &[(u64, &str)] = &[
    (1, "/status"),
    (2, "/get_limits"),
    (3, "/favicon.ico"),
    (5, "/toggle_disp"),
    (8, "/toggle_disp"),
    (12, "/get_hist?m=1"),
    (20, "/save_limits?green=30&yellow=25"),
    (21, "/save_limits?green=22.5&yellow=27"),
    (45, "/toggle_sound"),
    (50, "/toggle_sound"),
    (60, "/status"),
    (61, "/get_hist?m=1"),
    (90, "/save_time?dt=2024-03-01T08%3A00"),
    (120, "/get_hist?m=2"),
    (150, "/get_hist"),
    (170, "/status"),
];

// ---------------------------------------------------------------------------
// Virtual clock
// ---------------------------------------------------------------------------

/// Monotonic uptime plus an adjustable wall-clock offset.
///
/// Clones share the same underlying time, so the run loop and the client see
/// one clock.
#[derive(Clone)]
struct SimClock {
    uptime_ms: Rc<Cell<u64>>,
    boot_unix: Rc<Cell<u32>>,
}

impl SimClock {
    fn new(boot_unix: u32) -> Self {
        Self {
            uptime_ms: Rc::new(Cell::new(0)),
            boot_unix: Rc::new(Cell::new(boot_unix)),
        }
    }

    fn advance(&self, step: Duration) {
        self.uptime_ms.set(self.uptime_ms.get() + step.as_millis());
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }

    fn instant(&self) -> Instant {
        Instant::from_millis(self.uptime_ms())
    }

    fn uptime_secs(&self) -> u32 {
        u32::try_from(self.uptime_ms() / 1000).unwrap_or(u32::MAX)
    }
}

impl Clock for SimClock {
    fn now(&self) -> u32 {
        self.boot_unix.get().saturating_add(self.uptime_secs())
    }
}

impl AdjustableClock for SimClock {
    fn adjust(&mut self, unix_secs: u32) {
        self.boot_unix
            .set(unix_secs.saturating_sub(self.uptime_secs()));
    }
}

// ---------------------------------------------------------------------------
// Synthetic sensor
// ---------------------------------------------------------------------------

/// Slow sinusoid with periodic dropouts and read faults.
struct SineSensor {
    clock: SimClock,
    reads: u32,
}

impl SineSensor {
    fn new(clock: SimClock) -> Self {
        Self { clock, reads: 0 }
    }
}

impl TemperatureSensor for SineSensor {
    async fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.reads += 1;
        if self.reads % SENSOR_DROPOUT_EVERY == 0 {
            return Ok(-127.0);
        }
        if self.reads % SENSOR_CRC_FAULT_EVERY == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "DS18B20",
                operation: "verify scratchpad CRC",
            });
        }

        let t = self.clock.uptime_ms() as f64 / 1000.0;
        let phase = t / SENSOR_PERIOD_SECS * std::f64::consts::TAU;
        Ok((SENSOR_MEAN + SENSOR_AMPLITUDE * phase.sin()) as f32)
    }
}

// ---------------------------------------------------------------------------
// File-backed stores
// ---------------------------------------------------------------------------

/// Telemetry log in a plain file, opened per operation.
struct FileLogStore {
    path: PathBuf,
}

impl LogStore for FileLogStore {
    type Error = io::Error;

    fn append(&mut self, bytes: &[u8]) -> Result<(), io::Error> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(bytes)
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.read(buf)
    }

    fn size(&mut self) -> Result<u32, io::Error> {
        let len = fs::metadata(&self.path)?.len();
        u32::try_from(len).map_err(|_| io::Error::other("log exceeds 4 GiB"))
    }

    fn clear(&mut self) -> Result<(), io::Error> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Config blob in a small file standing in for EEPROM.
struct FileConfigStore {
    path: PathBuf,
}

impl ConfigStore for FileConfigStore {
    type Error = io::Error;

    fn load(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        let blob = fs::read(&self.path)?;
        buf.get_mut(..blob.len())
            .ok_or_else(|| io::Error::other("config blob too large"))?
            .copy_from_slice(&blob);
        Ok(blob.len())
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), io::Error> {
        fs::write(&self.path, bytes)
    }
}

// ---------------------------------------------------------------------------
// Console peripherals
// ---------------------------------------------------------------------------

/// LED that reports when it lights up.
struct ConsoleLed {
    name: &'static str,
    lit: bool,
}

impl ConsoleLed {
    fn new(name: &'static str) -> Self {
        Self { name, lit: false }
    }
}

impl ErrorType for ConsoleLed {
    type Error = Infallible;
}

impl OutputPin for ConsoleLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.lit {
            info!("LED {} on", self.name);
        }
        self.lit = true;
        Ok(())
    }
}

struct ConsoleBuzzer {
    sounding: bool,
}

impl Buzzer for ConsoleBuzzer {
    fn play_tone(&mut self, frequency_hz: u32, duration_ms: u32) {
        if !self.sounding {
            warn!("Alarm sounding");
        }
        self.sounding = true;
        debug!("Beep {} Hz for {} ms", frequency_hz, duration_ms);
    }

    fn silence(&mut self) {
        if self.sounding {
            info!("Alarm silenced");
        }
        self.sounding = false;
    }
}

/// Prints the 7-segment content whenever it changes.
#[derive(Default)]
struct ConsoleDisplay {
    last: Option<SegmentFrame>,
}

impl SegmentDisplay for ConsoleDisplay {
    fn show(&mut self, frame: &SegmentFrame) {
        if self.last.as_ref() != Some(frame) {
            let digits = frame.value.unsigned_abs() % 10_000;
            let sign = if frame.value < 0 { "-" } else { "" };
            debug!("[{}{:02}:{:02}]", sign, digits / 100, digits % 100);
            self.last = Some(*frame);
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

type SimMonitor = SharedMonitor<FileLogStore, FileConfigStore>;

fn touch_held(clock: &SimClock) -> bool {
    let minute = clock.uptime_ms() / 60_000;
    (TOUCH_WINDOW.0..TOUCH_WINDOW.1).contains(&minute)
}

/// The node's run loop: advance time, poll the monitor, drive outputs.
async fn run_node(monitor: &SimMonitor, clock: SimClock, end_ms: u64) {
    let mut sensor = SineSensor::new(clock.clone());
    let mut indicators = StatusIndicators::new(
        ConsoleLed::new("green"),
        ConsoleLed::new("yellow"),
        ConsoleLed::new("red"),
        ConsoleBuzzer { sounding: false },
    );
    let mut display = ConsoleDisplay::default();

    while clock.uptime_ms() < end_ms {
        clock.advance(TICK);

        let outcome = monitor
            .lock()
            .await
            .poll(clock.instant(), &mut sensor, &clock, touch_held(&clock))
            .await;

        if let Some(cycle) = outcome.cycle {
            indicators.apply(&cycle.alert);
            display.show(&cycle.frame);
        }

        yield_now().await;
    }
}

/// Scripted web client issuing requests at fixed virtual minutes.
async fn run_client(monitor: &SimMonitor, clock: SimClock, end_ms: u64) {
    for &(minute, target) in CLIENT_SCRIPT {
        while clock.uptime_ms() < minute * 60_000 {
            if clock.uptime_ms() >= end_ms {
                return;
            }
            yield_now().await;
        }

        let response = match Request::from_target(target) {
            Some(request) => {
                let mut request_clock = clock.clone();
                handle(
                    request,
                    &mut *monitor.lock().await,
                    &mut request_clock,
                    &mut YieldNow,
                )
                .await
            }
            None => Response::not_found(),
        };

        info!(
            "GET {} -> {} {} {}",
            target, response.status, response.content_type, response.body
        );
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn parse_args() -> (PathBuf, u64) {
    let mut args = std::env::args().skip(1);

    let data_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("thermo-sim"));

    let minutes = match args.next().map(|m| m.parse::<u64>()) {
        Some(Ok(m)) => m,
        Some(Err(e)) => {
            warn!("Invalid MINUTES ({}), using {}", e, DEFAULT_MINUTES);
            DEFAULT_MINUTES
        }
        None => DEFAULT_MINUTES,
    };

    (data_dir, minutes)
}

fn open_stores(data_dir: &Path) -> io::Result<(FileLogStore, FileConfigStore)> {
    fs::create_dir_all(data_dir)?;

    let mut log_store = FileLogStore {
        path: data_dir.join("LOG.TXT"),
    };
    // Each run starts with an empty log; the config survives between runs.
    log_store.clear()?;

    let config_store = FileConfigStore {
        path: data_dir.join("config.bin"),
    };

    Ok((log_store, config_store))
}

fn main() {
    env_logger::init();

    let (data_dir, minutes) = parse_args();
    info!("Starting thermo-rs simulator");
    info!(
        "Data in {}, simulating {} minutes",
        data_dir.display(),
        minutes
    );

    let (log_store, config_store) = match open_stores(&data_dir) {
        Ok(stores) => stores,
        Err(e) => {
            error!("Cannot prepare {}: {}", data_dir.display(), e);
            return;
        }
    };

    let monitor: SimMonitor = SharedMonitor::new(Monitor::new(log_store, config_store));
    let clock = SimClock::new(BOOT_UNIX);
    let end_ms = minutes * 60_000;

    block_on(join(
        run_node(&monitor, clock.clone(), end_ms),
        run_client(&monitor, clock.clone(), end_ms),
    ));

    // --- Summary ------------------------------------------------------------
    let mut monitor = monitor.into_inner();
    let stats = block_on(monitor.recorder_mut().stats(&mut NoYield));
    let hourly = block_on(monitor.recorder_mut().history(
        TimeWindow::LastDay,
        clock.now(),
        &mut NoYield,
    ));

    info!(
        "Log holds {} records ({} bytes)",
        stats.line_count, stats.byte_size
    );
    for point in hourly {
        info!("{:>16}  {:6.2} °C", point.full_label, point.mean_temperature);
    }
    info!("Simulator exiting");
}
