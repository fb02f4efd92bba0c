//! Transport-agnostic request handlers
//!
//! The HTTP server belongs to the firmware. It hands the request target to
//! [`Request::from_target`] and sends back whatever [`handle`] returns.

use alloc::format;
use alloc::string::String;
use log::{info, warn};
use serde::Serialize;

use crate::app_state::Monitor;
use crate::config::ConfigStore;
use crate::storage::{Checkpoint, LogStore, TimeWindow, history_json};
use crate::time::{AdjustableClock, CalendarTime, parse_set_time};

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_TEXT: &str = "text/plain";
pub const CONTENT_HTML: &str = "text/html";

const SAVE_TIME_PAGE: &str = "<html><body style='font-family:tahoma;text-align:center;padding:50px'>\
<h2>OK</h2><br><a href='/'>Back</a></body></html>";

/// A parsed request. Parameter values are raw query text, still
/// percent-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Status,
    GetLimits,
    SaveLimits {
        green: Option<&'a str>,
        yellow: Option<&'a str>,
    },
    ToggleSound,
    ToggleDisplay,
    ClearLog,
    SaveTime {
        dt: Option<&'a str>,
    },
    GetHistory {
        mode: Option<&'a str>,
    },
}

impl<'a> Request<'a> {
    /// Route a request target such as `/get_hist?m=2`.
    ///
    /// Returns `None` for paths that have no handler.
    pub fn from_target(target: &'a str) -> Option<Self> {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let request = match path {
            "/status" => Self::Status,
            "/get_limits" => Self::GetLimits,
            "/save_limits" => Self::SaveLimits {
                green: query_param(query, "green"),
                yellow: query_param(query, "yellow"),
            },
            "/toggle_sound" => Self::ToggleSound,
            "/toggle_disp" => Self::ToggleDisplay,
            "/clear_log" => Self::ClearLog,
            "/save_time" => Self::SaveTime {
                dt: query_param(query, "dt"),
            },
            "/get_hist" => Self::GetHistory {
                mode: query_param(query, "m"),
            },
            _ => return None,
        };

        Some(request)
    }
}

/// Value of the first `name=value` pair in a query string
pub fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Decode `%XX` escapes and `+` in a form value. Malformed escapes are kept
/// literally.
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = alloc::vec::Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%'
            && let Some(byte) = bytes.get(i + 1..i + 3).and_then(hex_pair)
        {
            decoded.push(byte);
            i += 3;
            continue;
        }

        decoded.push(if b == b'+' { b' ' } else { b });
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let [high, low] = pair else {
        return None;
    };
    let digit = |b: &u8| char::from(*b).to_digit(16);
    u8::try_from(digit(high)? * 16 + digit(low)?).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: 400,
            content_type: CONTENT_TEXT,
            body: reason.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: CONTENT_TEXT,
            body: String::from("Not found"),
        }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::ok(CONTENT_JSON, body),
            Err(e) => {
                warn!("Failed to encode response: {}", e);
                Self {
                    status: 500,
                    content_type: CONTENT_TEXT,
                    body: String::from("Encoding failed"),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct StatusBody {
    temp: f32,
    time: String,
    date: String,
    green: f32,
    yellow: f32,
    #[serde(rename = "webSound")]
    web_sound: bool,
    #[serde(rename = "logCount")]
    log_count: u32,
    /// Whole KiB
    #[serde(rename = "logSize")]
    log_size: u32,
}

#[derive(Serialize)]
struct LimitsBody {
    green: f32,
    yellow: f32,
}

/// Parse the integer at the start of `value`, ignoring whatever follows.
///
/// Leading whitespace and a sign are accepted, so `" 2"`, `"+1"` and `"1x"`
/// all yield a number. `None` when no digit follows or the value overflows.
fn leading_int(value: &str) -> Option<i32> {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude = digits[..end].bytes().try_fold(0i32, |acc, b| {
        acc.checked_mul(10)?.checked_add(i32::from(b - b'0'))
    })?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Round to one decimal for display.
fn one_decimal(value: f32) -> f32 {
    // From 2^23 up an f32 holds no fraction, and the cast below would saturate.
    if !(value.abs() < 8_388_608.0) {
        return value;
    }
    let nudge = if value < 0.0 { -0.5 } else { 0.5 };
    ((value * 10.0 + nudge) as i32) as f32 / 10.0
}

/// Serve one request against the monitor.
///
/// `checkpoint` is awaited during the log scans behind the status and
/// history requests.
pub async fn handle<S, C, K, P>(
    request: Request<'_>,
    monitor: &mut Monitor<S, C>,
    clock: &mut K,
    checkpoint: &mut P,
) -> Response
where
    S: LogStore,
    C: ConfigStore,
    K: AdjustableClock,
    P: Checkpoint,
{
    match request {
        Request::Status => {
            let now = CalendarTime::from_unix(clock.now());
            let stats = monitor.recorder_mut().stats(checkpoint).await;
            let config = *monitor.config();

            Response::json(&StatusBody {
                temp: one_decimal(monitor.temperature()),
                time: format!("{:02}:{:02}:{:02}", now.hour, now.minute, now.second),
                date: format!("{:04}/{:02}/{:02}", now.year, now.month, now.day),
                green: one_decimal(config.green_limit),
                yellow: one_decimal(config.yellow_limit),
                web_sound: config.sound_enabled,
                log_count: stats.line_count,
                log_size: stats.size_kib(),
            })
        }

        Request::GetLimits => {
            let config = monitor.config();
            Response::json(&LimitsBody {
                green: one_decimal(config.green_limit),
                yellow: one_decimal(config.yellow_limit),
            })
        }

        Request::SaveLimits {
            green: Some(green),
            yellow: Some(yellow),
        } => {
            let parsed = percent_decode(green)
                .trim()
                .parse::<f32>()
                .ok()
                .zip(percent_decode(yellow).trim().parse::<f32>().ok());

            let Some((green, yellow)) = parsed else {
                return Response::bad_request("Limits must be numbers");
            };

            match monitor.set_limits(green, yellow) {
                Ok(()) => Response::ok(CONTENT_TEXT, "OK"),
                Err(e) => {
                    warn!("Rejected limits {} / {}: {}", green, yellow, e);
                    Response::bad_request(format!("{}", e))
                }
            }
        }

        // Missing parameters leave the limits as they are.
        Request::SaveLimits { .. } => Response::ok(CONTENT_TEXT, "OK"),

        Request::ToggleSound => {
            monitor.toggle_sound();
            Response::ok(CONTENT_TEXT, "OK")
        }

        Request::ToggleDisplay => {
            monitor.toggle_display();
            Response::ok(CONTENT_TEXT, "OK")
        }

        Request::ClearLog => {
            monitor.recorder_mut().clear();
            Response::ok(CONTENT_TEXT, "OK")
        }

        Request::SaveTime { dt } => {
            if let Some(dt) = dt {
                match parse_set_time(&percent_decode(dt)) {
                    Some(timestamp) => {
                        clock.adjust(timestamp);
                        info!("Clock set to {}", timestamp);
                    }
                    None => warn!("Ignoring unparsable time {:?}", dt),
                }
            }
            Response::ok(CONTENT_HTML, SAVE_TIME_PAGE)
        }

        Request::GetHistory { mode } => {
            let mode = mode
                .and_then(leading_int)
                .unwrap_or(TimeWindow::LastMonth.mode());
            let window = TimeWindow::from_mode(mode);
            let points = monitor
                .recorder_mut()
                .history(window, clock.now(), checkpoint)
                .await;

            Response::ok(CONTENT_JSON, history_json(&points))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RamConfigStore, SystemConfig};
    use crate::display::DisplayMode;
    use crate::storage::{MemoryLogStore, NoYield};
    use crate::time::{Clock, ManualClock};
    use embassy_futures::block_on;

    type TestMonitor = Monitor<MemoryLogStore, RamConfigStore>;

    fn monitor_with_log(contents: &[u8]) -> TestMonitor {
        Monitor::new(MemoryLogStore::with_contents(contents), RamConfigStore::new())
    }

    fn serve(target: &str, monitor: &mut TestMonitor, clock: &mut ManualClock) -> Response {
        let request = Request::from_target(target).unwrap();
        block_on(handle(request, monitor, clock, &mut NoYield))
    }

    #[test]
    fn test_routing() {
        assert_eq!(Request::from_target("/status"), Some(Request::Status));
        assert_eq!(
            Request::from_target("/get_hist?m=2"),
            Some(Request::GetHistory { mode: Some("2") })
        );
        assert_eq!(
            Request::from_target("/save_limits?yellow=28&green=20.5"),
            Some(Request::SaveLimits {
                green: Some("20.5"),
                yellow: Some("28"),
            })
        );
        assert_eq!(
            Request::from_target("/get_hist"),
            Some(Request::GetHistory { mode: None })
        );
        assert_eq!(Request::from_target("/"), None);
        assert_eq!(Request::from_target("/status.json"), None);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("2024-02-29T13%3A45"), "2024-02-29T13:45");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz1"), "%zz1");
    }

    #[test]
    fn test_status_json() {
        let mut monitor = monitor_with_log(b"1000,20.00\n1060,20.50\n");
        // 2024-02-29 13:45:30 UTC
        let mut clock = ManualClock::new(1_709_214_330);

        let response = serve("/status", &mut monitor, &mut clock);
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, CONTENT_JSON);
        assert_eq!(
            response.body,
            "{\"temp\":0.0,\"time\":\"13:45:30\",\"date\":\"2024/02/29\",\
             \"green\":25.0,\"yellow\":30.0,\"webSound\":true,\
             \"logCount\":2,\"logSize\":0}"
        );
    }

    #[test]
    fn test_get_limits() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        let response = serve("/get_limits", &mut monitor, &mut clock);
        assert_eq!(response.body, "{\"green\":25.0,\"yellow\":30.0}");
    }

    #[test]
    fn test_save_limits() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        let response = serve("/save_limits?green=20.5&yellow=28", &mut monitor, &mut clock);
        assert_eq!(response, Response::ok(CONTENT_TEXT, "OK"));
        assert_eq!(monitor.config().green_limit, 20.5);
        assert_eq!(monitor.config().yellow_limit, 28.0);
        assert!(monitor.config_store().blob().is_some());
    }

    #[test]
    fn test_save_limits_rejected() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        for target in [
            "/save_limits?green=30&yellow=25",
            "/save_limits?green=30&yellow=30",
            "/save_limits?green=abc&yellow=30",
            "/save_limits?green=NaN&yellow=30",
            "/save_limits?green=3e9&yellow=4e9",
        ] {
            let response = serve(target, &mut monitor, &mut clock);
            assert_eq!(response.status, 400, "{}", target);
        }
        assert_eq!(monitor.config(), &SystemConfig::default());
    }

    #[test]
    fn test_save_limits_missing_param_is_noop() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        let response = serve("/save_limits?green=10", &mut monitor, &mut clock);
        assert_eq!(response.status, 200);
        assert_eq!(monitor.config(), &SystemConfig::default());
    }

    #[test]
    fn test_toggles() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        serve("/toggle_sound", &mut monitor, &mut clock);
        assert!(!monitor.config().sound_enabled);
        serve("/toggle_disp", &mut monitor, &mut clock);
        assert_eq!(monitor.display_mode(), DisplayMode::Clock);

        let response = serve("/status", &mut monitor, &mut clock);
        assert!(response.body.contains("\"webSound\":false"));
    }

    #[test]
    fn test_save_time() {
        let mut monitor = monitor_with_log(b"");
        let mut clock = ManualClock::new(0);

        let response = serve("/save_time?dt=2024-02-29T13%3A45", &mut monitor, &mut clock);
        assert_eq!(response.content_type, CONTENT_HTML);
        assert_eq!(clock.now(), 1_709_214_300);

        serve("/save_time?dt=yesterday", &mut monitor, &mut clock);
        serve("/save_time", &mut monitor, &mut clock);
        assert_eq!(clock.now(), 1_709_214_300);
    }

    #[test]
    fn test_get_history() {
        let mut monitor = monitor_with_log(b"1000,20.00\n1100,22.00\n1300,24.00\n");
        let mut clock = ManualClock::new(1300);

        let response = serve("/get_hist?m=1", &mut monitor, &mut clock);
        assert_eq!(response.content_type, CONTENT_JSON);
        assert_eq!(
            response.body,
            "[{\"l\":\"0:16\",\"f\":\"1970/1/1 0:16\",\"t\":21.0},\
             {\"l\":\"0:21\",\"f\":\"1970/1/1 0:21\",\"t\":24.0}]"
        );
    }

    #[test]
    fn test_get_history_defaults_to_month() {
        let mut monitor = monitor_with_log(b"1000,20.00\n1100,22.00\n1300,24.00\n");
        let mut clock = ManualClock::new(1300);

        let expected = "[{\"l\":\"1/1\",\"f\":\"1970/1/1 0:16\",\"t\":22.0}]";
        for target in ["/get_hist", "/get_hist?m=", "/get_hist?m=x", "/get_hist?m=9"] {
            assert_eq!(serve(target, &mut monitor, &mut clock).body, expected);
        }
    }

    #[test]
    fn test_get_history_mode_takes_leading_digits() {
        let mut monitor = monitor_with_log(b"1000,20.00\n1100,22.00\n1300,24.00\n");
        let mut clock = ManualClock::new(1300);

        let hourly = serve("/get_hist?m=1", &mut monitor, &mut clock).body;
        for target in ["/get_hist?m=1x", "/get_hist?m=1.5", "/get_hist?m=+1h"] {
            assert_eq!(serve(target, &mut monitor, &mut clock).body, hourly, "{}", target);
        }
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("2"), Some(2));
        assert_eq!(leading_int("12abc"), Some(12));
        assert_eq!(leading_int("  -3"), Some(-3));
        assert_eq!(leading_int("x1"), None);
        assert_eq!(leading_int("-"), None);
        assert_eq!(leading_int(""), None);
        assert_eq!(leading_int("99999999999"), None);
    }

    #[test]
    fn test_clear_log() {
        let mut monitor = monitor_with_log(b"1000,20.00\n");
        let mut clock = ManualClock::new(1300);

        serve("/clear_log", &mut monitor, &mut clock);
        serve("/clear_log", &mut monitor, &mut clock);

        assert_eq!(serve("/get_hist?m=3", &mut monitor, &mut clock).body, "[]");
        assert!(
            serve("/status", &mut monitor, &mut clock)
                .body
                .contains("\"logCount\":0,\"logSize\":0")
        );
    }

    #[test]
    fn test_one_decimal() {
        assert_eq!(one_decimal(21.46), 21.5);
        assert_eq!(one_decimal(-3.04), -3.0);
        assert_eq!(one_decimal(25.0), 25.0);
        assert_eq!(one_decimal(3e9), 3e9);
        assert_eq!(one_decimal(-4e9), -4e9);
    }
}
