//! # Engine Settings
//!
//! Tunables fixed at construction time, plus the duration syntax used by
//! the CLI and config files (`"16ms"`, `"1m30s"`, `"250us"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunables read by the run loop and the close sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Terminate the process with the close exit code.
    pub hard_exit: bool,
    /// Wall-clock spacing between ticks. Ignored by the unthrottled loop.
    #[serde(with = "duration_str")]
    pub tick_duration: Duration,
    /// Simulated time added per tick. May be negative.
    pub tick_increment: f64,
    /// Simulated time at start and after a restart.
    pub tick_init: f64,
    /// Simulated time at which the loop stops by itself. 0 disables.
    pub tick_end: f64,
    /// Log `step: <value>` every tick (instrumented loop only).
    pub report_step: bool,
    /// Log FPS once per report window (instrumented loop only).
    pub report_frame: bool,
    /// Length of one FPS report window.
    #[serde(with = "duration_str")]
    pub report_window: Duration,
    /// Pace instrumented frames to this rate. `Some(0)` means 60.
    pub frame_limit: Option<u32>,
    /// Rendezvous with the driver around every world update.
    pub handshake: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hard_exit: false,
            tick_duration: Duration::from_nanos(1),
            tick_increment: 1.0,
            tick_init: 0.0,
            tick_end: 0.0,
            report_step: false,
            report_frame: false,
            report_window: Duration::from_secs(1),
            frame_limit: None,
            handshake: false,
        }
    }
}

impl Settings {
    /// Returns true if an end tick is configured.
    #[inline]
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn has_end(&self) -> bool {
        self.tick_end != 0.0
    }
}

/// Parses a duration such as `"300ms"`, `"1.5s"` or `"1h15m"`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is
/// accepted. Negative durations are rejected.
///
/// # Errors
///
/// Returns [`EngineError::InvalidDuration`] on malformed input.
pub fn parse_duration(input: &str) -> EngineResult<Duration> {
    let invalid = |reason: &str| EngineError::InvalidDuration {
        input: input.to_owned(),
        reason: reason.to_owned(),
    };

    let text = input.trim();
    if text.is_empty() {
        return Err(invalid("empty"));
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.starts_with('-') {
        return Err(invalid("negative"));
    }

    let mut nanos = 0f64;
    let mut rest = text.strip_prefix('+').unwrap_or(text);
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| invalid("malformed number"))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(invalid("out of range"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = nanos.round() as u64;
    Ok(Duration::from_nanos(whole))
}

/// Formats a duration in the largest unit that represents it exactly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        "0s".to_owned()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{nanos}ns")
    }
}

/// Serde adapter storing durations as strings.
pub(crate) mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(de::Error::custom)
    }
}
