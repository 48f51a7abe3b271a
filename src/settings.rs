//! Run settings
//!
//! Loaded from an optional JSON file, then overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Error, Result};

/// How long a motion driver waits between steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TickPacing {
    /// Constant interval
    Fixed { interval_ms: u64 },
    /// `scale / speed` milliseconds, clamped to `[min_ms, max_ms]`.
    /// Faster balls tick more often.
    Adaptive { min_ms: u64, max_ms: u64, scale: f64 },
}

impl Default for TickPacing {
    fn default() -> Self {
        TickPacing::Adaptive {
            min_ms: MIN_TICK_MS,
            max_ms: MAX_TICK_MS,
            scale: ADAPTIVE_TICK_SCALE,
        }
    }
}

impl TickPacing {
    pub fn fixed() -> Self {
        TickPacing::Fixed {
            interval_ms: FIXED_TICK.as_millis() as u64,
        }
    }

    /// Sleep before the next step of a ball moving at `speed` units/s
    pub fn interval(&self, speed: f64) -> Duration {
        match *self {
            TickPacing::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            TickPacing::Adaptive {
                min_ms,
                max_ms,
                scale,
            } => {
                if !(speed.is_finite() && speed > 0.0) {
                    return Duration::from_millis(max_ms);
                }
                let ms = (scale / speed).clamp(min_ms as f64, max_ms as f64);
                Duration::from_micros((ms * 1000.0).round() as u64)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            TickPacing::Fixed { interval_ms } if interval_ms == 0 => Err(Error::InvalidArgument(
                "fixed tick interval must be > 0".to_string(),
            )),
            TickPacing::Adaptive {
                min_ms,
                max_ms,
                scale,
            } if min_ms == 0 || max_ms < min_ms || !(scale.is_finite() && scale > 0.0) => {
                Err(Error::InvalidArgument(format!(
                    "adaptive tick needs 0 < min_ms <= max_ms and scale > 0 (got {min_ms}, {max_ms}, {scale})"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Engine knobs that are not part of a single `start` call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Placement/velocity RNG seed; random when absent
    pub seed: Option<u64>,
    pub pacing: TickPacing,
    /// Push colliding balls apart after resolving the impulse
    pub overlap_correction: bool,
    /// Max initial speed per velocity component (units/s)
    pub max_initial_speed: f64,
    pub mass_min: f64,
    pub mass_max: f64,
    /// Shared bound for joining every motion driver on dispose
    pub driver_join_timeout_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            seed: None,
            pacing: TickPacing::default(),
            overlap_correction: true,
            max_initial_speed: MAX_INITIAL_SPEED,
            mass_min: MASS_MIN,
            mass_max: MASS_MAX,
            driver_join_timeout_ms: DRIVER_JOIN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl EngineOptions {
    pub fn driver_join_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_join_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.pacing.validate()?;
        if !(self.mass_min.is_finite()
            && self.mass_min > 0.0
            && self.mass_max >= self.mass_min
            && (self.mass_max - self.mass_min).is_finite())
        {
            return Err(Error::InvalidArgument(format!(
                "mass range must satisfy 0 < min <= max (got {}..{})",
                self.mass_min, self.mass_max
            )));
        }
        // The velocity range spans `2 * max_initial_speed`.
        if !((2.0 * self.max_initial_speed).is_finite() && self.max_initial_speed > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "max initial speed must be > 0, got {}",
                self.max_initial_speed
            )));
        }
        Ok(())
    }
}

/// Telemetry output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// JSON-lines file; `None` discards records
    pub path: Option<PathBuf>,
    /// Ring capacity (records)
    pub capacity: usize,
    pub drain_timeout_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("logs/diagnostics.jsonl")),
            capacity: TELEMETRY_CAPACITY,
            drain_timeout_ms: TELEMETRY_DRAIN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TelemetrySettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Everything the headless runner needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ball_count: usize,
    pub table_width: f64,
    pub table_height: f64,
    /// Stop after this many seconds; run until Ctrl-C when absent
    pub run_for_secs: Option<u64>,
    pub engine: EngineOptions,
    pub telemetry: TelemetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ball_count: 10,
            table_width: 400.0,
            table_height: 420.0,
            run_for_secs: None,
            engine: EngineOptions::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&json)?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Apply `BALL_ARENA_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("{key}={value:?} is not valid")))
        }

        if let Some(v) = var("BALL_ARENA_COUNT") {
            self.ball_count = parse("BALL_ARENA_COUNT", &v)?;
        }
        if let Some(v) = var("BALL_ARENA_WIDTH") {
            self.table_width = parse("BALL_ARENA_WIDTH", &v)?;
        }
        if let Some(v) = var("BALL_ARENA_HEIGHT") {
            self.table_height = parse("BALL_ARENA_HEIGHT", &v)?;
        }
        if let Some(v) = var("BALL_ARENA_SEED") {
            self.engine.seed = Some(parse("BALL_ARENA_SEED", &v)?);
        }
        if let Some(v) = var("BALL_ARENA_TELEMETRY") {
            self.telemetry.path = match v.trim() {
                "" | "off" | "none" => None,
                path => Some(PathBuf::from(path)),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.table_width.is_finite() && self.table_width > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "table width must be > 0, got {}",
                self.table_width
            )));
        }
        if !(self.table_height.is_finite() && self.table_height > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "table height must be > 0, got {}",
                self.table_height
            )));
        }
        if self.telemetry.capacity == 0 {
            return Err(Error::InvalidArgument(
                "telemetry capacity must be > 0".to_string(),
            ));
        }
        self.engine.validate()
    }
}
