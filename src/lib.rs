//! Ball Arena - concurrent elastic collisions in a rectangular table
//!
//! Core modules:
//! - `sim`: Ball state, collision resolution, wall handling and the shared registry
//! - `driver`: One motion task per ball
//! - `engine`: Start/dispose control surface and upward notifications
//! - `telemetry`: Bounded, non-blocking JSON-lines event sink
//! - `settings`: Run configuration

pub mod driver;
pub mod engine;
pub mod error;
pub mod settings;
pub mod sim;
pub mod telemetry;

pub use engine::{BallHandle, Engine, PositionUpdate};
pub use error::{Error, Result};
pub use settings::{EngineOptions, Settings, TelemetrySettings, TickPacing};
pub use telemetry::{TelemetryRecord, TelemetrySink};

/// 2-D vector used for positions and velocities
pub type Vector2D = glam::DVec2;

/// Engine configuration constants
pub mod consts {
    use std::time::Duration;

    /// Thickness of the right/bottom table border, in arena units
    pub const BORDER_THICKNESS: f64 = 8.0;
    /// Ball radius as a fraction of the table height
    pub const RADIUS_FRACTION: f64 = 0.04;

    /// Ball mass range (uniform)
    pub const MASS_MIN: f64 = 3.0;
    pub const MASS_MAX: f64 = 6.0;
    /// Max initial speed per velocity component (units/s)
    pub const MAX_INITIAL_SPEED: f64 = 120.0;
    /// Rejected candidates allowed per ball before placement gives up
    pub const PLACEMENT_ATTEMPTS: usize = 100;

    /// Reference fixed tick
    pub const FIXED_TICK: Duration = Duration::from_millis(10);
    /// Adaptive tick bounds
    pub const MIN_TICK_MS: u64 = 10;
    pub const MAX_TICK_MS: u64 = 30;
    /// Adaptive tick: interval_ms = scale / speed, clamped to the bounds above
    pub const ADAPTIVE_TICK_SCALE: f64 = 3000.0;
    /// Largest elapsed time integrated in one step (prevents tunnelling after a stall)
    pub const MAX_STEP_DT: f64 = 0.1;

    /// Upper bound for joining all motion drivers on dispose
    pub const DRIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
    /// Capacity of the engine-wide position broadcast
    pub const POSITION_BROADCAST_CAPACITY: usize = 1024;

    /// Telemetry ring capacity
    pub const TELEMETRY_CAPACITY: usize = 1000;
    /// Upper bound for draining telemetry on shutdown
    pub const TELEMETRY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Radius of every ball on a table of the given height
#[inline]
pub fn radius_for_table(table_height: f64) -> f64 {
    consts::RADIUS_FRACTION * table_height
}

/// Milliseconds since the Unix epoch (0 if the clock is before it)
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
