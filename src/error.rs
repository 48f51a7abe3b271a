use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine, the telemetry sink and settings loading.
///
/// Numerical degeneracy (two balls at the exact same point) and telemetry
/// overflow are deliberately absent: neither is an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine or telemetry sink was already disposed.
    #[error("{0} has already been disposed")]
    Disposed(&'static str),

    /// Invalid caller-supplied parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No non-overlapping start position could be found for a new ball.
    #[error("could not place a ball without overlap after {attempts} attempts")]
    Placement { attempts: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
