use thiserror::Error;

/// Configuration problems that prevent a session from starting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("zone needs at least 3 points, got {0}")]
    ZoneTooFewPoints(usize),
    #[error("zone contains a non-finite coordinate")]
    ZoneNonFinite,
    #[error("zone polygon has no area")]
    ZoneDegenerate,
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("frame size must be non-zero, got {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
    #[error("{name} must be a finite value within range, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("unknown retention policy '{0}' (expected sticky, exit_on_leave or distance:<px>)")]
    InvalidRetention(String),
    #[error("session id '{0}' must match ^[A-Za-z0-9_.-]{{1,128}}$")]
    InvalidSessionId(String),
}
