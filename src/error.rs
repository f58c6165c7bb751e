//! Error types for configuration, dispatch and orchestration.

use thiserror::Error;

/// Invalid simulation parameters. Always fatal, reported before any device work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grid resolution {0} is not a power of two >= 2")]
    ResolutionNotPowerOfTwo(usize),
    #[error("patch length must be positive, got {0}")]
    NonPositivePatchLength(f32),
    #[error("choppiness must be non-negative, got {0}")]
    NegativeChoppiness(f32),
    #[error("wind direction ({0}, {1}) cannot be normalized")]
    InvalidWindDirection(f32, f32),
    #[error("parameter `{name}` is not finite")]
    NonFiniteParameter { name: &'static str },
    #[error("parameter `{name}` must be non-negative, got {value}")]
    NegativeParameter { name: &'static str, value: f32 },
    #[error("parameter `{name}` must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f32 },
}

/// Failure reported by a compute backend for a single dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("buffer `{0}` read or written before a barrier made the previous write visible")]
    MissingBarrier(&'static str),
    #[error("buffer `{0}` is bound as both input and output")]
    Aliased(&'static str),
    #[error("unknown or destroyed buffer handle {0}")]
    UnknownBuffer(usize),
    #[error("binding mismatch for {kernel}: {reason}")]
    BindingMismatch { kernel: &'static str, reason: String },
    #[error("{groups} groups of {local} cannot cover a domain of {domain}")]
    InsufficientCoverage { groups: u32, local: u32, domain: u32 },
    #[error("compute backend failure: {0}")]
    Backend(String),
}

/// Top-level error returned by the frame orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OceanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("ocean has not been configured")]
    NotConfigured,
    #[error("a tick is already in flight")]
    TickInFlight,
    #[error("no tick is in flight")]
    NoTickInFlight,
    #[error("no completed frame is available")]
    NoFrame,
}

pub type Result<T, E = OceanError> = std::result::Result<T, E>;
