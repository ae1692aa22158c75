use thiserror::Error;

/// Errors surfaced by the sampling controller's public API.
///
/// Storage internals work with `anyhow::Error`; those are wrapped in
/// [`SamplerError::Persistence`] when they have to cross the API boundary.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("no rotation sensor available on this device")]
    NoHardwareAvailable,
    #[error("sampling already active")]
    AlreadySampling,
    #[error("no active sampling session")]
    NotSampling,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("reading must carry 3 or 4 axis values, got {0}")]
    InvalidReading(usize),
    #[error("sensor subscription failed: {0:#}")]
    Subscription(#[source] anyhow::Error),
    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
    #[error("sensor delivery channel closed unexpectedly")]
    SubscriptionLost,
    #[error("sampling task failed to join: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type SamplerResult<T> = std::result::Result<T, SamplerError>;
