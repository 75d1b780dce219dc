use crate::overrides::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while registering overrides or dispatching
/// events. None of these are fatal, the consumer keeps running after any of
/// them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid metric name {0:?}: must be non-empty, start with a letter or underscore and contain only letters, digits and underscores")]
    InvalidMetricName(String),

    #[error("invalid metric type {0:?}: expected one of counter, gauge, histogram, summary")]
    InvalidMetricType(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unable to classify event {0:?}: it carries neither a time nor a value")]
    UnclassifiableEvent(String),

    #[error("metric {name:?} was created as a {existing} but is now classified as a {requested}")]
    MetricKindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("invalid observation for metric {name:?}: {reason}")]
    InvalidObservation { name: String, reason: String },

    /// The metrics backend refused a registration or failed to render.
    #[error("metrics backend: {0}")]
    Backend(String),
}

// prometheus::Error is neither Clone nor PartialEq, so only its message is
// kept.
impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Backend(err.to_string())
    }
}
