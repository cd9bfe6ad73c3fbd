use std::sync::Arc;

use crate::ArcStr;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while refreshing rules, running the recurring worker or building and using
/// accessors.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The rules URL could not be parsed.
    #[error("invalid rules url")]
    InvalidUrl(#[source] url::ParseError),

    /// Network error while fetching the rule document.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Error reported by a custom [`Transport`](crate::Transport) implementation.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// The rule document was fetched but could not be decoded.
    #[error("error decoding rule document")]
    Decode(#[source] Arc<serde_json::Error>),

    /// The transport reported a modified document but returned no body.
    #[error("rule document response has no body")]
    MissingBody,

    /// An accessor was built without a default treatment.
    #[error("cannot build a feature without default treatment defined")]
    MissingDefaultTreatment,

    /// The default treatment of an accessor has no registered behavior.
    #[error("default treatment does not match a defined treatment")]
    DefaultTreatmentMismatch,

    /// The forced treatment of an accessor has no registered behavior.
    #[error("forced treatment does not match a defined treatment")]
    ForcedTreatmentMismatch,

    /// The rule document resolved a treatment the accessor has no behavior for. This means the
    /// deployed rules and the code are out of sync.
    #[error("no behavior registered for treatment {treatment:?} of feature {feature:?} (differentiator: {differentiator:?})")]
    UnregisteredTreatment {
        /// Feature being evaluated.
        feature: ArcStr,
        /// Treatment returned by the rule store.
        treatment: ArcStr,
        /// Differentiator the treatment was resolved for.
        differentiator: String,
    },

    /// The action run by a recurring worker panicked.
    #[error("recurring worker action panicked")]
    ActionPanicked,

    /// Indicates that the worker thread panicked. This should normally never happen.
    #[error("recurring worker thread panicked")]
    WorkerThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Decode(Arc::new(value))
    }
}
