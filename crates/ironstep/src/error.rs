//! Error types for ironstep.

use std::fmt;

use thiserror::Error;

use crate::context::InstanceId;
use crate::scheme::TransitionKey;
use crate::service::ServiceKind;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by activity code or a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in ironstep operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The queue or signal was closed or disposed.
    ///
    /// Worker loops treat this as a stop condition, not as an instance fault.
    #[error("operation attempted on a closed or disposed primitive")]
    Closed,

    /// A bounded wait elapsed before the awaited condition.
    #[error("timed out waiting")]
    Timeout,

    /// A parameter expression could not be resolved or coerced.
    #[error("cannot bind parameter `{parameter}` of activity `{activity}`: {reason}")]
    Binding {
        /// The activity whose parameter failed.
        activity: String,
        /// The parameter name (or the referenced property).
        parameter: String,
        /// Why binding failed.
        reason: String,
    },

    /// An activity produced a transition key with no mapped target.
    #[error("activity `{activity}` has no transition for key `{key}`")]
    Navigation {
        /// The activity that produced the key.
        activity: String,
        /// The unmapped key.
        key: TransitionKey,
    },

    /// A scheme definition was malformed or failed validation.
    #[error("invalid scheme `{uri}`{location}: {message}")]
    SchemeParse {
        /// The scheme URI that was being loaded.
        uri: String,
        /// Where in the source the problem was found, if known.
        location: SourceLocation,
        /// Description of the problem.
        message: String,
    },

    /// The persistence service has no state for the instance.
    #[error("no persisted state for instance {0}")]
    NotFound(InstanceId),

    /// The persistence backend failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
        /// The underlying backend error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// An activity's own logic raised an error.
    #[error("activity `{activity}` failed: {source}")]
    ActionFault {
        /// The offending activity.
        activity: String,
        /// The original error.
        #[source]
        source: BoxError,
    },

    /// A call precondition was violated.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    /// A scheme references an activity kind nobody registered.
    #[error("unknown activity kind: {0}")]
    UnknownActivityKind(String),

    /// An activity kind was registered more than once.
    #[error("duplicate activity kind registration: {0}")]
    DuplicateActivityKind(String),

    /// The runtime was built without a required service.
    #[error("no {0} service registered")]
    MissingService(ServiceKind),

    /// The runtime holds no instance with this id.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// The instance is not in a state that allows the operation.
    #[error("instance {instance_id} cannot {operation} while {status}")]
    InvalidState {
        /// The instance.
        instance_id: InstanceId,
        /// What was attempted.
        operation: &'static str,
        /// The status the instance was in.
        status: String,
    },

    /// Failed to serialize or deserialize state.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure while reading a scheme source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised from activity code.
    #[error("{0}")]
    Custom(BoxError),
}

impl Error {
    /// Wrap an arbitrary error raised from activity code.
    pub fn custom(error: impl Into<BoxError>) -> Self {
        Error::Custom(error.into())
    }

    /// Create a binding error.
    pub fn binding(
        activity: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Binding {
            activity: activity.into(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a scheme error.
    pub fn scheme(
        uri: impl Into<String>,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Error::SchemeParse {
            uri: uri.into(),
            location,
            message: message.into(),
        }
    }

    /// Returns `true` for errors that end an instance in `Faulted`.
    pub fn is_instance_fatal(&self) -> bool {
        matches!(
            self,
            Error::Binding { .. } | Error::Navigation { .. } | Error::ActionFault { .. }
        )
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Closed => "closed",
            Error::Timeout => "timeout",
            Error::Binding { .. } => "binding",
            Error::Navigation { .. } => "navigation",
            Error::SchemeParse { .. } => "scheme_parse",
            Error::NotFound(_) => "not_found",
            Error::Storage { .. } => "storage",
            Error::ActionFault { .. } => "action_fault",
            Error::Precondition(_) => "precondition",
            Error::UnknownActivityKind(_) => "unknown_activity_kind",
            Error::DuplicateActivityKind(_) => "duplicate_activity_kind",
            Error::MissingService(_) => "missing_service",
            Error::UnknownInstance(_) => "unknown_instance",
            Error::InvalidState { .. } => "invalid_state",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Custom(_) => "custom",
        }
    }
}

/// Position of a problem inside a scheme source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceLocation {
    /// Location unknown.
    #[default]
    Unknown,
    /// A line/column pair (1-based) in the source text.
    Position { line: usize, column: usize },
    /// A path through the activity tree, e.g. `Approval/Review`.
    Activity(String),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Unknown => Ok(()),
            SourceLocation::Position { line, column } => {
                write!(f, " at line {line}, column {column}")
            }
            SourceLocation::Activity(path) => write!(f, " at activity `{path}`"),
        }
    }
}
