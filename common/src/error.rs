use thiserror::Error;

/// The result type used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The coarse class of an [`Error`], for callers that only need to branch on the failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested configuration cannot be realized.
    Configuration,
    /// An internal invariant was violated.
    Consistency,
    /// A checkpoint stream was truncated or corrupted.
    BoundaryFormat,
    /// The potential compute backend failed.
    Backend,
    /// A tick observer could not accept a report.
    Observer,
    /// An underlying I/O operation failed.
    Io,
}

/// Every failure the simulation core can surface. None of them are recoverable mid-run.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration asks for something that cannot be built, e.g. an unreachable
    /// occupancy density or a missing coupling constant.
    #[error("configuration error in {operation}: {message}")]
    Configuration {
        /// The operation that detected the problem.
        operation: &'static str,
        /// What went wrong, including offending values.
        message: String,
    },

    /// An invariant of the lattice or the carrier bookkeeping was violated.
    #[error("consistency error in {operation}: {message}")]
    Consistency {
        /// The operation that detected the problem.
        operation: &'static str,
        /// What went wrong, including offending ids.
        message: String,
    },

    /// A checkpoint record could not be decoded.
    #[error("binary stream read error: {message}")]
    BoundaryFormat {
        /// What was expected at the point of failure.
        message: String,
    },

    /// The potential compute backend could not be created or failed to run.
    #[error("potential backend error: {0}")]
    Backend(String),

    /// A tick observer rejected a report.
    #[error("tick observer error: {0}")]
    Observer(String),

    /// An I/O error other than a premature end of stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    pub fn configuration(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            operation,
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Consistency`].
    pub fn consistency(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Consistency {
            operation,
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::BoundaryFormat`].
    pub fn boundary_format(message: impl Into<String>) -> Self {
        Self::BoundaryFormat {
            message: message.into(),
        }
    }

    /// The [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::BoundaryFormat { .. } => ErrorKind::BoundaryFormat,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Observer(_) => ErrorKind::Observer,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
