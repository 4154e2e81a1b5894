//! Error types for corral
//!
//! Every operation in the handler layer returns a structured error: a kind
//! from the closed [`ErrorKind`] set plus a message. Wrapped `io`/`nix`
//! failures are classified into a kind through their errno.

use std::fmt;

use nix::errno::Errno;
use thiserror::Error;

/// Classification shared by every [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed spec, policy, or multi-kind event spec
    InvalidArgument,
    /// Unknown container, resource, notification or unsupported event
    NotFound,
    /// Duplicate create
    AlreadyExists,
    /// Operation attempted in the wrong handler state
    FailedPrecondition,
    /// Kernel or backend ran out of a resource
    ResourceExhausted,
    /// Unexpected backend failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// corral error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Missing container, resource, or subscription
    #[error("Not found: {message}")]
    NotFound {
        /// Error message
        message: String,
    },

    /// Duplicate creation
    #[error("Already exists: {message}")]
    AlreadyExists {
        /// Error message
        message: String,
    },

    /// Handler is not in a state that allows the operation
    #[error("Failed precondition: {message}")]
    FailedPrecondition {
        /// Error message
        message: String,
    },

    /// Out of some kernel resource
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Error message
        message: String,
    },

    /// Unexpected backend failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Build an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidArgument => Self::InvalidArgument { message },
            ErrorKind::NotFound => Self::NotFound { message },
            ErrorKind::AlreadyExists => Self::AlreadyExists { message },
            ErrorKind::FailedPrecondition => Self::FailedPrecondition { message },
            ErrorKind::ResourceExhausted => Self::ResourceExhausted { message },
            ErrorKind::Internal => Self::Internal { message },
        }
    }

    /// Shorthand for [`ErrorKind::InvalidArgument`]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::AlreadyExists`]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Shorthand for [`ErrorKind::FailedPrecondition`]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    /// Shorthand for [`ErrorKind::Internal`]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::FailedPrecondition { .. } => ErrorKind::FailedPrecondition,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Internal { .. } | Self::TaskJoin(_) => ErrorKind::Internal,
            Self::Io(e) => match e.raw_os_error() {
                Some(code) => kind_of_errno(Errno::from_raw(code)),
                None if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                None => ErrorKind::Internal,
            },
            Self::System(errno) => kind_of_errno(*errno),
        }
    }

    /// Prefix the message with `context`, keeping the kind
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        let kind = self.kind();
        let message = match &self {
            Self::InvalidArgument { message }
            | Self::NotFound { message }
            | Self::AlreadyExists { message }
            | Self::FailedPrecondition { message }
            | Self::ResourceExhausted { message }
            | Self::Internal { message } => message.clone(),
            other => other.to_string(),
        };
        Self::new(kind, format!("{context}: {message}"))
    }
}

fn kind_of_errno(errno: Errno) -> ErrorKind {
    match errno {
        Errno::ENOENT | Errno::ESRCH => ErrorKind::NotFound,
        Errno::EEXIST => ErrorKind::AlreadyExists,
        Errno::ENOSPC | Errno::ENOMEM | Errno::EAGAIN => ErrorKind::ResourceExhausted,
        Errno::EBUSY | Errno::ENOTEMPTY => ErrorKind::FailedPrecondition,
        Errno::EINVAL => ErrorKind::InvalidArgument,
        _ => ErrorKind::Internal,
    }
}

/// Result type alias for corral operations
pub type Result<T> = std::result::Result<T, Error>;
