//! forge::error
//!
//! Typed error taxonomy for SCM operations.
//!
//! # Design
//!
//! Adapters classify every provider failure at the boundary. Callers branch
//! on [`ErrorKind`] instead of matching provider message text, so a
//! provider rewording "Reference does not exist" cannot break cleanup code.

use thiserror::Error;

use crate::wait::WaitError;

/// Closed classification of [`ScmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The repository, branch, PR or file is confirmed absent.
    NotFound,
    /// A precondition was violated (e.g. the branch already exists).
    Conflict,
    /// Network failure, timeout, rate limit or 5xx; safe to retry.
    Transient,
    /// Any other provider failure.
    Provider,
    /// The caller passed an argument the operation cannot use.
    InvalidArgument,
    /// A poll deadline elapsed.
    Timeout,
}

/// Errors from SCM operations.
///
/// `context` names the operation and repository, e.g.
/// `"create branch 'feat-x' in octo/hello"`.
#[derive(Debug, Clone, Error)]
pub enum ScmError {
    #[error("{context}: not found: {message}")]
    NotFound { context: String, message: String },

    #[error("{context}: conflict: {message}")]
    Conflict { context: String, message: String },

    #[error("{context}: transient failure: {message}")]
    Transient { context: String, message: String },

    #[error("{context}: provider error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Provider {
        context: String,
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Timeout(#[from] WaitError),
}

impl ScmError {
    pub fn not_found(context: impl Into<String>, message: impl Into<String>) -> Self {
        ScmError::NotFound {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn conflict(context: impl Into<String>, message: impl Into<String>) -> Self {
        ScmError::Conflict {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn transient(context: impl Into<String>, message: impl Into<String>) -> Self {
        ScmError::Transient {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn provider(
        context: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        ScmError::Provider {
            context: context.into(),
            status,
            message: message.into(),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScmError::NotFound { .. } => ErrorKind::NotFound,
            ScmError::Conflict { .. } => ErrorKind::Conflict,
            ScmError::Transient { .. } => ErrorKind::Transient,
            ScmError::Provider { .. } => ErrorKind::Provider,
            ScmError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ScmError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// HTTP status carried by provider errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScmError::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// Replace the operation context, keeping kind and message.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            ScmError::NotFound { message, .. } => ScmError::NotFound { context, message },
            ScmError::Conflict { message, .. } => ScmError::Conflict { context, message },
            ScmError::Transient { message, .. } => ScmError::Transient { context, message },
            ScmError::Provider {
                status, message, ..
            } => ScmError::Provider {
                context,
                status,
                message,
            },
            other => other,
        }
    }
}

/// Extension for cleanup call sites that tolerate missing resources.
pub trait IgnoreNotFound<T> {
    /// Map `NotFound` to `Ok(None)`; keep every other error.
    fn ignore_not_found(self) -> Result<Option<T>, ScmError>;
}

impl<T> IgnoreNotFound<T> for Result<T, ScmError> {
    fn ignore_not_found(self) -> Result<Option<T>, ScmError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
