//! Error types for lease management operations.

use thiserror::Error;

/// Result type for lease management operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, renewing, or revoking leased secrets.
///
/// The scheduler treats [`Error::NotFound`] and [`Error::NotRenewable`] as
/// terminal: they drive an immediate state transition instead of a retry.
/// [`Error::Transport`] and [`Error::Response`] are transient and retried
/// with bounded backoff.
#[derive(Error, Debug)]
pub enum Error {
    /// The secret path yields no data on fetch.
    #[error("Secret not found: {path}")]
    NotFound { path: String },

    /// The remote service explicitly rejected a renewal for this lease.
    #[error("Lease not renewable: {lease_id}")]
    NotRenewable { lease_id: String },

    /// Network-level failure talking to the remote service.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The remote service answered with an unexpected status.
    #[error("Unexpected response (status {status}): {message}")]
    Response { status: u16, message: String },

    /// A registered listener panicked during event dispatch.
    #[error("Listener panicked during dispatch: {message}")]
    ListenerPanic { message: String },

    /// Malformed caller input (secret path, lease id, configuration).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The container has shut down and no longer accepts registrations.
    #[error("Lease container has shut down")]
    ShutDown,
}

impl Error {
    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a not renewable error.
    pub fn not_renewable(lease_id: impl Into<String>) -> Self {
        Self::NotRenewable { lease_id: lease_id.into() }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create an unexpected response error.
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        Self::Response { status, message: message.into() }
    }

    /// Create a listener panic error.
    pub fn listener_panic(message: impl Into<String>) -> Self {
        Self::ListenerPanic { message: message.into() }
    }

    /// Create an invalid input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }

    /// Whether this error is terminal for the operation that produced it
    /// (no retry will succeed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NotRenewable { .. } | Self::InvalidInput { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport { message: err.to_string() }
    }
}
