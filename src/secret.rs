//! Requested secret value object.
//!
//! A [`RequestedSecret`] is a caller's declaration that the secret at a
//! given path should be kept valid under a lifecycle [`Mode`]. The
//! (path, mode) pair is the registration identity: registering the same
//! pair twice is the same logical registration.

use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle policy for a managed secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Keep extending the existing lease; the secret value never changes.
    Renew,
    /// Renew while possible, then fetch a fresh secret (new value, new
    /// lease) once renewal is no longer viable.
    Rotate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Renew => write!(f, "renew"),
            Mode::Rotate => write!(f, "rotate"),
        }
    }
}

/// Identifies a secret to manage: a non-empty path and a lifecycle mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestedSecret {
    path: String,
    mode: Mode,
}

impl RequestedSecret {
    /// Create a requested secret with an explicit mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the path is empty or starts with
    /// a `/` separator.
    pub fn new(mode: Mode, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(Error::invalid_input("secret path cannot be empty"));
        }
        if path.starts_with('/') {
            return Err(Error::invalid_input(format!(
                "secret path cannot start with '/': {}",
                path
            )));
        }
        Ok(Self { path, mode })
    }

    /// Convenience constructor for [`Mode::Renew`].
    pub fn renewable(path: impl Into<String>) -> Result<Self> {
        Self::new(Mode::Renew, path)
    }

    /// Convenience constructor for [`Mode::Rotate`].
    pub fn rotating(path: impl Into<String>) -> Result<Self> {
        Self::new(Mode::Rotate, path)
    }

    /// The secret's path, relative to the service root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The lifecycle mode for this registration.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl fmt::Display for RequestedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.path, self.mode)
    }
}
