//! Lease value object.
//!
//! A [`Lease`] is an immutable description of a time-bounded grant attached
//! to a secret: an optional server-tracked identifier, a validity duration,
//! and whether the grant can be extended. Leases are never mutated; renewal
//! and rotation produce new instances.

use std::time::Duration;

use crate::error::{Error, Result};

/// Immutable description of a secret's lease.
///
/// A lease without an id (see [`Lease::from_ttl`]) carries only a local
/// time-to-live; it cannot be renewed or revoked remotely. The
/// [`Lease::none`] sentinel represents "no active lease", used when a fetch
/// returns data without lease metadata, or before any lease exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lease {
    lease_id: Option<String>,
    duration: Duration,
    renewable: bool,
}

impl Lease {
    /// Create a lease with a server-tracked identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `lease_id` is empty.
    pub fn of(lease_id: impl Into<String>, duration: Duration, renewable: bool) -> Result<Self> {
        let lease_id = lease_id.into();
        if lease_id.is_empty() {
            return Err(Error::invalid_input("lease id cannot be empty"));
        }
        Ok(Self { lease_id: Some(lease_id), duration, renewable })
    }

    /// Create a lease that carries only a local time-to-live.
    ///
    /// Such a lease has no server-side identity: renew and revoke are
    /// remote no-ops for it.
    pub fn from_ttl(duration: Duration) -> Self {
        Self { lease_id: None, duration, renewable: false }
    }

    /// The "no active lease" sentinel: zero duration, not renewable, no id.
    pub fn none() -> Self {
        Self { lease_id: None, duration: Duration::ZERO, renewable: false }
    }

    /// The server-tracked lease identifier, if any.
    pub fn lease_id(&self) -> Option<&str> {
        self.lease_id.as_deref()
    }

    /// Whether this lease has a server-tracked identifier.
    pub fn has_lease_id(&self) -> bool {
        self.lease_id.is_some()
    }

    /// Remaining validity granted by the server at issue/renewal time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the server reported this lease as renewable.
    pub fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// Derive the lease that results from a successful renewal: same
    /// identity, refreshed duration and renewability.
    pub fn renewed(&self, duration: Duration, renewable: bool) -> Self {
        Self { lease_id: self.lease_id.clone(), duration, renewable }
    }
}
