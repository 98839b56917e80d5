//! Lifecycle event model.
//!
//! Every state transition of a managed secret is published as a
//! [`LeaseEvent`]: an immutable, fire-and-forget notification value carrying
//! the originating [`RequestedSecret`] for correlation. The set of variants
//! is closed; dispatchers and tests match exhaustively instead of
//! downcasting.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Error;
use crate::lease::Lease;
use crate::secret::RequestedSecret;

/// Secret material returned by a fetch.
///
/// Wraps the body map so that secret values are never exposed through
/// `Debug` output or log lines. Access the fields explicitly via
/// [`SecretBody::get`] or [`SecretBody::into_inner`].
#[derive(Clone, Default, PartialEq)]
pub struct SecretBody(Map<String, Value>);

impl SecretBody {
    /// Wrap a body map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Look up a single field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of fields in the body.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the body carries no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the wrapper and expose the raw field map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for SecretBody {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl fmt::Debug for SecretBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field names are safe to show; values are not.
        write!(f, "SecretBody([{} fields REDACTED])", self.0.len())
    }
}

/// A lifecycle transition of a managed secret.
#[derive(Debug, Clone)]
pub enum LeaseEvent {
    /// The initial fetch for a registration succeeded.
    SecretCreated { secret: RequestedSecret, lease: Lease, body: SecretBody },

    /// A non-renewable lease was replaced by a fresh fetch: new secret
    /// value, new lease.
    SecretRotated { secret: RequestedSecret, previous: Lease, lease: Lease, body: SecretBody },

    /// The secret path yielded no data on fetch.
    SecretNotFound { secret: RequestedSecret },

    /// An existing lease was extended; same identity, refreshed duration.
    LeaseRenewed { secret: RequestedSecret, lease: Lease },

    /// Revocation of the lease is about to be attempted.
    BeforeLeaseRevocation { secret: RequestedSecret, lease: Lease },

    /// Revocation of the lease was attempted (best-effort).
    AfterLeaseRevocation { secret: RequestedSecret, lease: Lease },

    /// The lease ran out of renewals; the secret is now dormant.
    LeaseExpired { secret: RequestedSecret, lease: Lease },

    /// A fetch, renew, or revoke operation failed.
    LeaseError { secret: RequestedSecret, lease: Option<Lease>, error: Arc<Error> },
}

impl LeaseEvent {
    /// The registration this event belongs to. Listeners interested in a
    /// single secret filter on this.
    pub fn secret(&self) -> &RequestedSecret {
        match self {
            Self::SecretCreated { secret, .. }
            | Self::SecretRotated { secret, .. }
            | Self::SecretNotFound { secret }
            | Self::LeaseRenewed { secret, .. }
            | Self::BeforeLeaseRevocation { secret, .. }
            | Self::AfterLeaseRevocation { secret, .. }
            | Self::LeaseExpired { secret, .. }
            | Self::LeaseError { secret, .. } => secret,
        }
    }

    /// The lease associated with this transition, if one exists.
    pub fn lease(&self) -> Option<&Lease> {
        match self {
            Self::SecretCreated { lease, .. }
            | Self::SecretRotated { lease, .. }
            | Self::LeaseRenewed { lease, .. }
            | Self::BeforeLeaseRevocation { lease, .. }
            | Self::AfterLeaseRevocation { lease, .. }
            | Self::LeaseExpired { lease, .. } => Some(lease),
            Self::LeaseError { lease, .. } => lease.as_ref(),
            Self::SecretNotFound { .. } => None,
        }
    }

    /// Short name of the transition kind, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SecretCreated { .. } => "secret_created",
            Self::SecretRotated { .. } => "secret_rotated",
            Self::SecretNotFound { .. } => "secret_not_found",
            Self::LeaseRenewed { .. } => "lease_renewed",
            Self::BeforeLeaseRevocation { .. } => "before_lease_revocation",
            Self::AfterLeaseRevocation { .. } => "after_lease_revocation",
            Self::LeaseExpired { .. } => "lease_expired",
            Self::LeaseError { .. } => "lease_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn body() -> SecretBody {
        let mut fields = Map::new();
        fields.insert("username".into(), json!("app-user"));
        fields.insert("password".into(), json!("s3cr3t-value"));
        SecretBody::new(fields)
    }

    #[test]
    fn test_body_debug_redacts_values() {
        let output = format!("{:?}", body());
        assert!(!output.contains("s3cr3t-value"));
        assert!(!output.contains("app-user"));
        assert!(output.contains("REDACTED"));
        assert!(output.contains("2 fields"));
    }

    #[test]
    fn test_body_fields_accessible() {
        let body = body();
        assert_eq!(body.get("username"), Some(&json!("app-user")));
        assert_eq!(body.len(), 2);
        assert!(!body.is_empty());
    }

    #[test]
    fn test_event_accessors() {
        let secret = RequestedSecret::renewable("database/creds/app").unwrap();
        let lease = Lease::of("db/creds/app/1", Duration::from_secs(60), true).unwrap();

        let event = LeaseEvent::SecretCreated {
            secret: secret.clone(),
            lease: lease.clone(),
            body: body(),
        };
        assert_eq!(event.secret(), &secret);
        assert_eq!(event.lease(), Some(&lease));
        assert_eq!(event.kind(), "secret_created");

        let event = LeaseEvent::SecretNotFound { secret: secret.clone() };
        assert_eq!(event.lease(), None);
        assert_eq!(event.kind(), "secret_not_found");

        let event = LeaseEvent::LeaseError {
            secret,
            lease: None,
            error: Arc::new(Error::transport("boom")),
        };
        assert_eq!(event.lease(), None);
        assert_eq!(event.kind(), "lease_error");
    }

    #[test]
    fn test_event_debug_redacts_body() {
        let secret = RequestedSecret::rotating("database/creds/app").unwrap();
        let lease = Lease::of("db/creds/app/1", Duration::from_secs(60), true).unwrap();
        let event = LeaseEvent::SecretCreated { secret, lease, body: body() };
        let output = format!("{:?}", event);
        assert!(!output.contains("s3cr3t-value"));
    }
}
