//! # leasekeeper
//!
//! Lease lifecycle management for HashiCorp Vault dynamic secrets: fetch
//! secrets that come with time-bounded leases, renew them ahead of expiry,
//! rotate them when renewal is no longer possible, and notify listeners of
//! every lifecycle transition.
//!
//! ## Architecture
//!
//! ```text
//! register(RequestedSecret) → LeaseContainer ──► SecretSource (fetch/renew/revoke)
//!                                  │                      │
//!                                  │ per-secret task      └── VaultLeaseClient (HTTP API)
//!                                  ▼
//!                           EventDispatcher ──► LeaseListener / LeaseErrorListener
//! ```
//!
//! The [`LeaseContainer`] is the registry and scheduler: one background task
//! per registered secret decides when to renew, rotate, or go dormant, and
//! publishes a [`LeaseEvent`] at every transition. The remote service is
//! consumed through the narrow [`SecretSource`] trait; [`VaultLeaseClient`]
//! is the HashiCorp Vault implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use leasekeeper::{LeaseContainer, LeaseEvent, RequestedSecret, VaultLeaseClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> leasekeeper::Result<()> {
//!     let container = LeaseContainer::new(VaultLeaseClient::from_env()?);
//!
//!     container.add_listener(Arc::new(|event: &LeaseEvent| {
//!         if let LeaseEvent::SecretRotated { secret, .. } = event {
//!             tracing::info!(secret = %secret, "Credentials rotated, reconnect pools");
//!         }
//!     }));
//!
//!     // Keep extending the lease; the credentials never change.
//!     container.register(RequestedSecret::renewable("database/creds/readonly")?)?;
//!     // Fetch fresh credentials once the lease can no longer be renewed.
//!     container.register(RequestedSecret::rotating("database/creds/writer")?)?;
//!
//!     // ... application runs ...
//!
//!     // Revokes all held leases and cancels all timers.
//!     container.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod container;
pub mod error;
pub mod event;
pub mod lease;
pub mod listener;
pub mod secret;
pub mod source;
pub mod vault;

pub use container::{LeaseConfig, LeaseContainer};
pub use error::{Error, Result};
pub use event::{LeaseEvent, SecretBody};
pub use lease::Lease;
pub use listener::{EventDispatcher, LeaseErrorListener, LeaseListener, LoggingErrorListener};
pub use secret::{Mode, RequestedSecret};
pub use source::{FetchedSecret, SecretSource};
pub use vault::{VaultConfig, VaultLeaseClient};
