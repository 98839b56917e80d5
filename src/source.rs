//! The narrow interface the scheduler consumes from the remote service.
//!
//! The container never talks to a wire protocol itself; it drives exactly
//! three operations through [`SecretSource`]. The [`crate::vault`] module
//! provides the HashiCorp Vault implementation; tests script their own.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::SecretBody;
use crate::lease::Lease;

/// A secret body together with the lease metadata it was issued under.
#[derive(Debug, Clone)]
pub struct FetchedSecret {
    pub lease: Lease,
    pub body: SecretBody,
}

/// Remote operations required to manage leased secrets.
///
/// # Error contract
///
/// - `fetch` signals a missing path with [`crate::Error::NotFound`];
/// - `renew` signals a terminal renewal denial with
///   [`crate::Error::NotRenewable`];
/// - any other error is treated as transient and retried by the scheduler.
///
/// `revoke` is best-effort: the scheduler logs failures but never retries
/// them.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Read the secret at `path`, returning its body and lease metadata.
    async fn fetch(&self, path: &str) -> Result<FetchedSecret>;

    /// Extend the given lease, returning the refreshed lease (same
    /// identity, new duration).
    async fn renew(&self, lease: &Lease) -> Result<Lease>;

    /// Revoke the given lease.
    async fn revoke(&self, lease: &Lease) -> Result<()>;
}

#[async_trait]
impl<T: SecretSource + ?Sized> SecretSource for std::sync::Arc<T> {
    async fn fetch(&self, path: &str) -> Result<FetchedSecret> {
        (**self).fetch(path).await
    }

    async fn renew(&self, lease: &Lease) -> Result<Lease> {
        (**self).renew(lease).await
    }

    async fn revoke(&self, lease: &Lease) -> Result<()> {
        (**self).revoke(lease).await
    }
}
