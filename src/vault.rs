//! HashiCorp Vault implementation of [`SecretSource`].
//!
//! Speaks to the Vault HTTP API directly:
//!
//! - `GET /v1/{path}`: logical read; the response envelope carries
//!   `lease_id`, `lease_duration`, `renewable`, and the secret `data`.
//!   Dynamic-secret backends (database credentials, AWS, ...) respond at
//!   this layer, which is where leases come from.
//! - `PUT /v1/sys/leases/renew`: extend a lease by id.
//! - `PUT /v1/sys/leases/revoke`: revoke a lease by id.
//!
//! # Configuration
//!
//! [`VaultConfig::from_env`] reads the conventional environment variables:
//! `VAULT_ADDR`, `VAULT_TOKEN`, and optionally `VAULT_NAMESPACE` for
//! Enterprise multi-tenancy.
//!
//! # Security
//!
//! The token header is marked sensitive and never logged; secret bodies are
//! wrapped in [`SecretBody`] whose `Debug` output is redacted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::event::SecretBody;
use crate::lease::Lease;
use crate::source::{FetchedSecret, SecretSource};

/// Configuration for the Vault secret source.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200").
    pub address: String,

    /// Vault authentication token.
    pub token: Option<String>,

    /// Vault namespace (for Enterprise multi-tenancy).
    pub namespace: Option<String>,

    /// Request timeout for all calls.
    pub timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl VaultConfig {
    /// Load configuration from `VAULT_ADDR`, `VAULT_TOKEN`, and
    /// `VAULT_NAMESPACE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `VAULT_ADDR` is not set.
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("VAULT_ADDR")
            .map_err(|_| Error::invalid_input("VAULT_ADDR environment variable not set"))?;
        Ok(Self {
            address,
            token: std::env::var("VAULT_TOKEN").ok(),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            ..Self::default()
        })
    }
}

/// Vault-backed [`SecretSource`].
///
/// `Send + Sync`; safe to share across async tasks.
pub struct VaultLeaseClient {
    http: reqwest::Client,
    address: String,
}

impl VaultLeaseClient {
    /// Create a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the address is empty or the token
    /// or namespace contain bytes invalid in an HTTP header.
    pub fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::invalid_input("Vault address cannot be empty"));
        }

        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.token {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| Error::invalid_input("Vault token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert("X-Vault-Token", value);
        }
        if let Some(ref namespace) = config.namespace {
            let value = HeaderValue::from_str(namespace).map_err(|_| {
                Error::invalid_input("Vault namespace is not a valid header value")
            })?;
            headers.insert("X-Vault-Namespace", value);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, address: config.address.trim_end_matches('/').to_string() })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(VaultConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path)
    }
}

/// Vault response envelope for logical reads and lease renewals.
#[derive(Debug, Deserialize)]
struct LeaseEnvelope {
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    lease_duration: i64,
    #[serde(default)]
    renewable: bool,
    #[serde(default)]
    data: Map<String, Value>,
}

/// Map Vault's wire fields onto a [`Lease`].
///
/// An empty `lease_id` with a positive duration is a TTL-only secret (KV
/// reads report a refresh interval this way); neither id nor duration means
/// no lease at all.
fn lease_from_wire(lease_id: &str, lease_duration: i64, renewable: bool) -> Result<Lease> {
    let duration = Duration::from_secs(lease_duration.max(0) as u64);
    if !lease_id.is_empty() {
        Lease::of(lease_id, duration, renewable)
    } else if !duration.is_zero() {
        Ok(Lease::from_ttl(duration))
    } else {
        Ok(Lease::none())
    }
}

#[async_trait]
impl SecretSource for VaultLeaseClient {
    async fn fetch(&self, path: &str) -> Result<FetchedSecret> {
        tracing::debug!(path = %path, "Reading secret from Vault");
        let response = self.http.get(self.endpoint(path)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found(path));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::response(status.as_u16(), message));
        }

        let envelope: LeaseEnvelope = response.json().await?;
        let lease =
            lease_from_wire(&envelope.lease_id, envelope.lease_duration, envelope.renewable)?;
        Ok(FetchedSecret { lease, body: SecretBody::new(envelope.data) })
    }

    async fn renew(&self, lease: &Lease) -> Result<Lease> {
        let lease_id = lease
            .lease_id()
            .ok_or_else(|| Error::not_renewable("<lease without server-side identity>"))?;

        tracing::debug!(lease_id = %lease_id, "Renewing lease");
        let response = self
            .http
            .put(self.endpoint("sys/leases/renew"))
            .json(&json!({
                "lease_id": lease_id,
                "increment": lease.duration().as_secs(),
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::FORBIDDEN {
            // Vault answers 400 for "lease not found or lease is not renewable".
            return Err(Error::not_renewable(lease_id));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::response(status.as_u16(), message));
        }

        let envelope: LeaseEnvelope = response.json().await?;
        let renewed =
            lease_from_wire(&envelope.lease_id, envelope.lease_duration, envelope.renewable)?;
        tracing::info!(
            lease_id = %lease_id,
            duration_secs = renewed.duration().as_secs(),
            renewable = renewed.is_renewable(),
            "Lease renewed"
        );
        Ok(renewed)
    }

    async fn revoke(&self, lease: &Lease) -> Result<()> {
        // A lease without server-side identity has nothing to revoke.
        let Some(lease_id) = lease.lease_id() else {
            return Ok(());
        };

        let response = self
            .http
            .put(self.endpoint("sys/leases/revoke"))
            .json(&json!({ "lease_id": lease_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::response(status.as_u16(), message));
        }
        tracing::info!(lease_id = %lease_id, "Lease revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_config_default() {
        let config = VaultConfig::default();
        assert_eq!(config.address, "http://127.0.0.1:8200");
        assert!(config.token.is_none());
        assert!(config.namespace.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_address_rejected() {
        let config = VaultConfig { address: String::new(), ..VaultConfig::default() };
        assert!(matches!(VaultLeaseClient::new(config), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config =
            VaultConfig { address: "http://vault:8200/".to_string(), ..VaultConfig::default() };
        let client = VaultLeaseClient::new(config).unwrap();
        assert_eq!(client.endpoint("database/creds/app"), "http://vault:8200/v1/database/creds/app");
    }

    #[test]
    fn test_lease_from_wire_with_id() {
        let lease = lease_from_wire("db/creds/app/1", 3600, true).unwrap();
        assert_eq!(lease.lease_id(), Some("db/creds/app/1"));
        assert_eq!(lease.duration(), Duration::from_secs(3600));
        assert!(lease.is_renewable());
    }

    #[test]
    fn test_lease_from_wire_ttl_only() {
        let lease = lease_from_wire("", 300, false).unwrap();
        assert!(!lease.has_lease_id());
        assert_eq!(lease.duration(), Duration::from_secs(300));
        assert!(!lease.is_renewable());
    }

    #[test]
    fn test_lease_from_wire_no_lease_metadata() {
        let lease = lease_from_wire("", 0, false).unwrap();
        assert_eq!(lease, Lease::none());
    }

    #[test]
    fn test_lease_from_wire_clamps_negative_duration() {
        let lease = lease_from_wire("db/creds/app/1", -5, false).unwrap();
        assert_eq!(lease.duration(), Duration::ZERO);
    }
}
