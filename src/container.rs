//! Lease container: the registry and scheduler for managed secrets.
//!
//! The container owns one background management task per registered secret.
//! The task performs the initial fetch, then loops: it computes when to act
//! next (renew ahead of expiry, rotate at expiry, or go dormant), sleeps
//! until that deadline, performs the remote call, and publishes the
//! resulting lifecycle event. A single task per registration gives at most
//! one in-flight renew/rotate operation per secret without any global lock;
//! registrations contend only on their own [`DashMap`] shard.
//!
//! ## Scheduling policy
//!
//! - A renewable lease with a server-side id is renewed once
//!   `expiry_threshold` of validity remains (never later than expiry,
//!   never sooner than `min_renewal` when the lease outlives it).
//! - A lease that cannot be renewed is rotated at expiry when the secret
//!   was registered in [`Mode::Rotate`]; a zero-duration lease rotates
//!   immediately.
//! - Anything else goes dormant: the registration stays, no timer runs.
//!
//! ## Cancellation
//!
//! Unregistration and shutdown cancel the registration's token. The task
//! re-checks the token after every timer fire and every remote call, so an
//! in-flight call may complete but its result is discarded without further
//! events or rescheduling.
//!
//! ## Graceful shutdown
//!
//! [`LeaseContainer::shutdown`] stops accepting registrations, cancels all
//! timers, and (by default) best-effort-revokes every held lease, each
//! revocation isolated so one failure does not prevent the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::event::LeaseEvent;
use crate::lease::Lease;
use crate::listener::{EventDispatcher, LeaseErrorListener, LeaseListener};
use crate::secret::{Mode, RequestedSecret};
use crate::source::{FetchedSecret, SecretSource};

/// Scheduling and retry policy for the lease container.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Safety margin before lease expiry at which renewal fires.
    /// Default: 60 seconds.
    pub expiry_threshold: Duration,

    /// Lower bound on the renewal delay for leases that outlive it, so a
    /// short lease is not renewed in a hot loop. Default: 10 seconds.
    pub min_renewal: Duration,

    /// How many times a transient fetch/renew failure is retried before the
    /// operation is considered exhausted. Default: 3.
    pub max_retries: u32,

    /// Initial backoff between retries; doubles per attempt. Default: 1s.
    pub retry_backoff: Duration,

    /// Whether [`LeaseContainer::shutdown`] revokes all held leases.
    /// Default: true.
    pub revoke_on_shutdown: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            expiry_threshold: Duration::from_secs(60),
            min_renewal: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            revoke_on_shutdown: true,
        }
    }
}

impl LeaseConfig {
    /// Delay before the next renewal attempt for a lease of the given
    /// duration. Clamped so renewal never lands at or after actual expiry;
    /// a computed margin past the remaining duration triggers immediately.
    fn renewal_delay(&self, duration: Duration) -> Duration {
        let margin = duration.saturating_sub(self.expiry_threshold);
        let floor = if self.min_renewal < duration { self.min_renewal } else { Duration::ZERO };
        margin.max(floor).min(duration)
    }
}

/// What the management task should do once the current lease ages out.
#[derive(Debug, PartialEq, Eq)]
enum NextAction {
    /// Extend the current lease after the given delay.
    Renew(Duration),
    /// Fetch a fresh secret (new value, new lease) after the given delay.
    Rotate(Duration),
    /// Nothing to schedule; wait for unregistration.
    Dormant,
}

fn next_action(config: &LeaseConfig, secret: &RequestedSecret, lease: &Lease) -> NextAction {
    if lease.is_renewable() && lease.has_lease_id() {
        NextAction::Renew(config.renewal_delay(lease.duration()))
    } else if secret.mode() == Mode::Rotate {
        NextAction::Rotate(lease.duration())
    } else {
        NextAction::Dormant
    }
}

/// Wraps a listener supplied at registration so it only observes the
/// events of its own secret.
struct ScopedListener {
    secret: RequestedSecret,
    inner: Arc<dyn LeaseListener>,
}

impl LeaseListener for ScopedListener {
    fn on_lease_event(&self, event: &LeaseEvent) {
        if event.secret() == &self.secret {
            self.inner.on_lease_event(event);
        }
    }
}

/// Per-registration state owned by the registry.
struct Registration {
    cancel: CancellationToken,
    /// Snapshot of the currently-held lease. Mutated only by the
    /// registration's own management task.
    state: Arc<RwLock<Lease>>,
    /// Listeners attached through `register_with_listener`, detached when
    /// the registration goes away.
    listeners: Vec<Arc<dyn LeaseListener>>,
}

struct ContainerInner<S> {
    source: S,
    dispatcher: EventDispatcher,
    config: LeaseConfig,
    registrations: DashMap<RequestedSecret, Registration>,
    accepting: AtomicBool,
}

/// Tracks secrets with time-bounded leases, renews them before expiry,
/// rotates them when renewal is no longer possible, and notifies listeners
/// of every lifecycle transition.
///
/// Cheap to clone; clones share the same registry and listener sets.
///
/// # Example
///
/// ```rust,no_run
/// use leasekeeper::{LeaseContainer, RequestedSecret, VaultLeaseClient};
/// use std::sync::Arc;
///
/// # async fn example() -> leasekeeper::Result<()> {
/// let container = LeaseContainer::new(VaultLeaseClient::from_env()?);
/// container.add_listener(Arc::new(|event: &leasekeeper::LeaseEvent| {
///     tracing::info!(kind = event.kind(), secret = %event.secret(), "lease event");
/// }));
/// container.register(RequestedSecret::rotating("database/creds/app")?)?;
/// // ... application runs ...
/// container.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct LeaseContainer<S: SecretSource + 'static> {
    inner: Arc<ContainerInner<S>>,
}

impl<S: SecretSource + 'static> Clone for LeaseContainer<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: SecretSource + 'static> LeaseContainer<S> {
    /// Create a container with the default [`LeaseConfig`].
    pub fn new(source: S) -> Self {
        Self::with_config(source, LeaseConfig::default())
    }

    /// Create a container with an explicit scheduling policy.
    pub fn with_config(source: S, config: LeaseConfig) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                source,
                dispatcher: EventDispatcher::new(),
                config,
                registrations: DashMap::new(),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Start managing a secret. Idempotent: registering the same
    /// (path, mode) twice neither creates a second managed lease nor
    /// re-emits the initial creation event.
    ///
    /// The initial fetch runs in the background; later failures surface
    /// through listeners, never through this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutDown`] after [`LeaseContainer::shutdown`].
    pub fn register(&self, secret: RequestedSecret) -> Result<()> {
        self.do_register(secret, None)
    }

    /// Start managing a secret with a listener attached for its lifetime.
    /// The listener observes only this secret's events; listeners for all
    /// managed secrets go through [`Self::add_listener`]. If the secret is
    /// already registered the listener is attached to receive only future
    /// events; the original creation event is not replayed.
    pub fn register_with_listener(
        &self,
        secret: RequestedSecret,
        listener: Arc<dyn LeaseListener>,
    ) -> Result<()> {
        self.do_register(secret, Some(listener))
    }

    fn do_register(
        &self,
        secret: RequestedSecret,
        listener: Option<Arc<dyn LeaseListener>>,
    ) -> Result<()> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }

        // A listener supplied here observes only its own secret's events.
        let listener: Option<Arc<dyn LeaseListener>> = listener.map(|inner| {
            Arc::new(ScopedListener { secret: secret.clone(), inner }) as Arc<dyn LeaseListener>
        });
        let attached = listener.clone();

        // The spawn happens after the shard guard is dropped, so the new
        // task always finds its registration in place.
        let spawn = match self.inner.registrations.entry(secret.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(listener) = listener {
                    self.inner.dispatcher.add_listener(Arc::clone(&listener));
                    occupied.get_mut().listeners.push(listener);
                }
                tracing::debug!(secret = %secret, "Secret already registered");
                None
            }
            Entry::Vacant(vacant) => {
                if let Some(ref listener) = listener {
                    self.inner.dispatcher.add_listener(Arc::clone(listener));
                }
                let cancel = CancellationToken::new();
                let state = Arc::new(RwLock::new(Lease::none()));
                vacant.insert(Registration {
                    cancel: cancel.clone(),
                    state: Arc::clone(&state),
                    listeners: listener.into_iter().collect(),
                });
                tracing::info!(secret = %secret, "Registered secret for lease management");
                Some((cancel, state))
            }
        };

        // Shutdown may have flipped the flag and drained the map between
        // the acceptance check and the insert; undo the insert before any
        // task spawns so nothing outlives the drain.
        if !self.inner.accepting.load(Ordering::SeqCst) {
            if let Some((cancel, _)) = spawn {
                cancel.cancel();
                remove_registration(&self.inner, &secret);
            }
            if let Some(ref listener) = attached {
                self.inner.dispatcher.remove_listener(listener);
            }
            return Err(Error::ShutDown);
        }

        if let Some((cancel, state)) = spawn {
            tokio::spawn(manage_secret(Arc::clone(&self.inner), secret, cancel, state));
        }
        Ok(())
    }

    /// Stop managing a secret. Cancels any pending timer, revokes the held
    /// lease (best-effort, with the Before/After revocation event pair),
    /// and detaches listeners attached at registration.
    ///
    /// Returns whether a registration existed and was removed.
    pub async fn unregister(&self, secret: &RequestedSecret) -> bool {
        let Some((_, registration)) = self.inner.registrations.remove(secret) else {
            return false;
        };
        registration.cancel.cancel();

        let lease = registration.state.read().await.clone();
        revoke_lease(&self.inner, secret, &lease).await;

        for listener in &registration.listeners {
            self.inner.dispatcher.remove_listener(listener);
        }
        tracing::info!(secret = %secret, "Unregistered secret");
        true
    }

    /// Whether the given secret is currently registered.
    pub fn is_registered(&self, secret: &RequestedSecret) -> bool {
        self.inner.registrations.contains_key(secret)
    }

    /// Number of currently managed secrets.
    pub fn managed_count(&self) -> usize {
        self.inner.registrations.len()
    }

    /// Snapshot of the lease currently held for a secret. `None` when the
    /// secret is not registered; [`Lease::none`] before the initial fetch
    /// completes.
    pub async fn current_lease(&self, secret: &RequestedSecret) -> Option<Lease> {
        let state =
            self.inner.registrations.get(secret).map(|registration| Arc::clone(&registration.state));
        match state {
            Some(state) => Some(state.read().await.clone()),
            None => None,
        }
    }

    /// Register a listener for all managed secrets' lifecycle events.
    pub fn add_listener(&self, listener: Arc<dyn LeaseListener>) {
        self.inner.dispatcher.add_listener(listener);
    }

    /// Remove a listener previously added with [`Self::add_listener`],
    /// matched by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn LeaseListener>) -> bool {
        self.inner.dispatcher.remove_listener(listener)
    }

    /// Register an error listener.
    pub fn add_error_listener(&self, listener: Arc<dyn LeaseErrorListener>) {
        self.inner.dispatcher.add_error_listener(listener);
    }

    /// Remove an error listener, matched by identity.
    pub fn remove_error_listener(&self, listener: &Arc<dyn LeaseErrorListener>) -> bool {
        self.inner.dispatcher.remove_error_listener(listener)
    }

    /// Stop accepting registrations, cancel all pending timers, and (unless
    /// configured otherwise) revoke every held lease. One revocation
    /// failing does not prevent the rest from being attempted.
    pub async fn shutdown(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(
                managed = self.inner.registrations.len(),
                revoke = self.inner.config.revoke_on_shutdown,
                "Shutting down lease container"
            );
        }

        let secrets: Vec<RequestedSecret> =
            self.inner.registrations.iter().map(|entry| entry.key().clone()).collect();
        for secret in secrets {
            let Some((_, registration)) = self.inner.registrations.remove(&secret) else {
                continue;
            };
            registration.cancel.cancel();
            if self.inner.config.revoke_on_shutdown {
                let lease = registration.state.read().await.clone();
                revoke_lease(&self.inner, &secret, &lease).await;
            }
            for listener in &registration.listeners {
                self.inner.dispatcher.remove_listener(listener);
            }
        }
    }
}

/// Background management loop for one registration.
async fn manage_secret<S: SecretSource + 'static>(
    inner: Arc<ContainerInner<S>>,
    secret: RequestedSecret,
    cancel: CancellationToken,
    state: Arc<RwLock<Lease>>,
) {
    let fetched = match fetch_with_retry(&inner, &secret, None, &cancel).await {
        FetchOutcome::Fetched(fetched) => fetched,
        FetchOutcome::NotFound => {
            inner.dispatcher.dispatch(&LeaseEvent::SecretNotFound { secret: secret.clone() });
            remove_registration(&inner, &secret);
            return;
        }
        FetchOutcome::Exhausted => {
            tracing::warn!(secret = %secret, "Giving up on initial fetch after retries");
            remove_registration(&inner, &secret);
            return;
        }
        FetchOutcome::Cancelled => return,
    };

    let mut lease = fetched.lease;
    *state.write().await = lease.clone();
    inner.dispatcher.dispatch(&LeaseEvent::SecretCreated {
        secret: secret.clone(),
        lease: lease.clone(),
        body: fetched.body,
    });

    loop {
        let (rotation, delay) = match next_action(&inner.config, &secret, &lease) {
            NextAction::Renew(delay) => (false, delay),
            NextAction::Rotate(delay) => (true, delay),
            NextAction::Dormant => {
                tracing::debug!(secret = %secret, "Nothing to schedule; lease is dormant");
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        if rotation {
            match rotate(&inner, &secret, &lease, &state, &cancel).await {
                Some(next) => lease = next,
                None => return,
            }
            continue;
        }

        match renew_with_retry(&inner, &secret, &lease, &cancel).await {
            RenewOutcome::Renewed(renewed) => {
                *state.write().await = renewed.clone();
                lease = renewed;
                inner.dispatcher.dispatch(&LeaseEvent::LeaseRenewed {
                    secret: secret.clone(),
                    lease: lease.clone(),
                });
            }
            RenewOutcome::NotRenewable(error) => {
                if secret.mode() == Mode::Rotate {
                    // The designed trigger for rotation, not a failure.
                    match rotate(&inner, &secret, &lease, &state, &cancel).await {
                        Some(next) => lease = next,
                        None => return,
                    }
                } else {
                    inner.dispatcher.dispatch(&LeaseEvent::LeaseError {
                        secret: secret.clone(),
                        lease: Some(lease.clone()),
                        error: Arc::new(error),
                    });
                    inner.dispatcher.dispatch(&LeaseEvent::LeaseExpired {
                        secret: secret.clone(),
                        lease: lease.clone(),
                    });
                    return;
                }
            }
            RenewOutcome::Exhausted => {
                inner.dispatcher.dispatch(&LeaseEvent::LeaseExpired {
                    secret: secret.clone(),
                    lease: lease.clone(),
                });
                return;
            }
            RenewOutcome::Cancelled => return,
        }
    }
}

/// Fetch a fresh secret and publish the rotation. Returns the new lease, or
/// `None` when the task should stop (cancelled, path gone, retries spent).
async fn rotate<S: SecretSource>(
    inner: &ContainerInner<S>,
    secret: &RequestedSecret,
    previous: &Lease,
    state: &RwLock<Lease>,
    cancel: &CancellationToken,
) -> Option<Lease> {
    match fetch_with_retry(inner, secret, Some(previous), cancel).await {
        FetchOutcome::Fetched(fetched) => {
            *state.write().await = fetched.lease.clone();
            inner.dispatcher.dispatch(&LeaseEvent::SecretRotated {
                secret: secret.clone(),
                previous: previous.clone(),
                lease: fetched.lease.clone(),
                body: fetched.body,
            });
            Some(fetched.lease)
        }
        FetchOutcome::NotFound => {
            inner.dispatcher.dispatch(&LeaseEvent::SecretNotFound { secret: secret.clone() });
            remove_registration(inner, secret);
            None
        }
        FetchOutcome::Exhausted => {
            inner.dispatcher.dispatch(&LeaseEvent::LeaseExpired {
                secret: secret.clone(),
                lease: previous.clone(),
            });
            None
        }
        FetchOutcome::Cancelled => None,
    }
}

enum FetchOutcome {
    Fetched(FetchedSecret),
    NotFound,
    Exhausted,
    Cancelled,
}

async fn fetch_with_retry<S: SecretSource>(
    inner: &ContainerInner<S>,
    secret: &RequestedSecret,
    current: Option<&Lease>,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let mut backoff = inner.config.retry_backoff;
    for attempt in 0..=inner.config.max_retries {
        let result = inner.source.fetch(secret.path()).await;
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        match result {
            Ok(fetched) => return FetchOutcome::Fetched(fetched),
            Err(error @ Error::NotFound { .. }) => {
                tracing::debug!(secret = %secret, error = %error, "Secret path yielded no data");
                return FetchOutcome::NotFound;
            }
            Err(error) => {
                tracing::warn!(secret = %secret, attempt, error = %error, "Secret fetch failed");
                inner.dispatcher.dispatch(&LeaseEvent::LeaseError {
                    secret: secret.clone(),
                    lease: current.cloned(),
                    error: Arc::new(error),
                });
                if attempt == inner.config.max_retries {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return FetchOutcome::Cancelled,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
            }
        }
    }
    FetchOutcome::Exhausted
}

enum RenewOutcome {
    Renewed(Lease),
    NotRenewable(Error),
    Exhausted,
    Cancelled,
}

async fn renew_with_retry<S: SecretSource>(
    inner: &ContainerInner<S>,
    secret: &RequestedSecret,
    lease: &Lease,
    cancel: &CancellationToken,
) -> RenewOutcome {
    let mut backoff = inner.config.retry_backoff;
    for attempt in 0..=inner.config.max_retries {
        let result = inner.source.renew(lease).await;
        if cancel.is_cancelled() {
            return RenewOutcome::Cancelled;
        }
        match result {
            Ok(renewed) => return RenewOutcome::Renewed(renewed),
            Err(error @ Error::NotRenewable { .. }) => {
                tracing::debug!(secret = %secret, error = %error, "Renewal denied by server");
                return RenewOutcome::NotRenewable(error);
            }
            Err(error) => {
                tracing::warn!(secret = %secret, attempt, error = %error, "Lease renewal failed");
                inner.dispatcher.dispatch(&LeaseEvent::LeaseError {
                    secret: secret.clone(),
                    lease: Some(lease.clone()),
                    error: Arc::new(error),
                });
                if attempt == inner.config.max_retries {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return RenewOutcome::Cancelled,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
            }
        }
    }
    RenewOutcome::Exhausted
}

/// Emit the Before/After revocation event pair around a best-effort revoke.
/// A lease without an id has nothing to revoke and produces no events.
async fn revoke_lease<S: SecretSource>(
    inner: &ContainerInner<S>,
    secret: &RequestedSecret,
    lease: &Lease,
) {
    if !lease.has_lease_id() {
        return;
    }
    inner.dispatcher.dispatch(&LeaseEvent::BeforeLeaseRevocation {
        secret: secret.clone(),
        lease: lease.clone(),
    });
    if let Err(error) = inner.source.revoke(lease).await {
        tracing::warn!(
            secret = %secret,
            lease_id = ?lease.lease_id(),
            error = %error,
            "Lease revocation failed"
        );
        inner.dispatcher.dispatch(&LeaseEvent::LeaseError {
            secret: secret.clone(),
            lease: Some(lease.clone()),
            error: Arc::new(error),
        });
    }
    inner.dispatcher.dispatch(&LeaseEvent::AfterLeaseRevocation {
        secret: secret.clone(),
        lease: lease.clone(),
    });
}

/// Drop a registration from the registry and detach its listeners.
fn remove_registration<S: SecretSource>(inner: &ContainerInner<S>, secret: &RequestedSecret) {
    if let Some((_, registration)) = inner.registrations.remove(secret) {
        for listener in &registration.listeners {
            inner.dispatcher.remove_listener(listener);
        }
    }
}
