//! Listener traits and the event dispatcher.
//!
//! Listeners are single-method capability traits; any `Fn` closure with the
//! right shape satisfies them. The [`EventDispatcher`] fans each event out
//! to a snapshot of the registered listeners, so dispatch never holds a lock
//! across a listener invocation and listeners may re-register secrets from
//! inside a callback.
//!
//! A listener that panics does not disturb delivery to the remaining
//! listeners or the scheduler's control flow: the panic is caught and
//! funneled to the error listeners. If no error listener has been registered
//! by the time dispatch first runs, a default one that logs through
//! `tracing` is installed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::event::LeaseEvent;

/// Receives lifecycle events for managed secrets.
pub trait LeaseListener: Send + Sync {
    fn on_lease_event(&self, event: &LeaseEvent);
}

impl<F> LeaseListener for F
where
    F: Fn(&LeaseEvent) + Send + Sync,
{
    fn on_lease_event(&self, event: &LeaseEvent) {
        self(event)
    }
}

/// Receives error notifications for failed lease operations and for
/// listener failures during dispatch.
pub trait LeaseErrorListener: Send + Sync {
    fn on_lease_error(&self, event: &LeaseEvent, error: &Error);
}

impl<F> LeaseErrorListener for F
where
    F: Fn(&LeaseEvent, &Error) + Send + Sync,
{
    fn on_lease_error(&self, event: &LeaseEvent, error: &Error) {
        self(event, error)
    }
}

/// Default error listener: one diagnostic log line per failure.
///
/// Stateless; constructed once at dispatcher initialization when the
/// application registered no error listener of its own.
pub struct LoggingErrorListener;

impl LeaseErrorListener for LoggingErrorListener {
    fn on_lease_error(&self, event: &LeaseEvent, error: &Error) {
        tracing::error!(
            secret = %event.secret(),
            kind = event.kind(),
            error = %error,
            "Lease operation failed"
        );
    }
}

/// Fan-out of lifecycle events to registered listeners.
///
/// Listener sets are read as snapshots: mutation replaces the set under a
/// short write lock while a dispatch in progress keeps iterating its own
/// copy. Regular events go to lease listeners; [`LeaseEvent::LeaseError`]
/// events go to error listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn LeaseListener>>>,
    error_listeners: RwLock<Vec<Arc<dyn LeaseErrorListener>>>,
    default_installed: AtomicBool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It receives every event dispatched from now on,
    /// in registration order relative to other listeners.
    pub fn add_listener(&self, listener: Arc<dyn LeaseListener>) {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        guard.push(listener);
    }

    /// Remove a previously registered listener, matched by identity.
    /// Returns whether it was present.
    pub fn remove_listener(&self, listener: &Arc<dyn LeaseListener>) -> bool {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|l| !Arc::ptr_eq(l, listener));
        guard.len() != before
    }

    /// Register an error listener.
    pub fn add_error_listener(&self, listener: Arc<dyn LeaseErrorListener>) {
        let mut guard = self.error_listeners.write().unwrap_or_else(|e| e.into_inner());
        guard.push(listener);
    }

    /// Remove a previously registered error listener, matched by identity.
    /// Returns whether it was present.
    pub fn remove_error_listener(&self, listener: &Arc<dyn LeaseErrorListener>) -> bool {
        let mut guard = self.error_listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|l| !Arc::ptr_eq(l, listener));
        guard.len() != before
    }

    /// Deliver an event to every registered listener, synchronously, on the
    /// calling task. Error events are routed to error listeners instead.
    pub fn dispatch(&self, event: &LeaseEvent) {
        self.ensure_default_error_listener();

        if let LeaseEvent::LeaseError { error, .. } = event {
            self.dispatch_error(event, error.as_ref());
            return;
        }

        let snapshot: Vec<_> = {
            let guard = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_lease_event(event))) {
                let failure = Error::listener_panic(panic_message(panic));
                self.dispatch_error(event, &failure);
            }
        }
    }

    fn dispatch_error(&self, event: &LeaseEvent, error: &Error) {
        let snapshot: Vec<_> = {
            let guard = self.error_listeners.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for listener in snapshot {
            // Last resort: a panic inside error handling is logged and
            // dropped, never fed back into dispatch.
            if catch_unwind(AssertUnwindSafe(|| listener.on_lease_error(event, error))).is_err() {
                tracing::error!(
                    secret = %event.secret(),
                    kind = event.kind(),
                    "Error listener panicked during dispatch"
                );
            }
        }
    }

    fn ensure_default_error_listener(&self) {
        if self.default_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.error_listeners.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_empty() {
            guard.push(Arc::new(LoggingErrorListener));
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}
