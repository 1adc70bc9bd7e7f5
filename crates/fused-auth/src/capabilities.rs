//! Capability traits supplied by the host environment.
//!
//! The engine consumes these interfaces and never implements them: the
//! concrete authentication provider and document-store client live in
//! the host application (or in test fakes). Async capability methods
//! return boxed futures so the traits stay object-safe.

use crate::error::CapabilityError;
use crate::types::{ProfileDoc, SessionUser};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by capability methods.
pub type CapabilityFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, CapabilityError>> + Send>>;

/// Callback invoked on every provider session change.
///
/// `None` means no user is signed in.
pub type SessionCallback = Arc<dyn Fn(Option<SessionUser>) + Send + Sync>;

/// Callback invoked on every fused-document snapshot delivery.
pub type DocChangeCallback = Box<dyn Fn(ProfileDoc) + Send + Sync>;

/// Callback invoked when the fused-document change stream fails.
pub type DocErrorCallback = Box<dyn Fn(CapabilityError) + Send + Sync>;

/// Detaches a listener registration when dropped.
pub struct ListenerGuard {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    /// Wrap a detach closure. The closure runs exactly once, on
    /// [`detach`](Self::detach) or on drop, whichever comes first.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach the listener now. Equivalent to dropping the guard.
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// The external authentication service issuing and tracking sessions.
pub trait AuthProvider: Send + Sync {
    /// Register the long-lived session-change listener.
    ///
    /// The provider is expected to report the current session state
    /// promptly after registration and on every subsequent change.
    fn on_session_changed(&self, callback: SessionCallback) -> ListenerGuard;

    /// Create a new credential and sign its user in.
    fn create_credential(
        &self,
        email: &str,
        password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>>;

    /// Sign in with an existing credential.
    fn sign_in_with_credential(
        &self,
        email: &str,
        password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>>;

    /// End the active session.
    fn sign_out(&self) -> CapabilityFuture<()>;

    /// Re-prove the current credential.
    fn reauthenticate(
        &self,
        email: &str,
        password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>>;

    /// The currently active session, if any.
    fn current_session(&self) -> Option<Arc<dyn ProviderSession>>;
}

/// A live provider session exposing credential mutations.
pub trait ProviderSession: Send + Sync + std::fmt::Debug {
    /// Send a verification email for this session's address.
    fn send_verification_email(&self) -> CapabilityFuture<()>;

    /// Start a verify-before-update flow for a new email address.
    ///
    /// The address does not change until the user confirms out-of-band.
    fn verify_before_update_email(&self, new_email: &str) -> CapabilityFuture<()>;

    /// Replace the session's password immediately.
    fn update_password(&self, new_password: &str) -> CapabilityFuture<()>;
}

/// The document store holding fused profile records.
pub trait ProfileStore: Send + Sync {
    /// Fetch the document keyed by `key`, creating it with `defaults`
    /// when absent. Absence is not a failure; only store-level faults
    /// reject.
    fn get_or_create_document(
        &self,
        key: &str,
        defaults: Map<String, Value>,
    ) -> CapabilityFuture<Arc<dyn ProfileDocRef>>;
}

/// A revocable handle to a fused profile document.
pub trait ProfileDocRef: Send + Sync {
    /// Attach a change-stream listener. `on_next` receives every
    /// snapshot, including the initial one; `on_error` receives
    /// stream-level faults (e.g. access revoked after sign-out).
    fn on_change(&self, on_next: DocChangeCallback, on_error: DocErrorCallback) -> ListenerGuard;

    /// Write fields onto the document. The change stream observes the
    /// write.
    fn update(&self, fields: Map<String, Value>) -> CapabilityFuture<()>;
}
