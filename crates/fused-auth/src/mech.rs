//! The auth orchestrator.
//!
//! `AuthMech` owns the consolidated state, drives every transition
//! from the provider's session stream, manages the nested
//! profile-document listener while a fused user is signed in, and
//! exposes the guarded command surface.

use crate::capabilities::{DocChangeCallback, DocErrorCallback, ListenerGuard, ProfileDocRef};
use crate::config::{resolve_config, Config, MechOptions};
use crate::error::{AuthMechError, AuthResult};
use crate::operations::{create_or_get_fused_doc_ref, reauthenticate};
use crate::resolvers::{resolve_status, resolve_user_data};
use crate::types::{AuthState, LifecycleEvent, SessionUser, StateChange, Status};
use replay_bus::{EventBus, Observer, Subscription};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Topic the consolidated state transitions are published on.
pub const AUTH_STATE_TOPIC: &str = "auth.state.changed";

/// The auth orchestrator.
///
/// Construct it with [`MechOptions`]; it immediately publishes the
/// `Initializing` state and attaches itself to the provider's session
/// stream, which remains the only driver of all subsequent
/// transitions. Commands delegate to the provider/store capabilities
/// and rely on the listeners to observe the resulting state change
/// rather than returning it.
///
/// Must be constructed inside a tokio runtime: the fused-document
/// resolution triggered by session events runs on the runtime captured
/// at construction.
pub struct AuthMech {
    inner: Arc<MechInner>,
    /// Held for the orchestrator's lifetime; dropping it detaches the
    /// provider listener.
    _session_listener: ListenerGuard,
}

struct MechInner {
    config: Config,
    runtime: Handle,
    /// Current consolidated state. `None` only before the construction
    /// reaction runs.
    state: Mutex<Option<AuthState>>,
    /// Serializes reactions: the state swap and its publish happen
    /// under this lock, so no two transitions interleave and publish
    /// order matches reaction order.
    reaction: Mutex<()>,
    /// Bumped on every provider session event. Async completions carry
    /// the generation they started under; a mismatch means a later
    /// event superseded them and their results must be discarded.
    generation: AtomicU64,
}

impl AuthMech {
    /// Resolve the options and start the engine.
    pub fn new(options: MechOptions) -> AuthResult<Self> {
        let config = resolve_config(options)?;
        let runtime = Handle::try_current().map_err(|_| {
            AuthMechError::Config(
                "AuthMech must be constructed inside a tokio runtime".to_string(),
            )
        })?;

        let inner = Arc::new(MechInner {
            config,
            runtime,
            state: Mutex::new(None),
            reaction: Mutex::new(()),
            generation: AtomicU64::new(0),
        });

        inner.react(LifecycleEvent::MechCreated);
        let session_listener = MechInner::link_provider(&inner);
        info!(fused = inner.config.fuse.is_some(), "auth mech created");

        Ok(Self {
            inner,
            _session_listener: session_listener,
        })
    }

    /// Current consolidated state.
    pub fn state(&self) -> AuthState {
        self.inner.current_state()
    }

    /// Subscribe to consolidated state transitions.
    ///
    /// The most recent transition is replayed immediately, before this
    /// call returns, even if it predates the subscription.
    pub fn subscribe(&self, observer: Observer<StateChange>) -> Subscription<StateChange> {
        self.inner
            .config
            .bus
            .subscribe(AUTH_STATE_TOPIC, observer, true)
    }

    /// The bus carrying this engine's transitions on
    /// [`AUTH_STATE_TOPIC`].
    pub fn bus(&self) -> &EventBus<StateChange> {
        &self.inner.config.bus
    }

    /// Create a credential and send the verification email on the
    /// resulting session.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<()> {
        debug!(email, "signing up");
        let session = self
            .inner
            .config
            .provider
            .create_credential(email, password)
            .await
            .map_err(AuthMechError::provider)?;
        session
            .send_verification_email()
            .await
            .map_err(AuthMechError::provider)
    }

    /// Sign in with an existing credential.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        debug!(email, "signing in");
        self.inner
            .config
            .provider
            .sign_in_with_credential(email, password)
            .await
            .map_err(AuthMechError::provider)?;
        Ok(())
    }

    /// End the active session.
    ///
    /// The resulting session-stream event drives the `SignedOut`
    /// transition; this command mutates no state itself.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.inner
            .config
            .provider
            .sign_out()
            .await
            .map_err(AuthMechError::provider)
    }

    /// Start a verify-before-update flow for a new email address.
    ///
    /// Re-authenticates first; the address does not change until the
    /// user confirms out-of-band.
    pub async fn update_email(&self, new_email: &str, password: &str) -> AuthResult<()> {
        let current_email = self.current_email()?;
        if new_email == current_email {
            return Err(AuthMechError::validation("new email must differ from current"));
        }
        if password.is_empty() {
            return Err(AuthMechError::validation(
                "must provide current password to confirm",
            ));
        }

        let session =
            reauthenticate(self.inner.config.provider.as_ref(), &current_email, password).await?;
        session
            .verify_before_update_email(new_email)
            .await
            .map_err(AuthMechError::provider)
    }

    /// Replace the password after re-authenticating.
    pub async fn update_password(&self, new_password: &str, password: &str) -> AuthResult<()> {
        if new_password == password {
            return Err(AuthMechError::validation(
                "new password must differ from current",
            ));
        }
        if password.is_empty() {
            return Err(AuthMechError::validation(
                "must provide current password to confirm",
            ));
        }

        let current_email = self.current_email()?;
        let session =
            reauthenticate(self.inner.config.provider.as_ref(), &current_email, password).await?;
        session
            .update_password(new_password)
            .await
            .map_err(AuthMechError::provider)
    }

    /// Write properties onto the fused profile document.
    ///
    /// The document's change stream observes the write and drives the
    /// resulting state transition; nothing is returned synchronously.
    pub async fn update_props(&self, props: Map<String, Value>) -> AuthResult<()> {
        let Some(fuse) = self.inner.config.fuse.as_ref() else {
            return Err(AuthMechError::validation("unable to find fuse configuration"));
        };

        let doc = fuse
            .cell
            .lock()
            .expect("fuse cell lock poisoned")
            .doc
            .clone();
        let Some(doc) = doc else {
            return Err(AuthMechError::validation(
                "no fused profile document is active",
            ));
        };

        doc.update(props).await.map_err(AuthMechError::store)
    }

    /// Re-send the verification email for the active session.
    pub async fn send_email_verification(&self) -> AuthResult<()> {
        let Some(session) = self.inner.config.provider.current_session() else {
            return Err(AuthMechError::validation("no user is signed in"));
        };
        session
            .send_verification_email()
            .await
            .map_err(AuthMechError::provider)
    }

    fn current_email(&self) -> AuthResult<String> {
        self.inner
            .current_state()
            .user_data
            .as_ref()
            .and_then(|data| data.email().map(str::to_string))
            .ok_or_else(|| AuthMechError::validation("no signed-in user with a known email"))
    }
}

impl MechInner {
    /// Attach the single long-lived listener to the provider's session
    /// stream.
    fn link_provider(inner: &Arc<MechInner>) -> ListenerGuard {
        let weak = Arc::downgrade(inner);
        inner
            .config
            .provider
            .on_session_changed(Arc::new(move |user| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_session_event(user);
                }
            }))
    }

    /// Classify one provider session event and drive the matching
    /// reaction.
    fn on_session_event(self: Arc<Self>, user: Option<SessionUser>) {
        // Every session event starts a new epoch; in-flight document
        // work from earlier epochs must not apply its results.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(user) = user else {
            self.react(LifecycleEvent::UserSignedOut);
            return;
        };

        let Some(fuse) = self.config.fuse.as_ref() else {
            self.react(LifecycleEvent::UnfusedUserSignedIn { user });
            return;
        };

        debug!(user_id = %user.id, "fused sign-in detected, resolving profile document");
        let store = Arc::clone(&fuse.store);
        let inner = Arc::clone(&self);
        self.runtime.spawn(async move {
            match create_or_get_fused_doc_ref(&user, store.as_ref()).await {
                Ok(doc_ref) => inner.attach_doc_listener(generation, user, doc_ref),
                Err(err) => {
                    // No command awaits this resolution, so the fault
                    // cannot be returned to a caller.
                    error!(user_id = %user.id, error = %err, "fused profile document resolution failed");
                }
            }
        });
    }

    /// Store the resolved document and attach the nested change-stream
    /// listener, unless a later session event made the resolution
    /// stale.
    ///
    /// The cell lock is never held across `on_change`: the listener's
    /// first delivery may run a reaction synchronously, and a reaction
    /// for a concurrent sign-out takes the cell lock from under the
    /// reaction lock.
    fn attach_doc_listener(
        self: &Arc<Self>,
        generation: u64,
        user: SessionUser,
        doc_ref: Arc<dyn ProfileDocRef>,
    ) {
        let Some(fuse) = self.config.fuse.as_ref() else {
            return;
        };

        // Publish the reference first, under the cell lock, so the
        // check and the store cannot interleave with a racing
        // sign-out.
        {
            let mut cell = fuse.cell.lock().expect("fuse cell lock poisoned");
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(user_id = %user.id, "discarding stale profile document resolution");
                return;
            }
            cell.doc = Some(Arc::clone(&doc_ref));
        }

        let weak = Arc::downgrade(self);
        let listener_user = user.clone();
        let on_next: DocChangeCallback = Box::new(move |doc| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.load(Ordering::SeqCst) != generation {
                debug!("discarding stale profile document delivery");
                return;
            }
            inner.react(LifecycleEvent::FusedUserSignedInOrUpdated {
                user: listener_user.clone(),
                doc,
            });
        });
        // Access denial after a sign-out race is expected; it must
        // never corrupt state or surface as a fault.
        let on_error: DocErrorCallback = Box::new(|err| {
            warn!(error = %err, "fused document change stream raised an error");
        });

        let listener = doc_ref.on_change(on_next, on_error);

        // A sign-out (or a newer sign-in) may have raced the attach;
        // if so, undo it instead of resurrecting the reference.
        let stale_listener = {
            let mut cell = fuse.cell.lock().expect("fuse cell lock poisoned");
            if self.generation.load(Ordering::SeqCst) != generation {
                let ours = cell
                    .doc
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &doc_ref));
                if ours {
                    cell.doc = None;
                }
                Some(listener)
            } else {
                cell.listener = Some(listener);
                None
            }
        };
        if let Some(listener) = stale_listener {
            debug!(user_id = %user.id, "detaching listener attached by a stale resolution");
            listener.detach();
        }
    }

    /// One reaction cycle: resolve the event into the next state,
    /// replace the current state, publish the transition paired with
    /// its predecessor.
    fn react(&self, event: LifecycleEvent) {
        let _cycle = self.reaction.lock().expect("reaction lock poisoned");

        if matches!(event, LifecycleEvent::UserSignedOut) {
            self.clear_fused_doc();
        }

        let status = resolve_status(&event);
        let user_data = resolve_user_data(&event);

        let (old_status, old_user_data) = {
            let mut state = self.state.lock().expect("state lock poisoned");
            let previous = state.take();
            *state = Some(AuthState {
                status,
                user_data: user_data.clone(),
            });
            match previous {
                Some(previous) => (Some(previous.status), previous.user_data),
                None => (None, None),
            }
        };

        debug!(status = ?status, old_status = ?old_status, "publishing auth state transition");
        self.config.bus.publish(
            AUTH_STATE_TOPIC,
            StateChange {
                status,
                user_data,
                old_status,
                old_user_data,
            },
        );
    }

    /// Null the document reference and detach the nested listener.
    ///
    /// Precondition of the sign-out reaction; after this, only a fresh
    /// sign-in resolution (with a current generation) may repopulate
    /// the cell.
    fn clear_fused_doc(&self) {
        if let Some(fuse) = self.config.fuse.as_ref() {
            let listener = {
                let mut cell = fuse.cell.lock().expect("fuse cell lock poisoned");
                cell.doc = None;
                cell.listener.take()
            };
            // Dropping the guard detaches the change-stream listener;
            // done outside the cell lock because detaching calls back
            // into the store client.
            drop(listener);
        }
    }

    fn current_state(&self) -> AuthState {
        self.state
            .lock()
            .expect("state lock poisoned")
            .clone()
            .unwrap_or(AuthState {
                status: Status::Initializing,
                user_data: None,
            })
    }
}
