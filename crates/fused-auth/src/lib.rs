//! # fused-auth
//!
//! Reconciles an external authentication provider's session stream
//! with an optional "fused" profile document in a document store,
//! producing one consolidated, observable authentication state.
//!
//! ## Non-negotiable Principles
//!
//! - **The session stream drives every transition** - commands mutate
//!   credentials, never state
//! - **Transitions carry their predecessor** - observers diff instead
//!   of polling
//! - **Stale async results are discarded** - a generation token guards
//!   against sign-out racing in-flight document work
//! - **Document stream faults are non-fatal** - an access denial after
//!   sign-out is expected, logged, and dropped
//!
//! ## Architecture
//!
//! ```text
//! provider session stream ──► classify ──► react ──► publish (replay bus)
//!                                │
//!                 fused sign-in  ▼
//!         create-or-get profile doc ──► nested change stream ──► react
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use fused_auth::{AuthMech, MechOptions};
//! use std::sync::Arc;
//!
//! let mech = AuthMech::new(
//!     MechOptions::new()
//!         .provider(provider)       // Arc<dyn AuthProvider>
//!         .fuse(profile_store),     // Arc<dyn ProfileStore>
//! )?;
//!
//! let _sub = mech.subscribe(Arc::new(|change| {
//!     println!("{:?} -> {:?}", change.old_status, change.status);
//!     Ok(())
//! }));
//!
//! mech.sign_in("a@b.c", "secret").await?;
//! ```
//!
//! ## Crate Structure
//!
//! - [`capabilities`] - host-supplied provider/store interfaces
//! - [`mech`](AuthMech) - the orchestrator and command surface
//! - resolvers - pure event-to-state mappings
//! - operations - async fuse helpers

pub mod capabilities;
mod config;
mod error;
mod mech;
mod operations;
mod resolvers;
mod types;

pub use capabilities::{
    AuthProvider, CapabilityFuture, DocChangeCallback, DocErrorCallback, ListenerGuard,
    ProfileDocRef, ProfileStore, ProviderSession, SessionCallback,
};
pub use config::MechOptions;
pub use error::{AuthMechError, AuthResult, CapabilityError};
pub use mech::{AuthMech, AUTH_STATE_TOPIC};
pub use operations::{create_or_get_fused_doc_ref, reauthenticate};
pub use resolvers::{merge_user_data, resolve_status, resolve_user_data};
pub use types::{
    fields, AuthState, LifecycleEvent, ProfileDoc, SessionUser, StateChange, Status, UserData,
};

pub use replay_bus::{EventBus, Observer, ObserverError, Subscription};
