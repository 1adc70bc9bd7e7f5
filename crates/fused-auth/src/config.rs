//! Construction options and the resolved engine configuration.

use crate::capabilities::{AuthProvider, ListenerGuard, ProfileDocRef, ProfileStore};
use crate::error::{AuthMechError, AuthResult};
use crate::types::StateChange;
use replay_bus::EventBus;
use std::sync::{Arc, Mutex};

/// Raw construction options for [`AuthMech`](crate::AuthMech).
///
/// A provider capability is mandatory; a fuse target and a bus are
/// optional. Without an injected bus, each engine instance gets a
/// fresh one, so separate instances never cross-talk.
#[derive(Default)]
pub struct MechOptions {
    provider: Option<Arc<dyn AuthProvider>>,
    fuse_store: Option<Arc<dyn ProfileStore>>,
    bus: Option<EventBus<StateChange>>,
}

impl MechOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the authentication provider capability.
    pub fn provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Fuse sessions with profile documents held in `store`.
    pub fn fuse(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.fuse_store = Some(store);
        self
    }

    /// Publish transitions on an existing bus instead of a fresh one.
    pub fn bus(mut self, bus: EventBus<StateChange>) -> Self {
        self.bus = Some(bus);
        self
    }
}

/// The mutable slot holding the active fused document.
///
/// The orchestrator is the sole writer: the document reference and its
/// change-stream listener are stored when a fused sign-in resolves and
/// cleared exactly when sign-out is processed.
#[derive(Default)]
pub(crate) struct FuseCell {
    pub(crate) doc: Option<Arc<dyn ProfileDocRef>>,
    pub(crate) listener: Option<ListenerGuard>,
}

/// Normalized fuse target.
pub(crate) struct FuseConfig {
    pub(crate) store: Arc<dyn ProfileStore>,
    pub(crate) cell: Mutex<FuseCell>,
}

/// Immutable engine configuration, resolved once at construction.
pub(crate) struct Config {
    pub(crate) provider: Arc<dyn AuthProvider>,
    pub(crate) bus: EventBus<StateChange>,
    pub(crate) fuse: Option<FuseConfig>,
}

/// Validate and normalize construction options.
///
/// Pure and synchronous; the only structure built is the empty fuse
/// cell.
pub(crate) fn resolve_config(options: MechOptions) -> AuthResult<Config> {
    let provider = options.provider.ok_or_else(|| {
        AuthMechError::Config("an authentication provider capability is required".to_string())
    })?;

    let fuse = options.fuse_store.map(|store| FuseConfig {
        store,
        cell: Mutex::new(FuseCell::default()),
    });

    Ok(Config {
        provider,
        bus: options.bus.unwrap_or_default(),
        fuse,
    })
}
