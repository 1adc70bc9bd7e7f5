//! Fuse operations.
//!
//! Async helpers the orchestrator runs around sensitive moments:
//! resolving the fused profile document for a signed-in identity, and
//! re-proving the current credential before a mutation.

use crate::capabilities::{AuthProvider, ProfileDocRef, ProfileStore, ProviderSession};
use crate::error::{AuthMechError, AuthResult};
use crate::types::{fields, SessionUser};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Default fields written when the profile document is created.
fn default_profile_fields(user: &SessionUser) -> Map<String, Value> {
    let mut defaults = Map::new();
    if let Some(email) = &user.email {
        defaults.insert(fields::EMAIL.to_string(), Value::String(email.clone()));
    }
    defaults.insert(
        "created_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    defaults
}

/// Create-or-fetch the fused profile document for a signed-in identity.
///
/// The document is keyed by the user's stable id. Absence of a
/// document is not a failure; the store creates it with default
/// fields. Only store-level faults reject.
pub async fn create_or_get_fused_doc_ref(
    user: &SessionUser,
    store: &dyn ProfileStore,
) -> AuthResult<Arc<dyn ProfileDocRef>> {
    debug!(user_id = %user.id, "resolving fused profile document");
    store
        .get_or_create_document(&user.id, default_profile_fields(user))
        .await
        .map_err(AuthMechError::store)
}

/// Re-prove the current credential before a sensitive mutation.
pub async fn reauthenticate(
    provider: &dyn AuthProvider,
    email: &str,
    password: &str,
) -> AuthResult<Arc<dyn ProviderSession>> {
    provider
        .reauthenticate(email, password)
        .await
        .map_err(|error| AuthMechError::Reauthentication(error.to_string()))
}
