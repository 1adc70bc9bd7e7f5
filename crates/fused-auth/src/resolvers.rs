//! Pure state resolvers.
//!
//! Deterministic mappings from a lifecycle event to the consolidated
//! status and the normalized user-data projection. No side effects;
//! identical inputs always resolve identically.

use crate::types::{fields, LifecycleEvent, ProfileDoc, SessionUser, Status, UserData};
use serde_json::{Map, Value};

/// Resolve the consolidated status for a lifecycle event.
pub fn resolve_status(event: &LifecycleEvent) -> Status {
    match event {
        LifecycleEvent::MechCreated => Status::Initializing,
        LifecycleEvent::UserSignedOut => Status::SignedOut,
        LifecycleEvent::UnfusedUserSignedIn { .. } => Status::SignedIn,
        LifecycleEvent::FusedUserSignedInOrUpdated { .. } => Status::SignedInFused,
    }
}

/// Resolve the user-data projection for a lifecycle event.
///
/// `None` for the signed-out and initializing states; otherwise the
/// merged projection of [`merge_user_data`].
pub fn resolve_user_data(event: &LifecycleEvent) -> Option<UserData> {
    match event {
        LifecycleEvent::MechCreated | LifecycleEvent::UserSignedOut => None,
        LifecycleEvent::UnfusedUserSignedIn { user } => Some(merge_user_data(user, None)),
        LifecycleEvent::FusedUserSignedInOrUpdated { user, doc } => {
            Some(merge_user_data(user, Some(doc)))
        }
    }
}

/// Total merge of the provider-user projection with document fields.
///
/// Starts from the normalized provider projection (`user_id`, `email`,
/// `email_verified`, `display_name` when present), then overlays every
/// document field. Document fields take precedence on key collision.
pub fn merge_user_data(user: &SessionUser, doc: Option<&ProfileDoc>) -> UserData {
    let mut merged = Map::new();
    merged.insert(fields::USER_ID.to_string(), Value::String(user.id.clone()));
    if let Some(email) = &user.email {
        merged.insert(fields::EMAIL.to_string(), Value::String(email.clone()));
    }
    merged.insert(
        fields::EMAIL_VERIFIED.to_string(),
        Value::Bool(user.email_verified),
    );
    if let Some(name) = &user.display_name {
        merged.insert(fields::DISPLAY_NAME.to_string(), Value::String(name.clone()));
    }

    if let Some(doc) = doc {
        for (key, value) in doc.fields() {
            merged.insert(key.clone(), value.clone());
        }
    }

    UserData::from_fields(merged)
}
