//! Core types for the consolidated authentication state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field keys of the normalized user-data projection.
pub mod fields {
    /// Stable identity of the signed-in user.
    pub const USER_ID: &str = "user_id";
    /// Email address reported by the provider.
    pub const EMAIL: &str = "email";
    /// Whether the provider considers the email verified.
    pub const EMAIL_VERIFIED: &str = "email_verified";
    /// Display name reported by the provider, when present.
    pub const DISPLAY_NAME: &str = "display_name";
}

/// Consolidated authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No provider event has arrived yet.
    Initializing,
    /// The provider reports no active session.
    SignedOut,
    /// A session is active and no fuse target is configured.
    SignedIn,
    /// A session is active and its profile document is known and merged.
    SignedInFused,
}

impl Status {
    /// Returns true if a user session is active (fused or not).
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Status::SignedIn | Status::SignedInFused)
    }
}

/// Snapshot of the provider's view of a signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Stable identity assigned by the provider.
    pub id: String,
    /// Email address, when the credential carries one.
    pub email: Option<String>,
    /// Whether the provider considers the email verified.
    #[serde(default)]
    pub email_verified: bool,
    /// Display name, when the provider knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One delivery from the fused profile document's change stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileDoc {
    fields: Map<String, Value>,
}

impl ProfileDoc {
    /// Wrap a snapshot of document fields.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The document's fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Lifecycle event driving one reaction cycle.
///
/// Exactly one of these is processed per cycle; no event carries a
/// partial payload.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The orchestrator was constructed; emitted exactly once.
    MechCreated,
    /// The provider reported that no user is signed in.
    UserSignedOut,
    /// A user signed in and no fuse target is configured.
    UnfusedUserSignedIn {
        /// The provider's user snapshot.
        user: SessionUser,
    },
    /// A fused user signed in, or their profile document changed.
    FusedUserSignedInOrUpdated {
        /// The provider's user snapshot.
        user: SessionUser,
        /// The profile document snapshot delivered by the change stream.
        doc: ProfileDoc,
    },
}

/// Normalized user-data projection published with signed-in states.
///
/// Built by the total merge of the provider-user projection with the
/// fused document's fields; document fields take precedence on key
/// collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserData {
    fields: Map<String, Value>,
}

impl UserData {
    pub(crate) fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Stable identity of the signed-in user.
    pub fn user_id(&self) -> Option<&str> {
        self.fields.get(fields::USER_ID).and_then(Value::as_str)
    }

    /// Email address, when known.
    pub fn email(&self) -> Option<&str> {
        self.fields.get(fields::EMAIL).and_then(Value::as_str)
    }

    /// Whether the email is verified.
    pub fn email_verified(&self) -> bool {
        self.fields
            .get(fields::EMAIL_VERIFIED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Display name, when known.
    pub fn display_name(&self) -> Option<&str> {
        self.fields.get(fields::DISPLAY_NAME).and_then(Value::as_str)
    }

    /// Generic access to any projected field, including document fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The full projected field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// The consolidated authentication state.
///
/// `user_data` is `Some` iff `status` is signed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    /// Consolidated status.
    pub status: Status,
    /// Normalized user-data projection, present only while signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
}

/// One published transition: the new state paired with its immediate
/// predecessor so observers can diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// New status.
    pub status: Status,
    /// New user data, present only while signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
    /// Status immediately prior; `None` only for the first transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<Status>,
    /// User data immediately prior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_user_data: Option<UserData>,
}
