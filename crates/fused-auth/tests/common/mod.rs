#![allow(dead_code)]

//! In-memory capability fakes for driving the engine in tests.
//!
//! The fakes record every capability call and let tests emit session
//! and document events deterministically.

use fused_auth::{
    AuthMech, AuthProvider, CapabilityFuture, DocChangeCallback, DocErrorCallback, ListenerGuard,
    Observer, ProfileDoc, ProfileDocRef, ProfileStore, ProviderSession, SessionCallback,
    SessionUser, StateChange, Subscription,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::Notify;

/// Build a session user snapshot.
pub fn test_user(id: &str, email: &str) -> SessionUser {
    SessionUser {
        id: id.to_string(),
        email: Some(email.to_string()),
        email_verified: false,
        display_name: None,
    }
}

/// Subscribe to the engine and collect every transition on a channel.
///
/// The replayed transition (if any) is already on the channel when
/// this returns.
pub fn watch(mech: &AuthMech) -> (Subscription<StateChange>, UnboundedReceiver<StateChange>) {
    let (tx, rx) = unbounded_channel();
    let observer: Observer<StateChange> = Arc::new(move |change: &StateChange| {
        let _ = tx.send(change.clone());
        Ok(())
    });
    (mech.subscribe(observer), rx)
}

/// In-memory authentication provider.
pub struct FakeProvider {
    callback: Arc<Mutex<Option<SessionCallback>>>,
    calls: Arc<Mutex<Vec<String>>>,
    session: Arc<FakeSession>,
    current: Mutex<Option<Arc<FakeSession>>>,
    sign_in_user: Mutex<Option<SessionUser>>,
    fail_sign_in: AtomicBool,
    fail_reauth: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        Arc::new(Self {
            callback: Arc::new(Mutex::new(None)),
            session: Arc::new(FakeSession {
                calls: calls.clone(),
            }),
            calls,
            current: Mutex::new(None),
            sign_in_user: Mutex::new(None),
            fail_sign_in: AtomicBool::new(false),
            fail_reauth: AtomicBool::new(false),
        })
    }

    /// Deliver a session event to the engine's listener.
    pub fn emit_session(&self, user: Option<SessionUser>) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(user);
        }
    }

    /// Make successful sign-in/sign-up calls emit this user on the
    /// session stream, like a real provider would.
    pub fn set_sign_in_user(&self, user: SessionUser) {
        *self.sign_in_user.lock().unwrap() = Some(user);
    }

    /// Expose a current session for `send_email_verification`.
    pub fn set_session_active(&self, active: bool) {
        *self.current.lock().unwrap() = if active {
            Some(self.session.clone())
        } else {
            None
        };
    }

    pub fn fail_sign_in(&self) {
        self.fail_sign_in.store(true, Ordering::SeqCst);
    }

    pub fn fail_reauth(&self) {
        self.fail_reauth.store(true, Ordering::SeqCst);
    }

    /// Every capability call recorded so far, in order.
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_listener(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn emit_configured_user(&self) {
        let user = self.sign_in_user.lock().unwrap().clone();
        if let Some(user) = user {
            self.emit_session(Some(user));
        }
    }
}

impl AuthProvider for FakeProvider {
    fn on_session_changed(&self, callback: SessionCallback) -> ListenerGuard {
        *self.callback.lock().unwrap() = Some(callback);
        let slot = Arc::clone(&self.callback);
        ListenerGuard::new(move || {
            *slot.lock().unwrap() = None;
        })
    }

    fn create_credential(
        &self,
        email: &str,
        _password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>> {
        self.record(format!("create_credential:{email}"));
        self.emit_configured_user();
        let session = self.session.clone() as Arc<dyn ProviderSession>;
        Box::pin(async move { Ok(session) })
    }

    fn sign_in_with_credential(
        &self,
        email: &str,
        _password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>> {
        self.record(format!("sign_in:{email}"));
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Box::pin(async { Err("invalid credentials".into()) });
        }
        self.emit_configured_user();
        let session = self.session.clone() as Arc<dyn ProviderSession>;
        Box::pin(async move { Ok(session) })
    }

    fn sign_out(&self) -> CapabilityFuture<()> {
        self.record("sign_out");
        let slot = Arc::clone(&self.callback);
        Box::pin(async move {
            let callback = slot.lock().unwrap().clone();
            if let Some(callback) = callback {
                callback(None);
            }
            Ok(())
        })
    }

    fn reauthenticate(
        &self,
        email: &str,
        _password: &str,
    ) -> CapabilityFuture<Arc<dyn ProviderSession>> {
        self.record(format!("reauthenticate:{email}"));
        if self.fail_reauth.load(Ordering::SeqCst) {
            return Box::pin(async { Err("credential rejected".into()) });
        }
        let session = self.session.clone() as Arc<dyn ProviderSession>;
        Box::pin(async move { Ok(session) })
    }

    fn current_session(&self) -> Option<Arc<dyn ProviderSession>> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .map(|session| session as Arc<dyn ProviderSession>)
    }
}

/// Session fake sharing the provider's call log.
#[derive(Debug)]
pub struct FakeSession {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ProviderSession for FakeSession {
    fn send_verification_email(&self) -> CapabilityFuture<()> {
        self.calls
            .lock()
            .unwrap()
            .push("send_verification_email".to_string());
        Box::pin(async { Ok(()) })
    }

    fn verify_before_update_email(&self, new_email: &str) -> CapabilityFuture<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("verify_before_update_email:{new_email}"));
        Box::pin(async { Ok(()) })
    }

    fn update_password(&self, new_password: &str) -> CapabilityFuture<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update_password:{new_password}"));
        Box::pin(async { Ok(()) })
    }
}

/// In-memory document store.
pub struct FakeStore {
    docs: Mutex<HashMap<String, Arc<FakeDocRef>>>,
    created: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    /// Notified each time a get-or-create resolves.
    pub resolved: Arc<Notify>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            docs: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            resolved: Arc::new(Notify::new()),
        })
    }

    /// Pre-populate a document so get-or-create fetches instead of
    /// creating.
    pub fn seed_doc(&self, key: &str, fields: Map<String, Value>) -> Arc<FakeDocRef> {
        let doc = Arc::new(FakeDocRef::new(fields));
        self.docs.lock().unwrap().insert(key.to_string(), doc.clone());
        doc
    }

    /// Make subsequent get-or-create calls wait until the returned
    /// gate is notified.
    pub fn hold_resolutions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Keys of documents created (not fetched) so far.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn doc_for(&self, key: &str) -> Option<Arc<FakeDocRef>> {
        self.docs.lock().unwrap().get(key).cloned()
    }
}

impl ProfileStore for FakeStore {
    fn get_or_create_document(
        &self,
        key: &str,
        defaults: Map<String, Value>,
    ) -> CapabilityFuture<Arc<dyn ProfileDocRef>> {
        let gate = self.gate.lock().unwrap().clone();
        let doc = {
            let mut docs = self.docs.lock().unwrap();
            match docs.get(key) {
                Some(doc) => doc.clone(),
                None => {
                    self.created.lock().unwrap().push(key.to_string());
                    let doc = Arc::new(FakeDocRef::new(defaults));
                    docs.insert(key.to_string(), doc.clone());
                    doc
                }
            }
        };
        let resolved = self.resolved.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            resolved.notify_one();
            Ok(doc as Arc<dyn ProfileDocRef>)
        })
    }
}

type DocListener = Arc<(DocChangeCallback, DocErrorCallback)>;

/// In-memory profile document with a synchronous change stream.
///
/// Attaching a listener delivers the current snapshot immediately,
/// matching document-store change-stream semantics.
pub struct FakeDocRef {
    fields: Mutex<Map<String, Value>>,
    listeners: Arc<Mutex<Vec<(u64, DocListener)>>>,
    next_listener_id: Mutex<u64>,
    updates: Mutex<Vec<Map<String, Value>>>,
}

impl FakeDocRef {
    fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields: Mutex::new(fields),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: Mutex::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    /// Deliver the current snapshot to every listener.
    pub fn emit_change(&self) {
        let snapshot = ProfileDoc::new(self.fields.lock().unwrap().clone());
        let listeners: Vec<DocListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            (listener.0)(snapshot.clone());
        }
    }

    /// Deliver a stream fault to every listener.
    pub fn emit_error(&self, message: &str) {
        let listeners: Vec<DocListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            (listener.1)(message.to_string().into());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Field maps passed to `update` so far.
    pub fn updates(&self) -> Vec<Map<String, Value>> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProfileDocRef for FakeDocRef {
    fn on_change(&self, on_next: DocChangeCallback, on_error: DocErrorCallback) -> ListenerGuard {
        // Initial snapshot, delivered before the registration returns.
        on_next(ProfileDoc::new(self.fields.lock().unwrap().clone()));

        let id = {
            let mut next = self.next_listener_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new((on_next, on_error))));

        let listeners = Arc::clone(&self.listeners);
        ListenerGuard::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    fn update(&self, fields: Map<String, Value>) -> CapabilityFuture<()> {
        self.updates.lock().unwrap().push(fields.clone());
        {
            let mut current = self.fields.lock().unwrap();
            for (key, value) in fields {
                current.insert(key, value);
            }
        }
        self.emit_change();
        Box::pin(async { Ok(()) })
    }
}
