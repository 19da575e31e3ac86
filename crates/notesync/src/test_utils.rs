use crate::auth::{Credential, ScriptedProvider};
use crate::credentials::MemoryCredentials;
use crate::event_loop::EventLoop;
use crate::gateway::Gateway;
use crate::model::{NoteDraft, NoteId, UserRecord};
use crate::path::StorePath;
use crate::request::RetryPolicy;
use crate::store::memory::MemoryStore;
use crate::store::RealtimeStore;
use serde_json::Value;

/// A gateway over an isolated in-memory store, with a scripted identity
/// provider and in-memory credentials. Every part is a shared handle, so the
/// fixture's copies observe what the gateway does.
pub struct GatewayFixture {
    pub event_loop: EventLoop,
    pub store: MemoryStore,
    pub provider: ScriptedProvider,
    pub credentials: MemoryCredentials,
    pub gateway: Gateway<MemoryStore>,
}

impl Default for GatewayFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayFixture {
    pub fn new() -> Self {
        Self::with_credentials(MemoryCredentials::new())
    }

    /// Starts with `credential` already persisted.
    pub fn with_credential(credential: Credential) -> Self {
        Self::with_credentials(MemoryCredentials::with_credential(&credential))
    }

    fn with_credentials(credentials: MemoryCredentials) -> Self {
        let event_loop = EventLoop::new();
        let store = MemoryStore::new(&event_loop);
        let provider = ScriptedProvider::new(store.clone());
        let gateway = Gateway::new(
            store.clone(),
            &event_loop,
            provider.clone(),
            credentials.clone(),
            RetryPolicy::default(),
        );
        Self {
            event_loop,
            store,
            provider,
            credentials,
            gateway,
        }
    }

    /// Completes an interactive first login for `user_id`.
    pub fn signed_in(user_id: &str, display_name: &str) -> Self {
        let fx = Self::new();
        fx.provider.grant(user_id, display_name);
        fx.gateway.login(false, |result| {
            result.expect("fixture login failed");
        });
        fx.run();
        assert!(fx.gateway.is_authenticated(), "fixture login did not finish");
        fx
    }

    pub fn run(&self) -> usize {
        self.event_loop.run_until_idle()
    }

    /// Writes `value` at `path` and delivers the resulting events.
    pub fn write(&self, path: &StorePath, value: Value) {
        self.store.set(
            path,
            value,
            Box::new(|result| result.expect("fixture write failed")),
        );
        self.run();
    }

    pub fn seed_user(&self, user_id: &str, name: &str) {
        let record = UserRecord::first_login(user_id, name);
        let value = serde_json::to_value(&record).expect("user record serializes");
        self.write(&crate::path::schema::user(user_id), value);
    }

    /// Creates a note through the gateway and waits for it to land.
    pub fn create_note(&self, draft: NoteDraft) -> NoteId {
        let id = self
            .gateway
            .create_note(draft, |result| {
                result.expect("fixture create_note failed");
            })
            .expect("fixture create_note rejected");
        self.run();
        id
    }
}
