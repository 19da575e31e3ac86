use super::push_id::PushIdGenerator;
use super::{
    tree, AuthInfo, Callback, Completion, DataSnapshot, EventKind, Handler, ListenerHandle,
    RealtimeStore,
};
use crate::error::{GatewayError, Result};
use crate::event_loop::EventLoop;
use crate::model::now_millis;
use crate::path::StorePath;
use crate::persist;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::rc::{Rc, Weak};

pub const DEFAULT_ENDPOINT: &str = "notesync-local";

thread_local! {
    static SHARED_TREES: RefCell<HashMap<String, Weak<TreeState>>> = RefCell::new(HashMap::new());
}

/// Simulated connectivity of the backing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outage {
    #[default]
    Online,
    /// Requests complete with [`GatewayError::StoreUnavailable`].
    Failing,
    /// Requests are swallowed: no effect, no completion.
    Hanging,
}

enum Admission {
    Proceed,
    Fail,
    Drop,
}

struct Listener {
    path: StorePath,
    kind: EventKind,
    event_loop: EventLoop,
    handler: Rc<RefCell<Handler>>,
}

/// What a listener saw before a write, to diff against afterwards.
enum Observed {
    Value(Option<Value>),
    Children(BTreeSet<String>),
}

struct TreeState {
    endpoint: String,
    data: RefCell<Value>,
    listeners: RefCell<BTreeMap<u64, Listener>>,
    next_listener: Cell<u64>,
    tokens: RefCell<BTreeMap<String, AuthInfo>>,
    push_ids: RefCell<PushIdGenerator>,
    outage: Cell<Outage>,
    drop_next: Cell<u32>,
    requests: Cell<u64>,
}

impl TreeState {
    fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            data: RefCell::new(tree::empty_root()),
            listeners: RefCell::new(BTreeMap::new()),
            next_listener: Cell::new(1),
            tokens: RefCell::new(BTreeMap::new()),
            push_ids: RefCell::new(PushIdGenerator::new()),
            outage: Cell::new(Outage::Online),
            drop_next: Cell::new(0),
            requests: Cell::new(0),
        }
    }

    fn admit(&self) -> Admission {
        self.requests.set(self.requests.get() + 1);
        let pending_drops = self.drop_next.get();
        if pending_drops > 0 {
            self.drop_next.set(pending_drops - 1);
            return Admission::Drop;
        }
        match self.outage.get() {
            Outage::Online => Admission::Proceed,
            Outage::Failing => Admission::Fail,
            Outage::Hanging => Admission::Drop,
        }
    }

    fn snapshot(&self, path: &StorePath) -> DataSnapshot {
        let data = self.data.borrow();
        DataSnapshot::new(path.clone(), tree::get(&data, path).cloned())
    }

    fn observe(&self, path: &StorePath, kind: EventKind) -> Observed {
        let data = self.data.borrow();
        match kind {
            EventKind::Value => Observed::Value(tree::get(&data, path).cloned()),
            EventKind::ChildAdded => {
                Observed::Children(tree::child_keys(&data, path).into_iter().collect())
            }
        }
    }
}

fn deliver(tree: &Weak<TreeState>, id: u64, snapshot: DataSnapshot) {
    let Some(tree) = tree.upgrade() else {
        return;
    };
    // Detached between scheduling and delivery: drop silently.
    let handler = match tree.listeners.borrow().get(&id) {
        Some(listener) => listener.handler.clone(),
        None => return,
    };
    let Ok(mut handler) = handler.try_borrow_mut() else {
        tracing::warn!(listener = id, "Handler is still running, dropping nested delivery");
        return;
    };
    (*handler)(snapshot);
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    endpoint: String,
    data: Value,
    #[serde(default)]
    tokens: BTreeMap<String, AuthInfo>,
}

/// In-process realtime store.
///
/// Uses `RefCell`/`Cell` for interior mutability since the whole system is
/// single-threaded. Handles created by [`MemoryStore::connect`] with the same
/// endpoint and `isolated == false` share one tree on the current thread;
/// authentication state is per handle.
#[derive(Clone)]
pub struct MemoryStore {
    tree: Rc<TreeState>,
    event_loop: EventLoop,
    auth: Rc<RefCell<Option<AuthInfo>>>,
}

impl MemoryStore {
    /// An isolated store on the default endpoint.
    pub fn new(event_loop: &EventLoop) -> Self {
        Self::connect(DEFAULT_ENDPOINT, true, event_loop)
    }

    pub fn connect(endpoint: &str, isolated: bool, event_loop: &EventLoop) -> Self {
        let tree = if isolated {
            Rc::new(TreeState::new(endpoint))
        } else {
            SHARED_TREES.with(|shared| {
                let mut shared = shared.borrow_mut();
                match shared.get(endpoint).and_then(Weak::upgrade) {
                    Some(tree) => tree,
                    None => {
                        let tree = Rc::new(TreeState::new(endpoint));
                        shared.insert(endpoint.to_string(), Rc::downgrade(&tree));
                        tree
                    }
                }
            })
        };
        tracing::debug!(endpoint, isolated, "Connected to memory store");
        Self {
            tree,
            event_loop: event_loop.clone(),
            auth: Rc::new(RefCell::new(None)),
        }
    }

    /// Connect as [`MemoryStore::connect`] does and seed the tree from a
    /// snapshot file, if one exists. A shared tree that already holds data
    /// is left alone.
    pub fn open(path: &Path, endpoint: &str, isolated: bool, event_loop: &EventLoop) -> Result<Self> {
        let store = Self::connect(endpoint, isolated, event_loop);
        let Some(snapshot) = persist::load_json::<SnapshotFile>(path)? else {
            return Ok(store);
        };
        let live = *store.tree.data.borrow() != tree::empty_root()
            || !store.tree.tokens.borrow().is_empty();
        if live {
            tracing::debug!(endpoint, path = %path.display(), "Shared tree is live, snapshot not loaded");
            return Ok(store);
        }
        if snapshot.endpoint != endpoint {
            tracing::warn!(
                expected = endpoint,
                found = %snapshot.endpoint,
                "Snapshot was written for a different endpoint"
            );
        }
        *store.tree.data.borrow_mut() =
            tree::normalize(snapshot.data).unwrap_or_else(tree::empty_root);
        *store.tree.tokens.borrow_mut() = snapshot.tokens;
        tracing::debug!(path = %path.display(), "Loaded store snapshot");
        Ok(store)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = SnapshotFile {
            endpoint: self.tree.endpoint.clone(),
            data: self.tree.data.borrow().clone(),
            tokens: self.tree.tokens.borrow().clone(),
        };
        persist::save_json(path, &snapshot)?;
        tracing::debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Register a token the store will accept for `info`.
    pub fn issue_token(&self, info: AuthInfo) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tree.tokens.borrow_mut().insert(token.clone(), info);
        token
    }

    pub fn revoke_token(&self, token: &str) -> bool {
        self.tree.tokens.borrow_mut().remove(token).is_some()
    }

    pub fn set_outage(&self, outage: Outage) {
        self.tree.outage.set(outage);
    }

    /// Swallow the next `count` requests regardless of the outage mode.
    pub fn drop_next_requests(&self, count: u32) {
        self.tree.drop_next.set(count);
    }

    /// Requests (reads, writes, authentications) received so far.
    pub fn requests_seen(&self) -> u64 {
        self.tree.requests.get()
    }

    pub fn listener_count(&self) -> usize {
        self.tree.listeners.borrow().len()
    }

    /// Synchronous read, bypassing the request path.
    pub fn value_at(&self, path: &StorePath) -> Option<Value> {
        tree::get(&self.tree.data.borrow(), path).cloned()
    }

    fn write(&self, path: &StorePath, on_complete: Completion, mutate: impl FnOnce(&mut Value)) {
        match self.tree.admit() {
            Admission::Drop => {
                tracing::debug!(path = %path, "Write swallowed");
                return;
            }
            Admission::Fail => {
                let endpoint = self.tree.endpoint.clone();
                self.event_loop.post(move || {
                    on_complete(Err(GatewayError::StoreUnavailable(format!(
                        "{} is unreachable",
                        endpoint
                    ))))
                });
                return;
            }
            Admission::Proceed => {}
        }

        let observed: Vec<(u64, Observed)> = self
            .tree
            .listeners
            .borrow()
            .iter()
            .filter(|(_, l)| l.path.overlaps(path))
            .map(|(id, l)| (*id, self.tree.observe(&l.path, l.kind)))
            .collect();

        mutate(&mut self.tree.data.borrow_mut());

        let weak = Rc::downgrade(&self.tree);
        for (id, before) in observed {
            let (listener_path, listener_loop) = match self.tree.listeners.borrow().get(&id) {
                Some(l) => (l.path.clone(), l.event_loop.clone()),
                None => continue,
            };
            match before {
                Observed::Value(before) => {
                    let snapshot = self.tree.snapshot(&listener_path);
                    if snapshot.value != before {
                        let weak = weak.clone();
                        listener_loop.post(move || deliver(&weak, id, snapshot));
                    }
                }
                Observed::Children(before) => {
                    for key in tree::child_keys(&self.tree.data.borrow(), &listener_path) {
                        if before.contains(&key) {
                            continue;
                        }
                        let snapshot = self.tree.snapshot(&listener_path.child(key));
                        let weak = weak.clone();
                        listener_loop.post(move || deliver(&weak, id, snapshot));
                    }
                }
            }
        }

        self.event_loop.post(move || on_complete(Ok(())));
    }
}

impl RealtimeStore for MemoryStore {
    fn once(&self, path: &StorePath, on_complete: Callback<DataSnapshot>) {
        match self.tree.admit() {
            Admission::Drop => {
                tracing::debug!(path = %path, "Read swallowed");
            }
            Admission::Fail => {
                let endpoint = self.tree.endpoint.clone();
                self.event_loop.post(move || {
                    on_complete(Err(GatewayError::StoreUnavailable(format!(
                        "{} is unreachable",
                        endpoint
                    ))))
                });
            }
            Admission::Proceed => {
                let snapshot = self.tree.snapshot(path);
                self.event_loop.post(move || on_complete(Ok(snapshot)));
            }
        }
    }

    fn on(&self, path: &StorePath, kind: EventKind, handler: Handler) -> ListenerHandle {
        let id = self.tree.next_listener.get();
        self.tree.next_listener.set(id + 1);
        self.tree.listeners.borrow_mut().insert(
            id,
            Listener {
                path: path.clone(),
                kind,
                event_loop: self.event_loop.clone(),
                handler: Rc::new(RefCell::new(handler)),
            },
        );

        let weak = Rc::downgrade(&self.tree);
        match kind {
            EventKind::Value => {
                let snapshot = self.tree.snapshot(path);
                self.event_loop.post(move || deliver(&weak, id, snapshot));
            }
            EventKind::ChildAdded => {
                let keys = tree::child_keys(&self.tree.data.borrow(), path);
                for key in keys {
                    let snapshot = self.tree.snapshot(&path.child(key));
                    let weak = weak.clone();
                    self.event_loop.post(move || deliver(&weak, id, snapshot));
                }
            }
        }
        tracing::debug!(path = %path, ?kind, listener = id, "Listener attached");
        ListenerHandle(id)
    }

    fn off(&self, handle: ListenerHandle) -> bool {
        let removed = self.tree.listeners.borrow_mut().remove(&handle.0).is_some();
        if removed {
            tracing::debug!(listener = handle.0, "Listener detached");
        }
        removed
    }

    fn set(&self, path: &StorePath, value: Value, on_complete: Completion) {
        let target = path.clone();
        self.write(path, on_complete, move |data| tree::set(data, &target, value));
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>, on_complete: Completion) {
        let target = path.clone();
        self.write(path, on_complete, move |data| {
            tree::update(data, &target, fields)
        });
    }

    fn push(&self, path: &StorePath, value: Value, on_complete: Completion) -> String {
        let key = self.tree.push_ids.borrow_mut().next_id(now_millis());
        self.set(&path.child(key.clone()), value, on_complete);
        key
    }

    fn authenticate(&self, token: &str, on_complete: Callback<AuthInfo>) {
        match self.tree.admit() {
            Admission::Drop => {
                tracing::debug!("Authentication request swallowed");
            }
            Admission::Fail => {
                let endpoint = self.tree.endpoint.clone();
                self.event_loop.post(move || {
                    on_complete(Err(GatewayError::StoreUnavailable(format!(
                        "{} is unreachable",
                        endpoint
                    ))))
                });
            }
            Admission::Proceed => {
                let found = self.tree.tokens.borrow().get(token).cloned();
                let auth = self.auth.clone();
                self.event_loop.post(move || match found {
                    Some(info) => {
                        *auth.borrow_mut() = Some(info.clone());
                        on_complete(Ok(info));
                    }
                    None => on_complete(Err(GatewayError::AuthenticationFailed(
                        "invalid or expired token".to_string(),
                    ))),
                });
            }
        }
    }

    fn unauthenticate(&self) {
        self.auth.borrow_mut().take();
    }

    fn auth(&self) -> Option<AuthInfo> {
        self.auth.borrow().clone()
    }
}
