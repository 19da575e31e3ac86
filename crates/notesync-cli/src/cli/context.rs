use notesync::auth::LocalProvider;
use notesync::config::GatewayConfig;
use notesync::credentials::FileCredentials;
use notesync::event_loop::EventLoop;
use notesync::model::Session;
use notesync::store::memory::MemoryStore;
use notesync::store::Callback;
use notesync::{Gateway, GatewayError, Result};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const STORE_FILE: &str = "store.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Everything one CLI invocation works with. The store is loaded from the
/// data directory's snapshot and written back by [`AppContext::save`].
pub struct AppContext {
    pub data_dir: PathBuf,
    pub event_loop: EventLoop,
    pub store: MemoryStore,
    pub gateway: Gateway<MemoryStore>,
}

impl AppContext {
    /// `account` is who an interactive login signs in as.
    pub fn init(config_file: Option<&Path>, account: &str) -> Result<Self> {
        let config = GatewayConfig::load(config_file)?;
        let data_dir = config.data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let event_loop = EventLoop::new();
        let store = MemoryStore::open(
            &data_dir.join(STORE_FILE),
            &config.endpoint,
            config.isolated,
            &event_loop,
        )?;
        let credentials = FileCredentials::open(data_dir.join(CREDENTIALS_FILE))?;
        let gateway = Gateway::new(
            store.clone(),
            &event_loop,
            LocalProvider::new(store.clone(), account),
            credentials,
            config.retry_policy(),
        );
        tracing::debug!(
            data_dir = %data_dir.display(),
            endpoint = %config.endpoint,
            isolated = config.isolated,
            "Context ready"
        );
        Ok(Self {
            data_dir,
            event_loop,
            store,
            gateway,
        })
    }

    /// Start a callback-style operation and pump the loop until it reports.
    pub fn wait<T: 'static>(&self, start: impl FnOnce(Callback<T>) -> Result<()>) -> Result<T> {
        let slot: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));
        let sink = slot.clone();
        start(Box::new(move |result| *sink.borrow_mut() = Some(result)))?;
        self.event_loop.run_to_completion();
        let outcome = slot.borrow_mut().take();
        outcome.unwrap_or_else(|| {
            Err(GatewayError::StoreUnavailable(
                "operation never completed".to_string(),
            ))
        })
    }

    /// Reuse the stored credential without prompting.
    pub fn resume(&self) -> Result<Session> {
        self.wait(|cb| {
            self.gateway.login(true, cb);
            Ok(())
        })?;
        self.gateway.session().ok_or(GatewayError::NotAuthenticated)
    }

    pub fn save(&self) -> Result<()> {
        self.gateway.unload();
        self.store.save_snapshot(&self.data_dir.join(STORE_FILE))
    }
}

/// Default local account: `$USER`, or `me`.
pub fn default_account() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "me".to_string())
}
