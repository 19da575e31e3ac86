//! Locally persisted login state.
//!
//! Three string entries survive between runs: the auth token, the user id and
//! the display name. Logout clears all of them at once.

use crate::auth::Credential;
use crate::error::Result;
use crate::persist;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const USER_ID_KEY: &str = "user_id";
pub const DISPLAY_NAME_KEY: &str = "display_name";

/// String key/value storage for credentials.
pub trait CredentialStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;

    /// The stored credential, if a token is present.
    fn load_credential(&self) -> Option<Credential> {
        let token = self.get(AUTH_TOKEN_KEY).filter(|t| !t.is_empty())?;
        Some(Credential {
            token,
            user_id: self.get(USER_ID_KEY).unwrap_or_default(),
            display_name: self.get(DISPLAY_NAME_KEY).unwrap_or_default(),
        })
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        self.set(AUTH_TOKEN_KEY, &credential.token)?;
        self.set(USER_ID_KEY, &credential.user_id)?;
        self.set(DISPLAY_NAME_KEY, &credential.display_name)
    }
}

/// In-memory credentials. Clones share state so tests can inspect what the
/// gateway wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: &Credential) -> Self {
        let creds = Self::new();
        {
            let mut entries = creds.entries.borrow_mut();
            entries.insert(AUTH_TOKEN_KEY.to_string(), credential.token.clone());
            entries.insert(USER_ID_KEY.to_string(), credential.user_id.clone());
            entries.insert(DISPLAY_NAME_KEY.to_string(), credential.display_name.clone());
        }
        creds
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CredentialStore for MemoryCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// Credentials kept in a JSON file, rewritten atomically on every change.
pub struct FileCredentials {
    path: PathBuf,
    cache: RefCell<BTreeMap<String, String>>,
}

impl FileCredentials {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = persist::load_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            cache: RefCell::new(cache),
        })
    }

    fn flush(&self) -> Result<()> {
        let cache = self.cache.borrow();
        if cache.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        persist::save_json(&self.path, &*cache)
    }
}

impl CredentialStore for FileCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.cache
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn clear(&self) -> Result<()> {
        self.cache.borrow_mut().clear();
        self.flush()
    }
}
