//! Third-party identity providers.
//!
//! A provider runs the interactive login and hands back a [`Credential`]: a
//! token the realtime store will accept, plus the user's id and display name.

use crate::error::{GatewayError, Result};
use crate::event_loop::EventLoop;
use crate::store::memory::MemoryStore;
use crate::store::{AuthInfo, Callback};
use crate::validation::require_key;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
}

pub trait IdentityProvider {
    /// Run the interactive login. Completes exactly once, or never if the
    /// user abandons the flow.
    fn sign_in(&self, on_complete: Callback<Credential>);
}

/// Provider for a local account: signing in mints a token in the store's
/// token table. Used by the CLI, where there is no browser popup.
pub struct LocalProvider {
    store: MemoryStore,
    account: String,
}

impl LocalProvider {
    pub fn new(store: MemoryStore, account: impl Into<String>) -> Self {
        Self {
            store,
            account: account.into(),
        }
    }

    pub fn user_id_for(account: &str) -> String {
        format!("local-{}", account.to_lowercase())
    }
}

impl IdentityProvider for LocalProvider {
    fn sign_in(&self, on_complete: Callback<Credential>) {
        let user_id = Self::user_id_for(&self.account);
        if let Err(err) = require_key("account", &user_id) {
            let message = err.to_string();
            self.store.event_loop().post(move || {
                on_complete(Err(GatewayError::AuthenticationFailed(message)))
            });
            return;
        }
        let token = self.store.issue_token(AuthInfo {
            user_id: user_id.clone(),
            display_name: self.account.clone(),
        });
        tracing::info!(user_id = %user_id, "Local sign-in");
        let credential = Credential {
            token,
            user_id,
            display_name: self.account.clone(),
        };
        self.store.event_loop().post(move || on_complete(Ok(credential)));
    }
}

/// Outcome a [`ScriptedProvider`] replays for one sign-in.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Mint a store token for this user and succeed.
    Grant { user_id: String, display_name: String },
    /// Fail with `AuthenticationFailed(reason)`.
    Reject(String),
    /// Never complete, as if the user closed the popup.
    Abandon,
}

/// Provider that replays queued outcomes, for tests and demos.
/// Clones share the queue and the call counter.
#[derive(Clone)]
pub struct ScriptedProvider {
    store: MemoryStore,
    event_loop: EventLoop,
    outcomes: Rc<RefCell<VecDeque<ScriptedOutcome>>>,
    calls: Rc<Cell<usize>>,
}

impl ScriptedProvider {
    pub fn new(store: MemoryStore) -> Self {
        let event_loop = store.event_loop().clone();
        Self {
            store,
            event_loop,
            outcomes: Rc::new(RefCell::new(VecDeque::new())),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn grant(&self, user_id: &str, display_name: &str) -> &Self {
        self.push(ScriptedOutcome::Grant {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        })
    }

    pub fn reject(&self, reason: &str) -> &Self {
        self.push(ScriptedOutcome::Reject(reason.to_string()))
    }

    pub fn push(&self, outcome: ScriptedOutcome) -> &Self {
        self.outcomes.borrow_mut().push_back(outcome);
        self
    }

    /// Number of `sign_in` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl IdentityProvider for ScriptedProvider {
    fn sign_in(&self, on_complete: Callback<Credential>) {
        self.calls.set(self.calls.get() + 1);
        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutcome::Reject("no scripted sign-in left".to_string()));
        let result: Result<Credential> = match outcome {
            ScriptedOutcome::Grant {
                user_id,
                display_name,
            } => {
                let token = self.store.issue_token(AuthInfo {
                    user_id: user_id.clone(),
                    display_name: display_name.clone(),
                });
                Ok(Credential {
                    token,
                    user_id,
                    display_name,
                })
            }
            ScriptedOutcome::Reject(reason) => Err(GatewayError::AuthenticationFailed(reason)),
            ScriptedOutcome::Abandon => return,
        };
        self.event_loop.post(move || on_complete(result));
    }
}
