//! Authentication lifecycle.
//!
//! ```text
//! login(silent)
//!   stored credential?  yes -> authenticate(token) --ok--> load or create record -> online
//!                                      | auth failure (first time only)
//!                                      v
//!                              clear credential, start over
//!                       no, silent   -> NotAuthenticated
//!                       no           -> provider sign-in -> persist -> authenticate -> ...
//! ```

use super::Gateway;
use crate::error::{GatewayError, Result};
use crate::model::{Presence, Session, UserRecord};
use crate::path::schema;
use crate::request::with_retry;
use crate::store::{detached, AuthInfo, Callback, RealtimeStore};
use serde_json::Value;

impl<S: RealtimeStore + 'static> Gateway<S> {
    /// Sign in and load the user's record.
    ///
    /// With a stored credential the store is re-authenticated with it. If the
    /// store rejects it, the credential is cleared and the flow starts over
    /// once. Without a credential a `silent` login fails with
    /// [`GatewayError::NotAuthenticated`] immediately, touching neither the
    /// provider nor the store; otherwise the identity provider runs.
    ///
    /// `on_complete` runs exactly once.
    pub fn login(&self, silent: bool, on_complete: impl FnOnce(Result<UserRecord>) + 'static) {
        self.login_flow(silent, true, Box::new(on_complete));
    }

    /// Mark the user offline, drop the store's authentication, and forget the
    /// stored credential and session. Best effort: nothing is reported.
    pub fn logout(&self) {
        let session = self.inner.session.borrow_mut().take();
        self.inner.user.borrow_mut().take();
        if let Some(session) = &session {
            self.inner.store.set(
                &schema::status(&session.user_id),
                Value::from(Presence::Offline.as_str()),
                detached("mark_offline"),
            );
        }
        self.forget_credentials();
        match session {
            Some(session) => tracing::info!(user_id = %session.user_id, "Signed out"),
            None => tracing::debug!("Logout without a session"),
        }
    }

    fn login_flow(&self, silent: bool, may_retry: bool, on_complete: Callback<UserRecord>) {
        let Some(credential) = self.inner.credentials.load_credential() else {
            if silent {
                tracing::debug!("No stored credential, silent login fails");
                on_complete(Err(GatewayError::NotAuthenticated));
            } else {
                self.sign_in(on_complete);
            }
            return;
        };

        tracing::debug!(user_id = %credential.user_id, "Re-authenticating with stored credential");
        let gateway = self.clone();
        self.authenticate(credential.token, move |result| match result {
            Ok(info) => gateway.establish(info, on_complete),
            Err(err) if err.is_auth_failure() && may_retry => {
                tracing::info!(error = %err, "Stored credential rejected, starting over");
                gateway.forget_credentials();
                gateway.login_flow(silent, false, on_complete);
            }
            Err(err) => on_complete(Err(err)),
        });
    }

    fn sign_in(&self, on_complete: Callback<UserRecord>) {
        let gateway = self.clone();
        self.inner.provider.sign_in(Box::new(move |result| {
            let credential = match result {
                Ok(credential) => credential,
                Err(err) => {
                    tracing::warn!(error = %err, "Interactive sign-in failed");
                    return on_complete(Err(err));
                }
            };
            if let Err(err) = gateway.inner.credentials.save_credential(&credential) {
                return on_complete(Err(err));
            }
            let next = gateway.clone();
            gateway.authenticate(credential.token, move |result| match result {
                Ok(info) => next.establish(info, on_complete),
                Err(err) => {
                    next.forget_credentials();
                    on_complete(Err(err));
                }
            });
        }));
    }

    fn authenticate(&self, token: String, on_complete: impl FnOnce(Result<AuthInfo>) + 'static) {
        let inner = self.inner.clone();
        with_retry(
            &self.inner.event_loop,
            self.inner.policy,
            "authenticate",
            move |respond| inner.store.authenticate(&token, respond),
            Box::new(on_complete),
        );
    }

    /// Load the user's record, creating it on first login.
    fn establish(&self, info: AuthInfo, on_complete: Callback<UserRecord>) {
        let path = schema::user(&info.user_id);
        let gateway = self.clone();
        self.fetch(path.clone(), "load_user", move |result| {
            let existing = match result.and_then(|snap| snap.deserialize::<UserRecord>()) {
                Ok(existing) => existing,
                Err(err) => return on_complete(Err(err)),
            };
            if let Some(record) = existing {
                return gateway.go_online(info, record, on_complete);
            }

            let record = UserRecord::first_login(&info.user_id, &info.display_name);
            let value = match serde_json::to_value(&record) {
                Ok(value) => value,
                Err(err) => return on_complete(Err(err.into())),
            };
            tracing::info!(user_id = %info.user_id, "Creating user record on first login");
            let next = gateway.clone();
            gateway.inner.store.set(
                &path,
                value,
                Box::new(move |result| match result {
                    Ok(()) => next.go_online(info, record, on_complete),
                    Err(err) => on_complete(Err(err)),
                }),
            );
        });
    }

    fn go_online(&self, info: AuthInfo, mut record: UserRecord, on_complete: Callback<UserRecord>) {
        self.inner.store.set(
            &schema::status(&info.user_id),
            Value::from(Presence::Online.as_str()),
            detached("mark_online"),
        );
        record.status = Presence::Online;
        *self.inner.user.borrow_mut() = Some(record.clone());
        *self.inner.session.borrow_mut() = Some(Session {
            user_id: info.user_id.clone(),
            display_name: info.display_name,
        });
        tracing::info!(user_id = %info.user_id, "Signed in");
        on_complete(Ok(record));
    }

    fn forget_credentials(&self) {
        if let Err(err) = self.inner.credentials.clear() {
            tracing::warn!(error = %err, "Could not clear stored credential");
        }
        self.inner.store.unauthenticate();
    }
}
