//! # Session/Data Gateway
//!
//! The gateway is the single point of contact with the realtime store. It
//! owns the authentication lifecycle ([`session`]), the user-data reads and
//! subscriptions (this module), the note/tag/notebook writes ([`notes`]), and
//! the bookkeeping for every listener it attaches.
//!
//! ## Calling Convention
//!
//! - Argument and session checks run synchronously and come back as the
//!   method's `Err` (`InvalidArgument`, `NotAuthenticated`). Nothing has been
//!   sent to the store when that happens.
//! - Anything that touches the store completes through a callback, which runs
//!   on the event loop. One-shot callbacks run exactly once (subject to the
//!   retry policy in [`crate::request`]); subscription callbacks run until
//!   the subscription is cancelled.
//!
//! ## Subscriptions
//!
//! Every listener is recorded in a [`SubscriptionRegistry`]. [`Gateway::unload`]
//! detaches all of them in registration order; [`Gateway::cancel`] detaches
//! one. Subscribing twice to the same path yields two independent
//! subscriptions, and each change is delivered to both.

use crate::auth::IdentityProvider;
use crate::credentials::CredentialStore;
use crate::error::{GatewayError, Result};
use crate::event_loop::EventLoop;
use crate::model::{Collection, Note, NoteId, Session, TagIndex, UserRecord};
use crate::path::{schema, StorePath};
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::request::{with_retry, RetryPolicy};
use crate::store::{Callback, DataSnapshot, EventKind, RealtimeStore};
use crate::validation::require_key;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub mod notes;
pub mod session;

/// Returned by [`Gateway::on_note`]: the note subscription plus the reverse
/// index collections the caller may subscribe to next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFeed {
    pub subscription: SubscriptionId,
    pub tags: StorePath,
    pub notebooks: StorePath,
}

pub(crate) struct Inner<S: RealtimeStore> {
    pub(crate) store: S,
    pub(crate) event_loop: EventLoop,
    pub(crate) provider: Box<dyn IdentityProvider>,
    pub(crate) credentials: Box<dyn CredentialStore>,
    pub(crate) policy: RetryPolicy,
    pub(crate) session: RefCell<Option<Session>>,
    pub(crate) user: RefCell<Option<UserRecord>>,
    pub(crate) registry: RefCell<SubscriptionRegistry>,
}

/// Clones share one session and one registry.
pub struct Gateway<S: RealtimeStore> {
    pub(crate) inner: Rc<Inner<S>>,
}

impl<S: RealtimeStore> Clone for Gateway<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: RealtimeStore + 'static> Gateway<S> {
    pub fn new(
        store: S,
        event_loop: &EventLoop,
        provider: impl IdentityProvider + 'static,
        credentials: impl CredentialStore + 'static,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                store,
                event_loop: event_loop.clone(),
                provider: Box::new(provider),
                credentials: Box::new(credentials),
                policy,
                session: RefCell::new(None),
                user: RefCell::new(None),
                registry: RefCell::new(SubscriptionRegistry::new()),
            }),
        }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// The user record loaded at login.
    pub fn current_user(&self) -> Option<UserRecord> {
        self.inner.user.borrow().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Subscribe to a user's record. `on_change` runs with the current value,
    /// then again on every change, until the subscription is cancelled.
    /// Does not require a session.
    pub fn get_user_info(
        &self,
        user_id: &str,
        mut on_change: impl FnMut(Result<Option<UserRecord>>) + 'static,
    ) -> Result<SubscriptionId> {
        require_key("user id", user_id)?;
        let path = schema::user(user_id);
        Ok(self.subscribe(path, EventKind::Value, move |snap| {
            on_change(snap.deserialize::<UserRecord>())
        }))
    }

    /// One-shot fetch of a note. `on_complete` runs exactly once, with
    /// `Ok(None)` when the note does not exist.
    pub fn get_note(
        &self,
        user_id: &str,
        note_id: &str,
        on_complete: impl FnOnce(Result<Option<Note>>) + 'static,
    ) -> Result<()> {
        self.require_session()?;
        require_key("user id", user_id)?;
        require_key("note id", note_id)?;
        let path = schema::note(user_id, note_id);
        self.fetch(path, "get_note", move |result| {
            on_complete(result.and_then(|snap| snap.deserialize::<Note>()))
        });
        Ok(())
    }

    /// Subscribe to notes added to the signed-in user's collection: once per
    /// existing note in key order, then once per new note as it arrives.
    pub fn on_note(&self, mut on_note: impl FnMut(NoteId, Note) + 'static) -> Result<NoteFeed> {
        let session = self.require_session()?;
        let path = schema::notes(&session.user_id);
        let subscription = self.subscribe(path, EventKind::ChildAdded, move |snap| {
            let Some(note_id) = snap.key().map(str::to_string) else {
                return;
            };
            match snap.deserialize::<Note>() {
                Ok(Some(note)) => on_note(note_id, note),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(note_id = %note_id, error = %err, "Skipping malformed note")
                }
            }
        });
        Ok(NoteFeed {
            subscription,
            tags: schema::tags(&session.user_id),
            notebooks: schema::notebooks(&session.user_id),
        })
    }

    /// Subscribe to the tag reverse index: tag name -> ids of tagged notes.
    pub fn on_tags(
        &self,
        mut on_change: impl FnMut(BTreeMap<String, BTreeSet<NoteId>>) + 'static,
    ) -> Result<SubscriptionId> {
        let session = self.require_session()?;
        let path = schema::tags(&session.user_id);
        Ok(self.subscribe(path, EventKind::Value, move |snap| {
            match snap.deserialize::<Collection<TagIndex>>() {
                Ok(tags) => on_change(
                    tags.unwrap_or_default()
                        .into_entries()
                        .into_iter()
                        .map(|(tag, ids)| (tag, ids.into_keys().collect()))
                        .collect(),
                ),
                Err(err) => tracing::warn!(error = %err, "Malformed tag index"),
            }
        }))
    }

    /// Subscribe to the notebook reverse index: note id -> notebook name.
    pub fn on_notebooks(
        &self,
        mut on_change: impl FnMut(BTreeMap<NoteId, String>) + 'static,
    ) -> Result<SubscriptionId> {
        let session = self.require_session()?;
        let path = schema::notebooks(&session.user_id);
        Ok(self.subscribe(path, EventKind::Value, move |snap| {
            match snap.deserialize::<Collection<String>>() {
                Ok(notebooks) => on_change(notebooks.unwrap_or_default().into_entries()),
                Err(err) => tracing::warn!(error = %err, "Malformed notebook index"),
            }
        }))
    }

    /// Detach every subscription in registration order, then forget them all.
    /// Calling it with nothing registered does nothing.
    pub fn unload(&self) {
        let drained = self.inner.registry.borrow_mut().drain();
        if drained.is_empty() {
            return;
        }
        let count = drained.len();
        for (id, registration) in drained {
            if !self.inner.store.off(registration.handle) {
                tracing::debug!(subscription = %id, "Listener was already detached");
            }
        }
        tracing::debug!(count, "Unloaded subscriptions");
    }

    /// Detach a single subscription. Returns false if it was not registered.
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        let registration = self.inner.registry.borrow_mut().remove(id);
        match registration {
            Some(registration) => {
                self.inner.store.off(registration.handle);
                tracing::debug!(subscription = %id, path = %registration.path, "Cancelled subscription");
                true
            }
            None => false,
        }
    }

    pub(crate) fn require_session(&self) -> Result<Session> {
        self.inner
            .session
            .borrow()
            .clone()
            .ok_or(GatewayError::NotAuthenticated)
    }

    fn subscribe(
        &self,
        path: StorePath,
        kind: EventKind,
        handler: impl FnMut(DataSnapshot) + 'static,
    ) -> SubscriptionId {
        let handle = self.inner.store.on(&path, kind, Box::new(handler));
        let id = self.inner.registry.borrow_mut().register(path.clone(), kind, handle);
        tracing::debug!(subscription = %id, path = %path, ?kind, "Subscribed");
        id
    }

    /// One-shot read under the retry policy.
    pub(crate) fn fetch(
        &self,
        path: StorePath,
        label: &'static str,
        on_complete: impl FnOnce(Result<DataSnapshot>) + 'static,
    ) {
        let inner = self.inner.clone();
        let on_complete: Callback<DataSnapshot> = Box::new(on_complete);
        with_retry(
            &self.inner.event_loop,
            self.inner.policy,
            label,
            move |respond| inner.store.once(&path, respond),
            on_complete,
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GatewayError;
    use crate::model::{Note, NoteDraft};
    use crate::path::schema;
    use crate::store::memory::Outage;
    use crate::store::RealtimeStore;
    use crate::test_utils::GatewayFixture;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn collector<T: 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(T) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v| sink.borrow_mut().push(v))
    }

    #[test]
    fn test_get_user_info_without_session() {
        let fx = GatewayFixture::new();
        fx.seed_user("u1", "Ada");
        let (seen, sink) = collector();
        let mut sink = sink;
        fx.gateway
            .get_user_info("u1", move |r| sink(r.unwrap().map(|u| u.name)))
            .unwrap();
        fx.run();
        assert_eq!(*seen.borrow(), vec![Some("Ada".to_string())]);
    }

    #[test]
    fn test_get_user_info_rejects_bad_id() {
        let fx = GatewayFixture::new();
        let result = fx.gateway.get_user_info("u/1", |_| {});
        assert!(matches!(result, Err(GatewayError::InvalidArgument(_))));
        assert_eq!(fx.gateway.subscription_count(), 0);
    }

    #[test]
    fn test_duplicate_user_info_subscriptions_both_fire() {
        let fx = GatewayFixture::new();
        fx.seed_user("u1", "Ada");
        let (seen, sink) = collector::<String>();
        let sink = Rc::new(RefCell::new(sink));
        for _ in 0..2 {
            let sink = sink.clone();
            fx.gateway
                .get_user_info("u1", move |r| {
                    if let Ok(Some(user)) = r {
                        (*sink.borrow_mut())(user.name)
                    }
                })
                .unwrap();
        }
        fx.run();
        seen.borrow_mut().clear();

        fx.write(&schema::user("u1").child("name"), json!("Ada L."));
        assert_eq!(*seen.borrow(), vec!["Ada L.", "Ada L."]);
        assert_eq!(fx.gateway.subscription_count(), 2);
    }

    #[test]
    fn test_get_note_requires_session() {
        let fx = GatewayFixture::new();
        let called = Rc::new(RefCell::new(false));
        let flag = called.clone();
        let result = fx.gateway.get_note("u1", "n1", move |_| *flag.borrow_mut() = true);
        assert!(matches!(result, Err(GatewayError::NotAuthenticated)));
        fx.run();
        assert!(!*called.borrow());
    }

    #[test]
    fn test_get_note_fires_once_present_or_absent() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        fx.write(
            &schema::note("u1", "n1"),
            json!({"title": "Hello", "created": 1, "modified": 1}),
        );

        let (seen, sink) = collector::<Option<Note>>();
        let sink = Rc::new(RefCell::new(sink));
        for id in ["n1", "missing"] {
            let sink = sink.clone();
            fx.gateway
                .get_note("u1", id, move |r| (*sink.borrow_mut())(r.unwrap()))
                .unwrap();
        }
        assert!(seen.borrow().is_empty(), "callbacks run on the event loop");
        fx.run();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_ref().unwrap().title, "Hello");
        assert!(seen[1].is_none());
    }

    #[test]
    fn test_get_note_times_out_when_store_hangs() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        fx.store.set_outage(Outage::Hanging);
        let (seen, sink) = collector();
        let mut sink = sink;
        fx.gateway
            .get_note("u1", "n1", move |r| sink(r.map(|_| ())))
            .unwrap();
        fx.event_loop.advance(Duration::from_secs(60));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Err(GatewayError::StoreUnavailable(_))));
    }

    #[test]
    fn test_get_note_recovers_after_dropped_request() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        fx.write(
            &schema::note("u1", "n1"),
            json!({"title": "Hello", "created": 1, "modified": 1}),
        );
        fx.store.drop_next_requests(1);
        let (seen, sink) = collector();
        let mut sink = sink;
        fx.gateway
            .get_note("u1", "n1", move |r| sink(r.unwrap().map(|n| n.title)))
            .unwrap();
        fx.event_loop.run_to_completion();
        assert_eq!(*seen.borrow(), vec![Some("Hello".to_string())]);
    }

    #[test]
    fn test_on_note_delivers_in_arrival_order() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        let (seen, sink) = collector::<String>();
        let mut sink = sink;
        let feed = fx.gateway.on_note(move |id, _note| sink(id)).unwrap();
        assert_eq!(feed.tags, schema::tags("u1"));
        assert_eq!(feed.notebooks, schema::notebooks("u1"));

        for id in ["n1", "n2", "n3"] {
            fx.write(
                &schema::note("u1", id),
                json!({"title": id, "created": 1, "modified": 1}),
            );
        }
        assert_eq!(*seen.borrow(), vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_on_note_replays_existing_then_new() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        for title in ["first", "second"] {
            fx.create_note(NoteDraft::new(title));
        }
        let (seen, sink) = collector::<String>();
        let mut sink = sink;
        fx.gateway.on_note(move |_, note| sink(note.title)).unwrap();
        fx.run();
        fx.create_note(NoteDraft::new("third"));
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_on_note_requires_session() {
        let fx = GatewayFixture::new();
        assert!(matches!(
            fx.gateway.on_note(|_, _| {}),
            Err(GatewayError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_unload_detaches_everything() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        let (seen, sink) = collector::<&'static str>();
        let sink = Rc::new(RefCell::new(sink));
        let s1 = sink.clone();
        fx.gateway.get_user_info("u1", move |_| (*s1.borrow_mut())("user")).unwrap();
        let s2 = sink.clone();
        fx.gateway.on_note(move |_, _| (*s2.borrow_mut())("note")).unwrap();
        let s3 = sink.clone();
        fx.gateway.on_tags(move |_| (*s3.borrow_mut())("tags")).unwrap();
        fx.run();
        assert_eq!(fx.gateway.subscription_count(), 3);
        let listeners_before = fx.store.listener_count();

        fx.gateway.unload();
        assert_eq!(fx.gateway.subscription_count(), 0);
        assert_eq!(fx.store.listener_count(), listeners_before - 3);

        seen.borrow_mut().clear();
        fx.create_note(NoteDraft::new("after").tag("work"));
        assert!(seen.borrow().is_empty());

        fx.gateway.unload();
        assert_eq!(fx.gateway.subscription_count(), 0);
    }

    #[test]
    fn test_unload_drops_already_queued_deliveries() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        let (seen, sink) = collector::<String>();
        let mut sink = sink;
        fx.gateway.on_note(move |id, _| sink(id)).unwrap();
        fx.store.set(
            &schema::note("u1", "n1"),
            json!({"title": "t", "created": 1, "modified": 1}),
            Box::new(|_| {}),
        );
        fx.gateway.unload();
        fx.run();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_cancel_single_subscription() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        let (seen, sink) = collector::<&'static str>();
        let sink = Rc::new(RefCell::new(sink));
        let s1 = sink.clone();
        let user_sub = fx.gateway.get_user_info("u1", move |_| (*s1.borrow_mut())("user")).unwrap();
        let s2 = sink.clone();
        fx.gateway.on_note(move |_, _| (*s2.borrow_mut())("note")).unwrap();
        fx.run();
        seen.borrow_mut().clear();

        assert!(fx.gateway.cancel(user_sub));
        assert!(!fx.gateway.cancel(user_sub));
        assert_eq!(fx.gateway.subscription_count(), 1);

        fx.create_note(NoteDraft::new("x"));
        assert_eq!(*seen.borrow(), vec!["note"]);
    }

    #[test]
    fn test_on_tags_and_notebooks_follow_writes() {
        let fx = GatewayFixture::signed_in("u1", "Ada");
        let (tags, tag_sink) = collector();
        let mut tag_sink = tag_sink;
        fx.gateway.on_tags(move |t| tag_sink(t)).unwrap();
        let (books, book_sink) = collector();
        let mut book_sink = book_sink;
        fx.gateway.on_notebooks(move |b| book_sink(b)).unwrap();
        fx.run();
        assert!(tags.borrow()[0].is_empty(), "placeholder reads as empty");
        assert!(books.borrow()[0].is_empty());

        let id = fx.create_note(NoteDraft::new("x").tag("work").notebook("Inbox"));
        let last_tags = tags.borrow().last().cloned().unwrap();
        assert!(last_tags["work"].contains(&id));
        let last_books = books.borrow().last().cloned().unwrap();
        assert_eq!(last_books[&id], "Inbox");
    }
}
