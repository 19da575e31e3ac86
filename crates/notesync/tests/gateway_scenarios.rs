//! End-to-end gateway behaviour through the public API only.

use notesync::auth::{Credential, ScriptedProvider};
use notesync::credentials::{CredentialStore, MemoryCredentials};
use notesync::event_loop::EventLoop;
use notesync::model::{Collection, NoteDraft, UserRecord};
use notesync::path::schema;
use notesync::request::RetryPolicy;
use notesync::store::memory::MemoryStore;
use notesync::{Gateway, GatewayError};
use std::cell::RefCell;
use std::rc::Rc;

struct Device {
    store: MemoryStore,
    provider: ScriptedProvider,
    credentials: MemoryCredentials,
    gateway: Gateway<MemoryStore>,
}

fn device(event_loop: &EventLoop, endpoint: &str, credentials: MemoryCredentials) -> Device {
    let store = MemoryStore::connect(endpoint, false, event_loop);
    let provider = ScriptedProvider::new(store.clone());
    let gateway = Gateway::new(
        store.clone(),
        event_loop,
        provider.clone(),
        credentials.clone(),
        RetryPolicy::default(),
    );
    Device {
        store,
        provider,
        credentials,
        gateway,
    }
}

fn sign_in(event_loop: &EventLoop, device: &Device, user_id: &str, name: &str) -> UserRecord {
    device.provider.grant(user_id, name);
    let outcome = Rc::new(RefCell::new(None));
    let sink = outcome.clone();
    device
        .gateway
        .login(false, move |result| *sink.borrow_mut() = Some(result));
    event_loop.run_until_idle();
    let result = outcome.borrow_mut().take();
    result.expect("login never completed").expect("login failed")
}

#[test]
fn test_first_login_then_notes_arrive_on_another_device_in_order() {
    let event_loop = EventLoop::new();
    let laptop = device(&event_loop, "scenario-two-devices", MemoryCredentials::new());
    let phone = device(&event_loop, "scenario-two-devices", MemoryCredentials::new());

    let record = sign_in(&event_loop, &laptop, "u1", "Ada");
    assert_eq!(record.notes, Collection::Placeholder("u1".to_string()));
    assert_eq!(record.tags, Collection::Placeholder("u1".to_string()));
    assert_eq!(record.notebooks, Collection::Placeholder("u1".to_string()));

    // Same user on the second device: the record is already there.
    let again = sign_in(&event_loop, &phone, "u1", "Ada");
    assert_eq!(again, record);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    phone
        .gateway
        .on_note(move |_, note| sink.borrow_mut().push(note.title))
        .unwrap();

    for title in ["n1", "n2", "n3"] {
        laptop
            .gateway
            .create_note(NoteDraft::new(title), |result| {
                result.unwrap();
            })
            .unwrap();
    }
    event_loop.run_until_idle();
    assert_eq!(*seen.borrow(), vec!["n1", "n2", "n3"]);

    // After unload nothing reaches the old handler.
    phone.gateway.unload();
    assert_eq!(phone.gateway.subscription_count(), 0);
    laptop
        .gateway
        .create_note(NoteDraft::new("n4"), |_| {})
        .unwrap();
    event_loop.run_until_idle();
    assert_eq!(seen.borrow().len(), 3);
}

#[test]
fn test_silent_login_without_credential_touches_nothing() {
    let event_loop = EventLoop::new();
    let dev = device(&event_loop, "scenario-silent", MemoryCredentials::new());
    let outcome = Rc::new(RefCell::new(None));
    let sink = outcome.clone();
    dev.gateway
        .login(true, move |result| *sink.borrow_mut() = Some(result.map(|_| ())));
    event_loop.run_until_idle();

    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Err(GatewayError::NotAuthenticated))
    ));
    assert_eq!(dev.store.requests_seen(), 0);
    assert_eq!(dev.provider.calls(), 0);
    assert!(dev.credentials.is_empty());
}

#[test]
fn test_stale_credential_gives_fresh_login_outcome() {
    let event_loop = EventLoop::new();
    let stale = MemoryCredentials::with_credential(&Credential {
        token: "stale-token".into(),
        user_id: "u1".into(),
        display_name: "Ada".into(),
    });
    let dev = device(&event_loop, "scenario-stale", stale);
    dev.provider.grant("u2", "Grace");

    let outcome = Rc::new(RefCell::new(Vec::new()));
    let sink = outcome.clone();
    dev.gateway
        .login(false, move |result| sink.borrow_mut().push(result));
    event_loop.run_until_idle();

    let outcome = outcome.borrow();
    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].as_ref().unwrap().user_id, "u2");
    let stored = dev.credentials.load_credential().unwrap();
    assert_ne!(stored.token, "stale-token");
    assert_eq!(stored.user_id, "u2");
}

#[test]
fn test_duplicate_user_info_subscriptions_fire_per_subscription() {
    let event_loop = EventLoop::new();
    let owner = device(&event_loop, "scenario-duplicates", MemoryCredentials::new());
    let viewer = device(&event_loop, "scenario-duplicates", MemoryCredentials::new());
    sign_in(&event_loop, &owner, "u1", "Ada");

    let statuses = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let sink = statuses.clone();
        viewer
            .gateway
            .get_user_info("u1", move |result| {
                if let Ok(Some(user)) = result {
                    sink.borrow_mut().push(user.status);
                }
            })
            .unwrap();
    }
    event_loop.run_until_idle();
    statuses.borrow_mut().clear();

    owner.gateway.logout();
    event_loop.run_until_idle();
    assert_eq!(statuses.borrow().len(), 2);
    assert_eq!(viewer.gateway.subscription_count(), 2);

    viewer.gateway.unload();
    assert_eq!(viewer.gateway.subscription_count(), 0);
}

#[test]
fn test_get_note_reports_once_for_present_and_absent() {
    let event_loop = EventLoop::new();
    let dev = device(&event_loop, "scenario-get-note", MemoryCredentials::new());
    sign_in(&event_loop, &dev, "u1", "Ada");
    let id = dev
        .gateway
        .create_note(NoteDraft::new("Hello").tag("greeting"), |_| {})
        .unwrap();
    event_loop.run_until_idle();
    assert!(dev.store.value_at(&schema::tag_entry("u1", "greeting", &id)).is_some());

    let results = Rc::new(RefCell::new(Vec::new()));
    for wanted in [id.as_str(), "missing"] {
        let sink = results.clone();
        dev.gateway
            .get_note("u1", wanted, move |result| {
                sink.borrow_mut().push(result.unwrap().map(|note| note.title))
            })
            .unwrap();
    }
    event_loop.run_until_idle();
    assert_eq!(*results.borrow(), vec![Some("Hello".to_string()), None]);
}
