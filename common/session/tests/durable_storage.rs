mod support;

use std::sync::Arc;

use fieldeyes_session::{
    ManualClock, MemoryStorage, Session, SessionConfig, TokenStorage, DEFAULT_DURABLE_TTL_SECONDS,
};
use support::{mint_token, NOW};

fn session_over(config: &SessionConfig, clock: &ManualClock, fallback: MemoryStorage) -> Session {
    let durable = config
        .durable_storage()
        .expect("storage path configured")
        .with_clock(Arc::new(clock.clone()));
    let store = config.token_store(Arc::new(durable), Arc::new(fallback));
    config
        .session_builder(store)
        .with_clock(Arc::new(clock.clone()))
        .build()
}

#[test]
fn durable_slot_survives_restart_but_fallback_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::new().with_storage_path(dir.path().join("session.json"));
    let clock = ManualClock::at_seconds(NOW);
    let token = mint_token("admin", NOW + 7 * 24 * 3600);

    let first = session_over(&config, &clock, MemoryStorage::new());
    first.store().set_token(&token);
    assert!(first.is_admin());
    drop(first);

    let fallback = MemoryStorage::new();
    let second = session_over(&config, &clock, fallback.clone());
    assert!(second.is_admin());
    assert_eq!(fallback.read("token").unwrap().as_deref(), Some(token.as_str()));
}

#[test]
fn durable_slot_forgets_token_after_max_age() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::new()
        .with_storage_path(dir.path().join("session.json"))
        .with_token_key("fieldeyes_token");
    let clock = ManualClock::at_seconds(NOW);
    // Token claims outlive the durable slot on purpose.
    let token = mint_token("user", NOW + 90 * 24 * 3600);

    let session = session_over(&config, &clock, MemoryStorage::new());
    session.store().set_token(&token);

    clock.advance_seconds(DEFAULT_DURABLE_TTL_SECONDS + 1);
    let restarted = session_over(&config, &clock, MemoryStorage::new());
    assert!(restarted.store().get_token().is_none());
    assert!(!restarted.is_authenticated());
}

#[test]
fn logout_removes_durable_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    let config = SessionConfig::new().with_storage_path(&path);
    let clock = ManualClock::at_seconds(NOW);

    let session = session_over(&config, &clock, MemoryStorage::new());
    session.store().set_token(&mint_token("user", NOW + 3600));
    assert!(path.exists());

    session.logout();
    let restarted = session_over(&config, &clock, MemoryStorage::new());
    assert!(!restarted.is_authenticated());
}
