#![allow(dead_code)]

use std::sync::Arc;

use fieldeyes_session::{
    ExpiryPolicy, ManualClock, MemoryStorage, RecordingNavigator, Session, TokenStore,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

pub const NOW: i64 = 1_760_000_000;

#[derive(Serialize)]
struct TokenClaims<'a> {
    id: i64,
    email: &'a str,
    role: &'a str,
    exp: i64,
    iat: i64,
}

/// Sign a dashboard token the way the backend does (HS256).
pub fn mint_token(role: &str, exp: i64) -> String {
    let claims = TokenClaims {
        id: 1042,
        email: "agronomist@fieldeyes.io",
        role,
        exp,
        iat: NOW - 60,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"fieldeyes-test-secret"),
    )
    .expect("sign token")
}

pub struct Harness {
    pub session: Session,
    pub primary: MemoryStorage,
    pub fallback: MemoryStorage,
    pub navigator: RecordingNavigator,
    pub clock: ManualClock,
}

pub fn harness(policy: ExpiryPolicy) -> Harness {
    let primary = MemoryStorage::new();
    let fallback = MemoryStorage::new();
    let navigator = RecordingNavigator::new();
    let clock = ManualClock::at_seconds(NOW);

    let store = TokenStore::new(Arc::new(primary.clone()), Arc::new(fallback.clone()));
    let session = Session::builder(store)
        .with_clock(Arc::new(clock.clone()))
        .with_navigator(Arc::new(navigator.clone()))
        .with_expiry_policy(policy)
        .build();

    Harness {
        session,
        primary,
        fallback,
        navigator,
        clock,
    }
}
