use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use http::HeaderValue;
use tracing::{debug, warn};

use crate::bearer::bearer_header;
use crate::claims::{decode, Claims};
use crate::clock::{Clock, SystemClock};
use crate::error::SessionError;
use crate::logout::{LogoutHandler, LogoutOutcome, LogoutReason, Navigator};
use crate::metrics::SessionMetrics;
use crate::store::TokenStore;

/// What a check does with a token it found expired or malformed.
///
/// Expired-token checks opportunistically evict; callers must not rely on
/// eviction happening exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Leave storage untouched.
    Keep,
    /// Clear the token store.
    #[default]
    Evict,
    /// Clear the token store and redirect to the login path.
    Logout,
}

impl ExpiryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryPolicy::Keep => "keep",
            ExpiryPolicy::Evict => "evict",
            ExpiryPolicy::Logout => "logout",
        }
    }
}

impl fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpiryPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(ExpiryPolicy::Keep),
            "evict" => Ok(ExpiryPolicy::Evict),
            "logout" => Ok(ExpiryPolicy::Logout),
            other => Err(format!(
                "Unsupported expiry policy '{other}'. Use keep, evict, or logout."
            )),
        }
    }
}

/// Session status derived from (token, now). Never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Absent,
    Invalid(SessionError),
    Valid(Claims),
}

impl SessionState {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionState::Valid(_))
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            SessionState::Valid(claims) => Some(claims),
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            SessionState::Absent => "absent",
            SessionState::Invalid(err) => err.kind(),
            SessionState::Valid(_) => "valid",
        }
    }
}

/// A state computed at a known store generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub state: SessionState,
}

/// Client session handle: token store, clock and logout handler bundled so
/// UI code can ask "signed in?" and "admin?" without touching storage.
#[derive(Clone)]
pub struct Session {
    store: TokenStore,
    clock: Arc<dyn Clock>,
    logout: LogoutHandler,
    policy: ExpiryPolicy,
    metrics: Option<SessionMetrics>,
}

impl Session {
    pub fn new(store: TokenStore) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: TokenStore) -> SessionBuilder {
        SessionBuilder::new(store)
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn logout_handler(&self) -> &LogoutHandler {
        &self.logout
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        self.policy
    }

    pub fn state(&self) -> SessionState {
        self.evaluate().1
    }

    /// True iff a token is stored, decodes, and `exp * 1000 > now_ms`.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_valid()
    }

    /// Re-decodes on every call so a token swap is seen immediately.
    pub fn is_admin(&self) -> bool {
        match self.state() {
            SessionState::Valid(claims) => claims.is_admin(),
            _ => false,
        }
    }

    pub fn claims(&self) -> Option<Claims> {
        match self.state() {
            SessionState::Valid(claims) => Some(claims),
            _ => None,
        }
    }

    /// The raw token, handed out only while the session is valid.
    pub fn bearer_token(&self) -> Option<String> {
        match self.evaluate() {
            (Some(token), SessionState::Valid(_)) => Some(token),
            _ => None,
        }
    }

    pub fn authorization_header(&self) -> Option<HeaderValue> {
        let token = self.bearer_token()?;
        match bearer_header(&token) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "stored token cannot be sent as a header");
                None
            }
        }
    }

    pub fn logout(&self) -> LogoutOutcome {
        self.logout.logout(LogoutReason::Explicit)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let generation = self.store.generation();
        let state = self.state();
        SessionSnapshot { generation, state }
    }

    /// Whether no token write happened since `snapshot` was taken.
    pub fn is_current(&self, snapshot: &SessionSnapshot) -> bool {
        self.store.generation() == snapshot.generation
    }

    /// Await `work` and hand back its result only if the token was not
    /// replaced or removed meanwhile.
    pub async fn settle<F>(&self, work: F) -> Option<F::Output>
    where
        F: Future,
    {
        let generation = self.store.generation();
        let output = work.await;
        if self.store.generation() == generation {
            Some(output)
        } else {
            debug!(
                started = generation,
                now = self.store.generation(),
                "discarding result computed against a replaced token"
            );
            None
        }
    }

    fn evaluate(&self) -> (Option<String>, SessionState) {
        let generation = self.store.generation();
        let (token, state) = match self.store.load() {
            Ok(token) => {
                let state = self.judge(&token, generation);
                (Some(token), state)
            }
            Err(SessionError::NoToken) => (None, SessionState::Absent),
            Err(SessionError::StorageUnavailable) => {
                debug!("session storage unavailable; treating as signed out");
                (None, SessionState::Absent)
            }
            Err(err) => {
                warn!(error = %err, "token lookup failed; treating as signed out");
                (None, SessionState::Absent)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.check(state.outcome());
        }
        (token, state)
    }

    fn judge(&self, token: &str, generation: u64) -> SessionState {
        let claims = match decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "stored token failed to decode");
                self.discard(LogoutReason::InvalidToken, generation);
                return SessionState::Invalid(SessionError::Decode(err));
            }
        };

        if claims.is_valid_at(self.clock.now_ms()) {
            return SessionState::Valid(claims);
        }

        debug!(
            subject = claims.subject,
            expired_at = %claims.expires_at,
            "stored token expired"
        );
        self.discard(LogoutReason::Expired, generation);
        SessionState::Invalid(SessionError::Expired {
            expired_at: claims.expires_at,
        })
    }

    fn discard(&self, reason: LogoutReason, generation: u64) {
        match self.policy {
            ExpiryPolicy::Keep => {}
            ExpiryPolicy::Evict => {
                if self.store.evict_if_current(generation) {
                    debug!(reason = reason.label(), "evicted unusable token");
                }
            }
            ExpiryPolicy::Logout => {
                if self.logout.expire(reason, generation).is_some() {
                    debug!("signed out after failed check");
                }
            }
        }
    }
}

pub struct SessionBuilder {
    store: TokenStore,
    clock: Arc<dyn Clock>,
    navigator: Option<Arc<dyn Navigator>>,
    login_path: Option<String>,
    policy: ExpiryPolicy,
    metrics: Option<SessionMetrics>,
}

impl SessionBuilder {
    fn new(store: TokenStore) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            navigator: None,
            login_path: None,
            policy: ExpiryPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Session {
        let store = match &self.metrics {
            Some(metrics) => self.store.with_metrics(metrics.clone()),
            None => self.store,
        };

        let mut logout = LogoutHandler::new(store.clone());
        if let Some(navigator) = self.navigator {
            logout = logout.with_navigator(navigator);
        }
        if let Some(path) = &self.login_path {
            logout = logout.with_login_path(path);
        }
        if let Some(metrics) = &self.metrics {
            logout = logout.with_metrics(metrics.clone());
        }

        Session {
            store,
            clock: self.clock,
            logout,
            policy: self.policy,
            metrics: self.metrics,
        }
    }
}
