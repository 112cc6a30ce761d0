use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::NavigationError;
use crate::metrics::SessionMetrics;
use crate::signals::AuthSignal;
use crate::store::TokenStore;

/// Default login entry point.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Moves the client to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str) -> Result<(), NavigationError>;
}

/// Navigator that keeps every requested path. Handy for tests and headless
/// hosts that want to act on redirects themselves.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    visits: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.visits.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) -> Result<(), NavigationError> {
        let mut guard = self.visits.lock().map_err(|_| NavigationError::Failed {
            path: path.to_string(),
            message: "navigator lock poisoned".to_string(),
        })?;
        guard.push(path.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedIn,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogoutReason {
    Explicit,
    Expired,
    InvalidToken,
    AuthError(AuthSignal),
}

impl LogoutReason {
    pub fn label(&self) -> &'static str {
        match self {
            LogoutReason::Explicit => "explicit",
            LogoutReason::Expired => "expired",
            LogoutReason::InvalidToken => "invalid_token",
            LogoutReason::AuthError(_) => "auth_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// A token was present when the logout started.
    pub was_signed_in: bool,
    /// The navigator accepted the redirect.
    pub redirected: bool,
}

/// Drives the `SignedIn -> SignedOut` transition: clear the token store,
/// then send the client to the login path.
///
/// Sign-in is not owned here; an external login flow calls
/// [`TokenStore::set_token`].
#[derive(Clone)]
pub struct LogoutHandler {
    store: TokenStore,
    navigator: Option<Arc<dyn Navigator>>,
    login_path: Arc<str>,
    metrics: Option<SessionMetrics>,
}

impl LogoutHandler {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            navigator: None,
            login_path: Arc::from(DEFAULT_LOGIN_PATH),
            metrics: None,
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_login_path(mut self, path: impl AsRef<str>) -> Self {
        self.login_path = Arc::from(path.as_ref());
        self
    }

    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn state(&self) -> AuthState {
        if self.store.get_token().is_some() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        }
    }

    pub fn logout(&self, reason: LogoutReason) -> LogoutOutcome {
        let was_signed_in = self.state() == AuthState::SignedIn;
        self.store.remove_token();
        self.finish(reason, was_signed_in)
    }

    /// Logout triggered by a failed check. Skipped when the token changed
    /// since `generation` was observed, so a stale check cannot sign out a
    /// session that was just established.
    pub fn expire(&self, reason: LogoutReason, generation: u64) -> Option<LogoutOutcome> {
        if !self.store.evict_if_current(generation) {
            debug!(reason = reason.label(), "token changed during check; logout skipped");
            return None;
        }
        Some(self.finish(reason, true))
    }

    /// React to an externally raised signal. Only `auth-error` signals
    /// received while signed in cause a logout; each one causes exactly one.
    pub fn handle_signal(&self, signal: &AuthSignal) -> Option<LogoutOutcome> {
        if !signal.is_auth_error() {
            debug!(name = %signal.name, "ignoring non auth-error signal");
            return None;
        }
        if self.state() == AuthState::SignedOut {
            debug!(status = ?signal.status(), "auth-error signal while signed out; nothing to do");
            return None;
        }
        Some(self.logout(LogoutReason::AuthError(signal.clone())))
    }

    fn finish(&self, reason: LogoutReason, was_signed_in: bool) -> LogoutOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.logout(reason.label());
        }

        let redirected = match &self.navigator {
            Some(navigator) => match navigator.navigate(&self.login_path) {
                Ok(()) => true,
                Err(err) => {
                    warn!(path = %self.login_path, error = %err, "login redirect failed");
                    false
                }
            },
            None => {
                debug!(path = %self.login_path, "no navigator configured; redirect skipped");
                false
            }
        };

        info!(
            reason = reason.label(),
            was_signed_in, redirected, "session signed out"
        );
        LogoutOutcome {
            was_signed_in,
            redirected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    struct FailingNavigator;

    impl Navigator for FailingNavigator {
        fn navigate(&self, _path: &str) -> Result<(), NavigationError> {
            Err(NavigationError::Unsupported)
        }
    }

    fn handler() -> (LogoutHandler, RecordingNavigator) {
        let store = TokenStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        );
        let navigator = RecordingNavigator::new();
        let handler = LogoutHandler::new(store).with_navigator(Arc::new(navigator.clone()));
        (handler, navigator)
    }

    #[test]
    fn explicit_logout_clears_and_redirects() {
        let (handler, navigator) = handler();
        handler.store().set_token("abc.def.ghi");
        assert_eq!(handler.state(), AuthState::SignedIn);

        let outcome = handler.logout(LogoutReason::Explicit);
        assert_eq!(
            outcome,
            LogoutOutcome {
                was_signed_in: true,
                redirected: true
            }
        );
        assert_eq!(handler.state(), AuthState::SignedOut);
        assert_eq!(navigator.visits(), vec!["/login".to_string()]);
    }

    #[test]
    fn failed_navigation_still_clears_store() {
        let store = TokenStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        );
        store.set_token("abc");
        let handler = LogoutHandler::new(store).with_navigator(Arc::new(FailingNavigator));

        let outcome = handler.logout(LogoutReason::Explicit);
        assert!(!outcome.redirected);
        assert_eq!(handler.state(), AuthState::SignedOut);
    }

    #[test]
    fn detached_context_logout_completes() {
        let handler = LogoutHandler::new(TokenStore::detached());
        let outcome = handler.logout(LogoutReason::Expired);
        assert!(!outcome.was_signed_in);
        assert!(!outcome.redirected);
    }

    #[test]
    fn auth_error_signal_logs_out_once_per_signal() {
        let (handler, navigator) = handler();
        handler.store().set_token("abc");

        let signal = AuthSignal::auth_error(serde_json::json!({ "status": 401 }));
        let outcome = handler.handle_signal(&signal).expect("logout");
        assert!(outcome.was_signed_in);
        assert_eq!(navigator.count(), 1);

        assert!(handler.handle_signal(&signal).is_none());
        assert_eq!(navigator.count(), 1);
    }

    #[test]
    fn other_signals_are_ignored() {
        let (handler, navigator) = handler();
        handler.store().set_token("abc");

        let signal = AuthSignal::new("report-ready", serde_json::Value::Null);
        assert!(handler.handle_signal(&signal).is_none());
        assert_eq!(handler.state(), AuthState::SignedIn);
        assert_eq!(navigator.count(), 0);
    }

    #[test]
    fn expire_skips_when_token_rotated() {
        let (handler, navigator) = handler();
        handler.store().set_token("old");
        let observed = handler.store().generation();
        handler.store().set_token("new");

        assert!(handler.expire(LogoutReason::Expired, observed).is_none());
        assert_eq!(handler.store().get_token().as_deref(), Some("new"));
        assert_eq!(navigator.count(), 0);

        let current = handler.store().generation();
        assert!(handler.expire(LogoutReason::Expired, current).is_some());
        assert_eq!(handler.state(), AuthState::SignedOut);
    }

    #[test]
    fn custom_login_path_is_used() {
        let (handler, navigator) = handler();
        let handler = handler.with_login_path("/auth/sign-in");
        handler.logout(LogoutReason::Explicit);
        assert_eq!(navigator.visits(), vec!["/auth/sign-in".to_string()]);
    }
}
