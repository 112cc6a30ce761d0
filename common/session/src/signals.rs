use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::logout::LogoutHandler;

/// Event name API-calling collaborators use to request a forced logout.
pub const AUTH_ERROR_EVENT: &str = "auth-error";

const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSignal {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AuthSignal {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn auth_error(payload: serde_json::Value) -> Self {
        Self::new(AUTH_ERROR_EVENT, payload)
    }

    /// Signal for a collaborator's HTTP response; only 401 asks for a logout.
    pub fn from_status(status: StatusCode, source: &str) -> Option<Self> {
        if status != StatusCode::UNAUTHORIZED {
            return None;
        }
        Some(Self::auth_error(json!({
            "status": status.as_u16(),
            "source": source,
        })))
    }

    pub fn is_auth_error(&self) -> bool {
        self.name == AUTH_ERROR_EVENT
    }

    pub fn status(&self) -> Option<u16> {
        self.payload
            .get("status")
            .and_then(|value| value.as_u64())
            .and_then(|value| u16::try_from(value).ok())
    }
}

/// In-process bus carrying [`AuthSignal`]s from API callers to the logout
/// handler.
#[derive(Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthSignal>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AuthEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers will see the signal.
    pub fn publish(&self, signal: AuthSignal) -> usize {
        match self.sender.send(signal) {
            Ok(receivers) => receivers,
            Err(err) => {
                debug!(name = %err.0.name, "auth signal published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.sender.subscribe()
    }
}

/// Run `handler` for every signal published on `events` until every
/// publisher handle is dropped. Subscription happens before this returns, so
/// nothing published afterwards is missed.
pub fn spawn_auth_error_listener(events: &AuthEvents, handler: LogoutHandler) -> JoinHandle<()> {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(signal) => {
                    handler.handle_signal(&signal);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth signal listener lagged; signals dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("auth signal bus closed; listener exiting");
                    break;
                }
            }
        }
    })
}
