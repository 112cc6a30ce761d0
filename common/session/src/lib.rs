pub mod bearer;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod logout;
pub mod metrics;
pub mod session;
pub mod signals;
pub mod storage;
pub mod store;

pub use bearer::bearer_header;
pub use claims::{decode, Claims, Role, ROLE_ADMIN, ROLE_USER};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_session_config, SessionConfig};
pub use error::{
    BearerError, DecodeError, DecodeResult, NavigationError, SessionError, SessionResult,
    StorageError, StorageResult,
};
pub use logout::{
    AuthState, LogoutHandler, LogoutOutcome, LogoutReason, Navigator, RecordingNavigator,
    DEFAULT_LOGIN_PATH,
};
pub use metrics::SessionMetrics;
pub use session::{ExpiryPolicy, Session, SessionBuilder, SessionSnapshot, SessionState};
pub use signals::{spawn_auth_error_listener, AuthEvents, AuthSignal, AUTH_ERROR_EVENT};
pub use storage::{FileStorage, MemoryStorage, TokenStorage, DEFAULT_DURABLE_TTL_SECONDS};
pub use store::{TokenStore, DEFAULT_TOKEN_KEY};
