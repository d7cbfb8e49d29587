//! The session store: sole owner of the bearer token and user profile.
//!
//! # Lifecycle
//! ```text
//! restore() at startup ──▶ Some(session) ──logout(reason)──▶ None
//!        │                      ▲
//!        ▼                      │ login(token, hint)
//!       None ───────────────────┘
//! ```
//!
//! Every transition is mirrored to storage under [`SESSION_KEY`] and
//! broadcast as a [`SessionEvent`].

use std::sync::{Arc, Mutex};
use std::time::Duration;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::session::storage::{SessionStorage, StorageError};
use crate::session::token::{self, TokenClaims};

/// Storage key of the persisted session.
pub const SESSION_KEY: &str = "userSession";

/// Bumped whenever [`PersistedSession`] changes shape.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_admin: bool,
}

/// Profile fields reported by the backend alongside a token. Present
/// fields win over the token's own claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHint {
    #[serde(default, alias = "_id", alias = "userId")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl ProfileHint {
    fn merge(&self, claims: &TokenClaims) -> Option<UserProfile> {
        let id = self
            .id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| claims.subject())?;
        let email = self
            .email
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| claims.email.clone())?;
        Some(UserProfile {
            id,
            email,
            is_premium: self.is_premium.unwrap_or(claims.is_premium),
            is_admin: self.is_admin.unwrap_or(claims.is_admin),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
    pub login_time: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// On-disk shape. Unknown or missing fields fail the parse, which
/// discards the stored value.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PersistedSession {
    version: u32,
    token: String,
    user: UserProfile,
    /// Milliseconds since the epoch.
    login_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionEndReason {
    /// Explicit logout.
    UserLogout,
    /// Token expired or the backend answered 401.
    SessionExpired,
    /// Stored session was unreadable or its token was rejected.
    InvalidSession,
}

impl SessionEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEndReason::UserLogout => "user-logout",
            SessionEndReason::SessionExpired => "session-expired",
            SessionEndReason::InvalidSession => "invalid-session",
        }
    }
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { email: String },
    Ended { reason: SessionEndReason },
}

/// Why no token could be handed to an authenticated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUnavailable {
    NotLoggedIn,
    Expired,
}

pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    current: ArcSwapOption<Session>,
    /// Serialises login/logout so storage and memory never disagree.
    write_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    expiry_margin: Duration,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            storage,
            current: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
            events,
            expiry_margin: config.expiry_margin(),
            max_age: config.max_age(),
        }
    }

    /// Create the store and restore any persisted session.
    pub fn open(storage: Arc<dyn SessionStorage>, config: &SessionConfig) -> Self {
        let store = Self::new(storage, config);
        store.restore();
        store
    }

    /// Accept `token` if it decodes and does not expire within the margin.
    ///
    /// Returns false and leaves the current session untouched otherwise.
    pub fn login(&self, token: &str, hint: Option<&ProfileHint>) -> bool {
        let claims = match token::validate(token, Utc::now(), self.expiry_margin) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected login token");
                return false;
            }
        };

        let Some(user) = hint.cloned().unwrap_or_default().merge(&claims) else {
            tracing::warn!("Rejected login token: no user id or email in token or profile");
            return false;
        };

        let session = Session {
            token: token.to_string(),
            user,
            login_time: Utc::now(),
            expires_at: claims.expires_at(),
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.persist(&session);
        let email = session.user.email.clone();
        tracing::info!(
            email = %email,
            premium = session.user.is_premium,
            admin = session.user.is_admin,
            "Session started"
        );
        self.current.store(Some(Arc::new(session)));
        metrics::record_session_event("login");
        let _ = self.events.send(SessionEvent::Started { email });
        true
    }

    /// Clear the session everywhere and announce why.
    pub fn logout(&self, reason: SessionEndReason) {
        if let Err(e) = self.end(reason) {
            tracing::error!(error = %e, "Failed to clear persisted session");
        }
    }

    /// User-initiated logout. The in-memory session always ends; a
    /// persisted copy that could not be removed is reported.
    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.end(SessionEndReason::UserLogout)
    }

    fn end(&self, reason: SessionEndReason) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let removed = self.storage.remove(SESSION_KEY);
        let previous = self.current.swap(None);
        tracing::info!(
            reason = %reason,
            email = previous.as_ref().map(|s| s.user.email.as_str()).unwrap_or("-"),
            "Session ended"
        );
        metrics::record_session_event(reason.as_str());
        let _ = self.events.send(SessionEvent::Ended { reason });
        removed
    }

    /// Load the persisted session, discarding anything stale or malformed.
    pub fn restore(&self) -> Option<Arc<Session>> {
        let raw = match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No persisted session");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        let persisted = match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(p) if p.version == SCHEMA_VERSION => p,
            Ok(p) => {
                tracing::warn!(version = p.version, "Persisted session has unknown schema version, discarding");
                self.logout(SessionEndReason::InvalidSession);
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted session is malformed, discarding");
                self.logout(SessionEndReason::InvalidSession);
                return None;
            }
        };

        let Some(login_time) = DateTime::from_timestamp_millis(persisted.login_time) else {
            self.logout(SessionEndReason::InvalidSession);
            return None;
        };
        let age = (Utc::now() - login_time).to_std().unwrap_or_default();
        if age > self.max_age {
            tracing::info!(age_secs = age.as_secs(), "Persisted session too old");
            self.logout(SessionEndReason::SessionExpired);
            return None;
        }

        let claims = match token::validate(&persisted.token, Utc::now(), self.expiry_margin) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::info!(error = %e, "Persisted token no longer valid");
                self.logout(SessionEndReason::SessionExpired);
                return None;
            }
        };

        let session = Arc::new(Session {
            token: persisted.token,
            user: persisted.user,
            login_time,
            expires_at: claims.expires_at(),
        });
        tracing::info!(email = %session.user.email, "Session restored");
        self.current.store(Some(session.clone()));
        Some(session)
    }

    /// Token for an authenticated request. A token found expired at this
    /// point ends the session.
    pub fn token_for_request(&self) -> Result<String, TokenUnavailable> {
        let session = self.current.load_full().ok_or(TokenUnavailable::NotLoggedIn)?;
        if let Some(expires_at) = session.expires_at {
            if expires_at <= Utc::now() {
                self.logout(SessionEndReason::SessionExpired);
                return Err(TokenUnavailable::Expired);
            }
        }
        Ok(session.token.clone())
    }

    pub fn current_token(&self) -> Option<String> {
        self.current.load().as_ref().map(|s| s.token.clone())
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.current.load().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.load().is_some()
    }

    pub fn is_premium(&self) -> bool {
        self.current.load().as_ref().map(|s| s.user.is_premium).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.current.load().as_ref().map(|s| s.user.is_admin).unwrap_or(false)
    }

    /// Receive session start/end notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn persist(&self, session: &Session) {
        let persisted = PersistedSession {
            version: SCHEMA_VERSION,
            token: session.token.clone(),
            user: session.user.clone(),
            login_time: session.login_time.timestamp_millis(),
        };
        let result = serde_json::to_string(&persisted)
            .map_err(|e| e.to_string())
            .and_then(|json| self.storage.set(SESSION_KEY, &json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            // The in-memory session still works for this process
            tracing::error!(error = %e, "Failed to persist session");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("storage", &self.storage)
            .field("authenticated", &self.is_authenticated())
            .field("expiry_margin_secs", &self.expiry_margin.as_secs())
            .finish()
    }
}
