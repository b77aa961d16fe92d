//! Session store: the current credential and display name.
//!
//! The store is the only owner of the session token. Components whose state
//! belongs to one user (the cart cache) register as [`SessionListener`]s and
//! are told synchronously, inside the same critical section that changes the
//! session, whenever a user logs in or out. Nobody can observe the new
//! session alongside the previous user's cart.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use secrecy::SecretString;
use tracing::info;

/// Display name shown when nobody is logged in.
pub const GUEST_NAME: &str = "Guest";

/// An authenticated session.
///
/// `Debug` redacts the token.
#[derive(Clone)]
pub struct Session {
    token: SecretString,
    display_name: String,
}

impl Session {
    /// Create a session from a token issued by the commerce service.
    #[must_use]
    pub fn new(token: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            display_name: display_name.into(),
        }
    }

    /// The bearer credential.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
}

/// Receives session changes.
///
/// Called while the store holds its write lock: implementations must not call
/// back into the [`SessionStore`].
pub trait SessionListener: Send + Sync {
    /// `generation` identifies the new session; it increases on every change.
    fn on_session_change(&self, event: SessionEvent, generation: u64);
}

/// A token together with the session generation it belongs to.
///
/// Work started with a credential is stale once the store's generation has
/// moved on.
#[derive(Clone)]
pub struct Credential {
    pub token: SecretString,
    pub generation: u64,
}

/// Shared, cheaply cloneable session store.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Default)]
struct SessionStoreInner {
    state: RwLock<SessionState>,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    generation: u64,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropped listeners are pruned automatically.
    pub fn subscribe(&self, listener: Weak<dyn SessionListener>) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    /// Start a session, replacing any previous one.
    pub fn login(&self, session: Session) {
        info!(user = %session.display_name(), "session started");
        self.replace(Some(session), SessionEvent::LoggedIn);
    }

    /// End the session.
    ///
    /// Idempotent: listeners are notified even when nobody was logged in, so
    /// dependent caches are reset regardless of their prior state. Returns
    /// whether a session was actually ended.
    pub fn logout(&self) -> bool {
        let ended = self.replace(None, SessionEvent::LoggedOut);
        if ended {
            info!("session ended");
        }
        ended
    }

    /// The current session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.read(|state| state.session.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|state| state.session.is_some())
    }

    /// The session's display name, or [`GUEST_NAME`].
    #[must_use]
    pub fn display_name(&self) -> String {
        self.read(|state| {
            state
                .session
                .as_ref()
                .map_or_else(|| GUEST_NAME.to_string(), |s| s.display_name.clone())
        })
    }

    /// The current token and generation, read atomically.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read(|state| {
            state.session.as_ref().map(|s| Credential {
                token: s.token.clone(),
                generation: state.generation,
            })
        })
    }

    /// The current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read(|state| state.generation)
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Swap the session and notify listeners under the write lock.
    fn replace(&self, session: Option<Session>, event: SessionEvent) -> bool {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let had_session = std::mem::replace(&mut state.session, session).is_some();
        state.generation += 1;
        let generation = state.generation;

        let listeners: Vec<Arc<dyn SessionListener>> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for listener in listeners {
            listener.on_session_change(event, generation);
        }

        had_session
    }
}
