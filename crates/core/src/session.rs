//! In-memory login sessions.
//!
//! A session is created anonymously, may later have a user bound to it by login, and carries
//! the session-scoped [`OtpStore`] plus password-reset progress. Sessions that have been idle
//! for longer than the configured lifetime are dropped the next time they are looked up.

use crate::clock::{Clock, SystemClock};
use crate::otp::OtpStore;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use uuid::Uuid;

/// The authenticated principal bound to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

/// A code has been issued in this session for `user_id`, keyed in the OTP store by `subject`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReset {
    pub user_id: i64,
    pub subject: String,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub user: Option<SessionUser>,
    pub otp: OtpStore,
    pub pending_reset: Option<PendingReset>,
    /// Set once a reset code verifies; the user whose password may now be replaced.
    pub reset_user: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: None,
            otp: OtpStore::new(),
            pending_reset: None,
            reset_user: None,
            created_at: now,
            last_seen: now,
        }
    }

    /// The logged-in user, or `Unauthenticated`.
    pub fn require_user(&self) -> CoreResult<&SessionUser> {
        self.user.as_ref().ok_or(CoreError::Unauthenticated)
    }

    /// The logged-in user if they are an administrator.
    pub fn require_admin(&self) -> CoreResult<&SessionUser> {
        let user = self.require_user()?;
        if user.is_admin {
            Ok(user)
        } else {
            Err(CoreError::Forbidden("administrator access required"))
        }
    }

    /// Forgets any password-reset progress and pending codes.
    pub fn clear_reset(&mut self) {
        self.pending_reset = None;
        self.reset_user = None;
        self.otp.clear();
    }
}

type SharedSession = Arc<Mutex<Session>>;

/// All live sessions.
///
/// The registry lock is only held to find a session; work on a session happens under that
/// session's own lock.
#[derive(Clone)]
pub struct SessionRegistry<C = SystemClock> {
    sessions: Arc<Mutex<HashMap<Uuid, SharedSession>>>,
    lifetime: Duration,
    clock: C,
}

impl SessionRegistry<SystemClock> {
    pub fn new(lifetime: Duration) -> Self {
        Self::with_clock(lifetime, SystemClock)
    }
}

impl<C: Clock> SessionRegistry<C> {
    pub fn with_clock(lifetime: Duration, clock: C) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            lifetime,
            clock,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SharedSession>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts a new anonymous session and returns its token.
    pub fn create(&self) -> Uuid {
        let session = Session::new(self.clock.now());
        let id = session.id;
        self.sessions().insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!("session {} created", id);
        id
    }

    /// Looks up a session and marks it as seen.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Unauthenticated` if the token is unknown or the session has been
    /// idle for longer than the lifetime. Expired sessions are removed.
    pub fn get(&self, id: Uuid) -> CoreResult<SharedSession> {
        let now = self.clock.now();
        let shared = self
            .sessions()
            .get(&id)
            .cloned()
            .ok_or(CoreError::Unauthenticated)?;

        let mut session = shared.lock().unwrap_or_else(|p| p.into_inner());
        if now - session.last_seen > self.lifetime {
            drop(session);
            self.remove_if_same(id, &shared);
            tracing::info!("session {} expired", id);
            return Err(CoreError::Unauthenticated);
        }
        session.last_seen = now;
        drop(session);

        Ok(shared)
    }

    /// Removes `id` only while it still maps to `shared`.
    fn remove_if_same(&self, id: Uuid, shared: &SharedSession) -> bool {
        let mut sessions = self.sessions();
        match sessions.get(&id) {
            Some(current) if Arc::ptr_eq(current, shared) => {
                sessions.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Runs `f` with exclusive access to the session.
    pub fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let shared = self.get(id)?;
        let mut session = shared.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut session)
    }

    /// Ends a session. Returns whether it existed.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions().remove(&id).is_some();
        if removed {
            tracing::debug!("session {} removed", id);
        }
        removed
    }

    /// Drops every session that has outlived the idle lifetime. Returns how many went.
    ///
    /// Sessions locked by a request are in use and are skipped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let snapshot: Vec<(Uuid, SharedSession)> = self
            .sessions()
            .iter()
            .map(|(id, shared)| (*id, shared.clone()))
            .collect();

        let mut purged = 0;
        for (id, shared) in snapshot {
            let expired = match shared.try_lock() {
                Ok(session) => now - session.last_seen > self.lifetime,
                Err(TryLockError::Poisoned(p)) => now - p.into_inner().last_seen > self.lifetime,
                Err(TryLockError::WouldBlock) => false,
            };
            if expired && self.remove_if_same(id, &shared) {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!("purged {} idle sessions", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
