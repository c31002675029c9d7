//! Session Cache (spec §4.7) — one cached session per role, reauthenticated
//! once its TTL elapses.
//!
//! Mirrors `kojihelpers.py`'s `get_session`: a session is built lazily on
//! first use, then kept around until [`SESSION_TTL`](crate::types::SESSION_TTL)
//! has passed since the last login, at which point the next caller logs
//! out and relogs in before handing the session back.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::error::DaemonError;
use crate::koji::BuildSystemSession;
use crate::types::{Role, SESSION_TTL};

struct CachedSession {
    session: BuildSystemSession,
    logged_in_at: Instant,
}

/// Caches one live session per role, forcing reauthentication past TTL.
pub struct SessionCache {
    sessions: Mutex<HashMap<&'static str, CachedSession>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached session for `role`, logging in (or relogging in
    /// past TTL) as needed. `login` is only invoked when a fresh session
    /// is actually required, since a real login is an RPC round trip.
    pub async fn get<F, Fut>(&self, role: Role, login: F) -> Result<BuildSystemSession, DaemonError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<BuildSystemSession, DaemonError>>,
    {
        let key = role.as_str();

        let needs_login = {
            let sessions = self.sessions.lock().await;
            match sessions.get(key) {
                None => true,
                Some(cached) => cached.logged_in_at.elapsed() >= SESSION_TTL,
            }
        };

        if needs_login {
            let stale = self.sessions.lock().await.remove(key);
            if let Some(stale) = stale {
                stale.session.logout();
            }
            let session = login().await?;
            self.sessions.lock().await.insert(
                key,
                CachedSession {
                    session,
                    logged_in_at: Instant::now(),
                },
            );
        }

        Ok(self
            .sessions
            .lock()
            .await
            .get(key)
            .expect("just inserted")
            .session
            .clone())
    }

    /// Drop and log out every cached session, forcing reauthentication on
    /// next use (used after a config reload changes credentials/profile).
    pub async fn invalidate_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, cached) in sessions.drain() {
            cached.session.logout();
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
