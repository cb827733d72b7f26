// src/session/broker.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::LoginSettings;
use crate::errors::{ProvisionError, Result};
use crate::pipeline::extract;
use crate::session::process::{InteractiveSession, SessionSpawner};
use crate::types::{CommandOutcome, SessionId};

/// What an observer needs to complete a login out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub session_id: SessionId,
    pub login_url: String,
}

struct ParkedSession {
    session: Box<dyn InteractiveSession>,
    parked_at: Instant,
}

type SessionTable = HashMap<SessionId, ParkedSession>;

/// Holds suspended login processes until their token arrives.
///
/// Several observers may be mid-login at once, so the table is shared
/// behind a mutex. The lock is only held for insert/remove, never across an
/// `.await`. Sessions older than `session_ttl` are dropped (which kills
/// their process) whenever a new login starts.
pub struct SessionBroker {
    spawner: Arc<dyn SessionSpawner>,
    settings: LoginSettings,
    sessions: Mutex<SessionTable>,
}

impl SessionBroker {
    pub fn new(spawner: Arc<dyn SessionSpawner>, settings: LoginSettings) -> Self {
        Self {
            spawner,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a login process, wait for its URL and park it.
    pub async fn begin_login(&self) -> Result<LoginTicket> {
        self.prune_expired();

        let mut session = self.spawner.spawn(&self.settings.command)?;
        let matched = session
            .expect(&self.settings.url_pattern, self.settings.prompt_timeout)
            .await?;
        let login_url = extract::login_url(&matched)?;

        let session_id = SessionId::generate();
        self.table().insert(
            session_id.clone(),
            ParkedSession {
                session,
                parked_at: Instant::now(),
            },
        );
        info!(session = %session_id, "login session waiting for token");

        Ok(LoginTicket {
            session_id,
            login_url,
        })
    }

    /// Hand `token` to the session and wait for the login process to exit.
    ///
    /// The session is taken out of the table before anything else happens,
    /// so an identifier can be consumed at most once and is gone afterwards
    /// whatever the process does.
    pub async fn submit(&self, session_id: &SessionId, token: &str) -> Result<CommandOutcome> {
        let ParkedSession { mut session, .. } = self
            .table()
            .remove(session_id)
            .ok_or_else(|| ProvisionError::UnknownSession(session_id.to_string()))?;

        session.send_line(token).await?;
        let outcome = session.finish(self.settings.exit_timeout).await?;

        if outcome.success() {
            info!(session = %session_id, "login completed");
        } else {
            warn!(session = %session_id, status = ?outcome.status, "login process exited unsuccessfully");
        }
        Ok(outcome)
    }

    /// Number of sessions still waiting for a token.
    pub fn open_sessions(&self) -> usize {
        self.table().len()
    }

    /// Drop every session parked for longer than `session_ttl`. Returns how
    /// many were dropped.
    pub fn prune_expired(&self) -> usize {
        let ttl = self.settings.session_ttl;
        let expired: Vec<(SessionId, ParkedSession)> = {
            let mut table = self.table();
            let ids: Vec<SessionId> = table
                .iter()
                .filter(|(_, parked)| parked.parked_at.elapsed() > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| table.remove(&id).map(|parked| (id, parked)))
                .collect()
        };

        for (id, _parked) in expired.iter() {
            debug!(session = %id, ?ttl, "discarding expired login session");
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired login sessions discarded");
        }
        expired.len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, SessionTable> {
        // A poisoned table still holds valid sessions; keep serving them.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
