//! Session overview and one-shot session control.
//!
//! None of these calls touch the sync engine's state; they are thin wrappers
//! over single GET requests.

use serde::Serialize;

use crate::logging::log_session_command;
use crate::sync::transport::{PollError, Transport};

pub const LIST_PATH: &str = "session-list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Restart, optionally with an initial point for the search.
    Restart { init: Option<String> },
    Pause,
    Resume,
    Kill,
}

impl Command {
    pub fn path(&self) -> &'static str {
        match self {
            Command::Restart { .. } => "restart",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Kill => "kill",
        }
    }

    pub fn query(&self, session: &str) -> String {
        match self {
            Command::Restart { init: Some(init) } if !init.trim().is_empty() => {
                format!("{}&{}", session, init.trim())
            }
            _ => session.to_string(),
        }
    }
}

/// One row of the session overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub started_ms: i64,
    pub clients: u32,
    pub reported: u64,
    /// Best point as the server formats it, or `<unknown>`.
    pub best: String,
}

/// Parse `name:start_ms:clients:reported:best|...`. Entries that do not have
/// all five fields are skipped.
pub fn parse_session_list(text: &str) -> Vec<SessionSummary> {
    text.split('|')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut fields = entry.splitn(5, ':');
            let name = fields.next()?.to_string();
            let started_ms = fields.next()?.parse().ok()?;
            let clients = fields.next()?.parse().ok()?;
            let reported = fields.next()?.parse().ok()?;
            let best = fields
                .next()?
                .replace("&lt;", "<")
                .replace("&gt;", ">");
            Some(SessionSummary {
                name,
                started_ms,
                clients,
                reported,
                best,
            })
        })
        .collect()
}

pub struct SessionControl<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> SessionControl<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    pub async fn send(&self, session: &str, command: Command) -> Result<(), PollError> {
        let result = self
            .transport
            .get(command.path(), Some(&command.query(session)))
            .await
            .map(|_| ());
        log_session_command(session, command.path(), result.is_ok());
        result
    }

    pub async fn list(&self) -> Result<Vec<SessionSummary>, PollError> {
        let body = self.transport.get(LIST_PATH, None).await?;
        Ok(parse_session_list(&body))
    }

    /// Name of the search strategy the session runs.
    pub async fn strategy(&self, session: &str) -> Result<String, PollError> {
        let body = self.transport.get("strategy", Some(session)).await?;
        Ok(body.trim().to_string())
    }

    pub async fn converged(&self, session: &str) -> Result<bool, PollError> {
        let body = self.transport.get("converged", Some(session)).await?;
        Ok(body.trim() == "1")
    }
}
