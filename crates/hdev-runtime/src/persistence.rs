//! Session persistence (spec §6 "Persistent state layout": "one file per
//! session id under a data directory").
//!
//! Written on every transition out of `Dispatching` or `Evaluate` (spec
//! §4.I "Persistence"); a plain JSON file keyed by session id, grounded in
//! `astrid-core::dirs`'s one-file-per-entity layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hdev_core::{HdevHome, SessionId};
use hdev_llm::{ContentBlock, Turn};

use crate::context::UsageSummary;
use crate::error::RuntimeResult;
use crate::session::Session;

/// The on-disk shape of one session (spec §6: "`{ session_id,
/// parent_session_id, chat_history, tool_result_buffer, usage_summary,
/// created_at }`").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// This session's id.
    pub session_id: SessionId,
    /// The session this one was forked from, if any.
    pub parent_session_id: Option<SessionId>,
    /// Ordered chat history.
    pub chat_history: Vec<Turn>,
    /// Pending tool-result buffer.
    pub tool_result_buffer: Vec<ContentBlock>,
    /// Aggregated usage (not the raw per-call log; this is the rolled-up
    /// view a future CLI would render).
    pub usage_summary: UsageSummary,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Turn/tool-call counters (SPEC_FULL §3 supplemented feature,
    /// grounded in `astrid-runtime`'s `SessionMetadata`), written
    /// alongside the fields spec §6 names but not replacing any of them.
    #[serde(default)]
    pub turn_count: u64,
    /// See [`Self::turn_count`].
    #[serde(default)]
    pub tool_call_count: u64,
}

impl PersistedSession {
    /// Snapshot `session`'s current state for writing to disk.
    #[must_use]
    pub fn from_session(session: &Session, usage_summary: UsageSummary) -> Self {
        Self {
            session_id: session.id,
            parent_session_id: session.parent_session_id,
            chat_history: session.history.clone(),
            tool_result_buffer: session.tool_result_buffer.clone(),
            usage_summary,
            created_at: session.created_at,
            turn_count: session.turn_count,
            tool_call_count: session.tool_call_count,
        }
    }
}

/// Reads and writes [`PersistedSession`] files under an [`HdevHome`].
pub struct SessionStore {
    home: HdevHome,
}

impl SessionStore {
    /// Build a store rooted at `home`, creating its subdirectories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory layout could not be created.
    pub fn new(home: HdevHome) -> RuntimeResult<Self> {
        home.ensure().map_err(hdev_core::HdevError::Io)?;
        Ok(Self { home })
    }

    /// Persist `session`'s current state (spec §4.I "Persistence").
    ///
    /// # Errors
    ///
    /// Returns an error if the session file could not be written.
    pub async fn save(&self, session: &Session, usage_summary: UsageSummary) -> RuntimeResult<()> {
        let record = PersistedSession::from_session(session, usage_summary);
        let path = self.home.session_file(&session.id);
        let json = serde_json::to_string_pretty(&record).map_err(hdev_core::HdevError::Serde)?;
        tokio::fs::write(path, json).await.map_err(hdev_core::HdevError::Io)?;
        Ok(())
    }

    /// Load a previously persisted session, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but could not be read or parsed.
    pub async fn load(&self, id: SessionId) -> RuntimeResult<Option<PersistedSession>> {
        let path = self.home.session_file(&id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read_to_string(path).await.map_err(hdev_core::HdevError::Io)?;
        let record: PersistedSession = serde_json::from_str(&bytes).map_err(hdev_core::HdevError::Serde)?;
        Ok(Some(record))
    }
}
