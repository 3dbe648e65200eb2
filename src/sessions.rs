//! Conversation log grouped into sessions

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geo::UNKNOWN;
use crate::store::Store;

/// Session key used when a turn arrives without one
pub const ANONYMOUS_SESSION: &str = "session-anonymous";

/// One prompt/response turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub prompt: String,
    pub response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub last_message_at: DateTime<Utc>,
}

/// Timestamp ordering for a session's turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }

    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Leftmost hostname label of `origin`, e.g. `https://guddu.example.com` -> `guddu`
pub fn derive_user_id(origin: &str) -> String {
    Url::parse(origin)
        .ok()
        .and_then(|url| {
            url.host_str()
                .and_then(|host| host.split('.').next())
                .filter(|label| !label.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Group turns by session. User id comes from the first turn seen for a
/// session; sessions are ordered by latest turn, newest first, with ties kept
/// in first-encounter order.
pub fn summarize_sessions(records: &[ConversationRecord], limit: Option<usize>) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = Vec::new();

    for record in records {
        match summaries
            .iter_mut()
            .find(|s| s.session_id == record.session_id)
        {
            Some(summary) => {
                if record.timestamp > summary.last_message_at {
                    summary.last_message_at = record.timestamp;
                }
            }
            None => summaries.push(SessionSummary {
                session_id: record.session_id.clone(),
                user_id: record.user_id.clone(),
                last_message_at: record.timestamp,
            }),
        }
    }

    // sort_by is stable
    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));

    if let Some(n) = limit.filter(|&n| n > 0) {
        summaries.truncate(n);
    }
    summaries
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Conversations {
    store: Arc<Store>,
    clock: Clock,
}

impl Conversations {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Append a turn. A missing session id falls back to the anonymous session.
    pub fn append_turn(
        &self,
        prompt: &str,
        response: Option<&str>,
        session_id: Option<&str>,
        origin: &str,
    ) -> Result<ConversationRecord> {
        let session_id = session_id
            .filter(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS_SESSION);

        let record = ConversationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: derive_user_id(origin),
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            response: response.map(str::to_string),
            timestamp: (self.clock)(),
        };

        self.store.insert_conversation(&record)?;
        debug!(session_id = %record.session_id, user_id = %record.user_id, "turn_appended");
        Ok(record)
    }

    /// Turns of one session. Unlike `append_turn`, a missing id is rejected.
    pub fn fetch_by_session(
        &self,
        session_id: Option<&str>,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>> {
        let session_id = session_id
            .filter(|s| !s.is_empty())
            .ok_or(Error::Validation("sessionId"))?;

        self.store.conversations_by_session(session_id, order, limit)
    }

    pub fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        let snapshot = self.store.list_conversations()?;
        Ok(summarize_sessions(&snapshot, limit))
    }
}
