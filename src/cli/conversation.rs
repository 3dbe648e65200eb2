//! Conversation command implementations

use anyhow::{Context, Result};
use tracing::debug;

use crate::sessions::{Conversations, SortOrder};

pub fn append(
    conversations: &Conversations,
    prompt: &str,
    response: Option<&str>,
    session: Option<&str>,
    origin: &str,
) -> Result<()> {
    let record = conversations
        .append_turn(prompt, response, session, origin)
        .context("appending conversation turn")?;
    super::print_json(&record)
}

pub fn show(
    conversations: &Conversations,
    session: Option<&str>,
    order: SortOrder,
    limit: Option<usize>,
) -> Result<()> {
    debug!(session = ?session, order = order.as_str(), limit = ?limit, "fetching session");
    let records = conversations
        .fetch_by_session(session, order, limit)
        .context("fetching session")?;
    super::print_json(&records)
}

pub fn list(conversations: &Conversations, limit: Option<usize>) -> Result<()> {
    let sessions = conversations
        .list_sessions(limit)
        .context("listing sessions")?;
    super::print_json(&sessions)
}
