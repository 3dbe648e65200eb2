//! Track command implementation

use anyhow::{Context, Result};

use crate::visits::{VisitSnapshot, VisitTracker};

pub async fn run(
    tracker: &VisitTracker,
    address: &str,
    user_agent: Option<&str>,
    origin: Option<&str>,
) -> Result<()> {
    let record = tracker
        .track_visit(address, user_agent, origin)
        .await
        .with_context(|| format!("tracking visit from {}", address))?;

    super::print_json(&VisitSnapshot::from(&record))
}
