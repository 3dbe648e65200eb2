//! Report command implementation

use anyhow::{Context, Result};

use crate::report::build_report;
use crate::store::Store;

/// Read-only: builds the rollup from a snapshot, no geolocation involved
pub fn run(store: &Store) -> Result<()> {
    let snapshot = store.list_visits().context("reading visits")?;
    super::print_json(&build_report(&snapshot))
}
