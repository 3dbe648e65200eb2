//! Command implementations for the `guestbook` binary

pub mod conversation;
pub mod ping;
pub mod report;
pub mod track;

use anyhow::Result;
use serde::Serialize;

/// Pretty JSON on stdout; logs go to stderr
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
