pub mod address;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod health;
pub mod report;
pub mod sessions;
pub mod store;
pub mod visits;

pub use config::Config;
pub use error::{Error, Result};
pub use geo::{GeoEnrichment, GeoLocation, GeoProvider};
pub use report::VisitReport;
pub use sessions::{Conversations, ConversationRecord, SessionSummary, SortOrder};
pub use store::Store;
pub use visits::{VisitRecord, VisitTracker};
