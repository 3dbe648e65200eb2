//! Visit tracking: deduplicate events by client address into running counters

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::address;
use crate::error::Result;
use crate::geo::{GeoEnrichment, GeoLocation};
use crate::report::{self, VisitReport};
use crate::store::Store;

/// One tracked client address
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub address: String,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub geo: GeoLocation,
    pub visit_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// What `track_visit` reports back to callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitSnapshot {
    pub address: String,
    pub visit_count: i64,
    pub origin: Option<String>,
    pub geo: GeoLocation,
}

impl From<&VisitRecord> for VisitSnapshot {
    fn from(record: &VisitRecord) -> Self {
        Self {
            address: record.address.clone(),
            visit_count: record.visit_count,
            origin: record.origin.clone(),
            geo: record.geo.clone(),
        }
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct VisitTracker {
    store: Arc<Store>,
    geo: GeoEnrichment,
    clock: Clock,
}

impl VisitTracker {
    pub fn new(store: Arc<Store>, geo: GeoEnrichment) -> Self {
        Self {
            store,
            geo,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, used to pin timestamps
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Record one event for `raw_address`.
    ///
    /// Known addresses are incremented in a single statement. Unseen addresses
    /// are geolocated first, with no lock held, and then inserted through an
    /// upsert that falls back to incrementing if a concurrent event for the
    /// same address won the insert.
    pub async fn track_visit(
        &self,
        raw_address: &str,
        user_agent: Option<&str>,
        origin: Option<&str>,
    ) -> Result<VisitRecord> {
        let address = address::normalize(raw_address);
        let now = (self.clock)();

        if let Some(record) = self
            .store
            .increment_visit(&address, user_agent, origin, now)?
        {
            debug!(address = %address, visit_count = record.visit_count, "visit_incremented");
            return Ok(record);
        }

        let geo = self.geo.resolve(&address).await;
        let record = self
            .store
            .upsert_visit(&address, user_agent, origin, &geo, now)?;

        if record.visit_count == 1 {
            info!(
                address = %address,
                country = %record.geo.country,
                city = %record.geo.city,
                "visit_created"
            );
        } else {
            debug!(address = %address, visit_count = record.visit_count, "visit_raced_insert");
        }

        Ok(record)
    }

    /// Every stored visit, oldest address first
    pub fn list_all(&self) -> Result<Vec<VisitRecord>> {
        self.store.list_visits()
    }

    /// Hierarchical report over a snapshot of all visits
    pub fn report(&self) -> Result<VisitReport> {
        let snapshot = self.store.list_visits()?;
        Ok(report::build_report(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::testing::TableProvider;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    fn tracker_with(provider: TableProvider) -> VisitTracker {
        let store = Arc::new(Store::open_in_memory().unwrap());
        VisitTracker::new(store, GeoEnrichment::new(Box::new(provider)))
    }

    fn known_provider() -> TableProvider {
        TableProvider::default().with("192.0.2.1", "Norway", "Oslo County", "Oslo")
    }

    #[tokio::test]
    async fn test_mapped_and_bare_address_share_record() {
        let tracker = tracker_with(known_provider());

        tracker.track_visit("::ffff:192.0.2.1", Some("ua"), None).await.unwrap();
        let second = tracker.track_visit("192.0.2.1", Some("ua"), None).await.unwrap();

        assert_eq!(second.address, "192.0.2.1");
        assert_eq!(second.visit_count, 2);
        assert_eq!(tracker.list_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counter_monotonic_with_pinned_clock() {
        let tick = Arc::new(AtomicI64::new(0));
        let clock_tick = tick.clone();
        let tracker = tracker_with(known_provider()).with_clock(move || {
            let n = clock_tick.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap()
        });

        let first = tracker.track_visit("192.0.2.1", None, None).await.unwrap();
        let mut last = first.clone();
        for _ in 1..5 {
            last = tracker.track_visit("192.0.2.1", None, None).await.unwrap();
        }

        assert_eq!(last.visit_count, 5);
        assert_eq!(last.first_seen, first.first_seen);
        // Clock is read once per call: call N ran at tick N-1
        let expected_last = Utc.timestamp_opt(1_700_000_000 + 4 * 60, 0).unwrap();
        assert_eq!(last.last_seen, expected_last);
        assert!(last.last_seen >= last.first_seen);
    }

    #[tokio::test]
    async fn test_first_visit_stamped_at_arrival() {
        let reads = Arc::new(AtomicI64::new(0));
        let clock_reads = reads.clone();
        let tracker = tracker_with(known_provider()).with_clock(move || {
            let n = clock_reads.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap()
        });

        let first = tracker.track_visit("192.0.2.1", None, None).await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(first.first_seen, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        assert_eq!(first.last_seen, first.first_seen);

        let second = tracker.track_visit("192.0.2.1", None, None).await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(second.last_seen, Utc.timestamp_opt(1_700_000_060, 0).unwrap());
    }

    #[tokio::test]
    async fn test_latest_metadata_overwrites() {
        let tracker = tracker_with(known_provider());
        tracker
            .track_visit("192.0.2.1", Some("curl/8"), Some("https://a.example.com"))
            .await
            .unwrap();
        let record = tracker
            .track_visit("192.0.2.1", Some("firefox"), Some("https://b.example.com"))
            .await
            .unwrap();

        assert_eq!(record.user_agent.as_deref(), Some("firefox"));
        assert_eq!(record.origin.as_deref(), Some("https://b.example.com"));
    }

    #[tokio::test]
    async fn test_geo_resolved_only_for_first_event() {
        let provider = known_provider();
        let calls: Arc<AtomicUsize> = provider.calls.clone();
        let tracker = tracker_with(provider);

        for _ in 0..3 {
            tracker.track_visit("192.0.2.1", None, None).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_geo_failure_still_records_visit() {
        let tracker = tracker_with(TableProvider::default());
        let record = tracker
            .track_visit("198.51.100.7", None, Some("https://x.example.com"))
            .await
            .unwrap();

        assert_eq!(record.visit_count, 1);
        assert!(record.geo.is_unknown());

        let report = tracker.report().unwrap();
        assert!(report.visits.is_empty());
        assert!(report.countries.is_empty());
        assert_eq!(tracker.list_all().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_visits_do_not_lose_updates() {
        const M: usize = 32;
        let tracker = Arc::new(tracker_with(known_provider()));

        let handles: Vec<_> = (0..M)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.track_visit("192.0.2.1", None, None).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = tracker.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].visit_count, M as i64);
        assert_eq!(all[0].geo.country, "Norway");
    }

    #[test]
    fn test_snapshot_shape() {
        let record = VisitRecord {
            address: "192.0.2.1".into(),
            user_agent: None,
            origin: Some("https://a.example.com".into()),
            geo: GeoLocation::unknown(),
            visit_count: 3,
            first_seen: Utc.timestamp_opt(0, 0).unwrap(),
            last_seen: Utc.timestamp_opt(0, 0).unwrap(),
        };
        let json = serde_json::to_value(VisitSnapshot::from(&record)).unwrap();
        assert_eq!(json["visitCount"], 3);
        assert_eq!(json["origin"], "https://a.example.com");
        assert_eq!(json["geo"]["country"], "Unknown");
    }
}
