//! Persistence with SQLite
//!
//! A single connection guarded by a mutex. Every public method runs its SQL
//! while holding the lock and releases it before returning, so callers never
//! hold it across an `.await`.

mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::Result;
use crate::geo::GeoLocation;
use crate::sessions::{ConversationRecord, SortOrder};
use crate::visits::VisitRecord;

pub use schema::SCHEMA;

const VISIT_COLUMNS: &str = "address, user_agent, origin, country, city, region, isp, \
                             visit_count, first_seen, last_seen";

const CONVERSATION_COLUMNS: &str = "id, user_id, session_id, prompt, response, timestamp";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    // ============================================
    // VISITS
    // ============================================

    /// Bump the counter of an existing address in one statement.
    /// Returns `None` when the address has never been seen.
    pub fn increment_visit(
        &self,
        address: &str,
        user_agent: Option<&str>,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<VisitRecord>> {
        let sql = format!(
            "UPDATE visits
             SET visit_count = visit_count + 1,
                 last_seen = MAX(last_seen, ?2),
                 user_agent = ?3,
                 origin = ?4
             WHERE address = ?1
             RETURNING {}",
            VISIT_COLUMNS
        );

        let record = self
            .conn()
            .query_row(
                &sql,
                params![address, format_timestamp(now), user_agent, origin],
                map_visit,
            )
            .optional()?;

        Ok(record)
    }

    /// Insert a first-seen address, or increment it if another writer created
    /// it in the meantime. The stored geo is only written on insert.
    pub fn upsert_visit(
        &self,
        address: &str,
        user_agent: Option<&str>,
        origin: Option<&str>,
        geo: &GeoLocation,
        now: DateTime<Utc>,
    ) -> Result<VisitRecord> {
        let sql = format!(
            "INSERT INTO visits
                (address, user_agent, origin, country, city, region, isp,
                 visit_count, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
             ON CONFLICT(address) DO UPDATE SET
                 visit_count = visit_count + 1,
                 last_seen = MAX(last_seen, excluded.last_seen),
                 user_agent = excluded.user_agent,
                 origin = excluded.origin
             RETURNING {}",
            VISIT_COLUMNS
        );

        let record = self.conn().query_row(
            &sql,
            params![
                address,
                user_agent,
                origin,
                geo.country,
                geo.city,
                geo.region,
                geo.isp,
                format_timestamp(now),
            ],
            map_visit,
        )?;

        Ok(record)
    }

    pub fn get_visit(&self, address: &str) -> Result<Option<VisitRecord>> {
        let sql = format!("SELECT {} FROM visits WHERE address = ?", VISIT_COLUMNS);
        let record = self
            .conn()
            .query_row(&sql, params![address], map_visit)
            .optional()?;
        Ok(record)
    }

    /// All visits in first-insertion order
    pub fn list_visits(&self) -> Result<Vec<VisitRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visits ORDER BY rowid",
            VISIT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], map_visit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ============================================
    // CONVERSATIONS
    // ============================================

    pub fn insert_conversation(&self, record: &ConversationRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO conversations (id, user_id, session_id, prompt, response, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.user_id,
                record.session_id,
                record.prompt,
                record.response,
                format_timestamp(record.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Turns of one session ordered by timestamp; insertion order breaks ties.
    /// A limit of zero means unlimited.
    pub fn conversations_by_session(
        &self,
        session_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>> {
        let direction = order.as_sql();
        let sql = format!(
            "SELECT {} FROM conversations
             WHERE session_id = ?1
             ORDER BY timestamp {}, seq {}
             LIMIT ?2",
            CONVERSATION_COLUMNS, direction, direction
        );
        let limit = limit
            .filter(|&n| n > 0)
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id, limit], map_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every turn in insertion order
    pub fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations ORDER BY seq",
            CONVERSATION_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], map_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ============================================
// ROW MAPPING
// ============================================

/// Fixed-width RFC 3339 so lexical order equals chronological order
pub(crate) fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_visit(row: &Row) -> rusqlite::Result<VisitRecord> {
    Ok(VisitRecord {
        address: row.get(0)?,
        user_agent: row.get(1)?,
        origin: row.get(2)?,
        geo: GeoLocation {
            country: row.get(3)?,
            city: row.get(4)?,
            region: row.get(5)?,
            isp: row.get(6)?,
        },
        visit_count: row.get(7)?,
        first_seen: timestamp_at(row, 8)?,
        last_seen: timestamp_at(row, 9)?,
    })
}

fn map_conversation(row: &Row) -> rusqlite::Result<ConversationRecord> {
    Ok(ConversationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        prompt: row.get(3)?,
        response: row.get(4)?,
        timestamp: timestamp_at(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn oslo() -> GeoLocation {
        GeoLocation {
            country: "Norway".into(),
            city: "Oslo".into(),
            region: "Oslo County".into(),
            isp: "Telenor".into(),
        }
    }

    fn turn(session: &str, secs: i64, prompt: &str) -> ConversationRecord {
        ConversationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "guddu".into(),
            session_id: session.into(),
            prompt: prompt.into(),
            response: None,
            timestamp: at(secs),
        }
    }

    #[test]
    fn test_increment_unknown_address_is_none() {
        let store = Store::open_in_memory().unwrap();
        let res = store.increment_visit("192.0.2.1", None, None, at(0)).unwrap();
        assert!(res.is_none());
        assert!(store.list_visits().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_then_increment() {
        let store = Store::open_in_memory().unwrap();
        let created = store
            .upsert_visit("192.0.2.1", Some("curl/8"), None, &oslo(), at(0))
            .unwrap();
        assert_eq!(created.visit_count, 1);
        assert_eq!(created.first_seen, created.last_seen);

        let bumped = store
            .increment_visit("192.0.2.1", Some("firefox"), Some("https://a.example"), at(5))
            .unwrap()
            .unwrap();
        assert_eq!(bumped.visit_count, 2);
        assert_eq!(bumped.first_seen, at(0));
        assert_eq!(bumped.last_seen, at(5));
        assert_eq!(bumped.user_agent.as_deref(), Some("firefox"));
        assert_eq!(bumped.origin.as_deref(), Some("https://a.example"));
        assert_eq!(bumped.geo, oslo());
    }

    #[test]
    fn test_upsert_conflict_keeps_original_geo() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_visit("192.0.2.1", None, None, &oslo(), at(0))
            .unwrap();
        let second = store
            .upsert_visit("192.0.2.1", None, None, &GeoLocation::unknown(), at(1))
            .unwrap();

        assert_eq!(second.visit_count, 2);
        assert_eq!(second.geo, oslo());
        assert_eq!(store.list_visits().unwrap().len(), 1);
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_visit("192.0.2.1", None, None, &oslo(), at(10))
            .unwrap();
        let late = store
            .increment_visit("192.0.2.1", None, None, at(3))
            .unwrap()
            .unwrap();
        assert_eq!(late.last_seen, at(10));
        assert!(late.last_seen >= late.first_seen);
    }

    #[test]
    fn test_list_visits_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        for addr in ["198.51.100.3", "192.0.2.1", "203.0.113.9"] {
            store
                .upsert_visit(addr, None, None, &oslo(), at(0))
                .unwrap();
        }
        let addrs: Vec<String> = store
            .list_visits()
            .unwrap()
            .into_iter()
            .map(|v| v.address)
            .collect();
        assert_eq!(addrs, vec!["198.51.100.3", "192.0.2.1", "203.0.113.9"]);
    }

    #[test]
    fn test_conversations_by_session_order_and_limit() {
        let store = Store::open_in_memory().unwrap();
        store.insert_conversation(&turn("s1", 20, "second")).unwrap();
        store.insert_conversation(&turn("s2", 5, "other")).unwrap();
        store.insert_conversation(&turn("s1", 10, "first")).unwrap();
        store.insert_conversation(&turn("s1", 30, "third")).unwrap();

        let asc = store
            .conversations_by_session("s1", SortOrder::Ascending, None)
            .unwrap();
        let prompts: Vec<&str> = asc.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["first", "second", "third"]);

        let desc = store
            .conversations_by_session("s1", SortOrder::Descending, Some(2))
            .unwrap();
        let prompts: Vec<&str> = desc.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["third", "second"]);

        let unlimited = store
            .conversations_by_session("s1", SortOrder::Ascending, Some(0))
            .unwrap();
        assert_eq!(unlimited.len(), 3);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("guestbook.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .upsert_visit("192.0.2.1", None, None, &oslo(), at(0))
                .unwrap();
            store.insert_conversation(&turn("s1", 0, "hello")).unwrap();
        }

        let store = Store::open(&path).unwrap();
        let visit = store.get_visit("192.0.2.1").unwrap().unwrap();
        assert_eq!(visit.geo.city, "Oslo");
        assert_eq!(store.list_conversations().unwrap().len(), 1);
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(at(0));
        let b = format_timestamp(at(0) + chrono::Duration::microseconds(1));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
