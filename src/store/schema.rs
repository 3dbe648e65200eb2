//! SQLite schema definition
//!
//! - visits: one row per normalized client address, counters updated in place
//! - conversations: append-only log of prompt/response turns

pub const SCHEMA: &str = r#"
-- ============================================
-- VISITS
-- ============================================

-- One row per normalized address; never deleted
CREATE TABLE IF NOT EXISTS visits (
    address TEXT PRIMARY KEY,              -- Normalized client address
    user_agent TEXT,                       -- Latest observed
    origin TEXT,                           -- Latest observed Origin header
    country TEXT NOT NULL DEFAULT 'Unknown',
    city TEXT NOT NULL DEFAULT 'Unknown',
    region TEXT NOT NULL DEFAULT 'Unknown',
    isp TEXT NOT NULL DEFAULT 'Unknown',
    visit_count INTEGER NOT NULL DEFAULT 1 CHECK (visit_count >= 1),
    first_seen TEXT NOT NULL,              -- RFC 3339 UTC, microseconds
    last_seen TEXT NOT NULL
);

-- ============================================
-- CONVERSATIONS
-- ============================================

-- Immutable once written
CREATE TABLE IF NOT EXISTS conversations (
    seq INTEGER PRIMARY KEY,               -- Insertion order
    id TEXT NOT NULL UNIQUE,               -- UUID
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    response TEXT,
    timestamp TEXT NOT NULL                -- RFC 3339 UTC, microseconds
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id, timestamp);
"#;
