//! SQL schema for the Lineage SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! Dates are stored as `YYYY-MM-DD` text so that string comparison orders
//! them; every window is the pair `(window_start, window_end)`, half-open.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ticker_window (
    ticker       TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end   TEXT NOT NULL,
    PRIMARY KEY (ticker, window_start, window_end),
    CHECK (window_start < window_end)
);

-- Candidates and evidence are strictly append-only.
-- No UPDATE or DELETE is ever issued against these tables.
CREATE TABLE IF NOT EXISTS candidate (
    ticker         TEXT NOT NULL,
    window_start   TEXT NOT NULL,
    window_end     TEXT NOT NULL,
    entity_key     TEXT NOT NULL,
    first_seen_at  TEXT NOT NULL,   -- RFC 3339 UTC
    last_seen_at   TEXT NOT NULL,
    first_seen_url TEXT NOT NULL,
    last_seen_url  TEXT NOT NULL,
    PRIMARY KEY (ticker, window_start, window_end, entity_key),
    FOREIGN KEY (ticker, window_start, window_end)
        REFERENCES ticker_window(ticker, window_start, window_end),
    CHECK (length(entity_key) = 10),
    CHECK (first_seen_at <= last_seen_at)
);

CREATE TABLE IF NOT EXISTS evidence (
    evidence_id  TEXT PRIMARY KEY,  -- deterministic v5 UUID
    ticker       TEXT NOT NULL,
    entity_key   TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end   TEXT NOT NULL,
    filed_at     TEXT NOT NULL,     -- RFC 3339 UTC
    filing_type  TEXT NOT NULL,
    items        TEXT NOT NULL DEFAULT '[]',
    accession    TEXT,
    source       TEXT NOT NULL,
    raw_payload  TEXT NOT NULL,     -- producer record, verbatim JSON
    company_name TEXT NOT NULL,
    FOREIGN KEY (ticker, window_start, window_end)
        REFERENCES ticker_window(ticker, window_start, window_end),
    CHECK (length(entity_key) = 10)
);

-- Checkpoints: one row per fully harvested (ticker, window, candidate).
-- Written in the same transaction as the evidence it covers.
CREATE TABLE IF NOT EXISTS harvest_registry (
    ticker       TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end   TEXT NOT NULL,
    entity_key   TEXT NOT NULL,
    run_id       TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (ticker, window_start, window_end, entity_key)
);

CREATE TABLE IF NOT EXISTS adjudication (
    adjudication_id TEXT PRIMARY KEY,
    ticker          TEXT NOT NULL,
    window_start    TEXT NOT NULL,
    window_end      TEXT NOT NULL,
    entity_key      TEXT,
    action          TEXT NOT NULL,
    rationale       TEXT NOT NULL,
    sources         TEXT NOT NULL,  -- JSON array, never empty
    evidence_id     TEXT NOT NULL REFERENCES evidence(evidence_id),
    canonical_name  TEXT,
    recorded_at     TEXT NOT NULL,
    CHECK (action IN ('seed-with-entity', 'manual-override', 'window-split', 'alias-rewrite')),
    CHECK ((action = 'alias-rewrite') = (entity_key IS NULL)),
    CHECK (entity_key IS NULL OR length(entity_key) = 10),
    CHECK (window_start < window_end),
    CHECK (sources != '[]')
);

-- Episodes are immutable. Supersession and reinstatement are appended to
-- the lifecycle tables; the newest event decides an episode's status.
CREATE TABLE IF NOT EXISTS accepted_mapping (
    episode_id         TEXT PRIMARY KEY,  -- content-derived v5 UUID
    ticker             TEXT NOT NULL,
    entity_key         TEXT NOT NULL,
    window_start       TEXT NOT NULL,
    window_end         TEXT NOT NULL,
    evidence_id        TEXT NOT NULL REFERENCES evidence(evidence_id),
    justification_type TEXT NOT NULL,
    adjudication_id    TEXT REFERENCES adjudication(adjudication_id),
    recorded_at        TEXT NOT NULL,
    CHECK (window_start < window_end)
);

CREATE TABLE IF NOT EXISTS mapping_lifecycle (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    episode_id  TEXT NOT NULL REFERENCES accepted_mapping(episode_id),
    event       TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    CHECK (event IN ('superseded', 'reinstated'))
);

CREATE TABLE IF NOT EXISTS name_episode (
    episode_id     TEXT PRIMARY KEY,
    entity_key     TEXT NOT NULL,
    window_start   TEXT NOT NULL,
    window_end     TEXT NOT NULL,
    canonical_name TEXT NOT NULL,
    observed_name  TEXT NOT NULL,
    evidence_id    TEXT NOT NULL REFERENCES evidence(evidence_id),
    corrected_by   TEXT REFERENCES adjudication(adjudication_id),
    recorded_at    TEXT NOT NULL,
    CHECK (window_start < window_end)
);

CREATE TABLE IF NOT EXISTS name_lifecycle (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    episode_id  TEXT NOT NULL REFERENCES name_episode(episode_id),
    event       TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    CHECK (event IN ('superseded', 'reinstated'))
);

CREATE VIEW IF NOT EXISTS mapping_status AS
SELECT m.*, l.event AS last_event, l.recorded_at AS last_event_at
FROM accepted_mapping m
LEFT JOIN mapping_lifecycle l ON l.event_id = (
    SELECT MAX(event_id) FROM mapping_lifecycle WHERE episode_id = m.episode_id
);

CREATE VIEW IF NOT EXISTS name_status AS
SELECT n.*, l.event AS last_event, l.recorded_at AS last_event_at
FROM name_episode n
LEFT JOIN name_lifecycle l ON l.event_id = (
    SELECT MAX(event_id) FROM name_lifecycle WHERE episode_id = n.episode_id
);

-- Derived per-run view of window stages; replaced wholesale per ticker.
CREATE TABLE IF NOT EXISTS window_report (
    ticker       TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end   TEXT NOT NULL,
    stage        TEXT NOT NULL,
    trace        TEXT NOT NULL,     -- JSON array of stages
    recorded_at  TEXT NOT NULL,
    PRIMARY KEY (ticker, window_start, window_end)
);

CREATE INDEX IF NOT EXISTS evidence_window_idx   ON evidence(ticker, window_start, window_end);
CREATE INDEX IF NOT EXISTS evidence_entity_idx   ON evidence(entity_key);
CREATE INDEX IF NOT EXISTS adjudication_tick_idx ON adjudication(ticker);
CREATE INDEX IF NOT EXISTS mapping_ticker_idx    ON accepted_mapping(ticker);
CREATE INDEX IF NOT EXISTS mapping_entity_idx    ON accepted_mapping(entity_key);
CREATE INDEX IF NOT EXISTS mapping_events_idx    ON mapping_lifecycle(episode_id);
CREATE INDEX IF NOT EXISTS name_entity_idx       ON name_episode(entity_key);
CREATE INDEX IF NOT EXISTS name_events_idx       ON name_lifecycle(episode_id);

PRAGMA user_version = 1;
";
