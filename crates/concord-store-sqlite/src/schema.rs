//! SQL schema for the Concord SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Statements are never hard-deleted; removal sets deleted_at.
CREATE TABLE IF NOT EXISTS statements (
    statement_id    TEXT PRIMARY KEY,
    discussion_id   TEXT NOT NULL,
    author_id       TEXT NOT NULL,
    text            TEXT NOT NULL,
    text_hash       TEXT NOT NULL,   -- sha256 of the normalised text
    kind            TEXT NOT NULL,   -- 'claim' | 'question'
    created_at      TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    edited_at       TEXT,
    moderation      TEXT NOT NULL,   -- 'pending' | 'approved' | 'rejected'
    deleted_at      TEXT,
    deletion_reason TEXT,            -- 'moderation' | 'owner'
    is_seed         INTEGER NOT NULL DEFAULT 0,
    flag_count      INTEGER NOT NULL DEFAULT 0,
    agree_count     INTEGER NOT NULL DEFAULT 0,
    disagree_count  INTEGER NOT NULL DEFAULT 0,
    unsure_count    INTEGER NOT NULL DEFAULT 0,
    vote_count      INTEGER NOT NULL DEFAULT 0,
    CHECK (agree_count + disagree_count + unsure_count = vote_count),
    CHECK (agree_count >= 0 AND disagree_count >= 0 AND unsure_count >= 0)
);

-- One live statement per normalised text per discussion.
CREATE UNIQUE INDEX IF NOT EXISTS statements_live_text_idx
    ON statements(discussion_id, text_hash) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS statements_discussion_idx ON statements(discussion_id);

-- Exactly one current vote per (participant, statement); revotes update in place.
CREATE TABLE IF NOT EXISTS votes (
    participant_id TEXT NOT NULL,
    statement_id   TEXT NOT NULL REFERENCES statements(statement_id),
    value          INTEGER NOT NULL CHECK (value IN (-1, 0, 1)),
    confidence     INTEGER CHECK (confidence BETWEEN 1 AND 5),
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (participant_id, statement_id)
);

CREATE INDEX IF NOT EXISTS votes_statement_idx ON votes(statement_id);

CREATE TABLE IF NOT EXISTS flags (
    flag_id      TEXT PRIMARY KEY,
    statement_id TEXT NOT NULL REFERENCES statements(statement_id),
    reporter_id  TEXT NOT NULL,
    reason       TEXT,
    recorded_at  TEXT NOT NULL,
    UNIQUE (statement_id, reporter_id)
);

-- Every run is kept; only the is_current row is read.
CREATE TABLE IF NOT EXISTS analyses (
    analysis_id       TEXT PRIMARY KEY,
    discussion_id     TEXT NOT NULL,
    computed_at       TEXT NOT NULL,
    cluster_count     INTEGER NOT NULL,
    cluster_sizes     TEXT NOT NULL,   -- JSON array
    silhouette        REAL NOT NULL,
    low_confidence    INTEGER NOT NULL,
    participant_count INTEGER NOT NULL,
    consensus_ids     TEXT NOT NULL,   -- JSON array of statement ids
    bridge_ids        TEXT NOT NULL,
    divisive_ids      TEXT NOT NULL,
    statement_stats   TEXT NOT NULL,   -- JSON array
    vote_count        INTEGER NOT NULL,
    is_current        INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS analyses_current_idx
    ON analyses(discussion_id) WHERE is_current = 1;

-- Per-discussion advisory lock; a row past expires_at may be taken over.
CREATE TABLE IF NOT EXISTS analysis_locks (
    discussion_id TEXT PRIMARY KEY,
    lease_id      TEXT NOT NULL,
    acquired_at   TEXT NOT NULL,
    expires_at    TEXT NOT NULL
);

PRAGMA user_version = 1;
";
