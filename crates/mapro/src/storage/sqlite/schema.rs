//! SQLite schema definitions and SQL query constants.
//!
//! Pure data, no I/O.

/// SQL statement to create all tables.
pub const CREATE_TABLES: &str = r#"
-- Every soft-deletable record, one row per (kind, id)
CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    delete_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    household_id TEXT,
    sitio_id TEXT,
    account_id TEXT,
    body TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);

-- Staff accounts
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes for efficient queries
CREATE INDEX IF NOT EXISTS idx_records_kind_deleted ON records(kind, is_deleted);
CREATE INDEX IF NOT EXISTS idx_records_household_id ON records(household_id);
CREATE INDEX IF NOT EXISTS idx_records_sitio_id ON records(sitio_id);
CREATE INDEX IF NOT EXISTS idx_records_account_id ON records(account_id);
"#;

// Record queries

/// Shared filter: ?1 kind, ?2 is_deleted (NULL = any), ?3 household_id,
/// ?4 sitio_id, ?5 account_id. NULL relation parameters match everything.
macro_rules! record_filter {
    () => {
        r#"
WHERE kind = ?1
  AND (?2 IS NULL OR is_deleted = ?2)
  AND (?3 IS NULL OR household_id = ?3)
  AND (?4 IS NULL OR sitio_id = ?4)
  AND (?5 IS NULL OR account_id = ?5)
"#
    };
}

pub const SELECT_RECORDS: &str = concat!(
    "SELECT body FROM records",
    record_filter!(),
    "ORDER BY created_at ASC, id ASC"
);

pub const COUNT_RECORDS: &str = concat!("SELECT COUNT(*) FROM records", record_filter!());

pub const SELECT_RECORD: &str = r#"
SELECT body
FROM records
WHERE kind = ?1 AND id = ?2
"#;

pub const COUNT_LIVE_RECORD: &str = r#"
SELECT COUNT(*)
FROM records
WHERE kind = ?1 AND id = ?2 AND is_deleted = 0
"#;

pub const INSERT_RECORD: &str = r#"
INSERT INTO records (kind, id, is_deleted, delete_reason, created_at, updated_at, household_id, sitio_id, account_id, body)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

pub const UPDATE_RECORD_STATE: &str = r#"
UPDATE records
SET is_deleted = ?3, delete_reason = ?4, updated_at = ?5, body = ?6
WHERE kind = ?1 AND id = ?2
"#;

// Account queries
pub const INSERT_ACCOUNT: &str = r#"
INSERT INTO accounts (id, username, role, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#;

pub const SELECT_ACCOUNT_BY_ID: &str = r#"
SELECT id, username, role, created_at, updated_at
FROM accounts
WHERE id = ?1
"#;

pub const UPDATE_ACCOUNT_ROLE: &str = r#"
UPDATE accounts
SET role = ?2, updated_at = ?3
WHERE id = ?1
"#;
