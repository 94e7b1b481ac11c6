//! v001 -- Initial schema creation.
//!
//! A single `documents` table addressed by collection path and id. Top-level
//! collections use their name as path (`employees`); sub-collections use
//! `<collection>/<id>/<name>`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    path        TEXT NOT NULL,               -- collection path
    id          TEXT NOT NULL,               -- UUID v4 unless imported
    body        TEXT NOT NULL,               -- JSON object
    created_at  TEXT NOT NULL,               -- RFC-3339
    updated_at  TEXT NOT NULL,

    PRIMARY KEY (path, id)
);

-- Index entries carry the rowid, so a path scan comes back in insertion order.
CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
