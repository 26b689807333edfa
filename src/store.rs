//! SQLite persistence for accepted entries.
//!
//! Categories own files, files own ordered entries. Each file carries its
//! own sequence pointer so entry order survives re-imports. Appends run in
//! one transaction; a failed pipeline never leaves partial rows behind.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::types::{CandidateEntry, EntryProvenance};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS files (
    id          TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES categories(id),
    name        TEXT NOT NULL,
    next_seq    INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    UNIQUE(category_id, name)
);
CREATE TABLE IF NOT EXISTS entries (
    id          TEXT PRIMARY KEY,
    file_id     TEXT NOT NULL REFERENCES files(id),
    seq         INTEGER NOT NULL,
    term        TEXT NOT NULL,
    meaning     TEXT NOT NULL,
    example     TEXT,
    confidence  REAL NOT NULL,
    subject     TEXT,
    unit        TEXT,
    chapter     TEXT,
    provenance  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_file_seq ON entries(file_id, seq);
";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Find or create a category by name, returning its id.
    pub fn ensure_category(&self, name: &str) -> Result<String, StoreError> {
        let existing: Option<String> = self
            .conn
            .query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO categories (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(category = name, "category created");
        Ok(id)
    }

    /// Find or create a file under a category, returning its id.
    pub fn ensure_file(&self, category_id: &str, name: &str) -> Result<String, StoreError> {
        let category_exists: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM categories WHERE id = ?1",
                [category_id],
                |row| row.get(0),
            )
            .optional()?;
        if category_exists.is_none() {
            return Err(StoreError::CategoryNotFound(category_id.to_string()));
        }

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE category_id = ?1 AND name = ?2",
                params![category_id, name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO files (id, category_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, category_id, name, Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    /// Append entries to a file in one transaction, consuming the file's
    /// sequence pointer. Returns how many rows were written.
    pub fn append_entries(
        &mut self,
        file_id: &str,
        entries: &[CandidateEntry],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;

        let next_seq: Option<i64> = tx
            .query_row("SELECT next_seq FROM files WHERE id = ?1", [file_id], |row| {
                row.get(0)
            })
            .optional()?;
        let mut seq = next_seq.ok_or_else(|| StoreError::FileNotFound(file_id.to_string()))?;

        for entry in entries {
            let provenance = match entry.provenance {
                EntryProvenance::Heuristic => "heuristic",
                EntryProvenance::Ai => "ai",
            };
            tx.execute(
                "INSERT INTO entries
                 (id, file_id, seq, term, meaning, example, confidence,
                  subject, unit, chapter, provenance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    Uuid::new_v4().to_string(),
                    file_id,
                    seq,
                    entry.term,
                    entry.meaning,
                    entry.example,
                    entry.confidence as f64,
                    entry.subject,
                    entry.unit,
                    entry.chapter,
                    provenance,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            seq += 1;
        }

        tx.execute(
            "UPDATE files SET next_seq = ?1 WHERE id = ?2",
            params![seq, file_id],
        )?;
        tx.commit()?;
        tracing::debug!(file_id, written = entries.len(), "entries appended");
        Ok(entries.len())
    }

    /// Terms of a file's entries, in sequence order.
    pub fn entry_terms(&self, file_id: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT term FROM entries WHERE file_id = ?1 ORDER BY seq")?;
        let terms = stmt
            .query_map([file_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(terms)
    }

    pub fn entry_count(&self, file_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE file_id = ?1",
            [file_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: &str, meaning: &str) -> CandidateEntry {
        CandidateEntry::new(term, meaning, None, EntryProvenance::Heuristic).unwrap()
    }

    #[test]
    fn category_and_file_creation_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let cat1 = store.ensure_category("Spanish").unwrap();
        let cat2 = store.ensure_category("Spanish").unwrap();
        assert_eq!(cat1, cat2);

        let file1 = store.ensure_file(&cat1, "unit1.pdf").unwrap();
        let file2 = store.ensure_file(&cat1, "unit1.pdf").unwrap();
        assert_eq!(file1, file2);
    }

    #[test]
    fn missing_category_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.ensure_file("nope", "file"),
            Err(StoreError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn sequence_pointer_survives_multiple_appends() {
        let mut store = Store::open_in_memory().unwrap();
        let cat = store.ensure_category("Biology").unwrap();
        let file = store.ensure_file(&cat, "ch3.pdf").unwrap();

        store
            .append_entries(&file, &[entry("a", "first"), entry("b", "second")])
            .unwrap();
        store.append_entries(&file, &[entry("c", "third")]).unwrap();

        assert_eq!(store.entry_count(&file).unwrap(), 3);
        assert_eq!(store.entry_terms(&file).unwrap(), vec!["a", "b", "c"]);

        let next: i64 = store
            .conn
            .query_row("SELECT next_seq FROM files WHERE id = ?1", [file.as_str()], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(next, 4);
    }

    #[test]
    fn append_to_unknown_file_fails_clean() {
        let mut store = Store::open_in_memory().unwrap();
        let result = store.append_entries("ghost", &[entry("a", "b")]);
        assert!(matches!(result, Err(StoreError::FileNotFound(_))));
    }
}
