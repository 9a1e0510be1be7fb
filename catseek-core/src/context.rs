//! Chat transcript storage using SQLite.
//!
//! Every turn of the current session is recorded together with the mode that
//! picked the reply. Starting a new chat clears the table.

use rusqlite::{params, Connection, Row};
use std::path::Path;

use crate::error::Result;
use crate::model::{Generation, Mode};

/// A recorded chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub id: i64,
    pub timestamp: String,
    pub user_message: String,
    pub response: String,
    pub mode: Mode,
    pub token_count: i64,
}

impl ChatTurn {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mode: u8 = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            user_message: row.get(2)?,
            response: row.get(3)?,
            mode: if mode == 0 { Mode::Analytical } else { Mode::Action },
            token_count: row.get(5)?,
        })
    }
}

/// SQLite-backed transcript of the current chat.
pub struct ContextStore {
    conn: Connection,
}

impl ContextStore {
    /// Open (or create) a transcript database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::init(Connection::open(db_path)?)
    }

    /// Transcript that lives only as long as the store.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                user_message TEXT NOT NULL,
                response TEXT NOT NULL,
                mode INTEGER NOT NULL,
                token_count INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Store one turn and return its row id.
    pub fn record_turn(&self, user_message: &str, generation: &Generation) -> Result<i64> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let token_count = user_message.split_whitespace().count() as i64;

        self.conn.execute(
            "INSERT INTO turns (timestamp, user_message, response, mode, token_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                timestamp,
                user_message,
                generation.response,
                generation.mode.bit(),
                token_count
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// The last `limit` turns, oldest first.
    pub fn recent_turns(&self, limit: usize) -> Result<Vec<ChatTurn>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, user_message, response, mode, token_count
             FROM turns
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let mut turns = stmt
            .query_map([limit as i64], ChatTurn::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Turns whose message or reply contains `query`, newest first.
    pub fn search_turns(&self, query: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, user_message, response, mode, token_count
             FROM turns
             WHERE user_message LIKE ?1 OR response LIKE ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let pattern = format!("%{}%", query);
        let turns = stmt
            .query_map(params![pattern, limit as i64], ChatTurn::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(turns)
    }

    pub fn turn_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Drop every recorded turn.
    pub fn clear_history(&self) -> Result<()> {
        self.conn.execute("DELETE FROM turns", [])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<ContextStats> {
        let (total_turns, total_tokens) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(token_count), 0) FROM turns",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = match self.conn.path() {
            Some(path) if !path.is_empty() => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            _ => 0,
        };

        Ok(ContextStats { total_turns, total_tokens, db_size_bytes })
    }
}

/// Totals over the stored transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStats {
    pub total_turns: i64,
    pub total_tokens: i64,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Engine;

    fn turn(engine: &mut Engine, store: &ContextStore, text: &str) {
        let generation = engine.generate(text);
        store.record_turn(text, &generation).unwrap();
    }

    #[test]
    fn test_store_starts_empty() {
        let store = ContextStore::in_memory().unwrap();
        assert_eq!(store.turn_count().unwrap(), 0);
        assert_eq!(store.stats().unwrap().total_tokens, 0);
    }

    #[test]
    fn test_turns_come_back_in_order() {
        let store = ContextStore::in_memory().unwrap();
        let mut engine = Engine::new();
        turn(&mut engine, &store, "first message");
        turn(&mut engine, &store, "second");
        turn(&mut engine, &store, "third one here");

        let all = store.recent_turns(10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].user_message, "first message");
        assert_eq!(all[0].mode, Mode::Analytical);
        assert_eq!(all[1].mode, Mode::Action);
        assert_eq!(all[2].token_count, 3);

        let recent = store.recent_turns(2).unwrap();
        assert_eq!(recent[0].user_message, "second");
        assert_eq!(recent[1].user_message, "third one here");

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_turns, 3);
        assert_eq!(stats.total_tokens, 6);
    }

    #[test]
    fn test_search_and_clear() {
        let store = ContextStore::in_memory().unwrap();
        let mut engine = Engine::new();
        turn(&mut engine, &store, "ship the export");
        turn(&mut engine, &store, "hello");

        let hits = store.search_turns("export", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_message, "ship the export");

        store.clear_history().unwrap();
        assert_eq!(store.turn_count().unwrap(), 0);
    }
}
