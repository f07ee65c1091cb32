// SQLite player cache.
//
// Stores player metadata (id, name, position) between sessions so the
// resolver cache can be warmed at startup and misses can be reconciled
// without a network round trip. Draft progress is never written here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::draft::pick::Position;
use crate::players::PlayerRecord;
use crate::reconcile::PlayerDirectory;

/// SQLite-backed player cache.
pub struct PlayerCacheDb {
    conn: Arc<Mutex<Connection>>,
}

impl PlayerCacheDb {
    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open player cache at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                player_id  TEXT PRIMARY KEY,
                full_name  TEXT NOT NULL,
                position   TEXT NOT NULL,
                team       TEXT,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_players_position ON players(position);
            ",
        )
        .context("failed to create player cache schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Insert or update a single player.
    pub fn upsert_player(&self, record: &PlayerRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (player_id, full_name, position, team)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(player_id) DO UPDATE SET
                full_name  = excluded.full_name,
                position   = excluded.position,
                team       = excluded.team,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                record.player_id,
                record.name,
                record.position.display_str(),
                record.team,
            ],
        )
        .with_context(|| format!("failed to upsert player {}", record.player_id))?;
        Ok(())
    }

    /// Upsert many players in one transaction. Returns the number written.
    pub fn import_players(&self, records: &[PlayerRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO players (player_id, full_name, position, team)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(player_id) DO UPDATE SET
                        full_name  = excluded.full_name,
                        position   = excluded.position,
                        team       = excluded.team,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                )
                .context("failed to prepare player import")?;
            for record in records {
                stmt.execute(params![
                    record.player_id,
                    record.name,
                    record.position.display_str(),
                    record.team,
                ])
                .with_context(|| format!("failed to import player {}", record.player_id))?;
            }
        }
        tx.commit().context("failed to commit player import")?;
        Ok(records.len())
    }

    /// The cached position for one player, if known.
    pub fn position_of(&self, player_id: &str) -> Result<Option<Position>> {
        query_position(&self.conn(), player_id)
    }

    /// Every cached position, for warming the resolver cache.
    pub fn load_positions(&self) -> Result<HashMap<String, Position>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT player_id, position FROM players")
            .context("failed to prepare load_positions query")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let code: String = row.get(1)?;
                Ok((id, Position::from_str_or_bench(&code)))
            })
            .context("failed to query positions")?;

        let mut positions = HashMap::new();
        for row in rows {
            let (id, pos) = row.context("failed to read position row")?;
            positions.insert(id, pos);
        }
        Ok(positions)
    }

    pub fn player_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .context("failed to count players")?;
        Ok(count as usize)
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().expect("player cache mutex poisoned")
}

fn query_position(conn: &Connection, player_id: &str) -> Result<Option<Position>> {
    let code: Option<String> = conn
        .query_row(
            "SELECT position FROM players WHERE player_id = ?1",
            params![player_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query player position")?;
    Ok(code.map(|c| Position::from_str_or_bench(&c)))
}

#[async_trait]
impl PlayerDirectory for PlayerCacheDb {
    /// Runs the whole batch on the blocking thread pool.
    async fn lookup_positions(&self, player_ids: &[String]) -> Result<HashMap<String, Position>> {
        let conn = Arc::clone(&self.conn);
        let ids = player_ids.to_vec();
        tokio::task::spawn_blocking(move || -> Result<HashMap<String, Position>> {
            let conn = lock(&conn);
            let mut found = HashMap::new();
            for id in ids {
                if let Some(pos) = query_position(&conn, &id)? {
                    found.insert(id, pos);
                }
            }
            Ok(found)
        })
        .await
        .context("player cache lookup task failed")?
    }
}
