//! SQLite-backed store
//!
//! One connection behind a mutex; every transaction is `BEGIN IMMEDIATE`,
//! so at most one writer runs at a time and each transaction sees a
//! consistent snapshot.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use super::{schema, MatchStore, StoreTx};
use crate::error::{db_err, MatchError};
use crate::model::{
    Initiator, PriorityEntry, RequestQuery, RequestState, SupervisionRequest, SupervisorCapacity,
    Tag, TagId, TagSimilarity,
};

/// SQLite database for tags, profiles, capacities and requests
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database in `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, MatchError> {
        let db_path = storage_dir.join("match.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path).map_err(db_err("Failed to open SQLite"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err("Failed to set PRAGMA"))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, MatchError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(db_err("Failed to open in-memory SQLite"))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(db_err("Failed to set PRAGMA"))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MatchError> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MatchStore for SqliteStore {
    fn with_transaction<T, F>(&self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, MatchError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| MatchError::Internal(format!("Lock poisoned: {}", e)))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err("Failed to start transaction"))?;

        // Dropping `tx` on the error path rolls back
        let value = {
            let mut scope = SqliteTx { conn: &*tx };
            f(&mut scope)?
        };

        tx.commit().map_err(db_err("Failed to commit transaction"))?;
        Ok(value)
    }
}

struct SqliteTx<'t> {
    conn: &'t Connection,
}

const REQUEST_COLUMNS: &str =
    "id, student_id, supervisor_id, state, initiated_by, created_at, updated_at";

fn conversion_err(idx: usize, e: MatchError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn request_from_row(row: &Row) -> Result<SupervisionRequest, rusqlite::Error> {
    let state: String = row.get(3)?;
    let initiated_by: String = row.get(4)?;
    Ok(SupervisionRequest {
        id: row.get(0)?,
        student_id: row.get(1)?,
        supervisor_id: row.get(2)?,
        state: state.parse().map_err(|e| conversion_err(3, e))?,
        initiated_by: initiated_by.parse::<Initiator>().map_err(|e| conversion_err(4, e))?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn capacity_from_row(row: &Row) -> Result<SupervisorCapacity, rusqlite::Error> {
    Ok(SupervisorCapacity {
        supervisor_id: row.get(0)?,
        total_spots: row.get(1)?,
        available_spots: row.get(2)?,
    })
}

impl StoreTx for SqliteTx<'_> {
    fn list_tags(&mut self) -> Result<Vec<Tag>, MatchError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM tags ORDER BY id")
            .map_err(db_err("Failed to prepare statement"))?;
        let rows = stmt
            .query_map([], |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }))
            .map_err(db_err("Failed to query tags"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read row"))
    }

    fn upsert_tag(&mut self, name: &str) -> Result<Tag, MatchError> {
        self.conn
            .execute(
                "INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
                params![name],
            )
            .map_err(db_err("Failed to insert tag"))?;

        self.conn
            .query_row("SELECT id, name FROM tags WHERE name = ?", params![name], |row| {
                Ok(Tag { id: row.get(0)?, name: row.get(1)? })
            })
            .map_err(db_err("Failed to read tag"))
    }

    fn rename_tag(&mut self, id: TagId, name: &str) -> Result<bool, MatchError> {
        let rows = self
            .conn
            .execute("UPDATE tags SET name = ? WHERE id = ?", params![name, id])
            .map_err(db_err("Failed to rename tag"))?;
        Ok(rows > 0)
    }

    fn list_similarities(&mut self) -> Result<Vec<TagSimilarity>, MatchError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_a, tag_b, score FROM tag_similarities ORDER BY tag_a, tag_b")
            .map_err(db_err("Failed to prepare statement"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TagSimilarity {
                    tag_a: row.get(0)?,
                    tag_b: row.get(1)?,
                    score: row.get(2)?,
                })
            })
            .map_err(db_err("Failed to query similarities"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read row"))
    }

    fn replace_similarities(&mut self, similarities: &[TagSimilarity]) -> Result<(), MatchError> {
        let removed = self
            .conn
            .execute("DELETE FROM tag_similarities", [])
            .map_err(db_err("Failed to clear similarities"))?;

        let mut stmt = self
            .conn
            .prepare("INSERT INTO tag_similarities (tag_a, tag_b, score) VALUES (?, ?, ?)")
            .map_err(db_err("Failed to prepare statement"))?;
        for sim in similarities {
            stmt.execute(params![sim.tag_a, sim.tag_b, sim.score])
                .map_err(db_err("Failed to insert similarity"))?;
        }

        debug!(removed, inserted = similarities.len(), "Replaced tag similarities");
        Ok(())
    }

    fn priorities(&mut self, user_id: &str) -> Result<Vec<PriorityEntry>, MatchError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id, priority FROM priorities WHERE user_id = ? ORDER BY priority")
            .map_err(db_err("Failed to prepare statement"))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(PriorityEntry {
                    tag_id: row.get(0)?,
                    priority: row.get(1)?,
                })
            })
            .map_err(db_err("Failed to query priorities"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read row"))
    }

    fn replace_priorities(&mut self, user_id: &str, entries: &[PriorityEntry]) -> Result<(), MatchError> {
        self.conn
            .execute("DELETE FROM priorities WHERE user_id = ?", params![user_id])
            .map_err(db_err("Failed to clear priorities"))?;

        let mut stmt = self
            .conn
            .prepare("INSERT INTO priorities (user_id, tag_id, priority) VALUES (?, ?, ?)")
            .map_err(db_err("Failed to prepare statement"))?;
        for entry in entries {
            stmt.execute(params![user_id, entry.tag_id, entry.priority])
                .map_err(db_err("Failed to insert priority"))?;
        }
        Ok(())
    }

    fn capacity(&mut self, supervisor_id: &str) -> Result<Option<SupervisorCapacity>, MatchError> {
        self.conn
            .query_row(
                "SELECT supervisor_id, total_spots, available_spots
                 FROM supervisor_capacity WHERE supervisor_id = ?",
                params![supervisor_id],
                capacity_from_row,
            )
            .optional()
            .map_err(db_err("Failed to get capacity"))
    }

    fn list_capacities(&mut self) -> Result<Vec<SupervisorCapacity>, MatchError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT supervisor_id, total_spots, available_spots
                 FROM supervisor_capacity ORDER BY supervisor_id",
            )
            .map_err(db_err("Failed to prepare statement"))?;
        let rows = stmt
            .query_map([], capacity_from_row)
            .map_err(db_err("Failed to query capacities"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read row"))
    }

    fn put_capacity(&mut self, capacity: &SupervisorCapacity) -> Result<(), MatchError> {
        self.conn
            .execute(
                "INSERT INTO supervisor_capacity (supervisor_id, total_spots, available_spots)
                 VALUES (?, ?, ?)
                 ON CONFLICT(supervisor_id) DO UPDATE SET
                 total_spots = excluded.total_spots,
                 available_spots = excluded.available_spots",
                params![capacity.supervisor_id, capacity.total_spots, capacity.available_spots],
            )
            .map_err(db_err("Failed to store capacity"))?;
        Ok(())
    }

    fn take_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError> {
        let rows = self
            .conn
            .execute(
                "UPDATE supervisor_capacity SET available_spots = available_spots - 1
                 WHERE supervisor_id = ? AND available_spots > 0",
                params![supervisor_id],
            )
            .map_err(db_err("Failed to take spot"))?;
        Ok(rows == 1)
    }

    fn return_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError> {
        let rows = self
            .conn
            .execute(
                "UPDATE supervisor_capacity SET available_spots = available_spots + 1
                 WHERE supervisor_id = ? AND available_spots < total_spots",
                params![supervisor_id],
            )
            .map_err(db_err("Failed to return spot"))?;
        Ok(rows == 1)
    }

    fn get_request(&mut self, id: &str) -> Result<Option<SupervisionRequest>, MatchError> {
        let sql = format!("SELECT {} FROM supervision_requests WHERE id = ?", REQUEST_COLUMNS);
        self.conn
            .query_row(&sql, params![id], request_from_row)
            .optional()
            .map_err(db_err("Failed to get request"))
    }

    fn find_pending(
        &mut self,
        student_id: &str,
        supervisor_id: &str,
    ) -> Result<Option<SupervisionRequest>, MatchError> {
        let sql = format!(
            "SELECT {} FROM supervision_requests
             WHERE student_id = ? AND supervisor_id = ? AND state = ?",
            REQUEST_COLUMNS
        );
        self.conn
            .query_row(
                &sql,
                params![student_id, supervisor_id, RequestState::Pending.as_str()],
                request_from_row,
            )
            .optional()
            .map_err(db_err("Failed to find pending request"))
    }

    fn insert_request(&mut self, request: &SupervisionRequest) -> Result<(), MatchError> {
        self.conn
            .execute(
                "INSERT INTO supervision_requests
                 (id, student_id, supervisor_id, state, initiated_by, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    request.id,
                    request.student_id,
                    request.supervisor_id,
                    request.state.as_str(),
                    request.initiated_by.as_str(),
                    request.created_at,
                    request.updated_at,
                ],
            )
            .map_err(db_err("Failed to insert request"))?;
        Ok(())
    }

    fn update_request_state(
        &mut self,
        id: &str,
        from: RequestState,
        to: RequestState,
        updated_at: &str,
    ) -> Result<bool, MatchError> {
        let rows = self
            .conn
            .execute(
                "UPDATE supervision_requests SET state = ?, updated_at = ?
                 WHERE id = ? AND state = ?",
                params![to.as_str(), updated_at, id, from.as_str()],
            )
            .map_err(db_err("Failed to update request"))?;
        Ok(rows == 1)
    }

    fn list_requests(&mut self, query: &RequestQuery) -> Result<Vec<SupervisionRequest>, MatchError> {
        let mut sql = format!("SELECT {} FROM supervision_requests WHERE 1=1", REQUEST_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(student_id) = &query.student_id {
            sql.push_str(" AND student_id = ?");
            params_vec.push(Box::new(student_id.clone()));
        }
        if let Some(supervisor_id) = &query.supervisor_id {
            sql.push_str(" AND supervisor_id = ?");
            params_vec.push(Box::new(supervisor_id.clone()));
        }
        if let Some(state) = query.state {
            sql.push_str(" AND state = ?");
            params_vec.push(Box::new(state.as_str()));
        }
        sql.push_str(" ORDER BY created_at, id");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(db_err("Failed to prepare statement"))?;
        let rows = stmt
            .query_map(params_refs.as_slice(), request_from_row)
            .map_err(db_err("Failed to query requests"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("Failed to read row"))
    }
}
