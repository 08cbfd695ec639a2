//! Deadline store: SQLite tables for clients and deadlines.
//!
//! One connection behind a mutex, WAL journal. Dates are stored as
//! `YYYY-MM-DD`, reminder times as `HH:MM`, timestamps as RFC 3339.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use visadesk_core::deadline::{Client, Deadline, DeadlineType, ReminderTime};
use visadesk_core::error::{Result, VisaDeskError};

const DEADLINE_COLUMNS: &str = "id, deadline_type, client_id, client_name, client_email, \
     client_phone, visa_type, source, due_date, reminder_time, branch_id, history, \
     created_at, updated_at";

/// Persistent storage for clients and their deadlines.
pub struct DeadlineDb {
    conn: Mutex<Connection>,
}

impl DeadlineDb {
    /// Open or create the database. `:memory:` gives a throwaway store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| VisaDeskError::Database(format!("Open {}: {e}", path.display())))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VisaDeskError::Database(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                branch_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deadlines (
                id TEXT PRIMARY KEY,
                deadline_type TEXT NOT NULL,
                client_id TEXT,
                client_name TEXT NOT NULL,
                client_email TEXT,
                client_phone TEXT,
                visa_type TEXT,
                source TEXT,
                due_date TEXT NOT NULL,          -- YYYY-MM-DD
                reminder_time TEXT,              -- HH:MM, NULL = no reminder
                branch_id TEXT,
                history INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deadlines_active ON deadlines(history, due_date);
        ",
        )
        .map_err(|e| VisaDeskError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    // ── Clients ─────────────────────────────────

    pub fn insert_client(&self, client: &Client) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (id, name, email, phone, branch_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                client.id,
                client.name,
                client.email,
                client.phone,
                client.branch_id,
                client.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| VisaDeskError::Database(format!("Insert client: {e}")))?;
        Ok(())
    }

    pub fn get_client(&self, id: &str) -> Result<Client> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, email, phone, branch_id, created_at FROM clients WHERE id=?1",
            params![id],
            row_to_client,
        )
        .optional()
        .map_err(|e| VisaDeskError::Database(format!("Get client: {e}")))?
        .ok_or_else(|| VisaDeskError::NotFound(format!("client {id}")))
    }

    pub fn list_clients(&self) -> Result<Vec<Client>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, email, phone, branch_id, created_at FROM clients ORDER BY name",
            )
            .map_err(|e| VisaDeskError::Database(format!("List clients: {e}")))?;
        let rows = stmt
            .query_map([], row_to_client)
            .map_err(|e| VisaDeskError::Database(format!("List clients: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| VisaDeskError::Database(format!("List clients: {e}")))
    }

    // ── Deadlines ───────────────────────────────

    pub fn insert_deadline(&self, d: &Deadline) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO deadlines ({DEADLINE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                d.id,
                d.deadline_type.as_str(),
                d.client_id,
                d.client_name,
                d.client_email,
                d.client_phone,
                d.visa_type,
                d.source,
                d.due_date.format("%Y-%m-%d").to_string(),
                d.reminder_time.map(|t| t.to_string()),
                d.branch_id,
                d.history,
                d.created_at.to_rfc3339(),
                d.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| VisaDeskError::Database(format!("Insert deadline: {e}")))?;
        Ok(())
    }

    pub fn get_deadline(&self, id: &str) -> Result<Deadline> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {DEADLINE_COLUMNS} FROM deadlines WHERE id=?1"),
            params![id],
            row_to_deadline,
        )
        .optional()
        .map_err(|e| VisaDeskError::Database(format!("Get deadline: {e}")))?
        .ok_or_else(|| VisaDeskError::NotFound(format!("deadline {id}")))
    }

    /// Overwrite the editable columns of an existing deadline. `history` is
    /// left alone; only `set_history` moves a deadline in or out of history.
    pub fn update_deadline(&self, d: &Deadline) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE deadlines SET deadline_type=?2, client_id=?3, client_name=?4,
                   client_email=?5, client_phone=?6, visa_type=?7, source=?8, due_date=?9,
                   reminder_time=?10, branch_id=?11, updated_at=?12
                 WHERE id=?1",
                params![
                    d.id,
                    d.deadline_type.as_str(),
                    d.client_id,
                    d.client_name,
                    d.client_email,
                    d.client_phone,
                    d.visa_type,
                    d.source,
                    d.due_date.format("%Y-%m-%d").to_string(),
                    d.reminder_time.map(|t| t.to_string()),
                    d.branch_id,
                    d.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| VisaDeskError::Database(format!("Update deadline: {e}")))?;
        if changed == 0 {
            return Err(VisaDeskError::NotFound(format!("deadline {}", d.id)));
        }
        Ok(())
    }

    /// All deadlines ordered by due date; archived ones only when asked.
    pub fn list_deadlines(&self, include_history: bool) -> Result<Vec<Deadline>> {
        let conn = self.conn()?;
        let sql = if include_history {
            format!("SELECT {DEADLINE_COLUMNS} FROM deadlines ORDER BY due_date, reminder_time")
        } else {
            format!(
                "SELECT {DEADLINE_COLUMNS} FROM deadlines WHERE history=0 ORDER BY due_date, reminder_time"
            )
        };
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| VisaDeskError::Database(format!("List deadlines: {e}")))?;
        let rows = stmt
            .query_map([], row_to_deadline)
            .map_err(|e| VisaDeskError::Database(format!("List deadlines: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| VisaDeskError::Database(format!("List deadlines: {e}")))
    }

    /// Non-archived deadlines. Used to rebuild reminders at startup.
    pub fn active_deadlines(&self) -> Result<Vec<Deadline>> {
        self.list_deadlines(false)
    }

    /// Move a deadline into (or out of) history and return the new row.
    pub fn set_history(&self, id: &str, history: bool) -> Result<Deadline> {
        {
            let conn = self.conn()?;
            let changed = conn
                .execute(
                    "UPDATE deadlines SET history=?2, updated_at=?3 WHERE id=?1",
                    params![id, history, Utc::now().to_rfc3339()],
                )
                .map_err(|e| VisaDeskError::Database(format!("Set history: {e}")))?;
            if changed == 0 {
                return Err(VisaDeskError::NotFound(format!("deadline {id}")));
            }
        }
        self.get_deadline(id)
    }

    pub fn delete_deadline(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM deadlines WHERE id=?1", params![id])
            .map_err(|e| VisaDeskError::Database(format!("Delete deadline: {e}")))?;
        if changed == 0 {
            return Err(VisaDeskError::NotFound(format!("deadline {id}")));
        }
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        branch_id: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

fn row_to_deadline(row: &Row<'_>) -> rusqlite::Result<Deadline> {
    let deadline_type: DeadlineType = row
        .get::<_, String>(1)?
        .parse()
        .map_err(|e| conversion_error(1, e))?;
    let due_date = NaiveDate::parse_from_str(&row.get::<_, String>(8)?, "%Y-%m-%d")
        .map_err(|e| conversion_error(8, e))?;
    let reminder_time = row
        .get::<_, Option<String>>(9)?
        .map(|raw| raw.parse::<ReminderTime>())
        .transpose()
        .map_err(|e| conversion_error(9, e))?;

    Ok(Deadline {
        id: row.get(0)?,
        deadline_type,
        client_id: row.get(2)?,
        client_name: row.get(3)?,
        client_email: row.get(4)?,
        client_phone: row.get(5)?,
        visa_type: row.get(6)?,
        source: row.get(7)?,
        due_date,
        reminder_time,
        branch_id: row.get(10)?,
        history: row.get(11)?,
        created_at: timestamp(row, 12)?,
        updated_at: timestamp(row, 13)?,
    })
}
