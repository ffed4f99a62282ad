//! Database layer for vmrig.
//!
//! SQLite persistence for VM definitions. Rows are read into tagged
//! records (`VmRecord`, `DriveRecord`, ...) by [`VmStore`]; nothing
//! outside this module sees column positions.

mod schema;
mod vms;

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use vmrig_shared::errors::{VmrigError, VmrigResult};

pub use vms::VmStore;

/// Convert rusqlite errors to `VmrigError::Database`.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| VmrigError::Database(e.to_string()))
    };
}

pub(crate) use db_err;

/// Shared SQLite handle.
///
/// Statements run one at a time behind the mutex; multi-statement updates
/// go through [`Database::transaction`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database, creating tables on first use.
    pub fn open(db_path: &Path) -> VmrigResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;

        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=10000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Run `f` inside a single transaction, committing on `Ok`.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> VmrigResult<T>,
    ) -> VmrigResult<T> {
        let mut conn = self.conn();
        let tx = db_err!(conn.transaction())?;
        let value = f(&tx)?;
        db_err!(tx.commit())?;
        Ok(value)
    }

    fn init_schema(conn: &Connection) -> VmrigResult<()> {
        let current_version: i32 =
            db_err!(conn.query_row("PRAGMA user_version", [], |row| row.get(0)))?;

        match current_version {
            0 => {
                db_err!(conn.execute_batch(schema::CREATE_TABLES))?;
                db_err!(conn.execute(
                    "INSERT INTO lastval (id, mac, vnc) VALUES (1, ?1, 0)",
                    rusqlite::params![schema::initial_mac_counter()],
                ))?;
                db_err!(conn.execute_batch(&format!(
                    "PRAGMA user_version={}",
                    schema::SCHEMA_VERSION
                )))?;
                tracing::info!("Initialized database schema version {}", schema::SCHEMA_VERSION);
            }
            v if v > schema::SCHEMA_VERSION => {
                return Err(VmrigError::Database(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            v if v < schema::SCHEMA_VERSION => {
                tracing::warn!(
                    "Database schema version {} is older than current {}",
                    v,
                    schema::SCHEMA_VERSION
                );
            }
            _ => {}
        }

        Ok(())
    }
}
