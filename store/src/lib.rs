//! The spatial record store: a SQLite database holding zones, parcels, the synthetic population,
//! the road network, census demographics, and recorded metrics. Geometry is kept as WKT text in
//! EPSG:4326.

#[macro_use]
extern crate log;

use std::path::Path;

use rusqlite::Connection;

pub use crate::error::{Error, Result};
pub use crate::loader::{Loader, Record};
pub use crate::metrics::{
    export, list, record, select, ExportHook, HookRegistry, Metric, MetricSpec,
};
pub use crate::queries::{
    Destination, HouseholdMembers, HouseholdSize, IncomeBracket, LinkGeometry, OdTrip, PlanLeg,
    ResidentialCandidate,
};

mod error;
mod loader;
mod metrics;
mod queries;
pub mod schema;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) a database file. `:memory:` opens a throwaway database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Store> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Store::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }
        debug!("Opening {}", path.display());
        Store::configure(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Store> {
        Store::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Store> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Store { conn })
    }

    /// Creates every table that doesn't exist yet. This never alters existing tables.
    pub fn create_schema(&self) -> Result<()> {
        let mut sql = String::from("BEGIN;\n");
        for table in schema::ALL_TABLES {
            sql.push_str(&table.create_sql());
        }
        sql.push_str(schema::LINK_GEOMETRIES_VIEW);
        sql.push_str("COMMIT;");
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self, table: &schema::Table) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// The smallest integer id larger than everything in the table.
    pub fn next_id(&self, table: &schema::Table) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            &format!("SELECT MAX(id) FROM {}", table.name),
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// Runs `f` inside a savepoint. If `f` fails, nothing it wrote is kept, including batches
    /// that loaders flushed along the way. Calls may nest.
    pub fn atomically<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.conn
            .execute_batch("SAVEPOINT atomically")
            .map_err(Error::from)?;
        match f() {
            Ok(x) => {
                self.conn
                    .execute_batch("RELEASE atomically")
                    .map_err(Error::from)?;
                Ok(x)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO atomically; RELEASE atomically")
                {
                    error!("Couldn't roll back: {}", rollback);
                }
                Err(err)
            }
        }
    }
}
