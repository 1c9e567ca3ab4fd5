//! Database initialization, migrations and query helpers

pub mod init;
pub mod migrations;
pub mod query;
pub mod settings;

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::Result;

pub use init::{init_database, init_memory_database};
pub use migrations::run_migrations;
pub use settings::{get_setting, list_settings, set_setting, update_setting};

/// Open a write transaction with `BEGIN IMMEDIATE`
///
/// Every transaction that reads and then writes must start here; a deferred
/// `BEGIN` fails with `SQLITE_BUSY_SNAPSHOT` under concurrent writers.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}
