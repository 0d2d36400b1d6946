pub mod models;
pub mod schema;
pub mod utils;

use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database initialization error: {0}")]
    Init(String),
    #[error("database migration error: {0}")]
    Migration(String),
    #[error("connection pool error: {0}")]
    Pool(#[from] ::r2d2::Error),
    #[error("diesel error: {0}")]
    Diesel(#[from] diesel::result::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Open (creating if absent) the sqlite database at `db_path`, running all
/// pending migrations idempotently.
pub fn init(db_path: &Path) -> Result<DbPool, DbError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DbError::Init(format!("failed to create data directory: {e}")))?;
    }

    let db_url = db_path.to_string_lossy().to_string();
    tracing::info!(path = %db_url, "opening kernel database");

    let manager = ConnectionManager::<SqliteConnection>::new(&db_url);
    let pool = r2d2::Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(DbError::Pool)?;

    {
        let mut conn = pool.get().map_err(DbError::Pool)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::Migration(e.to_string()))?;
    }

    Ok(pool)
}

/// In-memory pool for tests: each connection in the pool shares the same
/// named in-memory database via a shared-cache URI.
#[cfg(test)]
pub fn init_test_pool() -> DbPool {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let url = format!("file:kernel_test_{id}?mode=memory&cache=shared");

    let manager = ConnectionManager::<SqliteConnection>::new(&url);
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("build test pool");
    let mut conn = pool.get().expect("get test conn");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("run test migrations");
    pool
}
