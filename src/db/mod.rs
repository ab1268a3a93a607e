//! Persistence gateway.
//!
//! Wraps an sqlx SQLite connection pool and owns schema lifecycle: on
//! startup the gateway creates the tables and seed data when the database
//! file is empty, and otherwise applies any pending numbered upgrade
//! scripts, tracking the logical schema version in the `version` table.
//!
//! Domain modules issue their statements directly against the pool with
//! sqlx; multi-statement operations go through [`Database::begin`] so they
//! commit or roll back atomically.

pub mod error;
pub mod schema;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use tracing::{debug, info, instrument};

use crate::stats;

pub use error::{DbError, DbResult};

/// Shared handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the database file and build the connection pool.
    #[instrument(skip_all)]
    pub async fn connect(db_path: impl AsRef<Path>) -> DbResult<Self> {
        let db_path = db_path.as_ref();
        info!("opening database at {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        stats::set("sql", "transactions", 0);

        Ok(Self { pool })
    }

    /// Create the schema if this is a fresh database, otherwise apply any
    /// pending upgrade scripts in ascending version order.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> DbResult<()> {
        if self.table_exists("version").await? {
            self.upgrade().await
        } else {
            self.create_schema().await
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Begin a transaction. Commit on success, roll back by dropping.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        stats::inc("sql", "transactions");
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run a single-column count query with one integer bind. Used for
    /// object existence checks.
    pub async fn count(&self, sql: &str, id: i64) -> DbResult<i64> {
        sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::query(sql, e))
    }

    async fn table_exists(&self, name: &str) -> DbResult<bool> {
        let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?";
        let count: i64 = sqlx::query_scalar(sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        Ok(count > 0)
    }

    async fn create_schema(&self) -> DbResult<()> {
        info!("initializing empty database");
        let mut tx = self.begin().await?;
        let statements = schema::SQL_TABLES
            .iter()
            .chain(schema::SQL_SEED_DEFS)
            .chain(schema::SQL_SEED_MONITORS);
        for sql in statements {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::query(sql, e))?;
        }
        let sql = "INSERT INTO version (version) VALUES (?)";
        sqlx::query(sql)
            .bind(schema::CUR_VERSION.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        tx.commit()
            .await
            .map_err(|e| DbError::SchemaFailed(e.to_string()))?;
        info!("database initialized at schema version {}", schema::CUR_VERSION);
        Ok(())
    }

    async fn upgrade(&self) -> DbResult<()> {
        let sql = "SELECT version FROM version";
        let stored: String = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        let stored: i64 = stored
            .parse()
            .map_err(|_| DbError::SchemaFailed(format!("unparseable schema version: {stored}")))?;

        if stored > schema::CUR_VERSION {
            return Err(DbError::SchemaFailed(format!(
                "database schema version {} is newer than supported version {}",
                stored,
                schema::CUR_VERSION
            )));
        }
        if stored == schema::CUR_VERSION {
            debug!("database schema is current (version {})", stored);
            return Ok(());
        }

        info!(
            "upgrading database schema from version {} to {}",
            stored,
            schema::CUR_VERSION
        );
        let mut tx = self.begin().await?;
        for (version, statements) in schema::SQL_UPGRADES {
            if *version <= stored {
                continue;
            }
            debug!("applying schema upgrade for version {}", version);
            for sql in *statements {
                sqlx::query(sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
            }
        }
        let sql = "DELETE FROM version";
        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        let sql = "INSERT INTO version (version) VALUES (?)";
        sqlx::query(sql)
            .bind(schema::CUR_VERSION.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        tx.commit()
            .await
            .map_err(|e| DbError::SchemaFailed(e.to_string()))?;
        Ok(())
    }
}
