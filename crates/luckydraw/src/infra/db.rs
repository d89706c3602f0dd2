use log::debug;
use serde::{Deserialize, Serialize};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration as StdDuration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::{DBSettings, SqliteSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqliteMode {
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqliteCache {
    Shared,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    fn pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
}

impl SynchronousMode {
    fn pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    fn pragma(&self) -> &'static str {
        match self {
            TempStore::Default => "default",
            TempStore::File => "file",
            TempStore::Memory => "memory",
        }
    }
}

impl SqliteSettings {
    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new();

        let options = match self.mode {
            SqliteMode::Memory => {
                // Read and write pools must land on the same in-memory database, so the
                // uri is derived from the path instead of using a bare ":memory:"
                let mut hasher = DefaultHasher::new();
                database_path.hash(&mut hasher);
                let memory_uri = format!(
                    "file:memdb_{}?mode=memory&cache=shared",
                    hasher.finish()
                );
                options.filename(&memory_uri).shared_cache(true)
            }
            SqliteMode::ReadOnly => {
                return options
                    .filename(database_path)
                    .read_only(true)
                    .shared_cache(self.cache == SqliteCache::Shared)
                    .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));
            }
            SqliteMode::ReadWrite => options
                .filename(database_path)
                .read_only(false)
                .shared_cache(self.cache == SqliteCache::Shared),
            SqliteMode::ReadWriteCreate => options
                .filename(database_path)
                .read_only(false)
                .create_if_missing(true)
                .shared_cache(self.cache == SqliteCache::Shared),
        };

        let mut options = options
            .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64))
            .pragma("journal_mode", self.journal_mode.pragma())
            .pragma("synchronous", self.synchronous.pragma())
            .pragma("cache_size", self.cache_size.to_string())
            .pragma("temp_store", self.temp_store.pragma());

        if let Some(checkpoint) = self.wal_autocheckpoint {
            options = options.pragma("wal_autocheckpoint", checkpoint.to_string());
        }

        options
    }
}

static COMPETITIONS_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/competitions");

/// A sqlite database with a read pool and a separate, smaller write pool
#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl DBConnection {
    pub async fn new(db_settings: &DBSettings, db_name: &str) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", db_settings.data_folder, db_name);

        if db_settings.sqlite.mode != SqliteMode::Memory {
            let database_url = format!("sqlite:{}", database_path);
            if !Sqlite::database_exists(&database_url).await? {
                Sqlite::create_database(&database_url).await?;
            }
        }

        let (read_pool, write_pool) = Self::create_pools(&database_path, db_settings).await?;

        COMPETITIONS_MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_path,
            read_pool,
            write_pool,
        })
    }

    /// Wraps a single pool used for both reads and writes, as handed out by `sqlx::test`
    #[cfg(test)]
    pub fn new_with_pool(pool: SqlitePool) -> Self {
        Self {
            database_path: String::from(":memory:"),
            read_pool: pool.clone(),
            write_pool: pool,
        }
    }

    async fn create_pools(
        database_path: &str,
        db_settings: &DBSettings,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let sqlite = &db_settings.sqlite;
        let write_config = match sqlite.mode {
            SqliteMode::Memory => sqlite.clone(),
            _ => SqliteSettings {
                mode: SqliteMode::ReadWrite,
                ..sqlite.clone()
            },
        };
        let read_config = match sqlite.mode {
            SqliteMode::Memory => SqliteSettings {
                synchronous: SynchronousMode::Off,
                ..sqlite.clone()
            },
            _ => SqliteSettings {
                mode: SqliteMode::ReadOnly,
                ..sqlite.clone()
            },
        };

        let write_connection = write_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);
        let write_pool = SqlitePoolOptions::new()
            .max_connections(db_settings.write_max_connections)
            .min_connections(db_settings.write_min_connections)
            .acquire_timeout(StdDuration::from_secs(db_settings.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(db_settings.idle_timeout_secs))
            .connect_with(write_connection)
            .await?;

        let read_connection = read_config.build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);
        let read_pool = SqlitePoolOptions::new()
            .max_connections(db_settings.read_max_connections)
            .min_connections(db_settings.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(db_settings.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(db_settings.idle_timeout_secs))
            .connect_with(read_connection)
            .await?;

        Ok((read_pool, write_pool))
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;
        Ok(())
    }

    /// Waits for checked out connections to come back, then closes both pools
    pub async fn close(&self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    pub fn write(&self) -> &SqlitePool {
        &self.write_pool
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including their extended codes
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Errors worth retrying with a fresh read: lock contention and pool exhaustion
pub fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_error) => db_error
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

pub fn format_datetime(value: &OffsetDateTime) -> Result<String, sqlx::Error> {
    value
        .format(&Rfc3339)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

pub fn to_blob_json<T: Serialize>(value: &T) -> Result<Vec<u8>, sqlx::Error> {
    serde_json::to_vec(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn parse_required_blob_json<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: serde::de::DeserializeOwned,
{
    let bytes: Vec<u8> = row.try_get(column)?;
    serde_json::from_slice(&bytes).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations/competitions")]
    async fn test_datetime_columns_round_trip(pool: SqlitePool) {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query("SELECT ? AS created_at, NULL AS drawn_at")
            .bind(format_datetime(&now).unwrap())
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(parse_required_datetime(&row, "created_at").unwrap(), now);
        assert_eq!(parse_optional_datetime(&row, "drawn_at").unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations/competitions")]
    async fn test_ping(pool: SqlitePool) {
        let db = DBConnection::new_with_pool(pool);
        db.ping().await.unwrap();
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_memory_databases_share_one_uri_per_path() {
        let settings = SqliteSettings::in_memory();
        let first = format!("{:?}", settings.build_connect_options("./data/a.db"));
        let second = format!("{:?}", settings.build_connect_options("./data/a.db"));
        let other = format!("{:?}", settings.build_connect_options("./data/b.db"));

        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
