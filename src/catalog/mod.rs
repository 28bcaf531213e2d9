//! Pool catalog: the persistent record of every pool discovered in the registry, plus the
//! cursor the scanner resumes from.
//!
//! Backed by SQLite through a small r2d2 pool. Connections are checked out per call and
//! returned on every exit path when the guard drops.

use std::time::Duration;

use alloy::primitives::Address;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool as ConnectionPool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use log::{debug, info};

use crate::errors::{Error, Result};
use crate::models::{DbAddress, Pool, PoolRecord};
use crate::schemas::{pools, scan_cursor};

type SqlitePool = ConnectionPool<ConnectionManager<SqliteConnection>>;
type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const INIT_PRAGMAS: &str = concat!(
    // wait for the writer lock instead of failing with SQLITE_BUSY; set first so the
    // pragmas below wait too
    "PRAGMA busy_timeout = 5000;",
    // readers never block the scanner's writer and see only committed batches
    "PRAGMA journal_mode = WAL;",
    // fsync only in critical moments
    "PRAGMA synchronous = NORMAL;",
);

const INIT_MIGRATIONS: &str = concat!(
    // Idempotent up migrations
    include_str!("migrations/up-1-pools.sql"),
    include_str!("migrations/up-2-scan-cursor.sql"),
);

const CURSOR_ROW: i32 = 0;

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(INIT_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Handle to the pool catalog. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct PoolCatalog {
    pool: SqlitePool,
}

impl PoolCatalog {
    /// Opens (creating if needed) the catalog database at `database_url`.
    ///
    /// # Arguments
    /// * `database_url` - Path of the SQLite file
    /// * `pool_size` - Maximum number of open connections
    ///
    /// # Errors
    /// * If the database file cannot be opened
    pub fn open(database_url: &str, pool_size: u32) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = ConnectionPool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        debug!("catalog::open: Opened {database_url} with {pool_size} connections");
        Ok(Self { pool })
    }

    /// Releases every pooled connection.
    pub fn close(self) {
        debug!(
            "catalog::close: Closing with {} idle connections",
            self.pool.state().idle_connections
        );
        drop(self.pool);
    }

    fn conn(&self) -> Result<SqlitePooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Creates the schema if absent. Safe to call on every start.
    ///
    /// # Errors
    /// * If a migration statement fails
    pub fn initialize(&self) -> Result<()> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| conn.batch_execute(INIT_MIGRATIONS))
            .map_err(|e| Error::Migration(e.to_string()))?;
        info!("catalog::initialize: Schema ready");
        Ok(())
    }

    /// Number of pools stored
    ///
    /// # Errors
    /// * If the query fails
    pub fn count(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        let count: i64 = pools::table.count().get_result(&mut conn)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Number of registry indices fully recorded; the scanner resumes here.
    ///
    /// # Errors
    /// * If the query fails
    pub fn cursor(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        read_cursor(&mut conn)
    }

    /// Stores a pool. Re-inserting a known address is a no-op.
    ///
    /// # Returns
    /// `true` if the pool was not stored before
    ///
    /// # Errors
    /// * If the insert fails
    pub fn insert(&self, pool: &Pool) -> Result<bool> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_or_ignore_into(pools::table)
            .values(&PoolRecord::from(pool))
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    /// Stores a contiguous run of registry entries and advances the cursor past them, atomically.
    ///
    /// `expected_cursor` is the cursor value the batch starts at. The cursor becomes
    /// `expected_cursor + batch.len()` in the same transaction that stores the pools, so it
    /// never runs ahead of durable records.
    ///
    /// # Returns
    /// How many pools were newly stored (duplicates are skipped)
    ///
    /// # Errors
    /// * `Error::CursorConflict` if the stored cursor is not `expected_cursor`
    /// * If any statement fails; nothing from the batch is kept
    pub fn commit_batch(&self, expected_cursor: u64, batch: &[Pool]) -> Result<usize> {
        let start = to_db_index(expected_cursor)?;
        let end = to_db_index(expected_cursor + batch.len() as u64)?;

        let mut conn = self.conn()?;
        conn.immediate_transaction::<_, Error, _>(|conn| {
            let stored = read_cursor(conn)?;
            if stored != expected_cursor {
                return Err(Error::CursorConflict {
                    expected: expected_cursor,
                    stored,
                });
            }

            let mut inserted = 0;
            for pool in batch {
                inserted += diesel::insert_or_ignore_into(pools::table)
                    .values(&PoolRecord::from(pool))
                    .execute(conn)?;
            }

            diesel::replace_into(scan_cursor::table)
                .values((
                    scan_cursor::id.eq(CURSOR_ROW),
                    scan_cursor::next_index.eq(end),
                ))
                .execute(conn)?;

            debug!(
                "catalog::commit_batch: Cursor {start} -> {end}, {inserted} new pools"
            );
            Ok(inserted)
        })
    }

    /// Looks up one pool by address
    ///
    /// # Errors
    /// * If the query fails
    pub fn get(&self, address: Address) -> Result<Option<Pool>> {
        let mut conn = self.conn()?;
        let record = pools::table
            .find(DbAddress::from(address))
            .select(PoolRecord::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record.map(Pool::from))
    }

    /// Every stored pool whose token pair is `{a, b}`, in either order, sorted by address.
    ///
    /// An unknown pair yields an empty vector.
    ///
    /// # Errors
    /// * If the query fails
    pub fn find_by_token_pair(&self, a: Address, b: Address) -> Result<Vec<Pool>> {
        let (a, b) = (DbAddress::from(a), DbAddress::from(b));
        let mut conn = self.conn()?;

        let records: Vec<PoolRecord> = pools::table
            .filter(
                pools::token0
                    .eq(a)
                    .and(pools::token1.eq(b))
                    .or(pools::token0.eq(b).and(pools::token1.eq(a))),
            )
            .order(pools::address.asc())
            .select(PoolRecord::as_select())
            .load(&mut conn)?;

        Ok(records.into_iter().map(Pool::from).collect())
    }

    /// Every stored pool that has `token` on either side, sorted by address.
    ///
    /// # Errors
    /// * If the query fails
    pub fn pools_with_token(&self, token: Address) -> Result<Vec<Pool>> {
        let token = DbAddress::from(token);
        let mut conn = self.conn()?;

        let records: Vec<PoolRecord> = pools::table
            .filter(pools::token0.eq(token).or(pools::token1.eq(token)))
            .order(pools::address.asc())
            .select(PoolRecord::as_select())
            .load(&mut conn)?;

        Ok(records.into_iter().map(Pool::from).collect())
    }

    /// Runs `query` against a clone of this catalog on tokio's blocking pool.
    ///
    /// Catalog calls block on SQLite, for up to `busy_timeout` while another writer holds the
    /// lock. Async callers go through here so a lock wait parks a blocking thread, not a runtime
    /// worker, and their own deadlines and cancellation keep firing.
    ///
    /// # Errors
    /// * Whatever `query` returns
    /// * `Error::Task` if `query` panics
    pub async fn blocking<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let catalog = self.clone();
        tokio::task::spawn_blocking(move || query(&catalog)).await?
    }
}

fn read_cursor(conn: &mut SqliteConnection) -> Result<u64> {
    let next_index: Option<i64> = scan_cursor::table
        .find(CURSOR_ROW)
        .select(scan_cursor::next_index)
        .first(conn)
        .optional()?;
    Ok(next_index.and_then(|n| u64::try_from(n).ok()).unwrap_or(0))
}

fn to_db_index(index: u64) -> Result<i64> {
    i64::try_from(index)
        .map_err(|_| Error::validation("registry index", format!("{index} exceeds i64")))
}
