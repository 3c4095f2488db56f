//! Local SQLite store for the register.
//!
//! Caches the catalog for offline use, keeps terminal settings and holds the
//! queue of mutations made while the backend was unreachable. Uses rusqlite
//! with WAL mode and versioned migrations. The connection is opened lazily on
//! first use and [`OfflineStore::open`] is idempotent.

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{PosError, PosResult};
use crate::models::{Category, NewSyncEntry, Product, SyncAction, SyncQueueEntry};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

const DB_FILE_NAME: &str = "afripos.db";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

pub struct OfflineStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for OfflineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineStore")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl OfflineStore {
    /// Store backed by `{data_dir}/afripos.db`. Nothing touches the disk
    /// until the first operation or an explicit [`open`](Self::open).
    pub fn new(data_dir: &Path) -> Self {
        Self {
            location: Location::File(data_dir.join(DB_FILE_NAME)),
            conn: Mutex::new(None),
        }
    }

    /// Opened in-memory store, used by tests and ephemeral terminals.
    pub fn open_in_memory() -> PosResult<Self> {
        let store = Self {
            location: Location::Memory,
            conn: Mutex::new(None),
        };
        store.open()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Open the connection and run pending migrations. Calling it again on
    /// an open store does nothing.
    pub fn open(&self) -> PosResult<()> {
        let mut guard = self.lock()?;
        self.ensure_open(&mut guard)
    }

    /// Close the connection. The next operation reopens it.
    pub fn close(&self) {
        match self.conn.lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    info!("Offline store closed");
                }
            }
            Err(_) => warn!("Offline store lock poisoned during close"),
        }
    }

    fn lock(&self) -> PosResult<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| PosError::StorePoisoned)
    }

    fn ensure_open(&self, guard: &mut Option<Connection>) -> PosResult<()> {
        if guard.is_some() {
            return Ok(());
        }
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir).map_err(|e| {
                        PosError::Config(format!("Failed to create data dir {}: {e}", dir.display()))
                    })?;
                }
                info!("Opening offline store at {}", path.display());
                open_and_configure(path)?
            }
            Location::Memory => {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn
            }
        };
        run_migrations(&conn)?;
        *guard = Some(conn);
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> PosResult<T>) -> PosResult<T> {
        let mut guard = self.lock()?;
        self.ensure_open(&mut guard)?;
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(PosError::Config("offline store is not open".to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn get_setting(&self, category: &str, key: &str) -> PosResult<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT setting_value FROM local_settings
                     WHERE setting_category = ?1 AND setting_key = ?2",
                    params![category, key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn set_setting(&self, category: &str, key: &str, value: &str) -> PosResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT(setting_category, setting_key) DO UPDATE SET
                    setting_value = excluded.setting_value,
                    updated_at = excluded.updated_at",
                params![category, key, value],
            )?;
            Ok(())
        })
    }

    pub fn delete_settings(&self, category: &str) -> PosResult<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM local_settings WHERE setting_category = ?1",
                params![category],
            )?)
        })
    }

    // -----------------------------------------------------------------------
    // Catalog cache
    // -----------------------------------------------------------------------

    /// Replace the cached product list with `products`.
    pub fn cache_products(&self, products: &[Product]) -> PosResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM products", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO products
                        (id, name, price, category, stock, sku, barcode, image_url, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                let cached_at = now_timestamp();
                for p in products {
                    stmt.execute(params![
                        p.id,
                        p.name,
                        p.price.to_string(),
                        p.category,
                        p.stock,
                        p.sku,
                        p.barcode,
                        p.image_url,
                        cached_at,
                    ])?;
                }
            }
            tx.commit()?;
            debug!(count = products.len(), "Cached products");
            Ok(products.len())
        })
    }

    pub fn cached_products(&self) -> PosResult<Vec<Product>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, price, category, stock, sku, barcode, image_url
                 FROM products ORDER BY name COLLATE NOCASE, id",
            )?;
            let rows = stmt.query_map([], product_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn cache_categories(&self, categories: &[Category]) -> PosResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM categories", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO categories (id, name, position) VALUES (?1, ?2, ?3)",
                )?;
                for (position, c) in categories.iter().enumerate() {
                    stmt.execute(params![c.id, c.name, position as i64])?;
                }
            }
            tx.commit()?;
            Ok(categories.len())
        })
    }

    pub fn cached_categories(&self) -> PosResult<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY position, id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // -----------------------------------------------------------------------
    // Sync queue
    // -----------------------------------------------------------------------

    /// Append a mutation to the queue. Returns its local id, which also
    /// defines replay order.
    pub fn enqueue(&self, entry: &NewSyncEntry) -> PosResult<i64> {
        let payload = serde_json::to_string(&entry.payload)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, action, payload, synced, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    entry.entity_type,
                    entry.entity_id,
                    entry.action.as_str(),
                    payload,
                    now_timestamp(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            info!(
                queue_id = id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                action = entry.action.as_str(),
                "Queued offline mutation"
            );
            Ok(id)
        })
    }

    /// Unsynced entries, oldest first.
    pub fn list_unsynced(&self) -> PosResult<Vec<SyncQueueEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, entity_type, entity_id, action, payload, synced, attempts,
                        last_error, created_at, synced_at
                 FROM sync_queue WHERE synced = 0 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, entry_from_row(row))))?;

            let mut entries = Vec::new();
            let mut unreadable = Vec::new();
            for row in rows {
                match row? {
                    (_, Ok(entry)) => entries.push(entry),
                    (id, Err(e)) => {
                        warn!(queue_id = id, error = %e, "Skipping unreadable queue entry");
                        unreadable.push((id, e.to_string()));
                    }
                }
            }
            drop(stmt);

            for (id, message) in unreadable {
                conn.execute(
                    "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2
                     WHERE id = ?1 AND synced = 0",
                    params![id, format!("unreadable entry: {message}")],
                )?;
            }
            Ok(entries)
        })
    }

    pub fn get_entry(&self, id: i64) -> PosResult<Option<SyncQueueEntry>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, entity_type, entity_id, action, payload, synced, attempts,
                            last_error, created_at, synced_at
                     FROM sync_queue WHERE id = ?1",
                    params![id],
                    entry_from_row,
                )
                .optional()?)
        })
    }

    /// Flag an entry as delivered. Returns `false` if it was already synced
    /// or does not exist.
    pub fn mark_synced(&self, id: i64) -> PosResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sync_queue SET synced = 1, synced_at = ?2, last_error = NULL
                 WHERE id = ?1 AND synced = 0",
                params![id, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn record_sync_failure(&self, id: i64, message: &str) -> PosResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2
                 WHERE id = ?1 AND synced = 0",
                params![id, message],
            )?;
            Ok(())
        })
    }

    pub fn pending_count(&self) -> PosResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sync_queue WHERE synced = 0", [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as u64)
        })
    }

    /// Delete synced entries delivered more than `older_than` ago.
    pub fn prune_synced(&self, older_than: ChronoDuration) -> PosResult<usize> {
        let cutoff = (Utc::now() - older_than).to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sync_queue WHERE synced = 1 AND synced_at IS NOT NULL AND synced_at < ?1",
                params![cutoff],
            )?;
            if removed > 0 {
                info!(removed, "Pruned synced queue entries");
            }
            Ok(removed)
        })
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let raw_price: String = row.get(2)?;
    let price = Decimal::from_str(&raw_price)
        .map_err(|e| conversion_error(2, format!("price {raw_price:?}: {e}")))?;
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        price,
        category: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        stock: row.get(4)?,
        sku: row.get(5)?,
        barcode: row.get(6)?,
        image_url: row.get(7)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<SyncQueueEntry> {
    let raw_action: String = row.get(3)?;
    let action = SyncAction::parse(&raw_action)
        .ok_or_else(|| conversion_error(3, format!("unknown action {raw_action:?}")))?;
    let raw_payload: String = row.get(4)?;
    let payload = serde_json::from_str(&raw_payload)
        .map_err(|e| conversion_error(4, format!("payload: {e}")))?;
    Ok(SyncQueueEntry {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        action,
        payload,
        synced: row.get::<_, i64>(5)? != 0,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        synced_at: row.get(9)?,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> PosResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current >= CURRENT_SCHEMA_VERSION {
        debug!("Offline store schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating offline store from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings and catalog cache.
fn migrate_v1(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price TEXT NOT NULL,
            category TEXT,
            stock INTEGER NOT NULL DEFAULT 0,
            sku TEXT,
            barcode TEXT,
            image_url TEXT,
            cached_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
        CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode);

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        e
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: offline mutation queue.
fn migrate_v2(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL CHECK (action IN ('create', 'update', 'delete')),
            payload TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            synced_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_synced ON sync_queue(synced, id);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        e
    })?;

    info!("Applied migration v2 (sync_queue)");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
