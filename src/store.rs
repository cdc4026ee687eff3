use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// One persisted details payload per internal location.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRow {
    pub location_id: String,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// Cross-process second cache tier. Failures are reported to the caller,
/// which logs and carries on without it.
pub trait DurableStore: Send + Sync {
    fn load(&self, location_id: &str) -> AppResult<Option<DurableRow>>;
    fn upsert(&self, row: &DurableRow) -> AppResult<()>;
}

pub struct SqliteDetailsStore {
    connection: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteDetailsStore {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(path, flags)?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 2000;
            "#,
        )?;
        run_migrations(&connection)?;
        info!(
            target: "durable_store",
            path = %path.display(),
            "details store ready"
        );
        Ok(Self {
            connection: Mutex::new(connection),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        run_migrations(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS location_details_cache (
            location_id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_location_details_external_id
            ON location_details_cache(external_id);
        "#,
    )?;
    Ok(())
}

impl DurableStore for SqliteDetailsStore {
    fn load(&self, location_id: &str) -> AppResult<Option<DurableRow>> {
        let raw = {
            let conn = self.connection.lock();
            conn.query_row(
                "SELECT location_id, external_id, payload, fetched_at
                FROM location_details_cache
                WHERE location_id = ?1",
                [location_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((location_id, external_id, payload, fetched_at)) = raw else {
            return Ok(None);
        };
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|err| {
                AppError::InvalidRow(format!("bad fetched_at for {location_id}: {err}"))
            })?
            .with_timezone(&Utc);
        Ok(Some(DurableRow {
            location_id,
            external_id,
            payload: serde_json::from_str(&payload)?,
            fetched_at,
        }))
    }

    fn upsert(&self, row: &DurableRow) -> AppResult<()> {
        let payload = serde_json::to_string(&row.payload)?;
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO location_details_cache (location_id, external_id, payload, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(location_id) DO UPDATE SET
                external_id = excluded.external_id,
                payload = excluded.payload,
                fetched_at = excluded.fetched_at",
            (
                row.location_id.as_str(),
                row.external_id.as_str(),
                payload,
                row.fetched_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }
}

type StoreOpener = Box<dyn Fn() -> AppResult<Arc<dyn DurableStore>> + Send + Sync>;

/// Optional durable tier. The store is opened on first use, once per process;
/// if that fails the tier stays disabled instead of retrying per request.
pub struct DurableTier {
    cell: OnceCell<Option<Arc<dyn DurableStore>>>,
    opener: Option<StoreOpener>,
}

impl DurableTier {
    pub fn disabled() -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(None);
        Self { cell, opener: None }
    }

    pub fn ready(store: Arc<dyn DurableStore>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Some(store));
        Self { cell, opener: None }
    }

    pub fn lazy<F>(opener: F) -> Self
    where
        F: Fn() -> AppResult<Arc<dyn DurableStore>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            opener: Some(Box::new(opener)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        match config.details_store_path.clone() {
            Some(path) => Self::lazy(move || {
                let store = SqliteDetailsStore::open(&path)?;
                Ok(Arc::new(store) as Arc<dyn DurableStore>)
            }),
            None => Self::disabled(),
        }
    }

    pub fn get(&self) -> Option<Arc<dyn DurableStore>> {
        self.cell
            .get_or_init(|| {
                let opener = self.opener.as_ref()?;
                match opener() {
                    Ok(store) => Some(store),
                    Err(err) => {
                        warn!(
                            target: "durable_store",
                            error = %err,
                            "durable details store unavailable; caching in-process only"
                        );
                        None
                    }
                }
            })
            .clone()
    }

    /// Async form of [`Self::get`]: the first open runs on the blocking pool.
    pub async fn acquire(self: &Arc<Self>) -> Option<Arc<dyn DurableStore>> {
        if let Some(store) = self.cell.get() {
            return store.clone();
        }
        let tier = Arc::clone(self);
        match tokio::task::spawn_blocking(move || tier.get()).await {
            Ok(store) => store,
            Err(err) => {
                warn!(target: "durable_store", error = %err, "durable store open task failed");
                None
            }
        }
    }

    /// Opens the store if needed.
    pub fn is_available(&self) -> bool {
        self.get().is_some()
    }

    /// True only once the store has been opened successfully. Never opens it.
    pub fn is_open(&self) -> bool {
        matches!(self.cell.get(), Some(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn row(location_id: &str, external_id: &str, hour: u32) -> DurableRow {
        DurableRow {
            location_id: location_id.into(),
            external_id: external_id.into(),
            payload: json!({ "externalId": external_id, "formattedAddress": "Kyoto" }),
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn upserts_one_row_per_location() {
        let dir = tempdir().unwrap();
        let store = SqliteDetailsStore::open(dir.path().join("nested/details.db")).unwrap();

        store.upsert(&row("loc-1", "X1", 9)).unwrap();
        store.upsert(&row("loc-1", "X2", 10)).unwrap();

        let loaded = store.load("loc-1").unwrap().unwrap();
        assert_eq!(loaded, row("loc-1", "X2", 10));
        assert!(store.load("loc-2").unwrap().is_none());

        let count: i64 = store
            .connection
            .lock()
            .query_row("SELECT COUNT(*) FROM location_details_cache", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("details.db");
        {
            let store = SqliteDetailsStore::open(&path).unwrap();
            store.upsert(&row("loc-1", "X1", 9)).unwrap();
        }
        let reopened = SqliteDetailsStore::open(&path).unwrap();
        assert_eq!(reopened.load("loc-1").unwrap(), Some(row("loc-1", "X1", 9)));
    }

    #[test]
    fn failed_open_is_attempted_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let tier = DurableTier::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Config("missing store credentials".into()))
        });

        assert!(tier.get().is_none());
        assert!(!tier.is_available());
        assert!(tier.get().is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_tier_never_opens() {
        let tier = DurableTier::from_config(&AppConfig::defaults());
        assert!(!tier.is_available());
    }

    #[tokio::test]
    async fn acquire_opens_off_the_async_worker_once() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::defaults();
        config.details_store_path = Some(dir.path().join("acquired.db"));
        let tier = Arc::new(DurableTier::from_config(&config));

        assert!(!tier.is_open());
        assert!(!dir.path().join("acquired.db").exists());
        assert!(tier.acquire().await.is_some());
        assert!(tier.is_open());
        assert!(tier.acquire().await.is_some());
    }

    #[test]
    fn lazy_tier_opens_on_first_use() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::defaults();
        config.details_store_path = Some(dir.path().join("lazy.db"));
        let tier = DurableTier::from_config(&config);

        assert!(!dir.path().join("lazy.db").exists());
        assert!(tier.is_available());
        assert!(dir.path().join("lazy.db").exists());
    }
}
