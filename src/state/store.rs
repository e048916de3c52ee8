use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::AppConfig;
use super::data::Asset;

const CONFIG_KEY: &str = "app_config";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persistence medium could not be opened at all
    #[error("library store unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("library store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("stored settings are not valid JSON: {0}")]
    Config(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    Invalid(String),
}

/// The durable keyed collection of accepted assets (primary key = asset name)
pub trait AssetStore: Send {
    /// Upsert every asset as one atomic unit: all visible afterwards, or none
    fn put_all(&mut self, assets: &[Asset]) -> Result<(), StoreError>;

    /// Every persisted asset. Order is unspecified.
    fn get_all(&self) -> Result<Vec<Asset>, StoreError>;

    fn load_config(&self) -> Result<Option<AppConfig>, StoreError>;

    fn save_config(&mut self, config: &AppConfig) -> Result<(), StoreError>;

    /// False when running in session-only mode
    fn is_durable(&self) -> bool;
}

/// Store shared between the UI and background ingestion
pub type SharedStore = Arc<Mutex<Box<dyn AssetStore>>>;

pub fn shared(store: impl AssetStore + 'static) -> SharedStore {
    Arc::new(Mutex::new(Box::new(store)))
}

/// Use the durable store if it opened, otherwise degrade to a session-only
/// [`MemoryStore`]. The second value is the notice to show the user.
pub fn open_or_fallback(opened: Result<SqliteStore, StoreError>) -> (SharedStore, Option<String>) {
    match opened {
        Ok(sqlite) => (shared(sqlite), None),
        Err(e) => {
            tracing::warn!("⚠️  {e}. Falling back to session-only storage");
            (
                shared(MemoryStore::new()),
                Some(format!("Library storage is unavailable ({e}). Imports will only last for this session.")),
            )
        }
    }
}

/// SQLite-backed store. Survives restarts.
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open the store at the default location, creating it on first use.
    ///
    /// The database file is created in the user's data directory:
    /// - Linux: ~/.local/share/pano-viewer/pano_viewer.db
    /// - macOS: ~/Library/Application Support/pano-viewer/pano_viewer.db
    /// - Windows: %APPDATA%\pano-viewer\pano_viewer.db
    pub fn open_default() -> Result<Self, StoreError> {
        let db_path = Self::default_path().ok_or_else(|| StoreError::Unavailable {
            path: PathBuf::new(),
            reason: "could not determine user data directory".to_string(),
        })?;
        Self::open_or_create(db_path)
    }

    fn default_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("pano-viewer");
        path.push("pano_viewer.db");
        Some(path)
    }

    /// Open or create the store at `db_path`. Idempotent.
    pub fn open_or_create(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        let unavailable = |reason: String| StoreError::Unavailable {
            path: db_path.clone(),
            reason,
        };

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let conn = Connection::open(&db_path).map_err(|e| unavailable(e.to_string()))?;
        Self::init_schema(&conn).map_err(|e| unavailable(e.to_string()))?;

        tracing::info!("📁 Library store opened at {}", db_path.display());
        Ok(SqliteStore { conn, db_path })
    }

    /// Creates the tables if they don't exist
    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        // One record per asset, keyed by name
        conn.execute(
            "CREATE TABLE IF NOT EXISTS assets (
                name            TEXT PRIMARY KEY NOT NULL,
                size            INTEGER NOT NULL,
                last_modified   INTEGER NOT NULL,
                type            TEXT NOT NULL,
                blob            BLOB NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key             TEXT PRIMARY KEY NOT NULL,
                json            TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl AssetStore for SqliteStore {
    fn put_all(&mut self, assets: &[Asset]) -> Result<(), StoreError> {
        // Dropping the transaction without commit rolls the whole batch back
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO assets (name, size, last_modified, type, blob)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                    size = excluded.size,
                    last_modified = excluded.last_modified,
                    type = excluded.type,
                    blob = excluded.blob",
            )?;

            for asset in assets {
                let size = i64::try_from(asset.size).map_err(|_| {
                    StoreError::Invalid(format!("{}: size {} out of range", asset.name, asset.size))
                })?;
                stmt.execute(params![
                    asset.name,
                    size,
                    asset.last_modified.timestamp_millis(),
                    asset.mime_type,
                    &asset.data[..],
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!("💾 Persisted {} assets", assets.len());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Asset>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, size, last_modified, type, blob FROM assets")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut assets = Vec::new();
        for row in rows {
            let (name, size, last_modified, mime_type, blob) = row?;
            let last_modified = DateTime::<Utc>::from_timestamp_millis(last_modified)
                .ok_or_else(|| StoreError::Invalid(format!("{}: bad timestamp", name)))?;
            let size = u64::try_from(size)
                .map_err(|_| StoreError::Invalid(format!("{}: negative size", name)))?;
            assets.push(Asset {
                name,
                size,
                last_modified,
                mime_type,
                data: Bytes::from(blob),
            });
        }

        Ok(assets)
    }

    fn load_config(&self) -> Result<Option<AppConfig>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json FROM settings WHERE key = ?1",
                [CONFIG_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(AppConfig::from_json(&json)?)),
            None => Ok(None),
        }
    }

    fn save_config(&mut self, config: &AppConfig) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings (key, json) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET json = excluded.json",
            params![CONFIG_KEY, config.to_json()?],
        )?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Session-only fallback used when the durable store cannot be opened
#[derive(Debug, Default)]
pub struct MemoryStore {
    assets: BTreeMap<String, Asset>,
    config: Option<AppConfig>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetStore for MemoryStore {
    fn put_all(&mut self, assets: &[Asset]) -> Result<(), StoreError> {
        for asset in assets {
            self.assets.insert(asset.name.clone(), asset.clone());
        }
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Asset>, StoreError> {
        Ok(self.assets.values().cloned().collect())
    }

    fn load_config(&self) -> Result<Option<AppConfig>, StoreError> {
        Ok(self.config)
    }

    fn save_config(&mut self, config: &AppConfig) -> Result<(), StoreError> {
        self.config = Some(*config);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn asset(name: &str, data: &'static [u8]) -> Asset {
        Asset {
            name: name.to_string(),
            size: data.len() as u64,
            last_modified: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            mime_type: "image/jpeg".to_string(),
            data: Bytes::from_static(data),
        }
    }

    fn names(mut assets: Vec<Asset>) -> Vec<String> {
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        assets.into_iter().map(|a| a.name).collect()
    }

    #[test]
    fn test_round_trip_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.db");

        let mut store = SqliteStore::open_or_create(&path).unwrap();
        store.put_all(&[asset("a.jpg", b"aaaa"), asset("c.jpg", b"cc")]).unwrap();
        drop(store);

        let store = SqliteStore::open_or_create(&path).unwrap();
        let mut assets = store.get_all().unwrap();
        assets.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0], asset("a.jpg", b"aaaa"));
        assert_eq!(assets[1], asset("c.jpg", b"cc"));
    }

    #[test]
    fn test_open_is_idempotent_and_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("library.db");

        let first = SqliteStore::open_or_create(&path).unwrap();
        let second = SqliteStore::open_or_create(&path).unwrap();
        assert_eq!(first.path(), second.path());
        assert!(second.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_reingest_overwrites_by_name() {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open_or_create(dir.path().join("library.db")).unwrap();

        store.put_all(&[asset("a.jpg", b"old"), asset("b.jpg", b"keep")]).unwrap();
        store.put_all(&[asset("a.jpg", b"new!")]).unwrap();

        let assets = store.get_all().unwrap();
        assert_eq!(names(assets.clone()), vec!["a.jpg", "b.jpg"]);
        let a = assets.iter().find(|a| a.name == "a.jpg").unwrap();
        assert_eq!(a.data, Bytes::from_static(b"new!"));
        assert_eq!(a.size, 4);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open_or_create(dir.path().join("library.db")).unwrap();

        let mut broken = asset("b.jpg", b"bb");
        broken.size = u64::MAX;

        let result = store.put_all(&[asset("a.jpg", b"aaaa"), broken]);
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_negative_size_is_invalid() {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open_or_create(dir.path().join("library.db")).unwrap();
        store.put_all(&[asset("a.jpg", b"aaaa")]).unwrap();
        store
            .conn
            .execute("UPDATE assets SET size = -1 WHERE name = 'a.jpg'", [])
            .unwrap();

        assert!(matches!(store.get_all(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_unopenable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"file").unwrap();

        let result = SqliteStore::open_or_create(blocker.join("library.db"));
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[test]
    fn test_unavailable_store_falls_back_to_session_only() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"file").unwrap();

        let (store, warning) = open_or_fallback(SqliteStore::open_or_create(blocker.join("library.db")));
        assert!(warning.unwrap().contains("only last for this session"));

        let mut store = store.lock();
        assert!(!store.is_durable());
        store.put_all(&[asset("a.jpg", b"aaaa")]).unwrap();
        assert_eq!(names(store.get_all().unwrap()), vec!["a.jpg"]);
    }

    #[test]
    fn test_available_store_has_no_warning() {
        let dir = tempdir().unwrap();
        let (store, warning) = open_or_fallback(SqliteStore::open_or_create(dir.path().join("library.db")));
        assert!(warning.is_none());
        assert!(store.lock().is_durable());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open_or_create(dir.path().join("library.db")).unwrap();
        assert_eq!(store.load_config().unwrap(), None);

        let mut config = AppConfig::default();
        config.viewer.auto_rotate = false;
        store.save_config(&config).unwrap();
        store.save_config(&config).unwrap();

        assert_eq!(store.load_config().unwrap(), Some(config));
    }

    #[test]
    fn test_memory_store_upserts() {
        let mut store = MemoryStore::new();
        store.put_all(&[asset("a.jpg", b"old")]).unwrap();
        store.put_all(&[asset("a.jpg", b"new"), asset("b.jpg", b"b")]).unwrap();

        let assets = store.get_all().unwrap();
        assert_eq!(names(assets.clone()), vec!["a.jpg", "b.jpg"]);
        assert_eq!(assets[0].data, Bytes::from_static(b"new"));
        assert!(!store.is_durable());
    }
}
