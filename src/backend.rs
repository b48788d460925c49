// Key-value persistence backends

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Durable string key-value storage used to persist store state
#[async_trait]
pub trait KeyValueBackend: Send + Sync + 'static {
    /// Value stored under `key`, or `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

// ============================================================================
// In-memory
// ============================================================================

/// Volatile backend, mostly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: AsyncMutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// One file per key
// ============================================================================

/// Stores each key as `{key}.json` inside a directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    /// Open or create a file backend rooted at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{}.json", key)))
    }

    /// Writers and readers of a key serialize on `{key}.json.lock`; the value
    /// file itself is only ever replaced by rename.
    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("json.lock")
    }

    fn open_lock(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(Self::lock_path(path))
            .context("Failed to open lock file")
    }

    fn read_blocking(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }

        let lock = Self::open_lock(path)?;
        lock.lock_shared().context("Failed to acquire file lock")?;

        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read value file"),
        }
    }

    fn write_blocking(path: &Path, value: &str) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));

        let lock = Self::open_lock(path)?;
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        // Temp file + rename: a crash mid-write leaves the previous value intact
        let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp file")?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .context("Failed to replace value file")?;

        // Lock is automatically released when file is dropped
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .context("File read task failed")?
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.key_path(key)?;
        debug!(key, bytes = value.len(), "FileBackend::set");
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &value))
            .await
            .context("File write task failed")?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        tokio::task::spawn_blocking(move || -> Result<()> {
            let lock = Self::open_lock(&path)?;
            lock.lock_exclusive().context("Failed to acquire file lock")?;
            if path.exists() {
                fs::remove_file(&path).context("Failed to remove value file")?;
            }
            Ok(())
        })
        .await
        .context("File remove task failed")?
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Stores keys as rows of a single `kv` table
pub struct SqliteBackend {
    db: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let db = Connection::open(path).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating database schema");

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| eyre!("SQLite connection mutex poisoned"))?;
            op(&*conn)
        })
        .await
        .context("SQLite task failed")?
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_db(move |db| {
            let value = db
                .query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| row.get::<_, String>(0))
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_db(move |db| {
            db.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, chrono::Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_db(move |db| {
            db.execute("DELETE FROM kv WHERE key = ?1", [&key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exercise(backend: &dyn KeyValueBackend) {
        assert_eq!(backend.get("tasks").await.unwrap(), None);

        backend.set("tasks", "[1]".to_string()).await.unwrap();
        assert_eq!(backend.get("tasks").await.unwrap().as_deref(), Some("[1]"));

        // Shorter value must fully replace the longer one
        backend.set("tasks", "[]".to_string()).await.unwrap();
        assert_eq!(backend.get("tasks").await.unwrap().as_deref(), Some("[]"));

        backend.set("theme", "dark".to_string()).await.unwrap();
        backend.remove("tasks").await.unwrap();
        assert_eq!(backend.get("tasks").await.unwrap(), None);
        assert_eq!(backend.get("theme").await.unwrap().as_deref(), Some("dark"));

        // Removing again is fine
        backend.remove("tasks").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        exercise(&backend).await;
        assert!(backend.contains_key("theme").await);
        assert!(!backend.contains_key("tasks").await);
    }

    #[tokio::test]
    async fn test_file_backend() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path().join("store")).unwrap();
        exercise(&backend).await;

        assert!(temp.path().join("store/theme.json").exists());
        assert!(!temp.path().join("store/tasks.json").exists());
    }

    #[tokio::test]
    async fn test_file_backend_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        FileBackend::open(temp.path())
            .unwrap()
            .set("tasks", "[\"a\"]".to_string())
            .await
            .unwrap();

        let reopened = FileBackend::open(temp.path()).unwrap();
        assert_eq!(reopened.get("tasks").await.unwrap().as_deref(), Some("[\"a\"]"));
    }

    #[tokio::test]
    async fn test_sqlite_backend() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        exercise(&backend).await;
    }

    #[tokio::test]
    async fn test_sqlite_backend_on_disk() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested/tasklist.db");

        SqliteBackend::open(&db_path)
            .unwrap()
            .set("theme", "light".to_string())
            .await
            .unwrap();

        assert!(db_path.exists());
        let reopened = SqliteBackend::open(&db_path).unwrap();
        assert_eq!(reopened.get("theme").await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        assert!(backend.set("../escape", "x".to_string()).await.is_err());
        assert!(backend.set("", "x".to_string()).await.is_err());
        assert!(backend.get(&"k".repeat(65)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected_on_every_backend() {
        let memory = MemoryBackend::new();
        let sqlite = SqliteBackend::open_in_memory().unwrap();

        for backend in [&memory as &dyn KeyValueBackend, &sqlite] {
            assert!(backend.get("a/b").await.is_err());
            assert!(backend.remove("").await.is_err());
            assert!(backend.set("a b", "x".to_string()).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_file_backend_interrupted_write_keeps_previous_value() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        backend.set("tasks", "[\"old\"]".to_string()).await.unwrap();

        // A write killed before its rename leaves only a partial temp file behind
        fs::write(temp.path().join(".tmpA1b2C3"), "[\"new\", {\"trunc").unwrap();

        let reopened = FileBackend::open(temp.path()).unwrap();
        assert_eq!(reopened.get("tasks").await.unwrap().as_deref(), Some("[\"old\"]"));
    }

    #[tokio::test]
    async fn test_file_backend_write_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        backend.set("tasks", "[1]".to_string()).await.unwrap();
        backend.set("tasks", "[1,2]".to_string()).await.unwrap();

        let mut names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["tasks.json".to_string(), "tasks.json.lock".to_string()]);
    }
}
