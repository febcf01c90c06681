use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

// --- Playlist persistence ---------------------------------------------------
//
// The playlist lives in a small SQLite file. rusqlite is synchronous, so every
// call opens a connection inside spawn_blocking and keeps tokio workers free.
// Order is an explicit `position` column; `filename` is the stable key.

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub filename: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl PlaylistEntry {
    pub fn new(filename: impl Into<String>, display_name: impl Into<String>) -> Self {
        PlaylistEntry { filename: filename.into(), display_name: display_name.into() }
    }

    /// Entry for a freshly uploaded file: the display name is the filename
    /// without its last extension.
    pub fn from_filename(filename: &str) -> Self {
        let name = match filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => filename,
        };
        PlaylistEntry::new(filename, name)
    }
}

#[derive(Clone, Debug)]
pub struct PlaylistStore {
    path: PathBuf,
}

fn db_init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS playlist_items (
            filename TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            name     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_playlist_items_position ON playlist_items(position);
        "#,
    )?;
    Ok(())
}

fn db_load(conn: &Connection) -> rusqlite::Result<Vec<PlaylistEntry>> {
    let mut stmt = conn.prepare("SELECT filename, name FROM playlist_items ORDER BY position ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(PlaylistEntry { filename: row.get(0)?, display_name: row.get(1)? })
    })?;
    rows.collect()
}

fn db_save(conn: &mut Connection, entries: &[PlaylistEntry]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM playlist_items", [])?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO playlist_items (filename, position, name) VALUES (?1, ?2, ?3)")?;
        for (pos, e) in entries.iter().enumerate() {
            stmt.execute(params![e.filename, pos as i64, e.display_name])?;
        }
    }
    tx.commit()
}

impl PlaylistStore {
    /// Opens (or creates) the playlist database at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = PlaylistStore { path: path.into() };
        store.with_conn(|conn| Ok(db_init(conn)?)).await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Ordered snapshot of the whole playlist.
    pub async fn all(&self) -> Result<Vec<PlaylistEntry>, StoreError> {
        self.with_conn(|conn| Ok(db_load(conn)?)).await
    }

    pub async fn replace_all(&self, entries: Vec<PlaylistEntry>) -> Result<(), StoreError> {
        self.with_conn(move |conn| Ok(db_save(conn, &entries)?)).await
    }

    /// Appends `entry` unless its filename is already present. Returns whether
    /// anything was added.
    pub async fn append(&self, entry: PlaylistEntry) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM playlist_items WHERE filename = ?1)",
                params![entry.filename],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(false);
            }
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_items",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO playlist_items (filename, position, name) VALUES (?1, ?2, ?3)",
                params![entry.filename, next, entry.display_name],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Removes `filename`. Positions of the remaining entries are compacted.
    pub async fn remove(&self, filename: &str) -> Result<bool, StoreError> {
        let filename = filename.to_string();
        self.with_conn(move |conn| {
            let mut entries = db_load(conn)?;
            let before = entries.len();
            entries.retain(|e| e.filename != filename);
            if entries.len() == before {
                return Ok(false);
            }
            db_save(conn, &entries)?;
            Ok(true)
        })
        .await
    }

    /// Rewrites the order from a list of filenames.
    ///
    /// The list must name every current entry exactly once; anything else is
    /// rejected with `InvalidOrder` and leaves the playlist untouched.
    pub async fn reorder(&self, order: Vec<String>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let current = db_load(conn)?;
            let reordered = apply_order(current, &order)?;
            db_save(conn, &reordered)?;
            Ok(())
        })
        .await
    }

    /// Drops entries whose file no longer exists under `video_dir` and returns
    /// the filenames that were dropped. Only writes when something changed.
    pub async fn retain_existing(&self, video_dir: &Path) -> Result<Vec<String>, StoreError> {
        let video_dir = video_dir.to_path_buf();
        self.with_conn(move |conn| {
            let entries = db_load(conn)?;
            let (kept, missing): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|e| video_dir.join(&e.filename).exists());
            if missing.is_empty() {
                return Ok(Vec::new());
            }
            for e in &missing {
                warn!("video {} not found, removing from playlist", e.filename);
            }
            db_save(conn, &kept)?;
            Ok(missing.into_iter().map(|e| e.filename).collect())
        })
        .await
    }
}

fn apply_order(current: Vec<PlaylistEntry>, order: &[String]) -> Result<Vec<PlaylistEntry>, StoreError> {
    if order.len() != current.len() {
        return Err(StoreError::InvalidOrder(format!(
            "expected {} filenames, got {}",
            current.len(),
            order.len()
        )));
    }

    let mut by_name: HashMap<String, PlaylistEntry> =
        current.into_iter().map(|e| (e.filename.clone(), e)).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(order.len());
    let mut reordered = Vec::with_capacity(order.len());

    for name in order {
        if !seen.insert(name.as_str()) {
            return Err(StoreError::InvalidOrder(format!("duplicate filename {name}")));
        }
        let entry = by_name
            .remove(name)
            .ok_or_else(|| StoreError::InvalidOrder(format!("unknown filename {name}")))?;
        reordered.push(entry);
    }
    Ok(reordered)
}
