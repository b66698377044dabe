use color_eyre::{eyre::eyre, Result};
use hmis_sync::Session;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS session (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  access_token TEXT NOT NULL,
  tenant_id TEXT NOT NULL,
  user TEXT,
  saved_at TEXT NOT NULL
);
";

/// SQLite-backed store for the signed-in session. Holds no clinical data.
pub struct SessionStore {
  conn: Connection,
}

impl SessionStore {
  /// Open or create the database at the default location
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let store = Self { conn };
    store.run_migrations()?;

    Ok(store)
  }

  /// Data directory shared with the log files
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hmis"))
  }

  fn default_path() -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  pub fn load(&self) -> Result<Option<Session>> {
    self
      .conn
      .query_row(
        "SELECT access_token, tenant_id, user FROM session WHERE id = 1",
        [],
        |row| {
          Ok(Session {
            access_token: row.get(0)?,
            tenant_id: row.get(1)?,
            user: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to load session: {}", e))
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    self
      .conn
      .execute(
        "INSERT INTO session (id, access_token, tenant_id, user, saved_at)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           access_token = excluded.access_token,
           tenant_id = excluded.tenant_id,
           user = excluded.user,
           saved_at = excluded.saved_at",
        params![
          session.access_token,
          session.tenant_id,
          session.user,
          chrono::Utc::now().to_rfc3339()
        ],
      )
      .map_err(|e| eyre!("Failed to save session: {}", e))?;
    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM session", [])
      .map_err(|e| eyre!("Failed to clear session: {}", e))?;
    Ok(())
  }
}
