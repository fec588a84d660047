use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Role, UserId};

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Persisted form of the signed-in session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        tracing::debug!(path = %path.display(), "storage opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn save_session(&self, mut session: StoredSession) -> Result<()> {
        if session.user_id.as_str().is_empty() {
            bail!("storage: user id required for session");
        }
        if session.token.trim().is_empty() {
            bail!("storage: token required for session");
        }
        let now = Utc::now();
        if session.created_at.timestamp() == 0 {
            session.created_at = now;
        }
        session.updated_at = now;

        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO session (slot, user_id, name, role, token, created_at, updated_at)
VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(slot) DO UPDATE SET
  user_id = excluded.user_id,
  name = excluded.name,
  role = excluded.role,
  token = excluded.token,
  updated_at = excluded.updated_at
"#,
            params![
                session.user_id.as_str(),
                session.name,
                session.role.as_str(),
                session.token,
                session.created_at.timestamp(),
                session.updated_at.timestamp(),
            ],
        )
        .context("storage: save session")?;
        Ok(())
    }

    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT user_id, name, role, token, created_at, updated_at
FROM session
WHERE slot = 1
"#,
            [],
            session_from_row,
        )
        .optional()
        .context("storage: query session")
    }

    pub fn clear_session(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM session WHERE slot = 1", [])
            .context("storage: clear session")?;
        Ok(removed > 0)
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<StoredSession> {
    let user_id: String = row.get(0)?;
    let role: String = row.get(2)?;
    let created: i64 = row.get(4)?;
    let updated: i64 = row.get(5)?;
    Ok(StoredSession {
        user_id: UserId::new(user_id),
        name: row.get(1)?,
        role: Role::parse(&role),
        token: row.get(3)?,
        created_at: Utc
            .timestamp_opt(created, 0)
            .single()
            .unwrap_or_else(Utc::now),
        updated_at: Utc
            .timestamp_opt(updated, 0)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![r#"
CREATE TABLE IF NOT EXISTS session (
  slot INTEGER PRIMARY KEY CHECK (slot = 1),
  user_id TEXT NOT NULL,
  name TEXT NOT NULL,
  role TEXT NOT NULL,
  token TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
"#]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fmc-client").join("state.db"))
}
