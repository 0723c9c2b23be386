#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

use std::path;
use std::str::FromStr;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::fs;
use uuid::Uuid;

use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::SessionRecord;
use crate::domain::models::StoreError;

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY NOT NULL,
        created_at TEXT NOT NULL,
        archived_at TEXT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions (session_id) ON DELETE CASCADE,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        parent_message_id INTEGER NULL REFERENCES messages (id),
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS messages_session_order
        ON messages (session_id, created_at, id)"#,
];

// Fixed width so lexical order in SQL matches time order.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    return timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    return DateTime::parse_from_rfc3339(text)
        .map(|timestamp| return timestamp.with_timezone(&Utc))
        .map_err(|err| return StoreError::Malformed(format!("invalid timestamp {text}: {err}")));
}

fn database_file(database_url: &str) -> Option<path::PathBuf> {
    let file = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()?;

    if file.is_empty() || file == ":memory:" {
        return None;
    }

    return Some(path::PathBuf::from(file));
}

fn map_insert_error(err: sqlx::Error, session_id: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.kind() == ErrorKind::ForeignKeyViolation {
            return StoreError::SessionNotFound(session_id.to_string());
        }
    }

    return StoreError::Query(err);
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|_| return StoreError::Malformed(format!("unknown role {}", self.role)))?;

        return Ok(Message {
            role,
            content: self.content,
        });
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    created_at: String,
    message_count: i64,
    first_user_message: Option<String>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord, StoreError> {
        return Ok(SessionRecord {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.session_id,
            message_count: self.message_count,
            first_user_message: self.first_user_message,
        });
    }
}

/// The system of record for sessions and their messages. Every operation
/// commits on its own; nothing spans a whole turn.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<SessionStore, StoreError> {
        if let Some(parent) = database_file(database_url).and_then(|file| {
            return file.parent().map(|parent| return parent.to_path_buf());
        }) {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(&parent)
                    .await
                    .map_err(|err| return StoreError::Query(sqlx::Error::Io(err)))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await?;

        tracing::debug!(database_url, pool_size, "connected to database");

        return Ok(SessionStore { pool });
    }

    /// Creates both tables, their foreign keys and the ordering index.
    /// Safe to call on every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        return Ok(());
    }

    pub async fn create_session(&self) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (session_id, created_at) VALUES (?, ?)")
            .bind(&session_id)
            .bind(format_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;

        tracing::info!(session_id, "created session");

        return Ok(session_id);
    }

    /// Returns the given id once it is confirmed to exist, or creates a new
    /// session when no id is given.
    pub async fn get_or_create_session(&self, session_id: Option<&str>) -> Result<String, StoreError> {
        match session_id {
            Some(id) => {
                if !self.session_exists(id).await? {
                    return Err(StoreError::SessionNotFound(id.to_string()));
                }

                return Ok(id.to_string());
            }
            None => {
                return self.create_session().await;
            }
        }
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        return Ok(row.is_some());
    }

    /// Inserts a message and returns its id. `parent_message_id` links an
    /// assistant reply to the user message it answers.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        parent_message_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let res = sqlx::query(
            r#"INSERT INTO messages (session_id, role, content, parent_message_id, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(session_id)
        .bind(role.to_string())
        .bind(content)
        .bind(parent_message_id)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|err| return map_insert_error(err, session_id))?;

        let message_id = res.last_insert_rowid();
        tracing::debug!(session_id, message_id, role = role.as_ref(), "appended message");

        return Ok(message_id);
    }

    /// All messages of a session, oldest first. Unknown sessions yield an
    /// empty list.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT role, content FROM messages
               WHERE session_id = ?
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        return rows
            .into_iter()
            .map(|row| return row.into_message())
            .collect::<Result<Vec<Message>, StoreError>>();
    }

    pub async fn message_count(&self, session_id: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;

        return Ok(count);
    }

    /// Sessions that have not been archived, oldest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"SELECT
                 s.session_id,
                 s.created_at,
                 (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.session_id) AS message_count,
                 (SELECT m.content FROM messages m
                    WHERE m.session_id = s.session_id AND m.role = 'user'
                    ORDER BY m.created_at ASC, m.id ASC
                    LIMIT 1) AS first_user_message
               FROM sessions s
               WHERE s.archived_at IS NULL
               ORDER BY s.created_at ASC, s.rowid ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        return rows
            .into_iter()
            .map(|row| return row.into_record())
            .collect::<Result<Vec<SessionRecord>, StoreError>>();
    }

    /// Hides a session from listings. Its messages are kept and stay
    /// readable by id.
    pub async fn archive_session(&self, session_id: &str) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE sessions SET archived_at = ? WHERE session_id = ? AND archived_at IS NULL",
        )
        .bind(format_timestamp(&Utc::now()))
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 && !self.session_exists(session_id).await? {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }

        tracing::info!(session_id, "archived session");

        return Ok(());
    }

    pub async fn restore_session(&self, session_id: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE sessions SET archived_at = NULL WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }

        return Ok(());
    }
}
