//! SQLite-backed user subscription store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use airalert_core::error::{AirAlertError, Result};
use airalert_core::traits::UserStore;
use airalert_core::types::{NewUser, PushKeys, PushSubscription, UserId, UserSubscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

const USER_COLUMNS: &str =
    "id, push_url, auth_key, p256dh_key, longitude, latitude, threshold, last_crossover";

/// User subscriptions in a single SQLite database.
pub struct SqliteUserStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteUserStore {
    /// Open or create the user database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| AirAlertError::Database(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| AirAlertError::Database(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create the `users` table.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                push_url TEXT NOT NULL,
                auth_key TEXT NOT NULL,
                p256dh_key TEXT NOT NULL,
                longitude REAL NOT NULL,
                latitude REAL NOT NULL,
                threshold REAL NOT NULL,
                last_crossover INTEGER,          -- unix seconds, NULL until first notification
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_push_url ON users(push_url);
         ",
            )
            .map_err(|e| AirAlertError::Database(format!("Migration: {e}")))
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| AirAlertError::Database("connection lock poisoned".into()))
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserSubscription> {
    let last_crossover: Option<i64> = row.get(7)?;
    Ok(UserSubscription {
        id: row.get(0)?,
        subscription: PushSubscription {
            endpoint: row.get(1)?,
            keys: PushKeys {
                auth: row.get(2)?,
                p256dh: row.get(3)?,
            },
        },
        longitude: row.get(4)?,
        latitude: row.get(5)?,
        threshold: row.get(6)?,
        last_crossover: last_crossover.and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUser) -> Result<UserId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (push_url, auth_key, p256dh_key, longitude, latitude, threshold, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                user.subscription.endpoint,
                user.subscription.keys.auth,
                user.subscription.keys.p256dh,
                user.longitude,
                user.latitude,
                user.threshold,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AirAlertError::Database(format!("Create user: {e}")))?;

        let id = conn.last_insert_rowid();
        tracing::info!("👤 User {id} subscribed (threshold {})", user.threshold);
        Ok(id)
    }

    async fn list_users(&self) -> Result<Vec<UserSubscription>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .map_err(|e| AirAlertError::Database(format!("List users: {e}")))?;
        let users = stmt
            .query_map([], user_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| AirAlertError::Database(format!("List users: {e}")))?;
        Ok(users)
    }

    async fn get_user(&self, id: UserId) -> Result<UserSubscription> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
            .map_err(|e| AirAlertError::Database(format!("Get user: {e}")))?
            .ok_or_else(|| AirAlertError::LookupFailed(format!("no user with id {id}")))
    }

    async fn delete_user(&self, subscription: &PushSubscription) -> Result<()> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM users WHERE push_url = ?1 AND auth_key = ?2 AND p256dh_key = ?3",
                rusqlite::params![
                    subscription.endpoint,
                    subscription.keys.auth,
                    subscription.keys.p256dh
                ],
            )
            .map_err(|e| AirAlertError::Database(format!("Delete user: {e}")))?;
        tracing::info!("👤 Unsubscribed {removed} user(s)");
        Ok(())
    }

    async fn update_last_crossover(&self, id: UserId, crossover: DateTime<Utc>) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE users SET last_crossover = ?1 WHERE id = ?2",
                rusqlite::params![crossover.timestamp(), id],
            )
            .map_err(|e| AirAlertError::Database(format!("Update crossover: {e}")))?;
        if updated == 0 {
            return Err(AirAlertError::LookupFailed(format!("no user with id {id}")));
        }
        Ok(())
    }
}
