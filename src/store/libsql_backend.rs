//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::onboarding::model::{
    ComponentAssignment, ComponentName, OnboardingUser, PageNumber, ProfileUpdate, UserProfile,
    UserWithProfile,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
///
/// Every write takes `write_gate`, so a transaction on the shared
/// connection never absorbs (or rolls back) another request's write.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_gate: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_gate: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_gate: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a `UNIQUE` failure to `Constraint`, anything else to `Query`.
fn classify(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const USER_COLUMNS: &str = "id, email, current_step, created_at, updated_at";

/// Map a libsql Row to an OnboardingUser.
///
/// Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<OnboardingUser, libsql::Error> {
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    Ok(OnboardingUser {
        id: row.get(0)?,
        email: row.get(1)?,
        current_step: row.get(2)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const PROFILE_COLUMNS: &str =
    "user_id, about_me, street_address, city, state, zip, birthdate, updated_at";

/// Map profile columns starting at `offset`. NULL text columns become `None`.
fn row_to_profile(row: &libsql::Row, offset: i32) -> Result<UserProfile, libsql::Error> {
    let text = |i: i32| row.get::<String>(offset + i).ok();
    Ok(UserProfile {
        user_id: row.get(offset)?,
        about_me: text(1),
        street_address: text(2),
        city: text(3),
        state: text(4),
        zip: text(5),
        birthdate: text(6),
        updated_at: text(7).map(|s| parse_datetime(&s)),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Layout ──────────────────────────────────────────────────────

    async fn load_assignments(&self) -> Result<Vec<ComponentAssignment>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT component_name, page_number FROM rvs_onboarding_config",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_assignments: {e}")))?;

        let mut assignments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_assignments: {e}")))?
        {
            let name: String = row.get(0).unwrap_or_default();
            let page: i64 = row.get(1).unwrap_or_default();
            match (name.parse::<ComponentName>(), PageNumber::try_from(page)) {
                (Ok(component), Ok(page)) => {
                    assignments.push(ComponentAssignment::new(component, page));
                }
                (component, page) => {
                    warn!(
                        component = %name,
                        component_ok = component.is_ok(),
                        page_ok = page.is_ok(),
                        "Skipping unusable layout row"
                    );
                }
            }
        }
        Ok(assignments)
    }

    async fn save_assignment(
        &self,
        component: ComponentName,
        page: PageNumber,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_gate.lock().await;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rvs_onboarding_config (component_name, page_number, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (component_name) DO UPDATE SET page_number = ?2, updated_at = ?3",
            params![component.as_str(), page.as_i64(), now_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_assignment: {e}")))?;
        debug!(component = %component, page = %page, "Layout assignment saved");
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn find_user_by_id(&self, id: i64) -> Result<Option<OnboardingUser>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM rvs_users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_user_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_user_by_id row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_user_by_id: {e}"))),
        }
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OnboardingUser>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM rvs_users WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_user_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_user_by_email row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_user_by_email: {e}"))),
        }
    }

    async fn create_user(
        &self,
        email: &str,
        password: &SecretString,
        current_step: i64,
    ) -> Result<OnboardingUser, DatabaseError> {
        let now = now_str();
        let _write = self.write_gate.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_user begin: {e}")))?;

        if let Err(e) = tx
            .execute(
                "INSERT INTO rvs_users (email, password_hash, current_step, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![email, password.expose_secret(), current_step, now.clone()],
            )
            .await
        {
            let _ = tx.rollback().await;
            return Err(classify("create_user", e));
        }
        let id = tx.last_insert_rowid();

        if let Err(e) = tx
            .execute(
                "INSERT INTO rvs_user_profiles (user_id) VALUES (?1)",
                params![id],
            )
            .await
        {
            let _ = tx.rollback().await;
            return Err(classify("create_user profile", e));
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_user commit: {e}")))?;

        info!(user_id = id, "Onboarding user created");
        let created_at = parse_datetime(&now);
        Ok(OnboardingUser {
            id,
            email: email.to_string(),
            current_step,
            created_at,
            updated_at: created_at,
        })
    }

    async fn update_current_step(&self, user_id: i64, step: i64) -> Result<(), DatabaseError> {
        let _write = self.write_gate.lock().await;
        let conn = self.conn();
        let count = conn
            .execute(
                "UPDATE rvs_users SET current_step = ?1, updated_at = ?2 WHERE id = ?3",
                params![step, now_str(), user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_current_step: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "rvs_users".into(),
                id: user_id.to_string(),
            });
        }
        debug!(user_id, step, "current_step updated");
        Ok(())
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM rvs_user_profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row, 0)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_profile row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_gate.lock().await;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rvs_user_profiles (user_id, about_me, street_address, city, state, zip, birthdate, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (user_id) DO UPDATE SET
                about_me = ?2, street_address = ?3, city = ?4, state = ?5, zip = ?6,
                birthdate = ?7, updated_at = ?8",
            params![
                user_id,
                opt_text(update.about_me.as_deref()),
                opt_text(update.street_address.as_deref()),
                opt_text(update.city.as_deref()),
                opt_text(update.state.as_deref()),
                opt_text(update.zip.as_deref()),
                opt_text(update.birthdate.as_deref()),
                now_str(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_profile: {e}")))?;
        debug!(user_id, "Profile updated");
        Ok(())
    }

    async fn list_users_with_profiles(&self) -> Result<Vec<UserWithProfile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT u.id, u.email, u.current_step, u.created_at, u.updated_at,
                        p.user_id, p.about_me, p.street_address, p.city, p.state, p.zip,
                        p.birthdate, p.updated_at
                 FROM rvs_users u
                 LEFT JOIN rvs_user_profiles p ON p.user_id = u.id
                 ORDER BY u.created_at DESC, u.id DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users_with_profiles: {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users_with_profiles: {e}")))?
        {
            let user = row_to_user(&row)
                .map_err(|e| DatabaseError::Query(format!("list_users_with_profiles row: {e}")))?;
            // p.user_id is NULL when no profile row exists
            let profile = match row.get::<i64>(5) {
                Ok(_) => Some(row_to_profile(&row, 5).map_err(|e| {
                    DatabaseError::Query(format!("list_users_with_profiles profile: {e}"))
                })?),
                Err(_) => None,
            };
            users.push(UserWithProfile { user, profile });
        }
        Ok(users)
    }

    // ── Device settings ─────────────────────────────────────────────

    async fn get_device_setting(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM device_settings WHERE device_id = ?1 AND key = ?2",
                params![device_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_device_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_device_setting row: {e}")))?;
                let value: serde_json::Value = serde_json::from_str(&value_str)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_device_setting: {e}"))),
        }
    }

    async fn set_device_setting(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_gate.lock().await;
        let conn = self.conn();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO device_settings (device_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (device_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![device_id, key, value_str, now_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_device_setting: {e}")))?;

        Ok(())
    }

    async fn delete_device_setting(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<bool, DatabaseError> {
        let _write = self.write_gate.lock().await;
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM device_settings WHERE device_id = ?1 AND key = ?2",
                params![device_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_device_setting: {e}")))?;
        Ok(count > 0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
