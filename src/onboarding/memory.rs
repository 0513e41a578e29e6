//! Device-local memory of the last user id used on this device.
//!
//! Read once when a session loads, written on identification and cleared
//! when onboarding completes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use super::model::settings_keys;
use crate::error::DeviceMemoryError;
use crate::store::Database;

#[async_trait]
pub trait DeviceMemory: Send + Sync {
    /// The remembered user id, if any.
    async fn recall(&self) -> Result<Option<i64>, DeviceMemoryError>;

    async fn remember(&self, user_id: i64) -> Result<(), DeviceMemoryError>;

    async fn forget(&self) -> Result<(), DeviceMemoryError>;
}

/// Process-local memory, for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryDeviceMemory {
    user_id: RwLock<Option<i64>>,
}

impl InMemoryDeviceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user_id: i64) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id)),
        }
    }
}

#[async_trait]
impl DeviceMemory for InMemoryDeviceMemory {
    async fn recall(&self) -> Result<Option<i64>, DeviceMemoryError> {
        Ok(*self.user_id.read().await)
    }

    async fn remember(&self, user_id: i64) -> Result<(), DeviceMemoryError> {
        *self.user_id.write().await = Some(user_id);
        Ok(())
    }

    async fn forget(&self) -> Result<(), DeviceMemoryError> {
        *self.user_id.write().await = None;
        Ok(())
    }
}

/// A single file holding the user id as text.
pub struct FileDeviceMemory {
    path: PathBuf,
}

impl FileDeviceMemory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DeviceMemory for FileDeviceMemory {
    async fn recall(&self) -> Result<Option<i64>, DeviceMemoryError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| DeviceMemoryError::Corrupt(trimmed.to_string()))
    }

    async fn remember(&self, user_id: i64) -> Result<(), DeviceMemoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, user_id.to_string()).await?;
        Ok(())
    }

    async fn forget(&self) -> Result<(), DeviceMemoryError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Memory kept server-side in `device_settings`, keyed by a client-chosen
/// device id.
pub struct SettingsDeviceMemory {
    db: Arc<dyn Database>,
    device_id: String,
}

impl SettingsDeviceMemory {
    pub fn new(db: Arc<dyn Database>, device_id: impl Into<String>) -> Self {
        Self {
            db,
            device_id: device_id.into(),
        }
    }
}

#[async_trait]
impl DeviceMemory for SettingsDeviceMemory {
    async fn recall(&self) -> Result<Option<i64>, DeviceMemoryError> {
        let value = self
            .db
            .get_device_setting(&self.device_id, settings_keys::REMEMBERED_USER_ID)
            .await?;
        match value {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| DeviceMemoryError::Corrupt(v.to_string())),
        }
    }

    async fn remember(&self, user_id: i64) -> Result<(), DeviceMemoryError> {
        self.db
            .set_device_setting(
                &self.device_id,
                settings_keys::REMEMBERED_USER_ID,
                &serde_json::json!(user_id),
            )
            .await?;
        Ok(())
    }

    async fn forget(&self) -> Result<(), DeviceMemoryError> {
        self.db
            .delete_device_setting(&self.device_id, settings_keys::REMEMBERED_USER_ID)
            .await?;
        Ok(())
    }
}
