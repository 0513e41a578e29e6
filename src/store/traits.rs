//! Unified `Database` trait: single async interface for all persistence.
//!
//! Layout rows, users, profiles and device settings share one backing
//! store. Lookups that can miss return `Ok(None)` rather than an error.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::DatabaseError;
use crate::onboarding::model::{
    ComponentAssignment, ComponentName, OnboardingUser, PageNumber, ProfileUpdate, UserProfile,
    UserWithProfile,
};

/// Backend-agnostic database trait covering layout, users and profiles.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Layout ──────────────────────────────────────────────────────

    /// Load every stored component assignment. No ordering guarantee.
    async fn load_assignments(&self) -> Result<Vec<ComponentAssignment>, DatabaseError>;

    /// Store one component's page, refreshing its `updated_at`.
    async fn save_assignment(
        &self,
        component: ComponentName,
        page: PageNumber,
    ) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn find_user_by_id(&self, id: i64) -> Result<Option<OnboardingUser>, DatabaseError>;

    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<OnboardingUser>, DatabaseError>;

    /// Insert a user and its empty profile together.
    ///
    /// The credential is stored exactly as given.
    async fn create_user(
        &self,
        email: &str,
        password: &SecretString,
        current_step: i64,
    ) -> Result<OnboardingUser, DatabaseError>;

    /// Set a user's `current_step`. `NotFound` if no such user.
    async fn update_current_step(&self, user_id: i64, step: i64) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>, DatabaseError>;

    /// Overwrite every profile column for a user.
    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<(), DatabaseError>;

    /// All users left-joined to their profile, newest first.
    async fn list_users_with_profiles(&self) -> Result<Vec<UserWithProfile>, DatabaseError>;

    // ── Device settings ─────────────────────────────────────────────

    async fn get_device_setting(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    async fn set_device_setting(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Returns whether a row was removed.
    async fn delete_device_setting(&self, device_id: &str, key: &str)
    -> Result<bool, DatabaseError>;
}
