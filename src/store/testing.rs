//! Test double that forwards to a real backend but fails selected calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::DatabaseError;
use crate::onboarding::model::{
    ComponentAssignment, ComponentName, OnboardingUser, PageNumber, ProfileUpdate, UserProfile,
    UserWithProfile,
};
use crate::store::Database;

/// Which call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    LoadAssignments,
    SaveAssignment(ComponentName),
    FindUser,
    CreateUser,
    UpdateStep,
    UpdateProfile,
    GetProfile,
}

pub struct FailingDatabase {
    inner: Arc<dyn Database>,
    fail_on: FailOn,
    profile_reads: AtomicUsize,
}

impl FailingDatabase {
    pub fn new(inner: Arc<dyn Database>, fail_on: FailOn) -> Self {
        Self {
            inner,
            fail_on,
            profile_reads: AtomicUsize::new(0),
        }
    }

    /// How many times `get_profile` was called.
    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    fn check(&self, op: FailOn) -> Result<(), DatabaseError> {
        if self.fail_on == op {
            return Err(DatabaseError::Query(format!("injected failure: {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for FailingDatabase {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }

    async fn load_assignments(&self) -> Result<Vec<ComponentAssignment>, DatabaseError> {
        self.check(FailOn::LoadAssignments)?;
        self.inner.load_assignments().await
    }

    async fn save_assignment(
        &self,
        component: ComponentName,
        page: PageNumber,
    ) -> Result<(), DatabaseError> {
        self.check(FailOn::SaveAssignment(component))?;
        self.inner.save_assignment(component, page).await
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<OnboardingUser>, DatabaseError> {
        self.check(FailOn::FindUser)?;
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OnboardingUser>, DatabaseError> {
        self.check(FailOn::FindUser)?;
        self.inner.find_user_by_email(email).await
    }

    async fn create_user(
        &self,
        email: &str,
        password: &SecretString,
        current_step: i64,
    ) -> Result<OnboardingUser, DatabaseError> {
        self.check(FailOn::CreateUser)?;
        self.inner.create_user(email, password, current_step).await
    }

    async fn update_current_step(&self, user_id: i64, step: i64) -> Result<(), DatabaseError> {
        self.check(FailOn::UpdateStep)?;
        self.inner.update_current_step(user_id, step).await
    }

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>, DatabaseError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        self.check(FailOn::GetProfile)?;
        self.inner.get_profile(user_id).await
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<(), DatabaseError> {
        self.check(FailOn::UpdateProfile)?;
        self.inner.update_profile(user_id, update).await
    }

    async fn list_users_with_profiles(&self) -> Result<Vec<UserWithProfile>, DatabaseError> {
        self.inner.list_users_with_profiles().await
    }

    async fn get_device_setting(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        self.inner.get_device_setting(device_id, key).await
    }

    async fn set_device_setting(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        self.inner.set_device_setting(device_id, key, value).await
    }

    async fn delete_device_setting(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<bool, DatabaseError> {
        self.inner.delete_device_setting(device_id, key).await
    }
}
