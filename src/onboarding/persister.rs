//! Progress persister: writes profile fields and `current_step`.

use std::sync::Arc;

use super::model::ProfileFields;
use crate::error::WizardError;
use crate::store::Database;

pub struct ProgressPersister {
    db: Arc<dyn Database>,
}

impl ProgressPersister {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Save every profile field, then move the user to `next_step`.
    ///
    /// The profile is written first. If it fails the step is not touched;
    /// if the step write fails the profile has already been saved. Either
    /// way the caller must not advance.
    pub async fn commit_step(
        &self,
        user_id: i64,
        fields: &ProfileFields,
        next_step: i64,
    ) -> Result<(), WizardError> {
        let update = fields.to_update();
        if let Err(source) = self.db.update_profile(user_id, &update).await {
            tracing::error!(user_id, next_step, error = %source, "Profile write failed");
            return Err(WizardError::ProfileWrite { user_id, source });
        }
        self.set_step(user_id, next_step).await
    }

    /// Update only `current_step` (the page-3 → page-2 regression).
    pub async fn set_step(&self, user_id: i64, step: i64) -> Result<(), WizardError> {
        if let Err(source) = self.db.update_current_step(user_id, step).await {
            tracing::error!(user_id, step, error = %source, "Step write failed");
            return Err(WizardError::StepWrite {
                user_id,
                step: step as u8,
                source,
            });
        }
        tracing::info!(user_id, step, "Progress saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::ProfileField;
    use crate::store::LibSqlBackend;
    use crate::store::testing::{FailingDatabase, FailOn};
    use secrecy::SecretString;

    async fn setup() -> (Arc<LibSqlBackend>, i64) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user = db
            .create_user("a@b.com", &SecretString::from("x".to_string()), 2)
            .await
            .unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn commit_writes_profile_and_step() {
        let (db, user_id) = setup().await;
        let persister = ProgressPersister::new(db.clone());

        let mut fields = ProfileFields::default();
        fields.set(ProfileField::AboutMe, "hi").unwrap();
        persister.commit_step(user_id, &fields, 3).await.unwrap();

        let user = db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 3);
        let profile = db.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(profile.about_me.as_deref(), Some("hi"));
        assert_eq!(profile.street_address, None);
    }

    #[tokio::test]
    async fn profile_failure_skips_step_write() {
        let (db, user_id) = setup().await;
        let failing = Arc::new(FailingDatabase::new(db.clone(), FailOn::UpdateProfile));
        let persister = ProgressPersister::new(failing);

        let err = persister
            .commit_step(user_id, &ProfileFields::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::ProfileWrite { .. }));

        let user = db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 2);
    }

    #[tokio::test]
    async fn step_failure_is_distinguishable() {
        let (db, user_id) = setup().await;
        let failing = Arc::new(FailingDatabase::new(db.clone(), FailOn::UpdateStep));
        let persister = ProgressPersister::new(failing);

        let mut fields = ProfileFields::default();
        fields.set(ProfileField::Zip, "78701").unwrap();
        let err = persister.commit_step(user_id, &fields, 3).await.unwrap_err();
        assert!(matches!(err, WizardError::StepWrite { step: 3, .. }));

        // Profile landed, step did not
        let profile = db.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(profile.zip.as_deref(), Some("78701"));
        let user = db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 2);
    }

    #[tokio::test]
    async fn set_step_for_missing_user_fails() {
        let (db, _) = setup().await;
        let persister = ProgressPersister::new(db);
        let err = persister.set_step(999, 2).await.unwrap_err();
        assert!(matches!(err, WizardError::StepWrite { user_id: 999, .. }));
    }
}
