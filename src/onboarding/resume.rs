//! Session resume: rebuilds wizard state from the remembered user id, and
//! identifies (or creates) the account on step 1.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use super::layout::Layout;
use super::memory::DeviceMemory;
use super::model::{OnboardingUser, ProfileFields};
use super::state::{WizardSession, WizardStep};
use crate::error::{ValidationError, WizardError};
use crate::store::Database;

/// `current_step` recorded for a freshly created account.
const NEW_ACCOUNT_STEP: i64 = 2;

pub struct SessionResume {
    db: Arc<dyn Database>,
    memory: Arc<dyn DeviceMemory>,
}

impl SessionResume {
    pub fn new(db: Arc<dyn Database>, memory: Arc<dyn DeviceMemory>) -> Self {
        Self { db, memory }
    }

    /// Build the initial session for this device.
    ///
    /// A missing or stale remembered id starts fresh at step 1. A completed
    /// user lands on `Done` without loading profile fields.
    pub async fn resume(&self, layout: Layout) -> Result<WizardSession, WizardError> {
        let mut session = WizardSession::new(layout);

        let remembered = match self.memory.recall().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable remembered id, starting fresh");
                self.forget().await;
                None
            }
        };
        let Some(user_id) = remembered else {
            return Ok(session);
        };

        let Some(user) = self.db.find_user_by_id(user_id).await? else {
            tracing::info!(user_id, "Remembered user no longer exists, starting fresh");
            self.forget().await;
            return Ok(session);
        };

        self.enter(&mut session, &user).await;
        tracing::info!(user_id, step = %session.step, "Session resumed");
        Ok(session)
    }

    /// Step 1: look the email up, or create the account.
    ///
    /// An existing account is entered without checking the password.
    pub async fn identify(
        &self,
        session: &mut WizardSession,
        email: &str,
        password: &SecretString,
    ) -> Result<(), WizardError> {
        let email = email.trim();
        if email.is_empty() || password.expose_secret().is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }

        if let Some(user) = self.db.find_user_by_email(email).await? {
            self.remember(user.id).await?;
            self.enter(session, &user).await;
            tracing::info!(user_id = user.id, step = %session.step, "Existing account identified");
            return Ok(());
        }

        let user = self
            .db
            .create_user(email, password, NEW_ACCOUNT_STEP)
            .await?;
        self.remember(user.id).await?;
        session.user_id = Some(user.id);
        session.email = user.email;
        session.fields = ProfileFields::default();
        session.transition(WizardStep::PageTwo);
        Ok(())
    }

    /// Attach `user` to the session and jump to its resume step.
    async fn enter(&self, session: &mut WizardSession, user: &OnboardingUser) {
        session.user_id = Some(user.id);
        session.email = user.email.clone();

        let target = WizardStep::resume_from(user.current_step);
        session.transition(target);
        if target.is_terminal() {
            return;
        }

        match self.db.get_profile(user.id).await {
            Ok(Some(profile)) => session.fields = ProfileFields::from_profile(&profile),
            Ok(None) => tracing::debug!(user_id = user.id, "No profile row, fields left empty"),
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Failed to load profile, fields left empty");
            }
        }
    }

    async fn remember(&self, user_id: i64) -> Result<(), WizardError> {
        self.memory.remember(user_id).await.map_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to remember user id");
            WizardError::DeviceMemory(e)
        })
    }

    async fn forget(&self) {
        if let Err(e) = self.memory.forget().await {
            tracing::warn!(error = %e, "Failed to clear remembered user id");
        }
    }
}
