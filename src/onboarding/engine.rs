//! StepEngine: drives a `WizardSession` through the onboarding steps.
//!
//! Every action that persists runs its store writes before the session
//! moves; on failure the session stays on its last persisted step and
//! `session.error` carries the message to show.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;

use super::layout::{Layout, fields_for_step};
use super::memory::DeviceMemory;
use super::model::{ComponentName, ProfileField, TERMINAL_STEP};
use super::persister::ProgressPersister;
use super::resume::SessionResume;
use super::state::{WizardSession, WizardStep};
use crate::error::WizardError;
use crate::store::Database;

/// One input inside a rendered component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub field: ProfileField,
    pub label: &'static str,
    pub value: String,
}

/// A component as it should render on the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentView {
    pub name: ComponentName,
    pub label: &'static str,
    pub fields: Vec<FieldView>,
}

/// What the presentation layer needs to draw the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub step: WizardStep,
    pub step_number: i64,
    pub done: bool,
    pub user_id: Option<i64>,
    pub email: String,
    pub components: Vec<ComponentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct StepEngine {
    db: Arc<dyn Database>,
    memory: Arc<dyn DeviceMemory>,
    resume: SessionResume,
    persister: ProgressPersister,
}

impl StepEngine {
    pub fn new(db: Arc<dyn Database>, memory: Arc<dyn DeviceMemory>) -> Self {
        Self {
            resume: SessionResume::new(Arc::clone(&db), Arc::clone(&memory)),
            persister: ProgressPersister::new(Arc::clone(&db)),
            db,
            memory,
        }
    }

    /// Start a session: snapshot the layout, then resume from device memory.
    pub async fn load(&self) -> Result<WizardSession, WizardError> {
        let rows = self.db.load_assignments().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to load page layout");
            WizardError::Database(e)
        })?;
        let layout = Layout::from_assignments(rows);
        self.resume.resume(layout).await
    }

    /// Step 1 → account identification.
    pub async fn identify(
        &self,
        session: &mut WizardSession,
        email: &str,
        password: &SecretString,
    ) -> Result<(), WizardError> {
        session.error = None;
        self.require(session, WizardStep::Identify, "identify")?;
        let result = self.resume.identify(session, email, password).await;
        Self::record(session, result)
    }

    /// Page 2 → page 3, saving profile fields first.
    pub async fn advance(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        session.error = None;
        self.require(session, WizardStep::PageTwo, "advance")?;
        let user_id = session.user_id.ok_or(WizardError::NoUser)?;

        let result = self
            .persister
            .commit_step(user_id, &session.fields, WizardStep::PageThree.number())
            .await;
        if result.is_ok() {
            session.transition(WizardStep::PageThree);
        }
        Self::record(session, result)
    }

    /// Page 3 → page 2 (persisted immediately), or page 2 → step 1 (local).
    pub async fn back(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        session.error = None;
        match session.step {
            WizardStep::PageThree => {
                let user_id = session.user_id.ok_or(WizardError::NoUser)?;
                let result = self
                    .persister
                    .set_step(user_id, WizardStep::PageTwo.number())
                    .await;
                if result.is_ok() {
                    session.transition(WizardStep::PageTwo);
                }
                Self::record(session, result)
            }
            WizardStep::PageTwo => {
                session.transition(WizardStep::Identify);
                Ok(())
            }
            from => Err(WizardError::InvalidTransition {
                from: from.to_string(),
                action: "go back",
            }),
        }
    }

    /// Page 3 → done. Saves fields, records step 4, forgets the device's user.
    pub async fn complete(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        session.error = None;
        self.require(session, WizardStep::PageThree, "complete")?;
        let user_id = session.user_id.ok_or(WizardError::NoUser)?;

        let result = self
            .persister
            .commit_step(user_id, &session.fields, TERMINAL_STEP)
            .await;
        if result.is_err() {
            return Self::record(session, result);
        }

        // Progress is already final; a stale id resolves to Done next load.
        if let Err(e) = self.memory.forget().await {
            tracing::warn!(user_id, error = %e, "Failed to clear remembered user id");
        }
        session.transition(WizardStep::Done);
        tracing::info!(user_id, "Onboarding complete");
        Ok(())
    }

    /// Change callback for one field.
    pub fn set_field(
        &self,
        session: &mut WizardSession,
        field: ProfileField,
        value: impl Into<String>,
    ) -> Result<(), WizardError> {
        if session.is_done() {
            return Err(WizardError::InvalidTransition {
                from: session.step.to_string(),
                action: "edit fields",
            });
        }
        let result = session.set_field(field, value).map_err(WizardError::from);
        Self::record(session, result)
    }

    /// Project the session into what should render now.
    pub fn view(&self, session: &WizardSession) -> StepView {
        let components = fields_for_step(&session.layout, session.step)
            .into_iter()
            .map(|name| ComponentView {
                name,
                label: name.label(),
                fields: name
                    .fields()
                    .iter()
                    .map(|&field| FieldView {
                        field,
                        label: field.label(),
                        value: session.fields.get(field).to_string(),
                    })
                    .collect(),
            })
            .collect();

        StepView {
            step: session.step,
            step_number: session.step.number(),
            done: session.is_done(),
            user_id: session.user_id,
            email: session.email.clone(),
            components,
            error: session.error.clone(),
        }
    }

    fn require(
        &self,
        session: &WizardSession,
        expected: WizardStep,
        action: &'static str,
    ) -> Result<(), WizardError> {
        if session.step != expected {
            return Err(WizardError::InvalidTransition {
                from: session.step.to_string(),
                action,
            });
        }
        Ok(())
    }

    /// Copy a failure into the session's visible error.
    fn record(session: &mut WizardSession, result: Result<(), WizardError>) -> Result<(), WizardError> {
        if let Err(ref e) = result {
            session.error = Some(e.to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::memory::InMemoryDeviceMemory;
    use crate::onboarding::model::{ComponentAssignment, PageNumber};
    use crate::store::LibSqlBackend;
    use crate::store::testing::{FailOn, FailingDatabase};

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    struct Harness {
        db: Arc<LibSqlBackend>,
        memory: Arc<InMemoryDeviceMemory>,
        engine: StepEngine,
    }

    async fn harness() -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = Arc::new(InMemoryDeviceMemory::new());
        let engine = StepEngine::new(db.clone(), memory.clone());
        Harness { db, memory, engine }
    }

    /// A session already on page 3 for a stored user.
    async fn on_page_three(h: &Harness) -> WizardSession {
        let mut session = h.engine.load().await.unwrap();
        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        h.engine.advance(&mut session).await.unwrap();
        assert_eq!(session.step, WizardStep::PageThree);
        session
    }

    #[tokio::test]
    async fn end_to_end_onboarding() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        assert_eq!(session.step, WizardStep::Identify);

        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        assert_eq!(session.step, WizardStep::PageTwo);
        let user_id = session.user_id.unwrap();
        let user = h.db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 2);
        let profile = h.db.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(profile.about_me, None);

        h.engine
            .set_field(&mut session, ProfileField::AboutMe, "hi")
            .unwrap();
        h.engine.advance(&mut session).await.unwrap();
        assert_eq!(session.step, WizardStep::PageThree);
        let profile = h.db.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(profile.about_me.as_deref(), Some("hi"));
        let user = h.db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 3);

        h.engine
            .set_field(&mut session, ProfileField::Birthdate, "2000-01-01")
            .unwrap();
        h.engine.complete(&mut session).await.unwrap();
        assert!(session.is_done());
        let user = h.db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 4);
        let profile = h.db.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(profile.birthdate.as_deref(), Some("2000-01-01"));
        assert_eq!(h.memory.recall().await.unwrap(), None);

        let fresh = h.engine.load().await.unwrap();
        assert_eq!(fresh.step, WizardStep::Identify);
    }

    #[tokio::test]
    async fn back_from_page_three_persists_immediately() {
        let h = harness().await;
        let mut session = on_page_three(&h).await;
        let user_id = session.user_id.unwrap();

        h.engine.back(&mut session).await.unwrap();
        assert_eq!(session.step, WizardStep::PageTwo);
        let user = h.db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 2);

        // Reloading on the same device lands on page 2
        let reloaded = h.engine.load().await.unwrap();
        assert_eq!(reloaded.step, WizardStep::PageTwo);
    }

    #[tokio::test]
    async fn back_from_page_two_is_local() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        let user_id = session.user_id.unwrap();

        h.engine.back(&mut session).await.unwrap();
        assert_eq!(session.step, WizardStep::Identify);
        let user = h.db.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.current_step, 2);
        assert_eq!(h.memory.recall().await.unwrap(), Some(user_id));
    }

    #[tokio::test]
    async fn back_is_invalid_on_identify_and_done() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        let err = h.engine.back(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { .. }));

        let mut session = on_page_three(&h).await;
        h.engine.complete(&mut session).await.unwrap();
        let err = h.engine.back(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn advance_requires_page_two() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        let err = h.engine.advance(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { .. }));
        let err = h.engine.complete(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn failed_advance_stays_on_page_two() {
        let h = harness().await;
        let failing = Arc::new(FailingDatabase::new(h.db.clone(), FailOn::UpdateStep));
        let engine = StepEngine::new(failing, h.memory.clone());

        let mut session = engine.load().await.unwrap();
        engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        let err = engine.advance(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::StepWrite { .. }));
        assert_eq!(session.step, WizardStep::PageTwo);
        assert!(session.error.is_some());
    }

    #[tokio::test]
    async fn failed_complete_keeps_remembered_id() {
        let h = harness().await;
        let mut session = on_page_three(&h).await;
        let user_id = session.user_id.unwrap();

        let failing = Arc::new(FailingDatabase::new(h.db.clone(), FailOn::UpdateProfile));
        let engine = StepEngine::new(failing, h.memory.clone());
        let err = engine.complete(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::ProfileWrite { .. }));
        assert_eq!(session.step, WizardStep::PageThree);
        assert_eq!(h.memory.recall().await.unwrap(), Some(user_id));
    }

    #[tokio::test]
    async fn failed_back_stays_on_page_three() {
        let h = harness().await;
        let mut session = on_page_three(&h).await;

        let failing = Arc::new(FailingDatabase::new(h.db.clone(), FailOn::UpdateStep));
        let engine = StepEngine::new(failing, h.memory.clone());
        let err = engine.back(&mut session).await.unwrap_err();
        assert!(matches!(err, WizardError::StepWrite { step: 2, .. }));
        assert_eq!(session.step, WizardStep::PageThree);
    }

    #[tokio::test]
    async fn identify_validation_sets_visible_error() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        assert!(h.engine.identify(&mut session, "", &secret("")).await.is_err());
        assert_eq!(
            session.error.as_deref(),
            Some("Email and password are required.")
        );

        // A successful action clears it
        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        assert!(session.error.is_none());
    }

    #[tokio::test]
    async fn view_follows_layout_snapshot() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        h.engine
            .set_field(&mut session, ProfileField::City, "Austin")
            .unwrap();

        let view = h.engine.view(&session);
        let names: Vec<_> = view.components.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![ComponentName::AboutMe, ComponentName::Address]);
        let address = &view.components[1];
        assert_eq!(address.fields.len(), 4);
        assert_eq!(address.fields[1].field, ProfileField::City);
        assert_eq!(address.fields[1].value, "Austin");

        // An admin change applies to new sessions, not this one
        h.db.save_assignment(ComponentName::Address, PageNumber::Three)
            .await
            .unwrap();
        assert_eq!(h.engine.view(&session).components.len(), 2);
        let next = h.engine.load().await.unwrap();
        assert_eq!(next.step, WizardStep::PageTwo);
        let names: Vec<_> = h.engine.view(&next).components.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![ComponentName::AboutMe]);
    }

    #[tokio::test]
    async fn component_without_row_renders_on_page_two() {
        let h = harness().await;
        let mut session = h.engine.load().await.unwrap();
        // Only birthdate has a stored placement
        session.layout = Layout::from_assignments([ComponentAssignment::new(
            ComponentName::Birthdate,
            PageNumber::Three,
        )]);
        h.engine
            .identify(&mut session, "a@b.com", &secret("x"))
            .await
            .unwrap();
        let names: Vec<_> = h.engine.view(&session).components.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![ComponentName::AboutMe, ComponentName::Address]);
    }

    #[tokio::test]
    async fn done_view_exposes_email_only() {
        let h = harness().await;
        let mut session = on_page_three(&h).await;
        h.engine.complete(&mut session).await.unwrap();

        let view = h.engine.view(&session);
        assert!(view.done);
        assert_eq!(view.step_number, 4);
        assert_eq!(view.email, "a@b.com");
        assert!(view.components.is_empty());

        let err = h
            .engine
            .set_field(&mut session, ProfileField::AboutMe, "late")
            .unwrap_err();
        assert!(matches!(err, WizardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn layout_load_failure_is_reported() {
        let h = harness().await;
        let failing = Arc::new(FailingDatabase::new(h.db.clone(), FailOn::LoadAssignments));
        let engine = StepEngine::new(failing, h.memory.clone());
        assert!(matches!(
            engine.load().await.unwrap_err(),
            WizardError::Database(_)
        ));
    }
}
