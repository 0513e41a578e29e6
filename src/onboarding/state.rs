//! Wizard state machine and the per-session state record.

use serde::Serialize;

use super::layout::Layout;
use super::model::{PageNumber, ProfileField, ProfileFields, TERMINAL_STEP};
use crate::error::ValidationError;

/// The wizard's discrete states.
///
/// `Identify` (1) → `PageTwo` (2) → `PageThree` (3) → `Done` (4), with a
/// single persisted regression from `PageThree` back to `PageTwo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    Identify,
    PageTwo,
    PageThree,
    Done,
}

impl WizardStep {
    /// Map a persisted `current_step` to the state a returning user enters.
    ///
    /// Steps below 2 jump to page 2; anything at or past 4 is `Done`.
    pub fn resume_from(current_step: i64) -> Self {
        match current_step {
            s if s >= TERMINAL_STEP => Self::Done,
            3 => Self::PageThree,
            _ => Self::PageTwo,
        }
    }

    /// The `current_step` value this state corresponds to.
    pub fn number(&self) -> i64 {
        match self {
            Self::Identify => 1,
            Self::PageTwo => 2,
            Self::PageThree => 3,
            Self::Done => TERMINAL_STEP,
        }
    }

    /// The configurable page rendered in this state, if any.
    pub fn page(&self) -> Option<PageNumber> {
        match self {
            Self::PageTwo => Some(PageNumber::Two),
            Self::PageThree => Some(PageNumber::Three),
            Self::Identify | Self::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WizardStep) -> bool {
        use WizardStep::*;
        matches!(
            (self, target),
            (Identify, PageTwo)
                | (Identify, PageThree)
                | (Identify, Done)
                | (PageTwo, PageThree)
                | (PageTwo, Identify)
                | (PageThree, PageTwo)
                | (PageThree, Done)
        )
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identify => "identify",
            Self::PageTwo => "page_two",
            Self::PageThree => "page_three",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Everything one wizard session holds in memory.
///
/// Passed by `&mut` to the step engine; nothing here is global.
#[derive(Debug, Clone, Default)]
pub struct WizardSession {
    pub step: WizardStep,
    pub user_id: Option<i64>,
    pub email: String,
    pub fields: ProfileFields,
    /// Layout fetched when the session was loaded.
    pub layout: Layout,
    /// Last user-visible error, cleared at the start of each action.
    pub error: Option<String>,
}

impl WizardSession {
    /// A fresh session at the identification step.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.step.is_terminal()
    }

    /// Change callback for a rendered field.
    pub fn set_field(&mut self, field: ProfileField, value: impl Into<String>) -> Result<(), ValidationError> {
        self.fields.set(field, value)
    }

    /// Move to `target`, returning false (and staying put) if the
    /// transition is not allowed.
    pub(crate) fn transition(&mut self, target: WizardStep) -> bool {
        if !self.step.can_transition_to(target) {
            tracing::warn!(from = %self.step, to = %target, "Rejected wizard transition");
            return false;
        }
        tracing::debug!(from = %self.step, to = %target, user_id = ?self.user_id, "Wizard transition");
        self.step = target;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use WizardStep::*;
        let transitions = [
            (Identify, PageTwo),
            (Identify, PageThree),
            (Identify, Done),
            (PageTwo, PageThree),
            (PageTwo, Identify),
            (PageThree, PageTwo),
            (PageThree, Done),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use WizardStep::*;
        // Skipping page 3
        assert!(!PageTwo.can_transition_to(Done));
        // Terminal
        assert!(!Done.can_transition_to(Identify));
        assert!(!Done.can_transition_to(PageTwo));
        // Back to identification from page 3
        assert!(!PageThree.can_transition_to(Identify));
        // Self-transition
        assert!(!PageTwo.can_transition_to(PageTwo));
    }

    #[test]
    fn resume_jumps_to_at_least_page_two() {
        assert_eq!(WizardStep::resume_from(0), WizardStep::PageTwo);
        assert_eq!(WizardStep::resume_from(1), WizardStep::PageTwo);
        assert_eq!(WizardStep::resume_from(2), WizardStep::PageTwo);
        assert_eq!(WizardStep::resume_from(3), WizardStep::PageThree);
        assert_eq!(WizardStep::resume_from(4), WizardStep::Done);
        assert_eq!(WizardStep::resume_from(9), WizardStep::Done);
    }

    #[test]
    fn numbers_and_pages() {
        assert_eq!(WizardStep::Identify.number(), 1);
        assert_eq!(WizardStep::Done.number(), 4);
        assert_eq!(WizardStep::PageThree.page(), Some(PageNumber::Three));
        assert_eq!(WizardStep::Identify.page(), None);
        assert!(WizardStep::Done.is_terminal());
        assert!(!WizardStep::PageThree.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        use WizardStep::*;
        for step in [Identify, PageTwo, PageThree, Done] {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
        }
    }

    #[test]
    fn rejected_transition_keeps_step() {
        let mut session = WizardSession::default();
        assert!(!session.transition(WizardStep::Identify));
        assert_eq!(session.step, WizardStep::Identify);
        assert!(session.transition(WizardStep::PageTwo));
        assert!(!session.transition(WizardStep::Done));
        assert_eq!(session.step, WizardStep::PageTwo);
    }

    #[test]
    fn completed_account_can_be_entered_from_identify() {
        let mut session = WizardSession::default();
        assert!(session.transition(WizardStep::Done));
        assert!(session.is_done());
        assert!(!session.transition(WizardStep::PageThree));
        assert_eq!(session.step, WizardStep::Done);
    }
}
