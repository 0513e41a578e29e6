//! Page layout: which component renders on which page.
//!
//! A `Layout` always holds exactly one assignment per known component.
//! Components missing from the store are placed on page 2.

use serde::Serialize;

use super::model::{ComponentAssignment, ComponentName, PageNumber};
use super::state::WizardStep;
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Layout {
    assignments: Vec<ComponentAssignment>,
}

/// Components grouped by page, for the admin overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedLayout {
    pub page_two: Vec<ComponentName>,
    pub page_three: Vec<ComponentName>,
}

impl Default for Layout {
    /// Every component on page 2 (what an empty store yields).
    fn default() -> Self {
        Self::from_assignments(Vec::new())
    }
}

impl Layout {
    /// Build from stored rows. Later rows for the same component win.
    pub fn from_assignments(rows: impl IntoIterator<Item = ComponentAssignment>) -> Self {
        let rows: Vec<ComponentAssignment> = rows.into_iter().collect();
        let assignments = ComponentName::ALL
            .iter()
            .map(|&name| {
                let page = rows
                    .iter()
                    .rev()
                    .find(|row| row.component_name == name)
                    .map(|row| row.page_number)
                    .unwrap_or_default();
                ComponentAssignment::new(name, page)
            })
            .collect();
        Self { assignments }
    }

    pub fn assignments(&self) -> &[ComponentAssignment] {
        &self.assignments
    }

    pub fn page_of(&self, component: ComponentName) -> PageNumber {
        self.assignments
            .iter()
            .find(|a| a.component_name == component)
            .map(|a| a.page_number)
            .unwrap_or_default()
    }

    /// Components on `page`, in render order.
    pub fn components_on(&self, page: PageNumber) -> Vec<ComponentName> {
        self.assignments
            .iter()
            .filter(|a| a.page_number == page)
            .map(|a| a.component_name)
            .collect()
    }

    pub fn count_on(&self, page: PageNumber) -> usize {
        self.assignments.iter().filter(|a| a.page_number == page).count()
    }

    /// Both pages must keep at least one component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for page in PageNumber::ALL {
            if self.count_on(page) == 0 {
                return Err(ValidationError::EmptyPage {
                    page: page.as_i64() as u8,
                });
            }
        }
        Ok(())
    }

    pub fn grouped(&self) -> GroupedLayout {
        GroupedLayout {
            page_two: self.components_on(PageNumber::Two),
            page_three: self.components_on(PageNumber::Three),
        }
    }
}

/// Reassign `component` to `page`, returning the candidate layout or the
/// reason it was rejected. The current layout is never modified.
pub fn propose_assignment(
    current: &Layout,
    component: ComponentName,
    page: PageNumber,
) -> Result<Layout, ValidationError> {
    let mut candidate = current.clone();
    for assignment in &mut candidate.assignments {
        if assignment.component_name == component {
            assignment.page_number = page;
        }
    }
    candidate.validate()?;
    Ok(candidate)
}

/// Components rendered on `step`. Identification and done render none.
pub fn fields_for_step(layout: &Layout, step: WizardStep) -> Vec<ComponentName> {
    match step.page() {
        Some(page) => layout.components_on(page),
        None => Vec::new(),
    }
}
