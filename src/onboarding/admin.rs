//! Admin layout editing: an in-memory working set that is validated on
//! every change and written to the store only on an explicit commit.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::layout::{GroupedLayout, Layout, propose_assignment};
use super::model::{ComponentName, PageNumber};
use crate::error::{DatabaseError, ValidationError};
use crate::store::Database;

/// Result of a proposed reassignment. A rejection leaves the draft as it was.
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub layout: DraftView,
}

/// Snapshot of the working set for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftView {
    pub layout: Layout,
    pub grouped: GroupedLayout,
    /// True when the draft has changes that are not yet committed.
    pub dirty: bool,
}

/// Outcome of a commit. Each component is written independently, so a
/// partial failure leaves the store mixed and is reported here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub written: Vec<ComponentName>,
    pub failed: Vec<FailedWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    pub component: ComponentName,
    pub error: String,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Draft {
    layout: Layout,
    dirty: bool,
}

pub struct LayoutDraft {
    db: Arc<dyn Database>,
    draft: RwLock<Option<Draft>>,
}

impl LayoutDraft {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            draft: RwLock::new(None),
        }
    }

    /// Discard the working set and reload it from the store.
    pub async fn reload(&self) -> Result<DraftView, DatabaseError> {
        let rows = self.db.load_assignments().await?;
        let layout = Layout::from_assignments(rows);
        let view = view_of(&layout, false);
        *self.draft.write().await = Some(Draft {
            layout,
            dirty: false,
        });
        Ok(view)
    }

    /// The current working set, loading it on first use.
    pub async fn current(&self) -> Result<DraftView, DatabaseError> {
        if let Some(draft) = self.draft.read().await.as_ref() {
            return Ok(view_of(&draft.layout, draft.dirty));
        }
        self.reload().await
    }

    /// Reassign one component in the working set, or reject and keep it.
    pub async fn propose(
        &self,
        component: ComponentName,
        page: PageNumber,
    ) -> Result<Proposal, DatabaseError> {
        self.current().await?;
        let mut guard = self.draft.write().await;
        let Some(draft) = guard.as_mut() else {
            return Err(DatabaseError::Query("layout draft not loaded".into()));
        };

        match propose_assignment(&draft.layout, component, page) {
            Ok(candidate) => {
                if candidate != draft.layout {
                    draft.layout = candidate;
                    draft.dirty = true;
                }
                Ok(Proposal {
                    accepted: true,
                    reason: None,
                    layout: view_of(&draft.layout, draft.dirty),
                })
            }
            Err(reason) => {
                tracing::debug!(component = %component, page = %page, %reason, "Layout change rejected");
                Ok(Proposal {
                    accepted: false,
                    reason: Some(reason.to_string()),
                    layout: view_of(&draft.layout, draft.dirty),
                })
            }
        }
    }

    /// Write every assignment in the working set to the store.
    ///
    /// Refuses a working set that would leave a page empty.
    pub async fn commit(&self) -> Result<CommitReport, CommitError> {
        self.current().await?;
        let mut guard = self.draft.write().await;
        let Some(draft) = guard.as_mut() else {
            return Err(DatabaseError::Query("layout draft not loaded".into()).into());
        };
        draft.layout.validate()?;

        let mut report = CommitReport::default();
        for assignment in draft.layout.assignments() {
            match self
                .db
                .save_assignment(assignment.component_name, assignment.page_number)
                .await
            {
                Ok(()) => report.written.push(assignment.component_name),
                Err(e) => {
                    tracing::error!(
                        component = %assignment.component_name,
                        page = %assignment.page_number,
                        error = %e,
                        "Layout assignment write failed"
                    );
                    report.failed.push(FailedWrite {
                        component: assignment.component_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            draft.dirty = false;
            tracing::info!(components = report.written.len(), "Layout committed");
        } else {
            tracing::warn!(
                written = report.written.len(),
                failed = report.failed.len(),
                "Layout partially committed"
            );
        }
        Ok(report)
    }
}

fn view_of(layout: &Layout, dirty: bool) -> DraftView {
    DraftView {
        layout: layout.clone(),
        grouped: layout.grouped(),
        dirty,
    }
}

/// Why a commit did not run at all.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
