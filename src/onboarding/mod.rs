//! Onboarding wizard: a three-step signup flow whose page 2/page 3 content
//! is chosen by an admin-editable layout.
//!
//! Step 1 identifies (or creates) the account, steps 2 and 3 collect profile
//! fields for whichever components the layout places there, and completion
//! records step 4. Progress is persisted on every move so an interrupted
//! session resumes where it left off.

pub mod admin;
pub mod engine;
pub mod layout;
pub mod listing;
pub mod memory;
pub mod model;
pub mod persister;
pub mod resume;
pub mod routes;
pub mod state;

pub use admin::{CommitReport, LayoutDraft, Proposal};
pub use engine::{StepEngine, StepView};
pub use layout::{Layout, fields_for_step, propose_assignment};
pub use listing::{UserListing, list_users};
pub use memory::{DeviceMemory, FileDeviceMemory, InMemoryDeviceMemory, SettingsDeviceMemory};
pub use model::{ComponentAssignment, ComponentName, PageNumber, ProfileField};
pub use persister::ProgressPersister;
pub use resume::SessionResume;
pub use routes::{AppState, wizard_routes};
pub use state::{WizardSession, WizardStep};
