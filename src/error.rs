//! Error types for the onboarding wizard.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Input rejected before any store call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Email and password are required.")]
    MissingCredentials,

    #[error("Page {page} must keep at least one component")]
    EmptyPage { page: u8 },

    #[error("Birthdate must be a date in YYYY-MM-DD form, got {value:?}")]
    InvalidBirthdate { value: String },

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Page number must be 2 or 3, got {0}")]
    InvalidPage(i64),
}

/// Step engine failures. Every variant leaves the session at its last
/// persisted step.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Profile fields were not saved for user {user_id}: {source}")]
    ProfileWrite {
        user_id: i64,
        #[source]
        source: DatabaseError,
    },

    #[error("Step {step} was not saved for user {user_id}: {source}")]
    StepWrite {
        user_id: i64,
        step: u8,
        #[source]
        source: DatabaseError,
    },

    #[error("Cannot {action} from {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("No user is attached to this session")]
    NoUser,

    #[error("Another action is already in progress")]
    Busy,

    #[error("Device memory error: {0}")]
    DeviceMemory(#[from] DeviceMemoryError),
}

/// Errors from the device-local remembered identifier.
#[derive(Debug, thiserror::Error)]
pub enum DeviceMemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remembered identifier is not a user id: {0:?}")]
    Corrupt(String),
}
