//! Configurable multi-step signup backed by libSQL.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
