//! Registration conversations
//!
//! A player answers five questions by direct message; the answers become a
//! [`PlayerProfile`](crate::types::PlayerProfile) in the guild's profile
//! document.

pub mod engine;
pub mod parse;
pub mod progress;

pub use engine::{
    grant_changes, RegistrationEngine, RegistrationOutcome, COMPLETION_REPLY, SAVE_FAILED_REPLY,
};
pub use progress::{RegistrationProgress, RegistrationState, RegistrationStep, StepResult};
