//! Service layer for the PUG lobby service
//!
//! This module contains the main service state, command parsing, reply
//! rendering and background task management.

pub mod app;
pub mod command;
pub mod render;

pub use app::{InboundEvent, PugService};
pub use command::{Command, CommandError, COMMAND_PREFIX};
