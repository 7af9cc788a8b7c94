//! PUG Lobby - pick-up game lobbies for chat communities
//!
//! This crate provides lobby rosters, a registration conversation that
//! collects player profiles, and role- and rating-aware team balancing, all
//! persisted as per-guild JSON documents.

pub mod balance;
pub mod chat;
pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod registration;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyError, Result, StoreError, ValidationError};
pub use types::*;

// Re-export key components
pub use balance::{RoleBalancer, TeamBalancer};
pub use chat::ChatGateway;
pub use lobby::LobbyManager;
pub use registration::RegistrationEngine;
pub use service::PugService;
pub use store::{Document, DocumentStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
