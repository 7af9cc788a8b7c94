//! Metrics for the lobby service
//!
//! Collection only; exposing the registry is left to the embedding process.

pub mod collector;

pub use collector::{LobbyMetrics, MetricsCollector, RegistrationMetrics, StorageMetrics};
