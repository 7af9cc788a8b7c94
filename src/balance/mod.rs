//! Team balancing for lobby rosters

pub mod teams;

pub use teams::{AssignedPlayer, RoleBalancer, Team, TeamBalancer, BLOCK_SIZE, RATING_BUCKET};
