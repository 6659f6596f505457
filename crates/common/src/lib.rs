//! Shared types used across the buildworld crates.

mod types;

pub use types::{BlockPos, Location, OccupantId, Profile, TICKS_PER_SECOND};
