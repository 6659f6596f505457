//! World Lifecycle: the manager that creates, imports, renames, deletes,
//! loads, unloads and relocates worlds on top of a [`buildworld_host::WorldHost`].
//!
//! Everything runs on the caller's thread. Work that has to wait (warm-up
//! after an on-demand load, paced batch imports, idle unloading) is queued
//! on a virtual tick [`Scheduler`] and runs from [`WorldManager::tick`].
//!
//! # Invariants
//! - Every registered world has exactly one durable record; the store is
//!   updated asynchronously after each registry change.
//! - No occupant is left inside a world that is unloaded, deleted,
//!   unimported or renamed.
//! - The primary world is never unloaded, deleted, unimported or renamed.
//! - A stale idle-unload check never unloads a world that was touched
//!   after the check was queued.

pub mod clock;
pub mod config;
mod error;
pub mod fsops;
mod manager;
mod relocate;
mod schedule;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, ManagerConfig, RuntimeVersion, UnloadConfig};
pub use error::LifecycleError;
pub use manager::{BatchReport, CreateRequest, TeleportOutcome, WorldManager};
pub use relocate::{Relocator, centred_spawn};
pub use schedule::{Continuation, Scheduler};
