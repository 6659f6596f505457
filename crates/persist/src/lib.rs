//! Persistence: durable world records keyed by world name.
//!
//! # Invariants
//! - The in-memory registry is authoritative; the store mirrors it.
//! - Writes happen on a background thread and never block the control loop.
//! - Compound values are stored in their legacy string forms
//!   (`x;y;z;yaw;pitch`, `uuid,name;...`, `provider:variant`).

pub mod codec;
mod store;
mod stored;
mod writer;

pub use store::{MemoryRecordStore, PersistError, RecordStore, StoreMeta, YamlRecordStore};
pub use stored::{StoredWorld, WorldsDocument};
pub use writer::PersistWriter;
