//! World Kernel: authoritative world records and the registry that owns them.
//!
//! # Invariants
//! - World names are unique within a registry, compared case-insensitively.
//! - A record's name only changes through [`Registry::rename`].
//! - All registry mutations are recorded in its change log.

pub mod generator;
pub mod name;
pub mod record;
pub mod registry;
pub mod spawn;

pub use generator::{DescriptorError, GeneratorDescriptor};
pub use name::NameError;
pub use record::{LoadedState, Visibility, WorldKind, WorldRecord, WorldStatus, WorldToggles};
pub use registry::{Registry, RegistryError, RegistryEvent};
pub use spawn::SpawnPoint;
