//! World Host: the physical side of world management.
//!
//! The lifecycle manager never touches terrain or occupants directly; it
//! drives a [`WorldHost`]. This crate defines that seam, the generator
//! resolver, the safe-landing search, and [`SimulatedHost`], a
//! filesystem-backed host with synthetic terrain used by tests and the CLI.
//!
//! # Invariants
//! - A world is instantiated at most once; instantiating creates its
//!   directory inside the container if missing.
//! - The host refuses to unload a world that still has occupants.
//! - Safe-landing search visits each height of a column at most once.

mod generator;
mod host;
pub mod landing;
mod params;
mod sim;

pub use generator::{ChunkGenerator, GeneratorHandle, GeneratorProvider, GeneratorResolver};
pub use host::{HostError, HostView, Notice, WorldHost};
pub use landing::{Block, BlockView, SearchDirection};
pub use params::{Difficulty, Environment, GenerationParams, WorldRules, WorldShape};
pub use sim::SimulatedHost;
