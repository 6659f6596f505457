use buildworld_common::{BlockPos, Location, OccupantId};
use std::fmt;
use std::path::Path;

use crate::landing::{Block, BlockView};
use crate::params::GenerationParams;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("world {0:?} is not instantiated")]
    NotInstantiated(String),
    #[error("world {world:?} still has {count} occupant(s)")]
    Occupied { world: String, count: usize },
    #[error("world {0:?} is the primary world")]
    PrimaryWorld(String),
    #[error("unknown occupant {0}")]
    UnknownOccupant(OccupantId),
    #[error("teleport of {0} was cancelled")]
    TeleportCancelled(OccupantId),
    #[error("generation of {0:?} failed")]
    GenerationFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messages delivered to occupants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    WorldDeleted { world: String },
    WorldUnimported { world: String },
    WorldRenamed { from: String, to: String },
    WorldUnloaded { world: String },
    LoadingWorld { world: String },
    ImportStarted { count: usize },
    WorldImported { world: String },
    ImportFailed { world: String, reason: String },
    ImportFinished { imported: usize, failed: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::WorldDeleted { world } => write!(f, "The world \"{world}\" was deleted."),
            Notice::WorldUnimported { world } => {
                write!(f, "The world \"{world}\" was unimported.")
            }
            Notice::WorldRenamed { from, to } => {
                write!(f, "The world \"{from}\" is being renamed to \"{to}\".")
            }
            Notice::WorldUnloaded { world } => write!(f, "The world \"{world}\" was unloaded."),
            Notice::LoadingWorld { world } => write!(f, "Loading world \"{world}\"..."),
            Notice::ImportStarted { count } => write!(f, "Importing {count} world(s)..."),
            Notice::WorldImported { world } => write!(f, "Imported \"{world}\"."),
            Notice::ImportFailed { world, reason } => {
                write!(f, "Could not import \"{world}\": {reason}")
            }
            Notice::ImportFinished { imported, failed } => {
                write!(f, "Import finished: {imported} imported, {failed} failed.")
            }
        }
    }
}

/// The runtime that owns physical worlds and occupants.
///
/// World names passed in are matched case-insensitively. Directories live
/// directly under [`WorldHost::container`], one per world.
pub trait WorldHost {
    fn container(&self) -> &Path;

    /// The default environment. Never unloaded, renamed or deleted.
    fn primary_world(&self) -> &str;

    /// Instantiate a world, creating its directory if missing. A no-op when
    /// the world is already instantiated.
    fn create_world(&mut self, params: &GenerationParams) -> Result<(), HostError>;

    fn is_instantiated(&self, world: &str) -> bool;

    fn save_world(&mut self, world: &str) -> Result<(), HostError>;

    /// Fails with [`HostError::Occupied`] while occupants remain.
    fn unload_world(&mut self, world: &str, save: bool) -> Result<(), HostError>;

    fn spawn_location(&self, world: &str) -> Option<Location>;

    fn set_spawn(&mut self, world: &str, location: Location) -> Result<(), HostError>;

    /// [`Block::Air`] outside instantiated worlds.
    fn block_at(&self, world: &str, pos: BlockPos) -> Block;

    fn set_block(&mut self, world: &str, pos: BlockPos, block: Block) -> Result<(), HostError>;

    /// `(min, max)` with `max` exclusive.
    fn height_range(&self, world: &str) -> Option<(i32, i32)>;

    fn occupants_in(&self, world: &str) -> Vec<OccupantId>;

    fn occupant_world(&self, occupant: OccupantId) -> Option<String>;

    fn occupant_location(&self, occupant: OccupantId) -> Option<Location>;

    fn teleport(
        &mut self,
        occupant: OccupantId,
        world: &str,
        location: Location,
    ) -> Result<(), HostError>;

    fn notify(&mut self, occupant: OccupantId, notice: Notice);
}

/// [`BlockView`] over one instantiated world of a host.
pub struct HostView<'a, H: WorldHost + ?Sized> {
    host: &'a H,
    world: &'a str,
    min: i32,
    max: i32,
}

impl<'a, H: WorldHost + ?Sized> HostView<'a, H> {
    pub fn new(host: &'a H, world: &'a str) -> Option<Self> {
        let (min, max) = host.height_range(world)?;
        Some(Self {
            host,
            world,
            min,
            max,
        })
    }
}

impl<H: WorldHost + ?Sized> BlockView for HostView<'_, H> {
    fn block(&self, pos: BlockPos) -> Block {
        self.host.block_at(self.world, pos)
    }

    fn min_height(&self) -> i32 {
        self.min
    }

    fn max_height(&self) -> i32 {
        self.max
    }
}
