use buildworld_host::HostError;
use buildworld_kernel::NameError;
use buildworld_persist::PersistError;
use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors returned by [`crate::WorldManager`] operations.
///
/// Validation errors are raised before any state changes.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("a world named {0:?} already exists")]
    NameTaken(String),
    #[error("no world directory {0:?} with a level file")]
    NotFound(String),
    #[error("template {0:?} does not exist")]
    TemplateNotFound(String),
    #[error("unknown generator {0:?}")]
    UnknownGenerator(String),
    #[error("world name {name:?} contains invalid character {character:?}")]
    InvalidCharacter { name: String, character: char },
    #[error("world name is empty")]
    EmptyName,
    #[error("world is already called {0:?}")]
    SameName(String),
    #[error("world directory {0} is missing")]
    DirectoryMissing(PathBuf),
    #[error("a batch import is already running")]
    AlreadyImporting,
    #[error("world {0:?} is already imported")]
    AlreadyImported(String),
    #[error("unknown world {0:?}")]
    UnknownWorld(String),
    #[error("world {0:?} is not loaded")]
    NotLoaded(String),
    #[error("world {0:?} is the primary world")]
    PrimaryWorld(String),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<NameError> for LifecycleError {
    fn from(e: NameError) -> Self {
        match e {
            NameError::InvalidCharacter { name, character } => {
                LifecycleError::InvalidCharacter { name, character }
            }
            NameError::EmptyName => LifecycleError::EmptyName,
        }
    }
}
