use buildworld_common::Location;

use crate::name;

/// The server-wide spawn: where evacuated occupants go when it lies in a
/// world other than the one being evacuated.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPoint {
    pub world: String,
    pub location: Location,
}

impl SpawnPoint {
    pub fn new(world: impl Into<String>, location: Location) -> Self {
        Self {
            world: world.into(),
            location,
        }
    }

    pub fn is_in(&self, world: &str) -> bool {
        name::same_name(&self.world, world)
    }

    /// Same coordinates, different world. Used when the spawn world is renamed.
    pub fn retarget(&self, world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            location: self.location,
        }
    }
}
