use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Control-loop ticks per wall-clock second.
pub const TICKS_PER_SECOND: u64 = 20;

/// Stable identity of an occupant (and of creators and builders, which are
/// occupants that happen to be offline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccupantId(pub Uuid);

impl OccupantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OccupantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OccupantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An identity paired with the display name it was last seen under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub id: OccupantId,
    pub name: String,
}

impl Profile {
    pub fn new(id: OccupantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Integer block coordinate inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn up(self) -> Self {
        Self::new(self.x, self.y + 1, self.z)
    }

    pub const fn down(self) -> Self {
        Self::new(self.x, self.y - 1, self.z)
    }

    pub const fn with_y(self, y: i32) -> Self {
        Self::new(self.x, y, self.z)
    }
}

/// A precise position plus facing, relative to some world.
///
/// The world itself is not part of the location; callers always carry the
/// world name alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub position: DVec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self {
            position: DVec3::new(x, y, z),
            yaw,
            pitch,
        }
    }

    /// Location standing in the middle of the given block, facing yaw 0.
    pub fn centred_on(pos: BlockPos) -> Self {
        Self::new(
            f64::from(pos.x) + 0.5,
            f64::from(pos.y),
            f64::from(pos.z) + 0.5,
            0.0,
            0.0,
        )
    }

    /// The block containing this location.
    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.position.x.floor() as i32,
            self.position.y.floor() as i32,
            self.position.z.floor() as i32,
        )
    }
}

impl Default for Location {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupant_id_uniqueness() {
        let a = OccupantId::new();
        let b = OccupantId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn centred_location_sits_in_block_middle() {
        let loc = Location::centred_on(BlockPos::new(3, 65, -7));
        assert_eq!(loc.position, DVec3::new(3.5, 65.0, -6.5));
        assert_eq!(loc.block(), BlockPos::new(3, 65, -7));
    }

    #[test]
    fn block_floors_negative_coordinates() {
        let loc = Location::new(-0.2, 10.9, -5.5, 0.0, 0.0);
        assert_eq!(loc.block(), BlockPos::new(-1, 10, -6));
    }

    #[test]
    fn block_pos_neighbours() {
        let p = BlockPos::new(0, 64, 0);
        assert_eq!(p.up(), BlockPos::new(0, 65, 0));
        assert_eq!(p.down(), BlockPos::new(0, 63, 0));
        assert_eq!(p.with_y(0), BlockPos::new(0, 0, 0));
    }
}
