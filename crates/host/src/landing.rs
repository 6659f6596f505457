//! Safe-landing search: vertical scans for a spot an occupant can stand on.

use buildworld_common::{BlockPos, Location};
use serde::{Deserialize, Serialize};

/// The only block distinctions the lifecycle layer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Block {
    #[default]
    Air,
    Solid,
    /// Non-solid but not empty (grass, flowers, signs).
    Passable,
    Liquid,
}

impl Block {
    pub fn is_solid(self) -> bool {
        matches!(self, Block::Solid)
    }

    pub fn is_passable(self) -> bool {
        matches!(self, Block::Air | Block::Passable)
    }
}

/// Read access to one world's blocks.
pub trait BlockView {
    fn block(&self, pos: BlockPos) -> Block;
    /// Lowest valid y.
    fn min_height(&self) -> i32;
    /// One above the highest valid y.
    fn max_height(&self) -> i32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    /// From the bottom of the world upwards (arrival in NETHER/END worlds).
    Upward,
    /// From the top of the world downwards ("go to top").
    Downward,
}

/// `feet` is safe when it and the block above are passable and the block
/// below is solid.
pub fn is_safe_location(view: &impl BlockView, feet: BlockPos) -> bool {
    view.block(feet).is_passable()
        && view.block(feet.up()).is_passable()
        && view.block(feet.down()).is_solid()
}

/// First safe standing spot in column `(x, z)` in scan order, centred on the
/// block. `None` means the caller falls back to the raw spawn.
pub fn find_safe_column(
    view: &impl BlockView,
    x: i32,
    z: i32,
    direction: SearchDirection,
) -> Option<Location> {
    let (min, max) = (view.min_height(), view.max_height());
    if min >= max {
        return None;
    }
    let column = BlockPos::new(x, min, z);
    let found = match direction {
        SearchDirection::Upward => (min..max).find(|&y| is_safe_location(view, column.with_y(y))),
        SearchDirection::Downward => (min..max)
            .rev()
            .find(|&y| is_safe_location(view, column.with_y(y))),
    };
    found.map(|y| Location::centred_on(column.with_y(y)))
}
