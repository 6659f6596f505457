use buildworld_common::{BlockPos, Location, OccupantId};
use buildworld_kernel::name;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use crate::host::{HostError, Notice, WorldHost};
use crate::landing::Block;
use crate::params::{Environment, GenerationParams, WorldShape};

const OVERWORLD_HEIGHT: (i32, i32) = (-64, 320);
const NETHER_HEIGHT: (i32, i32) = (0, 256);
const END_HEIGHT: (i32, i32) = (0, 256);

/// Highest solid layer of a flat world.
const FLAT_SURFACE: i32 = -61;
/// Highest solid layer of normal terrain.
const NORMAL_SURFACE: i32 = 63;
const NETHER_FLOOR: i32 = 31;
const NETHER_CEILING: i32 = 120;
const END_ISLAND_TOP: i32 = 48;
const END_ISLAND_RADIUS: i32 = 64;

struct SimWorld {
    name: String,
    params: GenerationParams,
    spawn: Location,
    edits: BTreeMap<BlockPos, Block>,
    saves: usize,
}

impl SimWorld {
    fn height_range(&self) -> (i32, i32) {
        match self.params.environment {
            Environment::Normal => OVERWORLD_HEIGHT,
            Environment::Nether => NETHER_HEIGHT,
            Environment::End => END_HEIGHT,
        }
    }

    fn block(&self, pos: BlockPos) -> Block {
        let (min, max) = self.height_range();
        if pos.y < min || pos.y >= max {
            return Block::Air;
        }
        if let Some(block) = self.edits.get(&pos) {
            return *block;
        }
        if let Some(generator) = &self.params.generator {
            return generator.block_at(pos);
        }
        let solid = match (self.params.environment, self.params.shape) {
            (Environment::Nether, _) => pos.y <= NETHER_FLOOR || pos.y >= NETHER_CEILING,
            (Environment::End, _) => {
                pos.y <= END_ISLAND_TOP
                    && pos.x.abs() <= END_ISLAND_RADIUS
                    && pos.z.abs() <= END_ISLAND_RADIUS
            }
            (Environment::Normal, WorldShape::Void) => false,
            (Environment::Normal, WorldShape::Flat) => pos.y <= FLAT_SURFACE,
            (Environment::Normal, WorldShape::Normal) => pos.y <= NORMAL_SURFACE,
        };
        if solid { Block::Solid } else { Block::Air }
    }
}

fn default_spawn(params: &GenerationParams) -> Location {
    let y = match params.shape {
        WorldShape::Flat => FLAT_SURFACE + 1,
        WorldShape::Normal | WorldShape::Void => NORMAL_SURFACE + 1,
    };
    Location::new(0.0, f64::from(y), 0.0, 0.0, 0.0)
}

const LEVEL_FILE: &str = "level.dat";

/// `spawn=x y z yaw pitch` and `block=x y z kind` lines; anything else is
/// ignored.
fn parse_level(text: &str) -> (Option<Location>, BTreeMap<BlockPos, Block>) {
    let mut spawn = None;
    let mut edits = BTreeMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let fields: Vec<&str> = value.split_whitespace().collect();
        match (key, fields.as_slice()) {
            ("spawn", [x, y, z, yaw, pitch]) => {
                if let (Ok(x), Ok(y), Ok(z), Ok(yaw), Ok(pitch)) =
                    (x.parse(), y.parse(), z.parse(), yaw.parse(), pitch.parse())
                {
                    spawn = Some(Location::new(x, y, z, yaw, pitch));
                }
            }
            ("block", [x, y, z, kind]) => {
                let block = match *kind {
                    "solid" => Block::Solid,
                    "passable" => Block::Passable,
                    "liquid" => Block::Liquid,
                    "air" => Block::Air,
                    _ => continue,
                };
                if let (Ok(x), Ok(y), Ok(z)) = (x.parse(), y.parse(), z.parse()) {
                    edits.insert(BlockPos::new(x, y, z), block);
                }
            }
            _ => {}
        }
    }
    (spawn, edits)
}

fn render_level(world: &SimWorld) -> String {
    let s = &world.spawn;
    let mut text = format!(
        "name={}\nspawn={} {} {} {} {}\n",
        world.name, s.position.x, s.position.y, s.position.z, s.yaw, s.pitch
    );
    for (pos, block) in &world.edits {
        let kind = match block {
            Block::Air => "air",
            Block::Solid => "solid",
            Block::Passable => "passable",
            Block::Liquid => "liquid",
        };
        text.push_str(&format!("block={} {} {} {kind}\n", pos.x, pos.y, pos.z));
    }
    text
}

struct SimOccupant {
    world: String,
    location: Location,
    inbox: Vec<Notice>,
}

/// In-process host with synthetic terrain and real world directories.
///
/// Instantiating a world writes `level.dat`, `uid.dat` and `session.lock`
/// into its directory, the same files a real server leaves behind. Saving
/// writes the spawn and every edited block into `level.dat`, so a copied
/// directory comes back with the same spawn and edits.
pub struct SimulatedHost {
    container: PathBuf,
    primary: String,
    worlds: BTreeMap<String, SimWorld>,
    occupants: BTreeMap<OccupantId, SimOccupant>,
    failing: BTreeSet<String>,
    pinned: BTreeSet<OccupantId>,
    next_uid: u64,
}

impl SimulatedHost {
    /// A host whose primary world is called `world`.
    pub fn new(container: impl Into<PathBuf>) -> Result<Self, HostError> {
        Self::with_primary(container, "world")
    }

    pub fn with_primary(
        container: impl Into<PathBuf>,
        primary: impl Into<String>,
    ) -> Result<Self, HostError> {
        let container = container.into();
        std::fs::create_dir_all(&container)?;
        let primary = primary.into();
        let mut host = Self {
            container,
            primary: primary.clone(),
            worlds: BTreeMap::new(),
            occupants: BTreeMap::new(),
            failing: BTreeSet::new(),
            pinned: BTreeSet::new(),
            next_uid: 1,
        };
        host.create_world(&GenerationParams::for_kind(
            primary,
            buildworld_kernel::WorldKind::Normal,
        ))?;
        Ok(host)
    }

    /// Place a new occupant at the spawn of `world`.
    pub fn join(&mut self, occupant: OccupantId, world: &str) -> Result<(), HostError> {
        let spawn = self
            .spawn_location(world)
            .ok_or_else(|| HostError::NotInstantiated(world.to_string()))?;
        self.occupants.insert(
            occupant,
            SimOccupant {
                world: name::key(world),
                location: spawn,
                inbox: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn leave(&mut self, occupant: OccupantId) -> bool {
        self.occupants.remove(&occupant).is_some()
    }

    pub fn notices(&self, occupant: OccupantId) -> &[Notice] {
        self.occupants
            .get(&occupant)
            .map(|o| o.inbox.as_slice())
            .unwrap_or_default()
    }

    pub fn take_notices(&mut self, occupant: OccupantId) -> Vec<Notice> {
        self.occupants
            .get_mut(&occupant)
            .map(|o| std::mem::take(&mut o.inbox))
            .unwrap_or_default()
    }

    pub fn save_count(&self, world: &str) -> usize {
        self.worlds.get(&name::key(world)).map_or(0, |w| w.saves)
    }

    /// Parameters the world was last instantiated with.
    pub fn generation(&self, world: &str) -> Option<&GenerationParams> {
        self.worlds.get(&name::key(world)).map(|w| &w.params)
    }

    /// Make the next instantiation of `world` fail.
    pub fn fail_next_generation(&mut self, world: &str) {
        self.failing.insert(name::key(world));
    }

    /// Make every later teleport of `occupant` fail, as a cancelled move would.
    pub fn pin(&mut self, occupant: OccupantId) {
        self.pinned.insert(occupant);
    }

    pub fn world_dir(&self, world: &str) -> PathBuf {
        self.container.join(world)
    }

    fn world(&self, world: &str) -> Result<&SimWorld, HostError> {
        self.worlds
            .get(&name::key(world))
            .ok_or_else(|| HostError::NotInstantiated(world.to_string()))
    }

    fn world_mut(&mut self, world: &str) -> Result<&mut SimWorld, HostError> {
        self.worlds
            .get_mut(&name::key(world))
            .ok_or_else(|| HostError::NotInstantiated(world.to_string()))
    }

    fn write_world_files(&mut self, dir: &Path, world: &str) -> Result<(), HostError> {
        std::fs::create_dir_all(dir)?;
        let level = dir.join(LEVEL_FILE);
        if !level.exists() {
            std::fs::write(&level, format!("name={world}\n"))?;
        }
        std::fs::write(dir.join("uid.dat"), self.next_uid.to_le_bytes())?;
        self.next_uid += 1;
        std::fs::write(dir.join("session.lock"), b"locked")?;
        Ok(())
    }
}

impl WorldHost for SimulatedHost {
    fn container(&self) -> &Path {
        &self.container
    }

    fn primary_world(&self) -> &str {
        &self.primary
    }

    fn create_world(&mut self, params: &GenerationParams) -> Result<(), HostError> {
        let key = name::key(&params.name);
        if self.worlds.contains_key(&key) {
            return Ok(());
        }
        if self.failing.remove(&key) {
            return Err(HostError::GenerationFailed(params.name.clone()));
        }
        let relative = Path::new(&params.name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !relative {
            return Err(HostError::GenerationFailed(params.name.clone()));
        }
        let dir = self.container.join(&params.name);
        self.write_world_files(&dir, &params.name)?;
        let level = std::fs::read_to_string(dir.join(LEVEL_FILE))?;
        let (spawn, edits) = parse_level(&level);
        tracing::debug!(world = %params.name, ?params, edits = edits.len(), "instantiated world");
        self.worlds.insert(
            key,
            SimWorld {
                name: params.name.clone(),
                params: params.clone(),
                spawn: spawn.unwrap_or_else(|| default_spawn(params)),
                edits,
                saves: 0,
            },
        );
        Ok(())
    }

    fn is_instantiated(&self, world: &str) -> bool {
        self.worlds.contains_key(&name::key(world))
    }

    fn save_world(&mut self, world: &str) -> Result<(), HostError> {
        let sim = self
            .worlds
            .get_mut(&name::key(world))
            .ok_or_else(|| HostError::NotInstantiated(world.to_string()))?;
        sim.saves += 1;
        let text = render_level(sim);
        let path = self.container.join(&sim.name).join(LEVEL_FILE);
        std::fs::write(path, text)?;
        Ok(())
    }

    fn unload_world(&mut self, world: &str, save: bool) -> Result<(), HostError> {
        if name::same_name(world, &self.primary) {
            return Err(HostError::PrimaryWorld(world.to_string()));
        }
        let key = name::key(world);
        let dir = {
            let sim = self.world(world)?;
            self.container.join(&sim.name)
        };
        let count = self.occupants.values().filter(|o| o.world == key).count();
        if count > 0 {
            return Err(HostError::Occupied {
                world: world.to_string(),
                count,
            });
        }
        if save {
            self.save_world(world)?;
        }
        self.worlds.remove(&key);
        let lock = dir.join("session.lock");
        if lock.exists() {
            std::fs::remove_file(lock)?;
        }
        Ok(())
    }

    fn spawn_location(&self, world: &str) -> Option<Location> {
        self.worlds.get(&name::key(world)).map(|w| w.spawn)
    }

    fn set_spawn(&mut self, world: &str, location: Location) -> Result<(), HostError> {
        self.world_mut(world)?.spawn = location;
        Ok(())
    }

    fn block_at(&self, world: &str, pos: BlockPos) -> Block {
        self.worlds
            .get(&name::key(world))
            .map_or(Block::Air, |w| w.block(pos))
    }

    fn set_block(&mut self, world: &str, pos: BlockPos, block: Block) -> Result<(), HostError> {
        self.world_mut(world)?.edits.insert(pos, block);
        Ok(())
    }

    fn height_range(&self, world: &str) -> Option<(i32, i32)> {
        self.worlds.get(&name::key(world)).map(SimWorld::height_range)
    }

    fn occupants_in(&self, world: &str) -> Vec<OccupantId> {
        let key = name::key(world);
        self.occupants
            .iter()
            .filter(|(_, o)| o.world == key)
            .map(|(id, _)| *id)
            .collect()
    }

    fn occupant_world(&self, occupant: OccupantId) -> Option<String> {
        let occ = self.occupants.get(&occupant)?;
        self.worlds.get(&occ.world).map(|w| w.name.clone())
    }

    fn occupant_location(&self, occupant: OccupantId) -> Option<Location> {
        self.occupants.get(&occupant).map(|o| o.location)
    }

    fn teleport(
        &mut self,
        occupant: OccupantId,
        world: &str,
        location: Location,
    ) -> Result<(), HostError> {
        let key = name::key(world);
        if !self.worlds.contains_key(&key) {
            return Err(HostError::NotInstantiated(world.to_string()));
        }
        if self.pinned.contains(&occupant) {
            return Err(HostError::TeleportCancelled(occupant));
        }
        let occ = self
            .occupants
            .get_mut(&occupant)
            .ok_or(HostError::UnknownOccupant(occupant))?;
        occ.world = key;
        occ.location = location;
        Ok(())
    }

    fn notify(&mut self, occupant: OccupantId, notice: Notice) {
        match self.occupants.get_mut(&occupant) {
            Some(occ) => occ.inbox.push(notice),
            None => tracing::debug!(%occupant, %notice, "notice for absent occupant dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostView;
    use crate::landing::{SearchDirection, find_safe_column};
    use buildworld_kernel::WorldKind;

    fn host() -> (tempfile::TempDir, SimulatedHost) {
        let tmp = tempfile::tempdir().unwrap();
        let host = SimulatedHost::new(tmp.path().join("worlds")).unwrap();
        (tmp, host)
    }

    #[test]
    fn primary_world_exists_on_start() {
        let (_tmp, host) = host();
        assert!(host.is_instantiated("WORLD"));
        assert!(host.world_dir("world").join("level.dat").is_file());
    }

    #[test]
    fn create_writes_world_files() {
        let (_tmp, mut host) = host();
        host.create_world(&GenerationParams::for_kind("flat1", WorldKind::Flat))
            .unwrap();
        let dir = host.world_dir("flat1");
        for file in ["level.dat", "uid.dat", "session.lock"] {
            assert!(dir.join(file).is_file(), "{file}");
        }
        assert_eq!(
            host.spawn_location("flat1"),
            Some(Location::new(0.0, -60.0, 0.0, 0.0, 0.0))
        );
    }

    #[test]
    fn worlds_outside_the_container_are_refused() {
        let (tmp, mut host) = host();
        let outside = tmp.path().join("outside");
        let params = GenerationParams::for_kind(outside.to_string_lossy(), WorldKind::Void);
        assert!(matches!(
            host.create_world(&params),
            Err(HostError::GenerationFailed(_))
        ));
        assert!(!outside.exists());
    }

    #[test]
    fn pinned_occupants_cannot_be_moved() {
        let (_tmp, mut host) = host();
        let occ = OccupantId::new();
        host.join(occ, "world").unwrap();
        host.pin(occ);
        assert!(matches!(
            host.teleport(occ, "world", Location::default()),
            Err(HostError::TeleportCancelled(_))
        ));
    }

    #[test]
    fn unload_refuses_occupied_and_primary_worlds() {
        let (_tmp, mut host) = host();
        host.create_world(&GenerationParams::for_kind("busy", WorldKind::Normal))
            .unwrap();
        let occ = OccupantId::new();
        host.join(occ, "busy").unwrap();
        assert!(matches!(
            host.unload_world("busy", true),
            Err(HostError::Occupied { count: 1, .. })
        ));
        assert!(matches!(
            host.unload_world("world", false),
            Err(HostError::PrimaryWorld(_))
        ));

        host.leave(occ);
        host.unload_world("busy", true).unwrap();
        assert!(!host.is_instantiated("busy"));
        assert!(!host.world_dir("busy").join("session.lock").exists());
    }

    #[test]
    fn nether_terrain_has_a_cave_floor() {
        let (_tmp, mut host) = host();
        host.create_world(&GenerationParams::for_kind("hell", WorldKind::Nether))
            .unwrap();
        let view = HostView::new(&host, "hell").unwrap();
        let loc = find_safe_column(&view, 0, 0, SearchDirection::Upward).unwrap();
        assert_eq!(loc.block(), BlockPos::new(0, NETHER_FLOOR + 1, 0));
    }

    #[test]
    fn void_world_is_empty_until_edited() {
        let (_tmp, mut host) = host();
        host.create_world(&GenerationParams::for_kind("v", WorldKind::Void))
            .unwrap();
        assert_eq!(host.block_at("v", BlockPos::new(0, 64, 0)), Block::Air);
        host.set_block("v", BlockPos::new(0, 64, 0), Block::Solid)
            .unwrap();
        assert_eq!(host.block_at("v", BlockPos::new(0, 64, 0)), Block::Solid);
    }

    #[test]
    fn saved_spawn_and_edits_survive_a_directory_copy() {
        let (_tmp, mut host) = host();
        host.create_world(&GenerationParams::for_kind("src", WorldKind::Void))
            .unwrap();
        host.set_block("src", BlockPos::new(0, 64, 0), Block::Solid)
            .unwrap();
        host.set_spawn("src", Location::new(0.0, 65.0, 0.0, 0.0, 0.0))
            .unwrap();
        host.unload_world("src", true).unwrap();

        let from = host.world_dir("src");
        let to = host.world_dir("dst");
        std::fs::create_dir_all(&to).unwrap();
        std::fs::copy(from.join("level.dat"), to.join("level.dat")).unwrap();

        host.create_world(&GenerationParams::for_kind("dst", WorldKind::Void))
            .unwrap();
        assert_eq!(
            host.spawn_location("dst"),
            Some(Location::new(0.0, 65.0, 0.0, 0.0, 0.0))
        );
        assert_eq!(host.block_at("dst", BlockPos::new(0, 64, 0)), Block::Solid);
    }

    #[test]
    fn injected_generation_failure_fires_once() {
        let (_tmp, mut host) = host();
        host.fail_next_generation("flaky");
        let params = GenerationParams::for_kind("flaky", WorldKind::Normal);
        assert!(matches!(
            host.create_world(&params),
            Err(HostError::GenerationFailed(_))
        ));
        host.create_world(&params).unwrap();
    }

    #[test]
    fn notices_collect_per_occupant() {
        let (_tmp, mut host) = host();
        let occ = OccupantId::new();
        host.join(occ, "world").unwrap();
        host.notify(
            occ,
            Notice::WorldUnloaded {
                world: "x".into(),
            },
        );
        assert_eq!(host.notices(occ).len(), 1);
        assert_eq!(host.take_notices(occ).len(), 1);
        assert!(host.notices(occ).is_empty());
    }
}
