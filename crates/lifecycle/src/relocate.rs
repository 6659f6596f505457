use buildworld_common::{Location, OccupantId};
use buildworld_host::landing::{self, SearchDirection};
use buildworld_host::{HostView, Notice, WorldHost};
use buildworld_kernel::SpawnPoint;

/// Spawn of `world` moved to the centre of its block column.
pub fn centred_spawn<H: WorldHost + ?Sized>(host: &H, world: &str) -> Option<Location> {
    let spawn = host.spawn_location(world)?;
    let mut centred = Location::centred_on(spawn.block());
    centred.position.y = spawn.position.y;
    centred.yaw = spawn.yaw;
    centred.pitch = spawn.pitch;
    Some(centred)
}

/// Moves occupants out of worlds that are going away.
pub struct Relocator<'a, H: WorldHost> {
    host: &'a mut H,
    spawn: Option<&'a SpawnPoint>,
}

impl<'a, H: WorldHost> Relocator<'a, H> {
    pub fn new(host: &'a mut H, spawn: Option<&'a SpawnPoint>) -> Self {
        Self { host, spawn }
    }

    /// Destination for occupants leaving `world`: the global spawn when it
    /// lies in another loaded world, otherwise the top of the primary
    /// world's spawn column.
    pub fn fallback(&self, world: &str) -> (String, Location) {
        if let Some(spawn) = self
            .spawn
            .filter(|s| !s.is_in(world) && self.host.is_instantiated(&s.world))
        {
            return (spawn.world.clone(), spawn.location);
        }
        let primary = self.host.primary_world().to_string();
        let raw = centred_spawn(&*self.host, &primary).unwrap_or_default();
        let location = HostView::new(&*self.host, &primary)
            .and_then(|view| {
                let column = raw.block();
                landing::find_safe_column(&view, column.x, column.z, SearchDirection::Downward)
            })
            .unwrap_or(raw);
        (primary, location)
    }

    /// Relocate every occupant of `world`, then tell each of them why.
    /// Returns the occupants that were moved.
    pub fn evacuate(&mut self, world: &str, notice: &Notice) -> Vec<OccupantId> {
        let occupants = self.host.occupants_in(world);
        if occupants.is_empty() {
            return occupants;
        }
        let (target, location) = self.fallback(world);
        tracing::info!(
            world,
            target = %target,
            count = occupants.len(),
            "evacuating occupants"
        );
        let mut moved = Vec::with_capacity(occupants.len());
        for occupant in occupants {
            match self.host.teleport(occupant, &target, location) {
                Ok(()) => {
                    self.host.notify(occupant, notice.clone());
                    moved.push(occupant);
                }
                Err(e) => tracing::warn!(%occupant, error = %e, "failed to relocate occupant"),
            }
        }
        moved
    }
}
