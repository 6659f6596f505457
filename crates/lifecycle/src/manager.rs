use buildworld_common::{BlockPos, Location, OccupantId, Profile};
use buildworld_host::landing::{self, SearchDirection};
use buildworld_host::{
    Block, GenerationParams, GeneratorHandle, GeneratorResolver, HostError, HostView, Notice,
    WorldHost,
};
use buildworld_kernel::{
    GeneratorDescriptor, LoadedState, Registry, RegistryEvent, SpawnPoint, Visibility, WorldKind,
    WorldRecord, name,
};
use buildworld_persist::{PersistWriter, RecordStore};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use crate::clock::{Clock, SystemClock};
use crate::config::ManagerConfig;
use crate::error::LifecycleError;
use crate::fsops;
use crate::relocate::{Relocator, centred_spawn};
use crate::schedule::{Continuation, Scheduler};

/// Block placed under the spawn of new VOID worlds.
const VOID_PLATFORM: BlockPos = BlockPos::new(0, 64, 0);

/// What [`WorldManager::create`] should build.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Free-form; sanitized before use.
    pub name: String,
    pub kind: WorldKind,
    pub private: bool,
    /// Required for [`WorldKind::Custom`].
    pub generator: Option<GeneratorDescriptor>,
    /// Required for [`WorldKind::Template`].
    pub template: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, kind: WorldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            private: false,
            generator: None,
            template: None,
        }
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorDescriptor) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TeleportOutcome {
    Arrived(Location),
    /// The world was loaded on demand; the occupant moves after `ticks`.
    Scheduled { location: Location, ticks: u64 },
}

/// Result of a finished batch import.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub imported: Vec<String>,
    pub failed: Vec<(String, LifecycleError)>,
}

struct ImportBatch {
    pending: VecDeque<String>,
    kind: WorldKind,
    generator: Option<GeneratorDescriptor>,
    creator: Option<Profile>,
    report: BatchReport,
}

/// Owns the world registry and drives every lifecycle transition.
///
/// All entry points run to completion on the caller's thread. Deferred
/// steps are queued as [`Continuation`]s and run by [`WorldManager::tick`].
/// Durable writes go to a background [`PersistWriter`] and are never awaited.
pub struct WorldManager<H: WorldHost> {
    host: H,
    registry: Registry,
    writer: PersistWriter,
    config: ManagerConfig,
    idle_ticks: u64,
    clock: Box<dyn Clock>,
    resolver: GeneratorResolver,
    scheduler: Scheduler<Continuation>,
    spawn: Option<SpawnPoint>,
    batch: Option<ImportBatch>,
    finished_batch: Option<BatchReport>,
    /// Bumped whenever a pending unload check for the world must be ignored.
    unload_generations: BTreeMap<String, u64>,
}

impl<H: WorldHost> WorldManager<H> {
    /// Replay every persisted record and start the background writer.
    ///
    /// With idle unloading disabled every world is instantiated right away.
    pub fn open(
        host: H,
        store: Box<dyn RecordStore>,
        config: ManagerConfig,
        resolver: GeneratorResolver,
    ) -> Result<Self, LifecycleError> {
        let idle_ticks = config.unload.idle_ticks()?;
        let records = store.load_all()?;
        let spawn = store.load_spawn()?;
        let writer = PersistWriter::spawn(store)?;
        let (registry, rejected) = Registry::restore(records);
        if !rejected.is_empty() {
            tracing::warn!(count = rejected.len(), "ignored unusable world records");
        }

        let mut manager = Self {
            host,
            registry,
            writer,
            config,
            idle_ticks,
            clock: Box::new(SystemClock),
            resolver,
            scheduler: Scheduler::new(),
            spawn,
            batch: None,
            finished_batch: None,
            unload_generations: BTreeMap::new(),
        };
        manager.replay();
        Ok(manager)
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn replay(&mut self) {
        let names = self.registry.names();
        tracing::info!(worlds = names.len(), "replaying world records");
        for world in names {
            if self.host.is_instantiated(&world) {
                self.registry.set_loaded(&world, LoadedState::Loaded);
                self.arm_unload(&world);
            } else if !self.config.unload.enabled {
                if let Err(e) = self.instantiate(&world) {
                    tracing::warn!(world = %world, error = %e, "failed to load world at startup");
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Read API
    // ---------------------------------------------------------------------

    /// All records, ordered by case-folded name.
    pub fn list(&self) -> Vec<&WorldRecord> {
        self.registry.iter().collect()
    }

    pub fn find(&self, world: &str) -> Option<&WorldRecord> {
        self.registry.get(world)
    }

    pub fn spawn(&self) -> Option<&SpawnPoint> {
        self.spawn.as_ref()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Current virtual tick.
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn pending(&self) -> impl Iterator<Item = (u64, &Continuation)> {
        self.scheduler.iter()
    }

    pub fn is_importing(&self) -> bool {
        self.batch.is_some()
    }

    /// Report of the last finished batch import, once.
    pub fn take_batch_report(&mut self) -> Option<BatchReport> {
        self.finished_batch.take()
    }

    pub fn is_safe_location(&self, world: &str, location: &Location) -> bool {
        HostView::new(&self.host, world)
            .is_some_and(|view| landing::is_safe_location(&view, location.block()))
    }

    // ---------------------------------------------------------------------
    // Create / import
    // ---------------------------------------------------------------------

    pub fn create(
        &mut self,
        requester: &Profile,
        request: CreateRequest,
    ) -> Result<WorldRecord, LifecycleError> {
        let span = tracing::info_span!("create", world = %request.name, kind = %request.kind);
        let _guard = span.enter();

        let world = name::sanitize(&request.name)?;
        self.ensure_name_free(&world)?;

        let handle = match request.kind {
            WorldKind::Custom => Some(self.resolve(request.generator.as_ref(), &world)?),
            _ => None,
        };
        let template_dir = match request.kind {
            WorldKind::Template => {
                let template = request.template.as_deref().unwrap_or_default();
                let dir = fsops::contained_path(&self.config.templates_dir, template)
                    .filter(|dir| dir.is_dir())
                    .ok_or_else(|| LifecycleError::TemplateNotFound(template.to_string()))?;
                Some(dir)
            }
            _ => None,
        };

        let target = self.world_dir(&world)?;
        if let Some(template) = &template_dir {
            fsops::copy_dir(template, &target, &fsops::COPY_IGNORED)?;
        }
        let params = GenerationParams::for_kind(&world, request.kind)
            .with_generator(handle)
            .with_rules(self.config.world_rules.clone());
        if let Err(e) = self.host.create_world(&params) {
            if template_dir.is_some() {
                if let Err(cleanup) = fsops::remove_dir(&target) {
                    tracing::warn!(error = %cleanup, "failed to remove template copy");
                }
            }
            return Err(e.into());
        }
        self.apply_fixups(&world, request.kind)?;

        let generator = match request.kind {
            WorldKind::Custom => request.generator.clone(),
            _ => None,
        };
        let mut record = WorldRecord::new(
            &world,
            request.kind,
            Some(requester),
            Visibility::from_private(request.private),
            self.clock.now_millis(),
        )
        .with_generator(generator)
        .with_toggles(self.config.default_toggles);
        record.set_builders_restricted(request.private);
        self.register(record)?;
        tracing::info!(world = %world, creator = %requester.name, "world created");

        if self.config.teleport_after_creation && self.host.occupant_world(requester.id).is_some()
        {
            if let Err(e) = self.teleport(requester.id, &world) {
                tracing::warn!(error = %e, "failed to teleport creator into new world");
            }
        }
        self.snapshot(&world)
    }

    /// Take over an existing world directory that is not yet registered.
    pub fn import(
        &mut self,
        world: &str,
        creator: Option<&Profile>,
        kind: WorldKind,
        generator: Option<GeneratorDescriptor>,
    ) -> Result<WorldRecord, LifecycleError> {
        let span = tracing::info_span!("import", world, kind = %kind);
        let _guard = span.enter();

        if self.registry.contains(world) {
            return Err(LifecycleError::AlreadyImported(world.to_string()));
        }
        let dir = self.world_dir(world)?;
        self.ensure_not_nested(world)?;
        if !fsops::has_marker(&dir) {
            return Err(LifecycleError::NotFound(world.to_string()));
        }
        let handle = match (&generator, kind) {
            (Some(descriptor), _) => Some(self.resolve(Some(descriptor), world)?),
            (None, WorldKind::Custom) => return Err(LifecycleError::UnknownGenerator(String::new())),
            (None, _) => None,
        };
        let created_at =
            fsops::directory_created_millis(&dir).unwrap_or_else(|| self.clock.now_millis());

        let params = GenerationParams::for_kind(world, kind)
            .with_generator(handle)
            .with_rules(self.config.world_rules.clone());
        self.host.create_world(&params)?;

        let record = WorldRecord::new(world, kind, creator, Visibility::Public, created_at)
            .with_generator(generator)
            .with_toggles(self.config.default_toggles);
        self.register(record)?;
        tracing::info!("world imported");
        self.snapshot(world)
    }

    /// Import `worlds` one at a time, one every configured interval.
    ///
    /// Failures are collected per world; progress is reported to `creator`
    /// when given. The result is available from
    /// [`WorldManager::take_batch_report`] once the batch has finished.
    pub fn import_all(
        &mut self,
        worlds: Vec<String>,
        kind: WorldKind,
        generator: Option<GeneratorDescriptor>,
        creator: Option<Profile>,
    ) -> Result<(), LifecycleError> {
        if self.batch.is_some() {
            return Err(LifecycleError::AlreadyImporting);
        }
        tracing::info!(count = worlds.len(), "batch import started");
        if let Some(creator) = &creator {
            self.host.notify(
                creator.id,
                Notice::ImportStarted {
                    count: worlds.len(),
                },
            );
        }
        self.finished_batch = None;
        self.batch = Some(ImportBatch {
            pending: worlds.into(),
            kind,
            generator,
            creator,
            report: BatchReport::default(),
        });
        self.scheduler.schedule(0, Continuation::ImportNext);
        Ok(())
    }

    fn import_next(&mut self) {
        let Some(batch) = self.batch.as_mut() else {
            return;
        };
        let Some(world) = batch.pending.pop_front() else {
            self.finish_batch();
            return;
        };
        let (kind, generator, creator) = (batch.kind, batch.generator.clone(), batch.creator.clone());

        let result = self.import(&world, creator.as_ref(), kind, generator);
        if let Some(creator) = &creator {
            let notice = match &result {
                Ok(_) => Notice::WorldImported {
                    world: world.clone(),
                },
                Err(e) => Notice::ImportFailed {
                    world: world.clone(),
                    reason: e.to_string(),
                },
            };
            self.host.notify(creator.id, notice);
        }

        let done = match self.batch.as_mut() {
            Some(batch) => {
                match result {
                    Ok(_) => batch.report.imported.push(world),
                    Err(e) => {
                        tracing::warn!(world = %world, error = %e, "batch import item failed");
                        batch.report.failed.push((world, e));
                    }
                }
                batch.pending.is_empty()
            }
            None => true,
        };
        if done {
            self.finish_batch();
        } else {
            let interval = self.config.import_interval_ticks();
            self.scheduler.schedule(interval, Continuation::ImportNext);
        }
    }

    fn finish_batch(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        let (imported, failed) = (batch.report.imported.len(), batch.report.failed.len());
        tracing::info!(imported, failed, "batch import finished");
        if let Some(creator) = &batch.creator {
            self.host
                .notify(creator.id, Notice::ImportFinished { imported, failed });
        }
        self.finished_batch = Some(batch.report);
    }

    // ---------------------------------------------------------------------
    // Rename / delete / unimport
    // ---------------------------------------------------------------------

    /// Move a world to a new name.
    ///
    /// The old directory is copied before the registry changes; if the copy
    /// fails the old world is reloaded and nothing else changes. Failures
    /// after the registry flip (regeneration) are returned but not undone.
    pub fn rename(&mut self, world: &str, new_name: &str) -> Result<(), LifecycleError> {
        let span = tracing::info_span!("rename", world, new_name);
        let _guard = span.enter();

        let old = self.canonical(world)?;
        if name::same_name(&old, new_name) {
            return Err(LifecycleError::SameName(old));
        }
        name::validate(new_name)?;
        self.ensure_not_primary(&old)?;
        self.ensure_name_free(new_name)?;
        let source = self.world_dir(&old)?;
        let target = self.world_dir(new_name)?;
        if !source.is_dir() {
            return Err(LifecycleError::DirectoryMissing(source));
        }

        let was_loaded = self.host.is_instantiated(&old);
        let old_spawn = centred_spawn(&self.host, &old);
        let evacuees = if was_loaded {
            let notice = Notice::WorldRenamed {
                from: old.clone(),
                to: new_name.to_string(),
            };
            let moved = Relocator::new(&mut self.host, self.spawn.as_ref()).evacuate(&old, &notice);
            self.host.unload_world(&old, true)?;
            self.bump_generation(&old);
            moved
        } else {
            Vec::new()
        };
        self.registry.set_loaded(&old, LoadedState::Unloaded);

        if let Err(e) = fsops::copy_dir(&source, &target, &fsops::COPY_IGNORED) {
            tracing::warn!(error = %e, "copy failed, restoring old world");
            if target.exists() {
                if let Err(cleanup) = fsops::remove_dir(&target) {
                    tracing::warn!(error = %cleanup, "failed to remove partial copy");
                }
            }
            if was_loaded {
                self.return_evacuees(&old, &evacuees, old_spawn);
            }
            return Err(e.into());
        }
        if let Err(e) = fsops::remove_dir(&source) {
            tracing::warn!(error = %e, "old world directory left behind");
        }

        self.registry
            .rename(&old, new_name)
            .map_err(|_| LifecycleError::NameTaken(new_name.to_string()))?;
        let retargeted = self
            .spawn
            .as_ref()
            .filter(|s| s.is_in(&old))
            .map(|s| s.retarget(new_name));
        if retargeted.is_some() {
            self.spawn = retargeted;
            self.writer.save_spawn(self.spawn.as_ref());
        }
        self.sync();

        self.instantiate(new_name)?;
        let home = old_spawn.or_else(|| centred_spawn(&self.host, new_name));
        if let Some(home) = home {
            for occupant in evacuees {
                if let Err(e) = self.host.teleport(occupant, new_name, home) {
                    tracing::warn!(%occupant, error = %e, "failed to return evacuee");
                }
            }
        }
        tracing::info!(from = %old, "world renamed");
        Ok(())
    }

    fn return_evacuees(&mut self, world: &str, evacuees: &[OccupantId], spawn: Option<Location>) {
        if let Err(e) = self.instantiate(world) {
            tracing::warn!(world, error = %e, "failed to reload world");
            return;
        }
        let Some(spawn) = spawn.or_else(|| centred_spawn(&self.host, world)) else {
            return;
        };
        for occupant in evacuees {
            if let Err(e) = self.host.teleport(*occupant, world, spawn) {
                tracing::warn!(%occupant, error = %e, "failed to return evacuee");
            }
        }
    }

    /// Remove a world from the registry, the durable store and disk.
    ///
    /// A missing directory is reported after the record is already gone.
    pub fn delete(
        &mut self,
        requester: Option<OccupantId>,
        world: &str,
    ) -> Result<(), LifecycleError> {
        let span = tracing::info_span!("delete", world, requester = ?requester);
        let _guard = span.enter();

        let world = self.canonical(world)?;
        self.ensure_not_primary(&world)?;
        let dir = self.world_dir(&world)?;

        let notice = Notice::WorldDeleted {
            world: world.clone(),
        };
        let moved = self.detach(&world, &notice, false)?;
        if self.spawn.as_ref().is_some_and(|s| s.is_in(&world)) {
            self.spawn = None;
            self.writer.save_spawn(None);
            tracing::info!("spawn point cleared");
        }

        if !dir.is_dir() {
            return Err(LifecycleError::DirectoryMissing(dir));
        }
        fsops::remove_dir(&dir)?;
        if let Some(requester) = requester.filter(|r| !moved.contains(r)) {
            self.host.notify(requester, notice);
        }
        tracing::info!("world deleted");
        Ok(())
    }

    /// Forget a world but keep its directory.
    pub fn unimport(&mut self, world: &str) -> Result<(), LifecycleError> {
        let span = tracing::info_span!("unimport", world);
        let _guard = span.enter();

        let world = self.canonical(world)?;
        self.ensure_not_primary(&world)?;
        let notice = Notice::WorldUnimported {
            world: world.clone(),
        };
        self.detach(&world, &notice, true)?;
        tracing::info!("world unimported");
        Ok(())
    }

    /// Evacuate and unload, then drop the record. Returns the evacuees.
    ///
    /// When the world cannot be unloaded (an occupant refused to leave) the
    /// error is returned and the record stays registered.
    fn detach(
        &mut self,
        world: &str,
        notice: &Notice,
        save: bool,
    ) -> Result<Vec<OccupantId>, LifecycleError> {
        let moved = if self.host.is_instantiated(world) {
            let moved =
                Relocator::new(&mut self.host, self.spawn.as_ref()).evacuate(world, notice);
            self.host.unload_world(world, save)?;
            moved
        } else {
            Vec::new()
        };
        self.registry.remove(world);
        self.bump_generation(world);
        self.sync();
        Ok(moved)
    }

    // ---------------------------------------------------------------------
    // Movement
    // ---------------------------------------------------------------------

    /// Send an occupant to a world's arrival point, loading the world first
    /// when needed and allowed.
    pub fn teleport(
        &mut self,
        occupant: OccupantId,
        world: &str,
    ) -> Result<TeleportOutcome, LifecycleError> {
        let span = tracing::info_span!("teleport", world, %occupant);
        let _guard = span.enter();

        let record = self
            .registry
            .get(world)
            .ok_or_else(|| LifecycleError::UnknownWorld(world.to_string()))?;
        let (world, kind, custom) = (record.name().to_string(), record.kind(), record.custom_spawn());
        if self.host.occupant_world(occupant).is_none() {
            return Err(HostError::UnknownOccupant(occupant).into());
        }

        let mut loaded_now = false;
        if !self.host.is_instantiated(&world) {
            if !self.config.unload.enabled {
                return Err(LifecycleError::NotLoaded(world));
            }
            self.host.notify(
                occupant,
                Notice::LoadingWorld {
                    world: world.clone(),
                },
            );
            self.instantiate(&world)?;
            loaded_now = true;
        }

        let location = self.arrival(&world, kind, custom);
        self.arm_unload(&world);
        if loaded_now {
            let ticks = self.config.load_warmup_ticks;
            self.scheduler.schedule(
                ticks,
                Continuation::Relocate {
                    occupant,
                    world,
                    location,
                },
            );
            return Ok(TeleportOutcome::Scheduled { location, ticks });
        }
        self.host.teleport(occupant, &world, location)?;
        Ok(TeleportOutcome::Arrived(location))
    }

    /// Custom spawn verbatim; otherwise the centred world spawn, lifted to
    /// the lowest safe spot in NETHER and END worlds.
    fn arrival(&self, world: &str, kind: WorldKind, custom: Option<Location>) -> Location {
        if let Some(custom) = custom {
            return custom;
        }
        let raw = centred_spawn(&self.host, world).unwrap_or_default();
        match kind {
            WorldKind::Nether | WorldKind::End => HostView::new(&self.host, world)
                .and_then(|view| {
                    let column = raw.block();
                    landing::find_safe_column(&view, column.x, column.z, SearchDirection::Upward)
                })
                .unwrap_or(raw),
            _ => raw,
        }
    }

    /// Move an occupant to the highest safe spot above them. `None` when
    /// there is nothing higher to stand on.
    pub fn go_to_top(&mut self, occupant: OccupantId) -> Result<Option<Location>, LifecycleError> {
        let world = self
            .host
            .occupant_world(occupant)
            .ok_or(HostError::UnknownOccupant(occupant))?;
        let current = self
            .host
            .occupant_location(occupant)
            .ok_or(HostError::UnknownOccupant(occupant))?;
        let here = current.block();
        let top = {
            let view = HostView::new(&self.host, &world)
                .ok_or_else(|| LifecycleError::NotLoaded(world.clone()))?;
            landing::find_safe_column(&view, here.x, here.z, SearchDirection::Downward)
                .filter(|loc| loc.block().y > here.y)
        };
        let Some(mut top) = top else {
            return Ok(None);
        };
        top.yaw = current.yaw;
        top.pitch = current.pitch;
        self.host.teleport(occupant, &world, top)?;
        Ok(Some(top))
    }

    // ---------------------------------------------------------------------
    // Load / unload
    // ---------------------------------------------------------------------

    pub fn load(&mut self, world: &str) -> Result<(), LifecycleError> {
        let world = self.canonical(world)?;
        if self.host.is_instantiated(&world) {
            self.registry.set_loaded(&world, LoadedState::Loaded);
            return Ok(());
        }
        self.instantiate(&world)
    }

    /// Evacuate, save and unload a world. Its record stays registered.
    pub fn unload(&mut self, world: &str) -> Result<(), LifecycleError> {
        let world = self.canonical(world)?;
        self.ensure_not_primary(&world)?;
        if self.host.is_instantiated(&world) {
            let notice = Notice::WorldUnloaded {
                world: world.clone(),
            };
            Relocator::new(&mut self.host, self.spawn.as_ref()).evacuate(&world, &notice);
            self.host.unload_world(&world, true)?;
            tracing::info!(world = %world, "world unloaded");
        }
        self.registry.set_loaded(&world, LoadedState::Unloaded);
        self.bump_generation(&world);
        Ok(())
    }

    /// Instantiate a registered world with its kind, generator and the
    /// configured rules.
    fn instantiate(&mut self, world: &str) -> Result<(), LifecycleError> {
        let record = self
            .registry
            .get(world)
            .ok_or_else(|| LifecycleError::UnknownWorld(world.to_string()))?;
        let (world, kind) = (record.name().to_string(), record.kind());
        let handle = record.generator().and_then(|descriptor| {
            let handle = self.resolver.resolve_descriptor(descriptor, &world);
            if handle.is_none() {
                tracing::warn!(world = %world, generator = %descriptor, "generator unavailable, using default terrain");
            }
            handle
        });
        let params = GenerationParams::for_kind(&world, kind)
            .with_generator(handle)
            .with_rules(self.config.world_rules.clone());
        self.host.create_world(&params)?;
        self.registry.set_loaded(&world, LoadedState::Loaded);
        tracing::debug!(world = %world, "world loaded");
        self.arm_unload(&world);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Idle unloading
    // ---------------------------------------------------------------------

    fn may_auto_unload(&self, world: &str) -> bool {
        !name::same_name(world, self.host.primary_world())
            && !self.config.unload.is_blacklisted(world)
            && !self.spawn.as_ref().is_some_and(|s| s.is_in(world))
    }

    fn bump_generation(&mut self, world: &str) -> u64 {
        let generation = self.unload_generations.entry(name::key(world)).or_insert(0);
        *generation += 1;
        *generation
    }

    fn arm_unload(&mut self, world: &str) {
        if !self.config.unload.enabled || !self.may_auto_unload(world) {
            return;
        }
        let generation = self.bump_generation(world);
        self.scheduler.schedule(
            self.idle_ticks,
            Continuation::UnloadCheck {
                world: world.to_string(),
                generation,
            },
        );
    }

    fn unload_check(&mut self, world: &str, generation: u64) {
        if self.unload_generations.get(&name::key(world)) != Some(&generation) {
            return;
        }
        if !self.registry.contains(world)
            || !self.host.is_instantiated(world)
            || !self.may_auto_unload(world)
        {
            return;
        }
        if !self.host.occupants_in(world).is_empty() {
            self.arm_unload(world);
            return;
        }
        tracing::info!(world, "unloading idle world");
        if let Err(e) = self.unload(world) {
            tracing::warn!(world, error = %e, "idle unload failed");
        }
    }

    // ---------------------------------------------------------------------
    // Record editing, spawn, persistence
    // ---------------------------------------------------------------------

    /// Edit a record in place and persist it.
    pub fn modify<R>(
        &mut self,
        world: &str,
        f: impl FnOnce(&mut WorldRecord) -> R,
    ) -> Result<R, LifecycleError> {
        let result = self
            .registry
            .update(world, f)
            .map_err(|_| LifecycleError::UnknownWorld(world.to_string()))?;
        self.sync();
        Ok(result)
    }

    pub fn add_builder(&mut self, world: &str, builder: Profile) -> Result<bool, LifecycleError> {
        self.modify(world, |record| record.add_builder(builder))
    }

    pub fn remove_builder(
        &mut self,
        world: &str,
        builder: OccupantId,
    ) -> Result<Option<Profile>, LifecycleError> {
        self.modify(world, |record| record.remove_builder(builder))
    }

    /// Set the global spawn. The world must be loaded and either registered
    /// or the primary world.
    pub fn set_spawn(&mut self, world: &str, location: Location) -> Result<(), LifecycleError> {
        let world = match self.registry.get(world) {
            Some(record) => record.name().to_string(),
            None if name::same_name(world, self.host.primary_world()) => {
                self.host.primary_world().to_string()
            }
            None => return Err(LifecycleError::UnknownWorld(world.to_string())),
        };
        if !self.host.is_instantiated(&world) {
            return Err(LifecycleError::NotLoaded(world));
        }
        let previous = self.spawn.replace(SpawnPoint::new(&world, location));
        self.writer.save_spawn(self.spawn.as_ref());
        self.bump_generation(&world);
        if let Some(previous) = previous.filter(|p| !p.is_in(&world)) {
            self.rearm_if_loaded(&previous.world);
        }
        tracing::info!(world = %world, "spawn point set");
        Ok(())
    }

    pub fn clear_spawn(&mut self) {
        if let Some(previous) = self.spawn.take() {
            self.writer.save_spawn(None);
            self.rearm_if_loaded(&previous.world);
            tracing::info!(world = %previous.world, "spawn point cleared");
        }
    }

    fn rearm_if_loaded(&mut self, world: &str) {
        if self.registry.contains(world) && self.host.is_instantiated(world) {
            self.arm_unload(world);
        }
    }

    /// Queue every record and the spawn for writing.
    pub fn save_all(&mut self) {
        for record in self.registry.iter() {
            self.writer.save(record);
        }
        self.writer.save_spawn(self.spawn.as_ref());
        tracing::debug!(worlds = self.registry.len(), "queued full save");
    }

    /// Block until every queued durable write has been applied.
    pub fn flush(&self) {
        self.writer.flush();
    }

    // ---------------------------------------------------------------------
    // Ticks
    // ---------------------------------------------------------------------

    /// Advance virtual time by one tick and run what became due.
    pub fn tick(&mut self) {
        for continuation in self.scheduler.tick() {
            self.run(continuation);
        }
    }

    pub fn advance(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn run(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::Relocate {
                occupant,
                world,
                location,
            } => {
                if let Err(e) = self.host.teleport(occupant, &world, location) {
                    tracing::warn!(%occupant, world = %world, error = %e, "deferred teleport failed");
                }
            }
            Continuation::ImportNext => self.import_next(),
            Continuation::UnloadCheck { world, generation } => {
                self.unload_check(&world, generation)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Registered spelling of a world name.
    fn canonical(&self, world: &str) -> Result<String, LifecycleError> {
        self.registry
            .get(world)
            .map(|r| r.name().to_string())
            .ok_or_else(|| LifecycleError::UnknownWorld(world.to_string()))
    }

    fn snapshot(&self, world: &str) -> Result<WorldRecord, LifecycleError> {
        self.registry
            .get(world)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownWorld(world.to_string()))
    }

    fn ensure_not_primary(&self, world: &str) -> Result<(), LifecycleError> {
        if name::same_name(world, self.host.primary_world()) {
            return Err(LifecycleError::PrimaryWorld(world.to_string()));
        }
        Ok(())
    }

    /// Neither a registered world nor an untracked directory may use `world`.
    fn ensure_name_free(&self, world: &str) -> Result<(), LifecycleError> {
        if self.registry.contains(world)
            || fsops::find_dir_ignore_case(self.host.container(), world).is_some()
        {
            return Err(LifecycleError::NameTaken(world.to_string()));
        }
        self.ensure_not_nested(world)
    }

    /// A world directory may neither contain nor sit inside another
    /// registered world's directory.
    fn ensure_not_nested(&self, world: &str) -> Result<(), LifecycleError> {
        let overlaps = self
            .registry
            .iter()
            .any(|r| name::is_nested_in(world, r.name()) || name::is_nested_in(r.name(), world));
        if overlaps {
            return Err(LifecycleError::NameTaken(world.to_string()));
        }
        Ok(())
    }

    /// Directory of `world` inside the host's container.
    fn world_dir(&self, world: &str) -> Result<PathBuf, LifecycleError> {
        name::validate(world)?;
        fsops::contained_path(self.host.container(), world).ok_or_else(|| {
            LifecycleError::InvalidCharacter {
                name: world.to_string(),
                character: '/',
            }
        })
    }

    fn resolve(
        &self,
        descriptor: Option<&GeneratorDescriptor>,
        world: &str,
    ) -> Result<GeneratorHandle, LifecycleError> {
        let descriptor = descriptor.ok_or_else(|| LifecycleError::UnknownGenerator(String::new()))?;
        self.resolver
            .resolve_descriptor(descriptor, world)
            .ok_or_else(|| LifecycleError::UnknownGenerator(descriptor.to_string()))
    }

    fn apply_fixups(&mut self, world: &str, kind: WorldKind) -> Result<(), LifecycleError> {
        match kind {
            WorldKind::Void => {
                if self.config.void_block {
                    self.host.set_block(world, VOID_PLATFORM, Block::Solid)?;
                }
                let spawn = VOID_PLATFORM.up();
                self.host
                    .set_spawn(world, Location::new(0.0, f64::from(spawn.y), 0.0, 0.0, 0.0))?;
            }
            WorldKind::Flat => {
                let y = self.config.runtime.flat_spawn_y();
                self.host
                    .set_spawn(world, Location::new(0.0, f64::from(y), 0.0, 0.0, 0.0))?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Insert a new, instantiated record and persist it.
    fn register(&mut self, record: WorldRecord) -> Result<(), LifecycleError> {
        let world = record.name().to_string();
        self.registry
            .insert(record)
            .map_err(|_| LifecycleError::NameTaken(world.clone()))?;
        self.registry.set_loaded(&world, LoadedState::Loaded);
        self.sync();
        self.arm_unload(&world);
        Ok(())
    }

    /// Turn the registry change log into durable writes.
    fn sync(&mut self) {
        for event in self.registry.drain_events() {
            match event {
                RegistryEvent::Inserted { name } | RegistryEvent::Updated { name } => {
                    if let Some(record) = self.registry.get(&name) {
                        self.writer.save(record);
                    }
                }
                RegistryEvent::Removed { name } => self.writer.delete(&name),
                RegistryEvent::Renamed { from, to } => {
                    self.writer.delete(&from);
                    if let Some(record) = self.registry.get(&to) {
                        self.writer.save(record);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::{RuntimeVersion, UnloadConfig};
    use buildworld_host::{ChunkGenerator, GeneratorProvider, SimulatedHost};
    use buildworld_persist::{MemoryRecordStore, codec};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    struct Layers;

    impl ChunkGenerator for Layers {
        fn block_at(&self, pos: BlockPos) -> Block {
            if pos.y <= 10 { Block::Solid } else { Block::Air }
        }
    }

    struct LayerProvider;

    impl GeneratorProvider for LayerProvider {
        fn generator(&self, variant: &str, _world: &str) -> Option<Arc<dyn ChunkGenerator>> {
            (variant == "low").then(|| Arc::new(Layers) as Arc<dyn ChunkGenerator>)
        }
    }

    struct Fixture {
        tmp: tempfile::TempDir,
        store: MemoryRecordStore,
        manager: WorldManager<SimulatedHost>,
    }

    impl Fixture {
        fn container(&self) -> PathBuf {
            self.tmp.path().join("worlds")
        }

        fn templates(&self) -> PathBuf {
            self.tmp.path().join("templates")
        }

        /// An occupant standing at the primary world spawn.
        fn online(&mut self, name: &str) -> Profile {
            let profile = Profile::new(OccupantId::new(), name);
            self.manager.host_mut().join(profile.id, "world").unwrap();
            profile
        }

        fn persisted(&mut self, world: &str) -> bool {
            self.manager.flush();
            self.store.contains(world)
        }

        /// Reopen on the same container and store, dropping the old manager.
        fn reopen(self, config: ManagerConfig) -> Fixture {
            let Fixture { tmp, store, manager } = self;
            drop(manager);
            let host = SimulatedHost::new(tmp.path().join("worlds")).unwrap();
            let manager =
                WorldManager::open(host, Box::new(store.clone()), config, resolver()).unwrap();
            Fixture {
                tmp,
                store,
                manager,
            }
        }
    }

    fn resolver() -> GeneratorResolver {
        let mut resolver = GeneratorResolver::new();
        resolver.install("Layers", Arc::new(LayerProvider));
        resolver
    }

    fn fixture_with(adjust: impl FnOnce(&mut ManagerConfig)) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ManagerConfig {
            templates_dir: tmp.path().join("templates"),
            ..ManagerConfig::default()
        };
        adjust(&mut config);
        let store = MemoryRecordStore::new();
        let host = SimulatedHost::new(tmp.path().join("worlds")).unwrap();
        let manager = WorldManager::open(host, Box::new(store.clone()), config, resolver())
            .unwrap()
            .with_clock(FixedClock::at_millis(NOW));
        Fixture {
            tmp,
            store,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn offline() -> Profile {
        Profile::new(OccupantId::new(), "Offline")
    }

    fn world_dir(container: &Path, files: &[&str]) {
        std::fs::create_dir_all(container).unwrap();
        for file in files {
            std::fs::write(container.join(file), "data").unwrap();
        }
    }

    fn at(x: f64, y: f64, z: f64) -> Location {
        Location::new(x, y, z, 0.0, 0.0)
    }

    #[test]
    fn void_world_gets_platform_and_spawn_above_it() {
        let mut fx = fixture();
        let alice = fx.online("Alice");

        let record = fx
            .manager
            .create(&alice, CreateRequest::new("Lobby", WorldKind::Void))
            .unwrap();
        assert_eq!(record.kind(), WorldKind::Void);
        assert_eq!(record.creator_name(), "Alice");
        assert_eq!(record.creator_id(), Some(alice.id));
        assert_eq!(record.created_at(), NOW);
        assert_eq!(record.custom_spawn(), None);
        assert!(record.is_loaded());

        let host = fx.manager.host();
        assert_eq!(host.block_at("Lobby", BlockPos::new(0, 64, 0)), Block::Solid);
        assert_eq!(host.spawn_location("Lobby"), Some(at(0.0, 65.0, 0.0)));
        assert_eq!(host.occupant_world(alice.id).as_deref(), Some("Lobby"));
        assert_eq!(host.occupant_location(alice.id), Some(at(0.5, 65.0, 0.5)));
        assert!(fx.persisted("Lobby"));
    }

    #[test]
    fn void_platform_can_be_disabled() {
        let mut fx = fixture_with(|c| c.void_block = false);
        fx.manager
            .create(&offline(), CreateRequest::new("Empty", WorldKind::Void))
            .unwrap();
        let host = fx.manager.host();
        assert_eq!(host.block_at("Empty", BlockPos::new(0, 64, 0)), Block::Air);
        assert_eq!(host.spawn_location("Empty"), Some(at(0.0, 65.0, 0.0)));
    }

    #[test]
    fn flat_spawn_height_follows_runtime() {
        let mut modern = fixture();
        modern
            .manager
            .create(&offline(), CreateRequest::new("Plots", WorldKind::Flat))
            .unwrap();
        assert_eq!(
            modern.manager.host().spawn_location("Plots"),
            Some(at(0.0, -60.0, 0.0))
        );

        let mut legacy = fixture_with(|c| c.runtime = RuntimeVersion::Legacy);
        legacy
            .manager
            .create(&offline(), CreateRequest::new("Plots", WorldKind::Flat))
            .unwrap();
        assert_eq!(
            legacy.manager.host().spawn_location("Plots"),
            Some(at(0.0, 4.0, 0.0))
        );
    }

    #[test]
    fn private_worlds_restrict_builders() {
        let mut fx = fixture();
        let record = fx
            .manager
            .create(
                &offline(),
                CreateRequest::new("Secret", WorldKind::Normal).private(true),
            )
            .unwrap();
        assert_eq!(record.visibility(), Visibility::Private);
        assert!(record.builders_restricted());
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let mut fx = fixture();
        let bob = offline();
        fx.manager
            .create(&bob, CreateRequest::new("Lobby", WorldKind::Normal))
            .unwrap();
        assert!(matches!(
            fx.manager.create(&bob, CreateRequest::new("LOBBY", WorldKind::Flat)),
            Err(LifecycleError::NameTaken(_))
        ));

        world_dir(&fx.container().join("Stray"), &[]);
        assert!(matches!(
            fx.manager.create(&bob, CreateRequest::new("stray", WorldKind::Flat)),
            Err(LifecycleError::NameTaken(_))
        ));
        assert_eq!(fx.manager.list().len(), 1);
    }

    #[test]
    fn creation_sanitizes_names() {
        let mut fx = fixture();
        let record = fx
            .manager
            .create(&offline(), CreateRequest::new(" my world! ", WorldKind::Flat))
            .unwrap();
        assert_eq!(record.name(), "my_world");
        assert!(matches!(
            fx.manager.create(&offline(), CreateRequest::new("!!", WorldKind::Flat)),
            Err(LifecycleError::EmptyName)
        ));
    }

    #[test]
    fn custom_worlds_need_a_resolvable_generator() {
        let mut fx = fixture();
        let carol = offline();
        assert!(matches!(
            fx.manager.create(&carol, CreateRequest::new("Gen", WorldKind::Custom)),
            Err(LifecycleError::UnknownGenerator(_))
        ));
        assert!(matches!(
            fx.manager.create(
                &carol,
                CreateRequest::new("Gen", WorldKind::Custom)
                    .with_generator(GeneratorDescriptor::new("Layers", "high"))
            ),
            Err(LifecycleError::UnknownGenerator(_))
        ));
        assert!(!fx.container().join("Gen").exists());

        let record = fx
            .manager
            .create(
                &carol,
                CreateRequest::new("Gen", WorldKind::Custom)
                    .with_generator(GeneratorDescriptor::new("Layers", "low")),
            )
            .unwrap();
        assert_eq!(
            record.generator(),
            Some(&GeneratorDescriptor::new("Layers", "low"))
        );
        let host = fx.manager.host();
        assert_eq!(host.block_at("Gen", BlockPos::new(5, 10, 5)), Block::Solid);
        assert_eq!(host.block_at("Gen", BlockPos::new(5, 11, 5)), Block::Air);
    }

    #[test]
    fn template_worlds_copy_without_instance_files() {
        let mut fx = fixture();
        let template = fx.templates().join("castle");
        world_dir(&template, &["level.dat", "uid.dat", "keep.txt"]);

        assert!(matches!(
            fx.manager.create(
                &offline(),
                CreateRequest::new("Copy", WorldKind::Template).with_template("moat")
            ),
            Err(LifecycleError::TemplateNotFound(_))
        ));
        assert!(matches!(
            fx.manager.create(
                &offline(),
                CreateRequest::new("Copy", WorldKind::Template).with_template("../worlds")
            ),
            Err(LifecycleError::TemplateNotFound(_))
        ));

        fx.manager
            .create(
                &offline(),
                CreateRequest::new("Copy", WorldKind::Template).with_template("castle"),
            )
            .unwrap();
        let copy = fx.container().join("Copy");
        assert_eq!(std::fs::read_to_string(copy.join("keep.txt")).unwrap(), "data");
        assert_ne!(std::fs::read(copy.join("uid.dat")).unwrap(), b"data");
    }

    #[test]
    fn failed_generation_removes_template_copy() {
        let mut fx = fixture();
        world_dir(&fx.templates().join("castle"), &["level.dat"]);
        fx.manager.host_mut().fail_next_generation("Broken");

        let result = fx.manager.create(
            &offline(),
            CreateRequest::new("Broken", WorldKind::Template).with_template("castle"),
        );
        assert!(matches!(
            result,
            Err(LifecycleError::Host(HostError::GenerationFailed(_)))
        ));
        assert!(!fx.container().join("Broken").exists());
        assert!(fx.manager.find("Broken").is_none());
    }

    #[test]
    fn legacy_import_has_no_known_creator() {
        let mut fx = fixture();
        world_dir(&fx.container().join("Legacy"), &["level.dat"]);

        let record = fx
            .manager
            .import("Legacy", None, WorldKind::Imported, None)
            .unwrap();
        assert_eq!(record.creator_name(), "-");
        assert_eq!(record.creator_id(), None);
        assert_eq!(record.kind(), WorldKind::Imported);
        assert_eq!(record.visibility(), Visibility::Public);
        assert!(fx.manager.host().is_instantiated("Legacy"));
        assert!(fx.persisted("Legacy"));

        assert!(matches!(
            fx.manager.import("legacy", None, WorldKind::Imported, None),
            Err(LifecycleError::AlreadyImported(_))
        ));
    }

    #[test]
    fn import_rejects_bad_names_and_unmarked_directories() {
        let mut fx = fixture();
        world_dir(&fx.container().join("NoLevel"), &["region.dat"]);
        assert!(matches!(
            fx.manager.import("NoLevel", None, WorldKind::Imported, None),
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            fx.manager.import("Missing", None, WorldKind::Imported, None),
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            fx.manager.import("bad.name", None, WorldKind::Imported, None),
            Err(LifecycleError::InvalidCharacter { character: '.', .. })
        ));
        world_dir(&fx.container().join("Gen"), &["level.dat"]);
        assert!(matches!(
            fx.manager.import(
                "Gen",
                None,
                WorldKind::Custom,
                Some(GeneratorDescriptor::new("Nope", "x"))
            ),
            Err(LifecycleError::UnknownGenerator(_))
        ));
        assert!(fx.manager.list().is_empty());
    }

    #[test]
    fn deleting_unknown_world_changes_nothing() {
        let mut fx = fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Keep", WorldKind::Flat))
            .unwrap();
        fx.manager.flush();
        let before = fx.store.snapshot();

        assert!(matches!(
            fx.manager.delete(None, "Ghost"),
            Err(LifecycleError::UnknownWorld(_))
        ));
        fx.manager.flush();
        assert_eq!(fx.store.snapshot(), before);
    }

    #[test]
    fn delete_evacuates_and_removes_everything() {
        let mut fx = fixture_with(|c| c.teleport_after_creation = false);
        let admin = fx.online("Admin");
        let guest = fx.online("Guest");
        fx.manager
            .create(&admin, CreateRequest::new("Doomed", WorldKind::Flat))
            .unwrap();
        fx.manager.teleport(guest.id, "Doomed").unwrap();
        fx.manager.set_spawn("Doomed", at(1.0, -60.0, 1.0)).unwrap();
        fx.manager.host_mut().take_notices(guest.id);

        fx.manager.delete(Some(admin.id), "doomed").unwrap();

        let notice = Notice::WorldDeleted {
            world: "Doomed".into(),
        };
        let host = fx.manager.host();
        assert_eq!(host.occupant_world(guest.id).as_deref(), Some("world"));
        assert_eq!(host.notices(guest.id), &[notice.clone()]);
        assert_eq!(host.notices(admin.id), &[notice]);
        assert!(!host.is_instantiated("Doomed"));
        assert!(!fx.container().join("Doomed").exists());
        assert!(fx.manager.find("Doomed").is_none());
        assert!(fx.manager.spawn().is_none());
        assert!(!fx.persisted("Doomed"));
        assert_eq!(fx.store.snapshot().spawn, None);
    }

    #[test]
    fn delete_reports_missing_directory_after_forgetting_the_record() {
        let mut fx = fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Gone", WorldKind::Flat))
            .unwrap();
        fx.manager.unload("Gone").unwrap();
        std::fs::remove_dir_all(fx.container().join("Gone")).unwrap();

        assert!(matches!(
            fx.manager.delete(None, "Gone"),
            Err(LifecycleError::DirectoryMissing(_))
        ));
        assert!(fx.manager.find("Gone").is_none());
    }

    #[test]
    fn failed_unload_keeps_the_world_registered() {
        let mut fx = fixture_with(|c| c.teleport_after_creation = false);
        let stuck = fx.online("Stuck");
        fx.manager
            .create(&offline(), CreateRequest::new("Doomed", WorldKind::Flat))
            .unwrap();
        fx.manager.teleport(stuck.id, "Doomed").unwrap();
        fx.manager.host_mut().pin(stuck.id);

        assert!(matches!(
            fx.manager.delete(None, "Doomed"),
            Err(LifecycleError::Host(HostError::Occupied { .. }))
        ));
        assert!(fx.manager.find("Doomed").is_some());
        assert!(fx.persisted("Doomed"));
        assert!(fx.container().join("Doomed").is_dir());
        assert_eq!(
            fx.manager.host().occupant_world(stuck.id).as_deref(),
            Some("Doomed")
        );
    }

    #[test]
    fn absolute_names_stay_inside_the_container() {
        let mut fx = fixture();
        let outside = fx.tmp.path().join("outside");
        let request = format!("{}/", outside.display());

        let record = fx
            .manager
            .create(&offline(), CreateRequest::new(request, WorldKind::Flat))
            .unwrap();
        assert!(!record.name().starts_with('/'));
        assert!(fx.container().join(record.name()).is_dir());
        assert!(!outside.exists());

        world_dir(&outside, &["level.dat"]);
        let absolute = outside.display().to_string();
        assert!(matches!(
            fx.manager.import(&absolute, None, WorldKind::Imported, None),
            Err(LifecycleError::InvalidCharacter { .. })
        ));
        assert!(matches!(
            fx.manager.rename(record.name(), "/elsewhere"),
            Err(LifecycleError::InvalidCharacter { character: '/', .. })
        ));
        assert!(matches!(
            fx.manager.delete(None, &absolute),
            Err(LifecycleError::UnknownWorld(_))
        ));
        assert!(outside.join("level.dat").is_file());
        assert_eq!(fx.manager.list().len(), 1);
    }

    #[test]
    fn templates_resolve_inside_the_templates_directory() {
        let mut fx = fixture();
        let stray = fx.tmp.path().join("stray");
        world_dir(&stray, &["level.dat"]);

        for template in [stray.display().to_string(), "/etc".to_string()] {
            assert!(matches!(
                fx.manager.create(
                    &offline(),
                    CreateRequest::new("Copy", WorldKind::Template).with_template(template)
                ),
                Err(LifecycleError::TemplateNotFound(_))
            ));
        }
        assert!(!fx.container().join("Copy").exists());
    }

    #[test]
    fn nested_names_cannot_alias_or_overlap() {
        let mut fx = fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Lobby", WorldKind::Flat))
            .unwrap();
        world_dir(&fx.container().join("Lobby/region"), &["level.dat"]);

        for alias in ["Lobby/", "Lobby//"] {
            assert!(matches!(
                fx.manager.import(alias, None, WorldKind::Imported, None),
                Err(LifecycleError::InvalidCharacter { character: '/', .. })
            ));
            assert!(matches!(
                fx.manager.delete(None, alias),
                Err(LifecycleError::UnknownWorld(_))
            ));
        }
        assert!(matches!(
            fx.manager.import("Lobby/region", None, WorldKind::Imported, None),
            Err(LifecycleError::NameTaken(_))
        ));
        assert!(matches!(
            fx.manager
                .create(&offline(), CreateRequest::new("lobby/inner", WorldKind::Flat)),
            Err(LifecycleError::NameTaken(_))
        ));
        assert_eq!(fx.manager.list().len(), 1);
        assert!(fx.container().join("Lobby").is_dir());

        let nested = fx
            .manager
            .create(&offline(), CreateRequest::new("builds/castle", WorldKind::Flat))
            .unwrap();
        assert_eq!(nested.name(), "builds/castle");
        assert!(fx.container().join("builds").join("castle").is_dir());
        assert!(matches!(
            fx.manager.create(&offline(), CreateRequest::new("builds", WorldKind::Flat)),
            Err(LifecycleError::NameTaken(_))
        ));
    }

    #[test]
    fn primary_world_cannot_be_removed() {
        let mut fx = fixture();
        fx.manager
            .import("world", None, WorldKind::Normal, None)
            .unwrap();
        assert!(matches!(
            fx.manager.delete(None, "world"),
            Err(LifecycleError::PrimaryWorld(_))
        ));
        assert!(matches!(
            fx.manager.unimport("WORLD"),
            Err(LifecycleError::PrimaryWorld(_))
        ));
        assert!(matches!(
            fx.manager.rename("world", "main"),
            Err(LifecycleError::PrimaryWorld(_))
        ));
        assert!(fx.manager.find("world").is_some());
    }

    #[test]
    fn unimport_keeps_the_directory() {
        let mut fx = fixture();
        let dave = fx.online("Dave");
        fx.manager
            .create(&dave, CreateRequest::new("Shelf", WorldKind::Normal))
            .unwrap();

        fx.manager.unimport("Shelf").unwrap();
        assert_eq!(
            fx.manager.host().notices(dave.id).last(),
            Some(&Notice::WorldUnimported {
                world: "Shelf".into()
            })
        );
        assert!(fx.container().join("Shelf").join("level.dat").is_file());
        assert!(!fx.manager.host().is_instantiated("Shelf"));
        assert!(!fx.persisted("Shelf"));

        fx.manager
            .import("Shelf", None, WorldKind::Imported, None)
            .unwrap();
    }

    #[test]
    fn rename_moves_directory_record_and_occupants() {
        let mut fx = fixture();
        let erin = fx.online("Erin");
        fx.manager
            .create(&erin, CreateRequest::new("Old", WorldKind::Flat))
            .unwrap();
        fx.manager
            .modify("Old", |r| r.set_project("castle"))
            .unwrap();

        fx.manager.rename("Old", "New").unwrap();

        let host = fx.manager.host();
        assert_eq!(
            host.notices(erin.id),
            &[Notice::WorldRenamed {
                from: "Old".into(),
                to: "New".into()
            }]
        );
        assert_eq!(host.occupant_world(erin.id).as_deref(), Some("New"));
        assert_eq!(host.occupant_location(erin.id), Some(at(0.5, -60.0, 0.5)));
        assert!(host.is_instantiated("New"));
        assert!(!host.is_instantiated("Old"));
        assert!(!fx.container().join("Old").exists());
        assert!(fx.container().join("New").join("level.dat").is_file());

        let record = fx.manager.find("new").unwrap();
        assert_eq!(record.name(), "New");
        assert_eq!(record.project(), "castle");
        assert!(fx.manager.find("Old").is_none());
        assert!(fx.persisted("New"));
        assert!(!fx.store.contains("Old"));

        fx.manager.rename("New", "Old").unwrap();
        assert_eq!(fx.manager.find("Old").unwrap().creator_name(), "Erin");
    }

    #[test]
    fn rename_validates_before_touching_anything() {
        let mut fx = fixture();
        let frank = offline();
        for world in ["Alpha", "Beta"] {
            fx.manager
                .create(&frank, CreateRequest::new(world, WorldKind::Flat))
                .unwrap();
        }
        assert!(matches!(
            fx.manager.rename("Ghost", "Gamma"),
            Err(LifecycleError::UnknownWorld(_))
        ));
        assert!(matches!(
            fx.manager.rename("Alpha", "alpha"),
            Err(LifecycleError::SameName(_))
        ));
        assert!(matches!(
            fx.manager.rename("Alpha", "BETA"),
            Err(LifecycleError::NameTaken(_))
        ));
        assert!(matches!(
            fx.manager.rename("Alpha", "a b"),
            Err(LifecycleError::InvalidCharacter { character: ' ', .. })
        ));
        assert!(fx.manager.host().is_instantiated("Alpha"));
    }

    #[test]
    fn rename_retargets_the_spawn_point() {
        let mut fx = fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Hub", WorldKind::Void))
            .unwrap();
        let spawn = at(0.5, 65.0, 0.5);
        fx.manager.set_spawn("Hub", spawn).unwrap();

        fx.manager.rename("Hub", "Plaza").unwrap();
        assert_eq!(fx.manager.spawn(), Some(&SpawnPoint::new("Plaza", spawn)));
        fx.manager.flush();
        assert_eq!(fx.store.snapshot().spawn_point(), Some(SpawnPoint::new("Plaza", spawn)));
    }

    #[test]
    fn custom_spawn_is_used_verbatim() {
        let mut fx = fixture_with(|c| c.teleport_after_creation = false);
        let gina = fx.online("Gina");
        fx.manager
            .create(&gina, CreateRequest::new("Plots", WorldKind::Flat))
            .unwrap();
        let custom = codec::decode_location("10;65;10;90;0").unwrap();
        fx.manager
            .modify("Plots", |r| r.set_custom_spawn(Some(custom)))
            .unwrap();

        let outcome = fx.manager.teleport(gina.id, "plots").unwrap();
        assert_eq!(outcome, TeleportOutcome::Arrived(Location::new(10.0, 65.0, 10.0, 90.0, 0.0)));
        assert_eq!(fx.manager.host().occupant_location(gina.id), Some(custom));
    }

    #[test]
    fn nether_arrival_searches_upward_for_a_floor() {
        let mut fx = fixture_with(|c| c.teleport_after_creation = false);
        let hank = fx.online("Hank");
        fx.manager
            .create(&hank, CreateRequest::new("Hell", WorldKind::Nether))
            .unwrap();

        let TeleportOutcome::Arrived(location) = fx.manager.teleport(hank.id, "Hell").unwrap()
        else {
            panic!("world was already loaded");
        };
        assert_eq!(location, at(0.5, 32.0, 0.5));
        assert!(fx.manager.is_safe_location("Hell", &location));
        assert!(!fx.manager.is_safe_location("Hell", &at(0.5, 10.0, 0.5)));
    }

    #[test]
    fn teleport_rejects_unknown_worlds_and_occupants() {
        let mut fx = fixture();
        let ivy = fx.online("Ivy");
        assert!(matches!(
            fx.manager.teleport(ivy.id, "Nowhere"),
            Err(LifecycleError::UnknownWorld(_))
        ));
        fx.manager
            .create(&ivy, CreateRequest::new("Somewhere", WorldKind::Flat))
            .unwrap();
        assert!(matches!(
            fx.manager.teleport(OccupantId::new(), "Somewhere"),
            Err(LifecycleError::Host(HostError::UnknownOccupant(_)))
        ));
    }

    #[test]
    fn unloaded_world_is_loaded_on_demand() {
        let mut fx = fixture_with(|c| c.teleport_after_creation = false);
        let jack = fx.online("Jack");
        fx.manager
            .create(&jack, CreateRequest::new("Far", WorldKind::Flat))
            .unwrap();
        fx.manager.unload("Far").unwrap();
        assert!(!fx.manager.find("Far").unwrap().is_loaded());

        let outcome = fx.manager.teleport(jack.id, "Far").unwrap();
        assert_eq!(
            outcome,
            TeleportOutcome::Scheduled {
                location: at(0.5, -60.0, 0.5),
                ticks: 20
            }
        );
        assert!(fx.manager.host().is_instantiated("Far"));
        assert!(fx.manager.find("Far").unwrap().is_loaded());
        assert_eq!(
            fx.manager.host().notices(jack.id),
            &[Notice::LoadingWorld { world: "Far".into() }]
        );

        fx.manager.advance(19);
        assert_eq!(fx.manager.host().occupant_world(jack.id).as_deref(), Some("world"));
        fx.manager.tick();
        assert_eq!(fx.manager.host().occupant_world(jack.id).as_deref(), Some("Far"));
    }

    #[test]
    fn without_idle_unloading_unloaded_worlds_are_not_loaded_on_demand() {
        let mut fx = fixture_with(|c| {
            c.teleport_after_creation = false;
            c.unload.enabled = false;
        });
        let kim = fx.online("Kim");
        fx.manager
            .create(&kim, CreateRequest::new("Far", WorldKind::Flat))
            .unwrap();
        fx.manager.unload("Far").unwrap();
        assert!(matches!(
            fx.manager.teleport(kim.id, "Far"),
            Err(LifecycleError::NotLoaded(_))
        ));
        assert!(fx.manager.scheduler.is_idle());
    }

    #[test]
    fn go_to_top_keeps_facing_and_only_moves_up() {
        let mut fx = fixture();
        let lee = fx.online("Lee");
        let deep = Location::new(3.2, 10.0, -4.7, 45.0, 10.0);
        fx.manager.host_mut().teleport(lee.id, "world", deep).unwrap();

        let top = fx.manager.go_to_top(lee.id).unwrap().unwrap();
        assert_eq!(top, Location::new(3.5, 64.0, -4.5, 45.0, 10.0));
        assert_eq!(fx.manager.host().occupant_location(lee.id), Some(top));

        assert_eq!(fx.manager.go_to_top(lee.id).unwrap(), None);
    }

    #[test]
    fn batch_import_is_paced_and_collects_failures() {
        let mut fx = fixture();
        let mia = fx.online("Mia");
        for world in ["A", "B"] {
            world_dir(&fx.container().join(world), &["level.dat"]);
        }
        let worlds = vec!["A".to_string(), "Missing".to_string(), "B".to_string()];

        fx.manager
            .import_all(worlds, WorldKind::Imported, None, Some(mia.clone()))
            .unwrap();
        assert!(fx.manager.is_importing());
        assert!(matches!(
            fx.manager.import_all(Vec::new(), WorldKind::Imported, None, None),
            Err(LifecycleError::AlreadyImporting)
        ));

        fx.manager.tick();
        assert!(fx.manager.find("A").is_some());
        fx.manager.advance(599);
        assert_eq!(fx.manager.list().len(), 1);
        fx.manager.tick();
        fx.manager.advance(599);
        assert!(fx.manager.find("B").is_none());
        fx.manager.tick();
        assert!(fx.manager.find("B").is_some());
        assert!(!fx.manager.is_importing());

        let report = fx.manager.take_batch_report().unwrap();
        assert_eq!(report.imported, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Missing");
        assert!(matches!(report.failed[0].1, LifecycleError::NotFound(_)));
        assert!(fx.manager.take_batch_report().is_none());

        let notices = fx.manager.host().notices(mia.id);
        assert_eq!(notices.len(), 5);
        assert_eq!(notices[0], Notice::ImportStarted { count: 3 });
        assert_eq!(notices[1], Notice::WorldImported { world: "A".into() });
        assert!(matches!(&notices[2], Notice::ImportFailed { world, .. } if world == "Missing"));
        assert_eq!(notices[4], Notice::ImportFinished { imported: 2, failed: 1 });
        assert_eq!(fx.manager.find("A").unwrap().creator_name(), "Mia");
    }

    #[test]
    fn empty_batch_finishes_on_first_tick() {
        let mut fx = fixture();
        fx.manager
            .import_all(Vec::new(), WorldKind::Imported, None, None)
            .unwrap();
        fx.manager.tick();
        assert!(!fx.manager.is_importing());
        let report = fx.manager.take_batch_report().unwrap();
        assert!(report.imported.is_empty() && report.failed.is_empty());
    }

    fn idle_fixture() -> Fixture {
        fixture_with(|c| {
            c.teleport_after_creation = false;
            c.unload = UnloadConfig {
                time_until_unload: "00:00:10".into(),
                blacklist: ["Keep".to_string()].into(),
                ..UnloadConfig::default()
            };
        })
    }

    #[test]
    fn idle_worlds_unload_after_the_configured_time() {
        let mut fx = idle_fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Idle", WorldKind::Flat))
            .unwrap();
        fx.manager.advance(199);
        assert!(fx.manager.host().is_instantiated("Idle"));
        fx.manager.tick();
        assert!(!fx.manager.host().is_instantiated("Idle"));
        assert!(!fx.manager.find("Idle").unwrap().is_loaded());
    }

    #[test]
    fn occupied_worlds_are_rechecked_later() {
        let mut fx = idle_fixture();
        let nick = fx.online("Nick");
        fx.manager
            .create(&nick, CreateRequest::new("Busy", WorldKind::Flat))
            .unwrap();
        fx.manager.teleport(nick.id, "Busy").unwrap();

        fx.manager.advance(200);
        assert!(fx.manager.host().is_instantiated("Busy"));
        fx.manager.host_mut().leave(nick.id);
        fx.manager.advance(200);
        assert!(!fx.manager.host().is_instantiated("Busy"));
    }

    #[test]
    fn blacklisted_and_spawn_worlds_stay_loaded() {
        let mut fx = idle_fixture();
        for world in ["Keep", "Home"] {
            fx.manager
                .create(&offline(), CreateRequest::new(world, WorldKind::Flat))
                .unwrap();
        }
        fx.manager.set_spawn("Home", at(0.5, -60.0, 0.5)).unwrap();
        fx.manager.advance(400);
        assert!(fx.manager.host().is_instantiated("Keep"));
        assert!(fx.manager.host().is_instantiated("Home"));

        fx.manager.clear_spawn();
        fx.manager.advance(200);
        assert!(!fx.manager.host().is_instantiated("Home"));
    }

    #[test]
    fn stale_unload_checks_are_ignored() {
        let mut fx = idle_fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Fresh", WorldKind::Flat))
            .unwrap();
        fx.manager.advance(150);
        fx.manager.unload("Fresh").unwrap();
        fx.manager.load("Fresh").unwrap();
        fx.manager.advance(100);
        assert!(fx.manager.host().is_instantiated("Fresh"));
        fx.manager.advance(100);
        assert!(!fx.manager.host().is_instantiated("Fresh"));
    }

    #[test]
    fn spawn_requires_a_loaded_known_world() {
        let mut fx = fixture();
        assert!(matches!(
            fx.manager.set_spawn("Nowhere", Location::default()),
            Err(LifecycleError::UnknownWorld(_))
        ));
        fx.manager
            .create(&offline(), CreateRequest::new("Later", WorldKind::Flat))
            .unwrap();
        fx.manager.unload("Later").unwrap();
        assert!(matches!(
            fx.manager.set_spawn("Later", Location::default()),
            Err(LifecycleError::NotLoaded(_))
        ));
        fx.manager.set_spawn("WORLD", at(0.5, 64.0, 0.5)).unwrap();
        assert_eq!(fx.manager.spawn().unwrap().world, "world");
    }

    #[test]
    fn builders_are_persisted() {
        let mut fx = fixture();
        let owner = offline();
        fx.manager
            .create(&owner, CreateRequest::new("Team", WorldKind::Flat))
            .unwrap();
        let helper = Profile::new(OccupantId::new(), "Helper");

        assert!(fx.manager.add_builder("Team", helper.clone()).unwrap());
        assert!(!fx.manager.add_builder("Team", helper.clone()).unwrap());
        fx.manager.flush();
        let doc = fx.store.snapshot();
        assert!(doc.worlds["Team"].builders.contains("Helper"));

        assert_eq!(
            fx.manager.remove_builder("Team", helper.id).unwrap(),
            Some(helper)
        );
        assert!(matches!(
            fx.manager.add_builder("Ghost", offline()),
            Err(LifecycleError::UnknownWorld(_))
        ));
    }

    #[test]
    fn store_failures_do_not_fail_operations() {
        let mut fx = fixture();
        fx.store.set_read_only(true);
        fx.manager
            .create(&offline(), CreateRequest::new("Volatile", WorldKind::Flat))
            .unwrap();
        assert!(fx.manager.find("Volatile").is_some());
        assert!(!fx.persisted("Volatile"));

        fx.store.set_read_only(false);
        fx.manager.save_all();
        assert!(fx.persisted("Volatile"));
    }

    #[test]
    fn reopening_replays_records_and_spawn() {
        let mut fx = fixture();
        fx.manager
            .create(&offline(), CreateRequest::new("Kept", WorldKind::Void))
            .unwrap();
        fx.manager.set_spawn("Kept", at(0.5, 65.0, 0.5)).unwrap();
        fx.manager.host_mut().save_world("Kept").unwrap();
        fx.manager.flush();

        let fx = fx.reopen(ManagerConfig::default());
        let record = fx.manager.find("kept").unwrap();
        assert_eq!(record.kind(), WorldKind::Void);
        assert!(!record.is_loaded());
        assert!(!fx.manager.host().is_instantiated("Kept"));
        assert_eq!(
            fx.manager.spawn(),
            Some(&SpawnPoint::new("Kept", at(0.5, 65.0, 0.5)))
        );

        let fx = fx.reopen(ManagerConfig {
            unload: UnloadConfig {
                enabled: false,
                ..UnloadConfig::default()
            },
            ..ManagerConfig::default()
        });
        assert!(fx.manager.find("Kept").unwrap().is_loaded());
        let host = fx.manager.host();
        assert!(host.is_instantiated("Kept"));
        assert_eq!(host.spawn_location("Kept"), Some(at(0.0, 65.0, 0.0)));
        assert_eq!(host.block_at("Kept", BlockPos::new(0, 64, 0)), Block::Solid);
    }
}
