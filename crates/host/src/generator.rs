use buildworld_common::BlockPos;
use buildworld_kernel::GeneratorDescriptor;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::landing::Block;

/// Terrain supplied by an extension. Opaque to the lifecycle layer; only
/// the host samples it.
pub trait ChunkGenerator: Send + Sync {
    fn block_at(&self, pos: BlockPos) -> Block;
}

/// An installed extension able to produce chunk generators.
pub trait GeneratorProvider: Send + Sync {
    /// `None` when the provider has no such variant.
    fn generator(&self, variant: &str, world: &str) -> Option<Arc<dyn ChunkGenerator>>;
}

/// A resolved generator, tagged with the descriptor it came from.
#[derive(Clone)]
pub struct GeneratorHandle {
    descriptor: GeneratorDescriptor,
    generator: Arc<dyn ChunkGenerator>,
}

impl GeneratorHandle {
    pub fn new(descriptor: GeneratorDescriptor, generator: Arc<dyn ChunkGenerator>) -> Self {
        Self {
            descriptor,
            generator,
        }
    }

    pub fn descriptor(&self) -> &GeneratorDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.provider
    }

    pub fn block_at(&self, pos: BlockPos) -> Block {
        self.generator.block_at(pos)
    }
}

impl fmt::Debug for GeneratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeneratorHandle({})", self.descriptor)
    }
}

/// Providers by name.
#[derive(Default, Clone)]
pub struct GeneratorResolver {
    providers: BTreeMap<String, Arc<dyn GeneratorProvider>>,
}

impl GeneratorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) a provider.
    pub fn install(&mut self, name: impl Into<String>, provider: Arc<dyn GeneratorProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn resolve(&self, provider: &str, variant: &str, world: &str) -> Option<GeneratorHandle> {
        let Some(installed) = self.providers.get(provider) else {
            tracing::debug!(provider, "generator provider not installed");
            return None;
        };
        let generator = installed.generator(variant, world)?;
        Some(GeneratorHandle::new(
            GeneratorDescriptor::new(provider, variant),
            generator,
        ))
    }

    pub fn resolve_descriptor(
        &self,
        descriptor: &GeneratorDescriptor,
        world: &str,
    ) -> Option<GeneratorHandle> {
        self.resolve(&descriptor.provider, &descriptor.variant, world)
    }
}

impl fmt::Debug for GeneratorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
