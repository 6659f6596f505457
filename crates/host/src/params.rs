use buildworld_kernel::WorldKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::generator::GeneratorHandle;

/// Terrain layout requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorldShape {
    Normal,
    Flat,
    Void,
}

/// Dimension the world behaves like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Normal,
    Nether,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    #[default]
    Peaceful,
    Easy,
    Normal,
    Hard,
}

/// Rules applied to every world the manager generates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorldRules {
    pub difficulty: Difficulty,
    /// Time of day in ticks (0 = sunrise, 6000 = noon).
    pub time: i64,
    pub border_size: f64,
    pub game_rules: BTreeMap<String, String>,
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Peaceful,
            time: 6000,
            border_size: 6_000_000.0,
            game_rules: BTreeMap::new(),
        }
    }
}

/// Everything the host needs to instantiate one world.
#[derive(Clone)]
pub struct GenerationParams {
    pub name: String,
    pub shape: WorldShape,
    pub environment: Environment,
    pub structures: bool,
    pub generator: Option<GeneratorHandle>,
    pub rules: WorldRules,
}

/// Generation settings per world kind.
const KIND_PROFILES: [(WorldKind, WorldShape, Environment, bool); 9] = [
    (WorldKind::Normal, WorldShape::Normal, Environment::Normal, true),
    (WorldKind::Flat, WorldShape::Flat, Environment::Normal, false),
    (WorldKind::Nether, WorldShape::Normal, Environment::Nether, true),
    (WorldKind::End, WorldShape::Normal, Environment::End, true),
    (WorldKind::Void, WorldShape::Void, Environment::Normal, false),
    (WorldKind::Custom, WorldShape::Normal, Environment::Normal, true),
    (WorldKind::Template, WorldShape::Normal, Environment::Normal, true),
    (WorldKind::Imported, WorldShape::Normal, Environment::Normal, true),
    (WorldKind::Unknown, WorldShape::Normal, Environment::Normal, true),
];

impl GenerationParams {
    pub fn for_kind(name: impl Into<String>, kind: WorldKind) -> Self {
        let (shape, environment, structures) = KIND_PROFILES
            .iter()
            .find(|(k, ..)| *k == kind)
            .map(|&(_, shape, environment, structures)| (shape, environment, structures))
            .unwrap_or((WorldShape::Normal, Environment::Normal, true));
        Self {
            name: name.into(),
            shape,
            environment,
            structures,
            generator: None,
            rules: WorldRules::default(),
        }
    }

    pub fn with_generator(mut self, generator: Option<GeneratorHandle>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_rules(mut self, rules: WorldRules) -> Self {
        self.rules = rules;
        self
    }
}

impl fmt::Debug for GenerationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationParams")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("environment", &self.environment)
            .field("structures", &self.structures)
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .finish()
    }
}
