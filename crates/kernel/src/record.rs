use buildworld_common::{Location, OccupantId, Profile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::generator::GeneratorDescriptor;

/// Display name recorded for worlds without a known creator.
pub const UNKNOWN_CREATOR: &str = "-";

/// Permission tag meaning "anyone may enter".
pub const UNRESTRICTED: &str = "-";

/// How a world was (or will be) generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldKind {
    Normal,
    Flat,
    Nether,
    End,
    Void,
    Custom,
    Template,
    Imported,
    Unknown,
}

impl WorldKind {
    pub const ALL: [WorldKind; 9] = [
        Self::Normal,
        Self::Flat,
        Self::Nether,
        Self::End,
        Self::Void,
        Self::Custom,
        Self::Template,
        Self::Imported,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Flat => "FLAT",
            Self::Nether => "NETHER",
            Self::End => "END",
            Self::Void => "VOID",
            Self::Custom => "CUSTOM",
            Self::Template => "TEMPLATE",
            Self::Imported => "IMPORTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for WorldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for strings that name no [`WorldKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown world kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for WorldKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn from_private(private: bool) -> Self {
        if private { Self::Private } else { Self::Public }
    }

    pub fn is_private(self) -> bool {
        self == Self::Private
    }
}

/// Progress marker, ordered from "not started" to "hidden".
///
/// Only used for display and filtering; any transition is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldStatus {
    NotStarted,
    InProgress,
    AlmostFinished,
    Finished,
    Archive,
    Hidden,
}

impl WorldStatus {
    pub const ALL: [WorldStatus; 6] = [
        Self::NotStarted,
        Self::InProgress,
        Self::AlmostFinished,
        Self::Finished,
        Self::Archive,
        Self::Hidden,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::AlmostFinished => "ALMOST_FINISHED",
            Self::Finished => "FINISHED",
            Self::Archive => "ARCHIVE",
            Self::Hidden => "HIDDEN",
        }
    }
}

impl fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for strings that name no [`WorldStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown world status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for WorldStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Whether the physical world is currently instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoadedState {
    Loaded,
    #[default]
    Unloaded,
}

/// Environment rules of a world. Every toggle defaults to permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorldToggles {
    pub physics: bool,
    pub explosions: bool,
    pub mob_ai: bool,
    pub block_breaking: bool,
    pub block_placement: bool,
    pub block_interactions: bool,
}

impl Default for WorldToggles {
    fn default() -> Self {
        Self {
            physics: true,
            explosions: true,
            mob_ai: true,
            block_breaking: true,
            block_placement: true,
            block_interactions: true,
        }
    }
}

/// Metadata of one world.
///
/// The name is read-only here; renaming goes through the registry so that the
/// registry key and the record never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldRecord {
    name: String,
    kind: WorldKind,
    creator_name: String,
    creator_id: Option<OccupantId>,
    visibility: Visibility,
    status: WorldStatus,
    permission: String,
    project: String,
    created_at: i64,
    toggles: WorldToggles,
    builders_restricted: bool,
    builders: Vec<Profile>,
    custom_spawn: Option<Location>,
    generator: Option<GeneratorDescriptor>,
    loaded: LoadedState,
}

impl WorldRecord {
    /// A fresh record with default metadata. `creator = None` records the
    /// world as having no known creator (imports, legacy data).
    pub fn new(
        name: impl Into<String>,
        kind: WorldKind,
        creator: Option<&Profile>,
        visibility: Visibility,
        created_at: i64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            creator_name: creator
                .map(|p| p.name.clone())
                .unwrap_or_else(|| UNKNOWN_CREATOR.to_string()),
            creator_id: creator.map(|p| p.id),
            visibility,
            status: WorldStatus::NotStarted,
            permission: UNRESTRICTED.to_string(),
            project: "-".to_string(),
            created_at,
            toggles: WorldToggles::default(),
            builders_restricted: false,
            builders: Vec::new(),
            custom_spawn: None,
            generator: None,
            loaded: LoadedState::Unloaded,
        }
    }

    pub fn with_generator(mut self, generator: Option<GeneratorDescriptor>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_toggles(mut self, toggles: WorldToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn kind(&self) -> WorldKind {
        self.kind
    }

    pub fn creator_name(&self) -> &str {
        &self.creator_name
    }

    pub fn creator_id(&self) -> Option<OccupantId> {
        self.creator_id
    }

    /// Replace the creator. Legacy records may carry a name without an identity.
    pub fn set_creator(&mut self, name: impl Into<String>, id: Option<OccupantId>) {
        self.creator_name = name.into();
        self.creator_id = id;
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    pub fn status(&self) -> WorldStatus {
        self.status
    }

    pub fn set_status(&mut self, status: WorldStatus) {
        self.status = status;
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    pub fn set_permission(&mut self, permission: impl Into<String>) {
        self.permission = permission.into();
    }

    /// Whether entering requires a permission tag at all.
    pub fn is_restricted(&self) -> bool {
        self.permission != UNRESTRICTED
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn set_project(&mut self, project: impl Into<String>) {
        self.project = project.into();
    }

    /// Creation time in epoch milliseconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn toggles(&self) -> WorldToggles {
        self.toggles
    }

    pub fn toggles_mut(&mut self) -> &mut WorldToggles {
        &mut self.toggles
    }

    pub fn builders_restricted(&self) -> bool {
        self.builders_restricted
    }

    pub fn set_builders_restricted(&mut self, restricted: bool) {
        self.builders_restricted = restricted;
    }

    pub fn builders(&self) -> &[Profile] {
        &self.builders
    }

    /// Grant build access. Returns false if the identity already had it.
    pub fn add_builder(&mut self, builder: Profile) -> bool {
        if self.builders.iter().any(|b| b.id == builder.id) {
            return false;
        }
        self.builders.push(builder);
        true
    }

    pub fn remove_builder(&mut self, id: OccupantId) -> Option<Profile> {
        let index = self.builders.iter().position(|b| b.id == id)?;
        Some(self.builders.remove(index))
    }

    /// The creator counts as a builder even when not listed.
    pub fn is_builder(&self, id: OccupantId) -> bool {
        self.creator_id == Some(id) || self.builders.iter().any(|b| b.id == id)
    }

    pub fn is_creator(&self, id: OccupantId) -> bool {
        self.creator_id == Some(id)
    }

    /// Whether the identity may modify the world under the current builder rules.
    pub fn may_build(&self, id: OccupantId) -> bool {
        !self.builders_restricted || self.is_builder(id)
    }

    pub fn custom_spawn(&self) -> Option<Location> {
        self.custom_spawn
    }

    pub fn set_custom_spawn(&mut self, spawn: Option<Location>) {
        self.custom_spawn = spawn;
    }

    pub fn generator(&self) -> Option<&GeneratorDescriptor> {
        self.generator.as_ref()
    }

    pub fn loaded(&self) -> LoadedState {
        self.loaded
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded == LoadedState::Loaded
    }

    pub(crate) fn set_loaded(&mut self, loaded: LoadedState) {
        self.loaded = loaded;
    }
}
