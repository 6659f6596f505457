use buildworld_kernel::record::UNKNOWN_CREATOR;
use buildworld_kernel::{
    GeneratorDescriptor, SpawnPoint, Visibility, WorldKind, WorldRecord, WorldStatus, WorldToggles,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec;

/// Kind name written by older releases for private flat worlds.
const LEGACY_PRIVATE_KIND: &str = "PRIVATE";

/// On-disk form of one world record, keyed by world name in
/// [`WorldsDocument::worlds`]. Missing fields fall back to the same defaults
/// a freshly created world would get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoredWorld {
    #[serde(default = "unknown_creator")]
    pub creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "dash")]
    pub project: String,
    #[serde(default = "dash")]
    pub permission: String,
    #[serde(default = "unknown_date")]
    pub date: i64,
    #[serde(default = "enabled")]
    pub physics: bool,
    #[serde(default = "enabled")]
    pub explosions: bool,
    #[serde(rename = "mobai", default = "enabled")]
    pub mob_ai: bool,
    #[serde(default = "enabled")]
    pub block_breaking: bool,
    #[serde(default = "enabled")]
    pub block_placement: bool,
    #[serde(default = "enabled")]
    pub block_interactions: bool,
    #[serde(default)]
    pub builders_enabled: bool,
    #[serde(default)]
    pub builders: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_generator: Option<String>,
}

fn unknown_creator() -> String {
    UNKNOWN_CREATOR.to_string()
}

fn dash() -> String {
    "-".to_string()
}

fn unknown_date() -> i64 {
    -1
}

fn enabled() -> bool {
    true
}

impl StoredWorld {
    pub fn from_record(record: &WorldRecord) -> Self {
        let toggles = record.toggles();
        Self {
            creator: record.creator_name().to_string(),
            creator_id: record.creator_id().map(|id| id.to_string()),
            kind: Some(record.kind().as_str().to_string()),
            private: record.visibility().is_private(),
            status: Some(record.status().as_str().to_string()),
            project: record.project().to_string(),
            permission: record.permission().to_string(),
            date: record.created_at(),
            physics: toggles.physics,
            explosions: toggles.explosions,
            mob_ai: toggles.mob_ai,
            block_breaking: toggles.block_breaking,
            block_placement: toggles.block_placement,
            block_interactions: toggles.block_interactions,
            builders_enabled: record.builders_restricted(),
            builders: codec::encode_builders(record.builders()),
            spawn: record.custom_spawn().as_ref().map(codec::encode_location),
            chunk_generator: record.generator().map(|g| g.to_string()),
        }
    }

    /// Rebuild the record named `name`. Malformed fields are logged and
    /// replaced by defaults so that one bad entry never hides a world.
    pub fn to_record(&self, name: &str) -> WorldRecord {
        let mut private = self.private;
        let kind = match self.kind.as_deref() {
            Some(kind) if kind.eq_ignore_ascii_case(LEGACY_PRIVATE_KIND) => {
                private = true;
                WorldKind::Flat
            }
            Some(kind) => kind.parse().unwrap_or_else(|_| {
                tracing::warn!(world = name, kind, "unknown world kind, using UNKNOWN");
                WorldKind::Unknown
            }),
            None => WorldKind::Unknown,
        };

        let creator_id = self
            .creator_id
            .as_deref()
            .filter(|id| !id.eq_ignore_ascii_case("null"))
            .and_then(|id| match codec::decode_identity(id) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(world = name, error = %e, "dropping malformed creator id");
                    None
                }
            });

        let generator = self
            .chunk_generator
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .and_then(|g| match g.parse::<GeneratorDescriptor>() {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::warn!(world = name, error = %e, "dropping malformed generator");
                    None
                }
            });

        let toggles = WorldToggles {
            physics: self.physics,
            explosions: self.explosions,
            mob_ai: self.mob_ai,
            block_breaking: self.block_breaking,
            block_placement: self.block_placement,
            block_interactions: self.block_interactions,
        };

        let mut record = WorldRecord::new(
            name,
            kind,
            None,
            Visibility::from_private(private),
            self.date,
        )
        .with_generator(generator)
        .with_toggles(toggles);

        record.set_creator(self.creator.clone(), creator_id);

        if let Some(status) = self.status.as_deref() {
            match status.parse::<WorldStatus>() {
                Ok(status) => record.set_status(status),
                Err(e) => tracing::warn!(world = name, error = %e, "unknown status, keeping default"),
            }
        }
        record.set_project(self.project.clone());
        record.set_permission(self.permission.clone());
        record.set_builders_restricted(self.builders_enabled);

        match codec::decode_builders(&self.builders) {
            Ok(builders) => {
                for builder in builders {
                    record.add_builder(builder);
                }
            }
            Err(e) => tracing::warn!(world = name, error = %e, "dropping malformed builder list"),
        }

        if let Some(spawn) = self.spawn.as_deref() {
            match codec::decode_location(spawn) {
                Ok(location) => record.set_custom_spawn(Some(location)),
                Err(e) => tracing::warn!(world = name, error = %e, "dropping malformed custom spawn"),
            }
        }

        record
    }
}

/// The whole durable state: every world plus the global spawn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<String>,
    #[serde(default)]
    pub worlds: BTreeMap<String, StoredWorld>,
}

impl WorldsDocument {
    pub fn records(&self) -> Vec<WorldRecord> {
        self.worlds
            .iter()
            .map(|(name, stored)| stored.to_record(name))
            .collect()
    }

    /// Insert or replace the entry for the record, dropping any entry whose
    /// name differs only in case.
    pub fn upsert(&mut self, record: &WorldRecord) {
        self.remove(record.name());
        self.worlds
            .insert(record.name().to_string(), StoredWorld::from_record(record));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.worlds.len();
        self.worlds.retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.worlds.len() != before
    }

    pub fn spawn_point(&self) -> Option<SpawnPoint> {
        let encoded = self.spawn.as_deref()?;
        match codec::decode_spawn_point(encoded) {
            Ok(spawn) => Some(spawn),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed spawn point");
                None
            }
        }
    }

    pub fn set_spawn_point(&mut self, spawn: Option<&SpawnPoint>) {
        self.spawn = spawn.map(codec::encode_spawn_point);
    }
}
