use std::collections::BTreeMap;

use crate::name;
use crate::record::{LoadedState, WorldRecord};

/// A change record produced by every authoring mutation of the registry.
///
/// The log is what the persistence layer consumes: each event maps to a
/// durable save or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Inserted { name: String },
    Updated { name: String },
    Removed { name: String },
    Renamed { from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a world named {0:?} is already registered")]
    Duplicate(String),
    #[error("no world named {0:?} is registered")]
    Unknown(String),
}

/// The authoritative set of world records.
///
/// Keys are case-folded names, so iteration order is deterministic and two
/// names differing only in case can never both be present.
#[derive(Debug, Default)]
pub struct Registry {
    worlds: BTreeMap<String, WorldRecord>,
    /// Append-only log of mutations since the last drain.
    event_log: Vec<RegistryEvent>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records. Restoring is not an
    /// authoring operation, so no events are logged. Records with invalid
    /// names and later duplicates of a name are dropped and returned.
    pub fn restore(records: impl IntoIterator<Item = WorldRecord>) -> (Self, Vec<WorldRecord>) {
        let mut registry = Self::new();
        let mut rejected = Vec::new();
        for record in records {
            if let Err(e) = name::validate(record.name()) {
                tracing::warn!(world = record.name(), error = %e, "persisted world with invalid name ignored");
                rejected.push(record);
                continue;
            }
            let key = name::key(record.name());
            if registry.worlds.contains_key(&key) {
                tracing::warn!(world = record.name(), "duplicate persisted world ignored");
                rejected.push(record);
                continue;
            }
            registry.worlds.insert(key, record);
        }
        (registry, rejected)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.worlds.contains_key(&name::key(name))
    }

    pub fn get(&self, name: &str) -> Option<&WorldRecord> {
        self.worlds.get(&name::key(name))
    }

    /// All records, ordered by case-folded name.
    pub fn iter(&self) -> impl Iterator<Item = &WorldRecord> {
        self.worlds.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn insert(&mut self, record: WorldRecord) -> Result<(), RegistryError> {
        let key = name::key(record.name());
        if self.worlds.contains_key(&key) {
            return Err(RegistryError::Duplicate(record.name().to_string()));
        }
        let name = record.name().to_string();
        self.worlds.insert(key, record);
        self.event_log.push(RegistryEvent::Inserted { name });
        Ok(())
    }

    /// Mutate a record in place. The closure cannot rename the record.
    pub fn update<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut WorldRecord) -> R,
    ) -> Result<R, RegistryError> {
        let record = self
            .worlds
            .get_mut(&name::key(name))
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        let result = f(record);
        self.event_log.push(RegistryEvent::Updated {
            name: record.name().to_string(),
        });
        Ok(result)
    }

    /// Track whether the physical world is instantiated. Runtime state only;
    /// nothing is logged.
    pub fn set_loaded(&mut self, name: &str, loaded: LoadedState) -> bool {
        match self.worlds.get_mut(&name::key(name)) {
            Some(record) => {
                record.set_loaded(loaded);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<WorldRecord> {
        let record = self.worlds.remove(&name::key(name))?;
        self.event_log.push(RegistryEvent::Removed {
            name: record.name().to_string(),
        });
        Some(record)
    }

    /// Change a record's name and registry key in one step.
    ///
    /// A case-only change of the same world is allowed; any other existing
    /// holder of the new key is a collision.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), RegistryError> {
        let from_key = name::key(from);
        let to_key = name::key(to);
        if !self.worlds.contains_key(&from_key) {
            return Err(RegistryError::Unknown(from.to_string()));
        }
        if to_key != from_key && self.worlds.contains_key(&to_key) {
            return Err(RegistryError::Duplicate(to.to_string()));
        }
        let Some(mut record) = self.worlds.remove(&from_key) else {
            return Err(RegistryError::Unknown(from.to_string()));
        };
        let old = record.name().to_string();
        record.set_name(to.to_string());
        self.worlds.insert(to_key, record);
        self.event_log.push(RegistryEvent::Renamed {
            from: old,
            to: to.to_string(),
        });
        Ok(())
    }

    /// Drain and return the change log.
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the change log.
    pub fn events(&self) -> &[RegistryEvent] {
        &self.event_log
    }
}
