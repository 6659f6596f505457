use buildworld_common::TICKS_PER_SECOND;
use buildworld_host::WorldRules;
use buildworld_kernel::WorldToggles;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid duration {0:?}, expected HH:MM:SS")]
    Duration(String),
}

/// Server generation the flat-world spawn height depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeVersion {
    /// Worlds start at y = 0.
    Legacy,
    /// Worlds start at y = -64.
    #[default]
    Modern,
}

impl RuntimeVersion {
    pub fn flat_spawn_y(self) -> i32 {
        match self {
            RuntimeVersion::Legacy => 4,
            RuntimeVersion::Modern => -60,
        }
    }
}

/// Idle unloading of worlds nobody is in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UnloadConfig {
    /// Also enables loading unloaded worlds on demand when teleporting.
    pub enabled: bool,
    /// `HH:MM:SS`
    pub time_until_unload: String,
    pub blacklist: BTreeSet<String>,
}

impl Default for UnloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_until_unload: "01:00:00".to_string(),
            blacklist: BTreeSet::new(),
        }
    }
}

impl UnloadConfig {
    pub fn idle_ticks(&self) -> Result<u64, ConfigError> {
        let bad = || ConfigError::Duration(self.time_until_unload.clone());
        let parts: Vec<&str> = self.time_until_unload.trim().split(':').collect();
        let [h, m, s] = parts.as_slice() else {
            return Err(bad());
        };
        let field = |v: &str| v.trim().parse::<u64>().map_err(|_| bad());
        let (h, m, s) = (field(h)?, field(m)?, field(s)?);
        if m >= 60 || s >= 60 {
            return Err(bad());
        }
        Ok((h * 3600 + m * 60 + s) * TICKS_PER_SECOND)
    }

    pub fn is_blacklisted(&self, world: &str) -> bool {
        self.blacklist.iter().any(|w| w.eq_ignore_ascii_case(world))
    }
}

/// Manager settings. Every field has a default, so a partial file works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ManagerConfig {
    /// Directory holding world templates, one subdirectory each.
    pub templates_dir: PathBuf,
    /// Place a platform block under the spawn of new VOID worlds.
    pub void_block: bool,
    pub teleport_after_creation: bool,
    /// Seconds between two worlds of a batch import.
    pub import_delay_seconds: u64,
    /// Ticks between an on-demand load and the relocation into the world.
    pub load_warmup_ticks: u64,
    pub unload: UnloadConfig,
    pub runtime: RuntimeVersion,
    pub default_toggles: WorldToggles,
    pub world_rules: WorldRules,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            void_block: true,
            teleport_after_creation: true,
            import_delay_seconds: 30,
            load_warmup_ticks: TICKS_PER_SECOND,
            unload: UnloadConfig::default(),
            runtime: RuntimeVersion::default(),
            default_toggles: WorldToggles::default(),
            world_rules: WorldRules::default(),
        }
    }
}

impl ManagerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.unload.idle_ticks()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn import_interval_ticks(&self) -> u64 {
        self.import_delay_seconds * TICKS_PER_SECOND
    }
}
