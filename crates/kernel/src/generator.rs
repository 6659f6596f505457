use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a non-default chunk generator supplied by an installed extension.
///
/// The external string form is `provider:variant`; a bare `provider` means
/// the variant has the same name as the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratorDescriptor {
    pub provider: String,
    pub variant: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("generator descriptor has no provider name")]
    MissingProvider,
}

impl GeneratorDescriptor {
    pub fn new(provider: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            variant: variant.into(),
        }
    }
}

impl FromStr for GeneratorDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (provider, variant) = match s.split_once(':') {
            Some((provider, variant)) => (provider.trim(), variant.trim()),
            None => (s, s),
        };
        if provider.is_empty() {
            return Err(DescriptorError::MissingProvider);
        }
        let variant = if variant.is_empty() { provider } else { variant };
        Ok(Self::new(provider, variant))
    }
}

impl fmt::Display for GeneratorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant == self.provider {
            f.write_str(&self.provider)
        } else {
            write!(f, "{}:{}", self.provider, self.variant)
        }
    }
}
