//! Module configuration passed through the lifecycle.

use serde::Serialize;

/// Configuration handed to a module on `init` and `reload`.
///
/// Carries the module's section as raw TOML; each module deserializes it
/// into its own typed config.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    raw: Option<String>,
}

impl ModuleConfig {
    /// Creates an empty configuration. The module keeps its current settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ModuleConfig from a raw TOML string.
    #[must_use]
    pub fn from_raw(raw: String) -> Self {
        Self { raw: Some(raw) }
    }

    /// Creates a ModuleConfig by serializing a typed section.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as a TOML table.
    pub fn from_section<T: Serialize>(section: &T) -> Result<Self, toml::ser::Error> {
        toml::to_string(section).map(Self::from_raw)
    }

    /// Gets the raw configuration string.
    #[must_use]
    pub fn raw_config(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}
