//! Configuration types for flowsheet resolution.
//!
//! All types implement [`serde::Deserialize`] so front ends can load them
//! from external sources.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining resolution and table settings.
//! - [`ResolveSettings`] - Strictness, merge policy and the run restriction.
//! - [`TablesConfig`] - Names of the tables that `TableUpdate`s may patch.
//!
//! # Example
//!
//! ```
//! # use flowsheet::config::AppConfig;
//! let config = AppConfig::default();
//! assert!(!config.resolve().lenient());
//! assert!(config.tables().known().is_empty());
//! ```

use serde::Deserialize;

use flowsheet_resolve::{ChoiceMergePolicy, ResolveConfig};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Resolution section.
    #[serde(default)]
    resolve: ResolveSettings,

    /// Table section.
    #[serde(default)]
    tables: TablesConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(resolve: ResolveSettings, tables: TablesConfig) -> Self {
        Self { resolve, tables }
    }

    /// Returns the resolution settings.
    pub fn resolve(&self) -> &ResolveSettings {
        &self.resolve
    }

    /// Returns the table settings.
    pub fn tables(&self) -> &TablesConfig {
        &self.tables
    }

    /// Overrides the `lenient` setting, e.g. from a command-line flag.
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.resolve.lenient = lenient;
        self
    }
}

/// Settings that steer the resolution pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveSettings {
    /// Report unknown attributes as warnings.
    #[serde(default)]
    lenient: bool,

    /// How an extending `ProcessChoice` treats its groups.
    #[serde(default)]
    choice_merge: ChoiceMergePolicy,

    /// Restrict derived results to the fields of these analyses.
    #[serde(default)]
    analyses: Vec<String>,

    /// Restrict derived results to these fields.
    #[serde(default)]
    fields: Vec<String>,
}

impl ResolveSettings {
    pub fn new(
        lenient: bool,
        choice_merge: ChoiceMergePolicy,
        analyses: Vec<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            lenient,
            choice_merge,
            analyses,
            fields,
        }
    }

    pub fn lenient(&self) -> bool {
        self.lenient
    }

    pub fn choice_merge(&self) -> ChoiceMergePolicy {
        self.choice_merge
    }

    pub fn analyses(&self) -> &[String] {
        &self.analyses
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Converts the settings into the engine's [`ResolveConfig`].
    pub fn to_resolve_config(&self) -> ResolveConfig {
        ResolveConfig::default()
            .with_lenient(self.lenient)
            .with_choice_merge(self.choice_merge)
            .with_analyses(self.analyses.clone())
            .with_fields(self.fields.clone())
    }
}

/// Table configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablesConfig {
    /// Names of the tables `TableUpdate` elements may patch.
    #[serde(default)]
    known: Vec<String>,
}

impl TablesConfig {
    pub fn new(known: Vec<String>) -> Self {
        Self { known }
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }
}
