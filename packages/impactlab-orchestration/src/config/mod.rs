//! Registry bootstrap configuration
//!
//! Declares the superindices and variables a [`Registry`](crate::Registry)
//! starts with, as versioned YAML:
//!
//! ```yaml
//! version: 1
//! archive_suffix: ".nc"
//! superindices:
//!   - name: rcp
//!     description: Representative Concentration Pathways
//!     values: [rcp26, rcp45, rcp60, rcp85]
//! variables:
//!   - name: /GCP/climate/tas
//!     superindex: rcp
//!   - name: /GCP/impacts/mortality
//!     superindex: rcp*ssp
//!     slice: { rcp: rcp85 }
//! ```

pub mod error;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use error::{ConfigError, ConfigResult};

use crate::index::Assignment;

/// Supported schema versions
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// YAML Schema v1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Schema version (always 1 for v1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Suffix appended to archive names
    #[serde(default = "default_suffix")]
    pub archive_suffix: String,

    #[serde(default)]
    pub superindices: Vec<SuperIndexConfig>,

    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

fn default_suffix() -> String {
    impactlab_storage::infrastructure::memory::DEFAULT_SUFFIX.to_string()
}

/// A declared superindex: either `values` or `components`, not both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuperIndexConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<IndexMap<String, Vec<Assignment>>>,
}

/// A declared variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub name: String,

    /// Superindex expression such as `rcp*ssp`; omitted means unindexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superindex: Option<String>,

    /// Optional slice applied to the superindex (must be a mapping)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<serde_json::Value>,
}

impl RegistryConfig {
    /// Parse and validate YAML text
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: RegistryConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Structural checks that do not need a registry
    pub fn validate(&self) -> ConfigResult<()> {
        match self.version {
            None => return Err(ConfigError::MissingVersion),
            Some(found) if !SUPPORTED_VERSIONS.contains(&found) => {
                return Err(ConfigError::UnsupportedVersion {
                    found,
                    supported: SUPPORTED_VERSIONS.to_vec(),
                })
            }
            Some(_) => {}
        }

        let mut declared: Vec<String> = Vec::new();
        for index in &self.superindices {
            if index.name.is_empty() || index.name.contains('*') {
                return Err(ConfigError::Validation(format!(
                    "superindex name '{}' must be non-empty and must not contain '*'",
                    index.name
                )));
            }
            if index.values.is_some() == index.components.is_some() {
                return Err(ConfigError::Validation(format!(
                    "superindex '{}': provide values or components but not both",
                    index.name
                )));
            }
            if declared.contains(&index.name) {
                return Err(ConfigError::Validation(format!(
                    "superindex '{}' declared twice",
                    index.name
                )));
            }
            declared.push(index.name.clone());
        }

        let mut variables: Vec<&str> = Vec::new();
        for variable in &self.variables {
            if variables.contains(&variable.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "variable '{}' declared twice",
                    variable.name
                )));
            }
            variables.push(&variable.name);

            for name in variable.superindex_names() {
                if !declared.iter().any(|d| d == name) {
                    return Err(ConfigError::unknown_superindex(
                        name,
                        &variable.name,
                        &declared,
                    ));
                }
            }
        }

        Ok(())
    }

    /// The rcp × ssp setup used by the impact-lab pipelines
    pub fn impactlab_default() -> Self {
        let superindex = |name: &str, description: &str, values: Vec<String>| SuperIndexConfig {
            name: name.to_string(),
            description: description.to_string(),
            values: Some(values),
            components: None,
        };
        let variable = |name: &str, superindex: &str| VariableConfig {
            name: name.to_string(),
            superindex: Some(superindex.to_string()),
            slice: None,
        };

        Self {
            version: Some(1),
            archive_suffix: default_suffix(),
            superindices: vec![
                superindex(
                    "rcp",
                    "Representative Concentration Pathways",
                    [26, 45, 60, 85].iter().map(|r| format!("rcp{}", r)).collect(),
                ),
                superindex(
                    "ssp",
                    "Shared Socioeconomic Pathway",
                    (1..=5).map(|s| format!("ssp{}", s)).collect(),
                ),
            ],
            variables: vec![
                variable("/GCP/socioeconomics/popop", "ssp"),
                variable("/GCP/climate/tas", "rcp"),
                variable("/GCP/impacts/mortality", "rcp*ssp"),
                variable("/GCP/climate/tas2_ir", "rcp"),
            ],
        }
    }
}

impl VariableConfig {
    /// Superindex names referenced by the expression
    pub fn superindex_names(&self) -> Vec<&str> {
        self.superindex
            .as_deref()
            .map(split_expression)
            .unwrap_or_default()
    }
}

/// Split a `a*b*c` superindex expression into names; `empty` and blanks are
/// dropped
pub fn split_expression(expr: &str) -> Vec<&str> {
    expr.split('*')
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != crate::index::EMPTY_NAME)
        .collect()
}
