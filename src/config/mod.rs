//! Configuration loading and management

use crate::conventions::provider::{DecimalSpec, Provider};
use crate::core::batch::BatchThresholds;
use crate::core::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Free-text search settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Separator splitting search criteria into tokens
    pub list_separator: char,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { list_separator: ',' }
    }
}

/// Inputs of the model-building conventions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,

    /// Soft-deletable resources that get no standing soft-delete filter
    pub soft_delete_exclude: Vec<String>,

    /// Decimal columns, keyed by `"<resource>.<field>"`
    pub decimal_overrides: BTreeMap<String, DecimalSpec>,

    /// Length used for text fields that declare no maximum
    pub default_string_length: Option<u32>,
}

/// Complete configuration of the gateway
///
/// ```yaml
/// batch:
///   min_rows_to_bulk: 1000
///   min_rows_to_split: 100
/// search:
///   list_separator: ","
/// model:
///   provider: postgres
///   soft_delete_exclude: [audit_entry]
///   decimal_overrides:
///     budget.amount: { precision: 18, scale: 2 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub batch: BatchThresholds,
    pub search: SearchConfig,
    pub model: ModelConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Io {
                message: e.to_string(),
            },
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work together
    pub fn validate(&self) -> Result<()> {
        let BatchThresholds {
            min_rows_to_bulk,
            min_rows_to_split,
        } = self.batch;
        if min_rows_to_bulk > 0 && min_rows_to_split > 0 && min_rows_to_bulk < min_rows_to_split {
            return Err(ConfigError::InvalidValue {
                field: "batch.min_rows_to_bulk".into(),
                message: format!(
                    "{} is below batch.min_rows_to_split ({})",
                    min_rows_to_bulk, min_rows_to_split
                ),
            }
            .into());
        }

        let separator = self.search.list_separator;
        if separator.is_whitespace() || separator.is_alphanumeric() {
            return Err(ConfigError::InvalidValue {
                field: "search.list_separator".into(),
                message: format!("'{}' cannot separate search tokens", separator),
            }
            .into());
        }

        for (key, spec) in &self.model.decimal_overrides {
            if !key.contains('.') {
                return Err(ConfigError::InvalidValue {
                    field: format!("model.decimal_overrides.{}", key),
                    message: "expected '<resource>.<field>'".into(),
                }
                .into());
            }
            if spec.precision == 0 || spec.scale > spec.precision {
                return Err(ConfigError::InvalidValue {
                    field: format!("model.decimal_overrides.{}", key),
                    message: format!(
                        "scale {} does not fit precision {}",
                        spec.scale, spec.precision
                    ),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Merge several configurations into one.
    ///
    /// Scalars take the last value that differs from the default; the
    /// exclude list is unioned and decimal overrides are merged, later
    /// entries replacing earlier ones for the same key.
    pub fn merge(configs: Vec<GatewayConfig>) -> Self {
        let defaults = GatewayConfig::default();
        let mut merged = GatewayConfig::default();

        for config in configs {
            if config.batch.min_rows_to_bulk != defaults.batch.min_rows_to_bulk {
                merged.batch.min_rows_to_bulk = config.batch.min_rows_to_bulk;
            }
            if config.batch.min_rows_to_split != defaults.batch.min_rows_to_split {
                merged.batch.min_rows_to_split = config.batch.min_rows_to_split;
            }
            if config.search != defaults.search {
                merged.search = config.search;
            }
            if config.model.provider != defaults.model.provider {
                merged.model.provider = config.model.provider;
            }
            if config.model.default_string_length.is_some() {
                merged.model.default_string_length = config.model.default_string_length;
            }
            for resource in config.model.soft_delete_exclude {
                if !merged.model.soft_delete_exclude.contains(&resource) {
                    merged.model.soft_delete_exclude.push(resource);
                }
            }
            merged.model.decimal_overrides.extend(config.model.decimal_overrides);
        }

        merged
    }
}
