use serde::{Deserialize, Serialize};

use crate::backend::SqlDialect;
use crate::errors;
use crate::FedqlError;

pub const DEFAULT_MAX_DEPENDENCIES: usize = 1;
pub const DEFAULT_MAX_COMPONENTS: usize = 1;
pub const DEFAULT_MAX_FAN_IN: usize = 5;
pub const DEFAULT_MAX_INDIRECTION_DEPTH: usize = 8;
pub const DEFAULT_NAMESPACE_PREFIX: &str = "fedql_stage";

/// Limits on the shape of join-driven data flow the planner accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFlowConfig {
    /// Edges allowed inside one weakly connected component.
    pub max_dependencies: usize,
    /// Weakly connected components allowed per SELECT.
    pub max_components: usize,
    /// Incoming edges allowed on one table while walking a component.
    pub max_fan_in: usize,
}

impl Default for DataFlowConfig {
    fn default() -> Self {
        Self {
            max_dependencies: DEFAULT_MAX_DEPENDENCIES,
            max_components: DEFAULT_MAX_COMPONENTS,
            max_fan_in: DEFAULT_MAX_FAN_IN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider assumed for two part `service.resource` table names.
    pub default_provider: Option<String>,
    pub dialect: SqlDialect,
    pub dataflow: DataFlowConfig,
    pub max_indirection_depth: usize,
    pub namespace_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            dialect: SqlDialect::default(),
            dataflow: DataFlowConfig::default(),
            max_indirection_depth: DEFAULT_MAX_INDIRECTION_DEPTH,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, FedqlError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| errors::invalid_config_error(format!("invalid engine config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FedqlError> {
        let limits = [
            ("dataflow.max_dependencies", self.dataflow.max_dependencies),
            ("dataflow.max_components", self.dataflow.max_components),
            ("dataflow.max_fan_in", self.dataflow.max_fan_in),
            ("max_indirection_depth", self.max_indirection_depth),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(errors::invalid_config_error(format!(
                    "`{name}` must be greater than zero"
                )));
            }
        }
        if self.namespace_prefix.is_empty()
            || !self
                .namespace_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(errors::invalid_config_error(format!(
                "`namespace_prefix` must be a non-empty identifier, got `{}`",
                self.namespace_prefix
            )));
        }
        Ok(())
    }
}
