//! Gate configuration types and builder patterns
//!
//! Configuration covers the ambient knobs of a gate only: how it is named in
//! logs and events, how many lifecycle events a lagging broadcast subscriber
//! may fall behind, and whether guarded calls wait on transitions by default.

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// Default gate name
pub const DEFAULT_GATE_NAME: &str = "gate";

/// Default broadcast buffer for lifecycle events
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Upper bound accepted for `event_capacity`
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Configuration for a lifecycle gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Name used in log fields, events and lock timeout errors
    pub name: String,

    /// Broadcast channel capacity for lifecycle event subscribers
    pub event_capacity: usize,

    /// Whether the gate's default guard options wait on in-flight
    /// transitions instead of failing fast
    pub block_by_default: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_GATE_NAME.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            block_by_default: false,
        }
    }
}

impl GateConfig {
    /// Create a new configuration builder
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::default()
    }

    /// Default configuration with a custom name
    ///
    /// # Example
    /// ```
    /// use phasegate::config::GateConfig;
    ///
    /// let config = GateConfig::named("db-pool");
    /// assert_eq!(config.name, "db-pool");
    /// ```
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parse and validate a TOML document
    ///
    /// Missing keys take their default values.
    ///
    /// # Example
    /// ```
    /// use phasegate::config::GateConfig;
    ///
    /// let config = GateConfig::from_toml_str("name = \"worker\"\nblock_by_default = true").unwrap();
    /// assert!(config.block_by_default);
    /// assert_eq!(config.event_capacity, 16);
    /// ```
    pub fn from_toml_str(input: &str) -> CommonResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field constraints
    pub fn validate(&self) -> CommonResult<()> {
        if self.name.trim().is_empty() {
            return Err(CommonError::config_field("name", "must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(CommonError::config_field("event_capacity", "must be positive"));
        }
        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(CommonError::config_field(
                "event_capacity",
                format!("must not exceed {MAX_EVENT_CAPACITY}"),
            ));
        }
        Ok(())
    }
}

/// Builder for GateConfig with fluent API
#[derive(Debug, Default)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gate name
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the event broadcast capacity
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Make default guard options blocking
    #[must_use]
    pub fn block_by_default(mut self, block: bool) -> Self {
        self.config.block_by_default = block;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> CommonResult<GateConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
