//! Scheduler configuration.
//!
//! [`TxTimeConfigInput`] is the loosely-typed shape accepted from TOML;
//! [`TxTimeConfigInput::resolve`] validates it into a [`TxTimeConfig`].
//! Each invalid field yields its own [`ConfigError`] variant.

use serde::{Deserialize, Serialize};

use crate::clock::ClockId;
use crate::error::ConfigError;
use crate::packet::ReleasePolicy;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TxTimeConfigInput {
    pub version: u32,
    pub txtime: Option<TxTimeOptionsInput>,
}

/// Clock id as written in config: a name (`"CLOCK_TAI"`) or a raw integer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ClockSpec {
    Raw(i32),
    Name(String),
}

impl ClockSpec {
    fn resolve(&self) -> Result<ClockId, ConfigError> {
        match self {
            ClockSpec::Raw(raw) => ClockId::from_raw(*raw),
            ClockSpec::Name(name) => name.parse(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TxTimeOptionsInput {
    pub clockid: Option<ClockSpec>,
    pub delta_ns: Option<i64>,
    pub sorting: Option<bool>,
    pub deadline_mode: Option<bool>,
}

/// Validated scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxTimeConfig {
    /// Clock domain every `txtime` is interpreted in.
    pub clock_id: ClockId,
    /// Tolerance window in ns: a launch-time packet may leave once
    /// `now >= txtime - delta_ns`.
    pub delta_ns: i64,
    /// Time-sorted mode when true, insertion-order mode otherwise.
    pub sorting: bool,
    /// Deadline policy when true, launch-time policy otherwise.
    pub deadline_mode: bool,
}

impl TxTimeConfig {
    pub fn new(
        clock_id: ClockId,
        delta_ns: i64,
        sorting: bool,
        deadline_mode: bool,
    ) -> Result<Self, ConfigError> {
        let config = TxTimeConfig {
            clock_id,
            delta_ns,
            sorting,
            deadline_mode,
        };
        config.validate()?;
        Ok(config)
    }

    /// Time-sorted launch-time scheduling on `clock_id` with no tolerance.
    pub fn launch_time(clock_id: ClockId) -> Self {
        TxTimeConfig {
            clock_id,
            delta_ns: 0,
            sorting: true,
            deadline_mode: false,
        }
    }

    pub fn with_delta_ns(mut self, delta_ns: i64) -> Self {
        self.delta_ns = delta_ns;
        self
    }

    pub fn with_sorting(mut self, sorting: bool) -> Self {
        self.sorting = sorting;
        self
    }

    pub fn with_deadline_mode(mut self, deadline_mode: bool) -> Self {
        self.deadline_mode = deadline_mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta_ns < 0 {
            return Err(ConfigError::NegativeDelta(self.delta_ns));
        }
        Ok(())
    }

    pub fn policy(&self) -> ReleasePolicy {
        ReleasePolicy::from_deadline_mode(self.deadline_mode)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: TxTimeConfigInput =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        parsed.resolve()
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("invalid txtime config {}", path.display()))?;
        Ok(config)
    }
}

impl TxTimeConfigInput {
    pub fn resolve(self) -> Result<TxTimeConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let opts = self.txtime.ok_or(ConfigError::MissingOptions)?;
        let clock_id = opts
            .clockid
            .as_ref()
            .ok_or(ConfigError::MissingField("clockid"))?
            .resolve()?;
        let delta_ns = opts.delta_ns.ok_or(ConfigError::MissingField("delta_ns"))?;

        TxTimeConfig::new(
            clock_id,
            delta_ns,
            opts.sorting.unwrap_or(true),
            opts.deadline_mode.unwrap_or(false),
        )
    }
}

impl From<TxTimeConfig> for TxTimeConfigInput {
    fn from(config: TxTimeConfig) -> Self {
        TxTimeConfigInput {
            version: CONFIG_VERSION,
            txtime: Some(TxTimeOptionsInput {
                clockid: Some(ClockSpec::Name(config.clock_id.name().to_string())),
                delta_ns: Some(config.delta_ns),
                sorting: Some(config.sorting),
                deadline_mode: Some(config.deadline_mode),
            }),
        }
    }
}
