use crate::mode::OperatingMode;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Declarative monitor setup, applied with [`crate::InaMonitor::apply_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Default full-scale current in amps.
    pub max_amps: u32,
    /// Default shunt resistance in µΩ.
    pub shunt_micro_ohm: u32,
    #[serde(default)]
    pub mode: Option<OperatingMode>,
    /// Samples per reading.
    #[serde(default)]
    pub averaging: Option<u32>,
    #[serde(default)]
    pub bus_conversion_us: Option<u32>,
    #[serde(default)]
    pub shunt_conversion_us: Option<u32>,
    #[serde(default)]
    pub overrides: Vec<DeviceOverride>,
}

/// Per-address calibration and mode, applied after the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverride {
    pub address: u8,
    #[serde(default)]
    pub max_amps: Option<u32>,
    #[serde(default)]
    pub shunt_micro_ohm: Option<u32>,
    #[serde(default)]
    pub mode: Option<OperatingMode>,
}

pub fn parse_yaml(raw: &str) -> anyhow::Result<MonitorConfig> {
    serde_yaml::from_str(raw).context("parsing monitor config yaml")
}

pub fn parse_json(raw: &str) -> anyhow::Result<MonitorConfig> {
    serde_json::from_str(raw).context("parsing monitor config json")
}

/// Load a config file, choosing the format from the extension (`yaml`, `yml` or `json`).
pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<MonitorConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading monitor config: {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let config = match ext {
        "yaml" | "yml" => parse_yaml(&raw),
        "json" => parse_json(&raw),
        other => bail!("unsupported config extension {other:?}: {}", path.display()),
    }
    .with_context(|| format!("decoding monitor config: {}", path.display()))?;
    Ok(config)
}
