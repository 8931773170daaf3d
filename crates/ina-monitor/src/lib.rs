//! ina-monitor: identification, calibration and register access for INA2xx power monitors
//!
//! One [`InaMonitor`] drives every INA219, INA226, INA230, INA231, INA260 and INA3221 found
//! on a register bus. Devices are classified from their post-reset signature, calibrated with
//! integer-only fixed-point arithmetic, and remembered as packed records in a descriptor store
//! so the registry survives restarts.

mod error;
pub use error::{MonitorError, Result};

mod family;
pub use family::{
    reg, AlertSupport, Channel, ConfigField, DataRegister, Family, GainSelect, Profile,
    RateTable, ReadySignal, Scaling,
};

mod mode;
pub use mode::OperatingMode;

mod descriptor;
pub use descriptor::{Device, DeviceDescriptor, DeviceRuntime, MAX_SCALE_AMPS};

pub mod calibration;

mod identify;
pub use identify::{classify, scan, Classification, ScanReport, SCAN_RANGE};

mod cache;
pub use cache::DescriptorCache;

pub mod readings;

mod alerts;
pub use alerts::AlertKind;

mod config;
pub use config::{load_config_file, parse_json, parse_yaml, DeviceOverride, MonitorConfig};

mod monitor;
pub use monitor::{InaMonitor, Target};
