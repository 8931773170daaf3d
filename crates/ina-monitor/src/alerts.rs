use crate::descriptor::DeviceRuntime;
use crate::error::{MonitorError, Result};
use crate::family::AlertSupport;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Bits 10-15 of the mask/enable register select the alert pin function. Only one may be set.
const FUNCTION_BITS: u16 = 0xFC00;

/// Alert pin function.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ConversionReady,
    ShuntOverVoltage,
    ShuntUnderVoltage,
    BusOverVoltage,
    BusUnderVoltage,
    PowerOverLimit,
}

impl AlertKind {
    pub fn bit(self) -> u16 {
        match self {
            AlertKind::ShuntOverVoltage => 1 << 15,
            AlertKind::ShuntUnderVoltage => 1 << 14,
            AlertKind::BusOverVoltage => 1 << 13,
            AlertKind::BusUnderVoltage => 1 << 12,
            AlertKind::PowerOverLimit => 1 << 11,
            AlertKind::ConversionReady => 1 << 10,
        }
    }

    pub fn supported(self, caps: &AlertSupport) -> bool {
        match self {
            AlertKind::ConversionReady => caps.conversion_ready,
            AlertKind::ShuntOverVoltage | AlertKind::ShuntUnderVoltage => caps.shunt_limits,
            AlertKind::BusOverVoltage | AlertKind::BusUnderVoltage => caps.bus_limits,
            AlertKind::PowerOverLimit => caps.power_limit,
        }
    }

    /// Whether the function compares against the alert limit register.
    pub fn takes_threshold(self) -> bool {
        !matches!(self, AlertKind::ConversionReady)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::ConversionReady => "conversion-ready",
            AlertKind::ShuntOverVoltage => "shunt over-voltage",
            AlertKind::ShuntUnderVoltage => "shunt under-voltage",
            AlertKind::BusOverVoltage => "bus over-voltage",
            AlertKind::BusUnderVoltage => "bus under-voltage",
            AlertKind::PowerOverLimit => "over-power",
        };
        f.write_str(name)
    }
}

/// New mask/enable value: every function bit cleared, then `kind` set when enabled.
pub fn mask_enable_value(current: u16, kind: AlertKind, enabled: bool) -> u16 {
    let cleared = current & !FUNCTION_BITS;
    if enabled {
        cleared | kind.bit()
    } else {
        cleared
    }
}

/// Alert limit register code for a threshold in the getter's units
/// (µV for shunt limits, mV for bus limits, µW for power).
pub fn limit_code(kind: AlertKind, runtime: &DeviceRuntime, threshold: i64) -> Result<u16> {
    let out_of_range = || MonitorError::ThresholdOutOfRange {
        kind,
        limit: threshold,
    };
    match kind {
        AlertKind::ShuntOverVoltage | AlertKind::ShuntUnderVoltage => {
            let code = threshold
                .checked_mul(10)
                .and_then(|v| v.checked_div(i64::from(runtime.shunt_voltage_lsb)))
                .ok_or_else(out_of_range)?;
            let code = i16::try_from(code).map_err(|_| out_of_range())?;
            Ok(code as u16)
        }
        AlertKind::BusOverVoltage | AlertKind::BusUnderVoltage => {
            let code = threshold
                .checked_mul(100)
                .and_then(|v| v.checked_div(i64::from(runtime.bus_voltage_lsb)))
                .ok_or_else(out_of_range)?;
            u16::try_from(code).map_err(|_| out_of_range())
        }
        AlertKind::PowerOverLimit => {
            let code = threshold
                .checked_mul(1000)
                .and_then(|v| v.checked_div(runtime.power_lsb as i64))
                .ok_or_else(out_of_range)?;
            u16::try_from(code).map_err(|_| out_of_range())
        }
        AlertKind::ConversionReady => Err(MonitorError::InvalidParameter(
            "conversion-ready alert takes no threshold",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration;
    use crate::descriptor::DeviceDescriptor;
    use crate::family::{Family, INA226, INA260};
    use crate::mode::OperatingMode;
    use i2c_transport::BusAddress;

    fn ina226_runtime() -> DeviceRuntime {
        calibration::derive(&DeviceDescriptor {
            family: Family::Ina226,
            mode: OperatingMode::ContinuousBoth,
            address: BusAddress::new(0x40).unwrap(),
            max_amps: 1,
            shunt_micro_ohm: 100_000,
        })
        .unwrap()
    }

    #[test]
    fn test_function_bits_are_exclusive() {
        let value = mask_enable_value(0xFFFF, AlertKind::BusOverVoltage, true);
        assert_eq!(value, 0x03FF | (1 << 13));
        let value = mask_enable_value(value, AlertKind::PowerOverLimit, true);
        assert_eq!(value, 0x03FF | (1 << 11));
        assert_eq!(mask_enable_value(value, AlertKind::PowerOverLimit, false), 0x03FF);
    }

    #[test]
    fn test_limit_codes_invert_getters() {
        let rt = ina226_runtime();
        // 2.5 µV per code
        assert_eq!(limit_code(AlertKind::ShuntOverVoltage, &rt, 10_000).unwrap(), 4000);
        assert_eq!(
            limit_code(AlertKind::ShuntUnderVoltage, &rt, -10_000).unwrap(),
            (-4000i16) as u16
        );
        // 1.25 mV per code
        assert_eq!(limit_code(AlertKind::BusOverVoltage, &rt, 12_000).unwrap(), 9600);
        // 25 × 30518 nW per code
        assert_eq!(limit_code(AlertKind::PowerOverLimit, &rt, 762_950).unwrap(), 1000);
    }

    #[test]
    fn test_limit_out_of_range() {
        let rt = ina226_runtime();
        assert!(matches!(
            limit_code(AlertKind::BusOverVoltage, &rt, -1),
            Err(MonitorError::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            limit_code(AlertKind::ShuntOverVoltage, &rt, 100_000),
            Err(MonitorError::ThresholdOutOfRange { .. })
        ));
        assert!(limit_code(AlertKind::ConversionReady, &rt, 0).is_err());
    }

    #[test]
    fn test_capabilities() {
        let full = INA226.alerts.unwrap();
        let ina260 = INA260.alerts.unwrap();
        assert!(AlertKind::ShuntOverVoltage.supported(&full));
        assert!(!AlertKind::ShuntOverVoltage.supported(&ina260));
        assert!(AlertKind::BusUnderVoltage.supported(&ina260));
        assert!(AlertKind::ConversionReady.supported(&ina260));
    }
}
