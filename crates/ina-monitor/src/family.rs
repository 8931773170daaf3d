//! Supported chip families and their register maps.
//!
//! Every family resolves to one static [`Profile`]. The rest of the crate reads register
//! addresses, bit layouts, scaling constants and rate tables from the profile instead of
//! branching on the family.

use core::fmt;
use i2c_transport::RegisterAddr;
use serde::{Deserialize, Serialize};

/// Register addresses shared by the whole INA2xx line.
pub mod reg {
    use i2c_transport::RegisterAddr;

    pub const CONFIGURATION: RegisterAddr = 0x00;
    pub const SHUNT_VOLTAGE: RegisterAddr = 0x01;
    pub const BUS_VOLTAGE: RegisterAddr = 0x02;
    pub const POWER: RegisterAddr = 0x03;
    pub const CURRENT: RegisterAddr = 0x04;
    pub const CALIBRATION: RegisterAddr = 0x05;
    pub const MASK_ENABLE: RegisterAddr = 0x06;
    pub const ALERT_LIMIT: RegisterAddr = 0x07;
    pub const INA3221_MASK_ENABLE: RegisterAddr = 0x0F;
    pub const MANUFACTURER_ID: RegisterAddr = 0xFE;
    pub const DIE_ID: RegisterAddr = 0xFF;

    /// Written to the configuration register to force a power-on reset.
    pub const RESET_COMMAND: u16 = 0x8000;
}

/// One of the three INA3221 input channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    First,
    Second,
    Third,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::First, Channel::Second, Channel::Third];

    pub fn index(self) -> u8 {
        match self {
            Channel::First => 0,
            Channel::Second => 1,
            Channel::Third => 2,
        }
    }
}

/// Closed set of supported chips. The multi-channel INA3221 occupies one variant per channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Ina219,
    Ina226,
    Ina230,
    Ina231,
    Ina260,
    Ina3221(Channel),
}

impl Family {
    /// Persisted 4-bit tag.
    pub fn tag(self) -> u8 {
        match self {
            Family::Ina219 => 0,
            Family::Ina226 => 1,
            Family::Ina230 => 2,
            Family::Ina231 => 3,
            Family::Ina260 => 4,
            Family::Ina3221(ch) => 5 + ch.index(),
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Family::Ina219,
            1 => Family::Ina226,
            2 => Family::Ina230,
            3 => Family::Ina231,
            4 => Family::Ina260,
            5 => Family::Ina3221(Channel::First),
            6 => Family::Ina3221(Channel::Second),
            7 => Family::Ina3221(Channel::Third),
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    /// Virtual channel of a multi-channel chip; zero for single-channel chips.
    pub fn channel(self) -> u8 {
        match self {
            Family::Ina3221(ch) => ch.index(),
            _ => 0,
        }
    }

    pub fn profile(self) -> &'static Profile {
        match self {
            Family::Ina219 => &INA219,
            Family::Ina226 => &INA226,
            Family::Ina230 => &INA230,
            Family::Ina231 => &INA231,
            Family::Ina260 => &INA260,
            Family::Ina3221(_) => &INA3221,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Ina3221(ch) => write!(f, "{}#{}", self.name(), ch.index()),
            _ => f.write_str(self.name()),
        }
    }
}

/// Location and layout of a measurement inside a 16-bit register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataRegister {
    pub register: RegisterAddr,
    /// Number of low bits that carry no data.
    pub shift: u8,
}

/// A bit field inside the configuration register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConfigField {
    pub mask: u16,
    pub shift: u8,
}

impl ConfigField {
    pub const fn new(mask: u16, shift: u8) -> Self {
        Self { mask, shift }
    }

    pub fn apply(self, config: u16, code: u16) -> u16 {
        (config & !self.mask) | ((code << self.shift) & self.mask)
    }

    pub fn get(self, config: u16) -> u16 {
        (config & self.mask) >> self.shift
    }
}

/// Maps a requested quantity (samples, microseconds) to a register code.
///
/// Tiers are ordered from the largest threshold down; the first threshold not above the
/// request wins, and anything below every threshold gets `floor`.
#[derive(Clone, Copy, Debug)]
pub struct RateTable {
    pub tiers: &'static [(u32, u16)],
    pub floor: u16,
}

impl RateTable {
    pub fn code_for(&self, requested: u32) -> u16 {
        self.tiers
            .iter()
            .find(|(threshold, _)| requested >= *threshold)
            .map(|(_, code)| *code)
            .unwrap_or(self.floor)
    }
}

/// Programmable gain selection written into the configuration register at calibration.
#[derive(Clone, Copy, Debug)]
pub struct GainSelect {
    /// Full-scale shunt ranges in millivolts, smallest first; the index is the tier code.
    pub ranges_mv: &'static [u32],
    pub field: ConfigField,
    /// Configuration bits forced on together with the gain (bus voltage range).
    pub set_bits: u16,
}

impl GainSelect {
    /// Smallest tier whose range holds `full_scale_mv`, or the widest tier.
    pub fn tier_for(&self, full_scale_mv: u64) -> u16 {
        self.ranges_mv
            .iter()
            .position(|&range| full_scale_mv <= u64::from(range))
            .unwrap_or(self.ranges_mv.len().saturating_sub(1)) as u16
    }
}

/// How raw shunt readings become current and power.
#[derive(Clone, Copy, Debug)]
pub enum Scaling {
    /// External shunt; current and power registers scaled through the calibration register.
    Calibrated {
        /// Datasheet constant expressed for nA current LSB and µΩ shunt over 1e5.
        constant: u64,
        power_multiplier: u64,
        register_bits: u32,
        gain: Option<GainSelect>,
    },
    /// Integrated shunt with datasheet-fixed LSBs; no calibration register write.
    FixedShunt {
        current_lsb_na: u64,
        power_lsb_nw: u64,
        shunt_micro_ohm: u32,
    },
    /// Shunt and bus voltages only; current and power are derived in software.
    VoltageOnly,
}

/// Conversion-ready signal polled by `wait_for_conversion`.
#[derive(Clone, Copy, Debug)]
pub struct ReadySignal {
    pub register: RegisterAddr,
    pub mask: u16,
    /// Extra read that clears the flag when the polled read does not.
    pub clear_by: Option<RegisterAddr>,
}

/// Alert pin functions a family implements.
#[derive(Clone, Copy, Debug)]
pub struct AlertSupport {
    pub conversion_ready: bool,
    pub shunt_limits: bool,
    pub bus_limits: bool,
    pub power_limit: bool,
}

/// Static description of one chip family.
#[derive(Debug)]
pub struct Profile {
    pub name: &'static str,
    /// Post-reset configuration register value.
    pub power_on_config: u16,
    pub bus_voltage: DataRegister,
    pub shunt_voltage: Option<DataRegister>,
    pub current_register: Option<RegisterAddr>,
    pub power_register: Option<RegisterAddr>,
    /// Bus voltage LSB in units of 10 µV.
    pub bus_lsb: u32,
    /// Shunt voltage LSB in units of 100 nV.
    pub shunt_lsb: u32,
    pub scaling: Scaling,
    /// Register address offset between consecutive virtual channels.
    pub channel_stride: u8,
    pub averaging: RateTable,
    pub averaging_fields: &'static [ConfigField],
    pub conversion_time: RateTable,
    pub bus_conversion_field: ConfigField,
    pub shunt_conversion_field: ConfigField,
    pub ready: ReadySignal,
    pub alerts: Option<AlertSupport>,
}

impl Profile {
    pub fn has_calibration(&self) -> bool {
        matches!(self.scaling, Scaling::Calibrated { .. })
    }
}

pub const MODE_FIELD: ConfigField = ConfigField::new(0x0007, 0);

const INA219_SADC: ConfigField = ConfigField::new(0x0078, 3);
const INA219_BADC: ConfigField = ConfigField::new(0x0780, 7);

const INA219_AVERAGING: RateTable = RateTable {
    tiers: &[
        (128, 15),
        (64, 14),
        (32, 13),
        (16, 12),
        (8, 11),
        (4, 10),
        (2, 9),
    ],
    floor: 8,
};

const INA219_CONVERSION: RateTable = RateTable {
    tiers: &[
        (68_100, 15),
        (34_050, 14),
        (17_020, 13),
        (8_510, 12),
        (4_260, 11),
        (2_130, 10),
        (1_060, 9),
        (532, 8),
        (276, 2),
        (148, 1),
    ],
    floor: 0,
};

const INA226_AVERAGING: RateTable = RateTable {
    tiers: &[
        (1024, 7),
        (512, 6),
        (256, 5),
        (128, 4),
        (64, 3),
        (16, 2),
        (4, 1),
    ],
    floor: 0,
};

const INA226_CONVERSION: RateTable = RateTable {
    tiers: &[
        (8_244, 7),
        (4_156, 6),
        (2_116, 5),
        (1_100, 4),
        (588, 3),
        (332, 2),
        (204, 1),
    ],
    floor: 0,
};

const INA226_AVG_FIELD: ConfigField = ConfigField::new(0x0E00, 9);
const INA226_BUS_CT: ConfigField = ConfigField::new(0x01C0, 6);
const INA226_SHUNT_CT: ConfigField = ConfigField::new(0x0038, 3);

const MASK_ENABLE_READY: ReadySignal = ReadySignal {
    register: reg::MASK_ENABLE,
    mask: 0x0008,
    clear_by: None,
};

const FULL_ALERTS: AlertSupport = AlertSupport {
    conversion_ready: true,
    shunt_limits: true,
    bus_limits: true,
    power_limit: true,
};

const UNSHIFTED_BUS: DataRegister = DataRegister {
    register: reg::BUS_VOLTAGE,
    shift: 0,
};

const UNSHIFTED_SHUNT: DataRegister = DataRegister {
    register: reg::SHUNT_VOLTAGE,
    shift: 0,
};

const INA226_SCALING: Scaling = Scaling::Calibrated {
    constant: 51_200_000,
    power_multiplier: 25,
    register_bits: 15,
    gain: None,
};

pub static INA219: Profile = Profile {
    name: "INA219",
    power_on_config: 0x399F,
    bus_voltage: DataRegister {
        register: reg::BUS_VOLTAGE,
        shift: 3,
    },
    shunt_voltage: Some(UNSHIFTED_SHUNT),
    current_register: Some(reg::CURRENT),
    power_register: Some(reg::POWER),
    bus_lsb: 400,
    shunt_lsb: 100,
    scaling: Scaling::Calibrated {
        constant: 409_600_000,
        power_multiplier: 20,
        register_bits: 16,
        gain: Some(GainSelect {
            ranges_mv: &[40, 80, 160, 320],
            field: ConfigField::new(0x1800, 11),
            set_bits: 1 << 13,
        }),
    },
    channel_stride: 0,
    averaging: INA219_AVERAGING,
    averaging_fields: &[INA219_SADC, INA219_BADC],
    conversion_time: INA219_CONVERSION,
    bus_conversion_field: INA219_BADC,
    shunt_conversion_field: INA219_SADC,
    ready: ReadySignal {
        register: reg::BUS_VOLTAGE,
        mask: 0x0002,
        clear_by: Some(reg::POWER),
    },
    alerts: None,
};

const INA226_BASE: Profile = Profile {
    name: "INA226",
    power_on_config: 0x4127,
    bus_voltage: UNSHIFTED_BUS,
    shunt_voltage: Some(UNSHIFTED_SHUNT),
    current_register: Some(reg::CURRENT),
    power_register: Some(reg::POWER),
    bus_lsb: 125,
    shunt_lsb: 25,
    scaling: INA226_SCALING,
    channel_stride: 0,
    averaging: INA226_AVERAGING,
    averaging_fields: &[INA226_AVG_FIELD],
    conversion_time: INA226_CONVERSION,
    bus_conversion_field: INA226_BUS_CT,
    shunt_conversion_field: INA226_SHUNT_CT,
    ready: MASK_ENABLE_READY,
    alerts: Some(FULL_ALERTS),
};

pub static INA226: Profile = INA226_BASE;

pub static INA230: Profile = Profile {
    name: "INA230",
    ..INA226_BASE
};

pub static INA231: Profile = Profile {
    name: "INA231",
    ..INA226_BASE
};

pub static INA260: Profile = Profile {
    name: "INA260",
    power_on_config: 0x6127,
    bus_voltage: UNSHIFTED_BUS,
    shunt_voltage: None,
    current_register: Some(reg::SHUNT_VOLTAGE),
    power_register: Some(reg::POWER),
    bus_lsb: 125,
    shunt_lsb: 0,
    scaling: Scaling::FixedShunt {
        current_lsb_na: 1_250_000,
        power_lsb_nw: 10_000_000,
        shunt_micro_ohm: 2_000,
    },
    channel_stride: 0,
    averaging: INA226_AVERAGING,
    averaging_fields: &[INA226_AVG_FIELD],
    conversion_time: INA226_CONVERSION,
    bus_conversion_field: INA226_BUS_CT,
    shunt_conversion_field: INA226_SHUNT_CT,
    ready: MASK_ENABLE_READY,
    alerts: Some(AlertSupport {
        shunt_limits: false,
        ..FULL_ALERTS
    }),
};

pub static INA3221: Profile = Profile {
    name: "INA3221",
    power_on_config: 0x7127,
    bus_voltage: DataRegister {
        register: reg::BUS_VOLTAGE,
        shift: 3,
    },
    shunt_voltage: Some(DataRegister {
        register: reg::SHUNT_VOLTAGE,
        shift: 3,
    }),
    current_register: None,
    power_register: None,
    bus_lsb: 800,
    shunt_lsb: 400,
    scaling: Scaling::VoltageOnly,
    channel_stride: 2,
    averaging: INA226_AVERAGING,
    averaging_fields: &[INA226_AVG_FIELD],
    conversion_time: INA226_CONVERSION,
    bus_conversion_field: INA226_BUS_CT,
    shunt_conversion_field: INA226_SHUNT_CT,
    ready: ReadySignal {
        register: reg::INA3221_MASK_ENABLE,
        mask: 0x0001,
        clear_by: None,
    },
    alerts: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip_covers_closed_set() {
        for tag in 0..8 {
            let family = Family::from_tag(tag).unwrap();
            assert_eq!(family.tag(), tag);
        }
        assert!(Family::from_tag(8).is_none());
        assert!(Family::from_tag(0x0F).is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(Family::Ina219.name(), "INA219");
        assert_eq!(Family::Ina231.name(), "INA231");
        assert_eq!(Family::Ina3221(Channel::Third).name(), "INA3221");
        assert_eq!(Family::Ina3221(Channel::Second).to_string(), "INA3221#1");
    }

    #[test]
    fn test_conversion_table_boundaries() {
        let table = INA226.conversion_time;
        assert_eq!(table.code_for(8244), 7);
        assert_eq!(table.code_for(8243), 6);
        assert_eq!(table.code_for(1_000_000), 7);
        assert_eq!(table.code_for(204), 1);
        assert_eq!(table.code_for(140), 0);
        assert_eq!(table.code_for(0), 0);
    }

    #[test]
    fn test_ina219_tables() {
        assert_eq!(INA219.conversion_time.code_for(532), 8);
        assert_eq!(INA219.conversion_time.code_for(531), 2);
        assert_eq!(INA219.conversion_time.code_for(68_100), 15);
        assert_eq!(INA219.averaging.code_for(1), 8);
        assert_eq!(INA219.averaging.code_for(100), 14);
    }

    #[test]
    fn test_config_field_apply() {
        let field = ConfigField::new(0x01C0, 6);
        assert_eq!(field.apply(0x4127, 7), 0x41E7);
        assert_eq!(field.apply(0xFFFF, 0), 0xFE3F);
        assert_eq!(field.get(0x41E7), 7);
    }

    #[test]
    fn test_gain_tiers() {
        let Scaling::Calibrated {
            gain: Some(gain), ..
        } = INA219.scaling
        else {
            panic!("INA219 must select gain");
        };
        assert_eq!(gain.tier_for(0), 0);
        assert_eq!(gain.tier_for(40), 0);
        assert_eq!(gain.tier_for(41), 1);
        assert_eq!(gain.tier_for(100), 2);
        assert_eq!(gain.tier_for(320), 3);
        assert_eq!(gain.tier_for(5000), 3);
    }

    #[test]
    fn test_only_ina219_and_ina226_family_calibrate() {
        assert!(INA219.has_calibration());
        assert!(INA230.has_calibration());
        assert!(!INA260.has_calibration());
        assert!(!INA3221.has_calibration());
    }
}
