use crate::error::{MonitorError, Result};
use crate::family::{Family, Profile};
use crate::mode::OperatingMode;
use i2c_transport::{BusAddress, RegisterAddr, RECORD_SIZE};

/// Largest full-scale current accepted, in amps.
pub const MAX_SCALE_AMPS: u16 = 1022;

const TAG_BITS: u32 = 4;
const MODE_SHIFT: u32 = 4;
const ADDRESS_SHIFT: u32 = 7;
const AMPS_SHIFT: u32 = 14;
const SHUNT_SHIFT: u32 = 24;
const RESERVED_SHIFT: u32 = 56;

/// Persisted per-device record.
///
/// Packs into one little-endian 64-bit word:
///
/// | bits   | field |
/// |--------|-------|
/// | 0..4   | family tag |
/// | 4..7   | operating mode |
/// | 7..14  | bus address |
/// | 14..24 | full-scale current, amps |
/// | 24..56 | shunt resistance, µΩ |
/// | 56..64 | reserved, zero |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceDescriptor {
    pub family: Family,
    pub mode: OperatingMode,
    pub address: BusAddress,
    pub max_amps: u16,
    pub shunt_micro_ohm: u32,
}

impl DeviceDescriptor {
    pub fn pack(&self) -> [u8; RECORD_SIZE] {
        let word = u64::from(self.family.tag())
            | u64::from(self.mode.bits()) << MODE_SHIFT
            | u64::from(self.address.raw()) << ADDRESS_SHIFT
            | u64::from(self.max_amps & 0x03FF) << AMPS_SHIFT
            | u64::from(self.shunt_micro_ohm) << SHUNT_SHIFT;
        word.to_le_bytes()
    }

    pub fn unpack(record: &[u8; RECORD_SIZE]) -> Result<Self> {
        let word = u64::from_le_bytes(*record);
        if word >> RESERVED_SHIFT != 0 {
            return Err(MonitorError::InvalidDescriptor("reserved bits set"));
        }
        let tag = (word & ((1 << TAG_BITS) - 1)) as u8;
        let family =
            Family::from_tag(tag).ok_or(MonitorError::InvalidDescriptor("unknown family tag"))?;
        let mode = OperatingMode::from_bits((word >> MODE_SHIFT) as u8 & 0x07);
        let address = BusAddress::new((word >> ADDRESS_SHIFT) as u8 & 0x7F)
            .ok_or(MonitorError::InvalidDescriptor("address"))?;
        let max_amps = (word >> AMPS_SHIFT) as u16 & 0x03FF;
        if max_amps == 0 || max_amps > MAX_SCALE_AMPS {
            return Err(MonitorError::InvalidDescriptor("full-scale current"));
        }
        let shunt_micro_ohm = (word >> SHUNT_SHIFT) as u32;
        Ok(Self {
            family,
            mode,
            address,
            max_amps,
            shunt_micro_ohm,
        })
    }
}

/// Values derived from a descriptor on every load. Never persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceRuntime {
    pub bus_voltage_register: RegisterAddr,
    pub shunt_voltage_register: Option<RegisterAddr>,
    pub current_register: Option<RegisterAddr>,
    pub power_register: Option<RegisterAddr>,
    /// 10 µV units.
    pub bus_voltage_lsb: u32,
    /// 100 nV units.
    pub shunt_voltage_lsb: u32,
    /// nA per code.
    pub current_lsb: u64,
    /// nW per code.
    pub power_lsb: u64,
    pub calibration: Option<u16>,
    /// Programmable gain tier written with the calibration, where the family has one.
    pub gain: Option<u16>,
}

/// A registered device: its persisted descriptor plus the derived runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    pub runtime: DeviceRuntime,
}

impl Device {
    pub fn family(&self) -> Family {
        self.descriptor.family
    }

    pub fn profile(&self) -> &'static Profile {
        self.descriptor.family.profile()
    }

    pub fn address(&self) -> BusAddress {
        self.descriptor.address
    }

    pub fn mode(&self) -> OperatingMode {
        self.descriptor.mode
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.family.name()
    }
}
