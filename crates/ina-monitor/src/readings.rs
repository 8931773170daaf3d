//! Raw register codes to engineering units.
//!
//! Units: bus voltage mV, shunt voltage µV, current µA, power µW. Bus LSBs are in 10 µV,
//! shunt LSBs in 100 nV, current LSBs in nA and power LSBs in nW.

use crate::error::{MonitorError, Result};

/// Unsigned field in the upper bits of a register.
pub fn unsigned_field(raw: u16, shift: u8) -> u16 {
    raw >> shift
}

/// Signed field in the upper bits of a register; the vacated high bits take the sign.
pub fn signed_field(raw: u16, shift: u8) -> i16 {
    (raw as i16) >> shift
}

pub fn bus_millivolts(code: u16, bus_lsb: u32) -> u32 {
    (u64::from(code) * u64::from(bus_lsb) / 100) as u32
}

pub fn shunt_microvolts(code: i16, shunt_lsb: u32) -> i32 {
    (i64::from(code) * i64::from(shunt_lsb) / 10) as i32
}

pub fn current_microamps(code: i16, current_lsb: u64) -> i32 {
    saturate(i64::from(code) * current_lsb as i64 / 1000)
}

/// Current through the shunt by Ohm's law.
pub fn microamps_from_shunt(shunt_microvolts: i32, shunt_micro_ohm: u32) -> Result<i32> {
    if shunt_micro_ohm == 0 {
        return Err(MonitorError::InvalidParameter(
            "shunt resistance must be non-zero",
        ));
    }
    Ok(saturate(
        i64::from(shunt_microvolts) * 1_000_000 / i64::from(shunt_micro_ohm),
    ))
}

/// Drop across a shunt carrying `microamps`.
pub fn shunt_from_current(microamps: i32, shunt_micro_ohm: u32) -> i32 {
    saturate(i64::from(microamps) * i64::from(shunt_micro_ohm) / 1_000_000)
}

/// Power register code to µW. The register is unsigned; direction comes from the
/// current or shunt reading.
pub fn power_microwatts(code: u16, power_lsb: u64, negative: bool) -> i64 {
    let magnitude = (u64::from(code) * power_lsb / 1000) as i64;
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Power computed in software from current and bus voltage.
pub fn power_from_readings(microamps: i32, millivolts: u32) -> i64 {
    i64::from(microamps) * i64::from(millivolts) / 1000
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
