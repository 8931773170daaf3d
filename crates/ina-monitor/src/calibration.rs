//! Integer-only fixed-point calibration.
//!
//! Every chain multiplies fully before dividing, with 64-bit intermediates, so the largest
//! inputs (1022 A, `u32::MAX` µΩ) cannot overflow.

use crate::descriptor::{DeviceDescriptor, DeviceRuntime, MAX_SCALE_AMPS};
use crate::error::{MonitorError, Result};
use crate::family::{Family, GainSelect, Scaling};

/// Largest positive raw code of a signed 16-bit current register.
pub const FULL_SCALE_CODE: u64 = 32_767;

const NANO: u64 = 1_000_000_000;
const SHUNT_DIVISOR: u64 = 100_000;

/// Validate and normalise user calibration inputs.
///
/// Zero current or zero shunt resistance is rejected; currents above the encodable maximum
/// are clamped to it.
pub fn validate_inputs(max_amps: u32, shunt_micro_ohm: u32) -> Result<(u16, u32)> {
    if max_amps == 0 {
        return Err(MonitorError::InvalidParameter("max_amps must be at least 1"));
    }
    if shunt_micro_ohm == 0 {
        return Err(MonitorError::InvalidParameter(
            "shunt resistance must be non-zero",
        ));
    }
    let clamped = max_amps.min(u32::from(MAX_SCALE_AMPS));
    if clamped != max_amps {
        tracing::debug!(max_amps, clamped, "full-scale current clamped");
    }
    Ok((clamped as u16, shunt_micro_ohm))
}

/// Shunt resistance actually in circuit: the integrated shunt for families that have one.
pub fn effective_shunt(family: Family, requested_micro_ohm: u32) -> u32 {
    match family.profile().scaling {
        Scaling::FixedShunt {
            shunt_micro_ohm, ..
        } => shunt_micro_ohm,
        _ => requested_micro_ohm,
    }
}

/// Current LSB in nA per code such that code 32767 reads `max_amps`.
pub fn current_lsb(max_amps: u16) -> u64 {
    u64::from(max_amps) * NANO / FULL_SCALE_CODE
}

/// Calibration register value for `constant`, or an overflow error when the divisor
/// vanishes or the result is wider than `register_bits`.
pub fn calibration_value(
    family: Family,
    constant: u64,
    register_bits: u32,
    current_lsb: u64,
    shunt_micro_ohm: u32,
) -> Result<u16> {
    let divisor = current_lsb * u64::from(shunt_micro_ohm) / SHUNT_DIVISOR;
    let overflow = |value| MonitorError::CalibrationOverflow {
        family: family.name(),
        value,
        bits: register_bits,
    };
    if divisor == 0 {
        return Err(overflow(u64::MAX));
    }
    let value = constant / divisor;
    let limit = (1u64 << register_bits) - 1;
    if value > limit {
        return Err(overflow(value));
    }
    Ok(value as u16)
}

/// Expected full-scale shunt drop in millivolts.
pub fn full_scale_millivolts(max_amps: u16, shunt_micro_ohm: u32) -> u64 {
    u64::from(max_amps) * u64::from(shunt_micro_ohm) / 1000
}

/// Configuration register value carrying the gain tier of `gain`.
pub fn gain_config(gain: &GainSelect, config: u16, tier: u16) -> u16 {
    gain.field.apply(config, tier) | gain.set_bits
}

/// Recompute every derived field of `descriptor`.
pub fn derive(descriptor: &DeviceDescriptor) -> Result<DeviceRuntime> {
    let family = descriptor.family;
    let profile = family.profile();
    let offset = profile.channel_stride * family.channel();

    let (current_lsb, power_lsb, calibration, gain) = match profile.scaling {
        Scaling::Calibrated {
            constant,
            power_multiplier,
            register_bits,
            gain,
        } => {
            let lsb = current_lsb(descriptor.max_amps);
            let cal = calibration_value(
                family,
                constant,
                register_bits,
                lsb,
                descriptor.shunt_micro_ohm,
            )?;
            let tier = gain.map(|g| {
                g.tier_for(full_scale_millivolts(
                    descriptor.max_amps,
                    descriptor.shunt_micro_ohm,
                ))
            });
            (lsb, lsb * power_multiplier, Some(cal), tier)
        }
        Scaling::FixedShunt {
            current_lsb_na,
            power_lsb_nw,
            ..
        } => (current_lsb_na, power_lsb_nw, None, None),
        Scaling::VoltageOnly => (0, 0, None, None),
    };

    Ok(DeviceRuntime {
        bus_voltage_register: profile.bus_voltage.register + offset,
        shunt_voltage_register: profile.shunt_voltage.map(|r| r.register + offset),
        current_register: profile.current_register,
        power_register: profile.power_register,
        bus_voltage_lsb: profile.bus_lsb,
        shunt_voltage_lsb: profile.shunt_lsb,
        current_lsb,
        power_lsb,
        calibration,
        gain,
    })
}
