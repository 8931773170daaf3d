//! Bus scan and chip classification.
//!
//! Classification resets the device and compares the post-reset configuration register with
//! the known power-on signatures. Anything that does not match is put back the way it was.

use crate::error::Result;
use crate::family::{reg, Channel, Family};
use core::ops::RangeInclusive;
use i2c_transport::{BusAddress, RegisterBus};

/// Address straps available to INA2xx parts.
pub const SCAN_RANGE: RangeInclusive<u8> = 0x40..=0x4F;

/// Die ID of the INA226 among the parts sharing its configuration signature.
const INA226_DIE_ID: u16 = 0x2260;

/// Outcome of classifying one responding address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// A supported chip. INA3221 is reported with its first channel.
    Sensor(Family),
    /// Reset self-cleared to a configuration value no supported family uses.
    Unrecognized(u16),
    /// The reset command read back verbatim: the register is plain storage.
    NotASensor,
}

/// What a scan found, address by address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanReport {
    /// Registry slots in order; INA3221 contributes three consecutive entries.
    pub registered: Vec<(BusAddress, Family)>,
    pub unrecognized: Vec<(BusAddress, u16)>,
    pub foreign: Vec<BusAddress>,
    /// Addresses where the transport failed; treated as absent.
    pub faulted: Vec<BusAddress>,
    /// Supported chips that did not fit in the descriptor store.
    pub dropped: Vec<(BusAddress, Family)>,
}

impl ScanReport {
    pub fn device_count(&self) -> usize {
        self.registered.len()
    }
}

fn family_for_signature<B: RegisterBus>(
    bus: &mut B,
    address: BusAddress,
    config: u16,
) -> Result<Option<Family>> {
    let family = match config {
        0x399F => Family::Ina219,
        0x4127 => match bus.read_register(address, reg::DIE_ID)? {
            INA226_DIE_ID => Family::Ina226,
            0 => Family::Ina231,
            _ => Family::Ina230,
        },
        0x6127 => Family::Ina260,
        0x7127 => Family::Ina3221(Channel::First),
        _ => return Ok(None),
    };
    Ok(Some(family))
}

/// Reset the device at `address` and classify it from its power-on signature.
pub fn classify<B: RegisterBus>(bus: &mut B, address: BusAddress) -> Result<Classification> {
    let original = bus.read_register(address, reg::CONFIGURATION)?;
    bus.write_register(address, reg::CONFIGURATION, reg::RESET_COMMAND)?;
    let after = bus.read_register(address, reg::CONFIGURATION)?;

    if after == reg::RESET_COMMAND {
        bus.write_register(address, reg::CONFIGURATION, original)?;
        return Ok(Classification::NotASensor);
    }
    match family_for_signature(bus, address, after)? {
        Some(family) => Ok(Classification::Sensor(family)),
        None => {
            bus.write_register(address, reg::CONFIGURATION, original)?;
            Ok(Classification::Unrecognized(after))
        }
    }
}

/// Registry slots a classified chip occupies.
fn slots(family: Family) -> Vec<Family> {
    match family {
        Family::Ina3221(_) => Channel::ALL.into_iter().map(Family::Ina3221).collect(),
        other => vec![other],
    }
}

/// Scan [`SCAN_RANGE`], filling at most `capacity` registry slots.
///
/// A multi-channel chip is registered only if all of its channels fit.
pub fn scan<B: RegisterBus>(bus: &mut B, capacity: usize) -> ScanReport {
    let mut report = ScanReport::default();
    for raw in SCAN_RANGE {
        let Some(address) = BusAddress::new(raw) else {
            continue;
        };
        match bus.detect(address) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::warn!(%address, error = %e, "presence check failed; treating address as absent");
                report.faulted.push(address);
                continue;
            }
        }
        let classification = match classify(bus, address) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%address, error = %e, "classification failed");
                report.faulted.push(address);
                continue;
            }
        };
        match classification {
            Classification::Sensor(family) => {
                let channels = slots(family);
                if report.registered.len() + channels.len() > capacity {
                    tracing::warn!(
                        %address,
                        family = family.name(),
                        capacity,
                        "descriptor store full; device not registered"
                    );
                    report.dropped.push((address, family));
                    continue;
                }
                tracing::debug!(%address, family = family.name(), "identified");
                report
                    .registered
                    .extend(channels.into_iter().map(|f| (address, f)));
            }
            Classification::Unrecognized(config) => {
                tracing::debug!(%address, config, "unrecognized signature; restored");
                report.unrecognized.push((address, config));
            }
            Classification::NotASensor => {
                tracing::debug!(%address, "reset did not self-clear; not a power monitor");
                report.foreign.push(address);
            }
        }
    }
    report
}
