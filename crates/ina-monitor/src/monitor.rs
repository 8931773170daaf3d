//! The monitor: registry lifecycle, per-device settings, readings and alerts.
//!
//! Every operation addresses devices by registry index or broadcasts with [`Target::All`].
//! Descriptors are loaded through the single-slot cache before each register access.

use crate::alerts::{self, AlertKind};
use crate::cache::DescriptorCache;
use crate::calibration;
use crate::config::MonitorConfig;
use crate::descriptor::{Device, DeviceDescriptor};
use crate::error::{MonitorError, Result};
use crate::family::{reg, Scaling};
use crate::identify::{self, ScanReport};
use crate::mode::OperatingMode;
use crate::readings;
use i2c_transport::{BusAddress, DescriptorStore, RegisterBus, RECORD_SIZE};
use std::ops::Range;

const ERASED_RECORD: [u8; RECORD_SIZE] = [0xFF; RECORD_SIZE];

/// Which registered devices an operation applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    All,
    Index(u8),
}

impl From<u8> for Target {
    fn from(index: u8) -> Self {
        Target::Index(index)
    }
}

/// Channel a reading samples, deciding whether a triggered device is re-armed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Quantity {
    Bus,
    Shunt,
    Both,
}

impl Quantity {
    fn rearms(self, mode: OperatingMode) -> bool {
        mode.is_triggered()
            && match self {
                Quantity::Bus => mode.measures_bus(),
                Quantity::Shunt => mode.measures_shunt(),
                Quantity::Both => mode.measures_bus() || mode.measures_shunt(),
            }
    }
}

/// Driver for every INA2xx power monitor on one bus.
///
/// The registry is built by the first [`InaMonitor::begin`]; it lives in the descriptor store,
/// one packed record per device, and is read back through a single-slot cache.
pub struct InaMonitor<B, S> {
    bus: B,
    store: S,
    cache: DescriptorCache,
    device_count: u8,
    last_scan: Option<ScanReport>,
}

impl<B: RegisterBus, S: DescriptorStore> InaMonitor<B, S> {
    /// Monitor with an empty registry; the first `begin` scans the bus.
    pub fn new(bus: B, store: S) -> Self {
        Self {
            bus,
            store,
            cache: DescriptorCache::new(),
            device_count: 0,
            last_scan: None,
        }
    }

    /// Monitor whose registry is restored from records persisted by an earlier session.
    ///
    /// Records are read from index 0 up to the first one that does not decode.
    pub fn from_store(bus: B, store: S) -> Result<Self> {
        let mut monitor = Self::new(bus, store);
        let records = monitor.store.records();
        let mut count = 0usize;
        while count < records {
            let record = monitor.store.get(count as u8)?;
            if DeviceDescriptor::unpack(&record).is_err() {
                break;
            }
            count += 1;
        }
        monitor.device_count = count as u8;
        tracing::info!(devices = count, "registry restored from descriptor store");
        Ok(monitor)
    }

    /// Calibrate devices for `max_amps` full scale through a `shunt_micro_ohm` shunt.
    ///
    /// The first call scans the bus, registers every supported device and initialises all of
    /// them in continuous mode; `target` is not consulted. Later calls recalibrate only the
    /// targeted devices. Returns the number of registered devices.
    pub fn begin(
        &mut self,
        max_amps: u32,
        shunt_micro_ohm: u32,
        target: impl Into<Target>,
    ) -> Result<usize> {
        let (max_amps, shunt_micro_ohm) =
            calibration::validate_inputs(max_amps, shunt_micro_ohm)?;
        if self.device_count == 0 {
            return self.scan_and_register(max_amps, shunt_micro_ohm);
        }
        for index in self.indices(target.into())? {
            self.recalibrate(index, max_amps, shunt_micro_ohm)?;
        }
        Ok(self.device_count())
    }

    /// Discard the registry and scan again.
    pub fn rescan(&mut self, max_amps: u32, shunt_micro_ohm: u32) -> Result<usize> {
        let (max_amps, shunt_micro_ohm) =
            calibration::validate_inputs(max_amps, shunt_micro_ohm)?;
        self.cache.invalidate();
        self.device_count = 0;
        self.scan_and_register(max_amps, shunt_micro_ohm)
    }

    fn scan_and_register(&mut self, max_amps: u16, shunt_micro_ohm: u32) -> Result<usize> {
        let report = identify::scan(&mut self.bus, self.store.records());

        let devices = report
            .registered
            .iter()
            .map(|&(address, family)| {
                let descriptor = DeviceDescriptor {
                    family,
                    mode: OperatingMode::ContinuousBoth,
                    address,
                    max_amps,
                    shunt_micro_ohm: calibration::effective_shunt(family, shunt_micro_ohm),
                };
                Ok(Device {
                    descriptor,
                    runtime: calibration::derive(&descriptor)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (index, device) in devices.iter().enumerate() {
            self.cache.store(&mut self.store, index as u8, *device)?;
            self.program(device)?;
        }
        if devices.len() < self.store.records() {
            self.store.put(devices.len() as u8, &ERASED_RECORD)?;
        }
        self.device_count = devices.len() as u8;

        tracing::info!(
            devices = report.registered.len(),
            unrecognized = report.unrecognized.len(),
            foreign = report.foreign.len(),
            faulted = report.faulted.len(),
            dropped = report.dropped.len(),
            "bus scan complete"
        );
        self.last_scan = Some(report);
        Ok(self.device_count())
    }

    fn recalibrate(&mut self, index: u8, max_amps: u16, shunt_micro_ohm: u32) -> Result<()> {
        let mut device = self.load(index)?;
        device.descriptor.max_amps = max_amps;
        device.descriptor.shunt_micro_ohm =
            calibration::effective_shunt(device.family(), shunt_micro_ohm);
        device.runtime = calibration::derive(&device.descriptor)?;
        self.cache.store(&mut self.store, index, device)?;
        self.program(&device)?;
        tracing::debug!(index, family = %device.family(), max_amps, "recalibrated");
        Ok(())
    }

    /// Write mode, gain and calibration of `device` to the chip.
    fn program(&mut self, device: &Device) -> Result<()> {
        let address = device.address();
        let mut config = device
            .mode()
            .apply(self.bus.read_register(address, reg::CONFIGURATION)?);
        if let (
            Scaling::Calibrated {
                gain: Some(gain), ..
            },
            Some(tier),
        ) = (device.profile().scaling, device.runtime.gain)
        {
            config = calibration::gain_config(&gain, config, tier);
        }
        self.bus
            .write_register(address, reg::CONFIGURATION, config)?;
        if let Some(calibration) = device.runtime.calibration {
            self.bus
                .write_register(address, reg::CALIBRATION, calibration)?;
        }
        Ok(())
    }

    fn indices(&self, target: Target) -> Result<Range<u8>> {
        match target {
            Target::All => Ok(0..self.device_count),
            Target::Index(index) if index < self.device_count => Ok(index..index + 1),
            Target::Index(index) => Err(MonitorError::UnknownDevice(index)),
        }
    }

    fn load(&mut self, index: u8) -> Result<Device> {
        if index >= self.device_count {
            return Err(MonitorError::UnknownDevice(index));
        }
        self.cache.load(&mut self.store, index)
    }

    /// One device per physical chip among the targets.
    fn target_chips(&mut self, target: Target) -> Result<Vec<Device>> {
        let mut chips: Vec<Device> = Vec::new();
        for index in self.indices(target)? {
            let device = self.load(index)?;
            if !chips.iter().any(|c| c.address() == device.address()) {
                chips.push(device);
            }
        }
        Ok(chips)
    }

    fn update_config(
        &mut self,
        target: Target,
        update: impl Fn(&Device, u16) -> u16,
    ) -> Result<()> {
        for chip in self.target_chips(target)? {
            let address = chip.address();
            let config = self.bus.read_register(address, reg::CONFIGURATION)?;
            let updated = update(&chip, config);
            self.bus
                .write_register(address, reg::CONFIGURATION, updated)?;
            tracing::debug!(%address, config = updated, "configuration updated");
        }
        Ok(())
    }

    /// Switch the operating mode and persist it.
    ///
    /// Channels of a multi-channel chip share its configuration register, so every slot at
    /// a targeted address takes the new mode.
    pub fn set_mode(&mut self, mode: OperatingMode, target: impl Into<Target>) -> Result<()> {
        let chips = self.target_chips(target.into())?;
        for chip in &chips {
            let address = chip.address();
            let config = self.bus.read_register(address, reg::CONFIGURATION)?;
            self.bus
                .write_register(address, reg::CONFIGURATION, mode.apply(config))?;
        }
        for index in 0..self.device_count {
            let mut device = self.load(index)?;
            if device.mode() != mode && chips.iter().any(|c| c.address() == device.address()) {
                device.descriptor.mode = mode;
                self.cache.store(&mut self.store, index, device)?;
            }
        }
        tracing::debug!(?mode, chips = chips.len(), "mode set");
        Ok(())
    }

    /// Average `samples` readings per conversion, rounded down to a supported count.
    pub fn set_averaging(&mut self, samples: u32, target: impl Into<Target>) -> Result<()> {
        self.update_config(target.into(), |device, config| {
            let profile = device.profile();
            let code = profile.averaging.code_for(samples);
            profile
                .averaging_fields
                .iter()
                .fold(config, |config, field| field.apply(config, code))
        })
    }

    /// Bus voltage conversion time in µs, rounded down to a supported tier.
    pub fn set_bus_conversion_time(
        &mut self,
        micros: u32,
        target: impl Into<Target>,
    ) -> Result<()> {
        self.update_config(target.into(), |device, config| {
            let profile = device.profile();
            profile
                .bus_conversion_field
                .apply(config, profile.conversion_time.code_for(micros))
        })
    }

    /// Shunt voltage conversion time in µs, rounded down to a supported tier.
    pub fn set_shunt_conversion_time(
        &mut self,
        micros: u32,
        target: impl Into<Target>,
    ) -> Result<()> {
        self.update_config(target.into(), |device, config| {
            let profile = device.profile();
            profile
                .shunt_conversion_field
                .apply(config, profile.conversion_time.code_for(micros))
        })
    }

    /// Power-on reset, then restore the persisted mode and calibration.
    pub fn reset(&mut self, target: impl Into<Target>) -> Result<()> {
        let chips = self.target_chips(target.into())?;
        for chip in &chips {
            self.bus
                .write_register(chip.address(), reg::CONFIGURATION, reg::RESET_COMMAND)?;
        }
        for index in 0..self.device_count {
            let device = self.load(index)?;
            if chips.iter().any(|c| c.address() == device.address()) {
                self.program(&device)?;
            }
        }
        tracing::debug!(chips = chips.len(), "reset");
        Ok(())
    }

    /// Read through `sample`, then re-arm a one-shot conversion if the channel read is
    /// triggered.
    fn sample<T>(
        &mut self,
        index: u8,
        quantity: Quantity,
        sample: impl FnOnce(&mut B, &Device) -> Result<T>,
    ) -> Result<T> {
        let device = self.load(index)?;
        let value = sample(&mut self.bus, &device)?;
        if quantity.rearms(device.mode()) {
            let address = device.address();
            let config = self.bus.read_register(address, reg::CONFIGURATION)?;
            self.bus
                .write_register(address, reg::CONFIGURATION, config)?;
            tracing::trace!(%address, "one-shot conversion re-armed");
        }
        Ok(value)
    }

    /// Bus voltage code with status bits removed.
    pub fn bus_raw(&mut self, index: u8) -> Result<u16> {
        self.sample(index, Quantity::Bus, read_bus_code)
    }

    /// Signed shunt voltage code.
    pub fn shunt_raw(&mut self, index: u8) -> Result<i16> {
        self.sample(index, Quantity::Shunt, |bus, device| {
            read_shunt_code(bus, device)?.ok_or(MonitorError::Unsupported {
                family: device.name(),
                operation: "shunt voltage register",
            })
        })
    }

    pub fn bus_millivolts(&mut self, index: u8) -> Result<u32> {
        self.sample(index, Quantity::Bus, read_millivolts)
    }

    pub fn shunt_microvolts(&mut self, index: u8) -> Result<i32> {
        self.sample(index, Quantity::Shunt, read_microvolts)
    }

    pub fn bus_microamps(&mut self, index: u8) -> Result<i32> {
        self.sample(index, Quantity::Shunt, read_microamps)
    }

    pub fn bus_microwatts(&mut self, index: u8) -> Result<i64> {
        self.sample(index, Quantity::Both, read_microwatts)
    }

    /// Block until each targeted chip reports a finished conversion.
    ///
    /// There is no timeout: a chip in shutdown never finishes. Use
    /// [`InaMonitor::conversion_finished`] to poll with a deadline.
    pub fn wait_for_conversion(&mut self, target: impl Into<Target>) -> Result<()> {
        for chip in self.target_chips(target.into())? {
            while !poll_ready(&mut self.bus, &chip)? {
                std::hint::spin_loop();
            }
        }
        Ok(())
    }

    /// Non-blocking check of the conversion-ready flag; clears it when set.
    pub fn conversion_finished(&mut self, index: u8) -> Result<bool> {
        let device = self.load(index)?;
        poll_ready(&mut self.bus, &device)
    }

    /// Route `kind` to the alert pin, optionally writing its limit.
    ///
    /// Targeted devices whose family lacks the function are skipped; every other targeted
    /// device is programmed. Returns `Ok(false)` when any device was skipped or nothing was
    /// targeted.
    pub fn configure_alert(
        &mut self,
        kind: AlertKind,
        enabled: bool,
        threshold: Option<i64>,
        target: impl Into<Target>,
    ) -> Result<bool> {
        if threshold.is_some() && !kind.takes_threshold() {
            return Err(MonitorError::InvalidParameter(
                "conversion-ready alert takes no threshold",
            ));
        }
        let mut devices = Vec::new();
        let mut skipped = false;
        for index in self.indices(target.into())? {
            let device = self.load(index)?;
            let supported = device
                .profile()
                .alerts
                .is_some_and(|caps| kind.supported(&caps));
            if !supported {
                tracing::debug!(index, family = device.name(), %kind, "alert not supported");
                skipped = true;
                continue;
            }
            let limit = threshold
                .map(|t| alerts::limit_code(kind, &device.runtime, t))
                .transpose()?;
            devices.push((device, limit));
        }
        let programmed = !devices.is_empty();
        for (device, limit) in devices {
            let address = device.address();
            let mask = self.bus.read_register(address, reg::MASK_ENABLE)?;
            self.bus.write_register(
                address,
                reg::MASK_ENABLE,
                alerts::mask_enable_value(mask, kind, enabled),
            )?;
            if let Some(limit) = limit {
                self.bus.write_register(address, reg::ALERT_LIMIT, limit)?;
            }
        }
        Ok(programmed && !skipped)
    }

    pub fn alert_on_conversion(&mut self, enabled: bool, target: impl Into<Target>) -> Result<bool> {
        self.configure_alert(AlertKind::ConversionReady, enabled, None, target)
    }

    pub fn alert_on_shunt_over_voltage(
        &mut self,
        enabled: bool,
        microvolts: i32,
        target: impl Into<Target>,
    ) -> Result<bool> {
        let threshold = enabled.then_some(i64::from(microvolts));
        self.configure_alert(AlertKind::ShuntOverVoltage, enabled, threshold, target)
    }

    pub fn alert_on_shunt_under_voltage(
        &mut self,
        enabled: bool,
        microvolts: i32,
        target: impl Into<Target>,
    ) -> Result<bool> {
        let threshold = enabled.then_some(i64::from(microvolts));
        self.configure_alert(AlertKind::ShuntUnderVoltage, enabled, threshold, target)
    }

    pub fn alert_on_bus_over_voltage(
        &mut self,
        enabled: bool,
        millivolts: u32,
        target: impl Into<Target>,
    ) -> Result<bool> {
        let threshold = enabled.then_some(i64::from(millivolts));
        self.configure_alert(AlertKind::BusOverVoltage, enabled, threshold, target)
    }

    pub fn alert_on_bus_under_voltage(
        &mut self,
        enabled: bool,
        millivolts: u32,
        target: impl Into<Target>,
    ) -> Result<bool> {
        let threshold = enabled.then_some(i64::from(millivolts));
        self.configure_alert(AlertKind::BusUnderVoltage, enabled, threshold, target)
    }

    pub fn alert_on_power_over_limit(
        &mut self,
        enabled: bool,
        microwatts: i64,
        target: impl Into<Target>,
    ) -> Result<bool> {
        let threshold = enabled.then_some(microwatts);
        self.configure_alert(AlertKind::PowerOverLimit, enabled, threshold, target)
    }

    /// Run `begin` with the configured defaults, then the global settings, then the
    /// per-address overrides.
    pub fn apply_config(&mut self, config: &MonitorConfig) -> Result<usize> {
        let count = self.begin(config.max_amps, config.shunt_micro_ohm, Target::All)?;
        if let Some(mode) = config.mode {
            self.set_mode(mode, Target::All)?;
        }
        if let Some(samples) = config.averaging {
            self.set_averaging(samples, Target::All)?;
        }
        if let Some(micros) = config.bus_conversion_us {
            self.set_bus_conversion_time(micros, Target::All)?;
        }
        if let Some(micros) = config.shunt_conversion_us {
            self.set_shunt_conversion_time(micros, Target::All)?;
        }
        for entry in &config.overrides {
            let mut matched = false;
            for index in 0..self.device_count {
                if self.load(index)?.address().raw() != entry.address {
                    continue;
                }
                matched = true;
                if entry.max_amps.is_some() || entry.shunt_micro_ohm.is_some() {
                    self.begin(
                        entry.max_amps.unwrap_or(config.max_amps),
                        entry.shunt_micro_ohm.unwrap_or(config.shunt_micro_ohm),
                        index,
                    )?;
                }
                if let Some(mode) = entry.mode {
                    self.set_mode(mode, index)?;
                }
            }
            if !matched {
                tracing::warn!(address = entry.address, "override names no registered device");
            }
        }
        Ok(count)
    }

    pub fn device_count(&self) -> usize {
        usize::from(self.device_count)
    }

    pub fn device(&mut self, index: u8) -> Result<Device> {
        self.load(index)
    }

    pub fn device_name(&mut self, index: u8) -> Result<&'static str> {
        Ok(self.load(index)?.name())
    }

    pub fn device_address(&mut self, index: u8) -> Result<BusAddress> {
        Ok(self.load(index)?.address())
    }

    /// Report of the scan that built the registry, if this session ran one.
    pub fn last_scan(&self) -> Option<&ScanReport> {
        self.last_scan.as_ref()
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (B, S) {
        (self.bus, self.store)
    }
}

fn read_bus_code<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<u16> {
    let raw = bus.read_register(device.address(), device.runtime.bus_voltage_register)?;
    Ok(readings::unsigned_field(
        raw,
        device.profile().bus_voltage.shift,
    ))
}

fn read_shunt_code<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<Option<i16>> {
    let (Some(register), Some(layout)) = (
        device.runtime.shunt_voltage_register,
        device.profile().shunt_voltage,
    ) else {
        return Ok(None);
    };
    let raw = bus.read_register(device.address(), register)?;
    Ok(Some(readings::signed_field(raw, layout.shift)))
}

fn read_current_code<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<Option<i16>> {
    match device.runtime.current_register {
        Some(register) => Ok(Some(bus.read_register(device.address(), register)? as i16)),
        None => Ok(None),
    }
}

fn read_millivolts<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<u32> {
    let code = read_bus_code(bus, device)?;
    Ok(readings::bus_millivolts(code, device.runtime.bus_voltage_lsb))
}

fn read_microamps<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<i32> {
    if let Some(code) = read_current_code(bus, device)? {
        return Ok(readings::current_microamps(code, device.runtime.current_lsb));
    }
    match read_shunt_code(bus, device)? {
        Some(code) => readings::microamps_from_shunt(
            readings::shunt_microvolts(code, device.runtime.shunt_voltage_lsb),
            device.descriptor.shunt_micro_ohm,
        ),
        None => Err(MonitorError::Unsupported {
            family: device.name(),
            operation: "current measurement",
        }),
    }
}

fn read_microvolts<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<i32> {
    match read_shunt_code(bus, device)? {
        Some(code) => Ok(readings::shunt_microvolts(
            code,
            device.runtime.shunt_voltage_lsb,
        )),
        None => {
            let microamps = read_microamps(bus, device)?;
            Ok(readings::shunt_from_current(
                microamps,
                device.descriptor.shunt_micro_ohm,
            ))
        }
    }
}

fn read_microwatts<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<i64> {
    let Some(register) = device.runtime.power_register else {
        let microamps = read_microamps(bus, device)?;
        let millivolts = read_millivolts(bus, device)?;
        return Ok(readings::power_from_readings(microamps, millivolts));
    };
    let code = bus.read_register(device.address(), register)?;
    let negative = match read_current_code(bus, device)? {
        Some(current) => current < 0,
        None => read_shunt_code(bus, device)?.is_some_and(|shunt| shunt < 0),
    };
    Ok(readings::power_microwatts(
        code,
        device.runtime.power_lsb,
        negative,
    ))
}

/// Read the ready flag; when set, issue the family's clearing read.
fn poll_ready<B: RegisterBus>(bus: &mut B, device: &Device) -> Result<bool> {
    let ready = device.profile().ready;
    let address = device.address();
    if bus.read_register(address, ready.register)? & ready.mask == 0 {
        return Ok(false);
    }
    if let Some(clear) = ready.clear_by {
        bus.read_register(address, clear)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{Channel, Family};
    use i2c_transport::{MemoryStore, MockBus, MockDevice, Transaction};

    fn monitor(bus: MockBus) -> InaMonitor<MockBus, MemoryStore> {
        InaMonitor::new(bus, MemoryStore::default())
    }

    fn writes_to(bus: &MockBus, register: u8) -> Vec<u16> {
        bus.log()
            .iter()
            .filter_map(|t| match t {
                Transaction::Write {
                    register: r, value, ..
                } if *r == register => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_begin_programs_ina219() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina219()));
        assert_eq!(m.begin(1, 100_000, Target::All).unwrap(), 1);
        assert_eq!(m.device_name(0).unwrap(), "INA219");
        assert_eq!(m.device(0).unwrap().runtime.current_lsb, 30_518);
        assert_eq!(m.bus().register(0x40, reg::CALIBRATION), Some(13_421));
        assert_eq!(m.bus().register(0x40, reg::CONFIGURATION), Some(0x319F));
    }

    #[test]
    fn test_begin_rejects_bad_inputs() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina219()));
        assert!(matches!(
            m.begin(0, 100_000, Target::All),
            Err(MonitorError::InvalidParameter(_))
        ));
        assert!(m.begin(1, 0, Target::All).is_err());
        assert_eq!(m.device_count(), 0);
    }

    #[test]
    fn test_begin_clamps_max_current() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(5000, 100, Target::All).unwrap();
        assert_eq!(m.device(0).unwrap().descriptor.max_amps, 1022);
    }

    #[test]
    fn test_empty_bus_is_not_an_error() {
        let mut m = monitor(MockBus::new());
        assert_eq!(m.begin(1, 100_000, Target::All).unwrap(), 0);
        assert!(matches!(m.bus_millivolts(0), Err(MonitorError::UnknownDevice(0))));
    }

    #[test]
    fn test_second_begin_recalibrates_target_only() {
        let mut m = monitor(
            MockBus::new()
                .with_device(0x40, MockDevice::ina226())
                .with_device(0x41, MockDevice::ina226()),
        );
        m.begin(1, 100_000, Target::All).unwrap();
        assert_eq!(m.begin(2, 100_000, Target::Index(1)).unwrap(), 2);
        assert_eq!(m.bus().register(0x40, reg::CALIBRATION), Some(1_677));
        assert_eq!(m.bus().register(0x41, reg::CALIBRATION), Some(838));
        assert_eq!(m.device(1).unwrap().descriptor.max_amps, 2);
    }

    #[test]
    fn test_calibration_overflow_registers_nothing() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        assert!(matches!(
            m.begin(1, 1_000, Target::All),
            Err(MonitorError::CalibrationOverflow { .. })
        ));
        assert_eq!(m.device_count(), 0);
        assert!(writes_to(m.bus(), reg::CALIBRATION).is_empty());
    }

    #[test]
    fn test_set_mode_idempotent_and_persisted() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_mode(OperatingMode::TriggeredBus, Target::All).unwrap();
        let once = m.bus().register(0x40, reg::CONFIGURATION);
        m.set_mode(OperatingMode::TriggeredBus, Target::All).unwrap();
        assert_eq!(m.bus().register(0x40, reg::CONFIGURATION), once);
        assert_eq!(once.map(|c| c & 0x7), Some(2));

        let (bus, store) = m.into_parts();
        let mut restored = InaMonitor::from_store(bus, store).unwrap();
        assert_eq!(restored.device(0).unwrap().mode(), OperatingMode::TriggeredBus);
    }

    #[test]
    fn test_mode_shared_by_channels() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina3221()));
        assert_eq!(m.begin(1, 100_000, Target::All).unwrap(), 3);
        m.set_mode(OperatingMode::ContinuousShunt, Target::Index(1)).unwrap();
        for index in 0..3 {
            assert_eq!(m.device(index).unwrap().mode(), OperatingMode::ContinuousShunt);
        }
    }

    #[test]
    fn test_conversion_time_tiers() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_bus_conversion_time(8244, Target::All).unwrap();
        m.set_shunt_conversion_time(300, Target::All).unwrap();
        let config = m.bus().register(0x40, reg::CONFIGURATION).unwrap();
        assert_eq!((config >> 6) & 0x7, 7);
        assert_eq!((config >> 3) & 0x7, 1);
        assert_eq!(config & 0x7, 7);
    }

    #[test]
    fn test_averaging_ina219_sets_both_adcs() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina219()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_averaging(128, Target::All).unwrap();
        let config = m.bus().register(0x40, reg::CONFIGURATION).unwrap();
        assert_eq!((config >> 3) & 0xF, 15);
        assert_eq!((config >> 7) & 0xF, 15);
        assert_eq!(config & 0x1800, 0x1000);
    }

    #[test]
    fn test_averaging_ina226() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_averaging(100, Target::All).unwrap();
        let config = m.bus().register(0x40, reg::CONFIGURATION).unwrap();
        assert_eq!((config >> 9) & 0x7, 3);
    }

    #[test]
    fn test_readings_ina226() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        let bus = m.bus_mut();
        bus.set_register(0x40, reg::BUS_VOLTAGE, 9600);
        bus.set_register(0x40, reg::SHUNT_VOLTAGE, (-400i16) as u16);
        bus.set_register(0x40, reg::CURRENT, (-1000i16) as u16);
        bus.set_register(0x40, reg::POWER, 100);
        assert_eq!(m.bus_millivolts(0).unwrap(), 12_000);
        assert_eq!(m.shunt_microvolts(0).unwrap(), -1000);
        assert_eq!(m.bus_microamps(0).unwrap(), -30_518);
        assert_eq!(m.bus_microwatts(0).unwrap(), -76_295);
        assert_eq!(m.shunt_raw(0).unwrap(), -400);
        assert_eq!(m.bus_raw(0).unwrap(), 9600);
    }

    #[test]
    fn test_ina219_bus_register_shift() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina219()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_mut().set_register(0x40, reg::BUS_VOLTAGE, 3000 << 3);
        // the ready flag (bit 1) is set while converting and must not leak into the code
        assert_eq!(m.bus_raw(0).unwrap(), 3000);
        assert_eq!(m.bus_millivolts(0).unwrap(), 12_000);
    }

    #[test]
    fn test_ina260_ignores_shunt_argument() {
        let mut readings = Vec::new();
        for shunt in [100_000, 1] {
            let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina260()));
            m.begin(1, shunt, Target::All).unwrap();
            m.bus_mut().set_register(0x40, reg::SHUNT_VOLTAGE, 800);
            readings.push(m.bus_microamps(0).unwrap());
            assert_eq!(m.shunt_microvolts(0).unwrap(), 2_000);
            assert!(matches!(m.shunt_raw(0), Err(MonitorError::Unsupported { .. })));
            assert!(writes_to(m.bus(), reg::CALIBRATION).is_empty());
        }
        assert_eq!(readings, vec![1_000_000, 1_000_000]);
    }

    #[test]
    fn test_ina3221_channels() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina3221()));
        m.begin(1, 100_000, Target::All).unwrap();
        let bus = m.bus_mut();
        // channel 2: 12 V bus, -3.2 mV shunt
        bus.set_register(0x40, 0x06, 1500 << 3);
        bus.set_register(0x40, 0x05, (-80i16 << 3) as u16);
        assert_eq!(m.bus_millivolts(2).unwrap(), 12_000);
        assert_eq!(m.shunt_microvolts(2).unwrap(), -3_200);
        assert_eq!(m.bus_microamps(2).unwrap(), -32_000);
        assert_eq!(m.bus_microwatts(2).unwrap(), -384_000);
        assert_eq!(m.bus_millivolts(0).unwrap(), 0);
        assert_eq!(m.device(2).unwrap().family(), Family::Ina3221(Channel::Third));
    }

    #[test]
    fn test_triggered_reading_rearms() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_millivolts(0).unwrap();
        m.bus_mut().clear_log();
        m.bus_millivolts(0).unwrap();
        assert!(writes_to(m.bus(), reg::CONFIGURATION).is_empty());

        m.set_mode(OperatingMode::TriggeredBoth, Target::All).unwrap();
        let config = m.bus().register(0x40, reg::CONFIGURATION).unwrap();
        m.bus_mut().clear_log();
        m.bus_millivolts(0).unwrap();
        assert_eq!(writes_to(m.bus(), reg::CONFIGURATION), vec![config]);
    }

    #[test]
    fn test_cache_avoids_store_reads() {
        let mut m = monitor(
            MockBus::new()
                .with_device(0x40, MockDevice::ina226())
                .with_device(0x41, MockDevice::ina219()),
        );
        m.begin(1, 100_000, Target::All).unwrap();
        let before = m.store().reads();
        m.bus_millivolts(1).unwrap();
        m.bus_microamps(1).unwrap();
        assert_eq!(m.store().reads(), before);
        m.bus_millivolts(0).unwrap();
        m.bus_millivolts(1).unwrap();
        assert_eq!(m.store().reads(), before + 2);
    }

    #[test]
    fn test_reset_restores_calibration() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_mode(OperatingMode::TriggeredShunt, Target::All).unwrap();
        m.bus_mut().set_register(0x40, reg::CALIBRATION, 0);
        m.reset(Target::All).unwrap();
        assert_eq!(m.bus().register(0x40, reg::CALIBRATION), Some(1_677));
        assert_eq!(m.bus().register(0x40, reg::CONFIGURATION), Some(0x4121));
    }

    #[test]
    fn test_conversion_finished_polls_flag() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina219()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_mut().clear_log();
        assert!(m.conversion_finished(0).unwrap());
        assert!(m.bus().log()[1].is_read_of(reg::POWER));
        m.set_mode(OperatingMode::Shutdown, Target::All).unwrap();
        assert!(!m.conversion_finished(0).unwrap());
    }

    #[test]
    fn test_alert_broadcast_skips_unsupported_family() {
        let mut m = monitor(
            MockBus::new()
                .with_device(0x40, MockDevice::ina226())
                .with_device(0x41, MockDevice::ina219()),
        );
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_mut().clear_log();
        assert!(!m.alert_on_bus_over_voltage(true, 12_000, Target::All).unwrap());
        let mask = m.bus().register(0x40, reg::MASK_ENABLE).unwrap();
        assert_eq!(mask & 0xFC00, 1 << 13);
        assert_eq!(m.bus().register(0x40, reg::ALERT_LIMIT), Some(9600));
        assert!(m.bus().log().iter().all(|t| match t {
            Transaction::Write { address, .. } => address.raw() == 0x40,
            Transaction::Read { .. } => true,
        }));

        m.bus_mut().clear_log();
        assert!(!m.alert_on_conversion(true, Target::Index(1)).unwrap());
        assert!(m.bus().log().iter().all(|t| !matches!(t, Transaction::Write { .. })));
    }

    #[test]
    fn test_conversion_ready_alert_rejects_threshold() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        assert!(matches!(
            m.configure_alert(AlertKind::ConversionReady, true, Some(5), Target::All),
            Err(MonitorError::InvalidParameter(_))
        ));
        assert!(m
            .configure_alert(AlertKind::ConversionReady, true, None, Target::All)
            .unwrap());
    }

    #[test]
    fn test_rearm_follows_triggered_channel() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.set_mode(OperatingMode::TriggeredShunt, Target::All).unwrap();

        m.bus_mut().clear_log();
        m.bus_millivolts(0).unwrap();
        m.bus_raw(0).unwrap();
        assert!(writes_to(m.bus(), reg::CONFIGURATION).is_empty());

        m.shunt_microvolts(0).unwrap();
        assert_eq!(writes_to(m.bus(), reg::CONFIGURATION).len(), 1);
        m.bus_microamps(0).unwrap();
        m.bus_microwatts(0).unwrap();
        assert_eq!(writes_to(m.bus(), reg::CONFIGURATION).len(), 3);

        m.set_mode(OperatingMode::TriggeredBus, Target::All).unwrap();
        m.bus_mut().clear_log();
        m.shunt_raw(0).unwrap();
        assert!(writes_to(m.bus(), reg::CONFIGURATION).is_empty());
        m.bus_millivolts(0).unwrap();
        assert_eq!(writes_to(m.bus(), reg::CONFIGURATION).len(), 1);
    }

    #[test]
    fn test_alert_programs_mask_and_limit() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_mut().set_register(0x40, reg::MASK_ENABLE, 0x8003);
        assert!(m.alert_on_bus_over_voltage(true, 12_000, Target::Index(0)).unwrap());
        // bit 3 is the conversion-ready flag, set while converting
        assert_eq!(m.bus().register(0x40, reg::MASK_ENABLE), Some(0x200B));
        assert_eq!(m.bus().register(0x40, reg::ALERT_LIMIT), Some(9600));

        assert!(m.alert_on_bus_over_voltage(false, 0, Target::Index(0)).unwrap());
        assert_eq!(m.bus().register(0x40, reg::MASK_ENABLE), Some(0x000B));
        assert_eq!(m.bus().register(0x40, reg::ALERT_LIMIT), Some(9600));
    }

    #[test]
    fn test_ina260_has_no_shunt_alerts() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina260()));
        m.begin(1, 100_000, Target::All).unwrap();
        assert!(!m.alert_on_shunt_over_voltage(true, 1000, Target::Index(0)).unwrap());
        assert!(m.alert_on_power_over_limit(true, 1_000_000, Target::Index(0)).unwrap());
        assert_eq!(m.bus().register(0x40, reg::ALERT_LIMIT), Some(100));
    }

    #[test]
    fn test_unknown_index() {
        let mut m = monitor(MockBus::new().with_device(0x40, MockDevice::ina226()));
        m.begin(1, 100_000, Target::All).unwrap();
        assert!(matches!(
            m.set_mode(OperatingMode::Shutdown, Target::Index(4)),
            Err(MonitorError::UnknownDevice(4))
        ));
        assert!(matches!(m.device_name(1), Err(MonitorError::UnknownDevice(1))));
    }

    #[test]
    fn test_store_exhaustion_reported() {
        let bus = MockBus::new()
            .with_device(0x40, MockDevice::ina226())
            .with_device(0x41, MockDevice::ina219());
        let mut m = InaMonitor::new(bus, MemoryStore::new(RECORD_SIZE));
        assert_eq!(m.begin(1, 100_000, Target::All).unwrap(), 1);
        let report = m.last_scan().unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].1, Family::Ina219);
    }

    #[test]
    fn test_rescan_erases_stale_tail() {
        let mut m = monitor(
            MockBus::new()
                .with_device(0x40, MockDevice::ina226())
                .with_device(0x41, MockDevice::ina226()),
        );
        m.begin(1, 100_000, Target::All).unwrap();
        m.bus_mut().fail_address(0x41);
        assert_eq!(m.rescan(1, 100_000).unwrap(), 1);
        assert_eq!(m.last_scan().unwrap().faulted.len(), 1);

        let (bus, store) = m.into_parts();
        let restored = InaMonitor::from_store(bus, store).unwrap();
        assert_eq!(restored.device_count(), 1);
    }
}
