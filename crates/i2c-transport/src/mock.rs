use crate::{BusAddress, RegisterAddr, RegisterBus, Result, Transaction, TransportError};
use std::collections::{BTreeMap, BTreeSet};

const CONFIG: RegisterAddr = 0x00;
const RESET_BIT: u16 = 0x8000;
const MODE_BITS: u16 = 0x0007;
const MANUFACTURER_ID: RegisterAddr = 0xFE;
const DIE_ID: RegisterAddr = 0xFF;
const TI_MANUFACTURER: u16 = 0x5449;

/// Conversion-ready flag of a simulated device.
#[derive(Clone, Copy, Debug)]
struct ReadyFlag {
    register: RegisterAddr,
    mask: u16,
}

/// A simulated register file behind one bus address.
///
/// Devices built by the INA constructors reset their configuration register to the
/// datasheet power-on value when the reset bit is written, and report conversion-ready
/// whenever their operating mode is not a power-down mode.
#[derive(Clone, Debug)]
pub struct MockDevice {
    registers: BTreeMap<RegisterAddr, u16>,
    power_on: BTreeMap<RegisterAddr, u16>,
    ready: Option<ReadyFlag>,
    self_clearing_reset: bool,
}

impl MockDevice {
    fn with_power_on(power_on: &[(RegisterAddr, u16)], ready: Option<ReadyFlag>) -> Self {
        let power_on: BTreeMap<_, _> = power_on.iter().copied().collect();
        Self {
            registers: power_on.clone(),
            power_on,
            ready,
            self_clearing_reset: true,
        }
    }

    /// INA219 / INA220: conversion-ready in bit 1 of the bus voltage register.
    pub fn ina219() -> Self {
        Self::with_power_on(
            &[
                (CONFIG, 0x399F),
                (0x01, 0),
                (0x02, 0),
                (0x03, 0),
                (0x04, 0),
                (0x05, 0),
            ],
            Some(ReadyFlag {
                register: 0x02,
                mask: 0x0002,
            }),
        )
    }

    fn ina226_family(config: u16, die_id: u16) -> Self {
        Self::with_power_on(
            &[
                (CONFIG, config),
                (0x01, 0),
                (0x02, 0),
                (0x03, 0),
                (0x04, 0),
                (0x05, 0),
                (0x06, 0),
                (0x07, 0),
                (MANUFACTURER_ID, TI_MANUFACTURER),
                (DIE_ID, die_id),
            ],
            Some(ReadyFlag {
                register: 0x06,
                mask: 0x0008,
            }),
        )
    }

    pub fn ina226() -> Self {
        Self::ina226_family(0x4127, 0x2260)
    }

    pub fn ina230() -> Self {
        Self::ina226_family(0x4127, 0x2300)
    }

    pub fn ina231() -> Self {
        Self::ina226_family(0x4127, 0x0000)
    }

    /// INA260: integrated shunt, no shunt voltage or calibration register in use.
    pub fn ina260() -> Self {
        Self::ina226_family(0x6127, 0x2270)
    }

    /// INA3221: three channels, conversion-ready in bit 0 of register 0x0F.
    pub fn ina3221() -> Self {
        Self::with_power_on(
            &[
                (CONFIG, 0x7127),
                (0x01, 0),
                (0x02, 0),
                (0x03, 0),
                (0x04, 0),
                (0x05, 0),
                (0x06, 0),
                (0x0F, 0x0002),
                (MANUFACTURER_ID, TI_MANUFACTURER),
                (DIE_ID, 0x3220),
            ],
            Some(ReadyFlag {
                register: 0x0F,
                mask: 0x0001,
            }),
        )
    }

    /// A device that is not a power monitor: its register 0 simply latches what is written.
    pub fn foreign(config: u16) -> Self {
        let mut device = Self::with_power_on(&[(CONFIG, config)], None);
        device.self_clearing_reset = false;
        device
    }

    /// A device that resets like an INA2xx but to an unknown configuration value.
    pub fn unrecognized(power_on_config: u16) -> Self {
        Self::with_power_on(&[(CONFIG, power_on_config)], None)
    }

    pub fn with_register(mut self, register: RegisterAddr, value: u16) -> Self {
        self.registers.insert(register, value);
        self
    }

    pub fn register(&self, register: RegisterAddr) -> Option<u16> {
        self.registers.get(&register).copied()
    }

    pub fn set_register(&mut self, register: RegisterAddr, value: u16) {
        self.registers.insert(register, value);
    }

    fn converting(&self) -> bool {
        let mode = self.register(CONFIG).unwrap_or(0) & MODE_BITS;
        mode != 0 && mode != 4
    }

    fn read(&self, register: RegisterAddr) -> u16 {
        let value = self.register(register).unwrap_or(0);
        match self.ready {
            Some(flag) if flag.register == register && self.converting() => value | flag.mask,
            _ => value,
        }
    }

    fn write(&mut self, register: RegisterAddr, value: u16) {
        if register == CONFIG && value & RESET_BIT != 0 && self.self_clearing_reset {
            self.registers = self.power_on.clone();
        } else {
            self.registers.insert(register, value);
        }
    }
}

/// An in-process simulated register bus. Each bus instance is independent.
#[derive(Clone, Debug, Default)]
pub struct MockBus {
    devices: BTreeMap<u8, MockDevice>,
    faulty: BTreeSet<u8>,
    log: Vec<Transaction>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: u8, device: MockDevice) -> Self {
        self.attach(address, device);
        self
    }

    pub fn attach(&mut self, address: u8, device: MockDevice) {
        self.devices.insert(address, device);
    }

    /// Make every transaction with `address` fail with an I/O error.
    pub fn fail_address(&mut self, address: u8) {
        self.faulty.insert(address);
    }

    pub fn device(&self, address: u8) -> Option<&MockDevice> {
        self.devices.get(&address)
    }

    pub fn device_mut(&mut self, address: u8) -> Option<&mut MockDevice> {
        self.devices.get_mut(&address)
    }

    pub fn register(&self, address: u8, register: RegisterAddr) -> Option<u16> {
        self.device(address).and_then(|d| d.register(register))
    }

    pub fn set_register(&mut self, address: u8, register: RegisterAddr, value: u16) {
        if let Some(device) = self.devices.get_mut(&address) {
            device.set_register(register, value);
        }
    }

    /// Transactions completed since creation or the last [`MockBus::clear_log`].
    pub fn log(&self) -> &[Transaction] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn check(&self, address: BusAddress) -> Result<()> {
        if self.faulty.contains(&address.raw()) {
            return Err(TransportError::Io(format!("bus fault at {address}")));
        }
        Ok(())
    }
}

impl RegisterBus for MockBus {
    fn detect(&mut self, address: BusAddress) -> Result<bool> {
        self.check(address)?;
        Ok(self.devices.contains_key(&address.raw()))
    }

    fn read_register(&mut self, address: BusAddress, register: RegisterAddr) -> Result<u16> {
        self.check(address)?;
        let device = self
            .devices
            .get(&address.raw())
            .ok_or(TransportError::Nack(address.raw()))?;
        let value = device.read(register);
        self.log.push(Transaction::Read {
            address,
            register,
            value,
        });
        Ok(value)
    }

    fn write_register(
        &mut self,
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    ) -> Result<()> {
        self.check(address)?;
        let device = self
            .devices
            .get_mut(&address.raw())
            .ok_or(TransportError::Nack(address.raw()))?;
        device.write(register, value);
        self.log.push(Transaction::Write {
            address,
            register,
            value,
        });
        Ok(())
    }
}
