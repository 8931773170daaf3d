use crate::{BusAddress, RegisterAddr, RegisterBus, Result, TransportError};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

/// Settle time after every transaction, in microseconds.
pub const SETTLE_DELAY_US: u32 = 10;

/// Register bus over any `embedded-hal` 1.0 blocking I2C implementation.
pub struct HalBus<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C, D> HalBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn map_err(address: BusAddress, e: I2C::Error) -> TransportError {
        match e.kind() {
            ErrorKind::NoAcknowledge(_) => TransportError::Nack(address.raw()),
            _ => TransportError::Io(format!("{e:?}")),
        }
    }
}

impl<I2C, D> RegisterBus for HalBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn detect(&mut self, address: BusAddress) -> Result<bool> {
        match self.i2c.write(address.raw(), &[]) {
            Ok(()) => Ok(true),
            Err(e) => match e.kind() {
                ErrorKind::NoAcknowledge(_) => Ok(false),
                _ => Err(TransportError::Io(format!("{e:?}"))),
            },
        }
    }

    fn read_register(&mut self, address: BusAddress, register: RegisterAddr) -> Result<u16> {
        self.i2c
            .write(address.raw(), &[register])
            .map_err(|e| Self::map_err(address, e))?;
        self.delay.delay_us(SETTLE_DELAY_US);
        let mut buf = [0u8; 2];
        self.i2c
            .read(address.raw(), &mut buf)
            .map_err(|e| Self::map_err(address, e))?;
        let value = u16::from_be_bytes(buf);
        tracing::trace!(%address, register, value, "read");
        Ok(value)
    }

    fn write_register(
        &mut self,
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    ) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(address.raw(), &[register, hi, lo])
            .map_err(|e| Self::map_err(address, e))?;
        self.delay.delay_us(SETTLE_DELAY_US);
        tracing::trace!(%address, register, value, "write");
        Ok(())
    }
}
