use crate::{BusAddress, RegisterAddr, Result};

/// Width in bytes of one descriptor record in a [`DescriptorStore`].
pub const RECORD_SIZE: usize = 8;

/// A minimal blocking 16-bit register bus.
///
/// Every call is a complete round-trip; implementations apply whatever post-transaction
/// settle delay the devices need before returning.
pub trait RegisterBus {
    /// Check whether a device acknowledges `address`.
    ///
    /// `Ok(false)` means nothing answered; `Err` means the transport itself failed.
    fn detect(&mut self, address: BusAddress) -> Result<bool>;

    /// Read one big-endian 16-bit register.
    fn read_register(&mut self, address: BusAddress, register: RegisterAddr) -> Result<u16>;

    /// Write one big-endian 16-bit register.
    fn write_register(
        &mut self,
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    ) -> Result<()>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn detect(&mut self, address: BusAddress) -> Result<bool> {
        (**self).detect(address)
    }

    fn read_register(&mut self, address: BusAddress, register: RegisterAddr) -> Result<u16> {
        (**self).read_register(address, register)
    }

    fn write_register(
        &mut self,
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    ) -> Result<()> {
        (**self).write_register(address, register, value)
    }
}

/// Indexed storage of fixed-size records that survives resets.
pub trait DescriptorStore {
    /// Total storage size in bytes.
    fn capacity(&self) -> usize;

    /// Read the record at `index`.
    fn get(&mut self, index: u8) -> Result<[u8; RECORD_SIZE]>;

    /// Overwrite the record at `index`.
    fn put(&mut self, index: u8, record: &[u8; RECORD_SIZE]) -> Result<()>;

    /// Number of whole records the store can hold, capped to an 8-bit index.
    fn records(&self) -> usize {
        (self.capacity() / RECORD_SIZE).min(u8::MAX as usize)
    }
}

impl<T: DescriptorStore + ?Sized> DescriptorStore for &mut T {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn get(&mut self, index: u8) -> Result<[u8; RECORD_SIZE]> {
        (**self).get(index)
    }

    fn put(&mut self, index: u8, record: &[u8; RECORD_SIZE]) -> Result<()> {
        (**self).put(index, record)
    }
}
