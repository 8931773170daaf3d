use core::fmt;

/// Register pointer inside a device's register file.
pub type RegisterAddr = u8;

/// 7-bit I2C device address
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BusAddress(u8);

impl BusAddress {
    pub const MAX: u8 = 0x7F;

    pub fn new(raw: u8) -> Option<Self> {
        if raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = crate::TransportError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(crate::TransportError::InvalidAddress(raw))
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{raw:02X}", raw = self.0)
    }
}

/// One completed register transaction, as recorded by the mock backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transaction {
    Read {
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    },
    Write {
        address: BusAddress,
        register: RegisterAddr,
        value: u16,
    },
}

impl Transaction {
    pub fn is_write_to(&self, register: RegisterAddr) -> bool {
        matches!(self, Transaction::Write { register: r, .. } if *r == register)
    }

    pub fn is_read_of(&self, register: RegisterAddr) -> bool {
        matches!(self, Transaction::Read { register: r, .. } if *r == register)
    }
}
