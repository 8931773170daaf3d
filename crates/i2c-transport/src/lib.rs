//! i2c-transport: register-level bus and descriptor storage abstractions
//!
//! This crate provides the two external collaborators a power-monitor driver talks to: a
//! blocking 16-bit register bus and an indexed fixed-size record store that survives resets.
//! Backends are feature-gated. The default build enables a `mock` backend (simulated INA2xx
//! register files) so that dependants can be exercised on any host without hardware.

mod types;
pub use types::{BusAddress, RegisterAddr, Transaction};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{DescriptorStore, RegisterBus, RECORD_SIZE};

mod store;
pub use store::{FileStore, MemoryStore};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockDevice};

#[cfg(feature = "embedded-hal")]
mod hal;

#[cfg(feature = "embedded-hal")]
pub use hal::{HalBus, SETTLE_DELAY_US};
