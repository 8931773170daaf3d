use crate::calibration;
use crate::descriptor::{Device, DeviceDescriptor};
use crate::error::Result;
use i2c_transport::DescriptorStore;

/// Single-slot memo of the most recently used device.
///
/// A hit costs nothing; a miss reads the record from the store and re-derives the runtime
/// fields, evicting whatever was cached before.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    slot: Option<(u8, Device)>,
    hits: u64,
    misses: u64,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<S: DescriptorStore>(&mut self, store: &mut S, index: u8) -> Result<Device> {
        if let Some((cached, device)) = self.slot {
            if cached == index {
                self.hits += 1;
                return Ok(device);
            }
        }
        self.misses += 1;
        let descriptor = DeviceDescriptor::unpack(&store.get(index)?)?;
        let device = Device {
            descriptor,
            runtime: calibration::derive(&descriptor)?,
        };
        tracing::trace!(index, family = %descriptor.family, "descriptor loaded");
        self.slot = Some((index, device));
        Ok(device)
    }

    /// Persist `device` at `index` and make it the cached entry.
    pub fn store<S: DescriptorStore>(
        &mut self,
        store: &mut S,
        index: u8,
        device: Device,
    ) -> Result<()> {
        store.put(index, &device.descriptor.pack())?;
        self.slot = Some((index, device));
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    pub fn cached_index(&self) -> Option<u8> {
        self.slot.map(|(index, _)| index)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
