use crate::family::MODE_FIELD;
use serde::{Deserialize, Serialize};

/// Operating mode held in bits 0-2 of the configuration register.
///
/// Triggered modes perform one conversion per write of the configuration register;
/// continuous modes free-run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Shutdown,
    TriggeredShunt,
    TriggeredBus,
    TriggeredBoth,
    ContinuousShunt,
    ContinuousBus,
    #[default]
    ContinuousBoth,
}

impl OperatingMode {
    pub fn bits(self) -> u8 {
        match self {
            OperatingMode::Shutdown => 0,
            OperatingMode::TriggeredShunt => 1,
            OperatingMode::TriggeredBus => 2,
            OperatingMode::TriggeredBoth => 3,
            OperatingMode::ContinuousShunt => 5,
            OperatingMode::ContinuousBus => 6,
            OperatingMode::ContinuousBoth => 7,
        }
    }

    /// Decode the low three bits; the second power-down code (4) reads as `Shutdown`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => OperatingMode::TriggeredShunt,
            2 => OperatingMode::TriggeredBus,
            3 => OperatingMode::TriggeredBoth,
            5 => OperatingMode::ContinuousShunt,
            6 => OperatingMode::ContinuousBus,
            7 => OperatingMode::ContinuousBoth,
            _ => OperatingMode::Shutdown,
        }
    }

    pub fn is_triggered(self) -> bool {
        matches!(
            self,
            OperatingMode::TriggeredShunt | OperatingMode::TriggeredBus | OperatingMode::TriggeredBoth
        )
    }

    pub fn measures_bus(self) -> bool {
        matches!(
            self,
            OperatingMode::TriggeredBus
                | OperatingMode::TriggeredBoth
                | OperatingMode::ContinuousBus
                | OperatingMode::ContinuousBoth
        )
    }

    pub fn measures_shunt(self) -> bool {
        matches!(
            self,
            OperatingMode::TriggeredShunt
                | OperatingMode::TriggeredBoth
                | OperatingMode::ContinuousShunt
                | OperatingMode::ContinuousBoth
        )
    }

    /// Replace the mode field of `config`, leaving every other bit intact.
    pub fn apply(self, config: u16) -> u16 {
        MODE_FIELD.apply(config, u16::from(self.bits()))
    }
}
