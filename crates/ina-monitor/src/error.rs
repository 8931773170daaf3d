use crate::alerts::AlertKind;
use i2c_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = MonitorError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("no registered device at index {0}")]
    UnknownDevice(u8),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("calibration value {value} for {family} does not fit the {bits}-bit register")]
    CalibrationOverflow {
        family: &'static str,
        value: u64,
        bits: u32,
    },
    #[error("invalid descriptor record: {0}")]
    InvalidDescriptor(&'static str),
    #[error("{kind} threshold {limit} is outside the alert limit register range")]
    ThresholdOutOfRange { kind: AlertKind, limit: i64 },
    #[error("{operation} is not supported by {family}")]
    Unsupported {
        family: &'static str,
        operation: &'static str,
    },
}
