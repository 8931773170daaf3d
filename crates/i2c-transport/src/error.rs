use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no acknowledge from address 0x{0:02X}")]
    Nack(u8),
    #[error("invalid 7-bit bus address: 0x{0:02X}")]
    InvalidAddress(u8),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("record {index} out of range (store holds {records} records)")]
    RecordOutOfRange { index: u8, records: usize },
}
