use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid address '{address}': {reason}")]
    AddressParse { address: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid timeout {0:?}, must be non-zero")]
    InvalidTimeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Firmware error: {0}")]
    FirmwareError(String),
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;
