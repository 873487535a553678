//! Hub Protocol Error Types

use thiserror::Error;

/// Errors that can occur while talking to the hub
#[derive(Debug, Error)]
pub enum HubError {
    /// Bus read or write failed
    #[error("Bus transport error: {0}")]
    Transport(String),

    /// Parameter acknowledge poll exhausted
    #[error("No acknowledge for page {page} param {param} after {attempts} attempts")]
    AckTimeout { page: u8, param: u8, attempts: u32 },

    /// Firmware refused the parameter request
    #[error("Parameter rejected: page {page} param {param}")]
    ParamRejected { page: u8, param: u8 },

    /// A bounded wait on device state ran out
    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    /// Device identifies as something this driver does not know
    #[error("Unknown product id 0x{0:02X}")]
    UnknownChip(u8),

    /// Operation addressed to a handle outside the configurable range
    #[error("Invalid sensor handle {0}")]
    InvalidHandle(u8),

    /// Rejected before any bus traffic
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Firmware image failed structural checks
    #[error("Firmware image rejected: {0}")]
    BadImage(String),

    /// Device CRC over the uploaded image does not match the header
    #[error("Firmware CRC mismatch: device 0x{device:08X}, image 0x{image:08X}")]
    CrcMismatch { device: u32, image: u32 },

    /// Self test requested while a reset sequence is in flight
    #[error("Reset sequence in progress")]
    ResetBusy,

    /// Device is in the error state and needs a firmware reload
    #[error("Device in error state; firmware reload required")]
    DeviceFailed,

    /// Device reported a fast offset compensation failure
    #[error("Fast offset compensation failed with status 0x{0:02X}")]
    FocFailed(u8),
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Transport(err.to_string())
    }
}
