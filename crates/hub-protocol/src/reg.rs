//! Host-Visible Register Map
//!
//! Byte addresses of the hub's host interface registers. The FIFO window
//! sits at the bottom of the map; burst reads from it drain the event FIFO.

/// Event FIFO read window
pub const FIFO_BUFFER: u8 = 0x00;
/// Sensor flush request (write a sensor handle, or [`fifo_flush::FLUSH_ALL`])
pub const FIFO_FLUSH: u8 = 0x32;
/// Chip control (CPU run / upload enable)
pub const CHIP_CTRL: u8 = 0x33;
/// Host status
pub const HOST_STATUS: u8 = 0x34;
/// Interrupt status
pub const INT_STATUS: u8 = 0x35;
/// Chip status
pub const CHIP_STATUS: u8 = 0x36;
/// FIFO bytes remaining, little-endian u16
pub const BYTES_REMAIN_0: u8 = 0x38;
/// Parameter acknowledge
pub const PARAM_ACK: u8 = 0x3A;
/// Saved parameter read window (16 bytes)
pub const SAVED_PARAM_0: u8 = 0x3B;
/// Parameter page select
pub const PARAM_PAGE_SEL: u8 = 0x54;
/// Host interface control
pub const HOST_CTRL: u8 = 0x55;
/// Load parameter write window (8 bytes)
pub const LOAD_PARAM_0: u8 = 0x5C;
/// Parameter request
pub const PARAM_REQ: u8 = 0x64;
/// Firmware timestamp latched on host interrupt, little-endian u32
pub const HOST_IRQ_TIMESTAMP_0: u8 = 0x6A;
/// ROM version, little-endian u16
pub const ROM_VERSION_0: u8 = 0x70;
/// RAM patch version, little-endian u16
pub const RAM_VERSION_0: u8 = 0x72;
/// Product id
pub const PRODUCT_ID: u8 = 0x90;
/// Silicon revision id
pub const REVISION_ID: u8 = 0x91;
/// Firmware upload address, little-endian u16
pub const UPLOAD_ADDR_0: u8 = 0x94;
/// Firmware upload data window
pub const UPLOAD_DATA: u8 = 0x96;
/// CRC of uploaded firmware, little-endian u32
pub const DATA_CRC_0: u8 = 0x97;
/// Reset request
pub const RESET_REQ: u8 = 0x9B;

/// Product id reported by BHA-class hubs
pub const PRODUCT_ID_BHA: u8 = 0x83;

/// Upper bound the firmware may report in [`BYTES_REMAIN_0`]
pub const FIFO_LEN_MAX: usize = 16384;

/// Chip control register bits
pub mod chip_ctrl {
    /// Release the hub CPU from reset
    pub const CPU_RUN: u8 = 0x01;
    /// Open the firmware upload window
    pub const UPLOAD_ENABLE: u8 = 0x02;
}

/// Host interface control register bits
pub mod host_ctrl {
    /// Freeze the fusion algorithm
    pub const ALGORITHM_STANDBY: u8 = 0x01;
    /// Abort the current FIFO transfer
    pub const ABORT_TRANSFER: u8 = 0x02;
    /// Re-latch the transfer byte count
    pub const UPDATE_TRANSFER_COUNT: u8 = 0x04;
    /// Suppress the wake-up FIFO interrupt
    pub const WAKEUP_FIFO_DISABLE: u8 = 0x08;
    /// Report orientation in NED coordinates
    pub const NED_COORDINATES: u8 = 0x10;
    /// Host application processor is suspended
    pub const AP_SUSPENDED: u8 = 0x20;
    /// Request the firmware self test
    pub const SELF_TEST_REQ: u8 = 0x40;
    /// Suppress the non-wake-up FIFO interrupt
    pub const NON_WAKEUP_FIFO_DISABLE: u8 = 0x80;
}

/// Host status register bits
pub mod host_status {
    /// Reset sequence in progress
    pub const RESET: u8 = 0x01;
    /// Fusion algorithm is in standby
    pub const ALGO_STANDBY: u8 = 0x02;
}

/// Flush register selectors
pub mod fifo_flush {
    /// Flush every sensor's pending data
    pub const FLUSH_ALL: u8 = 0xFF;
}
