//! Sensor Hub Host Protocol
//!
//! This crate provides the host-side wire protocol for BHA-class smart
//! sensor hubs: the register map, the self-describing FIFO record formats,
//! the paged parameter handshake and a transport abstraction with a mock
//! device for hardware-free testing.

mod bus;
mod error;
mod frame;
mod mock;
mod param;
mod tag;

pub mod reg;

pub use bus::{update_u8, HubBus};
pub use error::HubError;
pub use frame::{
    FifoFrame, MetaEvent, MetaKind, PedometerRecord, SleepState, TimestampSync, FRAME_DATA_LEN,
    FRAME_WIRE_LEN,
};
pub use mock::{firmware_crc, AckMode, MockHub};
pub use param::{
    read_parameter, sensor_conf_param, sensor_info_param, write_parameter, ParamConfig,
    LOAD_WINDOW_LEN, SAVED_WINDOW_LEN,
};
pub use tag::SensorTag;

/// Parameter page numbers
pub mod page {
    /// System page (meta event control, FIFO control, sensor status banks)
    pub const SYSTEM: u8 = 1;
    /// Algorithm page (calibration and fusion controls)
    pub const ALGORITHM: u8 = 2;
    /// Sensors page (per-sensor information and configuration)
    pub const SENSORS: u8 = 3;
}

/// Parameter numbers on the system page
pub mod sys_param {
    /// Meta event control bitmap
    pub const META_EVENT_CONTROL: u8 = 1;
    /// FIFO watermark and size control
    pub const FIFO_CONTROL: u8 = 2;
    /// First sensor status bank
    pub const SENSOR_STATUS_BANK_0: u8 = 3;
}

/// Parameter numbers on the algorithm page
pub mod algo_param {
    /// Fast offset compensation trigger and status word
    pub const FOC_CONTROL: u8 = 7;
}
