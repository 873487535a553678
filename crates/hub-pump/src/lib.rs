//! Sensor hub coprocessor service
//!
//! Drives a smart sensor hub that batches sensor records in its own FIFO
//! and raises an interrupt when data is ready. [`DeviceSession`] owns the
//! transport and the decoded frame queues, [`InterruptPump`] serializes
//! interrupt service onto a single worker, and the control, calibration
//! and firmware modules cover the host-initiated operations.

mod calib;
mod config;
mod control;
mod firmware;
mod pedometer;
mod phase;
mod pump;
mod session;
mod sinks;

pub use calib::{load_profile, save_profile, CalibrationProfile};
pub use config::PumpConfig;
pub use control::{FifoControl, SensorConfig, SensorInfo};
pub use firmware::encode_image;
pub use phase::ResetPhase;
pub use pump::{InterruptPump, IrqLine};
pub use session::{ChipInfo, DeviceSession, QueueStats, SelfTestResults};
