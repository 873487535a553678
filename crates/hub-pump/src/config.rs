//! Pump configuration

use hub_protocol::ParamConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pump configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Main frame queue capacity
    pub main_ring_capacity: usize,

    /// Activity-recognition frame queue capacity
    pub ar_ring_capacity: usize,

    /// Largest FIFO batch accepted in one pass (bytes)
    pub fifo_max_bytes: usize,

    /// Pending interrupt queue depth
    pub irq_queue_depth: usize,

    /// Parameter acknowledge polls before giving up
    pub ack_retries: u32,

    /// Delay between acknowledge polls (milliseconds)
    pub ack_delay_ms: u64,

    /// Polls for the reset interrupt during firmware upload
    pub reset_wait_retries: u32,

    /// Delay between reset polls (microseconds)
    pub reset_wait_delay_us: u64,

    /// Settle time before touching the bus right after resume (milliseconds)
    pub resume_grace_ms: u64,

    /// Wait before re-enabling sensors after a firmware reload (milliseconds)
    pub resync_delay_ms: u64,

    /// Polls for algorithm standby during the self-test handshake
    pub standby_retries: u32,

    /// Delay between standby polls (milliseconds)
    pub standby_delay_ms: u64,

    /// Accelerometer samples averaged during calibration
    pub calibration_samples: u32,

    /// Delay between calibration samples (milliseconds)
    pub calibration_sample_delay_ms: u64,

    /// Settle time before calibration sampling starts (milliseconds)
    pub calibration_warmup_ms: u64,

    /// Where the calibration profile is persisted, if anywhere
    pub calibration_path: Option<PathBuf>,

    /// Rate used when calibration has to enable the accelerometer itself (Hz)
    pub accel_default_rate_hz: u16,

    /// Pedometer report rate while the host is awake (Hz)
    pub pedometer_rate_hz: u16,

    /// Pedometer report rate in logging mode during host suspend (Hz)
    pub pedometer_log_rate_hz: u16,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            main_ring_capacity: 2048,
            ar_ring_capacity: 256,
            fifo_max_bytes: 16384,
            irq_queue_depth: 64,
            ack_retries: 100,
            ack_delay_ms: 10,
            reset_wait_retries: 1000,
            reset_wait_delay_us: 50,
            resume_grace_ms: 20,
            resync_delay_ms: 2000,
            standby_retries: 10,
            standby_delay_ms: 1000,
            calibration_samples: 100,
            calibration_sample_delay_ms: 10,
            calibration_warmup_ms: 300,
            calibration_path: None,
            accel_default_rate_hz: 50,
            pedometer_rate_hz: 20,
            pedometer_log_rate_hz: 1,
        }
    }
}

impl PumpConfig {
    /// Config with every wait collapsed, for simulation and tests
    pub fn fast() -> Self {
        Self {
            ack_retries: 10,
            ack_delay_ms: 0,
            reset_wait_retries: 2000,
            reset_wait_delay_us: 100,
            resume_grace_ms: 0,
            resync_delay_ms: 0,
            standby_retries: 3,
            standby_delay_ms: 0,
            calibration_samples: 4,
            calibration_sample_delay_ms: 0,
            calibration_warmup_ms: 0,
            ..Default::default()
        }
    }

    /// Acknowledge poll tuning in the transport layer's terms
    pub fn param(&self) -> ParamConfig {
        ParamConfig {
            ack_retries: self.ack_retries,
            ack_delay: Duration::from_millis(self.ack_delay_ms),
        }
    }

    pub fn reset_wait_delay(&self) -> Duration {
        Duration::from_micros(self.reset_wait_delay_us)
    }

    pub fn resume_grace(&self) -> Duration {
        Duration::from_millis(self.resume_grace_ms)
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }

    pub fn standby_delay(&self) -> Duration {
        Duration::from_millis(self.standby_delay_ms)
    }

    pub fn calibration_warmup(&self) -> Duration {
        Duration::from_millis(self.calibration_warmup_ms)
    }

    pub fn calibration_sample_delay(&self) -> Duration {
        Duration::from_millis(self.calibration_sample_delay_ms)
    }
}
