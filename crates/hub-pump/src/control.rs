//! Sensor Control Plane
//!
//! Host-initiated operations against the hub: sampling configuration, the
//! shared pedometer enable, self test, flushes and the offset compensation
//! helper. Everything here funnels through the paged parameter protocol
//! under the session's transport lock.

use crate::phase::ResetPhase;
use crate::session::DeviceSession;
use hub_protocol::{
    algo_param, page, read_parameter, reg, sensor_conf_param, sensor_info_param, sys_param,
    update_u8, write_parameter, HubError, SensorTag,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Rates used when restoring one-shot style sensors after a reload
const TILT_RESYNC_RATE: u16 = 50;
const SMD_RESYNC_RATE: u16 = 50;
const ACTIVITY_RESYNC_RATE: u16 = 14;

/// Static description block a sensor exposes on the sensors page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorInfo {
    pub sensor_type: u8,
    pub driver_id: u8,
    pub driver_version: u8,
    /// Current draw in device units
    pub power: u8,
    pub max_range: u16,
    pub resolution: u8,
    pub max_rate_hz: u16,
    pub fifo_reserved: u16,
    pub fifo_max: u16,
    pub event_size: u8,
    pub min_rate_hz: u8,
}

impl SensorInfo {
    fn parse(buf: &[u8; 16]) -> Self {
        Self {
            sensor_type: buf[0],
            driver_id: buf[1],
            driver_version: buf[2],
            power: buf[3],
            max_range: u16::from_le_bytes([buf[4], buf[5]]),
            resolution: buf[6],
            max_rate_hz: u16::from_le_bytes([buf[7], buf[8]]),
            fifo_reserved: u16::from_le_bytes([buf[9], buf[10]]),
            fifo_max: u16::from_le_bytes([buf[11], buf[12]]),
            event_size: buf[13],
            min_rate_hz: buf[14],
        }
    }
}

/// FIFO sizing block from the system page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FifoControl {
    pub watermark: u16,
    pub size: u16,
}

/// Full configuration block for one sensor channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Report rate in Hz; 0 disables the sensor
    pub sample_rate_hz: u16,
    /// Maximum batching latency in milliseconds
    pub latency_ms: u16,
    /// Change sensitivity threshold, device units
    pub sensitivity: u16,
    /// Dynamic range, device units
    pub range: u16,
}

impl SensorConfig {
    /// Configuration that only sets the report rate
    pub fn rate(rate_hz: u16) -> Self {
        Self {
            sample_rate_hz: rate_hz,
            ..Self::default()
        }
    }

    fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..2].copy_from_slice(&self.sample_rate_hz.to_le_bytes());
        out[2..4].copy_from_slice(&self.latency_ms.to_le_bytes());
        out[4..6].copy_from_slice(&self.sensitivity.to_le_bytes());
        out[6..8].copy_from_slice(&self.range.to_le_bytes());
        out
    }
}

/// Sensor handles the configuration parameter window can address
fn check_configurable(raw: u8) -> Result<(), HubError> {
    if raw == 0 || raw >= 64 {
        return Err(HubError::InvalidHandle(raw));
    }
    Ok(())
}

impl DeviceSession {
    /// Write a sensor's full configuration block
    pub fn configure_sensor(&self, tag: SensorTag, conf: SensorConfig) -> Result<(), HubError> {
        let raw = tag.raw();
        check_configurable(raw)?;
        {
            let mut bus = self.bus.lock();
            write_parameter(
                bus.as_mut(),
                &self.cfg.param(),
                page::SENSORS,
                sensor_conf_param(raw),
                &conf.to_bytes(),
            )?;
        }
        let rate_hz = conf.sample_rate_hz;
        let mut enabled = self.enabled.lock();
        match tag {
            SensorTag::Accel => enabled.accel_rate = (rate_hz > 0).then_some(rate_hz),
            SensorTag::TiltDetector => enabled.tilt = rate_hz > 0,
            SensorTag::SignificantMotion => enabled.smd = rate_hz > 0,
            SensorTag::Activity => enabled.activity = rate_hz > 0,
            _ => {}
        }
        info!("sensor 0x{:02X} rate set to {} Hz", raw, rate_hz);
        Ok(())
    }

    /// Set a sensor's report rate; 0 disables it
    pub fn set_sensor_rate(&self, tag: SensorTag, rate_hz: u16) -> Result<(), HubError> {
        self.configure_sensor(tag, SensorConfig::rate(rate_hz))
    }

    pub fn disable_sensor(&self, tag: SensorTag) -> Result<(), HubError> {
        self.set_sensor_rate(tag, 0)
    }

    /// Write the pedometer configuration block
    pub(crate) fn write_pedometer_conf(&self, rate_hz: u16, logging: bool) -> Result<(), HubError> {
        let mut conf = [0u8; 8];
        conf[..2].copy_from_slice(&rate_hz.to_le_bytes());
        conf[2..4].copy_from_slice(&(logging as u16).to_le_bytes());
        let mut bus = self.bus.lock();
        write_parameter(
            bus.as_mut(),
            &self.cfg.param(),
            page::SENSORS,
            sensor_conf_param(SensorTag::Pedometer.raw()),
            &conf,
        )
    }

    /// Shared enable for everything driven by the physical pedometer
    ///
    /// The part is configured when the first user arrives and shut off when
    /// the last one leaves.
    fn pedometer_ref(&self, enable: bool) -> Result<(), HubError> {
        let users = {
            let mut enabled = self.enabled.lock();
            enabled.pedometer_users = if enable {
                enabled.pedometer_users.saturating_add(1)
            } else {
                enabled.pedometer_users.saturating_sub(1)
            };
            enabled.pedometer_users
        };
        if enable && users == 1 {
            self.write_pedometer_conf(self.cfg.pedometer_rate_hz, false)?;
        } else if !enable && users == 0 {
            self.write_pedometer_conf(0, false)?;
        }
        Ok(())
    }

    pub fn enable_step_detector(&self) -> Result<(), HubError> {
        self.pedometer_ref(true)?;
        self.pedometer.lock().step_det_enabled = true;
        Ok(())
    }

    pub fn disable_step_detector(&self) -> Result<(), HubError> {
        self.pedometer.lock().step_det_enabled = false;
        self.pedometer_ref(false)
    }

    pub fn enable_step_counter(&self) -> Result<(), HubError> {
        self.pedometer_ref(true)?;
        self.pedometer.lock().step_cnt_enabled = true;
        Ok(())
    }

    pub fn disable_step_counter(&self) -> Result<(), HubError> {
        self.pedometer.lock().step_cnt_enabled = false;
        self.pedometer_ref(false)
    }

    /// Enable the raw pedometer block stream for a client
    pub fn enable_pedometer_stream(&self) -> Result<(), HubError> {
        self.pedometer_ref(true)?;
        self.enabled.lock().pedometer_stream = true;
        Ok(())
    }

    pub fn disable_pedometer_stream(&self) -> Result<(), HubError> {
        self.enabled.lock().pedometer_stream = false;
        self.pedometer_ref(false)
    }

    /// Kick off the firmware self test
    ///
    /// Results arrive as meta events on later interrupts; read them with
    /// [`DeviceSession::self_test_results`]. Rejected while a reset is in
    /// flight so the two sequences can never interleave.
    pub fn request_self_test(&self) -> Result<(), HubError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                ResetPhase::Initialized => *phase = ResetPhase::SelfTestInProgress,
                ResetPhase::SelfTestInProgress => {
                    debug!("self test already running");
                    return Ok(());
                }
                ResetPhase::AwaitingReset | ResetPhase::ResetReady => {
                    return Err(HubError::ResetBusy)
                }
                ResetPhase::Error => return Err(HubError::DeviceFailed),
            }
        }
        let result = self.self_test_handshake();
        if result.is_err() {
            // The test never started; resume normal reporting
            let mut phase = self.phase.lock();
            if *phase == ResetPhase::SelfTestInProgress {
                *phase = ResetPhase::Initialized;
            }
        }
        result
    }

    fn self_test_handshake(&self) -> Result<(), HubError> {
        let mut bus = self.bus.lock();
        update_u8(bus.as_mut(), reg::HOST_CTRL, |v| {
            v | reg::host_ctrl::ALGORITHM_STANDBY
        })?;
        let mut standby = false;
        for _ in 0..self.cfg.standby_retries {
            if bus.read_u8(reg::HOST_STATUS)? & reg::host_status::ALGO_STANDBY != 0 {
                standby = true;
                break;
            }
            std::thread::sleep(self.cfg.standby_delay());
        }
        if !standby {
            return Err(HubError::Timeout("algorithm standby"));
        }
        update_u8(bus.as_mut(), reg::HOST_CTRL, |v| {
            (v | reg::host_ctrl::SELF_TEST_REQ) & !reg::host_ctrl::ALGORITHM_STANDBY
        })?;
        for _ in 0..self.cfg.standby_retries {
            if bus.read_u8(reg::HOST_STATUS)? & reg::host_status::ALGO_STANDBY == 0 {
                break;
            }
            std::thread::sleep(self.cfg.standby_delay());
        }
        // The firmware releases standby by itself once the test runs; a
        // stuck bit here is informational only
        update_u8(bus.as_mut(), reg::HOST_CTRL, |v| {
            v & !reg::host_ctrl::SELF_TEST_REQ
        })?;
        info!("self test requested");
        Ok(())
    }

    /// Read a sensor's static description block
    pub fn sensor_info(&self, tag: SensorTag) -> Result<SensorInfo, HubError> {
        let raw = tag.raw();
        check_configurable(raw)?;
        let mut buf = [0u8; 16];
        {
            let mut bus = self.bus.lock();
            read_parameter(
                bus.as_mut(),
                &self.cfg.param(),
                page::SENSORS,
                sensor_info_param(raw),
                &mut buf,
            )?;
        }
        Ok(SensorInfo::parse(&buf))
    }

    /// Choose which meta events the firmware reports
    pub fn set_meta_event_control(&self, mask: [u8; 8]) -> Result<(), HubError> {
        let mut bus = self.bus.lock();
        write_parameter(
            bus.as_mut(),
            &self.cfg.param(),
            page::SYSTEM,
            sys_param::META_EVENT_CONTROL,
            &mask,
        )
    }

    /// Read the firmware FIFO watermark and size
    pub fn fifo_control(&self) -> Result<FifoControl, HubError> {
        let mut buf = [0u8; 16];
        {
            let mut bus = self.bus.lock();
            read_parameter(
                bus.as_mut(),
                &self.cfg.param(),
                page::SYSTEM,
                sys_param::FIFO_CONTROL,
                &mut buf,
            )?;
        }
        Ok(FifoControl {
            watermark: u16::from_le_bytes([buf[0], buf[1]]),
            size: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }

    /// Read one bank of per-sensor status bytes
    ///
    /// Bank 0 covers handles 1 through 16, each following bank the next 16.
    pub fn sensor_status_bank(&self, bank: u8) -> Result<[u8; 16], HubError> {
        let mut buf = [0u8; 16];
        let mut bus = self.bus.lock();
        read_parameter(
            bus.as_mut(),
            &self.cfg.param(),
            page::SYSTEM,
            sys_param::SENSOR_STATUS_BANK_0 + bank,
            &mut buf,
        )?;
        Ok(buf)
    }

    /// Ask the firmware to flush every sensor's FIFO data
    pub fn flush_all(&self) -> Result<(), HubError> {
        self.bus
            .lock()
            .write_u8(reg::FIFO_FLUSH, reg::fifo_flush::FLUSH_ALL)
    }

    /// Ask the firmware to flush one sensor
    pub fn flush_sensor(&self, tag: SensorTag) -> Result<(), HubError> {
        let raw = tag.raw();
        check_configurable(raw)?;
        self.bus.lock().write_u8(reg::FIFO_FLUSH, raw)
    }

    /// Run fast offset compensation for one physical sensor
    ///
    /// Blocks until the firmware reports completion and returns the new
    /// offsets.
    pub fn run_foc(&self, tag: SensorTag) -> Result<[i16; 3], HubError> {
        match tag {
            SensorTag::Accel | SensorTag::UncalMag | SensorTag::UncalGyro => {}
            _ => return Err(HubError::InvalidHandle(tag.raw())),
        }
        let request = [tag.raw(), 1, 0, 0, 0, 0, 0, 0];
        let mut bus = self.bus.lock();
        write_parameter(
            bus.as_mut(),
            &self.cfg.param(),
            page::ALGORITHM,
            algo_param::FOC_CONTROL,
            &request,
        )?;
        let mut buf = [0u8; 8];
        for _ in 0..self.cfg.ack_retries {
            read_parameter(
                bus.as_mut(),
                &self.cfg.param(),
                page::ALGORITHM,
                algo_param::FOC_CONTROL,
                &mut buf,
            )?;
            match buf[0] {
                0 => std::thread::sleep(self.cfg.param().ack_delay),
                1 => {
                    let offsets = [
                        i16::from_le_bytes([buf[1], buf[2]]),
                        i16::from_le_bytes([buf[3], buf[4]]),
                        i16::from_le_bytes([buf[5], buf[6]]),
                    ];
                    info!("offset compensation for 0x{:02X} done: {:?}", tag.raw(), offsets);
                    return Ok(offsets);
                }
                status => return Err(HubError::FocFailed(status)),
            }
        }
        Err(HubError::Timeout("offset compensation"))
    }

    /// Restore every previously enabled sensor after a firmware reload
    pub(crate) fn sync_sensors(&self) -> Result<(), HubError> {
        let (accel, tilt, smd, activity, stream) = {
            let enabled = self.enabled.lock();
            (
                enabled.accel_rate,
                enabled.tilt,
                enabled.smd,
                enabled.activity,
                enabled.pedometer_stream,
            )
        };
        let (det, cnt) = {
            let ped = self.pedometer.lock();
            (ped.step_det_enabled, ped.step_cnt_enabled)
        };
        info!("re-enabling sensors after firmware reload");
        if let Some(rate) = accel {
            self.set_sensor_rate(SensorTag::Accel, rate)?;
        }
        if det || cnt || stream {
            self.write_pedometer_conf(self.cfg.pedometer_rate_hz, false)?;
        }
        if tilt {
            self.set_sensor_rate(SensorTag::TiltDetector, TILT_RESYNC_RATE)?;
        }
        if smd {
            self.set_sensor_rate(SensorTag::SignificantMotion, SMD_RESYNC_RATE)?;
        }
        if activity {
            self.set_sensor_rate(SensorTag::Activity, ACTIVITY_RESYNC_RATE)?;
        }
        Ok(())
    }
}
