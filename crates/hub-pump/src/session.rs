//! Device Session
//!
//! One attached hub: the transport, the reset phase, both frame queues and
//! all per-device state the old driver kept in file-level statics. Every
//! interrupt is funneled through [`DeviceSession::handle_irq`] on the pump
//! worker, so the passes below never run concurrently with each other.

use crate::calib;
use crate::config::PumpConfig;
use crate::pedometer::PedometerState;
use crate::phase::ResetPhase;
use crate::sinks::{InitScanSink, SelfTestScanSink, SteadySink};
use fifo_decoder::decode_batch;
use frame_ring::{FrameQueue, RingId};
use hub_protocol::{reg, update_u8, FifoFrame, HubBus, HubError, SensorTag, SleepState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Identity read off the part during attach
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChipInfo {
    pub product_id: u8,
    pub revision: u8,
    pub rom_version: u16,
    pub ram_version: u16,
}

/// Latest self test outcome per physical sensor; 0 is a pass, negative
/// values are firmware failure codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelfTestResults {
    pub accel: Option<i8>,
    pub mag: Option<i8>,
    pub gyro: Option<i8>,
}

/// Snapshot of one frame queue's counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

/// Which sensors the host has asked for, used to restore the part after a
/// firmware reload
#[derive(Debug, Default)]
pub(crate) struct EnabledSensors {
    pub(crate) accel_rate: Option<u16>,
    pub(crate) tilt: bool,
    pub(crate) smd: bool,
    pub(crate) activity: bool,
    /// Raw pedometer block stream requested by a client
    pub(crate) pedometer_stream: bool,
    /// Step detector/counter/stream shares the one physical pedometer
    pub(crate) pedometer_users: u8,
    /// Pedometer switched to logging mode for the current suspend
    pub(crate) suspend_logging: bool,
}

/// State for one attached hub
pub struct DeviceSession {
    pub(crate) cfg: PumpConfig,
    pub(crate) chip: ChipInfo,
    pub(crate) bus: Mutex<Box<dyn HubBus>>,
    pub(crate) phase: Mutex<ResetPhase>,
    pub(crate) main_ring: Mutex<FrameQueue>,
    pub(crate) ar_ring: Mutex<FrameQueue>,
    pub(crate) pedometer: Mutex<PedometerState>,
    pub(crate) enabled: Mutex<EnabledSensors>,
    pub(crate) acc_cal: Mutex<[i16; 3]>,
    pub(crate) latest_acc: Mutex<[i16; 3]>,
    pub(crate) self_test: Mutex<SelfTestResults>,
    pub(crate) firmware_image: Mutex<Option<Vec<u8>>>,
    pub(crate) suspended: AtomicBool,
    pub(crate) patch_loaded: AtomicBool,
    pub(crate) irq_count: AtomicU32,
    pub(crate) data_ready: Notify,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("chip", &self.chip)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Probe the part and build a session around the transport
    pub fn attach(mut bus: Box<dyn HubBus>, cfg: PumpConfig) -> Result<Arc<Self>, HubError> {
        let product_id = bus.read_u8(reg::PRODUCT_ID)?;
        if product_id != reg::PRODUCT_ID_BHA {
            return Err(HubError::UnknownChip(product_id));
        }
        let revision = bus.read_u8(reg::REVISION_ID)?;
        let rom_version = bus.read_u16_le(reg::ROM_VERSION_0)?;
        let ram_version = bus.read_u16_le(reg::RAM_VERSION_0)?;
        let chip = ChipInfo {
            product_id,
            revision,
            rom_version,
            ram_version,
        };
        info!(
            "attached hub: product 0x{:02X} rev 0x{:02X} rom 0x{:04X} ram 0x{:04X}",
            product_id, revision, rom_version, ram_version
        );

        let mut acc_cal = [0i16; 3];
        if let Some(path) = cfg.calibration_path.as_deref() {
            if let Some(offsets) = calib::load_profile(path) {
                info!("loaded accel calibration {:?} from {}", offsets, path.display());
                acc_cal = offsets;
            }
        }

        Ok(Arc::new(Self {
            chip,
            bus: Mutex::new(bus),
            phase: Mutex::new(ResetPhase::AwaitingReset),
            main_ring: Mutex::new(FrameQueue::with_capacity(cfg.main_ring_capacity)),
            ar_ring: Mutex::new(FrameQueue::with_capacity(cfg.ar_ring_capacity)),
            pedometer: Mutex::new(PedometerState::new()),
            enabled: Mutex::new(EnabledSensors::default()),
            acc_cal: Mutex::new(acc_cal),
            latest_acc: Mutex::new([0; 3]),
            self_test: Mutex::new(SelfTestResults::default()),
            firmware_image: Mutex::new(None),
            suspended: AtomicBool::new(false),
            patch_loaded: AtomicBool::new(false),
            irq_count: AtomicU32::new(0),
            data_ready: Notify::new(),
            cfg,
        }))
    }

    /// Upload firmware and retain the image for later reloads
    pub fn bring_up(&self, image: &[u8]) -> Result<(), HubError> {
        *self.firmware_image.lock() = Some(image.to_vec());
        crate::firmware::load(self, image)
    }

    /// Interrupt seen while a reset is pending; consumes it if so
    ///
    /// Runs on the interrupt line itself rather than the worker, the upload
    /// sequence is busy-waiting on this transition.
    pub(crate) fn note_reset_irq(&self) -> bool {
        let mut phase = self.phase.lock();
        if *phase == ResetPhase::AwaitingReset {
            *phase = ResetPhase::ResetReady;
            debug!("reset interrupt, hub back up");
            true
        } else {
            false
        }
    }

    /// Handle one hub interrupt according to the current phase
    pub fn handle_irq(&self, ap_ns: u64) -> Result<(), HubError> {
        let phase = *self.phase.lock();
        match phase {
            ResetPhase::AwaitingReset => {
                // Normally consumed on the interrupt line already
                self.note_reset_irq();
                Ok(())
            }
            ResetPhase::ResetReady => self.scan_for_init(),
            ResetPhase::SelfTestInProgress => self.scan_for_self_test(),
            ResetPhase::Initialized => self.steady_pass(ap_ns),
            ResetPhase::Error => {
                debug!("interrupt ignored in error state");
                Ok(())
            }
        }
    }

    /// Steady-state pass: timestamp pairing, FIFO drain, reader wakeup
    pub(crate) fn steady_pass(&self, ap_ns: u64) -> Result<(), HubError> {
        if self.suspended.load(Ordering::SeqCst) {
            // The controller may still be settling around suspend entry/exit
            std::thread::sleep(self.cfg.resume_grace());
        }

        let (fw_ticks, irq_count, batch) = {
            let mut bus = self.bus.lock();
            let fw_ticks = bus.read_u32_le(reg::HOST_IRQ_TIMESTAMP_0)?;
            let irq_count = self.irq_count.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
            let mut remain = bus.read_u16_le(reg::BYTES_REMAIN_0)? as usize;
            let batch = if remain == 0 {
                debug!("interrupt with empty FIFO");
                Vec::new()
            } else {
                if remain > self.cfg.fifo_max_bytes {
                    warn!(
                        "FIFO reports {} bytes, clamping to {}",
                        remain, self.cfg.fifo_max_bytes
                    );
                    remain = self.cfg.fifo_max_bytes;
                }
                let mut buf = vec![0u8; remain];
                bus.read(reg::FIFO_BUFFER, &mut buf)?;
                buf
            };
            (fw_ticks, irq_count, batch)
        };

        let acc_cal = *self.acc_cal.lock();
        let sync = FifoFrame::timestamp_sync(ap_ns, fw_ticks, irq_count);
        {
            let mut main = self.main_ring.lock();
            let mut ar = self.ar_ring.lock();
            let mut ped = self.pedometer.lock();
            let mut latest = self.latest_acc.lock();
            if main.push(sync).is_some() {
                debug!("main frame queue full, dropping oldest");
            }
            ar.push(sync);
            if !batch.is_empty() {
                let mut sink = SteadySink {
                    main: &mut main,
                    ar: &mut ar,
                    pedometer: &mut ped,
                    acc_cal,
                    latest_acc: &mut latest,
                };
                let summary = decode_batch(&batch, &mut sink);
                debug!(
                    "drained {} FIFO bytes into {} records",
                    summary.consumed, summary.records
                );
            }
            ped.end_batch();
        }
        self.data_ready.notify_one();
        Ok(())
    }

    /// After an upload, watch the FIFO for the initialized meta event
    pub(crate) fn scan_for_init(&self) -> Result<(), HubError> {
        let Some(batch) = self.read_scan_batch("init")? else {
            return Ok(());
        };
        let initialized = {
            let mut ring = self.main_ring.lock();
            let mut sink = InitScanSink {
                ring: &mut ring,
                initialized: false,
            };
            decode_batch(&batch, &mut sink);
            sink.initialized
        };
        if initialized {
            *self.phase.lock() = ResetPhase::Initialized;
            info!("hub firmware initialized");
        }
        self.data_ready.notify_one();
        Ok(())
    }

    /// During a self test, watch the FIFO for result meta events
    pub(crate) fn scan_for_self_test(&self) -> Result<(), HubError> {
        let Some(batch) = self.read_scan_batch("self test")? else {
            return Ok(());
        };
        let results = {
            let mut ring = self.main_ring.lock();
            let mut sink = SelfTestScanSink {
                ring: &mut ring,
                results: Vec::new(),
            };
            decode_batch(&batch, &mut sink);
            sink.results
        };
        self.data_ready.notify_one();
        if results.is_empty() {
            return Ok(());
        }
        {
            let mut outcome = self.self_test.lock();
            for (sensor, result) in &results {
                info!("self test result for handle 0x{:02X}: {}", sensor, result);
                match SensorTag::from_raw(*sensor) {
                    Some(SensorTag::Accel) => outcome.accel = Some(*result),
                    Some(SensorTag::UncalMag) => outcome.mag = Some(*result),
                    Some(SensorTag::UncalGyro) => outcome.gyro = Some(*result),
                    _ => warn!("self test result for unexpected handle 0x{:02X}", sensor),
                }
            }
        }
        // The algorithms do not survive a self test; reload to get back to
        // normal reporting
        self.reload_firmware()
    }

    /// Read one FIFO batch for a scan pass, or `None` if there is nothing
    /// usable to read
    fn read_scan_batch(&self, what: &str) -> Result<Option<Vec<u8>>, HubError> {
        let mut bus = self.bus.lock();
        let remain = bus.read_u16_le(reg::BYTES_REMAIN_0)? as usize;
        if remain == 0 {
            return Ok(None);
        }
        if remain > self.cfg.fifo_max_bytes {
            warn!("FIFO reports {} bytes during {} scan, skipping", remain, what);
            return Ok(None);
        }
        let mut buf = vec![0u8; remain];
        bus.read(reg::FIFO_BUFFER, &mut buf)?;
        Ok(Some(buf))
    }

    /// Re-upload the retained firmware image
    pub(crate) fn reload_firmware(&self) -> Result<(), HubError> {
        let image = self.firmware_image.lock().clone();
        match image {
            Some(image) => crate::firmware::load(self, &image),
            None => {
                warn!("no firmware image retained, skipping reload");
                *self.phase.lock() = ResetPhase::Initialized;
                Ok(())
            }
        }
    }

    /// Note that the host is entering suspend
    ///
    /// Pushes a sleep marker so readers can segment their stream, and moves
    /// the pedometer to logging mode when only the step sensors are active.
    pub fn suspend(&self) -> Result<(), HubError> {
        let (det, cnt) = {
            let ped = self.pedometer.lock();
            (ped.step_det_enabled, ped.step_cnt_enabled)
        };
        let stream = self.enabled.lock().pedometer_stream;
        if (det || cnt) && !stream {
            self.write_pedometer_conf(self.cfg.pedometer_log_rate_hz, true)?;
            self.enabled.lock().suspend_logging = true;
        }
        {
            let mut bus = self.bus.lock();
            update_u8(bus.as_mut(), reg::HOST_CTRL, |v| {
                v | reg::host_ctrl::AP_SUSPENDED
            })?;
        }
        self.suspended.store(true, Ordering::SeqCst);
        if self
            .main_ring
            .lock()
            .push(FifoFrame::sleep_status(SleepState::Suspend))
            .is_some()
        {
            debug!("main frame queue full, dropping oldest");
        }
        self.data_ready.notify_one();
        info!("host suspend noted");
        Ok(())
    }

    /// Note that the host resumed
    pub fn resume(&self) -> Result<(), HubError> {
        {
            let mut bus = self.bus.lock();
            update_u8(bus.as_mut(), reg::HOST_CTRL, |v| {
                v & !reg::host_ctrl::AP_SUSPENDED
            })?;
            bus.write_u8(reg::FIFO_FLUSH, reg::fifo_flush::FLUSH_ALL)?;
        }
        self.suspended.store(false, Ordering::SeqCst);
        self.irq_count.store(0, Ordering::SeqCst);
        if self
            .main_ring
            .lock()
            .push(FifoFrame::sleep_status(SleepState::Resume))
            .is_some()
        {
            debug!("main frame queue full, dropping oldest");
        }
        self.data_ready.notify_one();
        let toggled = {
            let mut enabled = self.enabled.lock();
            std::mem::take(&mut enabled.suspend_logging)
        };
        if toggled {
            self.write_pedometer_conf(self.cfg.pedometer_rate_hz, false)?;
        }
        info!("host resume noted");
        Ok(())
    }

    /// Wait until the pump signals new frames
    pub async fn wait_data(&self) {
        self.data_ready.notified().await;
    }

    /// Pop up to `limit` frames from one queue
    pub fn drain(&self, ring: RingId, limit: usize) -> Vec<FifoFrame> {
        let mut queue = self.ring(ring).lock();
        let mut out = Vec::with_capacity(limit.min(queue.len()));
        while out.len() < limit {
            match queue.pop() {
                Some(frame) => out.push(frame),
                None => break,
            }
        }
        out
    }

    /// Counters for one queue
    pub fn queue_stats(&self, ring: RingId) -> QueueStats {
        let queue = self.ring(ring).lock();
        QueueStats {
            len: queue.len(),
            capacity: queue.capacity(),
            pushed: queue.pushed(),
            dropped: queue.dropped(),
        }
    }

    fn ring(&self, ring: RingId) -> &Mutex<FrameQueue> {
        match ring {
            RingId::Main => &self.main_ring,
            RingId::ActivityRecognition => &self.ar_ring,
        }
    }

    pub fn chip(&self) -> ChipInfo {
        self.chip
    }

    pub fn phase(&self) -> ResetPhase {
        *self.phase.lock()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Interrupts handled since attach or the last resume
    pub fn irq_count(&self) -> u32 {
        self.irq_count.load(Ordering::SeqCst)
    }

    pub fn self_test_results(&self) -> SelfTestResults {
        *self.self_test.lock()
    }

    /// Most recent calibrated accelerometer sample
    pub fn latest_accel(&self) -> [i16; 3] {
        *self.latest_acc.lock()
    }

    pub fn calibration_offsets(&self) -> [i16; 3] {
        *self.acc_cal.lock()
    }
}

#[cfg(feature = "debug-io")]
impl DeviceSession {
    /// Raw register read for bring-up debugging
    pub fn peek(&self, reg: u8, buf: &mut [u8]) -> Result<(), HubError> {
        self.bus.lock().read(reg, buf)
    }

    /// Raw register write for bring-up debugging
    pub fn poke(&self, reg: u8, data: &[u8]) -> Result<(), HubError> {
        self.bus.lock().write(reg, data)
    }

    /// Raw parameter read for bring-up debugging
    pub fn peek_param(&self, page: u8, param: u8, buf: &mut [u8]) -> Result<(), HubError> {
        let mut bus = self.bus.lock();
        hub_protocol::read_parameter(bus.as_mut(), &self.cfg.param(), page, param, buf)
    }

    /// Raw parameter write for bring-up debugging
    pub fn poke_param(&self, page: u8, param: u8, data: &[u8]) -> Result<(), HubError> {
        let mut bus = self.bus.lock();
        hub_protocol::write_parameter(bus.as_mut(), &self.cfg.param(), page, param, data)
    }
}
