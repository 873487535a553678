//! Simulated hub device
//!
//! Plays the device side of the interrupt line against a [`MockHub`]: it
//! answers reset requests with the boot meta event and then streams sensor
//! batches at a fixed cadence, raising an interrupt for each one.

use crate::SimConfig;
use hub_protocol::{MetaKind, MockHub, PedometerRecord, SensorTag};
use hub_pump::IrqLine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Device-side script driving the interrupt line
pub struct Simulator {
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Simulator {
    /// Start the device thread
    pub fn spawn(hub: MockHub, line: IrqLine, cfg: SimConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let worker = thread::spawn(move || device_loop(hub, line, cfg, flag));
        Self {
            shutdown,
            worker: Some(worker),
        }
    }

    /// True once the device thread has run out of work
    pub fn finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Stop the device thread and wait for it
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn device_loop(hub: MockHub, line: IrqLine, cfg: SimConfig, shutdown: Arc<AtomicBool>) {
    info!("hub simulator running");
    let step = Duration::from_millis(1);
    let interval = Duration::from_millis(cfg.interval_ms.max(1));
    let mut since_batch = Duration::ZERO;
    let mut seen_resets = 0;
    let mut batch_index = 0u32;
    let mut steps = 0u16;
    while !shutdown.load(Ordering::Relaxed) {
        let resets = hub.reset_count();
        if resets > seen_resets {
            seen_resets = resets;
            // Ack the reset, then boot and report initialized
            line.raise();
            hub.push_fifo_batch(&boot_batch());
            line.raise();
            debug!("simulated hub rebooted");
            since_batch = Duration::ZERO;
            thread::sleep(step);
            continue;
        }
        if cfg.batches > 0 && batch_index >= cfg.batches {
            break;
        }
        if seen_resets > 0 && since_batch >= interval {
            since_batch = Duration::ZERO;
            hub.push_fifo_batch(&data_batch(batch_index, cfg.step_counter, &mut steps));
            line.raise();
            batch_index += 1;
        }
        thread::sleep(step);
        since_batch += step;
    }
    info!("hub simulator stopped after {} batches", batch_index);
}

fn boot_batch() -> Vec<u8> {
    let mut batch = vec![SensorTag::MetaEvent.raw()];
    batch.extend_from_slice(&[MetaKind::Initialized as u8, 0, 0, 0, 0, 0, 0, 0]);
    batch
}

fn data_batch(index: u32, step_counter: bool, steps: &mut u16) -> Vec<u8> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    // Deterministic jitter so runs are reproducible
    let mut hasher = DefaultHasher::new();
    index.hash(&mut hasher);
    let hash = hasher.finish();

    let x = (hash % 65) as i16 - 32;
    let y = ((hash >> 8) % 65) as i16 - 32;
    let z = 4096 + ((hash >> 16) % 33) as i16 - 16;

    let mut batch = vec![SensorTag::Accel.raw()];
    batch.extend_from_slice(&x.to_le_bytes());
    batch.extend_from_slice(&y.to_le_bytes());
    batch.extend_from_slice(&z.to_le_bytes());

    // Every fourth batch reports a few more steps walked
    if step_counter && index % 4 == 3 {
        *steps = steps.wrapping_add(3);
        let record = PedometerRecord {
            data_index: 0,
            walk_count: *steps,
            run_count: 0,
            step_status: 1,
            start_time: index.saturating_mul(1000),
            end_time: index.saturating_mul(1000) + 999,
        };
        batch.push(SensorTag::Pedometer.raw());
        batch.extend_from_slice(&record.to_bytes());
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use fifo_decoder::decode_batch;
    use hub_protocol::FifoFrame;

    #[test]
    fn test_data_batch_decodes_clean() {
        let mut steps = 0;
        let batch = data_batch(3, true, &mut steps);

        let mut frames: Vec<FifoFrame> = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert!(summary.is_complete());
        assert_eq!(summary.records, 2);
        assert_eq!(frames[0].handle, SensorTag::Accel.raw());
        assert_eq!(frames[1].handle, SensorTag::Pedometer.raw());

        assert_eq!(steps, 3);
        let record = PedometerRecord::parse(frames[1].payload()).unwrap();
        assert_eq!(record.walk_count, 3);
        assert_eq!(record.step_status, 1);
    }

    #[test]
    fn test_data_batch_is_deterministic() {
        let mut a = 0;
        let mut b = 0;
        assert_eq!(data_batch(7, false, &mut a), data_batch(7, false, &mut b));
    }

    #[test]
    fn test_boot_batch_is_initialized_meta() {
        let mut frames: Vec<FifoFrame> = Vec::new();
        let summary = decode_batch(&boot_batch(), &mut frames);
        assert!(summary.is_complete());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].handle, SensorTag::MetaEvent.raw());
        assert_eq!(frames[0].data[0], MetaKind::Initialized as u8);
    }
}
