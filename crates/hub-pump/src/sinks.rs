//! Decode Sinks
//!
//! Per-phase record handling plugged into the batch decoder. The steady sink
//! does the full routing job; the scan sinks only watch for one meta event
//! while still preserving every record for readers.

use crate::pedometer::PedometerState;
use fifo_decoder::FrameSink;
use frame_ring::FrameQueue;
use hub_protocol::{FifoFrame, MetaEvent, MetaKind, PedometerRecord, SensorTag};
use tracing::{debug, warn};

/// Record routing for the initialized steady state
///
/// Holds mutable borrows from guards the pump acquires for the whole batch,
/// in the fixed order main queue, activity queue, pedometer, accel cache.
pub(crate) struct SteadySink<'a> {
    pub main: &'a mut FrameQueue,
    pub ar: &'a mut FrameQueue,
    pub pedometer: &'a mut PedometerState,
    /// Calibration offsets subtracted from accel samples
    pub acc_cal: [i16; 3],
    pub latest_acc: &'a mut [i16; 3],
}

impl FrameSink for SteadySink<'_> {
    fn on_frame(&mut self, tag: SensorTag, mut frame: FifoFrame) {
        match tag {
            // The firmware's own step records are replaced by the
            // synthesized ones derived from pedometer blocks
            SensorTag::StepDetector | SensorTag::StepCounter => return,
            SensorTag::Accel => {
                let d = &mut frame.data;
                for axis in 0..3 {
                    let raw = i16::from_le_bytes([d[axis * 2], d[axis * 2 + 1]]);
                    let corrected = raw.wrapping_sub(self.acc_cal[axis]);
                    d[axis * 2..axis * 2 + 2].copy_from_slice(&corrected.to_le_bytes());
                    self.latest_acc[axis] = corrected;
                }
            }
            SensorTag::Pedometer => {
                if let Some(rec) = PedometerRecord::parse(frame.payload()) {
                    self.pedometer.process_record(&rec);
                } else {
                    warn!("pedometer record too short, ignoring");
                }
            }
            _ => {}
        }

        if self.main.push(frame).is_some() {
            debug!("main frame queue full, dropping oldest");
        }
        if tag.reports_to_ar() {
            self.ar.push(frame);
        }
        if tag == SensorTag::Pedometer {
            self.pedometer.generate_step_frames(self.main);
        }
    }
}

/// Scan for the initialized meta event after a firmware upload
pub(crate) struct InitScanSink<'a> {
    pub ring: &'a mut FrameQueue,
    pub initialized: bool,
}

impl FrameSink for InitScanSink<'_> {
    fn on_frame(&mut self, _tag: SensorTag, frame: FifoFrame) {
        if let Some(meta) = MetaEvent::parse(&frame) {
            if meta.kind == MetaKind::Initialized {
                self.initialized = true;
            }
        }
        if self.ring.push(frame).is_some() {
            debug!("main frame queue full, dropping oldest");
        }
    }
}

/// Scan for self test result meta events
pub(crate) struct SelfTestScanSink<'a> {
    pub ring: &'a mut FrameQueue,
    /// (raw sensor handle, signed result) pairs in arrival order
    pub results: Vec<(u8, i8)>,
}

impl FrameSink for SelfTestScanSink<'_> {
    fn on_frame(&mut self, _tag: SensorTag, frame: FifoFrame) {
        if let Some(meta) = MetaEvent::parse(&frame) {
            if meta.kind == MetaKind::SelfTestResults {
                self.results.push((meta.sensor, meta.value as i8));
            }
        }
        if self.ring.push(frame).is_some() {
            debug!("main frame queue full, dropping oldest");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fifo_decoder::decode_batch;

    fn steady_fixture() -> (FrameQueue, FrameQueue, PedometerState, [i16; 3]) {
        (
            FrameQueue::with_capacity(32),
            FrameQueue::with_capacity(8),
            PedometerState::new(),
            [0i16; 3],
        )
    }

    fn accel_batch(x: i16, y: i16, z: i16) -> Vec<u8> {
        let mut batch = vec![SensorTag::Accel.raw()];
        batch.extend_from_slice(&x.to_le_bytes());
        batch.extend_from_slice(&y.to_le_bytes());
        batch.extend_from_slice(&z.to_le_bytes());
        batch
    }

    #[test]
    fn test_accel_calibration_applied_in_place() {
        let (mut main, mut ar, mut ped, mut latest) = steady_fixture();
        let mut sink = SteadySink {
            main: &mut main,
            ar: &mut ar,
            pedometer: &mut ped,
            acc_cal: [10, -20, 100],
            latest_acc: &mut latest,
        };
        decode_batch(&accel_batch(110, 80, 4196), &mut sink);

        assert_eq!(latest, [100, 100, 4096]);
        let frame = main.pop().unwrap();
        assert_eq!(frame.tag(), Some(SensorTag::Accel));
        assert_eq!(
            frame.payload(),
            &[100u8, 0, 100, 0, 0x00, 0x10]
        );
        assert!(ar.is_empty());
    }

    #[test]
    fn test_firmware_step_records_are_dropped() {
        let (mut main, mut ar, mut ped, mut latest) = steady_fixture();
        let mut sink = SteadySink {
            main: &mut main,
            ar: &mut ar,
            pedometer: &mut ped,
            acc_cal: [0; 3],
            latest_acc: &mut latest,
        };
        let mut batch = vec![SensorTag::StepDetector.raw(), 0];
        batch.extend_from_slice(&[SensorTag::StepCounter.raw(), 5, 0]);
        let summary = decode_batch(&batch, &mut sink);
        assert_eq!(summary.records, 2);
        assert!(main.is_empty());
    }

    #[test]
    fn test_activity_stream_fans_out() {
        let (mut main, mut ar, mut ped, mut latest) = steady_fixture();
        let mut sink = SteadySink {
            main: &mut main,
            ar: &mut ar,
            pedometer: &mut ped,
            acc_cal: [0; 3],
            latest_acc: &mut latest,
        };
        let mut batch = vec![SensorTag::Activity.raw(), 0x01, 0x00];
        batch.extend_from_slice(&accel_batch(1, 2, 3));
        decode_batch(&batch, &mut sink);

        assert_eq!(main.len(), 2);
        assert_eq!(ar.len(), 1);
        assert_eq!(ar.pop().and_then(|f| f.tag()), Some(SensorTag::Activity));
    }

    #[test]
    fn test_pedometer_block_synthesizes_after_record() {
        let (mut main, mut ar, mut ped, mut latest) = steady_fixture();
        ped.step_det_enabled = true;
        ped.step_cnt_enabled = true;
        let mut sink = SteadySink {
            main: &mut main,
            ar: &mut ar,
            pedometer: &mut ped,
            acc_cal: [0; 3],
            latest_acc: &mut latest,
        };
        let rec = PedometerRecord {
            data_index: 0,
            walk_count: 8,
            run_count: 0,
            step_status: 1,
            start_time: 100,
            end_time: 200,
        };
        let mut batch = vec![SensorTag::Pedometer.raw()];
        batch.extend_from_slice(&rec.to_bytes());
        decode_batch(&batch, &mut sink);

        let tags: Vec<_> = std::iter::from_fn(|| main.pop())
            .map(|f| f.tag())
            .collect();
        assert_eq!(
            tags,
            vec![
                Some(SensorTag::Pedometer),
                Some(SensorTag::StepDetector),
                Some(SensorTag::StepCounter),
            ]
        );
        assert_eq!(ped.step_count, 8);
    }

    #[test]
    fn test_init_scan_spots_meta_event() {
        let mut ring = FrameQueue::with_capacity(8);
        let mut sink = InitScanSink {
            ring: &mut ring,
            initialized: false,
        };
        let mut batch = accel_batch(1, 2, 3);
        batch.push(SensorTag::MetaEvent.raw());
        batch.extend_from_slice(&[16, 0, 0, 0, 0, 0, 0, 0]);
        decode_batch(&batch, &mut sink);
        assert!(sink.initialized);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_self_test_scan_collects_results() {
        let mut ring = FrameQueue::with_capacity(8);
        let mut sink = SelfTestScanSink {
            ring: &mut ring,
            results: Vec::new(),
        };
        let mut batch = vec![SensorTag::MetaEvent.raw()];
        batch.extend_from_slice(&[15, SensorTag::Accel.raw(), 0, 0, 0, 0, 0, 0]);
        batch.push(SensorTag::MetaEvent.raw());
        batch.extend_from_slice(&[15, SensorTag::UncalGyro.raw(), 0xFE, 0, 0, 0, 0, 0]);
        decode_batch(&batch, &mut sink);
        assert_eq!(
            sink.results,
            vec![(SensorTag::Accel.raw(), 0), (SensorTag::UncalGyro.raw(), -2)]
        );
        assert_eq!(ring.len(), 2);
    }
}
