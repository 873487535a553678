//! Pedometer Post-Processing
//!
//! The hub reports pedometer status blocks, not discrete steps. This module
//! turns those blocks into the walk-mode edge mask and into synthesized step
//! detector / step counter records, replacing the firmware's own step
//! records which the pump drops from the stream.

use frame_ring::FrameQueue;
use hub_protocol::{FifoFrame, PedometerRecord};
use tracing::debug;

/// Final logged block was delivered
pub(crate) const MASK_LOGGING_DONE: u8 = 0x01;
/// Cumulative step count moved
pub(crate) const MASK_NEW_STEP: u8 = 0x02;
/// Stationary to walking edge
pub(crate) const MASK_START_WALK: u8 = 0x04;
/// Walking to stationary edge
pub(crate) const MASK_STOP_WALK: u8 = 0x08;

/// Steps the firmware batches up before announcing a new walk
const FIRST_STEP_BURST: u16 = 8;

/// Host-side pedometer tracking state
///
/// Lives behind the session's pedometer lock; every mutation happens on the
/// pump worker while it drains a batch.
#[derive(Debug, Default)]
pub(crate) struct PedometerState {
    /// Device currently believes the user is walking
    pub(crate) walk_mode: bool,
    last_walk_mode: bool,
    /// Cumulative count from the last live block
    total_step: u16,
    last_total_step: u16,
    /// Count snapshot used for per-block diffs
    last_step: u16,
    /// Host-accumulated step count
    pub(crate) step_count: u32,
    last_step_count: u32,
    step_det: bool,
    step_det_reported: bool,
    pub(crate) step_det_enabled: bool,
    pub(crate) step_cnt_enabled: bool,
    /// Index of the first logged block seen in the current replay
    pub(crate) start_index: u8,
    /// Index of the most recent logged block, 0 outside a replay
    current_index: u8,
    /// Edge mask rebuilt from the latest block
    pub(crate) interrupt_mask: u8,
}

impl PedometerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fold one pedometer block into the tracking state
    ///
    /// Live blocks carry `data_index` 0; logged blocks replay with the index
    /// counting down to 1.
    pub(crate) fn process_record(&mut self, rec: &PedometerRecord) {
        if rec.data_index == 0 {
            self.walk_mode = rec.step_status != 0;
            self.total_step = rec.walk_count;
            self.current_index = 0;
        } else {
            if self.current_index == 0 {
                self.start_index = rec.data_index;
            }
            self.current_index = rec.data_index;
        }

        let mut mask = 0u8;
        if self.current_index == 1 {
            mask |= MASK_LOGGING_DONE;
        }
        if self.total_step != self.last_total_step {
            self.last_total_step = self.total_step;
            mask |= MASK_NEW_STEP;
        }
        if !self.last_walk_mode && self.walk_mode {
            self.last_walk_mode = true;
            mask |= MASK_START_WALK;
        } else if self.last_walk_mode && !self.walk_mode {
            self.last_walk_mode = false;
            mask |= MASK_STOP_WALK;
        }
        self.interrupt_mask = mask;

        self.process_step(rec);
    }

    /// Turn the block into a step delta for the enabled virtual sensors
    fn process_step(&mut self, rec: &PedometerRecord) {
        if !self.step_det_enabled && !self.step_cnt_enabled {
            return;
        }

        let diff: u16;
        if self.current_index == 0 {
            if self.interrupt_mask < MASK_NEW_STEP {
                return;
            }
            if self.interrupt_mask & MASK_STOP_WALK != 0 {
                return;
            }
            let current = rec.walk_count;
            let mut delta = current.wrapping_sub(self.last_step);
            self.last_step = current;
            // The firmware holds back the first burst of a walk and then
            // reports it at once. A jump of exactly the burst size is real;
            // anything else past two steps per block is counter noise.
            if delta > FIRST_STEP_BURST && self.interrupt_mask & MASK_NEW_STEP != 0 {
                delta = 1;
            } else if delta > 2 && delta < FIRST_STEP_BURST {
                delta = 1;
            }
            diff = delta;
        } else {
            // Logged blocks are trusted wholesale
            diff = rec.walk_count.wrapping_add(rec.run_count);
            self.last_step = self.last_step.wrapping_add(diff);
        }

        if self.step_cnt_enabled {
            self.step_count = self.step_count.wrapping_add(u32::from(diff));
        }
        if self.step_det_enabled && diff != 0 {
            self.step_det = true;
        }
    }

    /// Append synthesized step records for anything that changed
    ///
    /// Called with the main queue lock already held, right after the block
    /// that changed the state.
    pub(crate) fn generate_step_frames(&mut self, ring: &mut FrameQueue) {
        if self.step_det_enabled && self.step_det && !self.step_det_reported {
            ring.push(FifoFrame::step_detector());
            self.step_det = false;
            self.step_det_reported = true;
            debug!("synthesized step detector record");
        }
        if self.step_cnt_enabled && self.last_step_count != self.step_count {
            ring.push(FifoFrame::step_counter(self.step_count));
            self.last_step_count = self.step_count;
        }
    }

    /// A FIFO batch finished; the detector may fire again next batch
    pub(crate) fn end_batch(&mut self) {
        self.step_det_reported = false;
    }
}
