//! Overwrite-Oldest Frame Queue

use hub_protocol::FifoFrame;

/// Default main queue capacity (~2 s of full-rate FIFO traffic)
pub const DEFAULT_MAIN_CAPACITY: usize = 2048;

/// Default activity-recognition queue capacity
pub const DEFAULT_AR_CAPACITY: usize = 256;

/// Bounded frame queue that evicts the oldest entry when full
///
/// All slots are allocated up front; push and pop are O(1) and never
/// allocate. The queue itself is not synchronized, callers wrap it in
/// whatever lock the surrounding session uses.
pub struct FrameQueue {
    /// Pre-allocated storage
    slots: Box<[FifoFrame]>,
    /// Next slot to write
    head: usize,
    /// Oldest unread slot
    tail: usize,
    /// Frames currently queued
    len: usize,
    /// Total frames accepted
    pushed: u64,
    /// Frames lost to overwrite
    dropped: u64,
}

impl FrameQueue {
    /// Create a queue holding up to `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "frame queue capacity must be non-zero");
        let slots: Vec<FifoFrame> = (0..capacity).map(|_| FifoFrame::default()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
            pushed: 0,
            dropped: 0,
        }
    }

    /// Append a frame, evicting the oldest when full
    ///
    /// Returns the evicted frame so the caller can decide whether the loss
    /// is worth logging.
    pub fn push(&mut self, frame: FifoFrame) -> Option<FifoFrame> {
        let evicted = if self.len == self.slots.len() {
            let old = self.slots[self.tail];
            self.tail = (self.tail + 1) % self.slots.len();
            self.len -= 1;
            self.dropped += 1;
            Some(old)
        } else {
            None
        };
        self.slots[self.head] = frame;
        self.head = (self.head + 1) % self.slots.len();
        self.len += 1;
        self.pushed += 1;
        evicted
    }

    /// Remove and return the oldest frame
    pub fn pop(&mut self) -> Option<FifoFrame> {
        if self.len == 0 {
            return None;
        }
        let frame = self.slots[self.tail];
        self.tail = (self.tail + 1) % self.slots.len();
        self.len -= 1;
        Some(frame)
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / self.slots.len() as f64
    }

    /// Total frames accepted since creation
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Frames lost to overwrite since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drop all queued frames
    pub fn clear(&mut self) {
        self.tail = self.head;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_protocol::SensorTag;
    use proptest::prelude::*;

    fn marker(n: u8) -> FifoFrame {
        FifoFrame::new(SensorTag::StepCounter, &[n, 0])
    }

    fn value(frame: &FifoFrame) -> u8 {
        frame.data[0]
    }

    #[test]
    fn test_push_pop_preserves_order() {
        let mut queue = FrameQueue::with_capacity(10);
        for n in 0..5 {
            queue.push(marker(n));
        }
        assert_eq!(queue.len(), 5);
        for n in 0..5 {
            assert_eq!(queue.pop().map(|f| value(&f)), Some(n));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_full_queue_keeps_newest_two() {
        let mut queue = FrameQueue::with_capacity(2);
        queue.push(marker(1));
        queue.push(marker(2));
        let evicted = queue.push(marker(3));
        assert_eq!(evicted.map(|f| value(&f)), Some(1));
        assert_eq!(queue.pop().map(|f| value(&f)), Some(2));
        assert_eq!(queue.pop().map(|f| value(&f)), Some(3));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_capacity_plus_one_drops_only_oldest() {
        let cap = 8;
        let mut queue = FrameQueue::with_capacity(cap);
        for n in 0..=cap as u8 {
            queue.push(marker(n));
        }
        assert_eq!(queue.len(), cap);
        assert_eq!(queue.dropped(), 1);
        for n in 1..=cap as u8 {
            assert_eq!(queue.pop().map(|f| value(&f)), Some(n));
        }
    }

    #[test]
    fn test_counters_track_traffic() {
        let mut queue = FrameQueue::with_capacity(3);
        for n in 0..7 {
            queue.push(marker(n));
        }
        assert_eq!(queue.pushed(), 7);
        assert_eq!(queue.dropped(), 4);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_clear_empties_queue() {
        let mut queue = FrameQueue::with_capacity(4);
        queue.push(marker(1));
        queue.push(marker(2));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
        // Queue stays usable after clear
        queue.push(marker(9));
        assert_eq!(queue.pop().map(|f| value(&f)), Some(9));
    }

    #[test]
    fn test_fill_and_full_reporting() {
        let mut queue = FrameQueue::with_capacity(4);
        assert_eq!(queue.fill_ratio(), 0.0);
        for n in 0..4 {
            queue.push(marker(n));
        }
        assert!(queue.is_full());
        assert_eq!(queue.fill_ratio(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_retains_last_capacity_frames(
            values in proptest::collection::vec(0u8..=255, 1..200),
            cap in 1usize..16,
        ) {
            let mut queue = FrameQueue::with_capacity(cap);
            for &v in &values {
                queue.push(marker(v));
            }
            let expected: Vec<u8> = values
                .iter()
                .copied()
                .rev()
                .take(cap)
                .rev()
                .collect();
            let mut drained = Vec::new();
            while let Some(frame) = queue.pop() {
                drained.push(value(&frame));
            }
            prop_assert_eq!(drained, expected);
            prop_assert_eq!(queue.pushed() as usize, values.len());
            prop_assert_eq!(
                queue.dropped() as usize,
                values.len().saturating_sub(cap)
            );
        }
    }
}
