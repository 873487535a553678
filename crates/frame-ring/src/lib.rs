//! Frame Ring Queues
//!
//! Fixed-capacity queues between the interrupt pump and FIFO readers. The hub
//! keeps two of them: the main queue carries every sensor record, the
//! activity-recognition queue carries only the activity and timing stream.
//! When a queue is full the oldest frame is overwritten, never the producer
//! blocked.

mod queue;

pub use queue::FrameQueue;

use serde::{Deserialize, Serialize};

/// Which of the two frame queues a record was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingId {
    Main,
    ActivityRecognition,
}

impl RingId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RingId::Main => "main",
            RingId::ActivityRecognition => "activity",
        }
    }
}
