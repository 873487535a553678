//! FIFO Batch Decoding
//!
//! Splits one interrupt's worth of raw FIFO bytes into typed records. The
//! stream is self-describing only forwards: each record starts with a handle
//! byte whose tag fixes the payload length, so decoding stops at the first
//! handle it cannot place rather than resynchronize mid-batch.

mod decoder;

pub use decoder::{decode_batch, DecodeStop, DecodeSummary, FrameSink};
