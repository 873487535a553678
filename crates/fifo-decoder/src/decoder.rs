//! Record Extraction from Raw FIFO Batches

use hub_protocol::{FifoFrame, SensorTag};
use tracing::{debug, warn};

/// Receiver for decoded records
///
/// Called once per record, in stream order, while the batch is being walked.
pub trait FrameSink {
    fn on_frame(&mut self, tag: SensorTag, frame: FifoFrame);
}

impl FrameSink for Vec<FifoFrame> {
    fn on_frame(&mut self, _tag: SensorTag, frame: FifoFrame) {
        self.push(frame);
    }
}

/// Why a batch decode stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStop {
    /// Every byte was consumed
    Complete,
    /// A handle byte matched no known tag
    UnknownTag { raw: u8, offset: usize },
    /// The final record ran past the end of the batch
    Truncated {
        tag: SensorTag,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Outcome of one batch decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Records handed to the sink
    pub records: usize,
    /// Bytes consumed; the tail from here on was not parseable
    pub consumed: usize,
    /// Why the walk ended
    pub stop: DecodeStop,
}

impl DecodeSummary {
    pub fn is_complete(&self) -> bool {
        self.stop == DecodeStop::Complete
    }
}

/// Decode the maximal valid prefix of a FIFO batch
///
/// Each well-formed record is passed to `sink` as it is extracted. An
/// unknown handle or a record extending past the end of `buf` ends the walk;
/// neither is an error at this level, the remainder is simply dropped and
/// the stop reason reported in the summary.
pub fn decode_batch(buf: &[u8], sink: &mut dyn FrameSink) -> DecodeSummary {
    let mut index = 0;
    let mut records = 0;
    while index < buf.len() {
        let raw = buf[index];
        let Some(tag) = SensorTag::from_raw(raw) else {
            debug!(
                "unknown FIFO handle 0x{:02X} at offset {}, dropping {} bytes",
                raw,
                index,
                buf.len() - index
            );
            return DecodeSummary {
                records,
                consumed: index,
                stop: DecodeStop::UnknownTag { raw, offset: index },
            };
        };
        let len = tag.data_len();
        if index + len >= buf.len() {
            warn!(
                "truncated {:?} record at offset {}: need {} bytes, {} left",
                tag,
                index,
                len + 1,
                buf.len() - index
            );
            return DecodeSummary {
                records,
                consumed: index,
                stop: DecodeStop::Truncated {
                    tag,
                    offset: index,
                    needed: len + 1,
                    available: buf.len() - index,
                },
            };
        }
        let frame = FifoFrame::new(tag, &buf[index + 1..index + 1 + len]);
        sink.on_frame(tag, frame);
        records += 1;
        index += len + 1;
    }
    DecodeSummary {
        records,
        consumed: index,
        stop: DecodeStop::Complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn accel_record(x: i16, y: i16, z: i16) -> Vec<u8> {
        let mut rec = vec![SensorTag::Accel.raw()];
        rec.extend_from_slice(&x.to_le_bytes());
        rec.extend_from_slice(&y.to_le_bytes());
        rec.extend_from_slice(&z.to_le_bytes());
        rec
    }

    #[test]
    fn test_empty_batch() {
        let mut frames = Vec::new();
        let summary = decode_batch(&[], &mut frames);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.consumed, 0);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_single_record_filling_batch_exactly() {
        let batch = accel_record(100, -200, 4096);
        let mut frames = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert!(summary.is_complete());
        assert_eq!(summary.records, 1);
        assert_eq!(summary.consumed, batch.len());
        assert_eq!(frames[0].tag(), Some(SensorTag::Accel));
        assert_eq!(frames[0].payload(), &batch[1..]);
    }

    #[test]
    fn test_unknown_handle_stops_batch() {
        let mut batch = accel_record(1, 2, 3);
        batch.push(200);
        batch.extend_from_slice(&[9, 9, 9, 9]);
        let mut frames = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.consumed, 7);
        assert_eq!(
            summary.stop,
            DecodeStop::UnknownTag {
                raw: 200,
                offset: 7
            }
        );
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_truncated_tail_stops_early() {
        let mut batch = accel_record(1, 2, 3);
        batch.push(SensorTag::Accel.raw());
        batch.extend_from_slice(&[1, 2, 3]);
        let mut frames = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.consumed, 7);
        assert_eq!(
            summary.stop,
            DecodeStop::Truncated {
                tag: SensorTag::Accel,
                offset: 7,
                needed: 7,
                available: 4,
            }
        );
    }

    #[test]
    fn test_mixed_records_reach_sink_in_order() {
        let mut batch = Vec::new();
        batch.extend_from_slice(&accel_record(1, 2, 3));
        batch.push(SensorTag::Light.raw());
        batch.extend_from_slice(&[0x10, 0x20]);
        batch.push(SensorTag::MetaEvent.raw());
        batch.extend_from_slice(&[16, 0, 0, 0, 0, 0, 0, 0]);
        let mut frames = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert!(summary.is_complete());
        assert_eq!(summary.records, 3);
        assert_eq!(
            frames.iter().map(|f| f.tag()).collect::<Vec<_>>(),
            vec![
                Some(SensorTag::Accel),
                Some(SensorTag::Light),
                Some(SensorTag::MetaEvent),
            ]
        );
    }

    #[test]
    fn test_lone_handle_byte_is_truncated() {
        let batch = [SensorTag::StepDetector.raw()];
        let mut frames = Vec::new();
        let summary = decode_batch(&batch, &mut frames);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.consumed, 0);
        assert!(matches!(summary.stop, DecodeStop::Truncated { .. }));
    }

    proptest! {
        #[test]
        fn prop_emits_exactly_the_contained_records(
            seeds in proptest::collection::vec((0i16..1000, 0i16..1000, 0i16..1000), 1..20),
            extra in 0usize..8,
        ) {
            let mut batch = Vec::new();
            let mut ends = Vec::new();
            for (x, y, z) in &seeds {
                batch.extend_from_slice(&accel_record(*x, *y, *z));
                ends.push(batch.len());
            }
            let cut = (batch.len() - extra.min(batch.len() - 1)).max(1);
            let mut frames = Vec::new();
            let summary = decode_batch(&batch[..cut], &mut frames);
            let contained = ends.iter().filter(|&&end| end <= cut).count();
            prop_assert_eq!(summary.records, contained);
            prop_assert_eq!(frames.len(), contained);
        }

        #[test]
        fn prop_never_panics_and_never_overreads(
            bytes in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let mut frames = Vec::new();
            let summary = decode_batch(&bytes, &mut frames);
            prop_assert!(summary.consumed <= bytes.len());
            prop_assert_eq!(frames.len(), summary.records);
        }
    }
}
