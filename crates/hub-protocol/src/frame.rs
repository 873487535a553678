//! FIFO Record Formats
//!
//! Records are fixed-size copies: one handle byte plus a payload area large
//! enough for the biggest payload any handle defines. Consumers read them
//! from the ring buffers by value; the byte-stream interface emits them in
//! the wire layout produced by [`FifoFrame::to_bytes`].

use crate::tag::SensorTag;
use serde::{Deserialize, Serialize};

/// Payload area of a record, sized for the largest defined payload
pub const FRAME_DATA_LEN: usize = 16;

/// Size of one record on the byte-stream interface
pub const FRAME_WIRE_LEN: usize = FRAME_DATA_LEN + 1;

/// One sensor event record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoFrame {
    /// Raw sensor handle
    pub handle: u8,
    /// Payload bytes; only the handle's `data_len` prefix is meaningful
    pub data: [u8; FRAME_DATA_LEN],
}

impl FifoFrame {
    /// Build a record for a known tag, copying the payload prefix
    pub fn new(tag: SensorTag, payload: &[u8]) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        let n = payload.len().min(FRAME_DATA_LEN);
        data[..n].copy_from_slice(&payload[..n]);
        Self {
            handle: tag.raw(),
            data,
        }
    }

    /// The tag for this record's handle, if known
    pub fn tag(&self) -> Option<SensorTag> {
        SensorTag::from_raw(self.handle)
    }

    /// The meaningful payload prefix
    pub fn payload(&self) -> &[u8] {
        let len = self
            .tag()
            .map(|t| t.data_len())
            .unwrap_or(FRAME_DATA_LEN);
        &self.data[..len]
    }

    /// Encode in the byte-stream wire layout
    pub fn to_bytes(&self) -> [u8; FRAME_WIRE_LEN] {
        let mut out = [0u8; FRAME_WIRE_LEN];
        out[0] = self.handle;
        out[1..].copy_from_slice(&self.data);
        out
    }

    /// Decode from the byte-stream wire layout
    pub fn from_bytes(bytes: &[u8; FRAME_WIRE_LEN]) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data.copy_from_slice(&bytes[1..]);
        Self {
            handle: bytes[0],
            data,
        }
    }

    /// Synthesize a host/firmware timestamp pairing record
    pub fn timestamp_sync(ap_ns: u64, fw_ticks: u32, irq_count: u32) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data[..8].copy_from_slice(&ap_ns.to_le_bytes());
        data[8..12].copy_from_slice(&fw_ticks.to_le_bytes());
        data[12..16].copy_from_slice(&irq_count.to_le_bytes());
        Self {
            handle: SensorTag::TimestampSync.raw(),
            data,
        }
    }

    /// Synthesize a host sleep status record
    pub fn sleep_status(state: SleepState) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data[0] = state as u8;
        Self {
            handle: SensorTag::SleepStatus.raw(),
            data,
        }
    }

    /// Synthesize a step detector record
    pub fn step_detector() -> Self {
        Self {
            handle: SensorTag::StepDetector.raw(),
            data: [0u8; FRAME_DATA_LEN],
        }
    }

    /// Synthesize a step counter record from the accumulated count
    pub fn step_counter(count: u32) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data[..2].copy_from_slice(&(count as u16).to_le_bytes());
        Self {
            handle: SensorTag::StepCounter.raw(),
            data,
        }
    }

    /// Build a meta event record
    pub fn meta_event(kind: MetaKind, sensor: u8, value: u8) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data[0] = kind as u8;
        data[1] = sensor;
        data[2] = value;
        Self {
            handle: SensorTag::MetaEvent.raw(),
            data,
        }
    }
}

/// Meta event sub-protocol codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MetaKind {
    /// A requested sensor flush finished (1)
    FlushComplete = 1,
    /// Effective sample rate changed (2)
    SampleRateChanged = 2,
    /// Sensor power mode changed (3)
    PowerModeChanged = 3,
    /// Firmware error word (4)
    Error = 4,
    /// A physical sensor reported an error (11)
    SensorError = 11,
    /// The firmware FIFO overflowed (12)
    FifoOverflow = 12,
    /// Dynamic range changed (13)
    DynamicRangeChanged = 13,
    /// FIFO watermark reached (14)
    FifoWatermark = 14,
    /// Self test finished for one sensor (15)
    SelfTestResults = 15,
    /// Firmware finished initialization after reset (16)
    Initialized = 16,
}

impl MetaKind {
    /// Map a raw sub-code, or `None` for codes this revision ignores
    pub fn from_raw(raw: u8) -> Option<Self> {
        let kind = match raw {
            1 => MetaKind::FlushComplete,
            2 => MetaKind::SampleRateChanged,
            3 => MetaKind::PowerModeChanged,
            4 => MetaKind::Error,
            11 => MetaKind::SensorError,
            12 => MetaKind::FifoOverflow,
            13 => MetaKind::DynamicRangeChanged,
            14 => MetaKind::FifoWatermark,
            15 => MetaKind::SelfTestResults,
            16 => MetaKind::Initialized,
            _ => return None,
        };
        Some(kind)
    }
}

/// Decoded view of a meta event record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaEvent {
    /// What happened
    pub kind: MetaKind,
    /// Raw handle of the sensor the event refers to, 0 for global events
    pub sensor: u8,
    /// Event-specific value byte
    pub value: u8,
}

impl MetaEvent {
    /// Parse a meta event from a record, if the record carries one
    pub fn parse(frame: &FifoFrame) -> Option<Self> {
        match frame.tag()? {
            SensorTag::MetaEvent | SensorTag::MetaEventWake => Some(Self {
                kind: MetaKind::from_raw(frame.data[0])?,
                sensor: frame.data[1],
                value: frame.data[2],
            }),
            _ => None,
        }
    }
}

/// Decoded pedometer status block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PedometerRecord {
    /// 0 for a live report, or the slot index of a logged block
    pub data_index: u8,
    /// Steps counted while walking
    pub walk_count: u16,
    /// Steps counted while running
    pub run_count: u16,
    /// 0 when stationary, nonzero while stepping
    pub step_status: u8,
    /// Block start time, firmware ticks
    pub start_time: u32,
    /// Block end time, firmware ticks
    pub end_time: u32,
}

impl PedometerRecord {
    /// Encoded payload size
    pub const LEN: usize = 14;

    /// Parse from a record payload
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::LEN {
            return None;
        }
        Some(Self {
            data_index: payload[0],
            walk_count: u16::from_le_bytes([payload[1], payload[2]]),
            run_count: u16::from_le_bytes([payload[3], payload[4]]),
            step_status: payload[5],
            start_time: u32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
            end_time: u32::from_le_bytes([payload[10], payload[11], payload[12], payload[13]]),
        })
    }

    /// Encode as a record payload
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.data_index;
        out[1..3].copy_from_slice(&self.walk_count.to_le_bytes());
        out[3..5].copy_from_slice(&self.run_count.to_le_bytes());
        out[5] = self.step_status;
        out[6..10].copy_from_slice(&self.start_time.to_le_bytes());
        out[10..14].copy_from_slice(&self.end_time.to_le_bytes());
        out
    }
}

/// Host sleep states carried in [`SensorTag::SleepStatus`] records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SleepState {
    /// Application processor entered suspend
    Suspend = 1,
    /// Application processor resumed
    Resume = 2,
}

/// Decoded view of a timestamp pairing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSync {
    /// Host clock at interrupt time, nanoseconds
    pub ap_ns: u64,
    /// Firmware tick counter latched at interrupt time
    pub fw_ticks: u32,
    /// Interrupts seen since attach or resume
    pub irq_count: u32,
}

impl TimestampSync {
    /// Parse from a record, if the record carries a timestamp pairing
    pub fn parse(frame: &FifoFrame) -> Option<Self> {
        if frame.tag()? != SensorTag::TimestampSync {
            return None;
        }
        let d = &frame.data;
        Some(Self {
            ap_ns: u64::from_le_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]]),
            fw_ticks: u32::from_le_bytes([d[8], d[9], d[10], d[11]]),
            irq_count: u32::from_le_bytes([d[12], d[13], d[14], d[15]]),
        })
    }
}
