//! Mock Hub Device
//!
//! A register-level model of the hub for tests and the demo service: FIFO
//! batches are queued by the test, the parameter handshake is emulated with
//! configurable acknowledge behavior, and firmware uploads are captured so
//! the CRC register works like the real device. Clones share one device.

use crate::bus::HubBus;
use crate::error::HubError;
use crate::{algo_param, page, reg};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// How the mock firmware answers parameter requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge on the first poll
    Immediate,
    /// Acknowledge after this many polls return nothing
    AfterPolls(u32),
    /// Refuse every request
    Reject,
    /// Never acknowledge
    Silent,
}

#[derive(Debug)]
struct MockState {
    regs: [u8; 256],
    fifo: VecDeque<Vec<u8>>,
    params: Vec<((u8, u8), Vec<u8>)>,
    param_writes: Vec<(u8, u8, Vec<u8>)>,
    reg_writes: Vec<(u8, Vec<u8>)>,
    ack_mode: Option<AckMode>,
    pending_ack: Option<(u8, u32)>,
    fail_reads: Vec<u8>,
    fail_writes: Vec<u8>,
    upload: Vec<u8>,
    reset_count: u32,
    foc_autocomplete: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            regs: [0; 256],
            fifo: VecDeque::new(),
            params: Vec::new(),
            param_writes: Vec::new(),
            reg_writes: Vec::new(),
            ack_mode: None,
            pending_ack: None,
            fail_reads: Vec::new(),
            fail_writes: Vec::new(),
            upload: Vec::new(),
            reset_count: 0,
            foc_autocomplete: false,
        }
    }
}

impl MockState {
    fn param_get(&self, key: (u8, u8)) -> Option<&Vec<u8>> {
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn param_set(&mut self, key: (u8, u8), value: Vec<u8>) {
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.params.push((key, value));
        }
    }
}

/// Shared-state mock implementing [`HubBus`]
#[derive(Clone)]
pub struct MockHub {
    state: Arc<Mutex<MockState>>,
}

impl MockHub {
    /// Create a mock hub that identifies as a known chip
    pub fn new() -> Self {
        let mut state = MockState {
            foc_autocomplete: true,
            ..Default::default()
        };
        state.regs[reg::PRODUCT_ID as usize] = reg::PRODUCT_ID_BHA;
        state.regs[reg::REVISION_ID as usize] = 0x03;
        state.regs[reg::ROM_VERSION_0 as usize..][..2].copy_from_slice(&0x2112u16.to_le_bytes());
        state.regs[reg::RAM_VERSION_0 as usize..][..2].copy_from_slice(&0x19A2u16.to_le_bytes());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Queue one FIFO batch; each batch is one interrupt's worth of bytes
    pub fn push_fifo_batch(&self, bytes: &[u8]) {
        self.state.lock().fifo.push_back(bytes.to_vec());
    }

    /// Preload a parameter value
    pub fn set_param(&self, page: u8, param: u8, data: &[u8]) {
        self.state.lock().param_set((page, param), data.to_vec());
    }

    /// Set a single register byte directly
    pub fn set_reg(&self, reg: u8, value: u8) {
        self.state.lock().regs[reg as usize] = value;
    }

    /// Set a register run directly
    pub fn set_regs(&self, reg: u8, values: &[u8]) {
        let mut state = self.state.lock();
        state.regs[reg as usize..][..values.len()].copy_from_slice(values);
    }

    /// Choose how parameter requests get acknowledged
    pub fn set_ack_mode(&self, mode: AckMode) {
        self.state.lock().ack_mode = Some(mode);
    }

    /// Fail the next read of `reg` with a transport error
    pub fn fail_next_read(&self, reg: u8) {
        self.state.lock().fail_reads.push(reg);
    }

    /// Fail the next write of `reg` with a transport error
    pub fn fail_next_write(&self, reg: u8) {
        self.state.lock().fail_writes.push(reg);
    }

    /// Committed parameter writes, in order
    pub fn param_writes(&self) -> Vec<(u8, u8, Vec<u8>)> {
        self.state.lock().param_writes.clone()
    }

    /// Every register write seen, in order
    pub fn reg_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().reg_writes.clone()
    }

    /// Register writes addressed to one register
    pub fn writes_to(&self, reg: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .reg_writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// How many reset requests the device has seen
    pub fn reset_count(&self) -> u32 {
        self.state.lock().reset_count
    }

    /// Bytes written through the upload window, as written
    pub fn uploaded_bytes(&self) -> Vec<u8> {
        self.state.lock().upload.clone()
    }

    /// The uploaded image as the device stores it, words swapped back
    pub fn uploaded_image(&self) -> Vec<u8> {
        unswab(&self.state.lock().upload)
    }

    /// Number of FIFO batches not yet drained
    pub fn pending_batches(&self) -> usize {
        self.state.lock().fifo.len()
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HubBus for MockHub {
    fn read(&mut self, reg_addr: u8, buf: &mut [u8]) -> Result<(), HubError> {
        let mut state = self.state.lock();
        if let Some(pos) = state.fail_reads.iter().position(|r| *r == reg_addr) {
            state.fail_reads.remove(pos);
            return Err(HubError::Transport(format!(
                "injected read failure at 0x{reg_addr:02X}"
            )));
        }
        match reg_addr {
            reg::FIFO_BUFFER => {
                buf.fill(0);
                if let Some(batch) = state.fifo.pop_front() {
                    let n = batch.len().min(buf.len());
                    buf[..n].copy_from_slice(&batch[..n]);
                }
            }
            reg::BYTES_REMAIN_0 => {
                let remain = state.fifo.front().map(|b| b.len()).unwrap_or(0) as u16;
                let bytes = remain.to_le_bytes();
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
            }
            reg::PARAM_ACK => {
                if let Some((request, polls_left)) = state.pending_ack {
                    if polls_left == 0 {
                        state.regs[reg::PARAM_ACK as usize] = request;
                        state.pending_ack = None;
                    } else {
                        state.pending_ack = Some((request, polls_left - 1));
                    }
                }
                buf[0] = state.regs[reg::PARAM_ACK as usize];
            }
            reg::SAVED_PARAM_0 => {
                let page = state.regs[reg::PARAM_PAGE_SEL as usize];
                let param = state.regs[reg::PARAM_REQ as usize] & 0x7F;
                buf.fill(0);
                if let Some(data) = state.param_get((page, param)) {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                }
            }
            reg::DATA_CRC_0 => {
                let crc = firmware_crc(&unswab(&state.upload));
                let bytes = crc.to_le_bytes();
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
            }
            _ => {
                let start = reg_addr as usize;
                let end = (start + buf.len()).min(state.regs.len());
                let n = end - start;
                buf[..n].copy_from_slice(&state.regs[start..end]);
                buf[n..].fill(0);
            }
        }
        Ok(())
    }

    fn write(&mut self, reg_addr: u8, data: &[u8]) -> Result<(), HubError> {
        let mut state = self.state.lock();
        if let Some(pos) = state.fail_writes.iter().position(|r| *r == reg_addr) {
            state.fail_writes.remove(pos);
            return Err(HubError::Transport(format!(
                "injected write failure at 0x{reg_addr:02X}"
            )));
        }
        state.reg_writes.push((reg_addr, data.to_vec()));
        match reg_addr {
            reg::RESET_REQ => {
                state.reset_count += 1;
                state.fifo.clear();
                state.upload.clear();
            }
            reg::UPLOAD_DATA => {
                state.upload.extend_from_slice(data);
            }
            reg::PARAM_REQ => {
                let request = data[0];
                state.regs[reg::PARAM_REQ as usize] = request;
                if request == 0 {
                    state.regs[reg::PARAM_ACK as usize] = 0;
                    state.pending_ack = None;
                } else {
                    let mode = state.ack_mode.unwrap_or(AckMode::Immediate);
                    match mode {
                        AckMode::Immediate => {
                            state.regs[reg::PARAM_ACK as usize] = request;
                            commit_if_write(&mut state, request);
                        }
                        AckMode::AfterPolls(n) => {
                            state.regs[reg::PARAM_ACK as usize] = 0;
                            state.pending_ack = Some((request, n));
                            commit_if_write(&mut state, request);
                        }
                        AckMode::Reject => {
                            state.regs[reg::PARAM_ACK as usize] = 0x80;
                        }
                        AckMode::Silent => {
                            state.regs[reg::PARAM_ACK as usize] = 0;
                        }
                    }
                }
            }
            reg::HOST_CTRL => {
                let value = data[0];
                state.regs[reg::HOST_CTRL as usize] = value;
                // Standby request is reflected in host status immediately
                if value & reg::host_ctrl::ALGORITHM_STANDBY != 0 {
                    state.regs[reg::HOST_STATUS as usize] |= reg::host_status::ALGO_STANDBY;
                } else {
                    state.regs[reg::HOST_STATUS as usize] &= !reg::host_status::ALGO_STANDBY;
                }
            }
            _ => {
                let start = reg_addr as usize;
                let end = (start + data.len()).min(state.regs.len());
                let n = end - start;
                state.regs[start..end].copy_from_slice(&data[..n]);
            }
        }
        Ok(())
    }
}

fn commit_if_write(state: &mut MockState, request: u8) {
    if request & 0x80 == 0 {
        return;
    }
    let page = state.regs[reg::PARAM_PAGE_SEL as usize];
    let param = request & 0x7F;
    let data =
        state.regs[reg::LOAD_PARAM_0 as usize..][..crate::param::LOAD_WINDOW_LEN].to_vec();
    state.param_writes.push((page, param, data.clone()));
    if page == page::ALGORITHM && param == algo_param::FOC_CONTROL && state.foc_autocomplete {
        // Compensation completes instantly: status byte goes to 1
        state.param_set((page, param), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    } else {
        state.param_set((page, param), data);
    }
}

fn unswab(words: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len());
    for chunk in words.chunks_exact(4) {
        out.extend_from_slice(&[chunk[3], chunk[2], chunk[1], chunk[0]]);
    }
    out
}

/// CRC-32 as the device computes it over a stored firmware image
pub fn firmware_crc(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_batches_drain_in_order() {
        let mut hub = MockHub::new();
        hub.push_fifo_batch(&[1, 2, 3]);
        hub.push_fifo_batch(&[4, 5]);

        assert_eq!(hub.read_u16_le(reg::BYTES_REMAIN_0).unwrap(), 3);
        let mut buf = [0u8; 3];
        hub.read(reg::FIFO_BUFFER, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);

        assert_eq!(hub.read_u16_le(reg::BYTES_REMAIN_0).unwrap(), 2);
        let mut buf = [0u8; 2];
        hub.read(reg::FIFO_BUFFER, &mut buf).unwrap();
        assert_eq!(buf, [4, 5]);

        assert_eq!(hub.read_u16_le(reg::BYTES_REMAIN_0).unwrap(), 0);
    }

    #[test]
    fn test_injected_read_failure_fires_once() {
        let mut hub = MockHub::new();
        hub.fail_next_read(reg::BYTES_REMAIN_0);
        assert!(hub.read_u16_le(reg::BYTES_REMAIN_0).is_err());
        assert!(hub.read_u16_le(reg::BYTES_REMAIN_0).is_ok());
    }

    #[test]
    fn test_reset_clears_fifo_and_upload() {
        let mut hub = MockHub::new();
        hub.push_fifo_batch(&[1, 2, 3]);
        hub.write(reg::UPLOAD_DATA, &[1, 2, 3, 4]).unwrap();
        hub.write_u8(reg::RESET_REQ, 1).unwrap();
        assert_eq!(hub.reset_count(), 1);
        assert_eq!(hub.pending_batches(), 0);
        assert!(hub.uploaded_bytes().is_empty());
    }

    #[test]
    fn test_crc_register_matches_stored_image() {
        let mut hub = MockHub::new();
        // Host writes words byte-swapped; device stores the original image
        let image = [0xAAu8, 0xBB, 0xCC, 0xDD, 0x11, 0x22, 0x33, 0x44];
        for chunk in image.chunks_exact(4) {
            hub.write(reg::UPLOAD_DATA, &[chunk[3], chunk[2], chunk[1], chunk[0]])
                .unwrap();
        }
        assert_eq!(hub.uploaded_image(), image);
        assert_eq!(
            hub.read_u32_le(reg::DATA_CRC_0).unwrap(),
            firmware_crc(&image)
        );
    }

    #[test]
    fn test_crc_known_vector() {
        // IEEE CRC-32 of "123456789"
        assert_eq!(firmware_crc(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_clones_share_state() {
        let hub = MockHub::new();
        let mut writer = hub.clone();
        writer.write_u8(reg::CHIP_CTRL, 1).unwrap();
        assert_eq!(hub.writes_to(reg::CHIP_CTRL), vec![vec![1]]);
    }
}
