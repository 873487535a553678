//! RAM patch upload
//!
//! The hub boots from ROM and runs nothing useful until the host streams a
//! firmware patch into its program RAM. The image carries a small header
//! with the payload length and the CRC the device must report back once the
//! whole payload has been clocked in.

use crate::phase::ResetPhase;
use crate::session::DeviceSession;
use hub_protocol::{firmware_crc, reg, HubError};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info};

const PATCH_MAGIC: u16 = 0x652A;
const UPLOAD_CHUNK: usize = 64;

/// Parsed view over a firmware image
struct RamPatch<'a> {
    data_len: usize,
    crc: u32,
    payload: &'a [u8],
}

impl<'a> RamPatch<'a> {
    fn parse(image: &'a [u8]) -> Result<Self, HubError> {
        if image.len() < 8 {
            return Err(HubError::BadImage(format!(
                "image too short: {} bytes",
                image.len()
            )));
        }
        let magic = u16::from_le_bytes([image[0], image[1]]);
        if magic != PATCH_MAGIC {
            return Err(HubError::BadImage(format!("bad magic 0x{magic:04X}")));
        }
        let data_len = u16::from_le_bytes([image[2], image[3]]) as usize;
        if data_len == 0 || data_len % 4 != 0 {
            return Err(HubError::BadImage(format!("bad patch length {data_len}")));
        }
        let crc = u32::from_le_bytes([image[4], image[5], image[6], image[7]]);
        let payload = &image[8..];
        if payload.len() < data_len {
            return Err(HubError::BadImage(format!(
                "payload truncated: {} of {data_len} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            data_len,
            crc,
            payload: &payload[..data_len],
        })
    }
}

/// Wrap a raw firmware payload in the upload header
///
/// Pads the payload to a whole number of words and stamps the CRC the
/// device is expected to report back after the upload.
pub fn encode_image(payload: &[u8]) -> Vec<u8> {
    let mut padded = payload.to_vec();
    while padded.len() % 4 != 0 {
        padded.push(0);
    }
    assert!(padded.len() <= u16::MAX as usize, "patch exceeds header length field");
    let crc = firmware_crc(&padded);
    let mut image = Vec::with_capacity(8 + padded.len());
    image.extend_from_slice(&PATCH_MAGIC.to_le_bytes());
    image.extend_from_slice(&(padded.len() as u16).to_le_bytes());
    image.extend_from_slice(&crc.to_le_bytes());
    image.extend_from_slice(&padded);
    image
}

/// Upload a RAM patch and start the firmware
///
/// Any failure here is terminal for the session: the phase moves to
/// [`ResetPhase::Error`] and stays there until a later upload succeeds.
pub(crate) fn load(session: &DeviceSession, image: &[u8]) -> Result<(), HubError> {
    match upload(session, image) {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("firmware load failed: {err}");
            *session.phase.lock() = ResetPhase::Error;
            Err(err)
        }
    }
}

fn upload(session: &DeviceSession, image: &[u8]) -> Result<(), HubError> {
    let patch = RamPatch::parse(image)?;
    *session.phase.lock() = ResetPhase::AwaitingReset;

    let mut bus = session.bus.lock();
    bus.write_u8(reg::RESET_REQ, 1)?;
    // The reset interrupt only needs the phase lock, so waiting with the
    // transport held is safe
    let mut ready = false;
    for _ in 0..session.cfg.reset_wait_retries {
        if session.phase() == ResetPhase::ResetReady {
            ready = true;
            break;
        }
        std::thread::sleep(session.cfg.reset_wait_delay());
    }
    if !ready {
        return Err(HubError::Timeout("reset interrupt"));
    }
    info!(
        "uploading {} byte patch (crc 0x{:08X})",
        patch.data_len, patch.crc
    );

    bus.write_u16_le(reg::UPLOAD_ADDR_0, 0)?;
    bus.write_u8(reg::CHIP_CTRL, reg::chip_ctrl::UPLOAD_ENABLE)?;
    let mut chunk = [0u8; UPLOAD_CHUNK];
    for words in patch.payload.chunks(UPLOAD_CHUNK) {
        let swabbed = &mut chunk[..words.len()];
        swab_words(words, swabbed);
        bus.write(reg::UPLOAD_DATA, swabbed)?;
    }

    let device = bus.read_u32_le(reg::DATA_CRC_0)?;
    if device != patch.crc {
        return Err(HubError::CrcMismatch {
            device,
            image: patch.crc,
        });
    }

    bus.write_u8(reg::CHIP_CTRL, 0)?;
    std::thread::sleep(Duration::from_micros(50));
    bus.write_u8(reg::CHIP_CTRL, reg::chip_ctrl::CPU_RUN)?;
    drop(bus);
    info!("firmware started");

    if session.patch_loaded.swap(true, Ordering::SeqCst) {
        // A reload wipes every sensor configuration with it
        std::thread::sleep(session.cfg.resync_delay());
        session.sync_sensors()?;
    }
    Ok(())
}

/// The loader consumes each 32-bit word most significant byte first
fn swab_words(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks(4).zip(dst.chunks_mut(4)) {
        for i in 0..s.len() {
            d[i] = s[s.len() - 1 - i];
        }
    }
}
