//! Paged Parameter Protocol
//!
//! Parameters live in a paged RAM behind four registers: a page select, a
//! param request, an acknowledge byte and two data windows. A request is
//! acknowledged by the firmware echoing the request number; `0x80` means the
//! request was refused. Both directions clear the selectors afterwards so a
//! stale page cannot leak into the next exchange.

use crate::bus::HubBus;
use crate::error::HubError;
use crate::reg;
use std::time::Duration;
use tracing::warn;

/// Acknowledge value the firmware uses to refuse a request
const PARAM_ACK_REJECTED: u8 = 0x80;

/// Size of the load (host to hub) parameter window
pub const LOAD_WINDOW_LEN: usize = 8;

/// Size of the saved (hub to host) parameter window
pub const SAVED_WINDOW_LEN: usize = 16;

/// Tuning for the acknowledge poll
#[derive(Debug, Clone)]
pub struct ParamConfig {
    /// Maximum acknowledge polls before giving up
    pub ack_retries: u32,
    /// Delay between acknowledge polls
    pub ack_delay: Duration,
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            ack_retries: 100,
            ack_delay: Duration::from_millis(10),
        }
    }
}

/// Parameter number carrying a sensor's read-only information block
pub fn sensor_info_param(raw_handle: u8) -> u8 {
    raw_handle
}

/// Parameter number carrying a sensor's configuration block
pub fn sensor_conf_param(raw_handle: u8) -> u8 {
    0x40 | raw_handle
}

/// Read a parameter into `buf`.
///
/// The caller must hold the transport lock; the handshake is a multi-register
/// sequence the firmware assumes is not interleaved.
pub fn read_parameter(
    bus: &mut dyn HubBus,
    cfg: &ParamConfig,
    page: u8,
    param: u8,
    buf: &mut [u8],
) -> Result<(), HubError> {
    if buf.len() > SAVED_WINDOW_LEN {
        return Err(HubError::InvalidConfig(format!(
            "parameter read of {} bytes exceeds saved window",
            buf.len()
        )));
    }
    bus.write_u8(reg::PARAM_PAGE_SEL, page)?;
    bus.write_u8(reg::PARAM_REQ, param)?;
    wait_for_ack(bus, cfg, page, param, param)?;
    bus.read(reg::SAVED_PARAM_0, buf)?;
    clear_selectors(bus)
}

/// Write a parameter from `data`.
pub fn write_parameter(
    bus: &mut dyn HubBus,
    cfg: &ParamConfig,
    page: u8,
    param: u8,
    data: &[u8],
) -> Result<(), HubError> {
    if data.len() > LOAD_WINDOW_LEN {
        return Err(HubError::InvalidConfig(format!(
            "parameter write of {} bytes exceeds load window",
            data.len()
        )));
    }
    bus.write(reg::LOAD_PARAM_0, data)?;
    bus.write_u8(reg::PARAM_PAGE_SEL, page)?;
    let request = param | 0x80;
    bus.write_u8(reg::PARAM_REQ, request)?;
    wait_for_ack(bus, cfg, page, param, request)?;
    clear_selectors(bus)
}

fn wait_for_ack(
    bus: &mut dyn HubBus,
    cfg: &ParamConfig,
    page: u8,
    param: u8,
    expected: u8,
) -> Result<(), HubError> {
    for _ in 0..cfg.ack_retries {
        let ack = bus.read_u8(reg::PARAM_ACK)?;
        if ack == PARAM_ACK_REJECTED {
            warn!(page, param, "parameter request refused by firmware");
            return Err(HubError::ParamRejected { page, param });
        }
        if ack == expected {
            return Ok(());
        }
        std::thread::sleep(cfg.ack_delay);
    }
    warn!(page, param, "parameter acknowledge poll exhausted");
    Err(HubError::AckTimeout {
        page,
        param,
        attempts: cfg.ack_retries,
    })
}

fn clear_selectors(bus: &mut dyn HubBus) -> Result<(), HubError> {
    bus.write_u8(reg::PARAM_PAGE_SEL, 0)?;
    bus.write_u8(reg::PARAM_REQ, 0)
}
