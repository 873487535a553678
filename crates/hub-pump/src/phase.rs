//! Reset Phase Tracking

/// Lifecycle phase of the hub firmware, as the host sees it
///
/// The phase decides what an interrupt means: during bring-up the first
/// interrupt is the reset acknowledgement, afterwards interrupts announce
/// FIFO data. `Error` is absorbing until the next firmware upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPhase {
    /// Reset requested, waiting for the hub to signal it came back up
    AwaitingReset,
    /// Hub is back up and accepting the firmware upload
    ResetReady,
    /// Firmware running, interrupts carry FIFO data
    Initialized,
    /// Host-triggered self test running, results arrive over the FIFO
    SelfTestInProgress,
    /// Bring-up failed; interrupts are ignored until a new upload
    Error,
}

impl ResetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPhase::AwaitingReset => "awaiting-reset",
            ResetPhase::ResetReady => "reset-ready",
            ResetPhase::Initialized => "initialized",
            ResetPhase::SelfTestInProgress => "self-test",
            ResetPhase::Error => "error",
        }
    }
}
