//! Interrupt pump
//!
//! Bridges the device interrupt line to a single worker thread that
//! services the hub. Interrupt context does almost nothing: the reset
//! handshake is acknowledged inline and everything else becomes a queued
//! event carrying its arrival time, so FIFO work never runs concurrently
//! with itself.

use crate::session::DeviceSession;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEvent {
    Irq { ap_ns: u64 },
    Shutdown,
}

/// Cheap handle an interrupt handler raises events through
#[derive(Clone)]
pub struct IrqLine {
    session: Arc<DeviceSession>,
    tx: mpsc::Sender<PumpEvent>,
}

impl IrqLine {
    /// Record one device interrupt
    ///
    /// Never blocks. While an upload waits for its reset interrupt the
    /// acknowledgement happens right here; any other interrupt is queued
    /// for the worker with the host time it arrived. A full queue drops
    /// the event, which is safe because the next serviced interrupt reads
    /// whatever the FIFO holds by then.
    pub fn raise(&self) {
        if self.session.note_reset_irq() {
            return;
        }
        let event = PumpEvent::Irq {
            ap_ns: host_clock_ns(),
        };
        if self.tx.try_send(event).is_err() {
            debug!("interrupt queue full, coalescing");
        }
    }
}

fn host_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Owns the worker thread that services interrupts one at a time
pub struct InterruptPump {
    line: IrqLine,
    tx: mpsc::Sender<PumpEvent>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl InterruptPump {
    /// Start the pump worker for a session
    pub fn spawn(session: Arc<DeviceSession>) -> Self {
        let (tx, mut rx) = mpsc::channel(session.cfg.irq_queue_depth);
        let worker_session = session.clone();
        let worker = std::thread::spawn(move || {
            info!("interrupt pump running");
            while let Some(event) = rx.blocking_recv() {
                match event {
                    PumpEvent::Irq { ap_ns } => {
                        if let Err(err) = worker_session.handle_irq(ap_ns) {
                            warn!("interrupt service failed: {err}");
                        }
                    }
                    PumpEvent::Shutdown => {
                        debug!("interrupt pump stopping");
                        break;
                    }
                }
            }
        });
        Self {
            line: IrqLine {
                session,
                tx: tx.clone(),
            },
            tx,
            worker: Some(worker),
        }
    }

    pub fn irq_line(&self) -> IrqLine {
        self.line.clone()
    }

    /// Stop the worker after it has served everything already queued
    ///
    /// The shutdown marker goes through the same queue as interrupts, so
    /// pending work finishes first. Call from a blocking context.
    pub fn shutdown(mut self) {
        let _ = self.tx.blocking_send(PumpEvent::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("interrupt pump worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PumpConfig;
    use crate::phase::ResetPhase;
    use frame_ring::RingId;
    use hub_protocol::MockHub;
    use std::time::Duration;

    fn test_session() -> (Arc<DeviceSession>, MockHub) {
        let hub = MockHub::new();
        let session =
            DeviceSession::attach(Box::new(hub.clone()), PumpConfig::fast()).unwrap();
        (session, hub)
    }

    fn accel_batch() -> Vec<u8> {
        vec![1, 10, 0, 20, 0, 30, 0]
    }

    #[test]
    fn test_pump_services_interrupts() {
        let (session, hub) = test_session();
        *session.phase.lock() = ResetPhase::Initialized;
        hub.push_fifo_batch(&accel_batch());

        let pump = InterruptPump::spawn(session.clone());
        pump.irq_line().raise();

        for _ in 0..500 {
            if session.queue_stats(RingId::Main).len >= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        pump.shutdown();
        // Timestamp sync plus the decoded accel record
        assert_eq!(session.queue_stats(RingId::Main).len, 2);
    }

    #[test]
    fn test_reset_acknowledged_inline() {
        let (session, _hub) = test_session();
        let pump = InterruptPump::spawn(session.clone());

        assert_eq!(session.phase(), ResetPhase::AwaitingReset);
        pump.irq_line().raise();
        // The fast path runs in the caller, not the worker
        assert_eq!(session.phase(), ResetPhase::ResetReady);

        pump.shutdown();
        assert_eq!(session.queue_stats(RingId::Main).len, 0);
    }

    #[test]
    fn test_raise_never_blocks_on_full_queue() {
        let (session, _hub) = test_session();
        *session.phase.lock() = ResetPhase::Initialized;
        let (tx, _rx) = mpsc::channel(2);
        let line = IrqLine {
            session: session.clone(),
            tx,
        };
        // No worker is draining; the extra raises must drop, not block
        for _ in 0..10 {
            line.raise();
        }
    }

    #[test]
    fn test_shutdown_drains_queued_work() {
        let (session, hub) = test_session();
        *session.phase.lock() = ResetPhase::Initialized;
        for _ in 0..3 {
            hub.push_fifo_batch(&accel_batch());
        }

        let pump = InterruptPump::spawn(session.clone());
        let line = pump.irq_line();
        for _ in 0..3 {
            line.raise();
        }
        pump.shutdown();

        assert_eq!(hub.pending_batches(), 0);
        assert_eq!(session.queue_stats(RingId::Main).len, 6);
    }
}
