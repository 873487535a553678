//! Sensor Hub Engine Service
//!
//! Wires a device session, the interrupt pump and a simulated hub into a
//! runnable host process. The simulator plays the device side of the
//! interrupt line so the whole pump path can run on a desk without
//! hardware.

use anyhow::Context;
use config::{Config, Environment, File};
use frame_ring::RingId;
use hub_protocol::{FifoFrame, HubError, MockHub, SensorTag};
use hub_pump::{encode_image, DeviceSession, InterruptPump, PumpConfig, ResetPhase};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod sim;

pub use sim::Simulator;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ready-to-upload firmware image; a built-in one is used when unset
    pub firmware_image: Option<PathBuf>,
    pub pump: PumpConfig,
    pub sim: SimConfig,
    pub output: OutputConfig,
}

/// Simulated device behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Milliseconds between simulated data interrupts (default: 200)
    pub interval_ms: u64,
    /// Stop after this many data batches, 0 for unlimited (default: 0)
    pub batches: u32,
    /// Accelerometer rate requested at startup in Hz (default: 50)
    pub accel_rate_hz: u16,
    /// Drive the step pipeline from simulated pedometer blocks (default: true)
    pub step_counter: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            batches: 0,
            accel_rate_hz: 50,
            step_counter: true,
        }
    }
}

/// Frame output behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Emit each drained frame as a JSON line on stdout (default: false)
    pub json: bool,
}

/// Load configuration from an optional file plus `HUB` environment overrides
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    let raw = builder
        .add_source(
            Environment::with_prefix("HUB")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("assembling configuration")?;
    raw.try_deserialize().context("invalid configuration")
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the engine against the simulated hub
///
/// Brings the firmware up, enables the configured sensors and then drains
/// the frame queues until the simulator has emitted all of its batches or
/// Ctrl-C arrives.
pub async fn run(cfg: ServiceConfig) -> anyhow::Result<()> {
    let hub = MockHub::new();
    let session = DeviceSession::attach(Box::new(hub.clone()), cfg.pump.clone())
        .context("attaching sensor hub")?;
    let chip = session.chip();
    info!(
        "attached hub: product 0x{:02X} rom {:04X} ram {:04X}",
        chip.product_id, chip.rom_version, chip.ram_version
    );

    let pump = InterruptPump::spawn(session.clone());
    let sim = Simulator::spawn(hub.clone(), pump.irq_line(), cfg.sim.clone());

    let uploader = session.clone();
    let image = match &cfg.firmware_image {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("reading firmware image {}", path.display()))?,
        None => encode_image(&firmware_payload()),
    };
    tokio::task::spawn_blocking(move || uploader.bring_up(&image))
        .await
        .context("firmware upload worker")?
        .context("uploading firmware")?;
    wait_for_phase(&session, ResetPhase::Initialized, Duration::from_secs(5)).await?;
    info!("hub initialized, enabling sensors");

    let setup = session.clone();
    let sim_cfg = cfg.sim.clone();
    tokio::task::spawn_blocking(move || -> Result<(), HubError> {
        setup.set_sensor_rate(SensorTag::Accel, sim_cfg.accel_rate_hz)?;
        if sim_cfg.step_counter {
            setup.enable_step_detector()?;
            setup.enable_step_counter()?;
        }
        Ok(())
    })
    .await
    .context("sensor setup worker")?
    .context("configuring sensors")?;

    let mut main_total = 0usize;
    let mut ar_total = 0usize;
    loop {
        tokio::select! {
            _ = session.wait_data() => {}
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
        let (main, ar) = drain_rings(&cfg.output, &session)?;
        main_total += main;
        ar_total += ar;
        if cfg.sim.batches > 0 && sim.finished() && hub.pending_batches() == 0 {
            break;
        }
    }

    tokio::task::spawn_blocking(move || {
        sim.stop();
        pump.shutdown();
    })
    .await
    .context("shutdown worker")?;
    let (main, ar) = drain_rings(&cfg.output, &session)?;
    main_total += main;
    ar_total += ar;

    info!(
        "drained {} main and {} activity frames over {} serviced interrupts",
        main_total,
        ar_total,
        session.irq_count()
    );
    Ok(())
}

async fn wait_for_phase(
    session: &Arc<DeviceSession>,
    want: ResetPhase,
    limit: Duration,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + limit;
    while session.phase() != want {
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "hub stuck in {:?} waiting for {:?}",
            session.phase(),
            want
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}

fn drain_rings(
    output: &OutputConfig,
    session: &Arc<DeviceSession>,
) -> anyhow::Result<(usize, usize)> {
    let mut totals = (0, 0);
    loop {
        let frames = session.drain(RingId::Main, 64);
        if frames.is_empty() {
            break;
        }
        totals.0 += frames.len();
        emit_frames(output, RingId::Main, &frames)?;
    }
    loop {
        let frames = session.drain(RingId::ActivityRecognition, 64);
        if frames.is_empty() {
            break;
        }
        totals.1 += frames.len();
        emit_frames(output, RingId::ActivityRecognition, &frames)?;
    }
    Ok(totals)
}

#[derive(Serialize)]
struct FrameLine<'a> {
    ring: RingId,
    handle: u8,
    data: &'a [u8],
}

fn emit_frames(
    output: &OutputConfig,
    ring: RingId,
    frames: &[FifoFrame],
) -> anyhow::Result<()> {
    if output.json {
        let mut stdout = std::io::stdout().lock();
        for frame in frames {
            let line = serde_json::to_string(&FrameLine {
                ring,
                handle: frame.handle,
                data: frame.payload(),
            })?;
            writeln!(stdout, "{line}")?;
        }
    } else {
        info!("{} frames from the {} queue", frames.len(), ring.as_str());
    }
    Ok(())
}

/// Deterministic stand-in firmware image for the simulated hub
fn firmware_payload() -> Vec<u8> {
    (0..256u32).flat_map(|word| word.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServiceConfig::default();
        assert!(cfg.firmware_image.is_none());
        assert_eq!(cfg.pump.main_ring_capacity, 2048);
        assert_eq!(cfg.sim.interval_ms, 200);
        assert_eq!(cfg.sim.batches, 0);
        assert!(cfg.sim.step_counter);
        assert!(!cfg.output.json);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let path = std::env::temp_dir()
            .join(format!("hub-service-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "firmware_image = \"/lib/firmware/hub-patch.fw\"\n\n\
             [sim]\ninterval_ms = 5\nbatches = 2\n\n[pump]\nack_retries = 7\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(
            cfg.firmware_image.as_deref(),
            Some(Path::new("/lib/firmware/hub-patch.fw"))
        );
        assert_eq!(cfg.sim.interval_ms, 5);
        assert_eq!(cfg.sim.batches, 2);
        assert_eq!(cfg.pump.ack_retries, 7);
        // Untouched sections keep their defaults
        assert_eq!(cfg.pump.main_ring_capacity, 2048);
        assert!(cfg.sim.step_counter);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_config_file_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/hub.toml"))).is_err());
    }

    #[tokio::test]
    async fn test_run_completes_with_bounded_batches() {
        let cfg = ServiceConfig {
            firmware_image: None,
            pump: PumpConfig::fast(),
            sim: SimConfig {
                interval_ms: 2,
                batches: 3,
                accel_rate_hz: 50,
                step_counter: false,
            },
            output: OutputConfig { json: false },
        };
        tokio::time::timeout(Duration::from_secs(30), run(cfg))
            .await
            .expect("service run timed out")
            .unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_frames_reach_both_queues() {
        let hub = MockHub::new();
        let session =
            DeviceSession::attach(Box::new(hub.clone()), PumpConfig::fast()).unwrap();
        let pump = InterruptPump::spawn(session.clone());
        let sim = Simulator::spawn(
            hub.clone(),
            pump.irq_line(),
            SimConfig {
                interval_ms: 2,
                batches: 8,
                accel_rate_hz: 50,
                step_counter: true,
            },
        );

        let uploader = session.clone();
        let image = encode_image(&firmware_payload());
        tokio::task::spawn_blocking(move || uploader.bring_up(&image))
            .await
            .unwrap()
            .unwrap();
        wait_for_phase(&session, ResetPhase::Initialized, Duration::from_secs(5))
            .await
            .unwrap();

        let setup = session.clone();
        tokio::task::spawn_blocking(move || -> Result<(), HubError> {
            setup.set_sensor_rate(SensorTag::Accel, 50)?;
            setup.enable_step_counter()
        })
        .await
        .unwrap()
        .unwrap();

        for _ in 0..2500 {
            if sim.finished() && hub.pending_batches() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(sim.finished());
        tokio::task::spawn_blocking(move || {
            sim.stop();
            pump.shutdown();
        })
        .await
        .unwrap();

        let main = session.drain(RingId::Main, 256);
        let handles: Vec<u8> = main.iter().map(|f| f.handle).collect();
        assert!(handles.contains(&SensorTag::Accel.raw()));
        assert!(handles.contains(&SensorTag::TimestampSync.raw()));
        assert!(handles.contains(&SensorTag::StepCounter.raw()));

        let ar = session.drain(RingId::ActivityRecognition, 256);
        assert!(!ar.is_empty());
        assert!(ar
            .iter()
            .all(|frame| frame.handle == SensorTag::TimestampSync.raw()));
        assert_eq!(session.phase(), ResetPhase::Initialized);
    }
}
