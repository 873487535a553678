//! Accelerometer calibration
//!
//! Measures the resting offset of each accelerometer axis and stores it so
//! the steady-state path can subtract it from every sample. The device is
//! assumed to lie flat while this runs, so the Z axis reads gravity and
//! gets one g removed before the offset is kept. Profiles persist across
//! restarts through a small postcard blob on disk.

use crate::session::DeviceSession;
use hub_protocol::{HubError, SensorTag};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counts one g in accelerometer units at the default range
const MAX_ACCEL_1G: i32 = 4096;

/// On-disk calibration record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub offsets: [i16; 3],
}

/// Read a stored calibration profile
///
/// Returns `None` for a missing or unreadable file and for an all-zero
/// profile, which marks a device that was never calibrated.
pub fn load_profile(path: &Path) -> Option<[i16; 3]> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!("no calibration profile at {}: {err}", path.display());
            return None;
        }
    };
    let profile: CalibrationProfile = match postcard::from_bytes(&raw) {
        Ok(profile) => profile,
        Err(err) => {
            warn!("ignoring corrupt calibration profile {}: {err}", path.display());
            return None;
        }
    };
    if profile.offsets == [0, 0, 0] {
        return None;
    }
    Some(profile.offsets)
}

/// Persist a calibration profile
pub fn save_profile(path: &Path, offsets: [i16; 3]) -> Result<(), HubError> {
    let blob = postcard::to_allocvec(&CalibrationProfile { offsets })
        .map_err(|err| HubError::InvalidConfig(format!("calibration encode: {err}")))?;
    std::fs::write(path, blob)?;
    Ok(())
}

impl DeviceSession {
    /// Measure and store new accelerometer offsets
    ///
    /// Collects a burst of samples with the current offsets cleared,
    /// averages them per axis and removes gravity from Z. The device must
    /// rest flat for the duration. Blocks for the warmup plus the sampling
    /// window.
    pub fn calibrate_accel(&self) -> Result<[i16; 3], HubError> {
        // Measure without the old offsets applied
        *self.acc_cal.lock() = [0, 0, 0];

        let temp_enabled = self.enabled.lock().accel_rate.is_none();
        if temp_enabled {
            self.set_sensor_rate(SensorTag::Accel, self.cfg.accel_default_rate_hz)?;
        }
        std::thread::sleep(self.cfg.calibration_warmup());

        let mut sums = [0i32; 3];
        for _ in 0..self.cfg.calibration_samples {
            let sample = *self.latest_acc.lock();
            for (sum, axis) in sums.iter_mut().zip(sample) {
                *sum += i32::from(axis);
            }
            std::thread::sleep(self.cfg.calibration_sample_delay());
        }
        if temp_enabled {
            self.disable_sensor(SensorTag::Accel)?;
        }

        let n = self.cfg.calibration_samples.max(1) as i32;
        let mut avg = sums.map(|sum| sum / n);
        if avg[2] > 0 {
            avg[2] -= MAX_ACCEL_1G;
        } else {
            avg[2] += MAX_ACCEL_1G;
        }
        let offsets = avg.map(|axis| axis as i16);

        *self.acc_cal.lock() = offsets;
        if let Some(path) = self.cfg.calibration_path.as_deref() {
            save_profile(path, offsets)?;
        }
        info!("accelerometer calibrated: offsets {:?}", offsets);
        Ok(offsets)
    }

    /// Drop the stored offsets and persist the cleared state
    pub fn clear_calibration(&self) -> Result<(), HubError> {
        *self.acc_cal.lock() = [0, 0, 0];
        if let Some(path) = self.cfg.calibration_path.as_deref() {
            save_profile(path, [0, 0, 0])?;
        }
        info!("accelerometer calibration cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PumpConfig;
    use hub_protocol::{sensor_conf_param, MockHub};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_session_with(cfg: PumpConfig) -> (Arc<DeviceSession>, MockHub) {
        let hub = MockHub::new();
        let session = DeviceSession::attach(Box::new(hub.clone()), cfg).unwrap();
        (session, hub)
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hub-cal-{name}-{}.bin", std::process::id()))
    }

    #[test]
    fn test_calibration_averages_and_removes_gravity() {
        let (session, hub) = test_session_with(PumpConfig::fast());
        *session.latest_acc.lock() = [100, -50, 4296];

        let offsets = session.calibrate_accel().unwrap();

        assert_eq!(offsets, [100, -50, 200]);
        assert_eq!(session.calibration_offsets(), offsets);
        // The sensor was enabled for the measurement and shut off again
        let accel_writes: Vec<_> = hub
            .param_writes()
            .into_iter()
            .filter(|(_, param, _)| *param == sensor_conf_param(1))
            .collect();
        assert_eq!(accel_writes.len(), 2);
        assert_eq!(&accel_writes[0].2[..2], &50u16.to_le_bytes());
        assert_eq!(&accel_writes[1].2[..2], &0u16.to_le_bytes());
    }

    #[test]
    fn test_calibration_handles_inverted_mount() {
        let (session, _hub) = test_session_with(PumpConfig::fast());
        *session.latest_acc.lock() = [-8, 12, -4100];

        let offsets = session.calibrate_accel().unwrap();
        assert_eq!(offsets, [-8, 12, -4]);
    }

    #[test]
    fn test_calibration_keeps_running_sensor_enabled() {
        let (session, hub) = test_session_with(PumpConfig::fast());
        session.set_sensor_rate(SensorTag::Accel, 100).unwrap();
        *session.latest_acc.lock() = [0, 0, 4096];
        let baseline = hub.param_writes().len();

        let offsets = session.calibrate_accel().unwrap();

        assert_eq!(offsets, [0, 0, 0]);
        assert_eq!(hub.param_writes().len(), baseline);
    }

    #[test]
    fn test_profile_roundtrip_on_disk() {
        let path = scratch_path("roundtrip");
        save_profile(&path, [5, -6, 7]).unwrap();
        assert_eq!(load_profile(&path), Some([5, -6, 7]));

        // An all-zero profile reads back as uncalibrated
        save_profile(&path, [0, 0, 0]).unwrap();
        assert_eq!(load_profile(&path), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_or_corrupt_profile_is_none() {
        assert_eq!(load_profile(Path::new("/nonexistent/hub-cal.bin")), None);

        let path = scratch_path("corrupt");
        std::fs::write(&path, [0xFF]).unwrap();
        assert_eq!(load_profile(&path), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_attach_loads_stored_profile() {
        let path = scratch_path("attach");
        save_profile(&path, [9, -9, 9]).unwrap();

        let mut cfg = PumpConfig::fast();
        cfg.calibration_path = Some(path.clone());
        let (session, _hub) = test_session_with(cfg);

        assert_eq!(session.calibration_offsets(), [9, -9, 9]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_clear_calibration_persists_zeros() {
        let path = scratch_path("clear");
        let mut cfg = PumpConfig::fast();
        cfg.calibration_path = Some(path.clone());
        let (session, _hub) = test_session_with(cfg);

        *session.latest_acc.lock() = [40, 0, 4096];
        session.calibrate_accel().unwrap();
        assert_eq!(load_profile(&path), Some([40, 0, 0]));

        session.clear_calibration().unwrap();
        assert_eq!(session.calibration_offsets(), [0, 0, 0]);
        assert_eq!(load_profile(&path), None);
        let _ = std::fs::remove_file(&path);
    }
}
