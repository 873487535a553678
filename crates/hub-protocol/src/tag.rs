//! Sensor Handle Definitions
//!
//! Every FIFO record starts with a one-byte sensor handle. The handle fixes
//! the record's payload length and which consumer stream it belongs to.
//! Wake-up capable sensors report under a second handle offset by 32.

use serde::{Deserialize, Serialize};

/// Sensor handles understood by this protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorTag {
    /// Accelerometer (1)
    Accel = 1,
    /// Geomagnetic field (2)
    Mag = 2,
    /// Orientation (3)
    Orientation = 3,
    /// Gyroscope (4)
    Gyro = 4,
    /// Ambient light (5)
    Light = 5,
    /// Barometric pressure (6)
    Barometer = 6,
    /// Die temperature (7)
    Temperature = 7,
    /// Proximity (8)
    Proximity = 8,
    /// Gravity vector (9)
    Gravity = 9,
    /// Linear acceleration (10)
    LinearAccel = 10,
    /// Rotation vector quaternion (11)
    RotationVector = 11,
    /// Relative humidity (12)
    Humidity = 12,
    /// Ambient temperature (13)
    AmbientTemperature = 13,
    /// Uncalibrated magnetometer with bias (14)
    UncalMag = 14,
    /// Game rotation vector quaternion (15)
    GameRotationVector = 15,
    /// Uncalibrated gyroscope with bias (16)
    UncalGyro = 16,
    /// Significant motion one-shot (17)
    SignificantMotion = 17,
    /// Step detector one-shot (18)
    StepDetector = 18,
    /// Step counter (19)
    StepCounter = 19,
    /// Geomagnetic rotation vector quaternion (20)
    GeomagRotationVector = 20,
    /// Heart rate (21)
    HeartRate = 21,
    /// Tilt detector one-shot (22)
    TiltDetector = 22,
    /// Wake gesture one-shot (23)
    WakeGesture = 23,
    /// Glance gesture one-shot (24)
    GlanceGesture = 24,
    /// Pick-up gesture one-shot (25)
    PickUpGesture = 25,
    /// Pedometer status block, custom sensor slot (26)
    Pedometer = 26,

    /// Accelerometer, wake-up (33)
    AccelWake = 33,
    /// Geomagnetic field, wake-up (34)
    MagWake = 34,
    /// Orientation, wake-up (35)
    OrientationWake = 35,
    /// Gyroscope, wake-up (36)
    GyroWake = 36,
    /// Ambient light, wake-up (37)
    LightWake = 37,
    /// Barometric pressure, wake-up (38)
    BarometerWake = 38,
    /// Die temperature, wake-up (39)
    TemperatureWake = 39,
    /// Proximity, wake-up (40)
    ProximityWake = 40,
    /// Gravity vector, wake-up (41)
    GravityWake = 41,
    /// Linear acceleration, wake-up (42)
    LinearAccelWake = 42,
    /// Rotation vector, wake-up (43)
    RotationVectorWake = 43,
    /// Relative humidity, wake-up (44)
    HumidityWake = 44,
    /// Ambient temperature, wake-up (45)
    AmbientTemperatureWake = 45,
    /// Uncalibrated magnetometer, wake-up (46)
    UncalMagWake = 46,
    /// Game rotation vector, wake-up (47)
    GameRotationVectorWake = 47,
    /// Uncalibrated gyroscope, wake-up (48)
    UncalGyroWake = 48,
    /// Significant motion, wake-up (49)
    SignificantMotionWake = 49,
    /// Step detector, wake-up (50)
    StepDetectorWake = 50,
    /// Step counter, wake-up (51)
    StepCounterWake = 51,
    /// Geomagnetic rotation vector, wake-up (52)
    GeomagRotationVectorWake = 52,
    /// Heart rate, wake-up (53)
    HeartRateWake = 53,

    /// Activity recognition classifier (63)
    Activity = 63,

    /// Firmware debug payload (245)
    Debug = 245,
    /// Host sleep status marker, synthesized by the driver (247)
    SleepStatus = 247,
    /// Meta event, wake-up stream (248)
    MetaEventWake = 248,
    /// Timestamp low word, wake-up stream (249)
    TimestampLswWake = 249,
    /// Timestamp high word, wake-up stream (250)
    TimestampMswWake = 250,
    /// Timestamp low word (251)
    TimestampLsw = 251,
    /// Timestamp high word (252)
    TimestampMsw = 252,
    /// Host/firmware timestamp pairing, synthesized by the driver (253)
    TimestampSync = 253,
    /// Meta event (254)
    MetaEvent = 254,
}

impl SensorTag {
    /// Map a raw handle byte to a tag, or `None` for anything this protocol
    /// revision does not know. Unknown handles terminate FIFO parsing.
    pub fn from_raw(raw: u8) -> Option<Self> {
        let tag = match raw {
            1 => SensorTag::Accel,
            2 => SensorTag::Mag,
            3 => SensorTag::Orientation,
            4 => SensorTag::Gyro,
            5 => SensorTag::Light,
            6 => SensorTag::Barometer,
            7 => SensorTag::Temperature,
            8 => SensorTag::Proximity,
            9 => SensorTag::Gravity,
            10 => SensorTag::LinearAccel,
            11 => SensorTag::RotationVector,
            12 => SensorTag::Humidity,
            13 => SensorTag::AmbientTemperature,
            14 => SensorTag::UncalMag,
            15 => SensorTag::GameRotationVector,
            16 => SensorTag::UncalGyro,
            17 => SensorTag::SignificantMotion,
            18 => SensorTag::StepDetector,
            19 => SensorTag::StepCounter,
            20 => SensorTag::GeomagRotationVector,
            21 => SensorTag::HeartRate,
            22 => SensorTag::TiltDetector,
            23 => SensorTag::WakeGesture,
            24 => SensorTag::GlanceGesture,
            25 => SensorTag::PickUpGesture,
            26 => SensorTag::Pedometer,
            33 => SensorTag::AccelWake,
            34 => SensorTag::MagWake,
            35 => SensorTag::OrientationWake,
            36 => SensorTag::GyroWake,
            37 => SensorTag::LightWake,
            38 => SensorTag::BarometerWake,
            39 => SensorTag::TemperatureWake,
            40 => SensorTag::ProximityWake,
            41 => SensorTag::GravityWake,
            42 => SensorTag::LinearAccelWake,
            43 => SensorTag::RotationVectorWake,
            44 => SensorTag::HumidityWake,
            45 => SensorTag::AmbientTemperatureWake,
            46 => SensorTag::UncalMagWake,
            47 => SensorTag::GameRotationVectorWake,
            48 => SensorTag::UncalGyroWake,
            49 => SensorTag::SignificantMotionWake,
            50 => SensorTag::StepDetectorWake,
            51 => SensorTag::StepCounterWake,
            52 => SensorTag::GeomagRotationVectorWake,
            53 => SensorTag::HeartRateWake,
            63 => SensorTag::Activity,
            245 => SensorTag::Debug,
            247 => SensorTag::SleepStatus,
            248 => SensorTag::MetaEventWake,
            249 => SensorTag::TimestampLswWake,
            250 => SensorTag::TimestampMswWake,
            251 => SensorTag::TimestampLsw,
            252 => SensorTag::TimestampMsw,
            253 => SensorTag::TimestampSync,
            254 => SensorTag::MetaEvent,
            _ => return None,
        };
        Some(tag)
    }

    /// Get the raw handle byte
    pub fn raw(&self) -> u8 {
        *self as u8
    }

    /// Payload length in bytes for records carrying this handle
    pub fn data_len(&self) -> usize {
        use SensorTag::*;
        match self {
            Accel | Mag | Orientation | Gyro | Gravity | LinearAccel | AccelWake | MagWake
            | OrientationWake | GyroWake | GravityWake | LinearAccelWake => 6,
            Light | Temperature | Proximity | Humidity | AmbientTemperature | StepCounter
            | LightWake | TemperatureWake | ProximityWake | HumidityWake
            | AmbientTemperatureWake | StepCounterWake | Activity | TimestampLsw | TimestampMsw
            | TimestampLswWake | TimestampMswWake => 2,
            Barometer | BarometerWake => 3,
            SignificantMotion | StepDetector | HeartRate | TiltDetector | WakeGesture
            | GlanceGesture | PickUpGesture | SignificantMotionWake | StepDetectorWake
            | HeartRateWake | SleepStatus => 1,
            RotationVector | GameRotationVector | GeomagRotationVector | RotationVectorWake
            | GameRotationVectorWake | GeomagRotationVectorWake => 10,
            UncalMag | UncalGyro | UncalMagWake | UncalGyroWake => 12,
            Pedometer => 14,
            Debug => 13,
            MetaEvent | MetaEventWake => 8,
            TimestampSync => 16,
        }
    }

    /// Whether records with this handle are copied to the activity
    /// recognition stream as well
    pub fn reports_to_ar(&self) -> bool {
        use SensorTag::*;
        matches!(
            self,
            Activity
                | MetaEvent
                | MetaEventWake
                | TimestampLsw
                | TimestampMsw
                | TimestampLswWake
                | TimestampMswWake
                | TimestampSync
        )
    }

    /// Whether this handle belongs to the wake-up FIFO
    pub fn is_wakeup(&self) -> bool {
        matches!(self.raw(), 33..=53 | 63 | 248..=250)
    }
}
