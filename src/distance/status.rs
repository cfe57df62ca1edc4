use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags! {
    /// Detector status word, bit-exact with the module firmware.
    ///
    /// OK bits occupy the low half, the matching error bits sit 16 higher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DetectorStatus: u32 {
        const RSS_REGISTER_OK = 1 << 0;
        const CONFIG_CREATE_OK = 1 << 1;
        const SENSOR_CREATE_OK = 1 << 2;
        const DETECTOR_CREATE_OK = 1 << 3;
        const DETECTOR_BUFFER_OK = 1 << 4;
        const SENSOR_BUFFER_OK = 1 << 5;
        const CALIBRATION_BUFFER_OK = 1 << 6;
        const CONFIG_APPLY_OK = 1 << 7;
        const SENSOR_CALIBRATE_OK = 1 << 8;
        const DETECTOR_CALIBRATE_OK = 1 << 9;

        const RSS_REGISTER_ERROR = 1 << 16;
        const CONFIG_CREATE_ERROR = 1 << 17;
        const SENSOR_CREATE_ERROR = 1 << 18;
        const DETECTOR_CREATE_ERROR = 1 << 19;
        const DETECTOR_BUFFER_ERROR = 1 << 20;
        const SENSOR_BUFFER_ERROR = 1 << 21;
        const CALIBRATION_BUFFER_ERROR = 1 << 22;
        const CONFIG_APPLY_ERROR = 1 << 23;
        const SENSOR_CALIBRATE_ERROR = 1 << 24;
        const DETECTOR_CALIBRATE_ERROR = 1 << 25;

        /// Unrecoverable failure; only a module reset is accepted.
        const DETECTOR_ERROR = 1 << 28;
        /// A command is being processed.
        const BUSY = 1 << 31;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DetectorStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DetectorStatus({=u32:#x})", self.bits());
    }
}

/// Host-side single-value summary of a status word.
///
/// Codes follow the firmware's reporting order; code 4 is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DetectorErrorCode {
    RssRegister = 1,
    ConfigCreate = 2,
    SensorCreate = 3,
    DetectorCreate = 5,
    DetectorBuffer = 6,
    SensorBuffer = 7,
    CalibrationBuffer = 8,
    ConfigApply = 9,
    SensorCalibrate = 10,
    DetectorCalibrate = 11,
    DetectorError = 12,
    Busy = 13,
}

const ERROR_PRIORITY: [(DetectorStatus, DetectorErrorCode); 12] = [
    (DetectorStatus::RSS_REGISTER_ERROR, DetectorErrorCode::RssRegister),
    (DetectorStatus::CONFIG_CREATE_ERROR, DetectorErrorCode::ConfigCreate),
    (DetectorStatus::SENSOR_CREATE_ERROR, DetectorErrorCode::SensorCreate),
    (DetectorStatus::DETECTOR_CREATE_ERROR, DetectorErrorCode::DetectorCreate),
    (DetectorStatus::DETECTOR_BUFFER_ERROR, DetectorErrorCode::DetectorBuffer),
    (DetectorStatus::SENSOR_BUFFER_ERROR, DetectorErrorCode::SensorBuffer),
    (DetectorStatus::CALIBRATION_BUFFER_ERROR, DetectorErrorCode::CalibrationBuffer),
    (DetectorStatus::CONFIG_APPLY_ERROR, DetectorErrorCode::ConfigApply),
    (DetectorStatus::SENSOR_CALIBRATE_ERROR, DetectorErrorCode::SensorCalibrate),
    (DetectorStatus::DETECTOR_CALIBRATE_ERROR, DetectorErrorCode::DetectorCalibrate),
    (DetectorStatus::DETECTOR_ERROR, DetectorErrorCode::DetectorError),
    (DetectorStatus::BUSY, DetectorErrorCode::Busy),
];

impl DetectorStatus {
    /// Every error bit, plus busy.
    pub const ALL_ERRORS: DetectorStatus = DetectorStatus::from_bits_truncate(
        0x03FF_0000 | DetectorStatus::DETECTOR_ERROR.bits() | DetectorStatus::BUSY.bits(),
    );

    /// Applied and calibrated: measurements may run.
    pub const READY: DetectorStatus = DetectorStatus::from_bits_truncate(
        DetectorStatus::CONFIG_APPLY_OK.bits()
            | DetectorStatus::SENSOR_CALIBRATE_OK.bits()
            | DetectorStatus::DETECTOR_CALIBRATE_OK.bits(),
    );

    /// Error and busy bits that are set.
    pub fn errors(self) -> DetectorStatus {
        self & Self::ALL_ERRORS
    }

    pub fn is_ready(self) -> bool {
        self.contains(Self::READY)
    }

    /// The highest-priority error, in the firmware's fixed order.
    ///
    /// Lossy: only one bit is reported even if several are set. Use
    /// [`errors`](Self::errors) for the full picture.
    pub fn first_error(self) -> Option<DetectorErrorCode> {
        if !self.intersects(Self::ALL_ERRORS) {
            return None;
        }
        ERROR_PRIORITY
            .iter()
            .find(|(bit, _)| self.contains(*bit))
            .map(|&(_, code)| code)
    }
}

/// Fields of the distance result register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DistanceResult {
    pub num_distances: u8,
    pub near_start_edge: bool,
    pub calibration_needed: bool,
    pub measure_distance_error: bool,
    pub temperature: i16,
}

impl DistanceResult {
    const NUM_DISTANCES_MASK: u32 = 0x0000_000F;
    const NEAR_START_EDGE: u32 = 1 << 8;
    const CALIBRATION_NEEDED: u32 = 1 << 9;
    const MEASURE_DISTANCE_ERROR: u32 = 1 << 10;
    const TEMPERATURE_SHIFT: u32 = 16;

    pub fn to_register(self) -> u32 {
        let mut value = self.num_distances as u32 & Self::NUM_DISTANCES_MASK;
        if self.near_start_edge {
            value |= Self::NEAR_START_EDGE;
        }
        if self.calibration_needed {
            value |= Self::CALIBRATION_NEEDED;
        }
        if self.measure_distance_error {
            value |= Self::MEASURE_DISTANCE_ERROR;
        }
        value | ((self.temperature as u16 as u32) << Self::TEMPERATURE_SHIFT)
    }

    pub fn from_register(value: u32) -> Self {
        Self {
            num_distances: (value & Self::NUM_DISTANCES_MASK) as u8,
            near_start_edge: value & Self::NEAR_START_EDGE != 0,
            calibration_needed: value & Self::CALIBRATION_NEEDED != 0,
            measure_distance_error: value & Self::MEASURE_DISTANCE_ERROR != 0,
            temperature: (value >> Self::TEMPERATURE_SHIFT) as u16 as i16,
        }
    }
}

/// Firmware version, packed `major << 16 | minor << 8 | patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u16, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub const fn to_register(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }

    pub const fn from_register(value: u32) -> Self {
        Self {
            major: (value >> 16) as u16,
            minor: (value >> 8) as u8,
            patch: value as u8,
        }
    }
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
