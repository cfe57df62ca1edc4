//! Register map and command codes of the presence detector.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const VERSION: u16 = 0;
pub const PROTOCOL_STATUS: u16 = 1;
pub const MEASURE_COUNTER: u16 = 2;
pub const DETECTOR_STATUS: u16 = 3;
pub const PRESENCE_RESULT: u16 = 16;
pub const PRESENCE_DISTANCE: u16 = 17;
pub const INTRA_PRESENCE_SCORE: u16 = 18;
pub const INTER_PRESENCE_SCORE: u16 = 19;

pub const SWEEPS_PER_FRAME: u16 = 64;
pub const INTER_FRAME_PRESENCE_TIMEOUT: u16 = 65;
pub const INTER_PHASE_BOOST_ENABLED: u16 = 66;
pub const INTRA_DETECTION_ENABLED: u16 = 67;
pub const INTER_DETECTION_ENABLED: u16 = 68;
pub const FRAME_RATE: u16 = 69;
pub const INTRA_DETECTION_THRESHOLD: u16 = 70;
pub const INTER_DETECTION_THRESHOLD: u16 = 71;
pub const INTER_FRAME_DEVIATION_TIME_CONST: u16 = 72;
pub const INTER_FRAME_FAST_CUTOFF: u16 = 73;
pub const INTER_FRAME_SLOW_CUTOFF: u16 = 74;
pub const INTRA_FRAME_TIME_CONST: u16 = 75;
pub const INTRA_OUTPUT_TIME_CONST: u16 = 76;
pub const INTER_OUTPUT_TIME_CONST: u16 = 77;
pub const AUTO_PROFILE_ENABLED: u16 = 78;
pub const AUTO_STEP_LENGTH_ENABLED: u16 = 79;
pub const MANUAL_PROFILE: u16 = 80;
pub const MANUAL_STEP_LENGTH: u16 = 81;
pub const START: u16 = 82;
pub const END: u16 = 83;
pub const RESET_FILTERS_ON_PREPARE: u16 = 84;
pub const HWAAS: u16 = 85;

pub const DETECTION_ON_GPIO: u16 = 128;
pub const COMMAND: u16 = 256;

/// Values accepted by the [`COMMAND`] register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Command {
    ApplyConfiguration = 1,
    StartDetector = 2,
    StopDetector = 3,
    EnableUartLogs = 32,
    DisableUartLogs = 33,
    LogConfiguration = 34,
    ResetModule = 0x5253_5421,
}
