//! Register map and command codes of the distance detector.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const VERSION: u16 = 0;
pub const PROTOCOL_STATUS: u16 = 1;
pub const MEASURE_COUNTER: u16 = 2;
pub const DETECTOR_STATUS: u16 = 3;
pub const DISTANCE_RESULT: u16 = 16;

/// Number of peaks reported per measurement.
pub const PEAK_COUNT: usize = 10;

pub const PEAK_DISTANCE_BASE: u16 = 17;
pub const PEAK_STRENGTH_BASE: u16 = PEAK_DISTANCE_BASE + PEAK_COUNT as u16;

macro_rules! peak_registers {
    ($($n:literal),*) => {
        paste::paste! {
            $(
                pub const [<PEAK $n _DISTANCE>]: u16 = PEAK_DISTANCE_BASE + $n;
                pub const [<PEAK $n _STRENGTH>]: u16 = PEAK_STRENGTH_BASE + $n;
            )*
        }
    };
}

peak_registers!(0, 1, 2, 3, 4, 5, 6, 7, 8, 9);

pub const START: u16 = 64;
pub const END: u16 = 65;
pub const MAX_STEP_LENGTH: u16 = 66;
pub const CLOSE_RANGE_LEAKAGE_CANCELLATION: u16 = 67;
pub const SIGNAL_QUALITY: u16 = 68;
pub const MAX_PROFILE: u16 = 69;
pub const THRESHOLD_METHOD: u16 = 70;
pub const PEAK_SORTING: u16 = 71;
pub const NUM_FRAMES_RECORDED_THRESHOLD: u16 = 72;
pub const FIXED_AMPLITUDE_THRESHOLD_VALUE: u16 = 73;
pub const THRESHOLD_SENSITIVITY: u16 = 74;
pub const REFLECTOR_SHAPE: u16 = 75;
pub const FIXED_STRENGTH_THRESHOLD_VALUE: u16 = 76;

pub const MEASURE_ON_WAKEUP: u16 = 128;
pub const COMMAND: u16 = 256;

/// Values accepted by the [`COMMAND`] register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Command {
    ApplyConfigAndCalibrate = 1,
    MeasureDistance = 2,
    ApplyConfiguration = 3,
    Calibrate = 4,
    Recalibrate = 5,
    EnableUartLogs = 32,
    DisableUartLogs = 33,
    LogConfiguration = 34,
    ResetModule = 0x5253_5421,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_blocks_are_contiguous() {
        assert_eq!(PEAK0_DISTANCE, 17);
        assert_eq!(PEAK9_DISTANCE, 26);
        assert_eq!(PEAK0_STRENGTH, 27);
        assert_eq!(PEAK9_STRENGTH, 36);
    }

    #[test]
    fn command_codes() {
        assert!(matches!(Command::try_from(3), Ok(Command::ApplyConfiguration)));
        assert_eq!(u32::from(Command::ResetModule), crate::handshake::RESET_MODULE);
        assert!(Command::try_from(6).is_err());
    }
}
