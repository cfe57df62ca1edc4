use bitflags::bitflags;

bitflags! {
    /// Presence detector status word.
    ///
    /// Same shape as the distance detector's word but a different bit
    /// order: sensor calibration sits right after sensor creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PresenceStatus: u32 {
        const RSS_REGISTER_OK = 1 << 0;
        const CONFIG_CREATE_OK = 1 << 1;
        const SENSOR_CREATE_OK = 1 << 2;
        const SENSOR_CALIBRATE_OK = 1 << 3;
        const DETECTOR_CREATE_OK = 1 << 4;
        const DETECTOR_BUFFER_OK = 1 << 5;
        const SENSOR_BUFFER_OK = 1 << 6;
        const CONFIG_APPLY_OK = 1 << 7;

        const RSS_REGISTER_ERROR = 1 << 16;
        const CONFIG_CREATE_ERROR = 1 << 17;
        const SENSOR_CREATE_ERROR = 1 << 18;
        const SENSOR_CALIBRATE_ERROR = 1 << 19;
        const DETECTOR_CREATE_ERROR = 1 << 20;
        const DETECTOR_BUFFER_ERROR = 1 << 21;
        const SENSOR_BUFFER_ERROR = 1 << 22;
        const CONFIG_APPLY_ERROR = 1 << 23;

        /// Unrecoverable failure; only a module reset is accepted.
        const DETECTOR_ERROR = 1 << 28;
        const BUSY = 1 << 31;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PresenceStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PresenceStatus({=u32:#x})", self.bits());
    }
}

impl PresenceStatus {
    /// Every error bit, plus busy.
    pub const ALL_ERRORS: PresenceStatus = PresenceStatus::from_bits_truncate(
        0x00FF_0000 | PresenceStatus::DETECTOR_ERROR.bits() | PresenceStatus::BUSY.bits(),
    );

    pub fn errors(self) -> PresenceStatus {
        self & Self::ALL_ERRORS
    }

    pub fn is_applied(self) -> bool {
        self.contains(Self::CONFIG_APPLY_OK)
    }
}

/// Fields of the presence result register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PresenceResult {
    /// Presence in the latest frame.
    pub detected: bool,
    /// Presence in any frame since the host last read the register.
    pub detected_sticky: bool,
    pub detector_error: bool,
    /// Degrees Celsius, from the latest frame.
    pub temperature: i16,
}

impl PresenceResult {
    const DETECTED: u32 = 1 << 0;
    const DETECTED_STICKY: u32 = 1 << 1;
    const DETECTOR_ERROR: u32 = 1 << 15;
    const TEMPERATURE_SHIFT: u32 = 16;

    pub fn to_register(self) -> u32 {
        let mut value = (self.temperature as u16 as u32) << Self::TEMPERATURE_SHIFT;
        if self.detected {
            value |= Self::DETECTED;
        }
        if self.detected_sticky {
            value |= Self::DETECTED_STICKY;
        }
        if self.detector_error {
            value |= Self::DETECTOR_ERROR;
        }
        value
    }

    pub fn from_register(value: u32) -> Self {
        Self {
            detected: value & Self::DETECTED != 0,
            detected_sticky: value & Self::DETECTED_STICKY != 0,
            detector_error: value & Self::DETECTOR_ERROR != 0,
            temperature: (value >> Self::TEMPERATURE_SHIFT) as u16 as i16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_follow_module_layout() {
        assert_eq!(PresenceStatus::SENSOR_CALIBRATE_OK.bits(), 0x08);
        assert_eq!(PresenceStatus::CONFIG_APPLY_ERROR.bits(), 0x0080_0000);
        assert_eq!(
            (PresenceStatus::CONFIG_APPLY_OK | PresenceStatus::SENSOR_CREATE_ERROR).errors(),
            PresenceStatus::SENSOR_CREATE_ERROR
        );
        assert!(PresenceStatus::ALL_ERRORS.contains(PresenceStatus::BUSY));
        assert!(!PresenceStatus::ALL_ERRORS.contains(PresenceStatus::CONFIG_APPLY_OK));
    }

    #[test]
    fn result_register_layout() {
        let result = PresenceResult {
            detected: false,
            detected_sticky: true,
            detector_error: true,
            temperature: -5,
        };
        let raw = result.to_register();
        assert_eq!(raw & 0xFFFF, 0x8002);
        assert_eq!(raw >> 16, 0xFFFB);
        assert_eq!(PresenceResult::from_register(raw), result);
    }
}
