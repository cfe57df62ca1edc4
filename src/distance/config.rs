use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::scale::{float_to_i32_milli, float_to_u32_milli, i32_milli_to_float, u32_milli_to_float};

/// Conversion between a configuration field and its 32-bit register value.
pub trait RegisterValue: Sized {
    fn to_register(&self) -> u32;

    /// Returns `None` for values the field cannot hold.
    fn from_register(value: u32) -> Option<Self>;
}

impl RegisterValue for u32 {
    fn to_register(&self) -> u32 {
        *self
    }

    fn from_register(value: u32) -> Option<Self> {
        Some(value)
    }
}

impl RegisterValue for i32 {
    fn to_register(&self) -> u32 {
        *self as u32
    }

    fn from_register(value: u32) -> Option<Self> {
        Some(value as i32)
    }
}

impl RegisterValue for bool {
    fn to_register(&self) -> u32 {
        *self as u32
    }

    fn from_register(value: u32) -> Option<Self> {
        Some(value != 0)
    }
}

macro_rules! register_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl RegisterValue for $name {
            fn to_register(&self) -> u32 {
                u32::from(*self)
            }

            fn from_register(value: u32) -> Option<Self> {
                $name::try_from(value).ok()
            }
        }
    };
}

register_enum! {
    /// Longest pulse profile the detector may use.
    Profile { Profile1 = 1, Profile2 = 2, Profile3 = 3, Profile4 = 4, Profile5 = 5 }
}

register_enum! {
    ThresholdMethod { FixedAmplitude = 1, Recorded = 2, Cfar = 3, FixedStrength = 4 }
}

register_enum! {
    PeakSorting { Closest = 1, Strongest = 2 }
}

register_enum! {
    ReflectorShape { Generic = 1, Planar = 2 }
}

/// Distance detector configuration in register units.
///
/// Distances are millimetres; signal quality, thresholds and sensitivity
/// are the real value times 1000. The `*_m` / float helpers convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DistanceConfig {
    pub start: u32,
    pub end: u32,
    pub max_step_length: u32,
    pub close_range_leakage_cancellation: bool,
    pub signal_quality: i32,
    pub max_profile: Profile,
    pub threshold_method: ThresholdMethod,
    pub peak_sorting: PeakSorting,
    pub num_frames_recorded_threshold: u32,
    pub fixed_amplitude_threshold_value: u32,
    pub threshold_sensitivity: u32,
    pub reflector_shape: ReflectorShape,
    pub fixed_strength_threshold_value: i32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            start: 250,
            end: 3000,
            max_step_length: 0,
            close_range_leakage_cancellation: true,
            signal_quality: 15000,
            max_profile: Profile::Profile5,
            threshold_method: ThresholdMethod::Cfar,
            peak_sorting: PeakSorting::Strongest,
            num_frames_recorded_threshold: 100,
            fixed_amplitude_threshold_value: 100_000,
            threshold_sensitivity: 500,
            reflector_shape: ReflectorShape::Generic,
            fixed_strength_threshold_value: 0,
        }
    }
}

impl DistanceConfig {
    pub fn start_m(&self) -> f32 {
        u32_milli_to_float(self.start)
    }

    pub fn set_start_m(&mut self, metres: f32) {
        self.start = float_to_u32_milli(metres);
    }

    pub fn end_m(&self) -> f32 {
        u32_milli_to_float(self.end)
    }

    pub fn set_end_m(&mut self, metres: f32) {
        self.end = float_to_u32_milli(metres);
    }

    pub fn signal_quality_db(&self) -> f32 {
        i32_milli_to_float(self.signal_quality)
    }

    pub fn set_signal_quality_db(&mut self, db: f32) {
        self.signal_quality = float_to_i32_milli(db);
    }

    pub fn threshold_sensitivity_ratio(&self) -> f32 {
        u32_milli_to_float(self.threshold_sensitivity)
    }

    pub fn set_threshold_sensitivity_ratio(&mut self, ratio: f32) {
        self.threshold_sensitivity = float_to_u32_milli(ratio);
    }

    pub fn fixed_amplitude_threshold(&self) -> f32 {
        u32_milli_to_float(self.fixed_amplitude_threshold_value)
    }

    pub fn fixed_strength_threshold(&self) -> f32 {
        i32_milli_to_float(self.fixed_strength_threshold_value)
    }
}
