use crate::{
    distance::Profile,
    scale::{float_to_u32_milli, u32_milli_to_float},
};

/// Presence detector configuration in register units.
///
/// Frame rate is in millihertz, range in millimetres, thresholds and
/// cutoffs are the real value times 1000, time constants in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PresenceConfig {
    pub sweeps_per_frame: u32,
    /// Seconds.
    pub inter_frame_presence_timeout: u32,
    pub inter_phase_boost_enabled: bool,
    pub intra_detection_enabled: bool,
    pub inter_detection_enabled: bool,
    pub frame_rate: u32,
    pub intra_detection_threshold: u32,
    pub inter_detection_threshold: u32,
    pub inter_frame_deviation_time_const: u32,
    pub inter_frame_fast_cutoff: u32,
    pub inter_frame_slow_cutoff: u32,
    pub intra_frame_time_const: u32,
    pub intra_output_time_const: u32,
    pub inter_output_time_const: u32,
    pub auto_profile_enabled: bool,
    pub auto_step_length_enabled: bool,
    pub manual_profile: Profile,
    pub manual_step_length: u32,
    pub start: u32,
    pub end: u32,
    pub reset_filters_on_prepare: bool,
    pub hwaas: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweeps_per_frame: 16,
            inter_frame_presence_timeout: 3,
            inter_phase_boost_enabled: false,
            intra_detection_enabled: true,
            inter_detection_enabled: true,
            frame_rate: 12_000,
            intra_detection_threshold: 1300,
            inter_detection_threshold: 1000,
            inter_frame_deviation_time_const: 500,
            inter_frame_fast_cutoff: 6000,
            inter_frame_slow_cutoff: 200,
            intra_frame_time_const: 150,
            intra_output_time_const: 300,
            inter_output_time_const: 2000,
            auto_profile_enabled: true,
            auto_step_length_enabled: true,
            manual_profile: Profile::Profile4,
            manual_step_length: 72,
            start: 300,
            end: 2500,
            reset_filters_on_prepare: true,
            hwaas: 32,
        }
    }
}

impl PresenceConfig {
    pub fn frame_rate_hz(&self) -> f32 {
        u32_milli_to_float(self.frame_rate)
    }

    pub fn set_frame_rate_hz(&mut self, hz: f32) {
        self.frame_rate = float_to_u32_milli(hz);
    }

    /// Time between frames in whole milliseconds, `None` at 0 Hz.
    pub fn frame_interval_ms(&self) -> Option<u32> {
        1_000_000u32.checked_div(self.frame_rate)
    }

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

    pub fn intra_threshold(&self) -> f32 {
        u32_milli_to_float(self.intra_detection_threshold)
    }

    pub fn inter_threshold(&self) -> f32 {
        u32_milli_to_float(self.inter_detection_threshold)
    }
}
