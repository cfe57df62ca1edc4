//! Distance detector application.
//!
//! Exposes detector configuration, status and results through the register
//! protocol and runs the apply/calibrate/measure commands received over the
//! command handshake. The radar itself sits behind [`DistanceDetector`].

mod app;
mod config;
pub mod regs;
mod state;
mod status;

pub use app::{ApplyError, DistanceApp, DistanceDetector, Measurement, Peak};
pub use config::{
    DistanceConfig, PeakSorting, Profile, ReflectorShape, RegisterValue, ThresholdMethod,
};
pub use regs::Command;
pub use state::{DistanceRegisters, DistanceTable, PeakRegisters, TABLE_CAPACITY};
pub use status::{DetectorErrorCode, DetectorStatus, DistanceResult, FirmwareVersion};
