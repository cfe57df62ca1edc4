//! Presence detector application.
//!
//! Continuous presence detection on a periodic wakeup: the host applies a
//! configuration, starts the detector and then polls the result register,
//! whose sticky bit latches any detection since the previous read. The
//! radar sits behind [`PresenceDetector`].

mod app;
mod config;
pub mod regs;
mod state;
mod status;

pub use app::{PresenceApp, PresenceApplyError, PresenceDetector, PresenceFrame};
pub use config::PresenceConfig;
pub use regs::Command;
pub use state::{Detection, PresenceRegisters, PresenceTable, TABLE_CAPACITY};
pub use status::{PresenceResult, PresenceStatus};
