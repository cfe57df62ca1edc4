use core::cell::RefCell;

use critical_section::Mutex;

use super::{
    config::PresenceConfig,
    regs,
    status::{PresenceResult, PresenceStatus},
};
use crate::{
    distance::{FirmwareVersion, RegisterValue},
    error::TableError,
    flags::ProtocolErrors,
    handshake::{CommandChannel, ReadySignal},
    table::{RegisterTable, RegisterTableBuilder},
};

/// Room for every register in [`regs`].
pub const TABLE_CAPACITY: usize = 32;

pub type PresenceTable<R> = RegisterTable<PresenceRegisters<R>, TABLE_CAPACITY>;

type PresenceTableBuilder<R> = RegisterTableBuilder<PresenceRegisters<R>, TABLE_CAPACITY>;

/// Latest detection in register units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Detection {
    /// Millimetres.
    pub distance: u32,
    /// Scores times 1000.
    pub intra_score: u32,
    pub inter_score: u32,
}

#[derive(Debug, Clone, Copy)]
struct Shared {
    config: PresenceConfig,
    status: PresenceStatus,
    result: PresenceResult,
    detection: Detection,
    counter: u32,
    detection_on_gpio: bool,
    frame_rate_mhz: u32,
}

impl Shared {
    fn new() -> Self {
        Self {
            config: PresenceConfig::default(),
            status: PresenceStatus::empty(),
            result: PresenceResult::default(),
            detection: Detection::default(),
            counter: 0,
            detection_on_gpio: false,
            frame_rate_mhz: 0,
        }
    }
}

/// State shared between the bus callbacks and the presence processing loop.
pub struct PresenceRegisters<R: ReadySignal> {
    errors: ProtocolErrors,
    channel: CommandChannel<R>,
    shared: Mutex<RefCell<Shared>>,
    version: FirmwareVersion,
}

impl<R: ReadySignal> PresenceRegisters<R> {
    pub fn new(ready: R, version: FirmwareVersion) -> Self {
        Self {
            errors: ProtocolErrors::new(),
            channel: CommandChannel::new(ready),
            shared: Mutex::new(RefCell::new(Shared::new())),
            version,
        }
    }

    pub fn errors(&self) -> &ProtocolErrors {
        &self.errors
    }

    pub fn channel(&self) -> &CommandChannel<R> {
        &self.channel
    }

    pub fn version(&self) -> FirmwareVersion {
        self.version
    }

    fn with_shared<T>(&self, f: impl FnOnce(&mut Shared) -> T) -> T {
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            f(&mut *shared)
        })
    }

    pub fn config(&self) -> PresenceConfig {
        self.with_shared(|s| s.config)
    }

    pub fn update_config(&self, f: impl FnOnce(&mut PresenceConfig)) {
        self.with_shared(|s| f(&mut s.config))
    }

    /// Status word as the host sees it, busy bit included.
    pub fn status(&self) -> PresenceStatus {
        let mut status = self.with_shared(|s| s.status);
        status.set(PresenceStatus::BUSY, self.channel.is_busy());
        status
    }

    pub fn update_status(&self, f: impl FnOnce(&mut PresenceStatus)) {
        self.with_shared(|s| f(&mut s.status))
    }

    /// Result without touching the sticky bit.
    pub fn result(&self) -> PresenceResult {
        self.with_shared(|s| s.result)
    }

    /// Result as the host reads it: the sticky bit clears on the way out.
    pub fn take_result(&self) -> PresenceResult {
        self.with_shared(|s| {
            let result = s.result;
            s.result.detected_sticky = false;
            result
        })
    }

    pub fn detection(&self) -> Detection {
        self.with_shared(|s| s.detection)
    }

    pub fn measure_counter(&self) -> u32 {
        self.with_shared(|s| s.counter)
    }

    pub fn detection_on_gpio(&self) -> bool {
        self.with_shared(|s| s.detection_on_gpio)
    }

    pub fn set_detection_on_gpio(&self, enabled: bool) {
        self.with_shared(|s| s.detection_on_gpio = enabled)
    }

    /// Frame rate measured between wakeups, in millihertz.
    pub fn actual_frame_rate(&self) -> u32 {
        self.with_shared(|s| s.frame_rate_mhz)
    }

    pub(crate) fn set_actual_frame_rate(&self, mhz: u32) {
        self.with_shared(|s| s.frame_rate_mhz = mhz)
    }

    pub(crate) fn count_frame(&self) {
        self.with_shared(|s| s.counter = s.counter.wrapping_add(1))
    }

    /// Stores one processed frame. The detection fields keep their last
    /// positive values while nothing is present.
    pub(crate) fn store_frame(&self, detected: bool, detection: Detection, temperature: i16) {
        self.with_shared(|s| {
            s.result.detected = detected;
            s.result.temperature = temperature;
            if detected {
                s.result.detected_sticky = true;
                s.detection = detection;
            }
        })
    }

    pub(crate) fn flag_detector_error(&self) {
        self.with_shared(|s| s.result.detector_error = true)
    }

    /// Back to power-on state.
    pub fn reset(&self) {
        self.with_shared(|s| *s = Shared::new());
        self.channel.reset();
        let _ = self.errors.drain();
    }

    /// Builds the register table that exposes this state.
    pub fn register_table() -> Result<PresenceTable<R>, TableError> {
        PresenceTable::<R>::builder()
            .read_only(regs::VERSION, read_version::<R>)
            .read_only(regs::PROTOCOL_STATUS, read_protocol_status::<R>)
            .read_only(regs::MEASURE_COUNTER, read_measure_counter::<R>)
            .read_only(regs::DETECTOR_STATUS, read_detector_status::<R>)
            .read_only(regs::PRESENCE_RESULT, read_presence_result::<R>)
            .read_only(regs::PRESENCE_DISTANCE, read_presence_distance::<R>)
            .read_only(regs::INTRA_PRESENCE_SCORE, read_intra_presence_score::<R>)
            .read_only(regs::INTER_PRESENCE_SCORE, read_inter_presence_score::<R>)
            .registers(config_registers::<R>)
            .read_write(
                regs::DETECTION_ON_GPIO,
                read_detection_on_gpio::<R>,
                write_detection_on_gpio::<R>,
            )
            .write_only(regs::COMMAND, write_command::<R>)
            .build()
    }
}

fn read_version<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.version.to_register()
}

fn read_protocol_status<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.errors.drain().bits() as u32
}

fn read_measure_counter<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.measure_counter()
}

fn read_detector_status<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.status().bits()
}

fn read_presence_result<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.take_result().to_register()
}

fn read_presence_distance<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.detection().distance
}

fn read_intra_presence_score<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.detection().intra_score
}

fn read_inter_presence_score<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.detection().inter_score
}

fn read_detection_on_gpio<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
    regs.detection_on_gpio().to_register()
}

fn write_detection_on_gpio<R: ReadySignal>(regs: &PresenceRegisters<R>, value: u32) -> bool {
    regs.set_detection_on_gpio(value != 0);
    true
}

fn write_command<R: ReadySignal>(regs: &PresenceRegisters<R>, value: u32) -> bool {
    regs.channel.submit(value)
}

macro_rules! config_accessors {
    ($($field:ident),* $(,)?) => {
        paste::paste! {
            $(
                fn [<read_ $field>]<R: ReadySignal>(regs: &PresenceRegisters<R>) -> u32 {
                    regs.with_shared(|s| s.config.$field.to_register())
                }

                fn [<write_ $field>]<R: ReadySignal>(regs: &PresenceRegisters<R>, value: u32) -> bool {
                    match RegisterValue::from_register(value) {
                        Some(field) => {
                            regs.update_config(|c| c.$field = field);
                            true
                        }
                        None => false,
                    }
                }
            )*

            fn config_registers<R: ReadySignal>(builder: PresenceTableBuilder<R>) -> PresenceTableBuilder<R> {
                builder
                    $(.read_write(regs::[<$field:upper>], [<read_ $field>]::<R>, [<write_ $field>]::<R>))*
            }
        }
    };
}

config_accessors!(
    sweeps_per_frame,
    inter_frame_presence_timeout,
    inter_phase_boost_enabled,
    intra_detection_enabled,
    inter_detection_enabled,
    frame_rate,
    intra_detection_threshold,
    inter_detection_threshold,
    inter_frame_deviation_time_const,
    inter_frame_fast_cutoff,
    inter_frame_slow_cutoff,
    intra_frame_time_const,
    intra_output_time_const,
    inter_output_time_const,
    auto_profile_enabled,
    auto_step_length_enabled,
    manual_profile,
    manual_step_length,
    start,
    end,
    reset_filters_on_prepare,
    hwaas,
);
