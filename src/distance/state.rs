use core::cell::RefCell;

use critical_section::Mutex;

use super::{
    config::{DistanceConfig, RegisterValue},
    regs::{self, PEAK_COUNT},
    status::{DetectorStatus, DistanceResult, FirmwareVersion},
};
use crate::{
    error::TableError,
    flags::ProtocolErrors,
    handshake::{CommandChannel, ReadySignal},
    table::{RegisterTable, RegisterTableBuilder},
};

/// Room for every register in [`regs`].
pub const TABLE_CAPACITY: usize = 40;

pub type DistanceTable<R> = RegisterTable<DistanceRegisters<R>, TABLE_CAPACITY>;

type DistanceTableBuilder<R> = RegisterTableBuilder<DistanceRegisters<R>, TABLE_CAPACITY>;

/// One reported peak in register units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeakRegisters {
    /// Millimetres.
    pub distance: u32,
    /// Strength times 1000.
    pub strength: i32,
}

#[derive(Debug, Clone, Copy)]
struct Shared {
    config: DistanceConfig,
    status: DetectorStatus,
    result: DistanceResult,
    peaks: [PeakRegisters; PEAK_COUNT],
    counter: u32,
    measure_on_wakeup: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            config: DistanceConfig::default(),
            status: DetectorStatus::empty(),
            result: DistanceResult::default(),
            peaks: [PeakRegisters::default(); PEAK_COUNT],
            counter: 0,
            measure_on_wakeup: false,
        }
    }
}

/// State shared between the bus callbacks and the processing loop.
///
/// Register accessors and the application both go through short critical
/// sections; nothing here is held across a detector call.
pub struct DistanceRegisters<R: ReadySignal> {
    errors: ProtocolErrors,
    channel: CommandChannel<R>,
    shared: Mutex<RefCell<Shared>>,
    version: FirmwareVersion,
}

impl<R: ReadySignal> DistanceRegisters<R> {
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

    pub fn config(&self) -> DistanceConfig {
        self.with_shared(|s| s.config)
    }

    pub fn update_config(&self, f: impl FnOnce(&mut DistanceConfig)) {
        self.with_shared(|s| f(&mut s.config))
    }

    /// Status word as the host sees it, busy bit included.
    pub fn status(&self) -> DetectorStatus {
        let mut status = self.with_shared(|s| s.status);
        status.set(DetectorStatus::BUSY, self.channel.is_busy());
        status
    }

    pub fn update_status(&self, f: impl FnOnce(&mut DetectorStatus)) {
        self.with_shared(|s| f(&mut s.status))
    }

    pub fn result(&self) -> DistanceResult {
        self.with_shared(|s| s.result)
    }

    pub fn peak(&self, index: usize) -> Option<PeakRegisters> {
        self.with_shared(|s| s.peaks.get(index).copied())
    }

    pub fn measure_counter(&self) -> u32 {
        self.with_shared(|s| s.counter)
    }

    pub fn measure_on_wakeup(&self) -> bool {
        self.with_shared(|s| s.measure_on_wakeup)
    }

    pub fn set_measure_on_wakeup(&self, enabled: bool) {
        self.with_shared(|s| s.measure_on_wakeup = enabled)
    }

    /// Clears the previous result and counts a new measurement.
    pub(crate) fn begin_measurement(&self) {
        self.with_shared(|s| {
            s.result = DistanceResult::default();
            s.peaks = [PeakRegisters::default(); PEAK_COUNT];
            s.counter = s.counter.wrapping_add(1);
        })
    }

    pub(crate) fn store_measurement(&self, result: DistanceResult, peaks: &[PeakRegisters]) {
        self.with_shared(|s| {
            s.result = result;
            for (slot, peak) in s.peaks.iter_mut().zip(peaks) {
                *slot = *peak;
            }
        })
    }

    pub(crate) fn flag_measure_error(&self) {
        self.with_shared(|s| s.result.measure_distance_error = true)
    }

    /// Back to power-on state.
    pub fn reset(&self) {
        self.with_shared(|s| *s = Shared::new());
        self.channel.reset();
        let _ = self.errors.drain();
    }

    /// Builds the register table that exposes this state.
    pub fn register_table() -> Result<DistanceTable<R>, TableError> {
        DistanceTable::<R>::builder()
            .read_only(regs::VERSION, read_version::<R>)
            .read_only(regs::PROTOCOL_STATUS, read_protocol_status::<R>)
            .read_only(regs::MEASURE_COUNTER, read_measure_counter::<R>)
            .read_only(regs::DETECTOR_STATUS, read_detector_status::<R>)
            .read_only(regs::DISTANCE_RESULT, read_distance_result::<R>)
            .registers(peak_registers::<R>)
            .registers(config_registers::<R>)
            .read_write(
                regs::MEASURE_ON_WAKEUP,
                read_measure_on_wakeup::<R>,
                write_measure_on_wakeup::<R>,
            )
            .write_only(regs::COMMAND, write_command::<R>)
            .build()
    }
}

fn read_version<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.version.to_register()
}

fn read_protocol_status<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.errors.drain().bits() as u32
}

fn read_measure_counter<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.measure_counter()
}

fn read_detector_status<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.status().bits()
}

fn read_distance_result<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.result().to_register()
}

fn read_measure_on_wakeup<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
    regs.measure_on_wakeup().to_register()
}

fn write_measure_on_wakeup<R: ReadySignal>(regs: &DistanceRegisters<R>, value: u32) -> bool {
    regs.set_measure_on_wakeup(value != 0);
    true
}

fn write_command<R: ReadySignal>(regs: &DistanceRegisters<R>, value: u32) -> bool {
    regs.channel.submit(value)
}

macro_rules! peak_accessors {
    ($($n:literal),*) => {
        paste::paste! {
            $(
                fn [<read_peak $n _distance>]<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
                    regs.peak($n).map_or(0, |p| p.distance)
                }

                fn [<read_peak $n _strength>]<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
                    regs.peak($n).map_or(0, |p| p.strength.to_register())
                }
            )*

            fn peak_registers<R: ReadySignal>(builder: DistanceTableBuilder<R>) -> DistanceTableBuilder<R> {
                builder
                    $(.read_only(regs::[<PEAK $n _DISTANCE>], [<read_peak $n _distance>]::<R>))*
                    $(.read_only(regs::[<PEAK $n _STRENGTH>], [<read_peak $n _strength>]::<R>))*
            }
        }
    };
}

peak_accessors!(0, 1, 2, 3, 4, 5, 6, 7, 8, 9);

macro_rules! config_accessors {
    ($($field:ident),* $(,)?) => {
        paste::paste! {
            $(
                fn [<read_ $field>]<R: ReadySignal>(regs: &DistanceRegisters<R>) -> u32 {
                    regs.with_shared(|s| s.config.$field.to_register())
                }

                fn [<write_ $field>]<R: ReadySignal>(regs: &DistanceRegisters<R>, value: u32) -> bool {
                    match RegisterValue::from_register(value) {
                        Some(field) => {
                            regs.update_config(|c| c.$field = field);
                            true
                        }
                        None => false,
                    }
                }
            )*

            fn config_registers<R: ReadySignal>(builder: DistanceTableBuilder<R>) -> DistanceTableBuilder<R> {
                builder
                    $(.read_write(regs::[<$field:upper>], [<read_ $field>]::<R>, [<write_ $field>]::<R>))*
            }
        }
    };
}

config_accessors!(
    start,
    end,
    max_step_length,
    close_range_leakage_cancellation,
    signal_quality,
    max_profile,
    threshold_method,
    peak_sorting,
    num_frames_recorded_threshold,
    fixed_amplitude_threshold_value,
    threshold_sensitivity,
    reflector_shape,
    fixed_strength_threshold_value,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        distance::{config::Profile, status::DetectorStatus},
        engine::{ProtocolEngine, READ_ADDRESS_ERROR},
        flags::ProtocolError,
        handshake::ReadyFlag,
        test_support::{data_phase, read_value},
    };

    fn registers() -> DistanceRegisters<ReadyFlag> {
        DistanceRegisters::new(ReadyFlag::new(), FirmwareVersion::new(1, 2, 0))
    }

    #[test]
    fn table_covers_the_register_map() {
        let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();
        assert_eq!(table.len(), TABLE_CAPACITY);

        let command = table.lookup(regs::COMMAND).unwrap();
        assert!(command.is_writable() && !command.is_readable());
        assert!(!table.lookup(regs::DETECTOR_STATUS).unwrap().is_writable());
        assert!(table.lookup(regs::START).unwrap().is_writable());
        assert!(table.lookup(4).is_none());
        assert!(table.lookup(77).is_none());

        for address in regs::PEAK_DISTANCE_BASE..regs::PEAK_STRENGTH_BASE + PEAK_COUNT as u16 {
            let peak = table.lookup(address).unwrap();
            assert!(peak.is_readable() && !peak.is_writable());
        }
        for address in regs::START..=regs::FIXED_STRENGTH_THRESHOLD_VALUE {
            let config = table.lookup(address).unwrap();
            assert!(config.is_readable() && config.is_writable());
        }
    }

    #[test]
    fn config_registers_read_defaults_and_round_trip() {
        let regs = registers();
        let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();
        let mut engine = ProtocolEngine::new(&table, &regs, regs.errors());

        engine.data_in(&regs::START.to_be_bytes());
        assert_eq!(read_value(&mut engine), Some(250));
        assert_eq!(read_value(&mut engine), Some(3000));

        engine.reset();
        engine.data_in(&regs::SIGNAL_QUALITY.to_be_bytes());
        engine.data_in(&data_phase((-2500i32) as u32));
        engine.reset();
        engine.data_in(&regs::SIGNAL_QUALITY.to_be_bytes());
        assert_eq!(read_value(&mut engine), Some((-2500i32) as u32));
        assert_eq!(regs.config().signal_quality, -2500);
        assert!(regs.errors().drain().is_empty());
    }

    #[test]
    fn config_block_accepts_streaming_writes() {
        let regs = registers();
        let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();
        let mut engine = ProtocolEngine::new(&table, &regs, regs.errors());

        engine.data_in(&regs::START.to_be_bytes());
        engine.data_in(&data_phase(100));
        engine.data_in(&data_phase(2000));
        engine.data_in(&data_phase(10));

        let config = regs.config();
        assert_eq!((config.start, config.end, config.max_step_length), (100, 2000, 10));
    }

    #[test]
    fn invalid_enum_value_fails_the_write() {
        let regs = registers();
        let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();
        let mut engine = ProtocolEngine::new(&table, &regs, regs.errors());

        engine.data_in(&regs::MAX_PROFILE.to_be_bytes());
        engine.data_in(&data_phase(9));

        assert_eq!(regs.config().max_profile, Profile::Profile5);
        assert!(regs.errors().drain().contains(ProtocolError::WriteFailed.flag()));
    }

    #[test]
    fn status_includes_busy_from_channel() {
        let regs = registers();
        regs.update_status(|s| s.insert(DetectorStatus::RSS_REGISTER_OK));
        assert_eq!(regs.status(), DetectorStatus::RSS_REGISTER_OK);

        assert!(write_command(&regs, 3));
        assert_eq!(
            read_detector_status(&regs),
            (DetectorStatus::RSS_REGISTER_OK | DetectorStatus::BUSY).bits()
        );
    }

    #[test]
    fn peak_registers_read_stored_measurement() {
        let regs = registers();
        let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();
        let mut engine = ProtocolEngine::new(&table, &regs, regs.errors());

        regs.begin_measurement();
        regs.store_measurement(
            DistanceResult {
                num_distances: 2,
                ..Default::default()
            },
            &[
                PeakRegisters {
                    distance: 1200,
                    strength: -3000,
                },
                PeakRegisters {
                    distance: 2400,
                    strength: 1500,
                },
            ],
        );

        engine.data_in(&regs::DISTANCE_RESULT.to_be_bytes());
        assert_eq!(read_value(&mut engine), Some(2));
        assert_eq!(read_value(&mut engine), Some(1200));
        assert_eq!(read_value(&mut engine), Some(2400));
        assert_eq!(read_value(&mut engine), Some(0));

        engine.reset();
        engine.data_in(&regs::PEAK0_STRENGTH.to_be_bytes());
        assert_eq!(read_value(&mut engine), Some((-3000i32) as u32));

        engine.reset();
        engine.data_in(&regs::PEAK9_STRENGTH.to_be_bytes());
        read_value(&mut engine);
        assert_eq!(read_value(&mut engine), Some(READ_ADDRESS_ERROR));
        assert_eq!(regs.measure_counter(), 1);
    }

    #[test]
    fn reset_restores_power_on_state() {
        let regs = registers();
        regs.update_config(|c| c.start = 1);
        regs.set_measure_on_wakeup(true);
        regs.errors().raise(ProtocolError::Address);
        regs.channel().submit(2);

        regs.reset();

        assert_eq!(regs.config(), DistanceConfig::default());
        assert!(!regs.measure_on_wakeup());
        assert!(regs.errors().peek().is_empty());
        assert!(!regs.channel().is_busy());
        assert_eq!(regs.channel().drain(), None);
    }
}
