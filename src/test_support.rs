//! Test support utilities - only compiled in test builds.

use core::cell::Cell;

use critical_section::Mutex;
use heapless::Vec;

use crate::{
    distance::{
        ApplyError, DistanceApp, DistanceConfig, DistanceDetector, DistanceRegisters,
        FirmwareVersion, Measurement, Peak,
    },
    engine::ProtocolEngine,
    flags::ProtocolErrors,
    handshake::{CommandChannel, CommandHandler, ReadyFlag},
    presence::{
        PresenceApp, PresenceApplyError, PresenceConfig, PresenceDetector, PresenceFrame,
        PresenceRegisters,
    },
    table::RegisterTable,
    wire::DATA_LENGTH,
};

pub const STATUS: u16 = 0x00;
pub const PROTOCOL_STATUS: u16 = 0x01;
pub const VERSION: u16 = 0x02;
pub const CONFIG_START: u16 = 0x40;
pub const CONFIG_END: u16 = 0x41;
pub const CONFIG_SPAN: u16 = 0x42;
pub const COMMAND: u16 = 0x100;

pub const BUSY_BIT: u32 = 1 << 31;
pub const APPLY: u32 = 3;

pub type TestChannel = CommandChannel<ReadyFlag>;
pub type TestTable = RegisterTable<TestContext, 8>;

/// Small device: two config registers, a derived read-only register, a
/// status word and a command register.
pub struct TestContext {
    pub errors: ProtocolErrors,
    pub channel: TestChannel,
    start: Mutex<Cell<u32>>,
    end: Mutex<Cell<u32>>,
    applied: Mutex<Cell<u32>>,
    applied_start: Mutex<Cell<u32>>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            errors: ProtocolErrors::new(),
            channel: TestChannel::default(),
            start: Mutex::new(Cell::new(250)),
            end: Mutex::new(Cell::new(3000)),
            applied: Mutex::new(Cell::new(0)),
            applied_start: Mutex::new(Cell::new(0)),
        }
    }

    pub fn start(&self) -> u32 {
        critical_section::with(|cs| self.start.borrow(cs).get())
    }

    pub fn end(&self) -> u32 {
        critical_section::with(|cs| self.end.borrow(cs).get())
    }

    /// Number of apply commands executed.
    pub fn applied(&self) -> u32 {
        critical_section::with(|cs| self.applied.borrow(cs).get())
    }

    /// Start value captured by the last apply.
    pub fn applied_start(&self) -> u32 {
        critical_section::with(|cs| self.applied_start.borrow(cs).get())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn read_status(ctx: &TestContext) -> u32 {
    let busy = if ctx.channel.is_busy() { BUSY_BIT } else { 0 };
    busy | (ctx.applied() & 0xFF)
}

fn read_protocol_status(ctx: &TestContext) -> u32 {
    ctx.errors.drain().bits() as u32
}

fn read_version(_: &TestContext) -> u32 {
    0x0001_0203
}

fn read_start(ctx: &TestContext) -> u32 {
    ctx.start()
}

fn write_start(ctx: &TestContext, value: u32) -> bool {
    critical_section::with(|cs| ctx.start.borrow(cs).set(value));
    true
}

fn read_end(ctx: &TestContext) -> u32 {
    ctx.end()
}

fn write_end(ctx: &TestContext, value: u32) -> bool {
    if value == 0 {
        return false;
    }
    critical_section::with(|cs| ctx.end.borrow(cs).set(value));
    true
}

fn read_span(ctx: &TestContext) -> u32 {
    ctx.end().wrapping_sub(ctx.start())
}

fn write_command(ctx: &TestContext, value: u32) -> bool {
    ctx.channel.submit(value)
}

/// Helper to create the standard test table.
pub fn test_table() -> TestTable {
    TestTable::builder()
        .read_only(STATUS, read_status)
        .read_only(PROTOCOL_STATUS, read_protocol_status)
        .read_only(VERSION, read_version)
        .read_write(CONFIG_START, read_start, write_start)
        .read_write(CONFIG_END, read_end, write_end)
        .read_only(CONFIG_SPAN, read_span)
        .write_only(COMMAND, write_command)
        .build()
        .unwrap()
}

/// Encodes a data phase.
pub fn data_phase(value: u32) -> [u8; DATA_LENGTH] {
    value.to_be_bytes()
}

/// Performs one read and decodes it, or `None` if the engine refused.
pub fn read_value<C, const N: usize>(engine: &mut ProtocolEngine<'_, C, N>) -> Option<u32> {
    let mut out = [0u8; DATA_LENGTH];
    engine.data_out(&mut out).then(|| u32::from_be_bytes(out))
}

/// Handler that applies the test context's configuration.
pub struct TestHandler<'a> {
    ctx: &'a TestContext,
}

impl<'a> TestHandler<'a> {
    pub fn new(ctx: &'a TestContext) -> Self {
        Self { ctx }
    }
}

impl CommandHandler for TestHandler<'_> {
    fn handle(&mut self, command: u32) {
        if command == APPLY {
            let start = self.ctx.start();
            critical_section::with(|cs| {
                let applied = self.ctx.applied.borrow(cs);
                applied.set(applied.get() + 1);
                self.ctx.applied_start.borrow(cs).set(start);
            });
        }
    }

    fn reset_module(&mut self) {
        critical_section::with(|cs| self.ctx.applied.borrow(cs).set(0));
    }
}

/// Handler that records what it was asked to do.
#[derive(Default)]
pub struct RecordingHandler {
    pub handled: Vec<u32, 8>,
    pub resets: u32,
    pub fail_stopped: bool,
}

impl CommandHandler for RecordingHandler {
    fn handle(&mut self, command: u32) {
        let _ = self.handled.push(command);
    }

    fn is_fail_stopped(&self) -> bool {
        self.fail_stopped
    }

    fn reset_module(&mut self) {
        self.resets += 1;
        self.fail_stopped = false;
    }
}

pub type TestRegisters = DistanceRegisters<ReadyFlag>;
pub type TestApp<'a> = DistanceApp<'a, FakeDetector, ReadyFlag>;

/// Distance registers with a recorded ready flag and version 1.2.3.
pub fn test_registers() -> TestRegisters {
    DistanceRegisters::new(ReadyFlag::new(), FirmwareVersion::new(1, 2, 3))
}

/// Scripted detector: succeeds unless told otherwise and counts calls.
#[derive(Debug, Default)]
pub struct FakeDetector {
    pub sensor_create_fails: bool,
    pub apply_error: Option<ApplyError>,
    /// Upcoming sensor calibrations that fail.
    pub sensor_calibration_failures: u32,
    pub measure_fails: bool,
    pub logging: bool,
    pub applied: u32,
    pub sensor_calibrations: u32,
    pub detector_calibrations: u32,
    pub recalibrations: u32,
    pub configurations_logged: u32,
    pub releases: u32,
}

impl DistanceDetector for FakeDetector {
    fn register_hal(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool {
        !self.sensor_create_fails
    }

    fn apply(&mut self, _config: &DistanceConfig) -> Result<(), ApplyError> {
        self.applied += 1;
        match self.apply_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn calibrate_sensor(&mut self) -> bool {
        self.sensor_calibrations += 1;
        if self.sensor_calibration_failures > 0 {
            self.sensor_calibration_failures -= 1;
            return false;
        }
        true
    }

    fn calibrate_detector(&mut self, recalibrate: bool) -> bool {
        if recalibrate {
            self.recalibrations += 1;
        } else {
            self.detector_calibrations += 1;
        }
        true
    }

    fn measure(&mut self) -> Option<Measurement> {
        if self.measure_fails {
            return None;
        }
        let mut peaks = Vec::new();
        let _ = peaks.push(Peak {
            distance: 1.234,
            strength: -1.5,
        });
        let _ = peaks.push(Peak {
            distance: 2.5,
            strength: 3.0,
        });
        Some(Measurement {
            peaks,
            temperature: 25,
            ..Default::default()
        })
    }

    fn set_logging(&mut self, enabled: bool) {
        self.logging = enabled;
    }

    fn log_configuration(&mut self, _config: &DistanceConfig) {
        self.configurations_logged += 1;
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}

pub type TestPresenceRegisters = PresenceRegisters<ReadyFlag>;
pub type TestPresenceApp<'a> = PresenceApp<'a, FakePresence, ReadyFlag>;

pub fn test_presence_registers() -> TestPresenceRegisters {
    PresenceRegisters::new(ReadyFlag::new(), FirmwareVersion::new(1, 2, 3))
}

/// Scripted presence radar: someone at 1.5 m unless `present` is cleared.
#[derive(Debug)]
pub struct FakePresence {
    pub present: bool,
    pub apply_error: Option<PresenceApplyError>,
    pub calibration_fails: bool,
    pub calibration_needed: bool,
    pub frame_fails: bool,
    pub applied: u32,
    pub sensor_calibrations: u32,
    pub activations: u32,
    pub releases: u32,
}

impl Default for FakePresence {
    fn default() -> Self {
        Self {
            present: true,
            apply_error: None,
            calibration_fails: false,
            calibration_needed: false,
            frame_fails: false,
            applied: 0,
            sensor_calibrations: 0,
            activations: 0,
            releases: 0,
        }
    }
}

impl PresenceDetector for FakePresence {
    fn register_hal(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool {
        true
    }

    fn apply(&mut self, _config: &PresenceConfig) -> Result<(), PresenceApplyError> {
        self.applied += 1;
        match self.apply_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn calibrate_sensor(&mut self) -> bool {
        self.sensor_calibrations += 1;
        !self.calibration_fails
    }

    fn activate(&mut self, _config: &PresenceConfig) -> bool {
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) -> bool {
        true
    }

    fn next_frame(&mut self) -> Option<PresenceFrame> {
        if self.frame_fails {
            return None;
        }
        Some(PresenceFrame {
            presence_detected: self.present,
            distance: 1.5,
            intra_score: 2.25,
            inter_score: 0.75,
            calibration_needed: self.calibration_needed,
            temperature: 23,
        })
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}
