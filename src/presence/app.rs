use embedded_hal::digital::OutputPin;

use super::{
    config::PresenceConfig,
    regs::Command,
    state::{Detection, PresenceRegisters},
    status::PresenceStatus,
};
use crate::{
    handshake::{self, CommandHandler, ReadySignal, Serviced},
    scale::float_to_u32_milli,
};

/// Stage of detector creation that failed while applying a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PresenceApplyError {
    DetectorCreate,
    DetectorBuffer,
    SensorBuffer,
}

impl PresenceApplyError {
    const STAGES: [(PresenceApplyError, PresenceStatus, PresenceStatus); 3] = [
        (
            PresenceApplyError::DetectorCreate,
            PresenceStatus::DETECTOR_CREATE_OK,
            PresenceStatus::DETECTOR_CREATE_ERROR,
        ),
        (
            PresenceApplyError::DetectorBuffer,
            PresenceStatus::DETECTOR_BUFFER_OK,
            PresenceStatus::DETECTOR_BUFFER_ERROR,
        ),
        (
            PresenceApplyError::SensorBuffer,
            PresenceStatus::SENSOR_BUFFER_OK,
            PresenceStatus::SENSOR_BUFFER_ERROR,
        ),
    ];
}

impl core::fmt::Display for PresenceApplyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PresenceApplyError::DetectorCreate => write!(f, "detector create failed"),
            PresenceApplyError::DetectorBuffer => write!(f, "detector buffer size query failed"),
            PresenceApplyError::SensorBuffer => write!(f, "sensor buffer allocation failed"),
        }
    }
}

/// Output of one processed presence frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PresenceFrame {
    pub presence_detected: bool,
    /// Metres.
    pub distance: f32,
    pub intra_score: f32,
    pub inter_score: f32,
    /// The sensor asks to be recalibrated before the next frame.
    pub calibration_needed: bool,
    /// Degrees Celsius.
    pub temperature: i16,
}

/// Radar sensor and presence detector behind the register interface.
pub trait PresenceDetector {
    fn register_hal(&mut self) -> bool;

    fn create_config(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool;

    /// Creates the detector for `config` and allocates its buffers.
    fn apply(&mut self, config: &PresenceConfig) -> Result<(), PresenceApplyError>;

    fn calibrate_sensor(&mut self) -> bool;

    /// Prepares the detector and puts the sensor into hibernation between frames.
    fn activate(&mut self, config: &PresenceConfig) -> bool;

    fn deactivate(&mut self) -> bool;

    /// Wakes the sensor, measures and processes one frame.
    fn next_frame(&mut self) -> Option<PresenceFrame>;

    fn set_logging(&mut self, _enabled: bool) {}

    fn log_configuration(&mut self, _config: &PresenceConfig) {}

    fn release(&mut self) {}
}

/// Presence detector application.
///
/// Commands start and stop continuous detection. While active, the host
/// firmware calls [`on_wakeup`](Self::on_wakeup) once per
/// [`wakeup_period_ms`](Self::wakeup_period_ms) to process a frame.
pub struct PresenceApp<'a, D: PresenceDetector, R: ReadySignal> {
    detector: D,
    registers: &'a PresenceRegisters<R>,
    active: bool,
    logging: bool,
    last_wakeup_ms: Option<u32>,
}

impl<'a, D: PresenceDetector, R: ReadySignal> PresenceApp<'a, D, R> {
    pub fn new(detector: D, registers: &'a PresenceRegisters<R>) -> Self {
        Self {
            detector,
            registers,
            active: false,
            logging: false,
            last_wakeup_ms: None,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn registers(&self) -> &'a PresenceRegisters<R> {
        self.registers
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging
    }

    /// Power-on sequence, same shape as the distance application's.
    pub fn start(&mut self) -> bool {
        let steps: [(fn(&mut D) -> bool, PresenceStatus, PresenceStatus); 3] = [
            (
                D::register_hal,
                PresenceStatus::RSS_REGISTER_OK,
                PresenceStatus::RSS_REGISTER_ERROR,
            ),
            (
                D::create_config,
                PresenceStatus::CONFIG_CREATE_OK,
                PresenceStatus::CONFIG_CREATE_ERROR,
            ),
            (
                D::create_sensor,
                PresenceStatus::SENSOR_CREATE_OK,
                PresenceStatus::SENSOR_CREATE_ERROR,
            ),
        ];

        for (step, ok, err) in steps {
            if step(&mut self.detector) {
                self.set_status(ok);
            } else {
                error!("start-up failed, status {}", err.bits());
                self.set_status(err | PresenceStatus::DETECTOR_ERROR);
                return false;
            }
        }
        info!("presence detector started");
        true
    }

    pub fn poll(&mut self) -> Serviced {
        let registers = self.registers;
        handshake::service(registers.channel(), self)
    }

    /// How often the firmware should wake the app, `None` while stopped.
    pub fn wakeup_period_ms(&self) -> Option<u32> {
        if !self.active {
            return None;
        }
        self.registers.config().frame_interval_ms()
    }

    /// Periodic wakeup at `now_ms`. Updates the measured frame rate and
    /// processes one frame while active. Returns whether a frame was taken.
    pub fn on_wakeup(&mut self, now_ms: u32) -> bool {
        let registers = self.registers;
        if let Some(last) = self.last_wakeup_ms {
            let elapsed = now_ms.wrapping_sub(last);
            registers.set_actual_frame_rate(1_000_000u32.checked_div(elapsed).unwrap_or(0));
        }
        self.last_wakeup_ms = Some(now_ms);

        if !self.active || self.is_fail_stopped() {
            return false;
        }
        if !self.next_frame() {
            error!("could not get next presence frame");
            self.detector.deactivate();
            self.active = false;
            self.detector_failed();
        }
        true
    }

    /// Level for the detection output, `None` when the pin is not in use.
    pub fn gpio_level(&self) -> Option<bool> {
        if !self.registers.detection_on_gpio() {
            return None;
        }
        Some(self.active && self.registers.result().detected)
    }

    /// Drives `pin` from [`gpio_level`](Self::gpio_level). Leaves it alone
    /// while detection output is disabled.
    pub fn drive_gpio<P: OutputPin>(&self, pin: &mut P) -> Result<(), P::Error> {
        match self.gpio_level() {
            Some(true) => pin.set_high(),
            Some(false) => pin.set_low(),
            None => Ok(()),
        }
    }

    fn set_status(&self, bits: PresenceStatus) {
        self.registers.update_status(|s| s.insert(bits));
    }

    fn detector_failed(&self) {
        self.registers.flag_detector_error();
        self.set_status(PresenceStatus::DETECTOR_ERROR);
    }

    fn calibrate_sensor(&mut self) -> bool {
        self.registers.update_status(|s| {
            s.remove(PresenceStatus::SENSOR_CALIBRATE_OK | PresenceStatus::SENSOR_CALIBRATE_ERROR)
        });
        if self.detector.calibrate_sensor() {
            self.set_status(PresenceStatus::SENSOR_CALIBRATE_OK);
            true
        } else {
            error!("sensor calibration failed");
            self.set_status(PresenceStatus::SENSOR_CALIBRATE_ERROR);
            false
        }
    }

    fn apply_config(&mut self) -> bool {
        let config = self.registers.config();
        let result = self.detector.apply(&config);

        let mut applied = true;
        for (stage, ok, err) in PresenceApplyError::STAGES {
            match result {
                Err(failed) if failed == stage => {
                    error!("apply failed at {:?}", stage);
                    self.set_status(err | PresenceStatus::DETECTOR_ERROR);
                    applied = false;
                    break;
                }
                _ => self.set_status(ok),
            }
        }

        if applied && self.calibrate_sensor() {
            self.set_status(PresenceStatus::CONFIG_APPLY_OK);
            true
        } else {
            self.set_status(PresenceStatus::CONFIG_APPLY_ERROR | PresenceStatus::DETECTOR_ERROR);
            false
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        let ok = if active {
            let config = self.registers.config();
            self.registers.status().is_applied() && self.detector.activate(&config)
        } else {
            self.detector.deactivate()
        };
        if ok {
            self.active = active;
            if self.logging {
                info!("presence detector {}", if active { "started" } else { "stopped" });
            }
        } else {
            error!("could not change detector state");
            self.detector_failed();
        }
    }

    fn next_frame(&mut self) -> bool {
        let Some(frame) = self.detector.next_frame() else {
            return false;
        };
        self.registers.count_frame();

        if frame.calibration_needed {
            debug!("recalibrating");
            let config = self.registers.config();
            if !self.detector.deactivate()
                || !self.calibrate_sensor()
                || !self.detector.activate(&config)
            {
                return false;
            }
        }

        let detection = Detection {
            distance: float_to_u32_milli(frame.distance),
            intra_score: float_to_u32_milli(frame.intra_score),
            inter_score: float_to_u32_milli(frame.inter_score),
        };
        self.registers
            .store_frame(frame.presence_detected, detection, frame.temperature);
        if self.logging && frame.presence_detected {
            info!("presence at {} mm", detection.distance);
        }
        true
    }

    fn log_configuration(&mut self) {
        let config = self.registers.config();
        info!(
            "range {}..{} frame_rate {} sweeps {} hwaas {} profile {:?}",
            config.start,
            config.end,
            config.frame_rate,
            config.sweeps_per_frame,
            config.hwaas,
            config.manual_profile,
        );
        self.detector.log_configuration(&config);
    }
}

impl<D: PresenceDetector, R: ReadySignal> CommandHandler for PresenceApp<'_, D, R> {
    fn handle(&mut self, command: u32) {
        let Ok(command) = Command::try_from(command) else {
            warn!("unknown command {}", command);
            return;
        };

        match command {
            Command::ApplyConfiguration => {
                if !self.registers.status().is_applied() {
                    self.apply_config();
                }
            }
            Command::StartDetector => self.set_active(true),
            Command::StopDetector => self.set_active(false),
            Command::EnableUartLogs => {
                self.logging = true;
                self.detector.set_logging(true);
                info!("logs enabled");
            }
            Command::DisableUartLogs => {
                info!("logs disabled");
                self.logging = false;
                self.detector.set_logging(false);
            }
            Command::LogConfiguration => self.log_configuration(),
            Command::ResetModule => {}
        }
    }

    fn is_fail_stopped(&self) -> bool {
        self.registers
            .status()
            .contains(PresenceStatus::DETECTOR_ERROR)
    }

    fn reset_module(&mut self) {
        if self.active {
            self.detector.deactivate();
        }
        self.detector.release();
        self.registers.reset();
        self.active = false;
        self.logging = false;
        self.last_wakeup_ms = None;
        self.start();
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use super::*;
    use crate::{
        client::{RegisterClient, WaitPolicy},
        engine::ProtocolEngine,
        handshake::RESET_MODULE,
        loopback::LoopbackBus,
        presence::{PresenceResult, regs},
        test_support::{FakePresence, TestPresenceApp, TestPresenceRegisters, test_presence_registers},
    };

    fn started(regs: &TestPresenceRegisters, detector: FakePresence) -> TestPresenceApp<'_> {
        let mut app = PresenceApp::new(detector, regs);
        assert!(app.start());
        app
    }

    fn run(app: &mut TestPresenceApp<'_>, command: Command) -> Serviced {
        assert!(app.registers().channel().submit(command.into()));
        app.poll()
    }

    fn running(regs: &TestPresenceRegisters, detector: FakePresence) -> TestPresenceApp<'_> {
        let mut app = started(regs, detector);
        run(&mut app, Command::ApplyConfiguration);
        run(&mut app, Command::StartDetector);
        assert!(app.is_active());
        app
    }

    #[derive(Default)]
    struct MockPin {
        high: bool,
        writes: u32,
    }

    impl embedded_hal::digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn apply_creates_detector_and_calibrates() {
        let regs = test_presence_registers();
        let mut app = started(&regs, FakePresence::default());

        assert_eq!(
            run(&mut app, Command::ApplyConfiguration),
            Serviced::Completed(1)
        );
        let status = regs.status();
        assert!(status.contains(
            PresenceStatus::DETECTOR_CREATE_OK
                | PresenceStatus::DETECTOR_BUFFER_OK
                | PresenceStatus::SENSOR_BUFFER_OK
                | PresenceStatus::SENSOR_CALIBRATE_OK
                | PresenceStatus::CONFIG_APPLY_OK
        ));
        assert!(status.errors().is_empty());

        run(&mut app, Command::ApplyConfiguration);
        assert_eq!(app.detector().applied, 1);
    }

    #[test]
    fn apply_failure_sets_stage_and_apply_errors() {
        let regs = test_presence_registers();
        let mut app = started(
            &regs,
            FakePresence {
                apply_error: Some(PresenceApplyError::DetectorBuffer),
                ..Default::default()
            },
        );

        run(&mut app, Command::ApplyConfiguration);

        let status = regs.status();
        assert!(status.contains(PresenceStatus::DETECTOR_CREATE_OK));
        assert!(status.contains(
            PresenceStatus::DETECTOR_BUFFER_ERROR
                | PresenceStatus::CONFIG_APPLY_ERROR
                | PresenceStatus::DETECTOR_ERROR
        ));
        assert!(!status.contains(PresenceStatus::SENSOR_BUFFER_OK));
        assert_eq!(app.detector().sensor_calibrations, 0);
        assert!(app.is_fail_stopped());
    }

    #[test]
    fn calibration_failure_fails_the_apply() {
        let regs = test_presence_registers();
        let mut app = started(
            &regs,
            FakePresence {
                calibration_fails: true,
                ..Default::default()
            },
        );

        run(&mut app, Command::ApplyConfiguration);

        let status = regs.status();
        assert!(status.contains(
            PresenceStatus::SENSOR_CALIBRATE_ERROR | PresenceStatus::CONFIG_APPLY_ERROR
        ));
        assert!(!status.is_applied());
        assert!(app.is_fail_stopped());
    }

    #[test]
    fn start_before_apply_is_a_detector_error() {
        let regs = test_presence_registers();
        let mut app = started(&regs, FakePresence::default());

        run(&mut app, Command::StartDetector);

        assert!(!app.is_active());
        assert!(app.is_fail_stopped());
        assert!(regs.result().detector_error);
        assert_eq!(app.detector().activations, 0);
    }

    #[test]
    fn start_and_stop_follow_detector_state() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());
        assert_eq!(app.wakeup_period_ms(), Some(83));

        // Starting twice does not prepare again
        run(&mut app, Command::StartDetector);
        assert_eq!(app.detector().activations, 1);

        run(&mut app, Command::StopDetector);
        assert!(!app.is_active());
        assert_eq!(app.wakeup_period_ms(), None);
        assert!(!app.on_wakeup(100));
        assert_eq!(regs.measure_counter(), 0);
    }

    #[test]
    fn wakeups_store_detections() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());

        assert!(app.on_wakeup(0));
        assert_eq!(regs.measure_counter(), 1);
        let result = regs.result();
        assert!(result.detected && result.detected_sticky);
        assert_eq!(result.temperature, 23);
        assert_eq!(regs.detection().distance, 1500);
        assert_eq!(regs.detection().intra_score, 2250);

        app.detector_mut().present = false;
        assert!(app.on_wakeup(100));
        let result = regs.take_result();
        assert!(!result.detected);
        assert!(result.detected_sticky);
        assert!(!regs.result().detected_sticky);
        assert_eq!(regs.detection().distance, 1500);
        assert_eq!(regs.actual_frame_rate(), 10_000);
    }

    #[test]
    fn calibration_request_recalibrates_between_frames() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());
        app.detector_mut().calibration_needed = true;

        assert!(app.on_wakeup(0));

        assert_eq!(app.detector().sensor_calibrations, 2);
        assert_eq!(app.detector().activations, 2);
        assert!(app.is_active());
        assert!(regs.result().detected);
    }

    #[test]
    fn frame_failure_stops_and_fail_stops() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());
        app.detector_mut().frame_fails = true;

        assert!(app.on_wakeup(0));

        assert!(!app.is_active());
        assert!(app.is_fail_stopped());
        assert!(regs.result().detector_error);
        assert_eq!(regs.measure_counter(), 0);
        assert!(!app.on_wakeup(100));
    }

    #[test]
    fn gpio_follows_detection_when_enabled() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());
        let mut pin = MockPin::default();

        app.on_wakeup(0);
        app.drive_gpio(&mut pin).unwrap();
        assert_eq!(pin.writes, 0);
        assert_eq!(app.gpio_level(), None);

        regs.set_detection_on_gpio(true);
        app.drive_gpio(&mut pin).unwrap();
        assert!(pin.high);

        run(&mut app, Command::StopDetector);
        app.drive_gpio(&mut pin).unwrap();
        assert!(!pin.high);
        assert_eq!(pin.writes, 2);
    }

    #[test]
    fn reset_stops_and_restarts() {
        let regs = test_presence_registers();
        let mut app = running(&regs, FakePresence::default());
        app.detector_mut().frame_fails = true;
        app.on_wakeup(0);
        assert!(app.is_fail_stopped());

        assert!(regs.channel().submit(RESET_MODULE));
        assert_eq!(app.poll(), Serviced::Reset);

        assert!(!app.is_fail_stopped());
        assert!(!app.is_active());
        assert!(!regs.result().detector_error);
        assert!(regs.status().contains(PresenceStatus::SENSOR_CREATE_OK));
        assert_eq!(app.detector().releases, 1);
    }

    #[test]
    fn host_drives_detection_over_the_bus() {
        let regs = test_presence_registers();
        let table = TestPresenceRegisters::register_table().unwrap();
        let mut app = started(&regs, FakePresence::default());

        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &regs, regs.errors()))
            .with_idle_hook(|| {
                app.poll();
            });
        let mut client = RegisterClient::new(bus);

        client.write_register(regs::END, 2000).unwrap();
        for command in [Command::ApplyConfiguration, Command::StartDetector] {
            client.write_register(regs::COMMAND, command.into()).unwrap();
            client
                .busy_wait(
                    regs::DETECTOR_STATUS,
                    PresenceStatus::BUSY.bits(),
                    WaitPolicy::Attempts(5),
                )
                .unwrap();
        }
        drop(client);

        assert_eq!(regs.config().end, 2000);
        assert!(app.is_active());
        app.on_wakeup(0);

        let table = TestPresenceRegisters::register_table().unwrap();
        let mut client = RegisterClient::new(LoopbackBus::new(ProtocolEngine::new(
            &table,
            &regs,
            regs.errors(),
        )));
        let mut values = [0u32; 4];
        client
            .read_registers(regs::PRESENCE_RESULT, &mut values)
            .unwrap();
        let result = PresenceResult::from_register(values[0]);
        assert!(result.detected && result.detected_sticky);
        assert_eq!(values[1..], [1500, 2250, 750]);
        assert_eq!(client.read_register(regs::MEASURE_COUNTER).unwrap(), 1);

        let again = PresenceResult::from_register(
            client.read_register(regs::PRESENCE_RESULT).unwrap(),
        );
        assert!(again.detected && !again.detected_sticky);
    }
}
