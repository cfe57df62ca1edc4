use heapless::Vec;

use super::{
    config::DistanceConfig,
    regs::{Command, PEAK_COUNT},
    state::{DistanceRegisters, PeakRegisters},
    status::{DetectorStatus, DistanceResult},
};
use crate::{
    handshake::{self, CommandHandler, ReadySignal, Serviced},
    scale::{float_to_i32_milli, float_to_u32_milli},
};

/// Stage of the apply sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyError {
    DetectorCreate,
    DetectorBuffer,
    SensorBuffer,
    CalibrationBuffer,
    ConfigApply,
}

impl ApplyError {
    /// Stages in execution order with their OK and error bits.
    const STAGES: [(ApplyError, DetectorStatus, DetectorStatus); 5] = [
        (
            ApplyError::DetectorCreate,
            DetectorStatus::DETECTOR_CREATE_OK,
            DetectorStatus::DETECTOR_CREATE_ERROR,
        ),
        (
            ApplyError::DetectorBuffer,
            DetectorStatus::DETECTOR_BUFFER_OK,
            DetectorStatus::DETECTOR_BUFFER_ERROR,
        ),
        (
            ApplyError::SensorBuffer,
            DetectorStatus::SENSOR_BUFFER_OK,
            DetectorStatus::SENSOR_BUFFER_ERROR,
        ),
        (
            ApplyError::CalibrationBuffer,
            DetectorStatus::CALIBRATION_BUFFER_OK,
            DetectorStatus::CALIBRATION_BUFFER_ERROR,
        ),
        (
            ApplyError::ConfigApply,
            DetectorStatus::CONFIG_APPLY_OK,
            DetectorStatus::CONFIG_APPLY_ERROR,
        ),
    ];
}

impl core::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ApplyError::DetectorCreate => write!(f, "detector create failed"),
            ApplyError::DetectorBuffer => write!(f, "detector buffer allocation failed"),
            ApplyError::SensorBuffer => write!(f, "sensor buffer allocation failed"),
            ApplyError::CalibrationBuffer => write!(f, "calibration buffer allocation failed"),
            ApplyError::ConfigApply => write!(f, "configuration rejected by detector"),
        }
    }
}

/// One detected peak in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Peak {
    /// Metres.
    pub distance: f32,
    pub strength: f32,
}

/// Output of one detector frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measurement {
    pub peaks: Vec<Peak, PEAK_COUNT>,
    pub near_start_edge: bool,
    pub calibration_needed: bool,
    /// Degrees Celsius.
    pub temperature: i16,
}

/// Radar sensor and distance detector behind the register interface.
///
/// Every method runs in the processing loop, never in bus-callback context,
/// and may take as long as the hardware needs.
pub trait DistanceDetector {
    /// Registers the radar HAL. Runs once per start-up.
    fn register_hal(&mut self) -> bool;

    /// Creates the detector configuration object.
    fn create_config(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool;

    /// Creates the detector for `config` and allocates its buffers.
    fn apply(&mut self, config: &DistanceConfig) -> Result<(), ApplyError>;

    fn calibrate_sensor(&mut self) -> bool;

    /// Full calibration, or an update of the existing one when `recalibrate` is set.
    fn calibrate_detector(&mut self, recalibrate: bool) -> bool;

    /// Runs one frame. `None` if the sensor or detector failed.
    fn measure(&mut self) -> Option<Measurement>;

    fn set_logging(&mut self, _enabled: bool) {}

    fn log_configuration(&mut self, _config: &DistanceConfig) {}

    /// Drops everything created since start-up.
    fn release(&mut self) {}
}

/// Distance detector application: start-up, command dispatch and the
/// measure-on-wakeup path, all reporting through [`DistanceRegisters`].
pub struct DistanceApp<'a, D: DistanceDetector, R: ReadySignal> {
    detector: D,
    registers: &'a DistanceRegisters<R>,
    logging: bool,
}

impl<'a, D: DistanceDetector, R: ReadySignal> DistanceApp<'a, D, R> {
    pub fn new(detector: D, registers: &'a DistanceRegisters<R>) -> Self {
        Self {
            detector,
            registers,
            logging: false,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn registers(&self) -> &'a DistanceRegisters<R> {
        self.registers
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging
    }

    /// Power-on sequence. A failing step sets its error bit plus
    /// [`DetectorStatus::DETECTOR_ERROR`] and stops.
    pub fn start(&mut self) -> bool {
        let steps: [(fn(&mut D) -> bool, DetectorStatus, DetectorStatus); 3] = [
            (
                D::register_hal,
                DetectorStatus::RSS_REGISTER_OK,
                DetectorStatus::RSS_REGISTER_ERROR,
            ),
            (
                D::create_config,
                DetectorStatus::CONFIG_CREATE_OK,
                DetectorStatus::CONFIG_CREATE_ERROR,
            ),
            (
                D::create_sensor,
                DetectorStatus::SENSOR_CREATE_OK,
                DetectorStatus::SENSOR_CREATE_ERROR,
            ),
        ];

        for (step, ok, err) in steps {
            if step(&mut self.detector) {
                self.set_status(ok);
            } else {
                error!("start-up failed, status {}", err.bits());
                self.set_status(err | DetectorStatus::DETECTOR_ERROR);
                return false;
            }
        }
        info!("distance detector started");
        true
    }

    /// One processing-loop iteration.
    pub fn poll(&mut self) -> Serviced {
        let registers = self.registers;
        handshake::service(registers.channel(), self)
    }

    /// Called after waking from low power. Measures if enabled and the
    /// detector is applied and calibrated. Returns whether it measured.
    pub fn on_wakeup(&mut self) -> bool {
        let registers = self.registers;
        if !registers.measure_on_wakeup()
            || !registers.status().is_ready()
            || self.is_fail_stopped()
            || registers.channel().is_busy()
        {
            return false;
        }
        debug!("measure on wakeup");
        self.measure();
        true
    }

    fn set_status(&self, bits: DetectorStatus) {
        self.registers.update_status(|s| s.insert(bits));
    }

    fn is_applied(&self) -> bool {
        self.registers
            .status()
            .contains(DetectorStatus::CONFIG_APPLY_OK)
    }

    fn apply_config(&mut self) -> bool {
        let config = self.registers.config();
        let result = self.detector.apply(&config);

        for (stage, ok, err) in ApplyError::STAGES {
            match result {
                Err(failed) if failed == stage => {
                    error!("apply failed at {:?}", stage);
                    self.set_status(err | DetectorStatus::DETECTOR_ERROR);
                    return false;
                }
                _ => self.set_status(ok),
            }
        }
        true
    }

    fn calibrate(&mut self, recalibrate: bool) -> bool {
        self.registers.update_status(|s| {
            s.remove(
                DetectorStatus::SENSOR_CALIBRATE_OK
                    | DetectorStatus::SENSOR_CALIBRATE_ERROR
                    | DetectorStatus::DETECTOR_CALIBRATE_OK
                    | DetectorStatus::DETECTOR_CALIBRATE_ERROR,
            )
        });

        let sensor_ok = self.detector.calibrate_sensor() || {
            warn!("sensor calibration failed, retrying");
            self.detector.calibrate_sensor()
        };
        if !sensor_ok {
            self.set_status(DetectorStatus::SENSOR_CALIBRATE_ERROR);
            return false;
        }
        self.set_status(DetectorStatus::SENSOR_CALIBRATE_OK);

        if !self.detector.calibrate_detector(recalibrate) {
            self.set_status(DetectorStatus::DETECTOR_CALIBRATE_ERROR);
            return false;
        }
        self.set_status(DetectorStatus::DETECTOR_CALIBRATE_OK);
        true
    }

    fn measure(&mut self) {
        let registers = self.registers;
        registers.begin_measurement();

        if !registers.status().is_ready() {
            warn!("measure requested before calibration");
            registers.flag_measure_error();
            return;
        }

        let Some(measurement) = self.detector.measure() else {
            error!("measurement failed");
            registers.flag_measure_error();
            return;
        };

        let mut peaks = [PeakRegisters::default(); PEAK_COUNT];
        for (slot, peak) in peaks.iter_mut().zip(measurement.peaks.iter()) {
            *slot = PeakRegisters {
                distance: float_to_u32_milli(peak.distance),
                strength: float_to_i32_milli(peak.strength),
            };
        }
        let count = measurement.peaks.len();
        let result = DistanceResult {
            num_distances: count as u8,
            near_start_edge: measurement.near_start_edge,
            calibration_needed: measurement.calibration_needed,
            measure_distance_error: false,
            temperature: measurement.temperature,
        };
        registers.store_measurement(result, &peaks[..count]);
        if self.logging {
            info!("{} distances, first {} mm", count, peaks[0].distance);
        }
    }

    fn log_configuration(&mut self) {
        let config = self.registers.config();
        info!(
            "start {} end {} max_step {} signal_quality {} profile {:?}",
            config.start,
            config.end,
            config.max_step_length,
            config.signal_quality,
            config.max_profile,
        );
        info!(
            "threshold {:?} sorting {:?} frames {} sensitivity {} shape {:?}",
            config.threshold_method,
            config.peak_sorting,
            config.num_frames_recorded_threshold,
            config.threshold_sensitivity,
            config.reflector_shape,
        );
        self.detector.log_configuration(&config);
    }
}

impl<D: DistanceDetector, R: ReadySignal> CommandHandler for DistanceApp<'_, D, R> {
    fn handle(&mut self, command: u32) {
        let Ok(command) = Command::try_from(command) else {
            warn!("unknown command {}", command);
            return;
        };

        match command {
            Command::ApplyConfiguration => {
                if !self.is_applied() {
                    self.apply_config();
                }
            }
            Command::ApplyConfigAndCalibrate => {
                if !self.is_applied() && self.apply_config() {
                    self.calibrate(false);
                }
            }
            Command::Calibrate | Command::Recalibrate => {
                if self.is_applied() {
                    self.calibrate(command == Command::Recalibrate);
                } else {
                    warn!("calibration requested before apply");
                }
            }
            Command::MeasureDistance => self.measure(),
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
            // Dispatched by the handshake before reaching the handler
            Command::ResetModule => {}
        }
    }

    fn is_fail_stopped(&self) -> bool {
        self.registers
            .status()
            .contains(DetectorStatus::DETECTOR_ERROR)
    }

    fn reset_module(&mut self) {
        self.detector.release();
        self.registers.reset();
        self.logging = false;
        self.start();
    }
}
