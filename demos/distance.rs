//! Distance example: Full detector application over the register protocol
//!
//! This example demonstrates:
//! - Wiring `DistanceRegisters` into a protocol engine
//! - A simulated radar behind the `DistanceDetector` trait
//! - Host-side configuration with milli-scaled registers
//! - Apply, calibrate and measure through the command handshake
//! - Decoding status words and recovering with a module reset

use embedded_hal::i2c::I2c;
use embedded_regproto::distance::{
    ApplyError, Command, DetectorStatus, DistanceApp, DistanceConfig, DistanceDetector,
    DistanceRegisters, DistanceResult, FirmwareVersion, Measurement, Peak, regs,
};
use embedded_regproto::prelude::*;
use embedded_regproto::scale::{float_to_u32_milli, i32_milli_to_float, u32_milli_to_float};

/// Pretends there is a reflector at a fixed distance.
struct SimulatedRadar {
    target_m: f32,
    frames: u32,
}

impl DistanceDetector for SimulatedRadar {
    fn register_hal(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool {
        true
    }

    fn apply(&mut self, config: &DistanceConfig) -> Result<(), ApplyError> {
        if config.start >= config.end {
            return Err(ApplyError::ConfigApply);
        }
        println!(
            "  [radar] range {:.3} m .. {:.3} m",
            config.start_m(),
            config.end_m()
        );
        Ok(())
    }

    fn calibrate_sensor(&mut self) -> bool {
        true
    }

    fn calibrate_detector(&mut self, _recalibrate: bool) -> bool {
        true
    }

    fn measure(&mut self) -> Option<Measurement> {
        self.frames += 1;
        let mut measurement = Measurement {
            temperature: 24,
            ..Default::default()
        };
        let jitter = (self.frames % 3) as f32 * 0.001;
        let _ = measurement.peaks.push(Peak {
            distance: self.target_m + jitter,
            strength: 12.5,
        });
        Some(measurement)
    }
}

/// Writes a command and waits for the busy bit to clear.
fn command<I: I2c>(client: &mut RegisterClient<I>, cmd: Command) -> DetectorStatus {
    client.write_register(regs::COMMAND, cmd.into()).unwrap();
    let raw = client
        .busy_wait(
            regs::DETECTOR_STATUS,
            DetectorStatus::BUSY.bits(),
            WaitPolicy::Attempts(10),
        )
        .unwrap();
    DetectorStatus::from_bits_retain(raw)
}

fn main() {
    println!("=== Distance Detector Example ===\n");

    let registers = DistanceRegisters::new(ReadyFlag::new(), FirmwareVersion::new(1, 4, 0));
    let table = DistanceRegisters::<ReadyFlag>::register_table().unwrap();

    let mut app = DistanceApp::new(
        SimulatedRadar {
            target_m: 1.2,
            frames: 0,
        },
        &registers,
    );
    app.start();

    let engine = ProtocolEngine::new(&table, &registers, registers.errors());
    let bus = LoopbackBus::new(engine).with_idle_hook(|| {
        app.poll();
    });
    let mut client = RegisterClient::new(bus);

    let version = FirmwareVersion::from_register(client.read_register(regs::VERSION).unwrap());
    println!("firmware {version}");

    // ========== Configure ==========
    client
        .write_register(regs::START, float_to_u32_milli(0.5))
        .unwrap();
    client
        .write_register(regs::END, float_to_u32_milli(2.0))
        .unwrap();
    println!(
        "range set to {} m .. {} m",
        u32_milli_to_float(client.read_register(regs::START).unwrap()),
        u32_milli_to_float(client.read_register(regs::END).unwrap())
    );

    // ========== Apply and calibrate ==========
    let status = command(&mut client, Command::ApplyConfigAndCalibrate);
    println!("status after apply: {:?}", status);
    assert!(status.is_ready());

    // ========== Measure ==========
    for _ in 0..3 {
        command(&mut client, Command::MeasureDistance);
        let result = DistanceResult::from_register(
            client.read_register(regs::DISTANCE_RESULT).unwrap(),
        );
        let distance = client.read_register(regs::PEAK0_DISTANCE).unwrap();
        let strength = client.read_register(regs::PEAK0_STRENGTH).unwrap() as i32;
        println!(
            "{} peak(s): {:.3} m, strength {:.1}, {} C",
            result.num_distances,
            u32_milli_to_float(distance),
            i32_milli_to_float(strength),
            result.temperature
        );
    }
    println!(
        "measure counter {}",
        client.read_register(regs::MEASURE_COUNTER).unwrap()
    );

    // ========== Fail-stop and reset ==========
    // Reset first: apply is a no-op once the configuration is applied
    command(&mut client, Command::ResetModule);
    client.write_register(regs::START, 3000).unwrap();
    client.write_register(regs::END, 1000).unwrap();
    let status = command(&mut client, Command::ApplyConfiguration);
    println!(
        "\ninvalid range -> first error {:?}, all errors {:?}",
        status.first_error(),
        status.errors()
    );

    // Only reset is honored now; other commands leave busy set
    client
        .write_register(regs::COMMAND, Command::MeasureDistance.into())
        .unwrap();
    let stuck = client.busy_wait(
        regs::DETECTOR_STATUS,
        DetectorStatus::BUSY.bits(),
        WaitPolicy::Attempts(3),
    );
    println!("measure while fail-stopped: {:?}", stuck.err());

    client
        .write_register(regs::COMMAND, Command::ResetModule.into())
        .unwrap();
    let status =
        DetectorStatus::from_bits_retain(client.read_register(regs::DETECTOR_STATUS).unwrap());
    println!("after reset: {:?}", status);

    println!("\n=== Example Complete ===");
}
