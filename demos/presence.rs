//! Presence example: Continuous detection on a periodic wakeup
//!
//! This example demonstrates:
//! - Wiring `PresenceRegisters` into a protocol engine
//! - Starting and stopping the detector through the command handshake
//! - Driving frames from a simulated wakeup timer
//! - Reading the sticky presence bit from the host

use std::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_regproto::distance::FirmwareVersion;
use embedded_regproto::prelude::*;
use embedded_regproto::presence::{
    Command, PresenceApp, PresenceApplyError, PresenceConfig, PresenceDetector, PresenceFrame,
    PresenceRegisters, PresenceResult, PresenceStatus, regs,
};
use embedded_regproto::scale::u32_milli_to_float;

/// Someone walks through the room for a few frames.
struct SimulatedRadar {
    frame: u32,
}

impl PresenceDetector for SimulatedRadar {
    fn register_hal(&mut self) -> bool {
        true
    }

    fn create_sensor(&mut self) -> bool {
        true
    }

    fn apply(&mut self, config: &PresenceConfig) -> Result<(), PresenceApplyError> {
        println!(
            "  [radar] {:.1} Hz, {:.2} m .. {:.2} m",
            config.frame_rate_hz(),
            config.start_m(),
            config.end_m()
        );
        Ok(())
    }

    fn calibrate_sensor(&mut self) -> bool {
        true
    }

    fn activate(&mut self, _config: &PresenceConfig) -> bool {
        println!("  [radar] hibernating between frames");
        true
    }

    fn deactivate(&mut self) -> bool {
        true
    }

    fn next_frame(&mut self) -> Option<PresenceFrame> {
        self.frame += 1;
        let present = (3..=5).contains(&self.frame);
        Some(PresenceFrame {
            presence_detected: present,
            distance: 0.8 + self.frame as f32 * 0.1,
            intra_score: if present { 2.0 } else { 0.1 },
            inter_score: if present { 1.4 } else { 0.2 },
            calibration_needed: false,
            temperature: 22,
        })
    }
}

fn command<I: I2c>(client: &mut RegisterClient<I>, cmd: Command) {
    client.write_register(regs::COMMAND, cmd.into()).unwrap();
    client
        .busy_wait(
            regs::DETECTOR_STATUS,
            PresenceStatus::BUSY.bits(),
            WaitPolicy::Attempts(10),
        )
        .unwrap();
}

fn main() {
    println!("=== Presence Detector Example ===\n");

    let registers = PresenceRegisters::new(ReadyFlag::new(), FirmwareVersion::new(1, 0, 0));
    let table = PresenceRegisters::<ReadyFlag>::register_table().unwrap();

    let app = RefCell::new(PresenceApp::new(SimulatedRadar { frame: 0 }, &registers));
    app.borrow_mut().start();

    let engine = ProtocolEngine::new(&table, &registers, registers.errors());
    let bus = LoopbackBus::new(engine).with_idle_hook(|| {
        app.borrow_mut().poll();
    });
    let mut client = RegisterClient::new(bus);

    // ========== Configure and start ==========
    client.write_register(regs::FRAME_RATE, 5_000).unwrap();
    client.write_register(regs::DETECTION_ON_GPIO, 1).unwrap();
    command(&mut client, Command::ApplyConfiguration);
    command(&mut client, Command::StartDetector);
    println!(
        "wakeup every {:?} ms",
        app.borrow().wakeup_period_ms()
    );

    // ========== Frames ==========
    for tick in 0..8u32 {
        app.borrow_mut().on_wakeup(tick * 200);
        if tick % 2 == 1 {
            let result =
                PresenceResult::from_register(client.read_register(regs::PRESENCE_RESULT).unwrap());
            let distance = client.read_register(regs::PRESENCE_DISTANCE).unwrap();
            println!(
                "tick {tick}: present {}, seen since last read {}, last at {:.2} m, gpio {:?}",
                result.detected,
                result.detected_sticky,
                u32_milli_to_float(distance),
                app.borrow().gpio_level()
            );
        }
    }
    println!(
        "frames {}, measured rate {} mHz",
        client.read_register(regs::MEASURE_COUNTER).unwrap(),
        registers.actual_frame_rate()
    );

    // ========== Stop ==========
    command(&mut client, Command::StopDetector);
    println!("active after stop: {}", app.borrow().is_active());

    println!("\n=== Example Complete ===");
}
