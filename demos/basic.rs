//! Basic example: Register protocol fundamentals
//!
//! This example demonstrates:
//! - Building a sparse register table with read/write accessors
//! - Driving the protocol from the host through `RegisterClient`
//! - Sentinel values and sticky error flags
//! - The command/busy handshake with a processing loop

use core::cell::Cell;

use critical_section::Mutex;
use embedded_regproto::prelude::*;
use embedded_regproto::{READ_ADDRESS_ERROR, handshake};

// ============ Register Layout ============
const STATUS: u16 = 0x0000; // busy (bit 31) | apply count
const PROTOCOL_STATUS: u16 = 0x0001; // drained error flags
const THRESHOLD: u16 = 0x0040; // read/write, default 250
const COMMAND: u16 = 0x0100; // write-only

const BUSY: u32 = 1 << 31;
const CMD_APPLY: u32 = 3;

struct Device {
    errors: ProtocolErrors,
    channel: CommandChannel<ReadyFlag>,
    threshold: Mutex<Cell<u32>>,
    applied: Mutex<Cell<u32>>,
}

impl Device {
    fn new() -> Self {
        Self {
            errors: ProtocolErrors::new(),
            channel: CommandChannel::new(ReadyFlag::new()),
            threshold: Mutex::new(Cell::new(250)),
            applied: Mutex::new(Cell::new(0)),
        }
    }
}

fn read_status(dev: &Device) -> u32 {
    let busy = if dev.channel.is_busy() { BUSY } else { 0 };
    busy | critical_section::with(|cs| dev.applied.borrow(cs).get())
}

fn read_protocol_status(dev: &Device) -> u32 {
    dev.errors.drain().bits() as u32
}

fn read_threshold(dev: &Device) -> u32 {
    critical_section::with(|cs| dev.threshold.borrow(cs).get())
}

fn write_threshold(dev: &Device, value: u32) -> bool {
    critical_section::with(|cs| dev.threshold.borrow(cs).set(value));
    true
}

fn write_command(dev: &Device, value: u32) -> bool {
    dev.channel.submit(value)
}

/// Processing loop side: runs commands outside the bus callbacks.
struct Handler<'a> {
    dev: &'a Device,
}

impl CommandHandler for Handler<'_> {
    fn handle(&mut self, command: u32) {
        if command == CMD_APPLY {
            let threshold = read_threshold(self.dev);
            println!("  [device] applying threshold {threshold}");
            critical_section::with(|cs| {
                let applied = self.dev.applied.borrow(cs);
                applied.set(applied.get() + 1);
            });
        }
    }

    fn reset_module(&mut self) {
        critical_section::with(|cs| self.dev.applied.borrow(cs).set(0));
    }
}

fn main() {
    println!("=== Register Protocol Example ===\n");

    let device = Device::new();
    let table = RegisterTable::<Device, 8>::builder()
        .read_only(STATUS, read_status)
        .read_only(PROTOCOL_STATUS, read_protocol_status)
        .read_write(THRESHOLD, read_threshold, write_threshold)
        .write_only(COMMAND, write_command)
        .build()
        .unwrap();

    let mut handler = Handler { dev: &device };
    let bus = LoopbackBus::new(ProtocolEngine::new(&table, &device, &device.errors))
        .with_idle_hook(|| {
            // One processing-loop iteration after every bus transaction
            handshake::service(&device.channel, &mut handler);
        });
    let mut client = RegisterClient::new(bus);

    // ========== Plain register access ==========
    println!("threshold = {}", client.read_register(THRESHOLD).unwrap());
    client.write_register(THRESHOLD, 300).unwrap();
    println!("threshold = {} after write", client.read_register(THRESHOLD).unwrap());

    // ========== Errors ==========
    let value = client.read_register(0x0080).unwrap();
    assert_eq!(value, READ_ADDRESS_ERROR);
    println!("\nunknown register reads {value:#010x}");

    match client.write_register(STATUS, 1) {
        Ok(()) => println!("write to status unexpectedly accepted"),
        Err(e) => println!("write to status refused: {e}"),
    }

    let flags = ErrorFlags::from_bits_truncate(client.read_register(PROTOCOL_STATUS).unwrap() as u8);
    for flag in flags.protocol_errors() {
        println!("  sticky flag: {flag}");
    }
    println!(
        "flags after drain: {:#x}",
        client.read_register(PROTOCOL_STATUS).unwrap()
    );

    // ========== Command handshake ==========
    println!("\nsubmitting apply command");
    client.write_register(COMMAND, CMD_APPLY).unwrap();
    let status = client
        .busy_wait(STATUS, BUSY, WaitPolicy::Attempts(10))
        .unwrap();
    println!("device idle, apply count {}", status & !BUSY);

    println!("\n=== Example Complete ===");
}
