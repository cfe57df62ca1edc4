//! A `no_std`, no-alloc register access protocol for I2C sensor modules.
//!
//! The host reads and writes 32-bit registers through 2-byte address and
//! 4-byte data phases. Long-running device operations are started through a
//! command register and observed through a busy bit, so the bus is never
//! held while the device works.
//!
//! # Features
//!
//! - **Zero heap allocation** - Tables and state are statically sized
//! - **Sparse register tables** - Function-pointer accessors per address
//! - **Sticky error flags** - Framing errors accumulate until the host drains them
//! - **Command/busy handshake** - One outstanding command, ready signal, fail-stop
//! - **Host client** - Register access and bounded busy-wait over `embedded-hal` I2C
//! - **Detector applications** - Distance and presence register maps over the same engine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  address/data  ┌──────────────────────────┐
//! │  Host            │     phases     │  Device (bus callback)   │
//! │                  │───────────────▶│                          │
//! │  RegisterClient  │                │  ProtocolEngine          │
//! │  busy_wait()     │◀───────────────│   └▶ RegisterTable       │
//! │                  │  values, NACK  │        └▶ accessors      │
//! └──────────────────┘                │             │ submit()   │
//!                                     │             ▼            │
//!                                     │  CommandChannel          │
//!                                     │             │ drain()    │
//!                                     │  Device (processing loop)│
//!                                     │  service() ─▶ handler    │
//!                                     └──────────────────────────┘
//! ```
//!
//! - **Bus callbacks** run the [`ProtocolEngine`](engine::ProtocolEngine) to completion; they never block
//! - **Command writes** only land in the mailbox; the processing loop does the work
//! - **Shared state** is guarded by `critical-section` mutexes
//!
//! # Example
//!
//! ```rust,no_run
//! use embedded_regproto::prelude::*;
//!
//! struct Device {
//!     errors: ProtocolErrors,
//!     channel: CommandChannel<NoReadySignal>,
//! }
//!
//! fn read_status(dev: &Device) -> u32 {
//!     if dev.channel.is_busy() { 1 << 31 } else { 0 }
//! }
//!
//! fn write_command(dev: &Device, value: u32) -> bool {
//!     dev.channel.submit(value)
//! }
//!
//! let device = Device {
//!     errors: ProtocolErrors::new(),
//!     channel: CommandChannel::new(NoReadySignal),
//! };
//! let table = RegisterTable::<Device, 4>::builder()
//!     .read_only(0x0000, read_status)
//!     .write_only(0x0100, write_command)
//!     .build()
//!     .unwrap();
//!
//! // Host side, talking to the device through an in-process bus
//! let bus = LoopbackBus::new(ProtocolEngine::new(&table, &device, &device.errors));
//! let mut client = RegisterClient::new(bus);
//! client.write_register(0x0100, 3).unwrap();
//! assert!(client.busy_wait(0x0000, 1 << 31, WaitPolicy::Attempts(3)).is_err());
//! ```

#![deny(unsafe_code)]
#![no_std]

#[macro_use]
mod fmt;

pub mod client;
pub mod distance;
pub mod engine;
pub mod error;
pub mod flags;
pub mod handshake;
pub mod loopback;
pub mod presence;
pub mod scale;
pub mod table;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use client::{ClientError, DEFAULT_DEVICE_ADDRESS, RegisterClient, WaitPolicy};
pub use engine::{Phase, ProtocolEngine, READ_ADDRESS_ERROR, READ_OF_WRITE_ONLY};
pub use error::TableError;
pub use flags::{ErrorFlags, ProtocolError, ProtocolErrors};
pub use handshake::{
    CommandChannel, CommandHandler, HandshakeState, NoReadySignal, PinReadySignal, RESET_MODULE,
    ReadyFlag, ReadySignal, Serviced,
};
pub use loopback::LoopbackBus;
pub use table::{RegisterDescriptor, RegisterTable, RegisterTableBuilder};
pub use wire::{ADDRESS_LENGTH, DATA_LENGTH};

pub mod prelude {
    pub use crate::client::{ClientError, RegisterClient, WaitPolicy};
    pub use crate::engine::{Phase, ProtocolEngine};
    pub use crate::error::TableError;
    pub use crate::flags::{ErrorFlags, ProtocolError, ProtocolErrors};
    pub use crate::handshake::{
        CommandChannel, CommandHandler, NoReadySignal, ReadyFlag, ReadySignal, Serviced,
        service,
    };
    pub use crate::loopback::LoopbackBus;
    pub use crate::table::{RegisterDescriptor, RegisterTable};
}
