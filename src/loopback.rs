//! In-process bus target for host-side testing and simulation.
//!
//! [`LoopbackBus`] implements [`embedded_hal::i2c::I2c`] by feeding every
//! transfer straight into a [`ProtocolEngine`], following the same callback
//! order the device's slave driver uses. A [`RegisterClient`](crate::client::RegisterClient)
//! can then talk to a device table without hardware.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::{
    client::DEFAULT_DEVICE_ADDRESS,
    engine::ProtocolEngine,
    wire::{ADDRESS_LENGTH, DATA_LENGTH},
};

fn no_idle_hook() {}

/// Collects written bytes into address/data phases.
struct PhaseAssembler {
    buf: [u8; DATA_LENGTH],
    fill: usize,
    addressed: bool,
}

impl PhaseAssembler {
    const fn new() -> Self {
        Self {
            buf: [0; DATA_LENGTH],
            fill: 0,
            addressed: false,
        }
    }

    fn expected(&self) -> usize {
        if self.addressed {
            DATA_LENGTH
        } else {
            ADDRESS_LENGTH
        }
    }

    /// Pushes one byte. Returns the phase when it is complete.
    fn push(&mut self, byte: u8) -> Option<&[u8]> {
        self.buf[self.fill] = byte;
        self.fill += 1;
        if self.fill < self.expected() {
            return None;
        }
        let len = self.fill;
        self.fill = 0;
        self.addressed = true;
        Some(&self.buf[..len])
    }

    /// Returns an incomplete trailing phase, if any.
    fn remainder(&mut self) -> Option<&[u8]> {
        if self.fill == 0 {
            return None;
        }
        let len = self.fill;
        self.fill = 0;
        Some(&self.buf[..len])
    }
}

/// An I2C bus with exactly one device on it: a [`ProtocolEngine`].
///
/// After every transaction the idle hook runs, standing in for one
/// iteration of the device's processing loop.
pub struct LoopbackBus<'a, C, const N: usize, H = fn()> {
    engine: ProtocolEngine<'a, C, N>,
    address: u8,
    idle_hook: H,
}

impl<'a, C, const N: usize> LoopbackBus<'a, C, N> {
    pub fn new(engine: ProtocolEngine<'a, C, N>) -> Self {
        Self {
            engine,
            address: DEFAULT_DEVICE_ADDRESS,
            idle_hook: no_idle_hook,
        }
    }
}

impl<'a, C, const N: usize, H: FnMut()> LoopbackBus<'a, C, N, H> {
    /// Answers on `address` instead of the default.
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Runs `hook` after every transaction.
    pub fn with_idle_hook<H2: FnMut()>(self, hook: H2) -> LoopbackBus<'a, C, N, H2> {
        LoopbackBus {
            engine: self.engine,
            address: self.address,
            idle_hook: hook,
        }
    }

    pub fn engine(&self) -> &ProtocolEngine<'a, C, N> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProtocolEngine<'a, C, N> {
        &mut self.engine
    }

    fn run(&mut self, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        let mut phases = PhaseAssembler::new();
        let mut writing: Option<bool> = None;

        for operation in operations.iter_mut() {
            let is_write = matches!(operation, Operation::Write(_));
            // Adjacent operations of the same kind share one address match
            if writing != Some(is_write) {
                if writing == Some(true) {
                    self.flush(&mut phases)?;
                }
                if is_write {
                    self.engine.reset();
                    phases = PhaseAssembler::new();
                }
                writing = Some(is_write);
            }

            match operation {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        if let Some(phase) = phases.push(byte) {
                            Self::deliver(&mut self.engine, phase)?;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for chunk in buffer.chunks_mut(DATA_LENGTH) {
                        if chunk.len() == DATA_LENGTH {
                            self.engine.data_out(chunk);
                        } else {
                            let mut word = [0u8; DATA_LENGTH];
                            self.engine.data_out(&mut word);
                            let len = chunk.len();
                            chunk.copy_from_slice(&word[..len]);
                        }
                    }
                }
            }
        }

        if writing == Some(true) {
            self.flush(&mut phases)?;
        }
        Ok(())
    }

    fn flush(&mut self, phases: &mut PhaseAssembler) -> Result<(), ErrorKind> {
        match phases.remainder() {
            Some(phase) => Self::deliver(&mut self.engine, phase),
            None => Ok(()),
        }
    }

    /// Hands a phase to the engine. A phase that arrives while the engine
    /// refuses writes is still recorded, then NACKed.
    fn deliver(engine: &mut ProtocolEngine<'a, C, N>, phase: &[u8]) -> Result<(), ErrorKind> {
        let refuse = engine.should_nack();
        engine.data_in(phase);
        if refuse {
            trace!("phase nacked");
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }
        Ok(())
    }
}

impl<C, const N: usize, H> ErrorType for LoopbackBus<'_, C, N, H> {
    type Error = ErrorKind;
}

impl<C, const N: usize, H: FnMut()> I2c for LoopbackBus<'_, C, N, H> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = if address == self.address {
            self.run(operations)
        } else {
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        };
        (self.idle_hook)();
        result
    }
}
