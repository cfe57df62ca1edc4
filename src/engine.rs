use crate::{
    flags::{ErrorFlags, ProtocolError, ProtocolErrors},
    table::{RegisterDescriptor, RegisterTable},
    wire::{self, ADDRESS_LENGTH, DATA_LENGTH},
};

/// Returned for a read at an address that is not in the table.
pub const READ_ADDRESS_ERROR: u32 = 0xEEEE_EE00;

/// Returned for a read of a register without a read accessor.
pub const READ_OF_WRITE_ONLY: u32 = 0xEEEE_EE01;

/// Position of the engine within one bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Expecting the 2-byte address phase.
    WaitAddress,
    /// Addressed a writable register; either a read or a data phase may follow.
    WaitReadOrWrite,
    /// Streaming writes to consecutive writable registers.
    WaitWrite,
    /// Only reads are accepted until the next transaction.
    WaitRead,
    /// A protocol error occurred; the next written byte is refused.
    NackNextWrite,
}

/// Slave-side register protocol state machine.
///
/// Turns the address and data phases of a bus transaction into accessor
/// calls on the active [`RegisterTable`]. Protocol errors never abort a
/// transaction; they are recorded in the shared [`ProtocolErrors`]
/// accumulator until the host drains them.
///
/// The engine runs in bus-callback context and never blocks. Accessors
/// run outside the accumulator's critical sections.
pub struct ProtocolEngine<'a, C, const N: usize> {
    table: &'a RegisterTable<C, N>,
    context: &'a C,
    errors: &'a ProtocolErrors,
    phase: Phase,
    current_address: Option<u16>,
}

impl<'a, C, const N: usize> ProtocolEngine<'a, C, N> {
    pub fn new(table: &'a RegisterTable<C, N>, context: &'a C, errors: &'a ProtocolErrors) -> Self {
        Self {
            table,
            context,
            errors,
            phase: Phase::WaitAddress,
            current_address: None,
        }
    }

    /// Swaps the active table. Only valid between transactions.
    pub fn set_table(&mut self, table: &'a RegisterTable<C, N>) {
        self.table = table;
        self.reset();
    }

    /// Starts a new transaction.
    pub fn reset(&mut self) {
        self.phase = Phase::WaitAddress;
        self.current_address = None;
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current register address, or `None` when it is invalid.
    #[inline]
    pub fn current_address(&self) -> Option<u16> {
        self.current_address
    }

    #[inline]
    pub fn context(&self) -> &'a C {
        self.context
    }

    #[inline]
    pub fn table(&self) -> &'a RegisterTable<C, N> {
        self.table
    }

    /// Consumes one phase written by the host.
    pub fn data_in(&mut self, bytes: &[u8]) {
        match bytes.len() {
            ADDRESS_LENGTH => self.address_phase(bytes),
            DATA_LENGTH => self.data_phase(bytes),
            len => {
                warn!("phase of {} bytes rejected", len);
                self.fail(ProtocolError::PacketLength);
            }
        }
    }

    /// Serves one read requested by the host.
    ///
    /// Returns `false` when nothing was written to `out`: either the phase
    /// does not allow a read or `out` is not a data-phase buffer.
    pub fn data_out(&mut self, out: &mut [u8]) -> bool {
        if !matches!(self.phase, Phase::WaitReadOrWrite | Phase::WaitRead) {
            warn!("read refused in phase {:?}", self.phase);
            self.errors.raise(ProtocolError::ProtocolState);
            return false;
        }
        // Any read attempt closes the transaction to writes
        self.phase = Phase::WaitRead;
        if out.len() != DATA_LENGTH {
            warn!("read of {} bytes rejected", out.len());
            self.errors.raise(ProtocolError::PacketLength);
            return false;
        }

        let value = match self.current_address {
            None => READ_ADDRESS_ERROR,
            Some(address) => {
                self.current_address = address.checked_add(1);
                match self.table.lookup(address) {
                    None => READ_ADDRESS_ERROR,
                    Some(register) => register.read(self.context).unwrap_or(READ_OF_WRITE_ONLY),
                }
            }
        };

        out.copy_from_slice(&wire::encode_data(value));
        true
    }

    /// True when the next written byte must be refused.
    #[inline]
    pub fn should_nack(&self) -> bool {
        matches!(self.phase, Phase::NackNextWrite | Phase::WaitRead)
    }

    /// Returns the accumulated protocol errors and clears them.
    pub fn drain_error_flags(&self) -> ErrorFlags {
        self.errors.drain()
    }

    fn address_phase(&mut self, bytes: &[u8]) {
        if self.phase != Phase::WaitAddress {
            warn!("address phase in phase {:?}", self.phase);
            self.fail(ProtocolError::ProtocolState);
            return;
        }
        let Some(address) = wire::decode_address(bytes) else {
            self.fail(ProtocolError::PacketLength);
            return;
        };

        match self.table.lookup(address) {
            Some(register) => {
                self.current_address = Some(address);
                self.phase = if register.is_writable() {
                    Phase::WaitReadOrWrite
                } else {
                    Phase::WaitRead
                };
            }
            None => {
                debug!("unknown register {}", address);
                self.errors.raise(ProtocolError::Address);
                self.current_address = None;
                self.phase = Phase::WaitRead;
            }
        }
        trace!("address {} -> {:?}", address, self.phase);
    }

    fn data_phase(&mut self, bytes: &[u8]) {
        let Some(value) = wire::decode_data(bytes) else {
            self.fail(ProtocolError::PacketLength);
            return;
        };

        match self.phase {
            Phase::WaitReadOrWrite | Phase::WaitWrite => {
                let Some(register) = self.current_register() else {
                    self.fail(ProtocolError::Address);
                    return;
                };
                match register.write(self.context, value) {
                    Some(true) => self.advance_after_write(register.address()),
                    Some(false) => {
                        warn!("write of {} to {} rejected", value, register.address());
                        self.fail(ProtocolError::WriteFailed);
                    }
                    None => self.fail(ProtocolError::WriteToReadOnly),
                }
            }
            Phase::WaitRead => match self.current_register() {
                None => self.fail(ProtocolError::ProtocolState),
                Some(register) if !register.is_writable() => {
                    self.fail(ProtocolError::WriteToReadOnly)
                }
                // Writable, but a read already happened in this transaction
                Some(_) => self.fail(ProtocolError::ProtocolState),
            },
            Phase::WaitAddress | Phase::NackNextWrite => self.fail(ProtocolError::ProtocolState),
        }
    }

    fn current_register(&self) -> Option<RegisterDescriptor<C>> {
        self.current_address
            .and_then(|address| self.table.lookup(address))
            .copied()
    }

    fn advance_after_write(&mut self, address: u16) {
        self.current_address = address.checked_add(1);
        let next_writable = self
            .current_address
            .and_then(|next| self.table.lookup(next))
            .is_some_and(|register| register.is_writable());
        self.phase = if next_writable {
            Phase::WaitWrite
        } else {
            Phase::WaitRead
        };
        trace!("wrote {} -> {:?}", address, self.phase);
    }

    fn fail(&mut self, error: ProtocolError) {
        warn!("protocol error {:?} at {:?}", error, self.current_address);
        self.errors.raise(error);
        self.phase = Phase::NackNextWrite;
    }
}
