use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::wire::{self, DATA_LENGTH};

/// 7-bit bus address the module answers on unless reconfigured.
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x52;

/// How long [`RegisterClient::busy_wait`] keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitPolicy {
    /// Poll until the busy bit clears, however long that takes.
    #[default]
    Unbounded,
    /// Give up with [`ClientError::Timeout`] after this many polls.
    Attempts(u32),
}

/// Host-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError<E> {
    /// The bus transfer failed (NACK, arbitration loss, ...).
    Bus(E),
    /// The busy bit was still set when the wait policy ran out.
    Timeout,
}

impl<E: core::fmt::Debug> core::fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClientError::Bus(e) => write!(f, "bus error: {e:?}"),
            ClientError::Timeout => write!(f, "device still busy after wait limit"),
        }
    }
}

/// Drives the register protocol from the bus master side.
///
/// Every access is one address phase followed by one data phase, so register
/// values never depend on state left over from a previous transaction.
pub struct RegisterClient<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> RegisterClient<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_DEVICE_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Writes `value` to `register` in a single 6-byte transfer.
    pub fn write_register(&mut self, register: u16, value: u32) -> Result<(), ClientError<I2C::Error>> {
        self.i2c
            .write(self.address, &wire::encode_write(register, value))
            .map_err(ClientError::Bus)
    }

    /// Sends the address phase, then reads one data phase under a repeated start.
    pub fn read_register(&mut self, register: u16) -> Result<u32, ClientError<I2C::Error>> {
        let mut data = [0u8; DATA_LENGTH];
        self.i2c
            .write_read(self.address, &wire::encode_address(register), &mut data)
            .map_err(ClientError::Bus)?;
        Ok(u32::from_be_bytes(data))
    }

    /// Reads consecutive registers starting at `register` in one transfer.
    ///
    /// Relies on the device auto-incrementing after each read. Registers
    /// missing from the device table come back as the read-address sentinel.
    pub fn read_registers(
        &mut self,
        register: u16,
        values: &mut [u32],
    ) -> Result<(), ClientError<I2C::Error>> {
        const CHUNK: usize = 8;
        let mut address = register;
        // Each chunk re-sends its start address; increment state does not
        // survive the end of a transaction
        for chunk in values.chunks_mut(CHUNK) {
            let mut data = [0u8; CHUNK * DATA_LENGTH];
            let data = &mut data[..chunk.len() * DATA_LENGTH];
            self.i2c
                .write_read(self.address, &wire::encode_address(address), data)
                .map_err(ClientError::Bus)?;
            for (value, bytes) in chunk.iter_mut().zip(data.chunks_exact(DATA_LENGTH)) {
                *value = wire::decode_data(bytes).unwrap_or_default();
            }
            address = address.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    /// Polls `status_register` until every bit in `busy_mask` is clear.
    ///
    /// Returns the final status word so the caller can check error bits.
    pub fn busy_wait(
        &mut self,
        status_register: u16,
        busy_mask: u32,
        policy: WaitPolicy,
    ) -> Result<u32, ClientError<I2C::Error>> {
        self.poll_until_idle(status_register, busy_mask, policy, || {})
    }

    /// Like [`busy_wait`](Self::busy_wait), pausing `interval_us` between polls.
    pub fn busy_wait_with_delay<D: DelayNs>(
        &mut self,
        status_register: u16,
        busy_mask: u32,
        policy: WaitPolicy,
        delay: &mut D,
        interval_us: u32,
    ) -> Result<u32, ClientError<I2C::Error>> {
        self.poll_until_idle(status_register, busy_mask, policy, || {
            delay.delay_us(interval_us)
        })
    }

    fn poll_until_idle(
        &mut self,
        status_register: u16,
        busy_mask: u32,
        policy: WaitPolicy,
        mut pause: impl FnMut(),
    ) -> Result<u32, ClientError<I2C::Error>> {
        let mut attempts: u32 = 0;
        loop {
            let status = self.read_register(status_register)?;
            if status & busy_mask == 0 {
                trace!("idle after {} polls", attempts + 1);
                return Ok(status);
            }
            attempts = attempts.saturating_add(1);
            if let WaitPolicy::Attempts(limit) = policy {
                if attempts >= limit {
                    warn!("busy wait gave up after {} polls", attempts);
                    return Err(ClientError::Timeout);
                }
            }
            pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{ProtocolEngine, READ_ADDRESS_ERROR, READ_OF_WRITE_ONLY},
        flags::ProtocolError,
        handshake::{self, HandshakeState},
        loopback::LoopbackBus,
        test_support::{
            BUSY_BIT, COMMAND, CONFIG_END, CONFIG_START, PROTOCOL_STATUS, STATUS, TestContext,
            TestHandler, VERSION, test_table,
        },
    };
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

    #[test]
    fn write_then_read_over_the_bus() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        client.write_register(CONFIG_START, 300).unwrap();
        assert_eq!(client.read_register(CONFIG_START).unwrap(), 300);
        assert_eq!(client.read_register(VERSION).unwrap(), 0x0001_0203);
        assert_eq!(client.read_register(PROTOCOL_STATUS).unwrap(), 0);
    }

    #[test]
    fn unknown_register_reads_sentinel_and_flags_address() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        assert_eq!(client.read_register(0x0080).unwrap(), READ_ADDRESS_ERROR);
        assert_eq!(
            client.read_register(PROTOCOL_STATUS).unwrap(),
            ProtocolError::Address.mask() as u32
        );
        assert_eq!(client.read_register(PROTOCOL_STATUS).unwrap(), 0);
    }

    #[test]
    fn write_to_read_only_register_is_nacked() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        assert_eq!(
            client.write_register(STATUS, 1),
            Err(ClientError::Bus(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Data
            )))
        );
        assert_eq!(
            client.read_register(PROTOCOL_STATUS).unwrap(),
            ProtocolError::WriteToReadOnly.mask() as u32
        );
    }

    #[test]
    fn wrong_device_address_is_nacked() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::with_address(bus, 0x10);

        assert_eq!(
            client.read_register(STATUS),
            Err(ClientError::Bus(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address
            )))
        );
    }

    #[test]
    fn read_registers_uses_auto_increment() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        let mut values = [0u32; 4];
        client.read_registers(CONFIG_START, &mut values).unwrap();
        assert_eq!(values, [250, 3000, 2750, READ_ADDRESS_ERROR]);
        assert_eq!(client.read_register(CONFIG_END).unwrap(), 3000);
    }

    #[test]
    fn read_registers_continues_past_gaps() {
        let ctx = TestContext::new();
        let table = crate::test_support::TestTable::builder()
            .read_only(0x10, |_| 1)
            .write_only(0x11, |_, _| true)
            .read_only(0x13, |_| 4)
            .build()
            .unwrap();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        let mut values = [0u32; 4];
        client.read_registers(0x10, &mut values).unwrap();
        assert_eq!(values, [1, READ_OF_WRITE_ONLY, READ_ADDRESS_ERROR, 4]);
        assert!(ctx.errors.peek().is_empty());
    }

    #[test]
    fn busy_wait_times_out_when_nothing_services_commands() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        client.write_register(COMMAND, 3).unwrap();
        assert_eq!(
            client.busy_wait(STATUS, BUSY_BIT, WaitPolicy::Attempts(5)),
            Err(ClientError::Timeout)
        );
        assert_eq!(ctx.channel.state(), HandshakeState::Accepted);
    }

    #[test]
    fn busy_wait_with_delay_pauses_between_polls() {
        struct CountingDelay(u32);
        impl DelayNs for CountingDelay {
            fn delay_ns(&mut self, _ns: u32) {
                self.0 += 1;
            }
        }

        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);
        let mut delay = CountingDelay(0);

        client.write_register(COMMAND, 3).unwrap();
        let result =
            client.busy_wait_with_delay(STATUS, BUSY_BIT, WaitPolicy::Attempts(3), &mut delay, 100);
        assert_eq!(result, Err(ClientError::Timeout));
        assert_eq!(delay.0, 2);
    }

    #[test]
    fn end_to_end_apply_configuration() {
        let ctx = TestContext::new();
        let table = test_table();
        let mut handler = TestHandler::new(&ctx);
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors))
            .with_idle_hook(|| {
                handshake::service(&ctx.channel, &mut handler);
            });
        let mut client = RegisterClient::new(bus);

        client.write_register(CONFIG_START, 300).unwrap();
        assert_eq!(client.read_register(CONFIG_START).unwrap(), 300);

        // The processing loop runs after this transaction and completes the command
        client.write_register(COMMAND, 3).unwrap();

        let status = client
            .busy_wait(STATUS, BUSY_BIT, WaitPolicy::Attempts(2))
            .unwrap();
        assert_eq!(status & BUSY_BIT, 0);
        assert_eq!(ctx.applied(), 1);
        assert_eq!(ctx.applied_start(), 300);
        assert_eq!(client.read_register(PROTOCOL_STATUS).unwrap(), 0);
    }

    #[test]
    fn second_command_while_pending_fails_the_write() {
        let ctx = TestContext::new();
        let table = test_table();
        let bus = LoopbackBus::new(ProtocolEngine::new(&table, &ctx, &ctx.errors));
        let mut client = RegisterClient::new(bus);

        client.write_register(COMMAND, 3).unwrap();
        client.write_register(COMMAND, 4).unwrap();

        assert_eq!(
            client.read_register(PROTOCOL_STATUS).unwrap(),
            ProtocolError::WriteFailed.mask() as u32
        );
        assert_eq!(ctx.channel.drain(), Some(3));
    }
}
