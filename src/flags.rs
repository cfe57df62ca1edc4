use core::cell::Cell;

use bitflags::bitflags;
use critical_section::Mutex;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A single protocol-level error condition.
///
/// The discriminant is the bit index in the protocol status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ProtocolError {
    /// A phase arrived in a state that does not accept it.
    ProtocolState = 0,
    /// A phase had neither the address nor the data length.
    PacketLength = 1,
    /// The addressed register is not in the table.
    Address = 2,
    /// The write accessor rejected the value.
    WriteFailed = 3,
    /// A data phase targeted a register without a write accessor.
    WriteToReadOnly = 4,
}

impl ProtocolError {
    pub const ALL: [ProtocolError; 5] = [
        ProtocolError::ProtocolState,
        ProtocolError::PacketLength,
        ProtocolError::Address,
        ProtocolError::WriteFailed,
        ProtocolError::WriteToReadOnly,
    ];

    /// The flag this error sets in the status word.
    pub const fn flag(self) -> ErrorFlags {
        match self {
            ProtocolError::ProtocolState => ErrorFlags::PROTOCOL_STATE,
            ProtocolError::PacketLength => ErrorFlags::PACKET_LENGTH,
            ProtocolError::Address => ErrorFlags::ADDRESS,
            ProtocolError::WriteFailed => ErrorFlags::WRITE_FAILED,
            ProtocolError::WriteToReadOnly => ErrorFlags::WRITE_TO_READ_ONLY,
        }
    }

    #[inline]
    pub const fn mask(self) -> u8 {
        self.flag().bits()
    }
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::ProtocolState => write!(f, "phase not valid in current protocol state"),
            ProtocolError::PacketLength => write!(f, "phase length is neither address nor data"),
            ProtocolError::Address => write!(f, "register address not in table"),
            ProtocolError::WriteFailed => write!(f, "register write rejected"),
            ProtocolError::WriteToReadOnly => write!(f, "write to read-only register"),
        }
    }
}

bitflags! {
    /// Protocol status word: one bit per [`ProtocolError`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u8 {
        const PROTOCOL_STATE = 1 << 0;
        const PACKET_LENGTH = 1 << 1;
        const ADDRESS = 1 << 2;
        const WRITE_FAILED = 1 << 3;
        const WRITE_TO_READ_ONLY = 1 << 4;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ErrorFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ErrorFlags({=u8:#x})", self.bits());
    }
}

impl ErrorFlags {
    /// The contained errors in bit order.
    pub fn protocol_errors(self) -> impl Iterator<Item = ProtocolError> {
        ProtocolError::ALL
            .into_iter()
            .filter(move |error| self.contains(error.flag()))
    }
}

impl From<ProtocolError> for ErrorFlags {
    fn from(error: ProtocolError) -> Self {
        error.flag()
    }
}

impl core::ops::BitOr<ProtocolError> for ErrorFlags {
    type Output = ErrorFlags;

    fn bitor(self, rhs: ProtocolError) -> ErrorFlags {
        self | rhs.flag()
    }
}

/// Sticky accumulator for protocol errors.
///
/// Raised from bus-callback context and drained by the host through a status
/// register, so every access runs inside a short critical section.
pub struct ProtocolErrors {
    flags: Mutex<Cell<ErrorFlags>>,
}

impl Default for ProtocolErrors {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolErrors {
    pub const fn new() -> Self {
        Self {
            flags: Mutex::new(Cell::new(ErrorFlags::empty())),
        }
    }

    /// ORs `flag` into the accumulated set.
    pub fn raise(&self, flag: ProtocolError) {
        critical_section::with(|cs| {
            let cell = self.flags.borrow(cs);
            cell.set(cell.get() | flag);
        });
    }

    /// Returns the accumulated set and clears it.
    pub fn drain(&self) -> ErrorFlags {
        critical_section::with(|cs| self.flags.borrow(cs).replace(ErrorFlags::empty()))
    }

    /// Returns the accumulated set without clearing it.
    pub fn peek(&self) -> ErrorFlags {
        critical_section::with(|cs| self.flags.borrow(cs).get())
    }
}
