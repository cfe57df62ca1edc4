/// Errors that can occur while building a register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// Another descriptor already claims this address.
    DuplicateAddress(u16),
    /// Descriptor has neither a read nor a write accessor.
    NoAccessor(u16),
    /// Table capacity exceeded.
    TableFull,
}

impl core::fmt::Display for TableError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TableError::DuplicateAddress(addr) => {
                write!(f, "register {addr:#06x} is already in the table")
            }
            TableError::NoAccessor(addr) => {
                write!(f, "register {addr:#06x} has no read or write accessor")
            }
            TableError::TableFull => write!(f, "register table capacity exceeded"),
        }
    }
}
