use heapless::Vec;

use crate::error::TableError;

/// Read accessor: produces the current 32-bit register value.
pub type ReadFn<C> = fn(&C) -> u32;

/// Write accessor: applies a 32-bit value, returning `false` if it was rejected.
pub type WriteFn<C> = fn(&C, u32) -> bool;

/// Associates a register address with its read and/or write accessor.
///
/// `C` is the application context handed to every accessor. Accessors only
/// get a shared reference, so any state they touch must use interior
/// mutability guarded by a critical section.
pub struct RegisterDescriptor<C> {
    address: u16,
    read: Option<ReadFn<C>>,
    write: Option<WriteFn<C>>,
}

impl<C> Clone for RegisterDescriptor<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for RegisterDescriptor<C> {}

impl<C> core::fmt::Debug for RegisterDescriptor<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterDescriptor")
            .field("address", &self.address)
            .field("readable", &self.read.is_some())
            .field("writable", &self.write.is_some())
            .finish()
    }
}

impl<C> RegisterDescriptor<C> {
    /// Creates a descriptor, rejecting one without any accessor.
    pub fn new(
        address: u16,
        read: Option<ReadFn<C>>,
        write: Option<WriteFn<C>>,
    ) -> Result<Self, TableError> {
        if read.is_none() && write.is_none() {
            return Err(TableError::NoAccessor(address));
        }
        Ok(Self {
            address,
            read,
            write,
        })
    }

    pub const fn read_only(address: u16, read: ReadFn<C>) -> Self {
        Self {
            address,
            read: Some(read),
            write: None,
        }
    }

    pub const fn write_only(address: u16, write: WriteFn<C>) -> Self {
        Self {
            address,
            read: None,
            write: Some(write),
        }
    }

    pub const fn read_write(address: u16, read: ReadFn<C>, write: WriteFn<C>) -> Self {
        Self {
            address,
            read: Some(read),
            write: Some(write),
        }
    }

    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.read.is_some()
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    /// Invokes the read accessor, or returns `None` for a write-only register.
    pub fn read(&self, context: &C) -> Option<u32> {
        self.read.map(|read| read(context))
    }

    /// Invokes the write accessor, or returns `None` for a read-only register.
    pub fn write(&self, context: &C, value: u32) -> Option<bool> {
        self.write.map(|write| write(context, value))
    }
}

/// Sparse, fixed-capacity set of register descriptors.
///
/// `N` is the maximum number of registers. The table is filled once at
/// startup and is read-only afterwards, so lookups need no locking.
pub struct RegisterTable<C, const N: usize> {
    registers: Vec<RegisterDescriptor<C>, N>,
}

impl<C, const N: usize> core::fmt::Debug for RegisterTable<C, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.registers.iter()).finish()
    }
}

impl<C, const N: usize> Default for RegisterTable<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, const N: usize> RegisterTable<C, N> {
    pub const fn new() -> Self {
        Self {
            registers: Vec::new(),
        }
    }

    pub fn builder() -> RegisterTableBuilder<C, N> {
        RegisterTableBuilder::new()
    }

    /// Builds a table from a list of descriptors.
    pub fn from_descriptors(descriptors: &[RegisterDescriptor<C>]) -> Result<Self, TableError> {
        let mut table = Self::new();
        for descriptor in descriptors {
            table.insert(*descriptor)?;
        }
        Ok(table)
    }

    /// Adds a descriptor. At most one descriptor may exist per address.
    pub fn insert(&mut self, descriptor: RegisterDescriptor<C>) -> Result<(), TableError> {
        if self.lookup(descriptor.address).is_some() {
            return Err(TableError::DuplicateAddress(descriptor.address));
        }
        self.registers
            .push(descriptor)
            .map_err(|_| TableError::TableFull)
    }

    /// Finds the descriptor for `address`.
    ///
    /// Addresses that are not explicitly enumerated return `None`, even when
    /// they fall numerically between two registers.
    pub fn lookup(&self, address: u16) -> Option<&RegisterDescriptor<C>> {
        self.registers.iter().find(|reg| reg.address == address)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor<C>> {
        self.registers.iter()
    }
}

/// Chained construction of a [`RegisterTable`].
///
/// The first failing insertion is remembered and reported by [`build`](Self::build).
pub struct RegisterTableBuilder<C, const N: usize> {
    table: RegisterTable<C, N>,
    error: Option<TableError>,
}

impl<C, const N: usize> Default for RegisterTableBuilder<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, const N: usize> RegisterTableBuilder<C, N> {
    pub const fn new() -> Self {
        Self {
            table: RegisterTable::new(),
            error: None,
        }
    }

    pub fn register(mut self, descriptor: RegisterDescriptor<C>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.table.insert(descriptor) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Hands the builder to `f`, for register groups assembled elsewhere.
    pub fn registers(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    pub fn read_only(self, address: u16, read: ReadFn<C>) -> Self {
        self.register(RegisterDescriptor::read_only(address, read))
    }

    pub fn write_only(self, address: u16, write: WriteFn<C>) -> Self {
        self.register(RegisterDescriptor::write_only(address, write))
    }

    pub fn read_write(self, address: u16, read: ReadFn<C>, write: WriteFn<C>) -> Self {
        self.register(RegisterDescriptor::read_write(address, read, write))
    }

    pub fn build(self) -> Result<RegisterTable<C, N>, TableError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.table),
        }
    }
}
