use embedded_hal::digital::OutputPin;

/// Output telling the host whether a new bus transaction may start.
///
/// Driven from inside critical sections, so implementations must be quick
/// and must not block.
pub trait ReadySignal {
    fn set_ready(&mut self, ready: bool);
}

/// For devices without a ready line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReadySignal;

impl ReadySignal for NoReadySignal {
    fn set_ready(&mut self, _ready: bool) {}
}

/// Records the signal level, for firmware that mirrors it elsewhere.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadyFlag {
    ready: bool,
    transitions: u32,
}

impl ReadyFlag {
    pub const fn new() -> Self {
        Self {
            ready: false,
            transitions: 0,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of level changes seen so far.
    #[inline]
    pub fn transitions(&self) -> u32 {
        self.transitions
    }
}

impl ReadySignal for ReadyFlag {
    fn set_ready(&mut self, ready: bool) {
        if self.ready != ready {
            self.transitions = self.transitions.wrapping_add(1);
        }
        self.ready = ready;
    }
}

/// Drives a GPIO: high means ready.
pub struct PinReadySignal<P: OutputPin> {
    pin: P,
}

impl<P: OutputPin> PinReadySignal<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> ReadySignal for PinReadySignal<P> {
    fn set_ready(&mut self, ready: bool) {
        let result = if ready {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("ready pin update failed");
        }
    }
}
