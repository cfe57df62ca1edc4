//! Command/busy handshake.
//!
//! A write to the command register lands in a one-slot mailbox and marks the
//! device busy. The processing loop drains the mailbox, runs the command
//! outside the bus transaction, then clears busy. The host polls a status
//! register until busy is gone.
//!
//! ```text
//!   submit(cmd)        drain()             complete()
//! Idle ─────────▶ Accepted ─────────▶ Processing ─────────▶ Done
//!  ▲   busy=1, ready=0        pending=0          busy=0, ready=1   │
//!  └───────────────────────────────────────────────────────────────┘
//! ```

mod ready;

use core::cell::{Cell, RefCell};

use critical_section::Mutex;

pub use ready::{NoReadySignal, PinReadySignal, ReadyFlag, ReadySignal};

/// Reserved command value that resets the module, honored even after a fail-stop.
pub const RESET_MODULE: u32 = 0x5253_5421;

/// Observable state of a [`CommandChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeState {
    /// Nothing submitted since the last reset.
    Idle,
    /// A command waits in the mailbox.
    Accepted,
    /// The command was drained and is being executed.
    Processing,
    /// The last command completed.
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Mailbox {
    pending: u32,
    busy: bool,
    ready: bool,
    completed: bool,
}

impl Mailbox {
    const fn new() -> Self {
        Self {
            pending: 0,
            busy: false,
            ready: false,
            completed: false,
        }
    }
}

/// Single-outstanding-command mailbox shared between bus-callback context
/// and the processing loop.
///
/// A pending command is never overwritten: [`submit`](Self::submit) rejects
/// instead, which is the host's backpressure signal.
pub struct CommandChannel<R: ReadySignal> {
    mailbox: Mutex<Cell<Mailbox>>,
    signal: Mutex<RefCell<R>>,
}

impl<R: ReadySignal + Default> Default for CommandChannel<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<R: ReadySignal> CommandChannel<R> {
    pub const fn new(signal: R) -> Self {
        Self {
            mailbox: Mutex::new(Cell::new(Mailbox::new())),
            signal: Mutex::new(RefCell::new(signal)),
        }
    }

    /// Accepts `command` if the mailbox is empty.
    ///
    /// On success the device is busy and the ready signal is low. `0` means
    /// "empty" and is always rejected.
    pub fn submit(&self, command: u32) -> bool {
        if command == 0 {
            warn!("command 0 rejected");
            return false;
        }
        let accepted = critical_section::with(|cs| {
            let cell = self.mailbox.borrow(cs);
            let mut mailbox = cell.get();
            if mailbox.pending != 0 {
                return false;
            }
            mailbox.pending = command;
            mailbox.busy = true;
            mailbox.ready = false;
            mailbox.completed = false;
            cell.set(mailbox);
            self.signal.borrow_ref_mut(cs).set_ready(false);
            true
        });
        if accepted {
            debug!("command {} accepted", command);
        } else {
            warn!("command {} rejected, mailbox full", command);
        }
        accepted
    }

    /// Takes the pending command, leaving busy untouched.
    pub fn drain(&self) -> Option<u32> {
        critical_section::with(|cs| {
            let cell = self.mailbox.borrow(cs);
            let mut mailbox = cell.get();
            let command = mailbox.pending;
            mailbox.pending = 0;
            cell.set(mailbox);
            (command != 0).then_some(command)
        })
    }

    /// Clears busy and raises the ready signal.
    pub fn complete(&self) {
        critical_section::with(|cs| {
            let cell = self.mailbox.borrow(cs);
            let mut mailbox = cell.get();
            mailbox.busy = false;
            mailbox.ready = true;
            mailbox.completed = true;
            cell.set(mailbox);
            self.signal.borrow_ref_mut(cs).set_ready(true);
        });
    }

    /// Raises the ready signal if nothing is pending.
    ///
    /// The check and the raise happen in one critical section so a command
    /// submitted concurrently is never reported as ready.
    pub fn idle(&self) -> bool {
        critical_section::with(|cs| {
            let cell = self.mailbox.borrow(cs);
            let mut mailbox = cell.get();
            if mailbox.pending != 0 {
                return false;
            }
            mailbox.ready = true;
            cell.set(mailbox);
            self.signal.borrow_ref_mut(cs).set_ready(true);
            true
        })
    }

    pub fn is_busy(&self) -> bool {
        critical_section::with(|cs| self.mailbox.borrow(cs).get().busy)
    }

    pub fn is_ready(&self) -> bool {
        critical_section::with(|cs| self.mailbox.borrow(cs).get().ready)
    }

    pub fn state(&self) -> HandshakeState {
        let mailbox = critical_section::with(|cs| self.mailbox.borrow(cs).get());
        if mailbox.pending != 0 {
            HandshakeState::Accepted
        } else if mailbox.busy {
            HandshakeState::Processing
        } else if mailbox.completed {
            HandshakeState::Done
        } else {
            HandshakeState::Idle
        }
    }

    /// Forgets any pending command and busy state. Ready stays low until the
    /// next [`idle`](Self::idle) or [`complete`](Self::complete).
    pub fn reset(&self) {
        critical_section::with(|cs| {
            self.mailbox.borrow(cs).set(Mailbox::new());
            self.signal.borrow_ref_mut(cs).set_ready(false);
        });
    }

    /// Runs `f` with the ready signal.
    pub fn with_signal<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        critical_section::with(|cs| {
            let mut signal = self.signal.borrow_ref_mut(cs);
            f(&mut *signal)
        })
    }
}

/// Application side of the handshake: executes drained commands.
pub trait CommandHandler {
    /// Executes one command. Runs outside any critical section.
    fn handle(&mut self, command: u32);

    /// True once an unrecoverable error was recorded. All commands except
    /// [`RESET_MODULE`] are then ignored.
    fn is_fail_stopped(&self) -> bool {
        false
    }

    /// Reinitializes the application after [`RESET_MODULE`].
    fn reset_module(&mut self);
}

/// Outcome of one processing-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Serviced {
    /// Mailbox was empty; ready was raised.
    Idle,
    /// The module was reset.
    Reset,
    /// Command dropped because the handler is fail-stopped. Busy stays set.
    Ignored(u32),
    /// Command executed and busy cleared.
    Completed(u32),
}

/// One iteration of the device processing loop.
pub fn service<R, H>(channel: &CommandChannel<R>, handler: &mut H) -> Serviced
where
    R: ReadySignal,
    H: CommandHandler + ?Sized,
{
    match channel.drain() {
        None => {
            channel.idle();
            Serviced::Idle
        }
        Some(command) => service_command(channel, handler, command),
    }
}

/// Dispatches a command already taken from `channel`.
pub fn service_command<R, H>(channel: &CommandChannel<R>, handler: &mut H, command: u32) -> Serviced
where
    R: ReadySignal,
    H: CommandHandler + ?Sized,
{
    if command == RESET_MODULE {
        info!("module reset");
        handler.reset_module();
        channel.reset();
        return Serviced::Reset;
    }
    if handler.is_fail_stopped() {
        warn!("command {} ignored, fail-stopped", command);
        return Serviced::Ignored(command);
    }
    handler.handle(command);
    channel.complete();
    Serviced::Completed(command)
}
