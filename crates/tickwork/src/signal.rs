//! # Signal Policy
//!
//! Maps process signals to shutdown behavior and forwards OS deliveries
//! into the engine's signal channel.
//!
//! | Policy   | Signals                                  | Exit code |
//! |----------|------------------------------------------|-----------|
//! | Graceful | HUP, INT, TERM                           | 0         |
//! | Forced   | QUIT, ILL, TRAP, ABRT, STKFLT, SYS       | -1        |
//! | Ignore   | everything else                          | -1, no close |
//!
//! SIGILL cannot be caught through `signal-hook`, so it is only handled
//! when a driver injects it by hand.

use std::fmt;
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver, Sender};

use crate::error::{EngineError, EngineResult};

/// A process signal as seen by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGHUP
    Hangup,
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// SIGILL
    IllegalInstruction,
    /// SIGTRAP
    Trap,
    /// SIGABRT
    Abort,
    /// SIGSTKFLT
    StackFault,
    /// SIGSYS
    BadSyscall,
    /// Any other signal, by raw number.
    Other(i32),
}

/// What the engine does when a signal arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Close normally.
    Graceful,
    /// Record a [`EngineError::ForcedShutdown`], then close.
    Forced,
    /// Log and keep running.
    Ignore,
}

#[cfg(target_os = "linux")]
const SIGSTKFLT: i32 = 16;

#[cfg(target_os = "linux")]
const fn is_stack_fault(raw: i32) -> bool {
    raw == SIGSTKFLT
}

#[cfg(not(target_os = "linux"))]
const fn is_stack_fault(_raw: i32) -> bool {
    false
}

impl Signal {
    /// Returns the shutdown policy for this signal.
    #[must_use]
    pub const fn policy(self) -> ShutdownPolicy {
        match self {
            Self::Hangup | Self::Interrupt | Self::Terminate => ShutdownPolicy::Graceful,
            Self::Quit
            | Self::IllegalInstruction
            | Self::Trap
            | Self::Abort
            | Self::StackFault
            | Self::BadSyscall => ShutdownPolicy::Forced,
            Self::Other(_) => ShutdownPolicy::Ignore,
        }
    }

    /// Maps a raw signal number.
    #[cfg(unix)]
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        use signal_hook::consts::signal::{
            SIGABRT, SIGHUP, SIGILL, SIGINT, SIGQUIT, SIGSYS, SIGTERM, SIGTRAP,
        };

        match raw {
            SIGHUP => Self::Hangup,
            SIGINT => Self::Interrupt,
            SIGTERM => Self::Terminate,
            SIGQUIT => Self::Quit,
            SIGILL => Self::IllegalInstruction,
            SIGTRAP => Self::Trap,
            SIGABRT => Self::Abort,
            SIGSYS => Self::BadSyscall,
            other if is_stack_fault(other) => Self::StackFault,
            other => Self::Other(other),
        }
    }

    /// Maps a raw signal number.
    #[cfg(not(unix))]
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        Self::Other(raw)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
            Self::IllegalInstruction => "SIGILL",
            Self::Trap => "SIGTRAP",
            Self::Abort => "SIGABRT",
            Self::StackFault => "SIGSTKFLT",
            Self::BadSyscall => "SIGSYS",
            Self::Other(raw) => return write!(f, "signal {raw}"),
        };
        f.write_str(name)
    }
}

/// Background thread moving OS signals into the engine.
///
/// Dropping it unregisters the handlers. The thread itself exits on its
/// own once the engine closes.
pub struct SignalForwarder {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    /// Returns true while the forwarding thread is alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    #[cfg(unix)]
    fn unregister(&self) {
        self.handle.close();
    }

    #[cfg(not(unix))]
    fn unregister(&self) {}
}

impl fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalForwarder")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.unregister();
        // Detached: the thread may be parked on a send the driver will
        // never take; it exits when the halt channel closes.
        drop(self.thread.take());
    }
}

/// Registers the catchable signals and starts forwarding them.
#[cfg(unix)]
pub(crate) fn forward(sender: Sender<Signal>, halt: Receiver<()>) -> EngineResult<SignalForwarder> {
    use signal_hook::consts::signal::{
        SIGABRT, SIGHUP, SIGINT, SIGQUIT, SIGSYS, SIGTERM, SIGTRAP,
    };
    use signal_hook::iterator::Signals;

    #[cfg(target_os = "linux")]
    let watched = [SIGHUP, SIGINT, SIGTERM, SIGQUIT, SIGTRAP, SIGABRT, SIGSTKFLT, SIGSYS];
    #[cfg(not(target_os = "linux"))]
    let watched = [SIGHUP, SIGINT, SIGTERM, SIGQUIT, SIGTRAP, SIGABRT, SIGSYS];

    let mut signals =
        Signals::new(watched).map_err(|err| EngineError::SignalSetup(err.to_string()))?;
    let handle = signals.handle();

    let thread = std::thread::Builder::new()
        .name("tickwork-signals".into())
        .spawn(move || {
            for raw in signals.forever() {
                let signal = Signal::from_raw(raw);
                tracing::debug!(%signal, "forwarding signal");
                let delivered = select! {
                    send(sender, signal) -> sent => sent.is_ok(),
                    recv(halt) -> _ => false,
                };
                if !delivered {
                    break;
                }
            }
        })
        .map_err(|err| EngineError::Spawn(err.to_string()))?;

    Ok(SignalForwarder {
        handle,
        thread: Some(thread),
    })
}

/// OS signal forwarding is only available on unix.
#[cfg(not(unix))]
pub(crate) fn forward(_sender: Sender<Signal>, _halt: Receiver<()>) -> EngineResult<SignalForwarder> {
    Err(EngineError::SignalSetup("unsupported platform".into()))
}
