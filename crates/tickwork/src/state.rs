//! # Run State
//!
//! Lock-free flags shared between the driver and the run loop thread.
//!
//! ```text
//!   Idle ──run()──> Running <──unpause── Locked
//!                     │  └────pause──────^
//!                     ├──restart──> Restarting ──> Running
//!                     └──kill / end tick / close──> Killing
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::engine::Engine;

/// Where the run loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Built but not started.
    Idle = 0,
    /// Ticking and updating the world.
    Running = 1,
    /// Ticking, but world updates are skipped.
    Locked = 2,
    /// Resetting simulated time and frame stats.
    Restarting = 3,
    /// Stopping; no further updates will run.
    Killing = 4,
}

impl Phase {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Locked,
            3 => Self::Restarting,
            4 => Self::Killing,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Locked => "locked",
            Self::Restarting => "restarting",
            Self::Killing => "killing",
        };
        f.write_str(name)
    }
}

/// Runs once when the engine closes, in registration order.
pub type CloseHook = Box<dyn Fn(&Engine) + Send + Sync>;

/// Logs the last simulated time reached.
pub(crate) fn default_close_hook() -> CloseHook {
    Box::new(|engine: &Engine| {
        engine
            .logger()
            .printf(format_args!("last tick: {:.6}", engine.last_tick()));
    })
}

/// Flags read by the run loop at every tick boundary.
#[derive(Debug)]
pub(crate) struct State {
    debug: AtomicBool,
    locked: AtomicBool,
    restart: AtomicBool,
    kill: AtomicBool,
    phase: AtomicU8,
    /// `f64` bits of the last simulated time.
    last_tick: AtomicU64,
}

impl State {
    pub(crate) fn new(debug: bool) -> Self {
        Self {
            debug: AtomicBool::new(debug),
            locked: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            kill: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Idle as u8),
            last_tick: AtomicU64::new(0f64.to_bits()),
        }
    }

    #[inline]
    pub(crate) fn pause(&self) {
        self.locked.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn unpause(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    /// Consumes a pending restart request.
    #[inline]
    pub(crate) fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn kill(&self) {
        self.kill.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_killed(&self) -> bool {
        self.kill.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn last_tick(&self) -> f64 {
        f64::from_bits(self.last_tick.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_last_tick(&self, value: f64) {
        self.last_tick.store(value.to_bits(), Ordering::Release);
    }
}
