//! # Run Loops
//!
//! The thread that advances simulated time and updates the world. Three
//! variants share one per-tick protocol:
//!
//! ```text
//! wait ──> step += incr ──> kill?    ──> send kill token, stop
//!                      ├──> locked?  ──> skip update
//!                      ├──> restart? ──> reset step/frame (instrumented)
//!                      └──> [pre] world.update(dt) [post]
//!          last_tick = step ──> end reached? ──> pause, send kill token, stop
//! ```
//!
//! Every blocking point also watches the halt channel, which the engine
//! closes on shutdown, so the loop never outlives `close`.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{select, tick, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tickwork_core::{Frame, Step, World};

use crate::engine::EngineHandle;
use crate::logger::Logger;
use crate::settings::Settings;
use crate::state::Phase;

/// Which run loop the engine drives the world with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    /// One tick per `tick_duration`.
    #[default]
    Gated,
    /// Ticks back to back. `tick_duration` is ignored.
    Unthrottled,
    /// Gated, plus restart support, frame timing and step/FPS reports.
    Instrumented,
}

impl LoopKind {
    pub(crate) fn build(self) -> Box<dyn RunLoop> {
        match self {
            Self::Gated => Box::new(GatedLoop),
            Self::Unthrottled => Box::new(UnthrottledLoop),
            Self::Instrumented => Box::new(InstrumentedLoop),
        }
    }
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gated => "gated",
            Self::Unthrottled => "unthrottled",
            Self::Instrumented => "instrumented",
        };
        f.write_str(name)
    }
}

/// Sending halves of the per-update rendezvous.
#[derive(Clone, Debug)]
pub(crate) struct HandshakeSenders {
    pub(crate) pre: Sender<u64>,
    pub(crate) post: Sender<u64>,
}

/// A run loop body. Consumes itself; returns when the loop stops.
pub(crate) trait RunLoop: Send {
    fn run(self: Box<Self>, ctx: LoopContext);
}

/// Outcome of the start-of-tick checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admission {
    Update,
    Skip,
    Restart,
    Terminate,
}

#[derive(Clone, Copy)]
enum Gate {
    Pre,
    Post,
}

/// Everything the loop thread needs from the engine.
pub(crate) struct LoopContext {
    handle: EngineHandle,
    settings: Settings,
    world: Arc<Mutex<World>>,
    kill_tx: Sender<()>,
    halt_rx: Receiver<()>,
    handshake: Option<HandshakeSenders>,
    /// World updates performed, numbered from 1.
    updates: u64,
}

impl LoopContext {
    pub(crate) fn new(
        handle: EngineHandle,
        world: Arc<Mutex<World>>,
        kill_tx: Sender<()>,
        halt_rx: Receiver<()>,
        handshake: Option<HandshakeSenders>,
    ) -> Self {
        let settings = handle.settings().clone();
        Self {
            handle,
            settings,
            world,
            kill_tx,
            halt_rx,
            handshake,
            updates: 0,
        }
    }

    fn logger(&self) -> &dyn Logger {
        self.handle.logger()
    }

    fn gated_ticker(&self) -> Receiver<Instant> {
        tick(self.settings.tick_duration)
    }

    /// Blocks until the next tick. False once the engine halts.
    fn wait(&self, ticker: &Receiver<Instant>) -> bool {
        select! {
            recv(ticker) -> _ => true,
            recv(self.halt_rx) -> _ => false,
        }
    }

    /// Non-blocking halt check for the unthrottled loop.
    fn halted(&self) -> bool {
        matches!(self.halt_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn admit(&self, step: &mut Step, restartable: bool) -> Admission {
        step.increment(self.settings.tick_increment);

        let state = self.handle.state();
        if state.is_killed() {
            return Admission::Terminate;
        }
        if state.is_locked() {
            state.set_phase(Phase::Locked);
            return Admission::Skip;
        }
        if restartable && state.take_restart() {
            state.set_phase(Phase::Restarting);
            return Admission::Restart;
        }
        state.set_phase(Phase::Running);
        Admission::Update
    }

    /// Runs one world update. False if the engine halted mid-handshake.
    fn update(&mut self, step: &Step) -> bool {
        self.updates += 1;
        if !self.rendezvous(Gate::Pre) {
            return false;
        }
        self.world.lock().update(step.as_dt());
        self.rendezvous(Gate::Post)
    }

    fn rendezvous(&self, gate: Gate) -> bool {
        let Some(handshake) = &self.handshake else {
            return true;
        };
        let sender = match gate {
            Gate::Pre => &handshake.pre,
            Gate::Post => &handshake.post,
        };
        select! {
            send(sender, self.updates) -> sent => sent.is_ok(),
            recv(self.halt_rx) -> _ => false,
        }
    }

    /// End-of-tick bookkeeping. False if the loop must stop.
    fn settle(&self, step: &Step) -> bool {
        let state = self.handle.state();
        state.set_last_tick(step.value());

        if self.settings.has_end()
            && step.reached(self.settings.tick_end, self.settings.tick_increment)
        {
            state.pause();
            tracing::debug!(tick = step.value(), "end tick reached");
            self.terminate();
            return false;
        }
        true
    }

    /// Hands one kill token to the driver, unless the engine halts first.
    fn terminate(&self) {
        self.handle.state().set_phase(Phase::Killing);
        select! {
            send(self.kill_tx, ()) -> _ => {}
            recv(self.halt_rx) -> _ => {}
        }
    }

    fn report(&self, frame: &mut Frame, step: &Step) {
        if self.settings.report_step {
            self.logger()
                .printf(format_args!("step: {:.6}", step.value()));
        }
        if self.settings.report_frame {
            if let Some(report) = frame.fps(self.settings.report_window) {
                self.logger().printf(format_args!(
                    "fps: {:.6} / pfps: {:.6}",
                    report.fps, report.mean_fps
                ));
            }
        }
    }
}

struct GatedLoop;

impl RunLoop for GatedLoop {
    fn run(self: Box<Self>, mut ctx: LoopContext) {
        let mut step = Step::new(ctx.settings.tick_init);
        let ticker = ctx.gated_ticker();

        while ctx.wait(&ticker) {
            match ctx.admit(&mut step, false) {
                Admission::Terminate => return ctx.terminate(),
                Admission::Skip => {}
                Admission::Update | Admission::Restart => {
                    if !ctx.update(&step) {
                        return;
                    }
                }
            }
            if !ctx.settle(&step) {
                return;
            }
        }
    }
}

struct UnthrottledLoop;

impl RunLoop for UnthrottledLoop {
    fn run(self: Box<Self>, mut ctx: LoopContext) {
        let mut step = Step::new(ctx.settings.tick_init);

        while !ctx.halted() {
            match ctx.admit(&mut step, false) {
                Admission::Terminate => return ctx.terminate(),
                // Nothing to do but spin; give the driver a chance.
                Admission::Skip => thread::yield_now(),
                Admission::Update | Admission::Restart => {
                    if !ctx.update(&step) {
                        return;
                    }
                }
            }
            if !ctx.settle(&step) {
                return;
            }
        }
    }
}

struct InstrumentedLoop;

impl RunLoop for InstrumentedLoop {
    fn run(self: Box<Self>, mut ctx: LoopContext) {
        'restart: loop {
            let mut step = Step::new(ctx.settings.tick_init);
            let mut frame = ctx
                .settings
                .frame_limit
                .map_or_else(Frame::unlimited, Frame::limited);
            let ticker = ctx.gated_ticker();

            while ctx.wait(&ticker) {
                match ctx.admit(&mut step, true) {
                    Admission::Terminate => return ctx.terminate(),
                    Admission::Skip => {}
                    Admission::Restart => {
                        ctx.logger().print("restarting...");
                        continue 'restart;
                    }
                    Admission::Update => {
                        frame.start();
                        if !ctx.update(&step) {
                            return;
                        }
                        frame.end();
                        ctx.report(&mut frame, &step);
                    }
                }
                if !ctx.settle(&step) {
                    return;
                }
            }
            break;
        }
    }
}
