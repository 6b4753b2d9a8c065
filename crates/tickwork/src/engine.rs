//! # Engine
//!
//! Owns the world, the run loop thread and the channels between the loop
//! and whoever drives the process.
//!
//! ```text
//!            ┌───────────── run loop thread ─────────────┐
//!            │ tick ─> world.update(dt) ─> end reached?  │
//!            └──────┬──────────────────────────┬─────────┘
//!              pre/post (optional)        kill token
//!                   v                          v
//!   OS signals ─> [signal channel] ─> drive() ─> close() ─> exit code
//! ```
//!
//! Both control channels are zero-capacity: a send completes only when the
//! driver takes it.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};
use tickwork_core::World;

use crate::config::{ConfigStep, EngineBuilder};
use crate::error::{EngineError, EngineResult, ErrorHandler};
use crate::logger::Logger;
use crate::run_loop::{HandshakeSenders, LoopContext, LoopKind};
use crate::settings::Settings;
use crate::signal::{self, ShutdownPolicy, Signal, SignalForwarder};
use crate::state::{CloseHook, Phase, State};

/// Engine parts shared with the run loop and error handlers.
pub(crate) struct Shared {
    settings: Settings,
    state: State,
    logger: Arc<dyn Logger>,
    errors: ErrorHandler,
}

/// Cheap, cloneable view of a running engine.
///
/// Handed to error handlers and usable from any thread.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Suspends world updates. Ticks and simulated time keep advancing.
    pub fn pause(&self) {
        self.shared.state.pause();
    }

    /// Resumes world updates.
    pub fn unpause(&self) {
        self.shared.state.unpause();
    }

    /// Asks the instrumented loop to reset simulated time at the next tick.
    /// Other loops ignore it.
    pub fn restart(&self) {
        self.shared.state.restart();
    }

    /// Asks the loop to stop at the next tick boundary.
    pub fn kill(&self) {
        self.shared.state.kill();
    }

    /// Returns true if updates are suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.is_locked()
    }

    /// Returns true once a kill was requested.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.shared.state.is_killed()
    }

    /// Returns true if debug mode is on.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.shared.state.debug()
    }

    /// Returns where the loop currently is.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.state.phase()
    }

    /// Returns the last simulated time the loop recorded.
    #[must_use]
    pub fn last_tick(&self) -> f64 {
        self.shared.state.last_tick()
    }

    /// Returns the engine's settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Returns the engine's logger.
    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.shared.logger.as_ref()
    }

    /// Routes `err` through the configured error handler.
    pub fn handle_error(&self, err: EngineError) {
        let handler = self.shared.errors.handle_fn();
        handler(self, err);
    }

    /// Stores `err` as the last error. Close then exits with -1.
    pub fn record_error(&self, err: EngineError) {
        self.shared.errors.record(err);
    }

    /// Returns the last recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<EngineError> {
        self.shared.errors.last()
    }

    /// Records a non-fatal problem and logs it.
    pub fn warn(&self, err: EngineError) {
        self.logger().printf(format_args!("warning: {err}"));
        self.shared.errors.warn(err);
    }

    /// Returns every warning recorded so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<EngineError> {
        self.shared.errors.warnings()
    }

    pub(crate) fn state(&self) -> &State {
        &self.shared.state
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("phase", &self.phase())
            .field("last_tick", &self.last_tick())
            .finish_non_exhaustive()
    }
}

/// Receiving halves of the per-update rendezvous.
///
/// The loop sends the update number on `pre` before touching the world and
/// on `post` after. It blocks on each until the driver receives.
#[derive(Clone, Debug)]
pub struct Handshake {
    /// Fires before each world update.
    pub pre: Receiver<u64>,
    /// Fires after each world update.
    pub post: Receiver<u64>,
}

/// A configured tick-loop engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::new([
///     config::set_tick_duration(Duration::from_millis(16)),
///     config::add_systems(vec![Box::new(Physics::default())]),
/// ])?;
/// let _signals = engine.forward_os_signals()?;
/// engine.run()?;
/// std::process::exit(engine.drive());
/// ```
pub struct Engine {
    handle: EngineHandle,
    world: Arc<Mutex<World>>,
    run_loop: LoopKind,
    kill_tx: Sender<()>,
    kill_rx: Receiver<()>,
    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,
    /// Dropped by `close`; every blocking point in the loop watches it.
    halt_tx: Mutex<Option<Sender<()>>>,
    halt_rx: Receiver<()>,
    handshake: Option<Handshake>,
    handshake_tx: Option<HandshakeSenders>,
    close_hooks: Mutex<Vec<CloseHook>>,
    /// Held for the whole close sequence; hooks may re-enter on this thread.
    exit_code: ReentrantMutex<Cell<Option<i32>>>,
    closing: AtomicBool,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Builds an engine from `steps` plus the built-in configuration.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as [`EngineError::Config`].
    pub fn new<I>(steps: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = ConfigStep>,
    {
        EngineBuilder::configure(steps).map(Self::assemble)
    }

    fn assemble(builder: EngineBuilder) -> Self {
        let EngineBuilder {
            settings,
            debug,
            logger,
            handle_error,
            close_hooks,
            systems,
            run_loop,
            ..
        } = builder;

        let logger = logger.unwrap_or_else(|| Arc::new(crate::logger::TracingLogger));
        let handle_error =
            handle_error.unwrap_or_else(|| Arc::new(crate::error::default_handle_error));
        let handshake_enabled = settings.handshake;

        let handle = EngineHandle {
            shared: Arc::new(Shared {
                settings,
                state: State::new(debug),
                logger,
                errors: ErrorHandler::new(handle_error),
            }),
        };

        let world_handle = handle.clone();
        let mut world = World::new(move |err| world_handle.handle_error(err.into()));
        world.add(systems);

        let (kill_tx, kill_rx) = bounded(0);
        let (signal_tx, signal_rx) = bounded(0);
        let (halt_tx, halt_rx) = bounded(0);
        let (handshake, handshake_tx) = if handshake_enabled {
            let (pre_tx, pre_rx) = bounded(0);
            let (post_tx, post_rx) = bounded(0);
            (
                Some(Handshake {
                    pre: pre_rx,
                    post: post_rx,
                }),
                Some(HandshakeSenders {
                    pre: pre_tx,
                    post: post_tx,
                }),
            )
        } else {
            (None, None)
        };

        Self {
            handle,
            world: Arc::new(Mutex::new(world)),
            run_loop: run_loop.unwrap_or_default(),
            kill_tx,
            kill_rx,
            signal_tx,
            signal_rx,
            halt_tx: Mutex::new(Some(halt_tx)),
            halt_rx,
            handshake,
            handshake_tx,
            close_hooks: Mutex::new(close_hooks),
            exit_code: ReentrantMutex::new(Cell::new(None)),
            closing: AtomicBool::new(false),
            runner: Mutex::new(None),
        }
    }

    /// Starts the run loop on its own thread and returns immediately.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyRunning`] on a second call, or
    /// [`EngineError::Spawn`] if the thread cannot start.
    pub fn run(&self) -> EngineResult<()> {
        let mut runner = self.runner.lock();
        if runner.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let ctx = LoopContext::new(
            self.handle.clone(),
            Arc::clone(&self.world),
            self.kill_tx.clone(),
            self.halt_rx.clone(),
            self.handshake_tx.clone(),
        );
        let body = self.run_loop.build();

        self.logger().print("running...");
        tracing::info!(run_loop = %self.run_loop, "starting run loop");

        let thread = thread::Builder::new()
            .name("tickwork-loop".into())
            .spawn(move || body.run(ctx))
            .map_err(|err| EngineError::Spawn(err.to_string()))?;
        *runner = Some(thread);
        Ok(())
    }

    /// Waits for the run loop thread to finish.
    ///
    /// Returns immediately if the loop was never started or already joined.
    ///
    /// # Errors
    ///
    /// [`EngineError::LoopPanicked`] if the loop thread panicked.
    pub fn join(&self) -> EngineResult<()> {
        let thread = self.runner.lock().take();
        match thread {
            Some(thread) => thread.join().map_err(|_| EngineError::LoopPanicked),
            None => Ok(()),
        }
    }

    /// Blocks the calling thread until the engine should exit, then closes
    /// it and returns the exit code.
    ///
    /// Wakes on a kill token, a non-ignored signal, or a `close` from
    /// another thread. With the handshake enabled it also completes each
    /// pre/post rendezvous.
    pub fn drive(&self) -> i32 {
        // The engine keeps the handshake senders, so `pre` never disconnects.
        let (pre, post) = match &self.handshake {
            Some(handshake) => (handshake.pre.clone(), handshake.post.clone()),
            None => (never(), never()),
        };

        loop {
            select! {
                recv(pre) -> update => {
                    if update.is_ok() {
                        // The loop is mid-update; wait for it to finish.
                        select! {
                            recv(post) -> _ => {}
                            recv(self.halt_rx) -> _ => return self.close(),
                        }
                    }
                }
                recv(self.kill_rx) -> _ => return self.close(),
                recv(self.signal_rx) -> signal => {
                    if let Ok(signal) = signal {
                        let code = self.signal_handler(signal);
                        if signal.policy() != ShutdownPolicy::Ignore {
                            return code;
                        }
                    }
                }
                recv(self.halt_rx) -> _ => return self.close(),
            }
        }
    }

    /// Applies the shutdown policy for `signal` and returns the exit code.
    ///
    /// Graceful signals close normally, forced ones record
    /// [`EngineError::ForcedShutdown`] first. Ignored signals return -1
    /// and leave the engine running.
    pub fn signal_handler(&self, signal: Signal) -> i32 {
        self.logger().printf(format_args!("got signal: {signal}"));

        match signal.policy() {
            ShutdownPolicy::Graceful => self.close(),
            ShutdownPolicy::Forced => {
                self.handle
                    .record_error(EngineError::ForcedShutdown { signal });
                self.close()
            }
            ShutdownPolicy::Ignore => {
                tracing::debug!(%signal, "ignoring signal");
                -1
            }
        }
    }

    /// Shuts the engine down and returns the exit code.
    ///
    /// Runs the close hooks, stops the loop, logs the outcome and, with
    /// `hard_exit`, terminates the process. Returns 0 on a clean close and
    /// -1 if an error was recorded. Later calls return the same code
    /// without doing anything.
    ///
    /// Callers on other threads block until the first close finishes. A
    /// close hook calling `close` gets the code the engine would exit with
    /// at that moment.
    pub fn close(&self) -> i32 {
        let exit_code = self.exit_code.lock();
        if let Some(code) = exit_code.get() {
            return code;
        }
        if self.closing.swap(true, Ordering::SeqCst) {
            return self.pending_exit_code();
        }

        let state = self.handle.state();
        state.kill();
        state.set_phase(Phase::Killing);

        let hooks = std::mem::take(&mut *self.close_hooks.lock());
        for hook in &hooks {
            hook(self);
        }
        drop(self.halt_tx.lock().take());

        let logger = self.logger();
        let code = match self.handle.last_error() {
            Some(err) => {
                logger.print("closing with error");
                logger.print(&err.to_string());
                -1
            }
            None => {
                logger.print("closing...");
                0
            }
        };
        logger.print("done");
        exit_code.set(Some(code));
        drop(exit_code);

        tracing::info!(code, "engine closed");
        if self.settings().hard_exit {
            std::process::exit(code);
        }
        code
    }

    fn pending_exit_code(&self) -> i32 {
        if self.handle.last_error().is_some() {
            -1
        } else {
            0
        }
    }

    /// Installs OS signal handlers that feed the signal channel.
    ///
    /// Keep the returned forwarder alive for as long as signals should be
    /// routed.
    ///
    /// # Errors
    ///
    /// [`EngineError::SignalSetup`] if the handlers cannot be registered.
    pub fn forward_os_signals(&self) -> EngineResult<SignalForwarder> {
        signal::forward(self.signal_tx.clone(), self.halt_rx.clone())
    }

    /// Returns a sender that injects signals as if the OS delivered them.
    #[must_use]
    pub fn signal_sender(&self) -> Sender<Signal> {
        self.signal_tx.clone()
    }

    /// Returns the signal channel for custom drivers.
    #[must_use]
    pub fn os_signals(&self) -> &Receiver<Signal> {
        &self.signal_rx
    }

    /// Returns the kill-token channel for custom drivers.
    #[must_use]
    pub fn kill_notifications(&self) -> &Receiver<()> {
        &self.kill_rx
    }

    /// Returns the update rendezvous, if enabled.
    #[must_use]
    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Appends a close hook. Ignored once the engine has closed.
    pub fn add_close_hook(&self, hook: CloseHook) {
        self.close_hooks.lock().push(hook);
    }

    /// Returns a cloneable handle to the engine's state.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Returns the world. Lock it only between ticks or while paused.
    #[must_use]
    pub fn world(&self) -> &Arc<Mutex<World>> {
        &self.world
    }

    /// Returns the run loop variant.
    #[must_use]
    pub const fn run_loop(&self) -> LoopKind {
        self.run_loop
    }

    /// Returns the engine's settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.handle.settings()
    }

    /// Returns the engine's logger.
    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.handle.logger()
    }

    /// Suspends world updates.
    pub fn pause(&self) {
        self.handle.pause();
    }

    /// Resumes world updates.
    pub fn unpause(&self) {
        self.handle.unpause();
    }

    /// Requests a restart of the instrumented loop.
    pub fn restart(&self) {
        self.handle.restart();
    }

    /// Asks the loop to stop at the next tick boundary.
    pub fn kill(&self) {
        self.handle.kill();
    }

    /// Returns true if debug mode is on.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.handle.debug()
    }

    /// Returns where the loop currently is.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.handle.phase()
    }

    /// Returns the last simulated time the loop recorded.
    #[must_use]
    pub fn last_tick(&self) -> f64 {
        self.handle.last_tick()
    }

    /// Returns the last recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<EngineError> {
        self.handle.last_error()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("run_loop", &self.run_loop)
            .field("phase", &self.phase())
            .field("last_tick", &self.last_tick())
            .field("settings", self.settings())
            .finish_non_exhaustive()
    }
}
