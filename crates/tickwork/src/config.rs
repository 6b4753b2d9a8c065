//! # Engine Configuration
//!
//! An engine is assembled by running ordered configuration steps against an
//! [`EngineBuilder`]. Built-in steps fill in defaults; caller steps are
//! interleaved by order.
//!
//! | Order | Step          | Effect                                         |
//! |-------|---------------|------------------------------------------------|
//! | -1    | report-init   | clears the configuration report                |
//! | 1     | state         | resets debug and close hooks                   |
//! | 2     | defaults      | resets [`Settings`]                            |
//! | 50    | (setters)     | debug, reports, close hooks                    |
//! | 101   | logger        | installs [`TracingLogger`] unless one is set   |
//! | 102   | error         | installs [`default_handle_error`]              |
//! | 500   | (setters)     | tick timing, hard exit, handshake              |
//! | 501   | world         | starts an empty world                          |
//! | 550   | (setters)     | systems                                        |
//! | 601   | run-loop      | picks a loop if none was chosen                |
//! | 999   | report        | prints the configuration report                |
//!
//! Steps run in ascending order; equal orders keep insertion order, with
//! built-ins first. The first failing step aborts construction.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickwork_core::System;

use crate::engine::EngineHandle;
use crate::error::{default_handle_error, EngineError, EngineResult, HandleErrorFn};
use crate::logger::{Logger, TracingLogger};
use crate::run_loop::LoopKind;
use crate::settings::{format_duration, parse_duration, Settings};
use crate::state::{default_close_hook, CloseHook};

/// Order used by setters that have no better slot.
pub const DEFAULT_ORDER: i32 = 50;

/// Body of a configuration step.
pub type ConfigFn = Box<dyn FnOnce(&mut EngineBuilder) -> EngineResult<()> + Send>;

/// One ordered unit of engine configuration.
pub struct ConfigStep {
    order: i32,
    name: String,
    apply: ConfigFn,
}

impl ConfigStep {
    /// Creates a step that runs at `order`.
    pub fn new<F>(order: i32, name: impl Into<String>, apply: F) -> Self
    where
        F: FnOnce(&mut EngineBuilder) -> EngineResult<()> + Send + 'static,
    {
        Self {
            order,
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    /// Creates a step at [`DEFAULT_ORDER`].
    pub fn with_default_order<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: FnOnce(&mut EngineBuilder) -> EngineResult<()> + Send + 'static,
    {
        Self::new(DEFAULT_ORDER, name, apply)
    }

    /// Returns the step's order.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Returns the step's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStep")
            .field("order", &self.order)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Mutable engine description the configuration steps work on.
pub struct EngineBuilder {
    pub(crate) settings: Settings,
    pub(crate) debug: bool,
    pub(crate) logger: Option<Arc<dyn Logger>>,
    pub(crate) handle_error: Option<HandleErrorFn>,
    pub(crate) close_hooks: Vec<CloseHook>,
    pub(crate) systems: Vec<Box<dyn System>>,
    pub(crate) run_loop: Option<LoopKind>,
    report: Vec<String>,
}

impl EngineBuilder {
    pub(crate) fn new() -> Self {
        Self {
            settings: Settings::default(),
            debug: false,
            logger: None,
            handle_error: None,
            close_hooks: vec![default_close_hook()],
            systems: Vec::new(),
            run_loop: None,
            report: Vec::new(),
        }
    }

    /// Returns the settings as configured so far.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the settings for modification.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Returns true if debug mode is on.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Turns debug mode on or off.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Replaces the logger.
    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = Some(logger);
    }

    /// Replaces the error handler.
    pub fn set_error_handler(&mut self, handler: HandleErrorFn) {
        self.handle_error = Some(handler);
    }

    /// Appends a close hook.
    pub fn add_close_hook(&mut self, hook: CloseHook) {
        self.close_hooks.push(hook);
    }

    /// Adds a system to the world.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Chooses the run loop.
    pub fn set_run_loop(&mut self, kind: LoopKind) {
        self.run_loop = Some(kind);
    }

    /// Returns the chosen run loop, if any.
    #[must_use]
    pub const fn run_loop(&self) -> Option<LoopKind> {
        self.run_loop
    }

    /// Appends a line to the configuration report.
    pub fn report(&mut self, line: impl Into<String>) {
        self.report.push(line.into());
    }

    /// Returns the configuration report so far.
    #[must_use]
    pub fn report_lines(&self) -> &[String] {
        &self.report
    }

    /// Runs `steps` plus the built-ins in order.
    pub(crate) fn configure<I>(steps: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = ConfigStep>,
    {
        let mut all = builtin_steps();
        all.extend(steps);
        all.sort_by_key(ConfigStep::order);

        let mut builder = Self::new();
        for step in all {
            let ConfigStep { order, name, apply } = step;
            tracing::trace!(order, step = %name, "configuring");
            apply(&mut builder).map_err(|err| match err {
                EngineError::Config { .. } => err,
                other => EngineError::Config {
                    step: name,
                    reason: other.to_string(),
                },
            })?;
        }
        Ok(builder)
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("settings", &self.settings)
            .field("debug", &self.debug)
            .field("systems", &self.systems.len())
            .field("close_hooks", &self.close_hooks.len())
            .field("run_loop", &self.run_loop)
            .finish_non_exhaustive()
    }
}

fn builtin_steps() -> Vec<ConfigStep> {
    vec![
        ConfigStep::new(-1, "report-init", |b| {
            b.report.clear();
            b.report("configuration:");
            Ok(())
        }),
        ConfigStep::new(1, "state", |b| {
            b.debug = false;
            b.close_hooks = vec![default_close_hook()];
            Ok(())
        }),
        ConfigStep::new(2, "defaults", |b| {
            b.settings = Settings::default();
            Ok(())
        }),
        ConfigStep::new(101, "logger", |b| {
            if b.logger.is_none() {
                b.logger = Some(Arc::new(TracingLogger));
            }
            Ok(())
        }),
        ConfigStep::new(102, "error", |b| {
            b.handle_error = Some(Arc::new(default_handle_error));
            Ok(())
        }),
        ConfigStep::new(501, "world", |b| {
            b.systems.clear();
            Ok(())
        }),
        ConfigStep::new(601, "run-loop", |b| {
            let kind = b.run_loop.unwrap_or(if b.debug {
                LoopKind::Instrumented
            } else {
                LoopKind::Gated
            });
            b.run_loop = Some(kind);
            b.report(format!("run loop is {kind}"));
            Ok(())
        }),
        ConfigStep::new(999, "report", |b| {
            if let Some(logger) = &b.logger {
                for line in &b.report {
                    logger.print(line);
                }
            }
            Ok(())
        }),
    ]
}

/// Turns debug mode on or off.
#[must_use]
pub fn set_debug(debug: bool) -> ConfigStep {
    ConfigStep::with_default_order("debug", move |b| {
        b.set_debug(debug);
        b.report(format!("debug is {debug}"));
        Ok(())
    })
}

/// Logs `step: <value>` every tick of the instrumented loop.
#[must_use]
pub fn set_report_step(enabled: bool) -> ConfigStep {
    ConfigStep::with_default_order("report-step", move |b| {
        b.settings.report_step = enabled;
        b.report(format!("report step is {enabled}"));
        Ok(())
    })
}

/// Logs FPS once per report window in the instrumented loop.
#[must_use]
pub fn set_report_frame(enabled: bool) -> ConfigStep {
    ConfigStep::with_default_order("report-frame", move |b| {
        b.settings.report_frame = enabled;
        b.report(format!("report frame is {enabled}"));
        Ok(())
    })
}

/// Appends close hooks, run after the built-in `last tick` hook.
#[must_use]
pub fn set_close_hooks(hooks: Vec<CloseHook>) -> ConfigStep {
    ConfigStep::with_default_order("close-hooks", move |b| {
        b.close_hooks.extend(hooks);
        Ok(())
    })
}

/// Replaces the logger.
#[must_use]
pub fn set_logger(logger: Arc<dyn Logger>) -> ConfigStep {
    ConfigStep::new(102, "set-logger", move |b| {
        b.set_logger(logger);
        Ok(())
    })
}

/// Replaces the default error handler.
#[must_use]
pub fn set_error_handler<F>(handler: F) -> ConfigStep
where
    F: Fn(&EngineHandle, EngineError) + Send + Sync + 'static,
{
    ConfigStep::new(103, "set-error-handler", move |b| {
        b.set_error_handler(Arc::new(handler));
        Ok(())
    })
}

/// Sets the wall-clock spacing between ticks.
#[must_use]
pub fn set_tick_duration(duration: Duration) -> ConfigStep {
    ConfigStep::new(500, "tick-duration", move |b| {
        b.settings.tick_duration = duration;
        b.report(format!("tick duration is {}", format_duration(duration)));
        Ok(())
    })
}

/// Sets the tick spacing from text such as `"16ms"`.
///
/// A malformed value fails the step, and with it engine construction.
#[must_use]
pub fn set_tick_duration_str(text: impl Into<String>) -> ConfigStep {
    let text = text.into();
    ConfigStep::new(500, "tick-duration", move |b| {
        let duration = parse_duration(&text)?;
        b.settings.tick_duration = duration;
        b.report(format!("tick duration is {}", format_duration(duration)));
        Ok(())
    })
}

/// Sets the simulated time added per tick.
#[must_use]
pub fn set_tick_increment(increment: f64) -> ConfigStep {
    ConfigStep::new(500, "tick-increment", move |b| {
        b.settings.tick_increment = increment;
        b.report(format!("tick increment is {increment}"));
        Ok(())
    })
}

/// Sets the simulated start time.
#[must_use]
pub fn set_tick_init(init: f64) -> ConfigStep {
    ConfigStep::new(500, "tick-init", move |b| {
        b.settings.tick_init = init;
        b.report(format!("tick init is {init}"));
        Ok(())
    })
}

/// Stops the loop once simulated time reaches `end`. 0 disables.
#[must_use]
pub fn set_last_tick(end: f64) -> ConfigStep {
    ConfigStep::new(500, "last-tick", move |b| {
        b.settings.tick_end = end;
        b.report(format!("last tick is {end}"));
        Ok(())
    })
}

/// Terminates the process with the exit code on close.
#[must_use]
pub fn set_hard_exit(enabled: bool) -> ConfigStep {
    ConfigStep::new(500, "hard-exit", move |b| {
        b.settings.hard_exit = enabled;
        b.report(format!("hard exit is {enabled}"));
        Ok(())
    })
}

/// Paces instrumented frames to `fps` (0 means 60).
#[must_use]
pub fn set_frame_limit(fps: u32) -> ConfigStep {
    ConfigStep::new(500, "frame-limit", move |b| {
        b.settings.frame_limit = Some(fps);
        b.report(format!("frame limit is {fps}"));
        Ok(())
    })
}

/// Sets the FPS report window.
#[must_use]
pub fn set_report_window(window: Duration) -> ConfigStep {
    ConfigStep::new(500, "report-window", move |b| {
        b.settings.report_window = window;
        Ok(())
    })
}

/// Makes the loop rendezvous with the driver around every world update.
#[must_use]
pub fn set_handshake(enabled: bool) -> ConfigStep {
    ConfigStep::new(500, "handshake", move |b| {
        b.settings.handshake = enabled;
        b.report(format!("handshake is {enabled}"));
        Ok(())
    })
}

/// Adds systems to the world.
#[must_use]
pub fn add_systems(systems: Vec<Box<dyn System>>) -> ConfigStep {
    ConfigStep::new(550, "systems", move |b| {
        b.report(format!("{} systems added", systems.len()));
        b.systems.extend(systems);
        Ok(())
    })
}

/// Chooses the run loop instead of the debug-dependent default.
#[must_use]
pub fn set_run_loop(kind: LoopKind) -> ConfigStep {
    ConfigStep::new(600, "set-run-loop", move |b| {
        b.set_run_loop(kind);
        Ok(())
    })
}

/// Engine configuration loaded from a TOML file.
///
/// ```toml
/// debug = true
/// run_loop = "instrumented"
///
/// [settings]
/// tick_duration = "16ms"
/// tick_end = 600.0
/// report_frame = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Debug mode.
    pub debug: bool,
    /// Explicit run loop choice.
    pub run_loop: Option<LoopKind>,
    /// Engine tunables.
    pub settings: Settings,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigFile`] on malformed TOML.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|err| EngineError::ConfigFile(err.to_string()))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigFile`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| EngineError::ConfigFile(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Converts the file into configuration steps.
    ///
    /// The settings table replaces every tunable at order 500; setters
    /// placed later at the same order still win.
    #[must_use]
    pub fn into_steps(self) -> Vec<ConfigStep> {
        let Self {
            debug,
            run_loop,
            settings,
        } = self;

        let mut steps = vec![
            set_debug(debug),
            ConfigStep::new(500, "config-file", move |b| {
                b.settings = settings;
                b.report("settings loaded from config file");
                Ok(())
            }),
        ];
        if let Some(kind) = run_loop {
            steps.push(set_run_loop(kind));
        }
        steps
    }
}
