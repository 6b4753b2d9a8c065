//! # Tickwork
//!
//! A tick-loop simulation engine built on [`tickwork_core`]:
//! - Ordered configuration steps assemble an [`Engine`]
//! - A run loop thread advances simulated time and updates the world
//! - Pause, restart and kill are lock-free flags honored at tick boundaries
//! - A driver blocks in [`Engine::drive`] until a kill token or a signal
//!   asks for shutdown, then [`Engine::close`] yields the exit code
//!
//! ## Example
//!
//! ```rust,ignore
//! use tickwork::{config, Engine};
//!
//! let engine = Engine::new([
//!     config::set_tick_duration_str("16ms"),
//!     config::set_last_tick(600.0),
//!     config::add_systems(vec![Box::new(Physics::default())]),
//! ])?;
//! let _signals = engine.forward_os_signals()?;
//! engine.run()?;
//! std::process::exit(engine.drive());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logger;
pub mod run_loop;
pub mod settings;
pub mod signal;
pub mod state;

pub use config::{ConfigStep, EngineBuilder, EngineConfig, DEFAULT_ORDER};
pub use engine::{Engine, EngineHandle, Handshake};
pub use error::{default_handle_error, EngineError, EngineResult, HandleErrorFn};
pub use logger::{init_tracing, BufferLogger, LogFormat, Logger, NullLogger, TracingLogger};
pub use run_loop::LoopKind;
pub use settings::{format_duration, parse_duration, Settings};
pub use signal::{ShutdownPolicy, Signal, SignalForwarder};
pub use state::{CloseHook, Phase};

pub use tickwork_core;
