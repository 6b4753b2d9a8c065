//! # Tickwork Demo Driver
//!
//! Runs a small world until the last tick or a signal, then exits with the
//! engine's exit code.
//!
//! ```text
//! tickwork --formatter text --tick-duration 100ms --last-tick 50
//! tickwork --debug --config engine.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tickwork::tickwork_core::{
    Dispatcher, EntityAllocator, EntityId, System, SystemResult,
};
use tickwork::{config, init_tracing, Engine, EngineConfig, EngineResult, LogFormat};

#[derive(Parser)]
#[command(name = "tickwork")]
#[command(about = "Tick-loop simulation engine demo")]
#[command(version)]
struct Cli {
    /// Debug mode: instrumented loop with step and FPS reports
    #[arg(long)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = Formatter::Text)]
    formatter: Formatter,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// TOML engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wall-clock time between ticks, e.g. "16ms"
    #[arg(long)]
    tick_duration: Option<String>,

    /// Stop once simulated time reaches this value
    #[arg(long)]
    last_tick: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Formatter {
    Null,
    Text,
    Json,
}

impl From<Formatter> for LogFormat {
    fn from(formatter: Formatter) -> Self {
        match formatter {
            Formatter::Null => Self::Null,
            Formatter::Text => Self::Text,
            Formatter::Json => Self::Json,
        }
    }
}

/// Publishes a `beat` event every `every` units of simulated time.
struct Heartbeat {
    events: Dispatcher<i64>,
    every: i64,
}

impl System for Heartbeat {
    fn priority(&self) -> i32 {
        100
    }

    fn update(&mut self, dt: i64) -> SystemResult {
        if self.every > 0 && dt % self.every == 0 {
            self.events.dispatch("beat", &dt);
        }
        Ok(())
    }

    fn remove(&mut self, entity: EntityId) {
        self.events.unsubscribe_id("beat", entity.into());
    }

    fn name(&self) -> &str {
        "heartbeat"
    }
}

/// Spawns one entity per tick and retires the oldest past `capacity`.
struct Spawner {
    ids: Arc<EntityAllocator>,
    live: Vec<EntityId>,
    capacity: usize,
}

impl System for Spawner {
    fn priority(&self) -> i32 {
        10
    }

    fn update(&mut self, _dt: i64) -> SystemResult {
        self.live.push(self.ids.new_entity());
        if self.live.len() > self.capacity {
            let retired = self.live.remove(0);
            tracing::debug!(%retired, "entity retired");
        }
        Ok(())
    }

    fn remove(&mut self, entity: EntityId) {
        self.live.retain(|&id| id != entity);
    }

    fn name(&self) -> &str {
        "spawner"
    }
}

fn demo_systems() -> Vec<Box<dyn System>> {
    let ids = Arc::new(EntityAllocator::new());

    let mut events = Dispatcher::new();
    let watcher = ids.new_entity();
    events.subscribe_id("beat", watcher.into(), |_, dt: &i64| {
        tracing::info!(dt, "beat");
    });

    vec![
        Box::new(Heartbeat { events, every: 10 }),
        Box::new(Spawner {
            ids,
            live: Vec::new(),
            capacity: 64,
        }),
    ]
}

fn run(cli: Cli) -> EngineResult<i32> {
    let mut steps = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?.into_steps(),
        None => Vec::new(),
    };
    if cli.debug {
        steps.push(config::set_debug(true));
        steps.push(config::set_report_frame(true));
    }
    if let Some(text) = cli.tick_duration {
        steps.push(config::set_tick_duration_str(text));
    }
    if let Some(end) = cli.last_tick {
        steps.push(config::set_last_tick(end));
    }
    steps.push(config::add_systems(demo_systems()));

    let engine = Engine::new(steps)?;
    let _signals = engine.forward_os_signals()?;
    engine.run()?;

    let code = engine.drive();
    engine.join()?;
    Ok(code)
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log_level, cli.formatter.into()) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(%err, "engine failed");
            std::process::exit(1);
        }
    }
}
