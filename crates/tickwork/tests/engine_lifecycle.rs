//! Engine construction, signal policy, and the close sequence.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tickwork::config::{
    add_systems, set_close_hooks, set_logger, set_tick_duration, set_tick_duration_str,
};
use tickwork::tickwork_core::{EntityId, System, SystemResult};
use tickwork::{
    BufferLogger, CloseHook, ConfigStep, Engine, EngineConfig, EngineError, Logger, Signal,
};

fn engine_with(logger: &Arc<BufferLogger>, extra: Vec<ConfigStep>) -> Engine {
    let sink: Arc<dyn Logger> = logger.clone();
    let mut steps = vec![set_logger(sink), set_tick_duration(Duration::from_millis(1))];
    steps.extend(extra);
    Engine::new(steps).unwrap()
}

struct Ranked(i32);

impl System for Ranked {
    fn priority(&self) -> i32 {
        self.0
    }

    fn update(&mut self, _dt: i64) -> SystemResult {
        Ok(())
    }

    fn remove(&mut self, _entity: EntityId) {}
}

#[test]
fn test_close_hooks_run_once_in_order() {
    let logger = Arc::new(BufferLogger::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let hook = |tag: &'static str| -> CloseHook {
        let seen = Arc::clone(&seen);
        Box::new(move |_engine: &Engine| seen.lock().push(tag))
    };
    let engine = engine_with(&logger, vec![set_close_hooks(vec![hook("a"), hook("b")])]);
    engine.add_close_hook(hook("c"));

    assert_eq!(engine.close(), 0);
    assert_eq!(engine.close(), 0);

    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    let lines = logger.lines();
    assert_eq!(lines.iter().filter(|l| *l == "done").count(), 1);

    // The built-in hook runs first.
    let last_tick = lines.iter().position(|l| l == "last tick: 0.000000");
    let closing = lines.iter().position(|l| l == "closing...");
    assert!(last_tick.is_some());
    assert!(last_tick < closing);
}

#[test]
fn test_graceful_signal_closes_cleanly() {
    for signal in [Signal::Hangup, Signal::Interrupt, Signal::Terminate] {
        let logger = Arc::new(BufferLogger::new());
        let engine = engine_with(&logger, Vec::new());

        assert_eq!(engine.signal_handler(signal), 0);
        assert!(engine.last_error().is_none());
        assert!(logger.contains(&format!("got signal: {signal}")));
        assert!(logger.contains("closing..."));
        assert!(logger.contains("done"));
    }
}

#[test]
fn test_forced_signal_closes_with_error() {
    let logger = Arc::new(BufferLogger::new());
    let engine = engine_with(&logger, Vec::new());

    assert_eq!(engine.signal_handler(Signal::Abort), -1);
    assert_eq!(
        engine.last_error(),
        Some(EngineError::ForcedShutdown {
            signal: Signal::Abort
        })
    );
    assert!(logger.contains("closing with error"));
    assert!(logger.contains("signal[SIGABRT] forcing immediate shutdown"));
}

#[test]
fn test_ignored_signal_does_not_close() {
    let logger = Arc::new(BufferLogger::new());
    let engine = engine_with(&logger, Vec::new());

    assert_eq!(engine.signal_handler(Signal::Other(28)), -1);
    assert!(logger.contains("got signal: signal 28"));
    assert!(!logger.contains("done"));
    assert!(engine.last_error().is_none());

    assert_eq!(engine.close(), 0);
}

#[test]
fn test_drive_routes_injected_signals() {
    let logger = Arc::new(BufferLogger::new());
    let engine = engine_with(&logger, Vec::new());
    engine.run().unwrap();

    let sender = engine.signal_sender();
    let injector = thread::spawn(move || {
        sender.send(Signal::Other(10)).unwrap();
        sender.send(Signal::Quit).unwrap();
    });

    assert_eq!(engine.drive(), -1);
    injector.join().unwrap();
    engine.join().unwrap();

    assert!(logger.contains("got signal: signal 10"));
    assert!(logger.contains("signal[SIGQUIT] forcing immediate shutdown"));
}

#[test]
fn test_close_from_another_thread_releases_drive() {
    let logger = Arc::new(BufferLogger::new());
    let engine = Arc::new(engine_with(&logger, Vec::new()));
    engine.run().unwrap();

    let closer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            engine.close()
        })
    };

    assert_eq!(engine.drive(), 0);
    assert_eq!(closer.join().unwrap(), 0);
    engine.join().unwrap();
    assert_eq!(
        logger.lines().iter().filter(|l| *l == "closing...").count(),
        1
    );
}

#[test]
fn test_failed_step_aborts_construction() {
    let steps = vec![
        ConfigStep::new(10, "boom", |_| {
            Err(EngineError::Spawn("not today".into()))
        }),
    ];

    match Engine::new(steps) {
        Err(EngineError::Config { step, reason }) => {
            assert_eq!(step, "boom");
            assert!(reason.contains("not today"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_bad_duration_aborts_construction() {
    let logger = Arc::new(BufferLogger::new());
    let sink: Arc<dyn Logger> = logger.clone();
    let result = Engine::new(vec![set_logger(sink), set_tick_duration_str("fast")]);

    assert!(matches!(result, Err(EngineError::Config { .. })));
    // Aborted before the report step.
    assert!(logger.lines().is_empty());
}

#[test]
fn test_world_systems_sorted_by_priority() {
    let logger = Arc::new(BufferLogger::new());
    let engine = engine_with(
        &logger,
        vec![add_systems(vec![
            Box::new(Ranked(1)),
            Box::new(Ranked(9)),
            Box::new(Ranked(5)),
        ])],
    );

    let world = engine.world().lock();
    let priorities: Vec<i32> = world.systems().iter().map(|s| s.priority()).collect();
    assert_eq!(priorities, vec![9, 5, 1]);
}

#[test]
fn test_config_file_drives_engine() {
    let config = EngineConfig::from_toml_str(
        r#"
        run_loop = "unthrottled"

        [settings]
        tick_end = 10.0
        "#,
    )
    .unwrap();

    let logger = Arc::new(BufferLogger::new());
    let sink: Arc<dyn Logger> = logger.clone();
    let mut steps = config.into_steps();
    steps.push(set_logger(sink));
    let engine = Engine::new(steps).unwrap();

    engine.run().unwrap();
    assert_eq!(engine.drive(), 0);
    engine.join().unwrap();
    assert!(logger.contains("last tick: 10.000000"));
}
