//! # World
//!
//! The container for every registered system. Each tick the world runs
//! `update` on all systems in descending priority order, so early systems
//! (input, physics) always see the state before late systems (bookkeeping,
//! presentation) do.

use std::cmp::Reverse;
use std::fmt;

use crate::entity::EntityId;
use crate::error::{SystemError, SystemResult};

/// An independently updatable unit of simulation.
///
/// A system is owned by exactly one world once added. Worlds never clone
/// systems and there is no per-system removal; systems only hear about
/// entities leaving through [`System::remove`].
pub trait System: Send {
    /// Scheduling rank. Higher runs first within a tick.
    fn priority(&self) -> i32;

    /// Advances the system by one tick.
    ///
    /// # Errors
    ///
    /// A returned error is forwarded to the world's error handler. It never
    /// stops the remaining systems from updating this tick.
    fn update(&mut self, dt: i64) -> SystemResult;

    /// Drops whatever the system tracks for `entity`.
    ///
    /// Systems that never saw the entity must treat this as a no-op.
    fn remove(&mut self, entity: EntityId);

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler that receives every failing system update.
type ErrorHandler = Box<dyn FnMut(SystemError) + Send>;

/// The set of systems driven once per tick.
///
/// # Ordering
///
/// Systems are kept sorted by descending priority immediately after every
/// `add`. The sort is stable, so systems with equal priority keep the order
/// in which they were registered.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new(|err| tracing::error!("{err}"));
/// world.add_system(Input::default());   // priority 100
/// world.add_system(Render::default());  // priority 0
/// world.update(1);                      // Input, then Render
/// ```
pub struct World {
    /// Handler for failing updates.
    on_error: ErrorHandler,
    /// Registered systems, descending priority.
    systems: Vec<Box<dyn System>>,
}

impl World {
    /// Creates an empty world that routes system failures to `on_error`.
    pub fn new<F>(on_error: F) -> Self
    where
        F: FnMut(SystemError) + Send + 'static,
    {
        Self {
            on_error: Box::new(on_error),
            systems: Vec::new(),
        }
    }

    /// Registers several systems at once and re-sorts.
    ///
    /// Sorting is O(n log n) per call; registration happens at startup,
    /// not per tick.
    pub fn add<I>(&mut self, systems: I)
    where
        I: IntoIterator<Item = Box<dyn System>>,
    {
        self.systems.extend(systems);
        self.systems.sort_by_key(|system| Reverse(system.priority()));
    }

    /// Registers a single system and re-sorts.
    pub fn add_system<S>(&mut self, system: S)
    where
        S: System + 'static,
    {
        self.add(std::iter::once(Box::new(system) as Box<dyn System>));
    }

    /// Returns the systems in update order.
    #[inline]
    #[must_use]
    pub fn systems(&self) -> &[Box<dyn System>] {
        &self.systems
    }

    /// Returns the number of registered systems.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns true if no system is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Runs one tick across all systems.
    ///
    /// Each failure goes to the error handler and iteration continues.
    /// Nothing is retried within the same tick.
    pub fn update(&mut self, dt: i64) {
        for system in &mut self.systems {
            if let Err(err) = system.update(dt) {
                tracing::warn!(system = system.name(), error = %err, "system update failed");
                (self.on_error)(err);
            }
        }
    }

    /// Tells every system that `entity` is gone.
    pub fn remove(&mut self, entity: EntityId) {
        for system in &mut self.systems {
            system.remove(entity);
        }
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.systems.iter().map(|s| (s.name(), s.priority())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records every call it receives.
    struct Probe {
        label: &'static str,
        priority: i32,
        fail: bool,
        updates: Arc<AtomicUsize>,
        removed: Arc<Mutex<Vec<EntityId>>>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Probe {
        fn new(label: &'static str, priority: i32, order: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                label,
                priority,
                fail: false,
                updates: Arc::new(AtomicUsize::new(0)),
                removed: Arc::new(Mutex::new(Vec::new())),
                order: Arc::clone(order),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl System for Probe {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn update(&mut self, _dt: i64) -> SystemResult {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.label);
            if self.fail {
                return Err(SystemError::failed(self.label, "boom"));
            }
            Ok(())
        }

        fn remove(&mut self, entity: EntityId) {
            self.removed.lock().unwrap().push(entity);
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    #[test]
    fn test_priority_order_is_stable() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new(|_| {});
        world.add(vec![
            Box::new(Probe::new("a", 5, &order)) as Box<dyn System>,
            Box::new(Probe::new("b", 1, &order)),
            Box::new(Probe::new("c", 5, &order)),
            Box::new(Probe::new("d", 3, &order)),
        ]);

        let priorities: Vec<i32> = world.systems().iter().map(|s| s.priority()).collect();
        assert_eq!(priorities, vec![5, 5, 3, 1]);

        let names: Vec<&str> = world.systems().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_later_add_resorts() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new(|_| {});
        world.add_system(Probe::new("low", 0, &order));
        world.add_system(Probe::new("high", 10, &order));
        world.add_system(Probe::new("low2", 0, &order));

        world.update(1);
        assert_eq!(*order.lock().unwrap(), vec!["high", "low", "low2"]);
    }

    #[test]
    fn test_failure_does_not_block_others() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);

        let first = Probe::new("first", 3, &order);
        let broken = Probe::new("broken", 2, &order).failing();
        let last = Probe::new("last", 1, &order);
        let counters = [
            Arc::clone(&first.updates),
            Arc::clone(&broken.updates),
            Arc::clone(&last.updates),
        ];

        let mut world = World::new(move |err| sink.lock().unwrap().push(err));
        world.add_system(first);
        world.add_system(broken);
        world.add_system(last);

        world.update(1);
        world.update(2);

        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].system(), "broken");
    }

    #[test]
    fn test_remove_reaches_every_system_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let probes: Vec<Probe> = [7, -2, 7, 0]
            .into_iter()
            .map(|p| Probe::new("p", p, &order))
            .collect();
        let logs: Vec<_> = probes.iter().map(|p| Arc::clone(&p.removed)).collect();

        let mut world = World::new(|_| {});
        world.add(probes.into_iter().map(|p| Box::new(p) as Box<dyn System>));

        let id = EntityId::from_raw(42);
        world.remove(id);

        for log in logs {
            assert_eq!(*log.lock().unwrap(), vec![id]);
        }
    }

    #[test]
    fn test_empty_world() {
        let mut world = World::new(|_| {});
        assert!(world.is_empty());
        world.update(1);
        world.remove(EntityId::from_raw(1));
        assert_eq!(world.len(), 0);
    }
}
