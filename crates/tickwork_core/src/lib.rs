//! # Tickwork Core
//!
//! The scheduling kernel of the tickwork engine:
//! - Entity ids issued by an explicit allocator
//! - A `World` that runs opaque systems in descending priority order
//! - Simulated time (`Step`) and frame timing with optional rate limiting
//! - A named-event dispatcher with ordered, cancelable delivery
//!
//! ## Architecture Rules
//!
//! 1. **Nothing here spawns threads** - the engine crate owns the run loop
//! 2. **One failing system never blocks the others** - errors are routed, not thrown
//! 3. **Deterministic order** - equal priorities keep registration order
//!
//! ## Example
//!
//! ```rust,ignore
//! use tickwork_core::{EntityAllocator, World};
//!
//! let ids = EntityAllocator::new();
//! let mut world = World::new(|err| eprintln!("{err}"));
//! world.add_system(Physics::default());
//! world.update(1);
//! world.remove(ids.new_entity());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod frame;
pub mod step;
pub mod world;

pub use dispatcher::{Canceller, Dispatcher, SubscriberId};
pub use entity::{EntityAllocator, EntityId};
pub use error::{SystemError, SystemResult};
pub use frame::{remaining_budget, FpsReport, Frame, FramePacing, DEFAULT_TARGET_FPS};
pub use step::Step;
pub use world::{System, World};
