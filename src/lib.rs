//! Single-cell snake on a bounded grid: steer, eat apples, don't touch the
//! edge.
//!
//! [`engine::GameEngine`] holds all of the game rules and has no I/O of its
//! own; it reports what happened through [`engine::Observer`]. The terminal
//! front end in [`game`] is one such observer.

pub mod config;
pub mod engine;
pub mod game;
pub mod input;
pub mod snake;
pub mod term;

pub type GridInt = i32;
pub type TermInt = u16;
pub type Coords = (TermInt, TermInt);

pub use config::{ConfigError, GameOptions};
pub use engine::{GameEngine, GameEvent, Observer, RunState, TickOutcome};
pub use snake::{Bound, Direction, Position};
