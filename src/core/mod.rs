//! Core engine module
//!
//! Window, event loop and per-frame bookkeeping around the renderer.

mod debug;
mod engine;
mod input;
mod time;

pub use debug::FrameStats;
pub use engine::{Engine, EngineConfig, EngineContext, Game, toggle_for_key};
pub use input::Input;
pub use time::{MAX_DELTA, Time};
