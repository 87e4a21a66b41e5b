//! Application framework for the trigon renderer.
//!
//! Owns the window, the render context, and the per-frame state machine
//! that acquires, records, submits, and presents with a bounded number of
//! frames in flight.

pub mod context;
pub mod runner;

pub use context::{RenderContext, FRAMES_IN_FLIGHT};
pub use runner::{run, AppConfig};
