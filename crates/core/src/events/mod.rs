//! Chart events and their fan-out.
//!
//! Provides the [`ChartEvent`] type, the [`ChartListener`] trait subscribers
//! implement (closures implement it too), and the [`ChartEmitter`] that holds
//! the latest payload per chart and notifies listeners.

mod chart_event;
mod emitter;
mod listener;


pub use chart_event::*;
pub use emitter::*;
pub use listener::*;
