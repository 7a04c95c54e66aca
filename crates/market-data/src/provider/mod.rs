//! Upstream provider abstractions and implementations.
//!
//! This module contains:
//! - The `AggregatesProvider` trait that all providers implement
//! - Concrete provider implementations (Polygon-style aggregates API)

mod traits;

pub mod polygon;

pub use traits::AggregatesProvider;
