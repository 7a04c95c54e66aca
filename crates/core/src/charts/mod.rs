//! Chart models, series alignment and placeholder data.

mod merge;
mod model;
mod synthetic;

pub use merge::align_series;
pub use model::*;
pub use synthetic::synthetic_series;
