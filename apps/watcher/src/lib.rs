pub mod config;
pub mod main_lib;

pub use main_lib::{build_engine, init_tracing, log_event};
