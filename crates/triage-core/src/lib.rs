pub mod condition;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod event;
pub mod names;
pub mod remote;
pub mod runner;
pub mod sampling;
pub mod target;
pub mod task;

pub use error::{Result, TriageError};
