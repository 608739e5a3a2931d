#![forbid(unsafe_code)]

pub mod error;
pub mod gate;
pub mod grading;
pub mod model;
pub mod progress;
pub mod recalc;
pub mod time;

pub use error::Error;
pub use time::Clock;
