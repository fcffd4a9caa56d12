#![forbid(unsafe_code)]

pub mod model;
pub mod reporting;
pub mod scheduler;
pub mod time;

pub use time::Clock;
