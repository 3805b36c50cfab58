//! Training hyperparameter schedules.

mod schedule;

pub use schedule::*;
