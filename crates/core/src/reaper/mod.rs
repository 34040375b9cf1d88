//! Periodic expiry of stale jobs.

mod runner;

pub use runner::{Reaper, SweepReport};
