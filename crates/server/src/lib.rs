//! HTTP front end for the transcoding engine.

pub mod api;
pub mod metrics;
pub mod state;
