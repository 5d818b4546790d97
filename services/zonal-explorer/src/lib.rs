//! Point-and-click explorer for land cover zonal climate statistics.
//!
//! Reads point selections, runs them through the interactive trigger and
//! renders each result as a JSON presentation payload.

pub mod config;
pub mod presentation;
pub mod sources;
