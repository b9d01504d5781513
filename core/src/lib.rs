//! Supervised execution of untrusted binaries: validation, platform resolution,
//! a shared virtual display, bounded process supervision and live output fan-out.

pub mod api;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod platform;
pub mod runner;
pub mod sink;
