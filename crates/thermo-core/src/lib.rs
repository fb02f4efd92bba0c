//! Hardware-independent core library for thermo-rs
//!
//! This crate contains all platform-agnostic logic for the thermo temperature
//! monitoring node: the persisted telemetry log and its windowed history
//! aggregation, the threshold alert state machine, sensor plausibility
//! filtering, configuration persistence, the 7-segment status frame and the
//! transport-agnostic request handlers.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod alert;
pub mod api;
pub mod app_state;
pub mod config;
pub mod display;
pub mod sensors;
pub mod storage;
pub mod time;
