//! # E-Paper Server Library
//!
//! Poll server for battery-powered e-paper displays.
//!
//! The display wakes up, polls `/api/display` with its battery voltage and
//! signal strength in the request headers, downloads the bitmap it is
//! pointed to and goes back to sleep. This library provides the telemetry
//! journal, the footer composition and the alternating image URLs behind
//! that exchange.

pub mod config;
pub mod error;
pub mod logging;
pub mod poll;
pub mod render;
pub mod server;
pub mod service;
pub mod settings;
pub mod telemetry;
