#![deny(clippy::all)]

pub mod commands;
pub mod stdio_bus;
pub mod telemetry;
