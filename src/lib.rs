//! Inverter Property Bridge library.
//!
//! Turns polled solar inverter readings into push-updated typed properties
//! and routes client writes of `power_limit` back to the inverter.

pub mod config;
pub mod device;
pub mod error;
pub mod input;
pub mod publish;
pub mod thing;
