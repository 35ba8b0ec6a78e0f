//! procrelay core - platform-independent launch configuration, output relay and discovery
//!
//! This crate provides the types, traits and error types that are shared
//! between the platform termination crates and the `procrelay` facade.

mod config;
mod error;
mod process;
mod relay;
mod stdio;

pub mod discovery;

pub use config::*;
pub use error::*;
pub use process::*;
pub use relay::*;
pub use stdio::*;
