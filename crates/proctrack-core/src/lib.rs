//! Proctrack Core - Platform-independent abstractions and configurations
//!
//! This crate provides the process traits, output buffers, configuration and
//! error types shared by the platform-specific implementations and the
//! session/monitor registries.

pub mod buffer;
pub mod config;
pub mod error;
pub mod process;
pub mod stdio;

pub use buffer::*;
pub use config::*;
pub use error::*;
pub use process::*;
pub use stdio::*;
