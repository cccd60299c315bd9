//! Shared types for wasmbridge.
//!
//! This crate defines the error taxonomy, memory type tags, callback
//! signatures, binding lifetimes, and configuration used by the runtime
//! and its fixtures.

mod config;
mod error;
mod ir;
mod signature;

pub use config::{Config, ExportNames};
pub use error::{Error, ErrorKind};
pub use ir::{size_of_ir, IrType, PointerIr};
pub use signature::{BindScope, SigType, Signature};

/// Result type used throughout wasmbridge.
pub type Result<T> = std::result::Result<T, Error>;
