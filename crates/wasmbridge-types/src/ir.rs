//! Memory-access type tags and the pointer representation.
//!
//! Tags follow the LLVM-IR-like spelling used by C bindings:
//!
//! | Tag                 | Width | Notes                              |
//! |---------------------|-------|------------------------------------|
//! | `i1`, `i8`          | 1     | signed byte                        |
//! | `i16`               | 2     |                                    |
//! | `i32`               | 4     |                                    |
//! | `i64`               | 8     | requires wide-integer support      |
//! | `f32`, `float`      | 4     |                                    |
//! | `f64`, `double`     | 8     |                                    |
//! | `*`, `T*`           | 4 / 8 | resolves to the active pointer IR  |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Numeric representation of a pointer at the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerIr {
    /// 32-bit addresses (`wasm32`).
    I32,
    /// 64-bit addresses (`memory64`).
    I64,
}

impl PointerIr {
    /// Pointer width in bytes.
    pub const fn size(self) -> u8 {
        match self {
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }

    /// The IR matching a pointer width, if the width is supported.
    pub const fn from_size(size: u8) -> Option<Self> {
        match size {
            4 => Some(Self::I32),
            8 => Some(Self::I64),
            _ => None,
        }
    }

    /// The integer type a pointer is read and written as.
    pub const fn ir_type(self) -> IrType {
        match self {
            Self::I32 => IrType::I32,
            Self::I64 => IrType::I64,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
        }
    }
}

impl fmt::Display for PointerIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointerIr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            other => Err(Error::Configuration(format!("invalid pointer IR: {other}"))),
        }
    }
}

/// A typed memory-access tag as accepted by `peek`/`poke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Pointer-sized integer; see [`IrType::resolve`].
    Ptr,
}

impl IrType {
    /// Replace [`IrType::Ptr`] with the concrete integer type for `ptr`.
    pub const fn resolve(self, ptr: PointerIr) -> IrType {
        match self {
            Self::Ptr => ptr.ir_type(),
            other => other,
        }
    }

    /// Width in bytes under the given pointer representation.
    pub const fn size(self, ptr: PointerIr) -> usize {
        match self.resolve(ptr) {
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
            Self::Ptr => ptr.size() as usize,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl FromStr for IrType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "i1" | "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "f32" | "float" => Ok(Self::F32),
            "f64" | "double" => Ok(Self::F64),
            s if s.ends_with('*') => Ok(Self::Ptr),
            other => Err(Error::invalid_type(format!("invalid memory type tag: {other}"))),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Ptr => "*",
        };
        f.write_str(s)
    }
}

/// `sizeof` for an IR-like tag, or `None` for tags with no fixed size.
///
/// Unlike [`IrType::from_str`], `i1` is not accepted here.
pub fn size_of_ir(tag: &str, ptr: PointerIr) -> Option<usize> {
    match tag {
        "i8" => Some(1),
        "i16" => Some(2),
        "i32" | "f32" | "float" => Some(4),
        "i64" | "f64" | "double" => Some(8),
        t if t.ends_with('*') => Some(ptr.size() as usize),
        _ => None,
    }
}
