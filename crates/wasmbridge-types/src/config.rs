//! Bridge configuration.
//!
//! All scalars are fixed at setup. The configuration can be built in code
//! or deserialized from JSON:
//!
//! ```json
//! { "pointer_ir": "i64", "wide_integers": true,
//!   "exports": { "alloc": "sqlite3_malloc", "dealloc": "sqlite3_free" } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, PointerIr};

/// Names of the module exports the bridge looks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    pub memory: String,
    pub table: String,
    pub alloc: String,
    pub dealloc: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            table: "__indirect_function_table".to_string(),
            alloc: "alloc".to_string(),
            dealloc: "dealloc".to_string(),
        }
    }
}

/// Setup-time configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pointer representation. Derived from `pointer_size` when unset.
    pub pointer_ir: Option<PointerIr>,
    /// Pointer width in bytes. Derived from `pointer_ir` when unset.
    pub pointer_size: Option<u8>,
    /// Enables 64-bit integer heap views, `i64` adapters and 64-bit pointers.
    pub wide_integers: bool,
    pub exports: ExportNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pointer_ir: None,
            pointer_size: None,
            wide_integers: true,
            exports: ExportNames::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_pointer_ir(mut self, ir: PointerIr) -> Self {
        self.pointer_ir = Some(ir);
        self
    }

    pub fn with_pointer_size(mut self, size: u8) -> Self {
        self.pointer_size = Some(size);
        self
    }

    pub fn with_wide_integers(mut self, enabled: bool) -> Self {
        self.wide_integers = enabled;
        self
    }

    pub fn with_allocator(mut self, alloc: impl Into<String>, dealloc: impl Into<String>) -> Self {
        self.exports.alloc = alloc.into();
        self.exports.dealloc = dealloc.into();
        self
    }

    /// Resolve the pointer representation, checking that IR and size agree.
    pub fn resolve_pointer(&self) -> Result<PointerIr, Error> {
        match (self.pointer_ir, self.pointer_size) {
            (None, None) => Ok(PointerIr::I32),
            (Some(ir), None) => Ok(ir),
            (None, Some(size)) => PointerIr::from_size(size)
                .ok_or_else(|| Error::Configuration(format!("invalid pointer size: {size}"))),
            (Some(ir), Some(size)) => {
                if PointerIr::from_size(size).is_none() {
                    return Err(Error::Configuration(format!("invalid pointer size: {size}")));
                }
                if ir.size() != size {
                    return Err(Error::Configuration(format!(
                        "pointer IR {ir} does not match pointer size {size}"
                    )));
                }
                Ok(ir)
            }
        }
    }
}
