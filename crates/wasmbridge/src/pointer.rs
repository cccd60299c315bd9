//! Addresses and the pointer representation.
//!
//! Inside the host every address is a [`Ptr`] (a `u64`). The configured
//! [`PointerIr`] only matters at the boundary to the module calling
//! convention, where a pointer travels as an `i32` or an `i64`.

use std::fmt;

use wasmbridge_types::{Config, Error, IrType, PointerIr, Result};
use wasmi::{core::ValType, Val};

use crate::value::Value;

/// A byte offset into linear memory, or a function-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ptr(pub u64);

impl Ptr {
    pub const NULL: Ptr = Ptr(0);

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn offset(self, bytes: u64) -> Ptr {
        Ptr(self.0.wrapping_add(bytes))
    }
}

impl From<u32> for Ptr {
    fn from(v: u32) -> Self {
        Ptr(u64::from(v))
    }
}

impl From<u64> for Ptr {
    fn from(v: u64) -> Self {
        Ptr(v)
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The active pointer representation plus the wide-integer switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerModel {
    ir: PointerIr,
    wide_integers: bool,
}

impl PointerModel {
    pub fn new(config: &Config) -> Result<Self> {
        let ir = config.resolve_pointer()?;
        if ir == PointerIr::I64 && !config.wide_integers {
            return Err(Error::Configuration(
                "64-bit pointers require wide integer support".to_string(),
            ));
        }
        Ok(Self {
            ir,
            wide_integers: config.wide_integers,
        })
    }

    pub const fn null(&self) -> Ptr {
        Ptr::NULL
    }

    pub const fn ir(&self) -> PointerIr {
        self.ir
    }

    /// Pointer width in bytes.
    pub const fn size(&self) -> usize {
        self.ir.size() as usize
    }

    pub const fn wide_integers(&self) -> bool {
        self.wide_integers
    }

    /// The wasm value type pointers travel as.
    pub const fn val_type(&self) -> ValType {
        match self.ir {
            PointerIr::I32 => ValType::I32,
            PointerIr::I64 => ValType::I64,
        }
    }

    /// Fails with [`Error::WideIntegerDisabled`] for `i64` without wide integers.
    pub fn check_ir(&self, ty: IrType) -> Result<IrType> {
        let ty = ty.resolve(self.ir);
        if ty == IrType::I64 && !self.wide_integers {
            return Err(Error::WideIntegerDisabled);
        }
        Ok(ty)
    }

    fn mask(&self, raw: u64) -> Ptr {
        match self.ir {
            PointerIr::I32 => Ptr(raw & 0xFFFF_FFFF),
            PointerIr::I64 => Ptr(raw),
        }
    }

    /// Coerce a host value to a pointer. `Null` and `Undefined` become null.
    pub fn coerce(&self, v: &Value) -> Result<Ptr> {
        match v {
            Value::Str(_) | Value::Json(_) | Value::Func(_) => Err(Error::invalid_type(format!(
                "cannot use a {} as a pointer",
                v.type_name()
            ))),
            other => Ok(self.mask(other.as_i64()? as u64)),
        }
    }

    /// Sum mixed values into a pointer.
    pub fn add(&self, values: &[Value]) -> Result<Ptr> {
        let mut sum = 0i64;
        for v in values {
            sum = sum.wrapping_add(self.coerce_signed(v)?);
        }
        Ok(self.mask(sum as u64))
    }

    /// Like [`PointerModel::add`] but returns a plain index.
    pub fn addn(&self, values: &[Value]) -> Result<usize> {
        let ptr = self.add(values)?;
        usize::try_from(ptr.get())
            .map_err(|_| Error::invalid_type(format!("address {ptr} does not fit in usize")))
    }

    fn coerce_signed(&self, v: &Value) -> Result<i64> {
        match v {
            Value::Str(_) | Value::Json(_) | Value::Func(_) => Err(Error::invalid_type(format!(
                "cannot use a {} as a pointer",
                v.type_name()
            ))),
            other => other.as_i64(),
        }
    }

    /// Whether `v` is a value that can be used as a pointer as-is.
    pub fn is_ptr(&self, v: &Value) -> bool {
        let max = match self.ir {
            PointerIr::I32 => u64::from(u32::MAX),
            PointerIr::I64 => u64::MAX,
        };
        match v {
            Value::Int(i) => *i >= 0 && (*i as u64) <= max,
            Value::Float(f) => f.fract() == 0.0 && *f >= 0.0 && *f <= max as f64,
            _ => false,
        }
    }

    /// Pointer to its boundary representation.
    pub fn to_val(&self, ptr: Ptr) -> Val {
        match self.ir {
            PointerIr::I32 => Val::I32(ptr.get() as u32 as i32),
            PointerIr::I64 => Val::I64(ptr.get() as i64),
        }
    }

    /// Boundary value to a pointer. Narrow values are read unsigned.
    pub fn from_val(&self, val: &Val) -> Result<Ptr> {
        match val {
            Val::I32(i) => Ok(Ptr(u64::from(*i as u32))),
            Val::I64(i) => Ok(self.mask(*i as u64)),
            other => Err(Error::invalid_type(format!(
                "expected a pointer, got {:?}",
                other.ty()
            ))),
        }
    }
}
