//! Host-side values exchanged with wrapped calls and callbacks.

use std::fmt;
use std::sync::Arc;

use wasmbridge_types::{Error, Result};
use wasmi::{core::ValType, FuncRef, Val};

use crate::env::Env;
use crate::pointer::Ptr;

/// A host closure callable from the module.
///
/// The closure receives the environment of the call that invoked it, so it
/// can read memory, allocate, and call back into the module.
pub type HostFn = Arc<dyn Fn(&mut Env<'_>, &[Value]) -> Result<Value> + Send + Sync>;

/// Box a closure as a [`HostFn`].
pub fn host_fn<F>(f: F) -> HostFn
where
    F: Fn(&mut Env<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A host value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
    Func(HostFn),
}

impl Value {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&mut Env<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    /// `Null` or `Undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Json(_) => "json",
            Self::Func(_) => "function",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer coercion. Nullish values are 0, floats truncate toward zero.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Undefined | Self::Null => Ok(0),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int(i) => Ok(*i),
            Self::Float(f) => Ok(*f as i64),
            other => Err(Error::invalid_type(format!(
                "expected a number, got {}",
                other.type_name()
            ))),
        }
    }

    /// Float coercion. Nullish values are 0.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Undefined | Self::Null => Ok(0.0),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            other => Err(Error::invalid_type(format!(
                "expected a number, got {}",
                other.type_name()
            ))),
        }
    }

    /// Convert to a wasm value of the given type.
    pub fn to_val(&self, ty: ValType) -> Result<Val> {
        match ty {
            ValType::I32 => Ok(Val::I32(self.as_i64()? as i32)),
            ValType::I64 => Ok(Val::I64(self.as_i64()?)),
            ValType::F32 => Ok(Val::F32((self.as_f64()? as f32).into())),
            ValType::F64 => Ok(Val::F64(self.as_f64()?.into())),
            ValType::FuncRef if self.is_nullish() => Ok(Val::FuncRef(FuncRef::null())),
            other => Err(Error::invalid_type(format!(
                "cannot pass {} as {other:?}",
                self.type_name()
            ))),
        }
    }

    /// Convert a wasm value to a host value. Integers are read signed.
    pub fn from_val(val: &Val) -> Self {
        match val {
            Val::I32(i) => Self::Int(i64::from(*i)),
            Val::I64(i) => Self::Int(*i),
            Val::F32(f) => Self::Float(f64::from(f32::from(*f))),
            Val::F64(f) => Self::Float(f64::from(*f)),
            Val::FuncRef(r) if r.is_null() => Self::Null,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Json(j) => f.debug_tuple("Json").field(j).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Func(a), Self::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Ptr> for Value {
    fn from(p: Ptr) -> Self {
        Self::Int(p.get() as i64)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Self::Json(j)
    }
}

impl From<HostFn> for Value {
    fn from(f: HostFn) -> Self {
        Self::Func(f)
    }
}
