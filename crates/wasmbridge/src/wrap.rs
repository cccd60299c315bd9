//! Wrapping module functions with argument and result conversion.

use std::fmt;
use std::sync::Arc;

use wasmbridge_types::{Error, Result};
use wasmi::{core::ValType, Func};

use crate::adapter::{ArgAdapter, ArgConverter, ResultConverter};
use crate::env::Env;
use crate::funcptr::FuncPtrAdapter;
use crate::pointer::Ptr;
use crate::table::FunctionEntry;
use crate::value::Value;

/// The function a wrapper calls.
#[derive(Debug, Clone)]
pub enum Target {
    /// An export of the attached instance.
    Export(String),
    Func(Func),
    /// An index into the call table.
    Pointer(Ptr),
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Export(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Export(name)
    }
}

impl From<Func> for Target {
    fn from(f: Func) -> Self {
        Self::Func(f)
    }
}

impl From<Ptr> for Target {
    fn from(p: Ptr) -> Self {
        Self::Pointer(p)
    }
}

/// One argument's conversion: a registered tag or an adapter instance.
#[derive(Clone)]
pub enum ArgSpec {
    Tag(String),
    Adapter(Arc<dyn ArgAdapter>),
}

impl fmt::Debug for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(t) => f.debug_tuple("Tag").field(t).finish(),
            Self::Adapter(_) => f.write_str("Adapter(..)"),
        }
    }
}

impl From<&str> for ArgSpec {
    fn from(tag: &str) -> Self {
        Self::Tag(tag.to_string())
    }
}

impl From<String> for ArgSpec {
    fn from(tag: String) -> Self {
        Self::Tag(tag)
    }
}

impl From<FuncPtrAdapter> for ArgSpec {
    fn from(a: FuncPtrAdapter) -> Self {
        Self::Adapter(Arc::new(a))
    }
}

impl From<Arc<FuncPtrAdapter>> for ArgSpec {
    fn from(a: Arc<FuncPtrAdapter>) -> Self {
        Self::Adapter(a)
    }
}

/// A module function with its converters resolved.
///
/// Wrappers do not borrow the store; call them with any [`Env`] over the
/// same store, including one inside a host callback.
#[derive(Clone)]
pub struct Wrapped {
    name: String,
    func: Func,
    params: Vec<ValType>,
    result: ResultConverter,
    args: Vec<ArgConverter>,
    /// Nullary target with the `null` result tag: called as-is.
    direct: bool,
}

impl fmt::Debug for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapped")
            .field("name", &self.name)
            .field("arity", &self.params.len())
            .finish_non_exhaustive()
    }
}

impl Wrapped {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn func(&self) -> Func {
        self.func
    }

    fn arity_error(&self, actual: usize) -> Error {
        Error::Arity {
            name: self.name.clone(),
            expected: self.params.len(),
            actual,
        }
    }

    /// Convert `args`, call the target, and convert its result.
    ///
    /// Temporary allocations made by argument converters live in a scope
    /// that is closed before this returns.
    pub fn call(&self, env: &mut Env<'_>, args: Vec<Value>) -> Result<Value> {
        if args.len() != self.params.len() {
            return Err(self.arity_error(args.len()));
        }
        if self.direct {
            return env.call_values(&self.func, &self.params, &args);
        }
        if self.params.is_empty() {
            let raw = env.call_values(&self.func, &self.params, &args)?;
            return self.result.convert(env, raw);
        }
        env.scoped_alloc_call(|env| {
            let mut argv = args;
            for (i, conv) in self.args.iter().enumerate() {
                let raw = argv[i].clone();
                argv[i] = conv.convert(env, raw, &argv, i)?;
            }
            let raw = env.call_values(&self.func, &self.params, &argv)?;
            self.result.convert(env, raw)
        })
    }
}

impl Env<'_> {
    /// Look up an exported function by name.
    pub fn xget(&self, name: &str) -> Result<Func> {
        self.exports()?
            .instance
            .and_then(|i| i.get_func(&self.cx, name))
            .ok_or_else(|| Error::MissingExport(name.to_string()))
    }

    fn resolve_target(&mut self, target: Target) -> Result<(String, Func)> {
        match target {
            Target::Export(name) => {
                let f = self.xget(&name)?;
                Ok((name, f))
            }
            Target::Func(f) => Ok(("unnamed function".to_string(), f)),
            Target::Pointer(p) => match self.function_entry(p)? {
                FunctionEntry::Func(f) => Ok((format!("function@{}", p.get()), f)),
                _ => Err(Error::invalid_type(format!(
                    "function pointer {} not found in the function table",
                    p.get()
                ))),
            },
        }
    }

    /// Call with host values mapped to `params`; returns the first result
    /// or `Undefined`.
    pub(crate) fn call_values(&mut self, func: &Func, params: &[ValType], args: &[Value]) -> Result<Value> {
        let vals = args
            .iter()
            .zip(params)
            .map(|(v, ty)| v.to_val(*ty))
            .collect::<Result<Vec<_>>>()?;
        let out = self.call_func(func, &vals)?;
        Ok(out.first().map_or(Value::Undefined, Value::from_val))
    }

    /// Build a wrapper around `target`.
    ///
    /// Fails if the number of argument specs differs from the target's
    /// arity, or if a tag has no registered converter. Converters are
    /// resolved now; later registry changes do not affect the wrapper.
    pub fn xwrap<S>(&mut self, target: impl Into<Target>, result: &str, args: S) -> Result<Wrapped>
    where
        S: IntoIterator,
        S::Item: Into<ArgSpec>,
    {
        let (name, func) = self.resolve_target(target.into())?;
        let params: Vec<ValType> = func.ty(&self.cx).params().to_vec();
        let specs: Vec<ArgSpec> = args.into_iter().map(Into::into).collect();
        if specs.len() != params.len() {
            return Err(Error::Arity {
                name,
                expected: params.len(),
                actual: specs.len(),
            });
        }
        let direct = params.is_empty() && result == "null";
        let result = self.result_adapter(result)?;
        let args = specs
            .into_iter()
            .map(|spec| match spec {
                ArgSpec::Tag(tag) => self.arg_adapter(&tag),
                ArgSpec::Adapter(a) => Ok(ArgConverter::Custom(a)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Wrapped {
            name,
            func,
            params,
            result,
            args,
            direct,
        })
    }

    /// Call an export with host values, checking arity but converting
    /// nothing beyond the wasm value mapping.
    pub fn xcall(&mut self, target: impl Into<Target>, args: &[Value]) -> Result<Value> {
        let (name, func) = self.resolve_target(target.into())?;
        let params: Vec<ValType> = func.ty(&self.cx).params().to_vec();
        if args.len() != params.len() {
            return Err(Error::Arity {
                name,
                expected: params.len(),
                actual: args.len(),
            });
        }
        self.call_values(&func, &params, args)
    }

    /// [`Env::xwrap`] and call in one step.
    pub fn xcall_wrapped<S>(
        &mut self,
        target: impl Into<Target>,
        result: &str,
        specs: S,
        args: Vec<Value>,
    ) -> Result<Value>
    where
        S: IntoIterator,
        S::Item: Into<ArgSpec>,
    {
        let wrapped = self.xwrap(target, result, specs)?;
        wrapped.call(self, args)
    }
}
