//! Named argument and result converters used by [`Env::xwrap`].
//!
//! Two independent namespaces map type tags to converters. The built-in
//! converters are a closed set; anything registered by the embedder is a
//! trait object.
//!
//! | Tag                         | Argument                   | Result                      |
//! |-----------------------------|----------------------------|-----------------------------|
//! | `i8`, `i16`                 | mask to 8/16 bits          | same                        |
//! | `i32`, `int`                | wrap to 32 bits            | same                        |
//! | `i64`                       | 64-bit (wide integers)     | same                        |
//! | `f32` `float` `f64` `double`| to float                   | same                        |
//! | `null`                      | as-is                      | as-is                       |
//! | `*`, `**`, `T*`             | pointer                    | pointer                     |
//! | `pointer`                   |                            | pointer                     |
//! | `number`                    |                            | to float                    |
//! | `void`                      |                            | `Undefined`                 |
//! | `string`, `utf8`            | scoped C-string            | decode C-string             |
//! | `string:dealloc`, `utf8:dealloc` |                       | decode, then free           |
//! | `json`, `json:dealloc`      |                            | decode and parse            |
//!
//! [`Env::xwrap`]: crate::Env::xwrap

use std::collections::HashMap;
use std::sync::Arc;

use wasmbridge_types::{Error, Result};

use crate::env::Env;
use crate::pointer::PointerModel;
use crate::value::Value;

/// A custom argument converter.
///
/// `argv` holds the whole argument list, with entries left of `index`
/// already converted.
pub trait ArgAdapter: Send + Sync {
    fn convert_arg(&self, env: &mut Env<'_>, value: Value, argv: &[Value], index: usize)
        -> Result<Value>;
}

/// A custom result converter.
pub trait ResultAdapter: Send + Sync {
    fn convert_result(&self, env: &mut Env<'_>, value: Value) -> Result<Value>;
}

impl<F> ArgAdapter for F
where
    F: Fn(&mut Env<'_>, Value, &[Value], usize) -> Result<Value> + Send + Sync,
{
    fn convert_arg(
        &self,
        env: &mut Env<'_>,
        value: Value,
        argv: &[Value],
        index: usize,
    ) -> Result<Value> {
        self(env, value, argv, index)
    }
}

impl<F> ResultAdapter for F
where
    F: Fn(&mut Env<'_>, Value) -> Result<Value> + Send + Sync,
{
    fn convert_result(&self, env: &mut Env<'_>, value: Value) -> Result<Value> {
        self(env, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinArg {
    I8,
    I16,
    I32,
    I64,
    Float,
    Null,
    Pointer,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinResult {
    I8,
    I16,
    I32,
    I64,
    Float,
    Pointer,
    Number,
    Void,
    Null,
    String,
    StringDealloc,
    Json,
    JsonDealloc,
}

#[derive(Clone)]
pub enum ArgConverter {
    Builtin(BuiltinArg),
    Custom(Arc<dyn ArgAdapter>),
}

#[derive(Clone)]
pub enum ResultConverter {
    Builtin(BuiltinResult),
    Custom(Arc<dyn ResultAdapter>),
}

fn wrap_int(v: &Value, mask: Option<i64>) -> Result<Value> {
    let i = v.as_i64()? as i32 as i64;
    Ok(Value::Int(match mask {
        Some(m) => i & m,
        None => i,
    }))
}

impl BuiltinArg {
    fn apply(self, env: &mut Env<'_>, v: Value) -> Result<Value> {
        match self {
            Self::I8 => wrap_int(&v, Some(0xFF)),
            Self::I16 => wrap_int(&v, Some(0xFFFF)),
            Self::I32 => wrap_int(&v, None),
            Self::I64 => Ok(Value::Int(v.as_i64()?)),
            Self::Float => Ok(Value::Float(v.as_f64()?)),
            Self::Null => Ok(v),
            Self::Pointer => Ok(env.pointer().coerce(&v)?.into()),
            Self::String => match &v {
                Value::Str(s) => Ok(env.scoped_alloc_cstring(s)?.into()),
                _ => Ok(env.pointer().coerce(&v)?.into()),
            },
        }
    }
}

impl BuiltinResult {
    fn apply(self, env: &mut Env<'_>, v: Value) -> Result<Value> {
        match self {
            Self::I8 => wrap_int(&v, Some(0xFF)),
            Self::I16 => wrap_int(&v, Some(0xFFFF)),
            Self::I32 => wrap_int(&v, None),
            Self::I64 => Ok(Value::Int(v.as_i64()?)),
            Self::Float | Self::Number => Ok(Value::Float(v.as_f64()?)),
            Self::Pointer => Ok(env.pointer().coerce(&v)?.into()),
            Self::Void => Ok(Value::Undefined),
            Self::Null => Ok(v),
            Self::String => {
                let ptr = env.pointer().coerce(&v)?;
                Ok(env.cstr_to_string(ptr)?.map_or(Value::Null, Value::Str))
            }
            Self::StringDealloc => {
                let ptr = env.pointer().coerce(&v)?;
                let decoded = env.cstr_to_string(ptr);
                env.dealloc(ptr)?;
                Ok(decoded?.map_or(Value::Null, Value::Str))
            }
            Self::Json => {
                let ptr = env.pointer().coerce(&v)?;
                parse_json(env.cstr_to_string(ptr)?)
            }
            Self::JsonDealloc => {
                let ptr = env.pointer().coerce(&v)?;
                let decoded = env.cstr_to_string(ptr);
                env.dealloc(ptr)?;
                parse_json(decoded?)
            }
        }
    }
}

fn parse_json(s: Option<String>) -> Result<Value> {
    match s {
        Some(s) => Ok(Value::Json(serde_json::from_str(&s)?)),
        None => Ok(Value::Null),
    }
}

impl ArgConverter {
    pub fn convert(
        &self,
        env: &mut Env<'_>,
        value: Value,
        argv: &[Value],
        index: usize,
    ) -> Result<Value> {
        match self {
            Self::Builtin(b) => b.apply(env, value),
            Self::Custom(a) => a.convert_arg(env, value, argv, index),
        }
    }
}

impl ResultConverter {
    pub fn convert(&self, env: &mut Env<'_>, value: Value) -> Result<Value> {
        match self {
            Self::Builtin(b) => b.apply(env, value),
            Self::Custom(a) => a.convert_result(env, value),
        }
    }
}

const NUMERIC_TAGS: [&str; 9] = [
    "i8", "i16", "i32", "i64", "int", "f32", "float", "f64", "double",
];

/// Argument and result converters keyed by type tag.
#[derive(Clone)]
pub struct AdapterRegistry {
    args: HashMap<String, ArgConverter>,
    results: HashMap<String, ResultConverter>,
}

impl AdapterRegistry {
    /// A registry holding the built-in converters. `i64` is only present
    /// with wide integers.
    pub fn new(ptr: &PointerModel) -> Self {
        use ArgConverter as A;
        use BuiltinArg as BA;
        use BuiltinResult as BR;
        use ResultConverter as R;

        let mut args = HashMap::new();
        let mut results = HashMap::new();
        for tag in NUMERIC_TAGS {
            let (a, r) = match tag {
                "i8" => (BA::I8, BR::I8),
                "i16" => (BA::I16, BR::I16),
                "i32" | "int" => (BA::I32, BR::I32),
                "i64" => (BA::I64, BR::I64),
                _ => (BA::Float, BR::Float),
            };
            if tag == "i64" && !ptr.wide_integers() {
                continue;
            }
            args.insert(tag.to_string(), A::Builtin(a));
            results.insert(tag.to_string(), R::Builtin(r));
            args.insert(format!("{tag}*"), A::Builtin(BA::Pointer));
            results.insert(format!("{tag}*"), R::Builtin(BR::Pointer));
        }
        args.insert("null".to_string(), A::Builtin(BA::Null));
        args.insert("*".to_string(), A::Builtin(BA::Pointer));
        args.insert("**".to_string(), A::Builtin(BA::Pointer));
        args.insert("string".to_string(), A::Builtin(BA::String));
        args.insert("utf8".to_string(), A::Builtin(BA::String));

        for (tag, r) in [
            ("*", BR::Pointer),
            ("pointer", BR::Pointer),
            ("number", BR::Number),
            ("void", BR::Void),
            ("null", BR::Null),
            ("string", BR::String),
            ("utf8", BR::String),
            ("string:dealloc", BR::StringDealloc),
            ("utf8:dealloc", BR::StringDealloc),
            ("json", BR::Json),
            ("json:dealloc", BR::JsonDealloc),
        ] {
            results.insert(tag.to_string(), R::Builtin(r));
        }
        Self { args, results }
    }

    pub fn arg(&self, tag: &str) -> Option<ArgConverter> {
        self.args.get(tag).cloned()
    }

    pub fn result(&self, tag: &str) -> Option<ResultConverter> {
        self.results.get(tag).cloned()
    }

    /// Register (or with `None`, delete) an argument converter.
    pub fn set_arg(&mut self, tag: &str, adapter: Option<Arc<dyn ArgAdapter>>) -> Result<()> {
        check_tag(tag)?;
        match adapter {
            Some(a) => {
                self.args.insert(tag.to_string(), ArgConverter::Custom(a));
            }
            None => {
                self.args.remove(tag);
            }
        }
        Ok(())
    }

    /// Register (or with `None`, delete) a result converter.
    pub fn set_result(&mut self, tag: &str, adapter: Option<Arc<dyn ResultAdapter>>) -> Result<()> {
        check_tag(tag)?;
        match adapter {
            Some(a) => {
                self.results
                    .insert(tag.to_string(), ResultConverter::Custom(a));
            }
            None => {
                self.results.remove(tag);
            }
        }
        Ok(())
    }

    pub fn delete_arg(&mut self, tag: &str) -> Option<ArgConverter> {
        self.args.remove(tag)
    }

    pub fn delete_result(&mut self, tag: &str) -> Option<ResultConverter> {
        self.results.remove(tag)
    }
}

fn check_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::invalid_type("adapter type tag must not be empty"));
    }
    Ok(())
}

impl Env<'_> {
    /// Look up an argument converter, failing if none is registered.
    pub fn arg_adapter(&self, tag: &str) -> Result<ArgConverter> {
        self.bridge()
            .adapters
            .arg(tag)
            .ok_or_else(|| Error::MissingAdapter {
                mode: "argument",
                tag: tag.to_string(),
            })
    }

    /// Look up a result converter, failing if none is registered.
    pub fn result_adapter(&self, tag: &str) -> Result<ResultConverter> {
        self.bridge()
            .adapters
            .result(tag)
            .ok_or_else(|| Error::MissingAdapter {
                mode: "result",
                tag: tag.to_string(),
            })
    }

    /// Apply the argument converter for `tag` to a single value.
    pub fn convert_arg(&mut self, tag: &str, value: Value) -> Result<Value> {
        let conv = self.arg_adapter(tag)?;
        let argv = [value.clone()];
        conv.convert(self, value, &argv, 0)
    }

    /// Apply the result converter for `tag` to a single value.
    pub fn convert_result(&mut self, tag: &str, value: Value) -> Result<Value> {
        let conv = self.result_adapter(tag)?;
        conv.convert(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmbridge_types::Config;

    fn registry(wide: bool) -> AdapterRegistry {
        let ptr = PointerModel::new(&Config::default().with_wide_integers(wide)).unwrap();
        AdapterRegistry::new(&ptr)
    }

    #[test]
    fn builtins_cover_numeric_and_pointer_tags() {
        let r = registry(true);
        for tag in ["i8", "i16", "i32", "int", "i64", "f32", "double", "int*", "f64*"] {
            assert!(r.arg(tag).is_some(), "arg {tag}");
            assert!(r.result(tag).is_some(), "result {tag}");
        }
        assert!(r.arg("**").is_some());
        assert!(r.arg("pointer").is_none());
        assert!(r.result("pointer").is_some());
        assert!(r.arg("json").is_none());
        assert!(r.result("json:dealloc").is_some());
        assert!(r.arg("sqlite3*").is_none());
    }

    #[test]
    fn i64_needs_wide_integers() {
        let r = registry(false);
        assert!(r.arg("i64").is_none());
        assert!(r.result("i64*").is_none());
        assert!(r.arg("i32").is_some());
    }

    #[test]
    fn set_and_delete() {
        let mut r = registry(true);
        fn identity(_: &mut Env<'_>, v: Value) -> Result<Value> {
            Ok(v)
        }
        let conv: Arc<dyn ResultAdapter> = Arc::new(identity);
        r.set_result("handle", Some(conv)).unwrap();
        assert!(matches!(r.result("handle"), Some(ResultConverter::Custom(_))));
        r.set_result("handle", None).unwrap();
        assert!(r.result("handle").is_none());
        assert!(r.delete_arg("i8").is_some());
        assert!(r.arg("i8").is_none());
        assert!(r.set_arg("", None).is_err());
    }

    #[test]
    fn integer_wrapping() {
        assert_eq!(wrap_int(&Value::Int(0x1_2345), Some(0xFF)).unwrap(), Value::Int(0x45));
        assert_eq!(wrap_int(&Value::Int(-1), Some(0xFFFF)).unwrap(), Value::Int(0xFFFF));
        assert_eq!(
            wrap_int(&Value::Int(0x8000_0000), None).unwrap(),
            Value::Int(-0x8000_0000)
        );
        assert_eq!(wrap_int(&Value::Float(3.7), None).unwrap(), Value::Int(3));
    }
}
