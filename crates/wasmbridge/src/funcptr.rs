//! A stateful argument adapter for function-pointer parameters.
//!
//! Given a host closure, [`FuncPtrAdapter`] installs it into the call table
//! and passes the slot index; given a pointer it passes it through. Bindings
//! that outlive one call (`singleton`, `context`) are remembered so that
//! passing the same closure again reuses the slot, and passing a different
//! one replaces it. A replaced slot is uninstalled when the current scope
//! closes, because the in-flight call may still use it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use wasmbridge_types::{BindScope, Error, Result, Signature};

use crate::adapter::ArgAdapter;
use crate::env::Env;
use crate::pointer::Ptr;
use crate::scope::ScopeEntry;
use crate::table::Callback;
use crate::value::{HostFn, Value};

/// Derives the binding key from the argument list and this argument's index.
pub type ContextKeyFn = Arc<dyn Fn(&[Value], usize) -> Result<String> + Send + Sync>;

/// Replaces a closure before installation, e.g. to add error handling.
pub type CallProxy = Arc<dyn Fn(HostFn) -> HostFn + Send + Sync>;

#[derive(Clone)]
pub struct FuncPtrAdapterOptions {
    pub name: String,
    pub signature: String,
    pub bind_scope: Option<BindScope>,
    pub context_key: Option<ContextKeyFn>,
    pub call_proxy: Option<CallProxy>,
}

impl FuncPtrAdapterOptions {
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            bind_scope: None,
            context_key: None,
            call_proxy: None,
        }
    }

    pub fn bind_scope(mut self, scope: BindScope) -> Self {
        self.bind_scope = Some(scope);
        self
    }

    pub fn context_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], usize) -> Result<String> + Send + Sync + 'static,
    {
        self.context_key = Some(Arc::new(f));
        self
    }

    pub fn call_proxy<F>(mut self, f: F) -> Self
    where
        F: Fn(HostFn) -> HostFn + Send + Sync + 'static,
    {
        self.call_proxy = Some(Arc::new(f));
        self
    }
}

#[derive(Clone)]
enum Binding {
    /// A closure we installed. `func` is the value the caller passed, before
    /// any call proxy.
    Bound { func: HostFn, slot: Ptr },
    /// A pointer supplied by the caller. Owns nothing.
    Passthrough(Ptr),
}

pub struct FuncPtrAdapter {
    name: String,
    signature: Signature,
    bind_scope: BindScope,
    context_key: Option<ContextKeyFn>,
    call_proxy: Option<CallProxy>,
    bindings: Mutex<HashMap<String, Binding>>,
}

impl fmt::Debug for FuncPtrAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncPtrAdapter")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("bind_scope", &self.bind_scope)
            .finish_non_exhaustive()
    }
}

impl FuncPtrAdapter {
    pub fn new(opts: FuncPtrAdapterOptions) -> Result<Self> {
        let signature: Signature = opts.signature.parse()?;
        let bind_scope = match (opts.bind_scope, &opts.context_key) {
            (Some(scope), _) => scope,
            (None, Some(_)) => BindScope::Context,
            (None, None) => {
                return Err(Error::invalid_type(format!(
                    "FuncPtrAdapter {} requires a bind scope (transient, context, singleton, permanent)",
                    opts.name
                )))
            }
        };
        Ok(Self {
            name: opts.name,
            signature,
            bind_scope,
            context_key: opts.context_key,
            call_proxy: opts.call_proxy,
            bindings: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn bind_scope(&self) -> BindScope {
        self.bind_scope
    }

    /// Slot currently bound for `key` (`""` for singletons), if any.
    pub fn bound_slot(&self, key: &str) -> Option<Ptr> {
        match self.bindings.lock().get(key) {
            Some(Binding::Bound { slot, .. }) => Some(*slot),
            Some(Binding::Passthrough(p)) if !p.is_null() => Some(*p),
            _ => None,
        }
    }

    /// Binding key for this call, or `None` when bindings are not kept.
    fn key(&self, argv: &[Value], index: usize) -> Result<Option<String>> {
        match self.bind_scope {
            BindScope::Singleton => Ok(Some(String::new())),
            BindScope::Context => match &self.context_key {
                Some(f) => f(argv, index).map(Some),
                None => Ok(Some(String::new())),
            },
            BindScope::Transient | BindScope::Permanent => Ok(None),
        }
    }

    /// Uninstall `slot` once the innermost scope closes.
    fn defer_uninstall(&self, env: &mut Env<'_>, slot: Ptr) -> Result<()> {
        debug!(adapter = %self.name, slot = slot.get(), "releasing replaced binding");
        if env.scoped_alloc_level() > 0 {
            return env.scope_track(ScopeEntry::Slot(slot));
        }
        warn!(
            adapter = %self.name,
            slot = slot.get(),
            "no active scope for deferred uninstall, uninstalling now"
        );
        env.uninstall_function(Some(slot)).map(|_| ())
    }

    fn install(&self, env: &mut Env<'_>, func: &HostFn) -> Result<Ptr> {
        let func = match &self.call_proxy {
            Some(proxy) => proxy(func.clone()),
            None => func.clone(),
        };
        let cb = Callback::Host(func);
        let slot = if self.bind_scope == BindScope::Transient {
            env.scoped_install_function(cb, &self.signature)?
        } else {
            env.install_function(cb, &self.signature)?
        };
        debug!(
            adapter = %self.name,
            bind_scope = ?self.bind_scope,
            slot = slot.get(),
            "installed callback"
        );
        Ok(slot)
    }
}

impl ArgAdapter for FuncPtrAdapter {
    fn convert_arg(
        &self,
        env: &mut Env<'_>,
        value: Value,
        argv: &[Value],
        index: usize,
    ) -> Result<Value> {
        let key = self.key(argv, index)?;
        let prior = key
            .as_ref()
            .and_then(|k| self.bindings.lock().get(k).cloned());

        match value {
            Value::Func(func) => {
                if let Some(Binding::Bound { func: bound, slot }) = &prior {
                    if Arc::ptr_eq(bound, &func) {
                        return Ok((*slot).into());
                    }
                }
                let slot = self.install(env, &func)?;
                if let Some(key) = key {
                    if let Some(Binding::Bound { slot: old, .. }) = prior {
                        self.defer_uninstall(env, old)?;
                    }
                    self.bindings
                        .lock()
                        .insert(key, Binding::Bound { func, slot });
                }
                Ok(slot.into())
            }
            v @ (Value::Int(_) | Value::Float(_) | Value::Null | Value::Undefined)
                if v.is_nullish() || env.pointer().is_ptr(&v) =>
            {
                let ptr = env.pointer().coerce(&v)?;
                if let Some(key) = key {
                    match prior {
                        Some(Binding::Bound { slot, .. }) if slot == ptr => {}
                        Some(Binding::Bound { slot, .. }) => {
                            self.defer_uninstall(env, slot)?;
                            self.rebind(key, ptr);
                        }
                        _ => self.rebind(key, ptr),
                    }
                }
                Ok(ptr.into())
            }
            other => Err(Error::invalid_type(format!(
                "FuncPtrAdapter {} expects a function pointer or a function matching signature {}, got {}",
                self.name,
                self.signature,
                other.type_name()
            ))),
        }
    }
}

impl FuncPtrAdapter {
    fn rebind(&self, key: String, ptr: Ptr) {
        let mut bindings = self.bindings.lock();
        if ptr.is_null() {
            bindings.remove(&key);
        } else {
            bindings.insert(key, Binding::Passthrough(ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_key_implies_context_scope() {
        let a = FuncPtrAdapter::new(
            FuncPtrAdapterOptions::new("cb", "i(pi)").context_key(|argv, _| {
                Ok(format!("{:?}", argv.first()))
            }),
        )
        .unwrap();
        assert_eq!(a.bind_scope(), BindScope::Context);
    }

    #[test]
    fn bind_scope_is_required() {
        let err = FuncPtrAdapter::new(FuncPtrAdapterOptions::new("cb", "v()")).unwrap_err();
        assert_eq!(err.kind(), wasmbridge_types::ErrorKind::InvalidType);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let opts = FuncPtrAdapterOptions::new("cb", "q(p)").bind_scope(BindScope::Transient);
        assert!(FuncPtrAdapter::new(opts).is_err());
    }

    #[test]
    fn keys_follow_bind_scope() {
        let single = FuncPtrAdapter::new(
            FuncPtrAdapterOptions::new("s", "v()").bind_scope(BindScope::Singleton),
        )
        .unwrap();
        assert_eq!(single.key(&[], 0).unwrap(), Some(String::new()));
        let transient = FuncPtrAdapter::new(
            FuncPtrAdapterOptions::new("t", "v()").bind_scope(BindScope::Transient),
        )
        .unwrap();
        assert_eq!(transient.key(&[], 0).unwrap(), None);
        let ctx = FuncPtrAdapter::new(
            FuncPtrAdapterOptions::new("c", "v(p)")
                .context_key(|argv, i| Ok(format!("{:?}@{i}", argv[0]))),
        )
        .unwrap();
        assert_eq!(ctx.key(&[Value::Int(7)], 1).unwrap(), Some("Int(7)@1".to_string()));
    }
}
