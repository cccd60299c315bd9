//! Installing host closures into the module's indirect call table.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;
use wasmbridge_types::{Error, Result, SigType, Signature};
use wasmi::{core::ValType, Caller, Func, FuncRef, FuncType, Val};

use crate::env::{Bridge, Env};
use crate::pointer::Ptr;
use crate::value::{HostFn, Value};

/// Something that can occupy a table slot.
#[derive(Clone)]
pub enum Callback {
    /// A host closure; wrapped in an engine host function on install.
    Host(HostFn),
    /// A function that already exists in the store.
    Native(Func),
}

impl Callback {
    pub fn host<F>(f: F) -> Self
    where
        F: Fn(&mut Env<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Host(std::sync::Arc::new(f))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(_) => f.write_str("Host(..)"),
            Self::Native(func) => f.debug_tuple("Native").field(func).finish(),
        }
    }
}

/// What a table slot currently holds.
#[derive(Debug, Clone, Copy)]
pub enum FunctionEntry {
    OutOfRange,
    Empty,
    Func(Func),
}

impl FunctionEntry {
    pub fn func(self) -> Option<Func> {
        match self {
            Self::Func(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Default)]
pub(crate) struct TableState {
    free: Vec<u64>,
    /// Host closures by slot, with the engine function installed for each.
    host: HashMap<u64, (Func, HostFn)>,
}

/// `Func` has no public identity; its `Debug` output is the store index.
fn same_func(a: &Func, b: &Func) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

fn sig_val_type(ty: SigType, ptr: ValType) -> Option<ValType> {
    match ty {
        SigType::I32 => Some(ValType::I32),
        SigType::Ptr => Some(ptr),
        SigType::I64 => Some(ValType::I64),
        SigType::F32 => Some(ValType::F32),
        SigType::F64 => Some(ValType::F64),
        SigType::Void => None,
    }
}

impl Env<'_> {
    /// The engine function type for a signature.
    pub fn func_type(&self, sig: &Signature) -> FuncType {
        let ptr = self.pointer().val_type();
        let params: Vec<ValType> = sig
            .params()
            .iter()
            .filter_map(|t| sig_val_type(*t, ptr))
            .collect();
        let results: Vec<ValType> = sig_val_type(sig.result(), ptr).into_iter().collect();
        FuncType::new(params, results)
    }

    /// Wrap a host closure in an engine host function of type `sig`.
    pub(crate) fn host_func(&mut self, host: HostFn, sig: &Signature) -> Func {
        let ty = self.func_type(sig);
        let sig = sig.clone();
        Func::new(
            &mut self.cx,
            ty,
            move |mut caller: Caller<'_, Bridge>, params: &[Val], results: &mut [Val]| {
                let mut env = Env::new(&mut caller);
                let out = env.invoke_host(&host, &sig, params);
                match out {
                    Ok(Some(v)) => {
                        if let Some(slot) = results.first_mut() {
                            *slot = v;
                        }
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(err) => {
                        let msg = err.to_string();
                        env.bridge_mut().pending = Some(err);
                        Err(wasmi::Error::new(msg))
                    }
                }
            },
        )
    }

    fn invoke_host(&mut self, host: &HostFn, sig: &Signature, params: &[Val]) -> Result<Option<Val>> {
        let model = self.pointer();
        let mut args = Vec::with_capacity(params.len());
        for (val, ty) in params.iter().zip(sig.params()) {
            args.push(match ty {
                SigType::Ptr => Value::from(model.from_val(val)?),
                _ => Value::from_val(val),
            });
        }
        let ret = host(self, &args)?;
        match sig.result() {
            SigType::Void => Ok(None),
            SigType::Ptr => Ok(Some(model.to_val(model.coerce(&ret)?))),
            other => {
                let ty = sig_val_type(other, model.val_type()).unwrap_or(ValType::I32);
                ret.to_val(ty).map(Some)
            }
        }
    }

    fn table_index(&self, ptr: Ptr) -> Result<FunctionEntry> {
        let table = self.exports()?.table;
        Ok(match table.get(&self.cx, ptr.get()) {
            None => FunctionEntry::OutOfRange,
            Some(Val::FuncRef(r)) => match r.func() {
                Some(f) => FunctionEntry::Func(*f),
                None => FunctionEntry::Empty,
            },
            Some(_) => FunctionEntry::Empty,
        })
    }

    /// What the table holds at `ptr`.
    pub fn function_entry(&mut self, ptr: Ptr) -> Result<FunctionEntry> {
        self.table_index(ptr)
    }

    /// Current number of table slots.
    pub fn function_table_size(&mut self) -> Result<u64> {
        let table = self.exports()?.table;
        Ok(table.size(&self.cx))
    }

    fn claim_slot(&mut self) -> Result<u64> {
        while let Some(index) = self.bridge_mut().table.free.pop() {
            if matches!(self.table_index(Ptr(index))?, FunctionEntry::Empty) {
                return Ok(index);
            }
        }
        let table = self.exports()?.table;
        table
            .grow(&mut self.cx, 1, Val::FuncRef(FuncRef::null()))
            .map_err(|e| Error::TableGrowth(e.to_string()))
    }

    /// Install `cb` and return its table index.
    ///
    /// Freed indices are reused when their slot is still empty; otherwise
    /// the table grows by one.
    pub fn install_function(&mut self, cb: Callback, sig: &Signature) -> Result<Ptr> {
        let table = self.exports()?.table;
        let func = match &cb {
            Callback::Native(f) => *f,
            Callback::Host(h) => self.host_func(h.clone(), sig),
        };
        let index = self.claim_slot()?;
        if let Err(e) = table.set(&mut self.cx, index, Val::FuncRef(FuncRef::new(func))) {
            self.bridge_mut().table.free.push(index);
            return Err(Error::TableGrowth(e.to_string()));
        }
        let state = &mut self.bridge_mut().table;
        match cb {
            Callback::Host(h) => {
                state.host.insert(index, (func, h));
            }
            Callback::Native(_) => {
                state.host.remove(&index);
            }
        }
        debug!(index, signature = %sig, "installed function");
        Ok(Ptr(index))
    }

    /// Convenience for installing a closure with a signature string.
    pub fn install_host_fn<F>(&mut self, sig: &str, f: F) -> Result<Ptr>
    where
        F: Fn(&mut Env<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let sig: Signature = sig.parse()?;
        self.install_function(Callback::host(f), &sig)
    }

    /// Clear a slot and return its previous occupant.
    ///
    /// `None` is a no-op. The index becomes available for reuse.
    pub fn uninstall_function(&mut self, ptr: Option<Ptr>) -> Result<Option<Callback>> {
        let Some(ptr) = ptr else {
            return Ok(None);
        };
        let prior = match self.table_index(ptr)? {
            FunctionEntry::OutOfRange => {
                return Err(Error::invalid_type(format!(
                    "function table index {} out of range",
                    ptr.get()
                )))
            }
            FunctionEntry::Empty => None,
            FunctionEntry::Func(f) => Some(f),
        };
        let index = ptr.get();
        let table = self.exports()?.table;
        if prior.is_some() {
            table
                .set(&mut self.cx, index, Val::FuncRef(FuncRef::null()))
                .map_err(|e| Error::Trap(e.to_string()))?;
        }
        let state = &mut self.bridge_mut().table;
        state.free.push(index);
        let host = state.host.remove(&index);
        debug!(index, "uninstalled function");
        // The slot may have been overwritten behind our back.
        Ok(match (host, prior) {
            (Some((installed, h)), Some(f)) if same_func(&installed, &f) => {
                Some(Callback::Host(h))
            }
            (_, Some(f)) => Some(Callback::Native(f)),
            (_, None) => None,
        })
    }
}
