//! The bridge state and the handle every operation goes through.
//!
//! [`Bridge`] is the `wasmi::Store` data. [`Env`] wraps a mutable store
//! context, so the same API works at top level (`Env::new(&mut store)`) and
//! inside a host callback (`Env::new(&mut caller)`).

use wasmbridge_types::{Config, Error, ExportNames, Result};
use wasmi::{AsContextMut, Func, Instance, Memory, StoreContextMut, Table, Val};

use crate::adapter::AdapterRegistry;
use crate::heap::HeapCache;
use crate::pointer::{PointerModel, Ptr};
use crate::scope::ScopeStack;
use crate::table::TableState;
use crate::value::Value;

/// Module exports the bridge operates on.
#[derive(Debug, Clone, Copy)]
pub struct Exports {
    pub memory: Memory,
    pub table: Table,
    pub alloc: Option<Func>,
    pub dealloc: Option<Func>,
    pub instance: Option<Instance>,
}

/// Store data holding all runtime state of the bridge.
pub struct Bridge {
    pub(crate) ptr: PointerModel,
    pub(crate) names: ExportNames,
    pub(crate) exports: Option<Exports>,
    pub(crate) heap: HeapCache,
    pub(crate) table: TableState,
    pub(crate) scopes: ScopeStack,
    pub(crate) adapters: AdapterRegistry,
    /// Typed error raised by a host callback, carried across the trap.
    pub(crate) pending: Option<Error>,
}

impl Bridge {
    pub fn new(config: &Config) -> Result<Self> {
        let ptr = PointerModel::new(config)?;
        Ok(Self {
            ptr,
            names: config.exports.clone(),
            exports: None,
            heap: HeapCache::default(),
            table: TableState::default(),
            scopes: ScopeStack::default(),
            adapters: AdapterRegistry::new(&ptr),
            pending: None,
        })
    }

    pub fn pointer(&self) -> &PointerModel {
        &self.ptr
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn adapters_mut(&mut self) -> &mut AdapterRegistry {
        &mut self.adapters
    }

    pub fn is_attached(&self) -> bool {
        self.exports.is_some()
    }
}

/// Handle over a store context whose data is a [`Bridge`].
pub struct Env<'a> {
    pub(crate) cx: StoreContextMut<'a, Bridge>,
}

impl<'a> Env<'a> {
    pub fn new(cx: impl Into<StoreContextMut<'a, Bridge>>) -> Self {
        Self { cx: cx.into() }
    }

    pub fn bridge(&self) -> &Bridge {
        self.cx.data()
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge {
        self.cx.data_mut()
    }

    pub fn pointer(&self) -> PointerModel {
        self.cx.data().ptr
    }

    /// The underlying store context, for direct engine access.
    pub fn context(&mut self) -> StoreContextMut<'_, Bridge> {
        self.cx.as_context_mut()
    }

    /// Look up the configured exports of `instance` and attach them.
    pub fn attach(&mut self, instance: Instance) -> Result<()> {
        let names = self.bridge().names.clone();
        let memory = instance
            .get_memory(&self.cx, &names.memory)
            .ok_or_else(|| Error::MissingExport(names.memory.clone()))?;
        let table = instance
            .get_table(&self.cx, &names.table)
            .ok_or_else(|| Error::MissingExport(names.table.clone()))?;
        let alloc = instance.get_func(&self.cx, &names.alloc);
        let dealloc = instance.get_func(&self.cx, &names.dealloc);
        self.attach_exports(Exports {
            memory,
            table,
            alloc,
            dealloc,
            instance: Some(instance),
        });
        Ok(())
    }

    /// Attach explicitly supplied exports, replacing any previous ones.
    pub fn attach_exports(&mut self, exports: Exports) {
        let bridge = self.bridge_mut();
        bridge.exports = Some(exports);
        bridge.heap = HeapCache::default();
    }

    pub(crate) fn exports(&self) -> Result<Exports> {
        self.bridge()
            .exports
            .ok_or_else(|| Error::MissingExport("memory".to_string()))
    }

    /// Whether both halves of the allocator are available.
    pub fn has_allocator(&self) -> bool {
        matches!(
            self.bridge().exports,
            Some(Exports {
                alloc: Some(_),
                dealloc: Some(_),
                ..
            })
        )
    }

    pub(crate) fn require_allocator(&self, op: &'static str) -> Result<(Func, Func)> {
        match self.bridge().exports {
            Some(Exports {
                alloc: Some(alloc),
                dealloc: Some(dealloc),
                ..
            }) => Ok((alloc, dealloc)),
            _ => Err(Error::MissingAllocator(op)),
        }
    }

    /// Allocate `n` bytes with the module allocator.
    pub fn alloc(&mut self, n: usize) -> Result<Ptr> {
        let (alloc, _) = self.require_allocator("alloc")?;
        let arg = match alloc.ty(&self.cx).params().first() {
            Some(ty) => Value::Int(n as i64).to_val(*ty)?,
            None => return Err(Error::invalid_type("alloc() must take a size argument")),
        };
        let out = self.call_func(&alloc, &[arg])?;
        let ptr = match out.first() {
            Some(v) => self.pointer().from_val(v)?,
            None => return Err(Error::invalid_type("alloc() must return a pointer")),
        };
        if ptr.is_null() {
            return Err(Error::Allocation(n));
        }
        Ok(ptr)
    }

    /// Release a block from [`Env::alloc`]. Null is passed through to the module.
    pub fn dealloc(&mut self, ptr: Ptr) -> Result<()> {
        let (_, dealloc) = self.require_allocator("dealloc")?;
        let arg = match dealloc.ty(&self.cx).params().first() {
            Some(ty) => Value::from(ptr).to_val(*ty)?,
            None => return Err(Error::invalid_type("dealloc() must take a pointer argument")),
        };
        self.call_func(&dealloc, &[arg])?;
        Ok(())
    }

    /// Call a function with raw wasm values.
    ///
    /// If a host callback failed during the call, its error is returned in
    /// place of the engine's trap.
    pub fn call_func(&mut self, func: &Func, args: &[Val]) -> Result<Vec<Val>> {
        let ty = func.ty(&self.cx);
        let mut out: Vec<Val> = ty.results().iter().map(|t| Val::default(*t)).collect();
        match func.call(&mut self.cx, args, &mut out) {
            Ok(()) => Ok(out),
            Err(err) => Err(self
                .bridge_mut()
                .pending
                .take()
                .unwrap_or_else(|| Error::Trap(err.to_string()))),
        }
    }
}

impl<'a> From<&'a mut wasmi::Store<Bridge>> for Env<'a> {
    fn from(store: &'a mut wasmi::Store<Bridge>) -> Self {
        Env::new(store)
    }
}

impl<'a> From<&'a mut wasmi::Caller<'_, Bridge>> for Env<'a> {
    fn from(caller: &'a mut wasmi::Caller<'_, Bridge>) -> Self {
        Env::new(caller)
    }
}
