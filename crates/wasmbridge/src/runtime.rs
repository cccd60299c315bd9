//! Loading a module and attaching the bridge to it.

use tracing::debug;
use wasmbridge_types::{Config, Error, Result};
use wasmi::{Engine, Instance, Linker, Module, Store};

use crate::env::{Bridge, Env};

/// An instantiated module with the bridge attached.
pub struct Runtime {
    store: Store<Bridge>,
    instance: Instance,
}

impl Runtime {
    /// Instantiate `wasm` with no imports.
    pub fn new(wasm: &[u8], config: &Config) -> Result<Self> {
        let engine = Engine::default();
        let linker = Linker::<Bridge>::new(&engine);
        Self::with_linker(&engine, &linker, wasm, config)
    }

    /// Instantiate `wasm`, resolving imports through `linker`.
    pub fn with_linker(
        engine: &Engine,
        linker: &Linker<Bridge>,
        wasm: &[u8],
        config: &Config,
    ) -> Result<Self> {
        let module = Module::new(engine, wasm).map_err(|e| Error::Trap(e.to_string()))?;
        let mut store = Store::new(engine, Bridge::new(config)?);
        let instance = linker
            .instantiate(&mut store, &module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|e| Error::Trap(e.to_string()))?;
        let mut env = Env::new(&mut store);
        env.attach(instance)?;
        let allocator = env.has_allocator();
        debug!(pointer = %env.pointer().ir(), allocator, "module attached");
        Ok(Self { store, instance })
    }

    pub fn env(&mut self) -> Env<'_> {
        Env::new(&mut self.store)
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    pub fn store(&self) -> &Store<Bridge> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<Bridge> {
        &mut self.store
    }

    pub fn into_store(self) -> Store<Bridge> {
        self.store
    }
}
