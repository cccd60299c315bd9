//! Marshalling between host values and a WebAssembly module.
//!
//! The module only understands byte offsets into its linear memory and the
//! four wasm scalar types. This crate bridges that to host strings, closures,
//! JSON documents and 64-bit integers.
//!
//! # Architecture
//!
//! All state lives in [`Bridge`], the data of the `wasmi::Store`. Every
//! operation goes through an [`Env`], a handle over a mutable store context,
//! so the same calls work at top level and from inside a host callback.
//!
//! - [`pointer`]: addresses and the `i32`/`i64` pointer representation
//! - [`heap`]: typed, growth-aware memory access (`peek`/`poke`)
//! - [`cstr`]: C-string encoding and decoding
//! - [`scope`]: stacked allocation scopes
//! - [`table`]: installing host closures into the call table
//! - [`adapter`]: named argument and result converters
//! - [`funcptr`]: the stateful function-pointer argument adapter
//! - [`wrap`]: wrapping module functions with conversion
//! - [`runtime`]: load bytes and attach
//!
//! A wrapped call opens a scope, converts arguments left to right (which may
//! allocate or install callbacks), calls the function, converts the result,
//! and closes the scope, releasing everything registered in it.

pub mod adapter;
pub mod cstr;
pub mod env;
pub mod funcptr;
pub mod heap;
pub mod pointer;
pub mod runtime;
pub mod scope;
pub mod table;
pub mod value;
pub mod wrap;

pub use adapter::{AdapterRegistry, ArgAdapter, ArgConverter, ResultAdapter, ResultConverter};
pub use cstr::{jstr_to_bytes, jstrcpy, jstrlen, jstrlen_utf16};
pub use env::{Bridge, Env, Exports};
pub use funcptr::{FuncPtrAdapter, FuncPtrAdapterOptions};
pub use heap::{HeapKind, HeapView};
pub use pointer::{PointerModel, Ptr};
pub use runtime::Runtime;
pub use scope::{ScopeEntry, ScopeId};
pub use table::{Callback, FunctionEntry};
pub use value::{host_fn, HostFn, Value};
pub use wrap::{ArgSpec, Target, Wrapped};

pub use wasmbridge_types::{
    size_of_ir, BindScope, Config, Error, ErrorKind, ExportNames, IrType, PointerIr, Result,
    SigType, Signature,
};
