//! A generated demo module for exercising the bridge.
//!
//! The module is assembled with `wasm-encoder` and needs no toolchain beyond
//! this crate. It exports:
//!
//! ## Memory and table
//! - `memory`: one page, growable to [`types::MAX_MEMORY_PAGES`]
//! - `__indirect_function_table`: a growable `funcref` table
//!
//! ## Allocator (optional)
//! - `alloc(n) -> ptr`: 8-byte aligned bump allocator, null when memory
//!   cannot grow
//! - `dealloc(ptr)`: decrements `live_allocs()` for non-null pointers
//!
//! ## Functions
//! - strings: `strlen`, `dup_cstr`, `greeting`, `json_doc`, `utf8_text`
//! - scalars: `add`, `add_i64`, `mix_f64`, `counter`, `noop`
//! - memory: `grow`, `live_allocs`
//! - callbacks: `call_cb`, `call_cb_ctx`, `call_void_cb`, `call_str_cb`
//!
//! Pointers are `i32` by default and `i64` with
//! [`FixtureOptions::wide_pointers`]. Memory itself stays 32-bit.

pub mod builder;
pub mod error;
pub mod runtime;
pub mod types;

pub use builder::{build, FixtureOptions};
pub use error::{FixtureError, FixtureResult};
