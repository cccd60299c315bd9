//! Memory layout, indices and export names of the demo module.
//!
//! ```text
//! 0 .. 16          : unused (address 0 stays null)
//! GREETING_OFFSET  : "hello, world\0"
//! JSON_OFFSET      : {"name":"wasmbridge","n":3}\0
//! UTF8_OFFSET      : "héllo😀\0"
//! HEAP_START ..    : bump-allocated heap, 8-byte aligned
//! ```

/// Wasm page size in bytes.
pub const PAGE_SIZE: u32 = 65_536;

/// Initial memory size in pages.
pub const INITIAL_MEMORY_PAGES: u64 = 1;

/// Maximum memory size in pages.
pub const MAX_MEMORY_PAGES: u64 = 64;

/// Initial call-table size. Slot 0 stays empty.
pub const INITIAL_TABLE_SIZE: u64 = 1;

/// First heap byte.
pub const HEAP_START: u32 = 1024;

/// Alignment of every allocation.
pub const ALLOC_ALIGN: u32 = 8;

// ── Static strings ───────────────────────────────────────────────────────────

pub const GREETING_OFFSET: u32 = 16;
pub const GREETING: &str = "hello, world";

pub const JSON_OFFSET: u32 = 64;
pub const JSON_DOC: &str = r#"{"name":"wasmbridge","n":3}"#;

pub const UTF8_OFFSET: u32 = 128;
pub const UTF8_TEXT: &str = "héllo😀";

// ── Globals ──────────────────────────────────────────────────────────────────
// (order must match the global section emission in builder.rs)

/// Next free heap byte.
pub const GLOBAL_HEAP_PTR: u32 = 0;
/// Allocations not yet released.
pub const GLOBAL_LIVE: u32 = 1;
/// Incremented by `counter()`.
pub const GLOBAL_COUNTER: u32 = 2;

// ── Callback types ───────────────────────────────────────────────────────────
// (always the first entries of the type section)

/// `(i32) -> i32`, signature `"i(i)"`.
pub const TYPE_CB_I32_I32: u32 = 0;
/// `() -> ()`, signature `"v()"`.
pub const TYPE_CB_VOID: u32 = 1;
/// `(ptr) -> i32`, signature `"i(p)"`.
pub const TYPE_CB_PTR_I32: u32 = 2;

// ── Function indices ─────────────────────────────────────────────────────────
// (order must match the function emission in builder.rs)

/// `alloc(n: ptr) -> ptr`, grows memory as needed, null on failure.
pub const FN_ALLOC: u32 = 0;
/// `dealloc(p: ptr)`
pub const FN_DEALLOC: u32 = 1;
/// `live_allocs() -> i32`
pub const FN_LIVE_ALLOCS: u32 = 2;
/// `strlen(s: ptr) -> i32`
pub const FN_STRLEN: u32 = 3;
/// `dup_cstr(s: ptr) -> ptr`, a freshly allocated copy
pub const FN_DUP_CSTR: u32 = 4;
/// `add(a: i32, b: i32) -> i32`
pub const FN_ADD: u32 = 5;
/// `add_i64(a: i64, b: i64) -> i64`
pub const FN_ADD_I64: u32 = 6;
/// `mix_f64(a: f64, b: f32) -> f64`
pub const FN_MIX_F64: u32 = 7;
/// `greeting() -> ptr`
pub const FN_GREETING: u32 = 8;
/// `json_doc() -> ptr`
pub const FN_JSON_DOC: u32 = 9;
/// `utf8_text() -> ptr`
pub const FN_UTF8_TEXT: u32 = 10;
/// `grow(pages: i32) -> i32`, the `memory.grow` result
pub const FN_GROW: u32 = 11;
/// `noop()`
pub const FN_NOOP: u32 = 12;
/// `counter() -> i32`
pub const FN_COUNTER: u32 = 13;
/// `call_cb(fp: ptr, x: i32) -> i32` calls `fp(x)`
pub const FN_CALL_CB: u32 = 14;
/// `call_cb_ctx(ctx: ptr, fp: ptr, x: i32) -> i32` calls `fp(x)`
pub const FN_CALL_CB_CTX: u32 = 15;
/// `call_void_cb(fp: ptr)` calls `fp()`
pub const FN_CALL_VOID_CB: u32 = 16;
/// `call_str_cb(fp: ptr, s: ptr) -> i32` calls `fp(s)`
pub const FN_CALL_STR_CB: u32 = 17;

/// Total number of functions.
pub const FN_COUNT: u32 = 18;

// ── Export names ─────────────────────────────────────────────────────────────

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_TABLE: &str = "__indirect_function_table";
pub const EXPORT_ALLOC: &str = "alloc";
pub const EXPORT_DEALLOC: &str = "dealloc";
