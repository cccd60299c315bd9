//! Integration tests for memory, strings, scopes and the call table.
//!
//! Tests run against the generated demo module and validate:
//! - Attaching exports, including custom names and missing exports
//! - Typed peek/poke for every tag, views and memory growth
//! - C-string encode/decode and argv helpers
//! - Scope discipline, observed through the module's live allocation count
//! - Installing, calling, reusing and uninstalling table slots
//! - 64-bit pointer mode

use wasmbridge::{
    jstrlen, Callback, Config, Env, ErrorKind, FunctionEntry, HeapKind, PointerIr, Ptr,
    Runtime, ScopeEntry, Value,
};
use wasmbridge_fixture::types::*;
use wasmbridge_fixture::{build, FixtureOptions};
use wasmi::{FuncRef, Val};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn runtime_with(options: &FixtureOptions, config: &Config) -> Runtime {
    let wasm = build(options).unwrap_or_else(|e| panic!("fixture build failed: {e}"));
    Runtime::new(&wasm, config).unwrap_or_else(|e| panic!("attach failed: {e}"))
}

fn narrow() -> Runtime {
    runtime_with(&FixtureOptions::default(), &Config::default())
}

fn wide() -> Runtime {
    runtime_with(
        &FixtureOptions::wide(),
        &Config::default().with_pointer_ir(PointerIr::I64),
    )
}

fn live(env: &mut Env<'_>) -> i64 {
    env.xcall("live_allocs", &[]).unwrap().as_i64().unwrap()
}

fn greeting() -> Ptr {
    Ptr::from(GREETING_OFFSET)
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: Attach
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_attach_reads_default_exports() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert!(env.bridge().is_attached());
    assert!(env.has_allocator());
    assert_eq!(env.pointer().ir(), PointerIr::I32);
    assert_eq!(env.heap_size().unwrap(), PAGE_SIZE as usize);
    assert_eq!(env.function_table_size().unwrap(), INITIAL_TABLE_SIZE);
}

#[test]
fn test_custom_allocator_names() {
    let mut rt = runtime_with(
        &FixtureOptions::default().with_allocator_names("malloc", "free"),
        &Config::default().with_allocator("malloc", "free"),
    );
    let mut env = rt.env();
    assert!(env.has_allocator());
    let p = env.alloc(4).unwrap();
    assert!(!p.is_null());
    env.dealloc(p).unwrap();
    assert_eq!(live(&mut env), 0);
}

#[test]
fn test_missing_memory_export_fails_attach() {
    let wasm = build(&FixtureOptions::default()).unwrap();
    let mut config = Config::default();
    config.exports.memory = "heap".to_string();
    let err = Runtime::new(&wasm, &config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MissingExport);
}

#[test]
fn test_wide_pointers_require_wide_integers() {
    let wasm = build(&FixtureOptions::wide()).unwrap();
    let config = Config::default()
        .with_pointer_ir(PointerIr::I64)
        .with_wide_integers(false);
    let err = Runtime::new(&wasm, &config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_without_allocator() {
    let mut rt = runtime_with(&FixtureOptions::without_allocator(), &Config::default());
    let mut env = rt.env();
    assert!(!env.has_allocator());
    assert_eq!(env.alloc(8).unwrap_err().kind(), ErrorKind::MissingAllocator);
    assert_eq!(
        env.scoped_alloc_push().unwrap_err().kind(),
        ErrorKind::MissingAllocator
    );
    // calls that allocate nothing still work
    assert_eq!(
        env.xcall("add", &[Value::Int(1), Value::Int(2)]).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        env.cstr_to_string(greeting()).unwrap().as_deref(),
        Some(GREETING)
    );
}

#[test]
fn test_alloc_failure_is_reported() {
    let mut rt = narrow();
    let mut env = rt.env();
    let too_big = (MAX_MEMORY_PAGES as usize + 1) * PAGE_SIZE as usize;
    assert_eq!(env.alloc(too_big).unwrap_err().kind(), ErrorKind::Allocation);
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: Memory access
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_peek_poke_every_tag() {
    let mut rt = narrow();
    let mut env = rt.env();
    let p = env.alloc(16).unwrap();

    let cases = [
        ("i8", Value::Int(-1)),
        ("i16", Value::Int(-12_345)),
        ("i32", Value::Int(-7)),
        ("i64", Value::Int(-(1 << 40))),
        ("f32", Value::Float(1.5)),
        ("float", Value::Float(-0.25)),
        ("f64", Value::Float(3.141_592_653_589_793)),
        ("double", Value::Float(1e300)),
    ];
    for (tag, value) in cases {
        env.poke(p, &value, tag).unwrap();
        assert_eq!(env.peek(p, tag).unwrap(), value, "{tag}");
    }
}

#[test]
fn test_i1_is_a_byte() {
    let mut rt = narrow();
    let mut env = rt.env();
    let p = env.alloc(8).unwrap();
    env.poke(p, &Value::Int(0x0102_0304), "i32").unwrap();
    env.poke(p, &Value::Int(9), "i1").unwrap();
    assert_eq!(env.peek(p, "i32").unwrap(), Value::Int(0x0102_0309));
}

#[test]
fn test_pointer_tags_read_unsigned() {
    let mut rt = narrow();
    let mut env = rt.env();
    let p = env.alloc(8).unwrap();
    env.poke(p, &Value::Int(0xFFFF_FFF0), "*").unwrap();
    assert_eq!(env.peek(p, "*").unwrap(), Value::Int(0xFFFF_FFF0));
    assert_eq!(env.peek(p, "i32*").unwrap(), Value::Int(0xFFFF_FFF0));
    assert_eq!(env.peek(p, "i32").unwrap(), Value::Int(-16));
    assert_eq!(env.peek_ptr(p).unwrap(), Ptr(0xFFFF_FFF0));
}

#[test]
fn test_peek_poke_many() {
    let mut rt = narrow();
    let mut env = rt.env();
    let base = env.alloc(12).unwrap();
    let ptrs = [base, base.offset(4), base.offset(8)];
    env.poke_many(&ptrs, &Value::Int(77), "i32").unwrap();
    assert_eq!(
        env.peek_many(&ptrs, "i32").unwrap(),
        vec![Value::Int(77); 3]
    );
}

#[test]
fn test_unknown_tag_is_rejected() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert_eq!(
        env.peek(greeting(), "u128").unwrap_err().kind(),
        ErrorKind::InvalidType
    );
}

#[test]
fn test_out_of_bounds_access() {
    let mut rt = narrow();
    let mut env = rt.env();
    let size = env.heap_size().unwrap() as u64;
    let err = env.peek(Ptr(size - 2), "i32").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryAccess);
    let err = env.poke(Ptr(size), &Value::Int(1), "i8").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryAccess);
}

#[test]
fn test_wide_integer_tags_can_be_disabled() {
    let mut rt = runtime_with(
        &FixtureOptions::default(),
        &Config::default().with_wide_integers(false),
    );
    let mut env = rt.env();
    let p = env.alloc(8).unwrap();
    assert_eq!(
        env.peek(p, "i64").unwrap_err().kind(),
        ErrorKind::WideIntegerDisabled
    );
    assert_eq!(
        env.heap_view(HeapKind::U64).unwrap_err().kind(),
        ErrorKind::WideIntegerDisabled
    );
    assert!(env.heap_view(HeapKind::I32).is_ok());
}

#[test]
fn test_heap_view_sees_static_data() {
    let mut rt = narrow();
    let mut env = rt.env();
    let view = env.heap_view(HeapKind::U8).unwrap();
    assert_eq!(view.len(), PAGE_SIZE as usize);
    assert_eq!(
        view.get(GREETING_OFFSET as usize),
        Some(Value::Int(i64::from(b'h')))
    );
    assert_eq!(view.get(PAGE_SIZE as usize), None);

    let words = env.heap_view(HeapKind::U32).unwrap();
    assert_eq!(words.len(), PAGE_SIZE as usize / 4);
}

#[test]
fn test_growth_is_visible() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert_eq!(env.heap_size().unwrap(), PAGE_SIZE as usize);
    let before = env.heap_generation();

    let old = env.xcall("grow", &[Value::Int(2)]).unwrap();
    assert_eq!(old, Value::Int(INITIAL_MEMORY_PAGES as i64));
    assert_eq!(env.heap_size().unwrap(), 3 * PAGE_SIZE as usize);
    assert!(env.heap_generation() > before);

    // the new pages are usable
    let far = Ptr(2 * PAGE_SIZE as u64 + 8);
    env.poke(far, &Value::Int(5), "i32").unwrap();
    assert_eq!(env.peek(far, "i32").unwrap(), Value::Int(5));
}

#[test]
fn test_growth_inside_alloc_is_visible() {
    let mut rt = narrow();
    let mut env = rt.env();
    let p = env.alloc(100_000).unwrap();
    assert!(env.heap_size().unwrap() >= p.get() as usize + 100_000);
    env.poke(p.offset(99_996), &Value::Int(-1), "i32").unwrap();
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: Strings
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cstr_decoding() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert_eq!(env.cstrlen(greeting()).unwrap(), Some(GREETING.len()));
    assert_eq!(
        env.cstr_to_string(Ptr::from(UTF8_OFFSET)).unwrap().as_deref(),
        Some(UTF8_TEXT)
    );
    assert_eq!(env.cstrlen(Ptr::NULL).unwrap(), None);
    assert_eq!(env.cstr_to_string(Ptr::NULL).unwrap(), None);
}

#[test]
fn test_unterminated_string_is_an_error() {
    let mut rt = narrow();
    let mut env = rt.env();
    let size = env.heap_size().unwrap() as u64;
    env.poke(Ptr(size - 1), &Value::Int(b'x' as i64), "i8").unwrap();
    assert_eq!(
        env.cstrlen(Ptr(size - 1)).unwrap_err().kind(),
        ErrorKind::MemoryAccess
    );
}

#[test]
fn test_alloc_cstring_counts_utf8_bytes() {
    let text = "a😀é";
    let mut rt = narrow();
    let mut env = rt.env();
    let (p, len) = env.alloc_cstring_with_len(text).unwrap();
    assert_eq!(len, jstrlen(text));
    assert_eq!(len, 7);
    assert_eq!(
        env.xcall("strlen", &[Value::from(p)]).unwrap(),
        Value::Int(len as i64)
    );
    assert_eq!(env.peek(p.offset(len as u64), "i8").unwrap(), Value::Int(0));
    assert_eq!(env.cstr_to_string(p).unwrap().as_deref(), Some(text));
    env.dealloc(p).unwrap();
    assert_eq!(live(&mut env), 0);
}

#[test]
fn test_jstrcpy_to_heap_respects_limit() {
    let mut rt = narrow();
    let mut env = rt.env();
    let p = env.alloc(16).unwrap();
    let written = env.jstrcpy_to_heap("héllo", p, Some(2), false).unwrap();
    // "é" does not fit after "h" within two bytes
    assert_eq!(written, 1);
    let written = env.jstrcpy_to_heap("héllo", p, None, true).unwrap();
    assert_eq!(written, jstrlen("héllo") + 1);
    assert_eq!(env.cstr_to_string(p).unwrap().as_deref(), Some("héllo"));
}

#[test]
fn test_cstrncpy() {
    let mut rt = narrow();
    let mut env = rt.env();
    let dst = env.alloc(32).unwrap();

    assert_eq!(env.cstrncpy(dst, greeting(), Some(5)).unwrap(), 5);
    let start = dst.get() as usize;
    assert_eq!(&env.heap_bytes().unwrap()[start..start + 5], b"hello");

    let n = env.cstrncpy(dst, greeting(), None).unwrap();
    assert_eq!(n, GREETING.len() + 1);
    assert_eq!(env.cstr_to_string(dst).unwrap().as_deref(), Some(GREETING));

    assert_eq!(
        env.cstrncpy(Ptr::NULL, greeting(), None).unwrap_err().kind(),
        ErrorKind::NullPointer
    );
}

#[test]
fn test_main_argv_round_trip() {
    let mut rt = narrow();
    let mut env = rt.env();
    let argv = env.alloc_main_argv(&["prog", "-v", "naïve"]).unwrap();
    assert_eq!(
        env.c_argv_to_vec(3, argv).unwrap(),
        vec![
            Some("prog".to_string()),
            Some("-v".to_string()),
            Some("naïve".to_string())
        ]
    );
    assert_eq!(env.peek_ptr(argv.offset(12)).unwrap(), Ptr::NULL);
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: Scopes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scope_releases_everything() {
    let mut rt = narrow();
    let mut env = rt.env();
    let baseline = live(&mut env);

    let scope = env.scoped_alloc_push().unwrap();
    assert_eq!(env.scoped_alloc_level(), 1);
    env.scoped_alloc(10).unwrap();
    env.scoped_alloc_cstring("scoped").unwrap();
    env.scoped_alloc_ptr(2, true).unwrap();
    env.scoped_alloc_main_argv(&["a", "b"]).unwrap();
    // list + two strings
    assert_eq!(live(&mut env), baseline + 6);

    env.scoped_alloc_pop(Some(scope)).unwrap();
    assert_eq!(env.scoped_alloc_level(), 0);
    assert_eq!(live(&mut env), baseline);
}

#[test]
fn test_nested_scopes_pop_innermost() {
    let mut rt = narrow();
    let mut env = rt.env();
    env.scoped_alloc_push().unwrap();
    env.scoped_alloc(4).unwrap();
    env.scoped_alloc_push().unwrap();
    env.scoped_alloc(4).unwrap();
    env.scoped_alloc(4).unwrap();
    assert_eq!(live(&mut env), 3);

    env.scoped_alloc_pop(None).unwrap();
    assert_eq!(live(&mut env), 1);
    env.scoped_alloc_pop(None).unwrap();
    assert_eq!(live(&mut env), 0);
}

#[test]
fn test_scope_errors() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert_eq!(env.scoped_alloc_pop(None).unwrap_err().kind(), ErrorKind::Scope);
    assert_eq!(env.scoped_alloc(4).unwrap_err().kind(), ErrorKind::Scope);
    assert_eq!(
        env.scope_track(ScopeEntry::Block(Ptr(8))).unwrap_err().kind(),
        ErrorKind::Scope
    );

    let id = env.scoped_alloc_push().unwrap();
    env.scoped_alloc_pop(Some(id)).unwrap();
    assert_eq!(
        env.scoped_alloc_pop(Some(id)).unwrap_err().kind(),
        ErrorKind::Scope
    );
}

#[test]
fn test_scoped_call_pops_on_error() {
    let mut rt = narrow();
    let mut env = rt.env();
    let err = env
        .scoped_alloc_call(|env| -> wasmbridge::Result<()> {
            env.scoped_alloc(32)?;
            env.scoped_alloc_cstring("lost")?;
            Err(wasmbridge::Error::host("body failed"))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
    assert_eq!(env.scoped_alloc_level(), 0);
    assert_eq!(live(&mut env), 0);
}

#[test]
fn test_alloc_ptr_slots_are_zeroed() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert!(env.alloc_ptr(0, false).unwrap().is_empty());

    let slots = env.alloc_ptr(3, false).unwrap();
    assert_eq!(slots[1].get() - slots[0].get(), 4);
    assert_eq!(slots[2].get() - slots[1].get(), 4);
    for s in &slots {
        assert_eq!(env.peek_ptr(*s).unwrap(), Ptr::NULL);
    }

    let safe = env.alloc_ptr(2, true).unwrap();
    assert_eq!(safe[1].get() - safe[0].get(), 8);
}

#[test]
fn test_alloc_ptr_size_overflow_is_an_error() {
    let mut rt = narrow();
    let mut env = rt.env();
    let before = live(&mut env);
    let err = env.alloc_ptr(usize::MAX / 4, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    assert_eq!(live(&mut env), before);

    env.scoped_alloc_push().unwrap();
    let err = env.scoped_alloc_ptr(usize::MAX / 2, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    env.scoped_alloc_pop(None).unwrap();
    assert_eq!(live(&mut env), before);
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: Function table
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_install_call_uninstall() {
    let mut rt = narrow();
    let mut env = rt.env();

    let slot = env
        .install_host_fn("i(i)", |_, args| Ok(Value::Int(args[0].as_i64()? * 2)))
        .unwrap();
    assert_eq!(slot, Ptr(INITIAL_TABLE_SIZE));
    assert_eq!(
        env.xcall("call_cb", &[Value::from(slot), Value::Int(21)]).unwrap(),
        Value::Int(42)
    );

    let prior = env.uninstall_function(Some(slot)).unwrap();
    assert!(matches!(prior, Some(Callback::Host(_))));
    assert!(matches!(env.function_entry(slot).unwrap(), FunctionEntry::Empty));
    assert!(env.xcall("call_cb", &[Value::from(slot), Value::Int(1)]).is_err());
}

#[test]
fn test_freed_slots_are_reused() {
    let mut rt = narrow();
    let mut env = rt.env();
    let a = env.install_host_fn("v()", |_, _| Ok(Value::Undefined)).unwrap();
    let b = env.install_host_fn("v()", |_, _| Ok(Value::Undefined)).unwrap();
    assert_ne!(a, b);
    let size = env.function_table_size().unwrap();

    env.uninstall_function(Some(a)).unwrap();
    let c = env.install_host_fn("v()", |_, _| Ok(Value::Undefined)).unwrap();
    assert_eq!(c, a);
    assert_eq!(env.function_table_size().unwrap(), size);
}

#[test]
fn test_uninstall_edge_cases() {
    let mut rt = narrow();
    let mut env = rt.env();
    assert!(env.uninstall_function(None).unwrap().is_none());
    let size = env.function_table_size().unwrap();
    assert_eq!(
        env.uninstall_function(Some(Ptr(size + 5))).unwrap_err().kind(),
        ErrorKind::InvalidType
    );
    // slot 0 exists but holds nothing
    assert!(env.uninstall_function(Some(Ptr::NULL)).unwrap().is_none());
    assert!(matches!(
        env.function_entry(Ptr(size + 5)).unwrap(),
        FunctionEntry::OutOfRange
    ));
}

#[test]
fn test_install_native_function() {
    let mut rt = narrow();
    let mut env = rt.env();
    let add = env.xget("add").unwrap();
    let sig = "i(ii)".parse().unwrap();
    let slot = env.install_function(Callback::Native(add), &sig).unwrap();

    let wrapped = env.xwrap(slot, "i32", ["i32", "i32"]).unwrap();
    assert_eq!(wrapped.name(), format!("function@{}", slot.get()));
    assert_eq!(
        wrapped.call(&mut env, vec![Value::Int(2), Value::Int(3)]).unwrap(),
        Value::Int(5)
    );
    assert!(matches!(
        env.uninstall_function(Some(slot)).unwrap(),
        Some(Callback::Native(_))
    ));
}

#[test]
fn test_uninstall_returns_the_current_occupant() {
    let mut rt = narrow();
    let table = rt.instance().get_table(rt.store(), EXPORT_TABLE).unwrap();
    let (replaced, kept, add) = {
        let mut env = rt.env();
        let replaced = env.install_host_fn("i(i)", |_, _| Ok(Value::Int(0))).unwrap();
        let kept = env.install_host_fn("i(i)", |_, _| Ok(Value::Int(1))).unwrap();
        (replaced, kept, env.xget("add").unwrap())
    };

    // the embedder overwrites a slot the bridge filled with a host closure
    table
        .set(rt.store_mut(), replaced.get(), Val::FuncRef(FuncRef::new(add)))
        .unwrap();

    let mut env = rt.env();
    assert!(matches!(
        env.uninstall_function(Some(replaced)).unwrap(),
        Some(Callback::Native(_))
    ));
    assert!(matches!(
        env.uninstall_function(Some(kept)).unwrap(),
        Some(Callback::Host(_))
    ));
}

#[test]
fn test_callback_reads_memory() {
    let mut rt = narrow();
    let mut env = rt.env();
    let slot = env
        .install_host_fn("i(p)", |env, args| {
            let ptr = env.pointer().coerce(&args[0])?;
            let s = env.cstr_to_string(ptr)?.unwrap_or_default();
            Ok(Value::Int(s.chars().count() as i64))
        })
        .unwrap();
    assert_eq!(
        env.xcall("call_str_cb", &[Value::from(slot), Value::from(Ptr::from(UTF8_OFFSET))])
            .unwrap(),
        Value::Int(UTF8_TEXT.chars().count() as i64)
    );
}

#[test]
fn test_host_error_crosses_the_module() {
    let mut rt = narrow();
    let mut env = rt.env();
    let slot = env
        .install_host_fn("i(i)", |_, _| Err(wasmbridge::Error::host("callback refused")))
        .unwrap();
    let err = env
        .xcall("call_cb", &[Value::from(slot), Value::Int(1)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
    assert!(err.to_string().contains("callback refused"));

    // a later plain trap is not confused with the stale error
    let err = env
        .xcall("call_cb", &[Value::Int(0), Value::Int(1)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Trap);
}

#[test]
fn test_bad_signature_is_rejected() {
    let mut rt = narrow();
    let mut env = rt.env();
    let err = env
        .install_host_fn("i(q)", |_, _| Ok(Value::Int(0)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
}

// ══════════════════════════════════════════════════════════════════════════════
// Tests: 64-bit pointers
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_wide_pointer_model() {
    let mut rt = wide();
    let mut env = rt.env();
    assert_eq!(env.pointer().ir(), PointerIr::I64);
    assert_eq!(env.pointer().size(), 8);

    let p = env.alloc_cstring("wide").unwrap();
    assert_eq!(
        env.xcall("strlen", &[Value::from(p)]).unwrap(),
        Value::Int(4)
    );

    let slots = env.alloc_ptr(2, false).unwrap();
    assert_eq!(slots[1].get() - slots[0].get(), 8);
    env.poke_ptr(slots[0], p).unwrap();
    assert_eq!(env.peek_ptr(slots[0]).unwrap(), p);
    assert_eq!(env.peek(slots[0], "*").unwrap(), Value::from(p));
}

#[test]
fn test_wide_callbacks_take_i64_pointers() {
    let mut rt = wide();
    let mut env = rt.env();
    let slot = env
        .install_host_fn("i(p)", |env, args| {
            let ptr = env.pointer().coerce(&args[0])?;
            Ok(Value::Int(env.cstrlen(ptr)?.unwrap_or(0) as i64))
        })
        .unwrap();
    assert_eq!(
        env.xcall("call_str_cb", &[Value::from(slot), Value::from(greeting())])
            .unwrap(),
        Value::Int(GREETING.len() as i64)
    );
}
