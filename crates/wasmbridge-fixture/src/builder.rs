//! Demo module assembler.
//!
//! Builds a small module with a bump allocator, C-string helpers, scalar
//! arithmetic and functions that call back through the indirect table.
//! The result is validated with `wasmparser` before it is returned.

use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, Instruction, MemorySection, MemoryType, Module, RefType,
    TableSection, TableType, TypeSection, ValType,
};

use crate::error::{FixtureError, FixtureResult};
use crate::runtime::{self, PtrRepr};
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// What the generated module looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureOptions {
    /// Use `i64` for pointer parameters and results.
    pub wide_pointers: bool,
    /// Export the allocator pair. Without it only non-allocating calls work.
    pub export_allocator: bool,
    /// Export names of the allocator pair.
    pub alloc_name: String,
    pub dealloc_name: String,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            wide_pointers: false,
            export_allocator: true,
            alloc_name: EXPORT_ALLOC.to_string(),
            dealloc_name: EXPORT_DEALLOC.to_string(),
        }
    }
}

impl FixtureOptions {
    pub fn wide() -> Self {
        Self {
            wide_pointers: true,
            ..Self::default()
        }
    }

    pub fn without_allocator() -> Self {
        Self {
            export_allocator: false,
            ..Self::default()
        }
    }

    pub fn with_allocator_names(mut self, alloc: &str, dealloc: &str) -> Self {
        self.alloc_name = alloc.to_string();
        self.dealloc_name = dealloc.to_string();
        self
    }
}

/// Build the demo module.
pub fn build(options: &FixtureOptions) -> FixtureResult<Vec<u8>> {
    Builder::new(options)?.build()
}

// ══════════════════════════════════════════════════════════════════════════════
// Builder
// ══════════════════════════════════════════════════════════════════════════════

struct FuncDef {
    name: &'static str,
    params: Vec<ValType>,
    results: Vec<ValType>,
    body: Function,
}

struct Builder<'a> {
    options: &'a FixtureOptions,
    ptr: PtrRepr,
    /// `(params, results)` in type-section order.
    types: Vec<(Vec<ValType>, Vec<ValType>)>,
}

impl<'a> Builder<'a> {
    fn new(options: &'a FixtureOptions) -> FixtureResult<Self> {
        if options.export_allocator {
            let names = [options.alloc_name.as_str(), options.dealloc_name.as_str()];
            for name in names {
                if name.is_empty() {
                    return Err(FixtureError::Unsupported(
                        "empty allocator export name".into(),
                    ));
                }
                if name == EXPORT_MEMORY
                    || name == EXPORT_TABLE
                    || Self::function_names().contains(&name)
                {
                    return Err(FixtureError::Unsupported(format!(
                        "allocator export `{name}` collides with another export"
                    )));
                }
            }
            if names[0] == names[1] {
                return Err(FixtureError::Unsupported(
                    "alloc and dealloc share an export name".into(),
                ));
            }
        }
        let ptr = PtrRepr {
            wide: options.wide_pointers,
        };
        // callback types come first so their indices are fixed
        let p = ptr.val_type();
        let types = vec![
            (vec![ValType::I32], vec![ValType::I32]),
            (vec![], vec![]),
            (vec![p], vec![ValType::I32]),
        ];
        Ok(Self {
            options,
            ptr,
            types,
        })
    }

    fn function_names() -> [&'static str; FN_COUNT as usize - 2] {
        [
            "live_allocs",
            "strlen",
            "dup_cstr",
            "add",
            "add_i64",
            "mix_f64",
            "greeting",
            "json_doc",
            "utf8_text",
            "grow",
            "noop",
            "counter",
            "call_cb",
            "call_cb_ctx",
            "call_void_cb",
            "call_str_cb",
        ]
    }

    fn build(mut self) -> FixtureResult<Vec<u8>> {
        let funcs = self.functions();
        debug_assert_eq!(funcs.len(), FN_COUNT as usize);

        let mut module = Module::new();

        // 1. Type section + Function section
        let mut func_section = FunctionSection::new();
        for def in &funcs {
            let idx = self.intern_type(&def.params, &def.results);
            func_section.function(idx);
        }
        let types = self.emit_types();
        module.section(&types);
        module.section(&func_section);

        // 2. Table section
        let table = self.emit_table();
        module.section(&table);

        // 3. Memory section
        let memory = self.emit_memory();
        module.section(&memory);

        // 4. Global section
        let globals = self.emit_globals();
        module.section(&globals);

        // 5. Export section
        let exports = self.emit_exports(&funcs);
        module.section(&exports);

        // 6. Code section
        let mut code = CodeSection::new();
        for def in &funcs {
            code.function(&def.body);
        }
        module.section(&code);

        // 7. Data section
        let data = self.emit_data();
        module.section(&data);

        let wasm_bytes = module.finish();

        // 8. Validate
        wasmparser::validate(&wasm_bytes)
            .map_err(|e| FixtureError::ValidationFailed(format!("{e}")))?;

        Ok(wasm_bytes)
    }

    // ── Types ────────────────────────────────────────────────────────────

    fn intern_type(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        if let Some(idx) = self
            .types
            .iter()
            .position(|(p, r)| p.as_slice() == params && r.as_slice() == results)
        {
            return idx as u32;
        }
        self.types.push((params.to_vec(), results.to_vec()));
        (self.types.len() - 1) as u32
    }

    fn emit_types(&self) -> TypeSection {
        let mut types = TypeSection::new();
        for (params, results) in &self.types {
            types
                .ty()
                .function(params.iter().copied(), results.iter().copied());
        }
        types
    }

    // ── Functions ────────────────────────────────────────────────────────

    /// Every function in index order.
    fn functions(&self) -> Vec<FuncDef> {
        use ValType::{F32, F64, I32, I64};

        let p = self.ptr.val_type();
        let ptr = self.ptr;
        let def = |name, params: Vec<ValType>, results: Vec<ValType>, body| FuncDef {
            name,
            params,
            results,
            body,
        };

        vec![
            def("alloc", vec![p], vec![p], runtime::emit_alloc(ptr)),
            def("dealloc", vec![p], vec![], runtime::emit_dealloc(ptr)),
            def(
                "live_allocs",
                vec![],
                vec![I32],
                runtime::emit_global_getter(GLOBAL_LIVE),
            ),
            def("strlen", vec![p], vec![I32], runtime::emit_strlen(ptr)),
            def("dup_cstr", vec![p], vec![p], runtime::emit_dup_cstr(ptr)),
            def(
                "add",
                vec![I32, I32],
                vec![I32],
                runtime::emit_binop(Instruction::I32Add),
            ),
            def(
                "add_i64",
                vec![I64, I64],
                vec![I64],
                runtime::emit_binop(Instruction::I64Add),
            ),
            def("mix_f64", vec![F64, F32], vec![F64], runtime::emit_mix_f64()),
            def(
                "greeting",
                vec![],
                vec![p],
                runtime::emit_static_ptr(ptr, GREETING_OFFSET),
            ),
            def(
                "json_doc",
                vec![],
                vec![p],
                runtime::emit_static_ptr(ptr, JSON_OFFSET),
            ),
            def(
                "utf8_text",
                vec![],
                vec![p],
                runtime::emit_static_ptr(ptr, UTF8_OFFSET),
            ),
            def("grow", vec![I32], vec![I32], runtime::emit_grow()),
            def("noop", vec![], vec![], runtime::emit_noop()),
            def("counter", vec![], vec![I32], runtime::emit_counter()),
            def(
                "call_cb",
                vec![p, I32],
                vec![I32],
                runtime::emit_call_indirect(ptr, 0, &[1], TYPE_CB_I32_I32),
            ),
            def(
                "call_cb_ctx",
                vec![p, p, I32],
                vec![I32],
                runtime::emit_call_indirect(ptr, 1, &[2], TYPE_CB_I32_I32),
            ),
            def(
                "call_void_cb",
                vec![p],
                vec![],
                runtime::emit_call_indirect(ptr, 0, &[], TYPE_CB_VOID),
            ),
            def(
                "call_str_cb",
                vec![p, p],
                vec![I32],
                runtime::emit_call_indirect(ptr, 0, &[1], TYPE_CB_PTR_I32),
            ),
        ]
    }

    // ── Table section ────────────────────────────────────────────────────

    fn emit_table(&self) -> TableSection {
        let mut table = TableSection::new();
        table.table(TableType {
            element_type: RefType::FUNCREF,
            table64: false,
            minimum: INITIAL_TABLE_SIZE,
            maximum: None,
            shared: false,
        });
        table
    }

    // ── Memory section ───────────────────────────────────────────────────

    fn emit_memory(&self) -> MemorySection {
        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: INITIAL_MEMORY_PAGES,
            maximum: Some(MAX_MEMORY_PAGES),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        memory
    }

    // ── Global section ───────────────────────────────────────────────────

    fn emit_globals(&self) -> GlobalSection {
        let mut globals = GlobalSection::new();
        let mutable_i32 = GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        };

        // GLOBAL_HEAP_PTR
        globals.global(mutable_i32, &ConstExpr::i32_const(HEAP_START as i32));
        // GLOBAL_LIVE
        globals.global(mutable_i32, &ConstExpr::i32_const(0));
        // GLOBAL_COUNTER
        globals.global(mutable_i32, &ConstExpr::i32_const(0));

        globals
    }

    // ── Export section ───────────────────────────────────────────────────

    fn emit_exports(&self, funcs: &[FuncDef]) -> ExportSection {
        let mut exports = ExportSection::new();
        exports.export(EXPORT_MEMORY, ExportKind::Memory, 0);
        exports.export(EXPORT_TABLE, ExportKind::Table, 0);

        if self.options.export_allocator {
            exports.export(&self.options.alloc_name, ExportKind::Func, FN_ALLOC);
            exports.export(&self.options.dealloc_name, ExportKind::Func, FN_DEALLOC);
        }

        for (idx, def) in funcs.iter().enumerate() {
            if idx as u32 == FN_ALLOC || idx as u32 == FN_DEALLOC {
                continue;
            }
            exports.export(def.name, ExportKind::Func, idx as u32);
        }

        exports
    }

    // ── Data section ─────────────────────────────────────────────────────

    fn emit_data(&self) -> DataSection {
        let mut data = DataSection::new();
        for (offset, text) in [
            (GREETING_OFFSET, GREETING),
            (JSON_OFFSET, JSON_DOC),
            (UTF8_OFFSET, UTF8_TEXT),
        ] {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            data.active(0, &ConstExpr::i32_const(offset as i32), bytes);
        }
        data
    }
}
