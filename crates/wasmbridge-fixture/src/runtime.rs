//! Function bodies emitted into the demo module.
//!
//! Memory is always 32-bit. With 64-bit pointers, pointer parameters and
//! results are `i64` and get wrapped or zero-extended at the edges.

use wasm_encoder::{BlockType, Function, Instruction, ValType};

use crate::types::*;

/// How pointers appear in function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtrRepr {
    pub wide: bool,
}

impl PtrRepr {
    pub fn val_type(self) -> ValType {
        if self.wide {
            ValType::I64
        } else {
            ValType::I32
        }
    }

    /// Pointer on the stack to a 32-bit address.
    fn to_addr(self, f: &mut Function) {
        if self.wide {
            f.instruction(&Instruction::I32WrapI64);
        }
    }

    /// 32-bit address on the stack to a pointer.
    fn from_addr(self, f: &mut Function) {
        if self.wide {
            f.instruction(&Instruction::I64ExtendI32U);
        }
    }

    fn load_addr(self, f: &mut Function, local: u32) {
        f.instruction(&Instruction::LocalGet(local));
        self.to_addr(f);
    }
}

pub(crate) fn memarg(offset: u64, align: u32) -> wasm_encoder::MemArg {
    wasm_encoder::MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

/// `alloc(n) -> ptr`
///
/// Aligns the bump pointer, grows memory when the block does not fit, and
/// returns null if growth fails.
pub fn emit_alloc(p: PtrRepr) -> Function {
    // locals: 1 = start, 2 = end, 3 = n32
    let mut f = Function::new(vec![(3, ValType::I32)]);
    p.load_addr(&mut f, 0);
    f.instruction(&Instruction::LocalSet(3));
    // start = (heap + ALIGN - 1) & -ALIGN
    f.instruction(&Instruction::GlobalGet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::I32Const(ALLOC_ALIGN as i32 - 1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(-(ALLOC_ALIGN as i32)));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::LocalSet(1));
    // end = start + n
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(2));
    // if end > memory bytes: grow by ceil((end - bytes) / PAGE_SIZE)
    f.instruction(&Instruction::LocalGet(2));
    emit_memory_bytes(&mut f);
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(2));
    emit_memory_bytes(&mut f);
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I32Const(PAGE_SIZE as i32 - 1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32ShrU);
    f.instruction(&Instruction::MemoryGrow(0));
    f.instruction(&Instruction::I32Const(-1));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    p.from_addr(&mut f);
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    // heap = end; live += 1
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::GlobalSet(GLOBAL_HEAP_PTR));
    emit_bump_global(&mut f, GLOBAL_LIVE, 1);
    f.instruction(&Instruction::LocalGet(1));
    p.from_addr(&mut f);
    f.instruction(&Instruction::End);
    f
}

fn emit_memory_bytes(f: &mut Function) {
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Shl);
}

fn emit_bump_global(f: &mut Function, global: u32, delta: i32) {
    f.instruction(&Instruction::GlobalGet(global));
    f.instruction(&Instruction::I32Const(delta));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(global));
}

/// `dealloc(p)`: memory is never reused, only the live count drops.
pub fn emit_dealloc(p: PtrRepr) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    if p.wide {
        f.instruction(&Instruction::I64Eqz);
        f.instruction(&Instruction::I32Eqz);
    }
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_bump_global(&mut f, GLOBAL_LIVE, -1);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    f
}

/// `() -> i32` returning a global.
pub fn emit_global_getter(global: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::GlobalGet(global));
    f.instruction(&Instruction::End);
    f
}

/// `strlen(s) -> i32`
pub fn emit_strlen(p: PtrRepr) -> Function {
    // locals: 1 = cursor, 2 = start
    let mut f = Function::new(vec![(2, ValType::I32)]);
    p.load_addr(&mut f, 0);
    f.instruction(&Instruction::LocalTee(1));
    f.instruction(&Instruction::LocalSet(2));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::BrIf(1));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::End);
    f
}

/// `dup_cstr(s) -> ptr`, copying the terminator too.
pub fn emit_dup_cstr(p: PtrRepr) -> Function {
    // locals: 1 = src, 2 = len, 3 = dst, 4 = i
    let mut f = Function::new(vec![(4, ValType::I32)]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::Call(FN_STRLEN));
    f.instruction(&Instruction::LocalSet(2));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    p.from_addr(&mut f);
    f.instruction(&Instruction::Call(FN_ALLOC));
    p.to_addr(&mut f);
    f.instruction(&Instruction::LocalSet(3));
    p.load_addr(&mut f, 0);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::LocalSet(4));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // dst[i] = src[i]
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Store8(memarg(0, 0)));
    // stop after the terminator
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::BrIf(1));
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(4));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::LocalGet(3));
    p.from_addr(&mut f);
    f.instruction(&Instruction::End);
    f
}

/// Two-operand arithmetic: `local0 <op> local1`.
pub fn emit_binop(op: Instruction<'static>) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&op);
    f.instruction(&Instruction::End);
    f
}

/// `mix_f64(a: f64, b: f32) -> f64` = `a + b`
pub fn emit_mix_f64() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::F64PromoteF32);
    f.instruction(&Instruction::F64Add);
    f.instruction(&Instruction::End);
    f
}

/// `() -> ptr` returning a static address.
pub fn emit_static_ptr(p: PtrRepr, offset: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(offset as i32));
    p.from_addr(&mut f);
    f.instruction(&Instruction::End);
    f
}

/// `grow(pages: i32) -> i32`
pub fn emit_grow() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::MemoryGrow(0));
    f.instruction(&Instruction::End);
    f
}

pub fn emit_noop() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::End);
    f
}

/// `counter() -> i32`, incrementing first.
pub fn emit_counter() -> Function {
    let mut f = Function::new(vec![]);
    emit_bump_global(&mut f, GLOBAL_COUNTER, 1);
    f.instruction(&Instruction::GlobalGet(GLOBAL_COUNTER));
    f.instruction(&Instruction::End);
    f
}

/// Push `args` (local indices), then call the table entry in local `fp`.
pub fn emit_call_indirect(p: PtrRepr, fp: u32, args: &[u32], type_index: u32) -> Function {
    let mut f = Function::new(vec![]);
    for a in args {
        f.instruction(&Instruction::LocalGet(*a));
    }
    p.load_addr(&mut f, fp);
    f.instruction(&Instruction::CallIndirect {
        type_index,
        table_index: 0,
    });
    f.instruction(&Instruction::End);
    f
}
