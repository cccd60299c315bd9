//! Typed access to linear memory.
//!
//! Views borrow the store, so none can outlive a call that might grow the
//! memory. The cache still records the byte length seen by the last access
//! and bumps a generation counter whenever it changes, which lets callers
//! (and tests) observe growth.

use std::ops::Range;

use tracing::trace;
use wasmbridge_types::{Error, IrType, Result};
use wasmi::Memory;

use crate::env::Env;
use crate::pointer::Ptr;
use crate::value::Value;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct HeapCache {
    len: usize,
    generation: u64,
}

/// Element type of a [`HeapView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl HeapKind {
    pub const fn width(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    const fn is_wide_integer(self) -> bool {
        matches!(self, Self::I64 | Self::U64)
    }
}

/// A typed, read-only window over the whole memory.
#[derive(Debug, Clone, Copy)]
pub struct HeapView<'m> {
    bytes: &'m [u8],
    kind: HeapKind,
}

impl<'m> HeapView<'m> {
    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    /// Number of whole elements in the view.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.width()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &'m [u8] {
        self.bytes
    }

    /// Element at `index` (element units, not bytes).
    pub fn get(&self, index: usize) -> Option<Value> {
        let w = self.kind.width();
        let start = index.checked_mul(w)?;
        let b = self.bytes.get(start..start.checked_add(w)?)?;
        Some(match self.kind {
            HeapKind::I8 => Value::Int(i64::from(b[0] as i8)),
            HeapKind::U8 => Value::Int(i64::from(b[0])),
            HeapKind::I16 => Value::Int(i64::from(i16::from_le_bytes(le(b)))),
            HeapKind::U16 => Value::Int(i64::from(u16::from_le_bytes(le(b)))),
            HeapKind::I32 => Value::Int(i64::from(i32::from_le_bytes(le(b)))),
            HeapKind::U32 => Value::Int(i64::from(u32::from_le_bytes(le(b)))),
            HeapKind::I64 => Value::Int(i64::from_le_bytes(le(b))),
            HeapKind::U64 => Value::Int(u64::from_le_bytes(le(b)) as i64),
            HeapKind::F32 => Value::Float(f64::from(f32::from_le_bytes(le(b)))),
            HeapKind::F64 => Value::Float(f64::from_le_bytes(le(b))),
        })
    }
}

fn le<const N: usize>(b: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[..N]);
    out
}

/// Decode a resolved IR type. Pointer-sized reads are unsigned.
fn decode(ty: IrType, pointer: bool, b: &[u8]) -> Value {
    match ty {
        IrType::I8 => Value::Int(i64::from(b[0] as i8)),
        IrType::I16 => Value::Int(i64::from(i16::from_le_bytes(le(b)))),
        IrType::I32 | IrType::Ptr if pointer => Value::Int(i64::from(u32::from_le_bytes(le(b)))),
        IrType::I32 | IrType::Ptr => Value::Int(i64::from(i32::from_le_bytes(le(b)))),
        IrType::I64 => Value::Int(i64::from_le_bytes(le(b))),
        IrType::F32 => Value::Float(f64::from(f32::from_le_bytes(le(b)))),
        IrType::F64 => Value::Float(f64::from_le_bytes(le(b))),
    }
}

fn encode(ty: IrType, v: &Value) -> Result<([u8; 8], usize)> {
    let mut buf = [0u8; 8];
    let n = match ty {
        IrType::I8 => {
            buf[0] = v.as_i64()? as u8;
            1
        }
        IrType::I16 => {
            buf[..2].copy_from_slice(&(v.as_i64()? as u16).to_le_bytes());
            2
        }
        IrType::I32 | IrType::Ptr => {
            buf[..4].copy_from_slice(&(v.as_i64()? as u32).to_le_bytes());
            4
        }
        IrType::I64 => {
            buf.copy_from_slice(&v.as_i64()?.to_le_bytes());
            8
        }
        IrType::F32 => {
            buf[..4].copy_from_slice(&(v.as_f64()? as f32).to_le_bytes());
            4
        }
        IrType::F64 => {
            buf.copy_from_slice(&v.as_f64()?.to_le_bytes());
            8
        }
    };
    Ok((buf, n))
}

fn span(ptr: Ptr, len: usize, size: usize) -> Result<Range<usize>> {
    let oob = || Error::MemoryAccess {
        addr: ptr.get(),
        len: len as u64,
        size: size as u64,
    };
    let start = usize::try_from(ptr.get()).map_err(|_| oob())?;
    let end = start.checked_add(len).ok_or_else(oob)?;
    if end > size {
        return Err(oob());
    }
    Ok(start..end)
}

impl Env<'_> {
    /// The memory export, after revalidating the cached length.
    fn memory(&mut self) -> Result<Memory> {
        let memory = self.exports()?.memory;
        let len = memory.data(&self.cx).len();
        let cache = &mut self.bridge_mut().heap;
        if cache.len != len {
            cache.generation += 1;
            trace!(
                from = cache.len,
                to = len,
                generation = cache.generation,
                "heap size changed, rebuilding views"
            );
            cache.len = len;
        }
        Ok(memory)
    }

    /// Current memory size in bytes.
    pub fn heap_size(&mut self) -> Result<usize> {
        self.memory()?;
        Ok(self.bridge().heap.len)
    }

    /// Number of times the memory was seen to change size.
    pub fn heap_generation(&self) -> u64 {
        self.bridge().heap.generation
    }

    pub fn heap_bytes(&mut self) -> Result<&[u8]> {
        let memory = self.memory()?;
        Ok(memory.data(&self.cx))
    }

    pub fn heap_bytes_mut(&mut self) -> Result<&mut [u8]> {
        let memory = self.memory()?;
        Ok(memory.data_mut(&mut self.cx))
    }

    /// A typed view. 64-bit integer views need wide integers.
    pub fn heap_view(&mut self, kind: HeapKind) -> Result<HeapView<'_>> {
        if kind.is_wide_integer() && !self.pointer().wide_integers() {
            return Err(Error::WideIntegerDisabled);
        }
        let bytes = self.heap_bytes()?;
        Ok(HeapView { bytes, kind })
    }

    pub(crate) fn read_bytes(&mut self, ptr: Ptr, len: usize) -> Result<&[u8]> {
        let bytes = self.heap_bytes()?;
        let range = span(ptr, len, bytes.len())?;
        Ok(&bytes[range])
    }

    pub(crate) fn write_bytes(&mut self, ptr: Ptr, data: &[u8]) -> Result<()> {
        let bytes = self.heap_bytes_mut()?;
        let range = span(ptr, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Read one value of type `tag` at `ptr`.
    pub fn peek(&mut self, ptr: Ptr, tag: &str) -> Result<Value> {
        self.peek_ir(ptr, tag.parse()?)
    }

    pub fn peek_ir(&mut self, ptr: Ptr, ty: IrType) -> Result<Value> {
        let model = self.pointer();
        let pointer = ty == IrType::Ptr;
        let ty = model.check_ir(ty)?;
        let b = self.read_bytes(ptr, ty.size(model.ir()))?;
        Ok(decode(ty, pointer, b))
    }

    /// Read one value per address.
    pub fn peek_many(&mut self, ptrs: &[Ptr], tag: &str) -> Result<Vec<Value>> {
        let ty: IrType = tag.parse()?;
        ptrs.iter().map(|p| self.peek_ir(*p, ty)).collect()
    }

    /// Write `value` as type `tag` at `ptr`.
    pub fn poke(&mut self, ptr: Ptr, value: &Value, tag: &str) -> Result<()> {
        self.poke_ir(ptr, value, tag.parse()?)
    }

    pub fn poke_ir(&mut self, ptr: Ptr, value: &Value, ty: IrType) -> Result<()> {
        let ty = self.pointer().check_ir(ty)?;
        let (buf, n) = encode(ty, value)?;
        self.write_bytes(ptr, &buf[..n])
    }

    /// Write the same value at every address.
    pub fn poke_many(&mut self, ptrs: &[Ptr], value: &Value, tag: &str) -> Result<()> {
        let ty: IrType = tag.parse()?;
        for p in ptrs {
            self.poke_ir(*p, value, ty)?;
        }
        Ok(())
    }

    pub fn peek_ptr(&mut self, ptr: Ptr) -> Result<Ptr> {
        let v = self.peek_ir(ptr, IrType::Ptr)?;
        self.pointer().coerce(&v)
    }

    pub fn poke_ptr(&mut self, ptr: Ptr, value: Ptr) -> Result<()> {
        self.poke_ir(ptr, &Value::from(value), IrType::Ptr)
    }
}
