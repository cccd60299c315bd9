//! Stacked allocation scopes.
//!
//! A scope owns memory blocks and function-table slots. Popping it releases
//! them in reverse order of registration.

use tracing::trace;
use wasmbridge_types::{Error, Result, Signature};

use crate::env::Env;
use crate::pointer::Ptr;
use crate::table::Callback;

/// Handle returned by [`Env::scoped_alloc_push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

/// Something a scope releases when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEntry {
    /// Memory block, deallocated.
    Block(Ptr),
    /// Function-table slot, uninstalled.
    Slot(Ptr),
}

#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    next: u64,
    scopes: Vec<(ScopeId, Vec<ScopeEntry>)>,
}

impl ScopeStack {
    fn push(&mut self) -> ScopeId {
        self.next += 1;
        let id = ScopeId(self.next);
        self.scopes.push((id, Vec::new()));
        id
    }

    fn remove(&mut self, id: Option<ScopeId>) -> Option<Vec<ScopeEntry>> {
        let index = match id {
            Some(id) => self.scopes.iter().rposition(|(s, _)| *s == id)?,
            None => self.scopes.len().checked_sub(1)?,
        };
        Some(self.scopes.remove(index).1)
    }

    pub(crate) fn track(&mut self, entry: ScopeEntry) -> bool {
        match self.scopes.last_mut() {
            Some((_, entries)) => {
                entries.push(entry);
                true
            }
            None => false,
        }
    }

    pub(crate) fn level(&self) -> usize {
        self.scopes.len()
    }
}

impl Env<'_> {
    /// Open a new allocation scope.
    pub fn scoped_alloc_push(&mut self) -> Result<ScopeId> {
        self.require_allocator("scoped_alloc_push")?;
        let scopes = &mut self.bridge_mut().scopes;
        let id = scopes.push();
        trace!(level = scopes.level(), "scope pushed");
        Ok(id)
    }

    /// Close a scope (the innermost one for `None`) and release its entries.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub fn scoped_alloc_pop(&mut self, id: Option<ScopeId>) -> Result<()> {
        self.require_allocator("scoped_alloc_pop")?;
        let entries = self
            .bridge_mut()
            .scopes
            .remove(id)
            .ok_or_else(|| Error::Scope("invalid scope for scoped_alloc_pop()".to_string()))?;
        trace!(
            level = self.scoped_alloc_level(),
            entries = entries.len(),
            "scope popped"
        );
        let mut first = None;
        for entry in entries.into_iter().rev() {
            let released = match entry {
                ScopeEntry::Block(p) => self.dealloc(p),
                ScopeEntry::Slot(p) => self.uninstall_function(Some(p)).map(|_| ()),
            };
            if let Err(err) = released {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub fn scoped_alloc_level(&self) -> usize {
        self.bridge().scopes.level()
    }

    /// Register an entry with the innermost scope.
    pub fn scope_track(&mut self, entry: ScopeEntry) -> Result<()> {
        if self.bridge_mut().scopes.track(entry) {
            Ok(())
        } else {
            Err(Error::Scope("no active allocation scope".to_string()))
        }
    }

    /// Allocate `n` bytes owned by the innermost scope.
    pub fn scoped_alloc(&mut self, n: usize) -> Result<Ptr> {
        if self.scoped_alloc_level() == 0 {
            return Err(Error::Scope("no active allocation scope".to_string()));
        }
        let ptr = self.alloc(n)?;
        self.scope_track(ScopeEntry::Block(ptr))?;
        Ok(ptr)
    }

    /// Run `f` inside a fresh scope, popping it on every exit path.
    ///
    /// An error from `f` takes precedence over one from the pop.
    pub fn scoped_alloc_call<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let id = self.scoped_alloc_push()?;
        let out = f(self);
        let popped = self.scoped_alloc_pop(Some(id));
        let value = out?;
        popped?;
        Ok(value)
    }

    /// Install a callback whose slot is owned by the innermost scope.
    pub fn scoped_install_function(&mut self, cb: Callback, sig: &Signature) -> Result<Ptr> {
        if self.scoped_alloc_level() == 0 {
            return Err(Error::Scope("no active allocation scope".to_string()));
        }
        let ptr = self.install_function(cb, sig)?;
        self.scope_track(ScopeEntry::Slot(ptr))?;
        Ok(ptr)
    }

    /// Allocate `n` zeroed pointer slots and return their addresses.
    ///
    /// With `safe`, every slot is 8 bytes wide regardless of the pointer IR.
    pub fn alloc_ptr(&mut self, n: usize, safe: bool) -> Result<Vec<Ptr>> {
        self.alloc_ptr_impl(n, safe, false)
    }

    /// [`Env::alloc_ptr`] with the block owned by the innermost scope.
    pub fn scoped_alloc_ptr(&mut self, n: usize, safe: bool) -> Result<Vec<Ptr>> {
        self.alloc_ptr_impl(n, safe, true)
    }

    fn alloc_ptr_impl(&mut self, n: usize, safe: bool, scoped: bool) -> Result<Vec<Ptr>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let width = if safe { 8 } else { self.pointer().size() };
        let bytes = n.checked_mul(width).ok_or(Error::Allocation(usize::MAX))?;
        let base = if scoped {
            self.scoped_alloc(bytes)?
        } else {
            self.alloc(bytes)?
        };
        self.write_bytes(base, &vec![0u8; bytes])?;
        Ok((0..n as u64).map(|i| base.offset(i * width as u64)).collect())
    }

    /// Build a NULL-terminated `char*` array as passed to `main()`.
    ///
    /// The caller owns the array and every string in it.
    pub fn alloc_main_argv(&mut self, args: &[&str]) -> Result<Ptr> {
        self.main_argv_impl(args, false)
    }

    /// [`Env::alloc_main_argv`] with everything owned by the innermost scope.
    pub fn scoped_alloc_main_argv(&mut self, args: &[&str]) -> Result<Ptr> {
        self.main_argv_impl(args, true)
    }

    fn main_argv_impl(&mut self, args: &[&str], scoped: bool) -> Result<Ptr> {
        let width = self.pointer().size();
        let bytes = args
            .len()
            .checked_add(1)
            .and_then(|slots| slots.checked_mul(width))
            .ok_or(Error::Allocation(usize::MAX))?;
        let list = if scoped {
            self.scoped_alloc(bytes)?
        } else {
            self.alloc(bytes)?
        };
        for (i, arg) in args.iter().enumerate() {
            let s = if scoped {
                self.scoped_alloc_cstring(arg)?
            } else {
                self.alloc_cstring(arg)?
            };
            self.poke_ptr(list.offset((i * width) as u64), s)?;
        }
        self.poke_ptr(list.offset((args.len() * width) as u64), Ptr::NULL)?;
        Ok(list)
    }
}
