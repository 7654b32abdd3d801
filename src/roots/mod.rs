//! Explicit GC roots - a fixed-capacity LIFO stack
//!
//! The tracing phase cannot see every live reference: a value held only in
//! a native temporary the compiler may have optimized away is invisible to
//! stack scanning. Code bracketing such a value pushes it here for the
//! duration of the unsafe window and pops it on the way out.
//!
//! Entries are either the object pointer itself or the address of a
//! variable that currently holds it; indirect entries are re-read at trace
//! time, because the variable's contents may have changed since the push.

#[cfg(test)]
mod tests;

use crate::logging::{error, log_protocol_violation, trace};
use crate::ObjPtr;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Fixed capacity of the root stack.
///
/// Overflow means systematic push/pop imbalance in the caller, not a
/// transient condition, and is fatal.
pub const ROOT_STACK_CAPACITY: usize = 256;

/// One entry on the root stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootEntry {
    /// The object pointer itself.
    Direct(ObjPtr),
    /// Address of a variable currently holding the object pointer; read at
    /// trace time, not at push time.
    Indirect(*mut ObjPtr),
}

/// Fixed-capacity stack of collector-visible references.
pub struct RootStack {
    entries: [RootEntry; ROOT_STACK_CAPACITY],
    depth: usize,
}

// Safety: raw pointers are only dereferenced during tracing, which the
// single-mutator model serializes against pushes and pops.
unsafe impl Send for RootStack {}

impl RootStack {
    pub const fn new() -> Self {
        Self {
            entries: [RootEntry::Direct(std::ptr::null_mut()); ROOT_STACK_CAPACITY],
            depth: 0,
        }
    }

    /// Current number of entries.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Root the object pointer itself.
    pub fn push_direct(&mut self, obj: ObjPtr) {
        self.push(RootEntry::Direct(obj));
    }

    /// Root the current contents of `slot`, whatever they are at trace
    /// time.
    pub fn push_indirect(&mut self, slot: *mut ObjPtr) {
        self.push(RootEntry::Indirect(slot));
    }

    fn push(&mut self, entry: RootEntry) {
        if self.depth == ROOT_STACK_CAPACITY {
            error!(target: "roots", entry = ?entry, "root stack overflow");
            panic!("root stack overflow: push/pop imbalance in caller");
        }
        self.entries[self.depth] = entry;
        self.depth += 1;
        trace!(target: "roots", depth = self.depth, "root pushed");
    }

    /// Pop the top entry, which must match `expected` exactly (same kind,
    /// same value). A mismatch is a push/pop imbalance in the caller:
    /// reported, stack left untouched.
    pub fn pop(&mut self, expected: RootEntry) {
        let Some(top) = self.depth.checked_sub(1).map(|i| self.entries[i]) else {
            log_protocol_violation("roots", "pop from empty root stack");
            debug_assert!(false, "pop from empty root stack");
            return;
        };
        if top != expected {
            log_protocol_violation("roots", "pop of mismatched root entry");
            debug_assert!(false, "pop of mismatched root entry: {top:?} != {expected:?}");
            return;
        }
        self.depth -= 1;
        trace!(target: "roots", depth = self.depth, "root popped");
    }

    /// Current object pointers, in push order. Indirect entries are
    /// dereferenced here, at iteration time.
    pub fn trace_all(&self) -> impl Iterator<Item = ObjPtr> + '_ {
        self.entries[..self.depth].iter().map(|entry| match *entry {
            RootEntry::Direct(obj) => obj,
            // Safety: an indirect entry's slot must outlive its push/pop
            // bracket; the caller guarantees this by stack discipline.
            RootEntry::Indirect(slot) => unsafe { *slot },
        })
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide root stack (the root set is process state, not per-thread).
static ROOTS: Lazy<Mutex<RootStack>> = Lazy::new(|| Mutex::new(RootStack::new()));

/// Push a direct root onto the process-wide stack.
pub fn push_direct(obj: ObjPtr) {
    ROOTS.lock().push_direct(obj);
}

/// Push an indirect root onto the process-wide stack.
pub fn push_indirect(slot: *mut ObjPtr) {
    ROOTS.lock().push_indirect(slot);
}

/// Pop the process-wide stack, asserting the expected top entry.
pub fn pop(expected: RootEntry) {
    ROOTS.lock().pop(expected);
}

/// Depth of the process-wide stack.
pub fn depth() -> usize {
    ROOTS.lock().depth()
}

/// Snapshot of the current root pointers (indirect entries dereferenced
/// now) for handing to `gc::collect`.
pub fn snapshot() -> Vec<ObjPtr> {
    ROOTS.lock().trace_all().collect()
}

/// RAII guard pairing a push on the process-wide stack with its matching
/// pop.
///
/// Usage:
/// ```ignore
/// let obj = make_object()?;
/// let _guard = RootGuard::direct(obj);
/// // obj stays collector-visible until _guard drops
/// ```
pub struct RootGuard {
    entry: RootEntry,
}

impl RootGuard {
    pub fn direct(obj: ObjPtr) -> Self {
        push_direct(obj);
        Self {
            entry: RootEntry::Direct(obj),
        }
    }

    pub fn indirect(slot: *mut ObjPtr) -> Self {
        push_indirect(slot);
        Self {
            entry: RootEntry::Indirect(slot),
        }
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        pop(self.entry);
    }
}
