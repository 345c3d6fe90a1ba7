//! One activation record of a user function call.
//!
//! A frame owns three things: the bindings of the decls declared (or
//! pre-bound as parameters) in this call, the result cache mapping each
//! evaluated node to its most recent word, and a grow-only local byte store
//! backing the arrays declared in this frame. The `pc` anchor remembers the
//! most recent expression node traversed so a callee's return value knows
//! which cache slot to land in.
//!
//! Frame-local storage is addressed through a region of the word space
//! disjoint from heap addresses: every activation gets its own
//! [`LOCAL_SPAN`]-sized slice starting at [`LOCAL_BASE`], so an address
//! alone identifies the arena (and the activation) that owns it. A decayed
//! array base can therefore cross a call boundary, or sit in a plain
//! pointer variable, and still route back to the frame that declared the
//! array.

use ahash::AHashMap;

use crate::error::{RunError, RunResult};
use crate::expressions::{DeclId, NodeId, WORD_SIZE};

/// Start of the frame-local address region; heap addresses stay below it.
pub const LOCAL_BASE: i64 = 1 << 48;

/// Size of the address slice reserved for one activation's local store.
pub const LOCAL_SPAN: i64 = 1 << 32;

/// Whether a word addresses frame-local storage rather than the heap.
pub fn is_local_address(addr: i64) -> bool {
    addr >= LOCAL_BASE
}

/// What a decl is bound to inside a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    /// An immediate word: scalar local, parameter, or pointer.
    Value(i64),
    /// Base address of an array backed by this frame's local byte store
    /// (an address inside this activation's slice of the local region).
    Array(i64),
}

#[derive(Debug)]
pub struct StackFrame {
    vars: AHashMap<DeclId, Binding>,
    exprs: AHashMap<NodeId, i64>,
    pc: Option<NodeId>,
    /// First address of this activation's slice of the local region.
    base: i64,
    /// Backs only the arrays declared in this frame; dies with the frame.
    /// Starts with one pad byte so no array base is the slice base itself.
    locals: Vec<u8>,
}

impl StackFrame {
    /// `serial` is the activation's index in the run's push order; it picks
    /// which slice of the local address region this frame owns.
    pub fn new(serial: u32) -> Self {
        Self {
            vars: AHashMap::new(),
            exprs: AHashMap::new(),
            pc: None,
            base: LOCAL_BASE + i64::from(serial) * LOCAL_SPAN,
            locals: vec![0],
        }
    }

    /// Creates or overwrites a binding in this frame.
    pub fn init_decl(&mut self, decl: DeclId, binding: Binding) {
        self.vars.insert(decl, binding);
    }

    /// Overwrites the word of an existing (or new) scalar binding.
    pub fn bind_value(&mut self, decl: DeclId, value: i64) {
        self.vars.insert(decl, Binding::Value(value));
    }

    pub fn has_decl(&self, decl: DeclId) -> bool {
        self.vars.contains_key(&decl)
    }

    /// The decl's current word: its value, or its array base address.
    pub fn decl_val(&self, decl: DeclId) -> Option<i64> {
        self.vars.get(&decl).map(|binding| match binding {
            Binding::Value(value) => *value,
            Binding::Array(base) => *base,
        })
    }

    pub fn bind_stmt(&mut self, node: NodeId, value: i64) {
        self.exprs.insert(node, value);
    }

    pub fn stmt_val(&self, node: NodeId) -> Option<i64> {
        self.exprs.get(&node).copied()
    }

    pub fn set_pc(&mut self, node: NodeId) {
        self.pc = Some(node);
    }

    pub fn pc(&self) -> Option<NodeId> {
        self.pc
    }

    /// Whether this activation's slice of the local region contains `addr`.
    pub fn owns(&self, addr: i64) -> bool {
        addr >= self.base && addr - self.base < LOCAL_SPAN
    }

    /// Grows the local byte store by `size` zeroed bytes and returns the
    /// address of the new region. There is no intra-frame free.
    pub fn alloc_local(&mut self, size: usize) -> i64 {
        let offset = self.locals.len();
        self.locals.resize(offset + size.max(1), 0);
        self.base + offset as i64
    }

    pub fn store_word_local(&mut self, addr: i64, value: i64) -> RunResult<()> {
        let offset = self.offset(addr)?;
        let slot = self
            .locals
            .get_mut(offset..offset + WORD_SIZE)
            .ok_or(RunError::OutOfBounds { arena: "frame", addr })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn load_word_local(&self, addr: i64) -> RunResult<i64> {
        let offset = self.offset(addr)?;
        let slot = self
            .locals
            .get(offset..offset + WORD_SIZE)
            .ok_or(RunError::OutOfBounds { arena: "frame", addr })?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(slot);
        Ok(i64::from_le_bytes(raw))
    }

    pub fn store_byte_local(&mut self, addr: i64, value: i64) -> RunResult<()> {
        let offset = self.offset(addr)?;
        let slot = self
            .locals
            .get_mut(offset)
            .ok_or(RunError::OutOfBounds { arena: "frame", addr })?;
        *slot = value as u8;
        Ok(())
    }

    /// Loads one byte, sign-extended to a word.
    pub fn load_byte_local(&self, addr: i64) -> RunResult<i64> {
        let offset = self.offset(addr)?;
        let byte = self
            .locals
            .get(offset)
            .ok_or(RunError::OutOfBounds { arena: "frame", addr })?;
        Ok(i64::from(*byte as i8))
    }

    /// Stores a scalar of the given width (1 for `char`, a word otherwise).
    pub fn store_scalar_local(&mut self, addr: i64, width: usize, value: i64) -> RunResult<()> {
        if width == 1 {
            self.store_byte_local(addr, value)
        } else {
            self.store_word_local(addr, value)
        }
    }

    pub fn load_scalar_local(&self, addr: i64, width: usize) -> RunResult<i64> {
        if width == 1 {
            self.load_byte_local(addr)
        } else {
            self.load_word_local(addr)
        }
    }

    fn offset(&self, addr: i64) -> RunResult<usize> {
        if !self.owns(addr) {
            return Err(RunError::OutOfBounds { arena: "frame", addr });
        }
        Ok((addr - self.base) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_and_cache_are_separate() {
        let mut frame = StackFrame::new(0);
        let decl = DeclId::new(0);
        let node = NodeId::new(0);
        frame.init_decl(decl, Binding::Value(3));
        frame.bind_stmt(node, 7);
        assert_eq!(frame.decl_val(decl), Some(3));
        assert_eq!(frame.stmt_val(node), Some(7));
        frame.bind_value(decl, 4);
        assert_eq!(frame.decl_val(decl), Some(4));
    }

    #[test]
    fn local_arrays_live_in_the_frame_store() {
        let mut frame = StackFrame::new(0);
        let decl = DeclId::new(1);
        let base = frame.alloc_local(3 * WORD_SIZE);
        assert!(is_local_address(base));
        frame.init_decl(decl, Binding::Array(base));
        assert_eq!(frame.decl_val(decl), Some(base));

        frame.store_word_local(base + WORD_SIZE as i64, 99).unwrap();
        assert_eq!(frame.load_word_local(base + WORD_SIZE as i64).unwrap(), 99);
        // untouched elements read as zero
        assert_eq!(frame.load_word_local(base).unwrap(), 0);
    }

    #[test]
    fn each_activation_owns_a_disjoint_slice() {
        let mut first = StackFrame::new(0);
        let mut second = StackFrame::new(1);
        let a = first.alloc_local(WORD_SIZE);
        let b = second.alloc_local(WORD_SIZE);
        assert!(first.owns(a) && !first.owns(b));
        assert!(second.owns(b) && !second.owns(a));
        assert_ne!(a, b);
    }

    #[test]
    fn byte_loads_sign_extend() {
        let mut frame = StackFrame::new(0);
        let base = frame.alloc_local(WORD_SIZE);
        frame.store_byte_local(base, 0xff).unwrap();
        assert_eq!(frame.load_byte_local(base).unwrap(), -1);
    }

    #[test]
    fn loads_outside_the_store_fail() {
        let frame = StackFrame::new(0);
        // a heap-space address is not this frame's to serve
        assert!(matches!(
            frame.load_word_local(64),
            Err(RunError::OutOfBounds { arena: "frame", .. })
        ));
        // inside the slice but past the allocated bytes
        assert!(matches!(
            frame.load_word_local(LOCAL_BASE + 64),
            Err(RunError::OutOfBounds { arena: "frame", .. })
        ));
    }

    #[test]
    fn cache_entries_overwrite_on_reevaluation() {
        let mut frame = StackFrame::new(0);
        let node = NodeId::new(5);
        frame.bind_stmt(node, 1);
        frame.bind_stmt(node, 2);
        assert_eq!(frame.stmt_val(node), Some(2));
    }
}
