//! Closures: lexical frames with inline argument, local, and operand-stack
//! storage.
//!
//! A [`ClosureInfo`] is the compile-time shape (names and counts, lexical
//! parent, stack budget); a [`Closure`] is one runtime activation. Frames
//! live in a [`Frames`] arena and reference each other by [`ClosureId`], so
//! return linkage, lexical parents, and till continuations are plain ids
//! with no ownership cycles.
//!
//! Slot layout: `[args..][locals..][operand stack..]`. The operand stack is
//! the tail of the slot vector; `stack_top` is simply its length.

use ahash::AHashMap;

use crate::{
    bytecode::SegmentId,
    listops::StateMachine,
    symbol::Symbol,
    value::Value,
};

/// Index of a [`ClosureInfo`] in the compiled tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClosureInfoId(pub u32);

/// Compile-time shape of a closure.
#[derive(Debug, Clone, Default)]
pub struct ClosureInfo {
    /// Names of the positional arguments.
    pub arg_names: Vec<Symbol>,
    /// Names of the body-declared locals.
    pub local_names: Vec<Symbol>,
    /// Operand-stack budget for this frame.
    pub max_stack: u16,
    /// Lexical parent shape, if any.
    pub parent: Option<ClosureInfoId>,
}

impl ClosureInfo {
    #[must_use]
    pub fn num_args(&self) -> usize {
        self.arg_names.len()
    }

    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.local_names.len()
    }
}

/// Index of a runtime frame in the [`Frames`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureId(pub u32);

/// Where a frame returns to when it executes `Ret`.
#[derive(Debug, Clone, Copy)]
pub struct ReturnLink {
    pub segment: SegmentId,
    pub pc: usize,
    pub closure: ClosureId,
}

/// One runtime activation frame.
pub struct Closure {
    /// Shape id, or `None` for the synthesized state-machine frames.
    pub info: Option<ClosureInfoId>,
    num_args: usize,
    num_locals: usize,
    /// `[args..][locals..][operand stack..]`.
    slots: Vec<Value>,
    /// Lexical parent frame.
    pub parent: Option<ClosureId>,
    /// Caller linkage; `None` for the root frame (its `Ret` halts the VM).
    pub ret: Option<ReturnLink>,
    /// Global-variable dictionary; present only on the root frame.
    pub globals: Option<AHashMap<Symbol, Value>>,
    /// Interruptible-iteration callbacks; present only on state-machine
    /// frames.
    pub machine: Option<Box<dyn StateMachine>>,
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("info", &self.info)
            .field("num_args", &self.num_args)
            .field("num_locals", &self.num_locals)
            .field("stack_depth", &self.stack_depth())
            .field("parent", &self.parent)
            .field("is_machine", &self.machine.is_some())
            .finish_non_exhaustive()
    }
}

impl Closure {
    /// Creates a frame from a shape, filling missing arguments and all
    /// locals with Null.
    #[must_use]
    pub fn from_info(info_id: ClosureInfoId, info: &ClosureInfo, args: &[Value], parent: Option<ClosureId>) -> Self {
        let num_args = info.num_args();
        let num_locals = info.num_locals();
        let mut slots = Vec::with_capacity(num_args + num_locals + info.max_stack as usize);
        for i in 0..num_args {
            slots.push(args.get(i).copied().unwrap_or(Value::Null));
        }
        slots.resize(num_args + num_locals, Value::Null);
        Self {
            info: Some(info_id),
            num_args,
            num_locals,
            slots,
            parent,
            ret: None,
            globals: None,
            machine: None,
        }
    }

    /// Creates the global (root) frame: no args or locals, just a globals
    /// dictionary and an operand stack.
    #[must_use]
    pub fn global(info_id: Option<ClosureInfoId>) -> Self {
        Self {
            info: info_id,
            num_args: 0,
            num_locals: 0,
            slots: Vec::new(),
            parent: None,
            ret: None,
            globals: Some(AHashMap::new()),
            machine: None,
        }
    }

    /// Creates a state-machine frame.
    #[must_use]
    pub fn state_machine(machine: Box<dyn StateMachine>, parent: Option<ClosureId>, ret: Option<ReturnLink>) -> Self {
        Self {
            info: None,
            num_args: 0,
            num_locals: 0,
            slots: Vec::new(),
            parent,
            ret,
            globals: None,
            machine: Some(machine),
        }
    }

    #[must_use]
    pub fn num_args(&self) -> usize {
        self.num_args
    }

    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.num_locals
    }

    fn stack_base(&self) -> usize {
        self.num_args + self.num_locals
    }

    /// Current operand-stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.slots.len() - self.stack_base()
    }

    pub fn push(&mut self, value: Value) {
        self.slots.push(value);
    }

    pub fn pop(&mut self) -> Value {
        debug_assert!(self.stack_depth() > 0, "operand stack underflow (compiler bug)");
        self.slots.pop().unwrap_or(Value::Null)
    }

    pub fn pop_count(&mut self, count: usize) {
        let new_len = self.slots.len().saturating_sub(count).max(self.stack_base());
        self.slots.truncate(new_len);
    }

    /// Pops `count` values, returning them in push order (first pushed
    /// first).
    pub fn pop_args(&mut self, count: usize) -> smallvec::SmallVec<[Value; 8]> {
        let mut args = smallvec::smallvec![Value::Null; count];
        for slot in args.iter_mut().rev() {
            *slot = self.pop();
        }
        args
    }

    /// The value `depth` entries below the top (0 = top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Value {
        let index = self.slots.len() - 1 - depth;
        self.slots[index]
    }

    pub fn set_top(&mut self, value: Value) {
        let index = self.slots.len() - 1;
        self.slots[index] = value;
    }

    pub fn set_peek(&mut self, depth: usize, value: Value) {
        let index = self.slots.len() - 1 - depth;
        self.slots[index] = value;
    }

    /// Truncates the operand stack to the given depth (for till escapes).
    pub fn truncate_stack(&mut self, depth: usize) {
        self.slots.truncate(self.stack_base() + depth);
    }

    // ------------------------------------------------------------------
    // Argument and local slots.

    #[must_use]
    pub fn get_arg(&self, index: usize) -> Value {
        self.slots.get(index).copied().unwrap_or(Value::Null)
    }

    pub fn set_arg(&mut self, index: usize, value: Value) {
        if index < self.num_args {
            self.slots[index] = value;
        }
    }

    #[must_use]
    pub fn get_local(&self, index: usize) -> Value {
        self.slots.get(self.num_args + index).copied().unwrap_or(Value::Null)
    }

    pub fn set_local(&mut self, index: usize, value: Value) {
        if index < self.num_locals {
            let base = self.num_args;
            self.slots[base + index] = value;
        }
    }
}

/// The frame arena for one VM.
#[derive(Debug, Default)]
pub struct Frames {
    frames: Vec<Closure>,
}

impl Frames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, closure: Closure) -> ClosureId {
        let id = ClosureId(u32::try_from(self.frames.len()).expect("frame arena exceeded u32 ids"));
        self.frames.push(closure);
        id
    }

    /// Number of frames allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ClosureId) -> &Closure {
        &self.frames[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ClosureId) -> &mut Closure {
        &mut self.frames[id.0 as usize]
    }

    /// Walks `scope` parent links up from `id`.
    #[must_use]
    pub fn ancestor(&self, id: ClosureId, scope: u32) -> Option<ClosureId> {
        let mut current = id;
        for _ in 0..scope {
            current = self.get(current).parent?;
        }
        Some(current)
    }

    /// Finds the root frame (the one holding the globals dictionary).
    #[must_use]
    pub fn root_of(&self, id: ClosureId) -> ClosureId {
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            current = parent;
        }
        current
    }
}

/// A till-loop escape continuation.
///
/// Captures the frame and segment that created it, the operand-stack depth
/// to restore, and the branch-target addresses. Escaping or ending the till
/// empties `targets`, which is what makes the continuation single-shot.
#[derive(Debug, Clone)]
pub struct TillContinuation {
    pub closure: ClosureId,
    pub segment: SegmentId,
    /// Operand-stack depth captured at `NewTill`.
    pub stack_depth: usize,
    /// Branch-target addresses, one per named till flag.
    pub targets: Vec<u32>,
}

impl TillContinuation {
    /// Marks the continuation as used up.
    pub fn invalidate(&mut self) {
        self.targets.clear();
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_info() -> ClosureInfo {
        ClosureInfo {
            arg_names: vec![Symbol(2000), Symbol(2001)],
            local_names: vec![Symbol(2002)],
            max_stack: 8,
            parent: None,
        }
    }

    #[test]
    fn slot_layout_separates_args_locals_stack() {
        let info = simple_info();
        let mut frame = Closure::from_info(ClosureInfoId(0), &info, &[Value::Int64(1)], None);
        assert_eq!(frame.get_arg(0), Value::Int64(1));
        assert_eq!(frame.get_arg(1), Value::Null); // missing arg filled with Null
        assert_eq!(frame.get_local(0), Value::Null);
        frame.set_local(0, Value::Int64(9));
        frame.push(Value::Int64(5));
        frame.push(Value::Int64(6));
        assert_eq!(frame.stack_depth(), 2);
        assert_eq!(frame.peek(0), Value::Int64(6));
        assert_eq!(frame.peek(1), Value::Int64(5));
        assert_eq!(frame.pop(), Value::Int64(6));
        assert_eq!(frame.get_local(0), Value::Int64(9));
        assert_eq!(frame.get_arg(0), Value::Int64(1));
    }

    #[test]
    fn ancestor_walks_parent_chain() {
        let mut frames = Frames::new();
        let root = frames.alloc(Closure::global(None));
        let info = simple_info();
        let child = frames.alloc(Closure::from_info(ClosureInfoId(0), &info, &[], Some(root)));
        let grandchild = frames.alloc(Closure::from_info(ClosureInfoId(0), &info, &[], Some(child)));
        assert_eq!(frames.ancestor(grandchild, 0), Some(grandchild));
        assert_eq!(frames.ancestor(grandchild, 2), Some(root));
        assert_eq!(frames.ancestor(grandchild, 3), None);
        assert_eq!(frames.root_of(grandchild), root);
    }
}
