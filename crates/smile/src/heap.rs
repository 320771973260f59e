//! Arena heap for Smile objects.
//!
//! Heap values are stored in a growable arena and referenced by [`HeapId`].
//! The engine assumes a garbage-collected heap exists underneath it; this
//! arena is the simplest model of that contract — allocation is cheap,
//! nothing is freed until the owning [`Env`](crate::env::Env) is dropped.
//! Ids are never reused, so a stale id is a bug, not a dangling pointer.

use serde::{Deserialize, Serialize};

use crate::{
    closure::TillContinuation,
    error::SourcePos,
    function::Function,
    list::Cons,
    object::UserObject,
    regex::{Regex, RegexMatch},
    string::Str,
    value::Value,
};

/// Index of an object in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeapId(pub u32);

/// The heap-allocated object forms.
///
/// Immediate primitives have a boxed form here ([`HeapData::Boxed`]) used
/// whenever a primitive is stored into an object slot or a global variable.
#[derive(Debug)]
pub enum HeapData {
    /// An immutable byte string.
    Str(Str),
    /// A cons cell (list spine node).
    Cons(Cons),
    /// A 128-bit integer constant (always heap-allocated).
    Int128(i128),
    /// A boxed immediate primitive.
    Boxed(Value),
    /// A function (user closure or native method).
    Function(Function),
    /// A user object: property bag plus optional base.
    Object(UserObject),
    /// A till-loop escape continuation.
    Till(TillContinuation),
    /// A user-facing regex (pattern + flags + weak cache id).
    Regex(Regex),
    /// The result of a regex match.
    Match(RegexMatch),
}

/// The object arena for one interpreter context.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<HeapData>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new object and returns its id.
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.slots.len()).expect("heap arena exceeded u32 ids"));
        self.slots.push(data);
        id
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.0 as usize]
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ------------------------------------------------------------------
    // Allocation helpers for the common object forms.

    pub fn alloc_str(&mut self, s: impl Into<Str>) -> Value {
        let id = self.allocate(HeapData::Str(s.into()));
        Value::Ref(id)
    }

    pub fn alloc_cons(&mut self, a: Value, d: Value, pos: SourcePos) -> Value {
        let id = self.allocate(HeapData::Cons(Cons { a, d, pos }));
        Value::Ref(id)
    }

    pub fn alloc_function(&mut self, function: Function) -> Value {
        let id = self.allocate(HeapData::Function(function));
        Value::Ref(id)
    }

    pub fn alloc_object(&mut self, object: UserObject) -> Value {
        let id = self.allocate(HeapData::Object(object));
        Value::Ref(id)
    }

    /// Boxes an immediate value; `Ref` values pass through unchanged, and
    /// Null is its own heap object already.
    pub fn box_value(&mut self, value: Value) -> Value {
        match value {
            Value::Ref(_) | Value::Null => value,
            other => Value::Ref(self.allocate(HeapData::Boxed(other))),
        }
    }

    /// Unboxes a boxed primitive; every other value passes through.
    #[must_use]
    pub fn unbox_value(&self, value: Value) -> Value {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Boxed(inner) => *inner,
                _ => value,
            },
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Typed accessors. These return `None` on a kind mismatch so callers
    // can produce their own errors with context.

    #[must_use]
    pub fn as_str(&self, value: Value) -> Option<&Str> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_cons(&self, value: Value) -> Option<&Cons> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Cons(c) => Some(c),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_cons_mut(&mut self, value: Value) -> Option<&mut Cons> {
        match value {
            Value::Ref(id) => match self.get_mut(id) {
                HeapData::Cons(c) => Some(c),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self, value: Value) -> Option<&Function> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Function(f) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self, value: Value) -> Option<&UserObject> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Object(o) => Some(o),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_regex(&self, value: Value) -> Option<&Regex> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Regex(r) => Some(r),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_match(&self, value: Value) -> Option<&RegexMatch> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Match(m) => Some(m),
                _ => None,
            },
            _ => None,
        }
    }
}
