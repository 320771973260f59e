//! The tagged runtime value.
//!
//! A [`Value`] is either an unboxed primitive carried inline (null, bool,
//! symbol, character, code point, the fixed-width numerics) or a reference
//! into the heap arena ([`Value::Ref`]). Every value classifies to a
//! one-byte [`Kind`], so dispatch tables can switch on the kind directly.
//!
//! Unboxed primitives never appear inside object slots: storing one into a
//! property bag or a global boxes it ([`Heap::box_value`]), and loading from
//! those places unboxes ([`Heap::unbox_value`]). The operand stack is the
//! only place unboxed values travel freely.

use std::fmt::Write as _;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    heap::{Heap, HeapData, HeapId},
    symbol::{KnownSymbol, Symbol, SymbolTable},
};

/// A 32-bit "decimal-tagged" floating-point value.
///
/// Real kinds are kept distinct from the binary Float kinds so the two
/// numeric towers never silently merge, even though the arithmetic beneath
/// them is binary floating point here.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Real32(pub f32);

/// A 64-bit "decimal-tagged" floating-point value. See [`Real32`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Real64(pub f64);

/// One-byte kind discriminator for every runtime value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Null = 0,
    Bool,
    Symbol,
    Char,
    Uni,
    Byte,
    Integer16,
    Integer32,
    Integer64,
    Integer128,
    Real32,
    Real64,
    Float32,
    Float64,
    String,
    List,
    Function,
    Object,
    Till,
    Regex,
    RegexMatch,
}

impl Kind {
    /// The type-name symbol reported by `typeof` for this kind.
    #[must_use]
    pub fn type_symbol(self) -> Symbol {
        let known = match self {
            Self::Null => KnownSymbol::TypeNull,
            Self::Bool => KnownSymbol::TypeBool,
            Self::Symbol => KnownSymbol::TypeSymbol,
            Self::Char => KnownSymbol::TypeChar,
            Self::Uni => KnownSymbol::TypeUni,
            Self::Byte => KnownSymbol::TypeByte,
            Self::Integer16 => KnownSymbol::TypeInteger16,
            Self::Integer32 => KnownSymbol::TypeInteger32,
            Self::Integer64 => KnownSymbol::TypeInteger64,
            Self::Integer128 => KnownSymbol::TypeInteger128,
            Self::Real32 => KnownSymbol::TypeReal32,
            Self::Real64 => KnownSymbol::TypeReal64,
            Self::Float32 => KnownSymbol::TypeFloat32,
            Self::Float64 => KnownSymbol::TypeFloat64,
            Self::String => KnownSymbol::TypeString,
            Self::List => KnownSymbol::TypeList,
            Self::Function => KnownSymbol::TypeFn,
            Self::Object => KnownSymbol::TypeObject,
            Self::Regex => KnownSymbol::TypeRegex,
            Self::RegexMatch => KnownSymbol::TypeRegexMatch,
            Self::Till => KnownSymbol::TypeTillContinuation,
        };
        known.symbol()
    }
}

/// A tagged runtime value. `Copy`: heap values are carried by id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Symbol(Symbol),
    /// A single byte character (Latin-1 range).
    Char(u8),
    /// A Unicode code point.
    Uni(u32),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Real32(Real32),
    Real64(Real64),
    Float32(f32),
    Float64(f64),
    /// Reference to a heap object.
    Ref(HeapId),
}

impl Value {
    /// Classifies this value. Boxed primitives classify as their inner kind,
    /// matching how they compare and convert.
    #[must_use]
    pub fn kind(self, heap: &Heap) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Symbol(_) => Kind::Symbol,
            Self::Char(_) => Kind::Char,
            Self::Uni(_) => Kind::Uni,
            Self::Byte(_) => Kind::Byte,
            Self::Int16(_) => Kind::Integer16,
            Self::Int32(_) => Kind::Integer32,
            Self::Int64(_) => Kind::Integer64,
            Self::Real32(_) => Kind::Real32,
            Self::Real64(_) => Kind::Real64,
            Self::Float32(_) => Kind::Float32,
            Self::Float64(_) => Kind::Float64,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(_) => Kind::String,
                HeapData::Cons(_) => Kind::List,
                HeapData::Int128(_) => Kind::Integer128,
                HeapData::Boxed(inner) => inner.kind(heap),
                HeapData::Function(_) => Kind::Function,
                HeapData::Object(_) => Kind::Object,
                HeapData::Till(_) => Kind::Till,
                HeapData::Regex(_) => Kind::Regex,
                HeapData::Match(_) => Kind::RegexMatch,
            },
        }
    }

    /// True when this value is an *unboxed* Bool — the only case `Bt`/`Bf`
    /// may branch on without a `to-bool` conversion.
    #[must_use]
    pub fn is_unboxed_bool(self) -> bool {
        matches!(self, Self::Bool(_))
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// The `to-bool` conversion. Null is false, Bool is itself, numbers are
    /// true when nonzero, strings when nonempty; everything else is true.
    #[must_use]
    pub fn to_bool(self, heap: &Heap) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => b,
            Self::Symbol(s) => !s.is_none(),
            Self::Char(c) => c != 0,
            Self::Uni(u) => u != 0,
            Self::Byte(b) => b != 0,
            Self::Int16(v) => v != 0,
            Self::Int32(v) => v != 0,
            Self::Int64(v) => v != 0,
            Self::Real32(v) => v.0 != 0.0,
            Self::Real64(v) => v.0 != 0.0,
            Self::Float32(v) => v != 0.0,
            Self::Float64(v) => v != 0.0,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => !s.is_empty(),
                HeapData::Int128(v) => *v != 0,
                HeapData::Boxed(inner) => inner.to_bool(heap),
                _ => true,
            },
        }
    }

    /// Structural equality: the `compare-equal?` contract behind `===`.
    ///
    /// Values of different kinds are never equal. Strings compare bytewise,
    /// lists compare by spine (cycle-guarded), most other heap objects
    /// compare by identity. Boxed primitives compare as their inner value.
    #[must_use]
    pub fn compare_equal(self, other: Self, heap: &Heap) -> bool {
        let mut seen = AHashSet::new();
        compare_equal_inner(self, other, heap, &mut seen)
    }

    /// The `is` relation: identical primitives, or `other` appears on this
    /// value's base chain.
    #[must_use]
    pub fn is_a(self, ancestor: Self, heap: &Heap) -> bool {
        match (self, ancestor) {
            (Self::Ref(a), Self::Ref(b)) if a == b => true,
            (Self::Ref(id), Self::Ref(_)) => {
                // Walk the user-object base chain.
                let mut current = id;
                loop {
                    let HeapData::Object(obj) = heap.get(current) else {
                        return self.compare_equal(ancestor, heap);
                    };
                    match obj.base {
                        Self::Ref(base_id) => {
                            if Self::Ref(base_id) == ancestor {
                                return true;
                            }
                            current = base_id;
                        }
                        _ => return false,
                    }
                }
            }
            _ => self.compare_equal(ancestor, heap),
        }
    }

    /// Renders this value the way the REPL prints parsed programs: lists in
    /// brackets, `[$dot a b]` forms with the `[a.b]` sugar, strings quoted.
    #[must_use]
    pub fn repr(self, heap: &Heap, symbols: &SymbolTable) -> String {
        let mut out = String::new();
        let mut seen = AHashSet::new();
        write_repr(self, heap, symbols, &mut out, &mut seen);
        out
    }
}

fn compare_equal_inner(a: Value, b: Value, heap: &Heap, seen: &mut AHashSet<(HeapId, HeapId)>) -> bool {
    let a = heap.unbox_value(a);
    let b = heap.unbox_value(b);
    match (a, b) {
        (Value::Ref(ia), Value::Ref(ib)) => {
            if ia == ib {
                return true;
            }
            match (heap.get(ia), heap.get(ib)) {
                (HeapData::Str(sa), HeapData::Str(sb)) => sa.as_bytes() == sb.as_bytes(),
                (HeapData::Int128(va), HeapData::Int128(vb)) => va == vb,
                (HeapData::Regex(ra), HeapData::Regex(rb)) => ra.pattern == rb.pattern && ra.flags == rb.flags,
                (HeapData::Cons(ca), HeapData::Cons(cb)) => {
                    // A revisited cell pair means both spines looped; treat
                    // the cycle as equal-so-far rather than recursing forever.
                    if !seen.insert((ia, ib)) {
                        return true;
                    }
                    compare_equal_inner(ca.a, cb.a, heap, seen) && compare_equal_inner(ca.d, cb.d, heap, seen)
                }
                _ => false,
            }
        }
        _ => a == b,
    }
}

fn write_repr(value: Value, heap: &Heap, symbols: &SymbolTable, out: &mut String, seen: &mut AHashSet<HeapId>) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Symbol(s) => out.push_str(symbols.name(s)),
        Value::Char(c) => {
            let _ = write!(out, "'{}'", char::from(c));
        }
        Value::Uni(u) => {
            let _ = write!(out, "\\u{u:x}");
        }
        Value::Byte(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Int16(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Int32(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Int64(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Real32(v) => {
            let _ = write!(out, "{}", v.0);
        }
        Value::Real64(v) => {
            let _ = write!(out, "{}", v.0);
        }
        Value::Float32(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float64(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Ref(id) => write_heap_repr(id, heap, symbols, out, seen),
    }
}

fn write_heap_repr(id: HeapId, heap: &Heap, symbols: &SymbolTable, out: &mut String, seen: &mut AHashSet<HeapId>) {
    match heap.get(id) {
        HeapData::Str(s) => {
            let _ = write!(out, "\"{}\"", s.to_utf8_lossy());
        }
        HeapData::Int128(v) => {
            let _ = write!(out, "{v}");
        }
        HeapData::Boxed(inner) => write_repr(*inner, heap, symbols, out, seen),
        HeapData::Function(_) => out.push_str("<fn>"),
        HeapData::Object(_) => out.push_str("<object>"),
        HeapData::Till(_) => out.push_str("<till-continuation>"),
        HeapData::Regex(r) => {
            let _ = write!(out, "#/{}/{}", r.pattern, r.flags);
        }
        HeapData::Match(_) => out.push_str("<regex-match>"),
        HeapData::Cons(_) => {
            if !seen.insert(id) {
                out.push_str("[...]");
                return;
            }
            write_list_repr(id, heap, symbols, out, seen);
            seen.remove(&id);
        }
    }
}

fn write_list_repr(id: HeapId, heap: &Heap, symbols: &SymbolTable, out: &mut String, seen: &mut AHashSet<HeapId>) {
    // `[$dot a b]` prints with the dot sugar: `[a.b]`.
    if let Some((lhs, rhs)) = dot_form_parts(id, heap) {
        out.push('[');
        write_repr(lhs, heap, symbols, out, seen);
        out.push('.');
        write_repr(rhs, heap, symbols, out, seen);
        out.push(']');
        return;
    }

    out.push('[');
    let mut current = Value::Ref(id);
    let mut first = true;
    loop {
        match current {
            Value::Ref(cell_id) => match heap.get(cell_id) {
                HeapData::Cons(cons) => {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    write_repr(cons.a, heap, symbols, out, seen);
                    current = cons.d;
                    if let Value::Ref(next_id) = current
                        && matches!(heap.get(next_id), HeapData::Cons(_))
                        && !seen.insert(next_id)
                    {
                        out.push_str(" ...");
                        current = Value::Null;
                    }
                }
                _ => {
                    // Malformed tail: print the dotted-pair ending.
                    out.push_str(" . ");
                    write_repr(current, heap, symbols, out, seen);
                    break;
                }
            },
            Value::Null => break,
            other => {
                out.push_str(" . ");
                write_repr(other, heap, symbols, out, seen);
                break;
            }
        }
    }
    out.push(']');
}

/// If the list starting at `id` is exactly `[$dot lhs rhs]`, returns the
/// pair. Used by the printer for the `[lhs.rhs]` sugar.
fn dot_form_parts(id: HeapId, heap: &Heap) -> Option<(Value, Value)> {
    let HeapData::Cons(head) = heap.get(id) else {
        return None;
    };
    if head.a != Value::Symbol(KnownSymbol::DollarDot.symbol()) {
        return None;
    }
    let second = heap.as_cons(head.d)?;
    let third = heap.as_cons(second.d)?;
    if third.d.is_null() { Some((second.a, third.a)) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourcePos;

    #[test]
    fn kinds_classify_immediates() {
        let heap = Heap::new();
        assert_eq!(Value::Null.kind(&heap), Kind::Null);
        assert_eq!(Value::Int64(3).kind(&heap), Kind::Integer64);
        assert_eq!(Value::Bool(true).kind(&heap), Kind::Bool);
    }

    #[test]
    fn boxed_values_classify_and_compare_as_inner() {
        let mut heap = Heap::new();
        let boxed = heap.box_value(Value::Int64(42));
        assert!(matches!(boxed, Value::Ref(_)));
        assert_eq!(boxed.kind(&heap), Kind::Integer64);
        assert!(boxed.compare_equal(Value::Int64(42), &heap));
        assert!(!boxed.is_unboxed_bool());
    }

    #[test]
    fn list_repr_prints_brackets_and_dot_sugar() {
        let mut heap = Heap::new();
        let symbols = SymbolTable::with_known_symbols();
        let pos = SourcePos::UNKNOWN;
        // [$dot 1 <]
        let dot_sym = Value::Symbol(KnownSymbol::DollarDot.symbol());
        let lt = Value::Symbol(KnownSymbol::Lt.symbol());
        let tail2 = heap.alloc_cons(lt, Value::Null, pos);
        let tail1 = heap.alloc_cons(Value::Int64(1), tail2, pos);
        let dot = heap.alloc_cons(dot_sym, tail1, pos);
        assert_eq!(dot.repr(&heap, &symbols), "[1.<]");
        // [[1.<] 2]
        let t = heap.alloc_cons(Value::Int64(2), Value::Null, pos);
        let call = heap.alloc_cons(dot, t, pos);
        assert_eq!(call.repr(&heap, &symbols), "[[1.<] 2]");
    }

    #[test]
    fn cyclic_list_repr_terminates() {
        let mut heap = Heap::new();
        let symbols = SymbolTable::with_known_symbols();
        let cell = heap.alloc_cons(Value::Int64(1), Value::Null, SourcePos::UNKNOWN);
        let Value::Ref(id) = cell else { unreachable!() };
        if let HeapData::Cons(c) = heap.get_mut(id) {
            c.d = cell;
        }
        let repr = cell.repr(&heap, &symbols);
        assert!(repr.contains("..."));
    }
}
