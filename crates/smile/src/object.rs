//! User objects: symbol-keyed property bags with a base chain.
//!
//! Property order is user-visible (`property-names` reports insertion
//! order), so the bag is an `IndexMap`. Lookup falls back to the base
//! object's bag, which is how method inheritance works for user-defined
//! objects.

use indexmap::IndexMap;

use crate::{heap::Heap, symbol::Symbol, value::Value};

/// A heap object holding a property bag and an optional base.
#[derive(Debug, Default)]
pub struct UserObject {
    /// The prototype base object (`Value::Null` when none).
    pub base: Value,
    props: IndexMap<Symbol, Value>,
}

impl UserObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base(base: Value) -> Self {
        Self {
            base,
            props: IndexMap::new(),
        }
    }

    /// Direct (non-inherited) property read.
    #[must_use]
    pub fn get_local(&self, name: Symbol) -> Option<Value> {
        self.props.get(&name).copied()
    }

    /// Sets a property. Values stored here must already be boxed; the VM's
    /// store opcodes take care of that.
    pub fn set(&mut self, name: Symbol, value: Value) {
        self.props.insert(name, value);
    }

    #[must_use]
    pub fn has_local(&self, name: Symbol) -> bool {
        self.props.contains_key(&name)
    }

    /// Property names in insertion order.
    pub fn property_names(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.props.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

/// Reads a property from a user object, walking the base chain. Returns
/// `Value::Null` when the property does not exist anywhere on the chain.
#[must_use]
pub fn get_property(heap: &Heap, object: Value, name: Symbol) -> Value {
    let mut current = object;
    loop {
        let Some(obj) = heap.as_object(current) else {
            return Value::Null;
        };
        if let Some(value) = obj.get_local(name) {
            return value;
        }
        if obj.base.is_null() {
            return Value::Null;
        }
        current = obj.base;
    }
}

/// True when the property exists on the object or its base chain.
#[must_use]
pub fn has_property(heap: &Heap, object: Value, name: Symbol) -> bool {
    let mut current = object;
    loop {
        let Some(obj) = heap.as_object(current) else {
            return false;
        };
        if obj.has_local(name) {
            return true;
        }
        if obj.base.is_null() {
            return false;
        }
        current = obj.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::KnownSymbol;

    #[test]
    fn property_lookup_walks_the_base_chain() {
        let mut heap = Heap::new();
        let mut base = UserObject::new();
        base.set(KnownSymbol::Count.symbol(), Value::Int64(5));
        let base_val = heap.alloc_object(base);

        let child = UserObject::with_base(base_val);
        let child_val = heap.alloc_object(child);

        assert_eq!(get_property(&heap, child_val, KnownSymbol::Count.symbol()), Value::Int64(5));
        assert!(has_property(&heap, child_val, KnownSymbol::Count.symbol()));
        assert_eq!(get_property(&heap, child_val, KnownSymbol::Length.symbol()), Value::Null);
    }
}
