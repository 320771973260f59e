//! Function values: user closures and native methods.

use smallvec::SmallVec;
use strum::Display;

use crate::{
    bytecode::UserFnId,
    closure::ClosureId,
    error::{RunError, RunResult},
    value::Kind,
};

/// A callable heap object.
#[derive(Debug, Clone)]
pub enum Function {
    /// A user function: a prototype from the compiled tables plus the
    /// lexical environment captured when `NewFn` executed.
    User(UserFunction),
    /// A built-in method implemented by the engine.
    Native(NativeMethod),
}

/// A user function instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserFunction {
    /// Index of the prototype (shape + segment + arg checks) in the
    /// compiled tables.
    pub fn_id: UserFnId,
    /// The closure captured as lexical parent at `NewFn` time.
    pub captured: ClosureId,
}

/// Built-in methods reachable through property lookup on primitive kinds.
///
/// The string form is the method's Smile spelling, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NativeMethod {
    // List iteration (state-machine driven)
    #[strum(serialize = "each")]
    Each,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "where")]
    Where,
    #[strum(serialize = "any?")]
    Any,
    #[strum(serialize = "all?")]
    All,
    #[strum(serialize = "contains?")]
    Contains,
    #[strum(serialize = "count")]
    Count,
    #[strum(serialize = "first")]
    First,
    #[strum(serialize = "index-of")]
    IndexOf,
    #[strum(serialize = "sort")]
    Sort,
    #[strum(serialize = "sort!")]
    SortInPlace,

    // List structure
    #[strum(serialize = "cons")]
    Cons,
    #[strum(serialize = "car")]
    Car,
    #[strum(serialize = "cdr")]
    Cdr,
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "has-cycle?")]
    HasCycle,
    #[strum(serialize = "well-formed?")]
    WellFormed,
    #[strum(serialize = "clone")]
    Clone,
    #[strum(serialize = "append")]
    Append,
    #[strum(serialize = "append!")]
    AppendInPlace,
    #[strum(serialize = "append-list")]
    AppendList,
    #[strum(serialize = "append-list!")]
    AppendListInPlace,
    #[strum(serialize = "combine")]
    Combine,
    #[strum(serialize = "nth")]
    Nth,
    #[strum(serialize = "nth-cell")]
    NthCell,
    #[strum(serialize = "nth-reverse")]
    NthReverse,
    #[strum(serialize = "skip")]
    Skip,
    #[strum(serialize = "take")]
    Take,
    #[strum(serialize = "tail")]
    Tail,
    #[strum(serialize = "join")]
    Join,
    #[strum(serialize = "reverse")]
    Reverse,
    #[strum(serialize = "empty?")]
    Empty,

    // Arithmetic and comparison (numeric kinds)
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "mod")]
    Mod,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "compare")]
    Compare,
    #[strum(serialize = "compare-equal?")]
    CompareEqual,

    // Conversions
    #[strum(serialize = "to-bool")]
    ToBool,
    #[strum(serialize = "to-int")]
    ToInt,
    #[strum(serialize = "to-string")]
    ToString,
    #[strum(serialize = "hash")]
    Hash,
}

/// Argument-check flags. Stored as a small bitfield so descriptors pack
/// tightly in the user-function table.
pub mod arg_check_flags {
    pub const EXACT: u8 = 0x01;
    pub const MIN: u8 = 0x02;
    pub const MAX: u8 = 0x04;
    pub const TYPES: u8 = 0x08;
    pub const STATE_MACHINE: u8 = 0x10;
}

/// Argument-check descriptor attached to a user-function prototype.
#[derive(Debug, Clone, Default)]
pub struct ArgCheck {
    /// Combination of [`arg_check_flags`] bits.
    pub flags: u8,
    pub min: u8,
    pub max: u8,
    /// `(mask, expected_kind)` pairs, one per checked argument position.
    /// A zero mask skips the position.
    pub types: SmallVec<[(u8, Kind); 4]>,
}

impl ArgCheck {
    /// A descriptor that accepts anything.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Exactly `n` arguments, no type constraints.
    #[must_use]
    pub fn exact(n: u8) -> Self {
        Self {
            flags: arg_check_flags::EXACT,
            min: n,
            max: n,
            types: SmallVec::new(),
        }
    }

    /// Between `min` and `max` arguments.
    #[must_use]
    pub fn range(min: u8, max: u8) -> Self {
        Self {
            flags: arg_check_flags::MIN | arg_check_flags::MAX,
            min,
            max,
            types: SmallVec::new(),
        }
    }

    /// Validates a call of `argc` arguments whose kinds are produced lazily
    /// by `kind_of`. `name` appears in the error message.
    pub fn check(&self, name: &str, argc: usize, mut kind_of: impl FnMut(usize) -> Kind) -> RunResult<()> {
        use arg_check_flags::{EXACT, MAX, MIN, TYPES};

        if self.flags & EXACT != 0 && argc != self.min as usize {
            return Err(RunError::native(format!(
                "'{name}' requires exactly {} arguments, but was called with {argc}.",
                self.min
            )));
        }
        if self.flags & MIN != 0 && argc < self.min as usize {
            return Err(RunError::native(format!(
                "'{name}' requires at least {} arguments, but was called with {argc}.",
                self.min
            )));
        }
        if self.flags & MAX != 0 && argc > self.max as usize {
            return Err(RunError::native(format!(
                "'{name}' allows at most {} arguments, but was called with {argc}.",
                self.max
            )));
        }
        if self.flags & TYPES != 0 {
            for (position, &(mask, expected)) in self.types.iter().enumerate().take(argc) {
                if mask == 0 {
                    continue;
                }
                let actual = kind_of(position);
                if actual != expected {
                    return Err(RunError::native(format!(
                        "Argument {} to '{name}' is of the wrong type.",
                        position + 1
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_check_rejects_wrong_arity() {
        let check = ArgCheck::exact(2);
        assert!(check.check("cons", 2, |_| Kind::Null).is_ok());
        let err = check.check("cons", 1, |_| Kind::Null).unwrap_err();
        assert!(err.to_string().contains("exactly 2"));
    }

    #[test]
    fn type_check_names_the_offending_position() {
        let mut check = ArgCheck::exact(1);
        check.flags |= arg_check_flags::TYPES;
        check.types.push((0xFF, Kind::List));
        let err = check.check("each", 1, |_| Kind::Integer64).unwrap_err();
        assert!(err.to_string().contains("Argument 1"));
    }
}
