//! Symbol interning.
//!
//! Symbols are process-stable small integer ids paired with a canonical
//! name. Interning the same name always yields the same id, and ids are
//! assigned monotonically starting at 1 (0 is reserved as "no symbol").
//!
//! A fixed set of *known symbols* — keyword spellings, operator spellings,
//! special-form names, type names, common method/property names, and error
//! kinds — is preloaded into every new table in declaration order, so their
//! ids are compile-time constants: `KnownSymbol::If.symbol()` is the same
//! `Symbol` in every interpreter context. The preload is checked against the
//! reserved capacity so adding known symbols past the reserve is caught in
//! tests rather than silently shifting ids.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, EnumString, FromRepr, IntoEnumIterator, IntoStaticStr};

/// An interned symbol id. Valid symbols are ≥ 1; the default (0) is "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl Symbol {
    /// The reserved "no symbol" value.
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// How many symbol ids are reserved for the known-symbol preload.
///
/// The preload occupies ids `1..=KnownSymbol::COUNT`; dynamically interned
/// symbols begin after the reserve so the known range can grow between
/// versions without renumbering user symbols in serialized diagnostics.
pub const RESERVED_SYMBOL_IDS: u32 = 1024;

/// Symbols whose ids are fixed by initialization.
///
/// The string form of each variant is its canonical Smile spelling. Variants
/// are grouped by category; order within this enum is the preload order and
/// therefore defines the reserved ids, so variants must only ever be
/// appended, never reordered.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter, EnumCount, FromRepr,
)]
pub enum KnownSymbol {
    // ==========================
    // Assignment and declaration keywords
    #[strum(serialize = "=")]
    EqualsSign,
    #[strum(serialize = "op=")]
    OpEquals,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "unless")]
    Unless,
    #[strum(serialize = "then")]
    Then,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "until")]
    Until,
    #[strum(serialize = "till")]
    Till,
    #[strum(serialize = "do")]
    Do,
    #[strum(serialize = "when")]
    When,
    #[strum(serialize = "var")]
    Var,
    #[strum(serialize = "const")]
    Const,
    #[strum(serialize = "auto")]
    Auto,
    #[strum(serialize = "keyword")]
    Keyword,
    #[strum(serialize = "try")]
    Try,
    #[strum(serialize = "catch")]
    Catch,
    #[strum(serialize = "fn")]
    Fn,
    #[strum(serialize = "quote")]
    Quote,
    #[strum(serialize = "scope")]
    Scope,
    #[strum(serialize = "prog1")]
    Prog1,
    #[strum(serialize = "progn")]
    Progn,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "new")]
    New,
    #[strum(serialize = "is")]
    Is,
    #[strum(serialize = "typeof")]
    Typeof,
    #[strum(serialize = "brk")]
    Brk,

    // ==========================
    // Special forms ($-prefixed reserved symbols used in parser output)
    #[strum(serialize = "$dot")]
    DollarDot,
    #[strum(serialize = "$set")]
    DollarSet,
    #[strum(serialize = "$if")]
    DollarIf,
    #[strum(serialize = "$while")]
    DollarWhile,
    #[strum(serialize = "$till")]
    DollarTill,
    #[strum(serialize = "$fn")]
    DollarFn,
    #[strum(serialize = "$quote")]
    DollarQuote,
    #[strum(serialize = "$scope")]
    DollarScope,
    #[strum(serialize = "$prog1")]
    DollarProg1,
    #[strum(serialize = "$progn")]
    DollarProgn,
    #[strum(serialize = "$return")]
    DollarReturn,
    #[strum(serialize = "$catch")]
    DollarCatch,
    #[strum(serialize = "$not")]
    DollarNot,
    #[strum(serialize = "$or")]
    DollarOr,
    #[strum(serialize = "$and")]
    DollarAnd,
    #[strum(serialize = "$eq")]
    DollarEq,
    #[strum(serialize = "$ne")]
    DollarNe,
    #[strum(serialize = "$is")]
    DollarIs,
    #[strum(serialize = "$typeof")]
    DollarTypeof,
    #[strum(serialize = "$new")]
    DollarNew,
    #[strum(serialize = "$index")]
    DollarIndex,
    #[strum(serialize = "$brk")]
    DollarBrk,

    // ==========================
    // Operator spellings
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
    #[strum(serialize = "===")]
    SuperEq,
    #[strum(serialize = "!==")]
    SuperNe,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "<<<")]
    ArithmeticShiftLeft,
    #[strum(serialize = ">>>")]
    ArithmeticShiftRight,
    #[strum(serialize = "<<+")]
    RotateLeft,
    #[strum(serialize = "+>>")]
    RotateRight,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "?")]
    QuestionMark,
    #[strum(serialize = "(")]
    LeftParenthesis,
    #[strum(serialize = ")")]
    RightParenthesis,
    #[strum(serialize = "[")]
    LeftBracket,
    #[strum(serialize = "]")]
    RightBracket,
    #[strum(serialize = "{")]
    LeftBrace,
    #[strum(serialize = "}")]
    RightBrace,
    #[strum(serialize = "=>")]
    Implies,
    #[strum(serialize = "..")]
    DotDot,

    // ==========================
    // Type names
    #[strum(serialize = "Primitive")]
    TypePrimitive,
    #[strum(serialize = "Null")]
    TypeNull,
    #[strum(serialize = "Bool")]
    TypeBool,
    #[strum(serialize = "Byte")]
    TypeByte,
    #[strum(serialize = "Integer16")]
    TypeInteger16,
    #[strum(serialize = "Integer32")]
    TypeInteger32,
    #[strum(serialize = "Integer64")]
    TypeInteger64,
    #[strum(serialize = "Integer128")]
    TypeInteger128,
    #[strum(serialize = "Real32")]
    TypeReal32,
    #[strum(serialize = "Real64")]
    TypeReal64,
    #[strum(serialize = "Float32")]
    TypeFloat32,
    #[strum(serialize = "Float64")]
    TypeFloat64,
    #[strum(serialize = "Char")]
    TypeChar,
    #[strum(serialize = "Uni")]
    TypeUni,
    #[strum(serialize = "String")]
    TypeString,
    #[strum(serialize = "Symbol")]
    TypeSymbol,
    #[strum(serialize = "List")]
    TypeList,
    #[strum(serialize = "Map")]
    TypeMap,
    #[strum(serialize = "Fn")]
    TypeFn,
    #[strum(serialize = "Object")]
    TypeObject,
    #[strum(serialize = "Regex")]
    TypeRegex,
    #[strum(serialize = "RegexMatch")]
    TypeRegexMatch,
    #[strum(serialize = "TillContinuation")]
    TypeTillContinuation,

    // ==========================
    // Method and property names
    #[strum(serialize = "a")]
    A,
    #[strum(serialize = "d")]
    D,
    #[strum(serialize = "start")]
    Start,
    #[strum(serialize = "end")]
    End,
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "count")]
    Count,
    #[strum(serialize = "kind")]
    Kind,
    #[strum(serialize = "message")]
    Message,
    #[strum(serialize = "stack-trace")]
    StackTrace,
    #[strum(serialize = "filename")]
    Filename,
    #[strum(serialize = "line")]
    Line,
    #[strum(serialize = "column")]
    Column,
    #[strum(serialize = "offset")]
    Offset,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "mod")]
    Mod,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "range-to")]
    RangeTo,
    #[strum(serialize = "each")]
    Each,
    #[strum(serialize = "map")]
    MapMethod,
    #[strum(serialize = "where")]
    Where,
    #[strum(serialize = "any?")]
    AnyQ,
    #[strum(serialize = "all?")]
    AllQ,
    #[strum(serialize = "contains?")]
    ContainsQ,
    #[strum(serialize = "empty?")]
    EmptyQ,
    #[strum(serialize = "first")]
    First,
    #[strum(serialize = "index-of")]
    IndexOf,
    #[strum(serialize = "sort")]
    Sort,
    #[strum(serialize = "sort!")]
    SortInPlace,
    #[strum(serialize = "cons")]
    Cons,
    #[strum(serialize = "car")]
    Car,
    #[strum(serialize = "cdr")]
    Cdr,
    #[strum(serialize = "clone")]
    CloneMethod,
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
    #[strum(serialize = "of")]
    Of,
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
    #[strum(serialize = "has-cycle?")]
    HasCycleQ,
    #[strum(serialize = "well-formed?")]
    WellFormedQ,
    #[strum(serialize = "hash")]
    HashMethod,
    #[strum(serialize = "compare")]
    Compare,
    #[strum(serialize = "compare-equal?")]
    CompareEqualQ,
    #[strum(serialize = "cmp")]
    Cmp,
    #[strum(serialize = "to-bool")]
    ToBool,
    #[strum(serialize = "to-int")]
    ToInt,
    #[strum(serialize = "to-string")]
    ToString,
    #[strum(serialize = "get-member")]
    GetMember,
    #[strum(serialize = "set-member")]
    SetMember,
    #[strum(serialize = "get-property")]
    GetProperty,
    #[strum(serialize = "set-property")]
    SetProperty,
    #[strum(serialize = "has-property")]
    HasProperty,
    #[strum(serialize = "property-names")]
    PropertyNames,

    // ==========================
    // Parser nonterminal names (custom-syntax dispatch keys)
    #[strum(serialize = "STMT")]
    NtStmt,
    #[strum(serialize = "EXPR")]
    NtExpr,
    #[strum(serialize = "CMPEXPR")]
    NtCmpExpr,
    #[strum(serialize = "ADDEXPR")]
    NtAddExpr,
    #[strum(serialize = "MULEXPR")]
    NtMulExpr,
    #[strum(serialize = "BINARYEXPR")]
    NtBinaryExpr,
    #[strum(serialize = "COLONEXPR")]
    NtColonExpr,
    #[strum(serialize = "RANGEEXPR")]
    NtRangeExpr,
    #[strum(serialize = "PREFIXEXPR")]
    NtPrefixExpr,
    #[strum(serialize = "POSTFIXEXPR")]
    NtPostfixExpr,
    #[strum(serialize = "CONSEXPR")]
    NtConsExpr,
    #[strum(serialize = "DOTEXPR")]
    NtDotExpr,
    #[strum(serialize = "TERM")]
    NtTerm,

    // ==========================
    // Error kinds
    #[strum(serialize = "compile-error")]
    CompileError,
    #[strum(serialize = "configuration-error")]
    ConfigurationError,
    #[strum(serialize = "eval-error")]
    EvalError,
    #[strum(serialize = "exec-error")]
    ExecError,
    #[strum(serialize = "json-error")]
    JsonError,
    #[strum(serialize = "lexer-error")]
    LexerError,
    #[strum(serialize = "load-error")]
    LoadError,
    #[strum(serialize = "native-method-error")]
    NativeMethodError,
    #[strum(serialize = "object-security-error")]
    ObjectSecurityError,
    #[strum(serialize = "post-condition-assertion")]
    PostConditionAssertion,
    #[strum(serialize = "pre-condition-assertion")]
    PreConditionAssertion,
    #[strum(serialize = "property-error")]
    PropertyError,
    #[strum(serialize = "syntax-error")]
    SyntaxError,
    #[strum(serialize = "system-exception")]
    SystemException,
    #[strum(serialize = "type-assertion")]
    TypeAssertion,
    #[strum(serialize = "user-exception")]
    UserException,
}

impl KnownSymbol {
    /// The reserved symbol id for this known symbol, usable as a constant.
    #[must_use]
    pub const fn symbol(self) -> Symbol {
        Symbol(self as u32 + 1)
    }

    /// Maps a symbol id back to its known symbol, if it is in the reserved
    /// range.
    #[must_use]
    pub fn from_symbol(symbol: Symbol) -> Option<Self> {
        if symbol.0 == 0 {
            return None;
        }
        Self::from_repr((symbol.0 - 1) as u16)
    }

    /// Canonical spelling of this known symbol.
    #[must_use]
    pub fn spelling(self) -> &'static str {
        self.into()
    }
}

/// The process-wide symbol table for one interpreter context.
#[derive(Debug)]
pub struct SymbolTable {
    names: Vec<Box<str>>,
    ids: AHashMap<Box<str>, Symbol>,
    next_id: u32,
}

impl SymbolTable {
    /// Creates a table with the known symbols preloaded at their reserved
    /// ids.
    ///
    /// # Panics
    ///
    /// Panics if the known-symbol set has outgrown the reserved capacity —
    /// that is a build-breaking change, not a recoverable condition.
    #[must_use]
    pub fn with_known_symbols() -> Self {
        assert!(
            (KnownSymbol::COUNT as u32) <= RESERVED_SYMBOL_IDS,
            "known-symbol preload exceeds the reserved id space"
        );

        let mut table = Self {
            names: Vec::with_capacity(RESERVED_SYMBOL_IDS as usize),
            ids: AHashMap::with_capacity(RESERVED_SYMBOL_IDS as usize),
            next_id: 1,
        };
        for known in KnownSymbol::iter() {
            let id = table.intern(known.spelling());
            debug_assert_eq!(id, known.symbol(), "preload id drifted for {known:?}");
        }
        // Dynamic symbols begin after the reserve.
        table.next_id = RESERVED_SYMBOL_IDS + 1;
        table
    }

    /// Interns a name, returning its stable id. Repeated calls with the same
    /// name return the same id.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = Symbol(self.next_id);
        self.next_id += 1;
        self.names.push(name.into());
        self.ids.insert(name.into(), id);
        id
    }

    /// Looks up a name without interning it.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.ids.get(name).copied()
    }

    /// Returns the canonical name for a symbol id.
    ///
    /// Unknown or reserved-but-unassigned ids render as `<unknown-symbol>`,
    /// which keeps diagnostics printable even for ids from another context.
    #[must_use]
    pub fn name(&self, symbol: Symbol) -> &str {
        if symbol.0 == 0 {
            return "<no-symbol>";
        }
        if let Some(known) = KnownSymbol::from_symbol(symbol) {
            return known.spelling();
        }
        if symbol.0 <= RESERVED_SYMBOL_IDS {
            // Inside the reserve but past the preload: never assigned.
            return "<unknown-symbol>";
        }
        let dynamic_index = (symbol.0 - 1 - RESERVED_SYMBOL_IDS) as usize + count_known() as usize;
        self.names
            .get(dynamic_index)
            .map_or("<unknown-symbol>", |n| n.as_ref())
    }

    /// Number of symbols interned so far (known preload included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::with_known_symbols()
    }
}

fn count_known() -> u32 {
    KnownSymbol::COUNT as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = SymbolTable::with_known_symbols();
        let a = table.intern("gronk");
        let b = table.intern("gronk");
        let c = table.intern("gronk2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "gronk");
        assert_eq!(table.name(c), "gronk2");
    }

    #[test]
    fn known_symbols_have_reserved_ids() {
        let mut table = SymbolTable::with_known_symbols();
        assert_eq!(table.intern("if"), KnownSymbol::If.symbol());
        assert_eq!(table.intern("$if"), KnownSymbol::DollarIf.symbol());
        assert_eq!(table.intern("=="), KnownSymbol::Eq.symbol());
        assert_eq!(table.intern("native-method-error"), KnownSymbol::NativeMethodError.symbol());
        assert_eq!(table.name(KnownSymbol::DollarWhile.symbol()), "$while");
    }

    #[test]
    fn dynamic_symbols_start_after_the_reserve() {
        let mut table = SymbolTable::with_known_symbols();
        let sym = table.intern("user-defined");
        assert!(sym.0 > RESERVED_SYMBOL_IDS);
    }

    #[test]
    fn two_tables_assign_identical_known_ids() {
        let t1 = SymbolTable::with_known_symbols();
        let t2 = SymbolTable::with_known_symbols();
        for known in KnownSymbol::iter() {
            assert_eq!(t1.name(known.symbol()), t2.name(known.symbol()));
        }
    }
}
