//! Opcodes and instruction payloads.
//!
//! Opcode numbering is part of the compiled-artifact format and is laid out
//! in functional blocks of sixteen; gaps are unassigned encodings and the
//! `TCall*`/`TMet*`/`Try`/`EndTry` and optimized-method blocks are reserved
//! (executing one raises `eval-error`). Each instruction is an opcode, a
//! payload of the opcode's declared shape, and a source-location handle.

use serde::{Deserialize, Serialize};
use strum::{FromRepr, IntoStaticStr};

use crate::{
    error::LocId,
    symbol::Symbol,
    value::{Real32, Real64},
};

/// One-byte operation codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, FromRepr, Serialize, Deserialize)]
pub enum Opcode {
    // 00-0F: Stack management
    Nop = 0x00,
    Dup1 = 0x01,
    Dup2 = 0x02,
    Dup = 0x03,
    Pop1 = 0x05,
    Pop2 = 0x06,
    Pop = 0x07,
    Rep1 = 0x09,
    Rep2 = 0x0A,
    Rep = 0x0B,
    Brk = 0x0F,

    // 10-17: Object literal loads
    LdNull = 0x10,
    LdBool = 0x11,
    LdStr = 0x12,
    LdSym = 0x13,
    LdObj = 0x14,
    LdClos = 0x15,
    LdChar = 0x16,
    LdUni = 0x17,

    // 18-1F: Integer literal loads
    Ld8 = 0x18,
    Ld16 = 0x19,
    Ld32 = 0x1A,
    Ld64 = 0x1B,
    Ld128 = 0x1C,

    // 20-27: Real literal loads
    LdR16 = 0x21,
    LdR32 = 0x22,
    LdR64 = 0x23,
    LdR128 = 0x24,

    // 28-2F: Float literal loads
    LdF16 = 0x29,
    LdF32 = 0x2A,
    LdF64 = 0x2B,
    LdF128 = 0x2C,

    // 30-3F: General-purpose variable access
    LdLoc = 0x30,
    StLoc = 0x31,
    StpLoc = 0x32,
    LdArg = 0x34,
    StArg = 0x35,
    StpArg = 0x36,
    LdX = 0x38,
    StX = 0x39,
    StpX = 0x3A,
    NullLoc0 = 0x3C,
    NullArg0 = 0x3D,
    NullX = 0x3E,

    // 40-4F: Optimized loads with the scope fused into the opcode
    LdArg0 = 0x40,
    LdArg1 = 0x41,
    LdArg2 = 0x42,
    LdArg3 = 0x43,
    LdArg4 = 0x44,
    LdArg5 = 0x45,
    LdArg6 = 0x46,
    LdArg7 = 0x47,
    LdLoc0 = 0x48,
    LdLoc1 = 0x49,
    LdLoc2 = 0x4A,
    LdLoc3 = 0x4B,
    LdLoc4 = 0x4C,
    LdLoc5 = 0x4D,
    LdLoc6 = 0x4E,
    LdLoc7 = 0x4F,

    // 50-5F: Optimized stores
    StArg0 = 0x50,
    StArg1 = 0x51,
    StArg2 = 0x52,
    StArg3 = 0x53,
    StArg4 = 0x54,
    StArg5 = 0x55,
    StArg6 = 0x56,
    StArg7 = 0x57,
    StLoc0 = 0x58,
    StLoc1 = 0x59,
    StLoc2 = 0x5A,
    StLoc3 = 0x5B,
    StLoc4 = 0x5C,
    StLoc5 = 0x5D,
    StLoc6 = 0x5E,
    StLoc7 = 0x5F,

    // 60-6F: Optimized store-and-pops
    StpArg0 = 0x60,
    StpArg1 = 0x61,
    StpArg2 = 0x62,
    StpArg3 = 0x63,
    StpArg4 = 0x64,
    StpArg5 = 0x65,
    StpArg6 = 0x66,
    StpArg7 = 0x67,
    StpLoc0 = 0x68,
    StpLoc1 = 0x69,
    StpLoc2 = 0x6A,
    StpLoc3 = 0x6B,
    StpLoc4 = 0x6C,
    StpLoc5 = 0x6D,
    StpLoc6 = 0x6E,
    StpLoc7 = 0x6F,

    // 70-7F: Property and member access
    LdProp = 0x70,
    StProp = 0x71,
    StpProp = 0x72,
    LdMember = 0x74,
    StMember = 0x75,
    StpMember = 0x76,
    LdInclude = 0x7F,

    // 80-8F: Specialty type management
    Cons = 0x80,
    Car = 0x81,
    Cdr = 0x82,
    NewFn = 0x84,
    NewObj = 0x85,
    SuperEq = 0x86,
    SuperNe = 0x88,
    Not = 0x89,
    Is = 0x8B,
    TypeOf = 0x8C,

    // 90-9F: Fixed-arity calls and method calls
    Call0 = 0x90,
    Call1 = 0x91,
    Call2 = 0x92,
    Call3 = 0x93,
    Call4 = 0x94,
    Call5 = 0x95,
    Call6 = 0x96,
    Call7 = 0x97,
    Met0 = 0x98,
    Met1 = 0x99,
    Met2 = 0x9A,
    Met3 = 0x9B,
    Met4 = 0x9C,
    Met5 = 0x9D,
    Met6 = 0x9E,
    Met7 = 0x9F,

    // A0-AF: Reserved tail-call forms
    TCall0 = 0xA0,
    TCall1 = 0xA1,
    TCall2 = 0xA2,
    TCall3 = 0xA3,
    TCall4 = 0xA4,
    TCall5 = 0xA5,
    TCall6 = 0xA6,
    TCall7 = 0xA7,
    TMet0 = 0xA8,
    TMet1 = 0xA9,
    TMet2 = 0xAA,
    TMet3 = 0xAB,
    TMet4 = 0xAC,
    TMet5 = 0xAD,
    TMet6 = 0xAE,
    TMet7 = 0xAF,

    // B0-BF: Flow control
    Jmp = 0xB0,
    Bt = 0xB1,
    Bf = 0xB2,
    Met = 0xB4,
    TMet = 0xB5,
    Call = 0xB6,
    TCall = 0xB7,
    NewTill = 0xB8,
    EndTill = 0xB9,
    TillEsc = 0xBA,
    Try = 0xBB,
    EndTry = 0xBC,
    Ret = 0xBD,

    // C0-C7: Reserved optimized arithmetic method access
    Add = 0xC0,
    Sub = 0xC1,
    Mul = 0xC2,
    Div = 0xC3,
    Mod = 0xC4,
    Rem = 0xC5,
    RangeTo = 0xC7,

    // C8-CF: Reserved optimized comparison method access
    Eq = 0xC8,
    Ne = 0xC9,
    Lt = 0xCA,
    Gt = 0xCB,
    Le = 0xCC,
    Ge = 0xCD,
    Cmp = 0xCE,
    Compare = 0xCF,

    // D0-D7: Reserved optimized binary sequence method access
    Each = 0xD0,
    Map = 0xD1,
    Where = 0xD2,
    Count = 0xD4,
    Any = 0xD5,
    Join = 0xD6,

    // D8-DF: Reserved optimized unary sequence method access
    UCount = 0xD8,
    UAny = 0xD9,
    UJoin = 0xDA,
    Neg = 0xDB,
    Bool = 0xDC,
    Int = 0xDD,
    String = 0xDE,
    Hash = 0xDF,

    // E0-E7: Reserved optimized type-query method access
    NullQ = 0xE0,
    ListQ = 0xE1,
    FnQ = 0xE2,
    BoolQ = 0xE3,
    IntQ = 0xE4,
    StringQ = 0xE5,
    SymbolQ = 0xE6,

    // E8-EF: Special-purpose optimized property access
    LdA = 0xE8,
    LdD = 0xE9,
    LdStart = 0xEA,
    LdEnd = 0xEB,
    LdCount = 0xEC,
    LdLength = 0xED,

    // F0-FF: Miscellaneous internal constructs
    StateMachStart = 0xF0,
    StateMachBody = 0xF1,
    Pseudo = 0xF8,
    Label = 0xFD,
    Block = 0xFE,
    EndBlock = 0xFF,
}

impl Opcode {
    /// Name used by the disassembler.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// True for the pseudo-ops the disassembler uses for formatting; they
    /// are skipped at runtime.
    #[must_use]
    pub fn is_pseudo(self) -> bool {
        matches!(self, Self::Pseudo | Self::Label | Self::Block | Self::EndBlock)
    }
}

/// Instruction payloads, one shape per opcode family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    None,
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Real32(Real32),
    Real64(Real64),
    Float32(f32),
    Float64(f64),
    Char(u8),
    Uni(u32),
    Symbol(Symbol),
    /// Index into a constant pool, a fused-opcode slot index, or an
    /// argument count.
    Index(u32),
    /// A `(scope, index)` pair for the general variable-access forms, and
    /// the `(module, slot)` pair of `LdInclude`.
    ScopeIndex { scope: u32, index: u32 },
    /// Argument count plus method symbol, for the general `Met` form.
    ArgcSymbol { argc: u32, symbol: Symbol },
    /// Relative branch displacement.
    Branch(i32),
}

impl Payload {
    /// The index payload, or 0. Handy in the dispatch loop where the
    /// opcode guarantees the shape.
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::Index(i) => i,
            _ => 0,
        }
    }

    #[must_use]
    pub fn branch(self) -> i32 {
        match self {
            Self::Branch(b) => b,
            _ => 0,
        }
    }

    #[must_use]
    pub fn symbol(self) -> Symbol {
        match self {
            Self::Symbol(s) => s,
            _ => Symbol::NONE,
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub payload: Payload,
    /// Handle into the compiled source-location table; 0 is "unknown".
    pub loc: LocId,
}

impl Instr {
    #[must_use]
    pub fn new(op: Opcode, payload: Payload) -> Self {
        Self {
            op,
            payload,
            loc: LocId::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_numbers_follow_the_block_layout() {
        assert_eq!(Opcode::Nop as u8, 0x00);
        assert_eq!(Opcode::Brk as u8, 0x0F);
        assert_eq!(Opcode::LdNull as u8, 0x10);
        assert_eq!(Opcode::LdArg0 as u8, 0x40);
        assert_eq!(Opcode::LdLoc7 as u8, 0x4F);
        assert_eq!(Opcode::Call0 as u8, 0x90);
        assert_eq!(Opcode::Met7 as u8, 0x9F);
        assert_eq!(Opcode::Ret as u8, 0xBD);
        assert_eq!(Opcode::StateMachStart as u8, 0xF0);
        assert_eq!(Opcode::EndBlock as u8, 0xFF);
    }

    #[test]
    fn fused_opcodes_encode_their_scope_in_the_low_bits() {
        assert_eq!(Opcode::LdArg3 as u8 & 7, 3);
        assert_eq!(Opcode::LdLoc5 as u8 & 7, 5);
        assert_eq!(Opcode::StpLoc7 as u8 & 7, 7);
    }

    #[test]
    fn unassigned_encodings_do_not_decode() {
        assert_eq!(Opcode::from_repr(0x04), None);
        assert_eq!(Opcode::from_repr(0x1D), None);
        assert_eq!(Opcode::from_repr(0xF9), None);
        assert_eq!(Opcode::from_repr(0x0F), Some(Opcode::Brk));
    }
}
