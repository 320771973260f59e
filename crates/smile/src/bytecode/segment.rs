//! Bytecode segments and per-compilation-unit tables.
//!
//! A [`Segment`] is an ordered sequence of instructions. The
//! [`CompiledTables`] hold everything segments reference by index: interned
//! strings, constant objects, 128-bit numerics, user-function prototypes,
//! till-loop branch tables, closure shapes, and source-location records.
//! The disassembler lives here too, because it only needs a segment and
//! its tables.

use std::fmt::Write as _;

use crate::{
    closure::{ClosureInfo, ClosureInfoId},
    error::{LocId, SourceLocation},
    function::ArgCheck,
    string::Str,
    symbol::SymbolTable,
    value::Value,
};

use super::op::{Instr, Opcode, Payload};

/// Index of a segment in the compiled tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SegmentId(pub u32);

impl SegmentId {
    /// The synthetic segment the VM uses to drive state machines; it is
    /// not present in any compiled tables.
    pub const STATE_MACHINE: Self = Self(u32::MAX);
}

/// Index of a user-function prototype in the compiled tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserFnId(pub u32);

/// An ordered sequence of instructions.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub instrs: Vec<Instr>,
}

impl Segment {
    #[must_use]
    pub fn new(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

/// A user-function prototype: shape, code, and calling contract.
#[derive(Debug, Clone)]
pub struct UserFunctionInfo {
    pub closure_info: ClosureInfoId,
    pub segment: SegmentId,
    pub arg_check: ArgCheck,
    /// Display name for stack traces and errors (usually the variable the
    /// function was first bound to, or `<fn>`).
    pub name: String,
}

/// Branch-target metadata for one `till` construct.
#[derive(Debug, Clone, Default)]
pub struct TillInfo {
    /// Segment addresses, one per named till flag, in declaration order.
    pub branch_targets: Vec<u32>,
}

/// Everything one compilation unit's segments reference by index.
#[derive(Debug, Default)]
pub struct CompiledTables {
    pub strings: Vec<Str>,
    pub objects: Vec<Value>,
    pub int128s: Vec<i128>,
    pub user_functions: Vec<UserFunctionInfo>,
    pub till_infos: Vec<TillInfo>,
    /// Source locations, 1-based; slot 0 is the "unknown" record.
    pub source_locations: Vec<SourceLocation>,
    pub closure_infos: Vec<ClosureInfo>,
    pub segments: Vec<Segment>,
    /// The root shape holding global-variable slots, when the compiler
    /// emitted one.
    pub global_info: Option<ClosureInfoId>,
}

impl CompiledTables {
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Slot 0 is the reserved "unknown" source location.
            source_locations: vec![SourceLocation::default()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0 as usize]
    }

    #[must_use]
    pub fn user_function(&self, id: UserFnId) -> &UserFunctionInfo {
        &self.user_functions[id.0 as usize]
    }

    #[must_use]
    pub fn closure_info(&self, id: ClosureInfoId) -> &ClosureInfo {
        &self.closure_infos[id.0 as usize]
    }

    #[must_use]
    pub fn source_location(&self, loc: LocId) -> Option<&SourceLocation> {
        if loc.0 == 0 {
            return None;
        }
        self.source_locations.get(loc.0 as usize)
    }

    /// Renders a segment as assembly-style text, one instruction per line,
    /// with operands resolved against these tables and source locations as
    /// trailing comments.
    #[must_use]
    pub fn disassemble(&self, id: SegmentId, symbols: &SymbolTable) -> String {
        let mut out = String::new();
        let mut depth = 1usize;
        for (address, instr) in self.segment(id).instrs.iter().enumerate() {
            let _ = write!(out, "{address}: ");
            if instr.op == Opcode::EndBlock {
                depth = depth.saturating_sub(1);
            }
            if instr.op != Opcode::Label {
                for level in 0..depth {
                    if level == 0 {
                        out.push('\t');
                    } else {
                        out.push_str("   ");
                    }
                }
            }
            if instr.op == Opcode::Block {
                depth += 1;
            }
            self.write_instr(&mut out, instr, address, symbols);
            out.push('\n');
        }
        out
    }

    fn write_instr(&self, out: &mut String, instr: &Instr, address: usize, symbols: &SymbolTable) {
        match instr.op {
            Opcode::Label => {
                let _ = write!(out, "L{address}:");
                return;
            }
            Opcode::Block => {
                out.push('{');
                return;
            }
            Opcode::EndBlock => {
                out.push('}');
                return;
            }
            _ => {}
        }

        let name = instr.op.name();
        out.push_str(name);
        if let Some(operands) = self.operands_to_string(instr, address, symbols) {
            if name.len() < 7 {
                out.push_str(&" ".repeat(7 - name.len()));
            }
            out.push(' ');
            out.push_str(&operands);
        }
        if let Some(location) = self.source_location(instr.loc) {
            match (&location.filename, location.line) {
                (Some(filename), 0) => {
                    let _ = write!(out, "\t; {filename}");
                }
                (Some(filename), line) => {
                    let _ = write!(out, "\t; {filename}:{line}");
                }
                (None, 0) => {
                    let _ = write!(out, "\t; <unknown location>");
                }
                (None, line) => {
                    let _ = write!(out, "\t; line {line}");
                }
            }
        }
    }

    fn operands_to_string(&self, instr: &Instr, address: usize, symbols: &SymbolTable) -> Option<String> {
        let text = match instr.payload {
            Payload::None => return None,
            Payload::Bool(b) => format!("{b}"),
            Payload::Byte(b) => format!("{b}"),
            Payload::Int16(v) => format!("{v}"),
            Payload::Int32(v) => format!("{v}"),
            Payload::Int64(v) => format!("{v}"),
            Payload::Real32(v) => format!("{}", v.0),
            Payload::Real64(v) => format!("{}", v.0),
            Payload::Float32(v) => format!("{v}"),
            Payload::Float64(v) => format!("{v}"),
            Payload::Char(c) => format!("'{}'", char::from(c)),
            Payload::Uni(u) => format!("\\u{u:x}"),
            Payload::Symbol(s) => format!("`{} ({})", symbols.name(s), s.0),
            Payload::Index(i) => match instr.op {
                Opcode::LdStr => {
                    let content = self
                        .strings
                        .get(i as usize)
                        .map_or_else(|| "???".to_string(), |s| printable(s));
                    format!("\"{content}\" ({i})")
                }
                Opcode::LdObj | Opcode::Ld128 | Opcode::LdR128 | Opcode::LdF128 | Opcode::NewFn => {
                    format!("@{i}")
                }
                _ => format!("{i}"),
            },
            Payload::ScopeIndex { scope, index } => format!("{scope}, {index}"),
            Payload::ArgcSymbol { argc, symbol } => {
                format!("{argc}, `{} ({})", symbols.name(symbol), symbol.0)
            }
            Payload::Branch(offset) => {
                let target = address as i64 + i64::from(offset);
                if offset < 0 {
                    format!("L{target}")
                } else {
                    format!(">L{target}")
                }
            }
        };
        Some(text)
    }
}

fn printable(s: &Str) -> String {
    let text = s.add_c_slashes();
    let text = text.to_utf8_lossy();
    if text.len() > 50 {
        format!("{}...", &text[..47.min(text.len())])
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembly_renders_operands_and_labels() {
        let mut tables = CompiledTables::new();
        tables.strings.push(Str::from("hi"));
        let segment = Segment::new(vec![
            Instr::new(Opcode::LdStr, Payload::Index(0)),
            Instr::new(Opcode::Bt, Payload::Branch(2)),
            Instr::new(Opcode::LdNull, Payload::None),
            Instr::new(Opcode::Ret, Payload::None),
        ]);
        tables.segments.push(segment);
        let symbols = SymbolTable::with_known_symbols();
        let listing = tables.disassemble(SegmentId(0), &symbols);
        assert!(listing.contains("LdStr   \"hi\" (0)"));
        assert!(listing.contains("Bt      >L3"));
        assert!(listing.contains("Ret"));
    }
}
