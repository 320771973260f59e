//! Builders for segments and compiled tables.
//!
//! The bytecode compiler proper is a separate component; these builders
//! define its output format and give hosts and tests a way to assemble
//! segments by hand. `SegmentBuilder` supports forward branches through
//! labels: emit a branch against a label, bind the label later, and the
//! displacement is patched when the segment is finished.

use ahash::AHashMap;

use crate::{
    closure::{ClosureInfo, ClosureInfoId},
    error::{LocId, SourceLocation},
    function::ArgCheck,
    string::Str,
    value::Value,
};

use super::{
    op::{Instr, Opcode, Payload},
    segment::{CompiledTables, Segment, SegmentId, TillInfo, UserFnId, UserFunctionInfo},
};

/// A branch target that may be bound after the branch is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Assembles one segment.
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    instrs: Vec<Instr>,
    labels: Vec<Option<usize>>,
    patches: Vec<(usize, Label)>,
    current_loc: LocId,
}

impl SegmentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source location attached to subsequently emitted
    /// instructions.
    pub fn at(&mut self, loc: LocId) -> &mut Self {
        self.current_loc = loc;
        self
    }

    /// Emits one instruction, returning its address.
    pub fn emit(&mut self, op: Opcode, payload: Payload) -> usize {
        let address = self.instrs.len();
        self.instrs.push(Instr {
            op,
            payload,
            loc: self.current_loc,
        });
        address
    }

    /// Emits a payload-less instruction.
    pub fn op(&mut self, op: Opcode) -> usize {
        self.emit(op, Payload::None)
    }

    /// Creates an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds a label to the next instruction address.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instrs.len());
    }

    /// The current address of a bound label.
    #[must_use]
    pub fn address_of(&self, label: Label) -> Option<usize> {
        self.labels[label.0]
    }

    /// Emits a branch instruction against a label; the displacement is
    /// patched at [`Self::finish`] time.
    pub fn branch(&mut self, op: Opcode, label: Label) -> usize {
        let address = self.emit(op, Payload::Branch(0));
        self.patches.push((address, label));
        address
    }

    /// Current instruction count (the address the next emit gets).
    #[must_use]
    pub fn here(&self) -> usize {
        self.instrs.len()
    }

    /// Finishes the segment, patching every label branch. Appends a `Ret`
    /// when `with_ret` is set and the last instruction is not one.
    pub fn finish(mut self, with_ret: bool) -> Segment {
        if with_ret && self.instrs.last().is_none_or(|i| i.op != Opcode::Ret) {
            self.op(Opcode::Ret);
        }
        for (address, label) in &self.patches {
            let target = self.labels[label.0].expect("branch against an unbound label");
            let displacement =
                i32::try_from(target as i64 - *address as i64).expect("branch displacement exceeds i32");
            self.instrs[*address].payload = Payload::Branch(displacement);
        }
        Segment::new(self.instrs)
    }
}

/// Assembles a compilation unit's tables.
#[derive(Debug)]
pub struct TablesBuilder {
    tables: CompiledTables,
    string_ids: AHashMap<Vec<u8>, u32>,
}

impl TablesBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: CompiledTables::new(),
            string_ids: AHashMap::new(),
        }
    }

    /// Interns a string constant, deduplicating byte-identical entries.
    pub fn add_string(&mut self, s: impl Into<Str>) -> u32 {
        let s = s.into();
        if let Some(&id) = self.string_ids.get(s.as_bytes()) {
            return id;
        }
        let id = u32::try_from(self.tables.strings.len()).expect("string pool exceeded u32 ids");
        self.string_ids.insert(s.as_bytes().to_vec(), id);
        self.tables.strings.push(s);
        id
    }

    /// Adds a constant object (symbols, numbers, quoted forms).
    pub fn add_object(&mut self, value: Value) -> u32 {
        let id = u32::try_from(self.tables.objects.len()).expect("object pool exceeded u32 ids");
        self.tables.objects.push(value);
        id
    }

    /// Adds a 128-bit numeric constant.
    pub fn add_int128(&mut self, value: i128) -> u32 {
        let id = u32::try_from(self.tables.int128s.len()).expect("numeric pool exceeded u32 ids");
        self.tables.int128s.push(value);
        id
    }

    /// Adds a source-location record, returning its 1-based handle.
    pub fn add_source_location(&mut self, location: SourceLocation) -> LocId {
        let id = u32::try_from(self.tables.source_locations.len()).expect("location table exceeded u32 ids");
        self.tables.source_locations.push(location);
        LocId(id)
    }

    /// Adds a closure shape.
    pub fn add_closure_info(&mut self, info: ClosureInfo) -> ClosureInfoId {
        let id = u32::try_from(self.tables.closure_infos.len()).expect("closure-info table exceeded u32 ids");
        self.tables.closure_infos.push(info);
        ClosureInfoId(id)
    }

    /// Marks a closure shape as the root (global) shape.
    pub fn set_global_info(&mut self, info: ClosureInfoId) {
        self.tables.global_info = Some(info);
    }

    /// Adds a finished segment.
    pub fn add_segment(&mut self, segment: Segment) -> SegmentId {
        let id = u32::try_from(self.tables.segments.len()).expect("segment table exceeded u32 ids");
        self.tables.segments.push(segment);
        SegmentId(id)
    }

    /// Adds the branch-target table for one `till` construct.
    pub fn add_till_info(&mut self, branch_targets: Vec<u32>) -> u32 {
        let id = u32::try_from(self.tables.till_infos.len()).expect("till table exceeded u32 ids");
        self.tables.till_infos.push(TillInfo { branch_targets });
        id
    }

    /// Registers a user-function prototype.
    pub fn define_function(
        &mut self,
        name: impl Into<String>,
        closure_info: ClosureInfoId,
        segment: SegmentId,
        arg_check: ArgCheck,
    ) -> UserFnId {
        let id = u32::try_from(self.tables.user_functions.len()).expect("function table exceeded u32 ids");
        self.tables.user_functions.push(UserFunctionInfo {
            closure_info,
            segment,
            arg_check,
            name: name.into(),
        });
        UserFnId(id)
    }

    /// Finishes the tables.
    #[must_use]
    pub fn finish(self) -> CompiledTables {
        self.tables
    }
}

impl Default for TablesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branches_are_patched() {
        let mut b = SegmentBuilder::new();
        let skip = b.new_label();
        b.emit(Opcode::LdBool, Payload::Bool(true));
        b.branch(Opcode::Bf, skip);
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.bind(skip);
        b.op(Opcode::Ret);
        let segment = b.finish(false);
        assert_eq!(segment.instrs[1].payload, Payload::Branch(2)); // 1 -> 3
    }

    #[test]
    fn finish_appends_ret_when_missing() {
        let mut b = SegmentBuilder::new();
        b.emit(Opcode::Ld64, Payload::Int64(1));
        let segment = b.finish(true);
        assert_eq!(segment.instrs.last().map(|i| i.op), Some(Opcode::Ret));
    }

    #[test]
    fn strings_are_deduplicated() {
        let mut tables = TablesBuilder::new();
        let a = tables.add_string("hello");
        let b = tables.add_string("hello");
        let c = tables.add_string("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
