//! Bytecode representation: opcodes, segments, compiled tables, and the
//! builders that assemble them.
//!
//! The bytecode *compiler* (AST → segments) is a separate component; this
//! module defines the format it produces and the [`builder`] API hosts and
//! tests use to construct that format directly.

pub use self::builder::{Label, SegmentBuilder, TablesBuilder};
pub use self::op::{Instr, Opcode, Payload};
pub use self::segment::{CompiledTables, Segment, SegmentId, TillInfo, UserFnId, UserFunctionInfo};

mod builder;
mod op;
mod segment;
