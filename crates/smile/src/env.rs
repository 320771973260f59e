//! The interpreter context.
//!
//! Everything process-wide — the symbol table with its known-symbol
//! preload, the object heap, and the regex cache — lives behind an
//! [`Env`] so multiple interpreters can coexist,
//! each with its own tables. The parser and the VM both borrow the same
//! `Env`, which is what makes parsed cons cells and runtime values share
//! one heap.

use crate::{heap::Heap, regex::RegexCache, symbol::SymbolTable};

/// Resource bounds for one interpreter context.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    /// Maximum number of live frames before a call raises `eval-error`.
    pub max_frames: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self { max_frames: 1 << 20 }
    }
}

/// One interpreter context: symbols, heap, regex cache, limits.
#[derive(Debug)]
pub struct Env {
    pub symbols: SymbolTable,
    pub heap: Heap,
    pub regex_cache: RegexCache,
    pub limits: EvalLimits,
}

impl Env {
    /// Creates a context with the known symbols preloaded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::with_known_symbols(),
            heap: Heap::new(),
            regex_cache: RegexCache::new(),
            limits: EvalLimits::default(),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
