//! The bytecode virtual machine.
//!
//! A stack-based machine over [`Closure`] frames. The dispatch loop keeps
//! three hot registers — current segment, current instruction pointer, and
//! current frame — and runs until the root frame returns, a `Brk` yields
//! control to the host, or an error unwinds.
//!
//! Errors travel as `Err(RunError)` through every handler and are caught at
//! a single point in [`Vm::run_result`], where native errors are reified
//! into Smile error objects with a synthesized stack trace. That single
//! catch point is the escape continuation; `Vm::call_protected` installs a
//! nested one by running a whole nested evaluation.

pub mod native;

use smallvec::SmallVec;

use crate::{
    bytecode::{CompiledTables, Instr, Opcode, Payload, Segment, SegmentId, UserFnId},
    closure::{Closure, ClosureId, Frames, ReturnLink, TillContinuation},
    env::Env,
    error::{ErrorKind, EvalResult, LocId, RunError, RunResult},
    function::Function,
    heap::HeapData,
    list,
    listops::{MachineCx, StateMachine, Step},
    object::{self, UserObject},
    string::Str,
    symbol::{KnownSymbol, Symbol},
    tracer::{EvalTracer, NoopTracer},
    value::Value,
};

use self::native::{NativeOutcome, builtin_method, call_native};

/// How one `run_core` pass ended.
enum CoreExit {
    /// The root frame returned; the result value is carried here.
    Done(Value),
    /// A `Brk` instruction yielded control to the host.
    Break,
}

/// The virtual machine for one compiled unit.
pub struct Vm<'a, Tr: EvalTracer = NoopTracer> {
    env: &'a mut Env,
    tables: &'a CompiledTables,
    frames: Frames,
    tracer: Tr,
    /// The synthetic two-instruction segment that drives state machines.
    machine_segment: Segment,
    /// Lazily allocated heap ids for string-pool and 128-bit constants.
    string_cache: ahash::AHashMap<u32, Value>,
    int128_cache: ahash::AHashMap<u32, Value>,

    // The three hot registers, persisted so `Brk` can resume.
    segment: SegmentId,
    pc: usize,
    closure: ClosureId,
    root: ClosureId,
    /// Source location of the most recent instruction (for stack traces).
    last_loc: LocId,
}

impl<'a> Vm<'a, NoopTracer> {
    /// Creates a VM with tracing disabled.
    pub fn new(env: &'a mut Env, tables: &'a CompiledTables) -> Self {
        Self::with_tracer(env, tables, NoopTracer)
    }
}

impl<'a, Tr: EvalTracer> Vm<'a, Tr> {
    pub fn with_tracer(env: &'a mut Env, tables: &'a CompiledTables, tracer: Tr) -> Self {
        let mut frames = Frames::new();
        let root = frames.alloc(Closure::global(tables.global_info));
        Self {
            env,
            tables,
            frames,
            tracer,
            machine_segment: Segment::new(vec![
                Instr::new(Opcode::StateMachStart, Payload::None),
                Instr::new(Opcode::StateMachBody, Payload::None),
            ]),
            string_cache: ahash::AHashMap::new(),
            int128_cache: ahash::AHashMap::new(),
            segment: SegmentId(0),
            pc: 0,
            closure: root,
            root,
            last_loc: LocId::UNKNOWN,
        }
    }

    /// The interpreter context this VM runs in.
    pub fn env(&mut self) -> &mut Env {
        self.env
    }

    /// Reads a global variable (unboxed), if set.
    #[must_use]
    pub fn global(&self, name: Symbol) -> Option<Value> {
        let root = self.frames.get(self.root);
        let value = *root.globals.as_ref()?.get(&name)?;
        Some(self.env.heap.unbox_value(value))
    }

    /// Sets a global variable (boxing the value).
    pub fn set_global(&mut self, name: Symbol, value: Value) {
        let boxed = self.env.heap.box_value(value);
        if let Some(globals) = self.frames.get_mut(self.root).globals.as_mut() {
            globals.insert(name, boxed);
        }
    }

    /// Runs a user function from the compiled tables as the program entry
    /// point.
    pub fn run_function(&mut self, entry: UserFnId) -> EvalResult {
        let prototype = self.tables.user_function(entry);
        let info = self.tables.closure_info(prototype.closure_info);
        let frame = Closure::from_info(prototype.closure_info, info, &[], Some(self.root));
        self.closure = self.frames.alloc(frame);
        self.segment = prototype.segment;
        self.pc = 0;
        self.run_result()
    }

    /// Resumes execution after a `Brk`.
    pub fn resume(&mut self) -> EvalResult {
        self.run_result()
    }

    fn run_result(&mut self) -> EvalResult {
        match self.run_core() {
            Ok(CoreExit::Done(value)) => EvalResult::Value(value),
            Ok(CoreExit::Break) => EvalResult::Break,
            Err(error) => EvalResult::Exception(self.reify_exception(error)),
        }
    }

    /// Calls a Smile function value from the host (or from a native that
    /// needs a nested evaluation), running it to completion.
    pub fn call_value(&mut self, function: Value, args: &[Value]) -> RunResult<Value> {
        let saved = (self.segment, self.pc, self.closure);
        let result = self.call_value_inner(function, args);
        (self.segment, self.pc, self.closure) = saved;
        result
    }

    fn call_value_inner(&mut self, function: Value, args: &[Value]) -> RunResult<Value> {
        let Some(callee) = self.env.heap.as_function(function).cloned() else {
            return Err(RunError::native("Value is not a function and cannot be called."));
        };
        match callee {
            Function::Native(method) => {
                let mut all_args: SmallVec<[Value; 8]> = SmallVec::new();
                all_args.extend_from_slice(args);
                match call_native(self.env, self.tables, method, &all_args)? {
                    NativeOutcome::Push(value) => Ok(value),
                    NativeOutcome::BeginMachine(machine) => self.run_machine_to_completion(machine),
                }
            }
            Function::User(user) => {
                let prototype = self.tables.user_function(user.fn_id);
                prototype
                    .arg_check
                    .check(&prototype.name, args.len(), |i| args[i].kind(&self.env.heap))?;
                let info = self.tables.closure_info(prototype.closure_info);
                let frame = Closure::from_info(prototype.closure_info, info, args, Some(user.captured));
                // No return link: this frame's Ret ends the nested run.
                self.closure = self.frames.alloc(frame);
                self.segment = prototype.segment;
                self.pc = 0;
                match self.run_core()? {
                    CoreExit::Done(value) => Ok(value),
                    CoreExit::Break => Err(RunError::eval("Hit a breakpoint inside a nested evaluation.")),
                }
            }
        }
    }

    /// Runs a state machine to completion on a detached frame (used for
    /// nested, host-initiated invocations).
    fn run_machine_to_completion(&mut self, machine: Box<dyn StateMachine>) -> RunResult<Value> {
        let frame_id = self.frames.alloc(Closure::state_machine(machine, Some(self.root), None));
        self.closure = frame_id;
        self.segment = SegmentId::STATE_MACHINE;
        self.pc = 0;
        match self.run_core()? {
            CoreExit::Done(value) => Ok(value),
            CoreExit::Break => Err(RunError::eval("Hit a breakpoint inside a nested evaluation.")),
        }
    }

    /// Protected evaluation: runs `body` (a zero-argument function value);
    /// when it throws, the handler is called with the reified error object
    /// and its result becomes the overall result.
    pub fn call_protected(&mut self, body: Value, handler: Value) -> RunResult<Value> {
        match self.call_value(body, &[]) {
            Ok(value) => Ok(value),
            Err(error) => {
                let exception = self.reify_exception(error);
                self.call_value(handler, &[exception])
            }
        }
    }

    // ------------------------------------------------------------------
    // Error reification.

    /// Turns an in-flight error into a Smile error object with `kind`,
    /// `message`, and `stack-trace` properties. Already-thrown values pass
    /// through with their existing trace.
    fn reify_exception(&mut self, error: RunError) -> Value {
        self.tracer.on_throw();
        match error {
            RunError::Thrown(value) => value,
            RunError::Raise { kind, message } => {
                let trace = self.make_stack_trace();
                let mut object = UserObject::new();
                let kind_symbol = self
                    .env
                    .symbols
                    .intern(<&'static str>::from(kind));
                let kind_value = self.env.heap.box_value(Value::Symbol(kind_symbol));
                object.set(KnownSymbol::Kind.symbol(), kind_value);
                let message_value = self.env.heap.alloc_str(Str::from(message));
                object.set(KnownSymbol::Message.symbol(), message_value);
                object.set(KnownSymbol::StackTrace.symbol(), trace);
                self.env.heap.alloc_object(object)
            }
        }
    }

    /// Builds the stack-trace list: one frame record per active frame,
    /// innermost first, each with filename/line/column/offset properties.
    fn make_stack_trace(&mut self) -> Value {
        let mut builder = list::ListBuilder::new();
        let mut loc = self.last_loc;
        let mut offset = self.pc;
        let mut closure = self.closure;
        loop {
            let record = self.make_stack_frame(loc, offset);
            builder.push(&mut self.env.heap, record);
            let Some(link) = self.frames.get(closure).ret else {
                break;
            };
            closure = link.closure;
            offset = link.pc.saturating_sub(1);
            loc = self.loc_at(link.segment, offset);
        }
        builder.head
    }

    fn make_stack_frame(&mut self, loc: LocId, offset: usize) -> Value {
        let mut record = UserObject::new();
        if let Some(location) = self.tables.source_location(loc) {
            if let Some(filename) = &location.filename {
                let filename_value = self.env.heap.alloc_str(Str::from(filename.as_str()));
                record.set(KnownSymbol::Filename.symbol(), filename_value);
            }
            let line = self.env.heap.box_value(Value::Int64(i64::from(location.line)));
            record.set(KnownSymbol::Line.symbol(), line);
            let column = self.env.heap.box_value(Value::Int64(i64::from(location.column)));
            record.set(KnownSymbol::Column.symbol(), column);
        }
        let offset_value = self.env.heap.box_value(Value::Int64(offset as i64));
        record.set(KnownSymbol::Offset.symbol(), offset_value);
        self.env.heap.alloc_object(record)
    }

    fn loc_at(&self, segment: SegmentId, pc: usize) -> LocId {
        let seg = if segment == SegmentId::STATE_MACHINE {
            &self.machine_segment
        } else {
            self.tables.segment(segment)
        };
        seg.instrs.get(pc).map_or(LocId::UNKNOWN, |i| i.loc)
    }

    // ------------------------------------------------------------------
    // The dispatch loop.

    fn fetch(&self) -> RunResult<Instr> {
        let seg = if self.segment == SegmentId::STATE_MACHINE {
            &self.machine_segment
        } else {
            self.tables.segment(self.segment)
        };
        seg.instrs
            .get(self.pc)
            .copied()
            .ok_or_else(|| RunError::eval("Eval bug: execution ran off the end of a segment."))
    }

    fn frame(&mut self) -> &mut Closure {
        self.frames.get_mut(self.closure)
    }

    #[expect(clippy::too_many_lines, reason = "the dispatch loop is one match by design")]
    fn run_core(&mut self) -> RunResult<CoreExit> {
        loop {
            let instr = self.fetch()?;
            self.last_loc = instr.loc;
            self.tracer
                .on_instruction(self.pc, instr.op, self.frames.get(self.closure).stack_depth());

            match instr.op {
                // ----------------------------------------------------------
                // 00-0F: Stack management
                Opcode::Nop => self.pc += 1,
                Opcode::Dup1 => {
                    let frame = self.frame();
                    let top = frame.peek(0);
                    frame.push(top);
                    self.pc += 1;
                }
                Opcode::Dup2 => {
                    let frame = self.frame();
                    let second = frame.peek(1);
                    frame.push(second);
                    self.pc += 1;
                }
                Opcode::Dup => {
                    let depth = instr.payload.index() as usize;
                    let frame = self.frame();
                    let value = frame.peek(depth.saturating_sub(1));
                    frame.push(value);
                    self.pc += 1;
                }
                Opcode::Pop1 => {
                    self.frame().pop_count(1);
                    self.pc += 1;
                }
                Opcode::Pop2 => {
                    self.frame().pop_count(2);
                    self.pc += 1;
                }
                Opcode::Pop => {
                    let count = instr.payload.index() as usize;
                    self.frame().pop_count(count);
                    self.pc += 1;
                }
                Opcode::Rep1 => {
                    self.replace_below(1);
                    self.pc += 1;
                }
                Opcode::Rep2 => {
                    self.replace_below(2);
                    self.pc += 1;
                }
                Opcode::Rep => {
                    let count = instr.payload.index() as usize;
                    self.replace_below(count);
                    self.pc += 1;
                }
                Opcode::Brk => {
                    // Resume lands on the instruction after the breakpoint.
                    self.pc += 1;
                    return Ok(CoreExit::Break);
                }

                // ----------------------------------------------------------
                // 10-2F: Literal loads
                Opcode::LdNull => {
                    self.frame().push(Value::Null);
                    self.pc += 1;
                }
                Opcode::LdBool => {
                    let value = match instr.payload {
                        Payload::Bool(b) => Value::Bool(b),
                        _ => Value::Bool(false),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdStr => {
                    let index = instr.payload.index();
                    let value = self.string_constant(index)?;
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdSym => {
                    let symbol = instr.payload.symbol();
                    self.frame().push(Value::Symbol(symbol));
                    self.pc += 1;
                }
                Opcode::LdObj => {
                    let index = instr.payload.index() as usize;
                    let value = self
                        .tables
                        .objects
                        .get(index)
                        .copied()
                        .ok_or_else(|| RunError::eval("Compiler bug: object constant index out of range."))?;
                    let unboxed = self.env.heap.unbox_value(value);
                    self.frame().push(unboxed);
                    self.pc += 1;
                }
                Opcode::LdChar => {
                    let value = match instr.payload {
                        Payload::Char(c) => Value::Char(c),
                        _ => Value::Char(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdUni => {
                    let value = match instr.payload {
                        Payload::Uni(u) => Value::Uni(u),
                        _ => Value::Uni(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Ld8 => {
                    let value = match instr.payload {
                        Payload::Byte(b) => Value::Byte(b),
                        _ => Value::Byte(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Ld16 => {
                    let value = match instr.payload {
                        Payload::Int16(v) => Value::Int16(v),
                        _ => Value::Int16(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Ld32 => {
                    let value = match instr.payload {
                        Payload::Int32(v) => Value::Int32(v),
                        _ => Value::Int32(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Ld64 => {
                    let value = match instr.payload {
                        Payload::Int64(v) => Value::Int64(v),
                        _ => Value::Int64(0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Ld128 => {
                    let index = instr.payload.index();
                    let value = self.int128_constant(index)?;
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdR32 => {
                    let value = match instr.payload {
                        Payload::Real32(v) => Value::Real32(v),
                        _ => Value::Real32(crate::value::Real32(0.0)),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdR64 => {
                    let value = match instr.payload {
                        Payload::Real64(v) => Value::Real64(v),
                        _ => Value::Real64(crate::value::Real64(0.0)),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdF32 => {
                    let value = match instr.payload {
                        Payload::Float32(v) => Value::Float32(v),
                        _ => Value::Float32(0.0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdF64 => {
                    let value = match instr.payload {
                        Payload::Float64(v) => Value::Float64(v),
                        _ => Value::Float64(0.0),
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }

                // ----------------------------------------------------------
                // 30-3F: General variable access
                Opcode::LdLoc | Opcode::StLoc | Opcode::StpLoc | Opcode::LdArg | Opcode::StArg | Opcode::StpArg => {
                    let Payload::ScopeIndex { scope, index } = instr.payload else {
                        return Err(RunError::eval("Compiler bug: variable access without a scope/index pair."));
                    };
                    self.variable_access(instr.op, scope, index as usize)?;
                    self.pc += 1;
                }
                Opcode::LdX => {
                    let symbol = instr.payload.symbol();
                    let value = self.global_ref(symbol)?;
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::StX => {
                    let symbol = instr.payload.symbol();
                    let top = self.frame().peek(0);
                    self.store_global(symbol, top);
                    self.pc += 1;
                }
                Opcode::StpX => {
                    let symbol = instr.payload.symbol();
                    let top = self.frame().pop();
                    self.store_global(symbol, top);
                    self.pc += 1;
                }
                Opcode::NullLoc0 => {
                    let index = instr.payload.index() as usize;
                    self.frame().set_local(index, Value::Null);
                    self.pc += 1;
                }
                Opcode::NullArg0 => {
                    let index = instr.payload.index() as usize;
                    self.frame().set_arg(index, Value::Null);
                    self.pc += 1;
                }
                Opcode::NullX => {
                    let symbol = instr.payload.symbol();
                    self.store_global(symbol, Value::Null);
                    self.pc += 1;
                }

                // ----------------------------------------------------------
                // 40-6F: Fused variable access (scope in the low bits)
                Opcode::LdArg0
                | Opcode::LdArg1
                | Opcode::LdArg2
                | Opcode::LdArg3
                | Opcode::LdArg4
                | Opcode::LdArg5
                | Opcode::LdArg6
                | Opcode::LdArg7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::LdArg, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }
                Opcode::LdLoc0
                | Opcode::LdLoc1
                | Opcode::LdLoc2
                | Opcode::LdLoc3
                | Opcode::LdLoc4
                | Opcode::LdLoc5
                | Opcode::LdLoc6
                | Opcode::LdLoc7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::LdLoc, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }
                Opcode::StArg0
                | Opcode::StArg1
                | Opcode::StArg2
                | Opcode::StArg3
                | Opcode::StArg4
                | Opcode::StArg5
                | Opcode::StArg6
                | Opcode::StArg7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::StArg, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }
                Opcode::StLoc0
                | Opcode::StLoc1
                | Opcode::StLoc2
                | Opcode::StLoc3
                | Opcode::StLoc4
                | Opcode::StLoc5
                | Opcode::StLoc6
                | Opcode::StLoc7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::StLoc, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }
                Opcode::StpArg0
                | Opcode::StpArg1
                | Opcode::StpArg2
                | Opcode::StpArg3
                | Opcode::StpArg4
                | Opcode::StpArg5
                | Opcode::StpArg6
                | Opcode::StpArg7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::StpArg, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }
                Opcode::StpLoc0
                | Opcode::StpLoc1
                | Opcode::StpLoc2
                | Opcode::StpLoc3
                | Opcode::StpLoc4
                | Opcode::StpLoc5
                | Opcode::StpLoc6
                | Opcode::StpLoc7 => {
                    let scope = u32::from(instr.op as u8 & 7);
                    self.variable_access(Opcode::StpLoc, scope, instr.payload.index() as usize)?;
                    self.pc += 1;
                }

                // ----------------------------------------------------------
                // 70-7F: Property and member access
                Opcode::LdProp => {
                    let symbol = instr.payload.symbol();
                    let target = self.frame().peek(0);
                    let value = self.get_property_value(target, symbol);
                    let unboxed = self.env.heap.unbox_value(value);
                    self.frame().set_top(unboxed);
                    self.pc += 1;
                }
                Opcode::StProp => {
                    let symbol = instr.payload.symbol();
                    let target = self.frame().peek(1);
                    let value = self.frame().peek(0);
                    self.set_property_value(target, symbol, value)?;
                    let frame = self.frame();
                    frame.pop_count(1);
                    frame.set_top(value);
                    self.pc += 1;
                }
                Opcode::StpProp => {
                    let symbol = instr.payload.symbol();
                    let target = self.frame().peek(1);
                    let value = self.frame().peek(0);
                    self.set_property_value(target, symbol, value)?;
                    self.frame().pop_count(2);
                    self.pc += 1;
                }
                Opcode::LdMember => {
                    let key = self.frame().pop();
                    let target = self.frame().pop();
                    let value = self.member_get(target, key)?;
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::StMember => {
                    let value = self.frame().pop();
                    let key = self.frame().pop();
                    let target = self.frame().pop();
                    self.member_set(target, key, value)?;
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::StpMember => {
                    let value = self.frame().pop();
                    let key = self.frame().pop();
                    let target = self.frame().pop();
                    self.member_set(target, key, value)?;
                    self.pc += 1;
                }
                Opcode::LdInclude => {
                    return Err(RunError::eval("Eval: module loading is not available in this build."));
                }

                // ----------------------------------------------------------
                // 80-8F: Specialty type management
                Opcode::Cons => {
                    let frame = self.frame();
                    let d = frame.pop();
                    let a = frame.pop();
                    let cell = list::cons(&mut self.env.heap, a, d);
                    self.frame().push(cell);
                    self.pc += 1;
                }
                Opcode::Car => {
                    let target = self.frame().pop();
                    let value = list::car(&self.env.heap, target);
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::Cdr => {
                    let target = self.frame().pop();
                    let value = list::cdr(&self.env.heap, target);
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::NewFn => {
                    let fn_id = UserFnId(instr.payload.index());
                    if fn_id.0 as usize >= self.tables.user_functions.len() {
                        return Err(RunError::eval("Compiler bug: function prototype index out of range."));
                    }
                    let function = Function::User(crate::function::UserFunction {
                        fn_id,
                        captured: self.closure,
                    });
                    let value = self.env.heap.alloc_function(function);
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::NewObj => {
                    let pair_count = instr.payload.index() as usize;
                    self.new_object(pair_count)?;
                    self.pc += 1;
                }
                Opcode::SuperEq => {
                    let frame = self.frame();
                    let b = frame.pop();
                    let a = frame.pop();
                    let equal = a.compare_equal(b, &self.env.heap);
                    self.frame().push(Value::Bool(equal));
                    self.pc += 1;
                }
                Opcode::SuperNe => {
                    let frame = self.frame();
                    let b = frame.pop();
                    let a = frame.pop();
                    let equal = a.compare_equal(b, &self.env.heap);
                    self.frame().push(Value::Bool(!equal));
                    self.pc += 1;
                }
                Opcode::Not => {
                    let value = self.frame().pop();
                    let truth = match value {
                        Value::Bool(b) => b,
                        other => other.to_bool(&self.env.heap),
                    };
                    self.frame().push(Value::Bool(!truth));
                    self.pc += 1;
                }
                Opcode::Is => {
                    let frame = self.frame();
                    let ancestor = frame.pop();
                    let descendant = frame.pop();
                    let result = descendant.is_a(ancestor, &self.env.heap);
                    self.frame().push(Value::Bool(result));
                    self.pc += 1;
                }
                Opcode::TypeOf => {
                    let target = self.frame().peek(0);
                    let symbol = target.kind(&self.env.heap).type_symbol();
                    self.frame().set_top(Value::Symbol(symbol));
                    self.pc += 1;
                }

                // ----------------------------------------------------------
                // 90-9F / B0-BF: Calls, method calls, flow control
                Opcode::Call0
                | Opcode::Call1
                | Opcode::Call2
                | Opcode::Call3
                | Opcode::Call4
                | Opcode::Call5
                | Opcode::Call6
                | Opcode::Call7 => {
                    let argc = usize::from(instr.op as u8 & 7);
                    self.pc += 1;
                    self.call_from_stack(argc)?;
                }
                Opcode::Call => {
                    let argc = instr.payload.index() as usize;
                    self.pc += 1;
                    self.call_from_stack(argc)?;
                }
                Opcode::Met0
                | Opcode::Met1
                | Opcode::Met2
                | Opcode::Met3
                | Opcode::Met4
                | Opcode::Met5
                | Opcode::Met6
                | Opcode::Met7 => {
                    let argc = usize::from(instr.op as u8 & 7) + 1;
                    let symbol = instr.payload.symbol();
                    self.pc += 1;
                    self.method_call(argc, symbol)?;
                }
                Opcode::Met => {
                    let Payload::ArgcSymbol { argc, symbol } = instr.payload else {
                        return Err(RunError::eval("Compiler bug: Met without an argc/symbol payload."));
                    };
                    self.pc += 1;
                    self.method_call(argc as usize + 1, symbol)?;
                }
                Opcode::Jmp => {
                    self.jump(instr.payload.branch());
                }
                Opcode::Bt => {
                    let value = self.frame().pop();
                    let truth = match value {
                        Value::Bool(b) => b,
                        other => other.to_bool(&self.env.heap),
                    };
                    if truth {
                        self.jump(instr.payload.branch());
                    } else {
                        self.pc += 1;
                    }
                }
                Opcode::Bf => {
                    let value = self.frame().pop();
                    let truth = match value {
                        Value::Bool(b) => b,
                        other => other.to_bool(&self.env.heap),
                    };
                    if truth {
                        self.pc += 1;
                    } else {
                        self.jump(instr.payload.branch());
                    }
                }
                Opcode::NewTill => {
                    let index = instr.payload.index() as usize;
                    let info = self
                        .tables
                        .till_infos
                        .get(index)
                        .ok_or_else(|| RunError::eval("Compiler bug: till info index out of range."))?;
                    let continuation = TillContinuation {
                        closure: self.closure,
                        segment: self.segment,
                        stack_depth: self.frames.get(self.closure).stack_depth(),
                        targets: info.branch_targets.clone(),
                    };
                    let id = self.env.heap.allocate(HeapData::Till(continuation));
                    self.frame().push(Value::Ref(id));
                    self.pc += 1;
                }
                Opcode::EndTill => {
                    let value = self.frame().pop();
                    if let Value::Ref(id) = value
                        && let HeapData::Till(till) = self.env.heap.get_mut(id)
                    {
                        till.invalidate();
                    }
                    self.pc += 1;
                }
                Opcode::TillEsc => {
                    let branch = instr.payload.index() as usize;
                    self.till_escape(branch)?;
                }
                Opcode::Ret => match self.do_return()? {
                    Some(result) => return Ok(CoreExit::Done(result)),
                    None => {}
                },

                // ----------------------------------------------------------
                // E8-EF: Optimized property loads
                Opcode::LdA => {
                    let target = self.frame().pop();
                    let value = if self.env.heap.as_cons(target).is_some() {
                        list::car(&self.env.heap, target)
                    } else {
                        let raw = self.get_property_value(target, KnownSymbol::A.symbol());
                        self.env.heap.unbox_value(raw)
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdD => {
                    let target = self.frame().pop();
                    let value = if self.env.heap.as_cons(target).is_some() {
                        list::cdr(&self.env.heap, target)
                    } else {
                        let raw = self.get_property_value(target, KnownSymbol::D.symbol());
                        self.env.heap.unbox_value(raw)
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }
                Opcode::LdStart => {
                    self.fast_property(KnownSymbol::Start.symbol());
                    self.pc += 1;
                }
                Opcode::LdEnd => {
                    self.fast_property(KnownSymbol::End.symbol());
                    self.pc += 1;
                }
                Opcode::LdCount => {
                    self.fast_property(KnownSymbol::Count.symbol());
                    self.pc += 1;
                }
                Opcode::LdLength => {
                    let target = self.frame().pop();
                    let value = if let Some(s) = self.env.heap.as_str(target) {
                        Value::Int64(s.len() as i64)
                    } else {
                        let raw = self.get_property_value(target, KnownSymbol::Length.symbol());
                        self.env.heap.unbox_value(raw)
                    };
                    self.frame().push(value);
                    self.pc += 1;
                }

                // ----------------------------------------------------------
                // F0-FF: State machines and pseudo-ops
                Opcode::StateMachStart => {
                    self.tracer.on_state_machine_step();
                    // The return link left by each user-function call lands
                    // on the StateMachBody instruction.
                    self.pc = 1;
                    match self.machine_step(true)? {
                        Step::Call(argc) => self.call_from_stack(argc)?,
                        Step::Done => {
                            if let Some(result) = self.do_return()? {
                                return Ok(CoreExit::Done(result));
                            }
                        }
                    }
                }
                Opcode::StateMachBody => {
                    self.tracer.on_state_machine_step();
                    match self.machine_step(false)? {
                        Step::Call(argc) => self.call_from_stack(argc)?,
                        Step::Done => {
                            if let Some(result) = self.do_return()? {
                                return Ok(CoreExit::Done(result));
                            }
                        }
                    }
                }
                Opcode::Pseudo | Opcode::Label | Opcode::Block | Opcode::EndBlock => self.pc += 1,

                // ----------------------------------------------------------
                // Everything else is reserved.
                other => {
                    return Err(RunError::eval(format!(
                        "Eval: Unsupported opcode 0x{:02X}",
                        other as u8
                    )));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Handler helpers.

    fn jump(&mut self, displacement: i32) {
        // Branches are relative to the branching instruction itself; the
        // builder guarantees targets stay inside the segment.
        self.pc = (self.pc as i64 + i64::from(displacement)) as usize;
    }

    fn replace_below(&mut self, count: usize) {
        let frame = self.frame();
        let top = frame.pop();
        frame.pop_count(count);
        frame.push(top);
    }

    fn string_constant(&mut self, index: u32) -> RunResult<Value> {
        if let Some(&value) = self.string_cache.get(&index) {
            return Ok(value);
        }
        let s = self
            .tables
            .strings
            .get(index as usize)
            .ok_or_else(|| RunError::eval("Compiler bug: string constant index out of range."))?
            .clone();
        let value = self.env.heap.alloc_str(s);
        self.string_cache.insert(index, value);
        Ok(value)
    }

    fn int128_constant(&mut self, index: u32) -> RunResult<Value> {
        if let Some(&value) = self.int128_cache.get(&index) {
            return Ok(value);
        }
        let v = *self
            .tables
            .int128s
            .get(index as usize)
            .ok_or_else(|| RunError::eval("Compiler bug: 128-bit constant index out of range."))?;
        let id = self.env.heap.allocate(HeapData::Int128(v));
        let value = Value::Ref(id);
        self.int128_cache.insert(index, value);
        Ok(value)
    }

    fn variable_access(&mut self, op: Opcode, scope: u32, index: usize) -> RunResult<()> {
        let target = self
            .frames
            .ancestor(self.closure, scope)
            .ok_or_else(|| RunError::eval("Compiler bug: scope walks past the root closure."))?;
        match op {
            Opcode::LdLoc => {
                let value = self.frames.get(target).get_local(index);
                self.frame().push(value);
            }
            Opcode::LdArg => {
                let value = self.frames.get(target).get_arg(index);
                self.frame().push(value);
            }
            Opcode::StLoc => {
                let value = self.frame().peek(0);
                self.frames.get_mut(target).set_local(index, value);
            }
            Opcode::StArg => {
                let value = self.frame().peek(0);
                self.frames.get_mut(target).set_arg(index, value);
            }
            Opcode::StpLoc => {
                let value = self.frame().pop();
                self.frames.get_mut(target).set_local(index, value);
            }
            Opcode::StpArg => {
                let value = self.frame().pop();
                self.frames.get_mut(target).set_arg(index, value);
            }
            _ => unreachable!("non-variable opcode routed to variable_access"),
        }
        Ok(())
    }

    fn global_ref(&mut self, symbol: Symbol) -> RunResult<Value> {
        let root = self.frames.get(self.root);
        let value = root.globals.as_ref().and_then(|globals| globals.get(&symbol).copied());
        match value {
            Some(boxed) => Ok(self.env.heap.unbox_value(boxed)),
            None => Err(RunError::raise(
                ErrorKind::EvalError,
                format!("Undefined variable \"{}\".", self.env.symbols.name(symbol)),
            )),
        }
    }

    fn store_global(&mut self, symbol: Symbol, value: Value) {
        let boxed = self.env.heap.box_value(value);
        if let Some(globals) = self.frames.get_mut(self.root).globals.as_mut() {
            globals.insert(symbol, boxed);
        }
    }

    /// Resolves a property on any value: user objects walk their bag and
    /// base chain, lists answer `a`/`d`, and primitive kinds fall back to
    /// their built-in method tables. Returns Null when nothing matches.
    fn get_property_value(&mut self, target: Value, symbol: Symbol) -> Value {
        if self.env.heap.as_object(target).is_some() {
            let found = object::get_property(&self.env.heap, target, symbol);
            if !found.is_null() {
                return found;
            }
        }
        let known = KnownSymbol::from_symbol(symbol);
        if let Some(cell) = self.env.heap.as_cons(target) {
            match known {
                Some(KnownSymbol::A) => return cell.a,
                Some(KnownSymbol::D) => return cell.d,
                _ => {}
            }
        }
        if let Some(known) = known
            && let Some(method) = builtin_method(target.kind(&self.env.heap), known)
        {
            return self.env.heap.alloc_function(Function::Native(method));
        }
        Value::Null
    }

    fn set_property_value(&mut self, target: Value, symbol: Symbol, value: Value) -> RunResult<()> {
        let boxed = self.env.heap.box_value(value);
        match target {
            Value::Ref(id) => match self.env.heap.get_mut(id) {
                HeapData::Object(object) => {
                    object.set(symbol, boxed);
                    Ok(())
                }
                _ => Err(RunError::property(format!(
                    "Object does not support setting property \"{}\".",
                    self.env.symbols.name(symbol)
                ))),
            },
            _ => Err(RunError::property(format!(
                "Object does not support setting property \"{}\".",
                self.env.symbols.name(symbol)
            ))),
        }
    }

    /// `get-member` semantics: user objects may define their own
    /// `get-member` method; lists index by position; strings by byte;
    /// plain objects fall back to symbol-keyed properties.
    fn member_get(&mut self, target: Value, key: Value) -> RunResult<Value> {
        // A user-defined get-member method wins.
        if self.env.heap.as_object(target).is_some() {
            let method = object::get_property(&self.env.heap, target, KnownSymbol::GetMember.symbol());
            if self.env.heap.as_function(method).is_some() {
                return self.call_value(method, &[target, key]);
            }
            if let Value::Symbol(symbol) = key {
                let found = object::get_property(&self.env.heap, target, symbol);
                return Ok(self.env.heap.unbox_value(found));
            }
            return Ok(Value::Null);
        }
        if self.env.heap.as_cons(target).is_some() {
            if let Value::Int64(index) = key {
                return Ok(list::nth(&self.env.heap, target, index));
            }
            return Ok(Value::Null);
        }
        if let Some(s) = self.env.heap.as_str(target) {
            if let Value::Int64(index) = key
                && index >= 0
                && (index as usize) < s.len()
            {
                return Ok(Value::Byte(s.as_bytes()[index as usize]));
            }
            return Ok(Value::Null);
        }
        Err(RunError::property("Object has no \"get-member\" method."))
    }

    fn member_set(&mut self, target: Value, key: Value, value: Value) -> RunResult<()> {
        if self.env.heap.as_object(target).is_some() {
            let method = object::get_property(&self.env.heap, target, KnownSymbol::SetMember.symbol());
            if self.env.heap.as_function(method).is_some() {
                self.call_value(method, &[target, key, value])?;
                return Ok(());
            }
            if let Value::Symbol(symbol) = key {
                return self.set_property_value(target, symbol, value);
            }
            return Err(RunError::property("set-member key must be a symbol."));
        }
        if self.env.heap.as_cons(target).is_some() {
            if let Value::Int64(index) = key
                && let Some(cell) = list::nth_cell(&self.env.heap, target, index)
                && let Some(cons) = self.env.heap.as_cons_mut(cell)
            {
                cons.a = value;
                return Ok(());
            }
            return Err(RunError::property("set-member index is out of range for this list."));
        }
        Err(RunError::property("Object has no \"set-member\" method."))
    }

    fn new_object(&mut self, pair_count: usize) -> RunResult<()> {
        let frame = self.frame();
        let values = frame.pop_args(pair_count * 2 + 1);
        let mut object = UserObject::with_base(values[0]);
        for pair in values[1..].chunks_exact(2) {
            let Value::Symbol(name) = pair[0] else {
                return Err(RunError::eval("Compiler bug: NewObj property name is not a symbol."));
            };
            let boxed = self.env.heap.box_value(pair[1]);
            object.set(name, boxed);
        }
        let value = self.env.heap.alloc_object(object);
        self.frame().push(value);
        Ok(())
    }

    /// A method call: resolve the symbol on the receiver (which sits
    /// `argc − 1` slots below the top), then invoke it with the receiver
    /// and the arguments already on the stack.
    fn method_call(&mut self, argc: usize, symbol: Symbol) -> RunResult<()> {
        let target = self.frame().peek(argc - 1);
        let resolved = self.get_property_value(target, symbol);
        if self.env.heap.as_function(resolved).is_none() {
            return Err(RunError::property(format!(
                "Object has no \"{}\" method.",
                self.env.symbols.name(symbol)
            )));
        }
        self.invoke(resolved, argc, 0)
    }

    /// A call whose callee is on the stack below `argc` arguments.
    fn call_from_stack(&mut self, argc: usize) -> RunResult<()> {
        let callee = self.frame().peek(argc);
        self.invoke(callee, argc, 1)
    }

    /// Invokes a function value against `argc` stack arguments, popping
    /// `extra` additional slots beneath them (the callee, when it lives on
    /// the stack). User functions push a frame; natives push their result.
    fn invoke(&mut self, function: Value, argc: usize, extra: usize) -> RunResult<()> {
        let Some(callee) = self.env.heap.as_function(function).cloned() else {
            return Err(RunError::native("Value is not a function and cannot be called."));
        };
        match callee {
            Function::Native(method) => {
                let args = self.frame().pop_args(argc);
                self.frame().pop_count(extra);
                match call_native(self.env, self.tables, method, &args)? {
                    NativeOutcome::Push(value) => {
                        self.frame().push(value);
                        Ok(())
                    }
                    NativeOutcome::BeginMachine(machine) => {
                        self.begin_state_machine(machine);
                        Ok(())
                    }
                }
            }
            Function::User(user) => {
                if self.frames.len() >= self.env.limits.max_frames {
                    return Err(RunError::eval("Eval: too many nested calls (frame limit reached)."));
                }
                let prototype = self.tables.user_function(user.fn_id);
                let args = self.frame().pop_args(argc);
                self.frame().pop_count(extra);
                prototype
                    .arg_check
                    .check(&prototype.name, args.len(), |i| args[i].kind(&self.env.heap))?;
                let info = self.tables.closure_info(prototype.closure_info);
                let mut frame = Closure::from_info(prototype.closure_info, info, &args, Some(user.captured));
                frame.ret = Some(ReturnLink {
                    segment: self.segment,
                    pc: self.pc,
                    closure: self.closure,
                });
                self.closure = self.frames.alloc(frame);
                self.segment = prototype.segment;
                self.pc = 0;
                self.tracer.on_call(0);
                Ok(())
            }
        }
    }

    /// Switches execution to a fresh state-machine frame.
    fn begin_state_machine(&mut self, machine: Box<dyn StateMachine>) {
        let mut frame = Closure::state_machine(machine, Some(self.closure), None);
        frame.ret = Some(ReturnLink {
            segment: self.segment,
            pc: self.pc,
            closure: self.closure,
        });
        self.closure = self.frames.alloc(frame);
        self.segment = SegmentId::STATE_MACHINE;
        self.pc = 0;
        self.tracer.on_call(0);
    }

    /// Runs one `start`/`body` transition of the current frame's machine.
    fn machine_step(&mut self, is_start: bool) -> RunResult<Step> {
        let mut machine = self
            .frame()
            .machine
            .take()
            .ok_or_else(|| RunError::eval("Eval bug: state-machine opcode outside a state-machine closure."))?;
        let result = {
            let frame = self.frames.get_mut(self.closure);
            let mut cx = MachineCx {
                frame,
                heap: &mut self.env.heap,
            };
            if is_start { machine.start(&mut cx) } else { machine.body(&mut cx) }
        };
        self.frame().machine = Some(machine);
        result
    }

    /// `Ret`: pop the result, restore the caller's registers, and push the
    /// result there. Returns the final value when there is no caller.
    fn do_return(&mut self) -> RunResult<Option<Value>> {
        let frame = self.frame();
        let result = if frame.stack_depth() > 0 { frame.pop() } else { Value::Null };
        let ret = frame.ret;
        match ret {
            None => Ok(Some(result)),
            Some(link) => {
                self.segment = link.segment;
                self.pc = link.pc;
                self.closure = link.closure;
                self.frame().push(result);
                self.tracer.on_return(0);
                Ok(None)
            }
        }
    }

    fn till_escape(&mut self, branch: usize) -> RunResult<()> {
        let value = self.frame().pop();
        let Value::Ref(id) = value else {
            return Err(RunError::eval("Cannot exit a 'till' loop without a continuation."));
        };
        let (closure, segment, stack_depth, target) = {
            let HeapData::Till(till) = self.env.heap.get_mut(id) else {
                return Err(RunError::eval("Cannot exit a 'till' loop without a continuation."));
            };
            if branch >= till.targets.len() {
                return Err(RunError::eval(if till.targets.is_empty() {
                    "Cannot re-exit a 'till' loop that has already exited."
                } else {
                    "Cannot exit a 'till' loop to an invalid target."
                }));
            }
            let target = till.targets[branch];
            // The continuation is single-shot.
            till.invalidate();
            (till.closure, till.segment, till.stack_depth, target)
        };
        self.closure = closure;
        self.frames.get_mut(closure).truncate_stack(stack_depth);
        self.segment = segment;
        self.pc = target as usize;
        Ok(())
    }

    fn fast_property(&mut self, symbol: Symbol) {
        let target = self.frame().pop();
        let raw = self.get_property_value(target, symbol);
        let value = self.env.heap.unbox_value(raw);
        self.frame().push(value);
    }
}
