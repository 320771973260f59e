//! End-to-end VM tests over hand-assembled segments.

use pretty_assertions::assert_eq;
use smile::{
    ArgCheck, Env, EvalResult, KnownSymbol, Opcode, Payload, SegmentBuilder, TablesBuilder, Value, Vm,
    closure::ClosureInfo,
    list, object,
};

/// Builds a one-function unit from a closure shape and an assembled
/// segment, returning the tables and the entry function id.
fn one_function(info: ClosureInfo, build: impl FnOnce(&mut SegmentBuilder)) -> (smile::CompiledTables, smile::UserFnId) {
    let mut tables = TablesBuilder::new();
    let info_id = tables.add_closure_info(info);
    let mut segment = SegmentBuilder::new();
    build(&mut segment);
    let segment_id = tables.add_segment(segment.finish(true));
    let entry = tables.define_function("main", info_id, segment_id, ArgCheck::none());
    (tables.finish(), entry)
}

fn plain_info(num_locals: usize) -> ClosureInfo {
    ClosureInfo {
        arg_names: Vec::new(),
        local_names: (0..num_locals).map(|i| smile::Symbol(3000 + i as u32)).collect(),
        max_stack: 16,
        parent: None,
    }
}

fn run_value(env: &mut Env, tables: &smile::CompiledTables, entry: smile::UserFnId) -> Value {
    let mut vm = Vm::new(env, tables);
    match vm.run_function(entry) {
        EvalResult::Value(value) => value,
        other => panic!("expected a value, got {other:?}"),
    }
}

fn run_exception(env: &mut Env, tables: &smile::CompiledTables, entry: smile::UserFnId) -> Value {
    let mut vm = Vm::new(env, tables);
    match vm.run_function(entry) {
        EvalResult::Exception(value) => value,
        other => panic!("expected an exception, got {other:?}"),
    }
}

fn error_kind(env: &Env, exception: Value) -> smile::Symbol {
    let raw = object::get_property(&env.heap, exception, KnownSymbol::Kind.symbol());
    match env.heap.unbox_value(raw) {
        Value::Symbol(s) => s,
        other => panic!("error kind is not a symbol: {other:?}"),
    }
}

fn error_message(env: &Env, exception: Value) -> String {
    let raw = object::get_property(&env.heap, exception, KnownSymbol::Message.symbol());
    env.heap
        .as_str(raw)
        .map(|s| s.to_utf8_lossy().into_owned())
        .unwrap_or_default()
}

#[test]
fn literals_and_arithmetic_methods() {
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(20));
        b.emit(Opcode::Ld64, Payload::Int64(22));
        b.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::Plus.symbol()));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(42));
}

#[test]
fn divide_by_zero_raises_native_method_error_with_stack_trace() {
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.emit(Opcode::Ld64, Payload::Int64(0));
        b.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::Slash.symbol()));
    });
    let mut env = Env::new();
    let exception = run_exception(&mut env, &tables, entry);

    assert_eq!(error_kind(&env, exception), KnownSymbol::NativeMethodError.symbol());
    assert!(error_message(&env, exception).contains("Divide by zero"));

    let trace = object::get_property(&env.heap, exception, KnownSymbol::StackTrace.symbol());
    let frames = list::to_values(&env.heap, trace).expect("stack trace is a well-formed list");
    assert!(!frames.is_empty());
    // Each frame record carries an offset property.
    let offset = object::get_property(&env.heap, frames[0], KnownSymbol::Offset.symbol());
    assert!(matches!(env.heap.unbox_value(offset), Value::Int64(_)));
}

#[test]
fn user_function_calls_push_and_pop_frames() {
    let mut tables = TablesBuilder::new();
    let main_info = tables.add_closure_info(plain_info(0));
    let callee_info = tables.add_closure_info(ClosureInfo {
        arg_names: vec![smile::Symbol(4000)],
        local_names: Vec::new(),
        max_stack: 8,
        parent: None,
    });

    // |x| x + 1
    let mut callee = SegmentBuilder::new();
    callee.emit(Opcode::LdArg0, Payload::Index(0));
    callee.emit(Opcode::Ld64, Payload::Int64(1));
    callee.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::Plus.symbol()));
    let callee_segment = tables.add_segment(callee.finish(true));
    let callee_fn = tables.define_function("inc", callee_info, callee_segment, ArgCheck::exact(1));

    let mut main = SegmentBuilder::new();
    main.emit(Opcode::NewFn, Payload::Index(callee_fn.0));
    main.emit(Opcode::Ld64, Payload::Int64(10));
    main.op(Opcode::Call1);
    let main_segment = tables.add_segment(main.finish(true));
    let entry = tables.define_function("main", main_info, main_segment, ArgCheck::none());

    let tables = tables.finish();
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(11));
}

#[test]
fn arg_check_violations_raise_native_method_error() {
    let mut tables = TablesBuilder::new();
    let main_info = tables.add_closure_info(plain_info(0));
    let callee_info = tables.add_closure_info(ClosureInfo {
        arg_names: vec![smile::Symbol(4000), smile::Symbol(4001)],
        local_names: Vec::new(),
        max_stack: 8,
        parent: None,
    });
    let mut callee = SegmentBuilder::new();
    callee.op(Opcode::LdNull);
    let callee_segment = tables.add_segment(callee.finish(true));
    let callee_fn = tables.define_function("wants-two", callee_info, callee_segment, ArgCheck::exact(2));

    let mut main = SegmentBuilder::new();
    main.emit(Opcode::NewFn, Payload::Index(callee_fn.0));
    main.emit(Opcode::Ld64, Payload::Int64(10));
    main.op(Opcode::Call1);
    let main_segment = tables.add_segment(main.finish(true));
    let entry = tables.define_function("main", main_info, main_segment, ArgCheck::none());

    let tables = tables.finish();
    let mut env = Env::new();
    let exception = run_exception(&mut env, &tables, entry);
    assert_eq!(error_kind(&env, exception), KnownSymbol::NativeMethodError.symbol());
    assert!(error_message(&env, exception).contains("wants-two"));
}

/// `(List.of 1 2 3).map |x| x * 2`, driven through the state-machine
/// opcodes.
#[test]
fn list_map_through_the_state_machine() {
    let mut tables = TablesBuilder::new();
    let main_info = tables.add_closure_info(plain_info(0));
    let double_info = tables.add_closure_info(ClosureInfo {
        arg_names: vec![smile::Symbol(4000)],
        local_names: Vec::new(),
        max_stack: 8,
        parent: None,
    });

    // |x| x * 2
    let mut double = SegmentBuilder::new();
    double.emit(Opcode::LdArg0, Payload::Index(0));
    double.emit(Opcode::Ld64, Payload::Int64(2));
    double.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::Star.symbol()));
    let double_segment = tables.add_segment(double.finish(true));
    let double_fn = tables.define_function("double", double_info, double_segment, ArgCheck::exact(1));

    // Build (1 2 3), then .map the doubler over it.
    let mut main = SegmentBuilder::new();
    main.emit(Opcode::Ld64, Payload::Int64(1));
    main.emit(Opcode::Ld64, Payload::Int64(2));
    main.emit(Opcode::Ld64, Payload::Int64(3));
    main.op(Opcode::LdNull);
    main.op(Opcode::Cons);
    main.op(Opcode::Cons);
    main.op(Opcode::Cons);
    main.emit(Opcode::NewFn, Payload::Index(double_fn.0));
    main.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::MapMethod.symbol()));
    let main_segment = tables.add_segment(main.finish(true));
    let entry = tables.define_function("main", main_info, main_segment, ArgCheck::none());

    let tables = tables.finish();
    let mut env = Env::new();
    let result = run_value(&mut env, &tables, entry);
    let values = list::to_values(&env.heap, result).expect("map result is well-formed");
    let unboxed: Vec<Value> = values.into_iter().map(|v| env.heap.unbox_value(v)).collect();
    assert_eq!(unboxed, vec![Value::Int64(2), Value::Int64(4), Value::Int64(6)]);
}

/// A till with two labels, escaping to the second: execution resumes at
/// the registered address and the stack truncates to the captured depth.
#[test]
fn till_escape_jumps_to_the_registered_target() {
    let mut tables = TablesBuilder::new();
    let info = tables.add_closure_info(plain_info(1));

    let mut b = SegmentBuilder::new();
    b.emit(Opcode::NewTill, Payload::Index(0)); //  0
    b.emit(Opcode::StpLoc0, Payload::Index(0)); //  1: stash the continuation
    b.emit(Opcode::Ld64, Payload::Int64(99)); //    2: junk the escape must discard
    b.emit(Opcode::LdLoc0, Payload::Index(0)); //   3
    b.emit(Opcode::TillEsc, Payload::Index(1)); //  4: escape to the second label
    // First label's target:
    let first = b.here() as u32; //                 5
    b.emit(Opcode::Ld64, Payload::Int64(111));
    b.op(Opcode::Ret);
    // Second label's target:
    let second = b.here() as u32; //                7
    b.emit(Opcode::Ld64, Payload::Int64(222));
    b.op(Opcode::Ret);
    let segment = tables.add_segment(b.finish(false));
    tables.add_till_info(vec![first, second]);
    let entry = tables.define_function("main", info, segment, ArgCheck::none());

    let tables = tables.finish();
    let mut env = Env::new();
    // The 99 pushed before the escape is gone; the result is exactly the
    // second label's value, so the stack was truncated to the captured
    // depth.
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(222));
}

#[test]
fn till_re_escape_raises_eval_error() {
    let mut tables = TablesBuilder::new();
    let info = tables.add_closure_info(plain_info(1));

    let mut b = SegmentBuilder::new();
    b.emit(Opcode::NewTill, Payload::Index(0)); //  0
    b.emit(Opcode::StpLoc0, Payload::Index(0)); //  1
    b.emit(Opcode::LdLoc0, Payload::Index(0)); //   2
    b.emit(Opcode::TillEsc, Payload::Index(0)); //  3
    let target = b.here() as u32; //                4: the till's only label
    b.emit(Opcode::LdLoc0, Payload::Index(0));
    b.emit(Opcode::TillEsc, Payload::Index(0)); //  5: second escape must fail
    let segment = tables.add_segment(b.finish(true));
    tables.add_till_info(vec![target]);
    let entry = tables.define_function("main", info, segment, ArgCheck::none());

    let tables = tables.finish();
    let mut env = Env::new();
    let exception = run_exception(&mut env, &tables, entry);
    assert_eq!(error_kind(&env, exception), KnownSymbol::EvalError.symbol());
    assert!(error_message(&env, exception).contains("re-exit"));
}

#[test]
fn branch_truthiness() {
    // Null is falsy without any method call.
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.op(Opcode::LdNull);
        let taken = b.new_label();
        b.branch(Opcode::Bt, taken);
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.op(Opcode::Ret);
        b.bind(taken);
        b.emit(Opcode::Ld64, Payload::Int64(2));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(1));

    // A nonzero integer goes through to-bool and is truthy.
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(7));
        let taken = b.new_label();
        b.branch(Opcode::Bt, taken);
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.op(Opcode::Ret);
        b.bind(taken);
        b.emit(Opcode::Ld64, Payload::Int64(2));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(2));

    // Unboxed bools branch directly.
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::LdBool, Payload::Bool(false));
        let skipped = b.new_label();
        b.branch(Opcode::Bf, skipped);
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.op(Opcode::Ret);
        b.bind(skipped);
        b.emit(Opcode::Ld64, Payload::Int64(3));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(3));
}

#[test]
fn breakpoints_pause_and_resume() {
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(5));
        b.op(Opcode::Pop1);
        b.op(Opcode::Brk);
        b.emit(Opcode::Ld64, Payload::Int64(7));
    });
    let mut env = Env::new();
    let mut vm = Vm::new(&mut env, &tables);
    assert!(matches!(vm.run_function(entry), EvalResult::Break));
    match vm.resume() {
        EvalResult::Value(value) => assert_eq!(value, Value::Int64(7)),
        other => panic!("expected a value after resume, got {other:?}"),
    }
}

#[test]
fn globals_round_trip_and_unset_globals_raise() {
    let g = 9001;
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(42));
        b.emit(Opcode::StpX, Payload::Symbol(smile::Symbol(g)));
        b.emit(Opcode::LdX, Payload::Symbol(smile::Symbol(g)));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(42));

    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::LdX, Payload::Symbol(smile::Symbol(9002)));
    });
    let mut env = Env::new();
    let exception = run_exception(&mut env, &tables, entry);
    assert_eq!(error_kind(&env, exception), KnownSymbol::EvalError.symbol());
}

#[test]
fn unknown_method_raises_property_error() {
    let (tables, entry) = one_function(plain_info(0), |b| {
        b.emit(Opcode::Ld64, Payload::Int64(1));
        b.emit(Opcode::Met0, Payload::Symbol(smile::Symbol(9100)));
    });
    let mut env = Env::new();
    let exception = run_exception(&mut env, &tables, entry);
    assert_eq!(error_kind(&env, exception), KnownSymbol::PropertyError.symbol());
    assert!(error_message(&env, exception).contains("method"));
}

#[test]
fn reserved_opcodes_raise_eval_error() {
    for opcode in [Opcode::TCall0, Opcode::TMet3, Opcode::Try, Opcode::EndTry, Opcode::Add, Opcode::Neg] {
        let (tables, entry) = one_function(plain_info(0), |b| {
            b.op(opcode);
        });
        let mut env = Env::new();
        let exception = run_exception(&mut env, &tables, entry);
        assert_eq!(error_kind(&env, exception), KnownSymbol::EvalError.symbol());
        assert!(error_message(&env, exception).contains("Unsupported opcode"));
    }
}

#[test]
fn objects_support_property_opcodes() {
    let name = KnownSymbol::Count.symbol();
    let (tables, entry) = one_function(plain_info(1), |b| {
        // new {} with one property: count = 5
        b.op(Opcode::LdNull); // base
        b.emit(Opcode::LdSym, Payload::Symbol(name));
        b.emit(Opcode::Ld64, Payload::Int64(5));
        b.emit(Opcode::NewObj, Payload::Index(1));
        b.emit(Opcode::StpLoc0, Payload::Index(0));
        // read it back through LdProp
        b.emit(Opcode::LdLoc0, Payload::Index(0));
        b.emit(Opcode::LdProp, Payload::Symbol(name));
    });
    let mut env = Env::new();
    assert_eq!(run_value(&mut env, &tables, entry), Value::Int64(5));
}

#[test]
fn call_protected_invokes_the_handler_with_the_error_object() {
    let mut tables = TablesBuilder::new();
    // body: || 1 / 0
    let body_info = tables.add_closure_info(plain_info(0));
    let mut body = SegmentBuilder::new();
    body.emit(Opcode::Ld64, Payload::Int64(1));
    body.emit(Opcode::Ld64, Payload::Int64(0));
    body.emit(Opcode::Met1, Payload::Symbol(KnownSymbol::Slash.symbol()));
    let body_segment = tables.add_segment(body.finish(true));
    let body_fn = tables.define_function("body", body_info, body_segment, ArgCheck::none());

    // handler: |e| e
    let handler_info = tables.add_closure_info(ClosureInfo {
        arg_names: vec![smile::Symbol(4000)],
        local_names: Vec::new(),
        max_stack: 4,
        parent: None,
    });
    let mut handler = SegmentBuilder::new();
    handler.emit(Opcode::LdArg0, Payload::Index(0));
    let handler_segment = tables.add_segment(handler.finish(true));
    let handler_fn = tables.define_function("handler", handler_info, handler_segment, ArgCheck::exact(1));

    let tables = tables.finish();
    let mut env = Env::new();
    let mut vm = Vm::new(&mut env, &tables);

    let body_value = vm.env().heap.alloc_function(smile::Function::User(smile::function::UserFunction {
        fn_id: body_fn,
        captured: smile::closure::ClosureId(0),
    }));
    let handler_value = vm.env().heap.alloc_function(smile::Function::User(smile::function::UserFunction {
        fn_id: handler_fn,
        captured: smile::closure::ClosureId(0),
    }));

    let result = vm.call_protected(body_value, handler_value).expect("handler result");
    let kind = error_kind(vm.env(), result);
    assert_eq!(kind, KnownSymbol::NativeMethodError.symbol());
}
