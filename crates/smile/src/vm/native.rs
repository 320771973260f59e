//! Built-in method dispatch for the primitive kinds.
//!
//! Method calls resolve through property lookup; when the receiver is a
//! primitive kind, the lookup lands here. Most methods compute their result
//! directly; the higher-order list operations instead hand the VM a state
//! machine to drive ([`NativeOutcome::BeginMachine`]).
//!
//! Degenerate forms of the higher-order operations — the caller passed a
//! plain value where a function was expected — short-circuit into tight
//! in-engine loops using value equality, with no state machine.

use crate::{
    env::Env,
    error::{RunError, RunResult},
    function::{Function, NativeMethod},
    heap::HeapData,
    list,
    listops::{AnyAllMachine, CountMachine, EachMachine, FirstMachine, MapMachine, SortMachine, StateMachine, WhereMachine},
    string::Str,
    symbol::KnownSymbol,
    value::{Kind, Real32, Real64, Value},
};

use crate::bytecode::CompiledTables;

/// What a native call asks the VM to do.
pub enum NativeOutcome {
    /// Push this result and continue.
    Push(Value),
    /// Switch to a state-machine frame driving this machine.
    BeginMachine(Box<dyn StateMachine>),
}

/// Resolves a method symbol against a primitive kind's method table.
#[must_use]
pub fn builtin_method(kind: Kind, known: KnownSymbol) -> Option<NativeMethod> {
    use KnownSymbol as K;
    use NativeMethod as M;

    // Methods every kind answers.
    if let Some(common) = match known {
        K::ToBool => Some(M::ToBool),
        K::ToString => Some(M::ToString),
        K::HashMethod => Some(M::Hash),
        K::CompareEqualQ => Some(M::CompareEqual),
        _ => None,
    } {
        return Some(common);
    }

    match kind {
        Kind::Null | Kind::List => match known {
            K::Each => Some(M::Each),
            K::MapMethod => Some(M::Map),
            K::Where => Some(M::Where),
            K::AnyQ => Some(M::Any),
            K::AllQ => Some(M::All),
            K::ContainsQ => Some(M::Contains),
            K::Count => Some(M::Count),
            K::First => Some(M::First),
            K::IndexOf => Some(M::IndexOf),
            K::Sort => Some(M::Sort),
            K::SortInPlace => Some(M::SortInPlace),
            K::Cons => Some(M::Cons),
            K::Car => Some(M::Car),
            K::Cdr => Some(M::Cdr),
            K::Length => Some(M::Length),
            K::HasCycleQ => Some(M::HasCycle),
            K::WellFormedQ => Some(M::WellFormed),
            K::CloneMethod => Some(M::Clone),
            K::Append => Some(M::Append),
            K::AppendInPlace => Some(M::AppendInPlace),
            K::AppendList => Some(M::AppendList),
            K::AppendListInPlace => Some(M::AppendListInPlace),
            K::Combine => Some(M::Combine),
            K::Nth => Some(M::Nth),
            K::NthCell => Some(M::NthCell),
            K::NthReverse => Some(M::NthReverse),
            K::Skip => Some(M::Skip),
            K::Take => Some(M::Take),
            K::Tail => Some(M::Tail),
            K::Join => Some(M::Join),
            K::Reverse => Some(M::Reverse),
            K::EmptyQ => Some(M::Empty),
            _ => None,
        },
        Kind::Byte
        | Kind::Integer16
        | Kind::Integer32
        | Kind::Integer64
        | Kind::Integer128
        | Kind::Real32
        | Kind::Real64
        | Kind::Float32
        | Kind::Float64 => match known {
            K::Plus => Some(M::Plus),
            K::Minus => Some(M::Minus),
            K::Star => Some(M::Star),
            K::Slash => Some(M::Slash),
            K::Mod => Some(M::Mod),
            K::Rem => Some(M::Rem),
            K::Abs => Some(M::Abs),
            K::Sqrt => Some(M::Sqrt),
            K::Min => Some(M::Min),
            K::Max => Some(M::Max),
            K::Eq => Some(M::Eq),
            K::Ne => Some(M::Ne),
            K::Lt => Some(M::Lt),
            K::Gt => Some(M::Gt),
            K::Le => Some(M::Le),
            K::Ge => Some(M::Ge),
            K::Compare => Some(M::Compare),
            K::ToInt => Some(M::ToInt),
            _ => None,
        },
        Kind::String => match known {
            K::Length => Some(M::Length),
            K::Eq => Some(M::Eq),
            K::Ne => Some(M::Ne),
            K::Lt => Some(M::Lt),
            K::Gt => Some(M::Gt),
            K::Le => Some(M::Le),
            K::Ge => Some(M::Ge),
            K::Compare => Some(M::Compare),
            _ => None,
        },
        Kind::Bool => match known {
            K::Eq => Some(M::Eq),
            K::Ne => Some(M::Ne),
            _ => None,
        },
        _ => None,
    }
}

/// Executes a native method. `args[0]` is the receiver.
pub fn call_native(
    env: &mut Env,
    tables: &CompiledTables,
    method: NativeMethod,
    args: &[Value],
) -> RunResult<NativeOutcome> {
    use NativeMethod as M;
    let receiver = args.first().copied().unwrap_or(Value::Null);

    let outcome = match method {
        // ------------------------------------------------------------------
        // Higher-order list operations.
        M::Each => return begin_list_machine(env, tables, method, args, "each"),
        M::Map => return begin_list_machine(env, tables, method, args, "map"),
        M::Where => return begin_list_machine(env, tables, method, args, "where"),
        M::Any => {
            if args.len() < 2 {
                // With no predicate, any? asks "is there anything here?".
                return Ok(NativeOutcome::Push(Value::Bool(env.heap.as_cons(receiver).is_some())));
            }
            return begin_list_machine(env, tables, method, args, "any?");
        }
        M::All => return begin_list_machine(env, tables, method, args, "all?"),
        M::Contains => return begin_list_machine(env, tables, method, args, "contains?"),
        M::Count => {
            if args.len() < 2 {
                return Ok(NativeOutcome::Push(Value::Int64(list::length(&env.heap, receiver)?)));
            }
            return begin_list_machine(env, tables, method, args, "count");
        }
        M::First => {
            if args.len() < 2 {
                return Ok(NativeOutcome::Push(list::car(&env.heap, receiver)));
            }
            return begin_list_machine(env, tables, method, args, "first");
        }
        M::IndexOf => return begin_list_machine(env, tables, method, args, "index-of"),
        M::Sort | M::SortInPlace => {
            let elements = list::to_values(&env.heap, receiver)?;
            let in_place = method == M::SortInPlace;
            match args.get(1) {
                Some(&function) if env.heap.as_function(function).is_some() => {
                    return Ok(NativeOutcome::BeginMachine(Box::new(SortMachine::new(
                        receiver, elements, function, in_place,
                    ))));
                }
                Some(other) => {
                    return Err(RunError::native(format!(
                        "Argument 2 to '{}' must be a comparison function, not {}.",
                        method,
                        kind_name(*other, env)
                    )));
                }
                None => {
                    let mut sorted = elements;
                    sort_by_natural_order(env, &mut sorted)?;
                    let result = if in_place {
                        rewrite_heads(env, receiver, &sorted)
                    } else {
                        list::from_values(&mut env.heap, &sorted)
                    };
                    NativeOutcome::Push(result)
                }
            }
        }

        // ------------------------------------------------------------------
        // List structure.
        M::Cons => {
            let d = args.get(1).copied().unwrap_or(Value::Null);
            NativeOutcome::Push(list::cons(&mut env.heap, receiver, d))
        }
        M::Car => NativeOutcome::Push(list::car(&env.heap, receiver)),
        M::Cdr => NativeOutcome::Push(list::cdr(&env.heap, receiver)),
        M::Length => match receiver {
            Value::Ref(id) => match env.heap.get(id) {
                HeapData::Str(s) => NativeOutcome::Push(Value::Int64(s.len() as i64)),
                _ => NativeOutcome::Push(Value::Int64(list::length(&env.heap, receiver)?)),
            },
            Value::Null => NativeOutcome::Push(Value::Int64(0)),
            _ => NativeOutcome::Push(Value::Int64(list::length(&env.heap, receiver)?)),
        },
        M::HasCycle => NativeOutcome::Push(Value::Bool(list::has_cycle(&env.heap, receiver))),
        M::WellFormed => NativeOutcome::Push(Value::Bool(list::is_well_formed(&env.heap, receiver))),
        M::Clone => NativeOutcome::Push(list::clone_spine(&mut env.heap, receiver)?),
        M::Append => NativeOutcome::Push(list::append(&mut env.heap, receiver, &args[1..])?),
        M::AppendInPlace => NativeOutcome::Push(list::append_in_place(&mut env.heap, receiver, &args[1..])?),
        M::AppendList => NativeOutcome::Push(list::append_list(&mut env.heap, receiver, &args[1..], "append-list")?),
        M::AppendListInPlace => {
            NativeOutcome::Push(list::append_list_in_place(&mut env.heap, receiver, &args[1..], "append-list!")?)
        }
        M::Combine => NativeOutcome::Push(list::combine(&mut env.heap, args)?),
        M::Nth => NativeOutcome::Push(list::nth(&env.heap, receiver, want_int(args.get(1), "nth")?)),
        M::NthCell => NativeOutcome::Push(
            list::nth_cell(&env.heap, receiver, want_int(args.get(1), "nth-cell")?).unwrap_or(Value::Null),
        ),
        M::NthReverse => NativeOutcome::Push(list::nth_reverse(&env.heap, receiver, want_int(args.get(1), "nth-reverse")?)),
        M::Skip => NativeOutcome::Push(list::skip(&env.heap, receiver, want_int(args.get(1), "skip")?)),
        M::Take => {
            let n = want_int(args.get(1), "take")?;
            NativeOutcome::Push(list::take(&mut env.heap, receiver, n))
        }
        M::Tail => NativeOutcome::Push(list::tail(&env.heap, receiver)),
        M::Reverse => NativeOutcome::Push(list::reverse(&mut env.heap, receiver)?),
        M::Empty => NativeOutcome::Push(Value::Bool(env.heap.as_cons(receiver).is_none())),
        M::Join => {
            let glue = match args.get(1) {
                Some(&v) => env
                    .heap
                    .as_str(v)
                    .cloned()
                    .ok_or_else(|| RunError::native("Argument 2 to 'join' must be a String."))?,
                None => Str::empty(),
            };
            let symbols = &env.symbols;
            let joined = list::join(&env.heap, receiver, &glue, |heap, v| display_value(v, heap, symbols))?;
            NativeOutcome::Push(env.heap.alloc_str(joined))
        }

        // ------------------------------------------------------------------
        // Arithmetic and comparison.
        M::Plus | M::Minus | M::Star | M::Slash | M::Mod | M::Rem | M::Min | M::Max => {
            NativeOutcome::Push(arith(env, method, args)?)
        }
        M::Abs => NativeOutcome::Push(unary_numeric(env, method, receiver)?),
        M::Sqrt => NativeOutcome::Push(unary_numeric(env, method, receiver)?),
        M::Eq => NativeOutcome::Push(Value::Bool(equals(env, args))),
        M::Ne => NativeOutcome::Push(Value::Bool(!equals(env, args))),
        M::Lt | M::Gt | M::Le | M::Ge | M::Compare => NativeOutcome::Push(compare(env, method, args)?),

        // ------------------------------------------------------------------
        // Conversions.
        M::ToBool => NativeOutcome::Push(Value::Bool(receiver.to_bool(&env.heap))),
        M::ToInt => NativeOutcome::Push(Value::Int64(numeric_to_i64(receiver, env)?)),
        M::ToString => {
            let text = display_value(receiver, &env.heap, &env.symbols);
            NativeOutcome::Push(env.heap.alloc_str(Str::from(text)))
        }
        M::Hash => {
            use std::hash::{Hash as _, Hasher as _};
            let mut hasher = ahash::AHasher::default();
            display_value(receiver, &env.heap, &env.symbols).hash(&mut hasher);
            NativeOutcome::Push(Value::Int64(hasher.finish() as i64))
        }
        M::CompareEqual => {
            let other = args.get(1).copied().unwrap_or(Value::Null);
            NativeOutcome::Push(Value::Bool(receiver.compare_equal(other, &env.heap)))
        }
    };
    Ok(outcome)
}

/// Starts (or short-circuits) one of the higher-order list operations.
fn begin_list_machine(
    env: &mut Env,
    tables: &CompiledTables,
    method: NativeMethod,
    args: &[Value],
    name: &str,
) -> RunResult<NativeOutcome> {
    use NativeMethod as M;
    let receiver = args.first().copied().unwrap_or(Value::Null);
    let argument = args.get(1).copied().ok_or_else(|| {
        RunError::native(format!("'{name}' requires at least 2 arguments, but was called with 1."))
    })?;

    if let Some(function) = env.heap.as_function(argument) {
        let with_index = wants_index(function, tables);
        let machine: Box<dyn StateMachine> = match method {
            M::Each => Box::new(EachMachine::new(receiver, argument, with_index)),
            M::Map => Box::new(MapMachine::new(receiver, argument, with_index)),
            M::Where => Box::new(WhereMachine::new(receiver, argument, with_index)),
            M::Any | M::Contains => Box::new(AnyAllMachine::any(receiver, argument, with_index)),
            M::All => Box::new(AnyAllMachine::all(receiver, argument, with_index)),
            M::Count => Box::new(CountMachine::new(receiver, argument, with_index)),
            M::First => Box::new(FirstMachine::first(receiver, argument)),
            M::IndexOf => Box::new(FirstMachine::index_of(receiver, argument)),
            _ => return Err(RunError::native(format!("'{name}' cannot be driven by a function."))),
        };
        return Ok(NativeOutcome::BeginMachine(machine));
    }

    // Degenerate form: a plain value stands in for the predicate, and the
    // scan runs entirely in-engine using value equality.
    let outcome = match method {
        M::Any | M::Contains => Value::Bool(find_equal(env, receiver, argument).is_some()),
        M::All => {
            let mut all = true;
            let mut current = receiver;
            while let Some(cell) = env.heap.as_cons(current) {
                if !cell.a.compare_equal(argument, &env.heap) {
                    all = false;
                    break;
                }
                current = cell.d;
            }
            Value::Bool(all)
        }
        M::Count => {
            let mut count = 0;
            let mut current = receiver;
            while let Some(cell) = env.heap.as_cons(current) {
                if cell.a.compare_equal(argument, &env.heap) {
                    count += 1;
                }
                current = cell.d;
            }
            Value::Int64(count)
        }
        M::First => find_equal(env, receiver, argument).map_or(Value::Null, |(_, element)| element),
        M::IndexOf => find_equal(env, receiver, argument).map_or(Value::Null, |(index, _)| Value::Int64(index)),
        M::Each | M::Map | M::Where => {
            return Err(RunError::native(format!(
                "Argument 2 to '{name}' must be a Fn, not {}.",
                kind_name(argument, env)
            )));
        }
        _ => Value::Null,
    };
    Ok(NativeOutcome::Push(outcome))
}

fn find_equal(env: &Env, list: Value, wanted: Value) -> Option<(i64, Value)> {
    let mut current = list;
    let mut index = 0;
    while let Some(cell) = env.heap.as_cons(current) {
        if cell.a.compare_equal(wanted, &env.heap) {
            return Some((index, cell.a));
        }
        current = cell.d;
        index += 1;
    }
    None
}

/// Whether a callback takes `(element, index)` rather than just
/// `(element)`.
fn wants_index(function: &Function, tables: &CompiledTables) -> bool {
    match function {
        Function::User(user) => {
            let info = tables.user_function(user.fn_id).closure_info;
            tables.closure_info(info).num_args() >= 2
        }
        Function::Native(_) => false,
    }
}

fn rewrite_heads(env: &mut Env, list: Value, sorted: &[Value]) -> Value {
    let mut current = list;
    for &value in sorted {
        let Some(cell) = env.heap.as_cons_mut(current) else {
            break;
        };
        cell.a = value;
        current = cell.d;
    }
    list
}

fn sort_by_natural_order(env: &Env, values: &mut [Value]) -> RunResult<()> {
    // Natural order covers the homogeneous cases a comparator-less sort is
    // for: numbers by value, strings bytewise.
    let mut error = None;
    values.sort_by(|&a, &b| {
        natural_order(env, a, b).unwrap_or_else(|| {
            if error.is_none() {
                error = Some(RunError::native(
                    "List elements cannot be ordered without a comparison function.",
                ));
            }
            std::cmp::Ordering::Equal
        })
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn natural_order(env: &Env, a: Value, b: Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (numeric_value(a, env), numeric_value(b, env)) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (env.heap.as_str(a), env.heap.as_str(b)) {
        return Some(x.compare(y));
    }
    None
}

fn numeric_value(v: Value, env: &Env) -> Option<f64> {
    match v {
        Value::Byte(b) => Some(f64::from(b)),
        Value::Int16(i) => Some(f64::from(i)),
        Value::Int32(i) => Some(f64::from(i)),
        Value::Int64(i) => Some(i as f64),
        Value::Real32(r) => Some(f64::from(r.0)),
        Value::Real64(r) => Some(r.0),
        Value::Float32(f) => Some(f64::from(f)),
        Value::Float64(f) => Some(f),
        Value::Ref(id) => match env.heap.get(id) {
            HeapData::Int128(i) => Some(*i as f64),
            HeapData::Boxed(inner) => numeric_value(*inner, env),
            _ => None,
        },
        _ => None,
    }
}

fn numeric_to_i64(v: Value, env: &Env) -> RunResult<i64> {
    match v {
        Value::Byte(b) => Ok(i64::from(b)),
        Value::Int16(i) => Ok(i64::from(i)),
        Value::Int32(i) => Ok(i64::from(i)),
        Value::Int64(i) => Ok(i),
        Value::Real32(r) => Ok(r.0 as i64),
        Value::Real64(r) => Ok(r.0 as i64),
        Value::Float32(f) => Ok(f as i64),
        Value::Float64(f) => Ok(f as i64),
        _ => Err(RunError::native(format!(
            "Cannot convert {} to an integer.",
            kind_name(v, env)
        ))),
    }
}

fn want_int(v: Option<&Value>, name: &str) -> RunResult<i64> {
    match v {
        Some(Value::Byte(b)) => Ok(i64::from(*b)),
        Some(Value::Int16(i)) => Ok(i64::from(*i)),
        Some(Value::Int32(i)) => Ok(i64::from(*i)),
        Some(Value::Int64(i)) => Ok(*i),
        _ => Err(RunError::native(format!("Argument 2 to '{name}' must be an Integer."))),
    }
}

fn kind_name(v: Value, env: &Env) -> &'static str {
    match v.kind(&env.heap) {
        Kind::Null => "Null",
        Kind::Bool => "Bool",
        Kind::Symbol => "Symbol",
        Kind::Char => "Char",
        Kind::Uni => "Uni",
        Kind::Byte => "Byte",
        Kind::Integer16 => "Integer16",
        Kind::Integer32 => "Integer32",
        Kind::Integer64 => "Integer64",
        Kind::Integer128 => "Integer128",
        Kind::Real32 => "Real32",
        Kind::Real64 => "Real64",
        Kind::Float32 => "Float32",
        Kind::Float64 => "Float64",
        Kind::String => "String",
        Kind::List => "List",
        Kind::Function => "Fn",
        Kind::Object => "Object",
        Kind::Till => "TillContinuation",
        Kind::Regex => "Regex",
        Kind::RegexMatch => "RegexMatch",
    }
}

fn display_value(v: Value, heap: &crate::heap::Heap, symbols: &crate::symbol::SymbolTable) -> String {
    match v {
        Value::Ref(id) => match heap.get(id) {
            // Strings display without quotes in to-string/join contexts.
            HeapData::Str(s) => s.to_utf8_lossy().into_owned(),
            _ => v.repr(heap, symbols),
        },
        _ => v.repr(heap, symbols),
    }
}

// ---------------------------------------------------------------------------
// Numeric method implementations.

macro_rules! int_arith {
    ($method:expr, $a:expr, $b:expr, $ty:ty, $wrap:expr) => {{
        let a = $a;
        let b = $b;
        match $method {
            NativeMethod::Plus => $wrap(a.wrapping_add(b)),
            NativeMethod::Minus => $wrap(a.wrapping_sub(b)),
            NativeMethod::Star => $wrap(a.wrapping_mul(b)),
            NativeMethod::Slash => {
                if b == 0 {
                    return Err(RunError::native("Divide by zero error in '/'."));
                }
                $wrap(a.wrapping_div(b))
            }
            NativeMethod::Mod => {
                if b == 0 {
                    return Err(RunError::native("Divide by zero error in 'mod'."));
                }
                $wrap(a.rem_euclid(b))
            }
            NativeMethod::Rem => {
                if b == 0 {
                    return Err(RunError::native("Divide by zero error in 'rem'."));
                }
                $wrap(a.wrapping_rem(b))
            }
            NativeMethod::Min => $wrap(a.min(b)),
            NativeMethod::Max => $wrap(a.max(b)),
            _ => unreachable!("non-arithmetic method routed to int_arith"),
        }
    }};
}

macro_rules! float_arith {
    ($method:expr, $a:expr, $b:expr, $wrap:expr) => {{
        let a = $a;
        let b = $b;
        match $method {
            NativeMethod::Plus => $wrap(a + b),
            NativeMethod::Minus => $wrap(a - b),
            NativeMethod::Star => $wrap(a * b),
            NativeMethod::Slash => {
                if b == 0.0 {
                    return Err(RunError::native("Divide by zero error in '/'."));
                }
                $wrap(a / b)
            }
            NativeMethod::Mod => {
                if b == 0.0 {
                    return Err(RunError::native("Divide by zero error in 'mod'."));
                }
                $wrap(a.rem_euclid(b))
            }
            NativeMethod::Rem => {
                if b == 0.0 {
                    return Err(RunError::native("Divide by zero error in 'rem'."));
                }
                $wrap(a % b)
            }
            NativeMethod::Min => $wrap(a.min(b)),
            NativeMethod::Max => $wrap(a.max(b)),
            _ => unreachable!("non-arithmetic method routed to float_arith"),
        }
    }};
}

/// Two-operand arithmetic. Operands must share the receiver's kind; the
/// numeric tower does no implicit widening.
fn arith(env: &Env, method: NativeMethod, args: &[Value]) -> RunResult<Value> {
    let a = args.first().copied().unwrap_or(Value::Null);
    let b = args.get(1).copied().unwrap_or(Value::Null);
    let result = match (a, b) {
        (Value::Byte(x), Value::Byte(y)) => int_arith!(method, x, y, u8, Value::Byte),
        (Value::Int16(x), Value::Int16(y)) => int_arith!(method, x, y, i16, Value::Int16),
        (Value::Int32(x), Value::Int32(y)) => int_arith!(method, x, y, i32, Value::Int32),
        (Value::Int64(x), Value::Int64(y)) => int_arith!(method, x, y, i64, Value::Int64),
        (Value::Float32(x), Value::Float32(y)) => float_arith!(method, x, y, Value::Float32),
        (Value::Float64(x), Value::Float64(y)) => float_arith!(method, x, y, Value::Float64),
        (Value::Real32(x), Value::Real32(y)) => {
            float_arith!(method, x.0, y.0, |v| Value::Real32(Real32(v)))
        }
        (Value::Real64(x), Value::Real64(y)) => {
            float_arith!(method, x.0, y.0, |v| Value::Real64(Real64(v)))
        }
        _ => {
            return Err(RunError::native(format!(
                "Argument 2 to '{}' is of the wrong type ({} vs {}).",
                method,
                kind_name(a, env),
                kind_name(b, env)
            )));
        }
    };
    Ok(result)
}

fn unary_numeric(env: &Env, method: NativeMethod, receiver: Value) -> RunResult<Value> {
    match method {
        NativeMethod::Abs => match receiver {
            Value::Byte(b) => Ok(Value::Byte(b)),
            Value::Int16(i) => Ok(Value::Int16(i.wrapping_abs())),
            Value::Int32(i) => Ok(Value::Int32(i.wrapping_abs())),
            Value::Int64(i) => Ok(Value::Int64(i.wrapping_abs())),
            Value::Real32(r) => Ok(Value::Real32(Real32(r.0.abs()))),
            Value::Real64(r) => Ok(Value::Real64(Real64(r.0.abs()))),
            Value::Float32(f) => Ok(Value::Float32(f.abs())),
            Value::Float64(f) => Ok(Value::Float64(f.abs())),
            other => Err(RunError::native(format!(
                "'abs' is not defined for {}.",
                kind_name(other, env)
            ))),
        },
        NativeMethod::Sqrt => {
            let x = numeric_value(receiver, env)
                .ok_or_else(|| RunError::native(format!("'sqrt' is not defined for {}.", kind_name(receiver, env))))?;
            if x < 0.0 {
                return Err(RunError::native("Square root of a negative number."));
            }
            let root = x.sqrt();
            Ok(match receiver {
                Value::Float32(_) => Value::Float32(root as f32),
                Value::Float64(_) => Value::Float64(root),
                Value::Real32(_) => Value::Real32(Real32(root as f32)),
                Value::Real64(_) => Value::Real64(Real64(root)),
                _ => Value::Int64(root as i64),
            })
        }
        _ => unreachable!("non-unary method routed to unary_numeric"),
    }
}

fn equals(env: &Env, args: &[Value]) -> bool {
    let a = args.first().copied().unwrap_or(Value::Null);
    let b = args.get(1).copied().unwrap_or(Value::Null);
    a.compare_equal(b, &env.heap)
}

fn compare(env: &Env, method: NativeMethod, args: &[Value]) -> RunResult<Value> {
    let a = args.first().copied().unwrap_or(Value::Null);
    let b = args.get(1).copied().unwrap_or(Value::Null);

    let ordering = if let (Some(x), Some(y)) = (env.heap.as_str(a), env.heap.as_str(b)) {
        x.compare(y)
    } else {
        let x = numeric_value(a, env);
        let y = numeric_value(b, env);
        match (x, y) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => {
                return Err(RunError::native(format!(
                    "Cannot compare {} with {}.",
                    kind_name(a, env),
                    kind_name(b, env)
                )));
            }
        }
    };

    use std::cmp::Ordering;
    Ok(match method {
        NativeMethod::Lt => Value::Bool(ordering == Ordering::Less),
        NativeMethod::Gt => Value::Bool(ordering == Ordering::Greater),
        NativeMethod::Le => Value::Bool(ordering != Ordering::Greater),
        NativeMethod::Ge => Value::Bool(ordering != Ordering::Less),
        NativeMethod::Compare => Value::Int64(match ordering {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }),
        _ => unreachable!("non-comparison method routed to compare"),
    })
}
