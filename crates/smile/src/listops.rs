//! Interruptible higher-order list operations.
//!
//! These are driven by the VM's `StateMachStart`/`StateMachBody` opcodes
//! rather than by native recursion, so the native stack never grows across
//! user-function invocations and a host can interrupt at every iteration
//! boundary.
//!
//! Protocol: `start` runs once. It either pushes the final result and
//! returns [`Step::Done`], or pushes the user function and its arguments
//! onto the frame's operand stack and returns [`Step::Call`] with the
//! argument count. After the VM returns from the user function (its result
//! on top of the stack), it calls `body`, which consumes the result and
//! makes the same choice again.

use std::collections::VecDeque;

use crate::{
    closure::Closure,
    error::RunResult,
    heap::Heap,
    list::{self, ListBuilder},
    value::Value,
};

/// What a state-machine callback wants the VM to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Invoke the function sitting `argc` slots below the stack top, with
    /// the `argc` arguments above it.
    Call(usize),
    /// The final result has been pushed; return from the machine frame.
    Done,
}

/// Access the callbacks get to their frame and the heap.
pub struct MachineCx<'a> {
    pub frame: &'a mut Closure,
    pub heap: &'a mut Heap,
}

impl MachineCx<'_> {
    pub fn push(&mut self, value: Value) {
        self.frame.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.frame.pop()
    }
}

/// An interruptible operation run on a state-machine frame.
pub trait StateMachine: std::fmt::Debug {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step>;
    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step>;
}

/// Pushes the user function and the next element (plus the element index in
/// two-argument mode) and advances the cursor.
fn push_invocation(cx: &mut MachineCx<'_>, function: Value, element: Value, index: i64, with_index: bool) -> Step {
    cx.push(function);
    cx.push(element);
    if with_index {
        cx.push(Value::Int64(index));
        Step::Call(2)
    } else {
        Step::Call(1)
    }
}

// ---------------------------------------------------------------------------
// each

/// `each`: calls the function for every element, returns the original list.
#[derive(Debug)]
pub struct EachMachine {
    initial_list: Value,
    list: Value,
    function: Value,
    index: i64,
    with_index: bool,
}

impl EachMachine {
    #[must_use]
    pub fn new(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            initial_list: list,
            list,
            function,
            index: 0,
            with_index,
        }
    }

    /// `each` keeps a running "previous result" slot on the stack, so both
    /// callbacks share one step function.
    fn step(&mut self, cx: &mut MachineCx<'_>) -> Step {
        // Pop the previous return value (or the initial Null).
        cx.pop();
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            cx.push(self.initial_list);
            return Step::Done;
        };
        self.list = cell.d;
        let step = push_invocation(cx, self.function, cell.a, self.index, self.with_index);
        self.index += 1;
        step
    }
}

impl StateMachine for EachMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        // The machine frame starts with an initial Null result slot.
        cx.push(Value::Null);
        Ok(self.step(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.step(cx))
    }
}

// ---------------------------------------------------------------------------
// map

/// `map`: collects the function's results into a fresh list.
#[derive(Debug)]
pub struct MapMachine {
    result: ListBuilder,
    list: Value,
    function: Value,
    index: i64,
    with_index: bool,
}

impl MapMachine {
    #[must_use]
    pub fn new(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            result: ListBuilder::new(),
            list,
            function,
            index: 0,
            with_index,
        }
    }

    fn next_iteration(&mut self, cx: &mut MachineCx<'_>) -> Step {
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            cx.push(self.result.head);
            return Step::Done;
        };
        self.list = cell.d;
        let step = push_invocation(cx, self.function, cell.a, self.index, self.with_index);
        self.index += 1;
        step
    }
}

impl StateMachine for MapMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.next_iteration(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        let result = cx.pop();
        let boxed = cx.heap.box_value(result);
        self.result.push(cx.heap, boxed);
        Ok(self.next_iteration(cx))
    }
}

// ---------------------------------------------------------------------------
// where

/// `where`: keeps the elements for which the predicate is truthy.
#[derive(Debug)]
pub struct WhereMachine {
    result: ListBuilder,
    list: Value,
    /// The element the pending invocation was given.
    pending: Value,
    function: Value,
    index: i64,
    with_index: bool,
}

impl WhereMachine {
    #[must_use]
    pub fn new(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            result: ListBuilder::new(),
            list,
            pending: Value::Null,
            function,
            index: 0,
            with_index,
        }
    }

    fn next_iteration(&mut self, cx: &mut MachineCx<'_>) -> Step {
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            cx.push(self.result.head);
            return Step::Done;
        };
        self.list = cell.d;
        self.pending = cell.a;
        let step = push_invocation(cx, self.function, cell.a, self.index, self.with_index);
        self.index += 1;
        step
    }
}

impl StateMachine for WhereMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.next_iteration(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        let verdict = cx.pop();
        if verdict.to_bool(cx.heap) {
            let kept = self.pending;
            self.result.push(cx.heap, kept);
        }
        Ok(self.next_iteration(cx))
    }
}

// ---------------------------------------------------------------------------
// any? / all?

/// `any?` and `all?`: short-circuiting boolean scans. `all?` runs as the
/// complement of `any?` — it looks for the first falsy result.
#[derive(Debug)]
pub struct AnyAllMachine {
    list: Value,
    function: Value,
    index: i64,
    with_index: bool,
    /// False for `any?`, true for `all?`.
    complement: bool,
}

impl AnyAllMachine {
    #[must_use]
    pub fn any(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            list,
            function,
            index: 0,
            with_index,
            complement: false,
        }
    }

    #[must_use]
    pub fn all(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            list,
            function,
            index: 0,
            with_index,
            complement: true,
        }
    }

    fn next_iteration(&mut self, cx: &mut MachineCx<'_>) -> Step {
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            // Ran off the end: any? failed, all? held.
            cx.push(Value::Bool(self.complement));
            return Step::Done;
        };
        self.list = cell.d;
        let step = push_invocation(cx, self.function, cell.a, self.index, self.with_index);
        self.index += 1;
        step
    }
}

impl StateMachine for AnyAllMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.next_iteration(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        let verdict = cx.pop().to_bool(cx.heap);
        if verdict != self.complement {
            cx.push(Value::Bool(!self.complement));
            return Ok(Step::Done);
        }
        Ok(self.next_iteration(cx))
    }
}

// ---------------------------------------------------------------------------
// count

/// `count`: counts the elements for which the predicate is truthy.
#[derive(Debug)]
pub struct CountMachine {
    list: Value,
    function: Value,
    index: i64,
    count: i64,
    with_index: bool,
}

impl CountMachine {
    #[must_use]
    pub fn new(list: Value, function: Value, with_index: bool) -> Self {
        Self {
            list,
            function,
            index: 0,
            count: 0,
            with_index,
        }
    }

    fn next_iteration(&mut self, cx: &mut MachineCx<'_>) -> Step {
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            cx.push(Value::Int64(self.count));
            return Step::Done;
        };
        self.list = cell.d;
        let step = push_invocation(cx, self.function, cell.a, self.index, self.with_index);
        self.index += 1;
        step
    }
}

impl StateMachine for CountMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.next_iteration(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        if cx.pop().to_bool(cx.heap) {
            self.count += 1;
        }
        Ok(self.next_iteration(cx))
    }
}

// ---------------------------------------------------------------------------
// first / index-of

/// `first` and `index-of`: finds the first element for which the predicate
/// is truthy, yielding the element or its index. Null when nothing
/// matches.
#[derive(Debug)]
pub struct FirstMachine {
    list: Value,
    /// The element the pending invocation was given.
    pending: Value,
    function: Value,
    index: i64,
    /// False: yield the element (`first`). True: yield the index
    /// (`index-of`).
    want_index: bool,
}

impl FirstMachine {
    #[must_use]
    pub fn first(list: Value, function: Value) -> Self {
        Self {
            list,
            pending: Value::Null,
            function,
            index: 0,
            want_index: false,
        }
    }

    #[must_use]
    pub fn index_of(list: Value, function: Value) -> Self {
        Self {
            list,
            pending: Value::Null,
            function,
            index: 0,
            want_index: true,
        }
    }

    fn next_iteration(&mut self, cx: &mut MachineCx<'_>) -> Step {
        let Some(cell) = cx.heap.as_cons(self.list).copied() else {
            cx.push(Value::Null);
            return Step::Done;
        };
        self.list = cell.d;
        self.pending = cell.a;
        let step = push_invocation(cx, self.function, cell.a, self.index, false);
        self.index += 1;
        step
    }
}

impl StateMachine for FirstMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.next_iteration(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        if cx.pop().to_bool(cx.heap) {
            let result = if self.want_index {
                // The index was advanced past the matching element.
                Value::Int64(self.index - 1)
            } else {
                self.pending
            };
            cx.push(result);
            return Ok(Step::Done);
        }
        Ok(self.next_iteration(cx))
    }
}

// ---------------------------------------------------------------------------
// sort / sort!

/// `sort` and `sort!`: a stable bottom-up merge sort where every element
/// comparison is one user-function invocation.
///
/// The comparator contract is "less-than": truthy means the first argument
/// sorts before the second. Stability comes from always asking whether the
/// *right* head must come first, and preferring the left head otherwise.
#[derive(Debug)]
pub struct SortMachine {
    /// Sorted runs waiting to be merged.
    runs: VecDeque<Vec<Value>>,
    merge: Option<MergeState>,
    function: Value,
    /// The original list; `sort!` rewrites its heads in place.
    original: Value,
    in_place: bool,
}

#[derive(Debug)]
struct MergeState {
    left: Vec<Value>,
    right: Vec<Value>,
    left_at: usize,
    right_at: usize,
    merged: Vec<Value>,
}

impl SortMachine {
    #[must_use]
    pub fn new(original: Value, elements: Vec<Value>, function: Value, in_place: bool) -> Self {
        let runs = elements.into_iter().map(|v| vec![v]).collect();
        Self {
            runs,
            merge: None,
            function,
            original,
            in_place,
        }
    }

    /// Either emits the next comparison call or finishes.
    fn advance(&mut self, cx: &mut MachineCx<'_>) -> Step {
        loop {
            if let Some(merge) = &mut self.merge {
                if merge.left_at >= merge.left.len() {
                    merge.merged.extend_from_slice(&merge.right[merge.right_at..]);
                } else if merge.right_at >= merge.right.len() {
                    merge.merged.extend_from_slice(&merge.left[merge.left_at..]);
                } else {
                    // Ask: must the right head come before the left head?
                    cx.push(self.function);
                    cx.push(merge.right[merge.right_at]);
                    cx.push(merge.left[merge.left_at]);
                    return Step::Call(2);
                }
                let done = self.merge.take().expect("merge state present");
                self.runs.push_back(done.merged);
            }

            if self.runs.len() <= 1 {
                let sorted = self.runs.pop_front().unwrap_or_default();
                let result = self.finish(cx, &sorted);
                cx.push(result);
                return Step::Done;
            }

            let left = self.runs.pop_front().expect("at least two runs");
            let right = self.runs.pop_front().expect("at least two runs");
            let capacity = left.len() + right.len();
            self.merge = Some(MergeState {
                left,
                right,
                left_at: 0,
                right_at: 0,
                merged: Vec::with_capacity(capacity),
            });
        }
    }

    fn finish(&self, cx: &mut MachineCx<'_>, sorted: &[Value]) -> Value {
        if self.in_place {
            let mut current = self.original;
            for &value in sorted {
                let Some(cell) = cx.heap.as_cons_mut(current) else {
                    break;
                };
                cell.a = value;
                current = cell.d;
            }
            self.original
        } else {
            list::from_values(cx.heap, sorted)
        }
    }
}

impl StateMachine for SortMachine {
    fn start(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        Ok(self.advance(cx))
    }

    fn body(&mut self, cx: &mut MachineCx<'_>) -> RunResult<Step> {
        let right_first = cx.pop().to_bool(cx.heap);
        let merge = self.merge.as_mut().expect("comparison result without a merge in progress");
        if right_first {
            merge.merged.push(merge.right[merge.right_at]);
            merge.right_at += 1;
        } else {
            merge.merged.push(merge.left[merge.left_at]);
            merge.left_at += 1;
        }
        Ok(self.advance(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{closure::Closure, list::to_values};

    /// Drives a machine to completion, computing each requested user-call
    /// with a plain Rust closure. This is exactly the contract the VM's
    /// `StateMachStart`/`StateMachBody` opcodes implement.
    fn drive(
        machine: &mut dyn StateMachine,
        heap: &mut Heap,
        mut call: impl FnMut(&mut Heap, &[Value]) -> Value,
    ) -> Value {
        let mut frame = Closure::global(None);
        let mut step = {
            let mut cx = MachineCx { frame: &mut frame, heap };
            machine.start(&mut cx).unwrap()
        };
        loop {
            match step {
                Step::Done => return frame.pop(),
                Step::Call(argc) => {
                    let mut args = vec![Value::Null; argc];
                    for slot in args.iter_mut().rev() {
                        *slot = frame.pop();
                    }
                    let _function = frame.pop();
                    let result = call(heap, &args);
                    frame.push(result);
                    let mut cx = MachineCx { frame: &mut frame, heap };
                    step = machine.body(&mut cx).unwrap();
                }
            }
        }
    }

    fn list_of(heap: &mut Heap, items: &[i64]) -> Value {
        let values: Vec<Value> = items.iter().map(|&i| Value::Int64(i)).collect();
        list::from_values(heap, &values)
    }

    fn as_i64(v: Value) -> i64 {
        match v {
            Value::Int64(i) => i,
            other => panic!("expected Int64, got {other:?}"),
        }
    }

    #[test]
    fn each_returns_the_original_list_and_visits_in_order() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[1, 2, 3]);
        let mut visited = Vec::new();
        let mut machine = EachMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| {
            visited.push(as_i64(args[0]));
            Value::Null
        });
        assert_eq!(result, l);
        assert_eq!(visited, vec![1, 2, 3]);
    }

    #[test]
    fn map_builds_the_mapped_list() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[1, 2, 3]);
        let mut machine = MapMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Int64(as_i64(args[0]) * 2));
        let values: Vec<i64> = to_values(&heap, result).unwrap().into_iter().map(as_i64).collect();
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[test]
    fn map_of_identity_preserves_elements() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[7, 8]);
        let mut machine = MapMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| args[0]);
        let original = to_values(&heap, l).unwrap();
        let mapped = to_values(&heap, result).unwrap();
        assert_eq!(original, mapped);
    }

    #[test]
    fn where_filters() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[1, 2, 3, 4, 5]);
        let mut machine = WhereMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Bool(as_i64(args[0]) % 2 == 0));
        let values: Vec<i64> = to_values(&heap, result).unwrap().into_iter().map(as_i64).collect();
        assert_eq!(values, vec![2, 4]);

        // where with an always-true predicate keeps everything...
        let mut machine = WhereMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, _| Value::Bool(true));
        assert_eq!(to_values(&heap, result).unwrap().len(), 5);

        // ...and with an always-false predicate yields the empty list.
        let mut machine = WhereMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, _| Value::Bool(false));
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn any_and_all_short_circuit() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[1, 2, 3]);

        let mut calls = 0;
        let mut machine = AnyAllMachine::any(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| {
            calls += 1;
            Value::Bool(as_i64(args[0]) == 2)
        });
        assert_eq!(result, Value::Bool(true));
        assert_eq!(calls, 2); // stopped at the first hit

        let mut machine = AnyAllMachine::all(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Bool(as_i64(args[0]) < 3));
        assert_eq!(result, Value::Bool(false));

        let mut machine = AnyAllMachine::all(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, _| Value::Bool(true));
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn count_first_and_index_of() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[10, 15, 20, 25]);

        let mut machine = CountMachine::new(l, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Bool(as_i64(args[0]) >= 20));
        assert_eq!(result, Value::Int64(2));

        let mut machine = FirstMachine::first(l, Value::Null);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Bool(as_i64(args[0]) > 12));
        assert_eq!(result, Value::Int64(15));

        let mut machine = FirstMachine::index_of(l, Value::Null);
        let result = drive(&mut machine, &mut heap, |_, args| Value::Bool(as_i64(args[0]) > 12));
        assert_eq!(result, Value::Int64(1));

        let mut machine = FirstMachine::first(l, Value::Null);
        let result = drive(&mut machine, &mut heap, |_, _| Value::Bool(false));
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn sort_is_stable_and_ordered() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[3, 1, 2, 1, 5, 4]);
        let elements = to_values(&heap, l).unwrap();
        let mut machine = SortMachine::new(l, elements, Value::Null, false);
        let result = drive(&mut machine, &mut heap, |_, args| {
            Value::Bool(as_i64(args[0]) < as_i64(args[1]))
        });
        let values: Vec<i64> = to_values(&heap, result).unwrap().into_iter().map(as_i64).collect();
        assert_eq!(values, vec![1, 1, 2, 3, 4, 5]);
        // sort is non-destructive
        let original: Vec<i64> = to_values(&heap, l).unwrap().into_iter().map(as_i64).collect();
        assert_eq!(original, vec![3, 1, 2, 1, 5, 4]);
    }

    #[test]
    fn sort_in_place_rewrites_the_original_spine() {
        let mut heap = Heap::new();
        let l = list_of(&mut heap, &[3, 1, 2]);
        let elements = to_values(&heap, l).unwrap();
        let mut machine = SortMachine::new(l, elements, Value::Null, true);
        let result = drive(&mut machine, &mut heap, |_, args| {
            Value::Bool(as_i64(args[0]) < as_i64(args[1]))
        });
        assert_eq!(result, l);
        let values: Vec<i64> = to_values(&heap, l).unwrap().into_iter().map(as_i64).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
