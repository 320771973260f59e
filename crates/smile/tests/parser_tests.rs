//! Parser acceptance tests over the public API.

use pretty_assertions::assert_eq;
use smile::{Env, parse_source};

fn repr_of(source: &str) -> String {
    let mut env = Env::new();
    let parsed = parse_source(&mut env, source).expect("parse succeeds");
    parsed.repr(&env.heap, &env.symbols)
}

#[test]
fn if_else_builds_the_expected_tree() {
    assert_eq!(repr_of("if 1 < 2 then 10 else 20"), "[$if [[1.<] 2] 10 20]");
}

#[test]
fn do_until_builds_the_expected_tree() {
    assert_eq!(
        repr_of("do x += 1 until x == 10"),
        "[$while [[x.+=] 1] [$not [[x.==] 10]] null]"
    );
}

#[test]
fn method_calls_chain_through_dots_and_binary_names() {
    assert_eq!(repr_of("list.map"), "[list.map]");
    assert_eq!(repr_of("(a.b).c"), "[[a.b].c]");
    // The binary-operator rule is the method-call sugar: `list map f`
    // invokes the list's `map` with one argument.
    assert_eq!(repr_of("list map f"), "[[list.map] f]");
}

#[test]
fn every_node_carries_a_source_position() {
    let mut env = Env::new();
    let parsed = parse_source(&mut env, "if x then\n  y\nelse z").expect("parse succeeds");
    // Walk the whole tree; every cons cell must have a nonzero line.
    fn walk(env: &Env, value: smile::Value, seen: &mut usize) {
        if let Some(cell) = env.heap.as_cons(value) {
            assert!(cell.pos.line > 0, "cell with unknown position");
            *seen += 1;
            let (a, d) = (cell.a, cell.d);
            walk(env, a, seen);
            walk(env, d, seen);
        }
    }
    let mut seen = 0;
    walk(&env, parsed, &mut seen);
    assert!(seen >= 4);
}

#[test]
fn parse_errors_accumulate_and_report_positions() {
    let mut env = Env::new();
    let result = parse_source(&mut env, "if then 1");
    // `if` with a missing condition recovers at `then` and reports.
    let messages = result.err().expect("parse reports errors");
    assert!(!messages.is_empty());
    assert!(messages.iter().all(|m| m.position.line >= 1));
}

#[test]
fn recovery_continues_past_a_broken_statement() {
    let mut env = Env::new();
    let result = parse_source(&mut env, "x = )\ny = 2");
    assert!(result.is_err());
    // The second statement still interned its symbols, which shows the
    // parser got past the first error.
    assert!(env.symbols.lookup("y").is_some());
}

#[test]
fn try_catch_requires_a_function_literal_handler() {
    let mut env = Env::new();
    assert!(parse_source(&mut env, "try foo catch 42").is_err());
    let mut env = Env::new();
    assert!(parse_source(&mut env, "try foo catch |e| e").is_ok());
}

#[test]
fn nested_structures() {
    assert_eq!(repr_of("{ x = 1; y = 2 }"), "[$scope null [$set x 1] [$set y 2]]");
    assert_eq!(repr_of("[1 2 3]"), "[1 2 3]");
    assert_eq!(repr_of("f = |a b| a + b"), "[$set f [$fn [a b] [[a.+] b]]]");
}
