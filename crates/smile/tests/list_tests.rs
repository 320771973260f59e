//! Cons-list engine tests over the public API.

use pretty_assertions::assert_eq;
use smile::{Env, Value, list};

fn list_of(env: &mut Env, items: &[i64]) -> Value {
    let values: Vec<Value> = items.iter().map(|&i| Value::Int64(i)).collect();
    list::from_values(&mut env.heap, &values)
}

fn make_cycle(env: &mut Env) -> Value {
    let a = list_of(env, &[1, 2, 3]);
    let last = list::tail(&env.heap, a);
    if let Some(cell) = env.heap.as_cons_mut(last) {
        cell.d = a;
    }
    a
}

#[test]
fn cycle_detection_and_safe_length() {
    let mut env = Env::new();
    let finite = list_of(&mut env, &[1, 2, 3]);
    assert_eq!(list::safe_length(&env.heap, finite), 3);
    assert!(!list::has_cycle(&env.heap, finite));

    let cyclic = make_cycle(&mut env);
    assert!(list::safe_length(&env.heap, cyclic) < 0);
    assert!(list::has_cycle(&env.heap, cyclic));
    assert!(!list::is_well_formed(&env.heap, cyclic));
    assert!(list::length(&env.heap, cyclic).is_err());
    assert!(list::clone_spine(&mut env.heap, cyclic).is_err());
}

#[test]
fn append_length_adds() {
    let mut env = Env::new();
    let a = list_of(&mut env, &[1, 2, 3]);
    let b = list_of(&mut env, &[4, 5]);
    let joined = list::combine(&mut env.heap, &[a, b]).unwrap();
    assert_eq!(
        list::safe_length(&env.heap, joined),
        list::safe_length(&env.heap, a) + list::safe_length(&env.heap, b)
    );
}

#[test]
fn reverse_reverse_is_identity() {
    let mut env = Env::new();
    let a = list_of(&mut env, &[1, 2, 3, 4]);
    let rr = {
        let r = list::reverse(&mut env.heap, a).unwrap();
        list::reverse(&mut env.heap, r).unwrap()
    };
    assert_eq!(
        list::to_values(&env.heap, rr).unwrap(),
        list::to_values(&env.heap, a).unwrap()
    );
}

#[test]
fn malformed_lists_report_their_shape() {
    let mut env = Env::new();
    let pair = list::cons(&mut env.heap, Value::Int64(1), Value::Int64(2));
    assert!(matches!(list::shape(&env.heap, pair), list::ListShape::Malformed(1)));
    assert!(!list::is_well_formed(&env.heap, pair));
    // Out-of-shape composed accessors return Null, never raise.
    assert_eq!(list::cadr(&env.heap, pair), Value::Null);
    assert_eq!(list::caar(&env.heap, pair), Value::Null);
}

#[test]
fn spine_clone_shares_heads_but_not_cells() {
    let mut env = Env::new();
    let a = list_of(&mut env, &[1, 2, 3]);
    let cloned = list::clone_spine(&mut env.heap, a).unwrap();
    assert_ne!(a, cloned);
    assert_eq!(
        list::to_values(&env.heap, a).unwrap(),
        list::to_values(&env.heap, cloned).unwrap()
    );
    // Mutating the clone's spine leaves the original alone.
    let appended = list::append_in_place(&mut env.heap, cloned, &[Value::Int64(4)]).unwrap();
    assert_eq!(list::safe_length(&env.heap, appended), 4);
    assert_eq!(list::safe_length(&env.heap, a), 3);
}
