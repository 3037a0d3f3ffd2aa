use super::*;
use std::sync::Arc;
use crate::symbol::Symbols;

// ========== TERMS ==========

#[test]
fn record_keeps_last_value_for_repeated_key() {
    let symbols = Symbols::new();
    let k = symbols.intern("k");
    match Term::record([(k, Term::Int(1)), (k, Term::Int(2))]) {
        Term::Record(record) => {
            assert_eq!(record.fields.len(), 1);
            assert_eq!(record.get(k), Some(&Term::Int(2)));
        }
        other => panic!("expected a record, got {:?}", other),
    }
}

#[test]
fn names_are_collected_once_in_order() {
    let symbols = Symbols::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let term = Term::array_rest(
        [Term::Name(b), Term::array([Term::Name(a), Term::Name(b)])],
        Term::Name(a),
    );
    let mut out = SmallVec::new();
    term.names(&mut out);
    assert_eq!(out.as_slice(), &[b, a]);
}

#[test]
fn numbers_compare_across_kinds() {
    assert!(same_primitive(&Term::Int(3), &Term::Float(3.0)));
    assert!(same_primitive(&Term::Float(3.0), &Term::Int(3)));
    assert!(!same_primitive(&Term::Int(3), &Term::str("3")));
    assert!(!same_primitive(&Term::Bool(true), &Term::Int(1)));
}

#[test]
fn numbers_compare_exactly_beyond_float_precision() {
    let two_53 = 9_007_199_254_740_992i64;
    assert!(!same_primitive(&Term::Int(two_53 + 1), &Term::Float(two_53 as f64)));
    assert!(same_primitive(&Term::Int(two_53), &Term::Float(two_53 as f64)));
    assert!(!same_primitive(&Term::Int(0), &Term::Float(0.5)));
    assert!(!same_primitive(&Term::Int(i64::MAX), &Term::Float(9.223_372_036_854_775_807e18)));
    assert!(same_primitive(&Term::Int(i64::MIN), &Term::Float(i64::MIN as f64)));
    assert!(!same_primitive(&Term::Int(0), &Term::Float(f64::NAN)));
}

fn array_of(term: Term) -> Arc<ArrayTerm> {
    match term {
        Term::Array(array) => array,
        other => panic!("expected an array, got {:?}", other),
    }
}

#[test]
fn suffix_shares_rest_when_prefix_is_consumed() {
    let open = array_of(Term::array_rest([Term::Int(1)], Term::Wild));
    assert_eq!(open.suffix(1), Term::Wild);
    let closed = array_of(Term::array([Term::Int(1)]));
    assert_eq!(closed.suffix(1), Term::array([]));
    let longer = array_of(Term::array_rest([Term::Int(1), Term::Int(2)], Term::Wild));
    assert_eq!(longer.suffix(1), Term::array_rest([Term::Int(2)], Term::Wild));
    assert!(same_container(&longer.suffix(0), &Term::Array(Arc::clone(&longer))));
}

#[test]
fn suffix_is_a_view_on_the_same_elements() {
    let whole = array_of(Term::array((0..1_000).map(Term::Int)));
    let mut view = Arc::clone(&whole);
    for step in 1..1_000 {
        view = array_of(view.suffix(1));
        assert_eq!(view.len(), 1_000 - step);
        assert!(Arc::ptr_eq(&view.elements, &whole.elements));
    }
    assert_eq!(view.items(), &[Term::Int(999)]);
    assert!(array_of(view.suffix(5)).is_empty());
}

#[test]
fn containers_compare_by_pointer() {
    let shared = Term::array([Term::Int(1)]);
    let copy = Term::array([Term::Int(1)]);
    assert!(same_container(&shared, &shared.clone()));
    assert!(!same_container(&shared, &copy));
}

// ========== VALUES ==========

#[test]
fn value_display() {
    let value = Value::Record(vec![
        ("xs".to_string(), Value::Array(vec![Value::Int(1), Value::Int(2)])),
        ("tail".to_string(), Value::Partial(vec![Value::Atom("a".to_string())])),
        ("s".to_string(), Value::from("hi")),
        ("hole".to_string(), Value::Null),
    ]);
    assert_eq!(
        value.to_string(),
        r#"{xs: [1, 2], tail: [a, ..._], s: "hi", hole: _}"#
    );
}

#[test]
fn value_to_json() {
    let value = Value::Record(vec![
        ("n".to_string(), Value::from(5)),
        ("ok".to_string(), Value::Bool(true)),
        ("none".to_string(), Value::Null),
    ]);
    assert_eq!(
        value.to_json(),
        serde_json::json!({ "n": 5, "ok": true, "none": null })
    );
}

#[test]
fn closed_arrays_serialize_as_sequences() {
    let value = Value::Array(vec![Value::Int(1), Value::Str("a".to_string())]);
    assert_eq!(serde_json::to_string(&value).unwrap(), r#"[1,"a"]"#);
}

#[test]
fn records_serialize_as_objects() {
    let value = Value::Record(vec![("k".to_string(), Value::Int(1))]);
    assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"k":1}"#);
    assert_eq!(serde_json::to_value(&value).unwrap(), value.to_json());
}

#[test]
fn open_arrays_serialize_apart_from_closed_ones() {
    let closed = Value::Array(vec![Value::Int(1)]);
    let partial = Value::Partial(vec![Value::Int(1)]);
    let tail = Value::Tail(vec![Value::Int(1)], Box::new(Value::Int(5)));
    assert_ne!(closed.to_json(), partial.to_json());
    assert_eq!(
        partial.to_json(),
        serde_json::json!({ "items": [1], "rest": null })
    );
    assert_eq!(
        tail.to_json(),
        serde_json::json!({ "items": [1], "rest": 5 })
    );
}

#[test]
fn improper_tail_display() {
    let value = Value::Tail(vec![Value::Int(1)], Box::new(Value::Int(5)));
    assert_eq!(value.to_string(), "[1, ...5]");
}

#[test]
fn value_accessors() {
    assert_eq!(Value::Int(4).as_int(), Some(4));
    assert_eq!(Value::Bool(true).as_int(), None);
    assert!(Value::Null.is_null());
}
