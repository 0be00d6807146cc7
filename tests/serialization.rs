//! Canonical key encoding: determinism and injectivity.

use tactical::{ChainKey, Value, Version, to_canon_string};

fn value_of(json: serde_json::Value) -> Value {
    Value::from(json)
}

#[test]
fn field_order_never_changes_the_serial() {
    let a = value_of(serde_json::json!({"foo": "bar", "baz": "qux"}));
    let b = value_of(serde_json::json!({"baz": "qux", "foo": "bar"}));

    let serial_a = to_canon_string(&a).unwrap();
    let serial_b = to_canon_string(&b).unwrap();
    assert_eq!(serial_a, serial_b);
    assert_eq!(serial_a, r#"{"baz":"qux","foo":"bar"}"#);
}

#[test]
fn chain_keys_compare_by_canonical_form() {
    let a = ChainKey::new(value_of(serde_json::json!({"id": 1, "shard": "x"}))).unwrap();
    let b = ChainKey::new(value_of(serde_json::json!({"shard": "x", "id": 1}))).unwrap();
    assert_eq!(a, b);

    let c = ChainKey::new(value_of(serde_json::json!({"id": 2, "shard": "x"}))).unwrap();
    assert_ne!(a, c);
}

#[test]
fn scalars_use_json_literal_forms() {
    assert_eq!(to_canon_string(&Value::Null).unwrap(), "null");
    assert_eq!(to_canon_string(&Value::Bool(true)).unwrap(), "true");
    assert_eq!(to_canon_string(&Value::Num(3.0)).unwrap(), "3");
    assert_eq!(to_canon_string(&Value::Num(1.25)).unwrap(), "1.25");
    assert_eq!(
        to_canon_string(&Value::Str("plain".into())).unwrap(),
        r#""plain""#
    );
}

#[test]
fn null_elements_are_kept_and_absent_fields_are_omitted() {
    let v = value_of(serde_json::json!({"items": [1, null, 2]}));
    assert_eq!(to_canon_string(&v).unwrap(), r#"{"items":[1,null,2]}"#);

    // Absence is structural: a map without the field serializes without it.
    let with_field = value_of(serde_json::json!({"a": 1, "b": null}));
    let without_field = value_of(serde_json::json!({"a": 1}));
    assert_ne!(
        to_canon_string(&with_field).unwrap(),
        to_canon_string(&without_field).unwrap()
    );
    assert_eq!(to_canon_string(&without_field).unwrap(), r#"{"a":1}"#);
}

#[test]
fn nested_structures_serialize_deterministically() {
    let a = value_of(serde_json::json!({
        "outer": {"z": [{"b": 1, "a": 2}], "a": true},
        "list": ["x", {"n": 0.5}]
    }));
    let b = value_of(serde_json::json!({
        "list": ["x", {"n": 0.5}],
        "outer": {"a": true, "z": [{"a": 2, "b": 1}]}
    }));
    assert_eq!(to_canon_string(&a).unwrap(), to_canon_string(&b).unwrap());
}

#[test]
fn record_keys_concatenate_chain_and_version_serials() {
    let key = ChainKey::new(value_of(serde_json::json!({"key": "k"}))).unwrap();
    let version = Version::initial_of("foobase");

    assert_eq!(key.serial(), r#"{"key":"k"}"#);
    assert_eq!(version.serial(), r#"{"base":"foobase","sub":0}"#);
    assert_eq!(
        key.record_serial(&version),
        r#"{"key":"k"}{"base":"foobase","sub":0}"#
    );
}

#[test]
fn non_finite_numbers_are_unsupported() {
    let err = to_canon_string(&Value::Num(f64::NAN)).unwrap_err();
    assert!(matches!(err, tactical::CanonError::UnsupportedType { .. }));

    let err = ChainKey::new(Value::Array(vec![Value::Num(f64::NEG_INFINITY)])).unwrap_err();
    assert!(matches!(err, tactical::CanonError::UnsupportedType { .. }));
}

#[test]
fn distinct_keys_never_share_a_serial() {
    let keys = [
        serde_json::json!({"key": "k"}),
        serde_json::json!({"key": "k2"}),
        serde_json::json!({"key": "k", "extra": 0}),
        serde_json::json!(["key", "k"]),
        serde_json::json!("key"),
    ];
    let serials: Vec<String> = keys
        .iter()
        .map(|json| {
            ChainKey::new(value_of(json.clone()))
                .unwrap()
                .serial()
                .to_string()
        })
        .collect();
    for (i, a) in serials.iter().enumerate() {
        for b in serials.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}
