//! Version chain lifecycle, conflict surfacing, and garbage collection.

mod fixtures;

use tactical::{StoreError, Value, Version};

use crate::fixtures::{ctx, key, mutation_record_keys, store, val};

#[test]
fn push_then_fetch_serves_the_initial() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();

    let record = store.fetch(&k).unwrap().unwrap();
    assert_eq!(record.version, Version::initial_of("foobase"));
    assert_eq!(record.value, val("foo"));
    assert_eq!(record.context, Value::empty_object());
}

#[test]
fn commit_layers_a_local_mutation_on_the_head() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();
    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("foobaz"),
            ctx("footime"),
        )
        .unwrap();

    let record = store.fetch(&k).unwrap().unwrap();
    assert_eq!(record.version.base, "foobase");
    assert!(record.version.sub > 0);
    assert_eq!(record.value, val("foobaz"));
    assert_eq!(record.context, ctx("footime"));
}

#[test]
fn push_over_pending_mutation_emits_one_outdated_event() {
    let (store, _kv) = store();
    let k = key("k");
    let events = store.outdated().unwrap();

    store.push(&k, "foobase", val("foo"), None).unwrap();
    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("foobaz"),
            ctx("footime"),
        )
        .unwrap();
    store.push(&k, "barbase", val("bar"), None).unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.key, k);
    assert_eq!(event.initial.value, val("foo"));
    assert_eq!(event.mutation.value, val("foobaz"));
    assert_eq!(event.current.value, val("bar"));
    assert!(events.try_recv().is_err(), "exactly one event expected");
}

#[test]
fn resolved_push_collects_the_mutation_and_its_initial() {
    let (store, _kv) = store();
    let k = key("k");
    let pending = store.pending().unwrap();
    let outdated = store.outdated().unwrap();

    store.push(&k, "foobase", val("foo"), None).unwrap();
    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("foobaz"),
            ctx("footime"),
        )
        .unwrap();
    let mv = pending.try_recv().unwrap().mutation.version;

    store.push(&k, "barbase", val("bar"), Some(&mv)).unwrap();

    assert!(outdated.try_recv().is_err());
    assert_eq!(store.fetch_version(&k, &mv).unwrap(), None);
    assert_eq!(
        store
            .fetch_version(&k, &Version::initial_of("foobase"))
            .unwrap(),
        None
    );
    assert_eq!(store.fetch(&k).unwrap().unwrap().value, val("bar"));
}

#[test]
fn commit_against_non_current_target_fails_without_effect() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();

    let err = store
        .commit(
            &k,
            &Version::initial_of("notbase"),
            val("x"),
            Value::empty_object(),
        )
        .unwrap_err();
    match err {
        StoreError::OutdatedTargetVersion {
            key: err_key,
            current,
            target,
            mutation,
            ..
        } => {
            assert_eq!(err_key, k);
            assert_eq!(current, Version::initial_of("foobase"));
            assert_eq!(target, Version::initial_of("notbase"));
            assert_eq!(mutation, val("x"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let record = store.fetch(&k).unwrap().unwrap();
    assert_eq!(record.version, Version::initial_of("foobase"));
    assert_eq!(record.value, val("foo"));
}

#[test]
fn abandon_of_outdated_mutation_removes_both_records() {
    let (store, _kv) = store();
    let k = key("k");
    let events = store.outdated().unwrap();

    store.push(&k, "foobase", val("foo"), None).unwrap();
    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("foobaz"),
            ctx("footime"),
        )
        .unwrap();
    store.push(&k, "barbase", val("bar"), None).unwrap();
    let mutation = events.try_recv().unwrap().mutation.version;

    store.abandon(&k, &mutation).unwrap();

    assert_eq!(store.fetch_version(&k, &mutation).unwrap(), None);
    assert_eq!(
        store
            .fetch_version(&k, &Version::initial_of("foobase"))
            .unwrap(),
        None
    );
    assert!(store.state(&k).unwrap().unwrap().outdated.is_empty());
}

#[test]
fn abandon_of_current_is_the_inverse_of_commit() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();
    let after_push = store.fetch(&k).unwrap().unwrap();

    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("bar"),
            ctx("later"),
        )
        .unwrap();
    let pending = store.fetch(&k).unwrap().unwrap().version;
    store.abandon(&k, &pending).unwrap();

    let restored = store.fetch(&k).unwrap().unwrap();
    assert_eq!(restored, after_push);
    assert_eq!(restored.value, val("foo"));
    assert_eq!(restored.context, Value::empty_object());
}

#[test]
fn abandon_with_initial_target_fails_without_effect() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();

    let err = store
        .abandon(&k, &Version::initial_of("foobase"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidInitialTargetVersion { .. }
    ));
    assert_eq!(
        store.fetch(&k).unwrap().unwrap().version,
        Version::initial_of("foobase")
    );
}

#[test]
fn abandon_on_unknown_chain_is_key_not_found() {
    let (store, _kv) = store();
    let err = store
        .abandon(&key("ghost"), &Version {
            base: "b".to_string(),
            sub: 9,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound { .. }));
}

#[test]
fn at_most_one_pending_record_per_chain() {
    let (store, kv) = store();
    let k = key("k");

    store.push(&k, "b", val("0"), None).unwrap();
    for i in 1..=3 {
        let head = store.fetch(&k).unwrap().unwrap().version;
        store
            .commit(&k, &head, val(&i.to_string()), Value::empty_object())
            .unwrap();
        assert_eq!(mutation_record_keys(&kv).len(), 1, "after commit {i}");
    }
    assert_eq!(store.fetch(&k).unwrap().unwrap().value, val("3"));
}

#[test]
fn pending_head_always_has_its_initial_on_disk() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "b1", val("one"), None).unwrap();
    store
        .commit(&k, &Version::initial_of("b1"), val("m1"), Value::empty_object())
        .unwrap();
    store.push(&k, "b2", val("two"), None).unwrap();
    let head = store.fetch(&k).unwrap().unwrap().version;
    store
        .commit(&k, &head, val("m2"), Value::empty_object())
        .unwrap();

    // after every operation above the invariant held; check the final shape
    let state = store.state(&k).unwrap().unwrap();
    assert!(state.current.sub > 0);
    assert!(
        store
            .fetch_version(&k, &state.current)
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .fetch_version(&k, &state.current.initial())
            .unwrap()
            .is_some()
    );
    for outdated in &state.outdated {
        assert!(store.fetch_version(&k, outdated).unwrap().is_some());
        assert!(
            store
                .fetch_version(&k, &outdated.initial())
                .unwrap()
                .is_some()
        );
    }
}

#[test]
fn fetch_is_idempotent() {
    let (store, _kv) = store();
    let k = key("k");
    store.push(&k, "foobase", val("foo"), None).unwrap();

    let first = store.fetch(&k).unwrap();
    let second = store.fetch(&k).unwrap();
    assert_eq!(first, second);
}

#[test]
fn event_streams_have_no_history() {
    let (store, _kv) = store();
    let k = key("k");

    store.push(&k, "foobase", val("foo"), None).unwrap();
    store
        .commit(
            &k,
            &Version::initial_of("foobase"),
            val("foobaz"),
            Value::empty_object(),
        )
        .unwrap();
    store.push(&k, "barbase", val("bar"), None).unwrap();

    // both emissions happened before these subscriptions
    let outdated = store.outdated().unwrap();
    let pending = store.pending().unwrap();
    assert!(outdated.try_recv().is_err());
    assert!(pending.try_recv().is_err());
}

#[test]
fn outdated_mutations_accumulate_in_order() {
    let (store, _kv) = store();
    let k = key("k");
    let events = store.outdated().unwrap();

    store.push(&k, "b1", val("one"), None).unwrap();
    store
        .commit(&k, &Version::initial_of("b1"), val("m1"), Value::empty_object())
        .unwrap();
    store.push(&k, "b2", val("two"), None).unwrap();
    store
        .commit(&k, &Version::initial_of("b2"), val("m2"), Value::empty_object())
        .unwrap();
    store.push(&k, "b3", val("three"), None).unwrap();

    let first = events.try_recv().unwrap().mutation.version;
    let second = events.try_recv().unwrap().mutation.version;
    assert_eq!(first.base, "b1");
    assert_eq!(second.base, "b2");

    let state = store.state(&k).unwrap().unwrap();
    assert_eq!(state.outdated, vec![first, second]);
    assert_eq!(state.current, Version::initial_of("b3"));
}
