//! End-to-end tests of the store write/read paths: the builder emits a
//! complete file and the facade reads it back.

use castor_common::term::{XSD_DECIMAL, XSD_INTEGER};
use castor_common::{Category, Triple, TripleOrder, Value};
use castor_core::store::builder::StoreBuilder;
use castor_core::Store;

fn uri(s: &str) -> Value {
    Value::uri(s)
}

fn int(s: &str) -> Value {
    Value::typed(s, XSD_INTEGER)
}

fn fixture() -> (tempfile::TempDir, std::sync::Arc<Store>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.castor");

    let mut builder = StoreBuilder::new();
    let a = || uri("http://example.org/a");
    let b = || uri("http://example.org/b");
    let p = || uri("http://example.org/p");
    let q = || uri("http://example.org/q");
    builder.add(a(), p(), int("1"));
    builder.add(a(), p(), int("2"));
    builder.add(a(), p(), int("3"));
    builder.add(b(), p(), int("5"));
    builder.add(b(), q(), Value::simple_literal("hello"));
    builder.add(b(), q(), Value::typed("05", XSD_INTEGER));
    builder.add(b(), q(), Value::typed("5.0", XSD_DECIMAL));
    builder.add(a(), q(), Value::plain_lang("chat", "fr"));
    builder.write(&path).unwrap();

    let store = Store::open(&path).unwrap();
    (dir, store)
}

fn resolved(store: &Store, mut v: Value) -> u32 {
    store.resolve(&mut v);
    v.id
}

#[test]
fn test_counts_and_resolution() {
    let (_dir, store) = fixture();
    assert_eq!(store.triples_total(), 8);
    assert!(store.values_count() >= 11);

    let ida = resolved(&store, uri("http://example.org/a"));
    assert!(ida > 0);
    assert_eq!(store.category(ida), Category::Uri);

    // round trip through the dictionary
    let mut val = store.lookup_value(ida);
    store.ensure_direct_strings(&mut val);
    assert_eq!(val.lexical.text(), "http://example.org/a");

    // unknown terms resolve to the absent id
    assert_eq!(resolved(&store, uri("http://example.org/nope")), 0);
    assert_eq!(resolved(&store, Value::simple_literal("absent")), 0);

    // the raw triple table is sorted subject-major
    let mut prev = store.triple_at(0);
    for i in 1..store.triples_total() {
        let t = store.triple_at(i);
        assert!(prev < t);
        prev = t;
    }
}

#[test]
fn test_id_order_matches_value_order_for_integers() {
    let (_dir, store) = fixture();
    let i1 = resolved(&store, int("1"));
    let i2 = resolved(&store, int("2"));
    let i3 = resolved(&store, int("3"));
    let i5 = resolved(&store, int("5"));
    assert!(i1 < i2 && i2 < i3 && i3 < i5);
    let num = store.range(Category::Numeric);
    for id in [i1, i2, i3, i5] {
        assert!(num.contains(id));
    }
}

#[test]
fn test_eq_class_groups_equal_numerics() {
    let (_dir, store) = fixture();
    let i5 = resolved(&store, int("5"));
    let i05 = resolved(&store, int("05"));
    let d5 = resolved(&store, Value::typed("5.0", XSD_DECIMAL));
    assert!(i5 > 0 && i05 > 0 && d5 > 0);
    assert_ne!(i5, i05);

    let class = store.eq_class(i5);
    assert!(class.contains(i05));
    assert!(class.contains(d5));
    assert_eq!(class.to - class.from + 1, 3);
    assert_eq!(store.eq_class(i05), class);
    assert_eq!(store.eq_class(d5), class);

    // unequal values live in different classes
    let i1 = resolved(&store, int("1"));
    assert!(!class.contains(i1));
    assert_eq!(store.eq_class(i1).from, store.eq_class(i1).to);
}

#[test]
fn test_eq_class_outside_window_is_singleton() {
    let (_dir, store) = fixture();
    let ida = resolved(&store, uri("http://example.org/a"));
    let class = store.eq_class(ida);
    assert_eq!((class.from, class.to), (ida, ida));
}

#[test]
fn test_eq_class_of_absent_value_brackets_insertion_point() {
    let (_dir, store) = fixture();
    let mut four = int("4");
    four.interpret();
    let class = store.eq_class_of(&four);
    assert!(class.is_empty());
    // everything below the insertion point is < 4, everything at or
    // above is > 4
    let i3 = resolved(&store, int("3"));
    let i5 = resolved(&store, int("5"));
    assert!(i3 < class.from);
    assert!(i5 >= class.from);
}

#[test]
fn test_triples_count_by_boundness() {
    let (_dir, store) = fixture();
    let a = resolved(&store, uri("http://example.org/a"));
    let b = resolved(&store, uri("http://example.org/b"));
    let p = resolved(&store, uri("http://example.org/p"));
    let i1 = resolved(&store, int("1"));

    assert_eq!(store.triples_count(Triple::new(0, 0, 0)), 8);
    assert_eq!(store.triples_count(Triple::new(a, p, 0)), 3);
    assert_eq!(store.triples_count(Triple::new(a, 0, 0)), 4);
    assert_eq!(store.triples_count(Triple::new(0, p, 0)), 4);
    assert_eq!(store.triples_count(Triple::new(0, 0, i1)), 1);
    assert_eq!(store.triples_count(Triple::new(a, p, i1)), 1);
    assert_eq!(store.triples_count(Triple::new(b, p, i1)), 0);
}

#[test]
fn test_triple_range_forward() {
    let (_dir, store) = fixture();
    let a = resolved(&store, uri("http://example.org/a"));
    let p = resolved(&store, uri("http://example.org/p"));
    let num = store.range(Category::Numeric);

    let mut q = store.triple_range(
        Triple::new(a, p, num.from),
        Triple::new(a, p, num.to),
        None,
    );
    let mut objects = Vec::new();
    while let Some(t) = q.next() {
        assert_eq!(t[0], a);
        assert_eq!(t[1], p);
        objects.push(t[2]);
    }
    assert_eq!(objects.len(), 3);
    assert!(objects.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_triple_range_backward() {
    let (_dir, store) = fixture();
    let a = resolved(&store, uri("http://example.org/a"));
    let p = resolved(&store, uri("http://example.org/p"));
    let num = store.range(Category::Numeric);

    let mut q = store.triple_range(
        Triple::new(a, p, num.to),
        Triple::new(a, p, num.from),
        None,
    );
    let mut objects = Vec::new();
    while let Some(t) = q.next() {
        objects.push(t[2]);
    }
    assert_eq!(objects.len(), 3);
    assert!(objects.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn test_triple_range_explicit_order_spo() {
    let (_dir, store) = fixture();
    let b = resolved(&store, uri("http://example.org/b"));
    let mut q = store.triple_range(
        Triple::new(b, 1, 1),
        Triple::new(b, store.values_count(), store.values_count()),
        Some(TripleOrder::Spo),
    );
    let mut n = 0;
    while let Some(t) = q.next() {
        assert_eq!(t[0], b);
        n += 1;
    }
    assert_eq!(n, 4);
}

#[test]
fn test_empty_range_yields_nothing() {
    let (_dir, store) = fixture();
    let a = resolved(&store, uri("http://example.org/a"));
    let q_pred = resolved(&store, uri("http://example.org/q"));
    let lit = resolved(&store, Value::simple_literal("hello"));
    // (a, q, "hello") is not a triple of the store
    let mut q = store.triple_range(
        Triple::new(a, q_pred, lit),
        Triple::new(a, q_pred, lit),
        None,
    );
    assert!(q.next().is_none());
}

#[test]
fn test_bad_magic_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.castor");
    std::fs::write(&path, vec![0u8; 16384]).unwrap();
    assert!(matches!(
        Store::open(&path),
        Err(castor_common::Error::BadMagic)
    ));
}
