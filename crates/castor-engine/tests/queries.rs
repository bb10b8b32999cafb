//! End-to-end query tests over a freshly built store.

use std::sync::Arc;

use castor_common::term::XSD_INTEGER;
use castor_common::Value;
use castor_core::store::builder::StoreBuilder;
use castor_core::Store;
use castor_engine::Query;

const EX: &str = "http://example.org/";

fn uri(local: &str) -> Value {
    Value::uri(format!("{EX}{local}"))
}

fn int(lex: &str) -> Value {
    Value::typed(lex, XSD_INTEGER)
}

/// Build a store from `(subject, predicate, object)` triples.
fn store_with(triples: &[(Value, Value, Value)]) -> (tempfile::TempDir, Arc<Store>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q.castor");
    let mut builder = StoreBuilder::new();
    for (s, p, o) in triples {
        builder.add(s.clone(), p.clone(), o.clone());
    }
    builder.write(&path).unwrap();
    (dir, Store::open(&path).unwrap())
}

/// Collect all solutions as rows of requested-variable lexicals
/// (`None` = unbound).
fn rows(store: &Arc<Store>, text: &str) -> Vec<Vec<Option<String>>> {
    let mut q = Query::new(store, text).unwrap();
    let mut out = Vec::new();
    while q.next() {
        let row = (0..q.requested())
            .map(|i| q.value(i).map(|v| v.lexical.text().to_string()))
            .collect();
        out.push(row);
    }
    out
}

#[test]
fn test_s1_single_exact_triple() {
    let (_d, store) = store_with(&[(uri("s1"), uri("p"), uri("o1"))]);
    let got = rows(&store, &format!("SELECT ?x WHERE {{ ?x <{EX}p> <{EX}o1> }}"));
    assert_eq!(got, vec![vec![Some(format!("{EX}s1"))]]);

    let mut q = Query::new(&store, &format!("SELECT ?x WHERE {{ ?x <{EX}p> <{EX}o1> }}")).unwrap();
    assert_eq!(q.count(), 1);
}

#[test]
fn test_s2_absent_constant_yields_empty() {
    let (_d, store) = store_with(&[(uri("s1"), uri("p"), uri("o1"))]);
    let got = rows(&store, &format!("SELECT ?x WHERE {{ ?x <{EX}q> <{EX}o1> }}"));
    assert!(got.is_empty());
}

#[test]
fn test_s3_distinct_join() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), uri("o3")),
        (uri("s1"), uri("p"), uri("o4")),
        (uri("s5"), uri("p"), uri("o3")),
    ]);
    let mut got = rows(
        &store,
        &format!("SELECT DISTINCT ?s WHERE {{ ?s <{EX}p> ?o }}"),
    );
    got.sort();
    assert_eq!(
        got,
        vec![
            vec![Some(format!("{EX}s1"))],
            vec![Some(format!("{EX}s5"))],
        ]
    );
}

#[test]
fn test_s4_optional_without_match() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), uri("o3")),
        (uri("other"), uri("q"), uri("o4")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?s ?o WHERE {{ ?s <{EX}p> <{EX}o3> . OPTIONAL {{ ?s <{EX}q> ?o }} }}"
        ),
    );
    assert_eq!(got, vec![vec![Some(format!("{EX}s1")), None]]);
}

#[test]
fn test_s4b_optional_with_match() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), uri("o3")),
        (uri("s1"), uri("q"), uri("o4")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?s ?o WHERE {{ ?s <{EX}p> <{EX}o3> . OPTIONAL {{ ?s <{EX}q> ?o }} }}"
        ),
    );
    assert_eq!(
        got,
        vec![vec![Some(format!("{EX}s1")), Some(format!("{EX}o4"))]]
    );
}

#[test]
fn test_s5_filter_equality() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("3")),
        (uri("s1"), uri("p"), int("4")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ ?s <{EX}p> ?o . FILTER(?o = 4) }}"),
    );
    assert_eq!(got, vec![vec![Some("4".to_string())]]);
}

#[test]
fn test_s6_order_by_desc_limit() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("5")),
        (uri("a"), uri("p"), int("3")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o }} ORDER BY DESC(?o) LIMIT 2"),
    );
    assert_eq!(
        got,
        vec![vec![Some("5".to_string())], vec![Some("3".to_string())]]
    );
}

#[test]
fn test_order_by_asc_with_offset() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("5")),
        (uri("a"), uri("p"), int("3")),
        (uri("a"), uri("p"), int("2")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o }} ORDER BY ?o LIMIT 2 OFFSET 1"),
    );
    assert_eq!(
        got,
        vec![vec![Some("2".to_string())], vec![Some("3".to_string())]]
    );
}

#[test]
fn test_order_limit_matches_unlimited_prefix() {
    // property 8: LIMIT k under ORDER BY equals the first k rows of the
    // unlimited ordering
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("4")),
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("9")),
        (uri("a"), uri("p"), int("7")),
        (uri("a"), uri("p"), int("2")),
    ]);
    let all = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o }} ORDER BY DESC(?o)"),
    );
    let limited = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o }} ORDER BY DESC(?o) LIMIT 3"),
    );
    assert_eq!(limited.as_slice(), &all[..3]);
}

#[test]
fn test_join_two_patterns() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), uri("m")),
        (uri("m"), uri("q"), int("7")),
        (uri("s2"), uri("p"), uri("n")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?s ?v WHERE {{ ?s <{EX}p> ?m . ?m <{EX}q> ?v }}"),
    );
    assert_eq!(
        got,
        vec![vec![Some(format!("{EX}s1")), Some("7".to_string())]]
    );
}

#[test]
fn test_union() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("1")),
        (uri("s2"), uri("q"), int("2")),
    ]);
    let mut got = rows(
        &store,
        &format!(
            "SELECT ?s WHERE {{ {{ ?s <{EX}p> ?o }} UNION {{ ?s <{EX}q> ?o }} }}"
        ),
    );
    got.sort();
    assert_eq!(
        got,
        vec![
            vec![Some(format!("{EX}s1"))],
            vec![Some(format!("{EX}s2"))],
        ]
    );
}

#[test]
fn test_not_bound_rewrites_to_diff() {
    // only subjects with no q-edge survive
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("1")),
        (uri("s2"), uri("p"), int("2")),
        (uri("s2"), uri("q"), int("3")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?s WHERE {{ ?s <{EX}p> ?o . OPTIONAL {{ ?s <{EX}q> ?r }} \
             FILTER(!BOUND(?r)) }}"
        ),
    );
    assert_eq!(got, vec![vec![Some(format!("{EX}s1"))]]);
}

#[test]
fn test_filter_order_comparisons() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("5")),
        (uri("a"), uri("p"), int("3")),
    ]);
    let mut got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(?o > 1 && ?o <= 5) }}"),
    );
    got.sort();
    assert_eq!(
        got,
        vec![vec![Some("3".to_string())], vec![Some("5".to_string())]]
    );
}

#[test]
fn test_filter_var_less_var() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("5")),
        (uri("a"), uri("q"), int("3")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?x ?y WHERE {{ <{EX}a> <{EX}p> ?x . <{EX}a> <{EX}q> ?y . FILTER(?x < ?y) }}"
        ),
    );
    assert_eq!(
        got,
        vec![vec![Some("1".to_string()), Some("3".to_string())]]
    );
}

#[test]
fn test_filter_inequality() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("5")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(?o != 1) }}"),
    );
    assert_eq!(got, vec![vec![Some("5".to_string())]]);
}

#[test]
fn test_filter_numeric_promotion() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), Value::typed("2.5", "http://www.w3.org/2001/XMLSchema#decimal")),
        (uri("a"), uri("p"), int("3")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(?o > 2.6) }}"),
    );
    assert_eq!(got, vec![vec![Some("3".to_string())]]);
}

#[test]
fn test_filter_sameterm_and_str() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), Value::simple_literal("hello")),
        (uri("a"), uri("p"), Value::simple_literal("world")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(SAMETERM(?o, \"hello\")) }}"
        ),
    );
    assert_eq!(got, vec![vec![Some("hello".to_string())]]);

    let got = rows(
        &store,
        &format!(
            "SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(STR(?o) = \"world\") }}"
        ),
    );
    assert_eq!(got, vec![vec![Some("world".to_string())]]);
}

#[test]
fn test_filter_regex_and_langmatches() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), Value::simple_literal("castor fiber")),
        (uri("a"), uri("p"), Value::simple_literal("beaver")),
        (uri("a"), uri("q"), Value::plain_lang("chat", "fr")),
        (uri("a"), uri("q"), Value::plain_lang("cat", "en-US")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o . FILTER(REGEX(?o, \"^cast\", \"i\")) }}"
        ),
    );
    assert_eq!(got, vec![vec![Some("castor fiber".to_string())]]);

    let got = rows(
        &store,
        &format!(
            "SELECT ?o WHERE {{ <{EX}a> <{EX}q> ?o . FILTER(LANGMATCHES(LANG(?o), \"en\")) }}"
        ),
    );
    assert_eq!(got, vec![vec![Some("cat".to_string())]]);
}

#[test]
fn test_ask() {
    let (_d, store) = store_with(&[(uri("s1"), uri("p"), int("3"))]);
    let mut q = Query::new(&store, &format!("ASK {{ <{EX}s1> <{EX}p> 3 }}")).unwrap();
    assert!(q.next());
    assert!(!q.next());

    let mut q = Query::new(&store, &format!("ASK {{ <{EX}s1> <{EX}p> 4 }}")).unwrap();
    assert!(!q.next());
}

#[test]
fn test_prefixed_query() {
    let (_d, store) = store_with(&[(uri("s1"), uri("p"), int("3"))]);
    let got = rows(
        &store,
        &format!("PREFIX ex: <{EX}> SELECT ?x WHERE {{ ?x ex:p 3 }}"),
    );
    assert_eq!(got, vec![vec![Some(format!("{EX}s1"))]]);
}

#[test]
fn test_reset_and_distinct_idempotence() {
    // property 7: two runs of the same DISTINCT query agree
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("1")),
        (uri("s1"), uri("p"), int("2")),
        (uri("s2"), uri("p"), int("1")),
    ]);
    let text = format!("SELECT DISTINCT ?s WHERE {{ ?s <{EX}p> ?o }}");
    let mut first = rows(&store, &text);
    let mut second = rows(&store, &text);
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);

    // reset on one query object behaves the same
    let mut q = Query::new(&store, &text).unwrap();
    let mut run1 = 0;
    while q.next() {
        run1 += 1;
    }
    q.reset();
    let mut run2 = 0;
    while q.next() {
        run2 += 1;
    }
    assert_eq!(run1, run2);
}

#[test]
fn test_limit_offset_streaming() {
    let (_d, store) = store_with(&[
        (uri("a"), uri("p"), int("1")),
        (uri("a"), uri("p"), int("2")),
        (uri("a"), uri("p"), int("3")),
        (uri("a"), uri("p"), int("4")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?o WHERE {{ <{EX}a> <{EX}p> ?o }} LIMIT 2 OFFSET 1"),
    );
    assert_eq!(got.len(), 2);
}

#[test]
fn test_blank_node_pattern_acts_as_variable() {
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("1")),
        (uri("s2"), uri("q"), int("2")),
    ]);
    let got = rows(
        &store,
        &format!("SELECT ?s WHERE {{ ?s <{EX}p> _:x }}"),
    );
    assert_eq!(got, vec![vec![Some(format!("{EX}s1"))]]);
}

#[test]
fn test_parse_error_surfaces() {
    let (_d, store) = store_with(&[(uri("s1"), uri("p"), int("1"))]);
    assert!(Query::new(&store, "SELECT WHERE {").is_err());
    assert!(Query::new(&store, "DESCRIBE ?x WHERE { ?x ?p ?o }").is_err());
}

#[test]
fn test_leftjoin_emits_every_left_solution() {
    // property 9: every left solution appears at least once
    let (_d, store) = store_with(&[
        (uri("s1"), uri("p"), int("1")),
        (uri("s2"), uri("p"), int("2")),
        (uri("s1"), uri("q"), int("7")),
        (uri("s1"), uri("q"), int("8")),
    ]);
    let got = rows(
        &store,
        &format!(
            "SELECT ?s ?r WHERE {{ ?s <{EX}p> ?o . OPTIONAL {{ ?s <{EX}q> ?r }} }}"
        ),
    );
    let s1_rows: Vec<_> = got
        .iter()
        .filter(|r| r[0] == Some(format!("{EX}s1")))
        .collect();
    let s2_rows: Vec<_> = got
        .iter()
        .filter(|r| r[0] == Some(format!("{EX}s2")))
        .collect();
    assert_eq!(s1_rows.len(), 2); // one per q-extension
    assert_eq!(s2_rows.len(), 1);
    assert_eq!(s2_rows[0][1], None); // with ?r unbound
}
