//! End-to-end pushdown tests.
//!
//! These tests build plans the way the query compiler emits them (one node per
//! operator, linear pipelines), run the full storage rule set to a fixed point, and
//! check the shape and payloads of the resulting plan.
//!
//! ## What These Tests Verify
//! - `from |> range` always becomes exactly one `ReadRange`
//! - Filters are pushed fully, partially, or not at all depending on the classifier
//! - Pushed filters accumulate on the read instead of overwriting each other
//! - The tag keys / tag values rewrites respect their preconditions
//! - Shapes that match no rule, or that share nodes between branches, are untouched
//! - A second pass over an optimized plan changes nothing

use fluxopt_core::error::PlanError;
use fluxopt_core::expr::{Expr, FunctionExpr};
use fluxopt_core::plan::{NodeId, PlanGraph, PlanNode};
use fluxopt_core::predicate::LeafClassifier;
use fluxopt_core::rewrite::{RewriteConfig, RewriteOutcome, Rewriter};
use fluxopt_core::spec::*;
use fluxopt_rules::{default_rule_registry, storage_rule_registry};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const HOUR: i64 = 3_600_000_000_000;

fn from(bucket: &str) -> ProcedureSpec {
    ProcedureSpec::From(FromSpec {
        bucket: bucket.into(),
        bucket_id: String::new(),
    })
}

fn range() -> ProcedureSpec {
    ProcedureSpec::Range(RangeSpec {
        bounds: Bounds::since(-HOUR),
    })
}

fn filter(body: Expr) -> ProcedureSpec {
    ProcedureSpec::Filter(FilterSpec {
        func: FunctionExpr::predicate("r", body),
    })
}

fn read_range(bucket: &str, filter: Option<Expr>) -> ProcedureSpec {
    ProcedureSpec::ReadRange(ReadRangeSpec {
        bucket: bucket.into(),
        bucket_id: String::new(),
        bounds: Bounds::since(-HOUR),
        filter: filter.map(|body| FunctionExpr::predicate("r", body)),
    })
}

fn keys(column: &str) -> ProcedureSpec {
    ProcedureSpec::Keys(KeysSpec {
        column: column.into(),
    })
}

fn mutate(mutations: Vec<Mutation>) -> ProcedureSpec {
    ProcedureSpec::SchemaMutation(SchemaMutationSpec { mutations })
}

fn group(keys: &[&str]) -> ProcedureSpec {
    ProcedureSpec::Group(GroupSpec {
        mode: GroupMode::By,
        keys: keys.iter().map(|k| k.to_string()).collect(),
    })
}

fn distinct(column: &str) -> ProcedureSpec {
    ProcedureSpec::Distinct(DistinctSpec {
        column: column.into(),
    })
}

fn tag(column: &str, value: &str) -> Expr {
    Expr::eq(Expr::member("r", column), Expr::string(value))
}

/// Pushes comparisons on `_measurement` and `_field` only.
fn series_keys_only(param: &str, leaf: &Expr) -> bool {
    match leaf {
        Expr::Binary { left, .. } => matches!(
            left.member_of(param),
            Some("_measurement") | Some("_field")
        ),
        _ => false,
    }
}

fn optimize_with(
    classifier: Arc<dyn LeafClassifier>,
    graph: &mut PlanGraph,
) -> RewriteOutcome {
    let registry = Arc::new(default_rule_registry(classifier));
    Rewriter::new(registry, RewriteConfig::default())
        .optimize(graph)
        .unwrap()
}

fn optimize(graph: &mut PlanGraph) -> RewriteOutcome {
    let registry = Arc::new(storage_rule_registry());
    Rewriter::new(registry, RewriteConfig::default())
        .optimize(graph)
        .unwrap()
}

/// Specs of a linear plan, source first.
fn pipeline(graph: &PlanGraph) -> Vec<ProcedureSpec> {
    let order: Vec<NodeId> = graph.topological_order().unwrap();
    order
        .into_iter()
        .map(|id| graph.spec(id).unwrap().clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

#[test]
fn test_from_range_becomes_read_range() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![from("b"), range()]).unwrap();
    let outcome = optimize(&mut g);

    assert_eq!(outcome.rewrites, 1);
    assert_eq!(pipeline(&g), vec![read_range("b", None)]);
}

#[test]
fn test_unmatched_shapes_are_untouched() {
    // No range: nothing turns `from` into a read.
    let (mut g, _) =
        PlanGraph::from_pipeline(vec![from("b"), filter(tag("_measurement", "cpu")), distinct("host")])
            .unwrap();
    let before = g.clone();

    let outcome = optimize(&mut g);
    assert_eq!(outcome.rewrites, 0);
    assert_eq!(outcome.scans, 1);
    assert_eq!(g, before);
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[test]
fn test_measurement_and_host_example() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        filter(Expr::and(tag("_measurement", "cpu"), tag("host", "a"))),
    ])
    .unwrap();

    optimize_with(Arc::new(series_keys_only), &mut g);

    assert_eq!(g.len(), 2);
    assert_eq!(
        pipeline(&g),
        vec![
            read_range("b", Some(tag("_measurement", "cpu"))),
            filter(tag("host", "a")),
        ]
    );
}

#[test]
fn test_nothing_pushable_leaves_filter() {
    let body = Expr::and(tag("host", "a"), tag("cpu", "cpu0"));
    let (mut g, _) = PlanGraph::from_pipeline(vec![read_range("b", None), filter(body.clone())]).unwrap();
    let before = g.clone();

    let outcome = optimize_with(Arc::new(series_keys_only), &mut g);
    assert_eq!(outcome.rewrites, 0);
    assert_eq!(g, before);
}

#[test]
fn test_everything_pushable_removes_filter() {
    let body = Expr::and(tag("_measurement", "cpu"), tag("_field", "usage"));
    let (mut g, _) =
        PlanGraph::from_pipeline(vec![from("b"), range(), filter(body.clone()), distinct("host")])
            .unwrap();

    optimize_with(Arc::new(series_keys_only), &mut g);

    assert_eq!(
        pipeline(&g),
        vec![read_range("b", Some(body)), distinct("host")]
    );
}

#[test]
fn test_partial_filters_accumulate_on_the_read() {
    let classifier: Arc<dyn LeafClassifier> = Arc::new(series_keys_only);

    let (mut g, _) = PlanGraph::from_pipeline(vec![
        read_range("b", None),
        filter(Expr::and(tag("_measurement", "cpu"), tag("host", "a"))),
    ])
    .unwrap();
    optimize_with(classifier.clone(), &mut g);
    let first = pipeline(&g);
    assert_eq!(first[0], read_range("b", Some(tag("_measurement", "cpu"))));

    // A second partially pushable filter over the same read.
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        first[0].clone(),
        filter(Expr::and(tag("dc", "east"), tag("_field", "usage"))),
    ])
    .unwrap();
    optimize_with(classifier, &mut g);

    assert_eq!(
        pipeline(&g),
        vec![
            read_range(
                "b",
                Some(Expr::and(tag("_measurement", "cpu"), tag("_field", "usage")))
            ),
            filter(tag("dc", "east")),
        ]
    );
}

#[test]
fn test_consecutive_filters_accumulate() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        filter(tag("_measurement", "cpu")),
        filter(Expr::and(tag("host", "a"), tag("_field", "usage"))),
    ])
    .unwrap();

    let outcome = optimize_with(Arc::new(series_keys_only), &mut g);
    assert_eq!(outcome.rewrites, 3);
    assert_eq!(
        pipeline(&g),
        vec![
            read_range(
                "b",
                Some(Expr::and(tag("_measurement", "cpu"), tag("_field", "usage")))
            ),
            filter(tag("host", "a")),
        ]
    );
}

#[test]
fn test_shared_read_is_not_merged() {
    let mut g = PlanGraph::new();
    let src = g.add_node(read_range("b", None), vec![]).unwrap();
    g.add_node(filter(tag("_measurement", "cpu")), vec![src]).unwrap();
    g.add_node(filter(tag("_measurement", "mem")), vec![src]).unwrap();
    let before = g.clone();

    let outcome = optimize(&mut g);
    assert_eq!(outcome.rewrites, 0);
    assert_eq!(g, before);
}

// ---------------------------------------------------------------------------
// Tag keys / tag values
// ---------------------------------------------------------------------------

#[test]
fn test_tag_keys_with_pushed_filter() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        filter(tag("_measurement", "cpu")),
        keys("_value"),
        mutate(vec![Mutation::keep(["_value"])]),
        distinct("_value"),
    ])
    .unwrap();

    optimize(&mut g);

    let ProcedureSpec::ReadRange(read) = read_range("b", Some(tag("_measurement", "cpu"))) else {
        unreachable!();
    };
    assert_eq!(
        pipeline(&g),
        vec![ProcedureSpec::ReadTagKeys(ReadTagKeysSpec {
            read_range: read,
            value_column_name: "_value".into(),
        })]
    );
}

#[test]
fn test_tag_keys_blocked_by_keep_mismatch() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        keys("_value"),
        mutate(vec![Mutation::keep(["host"])]),
        distinct("_value"),
    ])
    .unwrap();

    optimize(&mut g);
    let kinds: Vec<ProcedureKind> = pipeline(&g).iter().map(ProcedureSpec::kind).collect();
    assert_eq!(
        kinds,
        vec![
            ProcedureKind::ReadRange,
            ProcedureKind::Keys,
            ProcedureKind::SchemaMutation,
            ProcedureKind::Distinct,
        ]
    );
}

#[test]
fn test_tag_values() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        mutate(vec![Mutation::keep(["host", "_value"])]),
        group(&[]),
        distinct("host"),
    ])
    .unwrap();

    optimize(&mut g);

    let ProcedureSpec::ReadRange(read) = read_range("b", None) else {
        unreachable!();
    };
    assert_eq!(
        pipeline(&g),
        vec![ProcedureSpec::ReadTagValues(ReadTagValuesSpec {
            read_range: read,
            tag_key: "host".into(),
        })]
    );
}

#[test]
fn test_tag_values_blocked_by_group_keys() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        mutate(vec![Mutation::keep(["host"])]),
        group(&["dc"]),
        distinct("host"),
    ])
    .unwrap();

    optimize(&mut g);
    assert_eq!(g.len(), 4);
    assert!(g.to_nodes().iter().all(|n| n.kind() != ProcedureKind::ReadTagValues));
}

#[test]
fn test_tag_values_drop() {
    let values_of_host = |dropped: &str| {
        let (mut g, _) = PlanGraph::from_pipeline(vec![
            from("b"),
            range(),
            mutate(vec![Mutation::drop([dropped])]),
            group(&[]),
            distinct("host"),
        ])
        .unwrap();
        optimize(&mut g);
        g
    };

    // Dropping the tag key blocks the rewrite, even as the last mutation.
    let g = values_of_host("host");
    assert_eq!(g.len(), 4);

    // Dropping an unrelated column does not.
    let g = values_of_host("cpu");
    assert_eq!(g.len(), 1);
    assert_eq!(
        g.to_nodes()[0].kind(),
        ProcedureKind::ReadTagValues
    );
}

// ---------------------------------------------------------------------------
// Fixed point
// ---------------------------------------------------------------------------

#[test]
fn test_second_pass_is_a_no_op() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        filter(Expr::and(tag("_measurement", "cpu"), tag("host", "a"))),
        distinct("host"),
    ])
    .unwrap();
    optimize_with(Arc::new(series_keys_only), &mut g);
    let optimized = g.clone();

    let outcome = optimize_with(Arc::new(series_keys_only), &mut g);
    assert_eq!(outcome.rewrites, 0);
    assert_eq!(g, optimized);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_non_boolean_conjunct_fails_the_pass() {
    let (mut g, _) = PlanGraph::from_pipeline(vec![
        from("b"),
        range(),
        filter(Expr::and(tag("host", "a"), Expr::string("oops"))),
    ])
    .unwrap();

    let registry = Arc::new(storage_rule_registry());
    let err = Rewriter::new(registry, RewriteConfig::default())
        .optimize(&mut g)
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidPredicate(_)), "{}", err);
}

#[test]
fn test_plan_from_json() {
    let nodes: Vec<PlanNode> = serde_json::from_value(serde_json::json!([
        { "id": 0, "spec": { "kind": "from", "bucket": "telegraf" } },
        {
            "id": 1,
            "spec": {
                "kind": "range",
                "bounds": { "start": { "relative": -3_600_000_000_000i64 }, "stop": { "relative": 0 } }
            },
            "predecessors": [0]
        }
    ]))
    .unwrap();
    let mut g = PlanGraph::try_from_nodes(nodes).unwrap();

    optimize(&mut g);
    assert_eq!(pipeline(&g), vec![read_range("telegraf", None)]);
    assert_eq!(g.explain(), "ReadRange(bucket=\"telegraf\", bounds=[-1h, now]) #2\n");
}
