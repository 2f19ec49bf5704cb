use crate::{simsearch, spatial, SimSearchPack, SpatialPack};
use common::{EngineError, Row};
use dataset::{DataSet, MemoryAdapter, Table};
use expr::ExprKind;
use pretty_assertions::assert_eq;
use schema::Field;
use std::sync::Arc;
use types::{FieldType, Value};

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn vector_dataset() -> DataSet {
    let mut dataset = DataSet::new("vectors");
    dataset.install_pack(&SimSearchPack).unwrap();
    dataset.install_pack(&SpatialPack).unwrap();
    let vector_ty = dataset.registry().type_id("VECTOR").unwrap();
    let table = Table::new(
        "employees_with_vectors",
        vec![
            Field::new("employee_id", FieldType::Integer),
            Field::new("vector", FieldType::Extension(vector_ty)),
        ],
        vec![
            vec![int(1234), simsearch::vector(vector_ty, [1.0, 2.0, 3.0, 4.0])],
            vec![int(4567), simsearch::vector(vector_ty, [4.0, 5.0, 6.0, 7.0])],
            vec![int(8901), simsearch::vector(vector_ty, [8.0, 9.0, 0.0, 1.0])],
        ],
    );
    dataset.add_adapter(Arc::new(
        MemoryAdapter::new("vectors").with_table(table),
    ));
    dataset
}

fn spatial_dataset() -> DataSet {
    let mut dataset = DataSet::new("spatial");
    dataset.install_pack(&SimSearchPack).unwrap();
    dataset.install_pack(&SpatialPack).unwrap();
    let point_ty = dataset.registry().type_id("POINT").unwrap();
    let table = Table::new(
        "points",
        vec![
            Field::new("pid", FieldType::Integer),
            Field::new("point", FieldType::Extension(point_ty)),
        ],
        vec![
            vec![int(1234), spatial::point(point_ty, 0.0, 0.0)],
            vec![int(4567), spatial::point(point_ty, 1.0, 2.0)],
            vec![int(8901), spatial::point(point_ty, 10.0, 3.0)],
        ],
    );
    dataset.add_adapter(Arc::new(MemoryAdapter::new("spatial").with_table(table)));
    dataset
}

fn rows(dataset: &DataSet, sql: &str) -> Vec<Vec<Value>> {
    dataset
        .query(sql)
        .unwrap()
        .rows(vec![])
        .unwrap()
        .into_iter()
        .map(Row::into_values)
        .collect()
}

#[test]
fn simselect_filters_by_euclidean_distance() {
    let dataset = vector_dataset();
    let result = rows(
        &dataset,
        "SIMSELECT employee_id FROM employees_with_vectors WHERE vector TO [1,2,3,4] < 10",
    );
    // [1,2,3,4] is at distance 0, [4,5,6,7] at 6, [8,9,0,1] at ~10.8
    assert_eq!(result, vec![vec![int(1234)], vec![int(4567)]]);
}

#[test]
fn plain_select_with_to_is_upgraded() {
    let dataset = vector_dataset();
    let query = dataset
        .query(
            "SELECT employee_id FROM employees_with_vectors WHERE vector TO [1,2,3,4] < 10",
        )
        .unwrap();
    let sim_tag = dataset.registry().rel_op_tag("sim_selection").unwrap();
    let kinds: Vec<ExprKind> = query
        .plan()
        .rel_paths(expr::TraversalOrder::DepthFirst)
        .iter()
        .map(|p| query.plan().node_at(p).unwrap().kind())
        .collect();
    assert!(kinds.contains(&ExprKind::ExtRel(sim_tag)), "plan: {kinds:?}");
    assert_eq!(
        rows(
            &dataset,
            "SELECT employee_id FROM employees_with_vectors WHERE vector TO [1,2,3,4] < 10",
        ),
        vec![vec![int(1234)], vec![int(4567)]]
    );
}

#[test]
fn simselect_without_to_is_an_extended_syntax_error() {
    let dataset = vector_dataset();
    let err = dataset
        .query("SIMSELECT employee_id FROM employees_with_vectors WHERE employee_id > 0")
        .unwrap_err();
    assert!(matches!(err, EngineError::ExtendedSyntax(_)), "got {err}");

    let err = dataset
        .query("SIMSELECT employee_id FROM employees_with_vectors")
        .unwrap_err();
    assert!(matches!(err, EngineError::ExtendedSyntax(_)), "got {err}");
}

#[test]
fn plain_queries_still_parse_with_packs_installed() {
    let dataset = vector_dataset();
    assert_eq!(
        rows(
            &dataset,
            "SELECT employee_id FROM employees_with_vectors WHERE employee_id = 4567",
        ),
        vec![vec![int(4567)]]
    );
}

#[test]
fn vector_literals_compare_by_components() {
    let dataset = vector_dataset();
    let sql = "SIMSELECT employee_id FROM employees_with_vectors WHERE vector TO [1,2,3,4] < 1";
    assert_eq!(rows(&dataset, sql), vec![vec![int(1234)]]);
}

#[test]
fn euclidean_distance_matches_by_hand() {
    let a = simsearch::VectorValue(vec![1.0, 2.0, 3.0, 4.0]);
    let b = simsearch::VectorValue(vec![4.0, 5.0, 6.0, 7.0]);
    let d = simsearch::distance(&a, &b, simsearch::Metric::Euclidean).unwrap();
    assert!((d - 6.0).abs() < 1e-9);
    let dot = simsearch::distance(&a, &b, simsearch::Metric::Dot).unwrap();
    assert_eq!(dot, 1.0 * 4.0 + 2.0 * 5.0 + 3.0 * 6.0 + 4.0 * 7.0);

    let short = simsearch::VectorValue(vec![1.0]);
    assert!(simsearch::distance(&a, &short, simsearch::Metric::Euclidean).is_err());
}

#[test]
fn spatialselect_filters_points_inside_circle() {
    let dataset = spatial_dataset();
    let result = rows(
        &dataset,
        "SPATIALSELECT pid FROM points WHERE point INSIDE {#0,0#, 3}",
    );
    assert_eq!(result, vec![vec![int(1234)], vec![int(4567)]]);
}

#[test]
fn spatialselect_without_inside_is_rejected() {
    let dataset = spatial_dataset();
    let err = dataset
        .query("SPATIALSELECT pid FROM points WHERE pid > 0")
        .unwrap_err();
    assert!(matches!(err, EngineError::ExtendedSyntax(_)));
}

#[test]
fn pack_install_is_idempotent_and_reversible() {
    let mut dataset = DataSet::new("packs");
    dataset.install_pack(&SimSearchPack).unwrap();
    dataset.install_pack(&SimSearchPack).unwrap();
    assert_eq!(dataset.registry().installed_packs().len(), 1);
    assert!(dataset.registry().is_symbol('['));

    dataset.uninstall_pack(simsearch::PACK_NAME);
    assert!(!dataset.registry().is_symbol('['));
    // the vector literal no longer lexes
    assert!(dataset.query("SELECT employee_id FROM t WHERE v TO [1] < 1").is_err());
}

#[test]
fn selection_swap_rule_prefilters_extended_selection() {
    use planner::rules::SelectionExtSwapRule;
    use planner::{HeuristicPlanner, UniformCost};

    let dataset = vector_dataset();
    let sim_tag = dataset.registry().rel_op_tag("sim_selection").unwrap();
    // a nested query stacks a plain selection on the similarity selection
    let query = dataset
        .query(
            "SELECT employee_id FROM \
             (SIMSELECT * FROM employees_with_vectors WHERE vector TO [1,2,3,4] < 10) \
             WHERE employee_id < 5000",
        )
        .unwrap();

    let mut optimizer = HeuristicPlanner::new();
    optimizer.add_rule(Box::new(SelectionExtSwapRule::new(sim_tag)));
    let best = optimizer.find_best_plan(query.plan(), &UniformCost).unwrap();

    // somewhere in the optimized plan the extended selection now sits on a
    // plain selection
    let found = best
        .rel_paths(expr::TraversalOrder::DepthFirst)
        .iter()
        .any(|p| {
            let node = best.node_at(p).unwrap();
            matches!(node.kind(), ExprKind::ExtRel(tag) if tag == sim_tag)
                && matches!(
                    node.rel_children().first().map(|c| c.kind()),
                    Some(ExprKind::Selection)
                )
        });
    assert!(found, "plan was:\n{}", planner::explain(&best));
}
