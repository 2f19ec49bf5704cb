//! End-to-end checks over the shared fixtures: SQL text in, rows out, with
//! the optimizer in the loop where it matters.

use planner::rules::{FilterMergeRule, FilterPushDownRule, SelectionExtSwapRule};
use planner::HeuristicPlanner;
use pretty_assertions::assert_eq;
use testsupport::prelude::*;

fn rows(ds: &DataSet, sql: &str) -> Vec<Vec<Value>> {
    ds.query(sql)
        .unwrap()
        .rows(vec![])
        .unwrap()
        .into_iter()
        .map(Row::into_values)
        .collect()
}

#[test]
fn count_employees() {
    let ds = employees_dataset();
    assert_eq!(
        rows(&ds, "SELECT count(employee_id) FROM employees"),
        vec![vec![int(3)]]
    );
}

#[test]
fn min_max_employee_ids() {
    let ds = employees_dataset();
    assert_eq!(
        rows(&ds, "SELECT min(employee_id), max(employee_id) FROM employees"),
        vec![vec![int(1234), int(8901)]]
    );
}

#[test]
fn join_on_mid_filtered_by_year() {
    let ds = demo_dataset();
    assert_eq!(
        rows(
            &ds,
            "SELECT musical.title FROM animation JOIN musical \
             ON animation.mid = musical.mid WHERE musical.year > 1960",
        ),
        vec![vec![text("Aladdin")]]
    );
}

#[test]
fn simselect_by_distance() {
    let ds = vectors_dataset();
    assert_eq!(
        rows(
            &ds,
            "SIMSELECT employee_id FROM employees_with_vectors \
             WHERE vector TO [1,2,3,4] < 10",
        ),
        vec![vec![int(1234)], vec![int(4567)]]
    );
}

#[test]
fn spatial_containment() {
    let ds = spatial_dataset();
    assert_eq!(
        rows(&ds, "SPATIALSELECT pid FROM points WHERE point INSIDE {#0,0#, 3}"),
        vec![vec![int(1234)], vec![int(4567)]]
    );
}

#[test]
fn optimized_pipeline_matches_unoptimized() {
    let ds = demo_dataset();
    let sql = "SELECT musical.title FROM animation JOIN musical \
               ON animation.mid = musical.mid \
               WHERE animation.mid < 1200 AND musical.year > 1960";

    let mut optimizer = HeuristicPlanner::new();
    optimizer.add_rule(Box::new(FilterMergeRule::new()));
    optimizer.add_rule(Box::new(FilterPushDownRule::new()));
    if let Some(tag) = ds.registry().rel_op_tag("sim_selection") {
        optimizer.add_rule(Box::new(SelectionExtSwapRule::new(tag)));
    }

    let parsed = parser::parse_statement(sql, ds.registry()).unwrap();
    let optimized = Query::new(&ds, parsed, true, Some(&optimizer)).unwrap();
    let plain = ds.query(sql).unwrap();

    assert_eq!(plain.rows(vec![]).unwrap(), optimized.rows(vec![]).unwrap());
    assert_eq!(optimized.rows(vec![]).unwrap(), vec![Row::new(vec![text("Aladdin")])]);
}

#[test]
fn group_order_and_slice_pipeline() {
    let ds = demo_dataset();
    let result = rows(
        &ds,
        "SELECT year, count(mid) FROM animation GROUP BY year ORDER BY year DESC LIMIT 2",
    );
    assert_eq!(
        result,
        vec![vec![int(1995), int(2)], vec![int(1994), int(1)]]
    );
}

#[test]
fn union_all_of_both_genres() {
    let ds = demo_dataset();
    let result = rows(
        &ds,
        "SELECT mid FROM animation WHERE year < 1940 \
         UNION ALL SELECT mid FROM musical WHERE year < 1940",
    );
    assert_eq!(result, vec![vec![int(1235)], vec![int(1235)]]);
}

#[test]
fn parameters_bind_at_execution_time() {
    let ds = employees_dataset();
    let query = ds
        .query("SELECT full_name FROM employees WHERE employee_id = ?0")
        .unwrap();
    let first = query.rows(vec![int(1234)]).unwrap();
    let second = query.rows(vec![int(8901)]).unwrap();
    assert_eq!(first, vec![Row::new(vec![text("Tom Tompson")])]);
    assert_eq!(second, vec![Row::new(vec![text("Mark Markty")])]);
}

#[test]
fn nested_query_with_alias() {
    let ds = demo_dataset();
    let result = rows(
        &ds,
        "SELECT recent.title FROM \
         (SELECT * FROM animation WHERE year >= 1994) recent \
         WHERE recent.mid = 1234",
    );
    assert_eq!(result, vec![vec![text("Toy Story")]]);
}
