use crate::{DataSet, LogicalCost, MemoryAdapter, Query, Table};
use common::{EngineError, EngineResult, Row, Rows};
use expr::Expr;
use planner::rules::{FilterMergeRule, FilterPushDownRule};
use planner::{CostEstimator, HeuristicPlanner};
use pretty_assertions::assert_eq;
use schema::{Field, FieldMode, Schema};
use std::io::Write;
use std::sync::Arc;
use syntax::{TableFn, TableFnReturns};
use types::{Date, FieldType, Value};

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn text(v: &str) -> Value {
    Value::Str(v.into())
}

fn movie_fields() -> Vec<Field> {
    vec![
        Field::new("mid", FieldType::Integer),
        Field::new("title", FieldType::String),
        Field::new("year", FieldType::Integer),
    ]
}

fn demo_dataset() -> DataSet {
    let animation = Table::new(
        "animation",
        movie_fields(),
        vec![
            vec![int(1234), text("Toy Story"), int(1995)],
            vec![int(4567), text("Balto"), int(1995)],
            vec![int(6789), text("Swan Princess"), int(1994)],
            vec![int(1011), text("Aladdin"), int(1992)],
            vec![int(1235), text("Snow White and the Seven Dwarfs"), int(1937)],
        ],
    );
    let musical = Table::new(
        "musical",
        movie_fields(),
        vec![
            vec![int(1235), text("Snow White and the Seven Dwarfs"), int(1937)],
            vec![int(1011), text("Aladdin"), int(1992)],
            vec![int(9800), text("Singin' in the Rain"), int(1952)],
            vec![int(9858), text("American in Paris"), int(1951)],
        ],
    );
    let employees = Table::new(
        "employees",
        vec![
            Field::new("employee_id", FieldType::Integer),
            Field::new("full_name", FieldType::String),
            Field::new("employment_date", FieldType::Date),
            Field::new("manager_id", FieldType::Integer),
            Field::builder()
                .name("roles")
                .ty(FieldType::String)
                .mode(FieldMode::Repeated)
                .build(),
        ],
        vec![
            vec![
                int(1234),
                text("Tom Tompson"),
                Value::Date(Date::new(2009, 1, 17)),
            ],
            vec![
                int(4567),
                text("Sally Sanders"),
                Value::Date(Date::new(2010, 2, 24)),
                int(1234),
            ],
            vec![
                int(8901),
                text("Mark Markty"),
                Value::Date(Date::new(2010, 3, 1)),
                int(1234),
                Value::List(vec![text("sales"), text("marketing")]),
            ],
        ],
    );
    let mut dataset = DataSet::new("demo");
    dataset.add_adapter(Arc::new(
        MemoryAdapter::new("demo")
            .with_table(animation)
            .with_table(musical)
            .with_table(employees),
    ));
    dataset
}

fn rows(dataset: &DataSet, sql: &str) -> EngineResult<Vec<Vec<Value>>> {
    let query = dataset.query(sql)?;
    Ok(query
        .rows(vec![])?
        .into_iter()
        .map(Row::into_values)
        .collect())
}

#[test]
fn count_aggregates_the_whole_table() {
    let dataset = demo_dataset();
    assert_eq!(
        rows(&dataset, "SELECT count(employee_id) FROM employees").unwrap(),
        vec![vec![int(3)]]
    );
}

#[test]
fn min_max_over_employee_ids() {
    let dataset = demo_dataset();
    assert_eq!(
        rows(
            &dataset,
            "SELECT min(employee_id), max(employee_id) FROM employees"
        )
        .unwrap(),
        vec![vec![int(1234), int(8901)]]
    );
}

#[test]
fn join_with_filter_finds_aladdin() {
    let dataset = demo_dataset();
    assert_eq!(
        rows(
            &dataset,
            "SELECT musical.title FROM animation JOIN musical \
             ON animation.mid = musical.mid WHERE musical.year > 1960",
        )
        .unwrap(),
        vec![vec![text("Aladdin")]]
    );
}

#[test]
fn repeated_fields_default_to_empty_lists() {
    let dataset = demo_dataset();
    let result = rows(
        &dataset,
        "SELECT roles FROM employees WHERE employee_id = 1234",
    )
    .unwrap();
    assert_eq!(result, vec![vec![Value::List(vec![])]]);
}

#[test]
fn nullable_fields_default_to_null() {
    let dataset = demo_dataset();
    let result = rows(
        &dataset,
        "SELECT manager_id FROM employees WHERE employee_id = 1234",
    )
    .unwrap();
    assert_eq!(result, vec![vec![Value::Null]]);
}

#[test]
fn from_less_select_projects_one_row() {
    let dataset = demo_dataset();
    assert_eq!(rows(&dataset, "SELECT 1 + 1").unwrap(), vec![vec![int(2)]]);
}

#[test]
fn math_and_string_builtins_are_registered() {
    let dataset = demo_dataset();
    assert_eq!(
        rows(&dataset, "SELECT sqrt(16), upper('abc')").unwrap(),
        vec![vec![Value::Float(4.0), text("ABC")]]
    );
}

#[test]
fn views_expand_like_their_statement() {
    let mut dataset = demo_dataset();
    dataset
        .create_view("nineties", "SELECT * FROM animation WHERE year >= 1990")
        .unwrap();
    let via_view = rows(&dataset, "SELECT count(mid) FROM nineties").unwrap();
    let direct = rows(
        &dataset,
        "SELECT count(mid) FROM animation WHERE year >= 1990",
    )
    .unwrap();
    assert_eq!(via_view, direct);
    assert_eq!(via_view, vec![vec![int(4)]]);
}

#[test]
fn view_fields_take_the_view_name() {
    let mut dataset = demo_dataset();
    dataset
        .create_view("nineties", "SELECT * FROM animation WHERE year >= 1990")
        .unwrap();
    let result = rows(
        &dataset,
        "SELECT nineties.title FROM nineties WHERE nineties.mid = 1011",
    )
    .unwrap();
    assert_eq!(result, vec![vec![text("Aladdin")]]);
}

#[test]
fn function_aggregate_name_conflicts_are_rejected() {
    let mut dataset = demo_dataset();
    let err = dataset
        .add_function(syntax::ScalarUdf::new(
            "count",
            Arc::new(|_args| Ok(Value::Null)),
            None,
        ))
        .unwrap_err();
    assert!(matches!(err, EngineError::NameConflict(_)));
}

#[test]
fn aggregate_over_function_name_is_rejected() {
    let mut dataset = demo_dataset();
    let mut agg = crate::builtins::standard_aggregates().remove(0);
    agg.name = "sqrt".into();
    let err = dataset.add_aggregate(agg).unwrap_err();
    assert!(matches!(err, EngineError::NameConflict(_)));
}

#[test]
fn unknown_relation_surfaces_not_found() {
    let dataset = demo_dataset();
    assert!(matches!(
        rows(&dataset, "SELECT * FROM nowhere"),
        Err(EngineError::RelationNotFound(_))
    ));
}

#[test]
fn get_schema_resolves_through_adapters() {
    let dataset = demo_dataset();
    let schema = dataset.get_schema("musical").unwrap();
    assert_eq!(schema.field_names(), vec!["mid", "title", "year"]);
}

#[test]
fn json_tables_execute_like_inline_ones() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"mid": 1, "title": "First", "year": 2001}},
            {{"mid": 2, "title": "Second", "year": 1999}}
        ]"#
    )
    .unwrap();
    let table = Table::from_json_file("films", movie_fields(), file.path()).unwrap();
    let mut dataset = DataSet::new("json");
    dataset.add_adapter(Arc::new(MemoryAdapter::new("json").with_table(table)));

    assert_eq!(
        rows(&dataset, "SELECT title FROM films WHERE year > 2000").unwrap(),
        vec![vec![text("First")]]
    );
}

#[test]
fn table_functions_resolve_to_bound_relations() {
    let mut dataset = demo_dataset();
    let schema = Schema::named("seq", vec![Field::new("n", FieldType::Integer)]);
    dataset
        .add_table_function(TableFn {
            name: "seq".into(),
            returns: TableFnReturns::Fixed(schema),
            body: Arc::new(|_ctx, args| -> EngineResult<Rows> {
                let stop = match args.first() {
                    Some(Expr::Const(Value::Int(i))) => *i,
                    _ => 0,
                };
                Ok(executor::rows_from_vec(
                    (0..stop).map(|n| Row::new(vec![Value::Int(n)])).collect(),
                ))
            }),
        })
        .unwrap();
    assert_eq!(
        rows(&dataset, "SELECT n FROM seq(3) WHERE n > 0").unwrap(),
        vec![vec![int(1)], vec![int(2)]]
    );
}

#[test]
fn optimizer_preserves_results_and_lowers_cost() {
    let dataset = demo_dataset();
    let sql = "SELECT musical.title FROM animation JOIN musical \
               ON animation.mid = musical.mid \
               WHERE animation.mid < 1200 AND musical.year > 1960";

    let plain = dataset.query(sql).unwrap();
    let mut optimizer = HeuristicPlanner::new();
    optimizer.add_rule(Box::new(FilterMergeRule::new()));
    optimizer.add_rule(Box::new(FilterPushDownRule::new()));
    let parsed = parser::parse_statement(sql, dataset.registry()).unwrap();
    let optimized = Query::new(&dataset, parsed, true, Some(&optimizer)).unwrap();

    assert_eq!(
        plain.rows(vec![]).unwrap(),
        optimized.rows(vec![]).unwrap()
    );

    let estimator = LogicalCost::new(&dataset);
    let plain_cost = estimator.plan_cost(plain.plan()).unwrap();
    let optimized_cost = estimator.plan_cost(optimized.plan()).unwrap();
    assert!(
        optimized_cost <= plain_cost,
        "optimized {optimized_cost} vs plain {plain_cost}"
    );

    // the pushed-down plan filters below the join
    let rendered = optimized.explain();
    let join_line = rendered.lines().position(|l| l.contains("Join")).unwrap();
    let selection_line = rendered
        .lines()
        .position(|l| l.contains("Selection"))
        .unwrap();
    assert!(selection_line > join_line, "plan was:\n{rendered}");
}

#[test]
fn union_all_streams_left_then_right() {
    let dataset = demo_dataset();
    let result = rows(
        &dataset,
        "SELECT title FROM animation WHERE mid = 1011 \
         UNION ALL SELECT title FROM musical WHERE mid = 9800",
    )
    .unwrap();
    assert_eq!(
        result,
        vec![vec![text("Aladdin")], vec![text("Singin' in the Rain")]]
    );
}

#[test]
fn query_headers_follow_the_schema() {
    let dataset = demo_dataset();
    let query = dataset
        .query("SELECT employee_id AS id, full_name FROM employees")
        .unwrap();
    assert_eq!(query.headers(), vec!["id", "full_name"]);
}
