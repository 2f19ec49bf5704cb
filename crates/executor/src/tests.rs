use crate::{rows_from_vec, Compiler};
use common::{EngineError, EngineResult, EvalContext, Row, Rows};
use expr::{Expr, Relation};
use planner::{resolve_schema, RelationProvider};
use pretty_assertions::assert_eq;
use schema::{Field, Schema};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use syntax::{AggStep, Aggregate, FunctionProvider, ScalarUdf, SyntaxRegistry, TableFn};
use types::{FieldType, Value};

// ---- fixtures ------------------------------------------------------------

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn text(v: &str) -> Value {
    Value::Str(v.into())
}

fn row(values: Vec<Value>) -> Row {
    Row::new(values)
}

struct Table {
    name: String,
    schema: Schema,
    rows: Vec<Row>,
}

struct TestDb {
    tables: Vec<Table>,
    aggregates: Vec<Aggregate>,
    udfs: Vec<ScalarUdf>,
    registry: SyntaxRegistry,
}

fn numeric_pick(state: Value, next: Value, pick_low: bool) -> EngineResult<Value> {
    if next.is_null() {
        return Ok(state);
    }
    match state.compare(&next) {
        Some(std::cmp::Ordering::Greater) if pick_low => Ok(next),
        Some(std::cmp::Ordering::Less) if !pick_low => Ok(next),
        Some(_) => Ok(state),
        None => Err(EngineError::Execution("incomparable aggregate input".into())),
    }
}

impl TestDb {
    fn new() -> Self {
        let aggregates = vec![
            Aggregate {
                name: "count".into(),
                step: AggStep::Unary(Arc::new(|state| {
                    state.add(&Value::Int(1)).ok_or_else(|| {
                        EngineError::Execution("count state must be numeric".into())
                    })
                })),
                returns: Field::new("count", FieldType::Integer),
                initial: Value::Int(0),
                finalize: None,
            },
            Aggregate {
                name: "min".into(),
                step: AggStep::Binary(Arc::new(|state, next| numeric_pick(state, next, true))),
                returns: Field::new("min", FieldType::Integer),
                initial: Value::Float(f64::INFINITY),
                finalize: None,
            },
            Aggregate {
                name: "max".into(),
                step: AggStep::Binary(Arc::new(|state, next| numeric_pick(state, next, false))),
                returns: Field::new("max", FieldType::Integer),
                initial: Value::Float(f64::NEG_INFINITY),
                finalize: None,
            },
            Aggregate {
                name: "sum".into(),
                step: AggStep::Binary(Arc::new(|state, next| {
                    if next.is_null() {
                        return Ok(state);
                    }
                    state.add(&next).ok_or_else(|| {
                        EngineError::Execution("sum requires numeric input".into())
                    })
                })),
                returns: Field::new("sum", FieldType::Integer),
                initial: Value::Int(0),
                finalize: None,
            },
        ];
        let udfs = vec![ScalarUdf::new(
            "double",
            Arc::new(|args: &[Value]| {
                args[0]
                    .mul(&Value::Int(2))
                    .ok_or_else(|| EngineError::Execution("double requires a number".into()))
            }),
            Some(Field::new("double", FieldType::Integer)),
        )];
        Self {
            tables: Vec::new(),
            aggregates,
            udfs,
            registry: SyntaxRegistry::default(),
        }
    }

    fn with_table(
        mut self,
        name: &str,
        fields: Vec<(&str, FieldType)>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let schema = Schema::named(
            name,
            fields
                .into_iter()
                .map(|(n, ty)| Field::new(n, ty))
                .collect(),
        );
        self.tables.push(Table {
            name: name.into(),
            schema,
            rows: rows.into_iter().map(Row::new).collect(),
        });
        self
    }

    fn employees(self) -> Self {
        self.with_table(
            "employees",
            vec![
                ("employee_id", FieldType::Integer),
                ("full_name", FieldType::String),
            ],
            vec![
                vec![int(1234), text("Tom Tompson")],
                vec![int(4567), text("Sally Sanders")],
                vec![int(8901), text("Mark Markty")],
            ],
        )
    }

    fn run(&self, sql: &str) -> EngineResult<Vec<Row>> {
        self.run_with_params(sql, vec![])
    }

    fn run_with_params(&self, sql: &str, params: Vec<Value>) -> EngineResult<Vec<Row>> {
        let plan = parser::parse_statement(sql, &self.registry)?;
        let resolved = resolve_schema(&plan, self, self, &self.registry)?;
        let compiler = Compiler::new(self, &self.registry);
        let ctx = Rc::new(EvalContext::new(params));
        compiler.run(&resolved, &ctx)
    }

    fn run_collecting_cost(&self, sql: &str) -> EngineResult<(Vec<Row>, f64)> {
        let plan = parser::parse_statement(sql, &self.registry)?;
        let resolved = resolve_schema(&plan, self, self, &self.registry)?;
        let compiler = Compiler::new(self, &self.registry);
        let ctx = Rc::new(EvalContext::new(vec![]));
        let rows = compiler.run(&resolved, &ctx)?;
        Ok((rows, ctx.total_cost()))
    }
}

impl RelationProvider for TestDb {
    fn view(&self, _name: &str) -> Option<Expr> {
        None
    }

    fn bind_relation(&self, name: &str) -> EngineResult<Option<Relation>> {
        Ok(self.tables.iter().find(|t| t.name == name).map(|t| {
            let rows = t.rows.clone();
            Relation::new(
                "test",
                t.name.clone(),
                t.schema.clone(),
                Arc::new(move |_ctx| -> EngineResult<Rows> { Ok(rows_from_vec(rows.clone())) }),
            )
        }))
    }
}

impl FunctionProvider for TestDb {
    fn scalar_udf(&self, name: &str) -> Option<&ScalarUdf> {
        self.udfs.iter().find(|u| u.name == name)
    }

    fn aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.aggregates.iter().find(|a| a.name == name)
    }

    fn table_fn(&self, _name: &str) -> Option<&TableFn> {
        None
    }
}

fn values(rows: &[Row]) -> Vec<Vec<Value>> {
    rows.iter().map(|r| r.values.clone()).collect()
}

// ---- scenarios -----------------------------------------------------------

#[test]
fn count_over_three_rows_is_three() {
    let db = TestDb::new().employees();
    let rows = db.run("SELECT count(employee_id) FROM employees").unwrap();
    assert_eq!(values(&rows), vec![vec![int(3)]]);
}

#[test]
fn count_star_counts_whole_rows() {
    let db = TestDb::new().employees();
    let rows = db.run("SELECT count(*) FROM employees").unwrap();
    assert_eq!(values(&rows), vec![vec![int(3)]]);
}

#[test]
fn min_and_max_seeded_at_infinities() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT min(employee_id), max(employee_id) FROM employees")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(1234), int(8901)]]);
}

#[test]
fn cross_product_with_filter_matches_join() {
    let db = TestDb::new()
        .with_table(
            "a",
            vec![("id", FieldType::Integer)],
            vec![vec![int(1)], vec![int(2)]],
        )
        .with_table(
            "b",
            vec![("id", FieldType::Integer)],
            vec![vec![int(2)], vec![int(3)]],
        );
    let rows = db.run("SELECT * FROM a, b WHERE a.id = b.id").unwrap();
    assert_eq!(values(&rows), vec![vec![int(2), int(2)]]);
}

#[test]
fn empty_input_aggregates_to_initials() {
    let db = TestDb::new().with_table("empty", vec![("x", FieldType::Integer)], vec![]);
    let rows = db.run("SELECT count(x) FROM empty").unwrap();
    assert_eq!(values(&rows), vec![vec![int(0)]]);
}

#[test]
fn sum_groups_by_key() {
    let db = TestDb::new().with_table(
        "salaries",
        vec![("dept", FieldType::String), ("salary", FieldType::Integer)],
        vec![
            vec![text("eng"), int(100)],
            vec![text("ops"), int(50)],
            vec![text("eng"), int(150)],
        ],
    );
    let rows = db
        .run("SELECT dept, sum(salary) FROM salaries GROUP BY dept")
        .unwrap();
    // groups come out in key order
    assert_eq!(
        values(&rows),
        vec![
            vec![text("eng"), int(250)],
            vec![text("ops"), int(50)],
        ]
    );
}

#[test]
fn mixed_projection_without_group_by_is_rejected() {
    let db = TestDb::new().employees();
    let err = db
        .run("SELECT full_name, count(employee_id) FROM employees")
        .unwrap_err();
    match err {
        EngineError::Syntax(msg) => assert!(msg.contains("full_name"), "message was: {msg}"),
        other => panic!("expected a syntax error, got {other}"),
    }
}

#[test]
fn order_by_desc_reverses_numbers() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT employee_id FROM employees ORDER BY employee_id DESC")
        .unwrap();
    assert_eq!(
        values(&rows),
        vec![vec![int(8901)], vec![int(4567)], vec![int(1234)]]
    );
}

#[test]
fn order_by_desc_reverses_strings_bytewise() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT full_name FROM employees ORDER BY full_name DESC")
        .unwrap();
    assert_eq!(
        values(&rows),
        vec![
            vec![text("Tom Tompson")],
            vec![text("Sally Sanders")],
            vec![text("Mark Markty")],
        ]
    );
}

#[test]
fn limit_and_offset_slice_the_stream() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT employee_id FROM employees ORDER BY employee_id LIMIT 1 OFFSET 1")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(4567)]]);
}

#[test]
fn union_all_concatenates_in_order() {
    let db = TestDb::new()
        .with_table("a", vec![("x", FieldType::Integer)], vec![vec![int(1)]])
        .with_table("b", vec![("x", FieldType::Integer)], vec![vec![int(2)]]);
    let rows = db
        .run("SELECT * FROM a UNION ALL SELECT * FROM b")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(1)], vec![int(2)]]);
}

#[test]
fn hash_join_emits_matches() {
    let db = TestDb::new()
        .with_table(
            "users",
            vec![("id", FieldType::Integer), ("name", FieldType::String)],
            vec![vec![int(1), text("ann")], vec![int(2), text("bob")]],
        )
        .with_table(
            "orders",
            vec![("user_id", FieldType::Integer), ("total", FieldType::Integer)],
            vec![
                vec![int(1), int(10)],
                vec![int(1), int(20)],
                vec![int(3), int(30)],
            ],
        );
    let rows = db
        .run("SELECT users.name, orders.total FROM users JOIN orders ON users.id = orders.user_id")
        .unwrap();
    assert_eq!(
        values(&rows),
        vec![
            vec![text("ann"), int(10)],
            vec![text("ann"), int(20)],
        ]
    );
}

#[test]
fn left_join_pads_unmatched_rows_with_nulls() {
    let db = TestDb::new()
        .with_table(
            "users",
            vec![("id", FieldType::Integer), ("name", FieldType::String)],
            vec![vec![int(1), text("ann")], vec![int(2), text("bob")]],
        )
        .with_table(
            "orders",
            vec![("user_id", FieldType::Integer), ("total", FieldType::Integer)],
            vec![vec![int(1), int(10)]],
        );
    let rows = db
        .run(
            "SELECT users.name, orders.total FROM users \
             LEFT JOIN orders ON users.id = orders.user_id",
        )
        .unwrap();
    assert_eq!(
        values(&rows),
        vec![
            vec![text("ann"), int(10)],
            vec![text("bob"), Value::Null],
        ]
    );
}

#[test]
fn non_equi_join_uses_the_nested_loop() {
    let db = TestDb::new()
        .with_table("a", vec![("x", FieldType::Integer)], vec![vec![int(1)], vec![int(5)]])
        .with_table("b", vec![("y", FieldType::Integer)], vec![vec![int(3)]]);
    let rows = db.run("SELECT * FROM a JOIN b ON a.x < b.y").unwrap();
    assert_eq!(values(&rows), vec![vec![int(1), int(3)]]);
}

#[test]
fn params_resolve_positionally() {
    let db = TestDb::new().employees();
    let rows = db
        .run_with_params(
            "SELECT full_name FROM employees WHERE employee_id = ?0",
            vec![int(4567)],
        )
        .unwrap();
    assert_eq!(values(&rows), vec![vec![text("Sally Sanders")]]);
}

#[test]
fn scalar_udfs_apply_per_row() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT double(employee_id) FROM employees WHERE employee_id = 1234")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(2468)]]);
}

#[test]
fn case_when_and_cast_evaluate() {
    let db = TestDb::new().employees();
    let rows = db
        .run(
            "SELECT CASE WHEN employee_id < 5000 THEN 'low' ELSE 'high' END, \
             CAST(employee_id AS string) FROM employees ORDER BY employee_id LIMIT 1",
        )
        .unwrap();
    assert_eq!(values(&rows), vec![vec![text("low"), text("1234")]]);
}

#[test]
fn like_matches_sql_patterns() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT employee_id FROM employees WHERE full_name LIKE 'T%'")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(1234)]]);
}

#[test]
fn between_and_in_filters() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT employee_id FROM employees WHERE employee_id BETWEEN 2000 AND 9000 \
              AND employee_id IN (4567, 9999)")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(4567)]]);
}

#[test]
fn arithmetic_division_is_integral_for_integers() {
    let db = TestDb::new().employees();
    let rows = db
        .run("SELECT employee_id / 1000 FROM employees WHERE employee_id = 4567")
        .unwrap();
    assert_eq!(values(&rows), vec![vec![int(4)]]);
}

#[test]
fn division_by_zero_is_an_execution_error() {
    let db = TestDb::new().employees();
    let err = db
        .run("SELECT employee_id / 0 FROM employees")
        .unwrap_err();
    assert!(matches!(err, EngineError::Execution(_)));
}

#[test]
fn cost_stats_are_recorded_per_operator() {
    let db = TestDb::new().employees();
    // Selection over the relation: 3 input rows, predicate factor
    // 1 (selection) + 1 (Gt) + 0.1 (var) + 0.1 (const) = 2.2
    let (rows, cost) = db
        .run_collecting_cost("SELECT * FROM employees WHERE employee_id > 2000")
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!((cost - 3.0 * 2.2).abs() < 1e-9, "cost was {cost}");
}

#[test]
fn join_cost_is_the_cross_product() {
    let db = TestDb::new()
        .with_table("a", vec![("x", FieldType::Integer)], vec![vec![int(1)], vec![int(2)]])
        .with_table("b", vec![("y", FieldType::Integer)], vec![vec![int(3)]]);
    let ctx_cost = {
        let plan = parser::parse_statement("SELECT * FROM a, b", &db.registry).unwrap();
        let resolved = resolve_schema(&plan, &db, &db, &db.registry).unwrap();
        let compiler = Compiler::new(&db, &db.registry);
        let ctx = Rc::new(EvalContext::new(vec![]));
        compiler.run(&resolved, &ctx).unwrap();
        ctx.op_stats()
    };
    // one stat entry for the join: 2 x 1 rows, factor 1 (join) + 0.1 (true)
    assert_eq!(ctx_cost.len(), 1);
    assert_eq!(ctx_cost[0].num_input_rows, 2);
    assert!((ctx_cost[0].cost_factor - 1.1).abs() < 1e-9);
}

#[test]
fn selection_streams_lazily_after_recording() {
    // the selection's output iterator is pulled one row at a time
    let db = TestDb::new().employees();
    let plan =
        parser::parse_statement("SELECT * FROM employees WHERE employee_id > 0", &db.registry)
            .unwrap();
    let resolved = resolve_schema(&plan, &db, &db, &db.registry).unwrap();
    let compiler = Compiler::new(&db, &db.registry);
    let producer = compiler.compile(&resolved).unwrap();
    let ctx = Rc::new(EvalContext::new(vec![]));
    let mut stream = producer(&ctx).unwrap();
    assert!(stream.next().is_some());
    drop(stream); // consumer stops pulling: cancellation is just dropping
}

#[test]
fn aggregate_state_tracks_first_row_once() {
    // sum over a single row must equal that row's value
    let db = TestDb::new().with_table(
        "one",
        vec![("x", FieldType::Integer)],
        vec![vec![int(42)]],
    );
    let rows = db.run("SELECT sum(x) FROM one").unwrap();
    assert_eq!(values(&rows), vec![vec![int(42)]]);
}

thread_local! {
    static SCANS: RefCell<usize> = const { RefCell::new(0) };
}

#[test]
fn relation_scan_runs_once_per_execution() {
    let schema = Schema::named("t", vec![Field::new("x", FieldType::Integer)]);
    let relation = Expr::Relation(Relation::new(
        "test",
        "t",
        schema,
        Arc::new(|_ctx| {
            SCANS.with(|c| *c.borrow_mut() += 1);
            Ok(rows_from_vec(vec![row(vec![int(1)])]))
        }),
    ));
    let db = TestDb::new();
    let compiler = Compiler::new(&db, &db.registry);
    let ctx = Rc::new(EvalContext::new(vec![]));
    let rows = compiler.run(&relation, &ctx).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(SCANS.with(|c| *c.borrow()), 1);
}
