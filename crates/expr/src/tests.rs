use super::*;
use crate::cost::{initial_cost_factor, refined_cost_factor};
use crate::predicate::and_join;
use pretty_assertions::assert_eq;
use schema::{Field, Schema};
use types::FieldType;

fn employees_schema() -> Schema {
    Schema::named(
        "employees",
        vec![
            Field::new("employee_id", FieldType::Integer),
            Field::new("full_name", FieldType::String),
        ],
    )
}

fn bound_employees() -> Expr {
    let schema = employees_schema();
    Expr::Relation(Relation::new(
        "mock",
        "employees",
        schema,
        Arc::new(|_ctx| Ok(Box::new(std::iter::empty()) as Rows)),
    ))
}

fn resolved_selection() -> Expr {
    let rel = bound_employees();
    let schema = rel.schema().unwrap().clone();
    let mut sel = Expr::selection(
        rel,
        Expr::binary(BinaryOp::Gt, Expr::var("employee_id"), Expr::int(100)),
    );
    sel.set_schema(schema);
    sel
}

#[test]
fn equality_ignores_schema_by_default() {
    let unresolved = Expr::selection(
        Expr::load("employees"),
        Expr::binary(BinaryOp::Gt, Expr::var("employee_id"), Expr::int(100)),
    );
    let mut resolved = unresolved.clone();
    resolved.set_schema(employees_schema());
    assert_eq!(unresolved, resolved);
    assert!(!unresolved.equal(
        &resolved,
        &EqOptions {
            ignore_schema: false,
            match_load_and_relation: false,
        }
    ));
}

#[test]
fn load_matches_relation_only_when_asked() {
    let load = Expr::load("employees");
    let relation = bound_employees();
    assert_ne!(load, relation);
    assert!(load.equal(
        &relation,
        &EqOptions {
            ignore_schema: true,
            match_load_and_relation: true,
        }
    ));
    let other = Expr::load("departments");
    assert!(!other.equal(
        &relation,
        &EqOptions {
            ignore_schema: true,
            match_load_and_relation: true,
        }
    ));
}

#[test]
fn deep_copy_is_value_equal_and_disjoint() {
    let plan = resolved_selection();
    let copy = plan.deep_copy();
    assert!(plan.equal_resolved(&copy).unwrap());
    // distinct allocations for the relational child
    let orig_child = plan.rel_children()[0] as *const Expr;
    let copy_child = copy.rel_children()[0] as *const Expr;
    assert_ne!(orig_child, copy_child);
}

#[test]
fn resolve_status_uses_root_as_proxy() {
    assert!(!Expr::load("t").is_resolved());
    assert!(bound_employees().is_resolved());
    assert!(resolved_selection().is_resolved());
    let unresolved = Expr::selection(Expr::load("t"), Expr::boolean(true));
    assert!(!unresolved.is_resolved());
}

#[test]
fn traversal_orders_cover_all_relational_nodes() {
    // Projection over Join(Load(a), Selection(Load(b)))
    let plan = Expr::projection(
        Expr::join(
            Expr::load("a"),
            Expr::selection(Expr::load("b"), Expr::boolean(true)),
            Expr::boolean(true),
        ),
        vec![Expr::SelectAll { qualifier: None }],
    );
    let dfs: Vec<ExprKind> = plan
        .rel_paths(TraversalOrder::DepthFirst)
        .iter()
        .map(|p| plan.node_at(p).unwrap().kind())
        .collect();
    assert_eq!(
        dfs,
        vec![
            ExprKind::Projection,
            ExprKind::Join,
            ExprKind::Load,
            ExprKind::Selection,
            ExprKind::Load,
        ]
    );
    let bfs: Vec<ExprKind> = plan
        .rel_paths(TraversalOrder::Topological)
        .iter()
        .map(|p| plan.node_at(p).unwrap().kind())
        .collect();
    assert_eq!(
        bfs,
        vec![
            ExprKind::Projection,
            ExprKind::Join,
            ExprKind::Load,
            ExprKind::Selection,
            ExprKind::Load,
        ]
    );
}

#[test]
fn replace_at_swaps_a_subtree() {
    let mut plan = Expr::projection(Expr::load("a"), vec![Expr::SelectAll { qualifier: None }]);
    let path = NodePath(vec![0]);
    plan.replace_at(&path, Expr::load("b")).unwrap();
    assert_eq!(plan.node_at(&path).unwrap(), &Expr::load("b"));
    assert!(plan.replace_at(&NodePath(vec![5]), Expr::load("c")).is_err());
}

#[test]
fn predicate_collects_var_sources() {
    let pred = Predicate::new(Expr::and(
        Expr::binary(BinaryOp::Lt, Expr::var("a.x"), Expr::int(10)),
        Expr::binary(BinaryOp::Eq, Expr::var("b.y"), Expr::var("a.x")),
    ))
    .unwrap();
    assert_eq!(pred.sources(), &["a.x".to_string(), "b.y".to_string()]);
}

#[test]
fn predicate_rejects_function_values() {
    let pred = Predicate::new(Expr::binary(
        BinaryOp::Eq,
        Expr::FuncCall {
            name: "sqrt".into(),
            args: vec![Expr::var("x")],
        },
        Expr::int(2),
    ));
    assert!(matches!(pred, Err(EngineError::PlannerInternal(_))));
}

#[test]
fn decorrelate_groups_by_related_node() {
    let left = bound_employees();
    let mut right_schema_rel = bound_employees();
    right_schema_rel.set_schema(Schema::named(
        "departments",
        vec![Field::new("dept_id", FieldType::Integer)],
    ));

    let pred = Predicate::new(and_join(vec![
        Expr::binary(BinaryOp::Lt, Expr::var("employee_id"), Expr::int(10)),
        Expr::binary(BinaryOp::Gt, Expr::var("dept_id"), Expr::int(3)),
        Expr::binary(BinaryOp::Eq, Expr::int(1), Expr::int(1)),
    ])
    .unwrap())
    .unwrap();

    let parts = pred
        .decorrelate_and(&[&left, &right_schema_rel])
        .unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].1, vec![0]);
    assert_eq!(parts[1].1, vec![1]);
    assert_eq!(parts[2].1, Vec::<usize>::new());

    let groups = Predicate::group(parts);
    assert_eq!(groups.len(), 3);
}

#[test]
fn decorrelate_dedupes_identical_conjuncts() {
    let left = bound_employees();
    let conjunct = Expr::binary(BinaryOp::Lt, Expr::var("employee_id"), Expr::int(10));
    let pred = Predicate::new(Expr::and(conjunct.clone(), conjunct)).unwrap();
    let parts = pred.decorrelate_and(&[&left]).unwrap();
    assert_eq!(parts.len(), 1);
}

#[test]
fn refined_factor_folds_predicate_costs() {
    // Selection with predicate employee_id > 100:
    //   selection 1.0 + (Gt 1.0 + Var 0.1 + Const 0.1) = 2.2
    let plan = resolved_selection();
    assert!((refined_cost_factor(&plan) - 2.2).abs() < 1e-9);
    // leaves are never refined
    assert_eq!(refined_cost_factor(&bound_employees()), 0.0);
    assert_eq!(initial_cost_factor(&Expr::null()), 0.0);
}

#[test]
fn display_reads_like_sql() {
    let e = Expr::and(
        Expr::binary(BinaryOp::Le, Expr::var("a.x"), Expr::int(3)),
        Expr::binary(BinaryOp::Like, Expr::var("name"), Expr::string("T%")),
    );
    assert_eq!(e.to_string(), "a.x <= 3 AND name LIKE 'T%'");
}
