use crate::parse_statement;
use common::EngineError;
use expr::{BinaryOp, Expr, ItemKey, UnaryOp};
use pretty_assertions::assert_eq;
use syntax::SyntaxRegistry;
use types::{FieldType, Value};

fn parse(sql: &str) -> Expr {
    let registry = SyntaxRegistry::default();
    parse_statement(sql, &registry).unwrap()
}

fn parse_err(sql: &str) -> EngineError {
    let registry = SyntaxRegistry::default();
    parse_statement(sql, &registry).unwrap_err()
}

#[test]
fn select_star_is_just_the_load() {
    assert_eq!(parse("SELECT * FROM employees"), Expr::load("employees"));
}

#[test]
fn select_columns_projects() {
    assert_eq!(
        parse("SELECT employee_id, full_name FROM employees"),
        Expr::projection(
            Expr::load("employees"),
            vec![Expr::var("employee_id"), Expr::var("full_name")],
        )
    );
}

#[test]
fn qualified_star_keeps_the_qualifier() {
    assert_eq!(
        parse("SELECT musical.* FROM musical"),
        Expr::projection(
            Expr::load("musical"),
            vec![Expr::SelectAll {
                qualifier: Some("musical".into())
            }],
        )
    );
}

#[test]
fn where_builds_a_selection() {
    assert_eq!(
        parse("SELECT * FROM t WHERE x > 10"),
        Expr::selection(
            Expr::load("t"),
            Expr::binary(BinaryOp::Gt, Expr::var("x"), Expr::int(10)),
        )
    );
}

#[test]
fn predicate_precedence_or_under_and() {
    // a = 1 OR b = 2 AND c = 3  parses as  a = 1 OR (b = 2 AND c = 3)
    let plan = parse("SELECT * FROM t WHERE a = 1 OR b = 2 AND c = 3");
    let expected = Expr::binary(
        BinaryOp::Or,
        Expr::binary(BinaryOp::Eq, Expr::var("a"), Expr::int(1)),
        Expr::and(
            Expr::binary(BinaryOp::Eq, Expr::var("b"), Expr::int(2)),
            Expr::binary(BinaryOp::Eq, Expr::var("c"), Expr::int(3)),
        ),
    );
    assert_eq!(plan, Expr::selection(Expr::load("t"), expected));
}

#[test]
fn arithmetic_precedence_mul_over_add() {
    let plan = parse("SELECT a + b * 2 FROM t");
    assert_eq!(
        plan,
        Expr::projection(
            Expr::load("t"),
            vec![Expr::binary(
                BinaryOp::Add,
                Expr::var("a"),
                Expr::binary(BinaryOp::Mul, Expr::var("b"), Expr::int(2)),
            )],
        )
    );
}

#[test]
fn float_literals_are_assembled() {
    let plan = parse("SELECT * FROM t WHERE x < 1.5");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::load("t"),
            Expr::binary(BinaryOp::Lt, Expr::var("x"), Expr::float(1.5)),
        )
    );
}

#[test]
fn between_lowers_to_between_op() {
    let plan = parse("SELECT * FROM t WHERE x BETWEEN 1 AND 5");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::load("t"),
            Expr::Between {
                expr: Box::new(Expr::var("x")),
                low: Box::new(Expr::int(1)),
                high: Box::new(Expr::int(5)),
            },
        )
    );
}

#[test]
fn in_and_not_in_lower_to_in_op() {
    let plan = parse("SELECT * FROM t WHERE x IN (1, 2)");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::load("t"),
            Expr::In {
                needle: Box::new(Expr::var("x")),
                items: Box::new(Expr::Tuple {
                    exprs: vec![Expr::int(1), Expr::int(2)],
                }),
            },
        )
    );

    let plan = parse("SELECT * FROM t WHERE x NOT IN (1, 2)");
    match plan {
        Expr::Selection { predicate, .. } => {
            assert!(matches!(
                predicate.as_deref(),
                Some(Expr::Unary {
                    op: UnaryOp::Not,
                    ..
                })
            ));
        }
        other => panic!("expected selection, got {other}"),
    }
}

#[test]
fn is_not_is_normalized() {
    let plan = parse("SELECT * FROM t WHERE x IS NOT null");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::load("t"),
            Expr::binary(BinaryOp::IsNot, Expr::var("x"), Expr::null()),
        )
    );
}

#[test]
fn join_chain_with_on_predicates() {
    let plan = parse(
        "SELECT musical.title FROM animation JOIN musical ON animation.mid = musical.mid",
    );
    assert_eq!(
        plan,
        Expr::projection(
            Expr::join(
                Expr::load("animation"),
                Expr::load("musical"),
                Expr::binary(
                    BinaryOp::Eq,
                    Expr::var("animation.mid"),
                    Expr::var("musical.mid"),
                ),
            ),
            vec![Expr::var("musical.title")],
        )
    );
}

#[test]
fn cross_product_uses_true_predicate() {
    let plan = parse("SELECT * FROM a, b");
    assert_eq!(
        plan,
        Expr::join(Expr::load("a"), Expr::load("b"), Expr::boolean(true))
    );
}

#[test]
fn left_outer_join_parses() {
    let plan = parse("SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id");
    assert!(matches!(plan, Expr::LeftJoin { .. }));
}

#[test]
fn sources_can_be_aliased() {
    assert_eq!(
        parse("SELECT * FROM employees AS e"),
        Expr::alias("e", Expr::load("employees"))
    );
    assert_eq!(
        parse("SELECT * FROM employees e"),
        Expr::alias("e", Expr::load("employees"))
    );
}

#[test]
fn nested_select_as_source() {
    let plan = parse("SELECT * FROM (SELECT employee_id FROM employees) ids");
    assert_eq!(
        plan,
        Expr::alias(
            "ids",
            Expr::projection(Expr::load("employees"), vec![Expr::var("employee_id")]),
        )
    );
}

#[test]
fn group_order_limit_offset_tail() {
    let plan = parse(
        "SELECT dept, count(employee_id) FROM employees \
         GROUP BY dept ORDER BY dept DESC LIMIT 10 OFFSET 5",
    );
    // Slice(OrderBy(GroupBy(Projection)))
    match &plan {
        Expr::Slice {
            input, start, stop, ..
        } => {
            assert_eq!((*start, *stop), (5, Some(15)));
            match input.as_ref() {
                Expr::OrderBy { input, keys, .. } => {
                    assert_eq!(
                        keys,
                        &vec![Expr::Desc {
                            expr: Box::new(Expr::var("dept"))
                        }]
                    );
                    assert!(matches!(input.as_ref(), Expr::GroupBy { .. }));
                }
                other => panic!("expected order by, got {other}"),
            }
        }
        other => panic!("expected slice, got {other}"),
    }
}

#[test]
fn limit_only_slices_from_zero() {
    let plan = parse("SELECT * FROM t LIMIT 3");
    assert_eq!(plan, Expr::slice(Expr::load("t"), 0, Some(3)));
}

#[test]
fn offset_only_has_open_stop() {
    let plan = parse("SELECT * FROM t OFFSET 4");
    assert_eq!(plan, Expr::slice(Expr::load("t"), 4, None));
}

#[test]
fn union_all_chains_selects() {
    let plan = parse("SELECT * FROM a UNION ALL SELECT * FROM b UNION ALL SELECT * FROM c");
    assert_eq!(
        plan,
        Expr::union_all(
            Expr::load("a"),
            Expr::union_all(Expr::load("b"), Expr::load("c")),
        )
    );
}

#[test]
fn case_when_and_cast() {
    let plan = parse("SELECT CASE WHEN x > 0 THEN 'pos' ELSE 'neg' END, CAST(x AS float) FROM t");
    match &plan {
        Expr::Projection { exprs, .. } => {
            assert!(matches!(exprs[0], Expr::Case { .. }));
            assert_eq!(
                exprs[1],
                Expr::Cast {
                    expr: Box::new(Expr::var("x")),
                    ty: FieldType::Float,
                }
            );
        }
        other => panic!("expected projection, got {other}"),
    }
}

#[test]
fn params_and_item_getters() {
    let plan = parse("SELECT $0 FROM t WHERE x = ?1");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::projection(
                Expr::load("t"),
                vec![Expr::ItemGetter {
                    key: ItemKey::Index(0)
                }],
            ),
            Expr::binary(BinaryOp::Eq, Expr::var("x"), Expr::Param { index: 1 }),
        )
    );
}

#[test]
fn where_binds_before_projection() {
    // WHERE is parsed against the FROM source; projection wraps the selection
    let plan = parse("SELECT a FROM t WHERE b = 1");
    assert!(matches!(plan, Expr::Projection { .. }));
    let Expr::Projection { input, .. } = plan else {
        unreachable!()
    };
    assert!(matches!(*input, Expr::Selection { .. }));
}

#[test]
fn aliased_result_columns() {
    let plan = parse("SELECT employee_id AS id FROM employees");
    assert_eq!(
        plan,
        Expr::projection(
            Expr::load("employees"),
            vec![Expr::rename("id", Expr::var("employee_id"))],
        )
    );
}

#[test]
fn string_literals_keep_spaces() {
    let plan = parse("SELECT * FROM t WHERE name = 'Toy Story'");
    assert_eq!(
        plan,
        Expr::selection(
            Expr::load("t"),
            Expr::binary(
                BinaryOp::Eq,
                Expr::var("name"),
                Expr::Const(Value::Str("Toy Story".into())),
            ),
        )
    );
}

#[test]
fn missing_select_is_a_syntax_error() {
    assert!(matches!(parse_err("FROM t"), EngineError::Syntax(_)));
}

#[test]
fn unbalanced_parens_are_a_syntax_error() {
    assert!(matches!(
        parse_err("SELECT * FROM (SELECT * FROM t"),
        EngineError::Syntax(_)
    ));
}

#[test]
fn trailing_garbage_is_reported() {
    assert!(matches!(
        parse_err("SELECT * FROM t UNION SELECT * FROM u"),
        EngineError::Syntax(_)
    ));
}

#[test]
fn like_operators_parse() {
    let plan = parse("SELECT * FROM t WHERE name LIKE 'T%' AND name NOT LIKE '%y'");
    let Expr::Selection { predicate, .. } = plan else {
        panic!("expected selection")
    };
    let Some(pred) = predicate else {
        panic!("expected predicate")
    };
    let Expr::Binary { op, lhs, rhs } = *pred else {
        panic!("expected AND")
    };
    assert_eq!(op, BinaryOp::And);
    assert!(matches!(
        *lhs,
        Expr::Binary {
            op: BinaryOp::Like,
            ..
        }
    ));
    assert!(matches!(
        *rhs,
        Expr::Binary {
            op: BinaryOp::NotLike,
            ..
        }
    ));
}
