//! The standard SQL grammar: statement and clause parsing plus the
//! predicate precedence ladder. Extension packs participate through the
//! registry: clause hooks may take over SELECT and WHERE, and registered
//! predicate parsers are tried ahead of the standard ones at each level.

use crate::bundle::ParsersBundle;
use common::{EngineError, EngineResult};
use expr::{BinaryOp, CaseArm, Expr, ItemKey, UnaryOp};
use std::collections::HashMap;
use std::sync::Arc;
use syntax::{
    tokenize, PredLevel, PredParser, PredicateGrammar, SyntaxRegistry, Token, TokenCursor,
};
use types::FieldType;

/// Parse one SQL statement into an unresolved plan tree.
pub fn parse_statement(sql: &str, registry: &SyntaxRegistry) -> EngineResult<Expr> {
    let tokens = tokenize(sql, registry)?;
    let mut cursor = TokenCursor::new(tokens);
    let grammar = Grammar::new(registry);
    let plan = union_stmt(&mut cursor, &grammar)?;
    if !cursor.is_empty() {
        return Err(EngineError::Syntax(format!(
            "incomplete statement, unexpected '{}'",
            cursor.peek().map(|t| t.text()).unwrap_or_default()
        )));
    }
    Ok(plan)
}

/// The precedence ladder with extension parsers spliced in.
pub struct Grammar<'r> {
    registry: &'r SyntaxRegistry,
    bundles: HashMap<PredLevel, ParsersBundle>,
}

impl<'r> Grammar<'r> {
    pub fn new(registry: &'r SyntaxRegistry) -> Self {
        let mut bundles = HashMap::new();
        let standard: [(PredLevel, PredParser); 10] = [
            (PredLevel::Or, Arc::new(|_, c, g| or_exp(c, g))),
            (PredLevel::And, Arc::new(|_, c, g| and_exp(c, g))),
            (PredLevel::Comp, Arc::new(|_, c, g| comparison_exp(c, g))),
            (PredLevel::Add, Arc::new(|_, c, g| additive_exp(c, g))),
            (PredLevel::Mul, Arc::new(|_, c, g| multiplicative_exp(c, g))),
            (PredLevel::Unary, Arc::new(|_, c, g| unary_exp(c, g))),
            (PredLevel::Value, Arc::new(|_, c, g| value_exp(c, g))),
            (PredLevel::Var, Arc::new(|n, c, g| var_exp(n, c, g))),
            (PredLevel::Tuple, Arc::new(|_, c, g| tuple_exp(c, g))),
            (PredLevel::Func, Arc::new(|n, c, g| function_exp(n, c, g))),
        ];
        for (level, parser) in standard {
            let mut bundle = ParsersBundle::new(level, parser);
            for (pack, parser, block_error) in registry.pred_parsers_for(level) {
                bundle.add(pack, parser, block_error);
            }
            bundles.insert(level, bundle);
        }
        Self { registry, bundles }
    }

    pub fn registry(&self) -> &SyntaxRegistry {
        self.registry
    }

    /// Whether a token opens a (possibly extended) SELECT statement, e.g.
    /// `select` or a registered clause keyword like `simselect`.
    fn is_select_keyword(&self, token: &Token) -> bool {
        match token.word() {
            Some(w) => w == "select" || self.registry.is_clause_keyword(w),
            None => false,
        }
    }
}

impl PredicateGrammar for Grammar<'_> {
    fn parse_level(
        &self,
        level: PredLevel,
        name: Option<&str>,
        cursor: &mut TokenCursor,
    ) -> EngineResult<Expr> {
        self.bundles
            .get(&level)
            .ok_or_else(|| EngineError::Registry(format!("no parser bundle for {level:?}")))?
            .parse(name, cursor, self)
    }

    fn parse_select_columns(&self, cursor: &mut TokenCursor) -> EngineResult<Vec<Expr>> {
        select_core_exp(cursor, self)
    }

    fn parse_standard_where(
        &self,
        cursor: &mut TokenCursor,
        relation: Expr,
    ) -> EngineResult<Expr> {
        if cursor.eat("where") {
            let predicate = self.parse_level(PredLevel::Or, None, cursor)?;
            Ok(Expr::selection(relation, predicate))
        } else {
            Ok(relation)
        }
    }

    fn is_terminator(&self, token: &Token) -> bool {
        self.registry.is_terminator(token)
    }
}

// ---- statement level -----------------------------------------------------

fn union_stmt(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    let plan = select_stmt(cursor, grammar)?;
    if cursor.is_empty() {
        return Ok(plan);
    }
    if cursor.looking_at(&["union", "all"]) {
        cursor.advance();
        cursor.advance();
        return Ok(Expr::union_all(plan, union_stmt(cursor, grammar)?));
    }
    Ok(plan)
}

fn select_stmt(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    let mut hooks = grammar.registry.clause_hooks();

    // SELECT clause: at most one extension hook fires; extras only warn.
    let mut select_winner = None;
    for (idx, (pack, hook)) in hooks.iter_mut().enumerate() {
        if hook.trigger_select(cursor) {
            if select_winner.is_some() {
                tracing::warn!(pack = %pack, clause = "select",
                    "multiple clause parsers triggered, keeping the first");
            } else {
                select_winner = Some(idx);
            }
        }
    }
    let select_cols = match select_winner {
        Some(idx) => hooks[idx].1.parse_select(cursor, grammar)?,
        None => {
            if !cursor.eat("select") {
                return Err(EngineError::Syntax(format!(
                    "expected SELECT, found '{}'",
                    cursor.peek().map(|t| t.text()).unwrap_or_default()
                )));
            }
            select_core_exp(cursor, grammar)?
        }
    };

    // FROM clause is never extensible: nested queries make its grammar too
    // fragile for hooks.
    let relation = standard_from(cursor, grammar)?;

    // WHERE clause.
    let mut where_winner = None;
    for (idx, (pack, hook)) in hooks.iter_mut().enumerate() {
        if hook.trigger_where(cursor) {
            if where_winner.is_some() {
                tracing::warn!(pack = %pack, clause = "where",
                    "multiple clause parsers triggered, keeping the first");
            } else {
                where_winner = Some(idx);
            }
        }
    }
    let relation = match where_winner {
        Some(idx) => hooks[idx].1.parse_where(cursor, relation, grammar)?,
        None => grammar.parse_standard_where(cursor, relation)?,
    };

    let mut relation = projection_op(relation, select_cols);

    if cursor.looking_at(&["group", "by"]) {
        cursor.advance();
        cursor.advance();
        relation = Expr::group_by(relation, group_by_core_exp(cursor, grammar)?);
    }

    if cursor.looking_at(&["order", "by"]) {
        cursor.advance();
        cursor.advance();
        relation = Expr::order_by(relation, order_by_core_exp(cursor, grammar)?);
    }

    let mut start = None;
    let mut stop = None;
    if cursor.eat("limit") {
        stop = Some(usize_value(cursor, grammar)?);
    }
    if cursor.eat("offset") {
        let offset = usize_value(cursor, grammar)?;
        start = Some(offset);
        stop = stop.map(|s| s + offset);
    }
    if start.is_some() || stop.is_some() {
        relation = Expr::slice(relation, start.unwrap_or(0), stop);
    }

    Ok(relation)
}

fn usize_value(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<usize> {
    let expr = grammar.parse_level(PredLevel::Value, None, cursor)?;
    match expr {
        Expr::Const(types::Value::Int(i)) if i >= 0 => Ok(i as usize),
        other => Err(EngineError::Syntax(format!(
            "LIMIT/OFFSET expects a non-negative integer, found '{other}'"
        ))),
    }
}

/// `SELECT *` alone keeps the source relation; anything else projects.
fn projection_op(relation: Expr, columns: Vec<Expr>) -> Expr {
    if columns.len() == 1 && matches!(columns[0], Expr::SelectAll { qualifier: None }) {
        relation
    } else {
        Expr::projection(relation, columns)
    }
}

// ---- clause level --------------------------------------------------------

fn select_core_exp(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Vec<Expr>> {
    let mut columns = Vec::new();
    while let Some(token) = cursor.peek() {
        if grammar.is_terminator(token) {
            break;
        }
        columns.push(result_column_exp(cursor, grammar)?);
        cursor.eat(",");
    }
    Ok(columns)
}

fn result_column_exp(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    if cursor.eat("*") {
        return Ok(Expr::SelectAll { qualifier: None });
    }
    let expr = grammar.parse_level(PredLevel::Or, None, cursor)?;
    if let Expr::Var { path } = &expr {
        if cursor.looking_at(&[".", "*"]) {
            cursor.advance();
            cursor.advance();
            return Ok(Expr::SelectAll {
                qualifier: Some(path.clone()),
            });
        }
    }
    if cursor.eat("as") {
        let alias = next_word(cursor, "alias name after AS")?;
        return Ok(Expr::rename(alias, expr));
    }
    Ok(expr)
}

fn standard_from(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    if cursor.eat("from") {
        join_source(cursor, grammar)
    } else {
        // a FROM-less statement selects over the empty relation
        Ok(Expr::load(""))
    }
}

fn join_source(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    let mut source = single_source(cursor, grammar)?;
    while let Some(token) = cursor.peek() {
        let left_join = if token.is(",") || token.is("join") {
            cursor.advance();
            false
        } else if token.is("left") {
            cursor.advance();
            cursor.eat("outer");
            if !cursor.eat("join") {
                return Err(EngineError::Syntax("missing 'join' after 'left'".into()));
            }
            true
        } else {
            break;
        };
        let right = single_source(cursor, grammar)?;
        let predicate = if cursor.eat("on") {
            grammar.parse_level(PredLevel::Or, None, cursor)?
        } else {
            Expr::boolean(true)
        };
        source = if left_join {
            Expr::left_join(source, right, predicate)
        } else {
            Expr::join(source, right, predicate)
        };
    }
    Ok(source)
}

fn single_source(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Expr> {
    let source = if cursor.eat("(") {
        // nested query or parenthesized join chain
        let inner = match cursor.peek() {
            Some(token) if grammar.is_select_keyword(token) => select_stmt(cursor, grammar)?,
            _ => join_source(cursor, grammar)?,
        };
        if !cursor.eat(")") {
            return Err(EngineError::Syntax("expected ')'".into()));
        }
        inner
    } else if cursor.peek_at(1).is_some_and(|t| t.is("("))
        && cursor.peek().and_then(|t| t.word()).is_some()
    {
        let name = next_word(cursor, "function name")?;
        relation_function_exp(name, cursor, grammar)?
    } else {
        let first = next_word(cursor, "relation name")?;
        let name = if cursor.peek().is_some_and(|t| t.is("."))
            && cursor.peek_at(1).and_then(|t| t.word()).is_some()
        {
            cursor.advance();
            let second = next_word(cursor, "relation name")?;
            format!("{first}.{second}")
        } else {
            first
        };
        Expr::load(name)
    };
    alias_tail(source, cursor, grammar)
}

fn alias_tail(
    source: Expr,
    cursor: &mut TokenCursor,
    grammar: &Grammar<'_>,
) -> EngineResult<Expr> {
    match cursor.peek() {
        Some(token) if !token.is(",") && !grammar.is_terminator(token) => {
            cursor.eat("as");
            let alias = next_word(cursor, "alias name")?;
            Ok(Expr::alias(alias, source))
        }
        _ => Ok(source),
    }
}

fn relation_function_exp(
    name: String,
    cursor: &mut TokenCursor,
    grammar: &Grammar<'_>,
) -> EngineResult<Expr> {
    if !cursor.eat("(") {
        return Err(EngineError::Syntax("expected '('".into()));
    }
    let mut args = Vec::new();
    while let Some(token) = cursor.peek() {
        if token.is(")") {
            break;
        }
        if token.is("(") {
            args.push(single_source(cursor, grammar)?);
        } else {
            let expr = grammar.parse_level(PredLevel::Value, None, cursor)?;
            match expr {
                Expr::Var { path } => args.push(Expr::load(path)),
                constant @ Expr::Const(_) => args.push(constant),
                other => {
                    return Err(EngineError::Syntax(format!(
                        "only constants, relation names or nested queries are allowed \
                         as table function arguments, found '{other}'"
                    )))
                }
            }
        }
        cursor.eat(",");
    }
    if !cursor.eat(")") {
        return Err(EngineError::Syntax("expected ')'".into()));
    }
    Ok(Expr::FuncCall { name, args })
}

fn order_by_core_exp(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Vec<Expr>> {
    let mut keys = Vec::new();
    while let Some(token) = cursor.peek() {
        if grammar.is_terminator(token) {
            break;
        }
        let mut key = grammar.parse_level(PredLevel::Value, None, cursor)?;
        if cursor.eat("desc") {
            key = Expr::Desc {
                expr: Box::new(key),
            };
        } else {
            cursor.eat("asc");
        }
        keys.push(key);
        cursor.eat(",");
    }
    Ok(keys)
}

fn group_by_core_exp(cursor: &mut TokenCursor, grammar: &Grammar<'_>) -> EngineResult<Vec<Expr>> {
    let mut keys = Vec::new();
    while let Some(token) = cursor.peek() {
        if grammar.is_terminator(token) {
            break;
        }
        let name = next_word(cursor, "GROUP BY column")?;
        keys.push(grammar.parse_level(PredLevel::Var, Some(&name), cursor)?);
        cursor.eat(",");
    }
    Ok(keys)
}

// ---- predicate precedence ladder -----------------------------------------

fn or_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let mut lhs = grammar.parse_level(PredLevel::And, None, cursor)?;
    while cursor.eat("or") {
        let rhs = grammar.parse_level(PredLevel::And, None, cursor)?;
        lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn and_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let mut lhs = grammar.parse_level(PredLevel::Comp, None, cursor)?;
    while cursor.eat("and") {
        let rhs = grammar.parse_level(PredLevel::Comp, None, cursor)?;
        lhs = Expr::and(lhs, rhs);
    }
    Ok(lhs)
}

fn comparison_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let lhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
    if cursor.is_empty() {
        return Ok(lhs);
    }

    if cursor.looking_at(&["not", "like"]) {
        cursor.advance();
        cursor.advance();
        let rhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
        return Ok(Expr::binary(BinaryOp::NotLike, lhs, rhs));
    }
    if cursor.looking_at(&["not", "rlike"]) {
        cursor.advance();
        cursor.advance();
        let rhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
        return Ok(Expr::binary(BinaryOp::NotRLike, lhs, rhs));
    }

    if cursor.eat("between") {
        let low = grammar.parse_level(PredLevel::Comp, None, cursor)?;
        if !cursor.eat("and") {
            return Err(EngineError::Syntax("missing 'AND' in BETWEEN".into()));
        }
        let high = grammar.parse_level(PredLevel::Comp, None, cursor)?;
        return Ok(Expr::Between {
            expr: Box::new(lhs),
            low: Box::new(low),
            high: Box::new(high),
        });
    }

    if cursor.looking_at(&["in", "("]) {
        cursor.advance();
        cursor.advance();
        let items = grammar.parse_level(PredLevel::Tuple, None, cursor)?;
        return Ok(Expr::In {
            needle: Box::new(lhs),
            items: Box::new(items),
        });
    }
    if cursor.looking_at(&["not", "in", "("]) {
        cursor.advance();
        cursor.advance();
        cursor.advance();
        let items = grammar.parse_level(PredLevel::Tuple, None, cursor)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(Expr::In {
                needle: Box::new(lhs),
                items: Box::new(items),
            }),
        });
    }

    let op = match cursor.peek() {
        Some(t) if t.is("<") => Some(BinaryOp::Lt),
        Some(t) if t.is("<=") => Some(BinaryOp::Le),
        Some(t) if t.is("=") => Some(BinaryOp::Eq),
        Some(t) if t.is("!=") => Some(BinaryOp::Ne),
        Some(t) if t.is(">=") => Some(BinaryOp::Ge),
        Some(t) if t.is(">") => Some(BinaryOp::Gt),
        Some(t) if t.is("is") => Some(BinaryOp::Is),
        Some(t) if t.is("like") => Some(BinaryOp::Like),
        Some(t) if t.is("rlike") => Some(BinaryOp::RLike),
        Some(t) if t.is("regexp") => Some(BinaryOp::RegExp),
        _ => None,
    };
    if let Some(mut op) = op {
        cursor.advance();
        // `is not` is normalized from the two-token form
        if op == BinaryOp::Is && cursor.eat("not") {
            op = BinaryOp::IsNot;
        }
        let rhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
        return Ok(Expr::binary(op, lhs, rhs));
    }

    Ok(lhs)
}

fn additive_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let mut lhs = grammar.parse_level(PredLevel::Mul, None, cursor)?;
    loop {
        let op = match cursor.peek() {
            Some(t) if t.is("+") => BinaryOp::Add,
            Some(t) if t.is("-") => BinaryOp::Sub,
            _ => break,
        };
        cursor.advance();
        let rhs = grammar.parse_level(PredLevel::Mul, None, cursor)?;
        lhs = Expr::binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn multiplicative_exp(
    cursor: &mut TokenCursor,
    grammar: &dyn PredicateGrammar,
) -> EngineResult<Expr> {
    let mut lhs = grammar.parse_level(PredLevel::Unary, None, cursor)?;
    loop {
        let op = match cursor.peek() {
            Some(t) if t.is("*") => BinaryOp::Mul,
            Some(t) if t.is("/") => BinaryOp::Div,
            _ => break,
        };
        cursor.advance();
        let rhs = grammar.parse_level(PredLevel::Unary, None, cursor)?;
        lhs = Expr::binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn unary_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    if cursor.eat("-") {
        let value = grammar.parse_level(PredLevel::Value, None, cursor)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(value),
        });
    }
    if cursor.eat("not") {
        let value = grammar.parse_level(PredLevel::Value, None, cursor)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(value),
        });
    }
    cursor.eat("+");
    grammar.parse_level(PredLevel::Value, None, cursor)
}

fn value_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let token = cursor
        .next()
        .ok_or_else(|| EngineError::Syntax("unexpected end of input".into()))?;

    match token {
        Token::Param { prefix: '$', body } => {
            let key = match body.parse::<usize>() {
                Ok(index) => ItemKey::Index(index),
                Err(_) => ItemKey::Name(body),
            };
            Ok(Expr::ItemGetter { key })
        }
        Token::Param { prefix: '?', body } => {
            let index = body.parse::<usize>().map_err(|_| {
                EngineError::Syntax(format!("invalid parameter reference '?{body}'"))
            })?;
            Ok(Expr::Param { index })
        }
        Token::Param { prefix, body } => Err(EngineError::Syntax(format!(
            "unexpected token '{prefix}{body}'"
        ))),
        Token::Number(digits) => {
            // assemble <digits> '.' <digits> into a float literal
            if cursor.peek().is_some_and(|t| t.is("."))
                && matches!(cursor.peek_at(1), Some(Token::Number(_)))
            {
                cursor.advance();
                let frac = match cursor.next() {
                    Some(Token::Number(frac)) => frac,
                    _ => unreachable!("peeked number"),
                };
                let text = format!("{digits}.{frac}");
                let value = text.parse::<f64>().map_err(|_| {
                    EngineError::Syntax(format!("invalid float literal '{text}'"))
                })?;
                Ok(Expr::float(value))
            } else {
                let value = digits.parse::<i64>().map_err(|_| {
                    EngineError::Syntax(format!("invalid integer literal '{digits}'"))
                })?;
                Ok(Expr::int(value))
            }
        }
        Token::Str { body, .. } => Ok(Expr::string(body)),
        Token::Symbol(s) if s == "(" => grammar.parse_level(PredLevel::Tuple, None, cursor),
        Token::Word(w) if w == "null" => Ok(Expr::null()),
        Token::Word(w) if w == "true" => Ok(Expr::boolean(true)),
        Token::Word(w) if w == "false" => Ok(Expr::boolean(false)),
        Token::Word(w) if w == "case" => case_when_core_exp(cursor, grammar),
        Token::Word(w) if w == "cast" => cast_core_exp(cursor, grammar),
        Token::Word(w) => {
            if cursor.peek().is_some_and(|t| t.is("(")) {
                grammar.parse_level(PredLevel::Func, Some(&w), cursor)
            } else {
                grammar.parse_level(PredLevel::Var, Some(&w), cursor)
            }
        }
        other => Err(EngineError::ParsingFailure(format!(
            "unexpected token '{}'",
            other.text()
        ))),
    }
}

fn tuple_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    let mut exprs = Vec::new();
    let mut is_tuple = false;
    if cursor.peek().is_some_and(|t| !t.is(")")) {
        exprs.push(grammar.parse_level(PredLevel::Or, None, cursor)?);
        while cursor.eat(",") {
            is_tuple = true;
            exprs.push(grammar.parse_level(PredLevel::Or, None, cursor)?);
        }
    }
    if !cursor.eat(")") {
        return Err(EngineError::Syntax("missing closing ')'".into()));
    }
    // a single parenthesized expression is just grouping, not a tuple
    if exprs.len() == 1 && !is_tuple {
        Ok(exprs.pop().unwrap_or_else(Expr::null))
    } else {
        Ok(Expr::Tuple { exprs })
    }
}

fn function_exp(
    name: Option<&str>,
    cursor: &mut TokenCursor,
    grammar: &dyn PredicateGrammar,
) -> EngineResult<Expr> {
    let name = name
        .ok_or_else(|| EngineError::Syntax("function parser requires a name".into()))?
        .to_string();
    if !cursor.eat("(") {
        return Err(EngineError::Syntax("expected '('".into()));
    }
    // `count(*)` and friends take the whole row
    if cursor.looking_at(&["*", ")"]) {
        cursor.advance();
        cursor.advance();
        return Ok(Expr::FuncCall {
            name,
            args: vec![Expr::SelectAll { qualifier: None }],
        });
    }
    let args = match grammar.parse_level(PredLevel::Tuple, None, cursor)? {
        Expr::Tuple { exprs } => exprs,
        single => vec![single],
    };
    Ok(Expr::FuncCall { name, args })
}

fn var_exp(
    name: Option<&str>,
    cursor: &mut TokenCursor,
    _grammar: &dyn PredicateGrammar,
) -> EngineResult<Expr> {
    let name = name
        .ok_or_else(|| EngineError::Syntax("variable parser requires a name".into()))?
        .to_string();
    if name == "is" || name == "in" {
        return Err(EngineError::Syntax(format!("invalid syntax near '{name}'")));
    }
    let mut path = vec![name];
    while cursor.peek().is_some_and(|t| t.is("."))
        && cursor.peek_at(1).and_then(|t| t.word()).is_some()
    {
        // stop before `.*`, the caller turns that into a qualified select-all
        cursor.advance();
        match cursor.next() {
            Some(Token::Word(part)) => path.push(part),
            _ => unreachable!("peeked word"),
        }
    }
    Ok(Expr::var(path.join(".")))
}

fn case_when_core_exp(
    cursor: &mut TokenCursor,
    grammar: &dyn PredicateGrammar,
) -> EngineResult<Expr> {
    if !cursor.peek().is_some_and(|t| t.is("when")) {
        return Err(EngineError::Syntax("expected WHEN after CASE".into()));
    }
    let mut arms = Vec::new();
    while cursor.eat("when") {
        let when = grammar.parse_level(PredLevel::Or, None, cursor)?;
        if !cursor.eat("then") {
            return Err(EngineError::Syntax("expected THEN".into()));
        }
        let then = grammar.parse_level(PredLevel::Or, None, cursor)?;
        arms.push(CaseArm { when, then });
    }
    let default = if cursor.eat("else") {
        Some(Box::new(grammar.parse_level(PredLevel::Or, None, cursor)?))
    } else {
        None
    };
    if !cursor.eat("end") {
        return Err(EngineError::Syntax("expected END".into()));
    }
    Ok(Expr::Case { arms, default })
}

fn cast_core_exp(cursor: &mut TokenCursor, grammar: &dyn PredicateGrammar) -> EngineResult<Expr> {
    if !cursor.eat("(") {
        return Err(EngineError::Syntax("expected '(' after CAST".into()));
    }
    let expr = grammar.parse_level(PredLevel::Or, None, cursor)?;
    if !cursor.eat("as") {
        return Err(EngineError::Syntax("expected AS in CAST".into()));
    }
    let ty_word = next_word(cursor, "type name in CAST")?;
    let ty = match ty_word.to_lowercase().as_str() {
        "integer" | "int" => FieldType::Integer,
        "float" => FieldType::Float,
        "string" | "text" => FieldType::String,
        "boolean" | "bool" => FieldType::Boolean,
        "date" => FieldType::Date,
        other => {
            return Err(EngineError::Syntax(format!(
                "unknown type '{other}' in CAST"
            )))
        }
    };
    if !cursor.eat(")") {
        return Err(EngineError::Syntax("expected ')' after CAST".into()));
    }
    Ok(Expr::Cast {
        expr: Box::new(expr),
        ty,
    })
}

fn next_word(cursor: &mut TokenCursor, what: &str) -> EngineResult<String> {
    match cursor.next() {
        Some(Token::Word(w)) => Ok(w),
        Some(other) => Err(EngineError::Syntax(format!(
            "expected {what}, found '{}'",
            other.text()
        ))),
        None => Err(EngineError::Syntax(format!(
            "expected {what}, found end of input"
        ))),
    }
}
