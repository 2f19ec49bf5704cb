//! Small helpers both packs use: numeric literal reading inside bracketed
//! literals, clause scanning for trigger keywords, and a selection-shaped
//! producer for extended relational operators.

use common::{EngineError, EngineResult, Rows};
use expr::cost::refined_cost_factor;
use expr::Expr;
use std::rc::Rc;
use syntax::{PlanCompiler, RelProducer, Token, TokenCursor};

/// Read one non-negative numeric literal, assembling `<digits> '.' <digits>`
/// like the core grammar does.
pub(crate) fn read_number(cursor: &mut TokenCursor, closing: &str) -> EngineResult<f64> {
    match cursor.next() {
        Some(Token::Number(digits)) => {
            if cursor.peek().is_some_and(|t| t.is("."))
                && matches!(cursor.peek_at(1), Some(Token::Number(_)))
            {
                cursor.advance();
                let frac = match cursor.next() {
                    Some(Token::Number(frac)) => frac,
                    _ => unreachable!("peeked number"),
                };
                format!("{digits}.{frac}").parse::<f64>().map_err(|_| {
                    EngineError::Syntax(format!("invalid number '{digits}.{frac}'"))
                })
            } else {
                digits
                    .parse::<f64>()
                    .map_err(|_| EngineError::Syntax(format!("invalid number '{digits}'")))
            }
        }
        Some(other) => Err(EngineError::Syntax(format!(
            "expected a number before '{closing}', found '{}'",
            other.text()
        ))),
        None => Err(EngineError::Syntax(format!("missing closing '{closing}'"))),
    }
}

/// Whether `word` occurs among the tokens before the first `from`, the
/// region a SELECT-clause trigger may inspect. Nested queries are checked
/// on their own recursive parse.
pub(crate) fn word_before_from(tokens: &[Token], word: &str) -> bool {
    let end = tokens
        .iter()
        .position(|t| t.is("from"))
        .unwrap_or(tokens.len());
    tokens[..end].iter().any(|t| t.is(word))
}

/// Whether `word` occurs before the next clause boundary (`select`, `from`,
/// `where`, or the pack's own clause keyword).
pub(crate) fn word_in_clause(tokens: &[Token], word: &str, clause_keyword: &str) -> bool {
    for token in tokens {
        if token.is("select")
            || token.is("from")
            || token.is("where")
            || token.is(clause_keyword)
        {
            return false;
        }
        if token.is(word) {
            return true;
        }
    }
    false
}

pub(crate) fn anywhere(tokens: &[Token], word: &str) -> bool {
    tokens.iter().any(|t| t.is(word))
}

/// Compile an extended selection: filter the child's rows by the node's
/// predicate, recording cost statistics like the built-in selection does.
pub(crate) fn selection_like_executor(
    node: &Expr,
    compiler: &dyn PlanCompiler,
) -> EngineResult<RelProducer> {
    let Expr::ExtRel {
        input, predicate, ..
    } = node
    else {
        return Err(EngineError::ExtensionInternal(
            "expected an extended relational node".into(),
        ));
    };
    let input_schema = input.schema().ok_or_else(|| {
        EngineError::PlannerInternal("extended selection over an unresolved input".into())
    })?;
    let child = compiler.compile_rel(input)?;
    let predicate = predicate
        .as_deref()
        .map(|p| compiler.compile_scalar(p, input_schema))
        .transpose()?
        .map(Rc::new);
    let factor = refined_cost_factor(node);
    Ok(Box::new(move |ctx| {
        let rows = executor::materialize(child(ctx)?)?;
        ctx.record_stat(rows.len() as u64, factor);
        match &predicate {
            None => Ok(executor::rows_from_vec(rows)),
            Some(predicate) => {
                let predicate = Rc::clone(predicate);
                let ctx = Rc::clone(ctx);
                Ok(Box::new(rows.into_iter().filter_map(move |row| {
                    match (predicate.as_ref())(&row, &ctx) {
                        Ok(v) if v.truthy() => Some(Ok(row)),
                        Ok(_) => None,
                        Err(err) => Some(Err(err)),
                    }
                })) as Rows)
            }
        }
    }))
}
