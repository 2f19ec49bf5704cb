use common::{EngineError, EngineResult};
use expr::Expr;
use syntax::{PredLevel, PredParser, PredicateGrammar, TokenCursor};

/// Ordered list of parsers tried sequentially at one precedence level.
///
/// The first parser that does not report a `ParsingFailure` wins; the
/// informational failure only means "not my syntax" and never interrupts
/// parsing. Any other error propagates unless the parser was registered
/// with `block_error`, in which case everything is swallowed and the next
/// parser gets its turn. Extension parsers sit ahead of the standard parser
/// in registration order.
pub struct ParsersBundle {
    level: PredLevel,
    parsers: Vec<(String, PredParser, bool)>,
}

impl ParsersBundle {
    pub fn new(level: PredLevel, standard: PredParser) -> Self {
        Self {
            level,
            parsers: vec![("standard".to_string(), standard, false)],
        }
    }

    /// Insert an extension parser ahead of the standard parser but behind
    /// previously added extensions.
    pub fn add(&mut self, pack: impl Into<String>, parser: PredParser, block_error: bool) {
        let last = self.parsers.len() - 1;
        self.parsers.insert(last, (pack.into(), parser, block_error));
    }

    pub fn parse(
        &self,
        name: Option<&str>,
        cursor: &mut TokenCursor,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Expr> {
        let mark = cursor.pos();
        for (pack, parser, block_error) in &self.parsers {
            match (parser.as_ref())(name, cursor, grammar) {
                Ok(expr) => return Ok(expr),
                Err(err) if err.is_parsing_failure() => {
                    cursor.set_pos(mark);
                }
                Err(err) => {
                    if *block_error {
                        cursor.set_pos(mark);
                    } else {
                        tracing::error!(pack = %pack, level = ?self.level, error = %err,
                            "predicate parser raised an error");
                        return Err(err);
                    }
                }
            }
        }
        Err(EngineError::Syntax(format!(
            "could not parse tokens near '{}' with any parser of level {:?}",
            cursor
                .peek()
                .map(|t| t.text())
                .unwrap_or_else(|| "<end of input>".to_string()),
            self.level
        )))
    }
}
