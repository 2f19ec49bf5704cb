//! The extension registry: the single table of pluggable syntax packs.
//!
//! A pack contributes any subset of lexer symbols, clause keywords, clause
//! parser hooks, predicate parsers at fixed precedence levels, field types,
//! and extension operators with their schema resolvers and executors. The
//! registry owns the tag allocation; the packs capture their tags in the
//! closures they register.

use crate::token::{Token, TokenCursor};
use crate::{lexer, PlanCompiler, PredicateGrammar, RelProducer, ScalarFn};
use common::{EngineError, EngineResult};
use expr::Expr;
use schema::Schema;
use std::sync::Arc;
use types::{ExtOpTag, ExtTypeId, FieldType};

/// Precedence levels of the predicate grammar, lowest binding first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredLevel {
    Or,
    And,
    Comp,
    Add,
    Mul,
    Unary,
    Value,
    Var,
    Tuple,
    Func,
}

/// A predicate parser: `name` is only passed at the VAR/FUNC levels, where
/// the value parser has already consumed the leading word.
pub type PredParser =
    Arc<dyn Fn(Option<&str>, &mut TokenCursor, &dyn PredicateGrammar) -> EngineResult<Expr>>;

/// Per-query clause hooks of one pack. A fresh instance is created for each
/// `select_stmt` so trigger state never leaks between queries.
pub trait ClauseHooks {
    fn trigger_select(&mut self, cursor: &TokenCursor) -> bool {
        let _ = cursor;
        false
    }

    fn parse_select(
        &mut self,
        cursor: &mut TokenCursor,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Vec<Expr>> {
        let _ = (cursor, grammar);
        Err(EngineError::ExtensionInternal(
            "pack registered no SELECT clause parser".into(),
        ))
    }

    fn trigger_where(&mut self, cursor: &TokenCursor) -> bool {
        let _ = cursor;
        false
    }

    fn parse_where(
        &mut self,
        cursor: &mut TokenCursor,
        relation: Expr,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Expr> {
        let _ = (cursor, grammar);
        Err(EngineError::ExtensionInternal(
            "pack registered no WHERE clause parser".into(),
        ))
    }
}

pub type ClauseHooksFactory = Arc<dyn Fn() -> Box<dyn ClauseHooks>>;

/// Compiles an extension scalar operator to a row-level evaluator.
pub type ScalarOpExecutor =
    Arc<dyn Fn(&Expr, &Schema, &dyn PlanCompiler) -> EngineResult<ScalarFn>>;

/// Computes the output schema of an extension relational operator whose
/// children are already resolved.
pub type RelOpSchemaFn = Arc<dyn Fn(&Expr) -> EngineResult<Schema>>;

/// Compiles an extension relational operator to a row-stream producer.
pub type RelOpExecutor = Arc<dyn Fn(&Expr, &dyn PlanCompiler) -> EngineResult<RelProducer>>;

pub struct ExtTypeDef {
    pub pack: String,
    pub id: ExtTypeId,
    pub name: String,
}

pub struct ScalarOpDef {
    pub pack: String,
    pub tag: ExtOpTag,
    pub name: String,
    pub result: FieldType,
    pub executor: ScalarOpExecutor,
}

pub struct RelOpDef {
    pub pack: String,
    pub tag: ExtOpTag,
    pub name: String,
    pub schema_fn: Option<RelOpSchemaFn>,
    pub executor: RelOpExecutor,
}

pub(crate) struct PredParserEntry {
    pub pack: String,
    pub level: PredLevel,
    pub parser: PredParser,
    pub block_error: bool,
}

struct HookDef {
    pack: String,
    factory: ClauseHooksFactory,
}

/// A pluggable syntax pack.
pub trait SyntaxPack {
    fn name(&self) -> &str;
    fn install(&self, session: &mut PackSession<'_>) -> EngineResult<()>;
}

/// Registry of installed packs. Scoped to a dataset, not process-wide.
#[derive(Default)]
pub struct SyntaxRegistry {
    installed: Vec<String>,
    symbols: Vec<(char, String)>,
    clause_keywords: Vec<(String, String)>,
    soft_keywords: Vec<(String, String)>,
    pred_parsers: Vec<PredParserEntry>,
    types: Vec<ExtTypeDef>,
    scalar_ops: Vec<ScalarOpDef>,
    rel_ops: Vec<RelOpDef>,
    hooks: Vec<HookDef>,
    next_type_id: u32,
    next_op_tag: u32,
}

impl SyntaxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a pack. Installing the same pack twice warns and is a no-op.
    pub fn install(&mut self, pack: &dyn SyntaxPack) -> EngineResult<()> {
        let name = pack.name().to_string();
        if self.installed.contains(&name) {
            tracing::warn!(pack = %name, "syntax pack already installed, skipping");
            return Ok(());
        }
        let mut session = PackSession {
            registry: self,
            pack: name.clone(),
        };
        pack.install(&mut session)?;
        self.installed.push(name);
        Ok(())
    }

    /// Remove every contribution of a pack.
    pub fn uninstall(&mut self, pack_name: &str) {
        self.installed.retain(|p| p != pack_name);
        self.symbols.retain(|(_, p)| p != pack_name);
        self.clause_keywords.retain(|(_, p)| p != pack_name);
        self.soft_keywords.retain(|(_, p)| p != pack_name);
        self.pred_parsers.retain(|e| e.pack != pack_name);
        self.types.retain(|t| t.pack != pack_name);
        self.scalar_ops.retain(|o| o.pack != pack_name);
        self.rel_ops.retain(|o| o.pack != pack_name);
        self.hooks.retain(|h| h.pack != pack_name);
    }

    pub fn installed_packs(&self) -> &[String] {
        &self.installed
    }

    // ---- lexer surface ----

    pub fn is_symbol(&self, c: char) -> bool {
        lexer::DEFAULT_SYMBOLS.contains(&c) || self.symbols.iter().any(|(s, _)| *s == c)
    }

    pub fn extension_symbols(&self) -> Vec<char> {
        self.symbols.iter().map(|(c, _)| *c).collect()
    }

    pub fn is_reserved_word(&self, lowered: &str) -> bool {
        lexer::RESERVED_WORDS.contains(&lowered)
            || self.clause_keywords.iter().any(|(k, _)| k == lowered)
            || self.soft_keywords.iter().any(|(k, _)| k == lowered)
    }

    pub fn is_clause_keyword(&self, word: &str) -> bool {
        self.clause_keywords.iter().any(|(k, _)| k == word)
    }

    /// True when the token ends a clause: a base terminator word, a
    /// registered clause keyword, or a closing parenthesis.
    pub fn is_terminator(&self, token: &Token) -> bool {
        if token.is(")") {
            return true;
        }
        match token.word() {
            Some(w) => {
                lexer::TERMINATOR_WORDS.contains(&w)
                    || self.clause_keywords.iter().any(|(k, _)| k == w)
            }
            None => false,
        }
    }

    // ---- parser surface ----

    pub fn pred_parsers_for(
        &self,
        level: PredLevel,
    ) -> Vec<(String, PredParser, bool)> {
        self.pred_parsers
            .iter()
            .filter(|e| e.level == level)
            .map(|e| (e.pack.clone(), e.parser.clone(), e.block_error))
            .collect()
    }

    /// One fresh set of clause hooks per installed pack, in registry
    /// insertion order.
    pub fn clause_hooks(&self) -> Vec<(String, Box<dyn ClauseHooks>)> {
        self.hooks
            .iter()
            .map(|h| (h.pack.clone(), (h.factory.as_ref())()))
            .collect()
    }

    // ---- type and operator surface ----

    pub fn type_name(&self, id: ExtTypeId) -> Option<&str> {
        self.types.iter().find(|t| t.id == id).map(|t| t.name.as_str())
    }

    pub fn type_id(&self, name: &str) -> Option<ExtTypeId> {
        self.types.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn scalar_op(&self, tag: ExtOpTag) -> Option<&ScalarOpDef> {
        self.scalar_ops.iter().find(|o| o.tag == tag)
    }

    pub fn scalar_op_tag(&self, name: &str) -> Option<ExtOpTag> {
        self.scalar_ops.iter().find(|o| o.name == name).map(|o| o.tag)
    }

    pub fn rel_op(&self, tag: ExtOpTag) -> Option<&RelOpDef> {
        self.rel_ops.iter().find(|o| o.tag == tag)
    }

    pub fn rel_op_tag(&self, name: &str) -> Option<ExtOpTag> {
        self.rel_ops.iter().find(|o| o.name == name).map(|o| o.tag)
    }
}

/// Install-time view of the registry, attributing every contribution to the
/// pack being installed.
pub struct PackSession<'a> {
    registry: &'a mut SyntaxRegistry,
    pack: String,
}

impl PackSession<'_> {
    pub fn add_symbols(&mut self, symbols: &str) {
        for c in symbols.chars() {
            if self.registry.is_symbol(c) {
                tracing::warn!(pack = %self.pack, symbol = %c, "symbol already registered, overwriting");
                self.registry.symbols.retain(|(s, _)| *s != c);
            }
            self.registry.symbols.push((c, self.pack.clone()));
        }
    }

    pub fn add_clause_keyword(&mut self, keyword: &str) {
        self.registry
            .clause_keywords
            .push((keyword.to_lowercase(), self.pack.clone()));
    }

    /// A keyword that is lower-cased by the lexer but does not terminate
    /// clauses (e.g. a binary operator word like `to`).
    pub fn add_soft_keyword(&mut self, keyword: &str) {
        self.registry
            .soft_keywords
            .push((keyword.to_lowercase(), self.pack.clone()));
    }

    pub fn register_type(&mut self, name: &str) -> ExtTypeId {
        let id = ExtTypeId(self.registry.next_type_id);
        self.registry.next_type_id += 1;
        self.registry.types.push(ExtTypeDef {
            pack: self.pack.clone(),
            id,
            name: name.to_string(),
        });
        id
    }

    pub fn register_scalar_op(
        &mut self,
        name: &str,
        result: FieldType,
        executor: ScalarOpExecutor,
    ) -> ExtOpTag {
        let tag = ExtOpTag(self.registry.next_op_tag);
        self.registry.next_op_tag += 1;
        self.registry.scalar_ops.push(ScalarOpDef {
            pack: self.pack.clone(),
            tag,
            name: name.to_string(),
            result,
            executor,
        });
        tag
    }

    pub fn register_rel_op(
        &mut self,
        name: &str,
        schema_fn: Option<RelOpSchemaFn>,
        executor: RelOpExecutor,
    ) -> ExtOpTag {
        let tag = ExtOpTag(self.registry.next_op_tag);
        self.registry.next_op_tag += 1;
        self.registry.rel_ops.push(RelOpDef {
            pack: self.pack.clone(),
            tag,
            name: name.to_string(),
            schema_fn,
            executor,
        });
        tag
    }

    /// Predicate parsers are inserted ahead of the built-in parser at their
    /// level but behind previously registered extensions: registration
    /// order is the try order.
    pub fn add_pred_parser(&mut self, level: PredLevel, parser: PredParser, block_error: bool) {
        self.registry.pred_parsers.push(PredParserEntry {
            pack: self.pack.clone(),
            level,
            parser,
            block_error,
        });
    }

    pub fn set_clause_hooks(&mut self, factory: ClauseHooksFactory) {
        self.registry.hooks.push(HookDef {
            pack: self.pack.clone(),
            factory,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BracketPack;

    impl SyntaxPack for BracketPack {
        fn name(&self) -> &str {
            "brackets"
        }

        fn install(&self, session: &mut PackSession<'_>) -> EngineResult<()> {
            session.add_symbols("[]");
            session.add_clause_keyword("bselect");
            session.register_type("BRACKET");
            Ok(())
        }
    }

    #[test]
    fn install_is_idempotent() {
        let mut registry = SyntaxRegistry::new();
        registry.install(&BracketPack).unwrap();
        registry.install(&BracketPack).unwrap();
        assert_eq!(registry.installed_packs().len(), 1);
        assert_eq!(registry.extension_symbols(), vec!['[', ']']);
    }

    #[test]
    fn uninstall_restores_symbol_set() {
        let mut registry = SyntaxRegistry::new();
        registry.install(&BracketPack).unwrap();
        assert!(registry.is_symbol('['));
        assert!(registry.is_reserved_word("bselect"));
        registry.uninstall("brackets");
        assert!(!registry.is_symbol('['));
        assert!(!registry.is_reserved_word("bselect"));
        assert!(registry.type_id("BRACKET").is_none());
    }

    #[test]
    fn type_tags_are_unique() {
        let mut registry = SyntaxRegistry::new();
        registry.install(&BracketPack).unwrap();
        let id = registry.type_id("BRACKET").unwrap();
        assert_eq!(registry.type_name(id), Some("BRACKET"));
    }
}
