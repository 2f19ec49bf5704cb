use crate::registry::SyntaxRegistry;
use crate::token::Token;
use common::{EngineError, EngineResult};

/// Symbols the base grammar always understands. Syntax packs extend the set
/// through the registry (`[`, `]`, `#`, `{`, `}`, ...).
pub const DEFAULT_SYMBOLS: &[char] = &['(', ')', ',', '.', '*', '+', '-', '/', '=', ';'];

/// Words the base grammar reserves: clause boundaries and predicate
/// keywords. Reserved words are lower-cased by the lexer so the parser can
/// compare them literally; identifiers keep their case.
pub const RESERVED_WORDS: &[&str] = &[
    "select", "from", "where", "group", "by", "order", "limit", "offset", "having", "union",
    "all", "join", "left", "outer", "on", "as", "and", "or", "not", "in", "is", "between",
    "like", "rlike", "regexp", "null", "true", "false", "case", "when", "then", "else", "end",
    "cast", "asc", "desc",
];

/// Words that end a clause (a result-column list, a FROM source list, ...).
pub const TERMINATOR_WORDS: &[&str] = &[
    "from", "where", "limit", "offset", "having", "group", "by", "order", "left", "join", "on",
    "union", "outer", "in", "is", "and", "or", "select", "between", "not",
];

/// Tokenize a query string against the symbol and keyword sets currently
/// registered.
pub fn tokenize(input: &str, registry: &SyntaxRegistry) -> EngineResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_word = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '_') {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>()
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let word = read_word(&mut i);
            let lowered = word.to_lowercase();
            if registry.is_reserved_word(&lowered) {
                tokens.push(Token::Word(lowered));
            } else {
                tokens.push(Token::Word(word));
            }
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let quote = c;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err(EngineError::Syntax(format!(
                    "unterminated string literal starting with {quote}"
                )));
            }
            tokens.push(Token::Str {
                body: chars[start..i].iter().collect(),
                quote,
            });
            i += 1;
        } else if c == '?' || c == '$' {
            i += 1;
            let body = read_word(&mut i);
            tokens.push(Token::Param { prefix: c, body });
        } else if c == '<' || c == '>' || c == '!' {
            i += 1;
            if i < chars.len() && chars[i] == '=' {
                i += 1;
                tokens.push(Token::Symbol(format!("{c}=")));
            } else {
                tokens.push(Token::Symbol(c.to_string()));
            }
        } else if registry.is_symbol(c) {
            i += 1;
            tokens.push(Token::Symbol(c.to_string()));
        } else {
            return Err(EngineError::Syntax(format!("unexpected character '{c}'")));
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(input: &str) -> Vec<String> {
        let registry = SyntaxRegistry::default();
        tokenize(input, &registry)
            .unwrap()
            .into_iter()
            .map(|t| t.text())
            .collect()
    }

    #[test]
    fn words_numbers_and_symbols() {
        assert_eq!(
            texts("SELECT id, name FROM users WHERE id >= 10"),
            vec![
                "select", "id", ",", "name", "from", "users", "where", "id", ">=", "10"
            ]
        );
    }

    #[test]
    fn identifiers_keep_case_keywords_do_not() {
        assert_eq!(texts("SELECT Price FROM Items"), vec!["select", "Price", "from", "Items"]);
    }

    #[test]
    fn floats_are_three_tokens() {
        assert_eq!(texts("12.5"), vec!["12", ".", "5"]);
    }

    #[test]
    fn params_fuse_with_following_word() {
        assert_eq!(texts("?0 $2"), vec!["?0", "$2"]);
    }

    #[test]
    fn strings_strip_quotes_in_body() {
        let registry = SyntaxRegistry::default();
        let tokens = tokenize("'a b' \"c\"", &registry).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str {
                    body: "a b".into(),
                    quote: '\''
                },
                Token::Str {
                    body: "c".into(),
                    quote: '"'
                }
            ]
        );
    }

    #[test]
    fn unknown_symbol_fails() {
        let registry = SyntaxRegistry::default();
        assert!(matches!(
            tokenize("a [1]", &registry),
            Err(EngineError::Syntax(_))
        ));
    }

    #[test]
    fn unterminated_string_fails() {
        let registry = SyntaxRegistry::default();
        assert!(tokenize("'abc", &registry).is_err());
    }
}
