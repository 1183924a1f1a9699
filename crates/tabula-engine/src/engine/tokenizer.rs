//! Formula tokenizer.
//!
//! Turns formula text into a flat list of typed tokens. Every token keeps
//! the byte range it was read from, so callers can rewrite a formula by
//! splicing replacement text over individual tokens (this is how
//! references are shifted on structural edits) or locate the token under a
//! cursor.
//!
//! A range such as `A1:B3` or `'My sheet'!A1:B3` is a single
//! [`TokenKind::Reference`] token.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Operator,
    Number,
    String,
    Function,
    Symbol,
    Reference,
    LeftParen,
    RightParen,
    Comma,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token.
    pub value: String,
    /// Byte offset of the first character in the formula.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// For parentheses, index (in the token list) of the matching parenthesis.
    pub paren_match: Option<usize>,
}

const OPERATORS: [&str; 13] = [
    "<=", ">=", "<>", "+", "-", "*", "/", "^", "&", "=", "<", ">", "%",
];

fn reference_re() -> &'static Regex {
    static REFERENCE_RE: OnceLock<Regex> = OnceLock::new();
    REFERENCE_RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:'(?:[^']|'')+'|[A-Za-z_][A-Za-z0-9_.]*)!)?\$?[A-Za-z]{1,4}\$?[0-9]{1,7}(?::\$?[A-Za-z]{1,4}\$?[0-9]{1,7})?",
        )
        .expect("reference token regex must compile")
    })
}

fn identifier_re() -> &'static Regex {
    static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*").expect("identifier token regex must compile")
    })
}

fn number_re() -> &'static Regex {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    NUMBER_RE.get_or_init(|| {
        Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
            .expect("number token regex must compile")
    })
}

fn error_literal_re() -> &'static Regex {
    static ERROR_RE: OnceLock<Regex> = OnceLock::new();
    ERROR_RE.get_or_init(|| {
        Regex::new(r"^#[A-Za-z/0-9]+[!?]?").expect("error literal regex must compile")
    })
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Tokenize formula text. A leading `=` is skipped; offsets still refer to
/// the text as given. Whitespace produces no token.
pub fn tokenize(formula: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = if formula.starts_with('=') { 1 } else { 0 };

    while pos < formula.len() {
        let rest = &formula[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };

        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        let (kind, len) = scan_token(rest, c);
        tokens.push(Token {
            kind,
            value: rest[..len].to_string(),
            start: pos,
            end: pos + len,
            paren_match: None,
        });
        pos += len;
    }

    match_parentheses(&mut tokens);
    tokens
}

fn scan_token(rest: &str, c: char) -> (TokenKind, usize) {
    match c {
        '(' => return (TokenKind::LeftParen, 1),
        ')' => return (TokenKind::RightParen, 1),
        ',' => return (TokenKind::Comma, 1),
        '"' => return scan_string(rest),
        _ => {}
    }

    if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
        return (TokenKind::Operator, op.len());
    }

    if let Some(m) = number_re().find(rest) {
        return (TokenKind::Number, m.end());
    }

    if c == '#' {
        if let Some(m) = error_literal_re().find(rest) {
            return (TokenKind::Symbol, m.end());
        }
        return (TokenKind::Unknown, 1);
    }

    if let Some(m) = reference_re().find(rest) {
        let next = rest[m.end()..].chars().next();
        let at_boundary = !matches!(next, Some(n) if is_identifier_char(n) || n == '(' || n == '!');
        if at_boundary {
            return (TokenKind::Reference, m.end());
        }
    }

    if let Some(m) = identifier_re().find(rest) {
        let after = rest[m.end()..].trim_start();
        let kind = if after.starts_with('(') {
            TokenKind::Function
        } else {
            TokenKind::Symbol
        };
        return (kind, m.end());
    }

    (TokenKind::Unknown, c.len_utf8())
}

/// Scan a double-quoted string; `""` escapes a quote. Unterminated strings
/// swallow the rest of the input as an unknown token.
fn scan_string(rest: &str) -> (TokenKind, usize) {
    let bytes = rest.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return (TokenKind::String, i + 1);
        }
        i += 1;
    }
    (TokenKind::Unknown, rest.len())
}

fn match_parentheses(tokens: &mut [Token]) {
    let mut stack: Vec<usize> = Vec::new();
    for i in 0..tokens.len() {
        match tokens[i].kind {
            TokenKind::LeftParen => stack.push(i),
            TokenKind::RightParen => {
                if let Some(open) = stack.pop() {
                    tokens[open].paren_match = Some(i);
                    tokens[i].paren_match = Some(open);
                }
            }
            _ => {}
        }
    }
}

/// Unescape the content of a string token (`"a""b"` -> `a"b`).
pub fn string_literal_value(token: &str) -> String {
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    inner.replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<(TokenKind, String)> {
        tokenize(formula)
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        use TokenKind::*;
        assert_eq!(
            kinds("=1 + A1*2.5"),
            vec![
                (Number, "1".into()),
                (Operator, "+".into()),
                (Reference, "A1".into()),
                (Operator, "*".into()),
                (Number, "2.5".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_function_and_range() {
        use TokenKind::*;
        let tokens = tokenize("=SUM(A1:B3, 'My sheet'!$C$1)");
        let got: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            got,
            vec![Function, LeftParen, Reference, Comma, Reference, RightParen]
        );
        assert_eq!(tokens[2].value, "A1:B3");
        assert_eq!(tokens[4].value, "'My sheet'!$C$1");
        assert_eq!(tokens[1].paren_match, Some(5));
        assert_eq!(tokens[5].paren_match, Some(1));
    }

    #[test]
    fn test_offsets_point_into_source() {
        let formula = "=A1 +  Sheet2!B2";
        for token in tokenize(formula) {
            assert_eq!(&formula[token.start..token.end], token.value);
        }
    }

    #[test]
    fn test_function_names_that_look_like_references() {
        use TokenKind::*;
        assert_eq!(kinds("=LOG10(1)")[0], (Function, "LOG10".into()));
        assert_eq!(kinds("=ABC12345678")[0].0, Symbol);
    }

    #[test]
    fn test_strings_symbols_and_errors() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#"="a""b" & TRUE & #REF"#),
            vec![
                (String, r#""a""b""#.into()),
                (Operator, "&".into()),
                (Symbol, "TRUE".into()),
                (Operator, "&".into()),
                (Symbol, "#REF".into()),
            ]
        );
        assert_eq!(string_literal_value(r#""a""b""#), "a\"b");
    }

    #[test]
    fn test_unterminated_string_and_unknown() {
        use TokenKind::*;
        assert_eq!(kinds("=\"abc")[0].0, Unknown);
        assert_eq!(kinds("=1 ~ 2")[1], (Unknown, "~".into()));
    }
}
