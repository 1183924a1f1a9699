//! Formula parser.
//!
//! Precedence climbing over the token list produced by
//! [`tokenize`](super::tokenize). Binding strength, loosest first:
//!
//! | level | operators |
//! |---|---|
//! | 1 | `=` `<>` `<` `>` `<=` `>=` |
//! | 2 | `&` |
//! | 3 | `+` `-` |
//! | 4 | `*` `/` |
//! | 5 | unary `-` `+` |
//! | 6 | `^` (right associative) |
//!
//! Postfix `%` binds tighter than all of them.

use std::fmt;

use super::error::EngineError;
use super::functions::FunctionRegistry;
use super::reference::Reference;
use super::tokenizer::{Token, TokenKind, string_literal_value, tokenize};
use super::value::CellError;

const UNARY_PRECEDENCE: u8 = 5;

/// Deepest tree the parser builds. Parenthesised groups, call arguments,
/// unary operands and each link of an operator chain count one level.
pub const MAX_NESTING: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Percent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    fn from_token(text: &str) -> Option<BinaryOp> {
        Some(match text {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge => 1,
            BinaryOp::Concat => 2,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul | BinaryOp::Div => 4,
            BinaryOp::Pow => 6,
        }
    }

    fn right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
    Reference(Reference),
    /// An identifier that is neither a function call nor a boolean.
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Ast>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Call {
        name: String,
        args: Vec<Ast>,
    },
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Number(n) => write!(f, "{}", n),
            Ast::Text(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Ast::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Ast::Error(e) => write!(f, "{}", e),
            Ast::Reference(r) => write!(f, "{}", r),
            Ast::Name(n) => f.write_str(n),
            Ast::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::Plus => write!(f, "+{}", operand),
                UnaryOp::Percent => write!(f, "{}%", operand),
            },
            Ast::Binary { op, left, right } => write!(f, "({}{}{})", left, op.symbol(), right),
            Ast::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parse formula text (with or without the leading `=`).
pub fn parse(formula: &str, registry: &FunctionRegistry) -> Result<Ast, EngineError> {
    let tokens = tokenize(formula);
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end_offset: formula.len(),
        registry,
        depth: 0,
    };
    let ast = parser.parse_expression(1)?;
    if let Some(token) = parser.peek() {
        return Err(invalid(token.start, format!("unexpected '{}'", token.value)));
    }
    Ok(ast)
}

fn invalid(offset: usize, message: impl Into<String>) -> EngineError {
    EngineError::InvalidFormula {
        offset,
        message: message.into(),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end_offset: usize,
    registry: &'a FunctionRegistry,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Operator)
            .and_then(|t| BinaryOp::from_token(&t.value))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'a Token, EngineError> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(invalid(
                token.start,
                format!("expected {}, found '{}'", what, token.value),
            )),
            None => Err(invalid(self.end_offset, format!("expected {}", what))),
        }
    }

    fn descend(&mut self) -> Result<(), EngineError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let offset = self.peek().map_or(self.end_offset, |t| t.start);
            return Err(invalid(offset, "formula is nested too deeply"));
        }
        Ok(())
    }

    fn parse_expression(&mut self, min_precedence: u8) -> Result<Ast, EngineError> {
        let entry = self.depth;
        let result = self.parse_chain(min_precedence);
        self.depth = entry;
        result
    }

    fn parse_chain(&mut self, min_precedence: u8) -> Result<Ast, EngineError> {
        self.descend()?;
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_binary() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            self.descend()?;
            let next_min = if op.right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_expression(next_min)?;
            left = Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast, EngineError> {
        if let Some(token) = self.peek().filter(|t| t.kind == TokenKind::Operator) {
            let op = match token.value.as_str() {
                "-" => Some(UnaryOp::Neg),
                "+" => Some(UnaryOp::Plus),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 1;
                let operand = self.parse_expression(UNARY_PRECEDENCE + 1)?;
                return Ok(Ast::Unary {
                    op,
                    operand: Box::new(operand),
                });
            }
        }
        let mut ast = self.parse_primary()?;
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Operator && t.value == "%")
        {
            self.pos += 1;
            self.descend()?;
            ast = Ast::Unary {
                op: UnaryOp::Percent,
                operand: Box::new(ast),
            };
        }
        Ok(ast)
    }

    fn parse_primary(&mut self) -> Result<Ast, EngineError> {
        let Some(token) = self.next() else {
            return Err(invalid(self.end_offset, "unexpected end of formula"));
        };
        match token.kind {
            TokenKind::Number => token
                .value
                .parse::<f64>()
                .map(Ast::Number)
                .map_err(|_| invalid(token.start, format!("invalid number '{}'", token.value))),
            TokenKind::String => Ok(Ast::Text(string_literal_value(&token.value))),
            TokenKind::Reference => Reference::parse(&token.value)
                .map(Ast::Reference)
                .map_err(|e| invalid(token.start, e.to_string())),
            TokenKind::Symbol => Ok(symbol(&token.value)),
            TokenKind::Function => self.parse_call(token),
            TokenKind::LeftParen => {
                let inner = self.parse_expression(1)?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            _ => Err(invalid(
                token.start,
                format!("unexpected '{}'", token.value),
            )),
        }
    }

    fn parse_call(&mut self, name: &'a Token) -> Result<Ast, EngineError> {
        let descriptor = self
            .registry
            .get(&name.value)
            .ok_or_else(|| EngineError::UnknownFunction(name.value.to_ascii_uppercase()))?;
        self.expect(TokenKind::LeftParen, "'('")?;

        let mut args = Vec::new();
        if self.peek().is_some_and(|t| t.kind == TokenKind::RightParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.parse_expression(1)?);
                match self.next() {
                    Some(t) if t.kind == TokenKind::Comma => continue,
                    Some(t) if t.kind == TokenKind::RightParen => break,
                    Some(t) => {
                        return Err(invalid(
                            t.start,
                            format!("expected ',' or ')', found '{}'", t.value),
                        ));
                    }
                    None => return Err(invalid(self.end_offset, "missing ')'")),
                }
            }
        }

        descriptor.check_arity(args.len())?;
        Ok(Ast::Call {
            name: descriptor.name.clone(),
            args,
        })
    }
}

fn symbol(text: &str) -> Ast {
    if text.eq_ignore_ascii_case("true") {
        return Ast::Boolean(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Ast::Boolean(false);
    }
    if text.starts_with('#') {
        return Ast::Error(CellError::from_literal(text).unwrap_or(CellError::Error));
    }
    Ast::Name(text.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(formula: &str) -> String {
        let registry = FunctionRegistry::with_builtins();
        parse(formula, &registry).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(p("=1+2*3"), "(1+(2*3))");
        assert_eq!(p("=1*2+3"), "((1*2)+3)");
        assert_eq!(p("=1-2-3"), "((1-2)-3)");
        assert_eq!(p("=2^3^2"), "(2^(3^2))");
        assert_eq!(p("=-2^2"), "-(2^2)");
        assert_eq!(p("=1+2&\"x\""), "((1+2)&\"x\")");
        assert_eq!(p("=A1&B1=\"ab\""), "((A1&B1)=\"ab\")");
    }

    #[test]
    fn test_parentheses_and_percent() {
        assert_eq!(p("=(1+2)*3"), "((1+2)*3)");
        assert_eq!(p("=50%"), "50%");
    }

    #[test]
    fn test_calls_are_case_insensitive() {
        assert_eq!(p("=if(true, a1, Sheet2!B1:B3)"), "IF(TRUE,A1,Sheet2!B1:B3)");
        assert_eq!(p("=and()"), "AND()");
    }

    #[test]
    fn test_symbols() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(parse("=#REF", &registry).unwrap(), Ast::Error(CellError::Ref));
        assert_eq!(
            parse("=foo", &registry).unwrap(),
            Ast::Name("FOO".to_string())
        );
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            parse("=NOPE(1)", &registry),
            Err(EngineError::UnknownFunction("NOPE".to_string()))
        );
    }

    #[test]
    fn test_arity_checked_at_parse_time() {
        let registry = FunctionRegistry::with_builtins();
        assert!(matches!(
            parse("=NOT(1, 2)", &registry),
            Err(EngineError::ArgumentCountMismatch { got: 2, .. })
        ));
        assert!(matches!(
            parse("=IF(TRUE)", &registry),
            Err(EngineError::ArgumentCountMismatch { got: 1, .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        let registry = FunctionRegistry::with_builtins();
        for bad in ["=", "=1+", "=(1", "=1 2", "=SUM(1,", "=1 ~ 2", "=)"] {
            assert!(
                matches!(parse(bad, &registry), Err(EngineError::InvalidFormula { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected_not_overflowed() {
        let registry = FunctionRegistry::with_builtins();
        let nested = |n: usize| format!("={}1{}", "(".repeat(n), ")".repeat(n));

        assert_eq!(parse(&nested(100), &registry), Ok(Ast::Number(1.0)));
        for n in [2000, 10000] {
            assert!(
                matches!(
                    parse(&nested(n), &registry),
                    Err(EngineError::InvalidFormula { .. })
                ),
                "{n} levels should be rejected"
            );
        }

        let chain = format!("=1{}", "+1".repeat(5000));
        assert!(matches!(
            parse(&chain, &registry),
            Err(EngineError::InvalidFormula { .. })
        ));
        let calls = format!("={}1{}", "ABS(".repeat(3000), ")".repeat(3000));
        assert!(matches!(
            parse(&calls, &registry),
            Err(EngineError::InvalidFormula { .. })
        ));
    }
}
