//! Boolean filter expressions over the participant namespace.
//!
//! Require policies carry a small predicate language evaluated once per
//! candidate participant:
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "true" | "false" | <string> | <ident> | call
//! call    := "contains" "(" expr "," expr ")"
//! ident   := name ( "." name )*
//! ```
//!
//! The identifier namespace is rooted at `participant`: `participant.name`
//! resolves to the candidate's username, `participant.roles` to the list of
//! their role names. Any other path fails with not-found; an unresolvable
//! filter must surface as an error, never as "allow".
//!
//! Evaluation is pure and deterministic: no I/O, no clock, no randomness.
//!
//! # Example
//!
//! ```
//! use conclave_access::{Expr, FilterContext};
//!
//! struct Candidate;
//!
//! impl FilterContext for Candidate {
//!     fn name(&self) -> &str {
//!         "alice"
//!     }
//!     fn role_names(&self) -> Vec<String> {
//!         vec!["auditor".into()]
//!     }
//! }
//!
//! let expr = Expr::parse(r#"contains(participant.roles, "auditor")"#).unwrap();
//! assert!(expr.evaluate_bool(&Candidate).unwrap());
//! ```

use crate::AccessError;

/// Resolves the `participant.*` identifier namespace for one candidate.
pub trait FilterContext {
    /// The candidate's username (`participant.name`).
    fn name(&self) -> &str;

    /// The candidate's role names (`participant.roles`).
    fn role_names(&self) -> Vec<String>;
}

/// A value produced while evaluating a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Boolean literal.
    Bool(bool),
    /// String literal.
    Str(String),
    /// Dotted identifier path, e.g. `participant.roles`.
    Ident(Vec<String>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// `contains(list, string)` membership test.
    Contains(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses a filter expression.
    ///
    /// An empty filter parses as `true` (a require policy without a filter
    /// matches every participant).
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::FilterSyntax`] on malformed input.
    pub fn parse(input: &str) -> Result<Self, AccessError> {
        if input.trim().is_empty() {
            return Ok(Self::Bool(true));
        }

        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(AccessError::FilterSyntax(format!(
                "unexpected trailing token: {tok}"
            ))),
        }
    }

    /// Evaluates the expression in `ctx` and requires a boolean result.
    ///
    /// # Errors
    ///
    /// - [`AccessError::FilterType`] if the expression evaluates to a
    ///   string or list, or an operator receives the wrong value type.
    /// - [`AccessError::IdentifierNotFound`] for paths outside the
    ///   participant namespace.
    pub fn evaluate_bool(&self, ctx: &dyn FilterContext) -> Result<bool, AccessError> {
        match self.evaluate(ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(AccessError::FilterType(format!(
                "filter must evaluate to a boolean, got {}",
                other.type_name()
            ))),
        }
    }

    fn evaluate(&self, ctx: &dyn FilterContext) -> Result<Value, AccessError> {
        match self {
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Str(s) => Ok(Value::Str(s.clone())),
            Self::Ident(path) => resolve(path, ctx),
            Self::Not(inner) => match inner.evaluate(ctx)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(AccessError::FilterType(format!(
                    "'!' expects a bool, got {}",
                    other.type_name()
                ))),
            },
            Self::And(lhs, rhs) => {
                // Both sides evaluate even when the left is false: a type or
                // not-found error on either side must surface.
                let l = expect_bool(lhs.evaluate(ctx)?, "&&")?;
                let r = expect_bool(rhs.evaluate(ctx)?, "&&")?;
                Ok(Value::Bool(l && r))
            }
            Self::Or(lhs, rhs) => {
                let l = expect_bool(lhs.evaluate(ctx)?, "||")?;
                let r = expect_bool(rhs.evaluate(ctx)?, "||")?;
                Ok(Value::Bool(l || r))
            }
            Self::Contains(list, needle) => {
                let list = match list.evaluate(ctx)? {
                    Value::List(items) => items,
                    other => {
                        return Err(AccessError::FilterType(format!(
                            "contains() expects a list first argument, got {}",
                            other.type_name()
                        )))
                    }
                };
                let needle = match needle.evaluate(ctx)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(AccessError::FilterType(format!(
                            "contains() expects a string second argument, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Bool(list.contains(&needle)))
            }
        }
    }
}

fn expect_bool(value: Value, op: &str) -> Result<bool, AccessError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(AccessError::FilterType(format!(
            "'{op}' expects bool operands, got {}",
            other.type_name()
        ))),
    }
}

fn resolve(path: &[String], ctx: &dyn FilterContext) -> Result<Value, AccessError> {
    if path.len() == 2 && path[0] == "participant" {
        match path[1].as_str() {
            "name" => return Ok(Value::Str(ctx.name().to_string())),
            "roles" => return Ok(Value::List(ctx.role_names())),
            _ => {}
        }
    }

    Err(AccessError::IdentifierNotFound(path.join(".")))
}

// ── Tokenizer ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(Vec<String>),
    Str(String),
    True,
    False,
    Not,
    And,
    Or,
    LParen,
    RParen,
    Comma,
    Contains,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ident(path) => write!(f, "'{}'", path.join(".")),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::True => f.write_str("'true'"),
            Self::False => f.write_str("'false'"),
            Self::Not => f.write_str("'!'"),
            Self::And => f.write_str("'&&'"),
            Self::Or => f.write_str("'||'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Contains => f.write_str("'contains'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, AccessError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(AccessError::FilterSyntax("expected '&&'".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(AccessError::FilterSyntax("expected '||'".into()));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(AccessError::FilterSyntax("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut path = Vec::new();
                loop {
                    let start = i;
                    while i < chars.len()
                        && (chars[i].is_ascii_alphanumeric() || chars[i] == '_')
                    {
                        i += 1;
                    }
                    if i == start {
                        return Err(AccessError::FilterSyntax(
                            "expected identifier segment after '.'".into(),
                        ));
                    }
                    path.push(chars[start..i].iter().collect::<String>());
                    if chars.get(i) == Some(&'.') {
                        i += 1;
                    } else {
                        break;
                    }
                }

                tokens.push(match path.as_slice() {
                    [kw] if kw == "true" => Token::True,
                    [kw] if kw == "false" => Token::False,
                    [kw] if kw == "contains" => Token::Contains,
                    _ => Token::Ident(path),
                });
            }
            other => {
                return Err(AccessError::FilterSyntax(format!(
                    "unexpected character: {other:?}"
                )))
            }
        }
    }

    Ok(tokens)
}

// ── Parser ───────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), AccessError> {
        match self.advance() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(AccessError::FilterSyntax(format!(
                "expected {what}, got {tok}"
            ))),
            None => Err(AccessError::FilterSyntax(format!(
                "expected {what}, got end of input"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, AccessError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, AccessError> {
        let mut expr = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, AccessError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, AccessError> {
        match self.advance() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(path)) => Ok(Expr::Ident(path)),
            Some(Token::Contains) => {
                self.expect(&Token::LParen, "'(' after contains")?;
                let list = self.parse_or()?;
                self.expect(&Token::Comma, "',' between contains arguments")?;
                let needle = self.parse_or()?;
                self.expect(&Token::RParen, "')' closing contains")?;
                Ok(Expr::Contains(Box::new(list), Box::new(needle)))
            }
            Some(tok) => Err(AccessError::FilterSyntax(format!(
                "unexpected token: {tok}"
            ))),
            None => Err(AccessError::FilterSyntax("unexpected end of input".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCtx {
        name: &'static str,
        roles: Vec<&'static str>,
    }

    impl FilterContext for TestCtx {
        fn name(&self) -> &str {
            self.name
        }

        fn role_names(&self) -> Vec<String> {
            self.roles.iter().map(|r| (*r).to_string()).collect()
        }
    }

    fn alice() -> TestCtx {
        TestCtx {
            name: "alice",
            roles: vec!["user:participant", "dev"],
        }
    }

    fn eval(filter: &str, ctx: &TestCtx) -> Result<bool, AccessError> {
        Expr::parse(filter)?.evaluate_bool(ctx)
    }

    // ── Parsing ──────────────────────────────────────────────

    #[test]
    fn parse_contains() {
        let expr = Expr::parse(r#"contains(participant.roles, "dev")"#)
            .expect("contains() should parse");
        assert!(matches!(expr, Expr::Contains(_, _)));
    }

    #[test]
    fn parse_empty_filter_is_true() {
        assert_eq!(Expr::parse("").unwrap(), Expr::Bool(true));
        assert_eq!(Expr::parse("   ").unwrap(), Expr::Bool(true));
    }

    #[test]
    fn parse_precedence_not_binds_tighter_than_and() {
        let expr = Expr::parse("!true && false").expect("should parse");
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Not(Box::new(Expr::Bool(true)))),
                Box::new(Expr::Bool(false)),
            )
        );
    }

    #[test]
    fn parse_precedence_and_binds_tighter_than_or() {
        let expr = Expr::parse("true || false && false").expect("should parse");
        // Must group as true || (false && false).
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        assert!(Expr::parse("true true").is_err());
    }

    #[test]
    fn parse_rejects_single_ampersand() {
        assert!(Expr::parse("true & false").is_err());
    }

    #[test]
    fn parse_rejects_unterminated_string() {
        assert!(Expr::parse(r#"contains(participant.roles, "dev)"#).is_err());
    }

    #[test]
    fn parse_rejects_dangling_dot() {
        assert!(Expr::parse("participant.").is_err());
    }

    // ── Evaluation ───────────────────────────────────────────

    #[test]
    fn contains_matches_role() {
        assert!(eval(r#"contains(participant.roles, "user:participant")"#, &alice()).unwrap());
    }

    #[test]
    fn contains_misses_absent_role() {
        assert!(!eval(r#"contains(participant.roles, "user:host")"#, &alice()).unwrap());
    }

    #[test]
    fn boolean_composition() {
        let ctx = alice();
        assert!(eval(
            r#"contains(participant.roles, "dev") && !contains(participant.roles, "intern")"#,
            &ctx
        )
        .unwrap());
        assert!(eval(
            r#"contains(participant.roles, "intern") || contains(participant.roles, "dev")"#,
            &ctx
        )
        .unwrap());
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        let err = eval("contains(participant.teams, \"x\")", &alice()).unwrap_err();
        assert_eq!(
            err,
            AccessError::IdentifierNotFound("participant.teams".into())
        );
    }

    #[test]
    fn unknown_root_is_not_found() {
        let err = eval("contains(host.roles, \"x\")", &alice()).unwrap_err();
        assert_eq!(err, AccessError::IdentifierNotFound("host.roles".into()));
    }

    #[test]
    fn non_boolean_result_is_type_error() {
        let err = eval("participant.name", &alice()).unwrap_err();
        assert!(matches!(err, AccessError::FilterType(_)));
    }

    #[test]
    fn contains_on_string_is_type_error() {
        let err = eval(r#"contains(participant.name, "a")"#, &alice()).unwrap_err();
        assert!(matches!(err, AccessError::FilterType(_)));
    }

    #[test]
    fn error_surfaces_from_short_circuitable_position() {
        // Even when the left operand already decides the outcome, a broken
        // right operand must surface as an error, not be ignored.
        let err = eval("false && contains(participant.teams, \"x\")", &alice()).unwrap_err();
        assert!(matches!(err, AccessError::IdentifierNotFound(_)));
    }

    #[test]
    fn single_quoted_literals_work() {
        assert!(eval("contains(participant.roles, 'dev')", &alice()).unwrap());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let expr = Expr::parse(r#"contains(participant.roles, "dev")"#).unwrap();
        let ctx = alice();
        for _ in 0..3 {
            assert!(expr.evaluate_bool(&ctx).unwrap());
        }
    }
}
