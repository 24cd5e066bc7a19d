use thiserror::Error;

use crate::utils::types::{CompareOp, Expression, LiteralValue, Operand};

/// Where a predicate string comes from, which decides what references are
/// legal inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateContext {
    /// `policy.database` expressions: `@item.<col>` and `@claims.<name>`.
    DatabasePolicy,
    /// REST `$filter` expressions: bare column names only.
    ODataFilter,
}

/// Syntax error in a predicate string
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PredicateError(String);

impl PredicateError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Parse a policy or `$filter` predicate into the shared expression tree.
///
/// The grammar covers comparisons (`eq ne gt ge lt le`), boolean connectives
/// (`and or not`), parentheses, quoted strings, numbers, booleans and `null`.
pub fn parse_predicate(
    input: &str,
    context: PredicateContext,
) -> Result<Expression, PredicateError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        context,
    };
    let expression = parser.parse_or()?;
    if parser.position != parser.tokens.len() {
        return Err(PredicateError::new(format!(
            "unexpected trailing input near '{}'",
            parser.peek_text()
        )));
    }
    Ok(expression)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    ItemRef(String),
    ClaimRef(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::ItemRef(s) => format!("@item.{s}"),
            Token::ClaimRef(s) => format!("@claims.{s}"),
            Token::Str(s) => format!("'{s}'"),
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // '' escapes a single quote inside the string
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                text.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(PredicateError::new("unterminated string literal"))
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '@' => {
                chars.next();
                let mut reference = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        reference.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(name) = reference.strip_prefix("item.") {
                    if name.is_empty() {
                        return Err(PredicateError::new("@item. reference has no field name"));
                    }
                    tokens.push(Token::ItemRef(name.to_string()));
                } else if let Some(name) = reference.strip_prefix("claims.") {
                    if name.is_empty() {
                        return Err(PredicateError::new("@claims. reference has no claim name"));
                    }
                    tokens.push(Token::ClaimRef(name.to_string()));
                } else {
                    return Err(PredicateError::new(format!(
                        "unknown reference '@{reference}'; expected @item.<field> or @claims.<name>"
                    )));
                }
            }
            '-' | '0'..='9' => {
                let mut number = String::new();
                if c == '-' {
                    number.push(c);
                    chars.next();
                }
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        number.push(ch);
                        chars.next();
                    } else if ch == '.' && !is_float {
                        is_float = true;
                        number.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = number
                        .parse::<f64>()
                        .map_err(|_| PredicateError::new(format!("invalid number '{number}'")))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = number
                        .parse::<i64>()
                        .map_err(|_| PredicateError::new(format!("invalid number '{number}'")))?;
                    tokens.push(Token::Int(value));
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(PredicateError::new(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    context: PredicateContext,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_text(&self) -> String {
        self.peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expression, PredicateError> {
        let mut operands = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            operands.push(self.parse_and()?);
        }
        if operands.len() == 1 {
            Ok(operands.remove(0))
        } else {
            Ok(Expression::Or(operands))
        }
    }

    fn parse_and(&mut self) -> Result<Expression, PredicateError> {
        let mut operands = vec![self.parse_unary()?];
        while self.eat_keyword("and") {
            operands.push(self.parse_unary()?);
        }
        if operands.len() == 1 {
            Ok(operands.remove(0))
        } else {
            Ok(Expression::And(operands))
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, PredicateError> {
        if self.eat_keyword("not") {
            return Ok(Expression::Not(Box::new(self.parse_unary()?)));
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.position += 1;
            let inner = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(inner),
                _ => return Err(PredicateError::new("expected ')'")),
            }
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, PredicateError> {
        let left = self.parse_operand()?;

        let op = match self.next() {
            Some(Token::Ident(word)) => CompareOp::from_keyword(&word).ok_or_else(|| {
                PredicateError::new(format!("expected comparison operator, found '{word}'"))
            })?,
            other => {
                return Err(PredicateError::new(format!(
                    "expected comparison operator, found '{}'",
                    other.map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string())
                )))
            }
        };

        let right = self.parse_operand()?;

        // eq/ne against null lower to IS [NOT] NULL when one side is a column.
        if let (Operand::Column(column), Operand::Literal(LiteralValue::Null)) = (&left, &right) {
            return match op {
                CompareOp::Eq => Ok(Expression::IsNull {
                    column: column.clone(),
                    negated: false,
                }),
                CompareOp::Ne => Ok(Expression::IsNull {
                    column: column.clone(),
                    negated: true,
                }),
                _ => Err(PredicateError::new("null admits only 'eq' and 'ne'")),
            };
        }

        Ok(Expression::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, PredicateError> {
        match self.next() {
            Some(Token::ItemRef(field)) => match self.context {
                PredicateContext::DatabasePolicy => Ok(Operand::Column(field)),
                PredicateContext::ODataFilter => Err(PredicateError::new(
                    "@item references are not allowed in $filter",
                )),
            },
            Some(Token::ClaimRef(name)) => match self.context {
                PredicateContext::DatabasePolicy => Ok(Operand::Claim(name)),
                PredicateContext::ODataFilter => Err(PredicateError::new(
                    "@claims references are not allowed in $filter",
                )),
            },
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Operand::Literal(LiteralValue::Bool(true))),
                "false" => Ok(Operand::Literal(LiteralValue::Bool(false))),
                "null" => Ok(Operand::Literal(LiteralValue::Null)),
                "and" | "or" | "not" | "eq" | "ne" | "gt" | "ge" | "lt" | "le" => Err(
                    PredicateError::new(format!("expected operand, found keyword '{word}'")),
                ),
                _ => match self.context {
                    PredicateContext::ODataFilter => Ok(Operand::Column(word)),
                    PredicateContext::DatabasePolicy => Err(PredicateError::new(format!(
                        "bare identifier '{word}' is not allowed; use @item.{word}"
                    ))),
                },
            },
            Some(Token::Str(text)) => Ok(Operand::Literal(LiteralValue::String(text))),
            Some(Token::Int(value)) => Ok(Operand::Literal(LiteralValue::Int(value))),
            Some(Token::Float(value)) => Ok(Operand::Literal(LiteralValue::Float(value))),
            other => Err(PredicateError::new(format!(
                "expected operand, found '{}'",
                other.map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string())
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_comparison() {
        let expr = parse_predicate(
            "@item.author_id eq @claims.sub",
            PredicateContext::DatabasePolicy,
        )
        .unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: Operand::Column("author_id".to_string()),
                op: CompareOp::Eq,
                right: Operand::Claim("sub".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_boolean_connectives_precedence() {
        // and binds tighter than or
        let expr = parse_predicate(
            "@item.a eq 1 or @item.b eq 2 and @item.c eq 3",
            PredicateContext::DatabasePolicy,
        )
        .unwrap();
        match expr {
            Expression::Or(operands) => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(&operands[1], Expression::And(inner) if inner.len() == 2));
            }
            other => panic!("expected Or at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_not_and_parentheses() {
        let expr = parse_predicate(
            "not (@item.archived eq true)",
            PredicateContext::DatabasePolicy,
        )
        .unwrap();
        assert!(matches!(expr, Expression::Not(_)));
    }

    #[test]
    fn test_parse_string_literal_with_escape() {
        let expr = parse_predicate(
            "@item.title eq 'it''s here'",
            PredicateContext::DatabasePolicy,
        )
        .unwrap();
        match expr {
            Expression::Compare {
                right: Operand::Literal(LiteralValue::String(s)),
                ..
            } => assert_eq!(s, "it's here"),
            other => panic!("expected string comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_null_comparison_lowers_to_is_null() {
        let expr =
            parse_predicate("@item.deleted_at eq null", PredicateContext::DatabasePolicy).unwrap();
        assert_eq!(
            expr,
            Expression::IsNull {
                column: "deleted_at".to_string(),
                negated: false,
            }
        );

        let expr =
            parse_predicate("@item.deleted_at ne null", PredicateContext::DatabasePolicy).unwrap();
        assert!(matches!(expr, Expression::IsNull { negated: true, .. }));
    }

    #[test]
    fn test_odata_filter_uses_bare_columns() {
        let expr = parse_predicate("year gt 2000 and title eq 'Dune'", PredicateContext::ODataFilter)
            .unwrap();
        match expr {
            Expression::And(operands) => {
                assert!(matches!(
                    &operands[0],
                    Expression::Compare {
                        left: Operand::Column(c),
                        op: CompareOp::Gt,
                        ..
                    } if c == "year"
                ));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_odata_filter_rejects_claim_refs() {
        assert!(
            parse_predicate("@claims.sub eq 1", PredicateContext::ODataFilter).is_err()
        );
    }

    #[test]
    fn test_policy_rejects_bare_identifiers() {
        assert!(
            parse_predicate("author_id eq 1", PredicateContext::DatabasePolicy).is_err()
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_predicate("@item.x eq", PredicateContext::DatabasePolicy).is_err());
        assert!(parse_predicate("@item.x eq eq", PredicateContext::DatabasePolicy).is_err());
        assert!(parse_predicate("(@item.x eq 1", PredicateContext::DatabasePolicy).is_err());
        assert!(parse_predicate("@item.x eq 1 extra", PredicateContext::DatabasePolicy).is_err());
        assert!(parse_predicate("@item.x gt null", PredicateContext::DatabasePolicy).is_err());
    }

    #[test]
    fn test_negative_and_float_numbers() {
        let expr = parse_predicate(
            "@item.balance ge -12.5",
            PredicateContext::DatabasePolicy,
        )
        .unwrap();
        match expr {
            Expression::Compare {
                right: Operand::Literal(LiteralValue::Float(f)),
                ..
            } => assert_eq!(f, -12.5),
            other => panic!("expected float comparison, got {other:?}"),
        }
    }
}
