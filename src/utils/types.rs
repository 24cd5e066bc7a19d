use std::collections::HashMap;

use serde_json::Value as JsonValue;

/// Role assigned to requests that carry no token.
pub const ROLE_ANONYMOUS: &str = "anonymous";

/// Role assigned to requests that carry a valid token but no explicit role header.
pub const ROLE_AUTHENTICATED: &str = "authenticated";

/// Header used by clients to select one of their permitted roles.
pub const ROLE_HEADER: &str = "X-MS-API-ROLE";

/// Hard cap on page size; `first` values above this are rejected.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// A literal value bound into a query as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl LiteralValue {
    /// Convert a JSON value into a literal. Arrays and objects are not
    /// bindable scalars and are rejected by the caller before this point.
    pub fn from_json(value: &JsonValue) -> Option<LiteralValue> {
        match value {
            JsonValue::Null => Some(LiteralValue::Null),
            JsonValue::Bool(b) => Some(LiteralValue::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(LiteralValue::Int(i))
                } else {
                    n.as_f64().map(LiteralValue::Float)
                }
            }
            JsonValue::String(s) => Some(LiteralValue::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            LiteralValue::Int(i) => JsonValue::from(*i),
            LiteralValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            LiteralValue::String(s) => JsonValue::String(s.clone()),
            LiteralValue::Bool(b) => JsonValue::Bool(*b),
            LiteralValue::Null => JsonValue::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LiteralValue::Null)
    }
}

/// Comparison operators shared by filters, policies and cursor predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    /// Parse the operator keywords used by database policies and `$filter`.
    pub fn from_keyword(word: &str) -> Option<CompareOp> {
        match word {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }
}

/// Pattern-match flavors lowered to SQL LIKE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeKind {
    Contains,
    StartsWith,
    EndsWith,
}

impl LikeKind {
    /// Wrap the user value into a LIKE pattern. The value itself is still
    /// bound as a parameter; only the wildcards are added here.
    pub fn to_pattern(&self, value: &str) -> String {
        let escaped = value.replace('%', "\\%").replace('_', "\\_");
        match self {
            LikeKind::Contains => format!("%{escaped}%"),
            LikeKind::StartsWith => format!("{escaped}%"),
            LikeKind::EndsWith => format!("%{escaped}"),
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the entity under evaluation (`@item.x` in policies).
    Column(String),
    /// A claim reference (`@claims.x`); substituted with a literal during
    /// authorization and never visible to SQL lowering.
    Claim(String),
    Literal(LiteralValue),
}

/// Boolean predicate tree pushed into WHERE clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<LiteralValue>,
    },
    Like {
        column: String,
        kind: LikeKind,
        value: String,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    /// Convenience constructor for `column = literal`.
    pub fn column_eq(column: impl Into<String>, value: LiteralValue) -> Expression {
        Expression::Compare {
            left: Operand::Column(column.into()),
            op: CompareOp::Eq,
            right: Operand::Literal(value),
        }
    }

    /// AND-combine a list of expressions, flattening the trivial cases.
    pub fn and_all(mut exprs: Vec<Expression>) -> Option<Expression> {
        match exprs.len() {
            0 => None,
            1 => Some(exprs.remove(0)),
            _ => Some(Expression::And(exprs)),
        }
    }

    /// True if the expression still contains unresolved claim references.
    pub fn has_claim_refs(&self) -> bool {
        match self {
            Expression::Compare { left, right, .. } => {
                matches!(left, Operand::Claim(_)) || matches!(right, Operand::Claim(_))
            }
            Expression::IsNull { .. } | Expression::In { .. } | Expression::Like { .. } => false,
            Expression::And(items) | Expression::Or(items) => {
                items.iter().any(Expression::has_claim_refs)
            }
            Expression::Not(inner) => inner.has_claim_refs(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// The already-authenticated caller, as handed over by the host's token
/// validation layer.
#[derive(Debug, Clone)]
pub struct Principal {
    pub role: String,
    pub claims: HashMap<String, JsonValue>,
    pub authenticated: bool,
}

impl Principal {
    /// An unauthenticated caller in the `anonymous` system role.
    pub fn anonymous() -> Self {
        Self {
            role: ROLE_ANONYMOUS.to_string(),
            claims: HashMap::new(),
            authenticated: false,
        }
    }

    /// Resolve the effective role from the role-selection header. Absent a
    /// header the role defaults to `anonymous` or `authenticated` depending
    /// on whether a token was presented.
    pub fn from_request(
        claims: Option<HashMap<String, JsonValue>>,
        role_header: Option<&str>,
    ) -> Self {
        let authenticated = claims.is_some();
        let role = match role_header {
            Some(role) if !role.is_empty() => role.to_string(),
            _ if authenticated => ROLE_AUTHENTICATED.to_string(),
            _ => ROLE_ANONYMOUS.to_string(),
        };
        Self {
            role,
            claims: claims.unwrap_or_default(),
            authenticated,
        }
    }

    pub fn claim(&self, name: &str) -> Option<&JsonValue> {
        self.claims.get(name)
    }
}

/// A single bind parameter with the type hint forwarded to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    pub name: String,
    pub value: LiteralValue,
}

impl SqlParameter {
    pub fn new(ordinal: usize, value: LiteralValue) -> Self {
        Self {
            name: format!("p{ordinal}"),
            value,
        }
    }
}

/// A fully lowered statement: SQL text plus its ordered bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub parameters: Vec<SqlParameter>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>, parameters: Vec<SqlParameter>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

/// Result of a mutation statement.
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    pub rows_affected: u64,
    /// The returned row (RETURNING / OUTPUT), if the dialect produces one.
    pub returned: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_from_json() {
        assert_eq!(
            LiteralValue::from_json(&json!(5)),
            Some(LiteralValue::Int(5))
        );
        assert_eq!(
            LiteralValue::from_json(&json!("x")),
            Some(LiteralValue::String("x".to_string()))
        );
        assert_eq!(
            LiteralValue::from_json(&json!(true)),
            Some(LiteralValue::Bool(true))
        );
        assert_eq!(LiteralValue::from_json(&json!(null)), Some(LiteralValue::Null));
        assert_eq!(LiteralValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(LikeKind::Contains.to_pattern("50%"), "%50\\%%");
        assert_eq!(LikeKind::StartsWith.to_pattern("a_b"), "a\\_b%");
        assert_eq!(LikeKind::EndsWith.to_pattern("x"), "%x");
    }

    #[test]
    fn test_and_all_flattening() {
        assert_eq!(Expression::and_all(vec![]), None);

        let single = Expression::column_eq("id", LiteralValue::Int(1));
        assert_eq!(
            Expression::and_all(vec![single.clone()]),
            Some(single.clone())
        );

        let both = Expression::and_all(vec![
            single.clone(),
            Expression::column_eq("year", LiteralValue::Int(2000)),
        ]);
        assert!(matches!(both, Some(Expression::And(items)) if items.len() == 2));
    }

    #[test]
    fn test_claim_ref_detection() {
        let expr = Expression::Compare {
            left: Operand::Column("author_id".to_string()),
            op: CompareOp::Eq,
            right: Operand::Claim("sub".to_string()),
        };
        assert!(expr.has_claim_refs());
        assert!(Expression::Not(Box::new(expr)).has_claim_refs());
        assert!(!Expression::column_eq("id", LiteralValue::Int(1)).has_claim_refs());
    }

    #[test]
    fn test_principal_role_resolution() {
        let anon = Principal::from_request(None, None);
        assert_eq!(anon.role, ROLE_ANONYMOUS);
        assert!(!anon.authenticated);

        let mut claims = HashMap::new();
        claims.insert("sub".to_string(), json!(42));
        let authed = Principal::from_request(Some(claims.clone()), None);
        assert_eq!(authed.role, ROLE_AUTHENTICATED);
        assert!(authed.authenticated);

        let selected = Principal::from_request(Some(claims), Some("author"));
        assert_eq!(selected.role, "author");
    }

    #[test]
    fn test_parameter_naming() {
        let param = SqlParameter::new(3, LiteralValue::Int(9));
        assert_eq!(param.name, "p3");
    }
}
