use url::form_urlencoded;

use crate::auth::policy::{parse_predicate, PredicateContext};
use crate::engine::structure::OrderByColumn;
use crate::utils::error::{GatewayResult, PlanError};
use crate::utils::types::{Expression, OrderDirection};

/// Parsed REST query-string surface: `$select`, `$filter`, `$orderby`,
/// `$first`, `$after`.
#[derive(Debug, Clone, Default)]
pub struct RestQuery {
    pub select: Vec<String>,
    pub filter: Option<Expression>,
    pub order_by: Vec<OrderByColumn>,
    pub first: Option<u64>,
    pub after: Option<String>,
}

/// Parse a raw query string. Column existence is checked later by the
/// planner against the entity's discovered shape.
pub fn parse_query_string(query_string: &str) -> GatewayResult<RestQuery> {
    let mut query = RestQuery::default();
    let trimmed = query_string.trim_start_matches('?');
    if trimmed.is_empty() {
        return Ok(query);
    }

    for (key, value) in form_urlencoded::parse(trimmed.as_bytes()) {
        match key.as_ref() {
            "$select" => {
                query.select = value
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect();
            }
            "$filter" => {
                let expression = parse_predicate(&value, PredicateContext::ODataFilter)
                    .map_err(|e| PlanError::InvalidFilter(e.to_string()))?;
                query.filter = Some(expression);
            }
            "$orderby" => {
                query.order_by = parse_order_by(&value)?;
            }
            "$first" => {
                let parsed = value.parse::<u64>().map_err(|_| {
                    PlanError::InvalidBody(format!("'$first' must be a positive integer, got '{value}'"))
                })?;
                query.first = Some(parsed);
            }
            "$after" => {
                query.after = Some(value.to_string());
            }
            other => {
                return Err(PlanError::UnknownArgument(other.to_string()).into());
            }
        }
    }

    Ok(query)
}

/// Parse `$orderby=year desc, id asc` into ordering entries. The direction
/// defaults to ascending.
fn parse_order_by(value: &str) -> GatewayResult<Vec<OrderByColumn>> {
    let mut order = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut words = part.split_whitespace();
        let column = words
            .next()
            .ok_or_else(|| PlanError::InvalidOrderBy("empty orderBy entry".to_string()))?
            .to_string();
        let direction = match words.next() {
            None => OrderDirection::Asc,
            Some(word) if word.eq_ignore_ascii_case("asc") => OrderDirection::Asc,
            Some(word) if word.eq_ignore_ascii_case("desc") => OrderDirection::Desc,
            Some(word) => {
                return Err(PlanError::InvalidOrderBy(format!(
                    "unknown direction '{word}'"
                ))
                .into())
            }
        };
        if words.next().is_some() {
            return Err(
                PlanError::InvalidOrderBy(format!("malformed orderBy entry '{part}'")).into(),
            );
        }
        order.push(OrderByColumn { column, direction });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::{CompareOp, Operand};

    #[test]
    fn test_empty_query_string() {
        let query = parse_query_string("").unwrap();
        assert!(query.select.is_empty());
        assert!(query.filter.is_none());
        assert!(query.order_by.is_empty());
        assert!(query.first.is_none());
        assert!(query.after.is_none());
    }

    #[test]
    fn test_full_query_string() {
        let query = parse_query_string(
            "?$select=id,title&$filter=year%20gt%202000&$orderby=year%20desc,%20id&$first=2&$after=abc",
        )
        .unwrap();

        assert_eq!(query.select, vec!["id", "title"]);
        assert_eq!(query.first, Some(2));
        assert_eq!(query.after.as_deref(), Some("abc"));
        assert_eq!(query.order_by.len(), 2);
        assert_eq!(query.order_by[0].column, "year");
        assert_eq!(query.order_by[0].direction, OrderDirection::Desc);
        assert_eq!(query.order_by[1].column, "id");
        assert_eq!(query.order_by[1].direction, OrderDirection::Asc);

        match query.filter.unwrap() {
            Expression::Compare {
                left: Operand::Column(column),
                op,
                ..
            } => {
                assert_eq!(column, "year");
                assert_eq!(op, CompareOp::Gt);
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_with_string_literal() {
        let query = parse_query_string("$filter=title%20eq%20%27Dune%27").unwrap();
        assert!(query.filter.is_some());
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        assert!(parse_query_string("$top=5").is_err());
        assert!(parse_query_string("limit=5").is_err());
    }

    #[test]
    fn test_bad_first_and_orderby() {
        assert!(parse_query_string("$first=abc").is_err());
        assert!(parse_query_string("$orderby=year%20sideways").is_err());
        assert!(parse_query_string("$orderby=year%20desc%20extra").is_err());
    }

    #[test]
    fn test_bad_filter_syntax() {
        assert!(parse_query_string("$filter=year%20gt").is_err());
        assert!(parse_query_string("$filter=%40claims.sub%20eq%201").is_err());
    }
}
