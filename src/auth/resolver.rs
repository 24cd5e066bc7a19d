use std::collections::BTreeSet;

use crate::auth::policy::{parse_predicate, PredicateContext};
use crate::config::model::{ActionKind, Entity};
use crate::metadata::shape::TableShape;
use crate::utils::error::{AuthError, GatewayResult};
use crate::utils::types::{Expression, LiteralValue, Operand, Principal};

/// The outcome of a successful authorization check: the columns the caller
/// may observe and the row predicate to conjoin into the query's WHERE
/// clause. Denials are typed errors, not a `Decision` variant.
#[derive(Debug, Clone)]
pub struct Decision {
    pub mask: BTreeSet<String>,
    pub predicate: Option<Expression>,
}

/// Authorize `(principal, entity, action)` for the requested columns.
///
/// The returned mask is applied to results after the database responds; it
/// never shapes query compilation. The predicate has `@claims` references
/// already replaced with literal values; `@item` references stay symbolic
/// for SQL lowering.
pub fn authorize(
    principal: &Principal,
    entity: &Entity,
    action: ActionKind,
    requested_columns: &[String],
    shape: &TableShape,
) -> GatewayResult<Decision> {
    let permission = entity
        .permissions_for_role(&principal.role)
        .ok_or_else(|| AuthError::RoleNotPermitted(principal.role.clone()))?;

    let action_config = permission
        .action(action)
        .ok_or_else(|| AuthError::ActionNotPermitted {
            role: principal.role.clone(),
            action: action.as_str().to_string(),
        })?;

    let mask = effective_columns(
        action_config.fields().map(|f| (&f.include[..], &f.exclude[..])),
        shape,
    );

    for column in requested_columns {
        if !mask.contains(column) {
            return Err(AuthError::FieldNotPermitted(column.clone()).into());
        }
    }

    // Stored procedures are opaque: no row predicate applies to execute.
    let predicate = if action == ActionKind::Execute {
        None
    } else {
        match action_config.policy() {
            Some(policy) => Some(compile_policy(&policy.database, principal)?),
            None => None,
        }
    };

    Ok(Decision { mask, predicate })
}

/// Compute `include \ exclude`, expanding the `*` wildcard against the
/// discovered columns. A column in both lists resolves to excluded.
fn effective_columns(
    fields: Option<(&[String], &[String])>,
    shape: &TableShape,
) -> BTreeSet<String> {
    let all_columns = || {
        shape
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<BTreeSet<_>>()
    };

    match fields {
        None => all_columns(),
        Some((include, exclude)) => {
            let mut mask = if include.iter().any(|c| c == "*") {
                all_columns()
            } else {
                include.iter().cloned().collect()
            };
            for excluded in exclude {
                if excluded == "*" {
                    mask.clear();
                } else {
                    mask.remove(excluded);
                }
            }
            mask
        }
    }
}

/// Parse the policy text and substitute `@claims.<name>` references with
/// literal values from the principal.
fn compile_policy(policy: &str, principal: &Principal) -> GatewayResult<Expression> {
    let expression = parse_predicate(policy, PredicateContext::DatabasePolicy)
        .map_err(|e| AuthError::PolicySyntax(e.to_string()))?;
    bind_claims(expression, principal)
}

fn bind_claims(expression: Expression, principal: &Principal) -> GatewayResult<Expression> {
    Ok(match expression {
        Expression::Compare { left, op, right } => Expression::Compare {
            left: bind_operand(left, principal)?,
            op,
            right: bind_operand(right, principal)?,
        },
        Expression::And(items) => Expression::And(
            items
                .into_iter()
                .map(|e| bind_claims(e, principal))
                .collect::<GatewayResult<Vec<_>>>()?,
        ),
        Expression::Or(items) => Expression::Or(
            items
                .into_iter()
                .map(|e| bind_claims(e, principal))
                .collect::<GatewayResult<Vec<_>>>()?,
        ),
        Expression::Not(inner) => Expression::Not(Box::new(bind_claims(*inner, principal)?)),
        other => other,
    })
}

fn bind_operand(operand: Operand, principal: &Principal) -> GatewayResult<Operand> {
    match operand {
        Operand::Claim(name) => {
            let value = principal
                .claim(&name)
                .ok_or_else(|| AuthError::MissingClaim(name.clone()))?;
            let literal = LiteralValue::from_json(value)
                .ok_or_else(|| AuthError::MissingClaim(name.clone()))?;
            Ok(Operand::Literal(literal))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::shape::{ColumnDef, ColumnType};
    use crate::utils::error::GatewayError;
    use crate::utils::types::CompareOp;
    use serde_json::json;
    use std::collections::HashMap;

    fn book_shape() -> TableShape {
        TableShape {
            columns: vec![
                ColumnDef::new("id", ColumnType::Int).autogenerated(),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("ssn", ColumnType::Text),
                ColumnDef::new("author_id", ColumnType::Int),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
            parameters: vec![],
        }
    }

    fn entity_json(permissions: serde_json::Value) -> Entity {
        serde_json::from_value(serde_json::json!({
            "source": "books",
            "permissions": permissions
        }))
        .unwrap()
    }

    fn principal(role: &str, claims: &[(&str, serde_json::Value)]) -> Principal {
        let mut map = HashMap::new();
        for (name, value) in claims {
            map.insert(name.to_string(), value.clone());
        }
        Principal {
            role: role.to_string(),
            claims: map,
            authenticated: true,
        }
    }

    #[test]
    fn test_role_not_permitted() {
        let entity = entity_json(json!([{ "role": "admin", "actions": ["read"] }]));
        let result = authorize(
            &Principal::anonymous(),
            &entity,
            ActionKind::Read,
            &[],
            &book_shape(),
        );
        assert!(matches!(
            result.unwrap_err(),
            GatewayError::Auth(AuthError::RoleNotPermitted(role)) if role == "anonymous"
        ));
    }

    #[test]
    fn test_action_not_permitted() {
        let entity = entity_json(json!([{ "role": "anonymous", "actions": ["read"] }]));
        let result = authorize(
            &Principal::anonymous(),
            &entity,
            ActionKind::Delete,
            &[],
            &book_shape(),
        );
        assert!(matches!(
            result.unwrap_err(),
            GatewayError::Auth(AuthError::ActionNotPermitted { .. })
        ));
    }

    #[test]
    fn test_wildcard_action_grants_everything() {
        let entity = entity_json(json!([{ "role": "admin", "actions": ["*"] }]));
        let decision = authorize(
            &principal("admin", &[]),
            &entity,
            ActionKind::Delete,
            &["title".to_string()],
            &book_shape(),
        )
        .unwrap();
        assert!(decision.mask.contains("ssn"));
        assert!(decision.predicate.is_none());
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let entity = entity_json(json!([{
            "role": "anonymous",
            "actions": [{
                "action": "read",
                "fields": { "include": ["*", "ssn"], "exclude": ["ssn"] }
            }]
        }]));
        let decision = authorize(
            &Principal::anonymous(),
            &entity,
            ActionKind::Read,
            &["title".to_string()],
            &book_shape(),
        )
        .unwrap();
        assert!(!decision.mask.contains("ssn"));
        assert!(decision.mask.contains("title"));
    }

    #[test]
    fn test_requesting_masked_column_is_denied_by_name() {
        let entity = entity_json(json!([{
            "role": "anonymous",
            "actions": [{
                "action": "read",
                "fields": { "include": ["*"], "exclude": ["ssn"] }
            }]
        }]));
        let result = authorize(
            &Principal::anonymous(),
            &entity,
            ActionKind::Read,
            &["ssn".to_string()],
            &book_shape(),
        );
        assert!(matches!(
            result.unwrap_err(),
            GatewayError::Auth(AuthError::FieldNotPermitted(col)) if col == "ssn"
        ));
    }

    #[test]
    fn test_policy_claims_substitution() {
        let entity = entity_json(json!([{
            "role": "author",
            "actions": [{
                "action": "update",
                "policy": { "database": "@item.author_id eq @claims.sub" }
            }]
        }]));
        let decision = authorize(
            &principal("author", &[("sub", json!(99))]),
            &entity,
            ActionKind::Update,
            &[],
            &book_shape(),
        )
        .unwrap();
        assert_eq!(
            decision.predicate,
            Some(Expression::Compare {
                left: Operand::Column("author_id".to_string()),
                op: CompareOp::Eq,
                right: Operand::Literal(LiteralValue::Int(99)),
            })
        );
    }

    #[test]
    fn test_policy_missing_claim_is_denied() {
        let entity = entity_json(json!([{
            "role": "author",
            "actions": [{
                "action": "update",
                "policy": { "database": "@item.author_id eq @claims.sub" }
            }]
        }]));
        let result = authorize(
            &principal("author", &[]),
            &entity,
            ActionKind::Update,
            &[],
            &book_shape(),
        );
        assert!(matches!(
            result.unwrap_err(),
            GatewayError::Auth(AuthError::MissingClaim(name)) if name == "sub"
        ));
    }

    #[test]
    fn test_execute_skips_policy() {
        let entity: Entity = serde_json::from_value(serde_json::json!({
            "source": { "object": "dbo.get_books", "type": "stored-procedure" },
            "permissions": [{
                "role": "caller",
                "actions": [{
                    "action": "execute",
                    "policy": { "database": "@item.owner eq @claims.sub" }
                }]
            }]
        }))
        .unwrap();
        let decision = authorize(
            &principal("caller", &[]),
            &entity,
            ActionKind::Execute,
            &[],
            &book_shape(),
        )
        .unwrap();
        assert!(decision.predicate.is_none());
    }
}
