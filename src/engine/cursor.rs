use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value as JsonValue};

use crate::engine::structure::OrderByColumn;
use crate::utils::error::{GatewayResult, PlanError};
use crate::utils::types::{CompareOp, Expression, LiteralValue, Operand, OrderDirection};

/// Encode the keyset cursor for a row: a base64-url JSON object mapping each
/// ordering column (primary key included) to the row's value.
pub fn encode_cursor(row: &JsonValue, order: &[OrderByColumn]) -> GatewayResult<String> {
    let mut payload = Map::new();
    for entry in order {
        let value = row.get(&entry.column).cloned().ok_or_else(|| {
            PlanError::InvalidCursor(format!(
                "row is missing ordering column '{}'",
                entry.column
            ))
        })?;
        payload.insert(entry.column.clone(), value);
    }
    let bytes = serde_json::to_vec(&JsonValue::Object(payload))
        .map_err(|e| PlanError::InvalidCursor(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a cursor against the current ordering. The cursor's column set
/// must match the ordering exactly; the error is deterministic and carries
/// no row data.
pub fn decode_cursor(
    cursor: &str,
    order: &[OrderByColumn],
) -> GatewayResult<Vec<(OrderByColumn, LiteralValue)>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| PlanError::InvalidCursor("not valid base64".to_string()))?;
    let value: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|_| PlanError::InvalidCursor("not valid JSON".to_string()))?;
    let JsonValue::Object(map) = value else {
        return Err(PlanError::InvalidCursor("not a JSON object".to_string()).into());
    };

    if map.len() != order.len()
        || order.iter().any(|entry| !map.contains_key(&entry.column))
    {
        return Err(PlanError::InvalidCursor(
            "cursor columns do not match the current orderBy".to_string(),
        )
        .into());
    }

    let mut decoded = Vec::with_capacity(order.len());
    for entry in order {
        let raw = &map[&entry.column];
        let literal = LiteralValue::from_json(raw).ok_or_else(|| {
            PlanError::InvalidCursor(format!(
                "cursor value for '{}' is not a scalar",
                entry.column
            ))
        })?;
        decoded.push((entry.clone(), literal));
    }
    Ok(decoded)
}

/// Build the strict "tuple greater-than" predicate that resumes a keyset
/// page after the decoded cursor position, honoring per-column directions.
pub fn seek_predicate(decoded: &[(OrderByColumn, LiteralValue)]) -> Option<Expression> {
    let mut alternatives = Vec::new();
    for (index, (entry, value)) in decoded.iter().enumerate() {
        let mut conjunction: Vec<Expression> = decoded[..index]
            .iter()
            .map(|(prefix, prefix_value)| {
                Expression::column_eq(prefix.column.clone(), prefix_value.clone())
            })
            .collect();
        let strict = match entry.direction {
            OrderDirection::Asc => CompareOp::Gt,
            OrderDirection::Desc => CompareOp::Lt,
        };
        conjunction.push(Expression::Compare {
            left: Operand::Column(entry.column.clone()),
            op: strict,
            right: Operand::Literal(value.clone()),
        });
        alternatives.push(
            Expression::and_all(conjunction).expect("conjunction is never empty"),
        );
    }
    match alternatives.len() {
        0 => None,
        1 => Some(alternatives.remove(0)),
        _ => Some(Expression::Or(alternatives)),
    }
}
