use serde_json::{Map, Value as JsonValue};

use crate::config::model::Cardinality;
use crate::engine::cursor::encode_cursor;
use crate::engine::structure::{ConnectionSelection, NestedQuery, SqlQueryStructure};
use crate::utils::error::{GatewayError, GatewayResult};

/// One shaped page of a list read.
#[derive(Debug, Clone)]
pub struct ShapedPage {
    pub items: Vec<JsonValue>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Shape a list document: decode the `+1` keyset probe, encode the end
/// cursor from the last surviving row, then apply the column mask.
pub fn shape_list(query: &SqlQueryStructure, document: JsonValue) -> GatewayResult<ShapedPage> {
    let mut rows = match document {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(rows) => rows,
        other => {
            return Err(GatewayError::Internal(format!(
                "expected a JSON array from the database, got {other}"
            )))
        }
    };

    let mut has_next_page = false;
    if let Some(first) = query.first {
        if rows.len() as u64 > first {
            rows.truncate(first as usize);
            has_next_page = true;
        }
    }

    // The cursor is encoded before masking so ordering keys outside the
    // requested selection are still available.
    let end_cursor = match (rows.last(), query.order_by.is_empty()) {
        (Some(last), false) => Some(encode_cursor(last, &query.order_by)?),
        _ => None,
    };

    for row in &mut rows {
        apply_row(query, row)?;
    }

    Ok(ShapedPage {
        items: rows,
        has_next_page,
        end_cursor,
    })
}

/// Shape a single-object document (fetch-by-key). `None` when no row matched.
pub fn shape_object(
    query: &SqlQueryStructure,
    document: JsonValue,
) -> GatewayResult<Option<JsonValue>> {
    match document {
        JsonValue::Null => Ok(None),
        JsonValue::Array(rows) => {
            // Some dialects return single-object reads as a one-row array.
            match rows.into_iter().next() {
                Some(mut row) => {
                    apply_row(query, &mut row)?;
                    Ok(Some(row))
                }
                None => Ok(None),
            }
        }
        mut row => {
            apply_row(query, &mut row)?;
            Ok(Some(row))
        }
    }
}

/// Repack groupBy rows into `{fields, aggregations}` pairs.
pub fn shape_group_by(
    query: &SqlQueryStructure,
    document: JsonValue,
) -> GatewayResult<Vec<JsonValue>> {
    let group_by = query
        .group_by
        .as_ref()
        .ok_or_else(|| GatewayError::Internal("not a groupBy structure".to_string()))?;

    let rows = match document {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(rows) => rows,
        other => {
            return Err(GatewayError::Internal(format!(
                "expected a JSON array from the database, got {other}"
            )))
        }
    };

    let mut shaped = Vec::with_capacity(rows.len());
    for row in rows {
        let JsonValue::Object(map) = row else {
            continue;
        };
        let mut fields = Map::new();
        let mut aggregations = Map::new();
        for (key, value) in map {
            if group_by.by.contains(&key) {
                fields.insert(key, value);
            } else if group_by
                .aggregations
                .iter()
                .any(|aggregation| aggregation.alias == key)
            {
                aggregations.insert(key, value);
            }
        }
        shaped.push(serde_json::json!({
            "fields": fields,
            "aggregations": aggregations,
        }));
    }
    Ok(shaped)
}

/// Assemble a GraphQL connection object honoring the selected sub-fields.
pub fn connection_object(page: ShapedPage, selection: ConnectionSelection) -> JsonValue {
    let mut object = Map::new();
    if selection.items {
        object.insert("items".to_string(), JsonValue::Array(page.items));
    }
    if selection.has_next_page {
        object.insert(
            "hasNextPage".to_string(),
            JsonValue::Bool(page.has_next_page),
        );
    }
    if selection.end_cursor {
        object.insert(
            "endCursor".to_string(),
            page.end_cursor.map_or(JsonValue::Null, JsonValue::String),
        );
    }
    JsonValue::Object(object)
}

/// Wrap a REST list page in the `{value, nextLink}` envelope.
pub fn rest_envelope(page: ShapedPage, path: &str) -> JsonValue {
    let mut envelope = Map::new();
    envelope.insert("value".to_string(), JsonValue::Array(page.items));
    if page.has_next_page {
        if let Some(cursor) = &page.end_cursor {
            envelope.insert(
                "nextLink".to_string(),
                JsonValue::String(format!("{path}?$after={cursor}")),
            );
        }
    }
    JsonValue::Object(envelope)
}

/// Apply the column mask to one row, recursing into nested entities with
/// their own masks. Keys that are neither requested projections inside the
/// mask nor selected navigations are deleted.
fn apply_row(query: &SqlQueryStructure, row: &mut JsonValue) -> GatewayResult<()> {
    let JsonValue::Object(map) = row else {
        return Ok(());
    };

    let mut shaped = Map::new();
    for (key, value) in std::mem::take(map) {
        if let Some(projected) = query.columns.iter().find(|column| column.alias == key) {
            if projected.requested && query.mask.contains(&projected.column) {
                shaped.insert(key, value);
            }
            continue;
        }
        if let Some(child) = query.children.iter().find(|child| child.field == key) {
            shaped.insert(key, shape_child(child, value)?);
        }
        // Anything else was projected for internal use only.
    }
    *map = shaped;
    Ok(())
}

fn shape_child(child: &NestedQuery, value: JsonValue) -> GatewayResult<JsonValue> {
    // Some backends hand nested JSON back as a string column.
    let value = match value {
        JsonValue::String(text) => {
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
        }
        other => other,
    };

    match child.cardinality {
        Cardinality::One => {
            let shaped = shape_object(&child.query, value)?;
            Ok(shaped.unwrap_or(JsonValue::Null))
        }
        Cardinality::Many => {
            let page = shape_list(&child.query, value)?;
            match child.connection {
                Some(selection) => Ok(connection_object(page, selection)),
                None => Ok(JsonValue::Array(page.items)),
            }
        }
    }
}
