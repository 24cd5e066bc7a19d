mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;

use common::{anonymous, library_gateway};
use strata_gateway::engine::GraphQlRequest;

fn decode_cursor_payload(cursor: &str) -> serde_json::Value {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_end_cursor_encodes_the_last_row_key() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { books(first: 2, orderBy: { id: ASC }) { items { id } hasNextPage endCursor } }",
            ),
            &anonymous(),
        )
        .await;

    let connection = &response["data"]["books"];
    assert_eq!(connection["hasNextPage"], json!(true));
    let cursor = connection["endCursor"].as_str().unwrap();
    assert_eq!(decode_cursor_payload(cursor), json!({ "id": 2 }));
}

#[tokio::test]
async fn test_pages_concatenate_to_the_full_result() {
    let (gateway, connector) = library_gateway("development").await;

    let all_ids: Vec<i64> = (1..=5).collect();
    let mut collected = Vec::new();
    let mut after: Option<String> = None;

    // The fake returns what the seek predicate would produce per page.
    connector.queue_query(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
    connector.queue_query(json!([{ "id": 3 }, { "id": 4 }, { "id": 5 }]));
    connector.queue_query(json!([{ "id": 5 }]));

    for _ in 0..3 {
        let after_arg = match &after {
            Some(cursor) => format!(", after: \"{cursor}\""),
            None => String::new(),
        };
        let query = format!(
            "query {{ books(first: 2{after_arg}) {{ items {{ id }} hasNextPage endCursor }} }}"
        );
        let response = gateway
            .execute_graphql(&GraphQlRequest::new(query), &anonymous())
            .await;
        let connection = &response["data"]["books"];
        for item in connection["items"].as_array().unwrap() {
            collected.push(item["id"].as_i64().unwrap());
        }
        if !connection["hasNextPage"].as_bool().unwrap() {
            break;
        }
        after = connection["endCursor"].as_str().map(str::to_string);
    }

    assert_eq!(collected, all_ids);
}

#[tokio::test]
async fn test_seek_predicate_resumes_after_the_cursor() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { books(first: 2) { endCursor } }"),
            &anonymous(),
        )
        .await;
    let cursor = response["data"]["books"]["endCursor"]
        .as_str()
        .unwrap()
        .to_string();

    connector.queue_query(json!([{ "id": 3 }]));
    gateway
        .execute_graphql(
            &GraphQlRequest::new(format!(
                "query {{ books(first: 2, after: \"{cursor}\") {{ items {{ id }} }} }}"
            )),
            &anonymous(),
        )
        .await;

    let statement = connector.last_statement().unwrap();
    assert!(
        statement.sql.contains("\"t0\".\"id\" > $1"),
        "keyset predicate, not offset: {}",
        statement.sql
    );
    assert_eq!(
        statement.parameters[0].value,
        strata_gateway::utils::LiteralValue::Int(2)
    );
    assert!(!statement.sql.to_uppercase().contains("OFFSET"));
}

#[tokio::test]
async fn test_cursor_for_a_different_ordering_is_rejected() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { books(first: 2) { endCursor } }"),
            &anonymous(),
        )
        .await;
    let cursor = response["data"]["books"]["endCursor"]
        .as_str()
        .unwrap()
        .to_string();

    // Same cursor, different orderBy: the column sets no longer match.
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(format!(
                "query {{ books(first: 2, after: \"{cursor}\", orderBy: {{ year: DESC }}) {{ items {{ id }} }} }}"
            )),
            &anonymous(),
        )
        .await;

    let error = &response["errors"][0];
    assert_eq!(error["extensions"]["code"], json!("BadRequest"));
    let message = error["message"].as_str().unwrap();
    assert!(message.contains("cursor"));
    // Deterministic message, no row data echoed back.
    assert!(!message.contains("\"id\""));
}

#[tokio::test]
async fn test_garbage_cursor_is_rejected() {
    let (gateway, _connector) = library_gateway("development").await;
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { books(first: 2, after: \"!!!not-base64!!!\") { items { id } } }",
            ),
            &anonymous(),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("BadRequest")
    );
}

#[tokio::test]
async fn test_exact_final_page_reports_no_next() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([{ "id": 4 }, { "id": 5 }]));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { books(first: 2) { items { id } hasNextPage } }"),
            &anonymous(),
        )
        .await;
    let connection = &response["data"]["books"];
    assert_eq!(connection["items"], json!([{ "id": 4 }, { "id": 5 }]));
    assert_eq!(connection["hasNextPage"], json!(false));
}
