mod common;

use serde_json::json;

use common::{anonymous, library_gateway, principal_with_role};
use strata_gateway::engine::GraphQlRequest;
use strata_gateway::utils::MutationOutcome;

#[tokio::test]
async fn test_masked_column_selection_is_denied() {
    let (gateway, connector) = library_gateway("development").await;

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 5) { id ssn } }"),
            &anonymous(),
        )
        .await;

    assert_eq!(response["data"], json!(null));
    let error = &response["errors"][0];
    assert_eq!(error["extensions"]["code"], json!("AuthorizationFailed"));
    assert_eq!(error["extensions"]["status"], json!(403));
    // The denial names only the column the caller already supplied.
    assert!(error["message"].as_str().unwrap().contains("ssn"));

    // Nothing reached the database.
    assert!(connector.captured().is_empty());
}

#[tokio::test]
async fn test_mask_is_applied_even_to_unrequested_leaks() {
    let (gateway, connector) = library_gateway("development").await;
    // The database returns more than it should; the shaper must strip it.
    connector.queue_query(json!({ "id": 5, "title": "Dune", "ssn": "123-45-6789" }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 5) { id title } }"),
            &anonymous(),
        )
        .await;

    assert_eq!(
        response["data"]["book"],
        json!({ "id": 5, "title": "Dune" })
    );
}

#[tokio::test]
async fn test_undeclared_role_is_denied() {
    let (gateway, _connector) = library_gateway("development").await;
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 5) { id } }"),
            &principal_with_role("intruder", &[]),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("AuthorizationFailed")
    );
}

#[tokio::test]
async fn test_row_policy_is_pushed_into_the_update_statement() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_mutation(MutationOutcome {
        rows_affected: 1,
        returned: Some(json!([{ "id": 7 }])),
    });
    connector.queue_query(json!({ "id": 7, "title": "x" }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "mutation { updateBook(id: 7, item: { title: \"x\" }) { id title } }",
            ),
            &principal_with_role("author", &[("sub", json!(42))]),
        )
        .await;

    assert_eq!(
        response["data"]["updateBook"],
        json!({ "id": 7, "title": "x" })
    );

    let update = &connector.captured()[0];
    assert!(update.sql.contains("UPDATE \"books\""));
    assert!(
        update.sql.contains("\"author_id\" = $3"),
        "claims value is bound, not inlined: {}",
        update.sql
    );
    assert!(update
        .parameters
        .iter()
        .any(|p| p.value == strata_gateway::utils::LiteralValue::Int(42)));
}

#[tokio::test]
async fn test_policy_mismatch_is_forbidden_in_development() {
    let (gateway, connector) = library_gateway("development").await;
    // The row exists but belongs to author 42; the policy filters it out.
    connector.queue_mutation(MutationOutcome {
        rows_affected: 0,
        returned: None,
    });
    // Development mode probes by key to distinguish the two cases.
    connector.queue_query(json!({ "id": 7 }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "mutation { updateBook(id: 7, item: { title: \"x\" }) { id } }",
            ),
            &principal_with_role("author", &[("sub", json!(99))]),
        )
        .await;

    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("AuthorizationFailed")
    );
}

#[tokio::test]
async fn test_policy_mismatch_is_not_found_in_production() {
    let (gateway, connector) = library_gateway("production").await;
    connector.queue_mutation(MutationOutcome {
        rows_affected: 0,
        returned: None,
    });

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "mutation { updateBook(id: 7, item: { title: \"x\" }) { id } }",
            ),
            &principal_with_role("author", &[("sub", json!(99))]),
        )
        .await;

    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("EntityNotFound")
    );
    // No probe ran; production collapses both cases.
    assert_eq!(connector.captured().len(), 1);
}

#[tokio::test]
async fn test_missing_claim_is_denied() {
    let (gateway, _connector) = library_gateway("development").await;
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "mutation { updateBook(id: 7, item: { title: \"x\" }) { id } }",
            ),
            &principal_with_role("author", &[]),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("AuthorizationFailed")
    );
    assert!(response["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("sub"));
}

#[tokio::test]
async fn test_order_by_masked_column_is_allowed_but_not_leaked() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([{ "id": 1, "ssn": "x" }]));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { books(orderBy: { ssn: ASC }) { items { id } } }",
            ),
            &anonymous(),
        )
        .await;

    // Ordering by a masked column is a metadata operation.
    assert_eq!(response["data"]["books"]["items"], json!([{ "id": 1 }]));
    let sql = connector.last_statement().unwrap().sql;
    assert!(sql.contains("ORDER BY \"t0\".\"ssn\" ASC"));
}
