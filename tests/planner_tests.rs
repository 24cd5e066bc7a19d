mod common;

use serde_json::json;

use common::{anonymous, library_gateway};
use strata_gateway::engine::GraphQlRequest;
use strata_gateway::utils::LiteralValue;

#[tokio::test]
async fn test_pk_read_compiles_to_single_parameterized_statement() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!({ "id": 5, "title": "Dune" }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 5) { id title } }"),
            &anonymous(),
        )
        .await;

    assert_eq!(
        response,
        json!({ "data": { "book": { "id": 5, "title": "Dune" } } })
    );

    let captured = connector.captured();
    assert_eq!(captured.len(), 1, "a PK read is one statement");
    let statement = &captured[0];
    assert!(statement.sql.contains("FROM \"books\" AS \"t0\""));
    assert!(statement.sql.contains("\"t0\".\"id\" = $1"));
    assert_eq!(statement.parameters.len(), 1);
    assert_eq!(statement.parameters[0].value, LiteralValue::Int(5));
}

#[tokio::test]
async fn test_filtered_paged_list_statement() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([
        { "id": 1, "year": 2001 },
        { "id": 2, "year": 2002 },
        { "id": 3, "year": 2003 }
    ]));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { books(first: 2, filter: { year: { gt: 2000 } }, orderBy: { id: ASC }) \
                 { items { id } hasNextPage endCursor } }",
            ),
            &anonymous(),
        )
        .await;

    let connection = &response["data"]["books"];
    assert_eq!(connection["items"], json!([{ "id": 1 }, { "id": 2 }]));
    assert_eq!(connection["hasNextPage"], json!(true));

    let statement = connector.last_statement().unwrap();
    // first + 1 probes for the next page.
    assert!(statement.sql.contains("LIMIT 3"));
    assert!(statement.sql.contains("\"t0\".\"year\" > $1"));
    assert!(statement.sql.contains("ORDER BY \"t0\".\"id\" ASC"));
    assert_eq!(statement.parameters[0].value, LiteralValue::Int(2000));
}

#[tokio::test]
async fn test_nested_one_to_many_compiles_to_one_statement() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!({
        "id": 1,
        "name": "Chilton",
        "books": [
            { "id": 10, "title": "Dune" },
            { "id": 11, "title": "Dune Messiah" }
        ]
    }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { publisher(id: 1) { name books { items { id title } } } }",
            ),
            &anonymous(),
        )
        .await;

    assert_eq!(
        response["data"]["publisher"],
        json!({
            "name": "Chilton",
            "books": {
                "items": [
                    { "id": 10, "title": "Dune" },
                    { "id": 11, "title": "Dune Messiah" }
                ]
            }
        })
    );

    let captured = connector.captured();
    assert_eq!(captured.len(), 1, "nested selections stay in one statement");
    let sql = &captured[0].sql;
    assert!(sql.contains("json_agg"), "child array uses JSON aggregation");
    assert!(
        sql.contains("\"t1\".\"publisher_id\" = \"t0\".\"id\""),
        "child subquery correlates on the inferred foreign key: {sql}"
    );
}

#[tokio::test]
async fn test_many_to_many_goes_through_link_table() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!({
        "id": 5,
        "authors": [{ "id": 7, "name": "Frank Herbert" }]
    }));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 5) { authors { items { name } } } }"),
            &anonymous(),
        )
        .await;

    assert_eq!(
        response["data"]["book"]["authors"]["items"],
        json!([{ "name": "Frank Herbert" }])
    );

    let sql = connector.last_statement().unwrap().sql;
    assert!(sql.contains("INNER JOIN \"book_authors\""));
    assert!(sql.contains("\"book_id\""));
    assert!(sql.contains("\"author_id\""));
}

#[tokio::test]
async fn test_user_strings_never_reach_sql_text() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([]));

    let hostile = "Robert'); DROP TABLE books;--";
    let request = GraphQlRequest {
        query: "query($t: String) { books(filter: { title: { eq: $t } }) { items { id } } }"
            .to_string(),
        variables: Some(
            json!({ "t": hostile })
                .as_object()
                .cloned()
                .unwrap(),
        ),
        operation_name: None,
    };
    let response = gateway.execute_graphql(&request, &anonymous()).await;
    assert!(response["errors"].is_null() || response["errors"].as_array().is_none());

    let statement = connector.last_statement().unwrap();
    assert!(!statement.sql.contains("DROP TABLE"));
    assert!(statement
        .parameters
        .iter()
        .any(|p| p.value == LiteralValue::String(hostile.to_string())));
}

#[tokio::test]
async fn test_group_by_compiles_and_repacks() {
    let (gateway, connector) = library_gateway("development").await;
    connector.queue_query(json!([
        { "year": 1965, "total": 3 },
        { "year": 1969, "total": 1 }
    ]));

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { booksGroupBy(by: [year], aggregations: [{ fn: count, field: \"id\", alias: \"total\" }]) \
                 { fields aggregations } }",
            ),
            &anonymous(),
        )
        .await;

    assert_eq!(
        response["data"]["booksGroupBy"],
        json!([
            { "fields": { "year": 1965 }, "aggregations": { "total": 3 } },
            { "fields": { "year": 1969 }, "aggregations": { "total": 1 } }
        ])
    );

    let sql = connector.last_statement().unwrap().sql;
    assert!(sql.contains("GROUP BY \"t0\".\"year\""));
    assert!(sql.contains("COUNT(\"t0\".\"id\") AS \"total\""));
}

#[tokio::test]
async fn test_unknown_field_is_bad_request() {
    let (gateway, _connector) = library_gateway("development").await;
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { book(id: 1) { nope } }"),
            &anonymous(),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("BadRequest")
    );
    assert_eq!(response["errors"][0]["extensions"]["status"], json!(400));
}

#[tokio::test]
async fn test_first_above_cap_is_rejected() {
    let (gateway, _connector) = library_gateway("development").await;
    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new("query { books(first: 5000) { items { id } } }"),
            &anonymous(),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("BadRequest")
    );
    let message = response["errors"][0]["message"].as_str().unwrap();
    assert!(message.contains("1000"));
}

#[tokio::test]
async fn test_depth_limit_enforced() {
    let mut config = common::library_config("development");
    config.runtime.graphql.depth_limit = Some(2);
    let connector = common::library_connector();
    let gateway = strata_gateway::Gateway::new(std::sync::Arc::new(config), connector)
        .await
        .unwrap();

    let response = gateway
        .execute_graphql(
            &GraphQlRequest::new(
                "query { publisher(id: 1) { books { items { title } } } }",
            ),
            &anonymous(),
        )
        .await;
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("BadRequest")
    );
    assert!(response["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("depth"));
}
