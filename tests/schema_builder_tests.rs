mod common;

use std::sync::Arc;

use serde_json::json;

use common::{library_config, library_connector};
use strata_gateway::config::RuntimeConfig;
use strata_gateway::metadata::{ColumnDef, ColumnType, TableShape};
use strata_gateway::Gateway;

#[tokio::test]
async fn test_sdl_is_deterministic_for_identical_configs() {
    let gateway_a = Gateway::new(Arc::new(library_config("development")), library_connector())
        .await
        .unwrap();
    let gateway_b = Gateway::new(Arc::new(library_config("development")), library_connector())
        .await
        .unwrap();

    let sdl_a = gateway_a.sdl().await;
    let sdl_b = gateway_b.sdl().await;
    assert_eq!(sdl_a, sdl_b, "byte-identical configs produce byte-identical SDL");
}

#[tokio::test]
async fn test_entity_types_and_root_fields() {
    let gateway = Gateway::new(Arc::new(library_config("development")), library_connector())
        .await
        .unwrap();
    let sdl = gateway.sdl().await;

    // Object type with scalar mapping and navigation fields.
    assert!(sdl.contains("type Book {"));
    assert!(sdl.contains("id: Int!"));
    assert!(sdl.contains("title: String!"));
    assert!(sdl.contains("year: Int"));
    assert!(sdl.contains("publisher: Publisher"));
    assert!(sdl.contains(
        "authors(first: Int, after: String, filter: AuthorFilterInput, orderBy: AuthorOrderByInput): AuthorConnection"
    ));

    // Connection wrapper.
    assert!(sdl.contains("type BookConnection {"));
    assert!(sdl.contains("items: [Book!]!"));
    assert!(sdl.contains("hasNextPage: Boolean!"));
    assert!(sdl.contains("endCursor: String"));

    // Filter and orderBy inputs.
    assert!(sdl.contains("input BookFilterInput {"));
    assert!(sdl.contains("and: [BookFilterInput]"));
    assert!(sdl.contains("input BookOrderByInput {"));
    assert!(sdl.contains("enum OrderBy {"));

    // Root fields.
    assert!(sdl.contains("book(id: Int!): Book"));
    assert!(sdl.contains(
        "books(first: Int, after: String, filter: BookFilterInput, orderBy: BookOrderByInput): BookConnection!"
    ));
    assert!(sdl.contains("booksGroupBy(by: [BookGroupByField!]!"));
}

#[tokio::test]
async fn test_mutations_follow_granted_actions() {
    let gateway = Gateway::new(Arc::new(library_config("development")), library_connector())
        .await
        .unwrap();
    let sdl = gateway.sdl().await;

    // admin grants * on Book, so all mutations exist.
    assert!(sdl.contains("createBook(item: CreateBookInput!): Book"));
    assert!(sdl.contains("updateBook(id: Int!, item: UpdateBookInput!): Book"));
    assert!(sdl.contains("deleteBook(id: Int!): Book"));

    // Auto-generated key columns stay out of the create input.
    let create_input = sdl
        .split("input CreateBookInput {")
        .nth(1)
        .unwrap()
        .split('}')
        .next()
        .unwrap();
    assert!(!create_input.contains("id:"));
    assert!(create_input.contains("title: String!"));
}

#[tokio::test]
async fn test_read_only_entity_has_no_mutations() {
    let mut raw = serde_json::to_value(library_config("development")).unwrap();
    // Strip the admin wildcard so only reads remain on Author.
    raw["entities"]["Author"]["permissions"] = json!([
        { "role": "anonymous", "actions": ["read"] }
    ]);
    let config: RuntimeConfig = serde_json::from_value(raw).unwrap();
    let gateway = Gateway::new(Arc::new(config), library_connector())
        .await
        .unwrap();
    let sdl = gateway.sdl().await;

    assert!(!sdl.contains("createAuthor"));
    assert!(!sdl.contains("updateAuthor"));
    assert!(!sdl.contains("deleteAuthor"));
    assert!(sdl.contains("author(id: Int!): Author"));
}

#[tokio::test]
async fn test_graphql_disabled_entity_is_absent() {
    let mut raw = serde_json::to_value(library_config("development")).unwrap();
    raw["entities"]["Author"]["graphql"] = json!(false);
    let config: RuntimeConfig = serde_json::from_value(raw).unwrap();
    let gateway = Gateway::new(Arc::new(config), library_connector())
        .await
        .unwrap();
    let sdl = gateway.sdl().await;

    assert!(!sdl.contains("type Author {"));
    assert!(!sdl.contains("authors(first:"));
}

#[tokio::test]
async fn test_stored_procedure_exposes_execute_field() {
    let mut raw = serde_json::to_value(library_config("development")).unwrap();
    raw["entities"]["BestSellers"] = json!({
        "source": {
            "object": "dbo.best_sellers",
            "type": "stored-procedure",
            "parameters": { "top": 10 }
        },
        "graphql": { "operation": "query" },
        "permissions": [{ "role": "anonymous", "actions": ["execute"] }]
    });
    let config: RuntimeConfig = serde_json::from_value(raw).unwrap();

    let connector = Arc::new(
        strata_gateway::connectors::FakeConnector::new(
            strata_gateway::config::DatabaseKind::PostgreSql,
        )
        .with_shape("books", common::books_shape())
        .with_shape("publishers", common::publishers_shape())
        .with_shape("authors", common::authors_shape())
        .with_shape(
            "dbo.best_sellers",
            TableShape {
                columns: vec![
                    ColumnDef::new("id", ColumnType::Int),
                    ColumnDef::new("title", ColumnType::Text),
                ],
                primary_key: vec![],
                foreign_keys: vec![],
                parameters: vec![ColumnDef::new("top", ColumnType::Int)],
            },
        ),
    );
    let gateway = Gateway::new(Arc::new(config), connector).await.unwrap();
    let sdl = gateway.sdl().await;

    assert!(sdl.contains("executeBestSellers(top: Int): [BestSellers!]!"));
    // Stored procedures never get table-style queries or mutations.
    assert!(!sdl.contains("bestSellerss"));
    assert!(!sdl.contains("createBestSellers"));
}

#[tokio::test]
async fn test_custom_scalars_and_shared_inputs_are_declared() {
    let gateway = Gateway::new(Arc::new(library_config("development")), library_connector())
        .await
        .unwrap();
    let sdl = gateway.sdl().await;

    for scalar in ["scalar Long", "scalar DateTime", "scalar ByteArray", "scalar JSON"] {
        assert!(sdl.contains(scalar), "missing {scalar}");
    }
    assert!(sdl.contains("input IntFilterInput {"));
    assert!(sdl.contains("input StringFilterInput {"));
    assert!(sdl.contains("contains: String"));
    assert!(sdl.contains("input AggregationInput {"));
    assert!(sdl.contains("type GroupByResult {"));
}

#[tokio::test]
async fn test_relationship_name_clashing_with_column_fails() {
    let mut raw = serde_json::to_value(library_config("development")).unwrap();
    raw["entities"]["Book"]["relationships"]["title"] = json!({
        "cardinality": "one",
        "target.entity": "Publisher"
    });
    let config: RuntimeConfig = serde_json::from_value(raw).unwrap();
    let result = Gateway::new(Arc::new(config), library_connector()).await;
    assert!(result.is_err());
}
