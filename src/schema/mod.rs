// GraphQL schema synthesis and REST route table
pub mod graphql_schema;
pub mod route_table;

pub use graphql_schema::*;
pub use route_table::*;
