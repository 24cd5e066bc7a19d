// Backend connectors behind the thin connection+execute interface
pub mod connector_trait;
pub mod cosmos_connector;
pub mod fake_connector;
pub mod postgres_connector;
pub mod sqlserver_connector;

pub use connector_trait::*;
pub use cosmos_connector::*;
pub use fake_connector::*;
pub use postgres_connector::*;
pub use sqlserver_connector::*;
