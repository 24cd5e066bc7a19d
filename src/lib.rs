pub mod auth;
pub mod config;
pub mod connectors;
pub mod engine;
pub mod metadata;
pub mod schema;
pub mod utils;

pub use auth::{authorize, Decision};
pub use config::{ConfigLoader, ConfigStore, ConfigWatcher, ReloadOutcome, RuntimeConfig};
pub use connectors::{Connector, FakeConnector};
pub use engine::{
    Gateway, GatewayBuilder, GraphQlRequest, QueryExecutor, RequestContext, RestRequest,
    RestResponse,
};
pub use metadata::{CachedMetadataProvider, MetadataProvider, TableShape};
pub use schema::{GatewaySchema, RouteTable};
pub use utils::{GatewayError, GatewayResult, Principal, SubCode};
