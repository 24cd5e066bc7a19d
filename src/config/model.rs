use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::utils::error::{GatewayResult, MetadataError};

/// Root configuration snapshot. Immutable once published; hot-reload replaces
/// the whole value behind an atomic reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(rename = "data-source")]
    pub data_source: DataSourceConfig,

    #[serde(default)]
    pub runtime: RuntimeOptions,

    /// Entity catalog, keyed by logical entity name. Kept ordered so that
    /// derived artifacts (SDL, route table) are deterministic.
    pub entities: BTreeMap<String, Entity>,
}

impl RuntimeConfig {
    pub fn entity(&self, name: &str) -> GatewayResult<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| MetadataError::UnknownEntity(name.to_string()).into())
    }

    pub fn is_development(&self) -> bool {
        self.runtime.host.mode == HostMode::Development
    }
}

/// Backend database kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DatabaseKind {
    #[serde(rename = "mssql")]
    MsSql,
    #[serde(rename = "postgresql")]
    PostgreSql,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "cosmos-sql")]
    CosmosSql,
    #[serde(rename = "cosmos-nosql")]
    CosmosNoSql,
    #[serde(rename = "dwsql")]
    DwSql,
}

impl DatabaseKind {
    /// Document backends derive entity shapes from a schema file instead of
    /// introspecting the database.
    pub fn is_document(&self) -> bool {
        matches!(self, DatabaseKind::CosmosSql | DatabaseKind::CosmosNoSql)
    }
}

/// The single configured data source
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceConfig {
    #[serde(rename = "database-type")]
    pub database_type: DatabaseKind,

    #[serde(rename = "connection-string")]
    pub connection_string: String,

    #[serde(default)]
    pub options: DataSourceOptions,
}

/// Backend-specific data source options
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Path to the GraphQL schema file describing document containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(
        rename = "set-session-context",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub set_session_context: bool,
}

/// Global runtime options
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeOptions {
    #[serde(default)]
    pub rest: RestRuntimeOptions,

    #[serde(default)]
    pub graphql: GraphQlRuntimeOptions,

    #[serde(default)]
    pub host: HostOptions,
}

/// REST surface options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RestRuntimeOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rest_path")]
    pub path: String,

    #[serde(rename = "request-body-strict", default = "default_true")]
    pub request_body_strict: bool,
}

impl Default for RestRuntimeOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_rest_path(),
            request_body_strict: true,
        }
    }
}

/// GraphQL surface options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GraphQlRuntimeOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_graphql_path")]
    pub path: String,

    #[serde(rename = "allow-introspection", default)]
    pub allow_introspection: bool,

    /// Maximum selection depth; `None` or `-1` means unlimited.
    #[serde(rename = "depth-limit", default, skip_serializing_if = "Option::is_none")]
    pub depth_limit: Option<i32>,

    #[serde(rename = "multiple-mutations", default)]
    pub multiple_mutations: bool,
}

impl Default for GraphQlRuntimeOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_graphql_path(),
            allow_introspection: false,
            depth_limit: None,
            multiple_mutations: false,
        }
    }
}

/// Host mode and cross-cutting HTTP options
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostOptions {
    #[serde(default)]
    pub mode: HostMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationOptions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorsOptions {
    #[serde(default)]
    pub origins: Vec<String>,

    #[serde(rename = "allow-credentials", default)]
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationOptions {
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtOptions>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JwtOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// A logical resource mapped to a physical database object
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Entity {
    pub source: EntitySource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<EntityGraphQl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<EntityRest>,

    pub permissions: Vec<PermissionConfig>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipConfig>,
}

impl Entity {
    pub fn source_object(&self) -> &str {
        match &self.source {
            EntitySource::Object(name) => name,
            EntitySource::Detailed { object, .. } => object,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match &self.source {
            EntitySource::Object(_) => SourceKind::Table,
            EntitySource::Detailed { kind, .. } => *kind,
        }
    }

    pub fn is_stored_procedure(&self) -> bool {
        self.source_kind() == SourceKind::StoredProcedure
    }

    /// Key fields declared on the source, used for views and containers that
    /// cannot report a primary key of their own.
    pub fn declared_key_fields(&self) -> &[String] {
        match &self.source {
            EntitySource::Object(_) => &[],
            EntitySource::Detailed { key_fields, .. } => key_fields,
        }
    }

    /// Default parameter values for stored procedures.
    pub fn source_parameters(&self) -> Option<&BTreeMap<String, JsonValue>> {
        match &self.source {
            EntitySource::Object(_) => None,
            EntitySource::Detailed { parameters, .. } => Some(parameters),
        }
    }

    pub fn graphql_enabled(&self) -> bool {
        match &self.graphql {
            None => true,
            Some(EntityGraphQl::Enabled(enabled)) => *enabled,
            Some(EntityGraphQl::Options(options)) => options.enabled,
        }
    }

    /// Singular GraphQL name; defaults to the entity name.
    pub fn graphql_singular(&self, entity_name: &str) -> String {
        match &self.graphql {
            Some(EntityGraphQl::Options(options)) => options
                .singular
                .clone()
                .unwrap_or_else(|| entity_name.to_string()),
            _ => entity_name.to_string(),
        }
    }

    /// Plural GraphQL name; defaults to the singular name with an `s` suffix.
    pub fn graphql_plural(&self, entity_name: &str) -> String {
        match &self.graphql {
            Some(EntityGraphQl::Options(options)) => match &options.plural {
                Some(plural) => plural.clone(),
                None => format!("{}s", self.graphql_singular(entity_name)),
            },
            _ => format!("{}s", self.graphql_singular(entity_name)),
        }
    }

    pub fn rest_enabled(&self) -> bool {
        match &self.rest {
            None => true,
            Some(EntityRest::Enabled(enabled)) => *enabled,
            Some(EntityRest::Options(options)) => options.enabled,
        }
    }

    /// REST path segment; defaults to the entity name.
    pub fn rest_path(&self, entity_name: &str) -> String {
        match &self.rest {
            Some(EntityRest::Options(options)) => options
                .path
                .clone()
                .map(|p| p.trim_start_matches('/').to_string())
                .unwrap_or_else(|| entity_name.to_string()),
            _ => entity_name.to_string(),
        }
    }

    pub fn permissions_for_role(&self, role: &str) -> Option<&PermissionConfig> {
        self.permissions.iter().find(|p| p.role == role)
    }
}

/// Physical object behind an entity: a bare name, or a detailed mapping
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntitySource {
    Object(String),
    Detailed {
        object: String,

        #[serde(rename = "type", default)]
        kind: SourceKind,

        #[serde(rename = "key-fields", default)]
        key_fields: Vec<String>,

        #[serde(default)]
        parameters: BTreeMap<String, JsonValue>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum SourceKind {
    #[default]
    #[serde(rename = "table")]
    Table,
    #[serde(rename = "view")]
    View,
    #[serde(rename = "stored-procedure")]
    StoredProcedure,
}

/// Per-entity GraphQL override: `false`, `true`, or detailed options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityGraphQl {
    Enabled(bool),
    Options(EntityGraphQlOptions),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityGraphQlOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singular: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<GraphQlOperationKind>,
}

/// Root operation type under which a stored procedure is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphQlOperationKind {
    Query,
    Mutation,
}

/// Per-entity REST override: `false`, `true`, or detailed options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityRest {
    Enabled(bool),
    Options(EntityRestOptions),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRestOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
}

/// Permission block for one role
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionConfig {
    pub role: String,
    pub actions: Vec<ActionConfig>,
}

impl PermissionConfig {
    /// Find the action entry matching the verb, honoring the `*` wildcard.
    pub fn action(&self, verb: ActionKind) -> Option<&ActionConfig> {
        self.actions
            .iter()
            .find(|a| a.kind() == verb)
            .or_else(|| self.actions.iter().find(|a| a.kind() == ActionKind::All))
    }
}

/// A permitted action: a bare verb or a detailed block with fields and policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Verb(ActionKind),
    Detailed {
        action: ActionKind,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<FieldsPolicy>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        policy: Option<PolicyConfig>,
    },
}

impl ActionConfig {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionConfig::Verb(kind) => *kind,
            ActionConfig::Detailed { action, .. } => *action,
        }
    }

    pub fn fields(&self) -> Option<&FieldsPolicy> {
        match self {
            ActionConfig::Verb(_) => None,
            ActionConfig::Detailed { fields, .. } => fields.as_ref(),
        }
    }

    pub fn policy(&self) -> Option<&PolicyConfig> {
        match self {
            ActionConfig::Verb(_) => None,
            ActionConfig::Detailed { policy, .. } => policy.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ActionKind {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "execute")]
    Execute,
    #[serde(rename = "*")]
    All,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Read => "read",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Execute => "execute",
            ActionKind::All => "*",
        }
    }
}

/// Column include/exclude lists. `include = ["*"]` means all columns; a
/// column listed in both resolves to excluded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldsPolicy {
    #[serde(default = "default_include_all")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_include_all() -> Vec<String> {
    vec!["*".to_string()]
}

/// Row-level policy expression evaluated by the database
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub database: String,
}

/// Cardinality of a relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// A declared navigation between two entities, optionally through a link table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipConfig {
    pub cardinality: Cardinality,

    #[serde(rename = "target.entity")]
    pub target_entity: String,

    #[serde(rename = "source.fields", default)]
    pub source_fields: Vec<String>,

    #[serde(rename = "target.fields", default)]
    pub target_fields: Vec<String>,

    #[serde(rename = "linking.object", default, skip_serializing_if = "Option::is_none")]
    pub linking_object: Option<String>,

    #[serde(rename = "linking.source.fields", default)]
    pub linking_source_fields: Vec<String>,

    #[serde(rename = "linking.target.fields", default)]
    pub linking_target_fields: Vec<String>,
}

impl RelationshipConfig {
    pub fn is_linking(&self) -> bool {
        self.linking_object.is_some()
    }

    pub fn has_explicit_fields(&self) -> bool {
        !self.source_fields.is_empty() && !self.target_fields.is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_rest_path() -> String {
    "/api".to_string()
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}
