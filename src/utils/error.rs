use thiserror::Error;

/// Wire-level error sub-codes carried by every failure leaving the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCode {
    BadRequest,
    AuthenticationFailed,
    AuthorizationFailed,
    EntityNotFound,
    ItemAlreadyExists,
    UnexpectedError,
    DatabaseOperationFailed,
    ServiceBusy,
    ErrorInInitialization,
}

impl SubCode {
    /// Canonical sub-code string as it appears in error envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubCode::BadRequest => "BadRequest",
            SubCode::AuthenticationFailed => "AuthenticationFailed",
            SubCode::AuthorizationFailed => "AuthorizationFailed",
            SubCode::EntityNotFound => "EntityNotFound",
            SubCode::ItemAlreadyExists => "ItemAlreadyExists",
            SubCode::UnexpectedError => "UnexpectedError",
            SubCode::DatabaseOperationFailed => "DatabaseOperationFailed",
            SubCode::ServiceBusy => "ServiceBusy",
            SubCode::ErrorInInitialization => "ErrorInInitialization",
        }
    }

    /// HTTP status associated with the sub-code.
    pub fn http_status(&self) -> u16 {
        match self {
            SubCode::BadRequest => 400,
            SubCode::AuthenticationFailed => 401,
            SubCode::AuthorizationFailed => 403,
            SubCode::EntityNotFound => 404,
            SubCode::ItemAlreadyExists => 409,
            SubCode::UnexpectedError | SubCode::DatabaseOperationFailed => 500,
            SubCode::ServiceBusy | SubCode::ErrorInInitialization => 503,
        }
    }
}

/// A single configuration validation failure with the config path it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub path: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file after {attempts} attempts: {message}")]
    Io { attempts: u32, message: String },

    #[error("Config file is not valid JSON: {0}")]
    Parse(String),

    #[error("Unresolved environment variable: {0}")]
    UnresolvedEnvVar(String),

    #[error("Config validation failed: {}", format_failures(.0))]
    Validation(Vec<ValidationFailure>),

    #[error("File watch failed: {0}")]
    Watch(String),
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Metadata discovery errors
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Entity '{0}' is not defined in the configuration")]
    UnknownEntity(String),

    #[error("Schema introspection failed for '{object}': {message}")]
    IntrospectionFailed { object: String, message: String },

    #[error("Relationship between '{source_entity}' and '{target}' is ambiguous: multiple foreign keys apply; declare source.fields and target.fields")]
    RelationshipAmbiguous { source_entity: String, target: String },

    #[error("Relationship between '{source_entity}' and '{target}' cannot be resolved: no foreign key and no explicit fields")]
    RelationshipUnresolvable { source_entity: String, target: String },

    #[error("Document schema file is invalid: {0}")]
    SchemaFileInvalid(String),
}

/// GraphQL schema / REST route synthesis errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("GraphQL name '{0}' is used by more than one entity")]
    DuplicateGraphQlName(String),

    #[error("Field '{field}' appears more than once on type '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    #[error("REST path '{0}' is registered by more than one entity")]
    DuplicateRestPath(String),
}

/// Authorization errors; every variant is a typed denial
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Role '{0}' is not permitted on this entity")]
    RoleNotPermitted(String),

    #[error("Action '{action}' is not permitted for role '{role}'")]
    ActionNotPermitted { role: String, action: String },

    #[error("Field '{0}' is not available to the current role")]
    FieldNotPermitted(String),

    #[error("Claim '{0}' referenced by the access policy is not present on the principal")]
    MissingClaim(String),

    #[error("The access policy on '{0}' rejects the targeted row")]
    RowNotPermitted(String),

    #[error("Access policy could not be compiled: {0}")]
    PolicySyntax(String),
}

/// Query planning errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("GraphQL document is not valid: {0}")]
    DocumentSyntax(String),

    #[error("Unknown field '{field}' on '{parent}'")]
    UnknownField { parent: String, field: String },

    #[error("Unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid order-by: {0}")]
    InvalidOrderBy(String),

    #[error("Pagination cursor is invalid: {0}")]
    InvalidCursor(String),

    #[error("'first' must be between 1 and {cap}, got {given}")]
    FirstOutOfRange { given: i64, cap: u64 },

    #[error("Query depth {depth} exceeds the configured limit of {limit}")]
    DepthLimitExceeded { depth: u32, limit: i32 },

    #[error("Introspection is not allowed on this endpoint")]
    IntrospectionDisabled,

    #[error("Multiple mutations in one request are not enabled")]
    MultipleMutationsDisabled,

    #[error("Variable '{0}' was not provided")]
    VariableMissing(String),

    #[error("Request body is not valid: {0}")]
    InvalidBody(String),

    #[error("Operation is not supported: {0}")]
    Unsupported(String),
}

/// Query execution errors
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Too many concurrent requests for this data source")]
    Busy,

    #[error("The database did not respond within the request deadline")]
    Timeout,

    #[error("The request was cancelled by the client")]
    Cancelled,

    #[error("No row matches the given key")]
    NotFound,

    #[error("A row with the same key already exists: {0}")]
    UniqueViolation(String),

    #[error("The database reported an error: {0}")]
    Database(String),

    #[error("Driver failure: {0}")]
    Driver(String),
}

/// Top-level error type for the gateway engine
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Execution error: {0}")]
    Execute(#[from] ExecuteError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Map the failure onto the wire taxonomy.
    pub fn sub_code(&self) -> SubCode {
        match self {
            GatewayError::Config(_) => SubCode::ErrorInInitialization,
            GatewayError::Metadata(err) => match err {
                MetadataError::UnknownEntity(_) => SubCode::EntityNotFound,
                MetadataError::RelationshipAmbiguous { .. }
                | MetadataError::RelationshipUnresolvable { .. } => SubCode::BadRequest,
                _ => SubCode::ErrorInInitialization,
            },
            GatewayError::Schema(_) => SubCode::ErrorInInitialization,
            GatewayError::Auth(err) => match err {
                AuthError::PolicySyntax(_) => SubCode::UnexpectedError,
                _ => SubCode::AuthorizationFailed,
            },
            GatewayError::Plan(err) => match err {
                PlanError::IntrospectionDisabled => SubCode::AuthorizationFailed,
                _ => SubCode::BadRequest,
            },
            GatewayError::Execute(err) => match err {
                ExecuteError::Busy => SubCode::ServiceBusy,
                ExecuteError::NotFound => SubCode::EntityNotFound,
                ExecuteError::UniqueViolation(_) => SubCode::ItemAlreadyExists,
                ExecuteError::Timeout | ExecuteError::Database(_) => {
                    SubCode::DatabaseOperationFailed
                }
                ExecuteError::Cancelled | ExecuteError::Driver(_) => SubCode::UnexpectedError,
            },
            GatewayError::Authentication(_) => SubCode::AuthenticationFailed,
            GatewayError::Internal(_) => SubCode::UnexpectedError,
        }
    }

    /// HTTP status for the failure.
    pub fn status(&self) -> u16 {
        self.sub_code().http_status()
    }

    /// Message safe to return to a client. Driver and database text is
    /// replaced by generic wording outside development mode.
    pub fn client_message(&self, development: bool) -> String {
        if development {
            return self.to_string();
        }
        match self {
            GatewayError::Execute(ExecuteError::Database(_))
            | GatewayError::Execute(ExecuteError::Driver(_)) => {
                "An unexpected database error occurred.".to_string()
            }
            GatewayError::Internal(_) => "An unexpected error occurred.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_code_status_mapping() {
        assert_eq!(SubCode::BadRequest.http_status(), 400);
        assert_eq!(SubCode::AuthenticationFailed.http_status(), 401);
        assert_eq!(SubCode::AuthorizationFailed.http_status(), 403);
        assert_eq!(SubCode::EntityNotFound.http_status(), 404);
        assert_eq!(SubCode::ItemAlreadyExists.http_status(), 409);
        assert_eq!(SubCode::UnexpectedError.http_status(), 500);
        assert_eq!(SubCode::DatabaseOperationFailed.http_status(), 500);
        assert_eq!(SubCode::ServiceBusy.http_status(), 503);
        assert_eq!(SubCode::ErrorInInitialization.http_status(), 503);
    }

    #[test]
    fn test_gateway_error_from_auth_error() {
        let err: GatewayError = AuthError::FieldNotPermitted("ssn".to_string()).into();
        assert_eq!(err.sub_code(), SubCode::AuthorizationFailed);
        assert_eq!(err.status(), 403);
        assert!(err.to_string().contains("ssn"));
    }

    #[test]
    fn test_gateway_error_from_plan_error() {
        let err: GatewayError = PlanError::FirstOutOfRange {
            given: 5000,
            cap: 1000,
        }
        .into();
        assert_eq!(err.sub_code(), SubCode::BadRequest);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_introspection_denial_is_forbidden() {
        let err: GatewayError = PlanError::IntrospectionDisabled.into();
        assert_eq!(err.sub_code(), SubCode::AuthorizationFailed);
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err: GatewayError = ExecuteError::UniqueViolation("pk_books".to_string()).into();
        assert_eq!(err.sub_code(), SubCode::ItemAlreadyExists);
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn test_driver_text_redacted_in_production() {
        let err: GatewayError =
            ExecuteError::Database("duplicate key value violates \"users_pk\"".to_string()).into();
        let prod = err.client_message(false);
        assert!(!prod.contains("users_pk"));
        let dev = err.client_message(true);
        assert!(dev.contains("users_pk"));
    }

    #[test]
    fn test_validation_failure_display() {
        let failure = ValidationFailure::new("entities.Book.source", "object name is empty");
        assert_eq!(
            failure.to_string(),
            "entities.Book.source: object name is empty"
        );
    }
}
