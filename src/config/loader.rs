use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::auth::policy::{parse_predicate, PredicateContext};
use crate::config::model::{ActionKind, DatabaseKind, RuntimeConfig};
use crate::utils::error::{ConfigError, GatewayResult, ValidationFailure};

/// Environment variable selecting the config overlay environment.
pub const ENV_ENVIRONMENT: &str = "DAB_ENVIRONMENT";

/// Host-framework fallback for the overlay environment.
pub const ENV_ENVIRONMENT_FALLBACK: &str = "ASPNETCORE_ENVIRONMENT";

/// Environment variable overriding the data source connection string.
pub const ENV_CONNSTRING: &str = "DAB_CONNSTRING";

/// Loads, overlays, resolves and validates runtime configuration files.
pub struct ConfigLoader {
    max_attempts: u32,
    retry_base: Duration,
}

impl ConfigLoader {
    /// Create a loader with the default retry policy (5 attempts, base-2
    /// exponential back-off).
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            retry_base: Duration::from_millis(100),
        }
    }

    /// Create a loader with a custom retry budget.
    pub fn with_retry(max_attempts: u32, retry_base: Duration) -> Self {
        Self {
            max_attempts,
            retry_base,
        }
    }

    /// Load the file at `path`, apply environment overlays, resolve
    /// `@env('NAME')` tokens and validate the result.
    pub async fn load(&self, path: &Path) -> GatewayResult<RuntimeConfig> {
        let base_text = self.read_with_retry(path).await?;
        let mut tree: JsonValue =
            serde_json::from_str(&base_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let environment = std::env::var(ENV_ENVIRONMENT)
            .or_else(|_| std::env::var(ENV_ENVIRONMENT_FALLBACK));
        if let Ok(environment) = environment {
            if !environment.is_empty() {
                for overlay_path in overlay_paths(path, &environment) {
                    if overlay_path.exists() {
                        debug!(path = %overlay_path.display(), "applying config overlay");
                        let overlay_text = self.read_with_retry(&overlay_path).await?;
                        let overlay: JsonValue = serde_json::from_str(&overlay_text)
                            .map_err(|e| ConfigError::Parse(e.to_string()))?;
                        deep_merge(&mut tree, overlay);
                    }
                }
            }
        }

        resolve_env_tokens(&mut tree)?;
        apply_connstring_override(&mut tree);

        let config: RuntimeConfig =
            serde_json::from_value(tree).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let failures = validate(&config);
        if !failures.is_empty() {
            return Err(ConfigError::Validation(failures).into());
        }
        Ok(config)
    }

    async fn read_with_retry(&self, path: &Path) -> Result<String, ConfigError> {
        let mut last_error = String::new();
        for attempt in 0..self.max_attempts {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    last_error = err.to_string();
                    let backoff = self.retry_base * 2u32.pow(attempt);
                    warn!(
                        path = %path.display(),
                        attempt = attempt + 1,
                        "config read failed, retrying in {:?}: {}",
                        backoff,
                        last_error
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Err(ConfigError::Io {
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay file paths for `<base>.<env>.json` and `<base>.<env>.overrides.json`.
fn overlay_paths(base: &Path, environment: &str) -> Vec<PathBuf> {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let dir = base.parent().unwrap_or_else(|| Path::new("."));
    vec![
        dir.join(format!("{stem}.{environment}.json")),
        dir.join(format!("{stem}.{environment}.overrides.json")),
    ]
}

/// Deep-merge `overlay` into `base`: objects merge key-by-key, arrays and
/// scalars are replaced wholesale.
pub fn deep_merge(base: &mut JsonValue, overlay: JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.entry(key) {
                    serde_json::map::Entry::Occupied(mut existing) => {
                        deep_merge(existing.get_mut(), value)
                    }
                    serde_json::map::Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Replace `@env('NAME')` tokens in every string of the tree. A token whose
/// variable is unset is a fatal error.
pub fn resolve_env_tokens(tree: &mut JsonValue) -> Result<(), ConfigError> {
    let pattern = Regex::new(r"@env\('([^']+)'\)").expect("env token pattern is valid");
    resolve_env_in(tree, &pattern)
}

fn resolve_env_in(value: &mut JsonValue, pattern: &Regex) -> Result<(), ConfigError> {
    match value {
        JsonValue::String(text) => {
            if !text.contains("@env(") {
                return Ok(());
            }
            let mut resolved = String::new();
            let mut cursor = 0;
            for capture in pattern.captures_iter(text) {
                let whole = capture.get(0).expect("capture 0 always present");
                let name = &capture[1];
                let var = std::env::var(name)
                    .map_err(|_| ConfigError::UnresolvedEnvVar(name.to_string()))?;
                resolved.push_str(&text[cursor..whole.start()]);
                resolved.push_str(&var);
                cursor = whole.end();
            }
            resolved.push_str(&text[cursor..]);
            *text = resolved;
            Ok(())
        }
        JsonValue::Array(items) => {
            for item in items {
                resolve_env_in(item, pattern)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => {
            for (_, item) in map.iter_mut() {
                resolve_env_in(item, pattern)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `DAB_CONNSTRING` overrides the data source connection string when set.
fn apply_connstring_override(tree: &mut JsonValue) {
    if let Ok(connstring) = std::env::var(ENV_CONNSTRING) {
        if connstring.is_empty() {
            return;
        }
        if let Some(data_source) = tree.get_mut("data-source") {
            if let Some(slot) = data_source.get_mut("connection-string") {
                *slot = JsonValue::String(connstring);
            }
        }
    }
}

/// Cross-reference validation over a parsed config. Returns every failure
/// found rather than stopping at the first.
pub fn validate(config: &RuntimeConfig) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if config.entities.is_empty() {
        failures.push(ValidationFailure::new(
            "entities",
            "at least one entity must be configured",
        ));
    }

    if config.data_source.database_type.is_document()
        && config.data_source.options.schema.is_none()
    {
        failures.push(ValidationFailure::new(
            "data-source.options.schema",
            "document data sources require a GraphQL schema file",
        ));
    }

    if let Some(limit) = config.runtime.graphql.depth_limit {
        if limit != -1 && limit < 1 {
            failures.push(ValidationFailure::new(
                "runtime.graphql.depth-limit",
                format!("must be -1 or a positive integer, got {limit}"),
            ));
        }
    }

    let mut graphql_names: BTreeSet<String> = BTreeSet::new();
    for (name, entity) in &config.entities {
        let path = format!("entities.{name}");

        if entity.source_object().is_empty() {
            failures.push(ValidationFailure::new(
                format!("{path}.source"),
                "object name is empty",
            ));
        }

        if entity.graphql_enabled() {
            for graphql_name in [entity.graphql_singular(name), entity.graphql_plural(name)] {
                if !graphql_names.insert(graphql_name.clone()) {
                    failures.push(ValidationFailure::new(
                        format!("{path}.graphql"),
                        format!("GraphQL name '{graphql_name}' is already in use"),
                    ));
                }
            }
        }

        if entity.permissions.is_empty() {
            failures.push(ValidationFailure::new(
                format!("{path}.permissions"),
                "at least one permission block is required",
            ));
        }

        for (index, permission) in entity.permissions.iter().enumerate() {
            let permission_path = format!("{path}.permissions[{index}]");
            if permission.role.is_empty() {
                failures.push(ValidationFailure::new(
                    format!("{permission_path}.role"),
                    "role must not be empty",
                ));
            }
            for action in &permission.actions {
                if entity.is_stored_procedure()
                    && !matches!(action.kind(), ActionKind::Execute | ActionKind::All)
                {
                    failures.push(ValidationFailure::new(
                        format!("{permission_path}.actions"),
                        format!(
                            "stored procedures expose only 'execute', found '{}'",
                            action.kind().as_str()
                        ),
                    ));
                }
                if !entity.is_stored_procedure() && action.kind() == ActionKind::Execute {
                    failures.push(ValidationFailure::new(
                        format!("{permission_path}.actions"),
                        "'execute' applies only to stored procedures",
                    ));
                }
                if let Some(policy) = action.policy() {
                    if let Err(err) =
                        parse_predicate(&policy.database, PredicateContext::DatabasePolicy)
                    {
                        failures.push(ValidationFailure::new(
                            format!("{permission_path}.policy.database"),
                            err.to_string(),
                        ));
                    }
                }
            }
        }

        for (relationship_name, relationship) in &entity.relationships {
            let relationship_path = format!("{path}.relationships.{relationship_name}");
            if !config.entities.contains_key(&relationship.target_entity) {
                failures.push(ValidationFailure::new(
                    format!("{relationship_path}.target.entity"),
                    format!("entity '{}' does not exist", relationship.target_entity),
                ));
            }
            if relationship.source_fields.len() != relationship.target_fields.len() {
                failures.push(ValidationFailure::new(
                    relationship_path.clone(),
                    "source.fields and target.fields must have the same length",
                ));
            }
            if let Some(linking_object) = &relationship.linking_object {
                if linking_object.is_empty() {
                    failures.push(ValidationFailure::new(
                        format!("{relationship_path}.linking.object"),
                        "linking object name is empty",
                    ));
                }
                if relationship.linking_source_fields.len()
                    != relationship.linking_target_fields.len()
                    && config.data_source.database_type != DatabaseKind::CosmosSql
                {
                    failures.push(ValidationFailure::new(
                        relationship_path.clone(),
                        "linking.source.fields and linking.target.fields must have the same length",
                    ));
                }
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, value: &JsonValue) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string_pretty(value).unwrap().as_bytes())
            .unwrap();
        path
    }

    fn base_config() -> JsonValue {
        json!({
            "data-source": {
                "database-type": "postgresql",
                "connection-string": "postgresql://localhost/app"
            },
            "entities": {
                "Book": {
                    "source": "books",
                    "permissions": [{ "role": "anonymous", "actions": ["read"] }]
                }
            }
        })
    }

    #[tokio::test]
    async fn test_load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.json", &base_config());

        let loader = ConfigLoader::new();
        let config = loader.load(&path).await.unwrap();
        assert!(config.entities.contains_key("Book"));
    }

    #[tokio::test]
    async fn test_load_missing_file_exhausts_retries() {
        let loader = ConfigLoader::with_retry(2, Duration::from_millis(1));
        let result = loader.load(Path::new("/nonexistent/config.json")).await;
        match result.unwrap_err() {
            crate::utils::error::GatewayError::Config(ConfigError::Io { attempts, .. }) => {
                assert_eq!(attempts, 2);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_merge_replaces_arrays_and_merges_objects() {
        let mut base = json!({
            "a": { "x": 1, "y": 2 },
            "list": [1, 2, 3],
            "keep": "base"
        });
        deep_merge(
            &mut base,
            json!({
                "a": { "y": 20, "z": 30 },
                "list": [9]
            }),
        );
        assert_eq!(base["a"]["x"], 1);
        assert_eq!(base["a"]["y"], 20);
        assert_eq!(base["a"]["z"], 30);
        assert_eq!(base["list"], json!([9]));
        assert_eq!(base["keep"], "base");
    }

    #[test]
    fn test_env_token_resolution() {
        std::env::set_var("STRATA_TEST_DB_PASSWORD", "s3cret");
        let mut tree = json!({
            "connection-string": "Host=localhost;Password=@env('STRATA_TEST_DB_PASSWORD');"
        });
        resolve_env_tokens(&mut tree).unwrap();
        assert_eq!(
            tree["connection-string"],
            "Host=localhost;Password=s3cret;"
        );
    }

    #[test]
    fn test_unresolved_env_token_is_fatal() {
        let mut tree = json!({ "value": "@env('STRATA_TEST_DOES_NOT_EXIST')" });
        let err = resolve_env_tokens(&mut tree).unwrap_err();
        match err {
            ConfigError::UnresolvedEnvVar(name) => {
                assert_eq!(name, "STRATA_TEST_DOES_NOT_EXIST")
            }
            other => panic!("expected UnresolvedEnvVar, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_environment_overlay_applies_on_top_of_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "overlaid.json", &base_config());
        write_config(
            &dir,
            "overlaid.staging.json",
            &json!({
                "runtime": { "host": { "mode": "production" } }
            }),
        );

        std::env::set_var(ENV_ENVIRONMENT, "staging");
        let loader = ConfigLoader::new();
        let config = loader.load(&path).await.unwrap();
        std::env::remove_var(ENV_ENVIRONMENT);

        assert!(!config.is_development());
    }

    #[test]
    fn test_validate_unknown_relationship_target() {
        let mut json = base_config();
        json["entities"]["Book"]["relationships"] = serde_json::json!({
            "publisher": {
                "cardinality": "one",
                "target.entity": "Publisher"
            }
        });
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        let failures = validate(&config);
        assert!(failures
            .iter()
            .any(|f| f.message.contains("'Publisher' does not exist")));
    }

    #[test]
    fn test_validate_stored_procedure_actions() {
        let mut json = base_config();
        json["entities"]["GetBooks"] = serde_json::json!({
            "source": { "object": "dbo.get_books", "type": "stored-procedure" },
            "permissions": [{ "role": "anonymous", "actions": ["read"] }]
        });
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        let failures = validate(&config);
        assert!(failures
            .iter()
            .any(|f| f.message.contains("stored procedures expose only 'execute'")));
    }

    #[test]
    fn test_validate_duplicate_graphql_names() {
        let mut json = base_config();
        json["entities"]["BookView"] = serde_json::json!({
            "source": "books_view",
            "graphql": { "singular": "Book", "plural": "Books" },
            "permissions": [{ "role": "anonymous", "actions": ["read"] }]
        });
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        let failures = validate(&config);
        assert!(failures.iter().any(|f| f.message.contains("already in use")));
    }

    #[test]
    fn test_validate_depth_limit_range() {
        let mut json = base_config();
        json["runtime"] = serde_json::json!({ "graphql": { "depth-limit": 0 } });
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        let failures = validate(&config);
        assert!(failures
            .iter()
            .any(|f| f.path == "runtime.graphql.depth-limit"));
    }

    #[test]
    fn test_validate_bad_policy_expression() {
        let mut json = base_config();
        json["entities"]["Book"]["permissions"] = serde_json::json!([
            {
                "role": "author",
                "actions": [
                    { "action": "read", "policy": { "database": "@item.author_id eq eq" } }
                ]
            }
        ]);
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        let failures = validate(&config);
        assert!(failures.iter().any(|f| f.path.contains("policy.database")));
    }
}
