use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::model::{
    ActionKind, Cardinality, GraphQlOperationKind, EntityGraphQl, RelationshipConfig,
    RuntimeConfig,
};
use crate::metadata::provider::MetadataProvider;
use crate::metadata::shape::TableShape;
use crate::utils::error::{GatewayResult, SchemaError};

/// Scalars the gateway declares beyond the GraphQL built-ins.
const CUSTOM_SCALARS: [&str; 4] = ["ByteArray", "DateTime", "JSON", "Long"];

/// What a root field resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFieldKind {
    /// `<singular>(<pk-args>)` fetch-by-key.
    PkQuery,
    /// `<plural>(first, after, filter, orderBy)` connection.
    ListQuery,
    /// `<plural>GroupBy(by, aggregations, filter)`.
    GroupBy,
    Create,
    Update,
    Delete,
    /// Stored procedure invocation.
    Execute,
}

/// A synthesized root field on `Query` or `Mutation`.
#[derive(Debug, Clone)]
pub struct RootField {
    pub entity: String,
    pub kind: RootFieldKind,
}

/// Synthesized names and discovered shape of one GraphQL-enabled entity.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity: String,
    /// Object type name (`Book`).
    pub type_name: String,
    /// Root query field for a fetch-by-key (`book`).
    pub singular_field: String,
    /// Root query field for a connection (`books`).
    pub plural_field: String,
    pub shape: Arc<TableShape>,
    pub relationships: BTreeMap<String, RelationshipConfig>,
    pub is_stored_procedure: bool,
}

impl EntitySchema {
    pub fn connection_type(&self) -> String {
        format!("{}Connection", self.type_name)
    }

    pub fn filter_input(&self) -> String {
        format!("{}FilterInput", self.type_name)
    }

    pub fn order_by_input(&self) -> String {
        format!("{}OrderByInput", self.type_name)
    }

    pub fn group_by_field_enum(&self) -> String {
        format!("{}GroupByField", self.type_name)
    }

    pub fn create_input(&self) -> String {
        format!("Create{}Input", self.type_name)
    }

    pub fn update_input(&self) -> String {
        format!("Update{}Input", self.type_name)
    }

    /// A relationship field declared on this type, if any.
    pub fn relationship(&self, field: &str) -> Option<&RelationshipConfig> {
        self.relationships.get(field)
    }
}

/// The synthesized GraphQL surface: per-entity types plus the root fields of
/// `Query` and `Mutation`. Built once per config snapshot.
#[derive(Debug, Clone)]
pub struct GatewaySchema {
    pub entities: BTreeMap<String, EntitySchema>,
    pub query_fields: BTreeMap<String, RootField>,
    pub mutation_fields: BTreeMap<String, RootField>,
}

impl GatewaySchema {
    /// Synthesize the schema from the entity catalog and discovered shapes.
    pub async fn build(
        config: &RuntimeConfig,
        metadata: &dyn MetadataProvider,
    ) -> GatewayResult<GatewaySchema> {
        let mut entities = BTreeMap::new();
        let mut query_fields: BTreeMap<String, RootField> = BTreeMap::new();
        let mut mutation_fields: BTreeMap<String, RootField> = BTreeMap::new();

        for (name, entity) in &config.entities {
            if !entity.graphql_enabled() {
                continue;
            }
            let shape = metadata.describe(name).await?;

            let singular = entity.graphql_singular(name);
            let plural = entity.graphql_plural(name);
            let type_name = upper_first(&singular);

            // Relationship fields share the namespace with columns.
            for relationship_name in entity.relationships.keys() {
                if shape.has_column(relationship_name) {
                    return Err(SchemaError::DuplicateField {
                        type_name: type_name.clone(),
                        field: relationship_name.clone(),
                    }
                    .into());
                }
            }

            let entity_schema = EntitySchema {
                entity: name.clone(),
                type_name: type_name.clone(),
                singular_field: lower_first(&singular),
                plural_field: lower_first(&plural),
                shape: shape.clone(),
                relationships: entity.relationships.clone(),
                is_stored_procedure: entity.is_stored_procedure(),
            };

            let mut register =
                |target: &mut BTreeMap<String, RootField>, field: String, kind: RootFieldKind| {
                    if target
                        .insert(
                            field.clone(),
                            RootField {
                                entity: name.clone(),
                                kind,
                            },
                        )
                        .is_some()
                    {
                        return Err(SchemaError::DuplicateGraphQlName(field));
                    }
                    Ok(())
                };

            if entity.is_stored_procedure() {
                let field = format!("execute{type_name}");
                let operation = match &entity.graphql {
                    Some(EntityGraphQl::Options(options)) => options
                        .operation
                        .unwrap_or(GraphQlOperationKind::Mutation),
                    _ => GraphQlOperationKind::Mutation,
                };
                match operation {
                    GraphQlOperationKind::Query => {
                        register(&mut query_fields, field, RootFieldKind::Execute)?
                    }
                    GraphQlOperationKind::Mutation => {
                        register(&mut mutation_fields, field, RootFieldKind::Execute)?
                    }
                }
            } else {
                if !shape.primary_key.is_empty() {
                    register(
                        &mut query_fields,
                        entity_schema.singular_field.clone(),
                        RootFieldKind::PkQuery,
                    )?;
                }
                register(
                    &mut query_fields,
                    entity_schema.plural_field.clone(),
                    RootFieldKind::ListQuery,
                )?;
                register(
                    &mut query_fields,
                    format!("{}GroupBy", entity_schema.plural_field),
                    RootFieldKind::GroupBy,
                )?;

                if grants_action(entity, ActionKind::Create) {
                    register(
                        &mut mutation_fields,
                        format!("create{type_name}"),
                        RootFieldKind::Create,
                    )?;
                }
                if grants_action(entity, ActionKind::Update) && !shape.primary_key.is_empty() {
                    register(
                        &mut mutation_fields,
                        format!("update{type_name}"),
                        RootFieldKind::Update,
                    )?;
                }
                if grants_action(entity, ActionKind::Delete) && !shape.primary_key.is_empty() {
                    register(
                        &mut mutation_fields,
                        format!("delete{type_name}"),
                        RootFieldKind::Delete,
                    )?;
                }
            }

            entities.insert(name.clone(), entity_schema);
        }

        Ok(GatewaySchema {
            entities,
            query_fields,
            mutation_fields,
        })
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// Entity schema owning the given object type name.
    pub fn entity_by_type(&self, type_name: &str) -> Option<&EntitySchema> {
        self.entities.values().find(|e| e.type_name == type_name)
    }

    /// Render the schema as SDL. The output is deterministic: two engines
    /// loading byte-identical configs print byte-identical documents.
    pub fn sdl(&self) -> String {
        let mut out = String::new();

        for scalar in CUSTOM_SCALARS {
            let _ = writeln!(out, "scalar {scalar}");
        }
        out.push('\n');

        out.push_str("enum OrderBy {\n  ASC\n  DESC\n}\n\n");
        out.push_str(
            "enum AggregationFn {\n  avg\n  count\n  countDistinct\n  max\n  min\n  sum\n}\n\n",
        );
        out.push_str(
            "input AggregationInput {\n  fn: AggregationFn!\n  field: String!\n  alias: String\n}\n\n",
        );
        out.push_str("type GroupByResult {\n  fields: JSON!\n  aggregations: JSON!\n}\n\n");

        out.push_str(SHARED_FILTER_INPUTS);

        for entity_schema in self.entities.values() {
            if entity_schema.is_stored_procedure {
                self.write_procedure_types(&mut out, entity_schema);
            } else {
                self.write_entity_types(&mut out, entity_schema);
            }
        }

        if !self.query_fields.is_empty() {
            out.push_str("type Query {\n");
            for (field, root) in &self.query_fields {
                self.write_root_field(&mut out, field, root);
            }
            out.push_str("}\n\n");
        }

        if !self.mutation_fields.is_empty() {
            out.push_str("type Mutation {\n");
            for (field, root) in &self.mutation_fields {
                self.write_root_field(&mut out, field, root);
            }
            out.push_str("}\n\n");
        }

        out
    }

    fn write_entity_types(&self, out: &mut String, entity_schema: &EntitySchema) {
        let type_name = &entity_schema.type_name;
        let shape = &entity_schema.shape;

        // Object type: one field per column plus navigation fields.
        let _ = writeln!(out, "type {type_name} {{");
        for column in &shape.columns {
            let bang = if column.nullable { "" } else { "!" };
            let _ = writeln!(out, "  {}: {}{bang}", column.name, column.ty.graphql_type());
        }
        for (field, relationship) in &entity_schema.relationships {
            let Some(target) = self.entity(&relationship.target_entity) else {
                continue;
            };
            match relationship.cardinality {
                Cardinality::One => {
                    let _ = writeln!(out, "  {field}: {}", target.type_name);
                }
                Cardinality::Many => {
                    let _ = writeln!(
                        out,
                        "  {field}(first: Int, after: String, filter: {}, orderBy: {}): {}",
                        target.filter_input(),
                        target.order_by_input(),
                        target.connection_type()
                    );
                }
            }
        }
        out.push_str("}\n\n");

        // Connection wrapper for paginated lists.
        let _ = writeln!(
            out,
            "type {} {{\n  items: [{type_name}!]!\n  hasNextPage: Boolean!\n  endCursor: String\n}}\n",
            entity_schema.connection_type()
        );

        // Filter input: per-column scalar filters plus boolean connectives.
        let _ = writeln!(out, "input {} {{", entity_schema.filter_input());
        for column in &shape.columns {
            if let Some(filter) = column.ty.filter_input() {
                let _ = writeln!(out, "  {}: {filter}", column.name);
            }
        }
        let _ = writeln!(out, "  and: [{}]", entity_schema.filter_input());
        let _ = writeln!(out, "  or: [{}]", entity_schema.filter_input());
        let _ = writeln!(out, "  not: {}", entity_schema.filter_input());
        out.push_str("}\n\n");

        // OrderBy input.
        let _ = writeln!(out, "input {} {{", entity_schema.order_by_input());
        for column in &shape.columns {
            if column.ty.admits_ordering() {
                let _ = writeln!(out, "  {}: OrderBy", column.name);
            }
        }
        out.push_str("}\n\n");

        // Groupable columns.
        let _ = writeln!(out, "enum {} {{", entity_schema.group_by_field_enum());
        for column in &shape.columns {
            if column.ty.admits_ordering() {
                let _ = writeln!(out, "  {}", column.name);
            }
        }
        out.push_str("}\n\n");

        // Create input: autogenerated columns are omitted; columns without a
        // default stay mandatory.
        let _ = writeln!(out, "input {} {{", entity_schema.create_input());
        for column in &shape.columns {
            if column.autogenerated {
                continue;
            }
            let required = !column.nullable && column.default.is_none();
            let bang = if required { "!" } else { "" };
            let _ = writeln!(out, "  {}: {}{bang}", column.name, column.ty.graphql_type());
        }
        out.push_str("}\n\n");

        // Update input: every non-key column, all optional.
        let _ = writeln!(out, "input {} {{", entity_schema.update_input());
        for column in &shape.columns {
            if shape.primary_key.contains(&column.name) {
                continue;
            }
            let _ = writeln!(out, "  {}: {}", column.name, column.ty.graphql_type());
        }
        out.push_str("}\n\n");
    }

    fn write_procedure_types(&self, out: &mut String, entity_schema: &EntitySchema) {
        let type_name = &entity_schema.type_name;
        let _ = writeln!(out, "type {type_name} {{");
        for column in &entity_schema.shape.columns {
            let bang = if column.nullable { "" } else { "!" };
            let _ = writeln!(out, "  {}: {}{bang}", column.name, column.ty.graphql_type());
        }
        out.push_str("}\n\n");
    }

    fn write_root_field(&self, out: &mut String, field: &str, root: &RootField) {
        let Some(entity_schema) = self.entity(&root.entity) else {
            return;
        };
        let type_name = &entity_schema.type_name;
        let pk_args = entity_schema
            .shape
            .primary_key
            .iter()
            .filter_map(|pk| entity_schema.shape.column(pk))
            .map(|c| format!("{}: {}!", c.name, c.ty.graphql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        match root.kind {
            RootFieldKind::PkQuery => {
                let _ = writeln!(out, "  {field}({pk_args}): {type_name}");
            }
            RootFieldKind::ListQuery => {
                let _ = writeln!(
                    out,
                    "  {field}(first: Int, after: String, filter: {}, orderBy: {}): {}!",
                    entity_schema.filter_input(),
                    entity_schema.order_by_input(),
                    entity_schema.connection_type()
                );
            }
            RootFieldKind::GroupBy => {
                let _ = writeln!(
                    out,
                    "  {field}(by: [{}!]!, aggregations: [AggregationInput!], filter: {}): [GroupByResult!]!",
                    entity_schema.group_by_field_enum(),
                    entity_schema.filter_input()
                );
            }
            RootFieldKind::Create => {
                let _ = writeln!(
                    out,
                    "  {field}(item: {}!): {type_name}",
                    entity_schema.create_input()
                );
            }
            RootFieldKind::Update => {
                let _ = writeln!(
                    out,
                    "  {field}({pk_args}, item: {}!): {type_name}",
                    entity_schema.update_input()
                );
            }
            RootFieldKind::Delete => {
                let _ = writeln!(out, "  {field}({pk_args}): {type_name}");
            }
            RootFieldKind::Execute => {
                let params = entity_schema
                    .shape
                    .parameters
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty.graphql_type()))
                    .collect::<Vec<_>>()
                    .join(", ");
                if params.is_empty() {
                    let _ = writeln!(out, "  {field}: [{type_name}!]!");
                } else {
                    let _ = writeln!(out, "  {field}({params}): [{type_name}!]!");
                }
            }
        }
    }
}

/// Whether any configured role grants the action on the entity.
fn grants_action(entity: &crate::config::model::Entity, action: ActionKind) -> bool {
    entity
        .permissions
        .iter()
        .any(|permission| permission.action(action).is_some())
}

pub fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Scalar filter inputs shared across entities. Operator sets are restricted
/// to what each scalar admits.
const SHARED_FILTER_INPUTS: &str = "\
input IntFilterInput {
  eq: Long
  neq: Long
  gt: Long
  gte: Long
  lt: Long
  lte: Long
  in: [Long!]
  isNull: Boolean
}

input FloatFilterInput {
  eq: Float
  neq: Float
  gt: Float
  gte: Float
  lt: Float
  lte: Float
  in: [Float!]
  isNull: Boolean
}

input StringFilterInput {
  eq: String
  neq: String
  contains: String
  startsWith: String
  endsWith: String
  in: [String!]
  isNull: Boolean
}

input BooleanFilterInput {
  eq: Boolean
  neq: Boolean
  isNull: Boolean
}

input DateTimeFilterInput {
  eq: DateTime
  neq: DateTime
  gt: DateTime
  gte: DateTime
  lt: DateTime
  lte: DateTime
  isNull: Boolean
}

input IdFilterInput {
  eq: ID
  neq: ID
  in: [ID!]
  isNull: Boolean
}

";
