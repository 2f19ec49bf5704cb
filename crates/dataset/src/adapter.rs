//! Adapters provide named relations to a dataset. The core only ever sees
//! the trait: a name, a schema, and a row stream for an evaluation context.

use common::{EngineError, EngineResult, EvalContext, Row, Rows};
use schema::{Field, FieldMode, Schema};
use std::path::Path;
use std::rc::Rc;
use types::{Date, Value};

pub trait Adapter {
    fn name(&self) -> &str;

    /// Name and schema of some of the relations this adapter serves.
    /// Name-based adapters may return an empty list.
    fn relations(&self) -> Vec<(String, Schema)> {
        Vec::new()
    }

    fn has(&self, relation: &str) -> bool;

    fn schema(&self, relation: &str) -> EngineResult<Schema>;

    fn scan(&self, relation: &str, ctx: &Rc<EvalContext>) -> EngineResult<Rows>;
}

/// An in-memory table: a named schema plus materialized rows.
///
/// Rows narrower than the schema are padded: repeated-mode fields default
/// to an empty list, everything else to null.
#[derive(Clone, Debug)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, fields: Vec<Field>, rows: Vec<Vec<Value>>) -> Self {
        let name = name.into();
        let schema = Schema::named(name.clone(), fields);
        let rows = rows
            .into_iter()
            .map(|values| pad_row(values, &schema))
            .collect();
        Self { name, schema, rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Load rows from a JSON array of objects, converting each property by
    /// the declared field type.
    pub fn from_json_file(
        name: impl Into<String>,
        fields: Vec<Field>,
        path: &Path,
    ) -> EngineResult<Self> {
        let name = name.into();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Execution(format!("cannot read {}: {e}", path.display()))
        })?;
        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            EngineError::Execution(format!("invalid JSON in {}: {e}", path.display()))
        })?;
        let objects = parsed.as_array().ok_or_else(|| {
            EngineError::Execution(format!("{} must hold a JSON array", path.display()))
        })?;

        let mut rows = Vec::with_capacity(objects.len());
        for object in objects {
            let object = object.as_object().ok_or_else(|| {
                EngineError::Execution("every JSON row must be an object".into())
            })?;
            let values = fields
                .iter()
                .map(|field| match object.get(&field.name) {
                    None => Ok(default_value(field)),
                    Some(raw) => json_to_value(raw, field),
                })
                .collect::<EngineResult<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(Table::new(name, fields, rows))
    }
}

fn default_value(field: &Field) -> Value {
    match field.mode {
        FieldMode::Repeated => Value::List(Vec::new()),
        _ => Value::Null,
    }
}

fn pad_row(mut values: Vec<Value>, schema: &Schema) -> Row {
    while values.len() < schema.len() {
        values.push(default_value(&schema.fields()[values.len()]));
    }
    Row::new(values)
}

fn json_to_value(raw: &serde_json::Value, field: &Field) -> EngineResult<Value> {
    use types::FieldType;

    if raw.is_null() {
        return Ok(default_value(field));
    }
    if field.mode == FieldMode::Repeated {
        let items = raw.as_array().ok_or_else(|| {
            EngineError::Execution(format!(
                "repeated field '{}' expects a JSON array",
                field.name
            ))
        })?;
        let element = Field {
            mode: FieldMode::Nullable,
            ..field.clone()
        };
        return Ok(Value::List(
            items
                .iter()
                .map(|item| json_to_value(item, &element))
                .collect::<EngineResult<_>>()?,
        ));
    }
    let fail = || {
        EngineError::Execution(format!(
            "cannot convert {raw} to {} for field '{}'",
            field.ty, field.name
        ))
    };
    match field.ty {
        FieldType::Integer => raw.as_i64().map(Value::Int).ok_or_else(fail),
        FieldType::Float => raw.as_f64().map(Value::Float).ok_or_else(fail),
        FieldType::String => raw.as_str().map(Value::from).ok_or_else(fail),
        FieldType::Boolean => raw.as_bool().map(Value::Bool).ok_or_else(fail),
        FieldType::Date => {
            let text = raw.as_str().ok_or_else(fail)?;
            parse_date(text).map(Value::Date).ok_or_else(fail)
        }
        _ => Err(fail()),
    }
}

fn parse_date(s: &str) -> Option<Date> {
    let mut parts = s.split('-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    parts.next().is_none().then(|| Date::new(year, month, day))
}

/// Adapter over a set of in-memory tables.
pub struct MemoryAdapter {
    name: String,
    tables: Vec<Table>,
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.retain(|t| t.name != table.name);
        self.tables.push(table);
    }

    fn table(&self, relation: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == relation)
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn relations(&self) -> Vec<(String, Schema)> {
        self.tables
            .iter()
            .map(|t| (t.name.clone(), t.schema.clone()))
            .collect()
    }

    fn has(&self, relation: &str) -> bool {
        self.table(relation).is_some()
    }

    fn schema(&self, relation: &str) -> EngineResult<Schema> {
        self.table(relation)
            .map(|t| t.schema.clone())
            .ok_or_else(|| EngineError::RelationNotFound(relation.to_string()))
    }

    fn scan(&self, relation: &str, _ctx: &Rc<EvalContext>) -> EngineResult<Rows> {
        let table = self
            .table(relation)
            .ok_or_else(|| EngineError::RelationNotFound(relation.to_string()))?;
        Ok(executor::rows_from_vec(table.rows.clone()))
    }
}
