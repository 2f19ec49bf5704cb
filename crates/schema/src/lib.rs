use common::{EngineError, EngineResult};
use types::FieldType;

/// Cardinality of a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldMode {
    Required,
    #[default]
    Nullable,
    Repeated,
}

/// A named, typed column of a relation.
///
/// `schema_name` qualifies the field with the relation (or alias) it came
/// from; `path()` is the dotted lookup key.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
pub struct Field {
    #[builder(into)]
    pub name: String,
    pub ty: FieldType,
    #[builder(default)]
    pub mode: FieldMode,
    /// Nested fields, only meaningful for `FieldType::Record`.
    #[builder(default)]
    pub fields: Vec<Field>,
    #[builder(into)]
    pub schema_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Field::builder().name(name).ty(ty).build()
    }

    pub fn path(&self) -> String {
        match &self.schema_name {
            Some(schema_name) => format!("{}.{}", schema_name, self.name),
            None => self.name.clone(),
        }
    }

    /// Copy of this field under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Copy of this field re-qualified with a different relation name.
    pub fn qualified(&self, schema_name: impl Into<String>) -> Field {
        Field {
            schema_name: Some(schema_name.into()),
            ..self.clone()
        }
    }

    pub fn with_type(&self, ty: FieldType) -> Field {
        Field { ty, ..self.clone() }
    }
}

/// Ordered field list with unique-path lookup.
///
/// Schemas are immutable; all transforms return a new schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    pub name: Option<String>,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { name: None, fields }
    }

    /// Schema for a named relation: fields without a qualifier are stamped
    /// with the relation name, so `relation.column` paths resolve.
    pub fn named(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let name = name.into();
        let fields = fields
            .into_iter()
            .map(|f| {
                if f.schema_name.is_none() {
                    f.qualified(name.clone())
                } else {
                    f
                }
            })
            .collect();
        Self {
            name: Some(name),
            fields,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn positions_of(&self, path: &str) -> Vec<usize> {
        let qualified = path.contains('.');
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                if qualified {
                    f.path() == path
                } else {
                    f.name == path
                }
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Zero-based position of the field at `path`.
    ///
    /// A bare name matches any qualifier; duplicated matches (typical after
    /// a join) are an ambiguous-field error.
    pub fn field_position(&self, path: &str) -> EngineResult<usize> {
        let matches = self.positions_of(path);
        match matches.len() {
            0 => Err(EngineError::FieldNotFound(path.to_string())),
            1 => Ok(matches[0]),
            _ => Err(EngineError::AmbiguousField(format!(
                "'{path}' matches multiple fields"
            ))),
        }
    }

    pub fn field(&self, path: &str) -> EngineResult<&Field> {
        self.field_position(path).map(|pos| &self.fields[pos])
    }

    pub fn has_field(&self, path: &str) -> bool {
        !self.positions_of(path).is_empty()
    }

    /// Concatenation, in order, of this schema's fields and `other`'s.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }

    /// Re-stamp every field with a new relation name (the ALIAS operator).
    pub fn aliased(&self, name: impl Into<String>) -> Schema {
        let name = name.into();
        Schema {
            name: Some(name.clone()),
            fields: self.fields.iter().map(|f| f.qualified(&name)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee_schema() -> Schema {
        Schema::named(
            "employees",
            vec![
                Field::new("employee_id", FieldType::Integer),
                Field::new("full_name", FieldType::String),
            ],
        )
    }

    #[test]
    fn named_schema_stamps_qualifiers() {
        let schema = employee_schema();
        assert_eq!(schema.fields()[0].path(), "employees.employee_id");
        assert_eq!(schema.field_position("employee_id").unwrap(), 0);
        assert_eq!(schema.field_position("employees.full_name").unwrap(), 1);
    }

    #[test]
    fn unknown_field_is_reported() {
        let schema = employee_schema();
        assert!(matches!(
            schema.field_position("salary"),
            Err(EngineError::FieldNotFound(_))
        ));
    }

    #[test]
    fn joined_schemas_detect_ambiguity() {
        let a = Schema::named("a", vec![Field::new("id", FieldType::Integer)]);
        let b = Schema::named("b", vec![Field::new("id", FieldType::Integer)]);
        let joined = a.concat(&b);
        assert!(matches!(
            joined.field_position("id"),
            Err(EngineError::AmbiguousField(_))
        ));
        assert_eq!(joined.field_position("a.id").unwrap(), 0);
        assert_eq!(joined.field_position("b.id").unwrap(), 1);
    }

    #[test]
    fn alias_restamps_every_field() {
        let schema = employee_schema().aliased("e");
        assert!(schema.has_field("e.employee_id"));
        assert!(!schema.has_field("employees.employee_id"));
        // bare names still resolve
        assert_eq!(schema.field_position("full_name").unwrap(), 1);
    }

    #[test]
    fn builder_defaults_are_nullable() {
        let f = Field::builder()
            .name("x")
            .ty(FieldType::Float)
            .build();
        assert_eq!(f.mode, FieldMode::Nullable);
        assert_eq!(f.path(), "x");
    }
}
