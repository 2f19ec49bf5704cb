use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Tag for a field type registered by a syntax pack.
///
/// The base `FieldType` enumeration is closed; extensions contribute new
/// types through the `Extension` escape hatch, and the syntax registry owns
/// the mapping from tag to type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ExtTypeId(pub u32);

/// Tag for a scalar or relational operator registered by a syntax pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ExtOpTag(pub u32);

/// Declared type of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Record,
    Null,
    Extension(ExtTypeId),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::String => write!(f, "STRING"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Date => write!(f, "DATE"),
            FieldType::DateTime => write!(f, "DATETIME"),
            FieldType::Time => write!(f, "TIME"),
            FieldType::Record => write!(f, "RECORD"),
            FieldType::Null => write!(f, "NULL"),
            FieldType::Extension(tag) => write!(f, "EXT#{}", tag.0),
        }
    }
}

/// Calendar date without a time component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Payload of an extension value (vector, point, circle, ...).
///
/// Payloads are opaque to the core; syntax packs downcast through `as_any`
/// in their registered executors.
pub trait ExtPayload: fmt::Debug + fmt::Display {
    fn as_any(&self) -> &dyn std::any::Any;
    fn eq_payload(&self, other: &dyn ExtPayload) -> bool;
    /// Logical size used to scale the cost factor of a literal (a vector of
    /// n elements costs n tiny units, a point two).
    fn cost_units(&self) -> usize {
        1
    }
}

/// An extension value: the registered type tag plus its payload.
#[derive(Clone)]
pub struct ExtValue {
    pub ty: ExtTypeId,
    pub payload: Arc<dyn ExtPayload>,
}

impl ExtValue {
    pub fn new(ty: ExtTypeId, payload: Arc<dyn ExtPayload>) -> Self {
        Self { ty, payload }
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for ExtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtValue({}, {:?})", self.ty.0, self.payload)
    }
}

impl PartialEq for ExtValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.payload.eq_payload(other.payload.as_ref())
    }
}

/// Runtime scalar value flowing through row pipelines.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Date(Date),
    /// Value of a REPEATED-mode field.
    List(Vec<Value>),
    Extension(ExtValue),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Null => FieldType::Null,
            Value::Int(_) => FieldType::Integer,
            Value::Float(_) => FieldType::Float,
            Value::Str(_) => FieldType::String,
            Value::Bool(_) => FieldType::Boolean,
            Value::Date(_) => FieldType::Date,
            Value::List(_) => FieldType::Record,
            Value::Extension(v) => FieldType::Extension(v.ty),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL-ish truthiness: null is false, numbers are non-zero, strings are
    /// non-empty.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::List(items) => !items.is_empty(),
            Value::Extension(_) => true,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Ordering between two values of compatible types. Integers and floats
    /// compare numerically across the two variants; anything else requires
    /// the same variant.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                Some(a.total_cmp(&b))
            }
        }
    }

    /// Equality used by `=`, `IN` and join keys: numeric across int/float,
    /// strict otherwise. Null never equals anything here (`IS` handles it).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.compare(other) == Some(Ordering::Equal) || self == other,
        }
    }

    pub fn add(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Some(Value::Str(format!("{a}{b}"))),
            _ => Some(Value::Float(self.as_f64()? + other.as_f64()?)),
        }
    }

    pub fn sub(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a - b)),
            _ => Some(Value::Float(self.as_f64()? - other.as_f64()?)),
        }
    }

    pub fn mul(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(Value::Int(a * b)),
            _ => Some(Value::Float(self.as_f64()? * other.as_f64()?)),
        }
    }

    /// Division is integral when both operands are integers, floating
    /// otherwise. Returns `None` on type mismatch or division by zero.
    pub fn div(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    None
                } else {
                    Some(Value::Int(a / b))
                }
            }
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                if b == 0.0 {
                    None
                } else {
                    Some(Value::Float(a / b))
                }
            }
        }
    }

    pub fn neg(&self) -> Option<Value> {
        match self {
            Value::Int(i) => Some(Value::Int(-i)),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Extension(v) => write!(f, "{}", v.payload),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
