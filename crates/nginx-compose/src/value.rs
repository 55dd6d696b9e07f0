//! value representation
//!
//! Evaluated attribute values of declaration blocks:
//! - boolean (true/false)
//! - integer (i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! There is no `null`: an attribute that evaluates to `null` is rejected.
/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(indexmap::IndexMap<String, Value>),
}

impl Value {
    /// Name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Scalars as directive text, `None` for everything else
    ///
    /// Numbers are accepted so that `code = 404` works as well as `code = "404"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(value) => Some(value.clone()),
            Value::Integer(value) => Some(value.to_string()),
            Value::Decimal(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UnsupportedValue {
    #[error("null is not a valid value")]
    Null,
    #[error("number {0} is out of range")]
    Number(String),
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl TryFrom<hcl::Number> for Value {
    type Error = UnsupportedValue;

    fn try_from(value: hcl::Number) -> Result<Self, Self::Error> {
        if let Some(int) = value.as_i64() {
            return Ok(Value::Integer(int));
        }

        if value.is_f64() {
            if let Some(float) = value.as_f64() {
                return Ok(Value::Decimal(float));
            }
        }

        Err(UnsupportedValue::Number(value.to_string()))
    }
}

impl TryFrom<hcl::Value> for Value {
    type Error = UnsupportedValue;

    fn try_from(value: hcl::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.try_into()?,
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(a) => Value::Array(
                a.into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            hcl::Value::Object(o) => Value::Object(
                o.into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<_, UnsupportedValue>>()?,
            ),
            hcl::Value::Null => return Err(UnsupportedValue::Null),
        })
    }
}
