//! Output tuples and stream punctuation.

use crate::error::{Error, Result};
use crate::schema::{AttributeType, StreamSchema};
use serde::Serialize;
use std::sync::Arc;

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    String(String),
    Blob(Vec<u8>),
}

impl Value {
    /// The value a fresh tuple holds for an attribute of type `ty`.
    #[must_use]
    pub fn default_for(ty: AttributeType) -> Self {
        match ty {
            AttributeType::Boolean => Self::Boolean(false),
            AttributeType::Int32 => Self::Int32(0),
            AttributeType::Int64 => Self::Int64(0),
            AttributeType::UInt64 => Self::UInt64(0),
            AttributeType::Float64 => Self::Float64(0.0),
            AttributeType::RString | AttributeType::UString => Self::String(String::new()),
            AttributeType::Blob => Self::Blob(Vec::new()),
        }
    }

    fn matches(&self, ty: AttributeType) -> bool {
        matches!(
            (self, ty),
            (Self::Boolean(_), AttributeType::Boolean)
                | (Self::Int32(_), AttributeType::Int32)
                | (Self::Int64(_), AttributeType::Int64)
                | (Self::UInt64(_), AttributeType::UInt64)
                | (Self::Float64(_), AttributeType::Float64)
                | (Self::String(_), AttributeType::RString | AttributeType::UString)
                | (Self::Blob(_), AttributeType::Blob)
        )
    }
}

/// One output event: a value per schema attribute, in schema order.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    schema: Arc<StreamSchema>,
    values: Vec<Value>,
}

impl Tuple {
    /// A tuple holding the default value of every attribute.
    #[must_use]
    pub fn new(schema: Arc<StreamSchema>) -> Self {
        let values = schema
            .attributes()
            .iter()
            .map(|a| Value::default_for(a.ty))
            .collect();
        Self { schema, values }
    }

    #[must_use]
    pub fn schema(&self) -> &StreamSchema {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Set attribute `index`.
    ///
    /// # Errors
    /// [`Error::TypeContract`] if the index is out of range or the value's type
    /// does not match the attribute.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let Some(attr) = self.schema.attributes().get(index) else {
            return Err(Error::TypeContract(format!(
                "attribute index {index} out of range for {}",
                self.schema
            )));
        };
        if !value.matches(attr.ty) {
            return Err(Error::TypeContract(format!(
                "cannot store {value:?} in {} {}",
                attr.ty, attr.name
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get_by_name(name)? {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get_by_name(name)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// `{"attribute": value, ...}` keyed by attribute name.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .schema
            .attributes()
            .iter()
            .zip(&self.values)
            .map(|(a, v)| (a.name.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Stream punctuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Punctuation {
    /// All records of one split have been emitted.
    WindowMarker,
    /// This channel will emit nothing more.
    FinalMarker,
}

/// Anything that travels on an output stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    Tuple(Tuple),
    Punctuation(Punctuation),
}

impl StreamItem {
    #[must_use]
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(t) => Some(t),
            Self::Punctuation(_) => None,
        }
    }

    #[must_use]
    pub fn is_punctuation(&self, p: Punctuation) -> bool {
        matches!(self, Self::Punctuation(q) if *q == p)
    }
}
