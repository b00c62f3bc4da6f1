//! Output stream schemas and the `key`/`value` attribute contract.
//!
//! The reader fills at most two attributes of each output tuple: `key`
//! (`int64`, the record key) and `value` (`rstring` or `ustring`, the record
//! text). Either may be omitted, but not both. Every other attribute keeps its
//! default.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Attribute name receiving the record key.
pub const KEY_ATTRIBUTE: &str = "key";
/// Attribute name receiving the record value.
pub const VALUE_ATTRIBUTE: &str = "value";

/// Attribute types available in output schemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Boolean,
    Int32,
    Int64,
    UInt64,
    Float64,
    RString,
    UString,
    Blob,
}

impl AttributeType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float64 => "float64",
            Self::RString => "rstring",
            Self::UString => "ustring",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "boolean" => Self::Boolean,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "float64" => Self::Float64,
            "rstring" => Self::RString,
            "ustring" => Self::UString,
            "blob" => Self::Blob,
            other => return Err(Error::config(format!("unknown attribute type {other:?}"))),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AttributeType,
}

/// Ordered attribute list of an output port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamSchema {
    attributes: Vec<Attribute>,
}

impl StreamSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            ty,
        });
        self
    }

    /// The canonical `tuple<int64 key, rstring value>` schema.
    #[must_use]
    pub fn key_value() -> Self {
        Self::new()
            .with(KEY_ATTRIBUTE, AttributeType::Int64)
            .with(VALUE_ATTRIBUTE, AttributeType::RString)
    }

    /// Parse `int64 key, rstring value`, optionally wrapped in `tuple<...>`.
    ///
    /// # Errors
    /// [`Error::Config`] for unknown types, malformed entries, or duplicate names.
    pub fn parse(s: &str) -> Result<Self> {
        let body = s.trim();
        let body = body
            .strip_prefix("tuple<")
            .and_then(|b| b.strip_suffix('>'))
            .unwrap_or(body);
        let mut schema = Self::new();
        for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split_whitespace();
            let (Some(ty), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(Error::config(format!(
                    "malformed attribute {entry:?}, expected \"<type> <name>\""
                )));
            };
            if schema.index_of(name).is_some() {
                return Err(Error::config(format!("duplicate attribute {name:?}")));
            }
            schema = schema.with(name, ty.parse()?);
        }
        Ok(schema)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }
}

impl fmt::Display for StreamSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tuple<")?;
        for (i, a) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", a.ty, a.name)?;
        }
        f.write_str(">")
    }
}

/// Positions of the `key` and `value` attributes in an output schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldSlots {
    pub key: Option<usize>,
    pub value: Option<usize>,
}

impl FieldSlots {
    /// Locate and type-check `key` and `value`.
    ///
    /// # Errors
    /// [`Error::Config`] if neither attribute exists; [`Error::TypeContract`]
    /// if `key` is not `int64` or `value` is not a string type.
    pub fn resolve(schema: &StreamSchema) -> Result<Self> {
        let key = schema.index_of(KEY_ATTRIBUTE);
        let value = schema.index_of(VALUE_ATTRIBUTE);
        if key.is_none() && value.is_none() {
            return Err(Error::config(format!(
                "output schema {schema} must have a \"{KEY_ATTRIBUTE}\" or \"{VALUE_ATTRIBUTE}\" attribute"
            )));
        }
        check_type(schema, key, &[AttributeType::Int64])?;
        check_type(schema, value, &[AttributeType::RString, AttributeType::UString])?;
        Ok(Self { key, value })
    }
}

fn check_type(schema: &StreamSchema, slot: Option<usize>, allowed: &[AttributeType]) -> Result<()> {
    let Some(attr) = slot.map(|i| &schema.attributes[i]) else {
        return Ok(());
    };
    if !allowed.contains(&attr.ty) {
        let names: Vec<_> = allowed.iter().map(|t| t.name()).collect();
        return Err(Error::TypeContract(format!(
            "attribute \"{}\" must be {}, found {}",
            attr.name,
            names.join(" or "),
            attr.ty
        )));
    }
    Ok(())
}
