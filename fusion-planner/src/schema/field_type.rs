use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::SchemaError;

/// A GraphQL type reference such as `[Product!]!`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Named(String),
    List(Box<FieldType>),
    NonNull(Box<FieldType>),
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(self) -> Self {
        match self {
            Self::NonNull(_) => self,
            other => Self::NonNull(Box::new(other)),
        }
    }

    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    /// The innermost named type, with list and non-null wrappers removed.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Number of list wrappers around the named type.
    pub fn list_depth(&self) -> usize {
        match self {
            Self::Named(_) => 0,
            Self::NonNull(inner) => inner.list_depth(),
            Self::List(inner) => 1 + inner.list_depth(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let s = s.trim();
        if let Some(inner) = s.strip_suffix('!') {
            let inner = Self::parse(inner)?;
            if inner.is_non_null() {
                return Err(SchemaError::InvalidTypeReference(s.to_string()));
            }
            return Ok(Self::NonNull(Box::new(inner)));
        }
        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| SchemaError::InvalidTypeReference(s.to_string()))?;
            return Ok(Self::List(Box::new(Self::parse(inner)?)));
        }
        if is_name(s) {
            Ok(Self::Named(s.to_string()))
        } else {
            Err(SchemaError::InvalidTypeReference(s.to_string()))
        }
    }
}

pub(crate) fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
