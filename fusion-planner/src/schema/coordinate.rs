use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// The name of one source schema, i.e. one backing GraphQL service.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct SourceSchemaName(Arc<str>);

impl SourceSchemaName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SourceSchemaName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceSchemaName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceSchemaName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Identifies a field of the composite schema as `Type.field`.
///
/// Every schema table is keyed by coordinates rather than holding references between types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaCoordinate {
    pub type_name: String,
    pub field_name: String,
}

impl SchemaCoordinate {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for SchemaCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

impl FromStr for SchemaCoordinate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((type_name, field_name)) if !type_name.is_empty() && !field_name.is_empty() => {
                Ok(Self::new(type_name, field_name))
            }
            _ => Err(format!("`{s}` is not a schema coordinate")),
        }
    }
}

impl Serialize for SchemaCoordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchemaCoordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
