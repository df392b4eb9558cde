//! Field sets (`id dimension { weight }`) and dotted field paths (`dimension.weight`), as used
//! by requirements and lookup keys in the composite schema artifact.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use super::field_type::is_name;
use crate::error::SchemaError;

/// A selection of fields without arguments, aliases or fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldSet {
    pub fields: Vec<FieldSetItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldSetItem {
    pub name: String,
    pub selection: FieldSet,
}

impl FieldSet {
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let error = |message: &str| SchemaError::InvalidFieldSet {
            field_set: input.to_string(),
            message: message.to_string(),
        };
        let tokens = tokenize(input).map_err(|message| error(&message))?;
        let mut position = 0;
        let field_set = parse_fields(&tokens, &mut position).map_err(|message| error(&message))?;
        if position != tokens.len() {
            return Err(error("unexpected `}`"));
        }
        if field_set.fields.is_empty() {
            return Err(error("a field set selects at least one field"));
        }
        Ok(field_set)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Paths to every leaf of the field set, in declaration order.
    pub fn leaf_paths(&self) -> Vec<FieldPath> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(&mut Vec::new(), &mut paths);
        paths
    }

    fn collect_leaf_paths(&self, prefix: &mut Vec<String>, paths: &mut Vec<FieldPath>) {
        for item in &self.fields {
            prefix.push(item.name.clone());
            if item.selection.is_empty() {
                paths.push(FieldPath(prefix.clone()));
            } else {
                item.selection.collect_leaf_paths(prefix, paths);
            }
            prefix.pop();
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Name(&'a str),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, String> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() || c == ',' {
            rest = &rest[c.len_utf8()..];
        } else if c == '{' {
            tokens.push(Token::Open);
            rest = &rest[1..];
        } else if c == '}' {
            tokens.push(Token::Close);
            rest = &rest[1..];
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ',' || c == '{' || c == '}')
                .unwrap_or(rest.len());
            let name = &rest[..end];
            if !is_name(name) {
                return Err(format!("`{name}` is not a valid field name"));
            }
            tokens.push(Token::Name(name));
            rest = &rest[end..];
        }
    }
    Ok(tokens)
}

fn parse_fields(tokens: &[Token<'_>], position: &mut usize) -> Result<FieldSet, String> {
    let mut fields = Vec::new();
    while let Some(token) = tokens.get(*position) {
        match token {
            Token::Name(name) => {
                *position += 1;
                let selection = if tokens.get(*position) == Some(&Token::Open) {
                    *position += 1;
                    let selection = parse_fields(tokens, position)?;
                    if tokens.get(*position) != Some(&Token::Close) {
                        return Err(format!("unclosed selection on `{name}`"));
                    }
                    *position += 1;
                    if selection.is_empty() {
                        return Err(format!("empty selection on `{name}`"));
                    }
                    selection
                } else {
                    FieldSet::default()
                };
                fields.push(FieldSetItem {
                    name: name.to_string(),
                    selection,
                });
            }
            Token::Close => break,
            Token::Open => return Err("selection without a field".to_string()),
        }
    }
    Ok(FieldSet { fields })
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&item.name)?;
            if !item.selection.is_empty() {
                write!(f, " {{ {} }}", item.selection)?;
            }
        }
        Ok(())
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A path of response keys or field names, written `a.b.c`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let segments: Vec<String> = input.split('.').map(str::to_string).collect();
        if segments.iter().all(|segment| is_name(segment)) {
            Ok(Self(segments))
        } else {
            Err(SchemaError::InvalidFieldSet {
                field_set: input.to_string(),
                message: "a path is a dot separated list of field names".to_string(),
            })
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
