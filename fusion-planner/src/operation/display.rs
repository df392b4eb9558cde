use std::fmt;
use std::fmt::Write;

use super::Condition;
use super::ConditionValue;
use super::Field;
use super::InlineFragment;
use super::InputValue;
use super::Operation;
use super::Selection;
use super::SelectionSet;

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if !self.variables.is_empty() {
            f.write_str("(")?;
            for (i, variable) in self.variables.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "${}: {}", variable.name, variable.ty)?;
                if let Some(default) = &variable.default_value {
                    f.write_str(" = ")?;
                    write_json_literal(f, default)?;
                }
            }
            f.write_str(")")?;
        }
        write!(f, " {}", self.selection_set)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for selection in &self.0 {
            f.write_char(' ')?;
            match selection {
                Selection::Field(field) => write!(f, "{field}")?,
                Selection::InlineFragment(fragment) => write!(f, "{fragment}")?,
            }
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("(")?;
            for (i, (name, value)) in self.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: {value}")?;
            }
            f.write_str(")")?;
        }
        write_conditions(f, &self.conditions)?;
        if !self.selection_set.is_empty() {
            write!(f, " {}", self.selection_set)?;
        }
        Ok(())
    }
}

impl fmt::Display for InlineFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("...")?;
        if let Some(type_condition) = &self.type_condition {
            write!(f, " on {type_condition}")?;
        }
        write_conditions(f, &self.conditions)?;
        write!(f, " {}", self.selection_set)
    }
}

fn write_conditions(f: &mut fmt::Formatter<'_>, conditions: &[Condition]) -> fmt::Result {
    for condition in conditions {
        let name = match condition {
            Condition::Skip(_) => "skip",
            Condition::Include(_) => "include",
        };
        match condition.value() {
            ConditionValue::Literal(value) => write!(f, " @{name}(if: {value})")?,
            ConditionValue::Variable(variable) => write!(f, " @{name}(if: ${variable})")?,
        }
    }
    Ok(())
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(reference) => write!(f, "${}", reference.name),
            Self::Enum(value) => f.write_str(&value.value),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Scalar(value) => write_json_literal(f, value),
        }
    }
}

fn write_json_literal(f: &mut fmt::Formatter<'_>, value: &serde_json::Value) -> fmt::Result {
    match value {
        serde_json::Value::Array(values) => {
            f.write_str("[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_json_literal(f, value)?;
            }
            f.write_str("]")
        }
        serde_json::Value::Object(fields) => {
            f.write_str("{")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: ")?;
                write_json_literal(f, value)?;
            }
            f.write_str("}")
        }
        // JSON strings, numbers, booleans and null are valid GraphQL literals as written.
        scalar => write!(f, "{scalar}"),
    }
}
