//! Parameter Validation
//!
//! Declarative constraints checked before a request is built. Values are
//! inspected as JSON so any `Serialize` parameter can be validated.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{AzureResult, ConfigurationError};

/// A rule applied to one value.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Present and not null. Strings, arrays and objects must be non-empty.
    Required,
    MaxLength(usize),
    MinLength(usize),
    /// Regular expression the whole string must match somewhere.
    Pattern(String),
    MaxItems(usize),
    MinItems(usize),
    UniqueItems,
    InclusiveMaximum(f64),
    ExclusiveMaximum(f64),
    InclusiveMinimum(f64),
    ExclusiveMinimum(f64),
    MultipleOf(f64),
    /// Apply `constraints` to member `name` of an object value.
    Field {
        name: String,
        constraints: Vec<Constraint>,
    },
}

impl Constraint {
    /// Name reported in validation errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Required => "Required",
            Self::MaxLength(_) => "MaxLength",
            Self::MinLength(_) => "MinLength",
            Self::Pattern(_) => "Pattern",
            Self::MaxItems(_) => "MaxItems",
            Self::MinItems(_) => "MinItems",
            Self::UniqueItems => "UniqueItems",
            Self::InclusiveMaximum(_) => "InclusiveMaximum",
            Self::ExclusiveMaximum(_) => "ExclusiveMaximum",
            Self::InclusiveMinimum(_) => "InclusiveMinimum",
            Self::ExclusiveMinimum(_) => "ExclusiveMinimum",
            Self::MultipleOf(_) => "MultipleOf",
            Self::Field { .. } => "Field",
        }
    }

    pub fn field(name: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        Self::Field {
            name: name.into(),
            constraints,
        }
    }
}

/// One parameter and the constraints it must satisfy.
#[derive(Clone, Debug)]
pub struct Validation {
    pub target: String,
    pub value: Value,
    pub constraints: Vec<Constraint>,
}

impl Validation {
    pub fn new(target: impl Into<String>, value: Value, constraints: Vec<Constraint>) -> Self {
        Self {
            target: target.into(),
            value,
            constraints,
        }
    }

    /// Validate any serializable parameter.
    pub fn of<T: Serialize>(
        target: impl Into<String>,
        value: &T,
        constraints: Vec<Constraint>,
    ) -> AzureResult<Self> {
        Ok(Self::new(target, serde_json::to_value(value)?, constraints))
    }
}

struct Failure {
    target: String,
    constraint: &'static str,
    message: String,
}

fn fail(target: &str, constraint: &Constraint, message: String) -> Result<(), Failure> {
    Err(Failure {
        target: target.to_string(),
        constraint: constraint.name(),
        message,
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

fn check(target: &str, value: &Value, constraint: &Constraint) -> Result<(), Failure> {
    if value.is_null() && !matches!(constraint, Constraint::Required) {
        return Ok(());
    }

    match constraint {
        Constraint::Required => {
            if is_empty(value) {
                return fail(target, constraint, "value can not be null or empty; required parameter".into());
            }
        }
        Constraint::MaxLength(max) | Constraint::MaxItems(max) => match length(value) {
            Some(len) if len > *max => {
                return fail(target, constraint, format!("value length must be less than or equal to {}", max));
            }
            Some(_) => {}
            None => return fail(target, constraint, "value has no length".into()),
        },
        Constraint::MinLength(min) | Constraint::MinItems(min) => match length(value) {
            Some(len) if len < *min => {
                return fail(target, constraint, format!("value length must be greater than or equal to {}", min));
            }
            Some(_) => {}
            None => return fail(target, constraint, "value has no length".into()),
        },
        Constraint::Pattern(pattern) => {
            let Value::String(s) = value else {
                return fail(target, constraint, "value is not a string".into());
            };
            let re = Regex::new(pattern)
                .map_err(|e| Failure {
                    target: target.to_string(),
                    constraint: constraint.name(),
                    message: format!("invalid pattern: {}", e),
                })?;
            if !re.is_match(s) {
                return fail(target, constraint, format!("value doesn't match pattern {}", pattern));
            }
        }
        Constraint::UniqueItems => {
            let items: Vec<String> = match value {
                Value::Array(a) => a.iter().map(Value::to_string).collect(),
                Value::Object(o) => o.values().map(Value::to_string).collect(),
                _ => return fail(target, constraint, "value is not a collection".into()),
            };
            let unique: HashSet<&String> = items.iter().collect();
            if unique.len() != items.len() {
                return fail(target, constraint, "all items must be unique".into());
            }
        }
        Constraint::InclusiveMaximum(limit)
        | Constraint::ExclusiveMaximum(limit)
        | Constraint::InclusiveMinimum(limit)
        | Constraint::ExclusiveMinimum(limit) => {
            let Some(n) = value.as_f64() else {
                return fail(target, constraint, "value is not a number".into());
            };
            let (ok, relation) = match constraint {
                Constraint::InclusiveMaximum(_) => (n <= *limit, "less than or equal to"),
                Constraint::ExclusiveMaximum(_) => (n < *limit, "less than"),
                Constraint::InclusiveMinimum(_) => (n >= *limit, "greater than or equal to"),
                _ => (n > *limit, "greater than"),
            };
            if !ok {
                return fail(target, constraint, format!("value must be {} {}", relation, limit));
            }
        }
        Constraint::MultipleOf(divisor) => {
            let Some(n) = value.as_f64() else {
                return fail(target, constraint, "value is not a number".into());
            };
            if *divisor == 0.0 || (n / divisor).fract() != 0.0 {
                return fail(target, constraint, format!("value must be a multiple of {}", divisor));
            }
        }
        Constraint::Field { name, constraints } => {
            let member = value.get(name).unwrap_or(&Value::Null);
            let target = format!("{}.{}", target, name);
            for nested in constraints {
                check(&target, member, nested)?;
            }
        }
    }
    Ok(())
}

/// Check every validation, returning the first violation as a
/// `ConfigurationError::Validation` naming `package` and `method`.
pub fn validate(package: &str, method: &str, validations: &[Validation]) -> AzureResult<()> {
    for validation in validations {
        for constraint in &validation.constraints {
            if let Err(failure) = check(&validation.target, &validation.value, constraint) {
                return Err(ConfigurationError::Validation {
                    package: package.to_string(),
                    method: method.to_string(),
                    target: failure.target,
                    constraint: failure.constraint.to_string(),
                    message: failure.message,
                }
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureError;
    use serde_json::json;

    fn violation(validations: &[Validation]) -> (String, String, String) {
        match validate("things.Client", "Create", validations) {
            Err(AzureError::Configuration(ConfigurationError::Validation {
                target,
                constraint,
                message,
                ..
            })) => (target, constraint, message),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_required() {
        assert!(validate("p", "m", &[Validation::new("name", json!("a"), vec![Constraint::Required])]).is_ok());

        for value in [json!(null), json!(""), json!([])] {
            let (target, constraint, _) =
                violation(&[Validation::new("name", value, vec![Constraint::Required])]);
            assert_eq!(target, "name");
            assert_eq!(constraint, "Required");
        }
    }

    #[test]
    fn test_optional_null_skips_other_rules() {
        let validations = [Validation::new(
            "top",
            json!(null),
            vec![Constraint::InclusiveMaximum(10.0), Constraint::MinLength(3)],
        )];
        assert!(validate("p", "m", &validations).is_ok());
    }

    #[test]
    fn test_lengths_and_pattern() {
        let name = |v: &str| {
            Validation::new(
                "resourceGroupName",
                json!(v),
                vec![
                    Constraint::MaxLength(10),
                    Constraint::MinLength(1),
                    Constraint::Pattern(r"^[-\w\._\(\)]+$".to_string()),
                ],
            )
        };
        assert!(validate("p", "m", &[name("rg-1")]).is_ok());
        assert_eq!(violation(&[name("much-too-long-name")]).1, "MaxLength");
        assert_eq!(violation(&[name("")]).1, "MinLength");
        assert_eq!(violation(&[name("bad name")]).1, "Pattern");
    }

    #[test]
    fn test_numeric_bounds() {
        let top = |n: i64| {
            Validation::new(
                "top",
                json!(n),
                vec![
                    Constraint::InclusiveMinimum(1.0),
                    Constraint::ExclusiveMaximum(100.0),
                    Constraint::MultipleOf(5.0),
                ],
            )
        };
        assert!(validate("p", "m", &[top(95)]).is_ok());
        assert_eq!(violation(&[top(0)]).1, "InclusiveMinimum");
        assert_eq!(violation(&[top(100)]).1, "ExclusiveMaximum");
        let (_, constraint, message) = violation(&[top(7)]);
        assert_eq!(constraint, "MultipleOf");
        assert_eq!(message, "value must be a multiple of 5");
    }

    #[test]
    fn test_items() {
        let tags = |v: Value| {
            Validation::new(
                "tags",
                v,
                vec![Constraint::MinItems(1), Constraint::MaxItems(3), Constraint::UniqueItems],
            )
        };
        assert!(validate("p", "m", &[tags(json!(["a", "b"]))]).is_ok());
        assert_eq!(violation(&[tags(json!(["a", "b", "c", "d"]))]).1, "MaxItems");
        assert_eq!(violation(&[tags(json!(["a", "a"]))]).1, "UniqueItems");
    }

    #[test]
    fn test_nested_chain_reports_path() {
        let parameters = json!({"properties": {"sku": {"capacity": 0}}});
        let validations = [Validation::new(
            "parameters",
            parameters,
            vec![Constraint::field(
                "properties",
                vec![
                    Constraint::Required,
                    Constraint::field(
                        "sku",
                        vec![Constraint::field("capacity", vec![Constraint::InclusiveMinimum(1.0)])],
                    ),
                ],
            )],
        )];

        let (target, constraint, _) = violation(&validations);
        assert_eq!(target, "parameters.properties.sku.capacity");
        assert_eq!(constraint, "InclusiveMinimum");
    }

    #[test]
    fn test_error_message_names_method() {
        let err = validate(
            "things.Client",
            "Create",
            &[Validation::new("name", json!(null), vec![Constraint::Required])],
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Configuration error: things.Client#Create: Invalid input: field 'name' violated constraint 'Required'"));
    }

    #[test]
    fn test_of_serializes_value() {
        #[derive(Serialize)]
        struct Sku {
            capacity: u32,
        }
        let validation =
            Validation::of("sku", &Sku { capacity: 3 }, vec![Constraint::field("capacity", vec![Constraint::MultipleOf(3.0)])])
                .unwrap();
        assert!(validate("p", "m", &[validation]).is_ok());
    }
}
