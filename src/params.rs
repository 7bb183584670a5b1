//! Path-addressed parameter tree for engine configuration.
//!
//! Adaptive engines expose their tunable configuration (axis bounds,
//! strategy knobs) through a [`ParameterTree`]: a flat map of
//! slash-separated paths to [`Parameter`] entries with optional validation
//! constraints. The protocol's `SetParameter`/`GetParameters` requests proxy
//! straight through to this tree.
//!
//! Change notification is a monotonic revision counter: collaborators that
//! cache derived state compare [`ParameterTree::revision`] against the value
//! they last saw instead of subscribing to callbacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Validation constraints applied on [`ParameterTree::set`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Constraints {
    /// No constraints
    #[default]
    None,

    /// Numeric range (inclusive)
    Range { min: f64, max: f64 },

    /// Allowed discrete values
    Choices(Vec<serde_json::Value>),
}

impl Constraints {
    pub fn validate(&self, value: &serde_json::Value) -> CoreResult<()> {
        match self {
            Constraints::None => Ok(()),
            Constraints::Range { min, max } => {
                let number = value.as_f64().ok_or_else(|| {
                    CoreError::ParameterInvalid(format!("expected a number, got {value}"))
                })?;
                if number < *min || number > *max {
                    return Err(CoreError::ParameterInvalid(format!(
                        "{number} outside [{min}, {max}]"
                    )));
                }
                Ok(())
            }
            Constraints::Choices(choices) => {
                if choices.contains(value) {
                    Ok(())
                } else {
                    Err(CoreError::ParameterInvalid(format!(
                        "{value} is not one of the allowed choices"
                    )))
                }
            }
        }
    }
}

/// One tunable value with optional display title and constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Parameter {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
            title: None,
            constraints: Constraints::None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints = Constraints::Range { min, max };
        self
    }

    pub fn with_choices(mut self, choices: Vec<serde_json::Value>) -> Self {
        self.constraints = Constraints::Choices(choices);
        self
    }
}

/// Schema-fixed collection of parameters addressed by slash-separated path
/// (e.g. `bounds/axis_0_min`). The set of paths is established at engine
/// construction; `set` on an unknown path is an error rather than an insert.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTree {
    parameters: BTreeMap<String, Parameter>,
    revision: u64,
}

impl ParameterTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter path. Intended for engine constructors.
    pub fn insert(&mut self, path: impl Into<String>, parameter: Parameter) {
        self.parameters.insert(path.into(), parameter);
    }

    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        self.parameters.get(path).map(|p| &p.value)
    }

    pub fn get_f64(&self, path: &str) -> CoreResult<f64> {
        self.parameters
            .get(path)
            .ok_or_else(|| CoreError::ParameterUnknown(path.to_string()))?
            .value
            .as_f64()
            .ok_or_else(|| CoreError::ParameterInvalid(format!("{path} is not numeric")))
    }

    /// Validates and stores a new value, bumping the revision counter.
    pub fn set(&mut self, path: &str, value: serde_json::Value) -> CoreResult<()> {
        let parameter = self
            .parameters
            .get_mut(path)
            .ok_or_else(|| CoreError::ParameterUnknown(path.to_string()))?;
        parameter.constraints.validate(&value)?;
        parameter.value = value;
        self.revision += 1;
        Ok(())
    }

    /// Monotonic counter bumped by every successful `set`.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.parameters.iter()
    }

    /// Serializes the whole tree for the `GetParameters` response.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
