// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::schema::{ReducerType, StateSchema};
use crate::sdk::error::GraphError;

/// The state record threaded through a run, with reducer support
///
/// Declared fields are type-checked on every write; undeclared fields are
/// accepted and overwritten.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// Current state values
    fields: Map<String, Value>,
    /// Field declarations
    schema: Arc<StateSchema>,
}

impl WorkflowState {
    /// Create a new WorkflowState seeded with the schema's defaults
    pub fn new(schema: Arc<StateSchema>) -> Self {
        let fields = schema
            .fields
            .iter()
            .filter_map(|(name, def)| def.default.clone().map(|v| (name.clone(), v)))
            .collect();

        Self { fields, schema }
    }

    /// Create an empty WorkflowState with no declared fields
    pub fn empty() -> Self {
        Self::new(Arc::new(StateSchema::default()))
    }

    /// Build the initial state of a run: defaults first, then `input`
    /// merged through the reducers, then validated.
    pub fn from_input(schema: Arc<StateSchema>, input: Value) -> Result<Self, GraphError> {
        let mut state = Self::new(schema);
        match input {
            Value::Object(map) => state.apply(map)?,
            Value::Null => {}
            other => {
                return Err(GraphError::InvalidState(format!(
                    "initial state must be an object, got {}",
                    other
                )))
            }
        }
        state.validate()?;
        Ok(state)
    }

    /// Rebuild a state from a stored snapshot without running reducers
    pub fn restore(schema: Arc<StateSchema>, snapshot: Value) -> Result<Self, GraphError> {
        match snapshot {
            Value::Object(fields) => Ok(Self { fields, schema }),
            other => Err(GraphError::checkpoint(format!(
                "state snapshot is not an object: {}",
                other
            ))),
        }
    }

    /// Update a field using the appropriate reducer
    pub fn update(&mut self, key: &str, value: Value) -> Result<(), GraphError> {
        let reducer = self.reducer_for(key);
        self.check_type(key, &value, reducer)?;

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let slot = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if !slot.is_array() {
                    *slot = Value::Array(vec![]);
                }
                if let Value::Array(items) = slot {
                    match value {
                        Value::Array(new_items) => items.extend(new_items),
                        other => items.push(other),
                    }
                }
            }
            ReducerType::Max | ReducerType::Min => {
                let current = self.fields.get(key).and_then(Value::as_f64);
                let replace = match (current, value.as_f64()) {
                    (_, None) => false,
                    (None, Some(_)) => true,
                    (Some(cur), Some(new)) if reducer == ReducerType::Max => new > cur,
                    (Some(cur), Some(new)) => new < cur,
                };
                if replace {
                    self.fields.insert(key.to_string(), value);
                }
            }
            ReducerType::Merge => {
                let slot = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (slot, value) {
                    (Value::Object(current), Value::Object(incoming)) => {
                        for (k, v) in incoming {
                            current.insert(k, v);
                        }
                    }
                    (slot, other) => *slot = other,
                }
            }
        }
        Ok(())
    }

    /// Apply every field of an update in key order
    ///
    /// All fields are type-checked first, so a rejected update leaves the
    /// state untouched.
    pub fn apply(&mut self, update: Map<String, Value>) -> Result<(), GraphError> {
        for (key, value) in &update {
            self.check_type(key, value, self.reducer_for(key))?;
        }
        for (key, value) in update {
            self.update(&key, value)?;
        }
        Ok(())
    }

    /// Check required fields are present and non-null and declared types hold
    pub fn validate(&self) -> Result<(), GraphError> {
        let missing: Vec<&str> = self
            .schema
            .required()
            .filter(|name| matches!(self.fields.get(*name), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::InvalidState(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        for (key, value) in &self.fields {
            if let Some(def) = self.schema.get(key) {
                if !def.field_type.accepts(value) {
                    return Err(GraphError::InvalidState(format!(
                        "field '{}' expects {}, got {}",
                        key, def.field_type, value
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_type(&self, key: &str, value: &Value, reducer: ReducerType) -> Result<(), GraphError> {
        let Some(def) = self.schema.get(key) else {
            return Ok(());
        };
        // Appending a single item to a list is fine for array fields
        let ok = def.field_type.accepts(value) || reducer == ReducerType::Append;
        if ok {
            Ok(())
        } else {
            Err(GraphError::InvalidState(format!(
                "field '{}' expects {}, got {}",
                key, def.field_type, value
            )))
        }
    }

    /// Reducer for a field; undeclared fields overwrite
    pub fn reducer_for(&self, key: &str) -> ReducerType {
        self.schema
            .get(key)
            .map(|def| def.reducer)
            .unwrap_or_default()
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a nested field value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Consume the state into its JSON object
    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for WorkflowState {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for WorkflowState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
