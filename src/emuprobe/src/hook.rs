//! Scripting hook boundary
//!
//! Mapper authors can override how individual properties are read, written
//! and post-processed, and can run code before and after every tick. The
//! engine doesn't know what runs those hooks; it only calls through
//! `HookInvoker`. A hook answering `false` aborts the step it guards.

use crate::property::Property;

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Hook run after the driver fills memory, before any property is processed
pub const PREPROCESSOR: &str = "preprocessor";

/// Hook run after every property is processed, before notifying subscribers
pub const POSTPROCESSOR: &str = "postprocessor";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Hook '{name}' failed: {message}")]
pub struct HookError {
    pub name: String,
    pub message: String,
}

impl HookError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Runtime variables written by hooks and read by dynamic address expressions.
///
/// Every mutation bumps `generation`, which the orchestrator uses to decide
/// when dynamic addresses must be resolved again.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, Value>,
    generation: u64,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
        self.generation += 1;
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.values.remove(name);
        if removed.is_some() {
            self.generation += 1;
        }
        removed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The scripting collaborator, as seen by the engine
pub trait HookInvoker: Send {
    /// Call a named hook, optionally on one property
    fn call_hook(&mut self, name: &str, property: Option<&mut Property>) -> Result<Value, HookError>;

    /// Evaluate an `afterReadExpression` against a freshly decoded value
    fn evaluate_expression(&mut self, expression: &str, value: &Value) -> Result<Value, HookError>;

    /// Variables visible to address expressions
    fn variables(&self) -> &Variables;
}

/// Whether a hook result vetoes the step it guards
pub fn is_veto(result: &Value) -> bool {
    matches!(result, Value::Bool(false))
}

/// Hooks for mappers that have no scripts: every hook is a no-op and
/// expressions pass values through unchanged.
#[derive(Debug, Clone, Default)]
pub struct NoopHooks {
    pub variables: Variables,
}

impl NoopHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: Variables) -> Self {
        Self { variables }
    }
}

impl HookInvoker for NoopHooks {
    fn call_hook(&mut self, _name: &str, _property: Option<&mut Property>) -> Result<Value, HookError> {
        Ok(Value::Null)
    }

    fn evaluate_expression(&mut self, _expression: &str, value: &Value) -> Result<Value, HookError> {
        Ok(value.clone())
    }

    fn variables(&self) -> &Variables {
        &self.variables
    }
}
