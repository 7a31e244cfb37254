use std::fmt;
use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;

use crate::error::VariableError;

/// Runtime value held by a variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    String(String),
    Table(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view: numbers as-is, numeric strings parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text used when a value is interpolated into a string.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Table(entries) => {
                f.write_str("[")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Value::Table(entries)
    }
}

/// Named value. Constants reject assignment.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    value: Value,
    constant: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            constant: false,
        }
    }

    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            constant: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn set_value(&mut self, value: Value) -> Result<(), VariableError> {
        if self.constant {
            return Err(VariableError::Constant(self.name.clone()));
        }
        self.value = value;
        Ok(())
    }

    /// Assigns even when the variable is constant. Host use only.
    pub fn force_value(&mut self, value: Value) {
        self.value = value;
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.value == other.value
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.constant {
            f.write_str("const ")?;
        }
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// Case-insensitive variable table shared by every run on a page.
#[derive(Debug, Default)]
pub struct Scope {
    variables: RwLock<IndexMap<String, Variable>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn len(&self) -> usize {
        self.variables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&Self::key(name))
    }

    pub fn get(&self, name: &str) -> Option<Variable> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(name))
            .cloned()
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.get(name).map(|v| v.value)
    }

    /// Assigns `value`, creating the variable when missing.
    pub fn set(&self, name: &str, value: Value) -> Result<(), VariableError> {
        let mut variables = self.variables.write().unwrap_or_else(PoisonError::into_inner);
        match variables.get_mut(&Self::key(name)) {
            Some(variable) => variable.set_value(value),
            None => {
                variables.insert(Self::key(name), Variable::new(name, value));
                Ok(())
            }
        }
    }

    /// Changes a value in place under one write lock, creating the variable
    /// as null first when missing.
    pub fn update<F>(&self, name: &str, change: F) -> Result<(), VariableError>
    where
        F: FnOnce(&mut Value),
    {
        let mut variables = self.variables.write().unwrap_or_else(PoisonError::into_inner);
        let variable = variables
            .entry(Self::key(name))
            .or_insert_with(|| Variable::new(name, Value::Null));
        if variable.constant {
            return Err(VariableError::Constant(variable.name.clone()));
        }
        change(&mut variable.value);
        Ok(())
    }

    /// Adds or replaces a variable as a whole, constants included.
    pub fn insert(&self, variable: Variable) -> Option<Variable> {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(variable.name()), variable)
    }

    pub fn install_constant(&self, name: &str, value: Value) -> Option<Variable> {
        self.insert(Variable::constant(name, value))
    }

    pub fn remove(&self, name: &str) -> Option<Variable> {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&Self::key(name))
    }

    /// Copy of every variable in insertion order.
    pub fn snapshot(&self) -> Vec<Variable> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
