use indexmap::IndexMap;
use regex::{Captures, Regex};

use crate::error::HandlerError;
use crate::expression::{ExprValue, Expression};
use crate::trigger::Trigger;
use crate::variable::{Scope, Value, Variable};

/// Pattern matching `%name` and `%name[key]` references inside string
/// literals, for the given declaration symbol.
pub fn interpolation_pattern(symbol: char) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?P<name>{}[\w@$&]+)(?:\[(?P<key>[\w@$&]*)\])?",
        regex::escape(&symbol.to_string())
    ))
}

/// Everything a handler sees while its trigger runs: the trigger, a queue
/// over its operands, the run's parameters and the page scope.
pub struct TriggerReader<'a> {
    trigger: Trigger,
    contents: &'a [Expression],
    cursor: usize,
    scope: &'a Scope,
    parameters: &'a [Value],
    interpolation: &'a Regex,
    block_index: usize,
    iteration: u32,
    exit_loop: bool,
}

impl<'a> TriggerReader<'a> {
    pub(crate) fn new(
        trigger: Trigger,
        contents: &'a [Expression],
        scope: &'a Scope,
        parameters: &'a [Value],
        interpolation: &'a Regex,
    ) -> Self {
        Self {
            trigger,
            contents,
            cursor: 0,
            scope,
            parameters,
            interpolation,
            block_index: 0,
            iteration: 0,
            exit_loop: false,
        }
    }

    pub(crate) fn at(mut self, block_index: usize, iteration: u32) -> Self {
        self.block_index = block_index;
        self.iteration = iteration;
        self
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn parameters(&self) -> &[Value] {
        self.parameters
    }

    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }

    /// Index of the top-level block being run.
    pub fn current_block_index(&self) -> usize {
        self.block_index
    }

    /// How many times this Flow trigger has already looped; 0 on first entry.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.contents.len()
    }

    pub fn peek(&self) -> Option<&Expression> {
        self.contents.get(self.cursor)
    }

    pub fn peek_is_string(&self) -> bool {
        matches!(self.peek().map(Expression::value), Some(ExprValue::String(_)))
    }

    pub fn peek_is_number(&self) -> bool {
        matches!(self.peek().map(Expression::value), Some(ExprValue::Number(_)))
    }

    pub fn peek_is_variable(&self) -> bool {
        matches!(
            self.peek().map(Expression::value),
            Some(ExprValue::Variable(_) | ExprValue::VariableTable { .. })
        )
    }

    fn next_operand(&mut self) -> Result<&'a Expression, HandlerError> {
        let contents = self.contents;
        let expr = contents
            .get(self.cursor)
            .ok_or(HandlerError::MissingOperand {
                trigger: self.trigger,
            })?;
        self.cursor += 1;
        Ok(expr)
    }

    fn unexpected(&self, expected: &'static str, found: &'static str) -> HandlerError {
        HandlerError::UnexpectedOperand {
            trigger: self.trigger,
            expected,
            found,
        }
    }

    fn lookup(&self, name: &str, key: Option<&str>) -> Value {
        let value = self.scope.value(name).unwrap_or_default();
        match (key, value) {
            (Some(key), Value::Table(entries)) => entries.get(key).cloned().unwrap_or_default(),
            (_, value) => value,
        }
    }

    /// Reads a string literal with variable references substituted, or the
    /// text of a variable operand.
    pub fn read_string(&mut self) -> Result<String, HandlerError> {
        match self.next_operand()?.value() {
            ExprValue::String(text) => Ok(self.interpolate(text)),
            ExprValue::Variable(name) => Ok(self.lookup(name, None).as_text()),
            ExprValue::VariableTable { name, indexer } => {
                Ok(self.lookup(name, indexer.as_deref()).as_text())
            }
            other => Err(self.unexpected("string", other.kind_name())),
        }
    }

    /// Substitutes `%name` references with their values. Unknown names stay as written.
    pub fn interpolate(&self, text: &str) -> String {
        self.interpolation
            .replace_all(text, |caps: &Captures| {
                let name = &caps["name"];
                match self.scope.get(name) {
                    Some(variable) => {
                        let key = caps.name("key").map(|m| m.as_str());
                        match (key, variable.value()) {
                            (Some(key), Value::Table(entries)) => entries
                                .get(key)
                                .map(Value::as_text)
                                .unwrap_or_default(),
                            (_, value) => value.as_text(),
                        }
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Reads a number literal or the numeric value of a variable.
    pub fn read_number(&mut self) -> Result<f64, HandlerError> {
        let value = match self.next_operand()?.value() {
            ExprValue::Number(n) => return Ok(*n),
            ExprValue::Variable(name) => self.lookup(name, None),
            ExprValue::VariableTable { name, indexer } => self.lookup(name, indexer.as_deref()),
            other => return Err(self.unexpected("number", other.kind_name())),
        };
        value
            .as_number()
            .ok_or_else(|| self.unexpected("number", value.type_name()))
    }

    /// Reads a variable operand. A missing variable is created in the scope
    /// when `create` is set; otherwise an unstored null variable is returned.
    pub fn read_variable(&mut self, create: bool) -> Result<Variable, HandlerError> {
        let name = match self.next_operand()?.value() {
            ExprValue::Variable(name) | ExprValue::VariableTable { name, .. } => name,
            other => return Err(self.unexpected("variable", other.kind_name())),
        };
        if let Some(variable) = self.scope.get(name) {
            return Ok(variable);
        }
        if create {
            self.scope.set(name, Value::Null)?;
        }
        Ok(Variable::new(name.as_str(), Value::Null))
    }

    /// Reads a table operand as its name and key. A plain variable reads as
    /// a table with no key.
    pub fn read_table_key(&mut self) -> Result<(String, Option<String>), HandlerError> {
        match self.next_operand()?.value() {
            ExprValue::VariableTable { name, indexer } => Ok((name.clone(), indexer.clone())),
            ExprValue::Variable(name) => Ok((name.clone(), None)),
            other => Err(self.unexpected("table variable", other.kind_name())),
        }
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.scope.get(name)
    }

    pub fn set_variable(&self, name: &str, value: impl Into<Value>) -> Result<(), HandlerError> {
        self.scope.set(name, value.into())?;
        Ok(())
    }

    /// Sets one entry of a table variable, turning the variable into a table
    /// if it held anything else.
    pub fn set_table_entry(
        &self,
        name: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), HandlerError> {
        let (key, value) = (key.to_string(), value.into());
        self.scope.update(name, move |current| {
            if !matches!(current, Value::Table(_)) {
                *current = Value::Table(IndexMap::new());
            }
            if let Value::Table(entries) = current {
                entries.insert(key, value);
            }
        })?;
        Ok(())
    }

    /// Leaves the enclosing loop once this handler returns.
    pub fn exit_loop(&mut self) {
        self.exit_loop = true;
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit_loop
    }
}
