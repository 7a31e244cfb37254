use std::collections::HashMap;
use std::fmt;

use crate::token::{Kind, SourcePosition};
use crate::trigger::{Trigger, TriggerCategory};

/// Typed value of an operand attached to a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    String(String),
    Number(f64),
    /// Variable name, declaration symbol included.
    Variable(String),
    VariableTable {
        name: String,
        indexer: Option<String>,
    },
}

impl ExprValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprValue::String(_) => "string",
            ExprValue::Number(_) => "number",
            ExprValue::Variable(_) => "variable",
            ExprValue::VariableTable { .. } => "table variable",
        }
    }
}

/// An operand plus where it came from. Equality ignores the position.
#[derive(Debug, Clone)]
pub struct Expression {
    value: ExprValue,
    position: SourcePosition,
}

impl Expression {
    pub fn new(value: ExprValue, position: SourcePosition) -> Self {
        Self { value, position }
    }

    pub fn string(value: impl Into<String>, position: SourcePosition) -> Self {
        Self::new(ExprValue::String(value.into()), position)
    }

    pub fn number(value: f64, position: SourcePosition) -> Self {
        Self::new(ExprValue::Number(value), position)
    }

    pub fn variable(name: impl Into<String>, position: SourcePosition) -> Self {
        Self::new(ExprValue::Variable(name.into()), position)
    }

    pub fn table(
        name: impl Into<String>,
        indexer: Option<String>,
        position: SourcePosition,
    ) -> Self {
        Self::new(
            ExprValue::VariableTable {
                name: name.into(),
                indexer,
            },
            position,
        )
    }

    pub fn value(&self) -> &ExprValue {
        &self.value
    }

    pub fn set_value(&mut self, value: ExprValue) {
        self.value = value;
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            ExprValue::String(s) => f.write_str(s),
            ExprValue::Number(n) => write!(f, "{}", n),
            ExprValue::Variable(name) => f.write_str(name),
            ExprValue::VariableTable { name, indexer } => {
                write!(f, "{}[{}]", name, indexer.as_deref().unwrap_or(""))
            }
        }
    }
}

/// Contiguous run of expressions inside an [`ExprArena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprRange {
    pub start: u32,
    pub len: u32,
}

impl ExprRange {
    pub const EMPTY: ExprRange = ExprRange { start: 0, len: 0 };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bounds(&self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.len as usize
    }
}

/// Owns every expression of one program. Triggers refer into it by range.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    exprs: Vec<Expression>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Starts an empty range at the end of the arena.
    pub fn open_range(&self) -> ExprRange {
        ExprRange {
            start: self.exprs.len() as u32,
            len: 0,
        }
    }

    /// Appends to `range`, which must be the most recently opened one.
    pub fn push(&mut self, range: &mut ExprRange, expr: Expression) {
        debug_assert_eq!(
            range.start as usize + range.len as usize,
            self.exprs.len(),
            "expressions must be appended to the last open range"
        );
        self.exprs.push(expr);
        range.len += 1;
    }

    pub fn get(&self, range: ExprRange) -> &[Expression] {
        self.exprs.get(range.bounds()).unwrap_or(&[])
    }

    pub fn get_mut(&mut self, range: ExprRange) -> &mut [Expression] {
        self.exprs.get_mut(range.bounds()).unwrap_or(&mut [])
    }
}

/// What a token folds into while parsing: an operand, or the header that
/// opens a new trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Header(Trigger),
    Operand(Expression),
}

pub type ExprConstructor = fn(&str, SourcePosition) -> Result<Fragment, String>;

/// Maps token kinds to the constructor that folds their text.
#[derive(Clone)]
pub struct ExpressionMap {
    constructors: HashMap<Kind, ExprConstructor>,
}

impl Default for ExpressionMap {
    fn default() -> Self {
        let mut map = ExpressionMap {
            constructors: HashMap::new(),
        };
        map.set(Kind::Trigger, trigger_header);
        map.set(Kind::StringLiteral, string_literal);
        map.set(Kind::Number, number_literal);
        map.set(Kind::Variable, variable);
        map.set(Kind::ObjectVariable, variable);
        map.set(Kind::Table, table_variable);
        map
    }
}

impl ExpressionMap {
    pub fn set(&mut self, kind: Kind, constructor: ExprConstructor) -> Option<ExprConstructor> {
        self.constructors.insert(kind, constructor)
    }

    pub fn remove(&mut self, kind: Kind) -> Option<ExprConstructor> {
        self.constructors.remove(&kind)
    }

    pub fn get(&self, kind: Kind) -> Option<ExprConstructor> {
        self.constructors.get(&kind).copied()
    }
}

impl fmt::Debug for ExpressionMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

fn trigger_header(text: &str, position: SourcePosition) -> Result<Fragment, String> {
    let (category, id) = text
        .split_once(':')
        .ok_or_else(|| format!("Malformed trigger header '{}'", text))?;
    let category: i32 = category
        .trim()
        .parse()
        .map_err(|_| format!("Malformed trigger category '{}'", category))?;
    let category = TriggerCategory::try_from(category)
        .map_err(|_| format!("Unknown trigger category {}", category))?;
    let id: i32 = id
        .trim()
        .parse()
        .map_err(|_| format!("Malformed trigger id '{}'", id))?;
    Ok(Fragment::Header(Trigger::new(category, id, position)))
}

fn string_literal(text: &str, position: SourcePosition) -> Result<Fragment, String> {
    Ok(Fragment::Operand(Expression::string(text, position)))
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let text: String = text.chars().filter(|&c| c != ',').collect();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()? as f64,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

fn number_literal(text: &str, position: SourcePosition) -> Result<Fragment, String> {
    parse_number(text)
        .map(|n| Fragment::Operand(Expression::number(n, position)))
        .ok_or_else(|| format!("Malformed number '{}'", text))
}

fn variable(text: &str, position: SourcePosition) -> Result<Fragment, String> {
    Ok(Fragment::Operand(Expression::variable(text, position)))
}

fn table_variable(text: &str, position: SourcePosition) -> Result<Fragment, String> {
    let (name, indexer) = split_table(text);
    Ok(Fragment::Operand(Expression::table(name, indexer, position)))
}

/// Splits `%name[key]` into the name and an optional non-empty indexer.
pub(crate) fn split_table(text: &str) -> (&str, Option<String>) {
    match text.split_once('[') {
        Some((name, rest)) => {
            let indexer = rest.strip_suffix(']').unwrap_or(rest);
            let indexer = (!indexer.is_empty()).then(|| indexer.to_string());
            (name, indexer)
        }
        None => (text, None),
    }
}
