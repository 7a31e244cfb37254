use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config::Options;
use crate::expression::{ExprArena, ExprRange, ExprValue, Expression};
use crate::token::SourcePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum TriggerCategory {
    /// `(0:1) when someone says something,`
    Cause = 0,
    /// `(1:2) and they moved # units left,`
    Condition = 1,
    /// `(5:1) print {Hello World} to the console.`
    Effect = 5,
    /// `(6:0) while variable % is #,`
    Flow = 6,
}

impl TryFrom<i32> for TriggerCategory {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TriggerCategory::Cause),
            1 => Ok(TriggerCategory::Condition),
            5 => Ok(TriggerCategory::Effect),
            6 => Ok(TriggerCategory::Flow),
            other => Err(other),
        }
    }
}

/// Registry key of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub category: TriggerCategory,
    pub id: i32,
}

impl TriggerKey {
    pub const fn new(category: TriggerCategory, id: i32) -> Self {
        Self { category, id }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}:{})", self.category as i32, self.id)
    }
}

/// One instruction of a script.
///
/// Two triggers are equal when category and id match; contents and position
/// are ignored so any occurrence in a script maps to the same handler.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    category: TriggerCategory,
    id: i32,
    position: SourcePosition,
    contents: ExprRange,
}

impl Trigger {
    /// Stands in for "no trigger".
    pub const UNDEFINED: Trigger = Trigger {
        category: TriggerCategory::Cause,
        id: -1,
        position: SourcePosition::new(1, 1, 0),
        contents: ExprRange::EMPTY,
    };

    pub fn new(category: TriggerCategory, id: i32, position: SourcePosition) -> Self {
        Self {
            category,
            id,
            position,
            contents: ExprRange::EMPTY,
        }
    }

    pub fn with_contents(mut self, contents: ExprRange) -> Self {
        self.contents = contents;
        self
    }

    pub fn category(&self) -> TriggerCategory {
        self.category
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn key(&self) -> TriggerKey {
        TriggerKey::new(self.category, self.id)
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }

    pub fn contents(&self) -> ExprRange {
        self.contents
    }

    pub(crate) fn contents_mut(&mut self) -> &mut ExprRange {
        &mut self.contents
    }

    pub fn is_undefined(&self) -> bool {
        *self == Trigger::UNDEFINED
    }
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.id == other.id
    }
}

impl Eq for Trigger {}

impl Hash for Trigger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.key().fmt(f)
    }
}

/// Ordered group of triggers forming one statement and its nested bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerBlock {
    triggers: Vec<Trigger>,
}

impl TriggerBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triggers: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Trigger at `index`, or [`Trigger::UNDEFINED`] when out of range.
    pub fn get(&self, index: usize) -> Trigger {
        self.triggers
            .get(index)
            .copied()
            .unwrap_or(Trigger::UNDEFINED)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// First index at or after `start` whose trigger matches `category` and,
    /// when given, `id`.
    pub fn index_of(&self, category: TriggerCategory, id: Option<i32>, start: usize) -> Option<usize> {
        self.triggers
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, t)| matches(t, category, id))
            .map(|(i, _)| i)
    }

    pub fn last_index_of(
        &self,
        category: TriggerCategory,
        id: Option<i32>,
        start: usize,
    ) -> Option<usize> {
        self.triggers
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, t)| matches(t, category, id))
            .map(|(i, _)| i)
            .last()
    }

    pub fn contains_trigger(&self, category: TriggerCategory, id: Option<i32>, start: usize) -> bool {
        self.index_of(category, id, start).is_some()
    }

    /// Independent block of the triggers in `start..end`, clamped to this block.
    pub fn sub_block(&self, start: usize, end: usize) -> TriggerBlock {
        let end = end.min(self.triggers.len());
        let start = start.min(end);
        TriggerBlock {
            triggers: self.triggers[start..end].to_vec(),
        }
    }
}

fn matches(trigger: &Trigger, category: TriggerCategory, id: Option<i32>) -> bool {
    trigger.category == category && id.map_or(true, |id| trigger.id == id)
}

impl From<Vec<Trigger>> for TriggerBlock {
    fn from(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }
}

impl FromIterator<Trigger> for TriggerBlock {
    fn from_iter<I: IntoIterator<Item = Trigger>>(iter: I) -> Self {
        Self {
            triggers: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TriggerBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, trigger) in self.triggers.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", trigger)?;
        }
        Ok(())
    }
}

/// A parsed or decompiled program: its blocks and the arena holding every
/// trigger's operands.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub(crate) arena: ExprArena,
    pub(crate) blocks: Vec<TriggerBlock>,
}

impl Script {
    pub fn new(arena: ExprArena, blocks: Vec<TriggerBlock>) -> Self {
        Self { arena, blocks }
    }

    pub fn blocks(&self) -> &[TriggerBlock] {
        &self.blocks
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn contents(&self, trigger: &Trigger) -> &[Expression] {
        self.arena.get(trigger.contents)
    }

    pub fn trigger_count(&self) -> usize {
        self.blocks.iter().map(TriggerBlock::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.trigger_count() == 0
    }

    /// Renders a trigger back to script text.
    pub fn rebuild(&self, trigger: &Trigger, options: &Options, include_positions: bool) -> String {
        let mut out = trigger.to_string();
        if include_positions {
            out.push(' ');
            out.push_str(&trigger.position.to_string());
        }
        for expr in self.contents(trigger) {
            out.push(' ');
            match expr.value() {
                ExprValue::String(s) => {
                    out.push(options.string_begin_symbol);
                    out.push_str(s);
                    out.push(options.string_end_symbol);
                }
                _ => out.push_str(&expr.to_string()),
            }
            if include_positions {
                out.push(' ');
                out.push_str(&expr.position().to_string());
            }
        }
        out
    }

    /// Renders the whole program, one trigger per line, bodies indented.
    pub fn rebuild_all(&self, options: &Options) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            for trigger in block.iter() {
                if trigger.category != TriggerCategory::Cause {
                    out.push_str("    ");
                }
                out.push_str(&self.rebuild(trigger, options, false));
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}
