use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use regex::Regex;

use crate::error::ExecutionError;
use crate::expression::ExprArena;
use crate::library::HandlerRegistry;
use crate::reader::TriggerReader;
use crate::trigger::{Trigger, TriggerBlock, TriggerCategory};
use crate::variable::{Scope, Value};

/// Where the state machine goes after one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue(usize),
    /// Nothing more to run in the current block or loop body.
    ExitBlock,
    /// A handler asked to leave the loop whose body is running.
    ExitEnclosingLoop,
}

/// Runs one top-level block against a page's handlers and scope.
///
/// Trigger fuel is shared by the block and every loop body it enters, so a
/// run invokes at most `trigger_limit` handlers.
pub struct ExecutionContext<'a> {
    registry: &'a HandlerRegistry,
    scope: &'a Scope,
    arena: &'a ExprArena,
    interpolation: &'a Regex,
    parameters: &'a [Value],
    block_index: usize,
    trigger_limit: u32,
    loop_limit: u32,
    fuel_used: u32,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        registry: &'a HandlerRegistry,
        scope: &'a Scope,
        arena: &'a ExprArena,
        interpolation: &'a Regex,
        parameters: &'a [Value],
    ) -> Self {
        Self {
            registry,
            scope,
            arena,
            interpolation,
            parameters,
            block_index: 0,
            trigger_limit: u32::MAX,
            loop_limit: u32::MAX,
            fuel_used: 0,
        }
    }

    pub fn with_limits(mut self, trigger_limit: u32, loop_limit: u32) -> Self {
        self.trigger_limit = trigger_limit;
        self.loop_limit = loop_limit;
        self
    }

    pub fn with_block_index(mut self, block_index: usize) -> Self {
        self.block_index = block_index;
        self
    }

    /// Handler invocations so far.
    pub fn fuel_used(&self) -> u32 {
        self.fuel_used
    }

    pub fn run(&mut self, block: &TriggerBlock) -> Result<(), ExecutionError> {
        self.run_from(block, 0)
    }

    pub fn run_from(&mut self, block: &TriggerBlock, start: usize) -> Result<(), ExecutionError> {
        // leaving a loop at top level just ends the block
        self.run_block(block, start).map(|_| ())
    }

    fn run_block(&mut self, block: &TriggerBlock, start: usize) -> Result<ControlSignal, ExecutionError> {
        let mut iterations: HashMap<usize, u32> = HashMap::new();
        let mut index = start;
        while index < block.len() {
            match self.step(block, index, &mut iterations)? {
                ControlSignal::Continue(next) => index = next,
                signal => return Ok(signal),
            }
        }
        Ok(ControlSignal::ExitBlock)
    }

    fn step(
        &mut self,
        block: &TriggerBlock,
        index: usize,
        iterations: &mut HashMap<usize, u32>,
    ) -> Result<ControlSignal, ExecutionError> {
        let current = block.get(index);
        let iteration = iterations.get(&index).copied().unwrap_or(0);
        let (passed, exit_loop) = self.invoke(current, iteration)?;
        if exit_loop {
            return Ok(ControlSignal::ExitEnclosingLoop);
        }

        let signal = match current.category() {
            TriggerCategory::Cause if passed => {
                let mut next = index + 1;
                while next < block.len() && block.get(next).category() == TriggerCategory::Cause {
                    next += 1;
                }
                ControlSignal::Continue(next)
            }
            TriggerCategory::Cause => jump(block.index_of(TriggerCategory::Cause, None, index + 1)),
            TriggerCategory::Condition if passed => ControlSignal::Continue(index + 1),
            TriggerCategory::Condition => jump(next_condition_chain(block, index + 1)),
            TriggerCategory::Effect => ControlSignal::Continue(index + 1),
            TriggerCategory::Flow if passed => {
                if iteration >= self.loop_limit {
                    return Err(ExecutionError::LoopLimitExceeded {
                        trigger: current,
                        limit: self.loop_limit,
                    });
                }
                let next_flow = block.index_of(TriggerCategory::Flow, None, index + 1);
                let body = block.sub_block(index + 1, next_flow.unwrap_or(block.len()));
                if self.run_block(&body, 0)? == ControlSignal::ExitEnclosingLoop {
                    iterations.remove(&index);
                    return Ok(jump(next_flow));
                }
                iterations.insert(index, iteration + 1);
                // re-evaluate the loop trigger
                ControlSignal::Continue(index)
            }
            TriggerCategory::Flow => {
                iterations.remove(&index);
                jump(block.index_of(TriggerCategory::Flow, None, index + 1))
            }
        };
        Ok(signal)
    }

    /// Runs the handler for `trigger`, returning its result and whether it
    /// asked to leave the enclosing loop.
    fn invoke(&mut self, trigger: Trigger, iteration: u32) -> Result<(bool, bool), ExecutionError> {
        let registry = self.registry;
        let entry = registry
            .get(trigger.key())
            .ok_or(ExecutionError::HandlerNotFound { trigger })?;
        if self.fuel_used >= self.trigger_limit {
            return Err(ExecutionError::TriggerLimitExceeded {
                trigger,
                limit: self.trigger_limit,
            });
        }
        self.fuel_used += 1;

        let mut reader = TriggerReader::new(
            trigger,
            self.arena.get(trigger.contents()),
            self.scope,
            self.parameters,
            self.interpolation,
        )
        .at(self.block_index, iteration);
        let handler = &entry.handler;
        let passed = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut reader)))
            .map_err(|payload| ExecutionError::HandlerPanicked {
                trigger,
                message: panic_message(payload.as_ref()),
            })?
            .map_err(|source| ExecutionError::Handler { trigger, source })?;
        tracing::debug!("{} returned {}", registry.describe(&trigger), passed);
        Ok((passed, reader.exit_requested()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn jump(target: Option<usize>) -> ControlSignal {
    target.map_or(ControlSignal::ExitBlock, ControlSignal::Continue)
}

/// First Condition at or after `start` that opens a new chain, i.e. is not
/// directly preceded by another Condition.
fn next_condition_chain(block: &TriggerBlock, start: usize) -> Option<usize> {
    (start.max(1)..block.len()).find(|&i| {
        block.get(i).category() == TriggerCategory::Condition
            && block.get(i - 1).category() != TriggerCategory::Condition
    })
}
