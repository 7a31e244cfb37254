//! Trigger-based scripting engine.
//!
//! Scripts are sequences of `(category:id)` triggers with operands. Text is
//! lexed and parsed into a [`Script`], handlers are registered on a [`Page`],
//! and the page runs each Cause-delimited block through the category state
//! machine. Scripts can be compiled to and loaded from a compact binary form.

pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expression;
pub mod lexer;
pub mod library;
pub mod page;
pub mod parser;
pub mod reader;
pub mod source;
pub mod token;
pub mod trigger;
pub mod variable;

pub use compiler::Compiler;
pub use config::{Options, Version};
pub use engine::Engine;
pub use error::{
    Diagnostic, Error, ExecutionError, HandlerError, LexingError, RegistryError, SyntaxError,
    VariableError,
};
pub use expression::{ExprValue, Expression};
pub use lexer::Lexer;
pub use library::{HandlerRegistry, Library, LibraryHook, TriggerHandler};
pub use page::{Page, RunReport};
pub use parser::Parser;
pub use reader::TriggerReader;
pub use token::{Kind, SourcePosition, Token};
pub use trigger::{Script, Trigger, TriggerBlock, TriggerCategory, TriggerKey};
pub use variable::{Scope, Value, Variable};

#[cfg(test)]
mod compiler_tests;
#[cfg(test)]
mod execution_tests;
