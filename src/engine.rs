use std::io::Read;

use crate::compiler::Compiler;
use crate::config::Options;
use crate::error::{Diagnostic, Error, Result};
use crate::expression::Expression;
use crate::lexer::Lexer;
use crate::page::Page;
use crate::parser::Parser;
use crate::source::SourceText;
use crate::trigger::{Script, Trigger};

/// Entry point for hosts: turns script text or compiled scripts into pages.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: Options,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn load_from_str(&self, text: &str) -> Result<Page> {
        let (script, diagnostics) = Parser::from_text(text, &self.options).parse();
        self.finish(script, diagnostics)
    }

    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<Page> {
        let source = SourceText::from_reader(reader)?;
        let (script, diagnostics) = Parser::new(Lexer::new(source, &self.options)).parse();
        self.finish(script, diagnostics)
    }

    /// Parses on the blocking thread pool.
    pub async fn load_from_str_async(&self, text: String) -> Result<Page> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.load_from_str(&text))
            .await
            .map_err(|err| Error::Interrupted(err.to_string()))?
    }

    /// Loads a script written by [`Page::compile_to`].
    pub fn load_compiled<R: Read>(&self, mut reader: R) -> Result<Page> {
        let script = Compiler::new(self.options.version).decompile_from(&mut reader)?;
        self.finish(script, Vec::new())
    }

    /// First trigger of `text` and its operands, if it has one.
    pub fn parse_trigger(&self, text: &str) -> Option<(Trigger, Vec<Expression>)> {
        let mut parser = Parser::from_text(text, &self.options);
        let trigger = parser.next()?;
        let contents = parser.arena().get(trigger.contents()).to_vec();
        Some((trigger, contents))
    }

    fn finish(&self, script: Script, diagnostics: Vec<Diagnostic>) -> Result<Page> {
        for diagnostic in &diagnostics {
            tracing::warn!("{}", diagnostic);
        }
        if script.is_empty() {
            return Err(Error::EmptyProgram);
        }
        tracing::debug!(
            "loaded {} triggers in {} blocks",
            script.trigger_count(),
            script.blocks().len()
        );
        Page::new(script, self.options.clone(), diagnostics)
    }
}
