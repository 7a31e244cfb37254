use std::collections::BTreeMap;
use std::io::Write;
use std::mem;
use std::sync::Arc;

use regex::Regex;

use crate::compiler::Compiler;
use crate::config::Options;
use crate::error::{Diagnostic, Error, ExecutionError, HandlerError, VariableError};
use crate::execution::ExecutionContext;
use crate::library::{HandlerRegistry, Library, LibraryHook};
use crate::reader::{interpolation_pattern, TriggerReader};
use crate::trigger::{Script, TriggerBlock, TriggerCategory, TriggerKey};
use crate::variable::{Scope, Value, Variable};

/// Owner name for handlers added straight onto a page.
pub const PAGE_OWNER: &str = "page";

/// Called once per failed block with the error and a description of the
/// handler that was running.
pub type ErrorCallback = Arc<dyn Fn(&ExecutionError, &str) + Send + Sync>;

/// Outcome of running a page.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Blocks that were started.
    pub blocks: usize,
    pub errors: Vec<ExecutionError>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A loaded program together with its handlers and variables.
pub struct Page {
    options: Options,
    script: Script,
    diagnostics: Vec<Diagnostic>,
    registry: HandlerRegistry,
    scope: Scope,
    interpolation: Regex,
    on_error: Option<ErrorCallback>,
    unload_hooks: BTreeMap<String, LibraryHook>,
}

impl Page {
    pub(crate) fn new(script: Script, options: Options, diagnostics: Vec<Diagnostic>) -> Result<Self, Error> {
        let interpolation = interpolation_pattern(options.variable_declaration_symbol)?;
        Ok(Self {
            options,
            script,
            diagnostics,
            registry: HandlerRegistry::new(),
            scope: Scope::new(),
            interpolation,
            on_error: None,
            unload_hooks: BTreeMap::new(),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn blocks(&self) -> &[TriggerBlock] {
        self.script.blocks()
    }

    /// Number of triggers in the program.
    pub fn size(&self) -> usize {
        self.script.trigger_count()
    }

    /// Problems reported while the script text was read.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Installs every handler of `library`, then runs its load hook.
    pub fn load_library(&mut self, library: &Library) -> Result<(), Error> {
        self.registry.add_library(library)?;
        if let Some(hook) = library.unload_hook() {
            self.unload_hooks.insert(library.name().to_string(), hook);
        }
        if let Some(hook) = library.load_hook() {
            hook(&*self);
        }
        tracing::debug!("loaded library '{}' ({} handlers)", library.name(), library.len());
        Ok(())
    }

    /// Runs the library's unload hook, then drops its handlers. Returns how
    /// many handlers were removed.
    pub fn remove_library(&mut self, name: &str) -> usize {
        if let Some(hook) = self.unload_hooks.remove(name) {
            hook(&*self);
        }
        self.registry.remove_library(name)
    }

    pub fn add_handler<F>(
        &mut self,
        category: TriggerCategory,
        id: i32,
        handler: F,
        description: Option<&str>,
    ) -> Result<(), Error>
    where
        F: Fn(&mut TriggerReader<'_>) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(
            PAGE_OWNER,
            TriggerKey::new(category, id),
            Arc::new(handler),
            description.map(str::to_string),
        )?;
        Ok(())
    }

    pub fn contains_handler(&self, category: TriggerCategory, id: i32) -> bool {
        self.registry.contains(TriggerKey::new(category, id))
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn handlers_dump(&self) -> String {
        self.registry.dump()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.scope.get(name)
    }

    pub fn set_variable(&self, name: &str, value: impl Into<Value>) -> Result<(), VariableError> {
        self.scope.set(name, value.into())
    }

    pub fn install_constant(&self, name: &str, value: impl Into<Value>) {
        self.scope.install_constant(name, value.into());
    }

    pub fn on_error(&mut self, callback: impl Fn(&ExecutionError, &str) + Send + Sync + 'static) {
        self.on_error = Some(Arc::new(callback));
    }

    pub fn compile_to<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        Compiler::new(self.options.version).compile_to(&self.script, writer)
    }

    /// Runs every block in order.
    pub fn execute(&self, args: &[Value]) -> RunReport {
        self.execute_blocks(0, args)
    }

    /// Runs every block, each starting at trigger index `start`.
    pub fn execute_from(&self, start: usize, args: &[Value]) -> RunReport {
        self.execute_blocks(start, args)
    }

    fn execute_blocks(&self, start: usize, args: &[Value]) -> RunReport {
        let mut report = RunReport::default();
        for index in 0..self.blocks().len() {
            report.blocks += 1;
            if let Err(err) = self.run_block(index, start, args) {
                self.report(&err);
                report.errors.push(err);
            }
        }
        report
    }

    /// Runs every block on the blocking thread pool, one after another.
    pub async fn execute_async(self: Arc<Self>, args: Vec<Value>) -> RunReport {
        self.execute_from_async(0, args).await
    }

    /// Async form of [`Page::execute_from`].
    pub async fn execute_from_async(self: Arc<Self>, start: usize, args: Vec<Value>) -> RunReport {
        let args: Arc<[Value]> = args.into();
        let mut report = RunReport::default();
        for index in 0..self.blocks().len() {
            report.blocks += 1;
            let page = Arc::clone(&self);
            let block_args = Arc::clone(&args);
            let result = tokio::task::spawn_blocking(move || page.run_block(index, start, &block_args))
                .await
                .unwrap_or_else(|err| Err(ExecutionError::Interrupted(err.to_string())));
            if let Err(err) = result {
                self.report(&err);
                report.errors.push(err);
            }
        }
        report
    }

    fn run_block(&self, index: usize, start: usize, args: &[Value]) -> Result<(), ExecutionError> {
        let Some(block) = self.script.blocks().get(index) else {
            return Ok(());
        };
        ExecutionContext::new(
            &self.registry,
            &self.scope,
            self.script.arena(),
            &self.interpolation,
            args,
        )
        .with_limits(self.options.trigger_limit, self.options.loop_limit)
        .with_block_index(index)
        .run_from(block, start)
    }

    fn report(&self, err: &ExecutionError) {
        let description = self.registry.describe(&err.trigger());
        tracing::error!("{} ({})", err, description);
        if let Some(callback) = &self.on_error {
            callback(err, &description);
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        for (_, hook) in mem::take(&mut self.unload_hooks) {
            hook(&*self);
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("size", &self.size())
            .field("blocks", &self.blocks().len())
            .field("handlers", &self.registry.len())
            .field("variables", &self.scope.len())
            .finish()
    }
}
