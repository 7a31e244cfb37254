use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{HandlerError, RegistryError};
use crate::page::Page;
use crate::reader::TriggerReader;
use crate::trigger::{Trigger, TriggerCategory, TriggerKey};

/// Code run for a trigger. `Ok(true)` means the trigger succeeded, which is
/// what drives Cause, Condition and Flow branching.
pub type TriggerHandler =
    Arc<dyn Fn(&mut TriggerReader<'_>) -> Result<bool, HandlerError> + Send + Sync>;

/// Lifecycle callback run with the page a library is installed on.
pub type LibraryHook = Arc<dyn Fn(&Page) + Send + Sync>;

#[derive(Clone)]
pub struct HandlerEntry {
    pub owner: String,
    pub handler: TriggerHandler,
    pub description: Option<String>,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("owner", &self.owner)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Named set of handlers a host installs into a page in one go.
#[derive(Clone)]
pub struct Library {
    name: String,
    handlers: BTreeMap<TriggerKey, (TriggerHandler, Option<String>)>,
    on_load: Option<LibraryHook>,
    on_unload: Option<LibraryHook>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: BTreeMap::new(),
            on_load: None,
            on_unload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Adds a handler, replacing any this library already had for the key.
    pub fn register<F>(
        &mut self,
        category: TriggerCategory,
        id: i32,
        handler: F,
        description: Option<&str>,
    ) -> &mut Self
    where
        F: Fn(&mut TriggerReader<'_>) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            TriggerKey::new(category, id),
            (Arc::new(handler), description.map(str::to_string)),
        );
        self
    }

    /// Runs once the library's handlers are installed on a page.
    pub fn on_load(&mut self, hook: impl Fn(&Page) + Send + Sync + 'static) -> &mut Self {
        self.on_load = Some(Arc::new(hook));
        self
    }

    /// Runs when the library is removed from a page or the page is dropped.
    pub fn on_unload(&mut self, hook: impl Fn(&Page) + Send + Sync + 'static) -> &mut Self {
        self.on_unload = Some(Arc::new(hook));
        self
    }

    pub(crate) fn load_hook(&self) -> Option<LibraryHook> {
        self.on_load.clone()
    }

    pub(crate) fn unload_hook(&self) -> Option<LibraryHook> {
        self.on_unload.clone()
    }

    pub fn contains(&self, category: TriggerCategory, id: i32) -> bool {
        self.handlers.contains_key(&TriggerKey::new(category, id))
    }

    pub fn keys(&self) -> impl Iterator<Item = TriggerKey> + '_ {
        self.handlers.keys().copied()
    }

    /// One line per handler, ordered by category then id.
    pub fn dump(&self) -> String {
        dump_lines(
            self.handlers
                .iter()
                .map(|(key, (_, description))| (*key, description.as_deref())),
        )
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handlers installed on a page, keyed by trigger and tagged with the
/// library that owns them. A key belongs to one library at a time.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    entries: BTreeMap<TriggerKey, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_owner(&self, key: TriggerKey, owner: &str) -> Result<(), RegistryError> {
        match self.entries.get(&key) {
            Some(entry) if entry.owner != owner => Err(RegistryError::KeyOwned {
                key,
                owner: entry.owner.clone(),
                requester: owner.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn register(
        &mut self,
        owner: &str,
        key: TriggerKey,
        handler: TriggerHandler,
        description: Option<String>,
    ) -> Result<(), RegistryError> {
        self.check_owner(key, owner)?;
        self.entries.insert(
            key,
            HandlerEntry {
                owner: owner.to_string(),
                handler,
                description,
            },
        );
        Ok(())
    }

    /// Installs every handler of `library`, or none if any key is owned by
    /// another library.
    pub fn add_library(&mut self, library: &Library) -> Result<(), RegistryError> {
        for key in library.keys() {
            self.check_owner(key, library.name())?;
        }
        for (key, (handler, description)) in &library.handlers {
            self.entries.insert(
                *key,
                HandlerEntry {
                    owner: library.name().to_string(),
                    handler: Arc::clone(handler),
                    description: description.clone(),
                },
            );
        }
        tracing::debug!("loaded library '{}' ({} handlers)", library.name(), library.len());
        Ok(())
    }

    /// Drops every key owned by `owner`, returning how many were removed.
    pub fn remove_library(&mut self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.owner != owner);
        before - self.entries.len()
    }

    pub fn contains(&self, key: TriggerKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: TriggerKey) -> Option<&HandlerEntry> {
        self.entries.get(&key)
    }

    /// Human-readable line for a trigger's handler, used in error reports.
    pub fn describe(&self, trigger: &Trigger) -> String {
        match self.entries.get(&trigger.key()) {
            Some(entry) => format!(
                "{} {} [{}]",
                trigger,
                entry.description.as_deref().unwrap_or("<no description>"),
                entry.owner
            ),
            None => format!("{} <unhandled>", trigger),
        }
    }

    pub fn dump(&self) -> String {
        dump_lines(
            self.entries
                .iter()
                .map(|(key, entry)| (*key, entry.description.as_deref())),
        )
    }
}

fn dump_lines<'a>(entries: impl Iterator<Item = (TriggerKey, Option<&'a str>)>) -> String {
    let mut out = String::new();
    for (key, description) in entries {
        out.push_str(&key.to_string());
        if let Some(description) = description {
            out.push(' ');
            out.push_str(description);
        }
        out.push('\n');
    }
    out
}
