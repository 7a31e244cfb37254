use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Compiled script format version written by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
}

impl Version {
    pub const fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(7, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Engine options: script symbols, safety limits and the compiler version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub variable_declaration_symbol: char,
    pub string_begin_symbol: char,
    pub string_end_symbol: char,
    pub line_comment_symbol: char,
    pub string_length_limit: usize,
    /// Maximum handler invocations in one block run.
    pub trigger_limit: u32,
    /// Maximum times one loop body may run.
    pub loop_limit: u32,
    pub version: Version,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            variable_declaration_symbol: '%',
            string_begin_symbol: '{',
            string_end_symbol: '}',
            line_comment_symbol: '*',
            string_length_limit: i16::MAX as usize,
            trigger_limit: 6000,
            loop_limit: 1000,
            version: Version::default(),
        }
    }
}

impl Options {
    /// Loads options from the config file, falling back to defaults when it
    /// does not exist.
    pub fn load() -> Result<Self, Error> {
        let config_path = Self::get_config_path();
        if !config_path.exists() {
            return Ok(Options::default());
        }
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self) -> Result<(), Error> {
        self.save_to(&Self::get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// `$TRIGSCRIPT_CONFIG`, or `config.json` under `~/.trigscript`.
    pub fn get_config_path() -> PathBuf {
        if let Ok(custom_path) = env::var("TRIGSCRIPT_CONFIG") {
            return PathBuf::from(custom_path);
        }
        let home = if cfg!(windows) {
            env::var("USERPROFILE")
        } else {
            env::var("HOME")
        };
        PathBuf::from(home.unwrap_or_else(|_| String::from(".")))
            .join(".trigscript")
            .join("config.json")
    }
}
