// src/core/declarations.rs

//! Parameter declarations read from a TOML file, for callers that are not Rust code.
//!
//! ```toml
//! [[param]]
//! name = "rate"
//! kind = "float"
//! default = 0.1
//! help = "Learning rate"
//! short = "r"
//! ```

use crate::models::{FlagValue, ParamKind, ParamSpec};
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

/// Failures while loading a declaration file.
#[derive(Error, Debug)]
pub enum DeclarationError {
    /// The file could not be read.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML or does not match the schema.
    #[error("Failed to parse declarations: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Short flag of '{name}' must be a single character, got '{short}'.")]
    InvalidShort {
        /// Parameter name.
        name: String,
        /// The rejected value.
        short: String,
    },
}

#[derive(Deserialize, Debug, Default)]
struct DeclarationFile {
    #[serde(default)]
    param: Vec<ParamEntry>,
}

#[derive(Deserialize, Debug)]
struct ParamEntry {
    name: String,
    #[serde(default)]
    kind: ParamKind,
    #[serde(default)]
    many: bool,
    default: Option<toml::Value>,
    help: Option<String>,
    short: Option<String>,
}

impl ParamEntry {
    fn into_spec(self) -> Result<ParamSpec, DeclarationError> {
        let mut spec = ParamSpec::new(self.name, self.kind);
        if let Some(default) = self.default {
            spec = spec.with_default(FlagValue::from(default));
        }
        if let Some(help) = self.help {
            spec = spec.help(help);
        }
        if let Some(short) = self.short {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => spec = spec.short(c),
                _ => {
                    return Err(DeclarationError::InvalidShort {
                        name: spec.name,
                        short,
                    });
                }
            }
        }
        if self.many {
            spec = spec.many();
        }
        Ok(spec)
    }
}

/// Parses declarations from TOML text, in file order.
pub fn parse_declarations(content: &str) -> Result<Vec<ParamSpec>, DeclarationError> {
    let file: DeclarationFile = toml::from_str(content)?;
    file.param.into_iter().map(ParamEntry::into_spec).collect()
}

/// Reads and parses a declaration file.
pub fn load_declarations(path: &Path) -> Result<Vec<ParamSpec>, DeclarationError> {
    log::debug!("Loading parameter declarations from '{}'", path.display());
    let content = fs::read_to_string(path)?;
    parse_declarations(&content)
}
