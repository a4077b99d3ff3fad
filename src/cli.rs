// src/cli.rs

use crate::models::FlagValue;
use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// lflags: resolve layered arguments for another process.
///
/// Parameters are declared in a TOML file. TOKENS are resolved against them the same
/// way an embedding program would resolve its own arguments:
///
/// - `@file` tokens reference config files (YAML, JSON, TOML, binary mappings) or
///   argument files with further tokens.
/// - `--set KEY=VALUE` supplies caller defaults that outrank config files.
/// - Remaining `--name value` tokens outrank everything.
///
/// The resolved values are printed on stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML file with `[[param]]` declarations.
    #[arg(long, short = 'p', value_name = "FILE")]
    pub params: PathBuf,

    /// Caller default, parsed as a YAML scalar (`3` is an integer). Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Marker characters for file references. Defaults to `@`.
    #[arg(long = "marker", value_name = "CHAR")]
    pub markers: Vec<char>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Print the help text of the declared parameters instead of resolving.
    #[arg(long)]
    pub show_help: bool,

    /// Tokens to resolve.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

/// How resolved values are printed.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// A pretty-printed JSON object.
    Json,
    /// One `name=value` line per parameter.
    Lines,
}

/// Parses a `KEY=VALUE` override. The value is read as a YAML scalar so numbers and
/// booleans keep their type; anything YAML rejects is taken as a plain string.
pub fn parse_override(pair: &str) -> anyhow::Result<(String, FlagValue)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid override '{}': expected KEY=VALUE.", pair))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid override '{}': empty key.", pair));
    }
    let value = serde_yaml::from_str::<serde_yaml::Value>(raw)
        .map(FlagValue::from)
        .unwrap_or_else(|_| FlagValue::from(raw));
    Ok((key.to_string(), value))
}
