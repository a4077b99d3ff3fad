// src/core/resolver.rs

//! # Flags
//!
//! The layered argument resolver. A resolution merges, from weakest to strongest:
//!
//! 1. the declared defaults,
//! 2. the config-file data collected from `@file` references (accumulated across
//!    resolutions, later files win),
//! 3. caller-supplied overrides (a namespace or a mapping),
//! 4. the remaining command-line tokens.
//!
//! Layers replace values wholesale; nothing is merged partially. The result is cached and
//! served by [`Flags::get`], which resolves lazily on first use.

use crate::constants::{DEFAULT_INTERACTIVE_MARKERS, DEFAULT_MARKER, DEFAULT_PROGRAM_NAME};
use crate::core::expander::{ExpandError, Expander};
use crate::core::parser;
use crate::models::{ConfigMap, FlagValue, Namespace, Overrides, ParamSpec};
use serde::de::DeserializeOwned;
use std::env;
use thiserror::Error;

pub use crate::core::expander::LineSplit;

/// Errors raised by [`Flags`].
#[derive(Error, Debug)]
pub enum FlagsError {
    /// The name is neither declared nor present in any resolved layer.
    #[error("Unknown parameter '{name}'.")]
    UnknownParameter {
        /// The requested name.
        name: String,
    },
    /// Overrides that are neither a namespace nor a mapping.
    #[error("Overrides must be either a namespace or a mapping, not '{type_name}'.")]
    InvalidOverrides {
        /// Name of the rejected shape.
        type_name: String,
    },
    /// A file reference could not be expanded.
    #[error(transparent)]
    Expand(#[from] ExpandError),
    /// The tokens do not match the declarations. Also carries clap's help display.
    #[error("{0}")]
    Parse(#[from] clap::Error),
    /// The resolved values do not fit the requested type.
    #[error("Cannot convert resolved arguments: {0}")]
    Extract(#[from] serde_json::Error),
}

type FlagsResult<T> = Result<T, FlagsError>;

/// Construction options for [`Flags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagsOptions {
    /// Characters that mark a token as a file reference.
    pub marker_chars: Vec<char>,
    /// Name used in rendered help and parse errors.
    pub program_name: String,
    /// How token files are split into tokens.
    pub line_split: LineSplit,
    /// Substrings of the invocation arguments that reveal an interactive notebook host.
    pub interactive_markers: Vec<String>,
}

impl Default for FlagsOptions {
    fn default() -> Self {
        Self {
            marker_chars: vec![DEFAULT_MARKER],
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
            line_split: LineSplit::default(),
            interactive_markers: DEFAULT_INTERACTIVE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

impl FlagsOptions {
    /// Replaces the file-reference markers.
    pub fn with_markers(mut self, markers: impl IntoIterator<Item = char>) -> Self {
        self.marker_chars = markers.into_iter().collect();
        self
    }

    /// Sets the program name.
    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    /// Sets how token files are split.
    pub fn with_line_split(mut self, line_split: LineSplit) -> Self {
        self.line_split = line_split;
        self
    }
}

/// The layered argument resolver.
#[derive(Debug)]
pub struct Flags {
    options: FlagsOptions,
    /// Declaration order is kept for help output.
    params: Vec<ParamSpec>,
    config_file_data: ConfigMap,
    resolved: Option<Namespace>,
    /// Values written with `set`. They shadow the resolved values on `get`.
    attributes: ConfigMap,
    invocation: Vec<String>,
    resolutions: usize,
}

impl Flags {
    /// Creates a resolver that falls back to this process's arguments.
    pub fn new(options: FlagsOptions) -> Self {
        Self::with_invocation(options, env::args().skip(1))
    }

    /// Creates a resolver with an explicit invocation argument list (program name excluded).
    pub fn with_invocation(
        options: FlagsOptions,
        invocation: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            options,
            params: Vec::new(),
            config_file_data: ConfigMap::new(),
            resolved: None,
            attributes: ConfigMap::new(),
            invocation: invocation.into_iter().collect(),
            resolutions: 0,
        }
    }

    /// The options this resolver was built with.
    pub fn options(&self) -> &FlagsOptions {
        &self.options
    }

    // --- DECLARATIONS ---

    /// Registers a parameter. Declaring an existing name replaces the earlier declaration.
    pub fn declare(&mut self, spec: ParamSpec) -> &mut Self {
        if self.resolved.is_some() {
            log::warn!(
                "Parameter '{}' declared after resolution; it applies from the next resolve.",
                spec.name
            );
        }
        match self.params.iter_mut().find(|p| p.name == spec.name) {
            Some(existing) => {
                log::debug!("Redeclaring parameter '{}'", spec.name);
                *existing = spec;
            }
            None => self.params.push(spec),
        }
        self
    }

    /// Declarations in declaration order.
    pub fn declared(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Help text for the declared parameters.
    pub fn render_help(&self) -> String {
        parser::build_command(&self.options.program_name, &self.params)
            .render_help()
            .to_string()
    }

    // --- RESOLUTION ---

    /// Whether the invocation arguments reveal an interactive notebook host.
    pub fn is_interactive_host(&self) -> bool {
        self.invocation.iter().any(|arg| {
            let arg = arg.to_lowercase();
            self.options
                .interactive_markers
                .iter()
                .any(|marker| arg.contains(&marker.to_lowercase()))
        })
    }

    /// Resolves all layers and caches the result.
    ///
    /// `tokens` defaults to the invocation arguments, or to nothing under an interactive
    /// host. Overrides become the new defaults of their parameters: command-line tokens
    /// still win over them.
    ///
    /// On error nothing is cached and the config-file data collected so far is discarded,
    /// leaving the previous state authoritative.
    ///
    /// # Errors
    /// - [`FlagsError::InvalidOverrides`] before anything is read.
    /// - [`FlagsError::Expand`] when a referenced file cannot be expanded.
    /// - [`FlagsError::Parse`] when the tokens do not match the declarations.
    pub fn resolve(
        &mut self,
        tokens: Option<Vec<String>>,
        overrides: Option<Overrides>,
    ) -> FlagsResult<&Namespace> {
        let override_layer = match overrides {
            Some(overrides) => overrides
                .into_layer()
                .map_err(|type_name| FlagsError::InvalidOverrides { type_name })?,
            None => ConfigMap::new(),
        };

        let tokens = match tokens {
            Some(tokens) => tokens,
            None if self.is_interactive_host() => {
                log::debug!("Interactive host detected; ignoring invocation arguments.");
                Vec::new()
            }
            None => self.invocation.clone(),
        };

        // Work on a copy so a failed resolution leaves the accumulated data untouched.
        let mut file_data = self.config_file_data.clone();
        let expander = Expander::new(&self.options.marker_chars, self.options.line_split);
        let remaining = expander.expand(tokens, &mut file_data)?;

        let mut values: ConfigMap = self
            .params
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();
        values.extend(file_data.clone());
        values.extend(override_layer);

        let command = parser::build_command(&self.options.program_name, &self.params);
        let command_line = parser::parse_tokens(command, &self.params, &remaining)?;
        values.extend(command_line);

        self.config_file_data = file_data;
        self.resolutions += 1;
        log::debug!(
            "Resolution #{} produced {} values",
            self.resolutions,
            values.len()
        );
        let resolved: &Namespace = self.resolved.insert(Namespace::from(values));
        Ok(resolved)
    }

    /// Resolves with the invocation arguments unless a result is already cached.
    pub fn ensure_resolved(&mut self) -> FlagsResult<&Namespace> {
        if self.resolved.is_none() {
            self.resolve(None, None)?;
        }
        let resolved: &Namespace = self.resolved.get_or_insert_with(Namespace::new);
        Ok(resolved)
    }

    /// Whether a resolution is cached.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// How many resolutions have completed.
    pub fn resolution_count(&self) -> usize {
        self.resolutions
    }

    /// The config-file layer accumulated so far.
    pub fn config_file_data(&self) -> &ConfigMap {
        &self.config_file_data
    }

    // --- ACCESS ---

    /// Returns the value of `name`, resolving first if nothing is cached yet.
    ///
    /// A value written with [`Flags::set`] is returned as is, without resolving.
    ///
    /// # Errors
    /// [`FlagsError::UnknownParameter`] if `name` is in no layer, or any resolution error.
    pub fn get(&mut self, name: &str) -> FlagsResult<FlagValue> {
        if let Some(value) = self.attributes.get(name) {
            return Ok(value.clone());
        }
        self.ensure_resolved()?
            .get(name)
            .cloned()
            .ok_or_else(|| FlagsError::UnknownParameter {
                name: name.to_string(),
            })
    }

    /// Writes `value` under `name`. If a resolution is cached and contains `name`, the
    /// cached value is updated as well. Returns whether the cache was updated.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> bool {
        let name = name.into();
        let value = value.into();
        let propagated = match self.resolved.as_mut().and_then(|ns| ns.get_mut(&name)) {
            Some(slot) => {
                *slot = value.clone();
                true
            }
            None => false,
        };
        self.attributes.insert(name, value);
        propagated
    }

    /// A copy of all resolved pairs, resolving first if needed.
    pub fn as_mapping(&mut self) -> FlagsResult<ConfigMap> {
        Ok(self.ensure_resolved()?.as_map().clone())
    }

    /// Deserializes the resolved arguments into `T`.
    ///
    /// # Errors
    /// Any resolution error, or [`FlagsError::Extract`] if the values do not fit `T`.
    pub fn extract<T: DeserializeOwned>(&mut self) -> FlagsResult<T> {
        let json = self.ensure_resolved()?.to_json();
        Ok(serde_json::from_value(json)?)
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decoders::encode_binary_mapping;
    use crate::models::ParamKind;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn to_tokens(params: &[&str]) -> Vec<String> {
        params.iter().map(|s| s.to_string()).collect()
    }

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn reference(file: &NamedTempFile) -> String {
        format!("@{}", file.path().display())
    }

    /// A resolver whose invocation arguments are empty.
    fn flags() -> Flags {
        Flags::with_invocation(FlagsOptions::default(), Vec::new())
    }

    fn rate_flags() -> Flags {
        let mut flags = flags();
        flags.declare(ParamSpec::new("rate", ParamKind::Float).with_default(0.1));
        flags
    }

    fn mode_flags() -> Flags {
        let mut flags = flags();
        flags.declare(ParamSpec::new("mode", ParamKind::Str).with_default("train"));
        flags
    }

    // --- Precedence ---

    #[test]
    fn test_declared_default_when_nothing_else() {
        let mut flags = rate_flags();
        flags.resolve(Some(vec![]), None).unwrap();
        assert_eq!(flags.get("rate").unwrap(), FlagValue::Float(0.1));
    }

    #[test]
    fn test_config_file_then_command_line() {
        let cfg = write_file("rate: 0.5\n");
        let mut flags = rate_flags();

        let resolved = flags.resolve(Some(vec![reference(&cfg)]), None).unwrap();
        assert_eq!(resolved.get("rate"), Some(&FlagValue::Float(0.5)));

        let resolved = flags
            .resolve(
                Some(vec![reference(&cfg), "--rate".to_string(), "0.9".to_string()]),
                None,
            )
            .unwrap();
        assert_eq!(resolved.get("rate"), Some(&FlagValue::Float(0.9)));
    }

    #[test]
    fn test_overrides_then_command_line() {
        let mut flags = mode_flags();

        let resolved = flags
            .resolve(Some(vec![]), Some(Overrides::mapping([("mode", "eval")])))
            .unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("eval")));

        let resolved = flags
            .resolve(
                Some(to_tokens(&["--mode", "test"])),
                Some(Overrides::mapping([("mode", "eval")])),
            )
            .unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("test")));
    }

    #[test]
    fn test_precedence_law_over_all_layer_combinations() {
        for mask in 0u8..8 {
            let (has_file, has_override, has_cli) = (mask & 1 != 0, mask & 2 != 0, mask & 4 != 0);
            let cfg = write_file("k: file\n");
            let mut flags = flags();
            flags.declare(ParamSpec::new("k", ParamKind::Str).with_default("declared"));

            let mut tokens = Vec::new();
            if has_file {
                tokens.push(reference(&cfg));
            }
            if has_cli {
                tokens.extend(to_tokens(&["--k", "cli"]));
            }
            let overrides = has_override.then(|| Overrides::mapping([("k", "override")]));

            let resolved = flags.resolve(Some(tokens), overrides).unwrap();
            let expected = if has_cli {
                "cli"
            } else if has_override {
                "override"
            } else if has_file {
                "file"
            } else {
                "declared"
            };
            assert_eq!(
                resolved.get("k"),
                Some(&FlagValue::from(expected)),
                "mask {mask:03b}"
            );
        }
    }

    #[test]
    fn test_later_file_wins_in_file_layer() {
        let a = write_file("k: from_a\n");
        let b = write_file("k: from_b\n");
        let mut flags = flags();
        flags.declare(ParamSpec::new("k", ParamKind::Str));
        flags
            .resolve(Some(vec![reference(&a), reference(&b)]), None)
            .unwrap();
        assert_eq!(
            flags.config_file_data().get("k"),
            Some(&FlagValue::from("from_b"))
        );
        assert_eq!(flags.get("k").unwrap(), FlagValue::from("from_b"));
    }

    #[test]
    fn test_file_data_accumulates_across_resolutions() {
        let first = write_file("rate: 0.5\n");
        let mut flags = rate_flags();
        flags.resolve(Some(vec![reference(&first)]), None).unwrap();

        let resolved = flags.resolve(Some(vec![]), None).unwrap();
        assert_eq!(resolved.get("rate"), Some(&FlagValue::Float(0.5)));
    }

    #[test]
    fn test_token_file_and_binary_mapping() {
        let mut map = ConfigMap::new();
        map.insert("mode".to_string(), FlagValue::from("binary"));
        let mut binary = NamedTempFile::new().unwrap();
        binary.write_all(&encode_binary_mapping(&map).unwrap()).unwrap();
        binary.flush().unwrap();
        let args = write_file("--rate 0.75\n");

        let mut flags = rate_flags();
        flags.declare(ParamSpec::new("mode", ParamKind::Str));
        let resolved = flags
            .resolve(Some(vec![reference(&binary), reference(&args)]), None)
            .unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("binary")));
        assert_eq!(resolved.get("rate"), Some(&FlagValue::Float(0.75)));
    }

    #[test]
    fn test_equals_style_token_file_is_spliced() {
        let args = write_file("--steps=12\n--rate=0.5\n");
        let mut flags = rate_flags();
        flags.declare(ParamSpec::new("steps", ParamKind::Int).with_default(1));

        let resolved = flags.resolve(Some(vec![reference(&args)]), None).unwrap();
        assert_eq!(resolved.get("steps"), Some(&FlagValue::Int(12)));
        assert_eq!(resolved.get("rate"), Some(&FlagValue::Float(0.5)));
        assert!(flags.config_file_data().is_empty());
    }

    #[test]
    fn test_undeclared_file_keys_are_kept() {
        let cfg = write_file("extra: 42\n");
        let mut flags = rate_flags();
        flags.resolve(Some(vec![reference(&cfg)]), None).unwrap();
        assert_eq!(flags.get("extra").unwrap(), FlagValue::Int(42));
    }

    // --- Overrides ---

    #[derive(serde::Serialize)]
    struct Defaults {
        mode: &'static str,
    }

    #[test]
    fn test_namespace_overrides() {
        let mut flags = mode_flags();
        let resolved = flags
            .resolve(
                Some(vec![]),
                Some(Overrides::from_serialize(&Defaults { mode: "eval" })),
            )
            .unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("eval")));

        let mut previous = Namespace::new();
        previous.insert("mode", "replay");
        let resolved = flags
            .resolve(Some(vec![]), Some(Overrides::from(previous)))
            .unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("replay")));
    }

    #[test]
    fn test_hashmap_overrides() {
        let mut map = HashMap::new();
        map.insert("mode", "eval");
        let mut flags = mode_flags();
        let resolved = flags.resolve(Some(vec![]), Some(map.into())).unwrap();
        assert_eq!(resolved.get("mode"), Some(&FlagValue::from("eval")));
    }

    #[test]
    fn test_empty_overrides_equal_none() {
        let mut flags = mode_flags();
        let with_empty = flags
            .resolve(Some(vec![]), Some(Overrides::Mapping(ConfigMap::new())))
            .unwrap()
            .clone();
        let without = flags.resolve(Some(vec![]), None).unwrap().clone();
        assert_eq!(with_empty, without);
    }

    #[test]
    fn test_invalid_overrides_fail_before_reading_files() {
        let mut flags = mode_flags();
        let result = flags.resolve(
            Some(to_tokens(&["@/no/such/file"])),
            Some(Overrides::from_serialize(&[1, 2, 3])),
        );
        assert!(matches!(result, Err(FlagsError::InvalidOverrides { .. })));
        assert!(!flags.is_resolved());
    }

    // --- Laziness and caching ---

    #[test]
    fn test_lazy_get_resolves_once() {
        let mut flags = Flags::with_invocation(FlagsOptions::default(), to_tokens(&["--rate", "0.3"]));
        flags.declare(ParamSpec::new("rate", ParamKind::Float).with_default(0.1));
        assert!(!flags.is_resolved());

        let first = flags.get("rate").unwrap();
        let second = flags.get("rate").unwrap();
        assert_eq!(first, FlagValue::Float(0.3));
        assert_eq!(first, second);
        assert_eq!(flags.resolution_count(), 1);
    }

    #[test]
    fn test_interactive_host_ignores_invocation() {
        let mut flags = Flags::with_invocation(
            FlagsOptions::default(),
            to_tokens(&["-f", "/run/user/1000/Jupyter/kernel-1.json"]),
        );
        flags.declare(ParamSpec::new("rate", ParamKind::Float).with_default(0.1));
        assert!(flags.is_interactive_host());
        assert_eq!(flags.get("rate").unwrap(), FlagValue::Float(0.1));
    }

    #[test]
    fn test_unknown_parameter() {
        let mut flags = rate_flags();
        let err = flags.get("missing").unwrap_err();
        assert!(matches!(err, FlagsError::UnknownParameter { ref name } if name == "missing"));
    }

    #[test]
    fn test_set_propagates_into_cache() {
        let mut flags = rate_flags();
        flags.resolve(Some(vec![]), None).unwrap();
        assert!(flags.set("rate", 0.7));
        assert_eq!(
            flags.as_mapping().unwrap().get("rate"),
            Some(&FlagValue::Float(0.7))
        );
    }

    #[test]
    fn test_set_before_resolution_is_local() {
        let mut flags = rate_flags();
        assert!(!flags.set("note", "hello"));
        assert_eq!(flags.get("note").unwrap(), FlagValue::from("hello"));
        assert!(!flags.is_resolved());

        flags.resolve(Some(vec![]), None).unwrap();
        assert!(!flags.as_mapping().unwrap().contains_key("note"));
    }

    #[test]
    fn test_missing_file_keeps_previous_cache() {
        let cfg = write_file("rate: 0.5\n");
        let mut flags = rate_flags();
        flags.resolve(Some(vec![reference(&cfg)]), None).unwrap();

        let other = write_file("rate: 0.8\n");
        let result = flags.resolve(
            Some(vec![reference(&other), "@/definitely/not/here".to_string()]),
            None,
        );
        assert!(matches!(
            result,
            Err(FlagsError::Expand(ExpandError::Open { .. }))
        ));
        assert_eq!(flags.get("rate").unwrap(), FlagValue::Float(0.5));
        assert_eq!(
            flags.config_file_data().get("rate"),
            Some(&FlagValue::Float(0.5))
        );
        assert_eq!(flags.resolution_count(), 1);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let mut flags = rate_flags();
        let result = flags.resolve(Some(to_tokens(&["--rate", "fast"])), None);
        assert!(matches!(result, Err(FlagsError::Parse(_))));
        assert!(!flags.is_resolved());
    }

    #[test]
    fn test_redeclaration_replaces() {
        let mut flags = rate_flags();
        flags.declare(ParamSpec::new("rate", ParamKind::Float).with_default(0.2));
        assert_eq!(flags.declared().len(), 1);
        assert_eq!(flags.get("rate").unwrap(), FlagValue::Float(0.2));
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Training {
        rate: f64,
        mode: String,
        verbose: bool,
    }

    #[test]
    fn test_extract_typed_struct() {
        let mut flags = Flags::with_invocation(
            FlagsOptions::default(),
            to_tokens(&["--mode", "eval", "--verbose"]),
        );
        flags
            .declare(ParamSpec::new("rate", ParamKind::Float).with_default(0.1))
            .declare(ParamSpec::new("mode", ParamKind::Str))
            .declare(ParamSpec::new("verbose", ParamKind::Switch));

        let training: Training = flags.extract().unwrap();
        assert_eq!(
            training,
            Training {
                rate: 0.1,
                mode: "eval".to_string(),
                verbose: true,
            }
        );
    }
}
