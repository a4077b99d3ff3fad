//! Layered argument resolution.
//!
//! Values are merged from config files referenced on the command line (`@file`), caller
//! supplied defaults and explicit command-line tokens, in that order of precedence, and
//! parsed lazily on first access.

/// Argument definitions of the `lflags` binary.
pub mod cli;
/// Default markers and names.
pub mod constants;
pub mod core;
/// Values, declarations, namespaces and overrides.
pub mod models;
pub mod state;

pub use crate::core::decoders::encode_binary_mapping;
pub use crate::core::resolver::{Flags, FlagsError, FlagsOptions, LineSplit};
pub use crate::models::{ConfigMap, FlagValue, Namespace, Overrides, ParamKind, ParamSpec};
