// src/core/mod.rs

//! Resolution internals: file expansion, mapping decoders, token parsing and the resolver.

/// Parameter declaration files.
pub mod declarations;
pub mod decoders;
/// `@file` expansion.
pub mod expander;
/// Declarations to `clap` commands.
pub mod parser;
pub mod resolver;
