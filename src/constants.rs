// src/constants.rs

/// The marker character that turns a token into a file reference (`@path/to/file`).
pub const DEFAULT_MARKER: char = '@';

/// Substrings that identify an interactive notebook host in the invocation arguments.
/// Matched case-insensitively.
pub const DEFAULT_INTERACTIVE_MARKERS: &[&str] = &["jupyter"];

/// Program name shown in rendered help and parse errors when none is configured.
pub const DEFAULT_PROGRAM_NAME: &str = "flags";

/// Magic prefix of a binary mapping file. The bincode payload follows immediately.
pub const BINARY_MAPPING_MAGIC: &[u8] = b"LFLAGS\x00\x01";
