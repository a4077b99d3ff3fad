// src/core/expander.rs

use crate::core::decoders;
use crate::models::ConfigMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal failures while expanding `@file` references. Any of them aborts the resolution.
#[derive(Error, Debug)]
pub enum ExpandError {
    /// The referenced file could not be opened or read.
    #[error("Cannot read argument file '{}': {source}", .path.display())]
    Open {
        /// The referenced path after `~` expansion.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A token file that is not valid UTF-8 text.
    #[error("Argument file '{}' is neither a mapping nor UTF-8 text.", .path.display())]
    Encoding {
        /// The token file.
        path: PathBuf,
    },
    /// A line of a token file could not be split (e.g. an unbalanced quote).
    #[error("Cannot split line {line} of argument file '{}'.", .path.display())]
    LineSyntax {
        /// The token file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
    },
    /// A token file references itself, directly or through other token files.
    #[error("Argument file '{}' references itself.", .path.display())]
    CyclicReference {
        /// The file entered a second time.
        path: PathBuf,
    },
}

/// How a line of a token file is turned into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineSplit {
    /// Shell-style splitting: whitespace separates tokens, quotes group them.
    #[default]
    Shell,
    /// Each non-empty line is exactly one token.
    WholeLine,
}

/// An item on the expansion stack.
#[derive(Debug)]
enum Pending {
    Token(String),
    /// Marks the end of a token file's contents; pops it from the active chain.
    Leave,
}

/// Expands marker-prefixed tokens into mapping contributions or spliced tokens.
#[derive(Debug)]
pub struct Expander<'a> {
    markers: &'a [char],
    line_split: LineSplit,
}

impl<'a> Expander<'a> {
    /// An expander recognizing `markers` as reference prefixes.
    pub fn new(markers: &'a [char], line_split: LineSplit) -> Self {
        Self {
            markers,
            line_split,
        }
    }

    /// Returns the path part of `token` if it starts with one of the markers.
    pub fn reference_path<'t>(&self, token: &'t str) -> Option<&'t str> {
        let first = token.chars().next()?;
        if self.markers.contains(&first) {
            token.get(first.len_utf8()..)
        } else {
            None
        }
    }

    /// Expands every file reference in `tokens`.
    ///
    /// Mapping files are merged into `file_data` in order of appearance (later wins).
    /// Token files are replaced in place by their tokens, which are expanded in turn.
    /// Every other token is returned unchanged and in order.
    pub fn expand(
        &self,
        tokens: Vec<String>,
        file_data: &mut ConfigMap,
    ) -> Result<Vec<String>, ExpandError> {
        let mut stack: Vec<Pending> = tokens.into_iter().rev().map(Pending::Token).collect();
        // Token files currently being expanded, outermost first.
        let mut active: Vec<PathBuf> = Vec::new();
        let mut expanded = Vec::new();

        while let Some(item) = stack.pop() {
            let token = match item {
                Pending::Leave => {
                    active.pop();
                    continue;
                }
                Pending::Token(token) => token,
            };

            let Some(raw_path) = self.reference_path(&token).map(str::to_owned) else {
                expanded.push(token);
                continue;
            };

            let path = expand_home(&raw_path);
            let bytes = fs::read(&path).map_err(|source| ExpandError::Open {
                path: path.clone(),
                source,
            })?;

            if let Some((decoder, map)) = decoders::decode_mapping(&bytes) {
                log::debug!(
                    "Merging {} keys from {} mapping file '{}'",
                    map.len(),
                    decoder,
                    path.display()
                );
                file_data.extend(map);
                continue;
            }

            let identity = dunce::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if active.contains(&identity) {
                return Err(ExpandError::CyclicReference { path });
            }

            let file_tokens = self.split_lines(&path, &bytes)?;
            log::debug!(
                "Splicing {} tokens from argument file '{}'",
                file_tokens.len(),
                path.display()
            );
            active.push(identity);
            stack.push(Pending::Leave);
            stack.extend(file_tokens.into_iter().rev().map(Pending::Token));
        }

        log::trace!("Expanded tokens: {:?}", expanded);
        Ok(expanded)
    }

    fn split_lines(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExpandError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ExpandError::Encoding {
            path: path.to_path_buf(),
        })?;

        let mut tokens = Vec::new();
        for (index, line) in text.lines().enumerate() {
            match self.line_split {
                LineSplit::Shell => {
                    let parts = shlex::split(line).ok_or_else(|| ExpandError::LineSyntax {
                        path: path.to_path_buf(),
                        line: index + 1,
                    })?;
                    tokens.extend(parts);
                }
                LineSplit::WholeLine => {
                    if !line.is_empty() {
                        tokens.push(line.to_string());
                    }
                }
            }
        }
        Ok(tokens)
    }
}

/// Expands a leading `~` to the home directory. Other text is taken literally.
fn expand_home(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
