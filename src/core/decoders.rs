// src/core/decoders.rs

//! Mapping-file detection.
//!
//! A referenced file is offered to each decoder in [`MAPPING_DECODERS`], in order. The
//! first one that accepts the bytes and decodes them to a key/value mapping wins. A
//! decoder that cannot interpret the file returns `None`; that is the signal to try the
//! next one, never an error.

use crate::constants::BINARY_MAPPING_MAGIC;
use crate::models::{ConfigMap, mapping_from_json, mapping_from_toml, mapping_from_yaml};

/// One entry of the decoder table.
#[derive(Debug)]
pub struct MappingDecoder {
    /// Reported in logs and by [`decode_mapping`].
    pub name: &'static str,
    /// Cheap check on the raw bytes before attempting a full decode.
    accepts: fn(&[u8]) -> bool,
    decode: fn(&[u8]) -> Option<ConfigMap>,
}

impl MappingDecoder {
    /// Runs the predicate and, if it passes, the decoder.
    pub fn try_decode(&self, bytes: &[u8]) -> Option<ConfigMap> {
        if !(self.accepts)(bytes) {
            return None;
        }
        (self.decode)(bytes)
    }
}

/// The probing order: binary serialized mapping, then structured documents.
pub static MAPPING_DECODERS: &[MappingDecoder] = &[
    MappingDecoder {
        name: "binary",
        accepts: has_binary_magic,
        decode: decode_binary,
    },
    MappingDecoder {
        name: "yaml",
        accepts: is_utf8,
        decode: decode_yaml,
    },
    MappingDecoder {
        name: "json",
        accepts: looks_like_json_object,
        decode: decode_json,
    },
    MappingDecoder {
        name: "toml",
        accepts: is_utf8,
        decode: decode_toml,
    },
];

/// Tries every decoder in order and returns the first mapping together with the name
/// of the decoder that produced it.
pub fn decode_mapping(bytes: &[u8]) -> Option<(&'static str, ConfigMap)> {
    MAPPING_DECODERS.iter().find_map(|decoder| {
        let decoded = decoder.try_decode(bytes);
        log::trace!(
            "Decoder '{}' {}",
            decoder.name,
            if decoded.is_some() { "matched" } else { "skipped" }
        );
        decoded.map(|map| (decoder.name, map))
    })
}

/// Serializes `map` into the binary mapping format understood by the `binary` decoder.
///
/// # Errors
/// Returns the `bincode` encode error if a value cannot be serialized.
pub fn encode_binary_mapping(map: &ConfigMap) -> Result<Vec<u8>, bincode::error::EncodeError> {
    let payload = bincode::serde::encode_to_vec(map, bincode::config::standard())?;
    let mut bytes = Vec::with_capacity(BINARY_MAPPING_MAGIC.len() + payload.len());
    bytes.extend_from_slice(BINARY_MAPPING_MAGIC);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn has_binary_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(BINARY_MAPPING_MAGIC)
}

fn is_utf8(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
}

fn looks_like_json_object(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

fn decode_binary(bytes: &[u8]) -> Option<ConfigMap> {
    let payload = bytes.get(BINARY_MAPPING_MAGIC.len()..)?;
    let (map, read): (ConfigMap, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).ok()?;
    // Trailing garbage means this is not one of ours.
    (read == payload.len()).then_some(map)
}

fn decode_yaml(bytes: &[u8]) -> Option<ConfigMap> {
    match serde_yaml::from_slice::<serde_yaml::Value>(bytes).ok()? {
        serde_yaml::Value::Mapping(mapping) => Some(mapping_from_yaml(mapping)),
        _ => None,
    }
}

fn decode_json(bytes: &[u8]) -> Option<ConfigMap> {
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(bytes)
        .ok()
        .map(mapping_from_json)
}

/// TOML bare keys may start with `-`, so `--steps=12` parses as a table. Such files are
/// option lines, not config.
fn decode_toml(bytes: &[u8]) -> Option<ConfigMap> {
    let text = std::str::from_utf8(bytes).ok()?;
    let table = toml::from_str::<toml::Table>(text).ok()?;
    if table.keys().any(|key| key.starts_with('-')) {
        return None;
    }
    Some(mapping_from_toml(table))
}
