// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A name-to-value mapping. Ordered by key so output and iteration are deterministic.
pub type ConfigMap = BTreeMap<String, FlagValue>;

// --- VALUES ---

/// A single resolved value.
///
/// The enum is externally tagged so it round-trips through `bincode`, which cannot
/// deserialize untagged data. Structured documents (YAML, JSON, TOML) are converted
/// through the `From` impls below instead of being deserialized directly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum FlagValue {
    /// No value: a declared parameter without default that nobody supplied.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(String),
    /// A sequence, from `many` parameters or file lists.
    List(Vec<FlagValue>),
    /// Nested table coming from a structured config file.
    Map(ConfigMap),
}

impl FlagValue {
    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats, so a file saying `rate: 1` still reads as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The items, if this is a `List`.
    pub fn as_list(&self) -> Option<&[FlagValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The nested table, if this is a `Map`.
    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts the value to JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    fn from_number(int: Option<i64>, float: Option<f64>) -> Self {
        match (int, float) {
            (Some(i), _) => Self::Int(i),
            (None, Some(f)) => Self::Float(f),
            (None, None) => Self::Null,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<FlagValue>> From<Vec<T>> for FlagValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FlagValue>> From<Option<T>> for FlagValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_yaml::Value> for FlagValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::from_number(n.as_i64(), n.as_f64()),
            Value::String(s) => Self::Str(s),
            Value::Sequence(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Mapping(mapping) => Self::Map(mapping_from_yaml(mapping)),
            Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

impl From<serde_json::Value> for FlagValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::from_number(n.as_i64(), n.as_f64()),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(object) => Self::Map(mapping_from_json(object)),
        }
    }
}

impl From<toml::Value> for FlagValue {
    fn from(value: toml::Value) -> Self {
        use toml::Value;
        match value {
            Value::String(s) => Self::Str(s),
            Value::Integer(i) => Self::Int(i),
            Value::Float(f) => Self::Float(f),
            Value::Boolean(b) => Self::Bool(b),
            Value::Datetime(d) => Self::Str(d.to_string()),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Table(table) => Self::Map(mapping_from_toml(table)),
        }
    }
}

/// Converts a YAML mapping into a `ConfigMap`. Scalar keys are stringified; keys that
/// are themselves collections cannot name a parameter and are dropped.
pub fn mapping_from_yaml(mapping: serde_yaml::Mapping) -> ConfigMap {
    mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    log::debug!("Dropping non-scalar mapping key: {:?}", other);
                    return None;
                }
            };
            Some((key, FlagValue::from(value)))
        })
        .collect()
}

/// Converts a JSON object into a `ConfigMap`.
pub fn mapping_from_json(object: serde_json::Map<String, serde_json::Value>) -> ConfigMap {
    object
        .into_iter()
        .map(|(key, value)| (key, FlagValue::from(value)))
        .collect()
}

/// Converts a TOML table into a `ConfigMap`.
pub fn mapping_from_toml(table: toml::Table) -> ConfigMap {
    table
        .into_iter()
        .map(|(key, value)| (key, FlagValue::from(value)))
        .collect()
}

// --- DECLARATIONS ---

/// The value type a declared parameter accepts on the command line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Any string.
    #[default]
    Str,
    /// A signed integer.
    Int,
    /// A float.
    Float,
    /// Takes an explicit value: `true`/`false`, `yes`/`no`, `1`/`0`, `on`/`off`.
    Bool,
    /// Takes no value; its presence sets `true`.
    Switch,
}

/// Declaratively describes a parameter the resolver accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Long option name; `--name` on the command line.
    pub name: String,
    /// Value type accepted on the command line.
    pub kind: ParamKind,
    /// Accept one or more values after the flag and resolve to a `FlagValue::List`.
    pub many: bool,
    /// Weakest layer of the resolution.
    pub default: FlagValue,
    /// Help text shown by `render_help`.
    pub help: Option<String>,
    /// Optional single-character alias, `-x`.
    pub short: Option<char>,
}

impl ParamSpec {
    /// Creates a declaration with no default (`Null`), or `false` for switches.
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        let default = if kind == ParamKind::Switch {
            FlagValue::Bool(false)
        } else {
            FlagValue::Null
        };
        Self {
            name: name.into(),
            kind,
            many: false,
            default,
            help: None,
            short: None,
        }
    }

    /// Sets the declared default.
    pub fn with_default(mut self, value: impl Into<FlagValue>) -> Self {
        self.default = value.into();
        self
    }

    /// Sets the help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Sets the short alias.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Accepts several values.
    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }
}

// --- RESOLVED ARGUMENTS ---

/// The resolved name-to-value pairs of one resolution.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Namespace {
    values: ConfigMap,
}

impl Namespace {
    /// An empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `name`, if resolved.
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(name)
    }

    /// Mutable access to the value of `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FlagValue> {
        self.values.get_mut(name)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Whether `name` has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlagValue)> {
        self.values.iter()
    }

    /// The underlying mapping.
    pub fn as_map(&self) -> &ConfigMap {
        &self.values
    }

    /// Consumes the namespace into its mapping.
    pub fn into_map(self) -> ConfigMap {
        self.values
    }

    /// The namespace as a JSON object, used for printing and typed extraction.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl From<ConfigMap> for Namespace {
    fn from(values: ConfigMap) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, FlagValue)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (String, FlagValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Namespace {
    type Item = (String, FlagValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FlagValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// --- CALLER OVERRIDES ---

/// Caller-supplied defaults that sit between config files and command-line tokens.
///
/// Either a namespace-like object or a plain mapping. Anything else is carried as
/// `Unsupported` and rejected when resolution starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Overrides {
    /// A resolved namespace, typically from an earlier resolution.
    Namespace(Namespace),
    /// Plain name-to-value pairs.
    Mapping(ConfigMap),
    /// Any other shape; `type_name` is reported in the error.
    Unsupported {
        /// Name of the rejected shape.
        type_name: String,
    },
}

impl Overrides {
    /// Builds a mapping override from `(name, value)` pairs.
    pub fn mapping<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FlagValue>,
    {
        Self::Mapping(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Uses any serializable value as a namespace: structs and maps contribute their
    /// fields, every other shape (sequences, scalars) is `Unsupported`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(object)) => {
                Self::Namespace(Namespace::from(mapping_from_json(object)))
            }
            Ok(_) | Err(_) => Self::Unsupported {
                type_name: std::any::type_name::<T>().to_string(),
            },
        }
    }

    /// Flattens the overrides into a mapping layer. Returns the offending type name
    /// for `Unsupported`.
    pub fn into_layer(self) -> Result<ConfigMap, String> {
        match self {
            Self::Namespace(namespace) => Ok(namespace.into_map()),
            Self::Mapping(map) => Ok(map),
            Self::Unsupported { type_name } => Err(type_name),
        }
    }
}

impl From<Namespace> for Overrides {
    fn from(namespace: Namespace) -> Self {
        Self::Namespace(namespace)
    }
}

impl From<ConfigMap> for Overrides {
    fn from(map: ConfigMap) -> Self {
        Self::Mapping(map)
    }
}

impl<K: Into<String>, V: Into<FlagValue>> From<HashMap<K, V>> for Overrides {
    fn from(map: HashMap<K, V>) -> Self {
        Self::mapping(map)
    }
}

impl From<serde_json::Value> for Overrides {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        let type_name = match value {
            Value::Object(object) => return Self::Mapping(mapping_from_json(object)),
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        };
        Self::Unsupported {
            type_name: type_name.to_string(),
        }
    }
}

// MARK: --- UNIT TESTS ---
