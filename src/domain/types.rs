//! Shared domain enumerations and value types mirrored from the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Frame index on the server's simulation timeline.
pub type FrameId = i64;

/// Long name of the sentinel pseudo-operation that survives a graph clear.
pub const GLOBAL_OP: &str = "Global";

const PLUG_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Active,
    Inactive,
}

impl Activation {
    pub fn as_str(self) -> &'static str {
        match self {
            Activation::Active => "active",
            Activation::Inactive => "inactive",
        }
    }
}

/// Whether the server is currently evaluating an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Idle,
    Stepping,
}

/// How much body data a cache keeps.
///
/// Always derived from feed topology, never stored as independent truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    NoCache,
    StatsOnly,
    FullCache,
}

impl CachePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePolicy::NoCache => "no_cache",
            CachePolicy::StatsOnly => "stats_only",
            CachePolicy::FullCache => "full_cache",
        }
    }

    pub fn caches_anything(self) -> bool {
        self != CachePolicy::NoCache
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of plug kinds: body or field, input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlugKind {
    BodyInput,
    FieldInput,
    BodyOutput,
    FieldOutput,
}

impl PlugKind {
    pub fn is_output(self) -> bool {
        matches!(self, PlugKind::BodyOutput | PlugKind::FieldOutput)
    }

    pub fn is_body(self) -> bool {
        matches!(self, PlugKind::BodyInput | PlugKind::BodyOutput)
    }

    /// True when an output of kind `self` may feed an input of kind `input`.
    pub fn can_feed(self, input: PlugKind) -> bool {
        matches!(
            (self, input),
            (PlugKind::BodyOutput, PlugKind::BodyInput) | (PlugKind::FieldOutput, PlugKind::FieldInput)
        )
    }
}

/// Fully-qualified plug identity: owning operation long name plus plug name.
///
/// The long form is `<op>:<plug>`; plug names never contain the separator, so
/// [`PlugName::split`] of a [`PlugName::compose`]d name always round-trips even
/// when the operation name itself contains `:`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlugName {
    op: String,
    plug: String,
}

impl PlugName {
    pub fn new(op: impl Into<String>, plug: impl Into<String>) -> Result<Self, DomainError> {
        let op = op.into();
        let plug = plug.into();
        if op.is_empty() {
            return Err(DomainError::validation("operation name must not be empty"));
        }
        if plug.is_empty() {
            return Err(DomainError::validation("plug name must not be empty"));
        }
        if plug.contains(PLUG_SEPARATOR) {
            return Err(DomainError::validation(format!(
                "plug name `{plug}` must not contain `{PLUG_SEPARATOR}`"
            )));
        }
        Ok(Self { op, plug })
    }

    /// Compose the long name for a plug.
    pub fn compose(op: &str, plug: &str) -> String {
        format!("{op}{PLUG_SEPARATOR}{plug}")
    }

    /// Split a long plug name back into its operation and plug parts.
    pub fn split(long_name: &str) -> Result<Self, DomainError> {
        let (op, plug) = long_name.rsplit_once(PLUG_SEPARATOR).ok_or_else(|| {
            DomainError::validation(format!("`{long_name}` is not a plug long name"))
        })?;
        Self::new(op, plug)
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn plug(&self) -> &str {
        &self.plug
    }

    pub fn long_name(&self) -> String {
        Self::compose(&self.op, &self.plug)
    }
}

impl fmt::Display for PlugName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PLUG_SEPARATOR}{}", self.op, self.plug)
    }
}

/// A connection from an output plug to an input plug.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Feed {
    pub from: PlugName,
    pub to: PlugName,
}

impl Feed {
    pub fn new(from: PlugName, to: PlugName) -> Self {
        Self { from, to }
    }

    pub fn touches(&self, op: &str) -> bool {
        self.from.op() == op || self.to.op() == op
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            ParamValue::Float(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(value) => Some(*value as f64),
            ParamValue::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => write!(f, "{value:?}"),
        }
    }
}

/// Node position in the editor's graph scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plug_name_round_trips_through_split_and_compose() {
        for (op, plug) in [("src", "out"), ("/scene/emitter", "field"), ("a:b", "in")] {
            let long = PlugName::compose(op, plug);
            let parsed = PlugName::split(&long).expect("composed name parses");
            assert_eq!(parsed.op(), op);
            assert_eq!(parsed.plug(), plug);
            assert_eq!(parsed.long_name(), long);
        }
    }

    #[test]
    fn plug_name_rejects_separator_in_plug() {
        assert!(PlugName::new("op", "a:b").is_err());
        assert!(PlugName::new("", "out").is_err());
        assert!(PlugName::split("no-separator").is_err());
    }

    #[test]
    fn plug_kinds_only_feed_matching_inputs() {
        assert!(PlugKind::BodyOutput.can_feed(PlugKind::BodyInput));
        assert!(PlugKind::FieldOutput.can_feed(PlugKind::FieldInput));
        assert!(!PlugKind::BodyOutput.can_feed(PlugKind::FieldInput));
        assert!(!PlugKind::BodyInput.can_feed(PlugKind::BodyInput));
    }

    #[test]
    fn param_values_deserialize_untagged() {
        let value: ParamValue = serde_json::from_str("3").expect("int");
        assert_eq!(value, ParamValue::Int(3));
        let value: ParamValue = serde_json::from_str("1.5").expect("float");
        assert_eq!(value, ParamValue::Float(1.5));
        let value: ParamValue = serde_json::from_str("\"x\"").expect("text");
        assert_eq!(value, ParamValue::Text("x".to_string()));
    }
}
