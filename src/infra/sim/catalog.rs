//! Operation types offered by the in-memory server.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::application::ports::PlugDecl;
use crate::domain::bodies::BodyHandle;
use crate::domain::types::{FrameId, ParamValue, PlugKind};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlugSpec {
    pub name: &'static str,
    pub kind: PlugKind,
    /// Declared, but the server never backs it with a resource.
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamDefault {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<ParamDefault> for ParamValue {
    fn from(value: ParamDefault) -> Self {
        match value {
            ParamDefault::Bool(value) => ParamValue::Bool(value),
            ParamDefault::Int(value) => ParamValue::Int(value),
            ParamDefault::Float(value) => ParamValue::Float(value),
        }
    }
}

/// How an operation turns its inputs into bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cook {
    /// Emits `bodies` bodies of `count` elements each.
    Generate,
    /// Scales and offsets every body fed into `in`.
    Transform,
    /// Concatenates everything fed into `in` and `other`.
    Merge,
    /// Forwards `in` unchanged.
    PassThrough,
    /// Produces no bodies.
    Field,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OpType {
    pub name: &'static str,
    pub family: &'static str,
    pub placeholder: bool,
    pub cook: Cook,
    pub plugs: &'static [PlugSpec],
    pub params: &'static [(&'static str, ParamDefault)],
}

impl OpType {
    pub fn plug(&self, name: &str) -> Option<&PlugSpec> {
        self.plugs.iter().find(|plug| plug.name == name)
    }

    pub fn declarations(&self) -> Vec<PlugDecl> {
        self.plugs
            .iter()
            .map(|plug| PlugDecl {
                name: plug.name.to_string(),
                kind: plug.kind,
            })
            .collect()
    }

    pub fn default_params(&self) -> BTreeMap<String, ParamValue> {
        self.params
            .iter()
            .map(|(name, value)| ((*name).to_string(), ParamValue::from(*value)))
            .collect()
    }

    pub fn body_outputs(&self) -> impl Iterator<Item = &PlugSpec> {
        self.plugs
            .iter()
            .filter(|plug| plug.kind == PlugKind::BodyOutput && !plug.optional)
    }
}

const fn plug(name: &'static str, kind: PlugKind) -> PlugSpec {
    PlugSpec {
        name,
        kind,
        optional: false,
    }
}

pub const CATALOG: &[OpType] = &[
    OpType {
        name: "Source",
        family: "generators",
        placeholder: false,
        cook: Cook::Generate,
        plugs: &[plug("out", PlugKind::BodyOutput)],
        params: &[
            ("bodies", ParamDefault::Int(2)),
            ("count", ParamDefault::Int(4)),
            ("scale", ParamDefault::Float(1.0)),
        ],
    },
    OpType {
        name: "Transform",
        family: "modifiers",
        placeholder: false,
        cook: Cook::Transform,
        plugs: &[
            plug("in", PlugKind::BodyInput),
            PlugSpec {
                name: "aux",
                kind: PlugKind::FieldInput,
                optional: true,
            },
            plug("out", PlugKind::BodyOutput),
        ],
        params: &[
            ("offset", ParamDefault::Float(0.0)),
            ("scale", ParamDefault::Float(1.0)),
        ],
    },
    OpType {
        name: "Merge",
        family: "modifiers",
        placeholder: false,
        cook: Cook::Merge,
        plugs: &[
            plug("in", PlugKind::BodyInput),
            plug("other", PlugKind::BodyInput),
            plug("out", PlugKind::BodyOutput),
        ],
        params: &[],
    },
    OpType {
        name: "FieldGen",
        family: "fields",
        placeholder: false,
        cook: Cook::Field,
        plugs: &[plug("field", PlugKind::FieldOutput)],
        params: &[
            ("strength", ParamDefault::Float(1.0)),
            ("enabled", ParamDefault::Bool(true)),
        ],
    },
    OpType {
        name: "Viewer",
        family: "viewers",
        placeholder: true,
        cook: Cook::PassThrough,
        plugs: &[
            plug("in", PlugKind::BodyInput),
            plug("out", PlugKind::BodyOutput),
        ],
        params: &[],
    },
];

pub fn lookup(type_name: &str) -> Option<&'static OpType> {
    CATALOG.iter().find(|op_type| op_type.name == type_name)
}

/// Deterministic bodies for a generator at `frame`.
pub(crate) fn generate(
    op: &str,
    params: &BTreeMap<String, ParamValue>,
    frame: FrameId,
) -> Vec<BodyHandle> {
    let bodies = param_i64(params, "bodies", 1).max(0);
    let count = param_i64(params, "count", 1).max(0);
    let scale = param_f64(params, "scale", 1.0) as f32;
    (0..bodies)
        .map(|body| BodyHandle {
            name: format!("{op}.{body}"),
            elements: (0..count)
                .map(|index| [index as f32 * scale, frame as f32, body as f32])
                .collect(),
            channels: vec!["P".to_string()],
        })
        .collect()
}

pub(crate) fn transform(
    op: &str,
    params: &BTreeMap<String, ParamValue>,
    inputs: Vec<BodyHandle>,
) -> Vec<BodyHandle> {
    let offset = param_f64(params, "offset", 0.0) as f32;
    let scale = param_f64(params, "scale", 1.0) as f32;
    inputs
        .into_iter()
        .map(|body| BodyHandle {
            name: format!("{op}/{}", body.name),
            elements: body
                .elements
                .into_iter()
                .map(|[x, y, z]| [x * scale + offset, y, z])
                .collect(),
            channels: body.channels,
        })
        .collect()
}

fn param_i64(params: &BTreeMap<String, ParamValue>, name: &str, fallback: i64) -> i64 {
    params
        .get(name)
        .and_then(ParamValue::as_i64)
        .unwrap_or(fallback)
}

fn param_f64(params: &BTreeMap<String, ParamValue>, name: &str, fallback: f64) -> f64 {
    params
        .get(name)
        .and_then(ParamValue::as_f64)
        .unwrap_or(fallback)
}
