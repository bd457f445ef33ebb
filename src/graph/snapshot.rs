//! Value-typed copy of the mirrored graph, used to compare states.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::types::{Activation, Feed, ParamValue, Position};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpSnapshot {
    pub type_name: String,
    pub params: BTreeMap<String, ParamValue>,
    pub position: Position,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GraphSnapshot {
    pub ops: BTreeMap<String, OpSnapshot>,
    pub feeds: BTreeSet<Feed>,
    pub selected: BTreeSet<String>,
}

impl GraphSnapshot {
    pub fn op_names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }
}
