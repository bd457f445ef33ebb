//! Scripted editor sessions.
//!
//! A replay script is a TOML file holding an ordered `[[action]]` list. Each
//! action is driven through an [`EditorSession`] exactly as an editor would,
//! and failures are recorded rather than aborting the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::ports::CreateOpParams;
use crate::application::session::EditorSession;
use crate::domain::types::{Activation, Feed, FrameId, ParamValue, PlugName, Position};
use crate::graph::GraphSnapshot;

use super::error::InfraError;

const SOURCE: &str = "infra::replay";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplayScript {
    #[serde(rename = "action", default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub at: [f64; 2],
}

impl From<OpSpec> for CreateOpParams {
    fn from(spec: OpSpec) -> Self {
        CreateOpParams {
            params: spec.params,
            ..CreateOpParams::new(spec.type_name, spec.name).at(Position::new(spec.at[0], spec.at[1]))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create(OpSpec),
    Erase {
        op: String,
    },
    Set {
        op: String,
        param: String,
        value: ParamValue,
        #[serde(default)]
        merge: bool,
    },
    Connect {
        from: String,
        to: String,
    },
    Disconnect {
        from: String,
        to: String,
    },
    Select {
        ops: Vec<String>,
        #[serde(default)]
        merge: bool,
    },
    Move {
        op: String,
        to: [f64; 2],
        #[serde(default)]
        merge: bool,
    },
    Activate {
        op: String,
        active: bool,
    },
    Paste {
        items: Vec<OpSpec>,
        #[serde(default)]
        offset: [f64; 2],
    },
    Clear,
    Step {
        #[serde(default = "one")]
        count: usize,
    },
    Frame {
        frame: FrameId,
    },
    Project {
        path: PathBuf,
    },
    Undo {
        #[serde(default = "one")]
        count: usize,
    },
    Redo {
        #[serde(default = "one")]
        count: usize,
    },
}

fn one() -> usize {
    1
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Create(_) => "create",
            Action::Erase { .. } => "erase",
            Action::Set { .. } => "set",
            Action::Connect { .. } => "connect",
            Action::Disconnect { .. } => "disconnect",
            Action::Select { .. } => "select",
            Action::Move { .. } => "move",
            Action::Activate { .. } => "activate",
            Action::Paste { .. } => "paste",
            Action::Clear => "clear",
            Action::Step { .. } => "step",
            Action::Frame { .. } => "frame",
            Action::Project { .. } => "project",
            Action::Undo { .. } => "undo",
            Action::Redo { .. } => "redo",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayFailure {
    pub index: usize,
    pub action: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub actions: usize,
    pub failures: Vec<ReplayFailure>,
    pub graph: GraphSnapshot,
    pub history: Vec<String>,
    pub undo_index: usize,
    pub visible_frame: FrameId,
}

pub fn parse(source: &str) -> Result<ReplayScript, InfraError> {
    toml::from_str(source).map_err(|err| InfraError::script(format!("invalid replay script: {err}")))
}

pub async fn load(path: &Path) -> Result<ReplayScript, InfraError> {
    let data = tokio::fs::read_to_string(path).await?;
    parse(&data)
}

/// Drive every action of `script` through `session`.
pub async fn run(script: &ReplayScript, session: &mut EditorSession) -> ReplayReport {
    let mut failures = Vec::new();
    for (index, action) in script.actions.iter().enumerate() {
        if let Err(error) = perform(session, action.clone()).await {
            warn!(
                target_module = SOURCE,
                index,
                action = action.name(),
                error = %error,
                "Replay action failed"
            );
            failures.push(ReplayFailure {
                index,
                action: action.name(),
                message: error.to_string(),
            });
        }
    }

    let report = ReplayReport {
        actions: script.actions.len(),
        failures,
        graph: session.snapshot(),
        history: session.history().texts(),
        undo_index: session.history().index(),
        visible_frame: session.store().visible_frame(),
    };
    info!(
        target_module = SOURCE,
        actions = report.actions,
        failures = report.failures.len(),
        ops = report.graph.ops.len(),
        history = report.history.len(),
        "Replay finished"
    );
    report
}

fn feed(from: &str, to: &str) -> Result<Feed, AppError> {
    Ok(Feed::new(PlugName::split(from)?, PlugName::split(to)?))
}

async fn perform(session: &mut EditorSession, action: Action) -> Result<(), AppError> {
    match action {
        Action::Create(spec) => {
            session.create_op(spec.into()).await?;
        }
        Action::Erase { op } => {
            session.erase_op(&op).await?;
        }
        Action::Set {
            op,
            param,
            value,
            merge,
        } => {
            session.set_param(&op, &param, value, merge).await?;
        }
        Action::Connect { from, to } => {
            session.connect(feed(&from, &to)?).await?;
        }
        Action::Disconnect { from, to } => {
            session.disconnect(feed(&from, &to)?).await?;
        }
        Action::Select { ops, merge } => {
            let ops: BTreeSet<String> = ops.into_iter().collect();
            session.select(ops, merge).await?;
        }
        Action::Move { op, to, merge } => {
            session
                .move_ops(vec![(op, Position::new(to[0], to[1]))], merge)
                .await?;
        }
        Action::Activate { op, active } => {
            let activation = if active {
                Activation::Active
            } else {
                Activation::Inactive
            };
            session.set_activation(&op, activation).await?;
        }
        Action::Paste { items, offset } => {
            let items = items.into_iter().map(CreateOpParams::from).collect();
            session
                .paste(items, Position::new(offset[0], offset[1]))
                .await?;
        }
        Action::Clear => {
            session.clear_graph().await?;
        }
        Action::Step { count } => {
            for _ in 0..count {
                session.step().await?;
            }
        }
        Action::Frame { frame } => session.set_visible_frame(frame).await?,
        Action::Project { path } => session.set_project_path(path).await?,
        Action::Undo { count } => {
            for _ in 0..count {
                session.undo().await?;
            }
        }
        Action::Redo { count } => {
            for _ in 0..count {
                session.redo().await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_actions() {
        let script = parse(
            r#"
            [[action]]
            action = "create"
            type = "Source"
            name = "src"
            params = { count = 3, scale = 0.5 }

            [[action]]
            action = "connect"
            from = "src:out"
            to = "view:in"

            [[action]]
            action = "undo"
            "#,
        )
        .expect("valid script");

        assert_eq!(script.actions.len(), 3);
        match &script.actions[0] {
            Action::Create(spec) => {
                assert_eq!(spec.type_name, "Source");
                assert_eq!(spec.params.get("count"), Some(&ParamValue::Int(3)));
                assert_eq!(spec.params.get("scale"), Some(&ParamValue::Float(0.5)));
            }
            other => panic!("expected create, got {other:?}"),
        }
        assert!(matches!(script.actions[2], Action::Undo { count: 1 }));
    }

    #[test]
    fn unknown_actions_are_script_errors() {
        let error = parse("[[action]]\naction = \"explode\"\n").expect_err("unknown action");
        assert!(matches!(error, InfraError::Script { .. }));
    }

    #[test]
    fn empty_script_has_no_actions() {
        assert!(parse("").expect("empty script").actions.is_empty());
    }
}
