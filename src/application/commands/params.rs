//! Parameter and activation commands.

use std::any::Any;

use async_trait::async_trait;

use crate::application::ports::{Request, Transport};
use crate::domain::types::{Activation, ParamValue};

use super::{Command, CommandError, send};

/// One parameter write with the value it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamChange {
    pub op: String,
    pub param: String,
    pub old: ParamValue,
    pub new: ParamValue,
}

impl ParamChange {
    fn request(&self, value: &ParamValue) -> Request {
        Request::SetParam {
            op: self.op.clone(),
            param: self.param.clone(),
            value: value.clone(),
        }
    }

    fn same_target(&self, other: &ParamChange) -> bool {
        self.op == other.op && self.param == other.param
    }
}

/// A batch of parameter writes that undo and redo together.
#[derive(Debug, Clone)]
pub struct SetParamsCommand {
    changes: Vec<ParamChange>,
    mergeable: bool,
}

impl SetParamsCommand {
    pub fn new(changes: Vec<ParamChange>, mergeable: bool) -> Self {
        Self { changes, mergeable }
    }

    pub fn changes(&self) -> &[ParamChange] {
        &self.changes
    }
}

#[async_trait]
impl Command for SetParamsCommand {
    fn text(&self) -> String {
        match self.changes.as_slice() {
            [change] => format!("Set {}:{}", change.op, change.param),
            changes => format!("Set {} parameters", changes.len()),
        }
    }

    fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for change in &self.changes {
            send(transport, change.request(&change.new)).await?;
        }
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        for change in self.changes.iter().rev() {
            send(transport, change.request(&change.old)).await?;
        }
        Ok(())
    }

    fn merge_with(&mut self, other: &dyn Command) -> bool {
        let Some(other) = other.as_any().downcast_ref::<SetParamsCommand>() else {
            return false;
        };
        if !self.mergeable || !other.mergeable || self.changes.len() != other.changes.len() {
            return false;
        }
        if !self
            .changes
            .iter()
            .zip(&other.changes)
            .all(|(mine, theirs)| mine.same_target(theirs))
        {
            return false;
        }
        for (mine, theirs) in self.changes.iter_mut().zip(&other.changes) {
            mine.new = theirs.new.clone();
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct SetActivationCommand {
    op: String,
    old: Activation,
    new: Activation,
}

impl SetActivationCommand {
    pub fn new(op: impl Into<String>, old: Activation, new: Activation) -> Self {
        Self {
            op: op.into(),
            old,
            new,
        }
    }

    fn request(&self, activation: Activation) -> Request {
        Request::SetActivation {
            op: self.op.clone(),
            activation,
        }
    }
}

#[async_trait]
impl Command for SetActivationCommand {
    fn text(&self) -> String {
        match self.new {
            Activation::Active => format!("Activate {}", self.op),
            Activation::Inactive => format!("Deactivate {}", self.op),
        }
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, self.request(self.new)).await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, self.request(self.old)).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(op: &str, param: &str, old: i64, new: i64) -> ParamChange {
        ParamChange {
            op: op.to_string(),
            param: param.to_string(),
            old: ParamValue::Int(old),
            new: ParamValue::Int(new),
        }
    }

    #[test]
    fn merge_keeps_first_old_and_adopts_latest_new() {
        let mut first = SetParamsCommand::new(vec![change("src1", "count", 2, 3)], true);
        let second = SetParamsCommand::new(vec![change("src1", "count", 3, 4)], true);
        assert!(first.merge_with(&second));
        assert_eq!(first.changes()[0].old, ParamValue::Int(2));
        assert_eq!(first.changes()[0].new, ParamValue::Int(4));
    }

    #[test]
    fn merge_requires_same_targets_and_eligibility() {
        let mut base = SetParamsCommand::new(vec![change("src1", "count", 2, 3)], true);
        let other_field = SetParamsCommand::new(vec![change("src1", "points", 4, 5)], true);
        let ineligible = SetParamsCommand::new(vec![change("src1", "count", 3, 4)], false);
        let activation = SetActivationCommand::new("src1", Activation::Active, Activation::Inactive);

        assert!(!base.merge_with(&other_field));
        assert!(!base.merge_with(&ineligible));
        assert!(!base.merge_with(&activation));
        assert_eq!(base.changes()[0].new, ParamValue::Int(3));
    }

    #[test]
    fn labels_describe_the_batch() {
        let single = SetParamsCommand::new(vec![change("src1", "count", 1, 2)], false);
        assert_eq!(single.text(), "Set src1:count");
        let batch = SetParamsCommand::new(
            vec![change("src1", "count", 1, 2), change("src2", "count", 1, 2)],
            false,
        );
        assert_eq!(batch.text(), "Set 2 parameters");
        let deactivate = SetActivationCommand::new("src1", Activation::Active, Activation::Inactive);
        assert_eq!(deactivate.text(), "Deactivate src1");
    }
}
