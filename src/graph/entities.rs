//! Operations and plugs mirrored from confirmed server state.

use std::collections::BTreeMap;

use tracing::debug;

use crate::application::ports::{OpDescriptor, PlugDecl, PlugResource, ServerQuery};
use crate::cache::{CacheConfig, OpCacheController, PlugCacheController};
use crate::domain::types::{Activation, CachePolicy, Condition, ParamValue, PlugKind, PlugName, Position};

const SOURCE: &str = "graph::entities";

/// Closed set of plug variants. Only body outputs own a live cache.
#[derive(Debug)]
pub enum PlugRole {
    BodyInput,
    FieldInput,
    BodyOutput(PlugCacheController),
    FieldOutput,
}

#[derive(Debug)]
pub struct Plug {
    name: PlugName,
    role: PlugRole,
    resource: PlugResource,
}

impl Plug {
    /// Build a plug from its declaration. `None` when the server holds no
    /// resource for it; some plugs are optional per operation type.
    pub fn construct(
        op: &str,
        decl: &PlugDecl,
        query: &dyn ServerQuery,
        config: CacheConfig,
    ) -> Option<Plug> {
        let name = match PlugName::new(op, decl.name.as_str()) {
            Ok(name) => name,
            Err(error) => {
                debug!(target_module = SOURCE, op, plug = %decl.name, error = %error, "Plug name rejected");
                return None;
            }
        };
        let resource = query.plug_resource(&name)?;
        let role = match decl.kind {
            PlugKind::BodyInput => PlugRole::BodyInput,
            PlugKind::FieldInput => PlugRole::FieldInput,
            PlugKind::BodyOutput => PlugRole::BodyOutput(PlugCacheController::new(name.clone(), config)),
            PlugKind::FieldOutput => PlugRole::FieldOutput,
        };
        Some(Plug {
            name,
            role,
            resource,
        })
    }

    pub fn name(&self) -> &PlugName {
        &self.name
    }

    pub fn kind(&self) -> PlugKind {
        match self.role {
            PlugRole::BodyInput => PlugKind::BodyInput,
            PlugRole::FieldInput => PlugKind::FieldInput,
            PlugRole::BodyOutput(_) => PlugKind::BodyOutput,
            PlugRole::FieldOutput => PlugKind::FieldOutput,
        }
    }

    pub fn role(&self) -> &PlugRole {
        &self.role
    }

    pub fn resource(&self) -> PlugResource {
        self.resource
    }

    pub fn live_cache(&self) -> Option<&PlugCacheController> {
        match &self.role {
            PlugRole::BodyOutput(controller) => Some(controller),
            _ => None,
        }
    }

    pub(crate) fn live_cache_mut(&mut self) -> Option<&mut PlugCacheController> {
        match &mut self.role {
            PlugRole::BodyOutput(controller) => Some(controller),
            _ => None,
        }
    }
}

/// Whether an operation carries a historical cache.
#[derive(Debug)]
pub enum OpCaching {
    Bearing(OpCacheController),
    NonBearing,
}

#[derive(Debug)]
pub struct Operation {
    name: String,
    type_name: String,
    family: String,
    placeholder: bool,
    activation: Activation,
    condition: Condition,
    params: BTreeMap<String, ParamValue>,
    position: Position,
    plugs: Vec<Plug>,
    caching: OpCaching,
}

impl Operation {
    /// Allocate an operation and its plugs, skipping plugs without a server resource.
    pub fn from_descriptor(
        descriptor: OpDescriptor,
        query: &dyn ServerQuery,
        config: CacheConfig,
    ) -> Self {
        let plugs: Vec<Plug> = descriptor
            .plugs
            .iter()
            .filter_map(|decl| {
                let plug = Plug::construct(&descriptor.name, decl, query, config);
                if plug.is_none() {
                    debug!(
                        target_module = SOURCE,
                        op = %descriptor.name,
                        plug = %decl.name,
                        "Plug has no server resource; omitted"
                    );
                }
                plug
            })
            .collect();

        let bearing = plugs.iter().any(|plug| plug.kind() == PlugKind::BodyOutput);
        let caching = if bearing {
            OpCaching::Bearing(OpCacheController::new(descriptor.name.clone(), config))
        } else {
            OpCaching::NonBearing
        };

        Self {
            name: descriptor.name,
            type_name: descriptor.type_name,
            family: descriptor.family,
            placeholder: descriptor.placeholder,
            activation: descriptor.activation,
            condition: Condition::Idle,
            params: descriptor.params,
            position: descriptor.position,
            plugs,
            caching,
        }
    }

    /// The sentinel that survives a graph clear.
    pub fn sentinel(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: name.to_string(),
            family: name.to_string(),
            placeholder: false,
            activation: Activation::Active,
            condition: Condition::Idle,
            params: BTreeMap::new(),
            position: Position::default(),
            plugs: Vec::new(),
            caching: OpCaching::NonBearing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn plugs(&self) -> &[Plug] {
        &self.plugs
    }

    pub fn plug(&self, name: &str) -> Option<&Plug> {
        self.plugs.iter().find(|plug| plug.name().plug() == name)
    }

    pub(crate) fn plugs_mut(&mut self) -> impl Iterator<Item = &mut Plug> {
        self.plugs.iter_mut()
    }

    pub fn caching(&self) -> &OpCaching {
        &self.caching
    }

    pub fn historical_cache(&self) -> Option<&OpCacheController> {
        match &self.caching {
            OpCaching::Bearing(controller) => Some(controller),
            OpCaching::NonBearing => None,
        }
    }

    pub(crate) fn historical_cache_mut(&mut self) -> Option<&mut OpCacheController> {
        match &mut self.caching {
            OpCaching::Bearing(controller) => Some(controller),
            OpCaching::NonBearing => None,
        }
    }

    /// Policy of the historical cache; `NoCache` for non-bearing operations.
    pub fn cache_policy(&self) -> CachePolicy {
        self.historical_cache()
            .map(OpCacheController::policy)
            .unwrap_or_default()
    }

    pub(crate) fn set_param(&mut self, name: &str, value: ParamValue) {
        self.params.insert(name.to_string(), value);
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    pub(crate) fn set_condition(&mut self, condition: Condition) {
        self.condition = condition;
    }

    /// Release every cache owned by this operation and its plugs.
    pub(crate) fn release_caches(&mut self) {
        for plug in &mut self.plugs {
            if let Some(controller) = plug.live_cache_mut() {
                controller.release();
            }
        }
        if let Some(controller) = self.historical_cache_mut() {
            controller.invalidate();
        }
    }
}
