//! Stack composer
//!
//! Builds the guest cluster template from an ordered list of adapters. Each
//! adapter owns a disjoint set of logical names; two adapters declaring the
//! same name is rejected with [`ReconcileError::Collision`].

use crate::bootstrap::BootstrapRenderer;
use crate::client::Parameters;
use crate::spec::ClusterSpec;
use crate::template::{ComposedStack, Fragment, StackTemplate};
use serde_json::json;
use stackflow_cloud::{ReconcileError, Result};
use stackflow_config::OperatorConfig;
use std::collections::BTreeMap;

/// Inputs shared by every adapter
pub struct AdapterContext<'a> {
    pub spec: &'a ClusterSpec,
    pub config: &'a OperatorConfig,
    pub bootstrap: &'a dyn BootstrapRenderer,
}

/// Contributes one domain of the template (network, IAM, DNS, ...)
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Must be deterministic for the same context
    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment>;
}

pub struct StackComposer {
    description: String,
    adapters: Vec<Box<dyn Adapter>>,
}

impl StackComposer {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            adapters: Vec::new(),
        }
    }

    pub fn with(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    pub fn adapters(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Build the full template; nothing is reused from earlier passes
    pub fn compose(&self, ctx: &AdapterContext<'_>) -> Result<ComposedStack> {
        let mut template = StackTemplate::new(format!("{} {}", self.description, ctx.spec.id));
        let mut parameters = Parameters::new();

        // Parameters and resources share the logical id namespace.
        let mut logical_ids: BTreeMap<String, &str> = BTreeMap::new();
        let mut outputs: BTreeMap<String, &str> = BTreeMap::new();

        for adapter in &self.adapters {
            let owner = adapter.name();
            let fragment = adapter.fragment(ctx)?;

            for (name, value) in fragment.parameters {
                claim(&mut logical_ids, &name, owner)?;
                template
                    .parameters
                    .insert(name.clone(), json!({ "Type": "String" }));
                parameters.insert(name, value);
            }
            for (name, body) in fragment.resources {
                claim(&mut logical_ids, &name, owner)?;
                template.resources.insert(name, body);
            }
            for (name, value) in fragment.outputs {
                claim(&mut outputs, &name, owner)?;
                template.outputs.insert(name, value);
            }
        }

        tracing::debug!(
            cluster = %ctx.spec.id,
            resources = template.resources.len(),
            parameters = parameters.len(),
            "composed stack template"
        );

        Ok(ComposedStack {
            template,
            parameters,
        })
    }
}

fn claim<'a>(owners: &mut BTreeMap<String, &'a str>, name: &str, owner: &'a str) -> Result<()> {
    if let Some(first) = owners.get(name) {
        return Err(ReconcileError::Collision {
            name: name.to_string(),
            first: first.to_string(),
            second: owner.to_string(),
        });
    }
    owners.insert(name.to_string(), owner);
    Ok(())
}

impl std::fmt::Debug for StackComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackComposer")
            .field("description", &self.description)
            .field("adapters", &self.adapters())
            .finish()
    }
}
