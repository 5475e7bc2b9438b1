//! Stack template document
//!
//! Maps are ordered so the serialized template is byte-for-byte stable for
//! the same inputs.

use crate::client::Parameters;
use serde::Serialize;
use serde_json::{Value, json};
use stackflow_cloud::{ReconcileError, Result};
use std::collections::BTreeMap;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,

    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Value>,

    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl StackTemplate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

/// Contribution of one adapter to the template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Parameter declarations with their values
    pub parameters: BTreeMap<String, String>,
    pub resources: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, name: &str, body: Value) -> Self {
        self.resources.insert(name.to_string(), body);
        self
    }

    pub fn parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn output(mut self, name: &str, value: Value) -> Self {
        self.outputs
            .insert(name.to_string(), json!({ "Value": value }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.resources.is_empty() && self.outputs.is_empty()
    }
}

/// Merged template and the parameter values to deploy it with
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedStack {
    pub template: StackTemplate,
    pub parameters: Parameters,
}

impl ComposedStack {
    /// Compact template body sent to the provider
    pub fn body(&self) -> Result<String> {
        serde_json::to_string(&self.template)
            .map_err(|e| ReconcileError::contract("template", e.to_string()))
    }

    pub fn pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.template)
            .map_err(|e| ReconcileError::contract("template", e.to_string()))
    }
}

pub fn reference(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn get_att(resource: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [resource, attribute] })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// Tag list in template notation
pub fn tag_list<'a>(tags: impl IntoIterator<Item = (&'a String, &'a String)>) -> Value {
    Value::Array(
        tags.into_iter()
            .map(|(k, v)| json!({ "Key": k, "Value": v }))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_layout() {
        let mut template = StackTemplate::new("guest cluster");
        template
            .resources
            .insert("VPC".to_string(), json!({ "Type": "AWS::EC2::VPC" }));

        let stack = ComposedStack {
            template,
            parameters: Parameters::new(),
        };
        let body: Value = serde_json::from_str(&stack.body().unwrap()).unwrap();

        assert_eq!(body["AWSTemplateFormatVersion"], FORMAT_VERSION);
        assert_eq!(body["Resources"]["VPC"]["Type"], "AWS::EC2::VPC");
        assert!(body.get("Parameters").is_none());
        assert!(body.get("Outputs").is_none());
    }

    #[test]
    fn test_fragment_builder() {
        let fragment = Fragment::new()
            .parameter("HostAccountId", "210987654321")
            .output("VPCID", reference("VPC"));

        assert!(!fragment.is_empty());
        assert_eq!(fragment.parameters["HostAccountId"], "210987654321");
        assert_eq!(fragment.outputs["VPCID"], json!({ "Value": { "Ref": "VPC" } }));
        assert!(Fragment::new().is_empty());
    }
}
