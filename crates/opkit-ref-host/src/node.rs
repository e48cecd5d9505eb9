//! Node descriptions handed to `create_kernel`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use opkit::{AttributeValue, KernelInfo};
use serde::{Deserialize, Serialize};

/// Compile-time description of one graph node.
///
/// ```json
/// { "name": "gelu_0", "inputs": 1, "outputs": 1, "attributes": { "approximate": "tanh" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub inputs: usize,
    pub outputs: usize,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl NodeInfo {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        NodeInfo {
            inputs,
            outputs,
            ..NodeInfo::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse node description")
    }
}

impl KernelInfo for NodeInfo {
    fn input_count(&self) -> usize {
        self.inputs
    }

    fn output_count(&self) -> usize {
        self.outputs
    }

    fn node_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_descriptions() -> Result<()> {
        let node = NodeInfo::from_json_str(
            r#"{"name": "scale_0", "inputs": 1, "outputs": 1, "attributes": {"alpha": 0.5, "axes": [0, 1]}}"#,
        )?;
        assert_eq!(node.node_name(), Some("scale_0"));
        assert_eq!(node.attribute("alpha"), Some(AttributeValue::Float(0.5)));
        assert_eq!(
            node.attribute("axes").and_then(|value| value.as_ints().map(<[i64]>::to_vec)),
            Some(vec![0, 1])
        );
        assert!(node.attribute("beta").is_none());
        Ok(())
    }

    #[test]
    fn attributes_are_optional() -> Result<()> {
        let node = NodeInfo::from_json_str(r#"{"inputs": 2, "outputs": 1}"#)?;
        assert_eq!(node, NodeInfo::new(2, 1));
        assert!(NodeInfo::from_json_str(r#"{"inputs": 2}"#).is_err());
        Ok(())
    }
}
