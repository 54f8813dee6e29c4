//! Read-only reference documents served as MCP resources.

use crate::tools::Services;
use platform_core::proposal::layer_model;
use platform_core::Result;
use serde::Serialize;

pub const DESIGN_CHECKLIST_URI: &str = "platform://rules/design-checklist";
pub const LAYER_MODEL_URI: &str = "platform://architecture/layer-model";

const YAML_MIME: &str = "application/yaml";

#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

pub fn list() -> Vec<ResourceInfo> {
    vec![
        ResourceInfo {
            uri: DESIGN_CHECKLIST_URI,
            name: "design-checklist",
            description: "Rules every tool proposal is checked against, with severity",
            mime_type: YAML_MIME,
        },
        ResourceInfo {
            uri: LAYER_MODEL_URI,
            name: "layer-model",
            description: "Ownership layers and which layers each may depend on",
            mime_type: YAML_MIME,
        },
    ]
}

/// Render the resource at `uri`. `None` when the uri is unknown.
pub fn read(uri: &str, services: &Services) -> Option<Result<String>> {
    let rendered = match uri {
        DESIGN_CHECKLIST_URI => serde_yaml::to_string(&services.validator.checklist()),
        LAYER_MODEL_URI => serde_yaml::to_string(&layer_model()),
        _ => return None,
    };
    Some(rendered.map_err(Into::into))
}
