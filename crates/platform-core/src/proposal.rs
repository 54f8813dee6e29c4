use crate::digest::canonical_hash;
use crate::error::{PlatformError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// Ownership layer a proposed tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Platform,
    Team,
    Personal,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Platform, Layer::Team, Layer::Personal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Platform => "platform",
            Layer::Team => "team",
            Layer::Personal => "personal",
        }
    }

    /// Who owns tools in this layer and what they may assume.
    pub fn describe(&self) -> LayerDescription {
        let (owner, scope, may_depend_on): (&str, &str, &[Layer]) = match self {
            Layer::Platform => (
                "platform team",
                "Generic primitives every team can use. No team-specific assumptions; state changes are declarative.",
                &[],
            ),
            Layer::Team => (
                "owning team",
                "Workflows built on platform primitives for one team's stack.",
                &[Layer::Platform],
            ),
            Layer::Personal => (
                "individual operator",
                "Conveniences for one person's workflow. Never a dependency of other layers.",
                &[Layer::Platform, Layer::Team],
            ),
        };
        LayerDescription {
            layer: *self,
            owner: owner.to_string(),
            scope: scope.to_string(),
            may_depend_on: may_depend_on.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerDescription {
    pub layer: Layer,
    pub owner: String,
    pub scope: String,
    pub may_depend_on: Vec<Layer>,
}

/// The three ownership layers, platform first.
pub fn layer_model() -> Vec<LayerDescription> {
    Layer::ALL.iter().map(Layer::describe).collect()
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "platform" => Ok(Layer::Platform),
            "team" => Ok(Layer::Team),
            "personal" => Ok(Layer::Personal),
            other => Err(PlatformError::InvalidArgument(format!(
                "invalid layer '{other}': must be one of platform, team, personal"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolProposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolProposal {
    pub tool_name: String,
    pub purpose: String,
    pub layer: Layer,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub mutates_system_state: bool,
    #[serde(default)]
    pub implementation_sketch: String,
}

/// Hashed form. Field order is fixed here, so it never depends on how the
/// proposal was deserialized. Dependency order is kept: it is part of the
/// proposal's meaning.
#[derive(Serialize)]
struct CanonicalProposal<'a> {
    tool_name: &'a str,
    purpose: &'a str,
    layer: Layer,
    dependencies: &'a [String],
    mutates_system_state: bool,
    implementation_sketch: &'a str,
}

impl ToolProposal {
    /// SHA-256 over the canonical form. Recomputed on every call, so it
    /// always reflects the current field values.
    pub fn content_hash(&self) -> Result<String> {
        canonical_hash(&CanonicalProposal {
            tool_name: self.tool_name.trim(),
            purpose: self.purpose.trim(),
            layer: self.layer,
            dependencies: &self.dependencies,
            mutates_system_state: self.mutates_system_state,
            implementation_sketch: self.implementation_sketch.trim(),
        })
    }
}
