//! Model database model and the `Capability` intent-label enum.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::database::schema::provider_models;
use crate::database::utils::{bool_to_int, int_to_bool};

/// Intent labels a model declares support for. Distinct from the
/// provider's wire-level "capability" (tool calling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Code,
    Plan,
    Chat,
    Embed,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Code => "code",
            Capability::Plan => "plan",
            Capability::Chat => "chat",
            Capability::Embed => "embed",
        };
        write!(f, "{s}")
    }
}

impl Capability {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Capability::Code),
            "plan" => Some(Capability::Plan),
            "chat" => Some(Capability::Chat),
            "embed" => Some(Capability::Embed),
            _ => None,
        }
    }

    /// Serialize a capability set to the comma-joined column format used
    /// by `provider_models.capabilities`.
    pub fn encode_set(caps: &HashSet<Capability>) -> String {
        let mut items: Vec<&str> = caps
            .iter()
            .map(|c| match c {
                Capability::Code => "code",
                Capability::Plan => "plan",
                Capability::Chat => "chat",
                Capability::Embed => "embed",
            })
            .collect();
        items.sort_unstable();
        items.join(",")
    }

    pub fn decode_set(s: &str) -> HashSet<Capability> {
        s.split(',')
            .filter(|s| !s.is_empty())
            .filter_map(Capability::parse)
            .collect()
    }
}

/// Tri-state tool support: a local model's tool behavior may be unknown
/// until discovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolSupport {
    Yes,
    No,
    Unknown,
}

impl ToolSupport {
    pub fn from_db(v: Option<i32>) -> Self {
        match v {
            Some(1) => ToolSupport::Yes,
            Some(0) => ToolSupport::No,
            _ => ToolSupport::Unknown,
        }
    }

    pub fn to_db(self) -> Option<i32> {
        match self {
            ToolSupport::Yes => Some(1),
            ToolSupport::No => Some(0),
            ToolSupport::Unknown => None,
        }
    }

    /// Router filter: a model whose `supports_tools` is explicitly
    /// `false` is excluded when the request needs tools.
    pub fn allows_tools(self) -> bool {
        !matches!(self, ToolSupport::No)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = provider_models)]
pub struct ModelRow {
    pub provider_name: String,
    pub model_key: String,
    pub model_name: Option<String>,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
    pub capabilities: String,
    pub quality: i32,
    pub vram_estimate_bytes: Option<i64>,
    pub supports_tools: Option<i32>,
    pub prefer_loaded: i32,
    pub enabled: i32,
}

impl ModelRow {
    /// `model_name` defaults to `model_key` and is the string sent over the wire.
    pub fn wire_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(&self.model_key)
    }

    pub fn capability_set(&self) -> HashSet<Capability> {
        Capability::decode_set(&self.capabilities)
    }

    pub fn tool_support(&self) -> ToolSupport {
        ToolSupport::from_db(self.supports_tools)
    }

    pub fn is_enabled(&self) -> bool {
        int_to_bool(self.enabled)
    }

    pub fn prefers_loaded(&self) -> bool {
        int_to_bool(self.prefer_loaded)
    }

    /// Cost formula: `tokens_in * input_rate/1e6 + tokens_out * output_rate/1e6`.
    pub fn cost(&self, tokens_in: i64, tokens_out: i64) -> f64 {
        (tokens_in as f64) * self.input_cost_per_1m / 1e6 + (tokens_out as f64) * self.output_cost_per_1m / 1e6
    }

    /// A model with empty capabilities is never routable.
    pub fn is_routable(&self) -> bool {
        self.is_enabled() && !self.capability_set().is_empty()
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = provider_models)]
pub struct NewModelRow {
    pub provider_name: String,
    pub model_key: String,
    pub model_name: Option<String>,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
    pub capabilities: String,
    pub quality: i32,
    pub vram_estimate_bytes: Option<i64>,
    pub supports_tools: Option<i32>,
    pub prefer_loaded: i32,
    pub enabled: i32,
}

impl NewModelRow {
    pub fn new(
        provider_name: impl Into<String>,
        model_key: impl Into<String>,
        capabilities: HashSet<Capability>,
        quality: i32,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            model_key: model_key.into(),
            model_name: None,
            input_cost_per_1m: 0.0,
            output_cost_per_1m: 0.0,
            capabilities: Capability::encode_set(&capabilities),
            quality,
            vram_estimate_bytes: None,
            supports_tools: None,
            prefer_loaded: bool_to_int(false),
            enabled: bool_to_int(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_roundtrip() {
        let mut caps = HashSet::new();
        caps.insert(Capability::Code);
        caps.insert(Capability::Chat);
        let encoded = Capability::encode_set(&caps);
        let decoded = Capability::decode_set(&encoded);
        assert_eq!(caps, decoded);
    }

    #[test]
    fn empty_capabilities_not_routable() {
        let row = NewModelRow::new("ollama", "a", HashSet::new(), 50);
        let row = ModelRow {
            provider_name: row.provider_name,
            model_key: row.model_key,
            model_name: row.model_name,
            input_cost_per_1m: row.input_cost_per_1m,
            output_cost_per_1m: row.output_cost_per_1m,
            capabilities: row.capabilities,
            quality: row.quality,
            vram_estimate_bytes: row.vram_estimate_bytes,
            supports_tools: row.supports_tools,
            prefer_loaded: row.prefer_loaded,
            enabled: row.enabled,
        };
        assert!(!row.is_routable());
    }

    #[test]
    fn tool_support_allows_unless_explicit_false() {
        assert!(ToolSupport::Unknown.allows_tools());
        assert!(ToolSupport::Yes.allows_tools());
        assert!(!ToolSupport::No.allows_tools());
    }

    #[test]
    fn cost_formula() {
        let row = ModelRow {
            provider_name: "p".into(),
            model_key: "m".into(),
            model_name: None,
            input_cost_per_1m: 3.0,
            output_cost_per_1m: 15.0,
            capabilities: "chat".into(),
            quality: 50,
            vram_estimate_bytes: None,
            supports_tools: None,
            prefer_loaded: 0,
            enabled: 1,
        };
        let cost = row.cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }
}
