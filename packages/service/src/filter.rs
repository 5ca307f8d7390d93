use serde::{Deserialize, Serialize};

use scenelayer_compiler::{CapabilityKind, LayerType, MinimalLayerRecord};

/// Typed layer-listing filter. Every criterion is optional and conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerFilter {
    pub tag: Option<String>,
    #[serde(rename = "type")]
    pub layer_type: Option<LayerType>,
    pub capability: Option<CapabilityKind>,
    pub text: Option<String>,
}

impl LayerFilter {
    pub fn matches(&self, layer: &MinimalLayerRecord) -> bool {
        if let Some(tag) = &self.tag {
            if !layer.tags.contains(tag) {
                return false;
            }
        }
        if let Some(layer_type) = self.layer_type {
            if layer.layer_type != layer_type {
                return false;
            }
        }
        if let Some(capability) = self.capability {
            if !layer.capabilities.allows(capability) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() {
                let hay = format!("{} {} {}", layer.id, layer.label, layer.aliases.join(" "))
                    .to_lowercase();
                if !hay.contains(&needle) {
                    return false;
                }
            }
        }
        true
    }
}

/// One page of a filtered listing with an opaque numeric cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPage {
    pub items: Vec<MinimalLayerRecord>,
    pub next_cursor: Option<String>,
}

pub(crate) fn paginate(items: Vec<MinimalLayerRecord>, limit: usize, cursor: Option<&str>) -> LayerPage {
    let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let next_cursor = if offset + limit < items.len() {
        Some((offset + limit).to_string())
    } else {
        None
    };
    let items = items.into_iter().skip(offset).take(limit).collect();
    LayerPage { items, next_cursor }
}
