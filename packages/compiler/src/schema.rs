use serde::{Deserialize, Serialize};

/// Schema version stamped into every emitted document envelope.
pub const SCHEMA_VERSION: &str = "1.0";

/// Drawable category inferred from the source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Text,
    Shape,
    Group,
    Image,
    Unknown,
}

/// Axis-aligned bounding box with a precomputed center point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub cx: f64,
    pub cy: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            cx: x + width / 2.0,
            cy: y + height / 2.0,
        }
    }

    pub const ZERO: BBox = BBox {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
        cx: 0.0,
        cy: 0.0,
    };

    /// Union of a set of boxes. Empty input collapses to the zero box.
    pub fn union(boxes: &[BBox]) -> BBox {
        let mut iter = boxes.iter();
        let Some(first) = iter.next() else {
            return BBox::ZERO;
        };

        let mut min_x = first.x;
        let mut min_y = first.y;
        let mut max_x = first.x + first.width;
        let mut max_y = first.y + first.height;
        for b in iter {
            min_x = min_x.min(b.x);
            min_y = min_y.min(b.y);
            max_x = max_x.max(b.x + b.width);
            max_y = max_y.max(b.y + b.height);
        }

        let width = (max_x - min_x).max(0.0);
        let height = (max_y - min_y).max(0.0);
        BBox::new(min_x, min_y, width, height)
    }
}

/// Transform anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub x: f64,
    pub y: f64,
}

/// Per-layer transform permissions plus optional numeric bounds.
///
/// Built once at compile time from the layer type; never consulted by the
/// state store itself (enforcement is the caller's job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerCapabilities {
    #[serde(rename = "move")]
    pub can_move: bool,
    pub scale: bool,
    pub rotate: bool,
    pub opacity: bool,
    pub depth: bool,
    pub effect: bool,
    pub jitter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_depth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<f64>,
}

/// Capability key addressable by filters and property checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Move,
    Scale,
    Rotate,
    Opacity,
    Depth,
    Effect,
    Jitter,
}

impl LayerCapabilities {
    pub fn allows(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Move => self.can_move,
            CapabilityKind::Scale => self.scale,
            CapabilityKind::Rotate => self.rotate,
            CapabilityKind::Opacity => self.opacity,
            CapabilityKind::Depth => self.depth,
            CapabilityKind::Effect => self.effect,
            CapabilityKind::Jitter => self.jitter,
        }
    }
}

/// Numeric mutation bounds, always materialized on the full projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConstraints {
    pub max_rotation: f64,
    pub min_depth: f64,
    pub max_depth: f64,
}

/// Free-form structural facts about the source node (full projection only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    pub tag: String,
    pub parent: Option<String>,
    pub attribute_count: usize,
}

/// Full (internal) layer projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub bbox: BBox,
    pub default_origin: Option<Origin>,
    pub z_index: u32,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    pub capabilities: LayerCapabilities,
    pub fingerprint: String,
    pub children: Vec<String>,
    pub constraints: LayerConstraints,
    pub metadata: LayerMetadata,
}

/// Minimal (public) layer projection: the full record minus structural fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalLayerRecord {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub bbox: BBox,
    pub default_origin: Option<Origin>,
    pub z_index: u32,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    pub capabilities: LayerCapabilities,
    pub fingerprint: String,
}

impl From<&LayerRecord> for MinimalLayerRecord {
    fn from(record: &LayerRecord) -> Self {
        Self {
            id: record.id.clone(),
            label: record.label.clone(),
            layer_type: record.layer_type,
            bbox: record.bbox,
            default_origin: record.default_origin,
            z_index: record.z_index,
            tags: record.tags.clone(),
            aliases: record.aliases.clone(),
            capabilities: record.capabilities.clone(),
            fingerprint: record.fingerprint.clone(),
        }
    }
}

/// Envelope shared by both layer-map projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMapDocument<T> {
    pub schema_version: String,
    pub compiler_version: String,
    pub source_checksum: String,
    pub generated_at: String,
    pub layer_count: usize,
    pub layers: Vec<T>,
}

pub type MinimalLayerMap = LayerMapDocument<MinimalLayerRecord>;
pub type FullLayerMap = LayerMapDocument<LayerRecord>;

/// Recompilation decision record: checksums of the source and both emitted
/// projections under a given compiler version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileManifest {
    pub schema_version: String,
    pub compiler_version: String,
    pub source_checksum: String,
    pub layer_map_min_checksum: String,
    pub layer_map_full_checksum: String,
    pub generated_at: String,
}
