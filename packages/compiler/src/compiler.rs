use std::collections::{BTreeMap, HashSet};

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::CompileError;
use crate::schema::{
    BBox, CompileManifest, FullLayerMap, LayerCapabilities, LayerConstraints, LayerMapDocument,
    LayerMetadata, LayerRecord, LayerType, MinimalLayerMap, MinimalLayerRecord, Origin,
    SCHEMA_VERSION,
};
use scenelayer_common::{content_digest, iso_now, payload_checksum, text_checksum};

/// Compiler version baked into manifests when none is supplied.
pub const DEFAULT_COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Structural, non-visual nodes: never emitted, never traversed, excluded
/// from every ancestor's bounding-box union.
const SKIPPED_TAGS: &[&str] = &["defs", "clipPath", "mask", "style", "metadata", "title", "desc"];

const SHAPE_TAGS: &[&str] = &["rect", "circle", "ellipse", "line", "polygon", "polyline", "path"];

/// Why a compile is (or is not) required, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecompileReason {
    ManualRecompile,
    MissingManifest,
    SourceChecksumChanged,
    CompilerVersionChanged,
}

impl RecompileReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecompileReason::ManualRecompile => "manual_recompile",
            RecompileReason::MissingManifest => "missing_manifest",
            RecompileReason::SourceChecksumChanged => "source_checksum_changed",
            RecompileReason::CompilerVersionChanged => "compiler_version_changed",
        }
    }
}

impl std::fmt::Display for RecompileReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one compile emits.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub minimal: MinimalLayerMap,
    pub full: FullLayerMap,
    pub manifest: CompileManifest,
}

/// Compiles vector-graphic source markup into layer-map projections.
///
/// Deterministic: byte-identical source under the same compiler version
/// reproduces identical ids, fingerprints, ordering, and projection
/// checksums. The instance carries all configuration; there is no ambient
/// global state.
#[derive(Debug, Clone)]
pub struct DocumentCompiler {
    compiler_version: String,
}

impl Default for DocumentCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_COMPILER_VERSION)
    }
}

impl DocumentCompiler {
    pub fn new(compiler_version: impl Into<String>) -> Self {
        Self {
            compiler_version: compiler_version.into(),
        }
    }

    pub fn compiler_version(&self) -> &str {
        &self.compiler_version
    }

    pub fn source_checksum(&self, source: &str) -> String {
        text_checksum(source)
    }

    /// Decide whether `source` needs a fresh compile against a previous
    /// manifest. `None` means the previous artifacts are still valid.
    ///
    /// Precedence: manual override, then missing manifest, then source
    /// checksum, then compiler version.
    pub fn needs_recompile(
        &self,
        source: &str,
        previous_manifest: Option<&CompileManifest>,
        manual: bool,
    ) -> Option<RecompileReason> {
        if manual {
            return Some(RecompileReason::ManualRecompile);
        }
        let Some(manifest) = previous_manifest else {
            return Some(RecompileReason::MissingManifest);
        };
        if manifest.source_checksum != self.source_checksum(source) {
            return Some(RecompileReason::SourceChecksumChanged);
        }
        if manifest.compiler_version != self.compiler_version {
            return Some(RecompileReason::CompilerVersionChanged);
        }
        None
    }

    /// Compile source markup into both layer-map projections and a manifest.
    ///
    /// Malformed markup fails outright; no partial result is returned.
    #[instrument(skip(self, source), fields(version = %self.compiler_version))]
    pub fn compile(&self, source: &str) -> Result<CompileOutput, CompileError> {
        let document = roxmltree::Document::parse(source)?;
        let source_checksum = self.source_checksum(source);
        let generated_at = iso_now();

        let records = collect_layers(document.root_element());
        info!(layers = records.len(), "document compiled");

        let minimal_layers: Vec<MinimalLayerRecord> =
            records.iter().map(MinimalLayerRecord::from).collect();

        let minimal = LayerMapDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            compiler_version: self.compiler_version.clone(),
            source_checksum: source_checksum.clone(),
            generated_at: generated_at.clone(),
            layer_count: minimal_layers.len(),
            layers: minimal_layers,
        };

        let full = LayerMapDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            compiler_version: self.compiler_version.clone(),
            source_checksum: source_checksum.clone(),
            generated_at: generated_at.clone(),
            layer_count: records.len(),
            layers: records,
        };

        let manifest = CompileManifest {
            schema_version: SCHEMA_VERSION.to_string(),
            compiler_version: self.compiler_version.clone(),
            source_checksum,
            layer_map_min_checksum: payload_checksum(&serde_json::to_value(&minimal)?),
            layer_map_full_checksum: payload_checksum(&serde_json::to_value(&full)?),
            generated_at,
        };

        Ok(CompileOutput {
            minimal,
            full,
            manifest,
        })
    }
}

/// Intermediate slot for one visited element: the record under construction
/// plus the indices needed for the bottom-up bbox pass.
struct NodeSlot {
    record: LayerRecord,
    own_bbox: BBox,
    child_indices: Vec<usize>,
}

/// Walk the element tree and produce layer records in paint order.
///
/// Two explicit passes over a flat node array, no call-stack recursion:
/// a pre-order pass assigns ids, z-indices, and parent/child links, then a
/// reverse pass resolves bounding boxes bottom-up (group = union of
/// children; non-group = union of its own shape box with any element
/// children).
fn collect_layers(root: roxmltree::Node<'_, '_>) -> Vec<LayerRecord> {
    let mut slots: Vec<NodeSlot> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    let mut stack: Vec<(roxmltree::Node<'_, '_>, Option<usize>)> = vec![(root, None)];
    while let Some((node, parent)) = stack.pop() {
        let tag = node.tag_name().name();
        if SKIPPED_TAGS.contains(&tag) {
            continue;
        }

        let fingerprint = fingerprint_for_node(node);
        let layer_id = stable_layer_id(node, &fingerprint);
        if !seen_ids.insert(layer_id.clone()) {
            warn!(
                layer_id = %layer_id,
                "duplicate layer id synthesized; the later record wins in id-indexed lookups"
            );
        }
        let label = layer_label(node, &layer_id);
        let aliases = tokenize(&[layer_id.as_str(), label.as_str()]);
        let tags = tokenize(&[
            node.attribute("data-label").unwrap_or(""),
            node.attribute("class").unwrap_or(""),
        ]);
        let layer_type = infer_type(tag);
        let capabilities = infer_capabilities(layer_type);
        let constraints = LayerConstraints {
            max_rotation: capabilities.max_rotation.unwrap_or(45.0),
            min_depth: capabilities.min_depth.unwrap_or(-200.0),
            max_depth: capabilities.max_depth.unwrap_or(200.0),
        };

        let index = slots.len();
        let z_index = index as u32;
        debug!(layer_id = %layer_id, tag, z_index, "visiting node");

        let parent_id = parent.map(|p| slots[p].record.id.clone());
        if let Some(p) = parent {
            slots[p].child_indices.push(index);
            slots[p].record.children.push(layer_id.clone());
        }

        slots.push(NodeSlot {
            own_bbox: bbox_for_element(node),
            child_indices: Vec::new(),
            record: LayerRecord {
                id: layer_id,
                label,
                layer_type,
                bbox: BBox::ZERO,
                default_origin: None,
                z_index,
                tags,
                aliases,
                capabilities,
                fingerprint,
                children: Vec::new(),
                constraints,
                metadata: LayerMetadata {
                    tag: tag.to_string(),
                    parent: parent_id,
                    attribute_count: node.attributes().count(),
                },
            },
        });

        // Reversed so the plain stack yields document order.
        for child in node.children().filter(|c| c.is_element()).collect::<Vec<_>>().into_iter().rev() {
            stack.push((child, Some(index)));
        }
    }

    // Children always sit after their parent in pre-order, so a reverse
    // sweep resolves every child box before its parent needs it.
    for i in (0..slots.len()).rev() {
        let child_boxes: Vec<BBox> = slots[i]
            .child_indices
            .iter()
            .map(|&c| slots[c].record.bbox)
            .collect();

        let bbox = if slots[i].record.layer_type == LayerType::Group {
            BBox::union(&child_boxes)
        } else if child_boxes.is_empty() {
            slots[i].own_bbox
        } else {
            let mut all = vec![slots[i].own_bbox];
            all.extend(child_boxes);
            BBox::union(&all)
        };

        slots[i].record.bbox = bbox;
        slots[i].record.default_origin = Some(Origin {
            x: bbox.cx,
            y: bbox.cy,
        });
    }

    slots.into_iter().map(|slot| slot.record).collect()
}

/// Numeric attribute parsing: trims, strips a `px` suffix, falls back to the
/// default on anything unparseable.
fn to_float(value: Option<&str>, default: f64) -> f64 {
    let Some(raw) = value else {
        return default;
    };
    let cleaned = raw.trim().trim_end_matches("px").trim();
    if cleaned.is_empty() {
        return default;
    }
    cleaned.parse::<f64>().unwrap_or(default)
}

/// Parse a polygon/polyline `points` list with comma or whitespace separators.
fn parse_points(value: &str) -> Vec<(f64, f64)> {
    let normalized = value.replace(',', " ");
    let raw: Vec<&str> = normalized.split_whitespace().collect();
    raw.chunks_exact(2)
        .map(|pair| (to_float(Some(pair[0]), 0.0), to_float(Some(pair[1]), 0.0)))
        .collect()
}

fn infer_type(tag: &str) -> LayerType {
    if tag == "text" {
        LayerType::Text
    } else if SHAPE_TAGS.contains(&tag) {
        LayerType::Shape
    } else if tag == "g" {
        LayerType::Group
    } else if tag == "image" {
        LayerType::Image
    } else {
        LayerType::Unknown
    }
}

/// Capability inference is purely type-based: every layer may move, scale,
/// rotate, fade, and change depth within the shared bounds; effects are for
/// shapes, groups, and images; jitter is shape-only.
fn infer_capabilities(layer_type: LayerType) -> LayerCapabilities {
    let (effect, jitter) = match layer_type {
        LayerType::Shape => (true, true),
        LayerType::Group | LayerType::Image => (true, false),
        LayerType::Text | LayerType::Unknown => (false, false),
    };
    LayerCapabilities {
        can_move: true,
        scale: true,
        rotate: true,
        opacity: true,
        depth: true,
        effect,
        jitter,
        max_rotation: Some(45.0),
        min_depth: Some(-200.0),
        max_depth: Some(200.0),
    }
}

/// Tag-specific bounding box for one element, ignoring children.
fn bbox_for_element(node: roxmltree::Node<'_, '_>) -> BBox {
    let attr = |name: &str| node.attribute(name);
    match node.tag_name().name() {
        "rect" => {
            let x = to_float(attr("x"), 0.0);
            let y = to_float(attr("y"), 0.0);
            let w = to_float(attr("width"), 0.0).max(0.0);
            let h = to_float(attr("height"), 0.0).max(0.0);
            BBox::new(x, y, w, h)
        }
        "circle" => {
            let cx = to_float(attr("cx"), 0.0);
            let cy = to_float(attr("cy"), 0.0);
            let r = to_float(attr("r"), 0.0).max(0.0);
            BBox::new(cx - r, cy - r, 2.0 * r, 2.0 * r)
        }
        "ellipse" => {
            let cx = to_float(attr("cx"), 0.0);
            let cy = to_float(attr("cy"), 0.0);
            let rx = to_float(attr("rx"), 0.0).max(0.0);
            let ry = to_float(attr("ry"), 0.0).max(0.0);
            BBox::new(cx - rx, cy - ry, 2.0 * rx, 2.0 * ry)
        }
        "line" => {
            let x1 = to_float(attr("x1"), 0.0);
            let y1 = to_float(attr("y1"), 0.0);
            let x2 = to_float(attr("x2"), 0.0);
            let y2 = to_float(attr("y2"), 0.0);
            BBox::new(x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs())
        }
        "polygon" | "polyline" => {
            let points = parse_points(attr("points").unwrap_or(""));
            if points.is_empty() {
                return BBox::ZERO;
            }
            let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
            let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
            BBox::new(min_x, min_y, (max_x - min_x).max(0.0), (max_y - min_y).max(0.0))
        }
        "path" | "text" | "image" => {
            let x = to_float(attr("x"), 0.0);
            let y = to_float(attr("y"), 0.0);
            let w = to_float(attr("width"), 1.0).max(0.0);
            let h = to_float(attr("height"), 1.0).max(0.0);
            BBox::new(x, y, w, h)
        }
        _ => BBox::ZERO,
    }
}

/// Content hash of a node excluding its own id: crc32 of the canonical JSON
/// of `{tag, sorted non-id attributes, trimmed text}`. Unlabeled nodes with
/// identical structure hash identically by design.
fn fingerprint_for_node(node: roxmltree::Node<'_, '_>) -> String {
    let mut attrs: BTreeMap<&str, &str> = BTreeMap::new();
    for attribute in node.attributes() {
        if attribute.name() == "id" {
            continue;
        }
        attrs.insert(attribute.name(), attribute.value().trim());
    }
    let text = node.text().unwrap_or("").trim();
    content_digest(&json!({
        "tag": node.tag_name().name(),
        "attrs": attrs,
        "text": text,
    }))
}

fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Stable layer id: sanitized explicit id when present, otherwise
/// `layer_<tag>_<fingerprint>`.
fn stable_layer_id(node: roxmltree::Node<'_, '_>, fingerprint: &str) -> String {
    let source_id = node.attribute("id").unwrap_or("").trim();
    if !source_id.is_empty() {
        return sanitize_id(source_id);
    }
    format!("layer_{}_{}", node.tag_name().name(), fingerprint)
}

/// Display label: explicit label attribute, else a humanized synthesized id,
/// else the id itself.
fn layer_label(node: roxmltree::Node<'_, '_>, layer_id: &str) -> String {
    let explicit = node
        .attribute("data-label")
        .or_else(|| node.attributes().find(|a| a.name() == "label").map(|a| a.value()))
        .unwrap_or("")
        .trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    if let Some(tail) = layer_id.strip_prefix("layer_") {
        let humanized = tail.replace('_', " ").trim().to_string();
        if !humanized.is_empty() {
            return humanized;
        }
    }
    layer_id.to_string()
}

/// Lowercase alnum tokens (length > 1) across the inputs, deduplicated and
/// sorted.
fn tokenize(values: &[&str]) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for value in values {
        for token in value
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| t.len() > 1)
        {
            tokens.push(token.to_string());
        }
    }
    tokens.sort();
    tokens.dedup();
    tokens
}
