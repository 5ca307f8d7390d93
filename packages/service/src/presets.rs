use serde::{Deserialize, Serialize};

use scenelayer_runtime::{AnimationTiming, LayerPatch};

/// Canned animation plans. Like every other animation in the system these
/// are applied immediately; the timing rides along as metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationPreset {
    SlideInLeft,
    Pop,
    Lift,
    Settle,
}

/// From/to pair plus timing for one preset.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetPlan {
    pub from: Option<LayerPatch>,
    pub to: LayerPatch,
    pub timing: AnimationTiming,
}

impl AnimationPreset {
    /// Unrecognized names settle the layer back to rest.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "slide_in_left" => AnimationPreset::SlideInLeft,
            "pop" => AnimationPreset::Pop,
            "lift" => AnimationPreset::Lift,
            _ => AnimationPreset::Settle,
        }
    }

    pub fn plan(&self) -> PresetPlan {
        let timing = |duration: f64, ease: &str| AnimationTiming {
            duration,
            ease: ease.to_string(),
            delay: 0.0,
        };
        match self {
            AnimationPreset::SlideInLeft => PresetPlan {
                from: Some(LayerPatch::default().with_x(-120.0)),
                to: LayerPatch::default().with_x(0.0),
                timing: timing(0.4, "power2.out"),
            },
            AnimationPreset::Pop => PresetPlan {
                from: Some(LayerPatch::default().with_scale(0.8)),
                to: LayerPatch::default().with_scale(1.0),
                timing: timing(0.25, "back.out(1.7)"),
            },
            AnimationPreset::Lift => PresetPlan {
                from: Some(LayerPatch::default().with_y(10.0)),
                to: LayerPatch::default().with_y(0.0),
                timing: timing(0.3, "power1.out"),
            },
            AnimationPreset::Settle => PresetPlan {
                from: None,
                to: LayerPatch::default().with_x(0.0).with_y(0.0),
                timing: timing(0.2, "power1.out"),
            },
        }
    }
}
