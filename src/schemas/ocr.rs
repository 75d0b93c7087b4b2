use serde::{Deserialize, Serialize};

use crate::db::types::TextType;

/// Regions at or above this confidence are considered reliably recognized.
pub(crate) const LOW_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BoundingBox {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) width: i32,
    pub(crate) height: i32,
}

impl BoundingBox {
    pub(crate) fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub(crate) fn right(&self) -> i32 {
        self.x + self.width
    }

    pub(crate) fn union<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<Self> {
        let mut iter = boxes.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) =
            (first.x, first.y, first.right(), first.bottom());
        for bbox in iter {
            min_x = min_x.min(bbox.x);
            min_y = min_y.min(bbox.y);
            max_x = max_x.max(bbox.right());
            max_y = max_y.max(bbox.bottom());
        }
        Some(Self { x: min_x, y: min_y, width: max_x - min_x, height: max_y - min_y })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TextRegion {
    pub(crate) text: String,
    pub(crate) bbox: BoundingBox,
    pub(crate) confidence: f64,
    #[serde(rename = "type")]
    pub(crate) text_type: TextType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct OcrResult {
    pub(crate) text_regions: Vec<TextRegion>,
    pub(crate) overall_confidence: f64,
    #[serde(default)]
    pub(crate) low_confidence_regions: Vec<usize>,
    pub(crate) processing_time: f64,
    pub(crate) provider: String,
}

impl OcrResult {
    pub(crate) fn from_regions(
        provider: &str,
        text_regions: Vec<TextRegion>,
        processing_time: f64,
    ) -> Self {
        let overall_confidence = if text_regions.is_empty() {
            0.0
        } else {
            text_regions.iter().map(|region| region.confidence).sum::<f64>()
                / text_regions.len() as f64
        };
        let low_confidence_regions = text_regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.confidence < LOW_CONFIDENCE_THRESHOLD)
            .map(|(idx, _)| idx)
            .collect();

        Self {
            text_regions,
            overall_confidence: overall_confidence.clamp(0.0, 1.0),
            low_confidence_regions,
            processing_time,
            provider: provider.to_string(),
        }
    }
}
