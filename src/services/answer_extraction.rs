use crate::schemas::ocr::{BoundingBox, TextRegion};

/// Horizontal slack around the question box when collecting answer regions.
pub(crate) const HORIZONTAL_MARGIN: i32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExtractedAnswer {
    pub(crate) text: Option<String>,
    pub(crate) bbox: Option<BoundingBox>,
    pub(crate) ocr_confidence: f64,
}

impl ExtractedAnswer {
    pub(crate) fn not_found() -> Self {
        Self { text: None, bbox: None, ocr_confidence: 0.0 }
    }

    pub(crate) fn is_found(&self) -> bool {
        self.text.is_some()
    }
}

/// Collects the regions written under `question_bbox` and joins them into one answer.
///
/// `window_bottom` is the top edge of whatever visually follows this question on
/// the page (usually the next question box); regions at or below it are ignored.
pub(crate) fn extract_answer(
    question_bbox: Option<&BoundingBox>,
    regions: &[TextRegion],
    window_bottom: Option<i32>,
) -> ExtractedAnswer {
    let Some(question_bbox) = question_bbox else {
        return ExtractedAnswer::not_found();
    };

    let bottom = question_bbox.bottom();
    let left = question_bbox.x - HORIZONTAL_MARGIN;
    let right = question_bbox.right() + HORIZONTAL_MARGIN;

    let mut matched: Vec<&TextRegion> = regions
        .iter()
        .filter(|region| region.bbox.y > bottom)
        .filter(|region| window_bottom.map_or(true, |limit| region.bbox.y < limit))
        .filter(|region| region.bbox.x >= left && region.bbox.x <= right)
        .collect();

    if matched.is_empty() {
        return ExtractedAnswer::not_found();
    }

    matched.sort_by_key(|region| (region.bbox.y, region.bbox.x));

    let text = matched.iter().map(|region| region.text.as_str()).collect::<Vec<_>>().join(" ");
    let ocr_confidence =
        matched.iter().map(|region| region.confidence).sum::<f64>() / matched.len() as f64;
    let bbox = BoundingBox::union(matched.iter().map(|region| &region.bbox));

    ExtractedAnswer { text: Some(text), bbox, ocr_confidence }
}
