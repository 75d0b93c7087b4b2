pub(crate) mod ai_client;
pub(crate) mod ai_collaborators;
pub(crate) mod answer_evaluation;
pub(crate) mod answer_extraction;
pub(crate) mod collaborators;
pub(crate) mod diagnosis;
pub(crate) mod exam_parsing;
pub(crate) mod mock;
pub(crate) mod ocr_client;
pub(crate) mod overall_stats;
pub(crate) mod retry;
pub(crate) mod review_routing;
pub(crate) mod review_submission;
pub(crate) mod storage;
pub(crate) mod tag_cache;
