use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::services::ai_client::AiClient;
use crate::services::ai_collaborators::{
    AiDiagnosisGenerator, AiKnowledgeTagger, AiSubjectiveScorer,
};
use crate::services::collaborators::{
    DiagnosisGenerator, ImageSource, KnowledgeTagger, OcrProvider, ReportRenderer, SubjectiveScorer,
};
use crate::services::mock::{
    MockDiagnosisGenerator, MockImageSource, MockKnowledgeTagger, MockOcrProvider,
    MockReportRenderer, MockSubjectiveScorer,
};
use crate::services::ocr_client::HttpOcrClient;
use crate::services::retry::RetryPolicy;
use crate::services::storage::StorageReportRenderer;
use crate::services::tag_cache::CachedKnowledgeTagger;

/// Everything the pipeline calls out to.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) images: Arc<dyn ImageSource>,
    pub(crate) ocr: Arc<dyn OcrProvider>,
    pub(crate) tagger: Arc<dyn KnowledgeTagger>,
    pub(crate) scorer: Arc<dyn SubjectiveScorer>,
    pub(crate) diagnosis: Arc<dyn DiagnosisGenerator>,
    pub(crate) renderer: Arc<dyn ReportRenderer>,
}

impl Collaborators {
    pub(crate) fn mock() -> Self {
        Self {
            images: Arc::new(MockImageSource),
            ocr: Arc::new(MockOcrProvider),
            tagger: Arc::new(MockKnowledgeTagger),
            scorer: Arc::new(MockSubjectiveScorer),
            diagnosis: Arc::new(MockDiagnosisGenerator),
            renderer: Arc::new(MockReportRenderer),
        }
    }

    pub(crate) fn from_state(state: &AppState) -> Result<Self> {
        let settings = state.settings();
        if settings.pipeline().use_mock_services {
            tracing::warn!(
                "USE_MOCK_SERVICES is set; pipeline runs against in-process collaborators"
            );
            return Ok(Self::mock());
        }

        let storage = state.storage().cloned().context("S3 storage is required by the pipeline")?;
        let retry = RetryPolicy::from_settings(settings.pipeline());
        let ai = AiClient::from_settings(settings)?;
        let ocr = HttpOcrClient::from_settings(settings, retry.clone())?;
        let tagger = CachedKnowledgeTagger::new(
            AiKnowledgeTagger::new(ai.clone(), retry.clone()),
            state.redis().clone(),
            settings.pipeline().knowledge_cache_ttl_seconds,
        );

        Ok(Self {
            images: Arc::new(storage.clone()),
            ocr: Arc::new(ocr),
            tagger: Arc::new(tagger),
            scorer: Arc::new(AiSubjectiveScorer::new(ai.clone(), retry.clone())),
            diagnosis: Arc::new(AiDiagnosisGenerator::new(ai, retry)),
            renderer: Arc::new(StorageReportRenderer::new(storage)),
        })
    }
}
