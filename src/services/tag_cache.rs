use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::core::redis::RedisHandle;
use crate::schemas::parser::Question;
use crate::services::collaborators::{KnowledgeEnrichment, KnowledgeTagger};

/// Read-through Redis cache in front of a knowledge tagger.
pub(crate) struct CachedKnowledgeTagger<T> {
    inner: T,
    redis: RedisHandle,
    ttl_seconds: u64,
}

impl<T> CachedKnowledgeTagger<T> {
    pub(crate) fn new(inner: T, redis: RedisHandle, ttl_seconds: u64) -> Self {
        Self { inner, redis, ttl_seconds }
    }
}

pub(crate) fn cache_key(subject: Option<&str>, question_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    hasher.update(question_text.as_bytes());
    format!("knowledge:{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl<T: KnowledgeTagger> KnowledgeTagger for CachedKnowledgeTagger<T> {
    async fn enrich(
        &self,
        question: &Question,
        subject: Option<&str>,
    ) -> anyhow::Result<KnowledgeEnrichment> {
        let key = cache_key(subject, &question.question_text);

        match self.redis.get_string(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<KnowledgeEnrichment>(&raw) {
                Ok(cached) => {
                    tracing::debug!(question_id = %question.question_id, "knowledge cache hit");
                    return Ok(cached);
                }
                Err(err) => {
                    tracing::warn!(
                        key = %key,
                        error = %err,
                        "discarding malformed knowledge cache entry"
                    )
                }
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(key = %key, error = %err, "knowledge cache read failed"),
        }

        let enrichment = self.inner.enrich(question, subject).await?;

        match serde_json::to_string(&enrichment) {
            Ok(raw) => {
                if let Err(err) = self.redis.set_string_ex(&key, &raw, self.ttl_seconds).await {
                    tracing::warn!(key = %key, error = %err, "knowledge cache write failed");
                }
            }
            Err(err) => tracing::warn!(error = %err, "knowledge enrichment not serializable"),
        }

        Ok(enrichment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::MockKnowledgeTagger;
    use crate::test_support::question;

    #[test]
    fn cache_key_depends_on_subject_and_text() {
        let math = cache_key(Some("math"), "1 + 1 = ?");
        assert!(math.starts_with("knowledge:"));
        assert_eq!(math.len(), "knowledge:".len() + 64);
        assert_eq!(math, cache_key(Some("math"), "1 + 1 = ?"));
        assert_ne!(math, cache_key(Some("physics"), "1 + 1 = ?"));
        assert_ne!(math, cache_key(None, "1 + 1 = ?"));
    }

    #[tokio::test]
    async fn falls_through_to_inner_tagger_without_redis() {
        let redis = RedisHandle::new("redis://127.0.0.1:6379/0".to_string());
        let tagger = CachedKnowledgeTagger::new(MockKnowledgeTagger, redis, 60);
        let q = question("Q1", "函数 f(x) 的单调区间", None);

        let enrichment = tagger.enrich(&q, Some("math")).await.expect("enrichment");
        assert!(!enrichment.knowledge_tags.is_empty());
    }
}
