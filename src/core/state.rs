use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::store::{ExamStore, ReviewStore};
use crate::services::storage::StorageService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    storage: Option<StorageService>,
    exams: Arc<dyn ExamStore>,
    reviews: Arc<dyn ReviewStore>,
}

impl AppState {
    /// State backed by Postgres for both exams and review tasks.
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        storage: Option<StorageService>,
    ) -> Self {
        let store = Arc::new(db.clone());
        Self::with_stores(settings, db, redis, storage, store.clone(), store)
    }

    pub(crate) fn with_stores(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        storage: Option<StorageService>,
        exams: Arc<dyn ExamStore>,
        reviews: Arc<dyn ReviewStore>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, storage, exams, reviews }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn exams(&self) -> &Arc<dyn ExamStore> {
        &self.inner.exams
    }

    pub(crate) fn reviews(&self) -> &Arc<dyn ReviewStore> {
        &self.inner.reviews
    }
}
