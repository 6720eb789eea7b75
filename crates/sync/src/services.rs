use std::sync::Arc;
use std::time::Duration;

use vinoteka_core::config::AppConfig;
use vinoteka_core::sync_engine::SyncEngine;
use vinoteka_db::repositories::{
    FlatVariantRepository, RelatedVariantRepository, SourceCatalogRepository,
    SqlFlatVariantRepository, SqlRelatedVariantRepository, SqlSourceCatalogRepository,
    SqlSyncQueueRepository, SyncQueueRepository,
};
use vinoteka_db::DbPool;

use crate::dispatcher::QueueDispatcher;
use crate::jobs::PipelineJobs;
use crate::projector::FlatProjector;
use crate::ranker::RelatedRanker;
use crate::worker::SyncWorker;

/// Everything the binaries need to drive the pipeline, wired from config.
#[derive(Clone)]
pub struct SyncServices {
    pub source: Arc<dyn SourceCatalogRepository>,
    pub flat: Arc<dyn FlatVariantRepository>,
    pub related: Arc<dyn RelatedVariantRepository>,
    pub queue: Arc<dyn SyncQueueRepository>,
    pub engine: SyncEngine,
    pub projector: Arc<FlatProjector>,
    pub ranker: Arc<RelatedRanker>,
    pub dispatcher: Arc<QueueDispatcher>,
    pub jobs: Arc<PipelineJobs>,
    poll_interval: Duration,
}

impl SyncServices {
    pub fn new(
        source: Arc<dyn SourceCatalogRepository>,
        flat: Arc<dyn FlatVariantRepository>,
        related: Arc<dyn RelatedVariantRepository>,
        queue: Arc<dyn SyncQueueRepository>,
        config: &AppConfig,
    ) -> Self {
        let engine = SyncEngine::with_config(config.sync.engine_config());
        let projector = Arc::new(FlatProjector::new(
            source.clone(),
            flat.clone(),
            Arc::new(config.media.resolver()),
        ));
        let ranker = Arc::new(RelatedRanker::new(
            source.clone(),
            flat.clone(),
            related.clone(),
            config.ranking.settings(),
            config.ranking.limit,
        ));
        let dispatcher = Arc::new(QueueDispatcher::new(queue.clone(), engine.clone()));
        let jobs = Arc::new(PipelineJobs::new(source.clone(), projector.clone(), ranker.clone()));

        Self {
            source,
            flat,
            related,
            queue,
            engine,
            projector,
            ranker,
            dispatcher,
            jobs,
            poll_interval: Duration::from_millis(config.sync.poll_interval_millis),
        }
    }

    pub fn from_pool(pool: DbPool, config: &AppConfig) -> Self {
        Self::new(
            Arc::new(SqlSourceCatalogRepository::new(pool.clone())),
            Arc::new(SqlFlatVariantRepository::new(pool.clone())),
            Arc::new(SqlRelatedVariantRepository::new(pool.clone())),
            Arc::new(SqlSyncQueueRepository::new(pool)),
            config,
        )
    }

    pub fn worker(&self, worker_id: impl Into<String>) -> SyncWorker {
        SyncWorker::new(
            worker_id,
            self.queue.clone(),
            self.dispatcher.clone(),
            self.jobs.clone(),
            self.engine.clone(),
            self.poll_interval,
        )
    }
}
