use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::media::MediaResolver;
use vinoteka_core::projection::{flatten, ProjectionError};
use vinoteka_db::repositories::{FlatVariantRepository, RepositoryError, SourceCatalogRepository};

/// A projection that wrote a flat record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionWritten {
    pub variant_id: VariantId,
    pub written: u32,
    pub fingerprint: String,
}

/// Reads one source aggregate and overwrites its flat record.
pub struct FlatProjector {
    source: Arc<dyn SourceCatalogRepository>,
    flat: Arc<dyn FlatVariantRepository>,
    media: Arc<dyn MediaResolver>,
}

impl FlatProjector {
    pub fn new(
        source: Arc<dyn SourceCatalogRepository>,
        flat: Arc<dyn FlatVariantRepository>,
        media: Arc<dyn MediaResolver>,
    ) -> Self {
        Self { source, flat, media }
    }

    /// Projects `variant_id`. An unpublished source hides any existing flat
    /// record and still reports `SourceUnpublished`; callers decide that this
    /// is a successful no-op.
    pub async fn project_variant(
        &self,
        variant_id: &VariantId,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProjectionWritten, ProjectionError> {
        let aggregate = self.source.load_aggregate(variant_id).await.map_err(store_error)?;
        let Some(aggregate) = aggregate else {
            warn!(
                event_name = "sync.projection.not_found",
                correlation_id = %correlation_id,
                variant_id = %variant_id.0,
                "source variant does not exist"
            );
            return Err(ProjectionError::NotFound(variant_id.clone()));
        };

        match flatten(&aggregate, self.media.as_ref(), now) {
            Ok(record) => {
                let fingerprint = record.fingerprint();
                self.flat.save(record).await.map_err(store_error)?;

                info!(
                    event_name = "sync.projection.written",
                    correlation_id = %correlation_id,
                    variant_id = %variant_id.0,
                    fingerprint = %fingerprint,
                    "flat variant written"
                );
                Ok(ProjectionWritten { variant_id: variant_id.clone(), written: 1, fingerprint })
            }
            Err(error @ ProjectionError::SourceUnpublished { .. }) => {
                let retired = self.flat.retire(variant_id, now).await.map_err(store_error)?;
                info!(
                    event_name = "sync.projection.retired",
                    correlation_id = %correlation_id,
                    variant_id = %variant_id.0,
                    had_record = retired,
                    reason = %error,
                    "source not publishable; flat record hidden"
                );
                Err(error)
            }
            Err(error) => {
                warn!(
                    event_name = "sync.projection.rejected",
                    correlation_id = %correlation_id,
                    variant_id = %variant_id.0,
                    error_class = error.error_class(),
                    error = %error,
                    "projection rejected"
                );
                Err(error)
            }
        }
    }
}

fn store_error(error: RepositoryError) -> ProjectionError {
    ProjectionError::Store(error.to_string())
}
