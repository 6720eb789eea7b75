pub mod config;
pub mod domain;
pub mod errors;
pub mod media;
pub mod projection;
pub mod ranking;
pub mod sync_engine;

pub use chrono;
pub use rust_decimal;

pub use domain::catalog::{
    BackorderPolicy, CatalogTerm, Country, CountryId, GrapeShare, Producer, ProducerId, Product,
    ProductId, Publication, PublishStatus, Region, RegionId, ServingTemperature, SourceAggregate,
    Style, StyleId, TermId, TermKind, Variant, VariantId,
};
pub use domain::flat::{FlatVariant, FlatVariantId, VariantView};
pub use domain::locale::{Locale, LocalePair, Localized};
pub use domain::related::{Facet, RelatedBucket, RelatedItem, RelatedVariant, RelationOrigin};
pub use domain::sync::{SyncTask, SyncTaskId, SyncTaskState, TaskKind, TaskOutcome};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use media::{CdnMediaResolver, ImageSize, MediaResolver, MediaUrls};
pub use projection::{flatten, ProjectionError};
pub use ranking::RankingError;
pub use sync_engine::{JobDisposition, RetryPolicy, SyncEngine, SyncEngineConfig, SyncError};
