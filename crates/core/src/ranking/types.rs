//! Types for the related-item ranker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::{ProducerId, RegionId, VariantId};
use crate::domain::related::Facet;
use crate::ranking::PriceBand;
use crate::sync_engine::JobDisposition;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RankingError {
    #[error("subject variant {0:?} has no published flat record")]
    SubjectNotFound(VariantId),
    #[error("store failure: {0}")]
    Store(String),
}

impl RankingError {
    pub fn disposition(&self) -> JobDisposition {
        match self {
            Self::SubjectNotFound(_) => JobDisposition::FailTerminal,
            Self::Store(_) => JobDisposition::Retry,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::SubjectNotFound(_) => "subject_not_found",
            Self::Store(_) => "store",
        }
    }
}

/// A published flat record returned by a facet query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub variant_id: VariantId,
    pub title: String,
    pub source_created_at: DateTime<Utc>,
}

/// An editorially curated link, in curation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedLink {
    pub related_variant_id: VariantId,
    pub facet: Facet,
    pub position: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FacetQuery {
    SameProducer(ProducerId),
    SharedGrapes(Vec<String>),
    SameRegion(RegionId),
    PriceBand(PriceBand),
}

/// One facet lookup over published flat records. Stores must exclude the
/// subject itself and every record sharing the subject's product title.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacetRequest {
    pub facet: Facet,
    pub query: FacetQuery,
    pub exclude_variant: VariantId,
    pub exclude_title: String,
    pub limit: usize,
}

/// Candidates a facet produced. Failed facets are passed in empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacetHits {
    pub facet: Facet,
    pub candidates: Vec<Candidate>,
}
