//! Storefront read API over the flat and related stores.
//!
//! - `GET /api/v1/variants/{id}?locale=xx`
//! - `GET /api/v1/variants/by-slug/{slug}?locale=xx`
//! - `GET /api/v1/variants/{id}/related?locale=xx`
//!
//! Handlers only read materialized records; they never enqueue work.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::domain::flat::{FlatVariant, VariantView};
use vinoteka_core::domain::locale::{Locale, LocalePair};
use vinoteka_core::domain::related::{Facet, RelatedItem, RelationOrigin};
use vinoteka_core::errors::{ApplicationError, DomainError, InterfaceError};
use vinoteka_core::ranking::group_for_presentation;
use vinoteka_db::repositories::{FlatVariantRepository, RelatedVariantRepository, RepositoryError};

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ReadApiState {
    flat: Arc<dyn FlatVariantRepository>,
    related: Arc<dyn RelatedVariantRepository>,
    locales: LocalePair,
    bucket_cap: usize,
}

impl ReadApiState {
    pub fn new(
        flat: Arc<dyn FlatVariantRepository>,
        related: Arc<dyn RelatedVariantRepository>,
        locales: LocalePair,
        bucket_cap: usize,
    ) -> Self {
        Self { flat, related, locales, bucket_cap }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VariantResponse {
    pub locale: String,
    pub variant: VariantView,
}

#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    pub variant_id: String,
    pub locale: String,
    /// `None` until the ranker has run for this variant.
    pub last_computed: Option<DateTime<Utc>>,
    pub computation_version: Option<u32>,
    pub buckets: Vec<BucketView>,
}

#[derive(Debug, Serialize)]
pub struct BucketView {
    pub name: String,
    pub facet: Facet,
    pub items: Vec<RelatedItemView>,
}

#[derive(Debug, Serialize)]
pub struct RelatedItemView {
    pub variant_id: String,
    pub slug: String,
    pub title: String,
    pub price: Decimal,
    pub primary_image_url: Option<String>,
    pub score: f64,
    pub reason: String,
    pub origin: RelationOrigin,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

/// Interface error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "read store unavailable".to_string())
            }
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        let body = ApiErrorBody {
            error: self.0.user_message(),
            message,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ReadApiState) -> Router {
    Router::new()
        .route("/api/v1/variants/by-slug/{slug}", get(variant_by_slug))
        .route("/api/v1/variants/{id}", get(variant_by_id))
        .route("/api/v1/variants/{id}/related", get(related_variants))
        .with_state(state)
}

pub async fn variant_by_id(
    Path(id): Path<String>,
    Query(query): Query<LocaleQuery>,
    headers: HeaderMap,
    State(state): State<ReadApiState>,
) -> Result<Json<VariantResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let locale = resolve_locale(&state.locales, &query, &correlation_id)?;
    let record = published(state.flat.find_by_source_id(&VariantId(id.clone())).await)
        .map_err(|error| store_failure(error, &correlation_id))?
        .ok_or_else(|| not_found(&id, &correlation_id))?;

    Ok(Json(VariantResponse {
        locale: state.locales.code(locale).to_string(),
        variant: record.view(locale),
    }))
}

pub async fn variant_by_slug(
    Path(slug): Path<String>,
    Query(query): Query<LocaleQuery>,
    headers: HeaderMap,
    State(state): State<ReadApiState>,
) -> Result<Json<VariantResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let locale = resolve_locale(&state.locales, &query, &correlation_id)?;
    let record = published(state.flat.find_by_slug(&slug).await)
        .map_err(|error| store_failure(error, &correlation_id))?
        .ok_or_else(|| not_found(&slug, &correlation_id))?;

    Ok(Json(VariantResponse {
        locale: state.locales.code(locale).to_string(),
        variant: record.view(locale),
    }))
}

pub async fn related_variants(
    Path(id): Path<String>,
    Query(query): Query<LocaleQuery>,
    headers: HeaderMap,
    State(state): State<ReadApiState>,
) -> Result<Json<RelatedResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let locale = resolve_locale(&state.locales, &query, &correlation_id)?;
    let subject_id = VariantId(id.clone());

    published(state.flat.find_by_source_id(&subject_id).await)
        .map_err(|error| store_failure(error, &correlation_id))?
        .ok_or_else(|| not_found(&id, &correlation_id))?;

    let Some(record) = state
        .related
        .find(&subject_id)
        .await
        .map_err(|error| store_failure(error, &correlation_id))?
    else {
        return Ok(Json(RelatedResponse {
            variant_id: id,
            locale: state.locales.code(locale).to_string(),
            last_computed: None,
            computation_version: None,
            buckets: Vec::new(),
        }));
    };

    // Targets unpublished since the last ranking are dropped at read time.
    let mut live_items = Vec::with_capacity(record.related_items.len());
    let mut targets = Vec::with_capacity(record.related_items.len());
    for item in &record.related_items {
        let target = published(state.flat.find_by_source_id(&item.related_variant_id).await)
            .map_err(|error| store_failure(error, &correlation_id))?;
        if let Some(target) = target {
            live_items.push(item.clone());
            targets.push(target);
        }
    }

    let buckets = group_for_presentation(&live_items, state.bucket_cap)
        .into_iter()
        .map(|bucket| BucketView {
            name: bucket.name,
            facet: bucket.facet,
            items: bucket
                .items
                .iter()
                .filter_map(|item| {
                    targets
                        .iter()
                        .find(|target| target.source_variant_id == item.related_variant_id)
                        .map(|target| item_view(item, target, locale))
                })
                .collect(),
        })
        .collect();

    debug!(
        event_name = "api.related.served",
        correlation_id = %correlation_id,
        variant_id = %id,
        related_count = live_items.len(),
        "related variants served"
    );

    Ok(Json(RelatedResponse {
        variant_id: id,
        locale: state.locales.code(locale).to_string(),
        last_computed: Some(record.last_computed),
        computation_version: Some(record.computation_version),
        buckets,
    }))
}

fn item_view(item: &RelatedItem, target: &FlatVariant, locale: Locale) -> RelatedItemView {
    let view = target.view(locale);
    RelatedItemView {
        variant_id: view.id,
        slug: view.slug,
        title: view.title,
        price: view.price,
        primary_image_url: view.primary_image_url,
        score: item.score,
        reason: item.reason.clone(),
        origin: item.origin,
    }
}

fn published(
    lookup: Result<Option<FlatVariant>, RepositoryError>,
) -> Result<Option<FlatVariant>, RepositoryError> {
    lookup.map(|record| record.filter(|record| record.is_published))
}

fn resolve_locale(
    locales: &LocalePair,
    query: &LocaleQuery,
    correlation_id: &str,
) -> Result<Locale, ApiError> {
    let Some(code) = query.locale.as_deref().filter(|code| !code.trim().is_empty()) else {
        return Err(ApiError(InterfaceError::BadRequest {
            message: format!(
                "query parameter `locale` is required (`{}` or `{}`)",
                locales.default, locales.alternate
            ),
            correlation_id: correlation_id.to_string(),
        }));
    };
    locales.parse(code).ok_or_else(|| {
        ApiError(
            ApplicationError::Domain(DomainError::UnsupportedLocale(code.to_string()))
                .into_interface(correlation_id),
        )
    })
}

fn not_found(id: &str, correlation_id: &str) -> ApiError {
    debug!(
        event_name = "api.variant.not_found",
        correlation_id = %correlation_id,
        variant_id = %id,
        "no published flat record"
    );
    ApiError(
        ApplicationError::NotFound { entity: "variant", id: id.to_string() }
            .into_interface(correlation_id),
    )
}

fn store_failure(error: RepositoryError, correlation_id: &str) -> ApiError {
    error!(
        event_name = "api.store.unavailable",
        correlation_id = %correlation_id,
        error = %error,
        "read store failed"
    );
    ApiError(ApplicationError::Persistence(error.to_string()).into_interface(correlation_id))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
