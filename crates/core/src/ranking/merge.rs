//! Merge, order, truncate and group related items

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::scoring::RankingSettings;
use super::types::{Candidate, CuratedLink, FacetHits};
use super::CURATED_REASON;
use crate::domain::catalog::VariantId;
use crate::domain::flat::FlatVariant;
use crate::domain::related::{Facet, RelatedBucket, RelatedItem, RelatedVariant, RelationOrigin};

/// Fallback facets only run when curated links leave room under the limit.
pub fn needs_fallback(curated_count: usize, limit: usize) -> bool {
    curated_count < limit
}

struct Entry {
    item: RelatedItem,
    position: u32,
    created_at: Option<DateTime<Utc>>,
}

/// Union curated links and facet hits, drop the subject and same-product
/// records, order by score (curated order, then newest source record, then
/// id on ties) and cut to `limit`.
pub fn rank(
    subject: &FlatVariant,
    curated: &[CuratedLink],
    facets: &[FacetHits],
    settings: &RankingSettings,
    limit: usize,
    now: DateTime<Utc>,
) -> RelatedVariant {
    let subject_id = &subject.source_variant_id;
    let mut entries = Vec::new();

    let mut curated: Vec<&CuratedLink> = curated.iter().collect();
    curated.sort_by_key(|link| link.position);
    for link in curated {
        if &link.related_variant_id == subject_id {
            continue;
        }
        entries.push(Entry {
            item: RelatedItem {
                facet: link.facet,
                origin: RelationOrigin::Curated,
                score: settings.weights.curated,
                reason: CURATED_REASON.to_string(),
                related_variant_id: link.related_variant_id.clone(),
            },
            position: link.position,
            created_at: None,
        });
    }

    for hits in facets {
        let score = settings.weights.for_facet(hits.facet);
        for candidate in &hits.candidates {
            if !is_eligible(subject, candidate) {
                continue;
            }
            entries.push(Entry {
                item: RelatedItem {
                    facet: hits.facet,
                    origin: RelationOrigin::Computed,
                    score,
                    reason: hits.facet.reason().to_string(),
                    related_variant_id: candidate.variant_id.clone(),
                },
                position: u32::MAX,
                created_at: Some(candidate.source_created_at),
            });
        }
    }

    entries.sort_by(compare_entries);

    let mut seen: HashSet<(Facet, VariantId)> = HashSet::new();
    let related_items: Vec<RelatedItem> = entries
        .into_iter()
        .filter(|entry| seen.insert((entry.item.facet, entry.item.related_variant_id.clone())))
        .map(|entry| entry.item)
        .take(limit)
        .collect();

    RelatedVariant {
        variant_id: subject_id.clone(),
        related_count: u32::try_from(related_items.len()).unwrap_or(u32::MAX),
        last_computed: now,
        computation_version: settings.computation_version,
        related_items,
    }
}

fn is_eligible(subject: &FlatVariant, candidate: &Candidate) -> bool {
    candidate.variant_id != subject.source_variant_id && candidate.title != subject.title
}

fn compare_entries(left: &Entry, right: &Entry) -> Ordering {
    right
        .item
        .score
        .partial_cmp(&left.item.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| origin_rank(left.item.origin).cmp(&origin_rank(right.item.origin)))
        .then_with(|| left.position.cmp(&right.position))
        .then_with(|| right.created_at.cmp(&left.created_at))
        .then_with(|| left.item.related_variant_id.cmp(&right.item.related_variant_id))
}

fn origin_rank(origin: RelationOrigin) -> u8 {
    match origin {
        RelationOrigin::Curated => 0,
        RelationOrigin::Computed => 1,
    }
}

/// Storefront grouping: one bucket per facet, `cap` entries each, keeping the
/// ranked order inside every bucket. Empty buckets are omitted.
pub fn group_for_presentation(items: &[RelatedItem], cap: usize) -> Vec<RelatedBucket> {
    const BUCKET_ORDER: [Facet; 4] =
        [Facet::Producer, Facet::Region, Facet::GrapeVariety, Facet::PriceBand];

    BUCKET_ORDER
        .iter()
        .filter_map(|facet| {
            let bucket: Vec<RelatedItem> =
                items.iter().filter(|item| item.facet == *facet).take(cap).cloned().collect();
            (!bucket.is_empty()).then(|| RelatedBucket {
                name: facet.bucket_name().to_string(),
                facet: *facet,
                items: bucket,
            })
        })
        .collect()
}
