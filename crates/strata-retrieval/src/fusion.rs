//! Reciprocal rank fusion.
//!
//! Each list contributes `1 / (rank + RRF_K)` to every passage it contains,
//! with `rank` 0-based. Only positions matter, so retrievers whose raw
//! scores live on different scales combine cleanly.

use std::collections::HashMap;

use crate::document::{FusedDocument, RetrievedDocument};

/// Smoothing constant from the original RRF paper.
pub const RRF_K: f64 = 60.0;

/// Passages sharing their first 128 characters are the same passage.
const DEDUP_PREFIX_CHARS: usize = 128;

fn dedup_key(content: &str) -> String {
    content.chars().take(DEDUP_PREFIX_CHARS).collect()
}

/// Merge ranked lists into one deduplicated list, best first.
///
/// Ties keep first-seen order (lists in input order, each list top-down), so
/// the output is deterministic for the same input.
pub fn reciprocal_rank_fusion(lists: &[Vec<RetrievedDocument>]) -> Vec<FusedDocument> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<FusedDocument> = Vec::new();

    for list in lists {
        for (rank, doc) in list.iter().enumerate() {
            let contribution = 1.0 / (rank as f64 + RRF_K);
            match positions.get(&dedup_key(&doc.content)) {
                Some(&i) => {
                    fused[i].score += contribution;
                    if !fused[i].sources.contains(&doc.source) {
                        fused[i].sources.push(doc.source.clone());
                    }
                }
                None => {
                    positions.insert(dedup_key(&doc.content), fused.len());
                    fused.push(FusedDocument {
                        content: doc.content.clone(),
                        score: contribution,
                        sources: vec![doc.source.clone()],
                    });
                }
            }
        }
    }

    // sort_by is stable
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}
