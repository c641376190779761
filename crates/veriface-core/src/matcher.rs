use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cosine similarity above which a descriptor counts as already enrolled.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.9;
/// Best similarities above this floor that still miss the threshold are
/// logged as near matches.
pub const NEAR_MATCH_FLOOR: f64 = 0.75;
/// Every candidate above this similarity is listed in the debug log.
pub const SIMILAR_LOG_FLOOR: f64 = 0.7;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("invalid vector value (NaN/Inf) at index {index}")]
    InvalidVectorValue { index: usize },
}

/// A previously enrolled descriptor as read back from the vector store.
///
/// `vector` is whatever the store holds and is not validated; legacy or
/// corrupted rows are filtered out by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVectorRecord {
    pub id: String,
    pub vector: Vec<f64>,
    pub timestamp: String,
    pub wallet_address: Option<String>,
}

/// Best stored record above the match threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub id: String,
    /// Cosine similarity in `[0, 1]`.
    pub similarity: f64,
    pub timestamp: String,
    pub wallet_address: Option<String>,
}

/// Strategy for finding an existing enrollment of a descriptor.
pub trait Matcher {
    fn best_match(
        &self,
        query: &[f64],
        candidates: &[StoredVectorRecord],
    ) -> Result<Option<MatchResult>, MatchError>;
}

/// Exhaustive cosine-similarity scan with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineMatcher {
    pub threshold: f64,
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Matcher for CosineMatcher {
    fn best_match(
        &self,
        query: &[f64],
        candidates: &[StoredVectorRecord],
    ) -> Result<Option<MatchResult>, MatchError> {
        find_best_match(query, candidates, self.threshold)
    }
}

/// Reject vectors containing NaN or infinite values.
pub fn validate_vector(values: &[f64]) -> Result<(), MatchError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MatchError::InvalidVectorValue { index }),
        None => Ok(()),
    }
}

/// Cosine similarity of two equal-length vectors, clamped to `[0, 1]`.
///
/// A zero vector is dissimilar to everything: if either norm is zero the
/// result is `0.0`. Negative cosines are floored to `0.0`. Each vector is
/// divided by its largest magnitude first, so finite inputs near
/// `f64::MAX` or in the subnormal range cannot overflow or underflow the
/// sums.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    validate_vector(a)?;
    validate_vector(b)?;

    let (scale_a, scale_b) = (max_abs(a), max_abs(b));
    if scale_a == 0.0 || scale_b == 0.0 {
        return Ok(0.0);
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x / scale_a, y / scale_b))
        .fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return Ok(0.0);
    }
    Ok(similarity.clamp(0.0, 1.0))
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Linear scan for the stored record most similar to `query`.
///
/// Returns `Err` only when the query itself is malformed. Candidates whose
/// vectors have the wrong length or non-finite values are logged and
/// skipped. Ties keep the first candidate seen. The best candidate is
/// returned only if its similarity is strictly above `threshold`.
pub fn find_best_match(
    query: &[f64],
    candidates: &[StoredVectorRecord],
    threshold: f64,
) -> Result<Option<MatchResult>, MatchError> {
    validate_vector(query)?;

    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match cosine_similarity(query, &candidate.vector) {
            Ok(similarity) => scored.push((candidate, similarity)),
            Err(e) => {
                tracing::warn!(record_id = %candidate.id, error = %e, "skipping unusable stored vector");
            }
        }
    }

    for (record, similarity) in similar_above(&scored, SIMILAR_LOG_FLOOR) {
        tracing::debug!(
            record_id = %record.id,
            similarity,
            wallet = record.wallet_address.as_deref().unwrap_or("-"),
            "similar stored vector"
        );
    }

    let mut best: Option<(&StoredVectorRecord, f64)> = None;
    for &(candidate, similarity) in &scored {
        if best.map_or(true, |(_, b)| similarity > b) {
            best = Some((candidate, similarity));
        }
    }

    let Some((record, similarity)) = best else {
        tracing::debug!("no stored vectors to compare");
        return Ok(None);
    };

    if similarity > threshold {
        tracing::info!(record_id = %record.id, similarity, "existing enrollment matched");
        return Ok(Some(MatchResult {
            id: record.id.clone(),
            similarity,
            timestamp: record.timestamp.clone(),
            wallet_address: record.wallet_address.clone(),
        }));
    }

    if similarity > NEAR_MATCH_FLOOR {
        tracing::debug!(
            record_id = %record.id,
            similarity,
            threshold,
            "near match below threshold"
        );
    }
    Ok(None)
}

/// Scored candidates strictly above `floor`, most similar first. Equal
/// scores keep scan order.
fn similar_above<'a>(
    scored: &[(&'a StoredVectorRecord, f64)],
    floor: f64,
) -> Vec<(&'a StoredVectorRecord, f64)> {
    let mut similar: Vec<_> = scored.iter().copied().filter(|&(_, s)| s > floor).collect();
    similar.sort_by(|a, b| b.1.total_cmp(&a.1));
    similar
}
