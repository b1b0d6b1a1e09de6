//! Hybrid scoring: blends recall similarity with lexical overlap, then keeps
//! the best hit per catalog entity.
//!
//! For every recalled row:
//!   boosted  = semantic * section_boost(section)
//!   final    = α * boosted + (1 - α) * lexical
//!   score      = round(final * 100, 1)
//!   confidence = min(score, 100)
//!
//! Filtering, aggregation and ranking use `score`, which a boosted near-exact
//! match can push past 100. Only the reported `confidence` is capped.
//! The reported semantic score is the raw similarity, not the boosted one.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::catalog::CatalogRecord;
use crate::semantic::index::Candidate;
use crate::semantic::lexical::lexical_score;

/// Default semantic weight for the blend.
pub const DEFAULT_ALPHA_SEM: f64 = 0.75;

/// Default minimum confidence, as a fraction of 100.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.50;

/// Default section multipliers; unknown sections (including `COMMON_*`) get 1.0.
pub fn default_section_boosts() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("CANON_LAT".to_string(), 1.05),
        ("CANON_EN".to_string(), 1.00),
        ("SYN_LAT".to_string(), 0.95),
    ])
}

/// Tunables for blending and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    /// Weight of the boosted semantic score, in [0, 1]
    pub alpha_sem: f64,
    /// Minimum blended score, in [0, 1]; hits below it are dropped
    pub min_confidence: f64,
    /// Per-section multipliers applied to the semantic score
    pub section_boosts: BTreeMap<String, f64>,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            alpha_sem: DEFAULT_ALPHA_SEM,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            section_boosts: default_section_boosts(),
        }
    }
}

impl ScoringParams {
    pub fn section_boost(&self, section: &str) -> f64 {
        self.section_boosts.get(section).copied().unwrap_or(1.0)
    }

    /// Minimum confidence on the 0..100 scale.
    pub fn confidence_threshold(&self) -> f64 {
        self.min_confidence * 100.0
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub policy_item_id: String,
    pub canonical: String,
    pub matched_text: String,
    pub section: String,
    pub language: String,
    pub semantic_score: f64,
    pub lexical_score: f64,
    pub confidence: f64,
    /// Uncapped blended score on the 0..100 scale, used for ranking
    #[serde(skip)]
    pub score: f64,
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Score every recalled row against the normalized query, in recall order.
///
/// Rows outside `records` are skipped.
pub fn score_candidates(
    query_norm: &str,
    candidates: &[Candidate],
    records: &[CatalogRecord],
    params: &ScoringParams,
) -> Vec<SearchHit> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let record = records.get(candidate.row)?;
            Some(score_record(query_norm, candidate.score as f64, record, params))
        })
        .collect()
}

fn score_record(
    query_norm: &str,
    semantic: f64,
    record: &CatalogRecord,
    params: &ScoringParams,
) -> SearchHit {
    let lexical = lexical_score(query_norm, &record.text, &record.canonical) as f64;
    let boosted = semantic * params.section_boost(&record.section);
    let blended = params.alpha_sem * boosted + (1.0 - params.alpha_sem) * lexical;
    let score = round_to(blended * 100.0, 1);

    SearchHit {
        policy_item_id: record.policy_item_id.clone(),
        canonical: record.canonical.clone(),
        matched_text: record.text.clone(),
        section: record.section.clone(),
        language: record.language.clone(),
        semantic_score: round_to(semantic, 3),
        lexical_score: round_to(lexical, 3),
        confidence: score.clamp(0.0, 100.0),
        score,
    }
}

/// Keep the best qualifying hit per `policy_item_id`, rank by score and
/// truncate to `top_k`.
///
/// A later hit replaces an entity's current best only when strictly better.
/// An entity keeps the position where its first qualifying hit appeared, so
/// equal scores rank in recall order.
pub fn aggregate_and_rank(hits: Vec<SearchHit>, threshold: f64, top_k: usize) -> Vec<SearchHit> {
    let mut best: Vec<SearchHit> = vec![];
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        if hit.score < threshold {
            continue;
        }
        match positions.get(&hit.policy_item_id) {
            Some(&pos) => {
                if hit.score > best[pos].score {
                    best[pos] = hit;
                }
            }
            None => {
                positions.insert(hit.policy_item_id.clone(), best.len());
                best.push(hit);
            }
        }
    }

    // stable: ties keep first-seen order
    best.sort_by(|a, b| b.score.total_cmp(&a.score));
    best.truncate(top_k);
    best
}
