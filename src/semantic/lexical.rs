//! Lexical (fuzzy) scoring for hybrid search.
//!
//! Scores a normalized query against a candidate's text and canonical name
//! with an order-insensitive token-set ratio. Both inputs are expected to be
//! already normalized by [`crate::semantic::preprocess::normalize`].
//!
//! The token-set ratio splits both strings into sets of whitespace tokens and
//! compares the shared part against each side's leftovers, so "acid ascorbic"
//! and "ascorbic acid" score 100 and a query fully contained in the candidate
//! scores 100 as well.

use std::collections::BTreeSet;

use crate::semantic::preprocess::normalize;

/// Lexical score in [0.0, 1.0] of a normalized query against a candidate.
///
/// The canonical name only contributes when it is non-empty.
pub fn lexical_score(query_norm: &str, text: &str, canonical: &str) -> f32 {
    let text_ratio = token_set_ratio(query_norm, &normalize(text)) / 100.0;
    let canonical_ratio = if canonical.is_empty() {
        0.0
    } else {
        token_set_ratio(query_norm, &normalize(canonical)) / 100.0
    };

    text_ratio.max(canonical_ratio)
}

/// Token-set similarity ratio in [0.0, 100.0].
///
/// Returns 0 when either side has no tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    // one side is a subset of the other
    if !intersect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    // BTreeSet iteration is sorted, so the joins are already in sorted order
    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = char_len(&diff_ab_joined);
    let ba_len = char_len(&diff_ba_joined);
    let sect_len = char_len(&intersect.join(" "));

    let sep = usize::from(sect_len != 0);
    let sect_ab_len = sect_len + sep + ab_len;
    let sect_ba_len = sect_len + sep + ba_len;

    let dist = indel_distance(&diff_ab_joined, &diff_ba_joined);
    let result = norm_similarity(dist, sect_ab_len + sect_ba_len);

    if sect_len == 0 {
        return result;
    }

    // sect+ab vs sect only differs by the leftover tokens, so the distance
    // follows from the lengths alone
    let sect_ab_ratio = norm_similarity(sep + ab_len, sect_len + sect_ab_len);
    let sect_ba_ratio = norm_similarity(sep + ba_len, sect_len + sect_ba_len);

    result.max(sect_ab_ratio).max(sect_ba_ratio)
}

fn norm_similarity(dist: usize, len_sum: usize) -> f32 {
    if len_sum == 0 {
        return 100.0;
    }
    100.0 - 100.0 * dist as f32 / len_sum as f32
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Insertion/deletion edit distance: `len(a) + len(b) - 2 * lcs(a, b)`.
fn indel_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    a.len() + b.len() - 2 * lcs_len(&a, &b)
}

/// Longest common subsequence length, single-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                above.max(row[j])
            };
            diag = above;
        }
    }
    row[b.len()]
}
