//! End-to-end search scenarios over a small catalog.

use std::collections::HashSet;

use crate::catalog;
use crate::semantic::cache::CacheOutcome;
use crate::semantic::SemanticSearchError;
use crate::tests::support::{
    record, sample_catalog, service_with, service_with_embedder, FlakyEmbedder, HashEmbedder,
};

fn ids(results: &[crate::semantic::SearchHit]) -> Vec<&str> {
    results.iter().map(|h| h.policy_item_id.as_str()).collect()
}

#[test]
fn test_vitamin_c_finds_ascorbic_acid() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    let results = service.search("vitamin c", None).unwrap();

    assert!(!results.is_empty());
    let top = &results[0];
    assert_eq!(top.policy_item_id, "123");
    assert_eq!(top.matched_text, "Vitamin C");
    assert_eq!(top.canonical, "Ascorbic acid");
    assert!((top.lexical_score - 1.0).abs() < 1e-9);
    assert!(top.confidence > 90.0);
}

#[test]
fn test_results_are_unique_and_qualified() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    for query in ["vitamin c", "salt", "chia", "ascorbic acid", "powder"] {
        let results = service.search(query, None).unwrap();

        let unique: HashSet<&str> = ids(&results).into_iter().collect();
        assert_eq!(unique.len(), results.len(), "duplicate entity for {query:?}");
        assert!(results.len() <= 10);

        for hit in &results {
            assert!(hit.confidence >= 50.0, "{query:?}: {hit:?}");
            assert!((0.0..=100.0).contains(&hit.confidence));
            assert!((0.0..=1.0).contains(&hit.lexical_score));
        }

        // descending confidence
        assert!(results.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }
}

#[test]
fn test_unrelated_entities_filtered() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    let results = service.search("vitamin c", None).unwrap();
    assert!(!ids(&results).contains(&"790"));
    assert!(!ids(&results).contains(&"456"));
}

#[test]
fn test_top_k_limits_results() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    let all = service.search("salt", Some(10)).unwrap();
    assert!(all.len() >= 2);

    let one = service.search("salt", Some(1)).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0], all[0]);
}

#[test]
fn test_punctuation_only_query_does_not_fail() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    let results = service.search("!!! ???", None).unwrap();
    for hit in &results {
        assert_eq!(hit.lexical_score, 0.0);
    }
}

#[test]
fn test_brute_force_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), false);

    let first = service.search("vitamin c", None).unwrap();
    let second = service.search("vitamin c", None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_recall_strategies_agree() {
    let flat_dir = tempfile::tempdir().unwrap();
    let brute_dir = tempfile::tempdir().unwrap();
    let flat = service_with(flat_dir.path(), sample_catalog(), true);
    let brute = service_with(brute_dir.path(), sample_catalog(), false);

    for query in ["vitamin c", "chia seeds"] {
        let a = flat.search(query, None).unwrap();
        let b = brute.search(query, None).unwrap();
        assert_eq!(ids(&a), ids(&b), "{query:?}");
    }
}

#[test]
fn test_cached_service_returns_same_results() {
    let tmp = tempfile::tempdir().unwrap();

    let (built, outcome) = service_with_embedder(
        tmp.path(),
        sample_catalog(),
        true,
        Box::new(HashEmbedder::new("test-model")),
    );
    assert_eq!(outcome, CacheOutcome::Rebuilt);
    let expected = built.search("vitamin c", None).unwrap();

    // a fresh service over the same cache directory loads instead of rebuilding
    let (loaded, outcome) = service_with_embedder(
        tmp.path(),
        sample_catalog(),
        true,
        Box::new(HashEmbedder::new("test-model")),
    );
    assert_eq!(outcome, CacheOutcome::Hit);
    assert_eq!(loaded.indexed_count(), sample_catalog().len());
    assert_eq!(loaded.search("vitamin c", None).unwrap(), expected);
}

#[test]
fn test_failed_query_leaves_service_usable() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _) = service_with_embedder(
        tmp.path(),
        sample_catalog(),
        true,
        Box::new(FlakyEmbedder::new("test-model", "boom")),
    );

    let failed = service.search("boom", None);
    assert!(matches!(failed, Err(SemanticSearchError::Embedding(_))));

    assert!(service.is_initialized());
    assert_eq!(service.indexed_count(), sample_catalog().len());
    let results = service.search("vitamin c", None).unwrap();
    assert_eq!(results[0].policy_item_id, "123");
}

#[test]
fn test_entity_keeps_its_best_row() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(tmp.path(), sample_catalog(), true);

    let results = service.search("salvia hispanica", None).unwrap();
    assert_eq!(results[0].policy_item_id, "456");
    assert_eq!(results[0].matched_text, "Salvia hispanica");
    assert_eq!(results[0].language, "la");
}

#[test]
fn test_catalog_files_to_results() {
    let tmp = tempfile::tempdir().unwrap();
    let mv = tmp.path().join("multivectors.csv");
    let cards = tmp.path().join("cards.csv");
    std::fs::write(
        &mv,
        "policy_item_id,text,section,language\n\
         123,Vitamin C,CANON_EN,en\n\
         123,Acidum ascorbicum,CANON_LAT,la\n\
         456,Chia seeds,CANON_EN,en\n",
    )
    .unwrap();
    std::fs::write(&cards, "policy_item_id,canonical\n123,Ascorbic acid\n456,Chia seed\n").unwrap();

    let (rows, records) = catalog::load(&mv, Some(&cards)).unwrap();
    assert_eq!(rows.len(), records.len());

    let service = service_with(&tmp.path().join("cache"), records, true);
    let results = service.search("ascorbic acid", None).unwrap();

    assert_eq!(results[0].policy_item_id, "123");
    // the canonical name alone gives a full lexical match
    assert_eq!(results[0].lexical_score, 1.0);
}

#[test]
fn test_single_row_below_threshold_never_returned() {
    let tmp = tempfile::tempdir().unwrap();
    let service = service_with(
        tmp.path(),
        vec![record("1", "Vitamin C", "CANON_EN", ""), record("2", "Zzyzx", "CANON_EN", "")],
        true,
    );

    let results = service.search("vitamin c", None).unwrap();
    assert_eq!(ids(&results), vec!["1"]);
}
