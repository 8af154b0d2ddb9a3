//! End-to-end tests for the PDCI backend.
//!
//! Recall is checked against exact brute-force neighbors on seeded synthetic
//! data, so the results are deterministic.

#![cfg(feature = "pdci")]

use kindred::ann::{nearest_k, QueryOptions, Searcher};
use kindred::benchmark::{
    compute_ground_truth, create_clustered_dataset, create_uniform_dataset, mean_recall,
    rows_to_samples,
};
use kindred::distance::l2_distance;
use kindred::pdci::{Pdci, PdciIndex, SortedProjectionStore};
use kindred::{
    FeatureValue, IndexConfig, IndexError, NeighborIndex, PdciParams, Sample, SampleStore,
    SqliteSampleStore,
};

fn in_memory_pdci(params: PdciParams) -> Pdci {
    let store = SortedProjectionStore::open_in_memory().expect("open store");
    Pdci::new(params, store).expect("valid params")
}

// =============================================================================
// Algorithm
// =============================================================================

#[test]
fn returns_exactly_k_in_distance_order() {
    let data = create_uniform_dataset(1000, 5, 100, 42).expect("dataset");
    let mut pdci = in_memory_pdci(PdciParams::new(50, 2).with_seed(42));
    pdci.fit(&data.train).expect("fit");

    for q in data.test.rows() {
        let hits = pdci.query(q, 10, &QueryOptions::default()).expect("query");
        assert_eq!(hits.len(), 10);
        assert!(
            hits.windows(2).all(|w| w[0].0 <= w[1].0),
            "distances must be non-decreasing: {hits:?}"
        );
    }
}

#[test]
fn recall_against_brute_force() {
    let data = create_clustered_dataset(2000, 20, 32, 10, 0.05, 7).expect("dataset");
    let mut pdci = in_memory_pdci(PdciParams::new(10, 2).with_seed(7));
    pdci.fit(&data.train).expect("fit");

    let k = 10;
    let truth = data.ground_truth(k);
    let retrieved: Vec<Vec<usize>> = data
        .test
        .rows()
        .map(|q| {
            pdci.query(q, k, &QueryOptions::default())
                .expect("query")
                .into_iter()
                .map(|(_, row)| row)
                .collect()
        })
        .collect();

    let recall = mean_recall(&truth, &retrieved, k);
    assert!(recall >= 0.8, "recall@{k} = {recall}");
}

#[test]
fn tight_budgets_still_report_exact_distances() {
    let data = create_clustered_dataset(1000, 10, 16, 5, 0.1, 3).expect("dataset");
    let mut pdci = in_memory_pdci(PdciParams::new(4, 2).with_seed(3));
    pdci.fit(&data.train).expect("fit");

    let tight = QueryOptions {
        k_retrieve: Some(5),
        k_visit: Some(40),
    };
    for q in data.test.rows() {
        let hits = pdci.query(q, 5, &tight).expect("query");
        assert!(hits.len() <= 5);
        for &(distance, row) in &hits {
            let exact = l2_distance(q, data.train.row(row));
            assert_eq!(distance, exact);
        }
        // the best hit can never beat the true nearest neighbor
        let best = compute_ground_truth(q, &data.train, 1)[0];
        if let Some(&(distance, _)) = hits.first() {
            assert!(distance >= l2_distance(q, data.train.row(best)));
        }
    }
}

#[test]
fn partial_fit_keeps_the_basis() {
    let data = create_uniform_dataset(500, 300, 24, 11).expect("dataset");
    let mut pdci = in_memory_pdci(PdciParams::new(5, 2).with_seed(11));
    pdci.fit(&data.train).expect("fit");
    let basis = pdci.projection().expect("fitted").clone();

    pdci.partial_fit(&data.test).expect("partial_fit");
    assert_eq!(pdci.len(), 800);
    assert_eq!(pdci.rows().num_rows(), 800);
    assert_eq!(pdci.projection(), Some(&basis));

    // appended rows are reachable
    let q = data.test.row(123);
    let opts = QueryOptions {
        k_retrieve: None,
        k_visit: Some(10 * 800),
    };
    let hits = pdci.query(q, 1, &opts).expect("query");
    assert_eq!(hits[0], (0.0, 500 + 123));
}

#[test]
fn refit_draws_a_fresh_structure() {
    let a = create_uniform_dataset(100, 0, 8, 1).expect("dataset");
    let b = create_uniform_dataset(40, 0, 8, 2).expect("dataset");
    let mut pdci = in_memory_pdci(PdciParams::new(3, 2).with_seed(5));
    pdci.fit(&a.train).expect("fit");
    pdci.fit(&b.train).expect("refit");
    assert_eq!(pdci.len(), 40);
}

// =============================================================================
// Backend contract
// =============================================================================

#[test]
fn query_before_fit_is_not_fitted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = PdciIndex::new(&IndexConfig::new(dir.path())).expect("open");
    let data = create_uniform_dataset(1, 0, 4, 0).expect("dataset");
    let sample = &rows_to_samples(&data.train, "vector", "q")[0];
    assert!(matches!(
        index.query_candidates(sample, 5, &QueryOptions::default()),
        Err(IndexError::NotFitted("pdci"))
    ));
}

#[test]
fn searcher_hydrates_nearest_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = IndexConfig::new(dir.path());
    config.pdci = PdciParams::new(8, 2).with_seed(21);

    let data = create_clustered_dataset(300, 0, 16, 6, 0.05, 21).expect("dataset");
    let samples = rows_to_samples(&data.train, &config.vector_feature, "row");

    let mut store = SqliteSampleStore::open_in(&config).expect("open sample store");
    for s in &samples {
        store.insert_sample(s).expect("insert");
    }
    let index = PdciIndex::new(&config).expect("open index");
    let mut searcher = Searcher::new(Box::new(index), store);
    searcher.fit(&samples).expect("fit");

    let result = searcher
        .query(&samples[0], 5, &QueryOptions::default())
        .expect("query");
    assert_eq!(result.neighbors.len(), 5);
    assert!(result.neighbors.iter().all(|n| n.sample.id() != samples[0].id()));
    assert!(result
        .neighbors
        .windows(2)
        .all(|w| w[0].similarity >= w[1].similarity));
}

#[test]
fn save_and_load_answer_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = IndexConfig::new(dir.path());
    config.pdci = PdciParams::new(6, 2).with_seed(99);

    let data = create_clustered_dataset(400, 5, 12, 4, 0.1, 99).expect("dataset");
    let samples = rows_to_samples(&data.train, &config.vector_feature, "row");
    let queries = rows_to_samples(&data.test, &config.vector_feature, "query");

    let before: Vec<_> = {
        let mut index = PdciIndex::new(&config).expect("open");
        index.fit(&samples).expect("fit");
        index.save().expect("save");
        queries
            .iter()
            .map(|q| {
                index
                    .query_candidates(q, 5, &QueryOptions::default())
                    .expect("query")
            })
            .collect()
    };

    let mut loaded = PdciIndex::new(&config).expect("reopen");
    loaded.load().expect("load");
    assert_eq!(loaded.len().expect("len"), 400);
    assert_eq!(loaded.ids(), samples.iter().map(|s| s.id().clone()).collect::<Vec<_>>());

    for (q, expected) in queries.iter().zip(before) {
        let got = loaded
            .query_candidates(q, 5, &QueryOptions::default())
            .expect("query");
        assert_eq!(got, expected);
        assert_eq!(nearest_k(q.id(), got, 5).len(), 5);
    }
}

#[test]
fn estimated_dimensionality_survives_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = IndexConfig::new(dir.path());
    config.pdci = PdciParams::new(4, 2).with_seed(13);
    config.pdci.estimate_intrinsic_dim = true;

    let data = create_clustered_dataset(300, 0, 16, 3, 0.05, 13).expect("dataset");
    let samples = rows_to_samples(&data.train, &config.vector_feature, "row");
    let mut index = PdciIndex::new(&config).expect("open");
    index.fit(&samples).expect("fit");
    index.save().expect("save");

    let mut loaded = PdciIndex::new(&config).expect("reopen");
    loaded.load().expect("load");
    assert!(loaded.params().estimate_intrinsic_dim);
    let estimated = index.estimated_dim().expect("estimate");
    assert!(estimated.is_finite() && estimated > 0.0);
    assert_eq!(loaded.estimated_dim(), Some(estimated));
}

#[test]
fn failed_refit_leaves_the_index_unfitted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = IndexConfig::new(dir.path());
    config.pdci = PdciParams::new(4, 2).with_seed(5);

    let data = create_uniform_dataset(200, 1, 8, 5).expect("dataset");
    let samples = rows_to_samples(&data.train, &config.vector_feature, "row");
    let mut index = PdciIndex::new(&config).expect("open");
    index.fit(&samples).expect("fit");
    assert_eq!(index.len().expect("len"), 200);

    let poisoned = Sample::from_content(b"nan")
        .with(config.vector_feature.as_str(), FeatureValue::Vector(vec![f32::NAN; 8]));
    assert!(matches!(
        index.fit(&[poisoned]),
        Err(IndexError::InvalidParameter(_))
    ));
    assert_eq!(index.len().expect("len"), 0);

    let query = &rows_to_samples(&data.test, &config.vector_feature, "q")[0];
    assert!(matches!(
        index.query_candidates(query, 5, &QueryOptions::default()),
        Err(IndexError::NotFitted("pdci"))
    ));
}

#[test]
fn load_without_save_is_not_fitted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut index = PdciIndex::new(&IndexConfig::new(dir.path())).expect("open");
    assert!(matches!(index.load(), Err(IndexError::NotFitted("pdci"))));
}
