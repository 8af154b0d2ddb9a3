//! Index contract tests: registry, default lifecycle operations and the
//! one-hop `query_samples` expansion over a real backend and store.

use kindred::ann::{index_factory, BackendKind, Candidate, QueryOptions, Searcher};
use kindred::{
    IndexConfig, IndexError, NeighborIndex, Result, Sample, SampleId, SampleStore,
    SqliteSampleStore,
};
use std::cell::RefCell;

/// Backend that implements only the required operations.
struct Minimal;

impl NeighborIndex for Minimal {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn fit(&mut self, _samples: &[Sample]) -> Result<()> {
        Ok(())
    }

    fn query_candidates(&self, _: &Sample, _: usize, _: &QueryOptions) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

#[test]
fn optional_operations_default_to_unsupported() {
    let mut index = Minimal;
    let samples = [Sample::from_content(b"x")];
    assert!(matches!(
        index.partial_fit(&samples),
        Err(IndexError::Unsupported {
            backend: "minimal",
            operation: "partial_fit"
        })
    ));
    assert!(matches!(
        index.save(),
        Err(IndexError::Unsupported {
            operation: "save",
            ..
        })
    ));
    assert!(matches!(
        index.load(),
        Err(IndexError::Unsupported {
            operation: "load",
            ..
        })
    ));
    assert!(index.is_empty().expect("len"));
    assert_eq!(index.stats().expect("stats").backend, "minimal");
}

#[test]
fn registry_rejects_unknown_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = IndexConfig::new(dir.path());
    let err = index_factory("annoy", &config).err().expect("unknown backend");
    assert!(matches!(err, IndexError::UnknownBackend(ref name) if name == "annoy"));
    assert!(err.to_string().contains("annoy"));
}

#[test]
fn registry_builds_every_compiled_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = IndexConfig::new(dir.path());
    for name in BackendKind::available() {
        let index = index_factory(name, &config).expect("registered backend");
        assert_eq!(index.name(), name);
        assert_eq!(index.len().expect("len"), 0);
    }
}

// =============================================================================
// query_samples
// =============================================================================

/// Sample store that records every fetch.
struct RecordingStore {
    inner: SqliteSampleStore,
    fetched: RefCell<Vec<SampleId>>,
}

impl SampleStore for RecordingStore {
    fn load_sample(&self, id: &SampleId) -> Result<Option<Sample>> {
        self.fetched.borrow_mut().push(id.clone());
        self.inner.load_sample(id)
    }

    fn insert_sample_features(&mut self, id: &SampleId, features: &[u8]) -> Result<()> {
        self.inner.insert_sample_features(id, features)
    }

    fn sample_features_exists(&self, id: &SampleId) -> Result<bool> {
        self.inner.sample_features_exists(id)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

#[cfg(feature = "ctph")]
#[test]
fn expansion_fetches_each_neighbor_once() {
    use kindred::ctph::CtphIndex;
    use kindred::sample::CTPH_DIGEST_FEATURE;
    use kindred::FeatureValue;

    // four samples sharing one digest: everyone neighbors everyone
    let digest = "96:ABCDEFGHIJKLMNOP:QRSTUVWXYZab";
    let samples: Vec<Sample> = ["a", "b", "c", "d"]
        .iter()
        .map(|tag| {
            Sample::from_content(tag.as_bytes())
                .with(CTPH_DIGEST_FEATURE, FeatureValue::Text(digest.into()))
        })
        .collect();

    let mut store = RecordingStore {
        inner: SqliteSampleStore::open_in_memory().expect("store"),
        fetched: RefCell::new(Vec::new()),
    };
    for s in &samples {
        store.insert_sample(s).expect("insert");
    }
    let mut searcher = Searcher::new(Box::new(CtphIndex::in_memory().expect("index")), store);
    searcher.fit(&samples).expect("fit");

    let opts = QueryOptions::default();
    let results = searcher
        .query_samples(&samples[..1], 3, true, &opts)
        .expect("query_samples");

    // the seed, then each of its three neighbors
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].query.id(), samples[0].id());
    assert!(results.iter().all(|r| r.neighbors.len() == 3));
    assert!(results
        .iter()
        .all(|r| r.neighbors.iter().all(|n| n.similarity == 100.0)));

    let fetched = searcher.store().fetched.borrow();
    assert_eq!(fetched.len(), 3);
    assert!(!fetched.contains(samples[0].id()));

    drop(fetched);
    let plain = searcher
        .query_samples(&samples[..2], 3, false, &opts)
        .expect("query_samples");
    assert_eq!(plain.len(), 2);
}
