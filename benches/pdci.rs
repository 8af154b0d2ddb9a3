//! PDCI query latency and recall vs visit budget.
//!
//! Recall for each budget is printed once before timing, since criterion only
//! reports time.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kindred::ann::QueryOptions;
use kindred::benchmark::{create_clustered_dataset, mean_recall, Dataset};
use kindred::pdci::{Pdci, SortedProjectionStore};
use kindred::PdciParams;

fn build(data: &Dataset, m: usize, l: usize) -> Pdci {
    let store = SortedProjectionStore::open_in_memory().expect("store");
    let mut pdci = Pdci::new(PdciParams::new(m, l).with_seed(42), store).expect("params");
    pdci.fit(&data.train).expect("fit");
    pdci
}

fn run_queries(pdci: &Pdci, data: &Dataset, k: usize, opts: &QueryOptions) -> Vec<Vec<usize>> {
    data.test
        .rows()
        .map(|q| {
            pdci.query(black_box(q), k, opts)
                .expect("query")
                .into_iter()
                .map(|(_, row)| row)
                .collect()
        })
        .collect()
}

/// Query latency and recall at increasing `k_visit`.
fn bench_recall_vs_visit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdci_recall_vs_visit");
    group.sample_size(10);

    let k = 10;
    let data = create_clustered_dataset(5000, 20, 64, 20, 0.05, 42).expect("dataset");
    let pdci = build(&data, 10, 2);
    let truth = data.ground_truth(k);

    for k_visit in [200, 1000, 5000, 20000] {
        let opts = QueryOptions {
            k_retrieve: None,
            k_visit: Some(k_visit),
        };
        let recall = mean_recall(&truth, &run_queries(&pdci, &data, k, &opts), k);
        println!("k_visit={k_visit}: recall@{k}={recall:.3}");

        group.bench_with_input(BenchmarkId::new("k_visit", k_visit), &opts, |b, opts| {
            b.iter(|| run_queries(&pdci, &data, k, opts))
        });
    }
    group.finish();
}

/// Query latency as the number of composite groups grows.
fn bench_composite_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdci_composite_groups");
    group.sample_size(10);

    let data = create_clustered_dataset(2000, 10, 64, 10, 0.05, 7).expect("dataset");
    for l in [1, 2, 4] {
        let pdci = build(&data, 8, l);
        group.bench_with_input(BenchmarkId::new("groups", l), &l, |b, _| {
            b.iter(|| run_queries(&pdci, &data, 10, &QueryOptions::default()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recall_vs_visit, bench_composite_groups);
criterion_main!(benches);
