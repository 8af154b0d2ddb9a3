//! Retrieval quality metrics.

use std::collections::HashSet;

/// Fraction of the true `k` nearest neighbors that were retrieved.
///
/// recall@k = |retrieved[..k] ∩ ground_truth[..k]| / k
pub fn recall_at_k(ground_truth: &[usize], retrieved: &[usize], k: usize) -> f32 {
    if k == 0 || ground_truth.is_empty() {
        return 0.0;
    }
    let truth: HashSet<usize> = ground_truth.iter().take(k).copied().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|id| truth.contains(id))
        .count();
    hits as f32 / k.min(ground_truth.len()) as f32
}

/// Mean recall@k over paired query results.
pub fn mean_recall(ground_truths: &[Vec<usize>], retrievals: &[Vec<usize>], k: usize) -> f32 {
    if ground_truths.is_empty() {
        return 0.0;
    }
    let total: f32 = ground_truths
        .iter()
        .zip(retrievals)
        .map(|(gt, got)| recall_at_k(gt, got, k))
        .sum();
    total / ground_truths.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_counts_overlap() {
        assert_eq!(recall_at_k(&[1, 2, 3, 4], &[1, 2, 3, 4], 4), 1.0);
        assert_eq!(recall_at_k(&[1, 2, 3, 4], &[1, 2, 9, 8], 4), 0.5);
        assert_eq!(recall_at_k(&[1, 2], &[], 2), 0.0);
        assert_eq!(recall_at_k(&[], &[1], 1), 0.0);
    }

    #[test]
    fn duplicates_do_not_inflate_recall() {
        assert_eq!(recall_at_k(&[1, 2], &[1, 1], 2), 0.5);
    }

    #[test]
    fn short_ground_truth() {
        // fewer than k rows exist
        assert_eq!(recall_at_k(&[5, 6], &[6, 5], 10), 1.0);
    }

    #[test]
    fn mean_over_queries() {
        let gt = vec![vec![1, 2], vec![3, 4]];
        let got = vec![vec![1, 2], vec![3, 9]];
        assert!((mean_recall(&gt, &got, 2) - 0.75).abs() < 1e-6);
    }
}
