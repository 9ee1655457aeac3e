//! Train/test partitioning and evaluation metrics.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Number of held-out rows for a group of `n`, kept within `[1, n - 1]`.
fn holdout_size(n: usize, test_fraction: f32) -> usize {
    if n < 2 {
        return 0;
    }
    ((n as f32 * test_fraction).round() as usize).clamp(1, n - 1)
}

/// Split row indices so every label lands in both partitions.
///
/// Labels with fewer than two rows cannot be stratified; callers drop them
/// before splitting. Returns `(train, test)`, each sorted.
pub fn stratified_split(
    labels: &[usize],
    test_fraction: f32,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let n_labels = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_labels];
    for (row, &label) in labels.iter().enumerate() {
        groups[label].push(row);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut group in groups {
        group.shuffle(rng);
        let n_test = holdout_size(group.len(), test_fraction);
        test.extend_from_slice(&group[..n_test]);
        train.extend_from_slice(&group[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Plain shuffled split of `n` rows.
pub fn random_split(n: usize, test_fraction: f32, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(rng);
    let n_test = holdout_size(n, test_fraction);
    let mut test = rows[..n_test].to_vec();
    let mut train = rows[n_test..].to_vec();
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

pub fn accuracy(predicted: &[usize], actual: &[usize]) -> f32 {
    if actual.is_empty() {
        return 0.0;
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    hits as f32 / actual.len() as f32
}

pub fn mean_absolute_error(predicted: &[f32], actual: &[f32]) -> f32 {
    if actual.is_empty() {
        return 0.0;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f32>()
        / actual.len() as f32
}

/// Coefficient of determination. Zero when the targets have no variance.
pub fn r2_score(predicted: &[f32], actual: &[f32]) -> f32 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f32>() / actual.len() as f32;
    let ss_tot: f32 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot <= f32::EPSILON {
        return 0.0;
    }
    let ss_res: f32 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}
