//! Gradient-boosted tree ensembles.
//!
//! The classifier boosts one tree per class per round on the softmax
//! gradient, with Newton-step leaves. The regressor boosts least-squares
//! residuals. Both store raw (unscaled) trees plus the learning rate, so a
//! model can also be assembled by hand from known trees.

use serde::{Deserialize, Serialize};

use super::tree::{self, RegressionTree, TreeParams, MAX_ABS_LEAF};

/// Newton leaves are clamped to keep near-pure leaves from exploding.
const MAX_LEAF_MAGNITUDE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_rounds: 60,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
        }
    }
}

impl BoostingParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

// ═══════════════════════════════════════════════════════════
// Multi-class classifier
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    classes: Vec<String>,
    base_scores: Vec<f32>,
    learning_rate: f32,
    /// One entry per boosting round, one tree per class inside it.
    rounds: Vec<Vec<RegressionTree>>,
    n_features: usize,
}

impl GradientBoostedClassifier {
    pub fn new(
        classes: Vec<String>,
        base_scores: Vec<f32>,
        learning_rate: f32,
        rounds: Vec<Vec<RegressionTree>>,
        n_features: usize,
    ) -> Self {
        Self {
            classes,
            base_scores,
            learning_rate,
            rounds,
            n_features,
        }
    }

    /// Fit on `rows` with `labels` indexing into `classes`.
    pub fn fit(
        rows: &[Vec<f32>],
        labels: &[usize],
        classes: Vec<String>,
        params: &BoostingParams,
    ) -> Self {
        let k = classes.len();
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);

        let mut counts = vec![0usize; k];
        for &label in labels {
            counts[label] += 1;
        }
        let base_scores: Vec<f32> = counts
            .iter()
            .map(|&c| (c.max(1) as f32 / n.max(1) as f32).ln())
            .collect();

        let mut scores: Vec<Vec<f32>> = vec![base_scores.clone(); n];
        let indices: Vec<usize> = (0..n).collect();
        let tree_params = params.tree_params();
        let newton_scale = (k as f32 - 1.0) / k as f32;
        let mut rounds = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            let probs: Vec<Vec<f32>> = scores.iter().map(|s| softmax(s)).collect();
            let mut round = Vec::with_capacity(k);
            for class in 0..k {
                let residuals: Vec<f32> = (0..n)
                    .map(|i| f32::from(labels[i] == class) - probs[i][class])
                    .collect();
                let hessians: Vec<f32> = (0..n)
                    .map(|i| probs[i][class] * (1.0 - probs[i][class]))
                    .collect();
                let tree = tree::fit(rows, &residuals, &indices, &tree_params, |leaf| {
                    let g: f32 = leaf.iter().map(|&i| residuals[i]).sum();
                    let h: f32 = leaf.iter().map(|&i| hessians[i]).sum();
                    (newton_scale * g / h.max(1e-6))
                        .clamp(-MAX_LEAF_MAGNITUDE, MAX_LEAF_MAGNITUDE)
                });
                round.push(tree);
            }
            for (row, row_scores) in rows.iter().zip(scores.iter_mut()) {
                for (class, tree) in round.iter().enumerate() {
                    row_scores[class] += params.learning_rate * tree.predict_row(row);
                }
            }
            rounds.push(round);
        }

        Self {
            classes,
            base_scores,
            learning_rate: params.learning_rate,
            rounds,
            n_features,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn predict_proba(&self, row: &[f32]) -> Vec<f32> {
        let mut scores = self.base_scores.clone();
        for round in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += self.learning_rate * tree.predict_row(row);
            }
        }
        softmax(&scores)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("classifier has no classes".into());
        }
        if self.base_scores.len() != self.classes.len() {
            return Err(format!(
                "{} base scores for {} classes",
                self.base_scores.len(),
                self.classes.len()
            ));
        }
        if let Some(bad) = self
            .base_scores
            .iter()
            .find(|s| !s.is_finite() || s.abs() > MAX_ABS_LEAF)
        {
            return Err(format!("classifier base score {bad} is out of range"));
        }
        check_learning_rate(self.learning_rate)?;
        for (r, round) in self.rounds.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(format!("round {r} has {} trees", round.len()));
            }
            for tree in round {
                tree.validate(self.n_features)?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Least-squares regressor
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f32,
    learning_rate: f32,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostedRegressor {
    pub fn new(
        base_score: f32,
        learning_rate: f32,
        trees: Vec<RegressionTree>,
        n_features: usize,
    ) -> Self {
        Self {
            base_score,
            learning_rate,
            trees,
            n_features,
        }
    }

    pub fn fit(rows: &[Vec<f32>], targets: &[f32], params: &BoostingParams) -> Self {
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        let base_score = if n == 0 {
            0.0
        } else {
            targets.iter().sum::<f32>() / n as f32
        };
        let indices: Vec<usize> = (0..n).collect();
        let tree_params = params.tree_params();
        let mut predictions = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            let residuals: Vec<f32> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let tree = tree::fit(rows, &residuals, &indices, &tree_params, |leaf| {
                tree::mean_of(&residuals, leaf)
            });
            for (row, pred) in rows.iter().zip(predictions.iter_mut()) {
                *pred += params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
            n_features,
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_row(&self, row: &[f32]) -> f32 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| {
                acc + self.learning_rate * tree.predict_row(row)
            })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_score.is_finite() {
            return Err("regressor base score is not finite".into());
        }
        check_learning_rate(self.learning_rate)?;
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features))
    }
}

fn check_learning_rate(rate: f32) -> Result<(), String> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(format!("learning rate {rate} is not a positive number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
        let uniform = softmax(&[0.0; 4]);
        assert!(uniform.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some(0));
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn classifier_learns_separable_tokens() {
        // feature 0 = "cough", feature 1 = "wound"
        let rows = vec![
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let model = GradientBoostedClassifier::fit(
            &rows,
            &labels,
            vec!["J06.9".into(), "T14.1".into()],
            &BoostingParams::default(),
        );
        let cough = model.predict_proba(&[1.0, 0.0]);
        let wound = model.predict_proba(&[0.0, 1.0]);
        assert!(cough[0] > 0.9, "cough -> J06.9, got {cough:?}");
        assert!(wound[1] > 0.9, "wound -> T14.1, got {wound:?}");
        assert_eq!(model.n_rounds(), 60);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn hand_built_classifier_reproduces_probabilities() {
        let model = GradientBoostedClassifier::new(
            vec!["A".into(), "B".into()],
            vec![0.0, 0.0],
            1.0,
            vec![vec![RegressionTree::leaf(0.0), RegressionTree::leaf(0.895)]],
            1,
        );
        let p = model.predict_proba(&[0.0]);
        assert!((p[1] - 0.71).abs() < 0.005, "got {p:?}");
    }

    #[test]
    fn classifier_validate_catches_shape_errors() {
        let model = GradientBoostedClassifier::new(
            vec!["A".into(), "B".into()],
            vec![0.0],
            1.0,
            vec![],
            1,
        );
        assert!(model.validate().is_err());
    }

    #[test]
    fn classifier_validate_rejects_non_finite_scores() {
        let build = |base: f32, rate: f32, leaf: f32| {
            GradientBoostedClassifier::new(
                vec!["A".into(), "B".into()],
                vec![base, 0.0],
                rate,
                vec![vec![RegressionTree::leaf(leaf), RegressionTree::leaf(0.0)]],
                1,
            )
        };
        assert!(build(0.0, 1.0, 1.0).validate().is_ok());
        assert!(build(f32::NAN, 1.0, 1.0).validate().is_err());
        assert!(build(f32::INFINITY, 1.0, 1.0).validate().is_err());
        assert!(build(0.0, f32::NAN, 1.0).validate().is_err());
        assert!(build(0.0, 1.0, f32::NAN).validate().is_err());
    }

    #[test]
    fn regressor_validate_rejects_bad_learning_rate() {
        assert!(GradientBoostedRegressor::new(2.0, 0.1, vec![], 3).validate().is_ok());
        assert!(GradientBoostedRegressor::new(2.0, f32::NAN, vec![], 3).validate().is_err());
        assert!(GradientBoostedRegressor::new(f32::NAN, 0.1, vec![], 3).validate().is_err());
    }

    #[test]
    fn regressor_fits_linear_trend() {
        let rows: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32]).collect();
        let targets: Vec<f32> = (0..20).map(|i| 0.5 * i as f32).collect();
        let params = BoostingParams {
            n_rounds: 200,
            ..Default::default()
        };
        let model = GradientBoostedRegressor::fit(&rows, &targets, &params);
        let err: f32 = rows
            .iter()
            .zip(&targets)
            .map(|(r, y)| (model.predict_row(r) - y).abs())
            .sum::<f32>()
            / 20.0;
        assert!(err < 0.5, "mean abs error {err}");
        assert!(model.validate().is_ok());
    }

    #[test]
    fn regressor_without_trees_predicts_base() {
        let model = GradientBoostedRegressor::new(2.0, 0.1, vec![], 3);
        assert_eq!(model.predict_row(&[1.0, 2.0, 3.0]), 2.0);
    }
}
