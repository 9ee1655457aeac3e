//! CART regression trees.
//!
//! Nodes are stored in pre-order, so every child index is greater than its
//! parent's. `validate` checks this on load, which also guarantees traversal
//! terminates for artifacts read from disk.

use serde::{Deserialize, Serialize};

/// Largest leaf output accepted from an artifact.
pub const MAX_ABS_LEAF: f32 = 1.0e6;

/// One node of a fitted tree. Rows go left when `value <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    /// A single-leaf tree.
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict_row(&self, row: &[f32]) -> f32 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    /// Structural check for trees deserialized from an artifact.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() || value.abs() > MAX_ABS_LEAF {
                        return Err(format!("node {id} has leaf value {value}"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if !threshold.is_finite() {
                        return Err(format!("node {id} has threshold {threshold}"));
                    }
                    if *feature >= n_features {
                        return Err(format!(
                            "node {id} splits on feature {feature}, model has {n_features}"
                        ));
                    }
                    for child in [*left, *right] {
                        if child <= id || child >= self.nodes.len() {
                            return Err(format!("node {id} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Fitting
// ═══════════════════════════════════════════════════════════

struct SplitCandidate {
    feature: usize,
    threshold: f32,
    gain: f64,
}

/// Fit a tree on `targets` over the rows named by `indices`.
///
/// Splits minimize squared error on `targets`; leaf outputs come from
/// `leaf_value`, which lets boosting plug in Newton steps.
pub fn fit<F>(
    rows: &[Vec<f32>],
    targets: &[f32],
    indices: &[usize],
    params: &TreeParams,
    leaf_value: F,
) -> RegressionTree
where
    F: Fn(&[usize]) -> f32,
{
    let mut nodes = Vec::new();
    if indices.is_empty() {
        return RegressionTree::leaf(0.0);
    }
    grow(rows, targets, indices.to_vec(), 0, params, &leaf_value, &mut nodes);
    RegressionTree { nodes }
}

fn grow<F>(
    rows: &[Vec<f32>],
    targets: &[f32],
    indices: Vec<usize>,
    depth: usize,
    params: &TreeParams,
    leaf_value: &F,
    nodes: &mut Vec<TreeNode>,
) -> usize
where
    F: Fn(&[usize]) -> f32,
{
    let id = nodes.len();
    nodes.push(TreeNode::Leaf {
        value: leaf_value(&indices),
    });

    let min_leaf = params.min_samples_leaf.max(1);
    if depth >= params.max_depth || indices.len() < 2 * min_leaf {
        return id;
    }
    let Some(split) = best_split(rows, targets, &indices, min_leaf) else {
        return id;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| rows[i][split.feature] <= split.threshold);

    let left = grow(rows, targets, left_rows, depth + 1, params, leaf_value, nodes);
    let right = grow(rows, targets, right_rows, depth + 1, params, leaf_value, nodes);
    nodes[id] = TreeNode::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
    };
    id
}

fn best_split(
    rows: &[Vec<f32>],
    targets: &[f32],
    indices: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let n_features = rows[indices[0]].len();
    let total: f64 = indices.iter().map(|&i| targets[i] as f64).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut ordered: Vec<(f32, f32)> = Vec::with_capacity(n);

    for feature in 0..n_features {
        ordered.clear();
        ordered.extend(indices.iter().map(|&i| (rows[i][feature], targets[i])));
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
        if ordered[0].0 == ordered[n - 1].0 {
            continue;
        }

        let mut left_sum = 0.0f64;
        for k in 0..n - 1 {
            left_sum += ordered[k].1 as f64;
            if ordered[k].0 == ordered[k + 1].0 {
                continue;
            }
            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n as f64
                + right_sum * right_sum / right_n as f64
                - parent_score;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (ordered[k].0 + ordered[k + 1].0) / 2.0,
                    gain,
                });
            }
        }
    }

    best.filter(|s| s.gain > 1e-9)
}

/// Mean of `targets` over `indices`; the least-squares leaf.
pub fn mean_of(targets: &[f32], indices: &[usize]) -> f32 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f32>() / indices.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_follows_threshold() {
        let tree = RegressionTree::from_nodes(vec![
            TreeNode::Split {
                feature: 1,
                threshold: 0.5,
                left: 1,
                right: 2,
            },
            TreeNode::Leaf { value: -1.0 },
            TreeNode::Leaf { value: 2.0 },
        ]);
        assert_eq!(tree.predict_row(&[9.0, 0.0]), -1.0);
        assert_eq!(tree.predict_row(&[9.0, 1.0]), 2.0);
        // Missing feature reads as zero
        assert_eq!(tree.predict_row(&[9.0]), -1.0);
    }

    #[test]
    fn fit_separates_step_function() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let targets: Vec<f32> = (0..10).map(|i| if i < 5 { 1.0 } else { 3.0 }).collect();
        let indices: Vec<usize> = (0..10).collect();
        let tree = fit(&rows, &targets, &indices, &TreeParams::default(), |idx| {
            mean_of(&targets, idx)
        });
        assert_eq!(tree.predict_row(&[2.0]), 1.0);
        assert_eq!(tree.predict_row(&[7.0]), 3.0);
        assert!(tree.validate(1).is_ok());
    }

    #[test]
    fn constant_targets_yield_single_leaf() {
        let rows: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32]).collect();
        let targets = vec![2.0; 4];
        let indices: Vec<usize> = (0..4).collect();
        let tree = fit(&rows, &targets, &indices, &TreeParams::default(), |idx| {
            mean_of(&targets, idx)
        });
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.predict_row(&[0.0]), 2.0);
    }

    #[test]
    fn respects_min_samples_leaf() {
        let rows: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32]).collect();
        let targets = vec![0.0, 0.0, 0.0, 10.0];
        let indices: Vec<usize> = (0..4).collect();
        let params = TreeParams {
            max_depth: 4,
            min_samples_leaf: 2,
        };
        let tree = fit(&rows, &targets, &indices, &params, |idx| mean_of(&targets, idx));
        // The outlier cannot be isolated into a leaf of one row
        assert_eq!(tree.predict_row(&[3.0]), 5.0);
    }

    #[test]
    fn validate_rejects_backward_child() {
        let tree = RegressionTree::from_nodes(vec![
            TreeNode::Leaf { value: 0.0 },
            TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            },
        ]);
        assert!(tree.validate(1).is_err());
        assert!(RegressionTree::from_nodes(vec![]).validate(1).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_feature() {
        let tree = RegressionTree::from_nodes(vec![
            TreeNode::Split {
                feature: 3,
                threshold: 0.5,
                left: 1,
                right: 2,
            },
            TreeNode::Leaf { value: 0.0 },
            TreeNode::Leaf { value: 1.0 },
        ]);
        assert!(tree.validate(2).is_err());
        assert!(tree.validate(4).is_ok());
    }

    #[test]
    fn validate_rejects_unusable_numbers() {
        let split = |threshold: f32, leaf: f32| {
            RegressionTree::from_nodes(vec![
                TreeNode::Split {
                    feature: 0,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: 0.0 },
                TreeNode::Leaf { value: leaf },
            ])
        };
        assert!(split(0.5, 1.0).validate(1).is_ok());
        assert!(split(0.5, f32::NAN).validate(1).is_err());
        assert!(split(0.5, f32::INFINITY).validate(1).is_err());
        assert!(split(0.5, 2.0 * MAX_ABS_LEAF).validate(1).is_err());
        assert!(split(f32::NAN, 1.0).validate(1).is_err());
        assert!(RegressionTree::leaf(f32::NEG_INFINITY).validate(1).is_err());
    }
}
