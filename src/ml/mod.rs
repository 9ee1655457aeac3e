//! Minimal gradient-boosting toolkit backing the disease and time models.
//!
//! - `tree`: CART regression trees (fit + traversal)
//! - `boosting`: softmax multi-class and least-squares boosting ensembles
//! - `tfidf`: text vectorizer paired with the time regressor
//! - `split`: train/test partitioning and evaluation metrics

pub mod boosting;
pub mod split;
pub mod tfidf;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoostedClassifier, GradientBoostedRegressor};
pub use tfidf::TfidfVectorizer;
pub use tree::{RegressionTree, TreeNode, TreeParams};
