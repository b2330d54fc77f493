//! Learned readiness model
//!
//! A depth-limited regression tree (CART, variance reduction) mapping the five
//! factor sub-scores to how the athlete actually felt. Predictions are scaled
//! to 0-100 over the observed feel range. Each split on the prediction path
//! credits the change in node mean to the split's factor, which gives the
//! factor breakdown.
//!
//! Training is deterministic: factors are scanned in a fixed order,
//! thresholds ascending, and ties keep the first candidate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{
    factor_scores, result_confidence, Factor, FactorContribution, ReadinessConfig,
    ReadinessInput, ReadinessModel, ReadinessResult,
};
use crate::error::{CalculationError, ReadyError};

/// Tree training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_training_samples: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: 4,
            min_samples_leaf: 3,
            min_training_samples: 20,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        if self.max_depth == 0 || self.min_samples_leaf == 0 {
            return Err(ReadyError::Configuration(
                "tree max_depth and min_samples_leaf must be positive".to_string(),
            ));
        }
        if self.min_training_samples < 2 * self.min_samples_leaf {
            return Err(ReadyError::Configuration(
                "tree min_training_samples must allow at least one split".to_string(),
            ));
        }
        Ok(())
    }
}

/// One historical day: factor sub-scores and the reported feel score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeelSample {
    pub date: NaiveDate,
    pub factors: BTreeMap<Factor, f64>,
    pub feel: f64,
}

impl FeelSample {
    fn complete(&self) -> bool {
        Factor::ALL.iter().all(|f| self.factors.contains_key(f)) && self.feel.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        mean: f64,
        samples: usize,
    },
    Split {
        factor: Factor,
        threshold: f64,
        mean: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn mean(&self) -> f64 {
        match self {
            Node::Leaf { mean, .. } | Node::Split { mean, .. } => *mean,
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Result of walking the tree for one input
#[derive(Debug, Clone, PartialEq)]
pub struct TreePrediction {
    pub value: f64,
    pub attribution: BTreeMap<Factor, f64>,
    /// True when a missing feature stopped the walk above a leaf
    pub truncated: bool,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sse(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum()
}

/// Regression tree over factor sub-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    pub fn fit(samples: &[&FeelSample], config: &TreeConfig) -> Self {
        RegressionTree {
            root: Self::build(samples, 0, config),
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    fn build(samples: &[&FeelSample], depth: usize, config: &TreeConfig) -> Node {
        let targets: Vec<f64> = samples.iter().map(|s| s.feel).collect();
        let node_mean = mean(&targets);

        if depth >= config.max_depth || samples.len() < 2 * config.min_samples_leaf {
            return Node::Leaf {
                mean: node_mean,
                samples: samples.len(),
            };
        }

        let parent_sse = sse(&targets);
        let mut best: Option<(Factor, f64, f64)> = None;

        for factor in Factor::ALL {
            let mut values: Vec<f64> = samples.iter().map(|s| s.factors[&factor]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let mut left = Vec::new();
                let mut right = Vec::new();
                for sample in samples {
                    if sample.factors[&factor] <= threshold {
                        left.push(sample.feel);
                    } else {
                        right.push(sample.feel);
                    }
                }
                if left.len() < config.min_samples_leaf || right.len() < config.min_samples_leaf {
                    continue;
                }
                let gain = parent_sse - sse(&left) - sse(&right);
                let better = match best {
                    Some((_, _, best_gain)) => gain > best_gain + 1e-12,
                    None => gain > 1e-12,
                };
                if better {
                    best = Some((factor, threshold, gain));
                }
            }
        }

        let Some((factor, threshold, _)) = best else {
            return Node::Leaf {
                mean: node_mean,
                samples: samples.len(),
            };
        };

        let (left, right): (Vec<&FeelSample>, Vec<&FeelSample>) = samples
            .iter()
            .copied()
            .partition(|s| s.factors[&factor] <= threshold);

        Node::Split {
            factor,
            threshold,
            mean: node_mean,
            left: Box::new(Self::build(&left, depth + 1, config)),
            right: Box::new(Self::build(&right, depth + 1, config)),
        }
    }

    /// Walk the tree; a missing feature stops at the current node's mean
    pub fn predict(&self, features: &BTreeMap<Factor, Option<f64>>) -> TreePrediction {
        let mut node = &self.root;
        let mut attribution = BTreeMap::new();
        let mut truncated = false;

        while let Node::Split {
            factor,
            threshold,
            mean,
            left,
            right,
        } = node
        {
            let Some(value) = features.get(factor).copied().flatten() else {
                truncated = true;
                break;
            };
            let next: &Node = if value <= *threshold { left } else { right };
            *attribution.entry(*factor).or_insert(0.0) += next.mean() - mean;
            node = next;
        }

        TreePrediction {
            value: node.mean(),
            attribution,
            truncated,
        }
    }
}

/// Readiness from a tree trained on the athlete's feel history
#[derive(Debug, Clone)]
pub struct TreeReadinessModel {
    config: ReadinessConfig,
    tree: RegressionTree,
    feel_min: f64,
    feel_max: f64,
    root_mean: f64,
}

impl TreeReadinessModel {
    /// Train from history. Incomplete samples are skipped.
    pub fn train(samples: &[FeelSample], config: ReadinessConfig) -> Result<Self, ReadyError> {
        let usable: Vec<&FeelSample> = samples.iter().filter(|s| s.complete()).collect();
        if usable.len() < config.tree.min_training_samples {
            return Err(CalculationError::InsufficientData {
                calculation: "readiness tree".to_string(),
                reason: format!(
                    "{} complete samples, need {}",
                    usable.len(),
                    config.tree.min_training_samples
                ),
            }
            .into());
        }

        let feel_min = usable.iter().map(|s| s.feel).fold(f64::INFINITY, f64::min);
        let feel_max = usable
            .iter()
            .map(|s| s.feel)
            .fold(f64::NEG_INFINITY, f64::max);
        let tree = RegressionTree::fit(&usable, &config.tree);
        let root_mean = tree.root.mean();

        info!(
            samples = usable.len(),
            depth = tree.depth(),
            feel_min,
            feel_max,
            "trained readiness tree"
        );

        Ok(TreeReadinessModel {
            config,
            tree,
            feel_min,
            feel_max,
            root_mean,
        })
    }

    pub fn tree(&self) -> &RegressionTree {
        &self.tree
    }

    fn scale(&self) -> f64 {
        let range = self.feel_max - self.feel_min;
        if range > 0.0 {
            100.0 / range
        } else {
            0.0
        }
    }

    fn to_score(&self, value: f64) -> f64 {
        if self.feel_max > self.feel_min {
            ((value - self.feel_min) * self.scale()).clamp(0.0, 100.0)
        } else {
            50.0
        }
    }
}

impl ReadinessModel for TreeReadinessModel {
    fn name(&self) -> &str {
        "tree"
    }

    fn score(&self, input: &ReadinessInput<'_>) -> ReadinessResult {
        let features = factor_scores(input, &self.config);
        let prediction = self.tree.predict(&features);
        let scale = self.scale();

        let excluded: Vec<Factor> = Factor::ALL
            .iter()
            .copied()
            .filter(|f| features.get(f).copied().flatten().is_none())
            .collect();

        let factors = Factor::ALL
            .iter()
            .map(|factor| FactorContribution {
                factor: *factor,
                sub_score: features.get(factor).copied().flatten(),
                weight: None,
                contribution: prediction.attribution.get(factor).copied().unwrap_or(0.0) * scale,
            })
            .collect();

        let raw_score = self.to_score(prediction.value);
        let score = (raw_score + input.ans.modifier).clamp(0.0, 100.0);
        let available = Factor::ALL.len() - excluded.len();

        debug!(
            raw_score,
            score,
            truncated = prediction.truncated,
            root = self.root_mean,
            "tree readiness scored"
        );

        ReadinessResult {
            score,
            raw_score,
            factors,
            excluded: excluded.clone(),
            ans_state: input.ans.state,
            ans_modifier: input.ans.modifier,
            strategy: self.name().to_string(),
            confidence: result_confidence(input, available, excluded.len()),
        }
    }
}
