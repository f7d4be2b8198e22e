//! Linear softmax policy over standardized features.
//!
//! Weights are fitted offline; this crate only loads and evaluates them.
//! File format (JSON):
//!
//! ```json
//! {
//!   "weights": [[...12...], [...12...], [...12...]],
//!   "bias": [b_hold, b_buy, b_sell],
//!   "scaler": { "mean": [...12...], "std": [...12...] }
//! }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use itd_schemas::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

use crate::model::{Inference, InferenceError, InferenceModel};

const CLASSES: usize = 3;

/// Per-feature standardization fitted on a historical distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaler {
    /// Pass-through scaler (mean 0, std 1).
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_COUNT],
            std: vec![1.0; FEATURE_COUNT],
        }
    }

    fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(v, (m, s))| {
                // zero-variance feature: centre only
                let s = if *s > 0.0 { *s } else { 1.0 };
                (v - m) / s
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicyModel {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    scaler: FeatureScaler,
}

impl LinearPolicyModel {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>, scaler: FeatureScaler) -> Result<Self> {
        let m = Self { weights, bias, scaler };
        m.check_shape()?;
        Ok(m)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let m: Self = serde_json::from_str(raw).context("policy json does not match schema")?;
        m.check_shape()?;
        Ok(m)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy weights: {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid policy weights: {}", path.display()))
    }

    fn check_shape(&self) -> Result<()> {
        if self.weights.len() != CLASSES || self.bias.len() != CLASSES {
            bail!(
                "expected {CLASSES} classes, got weights={} bias={}",
                self.weights.len(),
                self.bias.len()
            );
        }
        for (i, row) in self.weights.iter().enumerate() {
            if row.len() != FEATURE_COUNT {
                bail!("weights row {i} has {} columns, expected {FEATURE_COUNT}", row.len());
            }
        }
        if self.scaler.mean.len() != FEATURE_COUNT || self.scaler.std.len() != FEATURE_COUNT {
            bail!("scaler must have {FEATURE_COUNT} mean and std entries");
        }
        let all = self
            .weights
            .iter()
            .flatten()
            .chain(&self.bias)
            .chain(&self.scaler.mean)
            .chain(&self.scaler.std);
        if all.into_iter().any(|v| !v.is_finite()) {
            bail!("policy contains non-finite parameters");
        }
        Ok(())
    }

    fn evaluate(&self, features: &FeatureVector) -> Inference {
        let z = self.scaler.transform(features.as_slice());
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&z).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        let probabilities = softmax(&logits);
        let action_class = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Inference {
            action_class,
            probabilities,
        }
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[async_trait]
impl InferenceModel for LinearPolicyModel {
    fn name(&self) -> &str {
        "linear_policy"
    }

    async fn infer(&self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        let out = self.evaluate(features);
        if out.probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::InvalidOutput("softmax overflow".into()));
        }
        Ok(out)
    }
}
