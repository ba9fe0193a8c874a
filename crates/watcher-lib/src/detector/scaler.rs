//! Zero-mean, unit-variance feature normalization

use crate::models::{FeatureVector, FEATURE_COUNT};

/// Per-feature standardization fitted once on the training batch
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit mean and population standard deviation per feature
    ///
    /// Features with zero variance get a scale of 1 so they transform to 0.
    pub fn fit(samples: &[FeatureVector]) -> Self {
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];

        if samples.is_empty() {
            return Self { mean, scale };
        }

        let n = samples.len() as f64;
        for i in 0..FEATURE_COUNT {
            let m = samples.iter().map(|s| s.get(i)).sum::<f64>() / n;
            let variance = samples.iter().map(|s| (s.get(i) - m).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();

            mean[i] = m;
            if std_dev > f64::EPSILON * m.abs().max(1.0) {
                scale[i] = std_dev;
            }
        }

        Self { mean, scale }
    }

    pub fn transform(&self, sample: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (sample.get(i) - self.mean[i]) / self.scale[i];
        }
        FeatureVector::new(out)
    }

    pub fn transform_all(&self, samples: &[FeatureVector]) -> Vec<FeatureVector> {
        samples.iter().map(|s| self.transform(s)).collect()
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }
}
