//! Lazily trained outlier model
//!
//! The model starts untrained and is fitted exactly once, on the first
//! batch that reaches the minimum training size. It is never refitted, so
//! scores stay comparable across cycles at the cost of drift if the fleet's
//! baseline shifts after training.

use super::{IsolationForest, StandardScaler};
use crate::models::FeatureVector;
use thiserror::Error;
use tracing::{debug, warn};

/// Default minimum batch size required to train
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Errors raised by the outlier model
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("outlier model has not been trained")]
    NotTrained,
    #[error("cannot fit a scorer on an empty batch")]
    EmptyTrainingSet,
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Hyper-parameters of the outlier model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Minimum batch size before the model trains
    pub min_training_samples: usize,
    /// Expected fraction of outliers in the training batch
    pub contamination: f64,
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Upper bound on the per-tree subsample
    pub max_samples: usize,
    /// RNG seed, fixed so training is reproducible
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_training_samples: MIN_TRAINING_SAMPLES,
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.min_training_samples == 0 {
            return Err(ModelError::InvalidConfig(
                "min_training_samples must be at least 1".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ModelError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 || self.max_samples == 0 {
            return Err(ModelError::InvalidConfig(
                "n_estimators and max_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for unsupervised outlier scorers with a fit/score contract
pub trait OutlierScorer: Send + Sync + Sized {
    /// Fit on normalized training samples
    fn fit(samples: &[FeatureVector], config: &ModelConfig) -> Result<Self, ModelError>;

    /// Decision value for a normalized sample; negative means outlier and
    /// more negative means more anomalous
    fn decision(&self, sample: &FeatureVector) -> f64;

    fn name(&self) -> &'static str;
}

/// Classification of a scored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Normal,
    Outlier,
}

/// Label and continuous score for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub label: Label,
    pub score: f64,
}

impl Scored {
    pub fn is_outlier(&self) -> bool {
        self.label == Label::Outlier
    }
}

/// One-way training state
#[derive(Debug, Clone)]
pub enum ModelState<S> {
    Untrained,
    Trained {
        normalizer: StandardScaler,
        scorer: S,
        training_samples: usize,
        /// Range of decision values over the training batch; 0 means the
        /// scorer cannot tell any sample apart
        score_spread: f64,
    },
}

/// Normalizer plus outlier scorer, trained once and reused
#[derive(Debug)]
pub struct OutlierModel<S: OutlierScorer = IsolationForest> {
    config: ModelConfig,
    state: ModelState<S>,
}

impl<S: OutlierScorer> OutlierModel<S> {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            state: ModelState::Untrained,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> &ModelState<S> {
        &self.state
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ModelState::Trained { .. })
    }

    /// Train on `batch` if not yet trained and the batch is large enough
    ///
    /// Returns true when the model is trained after the call. An already
    /// trained model ignores the batch.
    pub fn maybe_train(&mut self, batch: &[FeatureVector]) -> bool {
        if self.is_trained() {
            return true;
        }

        if batch.len() < self.config.min_training_samples {
            debug!(
                samples = batch.len(),
                required = self.config.min_training_samples,
                "Not enough samples to train"
            );
            return false;
        }

        if let Err(e) = self.config.validate() {
            warn!(error = %e, "Refusing to train");
            return false;
        }

        let normalizer = StandardScaler::fit(batch);
        let normalized = normalizer.transform_all(batch);

        match S::fit(&normalized, &self.config) {
            Ok(scorer) => {
                let score_spread = decision_spread(&scorer, &normalized);
                if score_spread <= f64::EPSILON {
                    warn!(
                        samples = batch.len(),
                        scorer = scorer.name(),
                        "Training batch has no variance, model will not flag outliers"
                    );
                }
                self.state = ModelState::Trained {
                    normalizer,
                    scorer,
                    training_samples: batch.len(),
                    score_spread,
                };
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to fit outlier scorer");
                false
            }
        }
    }

    /// Normalize and score a batch with the fitted model
    pub fn score(&self, batch: &[FeatureVector]) -> Result<Vec<Scored>, ModelError> {
        let (normalizer, scorer) = match &self.state {
            ModelState::Untrained => return Err(ModelError::NotTrained),
            ModelState::Trained {
                normalizer, scorer, ..
            } => (normalizer, scorer),
        };

        Ok(batch
            .iter()
            .map(|sample| {
                let score = scorer.decision(&normalizer.transform(sample));
                let label = if score < 0.0 {
                    Label::Outlier
                } else {
                    Label::Normal
                };
                Scored { label, score }
            })
            .collect())
    }

    /// Spread of training decisions, if trained
    pub fn score_spread(&self) -> Option<f64> {
        match &self.state {
            ModelState::Untrained => None,
            ModelState::Trained { score_spread, .. } => Some(*score_spread),
        }
    }

    /// Name of the fitted scorer, if trained
    pub fn scorer_name(&self) -> Option<&'static str> {
        match &self.state {
            ModelState::Untrained => None,
            ModelState::Trained { scorer, .. } => Some(scorer.name()),
        }
    }
}

fn decision_spread<S: OutlierScorer>(scorer: &S, samples: &[FeatureVector]) -> f64 {
    let (lo, hi) = samples
        .iter()
        .map(|sample| scorer.decision(sample))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        });
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

impl Default for OutlierModel<IsolationForest> {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}
