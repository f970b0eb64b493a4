//! Per-category online logistic classifier
//!
//! One linear model per category, trained one example at a time with momentum SGD,
//! L2 regularization and gradient clipping. A rolling error window per category feeds
//! the drift detector; its recommendations are advisory and never applied here.

pub mod drift;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::config::OnlineConfig;
use crate::persistence::{decode_records, ImportReport};
use crate::sanitize::{
    binary_cross_entropy, clip_gradient, has_invalid_values, l2_norm, sanitize_feature_vector,
    sigmoid, xavier_uniform,
};
use crate::types::Category;

pub use drift::{classify_drift, DriftAction, DriftDetector, DriftReport, DriftStats, DriftType};

const TREND_THRESHOLD: f64 = 0.05;
const ADJUSTMENT_UP: f64 = 1.1;
const ADJUSTMENT_DOWN: f64 = 0.95;
const MAX_ADJUSTMENT: f64 = 2.0;
const MIN_ADJUSTMENT: f64 = 0.5;

// ==================== Types ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineExample {
    pub features: Vec<f64>,
    pub category: Category,
    pub label: bool,
    pub timestamp: i64,
    /// Upstream detector confidence, carried for the host; training does not read it.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub importance: Option<f64>,
}

impl OnlineExample {
    pub fn new(features: Vec<f64>, category: Category, label: bool) -> Self {
        Self {
            features,
            category,
            label,
            timestamp: chrono::Utc::now().timestamp_millis(),
            confidence: None,
            importance: None,
        }
    }

    fn importance_weight(&self) -> f64 {
        match self.importance {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub last_update: i64,
    pub update_count: u64,
}

impl ModelWeights {
    fn xavier<R: Rng>(rng: &mut R, dim: usize) -> Self {
        Self {
            weights: xavier_uniform(rng, dim, 1),
            bias: 0.0,
            last_update: 0,
            update_count: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bias.is_finite() && !has_invalid_values(&self.weights)
    }

    /// w·x + b over the shared prefix of `weights` and `features`
    fn logit(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRateSchedule {
    pub initial_rate: f64,
    pub current_rate: f64,
    pub decay_factor: f64,
    pub min_rate: f64,
    pub adaptive_adjustment: f64,
}

impl LearningRateSchedule {
    pub fn new(config: &OnlineConfig) -> Self {
        Self {
            initial_rate: config.initial_learning_rate,
            current_rate: config.initial_learning_rate,
            decay_factor: config.decay_factor,
            min_rate: config.min_learning_rate,
            adaptive_adjustment: 1.0,
        }
    }

    /// Rate applied to the next update
    pub fn effective_rate(&self) -> f64 {
        (self.current_rate * self.adaptive_adjustment).max(self.min_rate)
    }

    fn step(&mut self) {
        self.current_rate = (self.current_rate * self.decay_factor).max(self.min_rate);
    }

    fn reset(&mut self) {
        self.current_rate = self.initial_rate;
        self.adaptive_adjustment = 1.0;
    }

    fn is_valid(&self) -> bool {
        [
            self.initial_rate,
            self.current_rate,
            self.decay_factor,
            self.min_rate,
            self.adaptive_adjustment,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub prediction: f64,
    pub loss: f64,
    pub gradient_norm: f64,
    pub clipped: bool,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLearnerStats {
    pub update_count: u64,
    pub feature_dim: usize,
    pub weight_norm: f64,
    pub bias: f64,
    pub error_mean: f64,
    pub error_variance: f64,
    pub performance_trend: f64,
    pub window_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerStats {
    pub total_updates: u64,
    pub learning_rate: f64,
    pub schedule: LearningRateSchedule,
    pub categories: BTreeMap<Category, CategoryLearnerStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub category: Category,
    pub model: ModelWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftRecord {
    pub category: Category,
    pub recent_errors: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub total_updates: u64,
    pub schedule: LearningRateSchedule,
    pub models: Vec<ModelRecord>,
    #[serde(default)]
    pub drift: Vec<DriftRecord>,
}

// ==================== Main Implementation ====================

pub struct OnlineLearner {
    config: OnlineConfig,
    models: HashMap<Category, ModelWeights>,
    velocity: HashMap<Category, Vec<f64>>,
    feature_dims: HashMap<Category, usize>,
    schedule: LearningRateSchedule,
    drift: DriftDetector,
    total_updates: u64,
    rng: ChaCha8Rng,
}

impl OnlineLearner {
    pub fn new(config: OnlineConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42)
        });
        Self {
            schedule: LearningRateSchedule::new(&config),
            drift: DriftDetector::new(config.drift_window, config.min_drift_samples),
            models: HashMap::new(),
            velocity: HashMap::new(),
            feature_dims: HashMap::new(),
            total_updates: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(OnlineConfig {
            seed: Some(seed),
            ..Default::default()
        })
    }

    /// Train on a single labeled example.
    ///
    /// The prediction, loss and tracked error are computed before the weights move, so
    /// the drift window sees out-of-sample errors.
    pub fn update(&mut self, example: &OnlineExample) -> UpdateOutcome {
        let category = example.category;
        let mut features = example.features.clone();
        sanitize_feature_vector(&mut features);

        let label = if example.label { 1.0 } else { 0.0 };
        if features.is_empty() {
            if !self.models.contains_key(&category) {
                return self.track_untrained(category, label);
            }
        } else {
            self.feature_dims.insert(category, features.len());
        }
        let rng = &mut self.rng;
        let model = self
            .models
            .entry(category)
            .or_insert_with(|| ModelWeights::xavier(rng, features.len()));
        let velocity = self
            .velocity
            .entry(category)
            .or_insert_with(|| vec![0.0; model.weights.len()]);
        velocity.resize(model.weights.len(), 0.0);

        let prediction = sigmoid(model.logit(&features));
        let loss = binary_cross_entropy(prediction, label);

        // gradient over the overlapping prefix, bias term last
        let error = (prediction - label) * example.importance_weight();
        let overlap = model.weights.len().min(features.len());
        let mut grad: Vec<f64> = model.weights[..overlap]
            .iter()
            .zip(&features[..overlap])
            .map(|(w, x)| error * x + self.config.l2_lambda * w)
            .collect();
        grad.push(error);
        let (gradient_norm, clipped) = clip_gradient(&mut grad, self.config.gradient_clip);
        let grad_b = grad.pop().unwrap_or(0.0);

        let lr = self.schedule.effective_rate();
        let beta = self.config.momentum;
        for ((w, v), g) in model.weights.iter_mut().zip(velocity.iter_mut()).zip(&grad) {
            *v = beta * *v - lr * g;
            *w += *v;
        }
        model.bias -= lr * grad_b;
        model.last_update = example.timestamp;
        model.update_count += 1;

        self.schedule.step();
        self.drift.track(category, (prediction - label).abs());
        self.total_updates += 1;

        debug!(
            category = %category,
            prediction,
            loss,
            gradient_norm,
            clipped,
            lr,
            "online update"
        );

        UpdateOutcome {
            prediction,
            loss,
            gradient_norm,
            clipped,
            learning_rate: lr,
        }
    }

    /// A featureless example for a category with no model yet: the model stays unsized
    /// until real input arrives, but the neutral prediction still counts toward drift.
    fn track_untrained(&mut self, category: Category, label: f64) -> UpdateOutcome {
        let prediction = 0.5;
        let loss = binary_cross_entropy(prediction, label);
        self.drift.track(category, (prediction - label).abs());
        self.total_updates += 1;
        debug!(category = %category, "empty features before first model, weights untouched");

        UpdateOutcome {
            prediction,
            loss,
            gradient_norm: 0.0,
            clipped: false,
            learning_rate: self.schedule.effective_rate(),
        }
    }

    /// Probability that `features` belong to `category`; 0.5 without a model or input.
    pub fn predict_for_category(&self, features: &[f64], category: Category) -> f64 {
        if features.is_empty() {
            return 0.5;
        }
        let Some(model) = self.models.get(&category) else {
            return 0.5;
        };
        let mut x = features.to_vec();
        sanitize_feature_vector(&mut x);
        sigmoid(model.logit(&x))
    }

    pub fn predict(&self, features: &[f64]) -> BTreeMap<Category, f64> {
        self.models
            .keys()
            .map(|&category| (category, self.predict_for_category(features, category)))
            .collect()
    }

    pub fn predict_batch(&self, batch: &[Vec<f64>], category: Category) -> Vec<f64> {
        batch
            .par_iter()
            .map(|features| self.predict_for_category(features, category))
            .collect()
    }

    /// Nudge the rate multiplier from an observed error trend (positive = improving).
    pub fn adjust_learning_rate(&mut self, performance_trend: f64) {
        let adjustment = &mut self.schedule.adaptive_adjustment;
        if performance_trend < -TREND_THRESHOLD {
            *adjustment = (*adjustment * ADJUSTMENT_UP).min(MAX_ADJUSTMENT);
        } else if performance_trend > TREND_THRESHOLD {
            *adjustment = (*adjustment * ADJUSTMENT_DOWN).max(MIN_ADJUSTMENT);
        }
    }

    pub fn detect_drift(&self, category: Option<Category>) -> DriftReport {
        self.drift.detect(category)
    }

    /// Reset the learning-rate schedule and momentum, keeping weights.
    ///
    /// `None` clears the momentum of every category.
    pub fn adapt_to_drift(&mut self, category: Option<Category>) {
        self.schedule.reset();
        match category {
            Some(c) => {
                if let Some(v) = self.velocity.get_mut(&c) {
                    v.iter_mut().for_each(|x| *x = 0.0);
                }
            }
            None => self.velocity.clear(),
        }
        info!(category = ?category, "adapted to drift: schedule and momentum reset");
    }

    /// Discard a category's weights, momentum and drift history.
    pub fn retrain_model(&mut self, category: Category) {
        let dim = self
            .feature_dims
            .get(&category)
            .copied()
            .filter(|&d| d > 0)
            .unwrap_or(self.config.default_feature_dim);
        self.models
            .insert(category, ModelWeights::xavier(&mut self.rng, dim));
        self.velocity.insert(category, vec![0.0; dim]);
        self.drift.reset(category);
        info!(category = %category, dim, "model reinitialized");
    }

    pub fn model(&self, category: Category) -> Option<ModelWeights> {
        self.models.get(&category).cloned()
    }

    pub fn drift_stats(&self, category: Category) -> DriftStats {
        self.drift.stats(category)
    }

    pub fn schedule(&self) -> &LearningRateSchedule {
        &self.schedule
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    pub fn get_stats(&self) -> LearnerStats {
        let mut categories = BTreeMap::new();
        for (&category, model) in &self.models {
            let drift = self.drift.stats(category);
            categories.insert(
                category,
                CategoryLearnerStats {
                    update_count: model.update_count,
                    feature_dim: model.weights.len(),
                    weight_norm: l2_norm(&model.weights),
                    bias: model.bias,
                    error_mean: drift.error_mean,
                    error_variance: drift.error_variance,
                    performance_trend: drift.performance_trend,
                    window_len: drift.recent_errors.len(),
                },
            );
        }
        LearnerStats {
            total_updates: self.total_updates,
            learning_rate: self.schedule.effective_rate(),
            schedule: self.schedule.clone(),
            categories,
        }
    }

    pub fn clear(&mut self) {
        self.models.clear();
        self.velocity.clear();
        self.feature_dims.clear();
        self.drift.clear();
        self.schedule = LearningRateSchedule::new(&self.config);
        self.total_updates = 0;
        info!("online learner cleared");
    }

    // ==================== State Management ====================

    pub fn export_snapshot(&self) -> LearnerSnapshot {
        let mut models: Vec<ModelRecord> = self
            .models
            .iter()
            .map(|(&category, model)| ModelRecord {
                category,
                model: model.clone(),
            })
            .collect();
        models.sort_by_key(|r| r.category);

        let drift = self
            .drift
            .categories()
            .into_iter()
            .map(|category| DriftRecord {
                category,
                recent_errors: self.drift.stats(category).recent_errors.into(),
            })
            .collect();

        LearnerSnapshot {
            total_updates: self.total_updates,
            schedule: self.schedule.clone(),
            models,
            drift,
        }
    }

    /// Restore models and drift windows. Momentum always starts from zero.
    pub fn import_snapshot(&mut self, snapshot: LearnerSnapshot) -> ImportReport {
        let mut report = ImportReport::default();

        if snapshot.schedule.is_valid() {
            self.schedule = snapshot.schedule;
        } else {
            warn!("ignoring invalid learning-rate schedule in snapshot");
        }
        self.total_updates = self.total_updates.max(snapshot.total_updates);

        for record in snapshot.models {
            if !record.model.is_valid() {
                report.skipped += 1;
                warn!(category = %record.category, "skipping model with non-finite weights");
                continue;
            }
            let dim = record.model.weights.len();
            if dim > 0 {
                self.feature_dims.insert(record.category, dim);
            }
            self.velocity.insert(record.category, vec![0.0; dim]);
            self.models.insert(record.category, record.model);
            report.imported += 1;
        }

        for record in snapshot.drift {
            if has_invalid_values(&record.recent_errors) {
                report.skipped += 1;
                warn!(category = %record.category, "skipping drift window with non-finite errors");
                continue;
            }
            self.drift.restore(record.category, record.recent_errors);
            report.imported += 1;
        }

        info!(imported = report.imported, skipped = report.skipped, "online learner restored");
        report
    }

    /// Lenient restore from an untyped document
    pub fn import_snapshot_value(&mut self, value: &Value) -> ImportReport {
        let schedule = value
            .get("schedule")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or_else(|| self.schedule.clone());
        let total_updates = value
            .get("total_updates")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let (models, skipped_models) =
            decode_records::<ModelRecord>(value.get("models").unwrap_or(&Value::Null), "model");
        let (drift, skipped_drift) =
            decode_records::<DriftRecord>(value.get("drift").unwrap_or(&Value::Null), "drift");

        self.import_snapshot(LearnerSnapshot {
            total_updates,
            schedule,
            models,
            drift,
        })
        .merge(ImportReport {
            imported: 0,
            skipped: skipped_models + skipped_drift,
        })
    }
}

impl Default for OnlineLearner {
    fn default() -> Self {
        Self::new(OnlineConfig::default())
    }
}
