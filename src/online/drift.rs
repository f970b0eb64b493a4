//! Concept-drift detection over rolling prediction-error windows.
//!
//! Each category keeps its last N absolute errors. The window is split into an
//! older and a recent half and compared:
//! `magnitude = |recent_mean − older_mean| / (older_mean + ε)`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::types::{Category, EPSILON};

const INCREMENTAL_THRESHOLD: f64 = 0.10;
const GRADUAL_THRESHOLD: f64 = 0.15;
const SUDDEN_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftType {
    None,
    Incremental,
    Gradual,
    Sudden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftAction {
    None,
    Monitor,
    Adapt,
    Retrain,
}

pub fn classify_drift(magnitude: f64) -> (DriftType, DriftAction) {
    if !(magnitude >= INCREMENTAL_THRESHOLD) {
        (DriftType::None, DriftAction::None)
    } else if magnitude < GRADUAL_THRESHOLD {
        (DriftType::Incremental, DriftAction::Monitor)
    } else if magnitude <= SUDDEN_THRESHOLD {
        (DriftType::Gradual, DriftAction::Adapt)
    } else {
        (DriftType::Sudden, DriftAction::Retrain)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub drift_magnitude: f64,
    pub drift_type: DriftType,
    pub affected_categories: Vec<Category>,
    pub recommended_action: DriftAction,
    pub confidence: f64,
}

impl DriftReport {
    fn none(confidence: f64) -> Self {
        Self {
            drift_detected: false,
            drift_magnitude: 0.0,
            drift_type: DriftType::None,
            affected_categories: Vec::new(),
            recommended_action: DriftAction::None,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftStats {
    pub recent_errors: VecDeque<f64>,
    pub error_mean: f64,
    pub error_variance: f64,
    pub performance_trend: f64,
}

impl DriftStats {
    fn push(&mut self, error: f64, window: usize) {
        self.recent_errors.push_back(error);
        while self.recent_errors.len() > window {
            self.recent_errors.pop_front();
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let n = self.recent_errors.len();
        if n == 0 {
            self.error_mean = 0.0;
            self.error_variance = 0.0;
            self.performance_trend = 0.0;
            return;
        }
        let mean = self.recent_errors.iter().sum::<f64>() / n as f64;
        self.error_mean = mean;
        self.error_variance =
            self.recent_errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n as f64;
        let (older, recent) = self.half_means();
        self.performance_trend = older - recent;
    }

    /// Mean error of the older and the recent half (recent gets the odd element)
    pub fn half_means(&self) -> (f64, f64) {
        let n = self.recent_errors.len();
        if n < 2 {
            return (self.error_mean, self.error_mean);
        }
        let half = n / 2;
        let older = self.recent_errors.iter().take(half).sum::<f64>() / half as f64;
        let recent = self.recent_errors.iter().skip(half).sum::<f64>() / (n - half) as f64;
        (older, recent)
    }

    pub fn magnitude(&self) -> f64 {
        let (older, recent) = self.half_means();
        (recent - older).abs() / (older + EPSILON)
    }
}

pub struct DriftDetector {
    window: usize,
    min_samples: usize,
    stats: HashMap<Category, DriftStats>,
}

impl DriftDetector {
    pub fn new(window: usize, min_samples: usize) -> Self {
        Self {
            window: window.max(2),
            min_samples: min_samples.max(2),
            stats: HashMap::new(),
        }
    }

    pub fn track(&mut self, category: Category, error: f64) {
        let error = if error.is_finite() { error.abs() } else { 1.0 };
        let window = self.window;
        self.stats.entry(category).or_default().push(error, window);
    }

    pub fn stats(&self, category: Category) -> DriftStats {
        self.stats.get(&category).cloned().unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<_> = self.stats.keys().copied().collect();
        categories.sort();
        categories
    }

    pub fn reset(&mut self, category: Category) {
        self.stats.remove(&category);
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }

    /// Replace a category's window wholesale (used on restore).
    pub fn restore(&mut self, category: Category, errors: Vec<f64>) {
        let mut stats = DriftStats::default();
        for error in errors {
            stats.push(error.abs(), self.window);
        }
        self.stats.insert(category, stats);
    }

    fn window_confidence(&self, len: usize) -> f64 {
        (len as f64 / self.window as f64).min(1.0)
    }

    pub fn detect(&self, category: Option<Category>) -> DriftReport {
        match category {
            Some(c) => self.detect_one(c),
            None => self.detect_all(),
        }
    }

    fn detect_one(&self, category: Category) -> DriftReport {
        let Some(stats) = self.stats.get(&category) else {
            return DriftReport::none(0.0);
        };
        let len = stats.recent_errors.len();
        if len < self.min_samples {
            return DriftReport::none(self.window_confidence(len));
        }

        let magnitude = stats.magnitude();
        let (drift_type, recommended_action) = classify_drift(magnitude);
        let drift_detected = drift_type != DriftType::None;
        DriftReport {
            drift_detected,
            drift_magnitude: magnitude,
            drift_type,
            affected_categories: if drift_detected { vec![category] } else { Vec::new() },
            recommended_action,
            confidence: self.window_confidence(len),
        }
    }

    fn detect_all(&self) -> DriftReport {
        let mut worst: Option<(f64, usize)> = None;
        let mut affected = Vec::new();

        for category in self.categories() {
            let stats = &self.stats[&category];
            let len = stats.recent_errors.len();
            if len < self.min_samples {
                continue;
            }
            let magnitude = stats.magnitude();
            if magnitude >= INCREMENTAL_THRESHOLD {
                affected.push(category);
            }
            if worst.map_or(true, |(m, _)| magnitude > m) {
                worst = Some((magnitude, len));
            }
        }

        let Some((magnitude, len)) = worst else {
            return DriftReport::none(0.0);
        };
        let (drift_type, recommended_action) = classify_drift(magnitude);
        DriftReport {
            drift_detected: drift_type != DriftType::None,
            drift_magnitude: magnitude,
            drift_type,
            affected_categories: affected,
            recommended_action,
            confidence: self.window_confidence(len),
        }
    }
}
