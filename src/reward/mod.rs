//! Reward Shaping
//!
//! Turns a user feedback event into a structured scalar reward:
//! - immediate: base value per feedback type plus a confidence bonus
//! - delayed: a fraction of the category's recent reward mean
//! - intrinsic: novelty (shrinks with history) plus uncertainty (peaks at confidence 0.5)
//!
//! Each shaped total is appended to a bounded per-category history that feeds the
//! delayed term of later calls.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

use crate::config::RewardConfig;
use crate::persistence::ImportReport;
use crate::types::{Category, FeedbackType};

/// One user reaction to a warning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub category: Category,
    pub confidence: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base: f64,
    pub confidence_bonus: f64,
    pub delayed: f64,
    pub novelty_bonus: f64,
    pub uncertainty_bonus: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapedReward {
    pub immediate_reward: f64,
    pub delayed_reward: f64,
    pub intrinsic_reward: f64,
    pub total_reward: f64,
    pub breakdown: RewardBreakdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRewardStats {
    pub count: usize,
    pub mean: f64,
    pub trend: f64,
}

pub struct RewardShaper {
    config: RewardConfig,
    history: HashMap<Category, VecDeque<f64>>,
}

impl RewardShaper {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    pub fn shape_reward(&mut self, event: &FeedbackEvent) -> ShapedReward {
        let confidence = if event.confidence.is_finite() {
            event.confidence.clamp(0.0, 1.0)
        } else {
            0.5
        };

        let base = self.base_reward(event.feedback_type);
        let confidence_bonus = self.confidence_bonus(event.feedback_type, confidence);
        let immediate_reward = base + confidence_bonus;

        let delayed_reward = self.delayed_reward(event.category);

        let history_len = self.history_len(event.category);
        let novelty_bonus = self.config.novelty_scale / (1.0 + history_len as f64);
        let uncertainty_bonus =
            self.config.uncertainty_scale * (1.0 - (confidence - 0.5).abs() * 2.0);
        let intrinsic_reward = novelty_bonus + uncertainty_bonus;

        let total_reward = immediate_reward + delayed_reward + intrinsic_reward;

        let capacity = self.config.history_size;
        let entry = self
            .history
            .entry(event.category)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        entry.push_back(total_reward);
        while entry.len() > capacity {
            entry.pop_front();
        }

        debug!(
            category = %event.category,
            feedback = ?event.feedback_type,
            immediate = immediate_reward,
            delayed = delayed_reward,
            intrinsic = intrinsic_reward,
            total = total_reward,
            "reward shaped"
        );

        ShapedReward {
            immediate_reward,
            delayed_reward,
            intrinsic_reward,
            total_reward,
            breakdown: RewardBreakdown {
                base,
                confidence_bonus,
                delayed: delayed_reward,
                novelty_bonus,
                uncertainty_bonus,
            },
        }
    }

    /// Clip a reward into [-1, 1]
    pub fn normalize_reward(reward: f64) -> f64 {
        if reward.is_nan() {
            return 0.0;
        }
        reward.clamp(-1.0, 1.0)
    }

    fn base_reward(&self, feedback_type: FeedbackType) -> f64 {
        match feedback_type {
            FeedbackType::Confirm => self.config.confirm_base,
            FeedbackType::Dismiss => self.config.dismiss_base,
            FeedbackType::Report => self.config.report_base,
            FeedbackType::Helpful => self.config.helpful_base,
            FeedbackType::NotHelpful => self.config.not_helpful_base,
        }
    }

    fn confidence_bonus(&self, feedback_type: FeedbackType, confidence: f64) -> f64 {
        let scale = self.config.confidence_scale;
        match feedback_type {
            // confident and right
            FeedbackType::Confirm => scale * confidence,
            // confident and wrong
            FeedbackType::Dismiss => -scale * confidence,
            // missed it: penalize low confidence
            FeedbackType::Report => -scale * (1.0 - confidence),
            FeedbackType::Helpful | FeedbackType::NotHelpful => 0.0,
        }
    }

    fn delayed_reward(&self, category: Category) -> f64 {
        let Some(history) = self.history.get(&category) else {
            return 0.0;
        };
        if history.is_empty() {
            return 0.0;
        }

        let window = self.config.delayed_window.min(history.len());
        let recent_sum: f64 = history.iter().rev().take(window).sum();
        self.config.delayed_weight * recent_sum / window as f64
    }

    pub fn history_len(&self, category: Category) -> usize {
        self.history.get(&category).map(|h| h.len()).unwrap_or(0)
    }

    /// Least-squares slope of the stored history, oldest first
    pub fn reward_trend(&self, category: Category) -> f64 {
        let Some(history) = self.history.get(&category) else {
            return 0.0;
        };
        if history.len() < 2 {
            return 0.0;
        }

        let n = history.len() as f64;
        let sum_x: f64 = (0..history.len()).map(|i| i as f64).sum();
        let sum_y: f64 = history.iter().sum();
        let sum_xy: f64 = history.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_xx: f64 = (0..history.len()).map(|i| (i as f64).powi(2)).sum();

        let denominator = n * sum_xx - sum_x.powi(2);
        if denominator.abs() < 1e-10 {
            return 0.0;
        }

        (n * sum_xy - sum_x * sum_y) / denominator
    }

    pub fn category_stats(&self, category: Category) -> CategoryRewardStats {
        let Some(history) = self.history.get(&category) else {
            return CategoryRewardStats::default();
        };
        if history.is_empty() {
            return CategoryRewardStats::default();
        }
        CategoryRewardStats {
            count: history.len(),
            mean: history.iter().sum::<f64>() / history.len() as f64,
            trend: self.reward_trend(category),
        }
    }

    pub fn get_stats(&self) -> BTreeMap<Category, CategoryRewardStats> {
        self.history
            .keys()
            .map(|&category| (category, self.category_stats(category)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn export_history(&self) -> BTreeMap<Category, Vec<f64>> {
        self.history
            .iter()
            .map(|(&category, h)| (category, h.iter().copied().collect()))
            .collect()
    }

    /// Restore per-category history. Non-finite entries are dropped individually.
    pub fn import_history(&mut self, history: BTreeMap<Category, Vec<f64>>) -> ImportReport {
        let mut report = ImportReport::default();
        let capacity = self.config.history_size;

        for (category, values) in history {
            let mut restored = VecDeque::with_capacity(capacity);
            for value in values {
                if value.is_finite() {
                    restored.push_back(value);
                    report.imported += 1;
                } else {
                    report.skipped += 1;
                }
            }
            while restored.len() > capacity {
                restored.pop_front();
            }
            self.history.insert(category, restored);
        }

        report
    }
}

impl Default for RewardShaper {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}
