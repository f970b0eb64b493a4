//! Session-scoped owner of the four learners.
//!
//! Each component sits behind its own lock: a single transition (one reward update,
//! one Q-update) is atomic, while the components of one feedback record are applied
//! one after another without a global ordering guarantee.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::bandit::{
    BanditAlgorithm, BanditContext, BanditSelector, BanditSnapshot, BanditStats, SelectionResult,
};
use crate::config::PolicyConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::online::{
    DriftAction, DriftReport, LearnerSnapshot, LearnerStats, OnlineExample, OnlineLearner,
    UpdateOutcome,
};
use crate::persistence::{ImportReport, SNAPSHOT_VERSION};
use crate::reward::{CategoryRewardStats, FeedbackEvent, RewardShaper, ShapedReward};
use crate::rl::{
    ActionSelection, Episode, PolicyAction, PolicyState, QTableRecord, RLPolicy, RlStats,
};
use crate::types::{Category, StrategyArm};

/// The Q-learning half of a feedback record: what was done and where it led.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTransition {
    pub state: PolicyState,
    pub action: PolicyAction,
    pub next_state: PolicyState,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub event: FeedbackEvent,
    pub arm: StrategyArm,
    #[serde(default)]
    pub context: Option<BanditContext>,
    #[serde(default)]
    pub transition: Option<PolicyTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub reward: ShapedReward,
    pub normalized_reward: f64,
    /// Q-value after the update, when the record carried a transition
    pub q_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: String,
    pub bandit: BanditSnapshot,
    pub q_table: Vec<QTableRecord>,
    pub learner: LearnerSnapshot,
    pub rewards: BTreeMap<Category, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub rewards: BTreeMap<Category, CategoryRewardStats>,
    pub bandit: BanditStats,
    pub rl: RlStats,
    pub learner: LearnerStats,
}

pub struct PolicyEngine {
    rewards: Mutex<RewardShaper>,
    bandit: Mutex<BanditSelector>,
    rl: Mutex<RLPolicy>,
    learner: Mutex<OnlineLearner>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> PolicyResult<Self> {
        config.validate()?;
        Ok(Self {
            rewards: Mutex::new(RewardShaper::new(config.reward)),
            bandit: Mutex::new(BanditSelector::new(config.bandit)),
            rl: Mutex::new(RLPolicy::new(config.rl)),
            learner: Mutex::new(OnlineLearner::new(config.online)),
        })
    }

    pub fn from_env() -> PolicyResult<Self> {
        Self::new(PolicyConfig::from_env())
    }

    // ==================== Feedback ====================

    /// Shape the reward, credit the arm and, with a transition, apply the Q-update.
    ///
    /// Bandit and Q-table both receive the reward clipped to [-1, 1].
    pub fn record_feedback(&self, record: &FeedbackRecord) -> FeedbackOutcome {
        let reward = self.rewards.lock().shape_reward(&record.event);
        let normalized_reward = RewardShaper::normalize_reward(reward.total_reward);

        self.bandit
            .lock()
            .update_reward(record.arm, normalized_reward, record.context.as_ref());

        let q_value = record.transition.as_ref().map(|t| {
            self.rl.lock().update(&Episode {
                state: t.state,
                action: t.action,
                reward: normalized_reward,
                next_state: t.next_state,
                done: t.done,
            })
        });

        debug!(
            category = %record.event.category,
            arm = %record.arm,
            total = reward.total_reward,
            normalized_reward,
            "feedback recorded"
        );

        FeedbackOutcome {
            reward,
            normalized_reward,
            q_value,
        }
    }

    pub fn shape_reward(&self, event: &FeedbackEvent) -> ShapedReward {
        self.rewards.lock().shape_reward(event)
    }

    // ==================== Decisions ====================

    pub fn select_strategy(&self, context: Option<&BanditContext>) -> SelectionResult {
        self.bandit.lock().select(context)
    }

    pub fn select_strategy_with(
        &self,
        algorithm: BanditAlgorithm,
        context: Option<&BanditContext>,
    ) -> SelectionResult {
        self.bandit.lock().select_with(algorithm, context)
    }

    pub fn update_strategy_reward(
        &self,
        arm: StrategyArm,
        reward: f64,
        context: Option<&BanditContext>,
    ) {
        self.bandit.lock().update_reward(arm, reward, context);
    }

    pub fn select_action(&self, state: &PolicyState) -> ActionSelection {
        self.rl.lock().select_action(state)
    }

    pub fn update_policy(&self, episode: &Episode) -> f64 {
        self.rl.lock().update(episode)
    }

    pub fn batch_update_policy(&self, episodes: &[Episode]) -> usize {
        self.rl.lock().batch_update(episodes)
    }

    // ==================== Online Learning ====================

    /// Train the category's classifier and surface any drift it now shows.
    ///
    /// Recommendations are logged only; the host decides whether to adapt or retrain.
    pub fn train(&self, example: &OnlineExample) -> UpdateOutcome {
        let mut learner = self.learner.lock();
        let outcome = learner.update(example);
        let report = learner.detect_drift(Some(example.category));
        drop(learner);

        if report.drift_detected {
            match report.recommended_action {
                DriftAction::Retrain | DriftAction::Adapt => warn!(
                    category = %example.category,
                    magnitude = report.drift_magnitude,
                    drift_type = ?report.drift_type,
                    action = ?report.recommended_action,
                    "concept drift detected"
                ),
                _ => debug!(
                    category = %example.category,
                    magnitude = report.drift_magnitude,
                    "incremental drift"
                ),
            }
        }
        outcome
    }

    pub fn predict(&self, features: &[f64], category: Category) -> f64 {
        self.learner.lock().predict_for_category(features, category)
    }

    pub fn predict_batch(&self, batch: &[Vec<f64>], category: Category) -> Vec<f64> {
        self.learner.lock().predict_batch(batch, category)
    }

    pub fn detect_drift(&self, category: Option<Category>) -> DriftReport {
        self.learner.lock().detect_drift(category)
    }

    pub fn adapt_to_drift(&self, category: Option<Category>) {
        self.learner.lock().adapt_to_drift(category);
    }

    pub fn retrain_model(&self, category: Category) {
        self.learner.lock().retrain_model(category);
    }

    pub fn adjust_learning_rate(&self, performance_trend: f64) {
        self.learner.lock().adjust_learning_rate(performance_trend);
    }

    // ==================== Stats & State ====================

    pub fn get_stats(&self) -> EngineStats {
        // one lock at a time; struct-literal temporaries would hold all four
        let rewards = self.rewards.lock().get_stats();
        let bandit = self.bandit.lock().get_stats();
        let rl = self.rl.lock().get_stats();
        let learner = self.learner.lock().get_stats();
        EngineStats {
            rewards,
            bandit,
            rl,
            learner,
        }
    }

    pub fn clear(&self) {
        self.rewards.lock().clear();
        self.bandit.lock().clear();
        self.rl.lock().clear();
        self.learner.lock().clear();
        info!("policy engine cleared");
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let rewards = self.rewards.lock().export_history();
        let bandit = self.bandit.lock().export_state();
        let q_table = self.rl.lock().export_q_table();
        let learner = self.learner.lock().export_snapshot();
        EngineSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            bandit,
            q_table,
            learner,
            rewards,
        }
    }

    pub fn snapshot_json(&self) -> PolicyResult<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn restore(&self, snapshot: EngineSnapshot) -> PolicyResult<ImportReport> {
        check_version(&snapshot.version)?;

        let rewards = self.rewards.lock().import_history(snapshot.rewards);
        let bandit = self.bandit.lock().import_state(snapshot.bandit);
        let q_table = self.rl.lock().import_q_table(snapshot.q_table);
        let learner = self.learner.lock().import_snapshot(snapshot.learner);
        let report = rewards.merge(bandit).merge(q_table).merge(learner);

        info!(imported = report.imported, skipped = report.skipped, "engine restored");
        Ok(report)
    }

    /// Restore from raw JSON, skipping malformed records section by section.
    pub fn restore_json(&self, raw: &str) -> PolicyResult<ImportReport> {
        let value: Value = serde_json::from_str(raw)?;
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("missing");
        check_version(version)?;

        let null = Value::Null;
        let section = |name: &'static str| value.get(name).unwrap_or(&null);

        let (history, skipped_rewards) = decode_reward_history(section("rewards"));
        let rewards = self.rewards.lock().import_history(history);
        let bandit = self.bandit.lock().import_state_json(section("bandit"));
        let q_table = self.rl.lock().import_q_table_value(section("q_table"));
        let learner = self.learner.lock().import_snapshot_value(section("learner"));

        let report = rewards
            .merge(bandit)
            .merge(q_table)
            .merge(learner)
            .merge(ImportReport {
                imported: 0,
                skipped: skipped_rewards,
            });

        info!(imported = report.imported, skipped = report.skipped, "engine restored from json");
        Ok(report)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self {
            rewards: Mutex::new(RewardShaper::default()),
            bandit: Mutex::new(BanditSelector::default()),
            rl: Mutex::new(RLPolicy::default()),
            learner: Mutex::new(OnlineLearner::default()),
        }
    }
}

fn check_version(found: &str) -> PolicyResult<()> {
    if found == SNAPSHOT_VERSION {
        Ok(())
    } else {
        Err(PolicyError::UnsupportedVersion {
            expected: SNAPSHOT_VERSION.to_string(),
            found: found.to_string(),
        })
    }
}

/// `{ "<category>": [rewards...] }`; unknown categories and non-numeric entries are skipped.
fn decode_reward_history(value: &Value) -> (BTreeMap<Category, Vec<f64>>, usize) {
    let mut history = BTreeMap::new();
    let Some(entries) = value.as_object() else {
        return (history, usize::from(!value.is_null()));
    };

    let mut skipped = 0;
    for (key, rewards) in entries {
        let (Some(category), Some(items)) = (Category::from_str(key), rewards.as_array()) else {
            warn!(key = %key, "skipping malformed reward history");
            skipped += 1;
            continue;
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item.as_f64() {
                Some(v) => values.push(v),
                None => skipped += 1,
            }
        }
        history.insert(category, values);
    }
    (history, skipped)
}
