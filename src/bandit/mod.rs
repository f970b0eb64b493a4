//! Multi-Armed Bandit Strategy Selection
//!
//! Chooses which detection strategy ("arm") to apply. Four interchangeable
//! algorithms share the same evolving arm statistics:
//! - UCB1: average reward plus `c·sqrt(ln N / n)`; unpulled arms score +∞
//! - Thompson Sampling: argmax of a Beta(α, β) draw per arm
//! - Epsilon-greedy: uniform random arm with probability ε, otherwise best average
//! - Contextual: best average plus a bonus derived from the caller's context
//!
//! `select` uses Thompson Sampling until a category has enough pulls, then switches to
//! contextual scoring. Statistics are kept globally and per category; both are updated
//! on every reward that carries a context.

pub mod sampling;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info};

use crate::config::BanditConfig;
use crate::persistence::{decode_records, ImportReport};
use crate::types::{
    observation_confidence, Category, StrategyArm, TimeOfDay, UserSensitivity, EPSILON,
};

pub use sampling::BetaSampler;

/// Complexity score above which the adaptive arm earns its bonus
const HIGH_COMPLEXITY: f64 = 0.7;

/// Accuracy below which every arm earns an exploration bonus
const LOW_ACCURACY: f64 = 0.6;

// ==================== Data Structures ====================

/// Caller-supplied situation the strategy will run in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditContext {
    pub category: Category,
    pub time_of_day: TimeOfDay,
    pub user_sensitivity: UserSensitivity,
    pub recent_accuracy: f64,
    pub modality_count: u32,
    pub complexity_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BanditAlgorithm {
    Ucb1,
    ThompsonSampling,
    EpsilonGreedy,
    Contextual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub pulls: u64,
    pub total_reward: f64,
    pub avg_reward: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub recent_rewards: VecDeque<f64>,
    pub alpha: f64,
    pub beta: f64,
}

impl ArmStats {
    pub fn new(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            pulls: 0,
            total_reward: 0.0,
            avg_reward: 0.0,
            success_count: 0,
            failure_count: 0,
            recent_rewards: VecDeque::new(),
            alpha: prior_alpha.max(EPSILON),
            beta: prior_beta.max(EPSILON),
        }
    }

    fn record(&mut self, reward: f64, success_threshold: f64, window: usize) {
        self.pulls += 1;
        self.total_reward += reward;
        self.avg_reward = self.total_reward / self.pulls as f64;

        self.recent_rewards.push_back(reward);
        while self.recent_rewards.len() > window {
            self.recent_rewards.pop_front();
        }

        if reward > success_threshold {
            self.success_count += 1;
            self.alpha += 1.0;
        } else {
            self.failure_count += 1;
            self.beta += 1.0;
        }
    }

    /// Posterior mean of the Beta distribution
    pub fn expected_value(&self) -> f64 {
        let sum = self.alpha + self.beta;
        if sum > 0.0 {
            self.alpha / sum
        } else {
            0.5
        }
    }

    pub fn is_valid(&self) -> bool {
        self.total_reward.is_finite()
            && self.alpha.is_finite()
            && self.beta.is_finite()
            && self.alpha > 0.0
            && self.beta > 0.0
            && self.success_count + self.failure_count <= self.pulls
            && self.recent_rewards.iter().all(|r| r.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub arm: StrategyArm,
    pub confidence: f64,
    pub expected_reward: f64,
    pub exploration_bonus: f64,
    pub algorithm: BanditAlgorithm,
    pub is_exploration: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditStats {
    pub total_pulls: u64,
    pub cumulative_regret: f64,
    pub best_arm: Option<StrategyArm>,
    pub arms: BTreeMap<StrategyArm, ArmStats>,
    pub categories_tracked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmRecord {
    #[serde(default)]
    pub category: Option<Category>,
    pub arm: StrategyArm,
    pub stats: ArmStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditSnapshot {
    pub cumulative_regret: f64,
    pub arms: Vec<ArmRecord>,
}

type ArmTable = BTreeMap<StrategyArm, ArmStats>;

// ==================== Main Implementation ====================

pub struct BanditSelector {
    config: BanditConfig,
    global_arms: ArmTable,
    category_arms: HashMap<Category, ArmTable>,
    cumulative_regret: f64,
    sampler: BetaSampler,
}

impl BanditSelector {
    pub fn new(config: BanditConfig) -> Self {
        let sampler = BetaSampler::new(config.seed);
        let global_arms = fresh_arms(&config);
        Self {
            config,
            global_arms,
            category_arms: HashMap::new(),
            cumulative_regret: 0.0,
            sampler,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(BanditConfig {
            seed: Some(seed),
            ..Default::default()
        })
    }

    // ==================== Selection ====================

    /// Thompson Sampling until the context's category has enough pulls, contextual after.
    pub fn select(&mut self, context: Option<&BanditContext>) -> SelectionResult {
        if let Some(ctx) = context {
            if self.category_pulls(ctx.category) >= self.config.contextual_min_pulls {
                return self.select_contextual(ctx);
            }
        }
        self.select_thompson(context)
    }

    pub fn select_ucb(&mut self, context: Option<&BanditContext>) -> SelectionResult {
        let c = self.config.ucb_c;
        let arms = arms_for(
            &self.config,
            &self.global_arms,
            &mut self.category_arms,
            context.map(|ctx| ctx.category),
        );
        let total_pulls: u64 = arms.values().map(|s| s.pulls).sum();
        let ln_total = (total_pulls.max(1) as f64).ln();

        let mut best: Option<(StrategyArm, f64, f64)> = None;
        for arm in StrategyArm::ALL {
            let stats = &arms[&arm];
            let bonus = if stats.pulls == 0 {
                f64::INFINITY
            } else {
                c * (ln_total / stats.pulls as f64).sqrt()
            };
            let score = stats.avg_reward + bonus;
            if best.map_or(true, |(_, best_score, _)| score > best_score) {
                best = Some((arm, score, bonus));
            }
        }

        let (arm, _, bonus) = best.unwrap_or((StrategyArm::ALL[0], 0.0, 0.0));
        let stats = &arms[&arm];
        SelectionResult {
            arm,
            confidence: observation_confidence(stats.pulls as f64),
            expected_reward: stats.avg_reward,
            exploration_bonus: bonus,
            algorithm: BanditAlgorithm::Ucb1,
            is_exploration: stats.pulls == 0 || Some(arm) != greedy_arm(arms),
        }
    }

    pub fn select_thompson(&mut self, context: Option<&BanditContext>) -> SelectionResult {
        let arms = arms_for(
            &self.config,
            &self.global_arms,
            &mut self.category_arms,
            context.map(|ctx| ctx.category),
        );

        let mut best: Option<(StrategyArm, f64)> = None;
        for arm in StrategyArm::ALL {
            let stats = &arms[&arm];
            let sample = self.sampler.sample_beta(stats.alpha, stats.beta);
            if best.map_or(true, |(_, best_sample)| sample > best_sample) {
                best = Some((arm, sample));
            }
        }

        let (arm, sample) = best.unwrap_or((StrategyArm::ALL[0], 0.5));
        let stats = &arms[&arm];
        SelectionResult {
            arm,
            confidence: observation_confidence(stats.pulls as f64),
            expected_reward: stats.avg_reward,
            exploration_bonus: sample - stats.expected_value(),
            algorithm: BanditAlgorithm::ThompsonSampling,
            is_exploration: leader_by(arms, ArmStats::expected_value) != Some(arm),
        }
    }

    pub fn select_epsilon_greedy(&mut self, context: Option<&BanditContext>) -> SelectionResult {
        let explore = self.sampler.uniform() < self.config.epsilon;
        let random_index = if explore {
            Some(self.sampler.index(StrategyArm::COUNT))
        } else {
            None
        };
        let arms = arms_for(
            &self.config,
            &self.global_arms,
            &mut self.category_arms,
            context.map(|ctx| ctx.category),
        );

        let arm = match random_index {
            Some(index) => StrategyArm::ALL[index],
            None => greedy_arm(arms).unwrap_or(StrategyArm::ALL[0]),
        };
        let stats = &arms[&arm];
        SelectionResult {
            arm,
            confidence: observation_confidence(stats.pulls as f64),
            expected_reward: stats.avg_reward,
            exploration_bonus: 0.0,
            algorithm: BanditAlgorithm::EpsilonGreedy,
            is_exploration: explore,
        }
    }

    pub fn select_contextual(&mut self, context: &BanditContext) -> SelectionResult {
        let arms = arms_for(
            &self.config,
            &self.global_arms,
            &mut self.category_arms,
            Some(context.category),
        );

        let mut best: Option<(StrategyArm, f64, f64)> = None;
        for arm in StrategyArm::ALL {
            let bonus = context_bonus(arm, context);
            let score = arms[&arm].avg_reward + bonus;
            if best.map_or(true, |(_, best_score, _)| score > best_score) {
                best = Some((arm, score, bonus));
            }
        }

        let (arm, _, bonus) = best.unwrap_or((StrategyArm::ALL[0], 0.0, 0.0));
        let stats = &arms[&arm];
        SelectionResult {
            arm,
            confidence: observation_confidence(stats.pulls as f64),
            expected_reward: stats.avg_reward,
            exploration_bonus: bonus,
            algorithm: BanditAlgorithm::Contextual,
            is_exploration: false,
        }
    }

    pub fn select_with(
        &mut self,
        algorithm: BanditAlgorithm,
        context: Option<&BanditContext>,
    ) -> SelectionResult {
        match (algorithm, context) {
            (BanditAlgorithm::Ucb1, _) => self.select_ucb(context),
            (BanditAlgorithm::ThompsonSampling, _) => self.select_thompson(context),
            (BanditAlgorithm::EpsilonGreedy, _) => self.select_epsilon_greedy(context),
            (BanditAlgorithm::Contextual, Some(ctx)) => self.select_contextual(ctx),
            // contextual scoring without a context degrades to the exploit branch
            (BanditAlgorithm::Contextual, None) => {
                let arm = greedy_arm(&self.global_arms).unwrap_or(StrategyArm::ALL[0]);
                let stats = &self.global_arms[&arm];
                SelectionResult {
                    arm,
                    confidence: observation_confidence(stats.pulls as f64),
                    expected_reward: stats.avg_reward,
                    exploration_bonus: 0.0,
                    algorithm: BanditAlgorithm::Contextual,
                    is_exploration: false,
                }
            }
        }
    }

    // ==================== Update ====================

    pub fn update_reward(&mut self, arm: StrategyArm, reward: f64, context: Option<&BanditContext>) {
        let reward = if reward.is_finite() { reward } else { 0.0 };

        // regret is measured against the global leader before this observation lands
        if let Some(best_avg) = self
            .global_arms
            .values()
            .filter(|s| s.pulls > 0)
            .map(|s| s.avg_reward)
            .reduce(f64::max)
        {
            self.cumulative_regret += (best_avg - reward).max(0.0);
        }

        let threshold = self.config.success_threshold;
        let window = self.config.recent_window;
        if let Some(stats) = self.global_arms.get_mut(&arm) {
            stats.record(reward, threshold, window);
        }

        if let Some(ctx) = context {
            let table = self
                .category_arms
                .entry(ctx.category)
                .or_insert_with(|| fresh_arms(&self.config));
            if let Some(stats) = table.get_mut(&arm) {
                stats.record(reward, threshold, window);
            }
        }

        debug!(
            arm = %arm,
            reward,
            category = ?context.map(|c| c.category),
            cumulative_regret = self.cumulative_regret,
            "bandit reward recorded"
        );
    }

    // ==================== Query Methods ====================

    /// Owned copy of an arm's statistics; unknown keys yield the prior.
    pub fn arm_stats(&self, arm: StrategyArm, category: Option<Category>) -> ArmStats {
        let table = match category {
            Some(c) => self.category_arms.get(&c),
            None => Some(&self.global_arms),
        };
        table
            .and_then(|t| t.get(&arm))
            .cloned()
            .unwrap_or_else(|| ArmStats::new(self.config.prior_alpha, self.config.prior_beta))
    }

    pub fn category_pulls(&self, category: Category) -> u64 {
        self.category_arms
            .get(&category)
            .map(|t| t.values().map(|s| s.pulls).sum())
            .unwrap_or(0)
    }

    pub fn total_pulls(&self) -> u64 {
        self.global_arms.values().map(|s| s.pulls).sum()
    }

    pub fn cumulative_regret(&self) -> f64 {
        self.cumulative_regret
    }

    pub fn get_stats(&self) -> BanditStats {
        let best_arm = if self.total_pulls() > 0 {
            greedy_arm(&self.global_arms)
        } else {
            None
        };
        BanditStats {
            total_pulls: self.total_pulls(),
            cumulative_regret: self.cumulative_regret,
            best_arm,
            arms: self.global_arms.clone(),
            categories_tracked: self.category_arms.len(),
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.sampler.set_seed(seed);
    }

    pub fn clear(&mut self) {
        self.global_arms = fresh_arms(&self.config);
        self.category_arms.clear();
        self.cumulative_regret = 0.0;
        info!("bandit statistics cleared");
    }

    // ==================== State Management ====================

    pub fn export_state(&self) -> BanditSnapshot {
        let mut arms: Vec<ArmRecord> = self
            .global_arms
            .iter()
            .map(|(&arm, stats)| ArmRecord {
                category: None,
                arm,
                stats: stats.clone(),
            })
            .collect();

        let mut categories: Vec<_> = self.category_arms.keys().copied().collect();
        categories.sort();
        for category in categories {
            for (&arm, stats) in &self.category_arms[&category] {
                arms.push(ArmRecord {
                    category: Some(category),
                    arm,
                    stats: stats.clone(),
                });
            }
        }

        BanditSnapshot {
            cumulative_regret: self.cumulative_regret,
            arms,
        }
    }

    /// Restore arms record by record; invalid statistics are skipped.
    pub fn import_state(&mut self, snapshot: BanditSnapshot) -> ImportReport {
        let mut report = ImportReport::default();
        if snapshot.cumulative_regret.is_finite() && snapshot.cumulative_regret >= 0.0 {
            self.cumulative_regret = snapshot.cumulative_regret;
        }

        for record in snapshot.arms {
            if !record.stats.is_valid() {
                report.skipped += 1;
                tracing::warn!(arm = %record.arm, category = ?record.category, "skipping invalid arm record");
                continue;
            }

            let mut stats = record.stats;
            stats.avg_reward = if stats.pulls > 0 {
                stats.total_reward / stats.pulls as f64
            } else {
                0.0
            };
            while stats.recent_rewards.len() > self.config.recent_window {
                stats.recent_rewards.pop_front();
            }

            let table = match record.category {
                Some(category) => self
                    .category_arms
                    .entry(category)
                    .or_insert_with(|| fresh_arms(&self.config)),
                None => &mut self.global_arms,
            };
            table.insert(record.arm, stats);
            report.imported += 1;
        }

        info!(imported = report.imported, skipped = report.skipped, "bandit state restored");
        report
    }

    /// Lenient restore from an untyped document
    pub fn import_state_json(&mut self, value: &Value) -> ImportReport {
        let cumulative_regret = value
            .get("cumulative_regret")
            .and_then(Value::as_f64)
            .unwrap_or(self.cumulative_regret);
        let (arms, skipped) =
            decode_records::<ArmRecord>(value.get("arms").unwrap_or(&Value::Null), "arm");
        let report = self.import_state(BanditSnapshot {
            cumulative_regret,
            arms,
        });
        report.merge(ImportReport { imported: 0, skipped })
    }
}

impl Default for BanditSelector {
    fn default() -> Self {
        Self::new(BanditConfig::default())
    }
}

// ==================== Helpers ====================

fn fresh_arms(config: &BanditConfig) -> ArmTable {
    StrategyArm::ALL
        .iter()
        .map(|&arm| (arm, ArmStats::new(config.prior_alpha, config.prior_beta)))
        .collect()
}

/// Statistics table a selection reads: the category's when given, the global one otherwise.
fn arms_for<'a>(
    config: &BanditConfig,
    global: &'a ArmTable,
    per_category: &'a mut HashMap<Category, ArmTable>,
    category: Option<Category>,
) -> &'a ArmTable {
    match category {
        Some(c) => per_category.entry(c).or_insert_with(|| fresh_arms(config)),
        None => global,
    }
}

/// Highest average reward, first arm in enumeration order on ties
fn greedy_arm(arms: &ArmTable) -> Option<StrategyArm> {
    leader_by(arms, |stats| stats.avg_reward)
}

fn leader_by(arms: &ArmTable, key: impl Fn(&ArmStats) -> f64) -> Option<StrategyArm> {
    let mut best: Option<(StrategyArm, f64)> = None;
    for arm in StrategyArm::ALL {
        let Some(stats) = arms.get(&arm) else { continue };
        let value = key(stats);
        if best.map_or(true, |(_, v)| value > v) {
            best = Some((arm, value));
        }
    }
    best.map(|(arm, _)| arm)
}

pub fn context_bonus(arm: StrategyArm, context: &BanditContext) -> f64 {
    let mut bonus = 0.0;
    match arm {
        StrategyArm::Conservative if context.user_sensitivity == UserSensitivity::High => {
            bonus += 0.2
        }
        StrategyArm::Aggressive if context.user_sensitivity == UserSensitivity::Low => {
            bonus += 0.2
        }
        StrategyArm::Adaptive if context.complexity_score > HIGH_COMPLEXITY => bonus += 0.15,
        StrategyArm::Ensemble if context.modality_count >= 2 => bonus += 0.1,
        _ => {}
    }
    if context.recent_accuracy < LOW_ACCURACY {
        bonus += 0.1;
    }
    bonus
}

// ==================== Unit Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn context(category: Category, sensitivity: UserSensitivity) -> BanditContext {
        BanditContext {
            category,
            time_of_day: TimeOfDay::Evening,
            user_sensitivity: sensitivity,
            recent_accuracy: 0.8,
            modality_count: 1,
            complexity_score: 0.2,
        }
    }

    #[test]
    fn test_ucb_explores_unpulled_arm_first() {
        let mut bandit = BanditSelector::with_seed(42);
        for arm in [
            StrategyArm::Conservative,
            StrategyArm::Balanced,
            StrategyArm::Adaptive,
            StrategyArm::Ensemble,
        ] {
            bandit.update_reward(arm, 1.0, None);
        }
        let selection = bandit.select_ucb(None);
        assert_eq!(selection.arm, StrategyArm::Aggressive);
        assert!(selection.exploration_bonus.is_infinite());
        assert!(selection.is_exploration);
    }

    #[test]
    fn test_ucb_cold_start_picks_first_arm() {
        let mut bandit = BanditSelector::with_seed(1);
        assert_eq!(bandit.select_ucb(None).arm, StrategyArm::Conservative);
    }

    #[test]
    fn test_ucb_prefers_rewarding_arm_once_explored() {
        let mut bandit = BanditSelector::with_seed(1);
        for arm in StrategyArm::ALL {
            let reward = if arm == StrategyArm::Adaptive { 1.0 } else { 0.0 };
            for _ in 0..30 {
                bandit.update_reward(arm, reward, None);
            }
        }
        assert_eq!(bandit.select_ucb(None).arm, StrategyArm::Adaptive);
    }

    #[test]
    fn test_alpha_beta_follow_threshold() {
        let mut bandit = BanditSelector::with_seed(1);
        bandit.update_reward(StrategyArm::Balanced, 0.9, None);
        bandit.update_reward(StrategyArm::Balanced, 0.5, None);
        bandit.update_reward(StrategyArm::Balanced, -0.3, None);
        let stats = bandit.arm_stats(StrategyArm::Balanced, None);
        assert_eq!(stats.alpha, 2.0);
        assert_eq!(stats.beta, 3.0);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.pulls, 3);
        assert!((stats.avg_reward - 1.1 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_recent_rewards_bounded() {
        let mut bandit = BanditSelector::with_seed(1);
        for i in 0..120 {
            bandit.update_reward(StrategyArm::Ensemble, i as f64 / 120.0, None);
        }
        let stats = bandit.arm_stats(StrategyArm::Ensemble, None);
        assert_eq!(stats.recent_rewards.len(), 50);
        assert!((stats.recent_rewards[0] - 70.0 / 120.0).abs() < 1e-12);
    }

    #[test]
    fn test_context_updates_both_tables() {
        let mut bandit = BanditSelector::with_seed(1);
        let ctx = context(Category::Blood, UserSensitivity::Medium);
        bandit.update_reward(StrategyArm::Aggressive, 1.0, Some(&ctx));
        assert_eq!(bandit.arm_stats(StrategyArm::Aggressive, None).pulls, 1);
        assert_eq!(bandit.arm_stats(StrategyArm::Aggressive, Some(Category::Blood)).pulls, 1);
        assert_eq!(bandit.arm_stats(StrategyArm::Aggressive, Some(Category::Gore)).pulls, 0);
        assert_eq!(bandit.category_pulls(Category::Blood), 1);
    }

    #[test]
    fn test_regret_zero_when_matching_best() {
        let mut bandit = BanditSelector::with_seed(1);
        bandit.update_reward(StrategyArm::Conservative, 0.8, None);
        assert_eq!(bandit.cumulative_regret(), 0.0);
        bandit.update_reward(StrategyArm::Balanced, 0.8, None);
        assert_eq!(bandit.cumulative_regret(), 0.0);
        bandit.update_reward(StrategyArm::Balanced, 0.3, None);
        assert!((bandit.cumulative_regret() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_context_bonus_rules() {
        let high = context(Category::Gore, UserSensitivity::High);
        assert!((context_bonus(StrategyArm::Conservative, &high) - 0.2).abs() < 1e-12);
        assert_eq!(context_bonus(StrategyArm::Aggressive, &high), 0.0);

        let mut low = context(Category::Gore, UserSensitivity::Low);
        low.recent_accuracy = 0.4;
        low.modality_count = 3;
        low.complexity_score = 0.9;
        assert!((context_bonus(StrategyArm::Aggressive, &low) - 0.3).abs() < 1e-12);
        assert!((context_bonus(StrategyArm::Adaptive, &low) - 0.25).abs() < 1e-12);
        assert!((context_bonus(StrategyArm::Ensemble, &low) - 0.2).abs() < 1e-12);
        assert!((context_bonus(StrategyArm::Balanced, &low) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_select_switches_to_contextual() {
        let mut bandit = BanditSelector::with_seed(3);
        let ctx = context(Category::Heights, UserSensitivity::High);
        assert_eq!(bandit.select(Some(&ctx)).algorithm, BanditAlgorithm::ThompsonSampling);

        for _ in 0..20 {
            bandit.update_reward(StrategyArm::Balanced, 0.6, Some(&ctx));
        }
        let selection = bandit.select(Some(&ctx));
        assert_eq!(selection.algorithm, BanditAlgorithm::Contextual);
        // balanced 0.6 beats conservative 0.0 + 0.2
        assert_eq!(selection.arm, StrategyArm::Balanced);
    }

    #[test]
    fn test_select_without_context_uses_thompson() {
        let mut bandit = BanditSelector::with_seed(3);
        for _ in 0..50 {
            bandit.update_reward(StrategyArm::Balanced, 1.0, None);
        }
        assert_eq!(bandit.select(None).algorithm, BanditAlgorithm::ThompsonSampling);
    }

    #[test]
    fn test_epsilon_greedy_exploits_mostly() {
        let mut bandit = BanditSelector::with_seed(11);
        for arm in StrategyArm::ALL {
            let reward = if arm == StrategyArm::Ensemble { 0.9 } else { 0.1 };
            bandit.update_reward(arm, reward, None);
        }
        let picks = (0..500)
            .filter(|_| bandit.select_epsilon_greedy(None).arm == StrategyArm::Ensemble)
            .count();
        assert!(picks > 400, "ensemble picked {} times", picks);
    }

    #[test]
    fn test_stats_idempotent_and_clear() {
        let mut bandit = BanditSelector::with_seed(5);
        bandit.update_reward(StrategyArm::Adaptive, 0.7, None);
        assert_eq!(bandit.get_stats(), bandit.get_stats());
        assert_eq!(bandit.get_stats().best_arm, Some(StrategyArm::Adaptive));

        bandit.clear();
        let stats = bandit.get_stats();
        assert_eq!(stats.total_pulls, 0);
        assert_eq!(stats.cumulative_regret, 0.0);
        assert_eq!(stats.best_arm, None);
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut bandit = BanditSelector::with_seed(5);
        let ctx = context(Category::Snakes, UserSensitivity::Low);
        bandit.update_reward(StrategyArm::Aggressive, 0.9, Some(&ctx));
        bandit.update_reward(StrategyArm::Conservative, 0.1, None);
        let snapshot = bandit.export_state();

        let mut restored = BanditSelector::with_seed(6);
        let report = restored.import_state(snapshot);
        assert_eq!(report.skipped, 0);
        assert_eq!(restored.get_stats(), bandit.get_stats());
        assert_eq!(
            restored.arm_stats(StrategyArm::Aggressive, Some(Category::Snakes)),
            bandit.arm_stats(StrategyArm::Aggressive, Some(Category::Snakes))
        );
    }

    #[test]
    fn test_import_json_skips_malformed_arms() {
        let mut bandit = BanditSelector::with_seed(5);
        bandit.update_reward(StrategyArm::Balanced, 0.9, None);
        let mut value = serde_json::to_value(bandit.export_state()).unwrap();
        let arms = value["arms"].as_array_mut().unwrap();
        arms.push(serde_json::json!({"arm": "not-an-arm", "stats": {}}));
        arms[0]["stats"]["alpha"] = serde_json::json!(-1.0);

        let mut restored = BanditSelector::with_seed(6);
        let report = restored.import_state_json(&value);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.imported, StrategyArm::COUNT - 1);
        assert_eq!(restored.arm_stats(StrategyArm::Balanced, None).pulls, 1);
    }
}
