//! Tabular Q-Learning Policy
//!
//! Maps a discretized detection context to a warning-threshold action.
//! - Exploration: epsilon-greedy, epsilon decays multiplicatively on every selection
//!   down to a floor
//! - Learning: `Q(s,a) ← Q(s,a) + α·[r + γ·max_a' Q(s',a')·(1 − done) − Q(s,a)]`
//! - Unvisited pairs read as 0, so untried actions are not penalized
//!
//! Entries are keyed by a stable string built from the state's discretized fields
//! and the action name, which is also the persisted form.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::config::RlConfig;
use crate::error::PolicyResult;
use crate::persistence::{decode_records, ImportReport};
use crate::types::{observation_confidence, Category, TimeOfDay, UserSensitivity};

/// Number of confidence bins over [0, 1]
pub const CONFIDENCE_BINS: u8 = 10;

/// Modality counts above this share one bucket
pub const MAX_MODALITIES: u8 = 4;

const KEY_SEPARATOR: &str = "::";

// ==================== State & Action ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyState {
    pub category: Category,
    pub confidence_bin: u8,
    pub modality_count: u8,
    pub time_of_day: TimeOfDay,
    pub user_sensitivity: UserSensitivity,
}

impl PolicyState {
    pub fn discretize(
        category: Category,
        confidence: f64,
        modality_count: u32,
        hour: u32,
        user_sensitivity: UserSensitivity,
    ) -> Self {
        Self {
            category,
            confidence_bin: confidence_bin(confidence),
            modality_count: modality_count.min(MAX_MODALITIES as u32) as u8,
            time_of_day: TimeOfDay::from_hour(hour),
            user_sensitivity,
        }
    }

    pub fn key(&self) -> String {
        format!(
            "{}|c{}|m{}|{}|{}",
            self.category.as_str(),
            self.confidence_bin,
            self.modality_count,
            self.time_of_day.as_str(),
            self.user_sensitivity.as_str()
        )
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        let mut parts = key.split('|');
        let category = Category::from_str(parts.next()?)?;
        let confidence_bin: u8 = parts.next()?.strip_prefix('c')?.parse().ok()?;
        let modality_count: u8 = parts.next()?.strip_prefix('m')?.parse().ok()?;
        let time_of_day = TimeOfDay::from_str(parts.next()?)?;
        let user_sensitivity = UserSensitivity::from_str(parts.next()?)?;
        if parts.next().is_some()
            || confidence_bin >= CONFIDENCE_BINS
            || modality_count > MAX_MODALITIES
        {
            return None;
        }
        Some(Self {
            category,
            confidence_bin,
            modality_count,
            time_of_day,
            user_sensitivity,
        })
    }
}

fn confidence_bin(confidence: f64) -> u8 {
    if !confidence.is_finite() {
        return 0;
    }
    let bin = (confidence.clamp(0.0, 1.0) * CONFIDENCE_BINS as f64).floor() as u8;
    bin.min(CONFIDENCE_BINS - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyAction {
    HighThreshold,
    MediumThreshold,
    LowThreshold,
    Suppress,
}

impl PolicyAction {
    pub const ALL: [PolicyAction; 4] = [
        PolicyAction::HighThreshold,
        PolicyAction::MediumThreshold,
        PolicyAction::LowThreshold,
        PolicyAction::Suppress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::HighThreshold => "high-threshold",
            PolicyAction::MediumThreshold => "medium-threshold",
            PolicyAction::LowThreshold => "low-threshold",
            PolicyAction::Suppress => "suppress",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        PolicyAction::ALL.iter().copied().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn entry_key(state: &PolicyState, action: PolicyAction) -> String {
    format!("{}{}{}", state.key(), KEY_SEPARATOR, action.as_str())
}

fn parse_entry_key(key: &str) -> Option<(PolicyState, PolicyAction)> {
    let (state, action) = key.rsplit_once(KEY_SEPARATOR)?;
    Some((PolicyState::parse_key(state)?, PolicyAction::from_str(action)?))
}

// ==================== Records ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub value: f64,
    pub visits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub state: PolicyState,
    pub action: PolicyAction,
    pub reward: f64,
    pub next_state: PolicyState,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSelection {
    pub action: PolicyAction,
    pub q_value: f64,
    pub confidence: f64,
    pub is_exploration: bool,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTableRecord {
    pub key: String,
    pub value: f64,
    pub visits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlStats {
    pub epsilon: f64,
    pub total_updates: u64,
    pub states_visited: usize,
    pub q_table_size: usize,
    pub mean_q_value: f64,
}

// ==================== Main Implementation ====================

pub struct RLPolicy {
    config: RlConfig,
    q_table: HashMap<String, QEntry>,
    epsilon: f64,
    total_updates: u64,
    rng: ChaCha8Rng,
}

impl RLPolicy {
    pub fn new(config: RlConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42)
        });
        Self {
            epsilon: config.epsilon,
            config,
            q_table: HashMap::new(),
            total_updates: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(RlConfig {
            seed: Some(seed),
            ..Default::default()
        })
    }

    pub fn select_action(&mut self, state: &PolicyState) -> ActionSelection {
        let explore = self.rng.gen::<f64>() < self.epsilon;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);

        let action = if explore {
            PolicyAction::ALL[self.rng.gen_range(0..PolicyAction::ALL.len())]
        } else {
            self.best_action(state)
        };

        ActionSelection {
            action,
            q_value: self.q_value(state, action),
            confidence: observation_confidence(self.state_visits(state) as f64),
            is_exploration: explore,
            policy: "epsilon-greedy".to_string(),
        }
    }

    /// Greedy action; the first action in declaration order wins ties.
    pub fn best_action(&self, state: &PolicyState) -> PolicyAction {
        let mut best = PolicyAction::ALL[0];
        let mut best_q = f64::NEG_INFINITY;
        for action in PolicyAction::ALL {
            let q = self.q_value(state, action);
            if q > best_q {
                best_q = q;
                best = action;
            }
        }
        best
    }

    pub fn q_value(&self, state: &PolicyState, action: PolicyAction) -> f64 {
        self.q_table
            .get(&entry_key(state, action))
            .map(|e| e.value)
            .unwrap_or(0.0)
    }

    pub fn entry(&self, state: &PolicyState, action: PolicyAction) -> QEntry {
        self.q_table
            .get(&entry_key(state, action))
            .copied()
            .unwrap_or_default()
    }

    fn max_q(&self, state: &PolicyState) -> f64 {
        PolicyAction::ALL
            .iter()
            .map(|&a| self.q_value(state, a))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn state_visits(&self, state: &PolicyState) -> u64 {
        PolicyAction::ALL
            .iter()
            .map(|&a| self.entry(state, a).visits)
            .sum()
    }

    /// Apply one Bellman backup and return the new Q-value.
    pub fn update(&mut self, episode: &Episode) -> f64 {
        let reward = if episode.reward.is_finite() {
            episode.reward
        } else {
            0.0
        };
        let future = if episode.done {
            0.0
        } else {
            self.max_q(&episode.next_state)
        };

        let alpha = self.config.learning_rate;
        let gamma = self.config.discount;
        let key = entry_key(&episode.state, episode.action);
        let entry = self.q_table.entry(key).or_default();
        let td_target = reward + gamma * future;
        let td_error = td_target - entry.value;
        entry.value += alpha * td_error;
        entry.visits += 1;
        let new_value = entry.value;
        self.total_updates += 1;

        debug!(
            state = %episode.state.key(),
            action = %episode.action,
            reward,
            td_target,
            q = new_value,
            "Q-learning update"
        );

        new_value
    }

    pub fn batch_update(&mut self, episodes: &[Episode]) -> usize {
        for episode in episodes {
            self.update(episode);
        }
        episodes.len()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn get_stats(&self) -> RlStats {
        let states: HashSet<&str> = self
            .q_table
            .keys()
            .filter_map(|k| k.rsplit_once(KEY_SEPARATOR).map(|(s, _)| s))
            .collect();
        let mean_q_value = if self.q_table.is_empty() {
            0.0
        } else {
            let mut values: Vec<f64> = self.q_table.values().map(|e| e.value).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.iter().sum::<f64>() / values.len() as f64
        };
        RlStats {
            epsilon: self.epsilon,
            total_updates: self.total_updates,
            states_visited: states.len(),
            q_table_size: self.q_table.len(),
            mean_q_value,
        }
    }

    pub fn clear(&mut self) {
        self.q_table.clear();
        self.total_updates = 0;
        self.epsilon = self.config.epsilon;
        info!("Q-table cleared");
    }

    // ==================== State Management ====================

    pub fn export_q_table(&self) -> Vec<QTableRecord> {
        let mut records: Vec<QTableRecord> = self
            .q_table
            .iter()
            .map(|(key, entry)| QTableRecord {
                key: key.clone(),
                value: entry.value,
                visits: entry.visits,
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Merge records into the table. Unparsable keys and non-finite values are skipped.
    pub fn import_q_table(&mut self, records: Vec<QTableRecord>) -> ImportReport {
        let mut report = ImportReport::default();
        for record in records {
            let Some((state, action)) = parse_entry_key(&record.key) else {
                report.skipped += 1;
                tracing::warn!(key = %record.key, "skipping Q-table record with malformed key");
                continue;
            };
            if !record.value.is_finite() {
                report.skipped += 1;
                tracing::warn!(key = %record.key, "skipping Q-table record with non-finite value");
                continue;
            }
            self.q_table.insert(
                entry_key(&state, action),
                QEntry {
                    value: record.value,
                    visits: record.visits,
                },
            );
            report.imported += 1;
        }
        info!(imported = report.imported, skipped = report.skipped, "Q-table imported");
        report
    }

    pub fn import_q_table_value(&mut self, value: &Value) -> ImportReport {
        let (records, skipped) = decode_records::<QTableRecord>(value, "q-table");
        self.import_q_table(records)
            .merge(ImportReport { imported: 0, skipped })
    }

    /// Only a document that is not JSON at all fails; bad records are skipped.
    pub fn import_q_table_json(&mut self, raw: &str) -> PolicyResult<ImportReport> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(self.import_q_table_value(&value))
    }
}

impl Default for RLPolicy {
    fn default() -> Self {
        Self::new(RlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(bin_confidence: f64) -> PolicyState {
        PolicyState::discretize(Category::Gore, bin_confidence, 2, 20, UserSensitivity::High)
    }

    #[test]
    fn test_state_key_round_trip() {
        let s = state(0.73);
        assert_eq!(s.confidence_bin, 7);
        assert_eq!(s.time_of_day, TimeOfDay::Evening);
        assert_eq!(s.key(), "gore|c7|m2|evening|high");
        assert_eq!(PolicyState::parse_key(&s.key()), Some(s));
    }

    #[test]
    fn test_discretize_edges() {
        let s = PolicyState::discretize(Category::Blood, 1.0, 9, 3, UserSensitivity::Low);
        assert_eq!(s.confidence_bin, CONFIDENCE_BINS - 1);
        assert_eq!(s.modality_count, MAX_MODALITIES);
        assert_eq!(s.time_of_day, TimeOfDay::Night);
        let s = PolicyState::discretize(Category::Blood, f64::NAN, 0, 3, UserSensitivity::Low);
        assert_eq!(s.confidence_bin, 0);
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert!(PolicyState::parse_key("gore|c7|m2|evening").is_none());
        assert!(PolicyState::parse_key("gore|c12|m2|evening|high").is_none());
        assert!(PolicyState::parse_key("nope|c1|m2|evening|high").is_none());
        assert!(parse_entry_key("gore|c1|m2|evening|high::explode").is_none());
    }

    #[test]
    fn test_unvisited_state_reads_zero() {
        let policy = RLPolicy::with_seed(1);
        for action in PolicyAction::ALL {
            assert_eq!(policy.q_value(&state(0.5), action), 0.0);
        }
        assert_eq!(policy.best_action(&state(0.5)), PolicyAction::HighThreshold);
    }

    #[test]
    fn test_bellman_update_values() {
        let mut policy = RLPolicy::with_seed(1);
        let s = state(0.2);
        let next = state(0.9);
        policy.q_table.insert(
            entry_key(&next, PolicyAction::LowThreshold),
            QEntry { value: 2.0, visits: 1 },
        );

        let q = policy.update(&Episode {
            state: s,
            action: PolicyAction::Suppress,
            reward: 1.0,
            next_state: next,
            done: false,
        });
        // 0 + 0.1 * (1 + 0.9 * 2 - 0)
        assert!((q - 0.28).abs() < 1e-12);

        let q = policy.update(&Episode {
            state: s,
            action: PolicyAction::Suppress,
            reward: 1.0,
            next_state: next,
            done: true,
        });
        assert!((q - (0.28 + 0.1 * (1.0 - 0.28))).abs() < 1e-12);
        assert_eq!(policy.entry(&s, PolicyAction::Suppress).visits, 2);
    }

    #[test]
    fn test_fixed_point_with_full_learning_rate() {
        let mut policy = RLPolicy::new(RlConfig {
            learning_rate: 1.0,
            seed: Some(1),
            ..Default::default()
        });
        let s = state(0.5);
        let episode = Episode {
            state: s,
            action: PolicyAction::MediumThreshold,
            reward: 0.42,
            next_state: s,
            done: true,
        };
        assert_eq!(policy.update(&episode), 0.42);
    }

    #[test]
    fn test_epsilon_decays_to_floor() {
        let mut policy = RLPolicy::with_seed(9);
        let start = policy.epsilon();
        policy.select_action(&state(0.5));
        assert!(policy.epsilon() < start);
        for _ in 0..5000 {
            policy.select_action(&state(0.5));
        }
        assert!((policy.epsilon() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_greedy_follows_learned_values() {
        let mut policy = RLPolicy::with_seed(9);
        let s = state(0.8);
        for _ in 0..50 {
            policy.update(&Episode {
                state: s,
                action: PolicyAction::LowThreshold,
                reward: 1.0,
                next_state: s,
                done: true,
            });
        }
        assert_eq!(policy.best_action(&s), PolicyAction::LowThreshold);
        let selection = policy.select_action(&s);
        assert_eq!(selection.policy, "epsilon-greedy");
        assert!(selection.confidence > 0.5);
    }

    #[test]
    fn test_import_skips_malformed_records() {
        let mut policy = RLPolicy::with_seed(1);
        let good = entry_key(&state(0.1), PolicyAction::Suppress);
        let raw = serde_json::json!([
            {"key": good, "value": 0.5, "visits": 3},
            {"key": "broken", "value": 0.5, "visits": 1},
            {"key": good, "visits": 1},
            {"key": entry_key(&state(0.3), PolicyAction::LowThreshold), "value": 0.25, "visits": 2}
        ])
        .to_string();
        let report = policy.import_q_table_json(&raw).unwrap();
        assert_eq!(report, ImportReport { imported: 2, skipped: 2 });
        assert_eq!(policy.entry(&state(0.1), PolicyAction::Suppress).visits, 3);
        assert!(policy.import_q_table_json("not json").is_err());
    }

    #[test]
    fn test_stats_and_clear() {
        let mut policy = RLPolicy::with_seed(1);
        let s = state(0.4);
        policy.update(&Episode {
            state: s,
            action: PolicyAction::HighThreshold,
            reward: 0.5,
            next_state: s,
            done: true,
        });
        let stats = policy.get_stats();
        assert_eq!(stats, policy.get_stats());
        assert_eq!(stats.states_visited, 1);
        assert_eq!(stats.q_table_size, 1);
        assert_eq!(stats.total_updates, 1);

        policy.clear();
        assert_eq!(policy.get_stats().q_table_size, 0);
        assert_eq!(policy.q_value(&s, PolicyAction::HighThreshold), 0.0);
    }
}
