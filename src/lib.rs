//! # adaptive-policy
//!
//! Learns from user feedback which detection strategy to run, which confidence
//! threshold to apply, and how each content category's classifier should move:
//!
//! - **Reward shaping** - feedback events become immediate + delayed + intrinsic rewards
//! - **Bandit selection** - UCB1, Thompson Sampling, epsilon-greedy and contextual scoring
//!   over five detection strategies
//! - **Q-learning** - tabular policy over discretized context → threshold action
//! - **Online learning** - per-category logistic models trained by momentum SGD,
//!   with rolling-error drift detection
//!
//! Every component is a plain owned struct. [`PolicyEngine`] bundles the four behind
//! per-component locks for hosts that share one session across threads.
//!
//! ## Modules
//!
//! - [`reward`] - reward shaping and per-category reward history
//! - [`bandit`] - strategy selection and Beta/Gamma sampling
//! - [`rl`] - state discretization, Q-table, epsilon-greedy actions
//! - [`online`] - online classifier and drift detector
//! - [`engine`] - the locked bundle plus snapshot/restore
//! - [`sanitize`] - numerical hygiene
//! - [`types`] - shared enumerations and constants
//!
//! ## Example
//!
//! ```rust
//! use adaptive_policy::{BanditSelector, StrategyArm};
//!
//! let mut bandit = BanditSelector::with_seed(42);
//! bandit.update_reward(StrategyArm::Aggressive, 1.0, None);
//! let choice = bandit.select_ucb(None);
//! assert_ne!(choice.arm, StrategyArm::Aggressive);
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod bandit;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod online;
pub mod persistence;
pub mod reward;
pub mod rl;
pub mod sanitize;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use bandit::{
    ArmStats, BanditAlgorithm, BanditContext, BanditSelector, BanditSnapshot, BanditStats,
    BetaSampler, SelectionResult,
};
pub use config::{BanditConfig, OnlineConfig, PolicyConfig, RewardConfig, RlConfig};
pub use engine::{
    EngineSnapshot, EngineStats, FeedbackOutcome, FeedbackRecord, PolicyEngine, PolicyTransition,
};
pub use error::{PolicyError, PolicyResult};
pub use online::{
    DriftAction, DriftReport, DriftStats, DriftType, LearnerSnapshot, LearnerStats,
    LearningRateSchedule, ModelWeights, OnlineExample, OnlineLearner, UpdateOutcome,
};
pub use persistence::{ImportReport, SNAPSHOT_VERSION};
pub use reward::{FeedbackEvent, RewardShaper, ShapedReward};
pub use rl::{ActionSelection, Episode, PolicyAction, PolicyState, QEntry, QTableRecord, RLPolicy};
pub use types::*;
