use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub confirm_base: f64,
    pub dismiss_base: f64,
    pub report_base: f64,
    pub helpful_base: f64,
    pub not_helpful_base: f64,
    pub confidence_scale: f64,
    pub delayed_weight: f64,
    pub delayed_window: usize,
    pub novelty_scale: f64,
    pub uncertainty_scale: f64,
    pub history_size: usize,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            confirm_base: 1.0,
            dismiss_base: -0.5,
            report_base: -0.8,
            helpful_base: 0.3,
            not_helpful_base: -0.2,
            confidence_scale: 0.2,
            delayed_weight: 0.1,
            delayed_window: 10,
            novelty_scale: 0.1,
            uncertainty_scale: 0.05,
            history_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    pub ucb_c: f64,
    pub epsilon: f64,
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub success_threshold: f64,
    pub recent_window: usize,
    pub contextual_min_pulls: u64,
    pub seed: Option<u64>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            ucb_c: 2.0,
            epsilon: 0.1,
            prior_alpha: 1.0,
            prior_beta: 1.0,
            success_threshold: 0.5,
            recent_window: 50,
            contextual_min_pulls: 20,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    pub learning_rate: f64,
    pub discount: f64,
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    pub seed: Option<u64>,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            epsilon: 0.2,
            epsilon_decay: 0.995,
            min_epsilon: 0.01,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    pub initial_learning_rate: f64,
    pub decay_factor: f64,
    pub min_learning_rate: f64,
    pub momentum: f64,
    pub l2_lambda: f64,
    pub gradient_clip: f64,
    pub drift_window: usize,
    pub min_drift_samples: usize,
    pub default_feature_dim: usize,
    pub seed: Option<u64>,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            initial_learning_rate: 0.01,
            decay_factor: 0.9999,
            min_learning_rate: 1e-4,
            momentum: 0.9,
            l2_lambda: 0.001,
            gradient_clip: 5.0,
            drift_window: 100,
            min_drift_samples: 20,
            default_feature_dim: 256,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub reward: RewardConfig,
    pub bandit: BanditConfig,
    pub rl: RlConfig,
    pub online: OnlineConfig,
}

impl PolicyConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("POLICY_UCB_C") {
            config.bandit.ucb_c = val.parse().unwrap_or(config.bandit.ucb_c);
        }
        if let Ok(val) = std::env::var("POLICY_BANDIT_EPSILON") {
            config.bandit.epsilon = val.parse().unwrap_or(config.bandit.epsilon);
        }
        if let Ok(val) = std::env::var("POLICY_RL_LEARNING_RATE") {
            config.rl.learning_rate = val.parse().unwrap_or(config.rl.learning_rate);
        }
        if let Ok(val) = std::env::var("POLICY_RL_DISCOUNT") {
            config.rl.discount = val.parse().unwrap_or(config.rl.discount);
        }
        if let Ok(val) = std::env::var("POLICY_RL_EPSILON") {
            config.rl.epsilon = val.parse().unwrap_or(config.rl.epsilon);
        }
        if let Ok(val) = std::env::var("POLICY_ONLINE_LEARNING_RATE") {
            config.online.initial_learning_rate =
                val.parse().unwrap_or(config.online.initial_learning_rate);
        }
        if let Ok(val) = std::env::var("POLICY_GRADIENT_CLIP") {
            config.online.gradient_clip = val.parse().unwrap_or(config.online.gradient_clip);
        }
        if let Ok(val) = std::env::var("POLICY_SEED") {
            if let Ok(seed) = val.parse::<u64>() {
                config.bandit.seed = Some(seed);
                config.rl.seed = Some(seed.wrapping_add(1));
                config.online.seed = Some(seed.wrapping_add(2));
            }
        }

        config
    }

    pub fn from_json_str(raw: &str) -> PolicyResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PolicyResult<()> {
        fn unit_open(name: &str, v: f64) -> PolicyResult<()> {
            if v.is_finite() && v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(PolicyError::InvalidConfig(format!("{name} must be in (0, 1], got {v}")))
            }
        }
        fn unit_closed(name: &str, v: f64) -> PolicyResult<()> {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(PolicyError::InvalidConfig(format!("{name} must be in [0, 1], got {v}")))
            }
        }
        fn positive(name: &str, v: f64) -> PolicyResult<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(PolicyError::InvalidConfig(format!("{name} must be positive, got {v}")))
            }
        }
        fn non_zero(name: &str, v: usize) -> PolicyResult<()> {
            if v > 0 {
                Ok(())
            } else {
                Err(PolicyError::InvalidConfig(format!("{name} must be non-zero")))
            }
        }

        non_zero("reward.history_size", self.reward.history_size)?;
        non_zero("reward.delayed_window", self.reward.delayed_window)?;

        positive("bandit.ucb_c", self.bandit.ucb_c)?;
        unit_closed("bandit.epsilon", self.bandit.epsilon)?;
        positive("bandit.prior_alpha", self.bandit.prior_alpha)?;
        positive("bandit.prior_beta", self.bandit.prior_beta)?;
        non_zero("bandit.recent_window", self.bandit.recent_window)?;

        unit_open("rl.learning_rate", self.rl.learning_rate)?;
        unit_closed("rl.discount", self.rl.discount)?;
        unit_closed("rl.epsilon", self.rl.epsilon)?;
        unit_open("rl.epsilon_decay", self.rl.epsilon_decay)?;
        unit_closed("rl.min_epsilon", self.rl.min_epsilon)?;

        unit_open("online.initial_learning_rate", self.online.initial_learning_rate)?;
        unit_open("online.decay_factor", self.online.decay_factor)?;
        positive("online.min_learning_rate", self.online.min_learning_rate)?;
        unit_closed("online.momentum", self.online.momentum)?;
        if !(self.online.l2_lambda.is_finite() && self.online.l2_lambda >= 0.0) {
            return Err(PolicyError::InvalidConfig(format!(
                "online.l2_lambda must be non-negative, got {}",
                self.online.l2_lambda
            )));
        }
        positive("online.gradient_clip", self.online.gradient_clip)?;
        non_zero("online.drift_window", self.online.drift_window)?;
        non_zero("online.default_feature_dim", self.online.default_feature_dim)?;

        Ok(())
    }
}
