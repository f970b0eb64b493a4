//! Common Types and Constants
//!
//! Shared enumerations used across the reward, bandit, policy and learner modules.

use chrono::{DateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== Constants ====================

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Maximum feature absolute value
pub const MAX_FEATURE_ABS: f64 = 50.0;

/// Observation count at which confidence reaches 0.5
pub const CONFIDENCE_SCALE: f64 = 20.0;

/// Map an observation count onto [0, 1)
pub fn observation_confidence(observations: f64) -> f64 {
    let n = observations.max(0.0);
    (n / (n + CONFIDENCE_SCALE)).clamp(0.0, 1.0)
}

// ==================== Category ====================

/// Sensitive-content category a detector is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Violence,
    Blood,
    Gore,
    SexualAssault,
    Suicide,
    SelfHarm,
    EatingDisorders,
    DrugUse,
    Alcohol,
    Spiders,
    Snakes,
    Insects,
    Needles,
    MedicalProcedures,
    Vomit,
    DeathDying,
    ChildAbuse,
    DomesticViolence,
    AnimalCruelty,
    Gunshots,
    Explosions,
    LoudNoises,
    FlashingLights,
    Claustrophobia,
    Heights,
    Drowning,
    Torture,
    Jumpscares,
}

impl Category {
    pub const COUNT: usize = 28;

    pub const ALL: [Category; Category::COUNT] = [
        Category::Violence,
        Category::Blood,
        Category::Gore,
        Category::SexualAssault,
        Category::Suicide,
        Category::SelfHarm,
        Category::EatingDisorders,
        Category::DrugUse,
        Category::Alcohol,
        Category::Spiders,
        Category::Snakes,
        Category::Insects,
        Category::Needles,
        Category::MedicalProcedures,
        Category::Vomit,
        Category::DeathDying,
        Category::ChildAbuse,
        Category::DomesticViolence,
        Category::AnimalCruelty,
        Category::Gunshots,
        Category::Explosions,
        Category::LoudNoises,
        Category::FlashingLights,
        Category::Claustrophobia,
        Category::Heights,
        Category::Drowning,
        Category::Torture,
        Category::Jumpscares,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Violence => "violence",
            Category::Blood => "blood",
            Category::Gore => "gore",
            Category::SexualAssault => "sexual-assault",
            Category::Suicide => "suicide",
            Category::SelfHarm => "self-harm",
            Category::EatingDisorders => "eating-disorders",
            Category::DrugUse => "drug-use",
            Category::Alcohol => "alcohol",
            Category::Spiders => "spiders",
            Category::Snakes => "snakes",
            Category::Insects => "insects",
            Category::Needles => "needles",
            Category::MedicalProcedures => "medical-procedures",
            Category::Vomit => "vomit",
            Category::DeathDying => "death-dying",
            Category::ChildAbuse => "child-abuse",
            Category::DomesticViolence => "domestic-violence",
            Category::AnimalCruelty => "animal-cruelty",
            Category::Gunshots => "gunshots",
            Category::Explosions => "explosions",
            Category::LoudNoises => "loud-noises",
            Category::FlashingLights => "flashing-lights",
            Category::Claustrophobia => "claustrophobia",
            Category::Heights => "heights",
            Category::Drowning => "drowning",
            Category::Torture => "torture",
            Category::Jumpscares => "jumpscares",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let lowered = s.trim().to_lowercase();
        Category::ALL.iter().copied().find(|c| c.as_str() == lowered)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== Strategy Arm ====================

/// Detection strategy chosen by the bandit. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyArm {
    Conservative,
    Balanced,
    Aggressive,
    Adaptive,
    Ensemble,
}

impl StrategyArm {
    pub const COUNT: usize = 5;

    pub const ALL: [StrategyArm; StrategyArm::COUNT] = [
        StrategyArm::Conservative,
        StrategyArm::Balanced,
        StrategyArm::Aggressive,
        StrategyArm::Adaptive,
        StrategyArm::Ensemble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyArm::Conservative => "conservative",
            StrategyArm::Balanced => "balanced",
            StrategyArm::Aggressive => "aggressive",
            StrategyArm::Adaptive => "adaptive",
            StrategyArm::Ensemble => "ensemble",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let lowered = s.trim().to_lowercase();
        StrategyArm::ALL.iter().copied().find(|a| a.as_str() == lowered)
    }
}

impl fmt::Display for StrategyArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== Context Enums ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    /// Bucket a 24h clock hour. Hours past 23 wrap.
    pub fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    /// Bucket a Unix timestamp in milliseconds (UTC). Out-of-range timestamps map to night.
    pub fn from_timestamp_ms(ts: i64) -> Self {
        DateTime::from_timestamp_millis(ts)
            .map(|dt| Self::from_hour(dt.hour()))
            .unwrap_or(TimeOfDay::Night)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        TimeOfDay::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserSensitivity {
    Low,
    Medium,
    High,
}

impl UserSensitivity {
    pub const ALL: [UserSensitivity; 3] = [
        UserSensitivity::Low,
        UserSensitivity::Medium,
        UserSensitivity::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserSensitivity::Low => "low",
            UserSensitivity::Medium => "medium",
            UserSensitivity::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        UserSensitivity::ALL.iter().copied().find(|u| u.as_str() == s)
    }
}

/// User reaction to a displayed warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackType {
    Confirm,
    Dismiss,
    Report,
    Helpful,
    NotHelpful,
}
