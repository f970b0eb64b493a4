#![allow(dead_code)]

use adaptive_policy::{
    BanditContext, Category, FeedbackEvent, FeedbackType, OnlineExample, PolicyConfig,
    PolicyState, TimeOfDay, UserSensitivity,
};

pub const TS: i64 = 1_700_000_000_000;

pub fn seeded_config(seed: u64) -> PolicyConfig {
    let mut config = PolicyConfig::default();
    config.bandit.seed = Some(seed);
    config.rl.seed = Some(seed + 1);
    config.online.seed = Some(seed + 2);
    config
}

pub fn event(feedback_type: FeedbackType, category: Category, confidence: f64) -> FeedbackEvent {
    FeedbackEvent {
        feedback_type,
        category,
        confidence,
        timestamp: TS,
    }
}

pub fn context(category: Category) -> BanditContext {
    BanditContext {
        category,
        time_of_day: TimeOfDay::Evening,
        user_sensitivity: UserSensitivity::Medium,
        recent_accuracy: 0.8,
        modality_count: 1,
        complexity_score: 0.3,
    }
}

pub fn state(category: Category, confidence: f64) -> PolicyState {
    PolicyState::discretize(category, confidence, 1, 9, UserSensitivity::Low)
}

pub fn example(features: Vec<f64>, category: Category, label: bool) -> OnlineExample {
    OnlineExample {
        features,
        category,
        label,
        timestamp: TS,
        confidence: None,
        importance: None,
    }
}
