//! Property-based tests for the policy learners
//!
//! Invariants covered:
//! - Reward finiteness: any feedback event shapes to a finite reward
//! - Clipping exactness: over-cap gradients land on the cap, the rest pass through
//! - Regret monotonicity: cumulative regret never decreases
//! - Q-table round trip: export -> clear -> import reproduces every entry

mod common;

use proptest::prelude::*;

use adaptive_policy::sanitize::{clip_gradient, l2_norm};
use adaptive_policy::{
    BanditSelector, Category, Episode, FeedbackEvent, FeedbackType, PolicyAction, RLPolicy,
    RewardShaper, StrategyArm,
};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_category() -> impl Strategy<Value = Category> {
    (0..Category::COUNT).prop_map(|i| Category::ALL[i])
}

fn arb_arm() -> impl Strategy<Value = StrategyArm> {
    (0..StrategyArm::COUNT).prop_map(|i| StrategyArm::ALL[i])
}

fn arb_action() -> impl Strategy<Value = PolicyAction> {
    (0..PolicyAction::ALL.len()).prop_map(|i| PolicyAction::ALL[i])
}

fn arb_feedback_type() -> impl Strategy<Value = FeedbackType> {
    prop_oneof![
        Just(FeedbackType::Confirm),
        Just(FeedbackType::Dismiss),
        Just(FeedbackType::Report),
        Just(FeedbackType::Helpful),
        Just(FeedbackType::NotHelpful),
    ]
}

fn arb_confidence() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => (0u64..=1000u64).prop_map(|v| v as f64 / 1000.0),
        1 => Just(f64::NAN),
        1 => (-10.0f64..10.0f64),
    ]
}

fn arb_event() -> impl Strategy<Value = FeedbackEvent> {
    (arb_feedback_type(), arb_category(), arb_confidence()).prop_map(
        |(feedback_type, category, confidence)| FeedbackEvent {
            feedback_type,
            category,
            confidence,
            timestamp: common::TS,
        },
    )
}

fn arb_episode() -> impl Strategy<Value = Episode> {
    (
        arb_category(),
        (0u64..=100u64),     // confidence, percent
        arb_action(),
        (-1.0f64..=1.0f64),  // reward
        (0u64..=100u64),     // next confidence, percent
        any::<bool>(),       // done
    )
        .prop_map(|(category, conf, action, reward, next_conf, done)| Episode {
            state: common::state(category, conf as f64 / 100.0),
            action,
            reward,
            next_state: common::state(category, next_conf as f64 / 100.0),
            done,
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_shaped_reward_is_finite(events in prop::collection::vec(arb_event(), 1..150)) {
        let mut shaper = RewardShaper::default();
        for event in &events {
            let reward = shaper.shape_reward(event);
            prop_assert!(reward.total_reward.is_finite());
            prop_assert!(reward.immediate_reward.is_finite());
            let normalized = RewardShaper::normalize_reward(reward.total_reward);
            prop_assert!((-1.0..=1.0).contains(&normalized));
        }
    }

    #[test]
    fn prop_clip_gradient_exact(
        grad in prop::collection::vec(-100.0f64..100.0f64, 1..64),
        cap in 0.1f64..10.0f64,
    ) {
        let norm = l2_norm(&grad);
        let mut clipped = grad.clone();
        let (reported, was_clipped) = clip_gradient(&mut clipped, cap);

        prop_assert_eq!(reported, norm);
        if norm > cap {
            prop_assert!(was_clipped);
            prop_assert!((l2_norm(&clipped) - cap).abs() <= 1e-9 * cap.max(1.0));
        } else {
            prop_assert!(!was_clipped);
            prop_assert_eq!(clipped, grad);
        }
    }

    #[test]
    fn prop_regret_non_decreasing(
        pulls in prop::collection::vec((arb_arm(), -1.0f64..=1.0f64), 1..120),
        seed in any::<u64>(),
    ) {
        let mut bandit = BanditSelector::with_seed(seed);
        let mut previous = bandit.cumulative_regret();
        for (arm, reward) in pulls {
            bandit.update_reward(arm, reward, None);
            let regret = bandit.cumulative_regret();
            prop_assert!(regret >= previous);
            previous = regret;
        }

        // matching the current leader's average adds nothing
        let best = bandit
            .get_stats()
            .arms
            .values()
            .filter(|s| s.pulls > 0)
            .map(|s| s.avg_reward)
            .fold(f64::NEG_INFINITY, f64::max);
        bandit.update_reward(StrategyArm::Ensemble, best, None);
        prop_assert_eq!(bandit.cumulative_regret(), previous);
    }

    #[test]
    fn prop_q_table_round_trip(episodes in prop::collection::vec(arb_episode(), 1..80)) {
        let mut policy = RLPolicy::with_seed(7);
        policy.batch_update(&episodes);

        let exported = policy.export_q_table();
        policy.clear();
        let report = policy.import_q_table(exported.clone());

        prop_assert_eq!(report.imported, exported.len());
        prop_assert_eq!(report.skipped, 0);
        prop_assert_eq!(policy.export_q_table(), exported);
    }
}
