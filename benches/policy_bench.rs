use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use adaptive_policy::{
    BanditSelector, Category, Episode, OnlineExample, OnlineLearner, PolicyAction, PolicyState,
    RLPolicy, StrategyArm, UserSensitivity,
};

fn warmed_bandit() -> BanditSelector {
    let mut bandit = BanditSelector::with_seed(42);
    for i in 0..500 {
        let arm = StrategyArm::ALL[i % StrategyArm::COUNT];
        bandit.update_reward(arm, (i % 7) as f64 / 7.0, None);
    }
    bandit
}

fn bench_bandit_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("bandit_select");
    let mut bandit = warmed_bandit();

    group.bench_function("ucb1", |b| b.iter(|| black_box(bandit.select_ucb(None))));
    group.bench_function("thompson", |b| {
        b.iter(|| black_box(bandit.select_thompson(None)))
    });
    group.bench_function("epsilon_greedy", |b| {
        b.iter(|| black_box(bandit.select_epsilon_greedy(None)))
    });
    group.finish();
}

fn bench_q_update(c: &mut Criterion) {
    let mut policy = RLPolicy::with_seed(7);
    let state = PolicyState::discretize(Category::Gore, 0.63, 2, 21, UserSensitivity::High);
    let next = PolicyState::discretize(Category::Gore, 0.81, 2, 21, UserSensitivity::High);
    let episode = Episode {
        state,
        action: PolicyAction::MediumThreshold,
        reward: 0.4,
        next_state: next,
        done: false,
    };

    c.bench_function("q_update", |b| b.iter(|| black_box(policy.update(&episode))));
}

fn bench_online_update(c: &mut Criterion) {
    let dims = [32, 128, 256];
    let mut group = c.benchmark_group("online_update");

    for dim in dims {
        let mut learner = OnlineLearner::with_seed(1);
        let features: Vec<f64> = (0..dim).map(|i| (i as f64 * 0.37).sin()).collect();
        let example = OnlineExample {
            features,
            category: Category::Violence,
            label: true,
            timestamp: 0,
            confidence: None,
            importance: None,
        };

        group.bench_with_input(BenchmarkId::from_parameter(dim), &dim, |b, _| {
            b.iter(|| black_box(learner.update(&example)))
        });
    }
    group.finish();
}

fn bench_predict_batch(c: &mut Criterion) {
    let dim = 256;
    let mut learner = OnlineLearner::with_seed(3);
    let x: Vec<f64> = (0..dim).map(|i| (i as f64 * 0.11).cos()).collect();
    learner.update(&OnlineExample::new(x.clone(), Category::Blood, true));

    let batch: Vec<Vec<f64>> = (0..1024)
        .map(|j| x.iter().map(|v| v * (j as f64 / 1024.0)).collect())
        .collect();

    c.bench_function("predict_batch_1024x256", |b| {
        b.iter(|| black_box(learner.predict_batch(&batch, Category::Blood)))
    });
}

criterion_group!(
    benches,
    bench_bandit_select,
    bench_q_update,
    bench_online_update,
    bench_predict_batch
);
criterion_main!(benches);
