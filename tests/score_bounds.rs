// tests/score_bounds.rs
use job_stream_aggregator::analyze::scoring::{CompositeScorer, NEUTRAL_SCORE};
use job_stream_aggregator::analyze::ScoreWeights;
use job_stream_aggregator::{Profile, Record};
use rand::{rngs::StdRng, Rng, SeedableRng};

const WORDS: [&str; 8] = ["rust", "go", "senior", "lead", "remote", "berlin", "acme", "kafka"];

fn pick(rng: &mut StdRng, max: usize) -> Vec<String> {
    let n = rng.random_range(0..=max);
    (0..n)
        .map(|_| WORDS[rng.random_range(0..WORDS.len())].to_string())
        .collect()
}

fn random_weight(rng: &mut StdRng) -> f64 {
    match rng.random_range(0..6) {
        0 => f64::NAN,
        1 => -10.0,
        2 => 0.0,
        3 => f64::INFINITY,
        _ => rng.random_range(0.0..100.0),
    }
}

fn random_profile(rng: &mut StdRng) -> Profile {
    let weights = rng.random_bool(0.5).then(|| ScoreWeights {
        technology: random_weight(rng),
        seniority: random_weight(rng),
        location: random_weight(rng),
        company: random_weight(rng),
        remote: random_weight(rng),
    });
    Profile {
        keywords: pick(rng, 3),
        technologies: pick(rng, 3),
        seniority_levels: pick(rng, 2),
        locations: pick(rng, 2),
        companies: pick(rng, 2),
        prefer_remote: rng.random_bool(0.5),
        weights,
        ..Profile::default()
    }
}

fn random_record(rng: &mut StdRng) -> Record {
    Record::with_id("1", "s", pick(rng, 4).join(" "))
        .with_description(pick(rng, 6).join(" "))
        .with_location(pick(rng, 1).join(" "))
        .with_company(pick(rng, 1).join(" "))
}

#[test]
fn scores_stay_within_bounds() {
    let mut rng = StdRng::seed_from_u64(2025);
    for _ in 0..500 {
        let profile = random_profile(&mut rng);
        let scorer = CompositeScorer::for_profile(&profile);
        for _ in 0..5 {
            let r = random_record(&mut rng);
            let s = scorer.score(&r, &profile);
            assert!((0.0..=100.0).contains(&s), "score {s} out of range for {profile:?}");
            let i = scorer.score_record(&r, &profile);
            assert!((0..=100).contains(&i));
        }
    }
}

#[test]
fn profile_without_criteria_scores_neutral() {
    let profile = Profile::default();
    let scorer = CompositeScorer::for_profile(&profile);
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..20 {
        assert_eq!(scorer.score(&random_record(&mut rng), &profile), NEUTRAL_SCORE);
    }
}

#[test]
fn balanced_weights_reward_a_perfect_match() {
    let profile = Profile {
        technologies: vec!["rust".into()],
        seniority_levels: vec!["senior".into()],
        locations: vec!["berlin".into()],
        companies: vec!["acme".into()],
        prefer_remote: true,
        weights: Some(ScoreWeights::balanced()),
        ..Profile::default()
    };
    let scorer = CompositeScorer::for_profile(&profile);
    let perfect = Record::with_id("1", "s", "Senior Rust Engineer (remote)")
        .with_location("Berlin / Remote")
        .with_company("ACME GmbH");
    assert_eq!(scorer.score_record(&perfect, &profile), 100);

    let miss = Record::with_id("2", "s", "Junior Java Engineer")
        .with_location("Tokyo")
        .with_company("Other");
    assert_eq!(scorer.score_record(&miss, &profile), 0);
}
