//! Population generation from inferred samplers.

use genstar_core::{generate_population, infer_distribution_sampler, InferenceStrategy};
use genstar_tests::scenario_a;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn population_is_reproducible_under_a_seed() {
    let s = scenario_a();
    let sampler =
        infer_distribution_sampler(&s.matrix, InferenceStrategy::IndependenceHypothesis).unwrap();
    let first = generate_population(&sampler, 2_000, &mut StdRng::seed_from_u64(17)).unwrap();
    let second = generate_population(&sampler, 2_000, &mut StdRng::seed_from_u64(17)).unwrap();
    assert_eq!(first.entities(), second.entities());
    assert_eq!(first.dimensions(), &[s.age, s.sex]);
}

#[test]
fn population_frequencies_follow_margins() {
    let s = scenario_a();
    let sampler =
        infer_distribution_sampler(&s.matrix, InferenceStrategy::IndependenceHypothesis).unwrap();
    let population =
        generate_population(&sampler, 50_000, &mut StdRng::seed_from_u64(3)).unwrap();
    let young = s.catalog.find_value(s.age, "young").unwrap();
    let share = population.count(&[young]) as f64 / population.len() as f64;
    assert!((share - 0.6).abs() < 0.02, "young share {share}");
}
